use fxhash::hash64;

use crate::normalize::l2_normalize_in_place;
use crate::SemanticConfig;

/// Deterministic, hash-derived embedding used for the `"fast"` tier and in
/// every test that exercises the pipeline without a live model endpoint.
/// Reproducible and cheap; not semantically meaningful.
pub(crate) fn make_stub_vector(text: &str, cfg: &SemanticConfig) -> Vec<f32> {
    let dim = cfg.dimension();
    let mut v = vec![0f32; dim];
    let h = hash64(text.as_bytes());
    for (idx, value) in v.iter_mut().enumerate() {
        *value = ((h >> (idx % 32)) as f32 * 0.0001).sin();
    }
    if cfg.normalize {
        l2_normalize_in_place(&mut v);
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(tier: &str, normalize: bool) -> SemanticConfig {
        SemanticConfig {
            tier: tier.into(),
            normalize,
            ..Default::default()
        }
    }

    #[test]
    fn fast_tier_is_384_dim() {
        let v = make_stub_vector("hello world", &cfg("fast", false));
        assert_eq!(v.len(), 384);
    }

    #[test]
    fn balanced_tier_is_768_dim() {
        let v = make_stub_vector("test text", &cfg("balanced", false));
        assert_eq!(v.len(), 768);
    }

    #[test]
    fn accurate_tier_is_1024_dim() {
        let v = make_stub_vector("another test", &cfg("accurate", false));
        assert_eq!(v.len(), 1024);
    }

    #[test]
    fn unknown_tier_defaults_to_balanced_dim() {
        let v = make_stub_vector("test", &cfg("unknown", false));
        assert_eq!(v.len(), 768);
    }

    #[test]
    fn deterministic_for_same_text() {
        let c = cfg("fast", false);
        assert_eq!(make_stub_vector("same text", &c), make_stub_vector("same text", &c));
    }

    #[test]
    fn different_text_differs() {
        let c = cfg("fast", false);
        assert_ne!(make_stub_vector("hello", &c), make_stub_vector("world", &c));
    }

    #[test]
    fn normalize_flag_produces_unit_vector() {
        let v = make_stub_vector("test", &cfg("fast", true));
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "expected unit norm, got {norm}");
    }

    #[test]
    fn empty_text_still_produces_a_full_vector() {
        let v = make_stub_vector("", &cfg("fast", false));
        assert_eq!(v.len(), 384);
    }

    #[test]
    fn values_bounded_by_sine_range() {
        let v = make_stub_vector("test", &cfg("balanced", false));
        assert!(v.iter().all(|&x| (-1.0..=1.0).contains(&x)));
    }

    #[test]
    fn unicode_text_is_handled() {
        let v = make_stub_vector("Hello 世界 🌍", &cfg("fast", false));
        assert_eq!(v.len(), 384);
        assert!(!v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn long_text_is_handled() {
        let long_text = "a".repeat(10_000);
        let v = make_stub_vector(&long_text, &cfg("fast", false));
        assert_eq!(v.len(), 384);
    }
}
