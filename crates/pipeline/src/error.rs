/// Failures that can prevent [`crate::DetectorPipeline::validate`] from
/// producing a normal result. Everything else (a single detector's
/// dependency failing, a cache miss on the L2 store) is absorbed inside the
/// collaborator crates and never reaches here.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("policy evaluation failed: {0}")]
    Policy(#[from] policy::PolicyError),
    #[error("failed to load pattern configuration: {0}")]
    PatternConfig(#[from] patterns::PatternConfigError),
    #[error("validation deadline exceeded")]
    DeadlineExceeded,
}
