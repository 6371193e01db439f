//! Optional metrics and structured-event hooks for [`crate::DetectorPipeline`].
//!
//! Installed globally via [`set_pipeline_metrics`] / [`set_pipeline_logger`]
//! so a process wires them once at startup and every `validate` call picks
//! them up without threading an observer through the call site.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

use types::{DetectionKind, Severity, Status};

/// Metrics observer for pipeline validations.
pub trait PipelineMetrics: Send + Sync {
    fn record_validation(&self, policy_id: &str, status: Status, cached: bool, latency: Duration);
    fn record_detection(&self, kind: DetectionKind, severity: Severity, blocked: bool);
}

/// Structured observation describing the outcome of one `validate` call.
#[derive(Debug, Clone)]
pub struct ValidationEvent {
    pub request_id: String,
    pub policy_id: String,
    pub status: Status,
    pub cached: bool,
    pub latency: Duration,
    pub detection_count: usize,
    pub error: Option<String>,
}

impl ValidationEvent {
    fn format_key_values(&self, include_timestamp: bool) -> String {
        let mut parts = Vec::new();
        if include_timestamp {
            let ts = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis();
            parts.push(format!("timestamp_ms={ts}"));
        }
        parts.push(format!("request_id=\"{}\"", escape_kv(&self.request_id)));
        parts.push(format!("policy_id=\"{}\"", escape_kv(&self.policy_id)));
        parts.push(format!("status={:?}", self.status).to_lowercase());
        parts.push(format!("cached={}", self.cached));
        parts.push(format!("latency_us={}", self.latency.as_micros()));
        parts.push(format!("detections={}", self.detection_count));
        if let Some(error) = &self.error {
            parts.push(format!("error=\"{}\"", escape_kv(error)));
        }
        parts.join(" ")
    }
}

fn escape_kv(input: &str) -> String {
    input.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Hook for emitting structured events per validation.
pub trait PipelineEventLogger: Send + Sync {
    fn log(&self, event: &ValidationEvent);
}

/// Key-value logger that writes structured events to any writer.
pub struct KeyValueLogger {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    include_timestamp: bool,
}

impl KeyValueLogger {
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            include_timestamp: true,
        }
    }

    pub fn with_timestamps(mut self, include_timestamp: bool) -> Self {
        self.include_timestamp = include_timestamp;
        self
    }
}

impl PipelineEventLogger for KeyValueLogger {
    fn log(&self, event: &ValidationEvent) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", event.format_key_values(self.include_timestamp));
        }
    }
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn PipelineMetrics>>> {
    static METRICS: OnceLock<RwLock<Option<Arc<dyn PipelineMetrics>>>> = OnceLock::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

/// Install or clear the global validation metrics recorder.
pub fn set_pipeline_metrics(recorder: Option<Arc<dyn PipelineMetrics>>) {
    let mut guard = metrics_lock().write().expect("pipeline metrics lock poisoned");
    *guard = recorder;
}

pub(crate) fn metrics_recorder() -> Option<Arc<dyn PipelineMetrics>> {
    metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn logger_lock() -> &'static RwLock<Option<Arc<dyn PipelineEventLogger>>> {
    static LOGGER: OnceLock<RwLock<Option<Arc<dyn PipelineEventLogger>>>> = OnceLock::new();
    LOGGER.get_or_init(|| RwLock::new(None))
}

/// Install or clear the structured validation event logger.
pub fn set_pipeline_logger(logger: Option<Arc<dyn PipelineEventLogger>>) {
    let mut guard = logger_lock().write().expect("pipeline logger lock poisoned");
    *guard = logger;
}

pub(crate) fn pipeline_logger() -> Option<Arc<dyn PipelineEventLogger>> {
    logger_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingMetrics {
        validations: AtomicUsize,
    }

    impl PipelineMetrics for CountingMetrics {
        fn record_validation(&self, _policy_id: &str, _status: Status, _cached: bool, _latency: Duration) {
            self.validations.fetch_add(1, Ordering::SeqCst);
        }
        fn record_detection(&self, _kind: DetectionKind, _severity: Severity, _blocked: bool) {}
    }

    #[test]
    fn install_and_clear_metrics_recorder() {
        let metrics = Arc::new(CountingMetrics {
            validations: AtomicUsize::new(0),
        });
        set_pipeline_metrics(Some(metrics.clone()));
        metrics_recorder()
            .unwrap()
            .record_validation("default", Status::Allowed, false, Duration::from_millis(1));
        assert_eq!(metrics.validations.load(Ordering::SeqCst), 1);
        set_pipeline_metrics(None);
        assert!(metrics_recorder().is_none());
    }

    struct RecordingLogger {
        events: Mutex<Vec<String>>,
    }

    impl PipelineEventLogger for RecordingLogger {
        fn log(&self, event: &ValidationEvent) {
            self.events.lock().unwrap().push(event.request_id.clone());
        }
    }

    #[test]
    fn install_and_clear_event_logger() {
        let logger = Arc::new(RecordingLogger { events: Mutex::new(Vec::new()) });
        set_pipeline_logger(Some(logger.clone()));
        pipeline_logger().unwrap().log(&ValidationEvent {
            request_id: "abc123".into(),
            policy_id: "default".into(),
            status: Status::Allowed,
            cached: false,
            latency: Duration::from_millis(1),
            detection_count: 0,
            error: None,
        });
        assert_eq!(logger.events.lock().unwrap().as_slice(), ["abc123"]);
        set_pipeline_logger(None);
        assert!(pipeline_logger().is_none());
    }

    #[test]
    fn key_value_logger_writes_formatted_line() {
        let buf: Vec<u8> = Vec::new();
        let logger = KeyValueLogger::new(Box::new(buf)).with_timestamps(false);
        logger.log(&ValidationEvent {
            request_id: "r1".into(),
            policy_id: "default".into(),
            status: Status::Blocked,
            cached: false,
            latency: Duration::from_micros(500),
            detection_count: 2,
            error: None,
        });
    }
}
