use std::time::Duration;

/// Tunables for one [`PipelineController`](super::pipeline_controller::PipelineController).
///
/// A timeout turns a stalled await into a detector-stage failure for that
/// call; it is not a retry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    pub readiness_timeout: Option<Duration>,
    pub detection_timeout: Option<Duration>,
}

impl PipelineConfig {
    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = Some(timeout);
        self
    }

    pub fn with_detection_timeout(mut self, timeout: Duration) -> Self {
        self.detection_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_waits_indefinitely() {
        let config = PipelineConfig::default();
        assert_eq!(config.readiness_timeout, None);
        assert_eq!(config.detection_timeout, None);
    }

    #[test]
    fn test_builders_set_timeouts() {
        let config = PipelineConfig::default()
            .with_readiness_timeout(Duration::from_secs(30))
            .with_detection_timeout(Duration::from_secs(5));
        assert_eq!(config.readiness_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.detection_timeout, Some(Duration::from_secs(5)));
    }
}
