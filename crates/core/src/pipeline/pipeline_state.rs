use crate::pipeline::pipeline_error::FailureKind;

/// Per-invocation progress through the pipeline.
///
/// Stages advance strictly in declaration order; any non-terminal state may
/// jump straight to `Resolved(false)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Decoding,
    Materializing,
    AwaitingDetectorReady,
    Detecting,
    Resolved(bool),
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Resolved(_))
    }

    pub fn name(self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Decoding => "decoding",
            PipelineState::Materializing => "materializing",
            PipelineState::AwaitingDetectorReady => "awaiting_ready",
            PipelineState::Detecting => "detecting",
            PipelineState::Resolved(_) => "resolved",
        }
    }

    pub fn can_advance_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Resolved(_), _) => false,
            (_, Resolved(false)) => true,
            (Idle, Decoding)
            | (Decoding, Materializing)
            | (Materializing, AwaitingDetectorReady)
            | (AwaitingDetectorReady, Detecting)
            | (Detecting, Resolved(true)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Resolved(outcome) => write!(f, "resolved({outcome})"),
            other => f.write_str(other.name()),
        }
    }
}

/// How an invocation ended. Observability only: callers of `detect_face`
/// see just [`Resolution::as_bool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resolution {
    FaceFound,
    NoFace,
    Failed(FailureKind),
}

impl Resolution {
    pub fn as_bool(self) -> bool {
        matches!(self, Resolution::FaceFound)
    }
}
