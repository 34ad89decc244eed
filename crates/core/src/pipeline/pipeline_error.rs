use thiserror::Error;

use crate::decoding::domain::file_decoder::DecodeError;
use crate::detection::domain::detector_gateway::DetectorError;
use crate::imaging::domain::image_resource_manager::ImageLoadError;

/// Any stage failure. Never escapes `detect_face`; it is logged and
/// reported to the pipeline logger, then collapsed to `false`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("decode stage: {0}")]
    Decode(#[from] DecodeError),
    #[error("image stage: {0}")]
    ImageLoad(#[from] ImageLoadError),
    #[error("detector stage: {0}")]
    Detector(#[from] DetectorError),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Decode(_) => FailureKind::Decode,
            PipelineError::ImageLoad(_) => FailureKind::ImageLoad,
            PipelineError::Detector(e) if e.is_unavailable() => FailureKind::DetectorUnavailable,
            PipelineError::Detector(_) => FailureKind::DetectionCall,
        }
    }

    /// The error followed by each of its sources, joined with `": "`.
    pub fn chain(&self) -> String {
        let mut text = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let cause_text = cause.to_string();
            if !text.ends_with(&cause_text) {
                text.push_str(": ");
                text.push_str(&cause_text);
            }
            source = cause.source();
        }
        text
    }
}

/// Where a pipeline failure originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    Decode,
    ImageLoad,
    DetectorUnavailable,
    DetectionCall,
}

impl FailureKind {
    pub const ALL: &[FailureKind] = &[
        FailureKind::Decode,
        FailureKind::ImageLoad,
        FailureKind::DetectorUnavailable,
        FailureKind::DetectionCall,
    ];
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Decode => write!(f, "decode"),
            FailureKind::ImageLoad => write!(f, "image load"),
            FailureKind::DetectorUnavailable => write!(f, "detector unavailable"),
            FailureKind::DetectionCall => write!(f, "detection call"),
        }
    }
}
