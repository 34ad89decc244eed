use async_trait::async_trait;

use crate::detection::domain::face::DetectionResult;
use crate::imaging::domain::image_resource::ImageResource;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Brings the detection capability into a state where it accepts calls.
///
/// Implementations own the lifecycle: `ensure_ready` must be idempotent and
/// safe to await from many callers at once, initialising at most once on
/// success.
#[async_trait]
pub trait ReadinessProvider: Send + Sync {
    async fn ensure_ready(&self) -> Result<(), BoxError>;
}

/// Finds faces in a loaded image. Any backend with this shape is
/// substitutable.
#[async_trait]
pub trait DetectionCapability: Send + Sync {
    async fn detect_all_faces(&self, image: &ImageResource) -> Result<DetectionResult, BoxError>;
}
