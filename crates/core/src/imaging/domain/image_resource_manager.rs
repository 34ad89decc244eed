use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::imaging::domain::image_resource::ImageResource;
use crate::imaging::domain::locator::{Locator, LocatorStore};
use crate::shared::byte_buffer::ByteBuffer;

#[derive(Error, Debug)]
pub enum ImageLoadError {
    #[error("failed to create temporary locator: {0}")]
    Locator(#[source] std::io::Error),
    #[error("failed to open image through locator: {0}")]
    Open(#[source] std::io::Error),
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("image load task did not complete: {0}")]
    Task(#[source] tokio::task::JoinError),
}

/// Turns raw bytes into a loaded [`ImageResource`] via a temporary locator.
///
/// Exactly one locator is created per call, and it is revoked exactly once
/// after loading finishes, whether loading succeeded or not.
#[derive(Clone)]
pub struct ImageResourceManager {
    store: Arc<dyn LocatorStore>,
}

impl ImageResourceManager {
    pub fn new(store: Arc<dyn LocatorStore>) -> Self {
        Self { store }
    }

    /// Resolves only after the image has fully loaded.
    ///
    /// Loading runs on the blocking pool and owns the locator guard, so even
    /// if the awaiting future is dropped the locator is released once the
    /// load finishes, never before.
    pub async fn materialize(&self, bytes: &ByteBuffer) -> Result<ImageResource, ImageLoadError> {
        let store = Arc::clone(&self.store);
        let bytes = bytes.clone();

        tokio::task::spawn_blocking(move || {
            let locator = store.create(&bytes).map_err(ImageLoadError::Locator)?;
            let guard = LocatorGuard::new(store, locator);
            load(guard.path())
        })
        .await
        .map_err(ImageLoadError::Task)?
    }
}

fn load(path: &Path) -> Result<ImageResource, ImageLoadError> {
    let reader = image::ImageReader::open(path)
        .map_err(ImageLoadError::Open)?
        .with_guessed_format()
        .map_err(ImageLoadError::Open)?;
    let format = reader.format();
    let decoded = reader.decode().map_err(ImageLoadError::Decode)?;
    Ok(ImageResource::new(decoded.to_rgb8(), format))
}

/// Revokes its locator on drop.
struct LocatorGuard {
    store: Arc<dyn LocatorStore>,
    locator: Option<Locator>,
}

impl LocatorGuard {
    fn new(store: Arc<dyn LocatorStore>, locator: Locator) -> Self {
        Self {
            store,
            locator: Some(locator),
        }
    }

    fn path(&self) -> &Path {
        self.locator
            .as_ref()
            .map(Locator::path)
            .unwrap_or_else(|| Path::new(""))
    }
}

impl Drop for LocatorGuard {
    fn drop(&mut self) {
        if let Some(locator) = self.locator.take() {
            if !self.store.revoke(&locator) {
                log::warn!("Locator {} was not live when released", locator.id());
            }
        }
    }
}
