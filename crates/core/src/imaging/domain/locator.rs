use std::path::{Path, PathBuf};

use crate::shared::byte_buffer::ByteBuffer;

/// Ephemeral handle through which an image loader can reach in-memory bytes.
///
/// Deliberately not `Clone`: whoever holds the locator is the one who
/// revokes it.
#[derive(Debug, PartialEq, Eq)]
pub struct Locator {
    id: u64,
    path: PathBuf,
}

impl Locator {
    pub fn new(id: u64, path: PathBuf) -> Self {
        Self { id, path }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Allocates and releases temporary locators.
///
/// Implementations must tolerate concurrent use; each call to `create`
/// yields a locator distinct from every other live one.
pub trait LocatorStore: Send + Sync {
    fn create(&self, bytes: &ByteBuffer) -> std::io::Result<Locator>;

    /// Releases the locator. Returns `false` if it was not live (already
    /// revoked or never issued by this store).
    fn revoke(&self, locator: &Locator) -> bool;
}
