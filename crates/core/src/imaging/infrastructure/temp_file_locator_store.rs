use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tempfile::{TempDir, TempPath};

use crate::imaging::domain::locator::{Locator, LocatorStore};
use crate::shared::byte_buffer::ByteBuffer;

/// Issues locators as temporary files inside a store-owned directory.
///
/// Each live locator maps to one file; revoking deletes it. Dropping the
/// store removes the directory along with anything still inside.
pub struct TempFileLocatorStore {
    live: Mutex<HashMap<u64, TempPath>>,
    next_id: AtomicU64,
    dir: TempDir,
}

impl TempFileLocatorStore {
    /// Store rooted in the system temporary directory.
    pub fn new() -> std::io::Result<Self> {
        Self::from_dir(tempfile::Builder::new().prefix("facecheck-").tempdir()?)
    }

    pub fn in_dir(parent: &Path) -> std::io::Result<Self> {
        Self::from_dir(tempfile::Builder::new().prefix("facecheck-").tempdir_in(parent)?)
    }

    fn from_dir(dir: TempDir) -> std::io::Result<Self> {
        log::debug!("Locator store at {}", dir.path().display());
        Ok(Self {
            dir,
            live: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Number of locators created and not yet revoked.
    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl LocatorStore for TempFileLocatorStore {
    fn create(&self, bytes: &ByteBuffer) -> std::io::Result<Locator> {
        let mut file = tempfile::Builder::new()
            .prefix("locator-")
            .tempfile_in(self.dir.path())?;
        file.write_all(bytes)?;
        file.flush()?;

        let temp_path = file.into_temp_path();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let locator = Locator::new(id, temp_path.to_path_buf());
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, temp_path);
        Ok(locator)
    }

    fn revoke(&self, locator: &Locator) -> bool {
        let removed = {
            let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            // Ids are only unique per store; the path ties a locator to its issuer.
            let issued_here = live
                .get(&locator.id())
                .is_some_and(|temp_path| &**temp_path == locator.path());
            if issued_here {
                live.remove(&locator.id())
            } else {
                None
            }
        };

        match removed {
            Some(temp_path) => {
                if let Err(e) = temp_path.close() {
                    log::warn!("Failed to delete locator {}: {e}", locator.id());
                }
                true
            }
            None => false,
        }
    }
}
