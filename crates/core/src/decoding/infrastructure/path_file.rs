use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::decoding::domain::raw_file::RawFile;
use crate::shared::constants::mime_for_extension;

/// A [`RawFile`] backed by a path on the local filesystem.
///
/// Length is sampled from metadata at construction when available; the MIME
/// hint is guessed from the extension.
#[derive(Clone, Debug)]
pub struct PathFile {
    path: PathBuf,
    byte_len: Option<u64>,
    mime_hint: Option<&'static str>,
}

impl PathFile {
    /// Never fails: an unreadable path surfaces as a read error later.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let byte_len = std::fs::metadata(&path)
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len());
        let mime_hint = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_for_extension);
        Self {
            path,
            byte_len,
            mime_hint,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RawFile for PathFile {
    fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }

    fn mime_hint(&self) -> Option<&str> {
        self.mime_hint
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn read_all(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}
