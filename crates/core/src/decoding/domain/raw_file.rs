use async_trait::async_trait;

/// Opaque handle to a user-supplied file.
///
/// The pipeline never owns or mutates the handle and reads it exactly once.
/// `byte_len` and `mime_hint` are advisory: neither is validated here.
#[async_trait]
pub trait RawFile: Send + Sync {
    /// Advertised length in bytes, if the source knows it up front.
    fn byte_len(&self) -> Option<u64>;

    fn mime_hint(&self) -> Option<&str>;

    /// Human-readable name for diagnostics.
    fn describe(&self) -> String;

    /// Reads the full content.
    async fn read_all(&self) -> std::io::Result<Vec<u8>>;
}
