use bytes::Bytes;

pub mod file;

pub use file::FileStorage;

/// Backend for attachment file contents. Keys are the stored names recorded
/// in the `attachment` table.
pub trait Storage {
    /// Read a stored file.
    async fn get_object(&mut self, key: &str) -> crate::AppResult<Bytes>;

    /// Write a file, replacing any previous contents under the same key.
    async fn put_object(&mut self, key: &str, data: Bytes) -> crate::AppResult<()>;

    /// Remove a stored file. A missing file is `NotFound`.
    async fn delete_object(&mut self, key: &str) -> crate::AppResult<()>;
}

/// Whether a key is safe to use as a single path component.
pub(crate) fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains(['/', '\\', '\0'])
}
