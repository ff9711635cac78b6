use thiserror::Error;

/// Content-addressed storage for receipt metadata.
///
/// Two implementations ship with the engine: an HTTP content store
/// ([`crate::storage::HttpContentStore`]) and a process-local fallback
/// ([`crate::storage::LocalContentStore`]). Hosts select one through configuration;
/// receipt issuance degrades to a placeholder URI when the selected backend fails.
#[allow(async_fn_in_trait)]
pub trait StorageBackend: Clone + Send + Sync + 'static {
    /// Store `content` and return its content-addressed URI.
    fn store(&self, content: &[u8]) -> impl std::future::Future<Output = Result<String, StorageError>> + Send;
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("The storage backend is unreachable: {0}")]
    Unavailable(String),
    #[error("The storage backend rejected the upload: {0}")]
    Rejected(String),
}
