//! Storage backends for receipt metadata.
//!
//! Receipt metadata is content-addressed: the URI minted into the receipt token is
//! derived from the content itself, so the stored document can always be checked against
//! the token that references it.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use blake2::{digest::consts::U32, Blake2b, Digest};
use log::*;
use opg_common::Secret;
use serde::Deserialize;

use crate::traits::{StorageBackend, StorageError};

type Blake2b256 = Blake2b<U32>;

pub fn content_hash(content: &[u8]) -> String {
    let hash = Blake2b256::digest(content);
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

//--------------------------------------  HttpContentStore     -------------------------------------------------------
/// A content store behind an HTTP pinning API. The store replies with the content id it
/// assigned; the backend wraps it into a `ipfs://` URI.
#[derive(Debug, Clone)]
pub struct HttpContentStore {
    client: reqwest::Client,
    url: String,
    api_key: Option<Secret<String>>,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    cid: String,
}

impl HttpContentStore {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, url, api_key: None }
    }

    /// Authenticate pinning requests with a bearer token.
    pub fn with_api_key(mut self, key: Secret<String>) -> Self {
        self.api_key = Some(key);
        self
    }
}

impl StorageBackend for HttpContentStore {
    async fn store(&self, content: &[u8]) -> Result<String, StorageError> {
        let mut request =
            self.client.post(&self.url).header("content-type", "application/json").body(content.to_vec());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.reveal());
        }
        let response = request.send().await.map_err(|e| StorageError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StorageError::Rejected(format!("status {}", response.status())));
        }
        let body: AddResponse = response.json().await.map_err(|e| StorageError::Rejected(e.to_string()))?;
        debug!("🗂️ Stored {} bytes of receipt metadata as {}", content.len(), body.cid);
        Ok(format!("ipfs://{}", body.cid))
    }
}

//--------------------------------------  LocalContentStore    -------------------------------------------------------
/// A process-local content store. Useful for development and tests; the content does not
/// survive a restart, but the URIs are stable because they hash the content.
#[derive(Debug, Clone, Default)]
pub struct LocalContentStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl LocalContentStore {
    pub fn fetch(&self, uri: &str) -> Option<Vec<u8>> {
        let key = uri.strip_prefix("local://")?;
        self.objects.lock().ok()?.get(key).cloned()
    }
}

impl StorageBackend for LocalContentStore {
    async fn store(&self, content: &[u8]) -> Result<String, StorageError> {
        let key = content_hash(content);
        self.objects
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?
            .insert(key.clone(), content.to_vec());
        Ok(format!("local://{key}"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn local_store_uris_are_content_addressed() {
        let store = LocalContentStore::default();
        let uri_a = store.store(b"receipt metadata").await.unwrap();
        let uri_b = store.store(b"receipt metadata").await.unwrap();
        let uri_c = store.store(b"different metadata").await.unwrap();
        assert_eq!(uri_a, uri_b);
        assert_ne!(uri_a, uri_c);
        assert!(uri_a.starts_with("local://"));
        assert_eq!(store.fetch(&uri_a).unwrap(), b"receipt metadata");
    }

    #[test]
    fn api_keys_never_leak_through_debug() {
        let store = HttpContentStore::new("http://pin.example".to_string())
            .with_api_key(Secret::new("pinning-key".to_string()));
        let dump = format!("{store:?}");
        assert!(!dump.contains("pinning-key"));
        assert!(dump.contains("****"));
    }

    #[test]
    fn hash_is_hex_of_fixed_width() {
        let hash = content_hash(b"x");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
