use anyhow::{bail, Result};
use async_trait::async_trait;
use domain::MediaBlob;
use engine::MediaUploader;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Content-addressed blob bucket. The same bytes always map to the same URL.
pub struct MemoryMedia {
    blobs: Mutex<HashMap<String, MediaBlob>>,
    max_bytes: usize,
    public_base_url: String,
}

impl MemoryMedia {
    pub fn new(max_bytes: usize, public_base_url: &str) -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
            max_bytes,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn blobs(&self) -> MutexGuard<'_, HashMap<String, MediaBlob>> {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<MediaBlob> {
        self.blobs().get(key).cloned()
    }
}

pub fn media_key(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[async_trait]
impl MediaUploader for MemoryMedia {
    async fn upload(&self, blob: &MediaBlob) -> Result<String> {
        if !blob.content_type.starts_with("image/") {
            bail!("unsupported content type {}", blob.content_type);
        }
        if blob.bytes.is_empty() {
            bail!("empty upload");
        }
        if blob.bytes.len() > self.max_bytes {
            bail!(
                "image is {} bytes, the limit is {}",
                blob.bytes.len(),
                self.max_bytes
            );
        }
        let key = media_key(&blob.bytes);
        debug!(%key, size = blob.bytes.len(), "Stored media");
        self.blobs().insert(key.clone(), blob.clone());
        Ok(format!("{}/media/{}", self.public_base_url, key))
    }
}
