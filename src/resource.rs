use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::errors::{MattingError, Result};

const URL_PREFIX: &str = "blob:rmbg/";

#[derive(Debug)]
struct Blob {
    bytes: Arc<[u8]>,
    mime: &'static str,
}

/// Registry of binary resources addressable by URL until revoked.
#[derive(Debug, Clone, Default)]
pub struct ResourceStore {
    blobs: Arc<RwLock<HashMap<Uuid, Blob>>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, bytes: Vec<u8>, mime: &'static str) -> ResourceHandle {
        let id = Uuid::new_v4();
        let bytes: Arc<[u8]> = bytes.into();
        self.blobs.write().insert(
            id,
            Blob {
                bytes: Arc::clone(&bytes),
                mime,
            },
        );
        tracing::debug!(%id, len = bytes.len(), mime, "resource registered");

        ResourceHandle {
            id,
            url: format!("{}{}", URL_PREFIX, id),
            bytes,
            mime,
            store: self.clone(),
            revoked: false,
        }
    }

    /// Look up a live resource by URL.
    pub fn resolve(&self, url: &str) -> Option<(Arc<[u8]>, &'static str)> {
        let id = url.strip_prefix(URL_PREFIX)?.parse::<Uuid>().ok()?;
        self.blobs
            .read()
            .get(&id)
            .map(|blob| (Arc::clone(&blob.bytes), blob.mime))
    }

    pub fn live_count(&self) -> usize {
        self.blobs.read().len()
    }

    fn release(&self, id: &Uuid) -> bool {
        self.blobs.write().remove(id).is_some()
    }
}

/// Owning reference to a registered resource.
///
/// Not `Clone`: `revoke` consumes the handle, so a resource is released exactly once.
/// A handle dropped without `revoke` is released on drop with a warning.
#[derive(Debug)]
pub struct ResourceHandle {
    id: Uuid,
    url: String,
    bytes: Arc<[u8]>,
    mime: &'static str,
    store: ResourceStore,
    revoked: bool,
}

impl ResourceHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub const fn mime(&self) -> &'static str {
        self.mime
    }

    /// Write the resource to `path`, e.g. as a download target.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.bytes).map_err(|e| MattingError::FileSystem {
            path: path.to_path_buf(),
            operation: "resource save".to_string(),
            source: e,
        })
    }

    pub fn revoke(mut self) {
        self.store.release(&self.id);
        self.revoked = true;
        tracing::debug!(url = %self.url, "resource revoked");
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        if !self.revoked && self.store.release(&self.id) {
            tracing::warn!(url = %self.url, "resource handle dropped without revoke");
        }
    }
}
