use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, ObjectStore};

use crate::utils::config::{AppConfig, StorageKind};

pub type DynStore = Arc<dyn ObjectStore>;

/// Prefix for uploaded document objects, one directory per workspace.
pub const UPLOADS_PREFIX: &str = "uploads";
/// Prefix for synthesized podcast audio objects.
pub const AUDIO_PREFIX: &str = "audio";

/// Storage manager with persistent state and proper lifecycle management.
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
    backend_kind: StorageKind,
    local_base: Option<PathBuf>,
}

impl StorageManager {
    /// Create a new StorageManager with the configured backend, creating the
    /// local base directory when needed.
    pub async fn new(cfg: &AppConfig) -> object_store::Result<Self> {
        let backend_kind = cfg.storage.clone();
        let (store, local_base): (DynStore, Option<PathBuf>) = match cfg.storage {
            StorageKind::Local => {
                let base = PathBuf::from(&cfg.data_dir);
                if !base.exists() {
                    std::fs::create_dir_all(&base).map_err(|source| {
                        object_store::Error::Generic {
                            store: "LocalFileSystem",
                            source: Box::new(source),
                        }
                    })?;
                }
                let local = LocalFileSystem::new_with_prefix(&base)?;
                (Arc::new(local), Some(base))
            }
            StorageKind::Memory => (Arc::new(InMemory::new()), None),
        };

        Ok(Self {
            store,
            backend_kind,
            local_base,
        })
    }

    /// Create a StorageManager with a custom storage backend. Useful for
    /// injecting a specific backend in tests.
    pub fn with_backend(store: DynStore, backend_kind: StorageKind) -> Self {
        Self {
            store,
            backend_kind,
            local_base: None,
        }
    }

    pub fn backend_kind(&self) -> &StorageKind {
        &self.backend_kind
    }

    /// Resolve an object location to a filesystem path when using the local backend.
    ///
    /// Returns `None` when the backend is not local or when the provided location includes
    /// unsupported components (absolute paths or parent traversals).
    pub fn resolve_local_path(&self, location: &str) -> Option<PathBuf> {
        let base = self.local_base.as_deref()?;
        let relative = Path::new(location);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return None;
        }

        Some(base.join(relative))
    }

    /// Object location for an uploaded document file.
    pub fn upload_location(workspace_id: &str, file_name: &str) -> String {
        format!("{UPLOADS_PREFIX}/{workspace_id}/{file_name}")
    }

    /// Object location for a synthesized audio file.
    pub fn audio_location(file_name: &str) -> String {
        format!("{AUDIO_PREFIX}/{file_name}")
    }

    /// Store bytes at the specified location.
    pub async fn put(&self, location: &str, data: Bytes) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        let payload = object_store::PutPayload::from_bytes(data);
        self.store.put(&path, payload).await.map(|_| ())
    }

    /// Retrieve bytes from the specified location, fully buffered.
    pub async fn get(&self, location: &str) -> object_store::Result<Bytes> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        result.bytes().await
    }

    /// Delete a single object. Missing objects are not an error.
    pub async fn delete(&self, location: &str) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Delete all objects below the specified prefix.
    pub async fn delete_prefix(&self, prefix: &str) -> object_store::Result<()> {
        let prefix_path = ObjPath::from(prefix);
        let locations = self
            .store
            .list(Some(&prefix_path))
            .map_ok(|m| m.location)
            .boxed();
        self.store
            .delete_stream(locations)
            .try_collect::<Vec<_>>()
            .await?;

        Ok(())
    }

    /// List all object locations below the specified prefix.
    pub async fn list(&self, prefix: Option<&str>) -> object_store::Result<Vec<String>> {
        let prefix_path = prefix.map(ObjPath::from);
        let metas: Vec<object_store::ObjectMeta> =
            self.store.list(prefix_path.as_ref()).try_collect().await?;
        Ok(metas.into_iter().map(|m| m.location.to_string()).collect())
    }

    /// Check if an object exists at the specified location.
    pub async fn exists(&self, location: &str) -> object_store::Result<bool> {
        let path = ObjPath::from(location);
        self.store
            .head(&path)
            .await
            .map(|_| true)
            .or_else(|e| match e {
                object_store::Error::NotFound { .. } => Ok(false),
                _ => Err(e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_manager() -> StorageManager {
        StorageManager::with_backend(Arc::new(InMemory::new()), StorageKind::Memory)
    }

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let storage = memory_manager();
        let location = StorageManager::upload_location("ws1", "notes.pdf");

        storage
            .put(&location, Bytes::from_static(b"pdf bytes"))
            .await
            .expect("put");
        assert!(storage.exists(&location).await.expect("exists"));

        let bytes = storage.get(&location).await.expect("get");
        assert_eq!(bytes.as_ref(), b"pdf bytes");

        storage.delete(&location).await.expect("delete");
        assert!(!storage.exists(&location).await.expect("exists after delete"));

        // Deleting a missing object is a no-op
        storage.delete(&location).await.expect("delete missing");
    }

    #[tokio::test]
    async fn delete_prefix_removes_workspace_uploads() {
        let storage = memory_manager();
        storage
            .put(
                &StorageManager::upload_location("ws1", "a.pdf"),
                Bytes::from_static(b"a"),
            )
            .await
            .expect("put a");
        storage
            .put(
                &StorageManager::upload_location("ws1", "b.pdf"),
                Bytes::from_static(b"b"),
            )
            .await
            .expect("put b");
        storage
            .put(
                &StorageManager::upload_location("ws2", "c.pdf"),
                Bytes::from_static(b"c"),
            )
            .await
            .expect("put c");

        storage
            .delete_prefix(&format!("{UPLOADS_PREFIX}/ws1"))
            .await
            .expect("delete prefix");

        let remaining = storage.list(Some(UPLOADS_PREFIX)).await.expect("list");
        assert_eq!(remaining, vec![StorageManager::upload_location("ws2", "c.pdf")]);
    }

    #[test]
    fn resolve_local_path_rejects_traversal() {
        let storage = StorageManager {
            store: Arc::new(InMemory::new()),
            backend_kind: StorageKind::Local,
            local_base: Some(PathBuf::from("/data")),
        };

        assert!(storage.resolve_local_path("../etc/passwd").is_none());
        assert!(storage.resolve_local_path("/etc/passwd").is_none());
        assert_eq!(
            storage.resolve_local_path("audio/a.mp3"),
            Some(PathBuf::from("/data/audio/a.mp3"))
        );
    }
}
