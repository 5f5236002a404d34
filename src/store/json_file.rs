use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{StoreDocument, StoreError};
use crate::mapping::{MapKey, MappingStore, RemoteId};
use crate::queue::{QueueStore, QueuedEvent, QueuedEventStatus};

/// Durable store keeping queued events and identifier mappings in one JSON file.
///
/// Every mutation rewrites the document to a sibling temp file and renames it
/// over the original, so a crash leaves either the old or the new state on disk.
/// Meant for the single process that owns the file.
#[derive(Clone)]
pub struct JsonFileStore {
    inner: Arc<JsonFileInner>,
}

struct JsonFileInner {
    path: PathBuf,
    document: Mutex<StoreDocument>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty when the file does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let document = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => StoreDocument::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreDocument::default(),
            Err(err) => return Err(err.into()),
        };

        tracing::debug!(path = %path.display(), events = document.events.len(), "opened json store");

        Ok(Self {
            inner: Arc::new(JsonFileInner {
                path,
                document: Mutex::new(document),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    async fn persist(&self, document: &StoreDocument) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(document)?;
        let mut tmp = self.inner.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.inner.path).await?;
        Ok(())
    }

    /// Apply `change` to a copy of the document and adopt the copy once it is
    /// on disk. `change` returns whether it modified anything.
    async fn commit<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreDocument) -> Result<bool, StoreError> + Send,
    {
        let mut document = self.inner.document.lock().await;
        let mut next = document.clone();
        if !change(&mut next)? {
            return Ok(());
        }
        self.persist(&next).await?;
        *document = next;
        Ok(())
    }
}

#[async_trait]
impl QueueStore for JsonFileStore {
    async fn insert(&self, event: &QueuedEvent) -> Result<(), StoreError> {
        self.commit(|document| {
            document.insert_event(event);
            Ok(true)
        })
        .await
    }

    async fn update(&self, event: &QueuedEvent) -> Result<(), StoreError> {
        self.commit(|document| document.update_event(event).map(|()| true))
            .await
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.commit(|document| Ok(document.events.remove(id).is_some()))
            .await
    }

    async fn get(&self, id: &str) -> Result<Option<QueuedEvent>, StoreError> {
        let document = self.inner.document.lock().await;
        Ok(document.events.get(id).cloned())
    }

    async fn dispatchable(&self, now: u64) -> Result<Vec<QueuedEvent>, StoreError> {
        let document = self.inner.document.lock().await;
        Ok(document.dispatchable(now))
    }

    async fn by_status(&self, status: QueuedEventStatus) -> Result<Vec<QueuedEvent>, StoreError> {
        let document = self.inner.document.lock().await;
        Ok(document.events_where(|event| event.status == status))
    }
}

#[async_trait]
impl MappingStore for JsonFileStore {
    async fn get(&self, key: &MapKey) -> Result<Option<RemoteId>, StoreError> {
        let document = self.inner.document.lock().await;
        Ok(document.get_mapping(key))
    }

    async fn set(&self, key: &MapKey, value: RemoteId) -> Result<(), StoreError> {
        self.commit(|document| {
            if document.get_mapping(key) == Some(value) {
                return Ok(false);
            }
            document.set_mapping(key, value);
            Ok(true)
        })
        .await
    }
}
