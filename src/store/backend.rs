use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;

/// Document-blob persistence contract: one JSON document per collection.
/// A missing collection reads as `None` (create-if-absent first-run
/// semantics live in the store, not the backend).
///
/// The backend is selected once at startup and injected into the store;
/// handlers never switch backends at runtime.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn read(&self, collection: &str) -> anyhow::Result<Option<String>>;
    async fn write(&self, collection: &str, contents: &str) -> anyhow::Result<()>;
}

/// JSON documents on disk, one `<collection>.json` file per collection
/// under a data directory.
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.json"))
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn read(&self, collection: &str) -> anyhow::Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(collection)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(anyhow::Error::new(e).context(format!("failed to read {collection} data file")))
            }
        }
    }

    async fn write(&self, collection: &str, contents: &str) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .context("failed to create data directory")?;
        tokio::fs::write(self.path_for(collection), contents)
            .await
            .with_context(|| format!("failed to write {collection} data file"))?;
        Ok(())
    }
}

/// In-memory backend for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryBackend {
    docs: DashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn read(&self, collection: &str) -> anyhow::Result<Option<String>> {
        Ok(self.docs.get(collection).map(|doc| doc.value().clone()))
    }

    async fn write(&self, collection: &str, contents: &str) -> anyhow::Result<()> {
        self.docs.insert(collection.to_string(), contents.to_string());
        Ok(())
    }
}
