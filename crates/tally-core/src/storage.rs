//! Statement document storage
//!
//! Uploaded documents are kept so a failed or disputed import can always be
//! traced back to the exact bytes the user sent. Locators are opaque to the
//! rest of the crate.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::UserId;

/// Document storage collaborator
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Store a document and return its locator
    async fn save(&self, content: &[u8], file_name: &str, user_id: UserId) -> Result<String>;

    /// Read a stored document back
    async fn read(&self, locator: &str) -> Result<Vec<u8>>;

    /// Remove a stored document
    async fn delete(&self, locator: &str) -> Result<()>;
}

/// Stores documents under a local directory, one subdirectory per user
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root from `TALLY_STORAGE_DIR`, else `<data_local_dir>/tally/statements`
    pub fn from_env() -> Result<Self> {
        if let Ok(dir) = std::env::var("TALLY_STORAGE_DIR") {
            if !dir.trim().is_empty() {
                return Ok(Self::new(dir));
            }
        }
        dirs::data_local_dir()
            .map(|d| Self::new(d.join("tally").join("statements")))
            .ok_or_else(|| Error::Config("Could not determine storage directory".into()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a locator onto a path inside the root, rejecting anything that escapes it
    fn resolve(&self, locator: &str) -> Result<PathBuf> {
        let relative = Path::new(locator);
        let safe = !locator.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, std::path::Component::Normal(_)));
        if !safe {
            warn!(locator, "Rejected storage locator outside storage root");
            return Err(Error::Storage(format!("Invalid storage locator: {}", locator)));
        }
        Ok(self.root.join(relative))
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn save(&self, content: &[u8], file_name: &str, user_id: UserId) -> Result<String> {
        let locator = match extension_of(file_name) {
            Some(ext) => format!("{}/{}.{}", user_id, Uuid::new_v4(), ext),
            None => format!("{}/{}", user_id, Uuid::new_v4()),
        };
        let path = self.resolve(&locator)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", path.display(), e)))?;

        debug!(locator = %locator, bytes = content.len(), "Stored statement document");
        Ok(locator)
    }

    async fn read(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.resolve(locator)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to read {}: {}", locator, e)))
    }

    async fn delete(&self, locator: &str) -> Result<()> {
        let path = self.resolve(locator)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("Failed to delete {}: {}", locator, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());
        let user = UserId::new();

        let locator = storage.save(b"%PDF-1.4 test", "March.PDF", user).await.unwrap();
        assert!(locator.starts_with(&user.to_string()));
        assert!(locator.ends_with(".pdf"));

        assert_eq!(storage.read(&locator).await.unwrap(), b"%PDF-1.4 test");

        storage.delete(&locator).await.unwrap();
        assert!(matches!(storage.read(&locator).await, Err(Error::Storage(_))));
        // Deleting twice is fine
        storage.delete(&locator).await.unwrap();
    }

    #[tokio::test]
    async fn test_same_file_name_gets_distinct_locators() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());
        let user = UserId::new();
        let a = storage.save(b"a", "statement.pdf", user).await.unwrap();
        let b = storage.save(b"b", "statement.pdf", user).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_rejects_locators_escaping_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path().join("docs"));
        for locator in ["../secret.pdf", "/etc/passwd", "a/../../b", ""] {
            assert!(
                matches!(storage.read(locator).await, Err(Error::Storage(_))),
                "{} was accepted",
                locator
            );
        }
    }

    #[test]
    fn test_extension_sanitized() {
        assert_eq!(extension_of("x.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("weird.p/f"), None);
    }
}
