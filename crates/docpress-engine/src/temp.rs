//! Scratch file allocation and guaranteed release

use docpress_config::ScratchConfig;
use docpress_types::RequestId;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Allocates collision-free artifact paths in a shared scratch directory
#[derive(Debug, Clone)]
pub struct TempResourceManager {
    directory: PathBuf,
    extension: String,
}

impl TempResourceManager {
    /// Create a manager for `directory`, naming artifacts with `extension`
    pub fn new<P: Into<PathBuf>, S: Into<String>>(directory: P, extension: S) -> Self {
        Self {
            directory: directory.into(),
            extension: extension.into(),
        }
    }

    /// Create a manager from the scratch configuration
    pub fn from_config(config: &ScratchConfig) -> Self {
        Self::new(config.resolved_directory(), config.extension.clone())
    }

    /// Scratch directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Allocate a unique path owned by `owner`.
    ///
    /// The name is `<prefix>-<unix nanos>-<random>.<extension>`, unique without
    /// any locking. Nothing is written to disk; the returned guard removes the
    /// path when dropped.
    pub fn allocate(&self, prefix: &str, owner: RequestId) -> TempArtifact {
        let nanos = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        let token = uuid::Uuid::new_v4().simple();
        let name = format!("{}-{}-{}.{}", prefix, nanos, token, self.extension);
        let path = self.directory.join(name);

        debug!("Allocated scratch path {} for request {}", path.display(), owner);

        TempArtifact {
            path,
            owner,
            released: false,
        }
    }

    /// Remove `path`, logging and swallowing any failure.
    ///
    /// A path that was never written is not an error.
    pub fn release(path: &Path) {
        log_release(path, std::fs::remove_file(path));
    }

    /// Remove `path` without blocking the runtime, with the same logging as
    /// [`TempResourceManager::release`]
    pub async fn release_async(path: &Path) {
        log_release(path, tokio::fs::remove_file(path).await);
    }
}

fn log_release(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => debug!("Released scratch file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove scratch file {}: {}", path.display(), e),
    }
}

/// A scratch path owned by exactly one in-flight request.
///
/// Released on drop, so every exit path of the owner cleans up, including
/// errors, timeouts and cancelled futures.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    owner: RequestId,
    released: bool,
}

impl TempArtifact {
    /// Path of the artifact
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Request that owns the artifact
    pub fn owner(&self) -> RequestId {
        self.owner
    }

    /// Release the artifact now.
    ///
    /// Drop only falls back to a blocking unlink for paths that were never
    /// released this way.
    pub async fn release(mut self) {
        self.released = true;
        TempResourceManager::release_async(&self.path).await;
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            TempResourceManager::release(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_allocate_naming() {
        let temp_dir = TempDir::new().unwrap();
        let manager = TempResourceManager::new(temp_dir.path(), "pdf");
        let owner = RequestId::new();

        let artifact = manager.allocate("input", owner);
        let name = artifact.path().file_name().unwrap().to_string_lossy().to_string();

        assert!(name.starts_with("input-"));
        assert!(name.ends_with(".pdf"));
        assert_eq!(artifact.path().parent(), Some(temp_dir.path()));
        assert_eq!(artifact.owner(), owner);
        assert!(!artifact.path().exists());
    }

    #[test]
    fn test_drop_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = TempResourceManager::new(temp_dir.path(), "pdf");

        let path = {
            let artifact = manager.allocate("output", RequestId::new());
            std::fs::write(artifact.path(), b"%PDF-1.4").unwrap();
            assert!(artifact.path().exists());
            artifact.path().to_path_buf()
        };

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_release_of_unwritten_path_is_silent() {
        let temp_dir = TempDir::new().unwrap();
        let manager = TempResourceManager::new(temp_dir.path(), "pdf");
        let artifact = manager.allocate("input", RequestId::new());
        artifact.release().await;
        TempResourceManager::release(&temp_dir.path().join("never-existed.pdf"));
        TempResourceManager::release_async(&temp_dir.path().join("never-existed.pdf")).await;
    }

    #[tokio::test]
    async fn test_explicit_release_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = TempResourceManager::new(temp_dir.path(), "pdf");
        let artifact = manager.allocate("output", RequestId::new());
        tokio::fs::write(artifact.path(), b"%PDF-1.4").await.unwrap();
        let path = artifact.path().to_path_buf();

        artifact.release().await;

        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_release_failure_is_swallowed() {
        let temp_dir = TempDir::new().unwrap();
        // A directory cannot be removed with remove_file
        let blocker = temp_dir.path().join("blocker.pdf");
        std::fs::create_dir(&blocker).unwrap();
        TempResourceManager::release(&blocker);
        assert!(blocker.exists());
    }

    #[tokio::test]
    async fn test_concurrent_allocations_are_unique() {
        let temp_dir = TempDir::new().unwrap();
        let manager = Arc::new(TempResourceManager::new(temp_dir.path(), "pdf"));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                (0..64)
                    .map(|_| {
                        let artifact = manager.allocate("input", RequestId::new());
                        artifact.path().to_path_buf()
                    })
                    .collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for path in handle.await.unwrap() {
                assert!(seen.insert(path), "duplicate scratch path");
            }
        }
        assert_eq!(seen.len(), 16 * 64);
    }
}
