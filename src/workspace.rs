//! Isolated workspace directories
//!
//! A workspace is a throwaway directory the CLI runs in, seeded with copies
//! of caller-supplied files. Directories live under a configurable base path
//! and are created owner-only. Cleanup is idempotent: removing a workspace
//! that is already gone is not an error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::Mutex;

use crate::config::ClaudeConfig;
use crate::error::{ClaudeError, Result};
use crate::types::{WorkspaceId, WorkspaceInfo};

/// Manager for workspace directories
pub struct WorkspaceManager {
    base_path: PathBuf,
    workspaces: Mutex<HashMap<WorkspaceId, WorkspaceInfo>>,
}

impl WorkspaceManager {
    /// Create a manager rooted at the configured base path, or a
    /// subdirectory of the system temp dir when none is configured
    #[must_use]
    pub fn new(config: &ClaudeConfig) -> Self {
        let base_path = config
            .workspace_base_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("claude-workspaces"));
        Self {
            base_path,
            workspaces: Mutex::new(HashMap::new()),
        }
    }

    /// Base directory workspaces are created under
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Create a workspace and copy the given files into it.
    ///
    /// Copied files keep their names but not their directory structure. The
    /// workspace directory is created with owner-only permissions.
    pub async fn create(&self, files: &[PathBuf]) -> Result<WorkspaceInfo> {
        let workspace_id = WorkspaceId::generate();
        let path = self.base_path.join(format!("ws-{workspace_id}"));

        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|err| creation_error(&path, &err))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o700))
                .await
                .map_err(|err| creation_error(&path, &err))?;
        }

        let mut size_bytes = 0u64;
        let mut file_count = 0u64;
        for source in files {
            let Some(name) = source.file_name() else {
                return Err(ClaudeError::WorkspaceCreation {
                    path: path.clone(),
                    reason: format!("source `{}` has no file name", source.display()),
                });
            };
            let dest = path.join(name);
            tokio::fs::copy(source, &dest)
                .await
                .map_err(|err| creation_error(&path, &err))?;
            let meta = tokio::fs::metadata(&dest)
                .await
                .map_err(|err| creation_error(&path, &err))?;
            size_bytes += meta.len();
            file_count += 1;
        }

        let info = WorkspaceInfo {
            workspace_id: workspace_id.clone(),
            path,
            created_at: Utc::now(),
            size_bytes,
            file_count,
        };

        log::info!(
            "Created workspace {workspace_id} at {} ({file_count} file(s), {size_bytes} bytes)",
            info.path.display()
        );
        self.workspaces
            .lock()
            .await
            .insert(workspace_id, info.clone());
        Ok(info)
    }

    /// Look up a tracked workspace
    pub async fn get(&self, workspace_id: &WorkspaceId) -> Option<WorkspaceInfo> {
        self.workspaces.lock().await.get(workspace_id).cloned()
    }

    /// List tracked workspaces
    pub async fn list(&self) -> Vec<WorkspaceInfo> {
        self.workspaces.lock().await.values().cloned().collect()
    }

    /// Remove a workspace directory and stop tracking it.
    ///
    /// Unknown IDs and already-deleted directories succeed silently.
    pub async fn cleanup(&self, workspace_id: &WorkspaceId) -> Result<()> {
        let info = self.workspaces.lock().await.remove(workspace_id);
        let Some(info) = info else {
            return Ok(());
        };
        remove_dir(&info.path).await?;
        log::info!("Removed workspace {workspace_id}");
        Ok(())
    }

    /// Remove every tracked workspace. Continues past individual failures
    /// and reports the first one.
    pub async fn cleanup_all(&self) -> Result<()> {
        let drained: Vec<WorkspaceInfo> = {
            let mut workspaces = self.workspaces.lock().await;
            workspaces.drain().map(|(_, info)| info).collect()
        };

        let mut first_error = None;
        for info in drained {
            if let Err(err) = remove_dir(&info.path).await {
                log::warn!(
                    "Failed to remove workspace {}: {err}",
                    info.workspace_id
                );
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn remove_dir(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ClaudeError::WorkspaceCleanup {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }),
    }
}

fn creation_error(path: &Path, err: &std::io::Error) -> ClaudeError {
    ClaudeError::WorkspaceCreation {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(base: &Path) -> WorkspaceManager {
        let config = ClaudeConfig::builder().workspace_base_path(base).build();
        WorkspaceManager::new(&config)
    }

    #[tokio::test]
    async fn create_copies_files_and_counts_them() {
        let base = tempfile::tempdir().unwrap();
        let source = base.path().join("input.txt");
        tokio::fs::write(&source, b"hello workspace").await.unwrap();

        let manager = manager(base.path());
        let info = manager.create(&[source]).await.unwrap();

        assert_eq!(info.file_count, 1);
        assert_eq!(info.size_bytes, 15);
        let copied = tokio::fs::read_to_string(info.path.join("input.txt"))
            .await
            .unwrap();
        assert_eq!(copied, "hello workspace");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn workspace_directory_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let base = tempfile::tempdir().unwrap();
        let manager = manager(base.path());
        let info = manager.create(&[]).await.unwrap();

        let mode = tokio::fs::metadata(&info.path)
            .await
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let base = tempfile::tempdir().unwrap();
        let manager = manager(base.path());
        let info = manager.create(&[]).await.unwrap();

        manager.cleanup(&info.workspace_id).await.unwrap();
        assert!(!info.path.exists());
        manager.cleanup(&info.workspace_id).await.unwrap();

        let unknown = WorkspaceId::generate();
        manager.cleanup(&unknown).await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_all_removes_every_workspace() {
        let base = tempfile::tempdir().unwrap();
        let manager = manager(base.path());
        let a = manager.create(&[]).await.unwrap();
        let b = manager.create(&[]).await.unwrap();
        assert_eq!(manager.list().await.len(), 2);

        manager.cleanup_all().await.unwrap();
        assert!(!a.path.exists());
        assert!(!b.path.exists());
        assert!(manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn create_rejects_source_without_file_name() {
        let base = tempfile::tempdir().unwrap();
        let manager = manager(base.path());
        let err = manager.create(&[PathBuf::from("/")]).await.unwrap_err();
        assert!(matches!(err, ClaudeError::WorkspaceCreation { .. }));
    }
}
