use crate::services::runner::Runner;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{error, info};

const WORKSPACE_PREFIX: &str = "clone";

/// Source of workspace numbers. Implementations must never hand out the
/// same number twice within one process.
pub trait WorkspaceIds: Send + Sync {
    fn next_id(&self) -> u64;
}

/// Monotonic counter starting at 1.
#[derive(Debug, Default)]
pub struct SequentialIds {
    counter: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            counter: AtomicU64::new(first.saturating_sub(1)),
        }
    }
}

impl WorkspaceIds for SequentialIds {
    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Hands out disjoint workspace directories under one root.
pub struct WorkspaceManager {
    root: PathBuf,
    ids: Arc<dyn WorkspaceIds>,
}

impl WorkspaceManager {
    pub fn new(root: PathBuf, ids: Arc<dyn WorkspaceIds>) -> Self {
        Self { root, ids }
    }

    /// Reserve a fresh workspace path and wrap it in a [`Runner`]. The
    /// directory itself is created by the clone.
    pub fn allocate(&self) -> Runner {
        let id = self.ids.next_id();
        Runner::new(self.root.join(format!("{WORKSPACE_PREFIX}{id}")))
    }

    /// Remove workspace directories left behind by jobs that died without
    /// cleaning up (crash, kill). Only `clone*` entries older than `max_age`
    /// are touched.
    pub async fn sweep_stale(&self, max_age: Duration) -> std::io::Result<usize> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let max_age = chrono::Duration::from_std(max_age).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid duration: {}", e),
            )
        })?;
        let cutoff = Utc::now() - max_age;

        let mut cleaned = 0;
        while let Some(entry) = entries.next_entry().await? {
            let is_workspace = entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix(WORKSPACE_PREFIX))
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
            if !is_workspace {
                continue;
            }

            let metadata = entry.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }

            if let Ok(modified) = metadata.modified() {
                let modified_dt: DateTime<Utc> = modified.into();
                if modified_dt < cutoff {
                    if let Err(e) = fs::remove_dir_all(entry.path()).await {
                        error!("Failed to remove stale workspace {:?}: {}", entry.path(), e);
                    } else {
                        cleaned += 1;
                    }
                }
            }
        }

        if cleaned > 0 {
            info!("Cleaned up {} stale workspaces", cleaned);
        }

        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::Path;

    #[test]
    fn sequential_ids_never_repeat_across_threads() {
        let ids = Arc::new(SequentialIds::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..100).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate workspace id {id}");
            }
        }
        assert_eq!(seen.len(), 800);
    }

    #[test]
    fn allocated_workspaces_are_disjoint() {
        let manager = WorkspaceManager::new(
            PathBuf::from("/srv/ci"),
            Arc::new(SequentialIds::starting_at(7)),
        );

        assert_eq!(manager.allocate().dir(), Path::new("/srv/ci/clone7"));
        assert_eq!(manager.allocate().dir(), Path::new("/srv/ci/clone8"));
    }

    #[tokio::test]
    async fn sweep_removes_only_old_workspace_dirs() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("clone1")).unwrap();
        std::fs::create_dir(root.path().join("unrelated")).unwrap();
        std::fs::write(root.path().join("clone2"), "not a dir").unwrap();

        let manager = WorkspaceManager::new(root.path().to_path_buf(), Arc::new(SequentialIds::new()));

        assert_eq!(manager.sweep_stale(Duration::from_secs(3600)).await.unwrap(), 0);
        assert!(root.path().join("clone1").exists());

        assert_eq!(manager.sweep_stale(Duration::ZERO).await.unwrap(), 1);
        assert!(!root.path().join("clone1").exists());
        assert!(root.path().join("unrelated").exists());
        assert!(root.path().join("clone2").exists());
    }

    #[tokio::test]
    async fn sweep_of_missing_root_is_a_no_op() {
        let manager = WorkspaceManager::new(
            PathBuf::from("/definitely/not/here"),
            Arc::new(SequentialIds::new()),
        );
        assert_eq!(manager.sweep_stale(Duration::ZERO).await.unwrap(), 0);
    }
}
