//! Periodic housekeeping: stale workspaces and an optional cleanup command

use crate::config::MaintenanceConfig;
use crate::utils::workspace::WorkspaceManager;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Maintenance {
    workspaces: Arc<WorkspaceManager>,
    config: MaintenanceConfig,
}

impl Maintenance {
    pub fn new(workspaces: Arc<WorkspaceManager>, config: MaintenanceConfig) -> Self {
        Self { workspaces, config }
    }

    /// One housekeeping pass. Never fails; problems are logged.
    pub async fn run_once(&self) {
        if let Err(e) = self.workspaces.sweep_stale(self.config.workspace_max_age).await {
            warn!("Failed to sweep stale workspaces: {}", e);
        }

        let Some((program, args)) = self.config.command.split_first() else {
            return;
        };

        info!("Running cleanup command `{}`", self.config.command.join(" "));
        match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
        {
            Ok(output) => {
                let mut combined = output.stdout;
                combined.extend_from_slice(&output.stderr);
                let combined = String::from_utf8_lossy(&combined);
                if output.status.success() {
                    info!("Cleanup finished:\n{}", combined.trim_end());
                } else {
                    warn!("Cleanup exited with {}:\n{}", output.status, combined.trim_end());
                }
            }
            Err(e) => warn!("Failed to start cleanup command `{}`: {}", program, e),
        }
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            loop {
                interval.tick().await;
                self.run_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::workspace::SequentialIds;
    use std::time::Duration;

    #[tokio::test]
    async fn run_once_sweeps_and_runs_command() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("clone3")).unwrap();
        let marker = root.path().join("cleaned");

        let maintenance = Maintenance::new(
            Arc::new(WorkspaceManager::new(
                root.path().to_path_buf(),
                Arc::new(SequentialIds::new()),
            )),
            MaintenanceConfig {
                enabled: true,
                interval: Duration::from_secs(60),
                workspace_max_age: Duration::ZERO,
                command: vec!["touch".to_string(), marker.display().to_string()],
            },
        );

        maintenance.run_once().await;

        assert!(!root.path().join("clone3").exists());
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn failing_command_is_not_fatal() {
        let root = tempfile::tempdir().unwrap();
        let maintenance = Maintenance::new(
            Arc::new(WorkspaceManager::new(
                root.path().to_path_buf(),
                Arc::new(SequentialIds::new()),
            )),
            MaintenanceConfig {
                command: vec!["definitely-not-a-real-binary".to_string()],
                ..MaintenanceConfig::default()
            },
        );

        maintenance.run_once().await;
    }
}
