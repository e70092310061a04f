//! Application initialization and setup

use jarvis_ci::config::Config;
use jarvis_ci::middleware::signature::HubSignature;
use jarvis_ci::models::error::StartupError;
use jarvis_ci::routes::api::AppState;
use jarvis_ci::services::maintenance::Maintenance;
use jarvis_ci::services::orchestrator::{JobSettings, Orchestrator};
use jarvis_ci::services::scheduler::JobScheduler;
use jarvis_ci::services::status_reporter::GithubStatusReporter;
use jarvis_ci::stores::output::OutputStore;
use jarvis_ci::utils::metrics::Metrics;
use jarvis_ci::utils::workspace::{SequentialIds, WorkspaceManager};
use secrecy::SecretString;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Application components
pub struct App {
    pub scheduler: Arc<JobScheduler>,
    pub outputs: Arc<OutputStore>,
    pub workspace_manager: Arc<WorkspaceManager>,
    pub metrics: Arc<Metrics>,
    pub signature: HubSignature,
}

impl App {
    /// Initialize application components
    pub async fn initialize(config: &Config) -> Result<Self, StartupError> {
        let capacity = NonZeroUsize::new(config.output.cache_size).ok_or_else(|| {
            StartupError::InvalidConfig("output.cache_size must be greater than zero".to_string())
        })?;

        let token = match read_secret(&config.github.token_path).await {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("Failed to read token, status reports will be anonymous: {}", e);
                None
            }
        };
        let hub_secret = read_secret(&config.github.hub_secret_path).await?;
        let signature = HubSignature::new(&hub_secret)
            .map_err(|e| StartupError::InvalidConfig(format!("hub secret: {}", e)))?;

        let metrics = Arc::new(Metrics::new()?);
        let outputs = Arc::new(OutputStore::new(capacity));
        let workspace_manager = Arc::new(WorkspaceManager::new(
            config.jobs.workspace_root.clone(),
            Arc::new(SequentialIds::new()),
        ));
        let reporter = Arc::new(GithubStatusReporter::new(&config.github, token.clone())?);

        let orchestrator = Orchestrator::new(
            JobSettings::from_config(config),
            Arc::clone(&workspace_manager),
            Arc::clone(&outputs),
            reporter,
        )
        .with_metrics(Arc::clone(&metrics))
        .with_clone_token(token);

        let scheduler = Arc::new(JobScheduler::new(Arc::new(orchestrator)));

        Ok(App {
            scheduler,
            outputs,
            workspace_manager,
            metrics,
            signature,
        })
    }

    pub fn state(&self) -> AppState {
        AppState {
            scheduler: Arc::clone(&self.scheduler),
            outputs: Arc::clone(&self.outputs),
            signature: self.signature.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }

    pub fn maintenance(&self, config: &Config) -> Arc<Maintenance> {
        Arc::new(Maintenance::new(
            Arc::clone(&self.workspace_manager),
            config.maintenance.clone(),
        ))
    }
}

async fn read_secret(path: &Path) -> Result<SecretString, StartupError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StartupError::Secret {
            path: path.display().to_string(),
            source,
        })?;
    Ok(SecretString::new(raw.trim().to_string()))
}

/// Log the effective configuration, secrets excluded.
pub fn print_config(config: &Config) {
    info!("Server address: {}:{}", config.server.host, config.server.port);
    info!("Base path: {}", config.server.base_path);
    info!("Token path: {}", config.github.token_path.display());
    info!("Hub secret path: {}", config.github.hub_secret_path.display());
    info!("Repository full name: {}", config.jobs.repository);
    info!("Default ref: {}", config.jobs.default_ref);
    info!(
        "Primary target: {} {}",
        config.jobs.build_tool, config.jobs.primary_target
    );
    info!("Workspace root: {}", config.jobs.workspace_root.display());
    info!("Output cache size: {}", config.output.cache_size);
}
