//! Drives one push event through clone, build and status reporting

use crate::config::{Config, RepoFilter};
use crate::models::error::{GitError, JobError, ValidationError};
use crate::models::types::{
    CommitState, JobReport, PingEvent, PushEvent, PushJob, StatusUpdate, TargetOutcome,
    TargetResult,
};
use crate::services::runner::Runner;
use crate::services::status_reporter::{clone_url, StatusReporter};
use crate::stores::output::OutputStore;
use crate::utils::metrics::Metrics;
use crate::utils::targets::TargetParser;
use crate::utils::workspace::WorkspaceManager;
use chrono::Utc;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const TARGET_RULE: &str = "-------";
const TARGET_FOOTER: &str = "=======\n";

/// The job-level knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub repository: RepoFilter,
    pub default_ref: String,
    pub build_tool: String,
    pub primary_target: String,
    pub target_marker: String,
    pub clone_base_url: String,
}

impl JobSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            repository: config.jobs.repository_filter(),
            default_ref: config.jobs.default_ref.clone(),
            build_tool: config.jobs.build_tool.clone(),
            primary_target: config.jobs.primary_target.clone(),
            target_marker: config.jobs.target_marker.clone(),
            clone_base_url: config.github.clone_base_url.clone(),
        }
    }
}

pub struct Orchestrator {
    settings: JobSettings,
    parser: TargetParser,
    workspaces: Arc<WorkspaceManager>,
    outputs: Arc<OutputStore>,
    reporter: Arc<dyn StatusReporter>,
    metrics: Option<Arc<Metrics>>,
    clone_token: Option<SecretString>,
}

impl Orchestrator {
    pub fn new(
        settings: JobSettings,
        workspaces: Arc<WorkspaceManager>,
        outputs: Arc<OutputStore>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            parser: TargetParser::new(settings.target_marker.clone()),
            settings,
            workspaces,
            outputs,
            reporter,
            metrics: None,
            clone_token: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_clone_token(mut self, token: Option<SecretString>) -> Self {
        self.clone_token = token;
        self
    }

    pub fn outputs(&self) -> &Arc<OutputStore> {
        &self.outputs
    }

    /// Check that the event carries everything a job needs and targets the
    /// watched repository. Has no side effects.
    pub fn validate(&self, event: &PushEvent) -> Result<PushJob, ValidationError> {
        let repository = event
            .repository
            .as_ref()
            .ok_or(ValidationError::MissingField("repository"))?;
        let head_commit = event
            .head_commit
            .as_ref()
            .ok_or(ValidationError::MissingField("head commit"))?;
        let full_name = repository
            .full_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or(ValidationError::MissingField("repository full name"))?;
        let head = head_commit
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(ValidationError::MissingField("head commit id"))?;

        if !self.settings.repository.accepts(full_name) {
            return Err(ValidationError::RepositoryMismatch(full_name.to_string()));
        }

        Ok(PushJob {
            head: head.to_string(),
            repo_full_name: full_name.to_string(),
            git_ref: event
                .git_ref
                .clone()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| "HEAD".to_string()),
            message: head_commit.message.clone().unwrap_or_default(),
        })
    }

    pub async fn on_ping(&self, event: PingEvent) {
        info!(
            hook_id = ?event.hook_id,
            zen = event.zen.as_deref().unwrap_or_default(),
            "Received ping event"
        );
    }

    /// Run the whole job for one push. Build failures are part of the
    /// returned report; only invalid events and workspace failures are
    /// errors. The workspace is removed on every path.
    #[instrument(skip(self, event))]
    pub async fn on_push(&self, event: PushEvent) -> Result<JobReport, JobError> {
        info!("Received push event");
        let job = self.validate(&event)?;
        info!(
            job_id = %job.head,
            repo = %job.repo_full_name,
            git_ref = %job.git_ref,
            "Starting job"
        );

        let started_at = Utc::now();
        if let Some(metrics) = &self.metrics {
            metrics.record_job_start();
        }

        let runner = self.workspaces.allocate();
        let result = self.execute(&runner, &job).await;
        runner.cleanup().await;

        let finished_at = Utc::now();
        let outcome = match &result {
            Ok(targets) if targets.iter().all(TargetResult::succeeded) => "success",
            Ok(_) => "failure",
            Err(_) => "error",
        };
        if let Some(metrics) = &self.metrics {
            let elapsed = (finished_at - started_at).to_std().unwrap_or_default();
            metrics.record_job_complete(outcome, elapsed.as_secs_f64());
        }
        info!(job_id = %job.head, outcome, "Job finished");

        let targets = result?;
        Ok(JobReport {
            job_id: job.head,
            started_at,
            finished_at,
            targets,
        })
    }

    async fn execute(&self, runner: &Runner, job: &PushJob) -> Result<Vec<TargetResult>, GitError> {
        let url = clone_url(
            &self.settings.clone_base_url,
            &job.repo_full_name,
            self.clone_token.as_ref(),
        );

        if let Err(e) = runner.clone_repo(&url, &job.git_ref).await {
            return Err(self.abort(job, "Failed to clone repo", e).await);
        }
        if let Err(e) = runner.checkout(&job.head).await {
            return Err(self.abort(job, "Failed to checkout head", e).await);
        }

        let primary = self.run_target(runner, job, &self.settings.primary_target).await;
        let primary_ok = primary.succeeded();
        let mut results = vec![primary];

        if !primary_ok {
            info!(job_id = %job.head, "Primary target failed, skipping extra targets");
            return Ok(results);
        }
        if job.git_ref != self.settings.default_ref {
            return Ok(results);
        }

        let targets = self.parser.parse(&job.message);
        if !targets.is_empty() {
            info!(job_id = %job.head, ?targets, "Running commit message targets");
        }
        for target in &targets {
            results.push(self.run_target(runner, job, target).await);
        }

        Ok(results)
    }

    async fn abort(&self, job: &PushJob, what: &str, error: GitError) -> GitError {
        warn!(job_id = %job.head, error = %error, "{}", what);
        self.outputs
            .add_output(job.job_id(), format!("{}: {}", what, error));
        self.report(job, &self.settings.primary_target, CommitState::Failure)
            .await;
        error
    }

    async fn run_target(&self, runner: &Runner, job: &PushJob, target: &str) -> TargetResult {
        let job_id = job.job_id();
        self.report(job, target, CommitState::Pending).await;

        self.outputs
            .add_output(job_id, format!("TARGET: {}\n{}\n", target, TARGET_RULE));
        let outputs = &self.outputs;
        let result = runner
            .watch_fn(
                |line| {
                    outputs.add_output(job_id, line);
                    Ok(())
                },
                &self.settings.build_tool,
                &[target],
            )
            .await;
        if let Err(e) = &result {
            self.outputs
                .add_output(job_id, format!("{}\n{}", TARGET_RULE, e));
        }
        self.outputs.add_output(job_id, TARGET_FOOTER);

        let outcome = match &result {
            Ok(()) => {
                info!(job_id = %job_id, target = %target, "Target succeeded");
                TargetOutcome::Success
            }
            Err(e) => {
                info!(job_id = %job_id, target = %target, error = %e, "Target failed");
                TargetOutcome::Failure
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_target(outcome.as_str());
        }

        let reported = self.report(job, target, outcome.into()).await;
        TargetResult {
            target: target.to_string(),
            outcome,
            reported,
        }
    }

    /// Best effort: failures are logged and counted, never propagated.
    async fn report(&self, job: &PushJob, target: &str, state: CommitState) -> bool {
        let update = StatusUpdate {
            repo_full_name: job.repo_full_name.clone(),
            commit_id: job.head.clone(),
            job_id: job.head.clone(),
            state,
            target: target.to_string(),
        };

        match self.reporter.report(&update).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    job_id = %job.head,
                    target = %target,
                    state = %state,
                    error = %e,
                    "Failed to report status"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_report_error();
                }
                false
            }
        }
    }
}
