use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Push notification as delivered by the webhook. Every field is optional on
/// the wire; `Orchestrator::validate` turns it into a [`PushJob`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub repository: Option<Repository>,
    #[serde(default)]
    pub head_commit: Option<HeadCommit>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeadCommit {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingEvent {
    #[serde(default)]
    pub zen: Option<String>,
    #[serde(default)]
    pub hook_id: Option<u64>,
}

/// A validated push: everything the orchestrator needs to run one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushJob {
    /// Head commit id, doubling as the job id.
    pub head: String,
    pub repo_full_name: String,
    pub git_ref: String,
    pub message: String,
}

impl PushJob {
    pub fn job_id(&self) -> &str {
        &self.head
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Success,
    Failure,
}

impl CommitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Success => "success",
            CommitState::Failure => "failure",
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status report for one target of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub repo_full_name: String,
    pub commit_id: String,
    pub job_id: String,
    pub state: CommitState,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOutcome {
    Success,
    Failure,
}

impl TargetOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetOutcome::Success => "success",
            TargetOutcome::Failure => "failure",
        }
    }
}

impl From<TargetOutcome> for CommitState {
    fn from(outcome: TargetOutcome) -> Self {
        match outcome {
            TargetOutcome::Success => CommitState::Success,
            TargetOutcome::Failure => CommitState::Failure,
        }
    }
}

/// Result of one target attempt. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetResult {
    pub target: String,
    pub outcome: TargetOutcome,
    /// Whether the terminal status reached the status endpoint.
    pub reported: bool,
}

impl TargetResult {
    pub fn succeeded(&self) -> bool {
        self.outcome == TargetOutcome::Success
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub targets: Vec<TargetResult>,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.targets.iter().all(TargetResult::succeeded)
    }

    pub fn duration(&self) -> std::time::Duration {
        self.finished_at
            .signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// One item of a watched command's output sequence.
#[derive(Debug)]
pub enum WatchItem {
    Line(String),
    Error(crate::models::error::RunnerError),
}
