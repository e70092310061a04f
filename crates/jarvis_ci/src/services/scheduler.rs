use crate::models::error::JobError;
use crate::models::types::PushEvent;
use crate::services::orchestrator::Orchestrator;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Runs each accepted push as its own tokio task and keeps track of the
/// ones still in flight.
pub struct JobScheduler {
    orchestrator: Arc<Orchestrator>,
    /// Ticket to job id for every job still in flight.
    current_jobs: Arc<RwLock<HashMap<u64, String>>>,
    next_ticket: AtomicU64,
}

impl JobScheduler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            current_jobs: Arc::new(RwLock::new(HashMap::new())),
            next_ticket: AtomicU64::new(0),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Start processing `event` in the background and return immediately.
    /// Pushes of the same commit may run side by side; each gets its own
    /// workspace.
    pub async fn schedule_push(&self, event: PushEvent) -> u64 {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let job_id = event
            .head_commit
            .as_ref()
            .and_then(|commit| commit.id.clone())
            .unwrap_or_else(|| "<unknown>".to_string());

        let orchestrator = Arc::clone(&self.orchestrator);
        let jobs_for_cleanup = Arc::clone(&self.current_jobs);

        // Hold the lock across the spawn so the task cannot deregister
        // itself before it is registered.
        let mut jobs = self.current_jobs.write().await;
        info!(job_id = %job_id, "Scheduling job ({} active jobs)", jobs.len());

        tokio::spawn(async move {
            // Run the job in its own task so a panic surfaces as a JoinError
            // here and the ticket is still released.
            let outcome = tokio::spawn(async move { orchestrator.on_push(event).await }).await;
            match outcome {
                Ok(Ok(report)) => {
                    info!(
                        job_id = %report.job_id,
                        success = report.succeeded(),
                        targets = report.targets.len(),
                        duration_ms = report.duration().as_millis() as u64,
                        "Job completed"
                    );
                }
                Ok(Err(JobError::Validation(e))) => {
                    warn!(error = %e, "Rejected push event");
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Failed to handle push event");
                }
                Err(e) => {
                    error!(error = %e, "Push job aborted");
                }
            }

            jobs_for_cleanup.write().await.remove(&ticket);
        });

        jobs.insert(ticket, job_id);
        ticket
    }

    pub async fn active_jobs(&self) -> usize {
        self.current_jobs.read().await.len()
    }

    pub async fn active_job_ids(&self) -> Vec<String> {
        let jobs = self.current_jobs.read().await;
        let mut ids: Vec<String> = jobs.values().cloned().collect();
        ids.sort();
        ids
    }

    /// Wait until no job is running, giving up after `max_wait`. Returns
    /// whether every job finished in time.
    pub async fn wait_for_completion(&self, max_wait: Duration) -> bool {
        let start = Instant::now();

        loop {
            let active = self.active_jobs().await;
            if active == 0 {
                return true;
            }

            if start.elapsed() > max_wait {
                warn!("Graceful shutdown timeout: {} jobs still running", active);
                return false;
            }

            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}
