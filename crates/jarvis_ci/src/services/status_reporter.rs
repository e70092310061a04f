use crate::config::GithubConfig;
use crate::models::error::ReportError;
use crate::models::types::StatusUpdate;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

/// Publishes commit statuses for job targets.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, update: &StatusUpdate) -> Result<(), ReportError>;
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatusPayload {
    pub state: &'static str,
    pub context: String,
    pub target_url: String,
    pub description: String,
}

/// Commit status client for the GitHub REST API.
pub struct GithubStatusReporter {
    http_client: Client,
    api_url: String,
    output_uri: String,
    context_prefix: String,
    token: Option<SecretString>,
}

impl GithubStatusReporter {
    pub fn new(config: &GithubConfig, token: Option<SecretString>) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("jarvis-ci/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            output_uri: config.output_uri.clone(),
            context_prefix: config.context_prefix.clone(),
            token,
        })
    }

    pub fn payload(&self, update: &StatusUpdate) -> StatusPayload {
        StatusPayload {
            state: update.state.as_str(),
            context: format!("ci/{}/{}", self.context_prefix, update.target),
            target_url: format!("{}{}", self.output_uri, update.job_id),
            description: format!("Makefile target: {}", update.target),
        }
    }

    async fn post_status(&self, update: &StatusUpdate, payload: &StatusPayload) -> Result<(), ReportError> {
        let url = format!(
            "{}/repos/{}/statuses/{}",
            self.api_url, update.repo_full_name, update.commit_id
        );

        let mut request = self
            .http_client
            .post(&url)
            .header("Accept", "application/vnd.github+json")
            .json(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(ReportError::Network)?;

        if !response.status().is_success() {
            return Err(ReportError::Http(response.status().as_u16()));
        }

        info!(
            "Set status of {}/{} to {} (link: {})",
            update.repo_full_name, update.commit_id, update.state, payload.target_url
        );
        Ok(())
    }
}

#[async_trait]
impl StatusReporter for GithubStatusReporter {
    async fn report(&self, update: &StatusUpdate) -> Result<(), ReportError> {
        let payload = self.payload(update);
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match self.post_status(update, &payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    let should_retry = matches!(&e,
                        ReportError::Http(status) if *status == 429 || *status >= 500
                    ) || matches!(&e, ReportError::Network(_));

                    if should_retry && attempt < MAX_RETRIES - 1 {
                        let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                        warn!(
                            job_id = %update.job_id,
                            target = %update.target,
                            attempt = attempt + 1,
                            backoff_ms = backoff.as_millis(),
                            error = %e,
                            "Retrying status report after backoff"
                        );
                        tokio::time::sleep(backoff).await;
                        last_error = Some(e);
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(last_error.unwrap_or(ReportError::Http(500)))
    }
}

/// Clone URL for `full_name`, with the API token as userinfo when present.
pub fn clone_url(base: &str, full_name: &str, token: Option<&SecretString>) -> String {
    let base = base.trim_end_matches('/');
    let base = match token.map(|t| t.expose_secret().trim()) {
        Some(token) if !token.is_empty() => match base.split_once("://") {
            Some((scheme, host)) => format!("{}://{}@{}", scheme, token, host),
            None => base.to_string(),
        },
        _ => base.to_string(),
    };
    format!("{}/{}.git", base, full_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::CommitState;

    fn update(state: CommitState) -> StatusUpdate {
        StatusUpdate {
            repo_full_name: "acme/widgets".to_string(),
            commit_id: "abc123".to_string(),
            job_id: "abc123".to_string(),
            state,
            target: "lint".to_string(),
        }
    }

    #[test]
    fn payload_names_target_and_links_output() {
        let reporter = GithubStatusReporter::new(&GithubConfig::default(), None).unwrap();

        assert_eq!(
            reporter.payload(&update(CommitState::Failure)),
            StatusPayload {
                state: "failure",
                context: "ci/jarvis-ci/lint".to_string(),
                target_url: "https://jarvisci.org/outputs/abc123".to_string(),
                description: "Makefile target: lint".to_string(),
            }
        );
    }

    #[test]
    fn payload_serializes_lowercase_state() {
        let reporter = GithubStatusReporter::new(&GithubConfig::default(), None).unwrap();
        let json = serde_json::to_value(reporter.payload(&update(CommitState::Pending))).unwrap();
        assert_eq!(json["state"], "pending");
    }

    #[test]
    fn clone_url_embeds_token_only_when_present() {
        assert_eq!(
            clone_url("https://github.com", "acme/widgets", None),
            "https://github.com/acme/widgets.git"
        );

        let token = SecretString::new("t0ken\n".to_string());
        assert_eq!(
            clone_url("https://github.com/", "acme/widgets", Some(&token)),
            "https://t0ken@github.com/acme/widgets.git"
        );

        let blank = SecretString::new(String::new());
        assert_eq!(
            clone_url("https://github.com", "acme/widgets", Some(&blank)),
            "https://github.com/acme/widgets.git"
        );
    }
}
