use std::process::ExitStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {output}")]
    Exit {
        command: String,
        status: ExitStatus,
        output: String,
    },

    #[error("`{command}` failed with {status}")]
    Failed { command: String, status: ExitStatus },

    #[error("Failed to read output: {0}")]
    Scan(#[source] std::io::Error),

    #[error("Refusing option-like git argument `{0}`")]
    InvalidArgument(String),

    #[error("Output handler failed: {0}")]
    Callback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which git stage failed while materializing a workspace.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to clone {url}: {source}")]
    Clone {
        url: String,
        #[source]
        source: RunnerError,
    },

    #[error("Failed to fetch ref {reference}: {source}")]
    Fetch {
        reference: String,
        #[source]
        source: RunnerError,
    },

    #[error("Failed to checkout {reference}: {source}")]
    Checkout {
        reference: String,
        #[source]
        source: RunnerError,
    },
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing {0}")]
    MissingField(&'static str),

    #[error("Will not handle requests for this repository: {0}")]
    RepositoryMismatch(String),
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid push event: {0}")]
    Validation(#[from] ValidationError),

    #[error("Workspace setup failed: {0}")]
    Workspace(#[from] GitError),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Missing signature header")]
    Missing,

    #[error("Malformed signature: {0}")]
    Malformed(String),

    #[error("Signature does not match payload")]
    Mismatch,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read secret {path}: {source}")]
    Secret {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
