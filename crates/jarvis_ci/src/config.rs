use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/jarvis-ci/config.yaml";

/// Sentinel accepted in `jobs.repository` meaning "build any repository".
pub const REPONAME_ANY: &str = "ANY";

// Custom deserializer for Duration that accepts integer seconds
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub github: GithubConfig,
    pub jobs: JobsConfig,
    pub output: OutputConfig,
    pub maintenance: MaintenanceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root path of the webhook, output and debug routes.
    pub base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            base_path: "/jarvis-ci".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_url: String,
    pub clone_base_url: String,
    pub token_path: PathBuf,
    pub hub_secret_path: PathBuf,
    /// Prefix of the link attached to every status; the job id is appended.
    pub output_uri: String,
    pub context_prefix: String,
    #[serde(rename = "timeout_secs", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            clone_base_url: "https://github.com".to_string(),
            token_path: PathBuf::from("/jarvis-ci/token"),
            hub_secret_path: PathBuf::from("/jarvis-ci/hubsecret"),
            output_uri: "https://jarvisci.org/outputs/".to_string(),
            context_prefix: "jarvis-ci".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Full name of the watched repository, or [`REPONAME_ANY`].
    pub repository: String,
    /// Ref whose pushes also run the commit-message targets.
    pub default_ref: String,
    pub build_tool: String,
    pub primary_target: String,
    pub target_marker: String,
    pub workspace_root: PathBuf,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            repository: REPONAME_ANY.to_string(),
            default_ref: "refs/heads/master".to_string(),
            build_tool: "make".to_string(),
            primary_target: "jarvis-ci-test".to_string(),
            target_marker: "JARVIS:".to_string(),
            workspace_root: std::env::temp_dir(),
        }
    }
}

impl JobsConfig {
    pub fn repository_filter(&self) -> RepoFilter {
        RepoFilter::parse(&self.repository)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoFilter {
    Any,
    Only(String),
}

impl RepoFilter {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == REPONAME_ANY {
            RepoFilter::Any
        } else {
            RepoFilter::Only(raw.to_string())
        }
    }

    pub fn accepts(&self, full_name: &str) -> bool {
        match self {
            RepoFilter::Any => true,
            RepoFilter::Only(name) => name == full_name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Number of job outputs kept in the LRU cache.
    pub cache_size: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { cache_size: 20 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    #[serde(rename = "interval_secs", deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    #[serde(rename = "workspace_max_age_secs", deserialize_with = "deserialize_duration")]
    pub workspace_max_age: Duration,
    /// Extra housekeeping command, e.g. `["/bin/bash", "/dockerclean.sh", "old", "2"]`.
    pub command: Vec<String>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30 * 60),
            workspace_max_age: Duration::from_secs(24 * 3600),
            command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let config_path = path.unwrap_or(DEFAULT_CONFIG_PATH);
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("JARVIS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_yields_defaults() {
        let config: Config = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.jobs.default_ref, "refs/heads/master");
        assert_eq!(config.jobs.build_tool, "make");
        assert_eq!(config.output.cache_size, 20);
        assert_eq!(config.jobs.repository_filter(), RepoFilter::Any);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "jobs:\n  repository: acme/widgets\n  primary_target: check\noutput:\n  cache_size: 5\ngithub:\n  timeout_secs: 7\nmaintenance:\n  enabled: false\n  interval_secs: 90\n  workspace_max_age_secs: 600\n",
        )
        .unwrap();

        let config = Config::load(path.to_str()).unwrap();
        assert_eq!(
            config.jobs.repository_filter(),
            RepoFilter::Only("acme/widgets".to_string())
        );
        assert_eq!(config.jobs.primary_target, "check");
        assert_eq!(config.output.cache_size, 5);
        assert_eq!(config.github.timeout, Duration::from_secs(7));
        assert!(!config.maintenance.enabled);
        assert_eq!(config.maintenance.interval, Duration::from_secs(90));
        assert_eq!(config.maintenance.workspace_max_age, Duration::from_secs(600));
        assert_eq!(config.server.base_path, "/jarvis-ci");
    }

    #[test]
    fn repo_filter_matches_exact_name_only() {
        let any = RepoFilter::parse("ANY");
        assert!(any.accepts("anyone/anything"));

        let only = RepoFilter::parse("acme/widgets");
        assert!(only.accepts("acme/widgets"));
        assert!(!only.accepts("acme/gadgets"));
    }
}
