//! Configuration loader and validator for the Fastwork→GitHub sync daemon.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub source: Source,
    pub filter: Filter,
    pub github: Github,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct App {
    pub database_url: String,
    /// Seconds between cycles in `watch` mode.
    pub cycle_interval_secs: u64,
    /// Pause between successive sync-target calls (rate-limit courtesy).
    pub sync_delay_ms: u64,
}

/// Job-board API settings and the category partitions to pull from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub api_base: String,
    pub page_size: u32,
    pub request_timeout_secs: u64,
    pub categories: Vec<Category>,
    /// Keys into `categories`; only these partitions are fetched.
    pub enabled: Vec<String>,
}

/// One category partition on the job board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub key: String,
    /// The board's tag UUID for this category.
    pub id: String,
    pub label: String,
}

/// Budget filtering and run sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Filter {
    /// Minimum derived budget to keep a listing; 0 disables filtering.
    pub min_budget: i64,
    pub currency: String,
    pub max_jobs_per_run: usize,
}

/// GitHub Projects mirroring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Github {
    pub enabled: bool,
    pub token: String,
    /// `https://github.com/users/<owner>/projects/<number>`
    pub project_url: String,
    /// `owner/name` repository receiving high-value issues.
    pub issues_repo: String,
    pub sync_on_fetch: bool,
}

impl Config {
    pub fn enabled_categories(&self) -> Vec<&Category> {
        self.source
            .categories
            .iter()
            .filter(|c| self.source.enabled.iter().any(|k| k == &c.key))
            .collect()
    }

    pub fn category_by_key(&self, key: &str) -> Option<&Category> {
        self.source.categories.iter().find(|c| c.key == key)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.database_url.trim().is_empty() {
        return Err(ConfigError::Invalid("app.database_url must be non-empty"));
    }
    if cfg.app.cycle_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.cycle_interval_secs must be > 0"));
    }

    if cfg.source.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid("source.api_base must be non-empty"));
    }
    if cfg.source.page_size == 0 {
        return Err(ConfigError::Invalid("source.page_size must be > 0"));
    }
    if cfg.source.categories.is_empty() {
        return Err(ConfigError::Invalid("source.categories must be non-empty"));
    }
    for cat in &cfg.source.categories {
        if cat.key.trim().is_empty() || cat.id.trim().is_empty() || cat.label.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "source.categories entries need key, id, and label",
            ));
        }
    }
    if cfg.source.enabled.is_empty() {
        return Err(ConfigError::Invalid("source.enabled must be non-empty"));
    }
    for key in &cfg.source.enabled {
        if !cfg.source.categories.iter().any(|c| &c.key == key) {
            return Err(ConfigError::Invalid(
                "source.enabled refers to an unknown category key",
            ));
        }
    }

    if cfg.filter.min_budget < 0 {
        return Err(ConfigError::Invalid("filter.min_budget must be >= 0"));
    }
    if cfg.filter.currency.trim().is_empty() {
        return Err(ConfigError::Invalid("filter.currency must be non-empty"));
    }
    if cfg.filter.max_jobs_per_run == 0 {
        return Err(ConfigError::Invalid("filter.max_jobs_per_run must be > 0"));
    }

    if cfg.github.enabled {
        if cfg.github.token.trim().is_empty() {
            return Err(ConfigError::Invalid("github.token must be non-empty"));
        }
        if cfg.github.project_url.trim().is_empty() {
            return Err(ConfigError::Invalid("github.project_url must be non-empty"));
        }
        if cfg.github.issues_repo.split('/').count() != 2
            || cfg.github.issues_repo.split('/').any(|p| p.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "github.issues_repo must look like owner/name",
            ));
        }
    }

    Ok(())
}

/// Example YAML with the board's real category partitions.
pub fn example() -> &'static str {
    r#"app:
  database_url: "sqlite://./data/jobs.db"
  cycle_interval_secs: 300
  sync_delay_ms: 500

source:
  api_base: "https://jobboard-api.fastwork.co/api"
  page_size: 20
  request_timeout_secs: 10
  categories:
    - key: "application_development"
      id: "c82d3ff0-c1c1-4b39-b9e3-124e513eb66c"
      label: "Application Development"
    - key: "web_development"
      id: "4c7ee9da-5509-4ff1-b7c2-df81fb2ef06c"
      label: "Web Development"
    - key: "it_solutions"
      id: "2a0001e2-d5d9-4fb8-92da-f4a805c47044"
      label: "IT Solutions"
    - key: "iot_work"
      id: "9f240bc1-fde2-4217-a5f5-f6fc02ba3f54"
      label: "IoT Work"
  enabled:
    - "application_development"
    - "web_development"
    - "it_solutions"
    - "iot_work"

filter:
  min_budget: 5000
  currency: "THB"
  max_jobs_per_run: 30

github:
  enabled: true
  token: "YOUR_GITHUB_TOKEN"
  project_url: "https://github.com/users/YOUR_LOGIN/projects/1"
  issues_repo: "YOUR_LOGIN/job-board"
  sync_on_fetch: true
"#
}
