use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the loan review workflow
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoanReviewConfig {
    /// Synchronous callback bridge settings
    pub callback: CallbackConfig,
    /// External workflow engine settings
    pub orchestration: OrchestrationConfig,
    /// Outbound notification settings
    pub notifications: NotificationConfig,
    /// Downstream PPA integration
    pub integration: IntegrationConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
    /// Database settings (optional)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CallbackConfig {
    /// How long an API call waits for the workflow engine
    pub timeout_seconds: u64,
    /// Upper bound for any per-call timeout
    pub max_timeout_seconds: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 5,
            max_timeout_seconds: 30,
        }
    }
}

impl CallbackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_secs(self.max_timeout_seconds.max(self.timeout_seconds))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Identifier of the workflow definition executions are started from
    pub state_machine_id: String,
    /// Prefix of generated execution names
    pub execution_name_prefix: String,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            state_machine_id: "ldc-loan-review-workflow".to_string(),
            execution_name_prefix: "ldc-loan-review".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Sender address stamped on outbound notifications
    pub sender: Option<String>,
    /// Recipient selector -> address
    pub recipients: HashMap<String, String>,
    /// Template name -> body overriding the built-in template
    pub templates: HashMap<String, String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            sender: None,
            recipients: HashMap::from([
                ("repurchase".to_string(), "loan-review-team@example.com".to_string()),
                ("reclass".to_string(), "loan-review-team@example.com".to_string()),
            ]),
            templates: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// PPA endpoint; publishing is skipped when unset
    pub ppa_endpoint: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            ppa_endpoint: None,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON structured logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://.loan-review/workflows.db".to_string(),
            max_connections: 10,
            auto_migrate: true,
        }
    }
}

impl LoanReviewConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (loan-review.toml, .loan-review-rc)
    /// 3. Environment variables (LOAN_REVIEW_CALLBACK__TIMEOUT_SECONDS=10)
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Same as [`load`](Self::load) with an extra, mandatory file layered over the defaults
    pub fn load_with(extra_file: Option<&Path>) -> Result<Self> {
        let mut builder =
            Config::builder().add_source(Config::try_from(&LoanReviewConfig::default())?);

        if Path::new("loan-review.toml").exists() {
            builder = builder.add_source(File::with_name("loan-review"));
        }

        if Path::new(".loan-review-rc").exists() {
            builder = builder.add_source(File::with_name(".loan-review-rc").format(::config::FileFormat::Toml));
        }

        if let Some(path) = extra_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("LOAN_REVIEW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to assemble configuration")?;
        let loan_review_config: LoanReviewConfig = config
            .try_deserialize()
            .context("Invalid loan review configuration")?;

        Ok(loan_review_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<LoanReviewConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = LoanReviewConfig::load_env_file();
        LoanReviewConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static LoanReviewConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}
