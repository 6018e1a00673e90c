//! Configuration for the jobwait binary.
//!
//! Loaded from ./jobwait.yml or ~/.config/jobwait/jobwait.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jobwait::backoff::BackoffPolicy;
use jobwait::credentials::{CredentialSource, EnvBinding, EnvCredentialSource};
use jobwait::runner::PollerConfig;
use jobwait::vendors::{DbtConfig, FivetranConfig, dbt::DBT_API_URL, fivetran::FIVETRAN_API_URL};

/// Config file name, both in the working directory and the user config dir.
pub const CONFIG_FILE: &str = "jobwait.yml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// dbt Cloud settings.
    pub dbt: DbtSection,

    /// Fivetran settings.
    pub fivetran: FivetranSection,

    /// Poll loop settings.
    pub poller: PollerSection,

    /// Environment variable names for secrets.
    pub credentials: CredentialsSection,
}

impl Config {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. jobwait.yml in current directory
    /// 3. ~/.config/jobwait/jobwait.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(CONFIG_FILE);
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from {}", CONFIG_FILE);
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load {}: {}", CONFIG_FILE, e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("jobwait").join(CONFIG_FILE);
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.poller.poke_interval_secs == 0 {
            eyre::bail!("poller.poke-interval-secs must be > 0");
        }
        if self.poller.max_run_attempts == 0 {
            eyre::bail!("poller.max-run-attempts must be > 0");
        }
        if self.poller.deadline_secs == Some(0) {
            eyre::bail!("poller.deadline-secs must be > 0 when set");
        }
        if self.poller.backoff.base_ms == 0 {
            eyre::bail!("poller.backoff.base-ms must be > 0");
        }
        if self.dbt.timeout_secs == 0 || self.fivetran.timeout_secs == 0 {
            eyre::bail!("timeout-secs must be > 0");
        }
        Ok(())
    }

    /// Client config for dbt Cloud. When the file leaves the account id
    /// empty it is looked up as `dbt-account` in `source`.
    pub fn dbt_config(&self, source: &dyn CredentialSource) -> DbtConfig {
        let account_id = match &self.dbt.account_id {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => match source.lookup("dbt-account").and_then(|c| c.into_token()) {
                Ok(id) => id,
                Err(e) => {
                    log::warn!("No dbt account id configured: {}", e);
                    String::new()
                }
            },
        };
        DbtConfig {
            base_url: self.dbt.base_url.clone(),
            account_id,
            timeout: Duration::from_secs(self.dbt.timeout_secs),
        }
    }

    pub fn fivetran_config(&self) -> FivetranConfig {
        FivetranConfig {
            base_url: self.fivetran.base_url.clone(),
            timeout: Duration::from_secs(self.fivetran.timeout_secs),
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        let backoff = &self.poller.backoff;
        PollerConfig {
            poke_interval: Duration::from_secs(self.poller.poke_interval_secs),
            backoff: BackoffPolicy {
                base: Duration::from_millis(backoff.base_ms),
                max_delay: backoff.max_delay_secs.map(Duration::from_secs),
                honor_retry_after: backoff.honor_retry_after,
                rate_limit_retries: backoff.rate_limit_retries,
                timeout_retries: backoff.timeout_retries,
                connection_retries: backoff.connection_retries,
                malformed_retries: backoff.malformed_retries,
            },
            deadline: self.poller.deadline_secs.map(Duration::from_secs),
            max_run_attempts: self.poller.max_run_attempts,
        }
    }

    /// Credential source bound to the configured variable names.
    pub fn credential_source(&self) -> EnvCredentialSource {
        let names = &self.credentials;
        EnvCredentialSource::new()
            .bind(
                "dbt",
                EnvBinding::Token {
                    var: names.dbt_token_env.clone(),
                },
            )
            .bind(
                "dbt-account",
                EnvBinding::Token {
                    var: names.dbt_account_env.clone(),
                },
            )
            .bind(
                "fivetran",
                EnvBinding::Basic {
                    user_var: names.fivetran_key_env.clone(),
                    secret_var: names.fivetran_secret_env.clone(),
                },
            )
    }
}

/// dbt Cloud settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DbtSection {
    #[serde(rename = "account-id")]
    pub account_id: Option<String>,

    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for DbtSection {
    fn default() -> Self {
        Self {
            account_id: None,
            base_url: DBT_API_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

/// Fivetran settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FivetranSection {
    #[serde(rename = "base-url")]
    pub base_url: String,

    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for FivetranSection {
    fn default() -> Self {
        Self {
            base_url: FIVETRAN_API_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

/// Poll loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollerSection {
    #[serde(rename = "poke-interval-secs")]
    pub poke_interval_secs: u64,

    /// Stop waiting after this many seconds.
    #[serde(rename = "deadline-secs")]
    pub deadline_secs: Option<u64>,

    #[serde(rename = "max-run-attempts")]
    pub max_run_attempts: u32,

    pub backoff: BackoffSection,
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            poke_interval_secs: 30,
            deadline_secs: None,
            max_run_attempts: 1,
            backoff: BackoffSection::default(),
        }
    }
}

/// Backoff for transient poll failures.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffSection {
    #[serde(rename = "base-ms")]
    pub base_ms: u64,

    #[serde(rename = "max-delay-secs")]
    pub max_delay_secs: Option<u64>,

    #[serde(rename = "honor-retry-after")]
    pub honor_retry_after: bool,

    /// Unbounded when absent.
    #[serde(rename = "rate-limit-retries")]
    pub rate_limit_retries: Option<u32>,

    #[serde(rename = "timeout-retries")]
    pub timeout_retries: Option<u32>,

    #[serde(rename = "connection-retries")]
    pub connection_retries: Option<u32>,

    #[serde(rename = "malformed-retries")]
    pub malformed_retries: Option<u32>,
}

impl Default for BackoffSection {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            base_ms: policy.base.as_millis() as u64,
            max_delay_secs: policy.max_delay.map(|d| d.as_secs()),
            honor_retry_after: policy.honor_retry_after,
            rate_limit_retries: policy.rate_limit_retries,
            timeout_retries: policy.timeout_retries,
            connection_retries: policy.connection_retries,
            malformed_retries: policy.malformed_retries,
        }
    }
}

/// Environment variable names holding secrets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsSection {
    #[serde(rename = "dbt-token-env")]
    pub dbt_token_env: String,

    #[serde(rename = "dbt-account-env")]
    pub dbt_account_env: String,

    #[serde(rename = "fivetran-key-env")]
    pub fivetran_key_env: String,

    #[serde(rename = "fivetran-secret-env")]
    pub fivetran_secret_env: String,
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            dbt_token_env: "DBT_TOKEN".to_string(),
            dbt_account_env: "DBT_ACCOUNT_ID".to_string(),
            fivetran_key_env: "FIVETRAN_API_KEY".to_string(),
            fivetran_secret_env: "FIVETRAN_API_SECRET".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dbt.base_url, DBT_API_URL);
        assert_eq!(config.fivetran.base_url, FIVETRAN_API_URL);
        assert_eq!(config.poller.poke_interval_secs, 30);
        assert_eq!(config.poller.max_run_attempts, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_poller_config_matches_library() {
        let poller = Config::default().poller_config();
        let library = PollerConfig::default();
        assert_eq!(poller.poke_interval, library.poke_interval);
        assert_eq!(poller.backoff, library.backoff);
        assert_eq!(poller.deadline, None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
dbt:
  account-id: "4242"
  timeout-secs: 15
poller:
  poke-interval-secs: 10
  deadline-secs: 600
  max-run-attempts: 3
  backoff:
    base-ms: 500
    rate-limit-retries: 8
"#
        )
        .unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.dbt.account_id.as_deref(), Some("4242"));
        assert_eq!(config.dbt.base_url, DBT_API_URL);

        let dbt = config.dbt_config(&config.credential_source().with_reader(|_| None));
        assert_eq!(dbt.account_id, "4242");
        assert_eq!(dbt.timeout, Duration::from_secs(15));

        let poller = config.poller_config();
        assert_eq!(poller.poke_interval, Duration::from_secs(10));
        assert_eq!(poller.deadline, Some(Duration::from_secs(600)));
        assert_eq!(poller.max_run_attempts, 3);
        assert_eq!(poller.backoff.base, Duration::from_millis(500));
        assert_eq!(poller.backoff.rate_limit_retries, Some(8));
        assert_eq!(poller.backoff.timeout_retries, Some(5));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/jobwait.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "poller: [not, a, map").unwrap();
        assert!(Config::load(Some(&file.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.poller.poke_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.poller.max_run_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.poller.deadline_secs = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.poller.backoff.base_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dbt_account_from_credential_source() {
        let mut config = Config::default();
        config.credentials.dbt_account_env = "MY_ACCOUNT".to_string();
        let source = config.credential_source().with_reader(|key| match key {
            "MY_ACCOUNT" => Some("9001".to_string()),
            _ => None,
        });
        assert_eq!(config.dbt_config(&source).account_id, "9001");

        // File value wins over the source
        config.dbt.account_id = Some("4242".to_string());
        assert_eq!(config.dbt_config(&source).account_id, "4242");

        let empty = Config::default().credential_source().with_reader(|_| None);
        assert_eq!(Config::default().dbt_config(&empty).account_id, "");
    }

    #[test]
    fn test_credential_source_uses_configured_names() {
        let mut config = Config::default();
        config.credentials.dbt_token_env = "MY_DBT".to_string();
        let source = config.credential_source().with_reader(|key| match key {
            "MY_DBT" => Some("tok".to_string()),
            _ => None,
        });

        assert_eq!(source.lookup("dbt").unwrap().into_token().unwrap(), "tok");
        assert!(source.lookup("fivetran").is_err());
    }
}
