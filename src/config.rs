use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 3100,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Deadline applied to engine execution, per query.
    pub query_timeout_seconds: u64,
    /// Cap on entries accepted in a single push request.
    pub max_entries_per_push: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            query_timeout_seconds: 30,
            max_entries_per_push: 10_000,
        }
    }
}

impl LimitsConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            enabled: true,
            endpoint: "/metrics".to_string(),
        }
    }
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("LOG_GATEWAY").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.limits.query_timeout_seconds == 0 {
        anyhow::bail!("limits.query_timeout_seconds must be at least 1");
    }

    if cfg.limits.max_entries_per_push == 0 {
        anyhow::bail!("limits.max_entries_per_push must be at least 1");
    }

    if cfg.server.host.parse::<std::net::IpAddr>().is_err() {
        anyhow::bail!("server.host '{}' is not a valid IP address", cfg.server.host);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = Config::default();
        assert!(validate_config(&cfg).is_ok());
        assert_eq!(cfg.limits.query_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut cfg = Config::default();
        cfg.limits.query_timeout_seconds = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_bad_host_rejected() {
        let mut cfg = Config::default();
        cfg.server.host = "not-an-ip".to_string();
        assert!(validate_config(&cfg).is_err());
    }
}
