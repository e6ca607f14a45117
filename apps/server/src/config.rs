use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;
use quotewatch_market_data::{IntegrationConfig, ScanInterval, SymbolDefinition};

pub struct Config {
    pub listen_addr: SocketAddr,
    pub config_file: Option<PathBuf>,
    pub symbols: Vec<String>,
    pub scan_interval: Option<ScanInterval>,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let listen_addr: SocketAddr = std::env::var("QW_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("Invalid QW_LISTEN_ADDR")?;
        let config_file = std::env::var("QW_CONFIG_FILE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let symbols = split_list(&std::env::var("QW_SYMBOLS").unwrap_or_default());
        let scan_interval = std::env::var("QW_SCAN_INTERVAL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().parse::<ScanInterval>())
            .transpose()
            .map_err(|e| anyhow::anyhow!("Invalid QW_SCAN_INTERVAL: {}", e))?;
        let cors_allow = split_list(
            &std::env::var("QW_CORS_ALLOW_ORIGINS").unwrap_or_else(|_| "*".into()),
        );
        let timeout_ms: u64 = std::env::var("QW_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".into())
            .parse()
            .unwrap_or(30000);

        Ok(Self {
            listen_addr,
            config_file,
            symbols,
            scan_interval,
            cors_allow,
            request_timeout: Duration::from_millis(timeout_ms),
        })
    }

    /// Symbol configuration: the JSON file when one is set, otherwise the
    /// `QW_SYMBOLS` list. `QW_SCAN_INTERVAL` overrides the global interval.
    pub fn integration(&self) -> anyhow::Result<IntegrationConfig> {
        let base = match &self.config_file {
            Some(path) => IntegrationConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => IntegrationConfig::new(
                self.symbols.iter().map(SymbolDefinition::new).collect(),
                ScanInterval::default(),
            ),
        };

        Ok(match self.scan_interval {
            Some(interval) => IntegrationConfig::new(base.symbols().to_vec(), interval),
            None => base,
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
