//! Symbol configuration and refresh-interval grouping.
//!
//! The configuration itself is owned by the host; this module only gives it a
//! shape, normalises it, and splits the symbols into one group per poll period.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{ScanInterval, MINIMUM_SCAN_INTERVAL};

/// One configured symbol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDefinition {
    pub symbol: String,
    /// Currency the host wants this quote expressed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_currency: Option<String>,
    /// Per-symbol poll period; falls back to the global interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_interval: Option<ScanInterval>,
    #[serde(default)]
    pub no_unit: bool,
}

impl SymbolDefinition {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            target_currency: None,
            scan_interval: None,
            no_unit: false,
        }
    }

    pub fn with_target_currency(mut self, currency: impl Into<String>) -> Self {
        self.target_currency = Some(currency.into());
        self
    }

    pub fn with_scan_interval(mut self, interval: ScanInterval) -> Self {
        self.scan_interval = Some(interval);
        self
    }
}

/// A symbol entry is either a bare ticker or a full definition.
#[derive(Deserialize)]
#[serde(untagged)]
enum SymbolEntry {
    Plain(String),
    Detailed(SymbolDefinition),
}

impl From<SymbolEntry> for SymbolDefinition {
    fn from(entry: SymbolEntry) -> Self {
        match entry {
            SymbolEntry::Plain(symbol) => SymbolDefinition::new(symbol),
            SymbolEntry::Detailed(definition) => definition,
        }
    }
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    symbols: Vec<SymbolEntry>,
    #[serde(default)]
    scan_interval: ScanInterval,
}

/// Errors raised while loading configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Normalised integration configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IntegrationConfig {
    symbols: Vec<SymbolDefinition>,
    scan_interval: ScanInterval,
}

impl<'de> Deserialize<'de> for IntegrationConfig {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawConfig::deserialize(deserializer)?;
        Ok(Self::new(
            raw.symbols.into_iter().map(SymbolDefinition::from).collect(),
            raw.scan_interval,
        ))
    }
}

impl IntegrationConfig {
    /// Build a configuration, normalising symbols and intervals.
    ///
    /// Symbols are upper-cased and de-duplicated (the first definition wins),
    /// and every interval is raised to [`MINIMUM_SCAN_INTERVAL`].
    pub fn new(symbols: Vec<SymbolDefinition>, scan_interval: ScanInterval) -> Self {
        let scan_interval = clamp_interval(scan_interval, "global");
        let mut seen = HashSet::new();
        let mut normalised = Vec::with_capacity(symbols.len());

        for mut definition in symbols {
            definition.symbol = definition.symbol.trim().to_uppercase();
            if definition.symbol.is_empty() || !seen.insert(definition.symbol.clone()) {
                continue;
            }
            definition.target_currency = definition
                .target_currency
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty());
            definition.scan_interval = definition
                .scan_interval
                .map(|interval| clamp_interval(interval, &definition.symbol));
            normalised.push(definition);
        }

        Self {
            symbols: normalised,
            scan_interval,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn symbols(&self) -> &[SymbolDefinition] {
        &self.symbols
    }

    pub fn scan_interval(&self) -> ScanInterval {
        self.scan_interval
    }

    pub fn definition(&self, symbol: &str) -> Option<&SymbolDefinition> {
        self.symbols.iter().find(|d| d.symbol == symbol)
    }

    /// Split symbols into one group per poll period, in first-seen order.
    pub fn interval_groups(&self) -> Vec<(ScanInterval, Vec<String>)> {
        let mut groups: Vec<(ScanInterval, Vec<String>)> = Vec::new();

        for definition in &self.symbols {
            let interval = definition.scan_interval.unwrap_or(self.scan_interval);
            match groups.iter_mut().find(|(i, _)| *i == interval) {
                Some((_, symbols)) => symbols.push(definition.symbol.clone()),
                None => groups.push((interval, vec![definition.symbol.clone()])),
            }
        }

        groups
    }
}

fn clamp_interval(interval: ScanInterval, owner: &str) -> ScanInterval {
    let clamped = interval.clamped(MINIMUM_SCAN_INTERVAL);
    if clamped != interval {
        warn!(
            "Scan interval {} for {} is below the minimum, using {}",
            interval, owner, clamped
        );
    }
    clamped
}
