use std::sync::Arc;

use quotewatch_market_data::{
    track_group_conversions, CoordinatorGroups, CoordinatorSettings, IntegrationConfig,
    QuoteSource, SessionHandshake, YahooEndpoints, YahooQuoteFetcher,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub struct AppState {
    pub integration: IntegrationConfig,
    pub groups: CoordinatorGroups,
}

pub fn init_tracing() {
    let log_format = std::env::var("QW_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Build the production state: one shared Yahoo session behind every group.
pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let session = Arc::new(SessionHandshake::new(YahooEndpoints::default())?);
    let source: Arc<dyn QuoteSource> = Arc::new(YahooQuoteFetcher::new(session));
    build_state_with_source(config, source).await
}

/// Build the state on top of an arbitrary quote source and run the first
/// update of every group.
pub async fn build_state_with_source(
    config: &Config,
    source: Arc<dyn QuoteSource>,
) -> anyhow::Result<Arc<AppState>> {
    let integration = config.integration()?;
    tracing::info!(
        "Tracking {} symbols, scan interval {}",
        integration.symbols().len(),
        integration.scan_interval()
    );

    let groups = CoordinatorGroups::new(&integration, source, CoordinatorSettings::default());
    let listeners = track_group_conversions(&groups, &integration);
    if !listeners.is_empty() {
        tracing::debug!("Conversion tracking enabled for {} groups", listeners.len());
    }

    groups.start().await;

    Ok(Arc::new(AppState {
        integration,
        groups,
    }))
}
