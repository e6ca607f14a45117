use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use super::{CoordinatorSettings, CoordinatorSnapshot, SymbolUpdateCoordinator};
use crate::config::IntegrationConfig;
use crate::models::QuoteRecord;
use crate::provider::QuoteSource;

/// One coordinator per distinct scan interval, sharing a single quote source.
pub struct CoordinatorGroups {
    coordinators: Vec<SymbolUpdateCoordinator>,
}

impl CoordinatorGroups {
    pub fn new(
        config: &IntegrationConfig,
        source: Arc<dyn QuoteSource>,
        settings: CoordinatorSettings,
    ) -> Self {
        let coordinators = config
            .interval_groups()
            .into_iter()
            .map(|(interval, symbols)| {
                SymbolUpdateCoordinator::new(
                    format!("quotes-{}", interval),
                    symbols,
                    interval,
                    source.clone(),
                    settings.clone(),
                )
            })
            .collect();

        Self { coordinators }
    }

    pub fn coordinators(&self) -> &[SymbolUpdateCoordinator] {
        &self.coordinators
    }

    pub fn is_empty(&self) -> bool {
        self.coordinators.is_empty()
    }

    /// Coordinator currently tracking `symbol`, including symbols added at runtime.
    pub fn coordinator_for(&self, symbol: &str) -> Option<&SymbolUpdateCoordinator> {
        let symbol = symbol.trim().to_uppercase();
        self.coordinators
            .iter()
            .find(|c| c.get_symbols().contains(&symbol))
    }

    pub fn record(&self, symbol: &str) -> Option<QuoteRecord> {
        let symbol = symbol.trim().to_uppercase();
        self.coordinators.iter().find_map(|c| c.record(&symbol))
    }

    pub fn snapshots(&self) -> Vec<CoordinatorSnapshot> {
        self.coordinators.iter().map(|c| c.snapshot()).collect()
    }

    /// Run the first cycle of every group concurrently.
    ///
    /// Failures are logged and left to the per-group retry schedule.
    pub async fn start(&self) {
        let results = join_all(self.coordinators.iter().map(|c| c.refresh())).await;
        let failed = results.iter().filter(|r| r.is_err()).count();

        if failed > 0 {
            warn!(
                "{} of {} quote groups failed their first update",
                failed,
                results.len()
            );
        } else {
            info!("Started {} quote groups", results.len());
        }
    }

    /// Request a refresh of every group.
    pub async fn refresh_all(&self) {
        join_all(self.coordinators.iter().map(|c| c.request_refresh())).await;
    }

    pub fn shutdown(&self) {
        for coordinator in &self.coordinators {
            coordinator.shutdown();
        }
    }
}
