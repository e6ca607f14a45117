//! Currency conversion tracking.
//!
//! A symbol configured with a target currency needs the matching conversion
//! pair (`EURUSD=X`) polled alongside it. The pair is only known once the
//! symbol's own quote reports its currency, so tracking hooks into the
//! coordinator's post-cycle notification and adds the pair at runtime.

use crate::config::IntegrationConfig;
use crate::coordinator::{CoordinatorGroups, ListenerId, SymbolUpdateCoordinator};
use crate::reconcile::CONVERSION_SUFFIX;

/// Conversion pseudo-symbol for `from` to `to`, or `None` when no conversion
/// is needed.
pub fn conversion_symbol(from: &str, to: &str) -> Option<String> {
    let from = from.trim().to_uppercase();
    let to = to.trim().to_uppercase();
    if from.is_empty() || to.is_empty() || from == to {
        return None;
    }
    Some(format!("{}{}{}", from, to, CONVERSION_SUFFIX))
}

/// Register conversion tracking on `coordinator` for the given
/// `(symbol, target_currency)` pairs.
pub fn track_conversions(
    coordinator: &SymbolUpdateCoordinator,
    targets: Vec<(String, String)>,
) -> ListenerId {
    let weak = coordinator.downgrade();
    coordinator.add_listener(move || {
        let Some(coordinator) = weak.upgrade() else {
            return;
        };

        for (symbol, target) in &targets {
            let pair = coordinator
                .record(symbol)
                .and_then(|record| record.currency().and_then(|c| conversion_symbol(c, target)));
            if let Some(pair) = pair {
                coordinator.add_symbol(&pair);
            }
        }
    })
}

/// Attach conversion tracking to every group that has symbols with a target
/// currency.
pub fn track_group_conversions(
    groups: &CoordinatorGroups,
    config: &IntegrationConfig,
) -> Vec<ListenerId> {
    groups
        .coordinators()
        .iter()
        .filter_map(|coordinator| {
            let targets: Vec<(String, String)> = coordinator
                .get_symbols()
                .into_iter()
                .filter_map(|symbol| {
                    let target = config.definition(&symbol)?.target_currency.clone()?;
                    Some((symbol, target))
                })
                .collect();

            (!targets.is_empty()).then(|| track_conversions(coordinator, targets))
        })
        .collect()
}
