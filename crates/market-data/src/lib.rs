//! Quotewatch Market Data Crate
//!
//! Polls a Yahoo-finance-style quote endpoint for a configured set of
//! symbols and keeps the latest quote fields for each one.
//!
//! # Architecture
//!
//! ```text
//! +--------------------+     +--------------------+
//! | CoordinatorGroups  | --> | UpdateCoordinator  |  (one per scan interval)
//! +--------------------+     +--------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |   QuoteSource    |  (YahooQuoteFetcher)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          | SessionHandshake |  (cookies, consent, crumb)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |    reconcile     |  (merge into QuoteData)
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`SessionHandshake`] - Shared cookie jar and crumb token
//! - [`YahooQuoteFetcher`] - Authorized quote requests
//! - [`SymbolUpdateCoordinator`] - Polling, retries and merged data
//! - [`QuoteRecord`] - Normalized fields for one symbol
//! - [`IntegrationConfig`] - Symbols, target currencies and scan intervals

pub mod config;
pub mod conversion;
pub mod coordinator;
pub mod errors;
pub mod models;
pub mod provider;
pub mod reconcile;

pub use config::{ConfigError, IntegrationConfig, SymbolDefinition};
pub use conversion::{conversion_symbol, track_conversions, track_group_conversions};
pub use coordinator::{
    CoordinatorGroups, CoordinatorSettings, CoordinatorSnapshot, CyclePhase, ListenerId,
    SymbolUpdateCoordinator, WeakCoordinator,
};
pub use errors::{MalformedResponse, MarketDataError, UpdateFailed};
pub use models::{FieldValue, QuoteData, QuoteRecord, ScanInterval};
pub use provider::yahoo::{SessionHandshake, YahooEndpoints, YahooQuoteFetcher};
pub use provider::QuoteSource;
pub use reconcile::{extract_result, reconcile, Reconciliation};
