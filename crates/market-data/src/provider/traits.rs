//! Quote source trait definition.
//!
//! Coordinators only see this trait, so any source that can turn a symbol
//! list into a quote response body can drive them.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::MarketDataError;

/// Trait for quote sources.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use quotewatch_market_data::provider::QuoteSource;
///
/// struct StaticSource(serde_json::Value);
///
/// #[async_trait]
/// impl QuoteSource for StaticSource {
///     fn id(&self) -> &'static str {
///         "STATIC"
///     }
///
///     async fn fetch(&self, _symbols: &[String]) -> Result<serde_json::Value, MarketDataError> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Unique identifier for this source, used in logs.
    fn id(&self) -> &'static str;

    /// Fetch the raw quote response for `symbols`.
    ///
    /// An empty or `null` body is returned as [`Value::Null`]; validating the
    /// shape of the body is left to the caller.
    async fn fetch(&self, symbols: &[String]) -> Result<Value, MarketDataError>;
}
