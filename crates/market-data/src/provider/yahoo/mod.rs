//! Yahoo Finance quote provider.
//!
//! Fetches the v7 quote endpoint for a list of symbols. Requests are
//! authorized by a [`SessionHandshake`] shared across every caller.

mod models;
mod session;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};
use urlencoding::encode;

use crate::errors::{MalformedResponse, MarketDataError};
use crate::provider::QuoteSource;

pub use models::{hidden_form_fields, parse_finance_error, FinanceError};
pub use session::{
    ConsentNavigation, SessionHandshake, CRUMB_RETRY_DELAY, CRUMB_RETRY_DELAY_RATE_LIMITED,
    REQUEST_TIMEOUT,
};

const PROVIDER_ID: &str = "YAHOO";

// ============================================================================
// Endpoints
// ============================================================================

/// URLs used by the handshake and the quote fetcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YahooEndpoints {
    /// Page visited to obtain cookies.
    pub initial_url: String,
    /// Host of the consent interstitial.
    pub consent_host: String,
    /// Endpoint handing out the crumb.
    pub crumb_url: String,
    /// Quote URL prefix; symbols are appended comma-separated.
    pub quote_url: String,
}

impl Default for YahooEndpoints {
    fn default() -> Self {
        Self {
            initial_url: "https://finance.yahoo.com/quote/NQ%3DF/".to_string(),
            consent_host: "consent.yahoo.com".to_string(),
            crumb_url: "https://query2.finance.yahoo.com/v1/test/getcrumb".to_string(),
            quote_url: "https://query1.finance.yahoo.com/v7/finance/quote?symbols=".to_string(),
        }
    }
}

impl YahooEndpoints {
    /// Same paths rooted at another origin, e.g. a proxy or a mock server.
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            initial_url: format!("{}/quote/", base),
            crumb_url: format!("{}/v1/test/getcrumb", base),
            quote_url: format!("{}/v7/finance/quote?symbols=", base),
            ..Self::default()
        }
    }
}

// ============================================================================
// Quote Fetcher
// ============================================================================

/// Fetches quote responses through a shared session.
pub struct YahooQuoteFetcher {
    session: Arc<SessionHandshake>,
}

impl YahooQuoteFetcher {
    pub fn new(session: Arc<SessionHandshake>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<SessionHandshake> {
        &self.session
    }

    /// Build the quote URL for `symbols`.
    ///
    /// Runs the handshake first when no crumb is held. A missing crumb is
    /// tolerated; the URL is then built without one.
    pub async fn build_request_url(&self, symbols: &[String]) -> String {
        let joined = symbols
            .iter()
            .map(|s| s.to_uppercase())
            .collect::<Vec<_>>()
            .join(",");
        let mut url = format!("{}{}", self.session.endpoints().quote_url, joined);

        match self.session.ensure_crumb().await {
            Some(crumb) => {
                url.push_str("&crumb=");
                url.push_str(&encode(&crumb));
            }
            None => debug!("No crumb available, requesting quotes without one"),
        }

        url
    }

    async fn classify_failure(&self, status: StatusCode, body: &str) -> MarketDataError {
        let finance_error = parse_finance_error(body).unwrap_or_default();
        let error = MarketDataError::HttpError {
            status: status.as_u16(),
            code: finance_error.code,
            description: finance_error.description,
        };

        warn!("Quote request failed: {}", error);

        if error.is_unauthorized() {
            self.session.reset().await;
        }

        error
    }
}

#[async_trait]
impl QuoteSource for YahooQuoteFetcher {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch(&self, symbols: &[String]) -> Result<Value, MarketDataError> {
        let url = self.build_request_url(symbols).await;
        debug!("Requesting data from '{}'", url);

        let response = self
            .session
            .http()
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(MarketDataError::from_transport)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(MarketDataError::from_transport)?;

        if status != StatusCode::OK {
            return Err(self.classify_failure(status, &body).await);
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body)
            .map_err(|e| MalformedResponse::InvalidJson(e.to_string()).into())
    }
}
