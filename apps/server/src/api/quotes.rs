use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use quotewatch_market_data::{
    models::fields::REGULAR_MARKET_TIME, CoordinatorSnapshot, QuoteRecord, SymbolDefinition,
};
use serde::Serialize;

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SymbolQuote {
    symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_currency: Option<String>,
    /// Unit to display the price in; absent for symbols configured without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    market_time: Option<DateTime<Utc>>,
    /// The last cycle of the owning group failed; `quote` is from an earlier one.
    stale: bool,
    last_updated: Option<DateTime<Utc>>,
    quote: QuoteRecord,
}

async fn list_quotes(State(state): State<Arc<AppState>>) -> Json<Vec<CoordinatorSnapshot>> {
    Json(state.groups.snapshots())
}

async fn get_quote(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> ApiResult<Json<SymbolQuote>> {
    let symbol = symbol.trim().to_uppercase();
    let coordinator = state
        .groups
        .coordinator_for(&symbol)
        .ok_or_else(|| ApiError::NotFound(format!("{} is not tracked", symbol)))?;

    // A failed cycle keeps serving the previous values.
    let quote = coordinator
        .record(&symbol)
        .ok_or_else(|| ApiError::NotFound(format!("{} is unavailable", symbol)))?;

    let definition = state.integration.definition(&symbol);
    Ok(Json(SymbolQuote {
        name: quote.short_name().map(str::to_string),
        target_currency: definition.and_then(|d| d.target_currency.clone()),
        unit: display_unit(definition, &quote),
        market_time: quote.timestamp(REGULAR_MARKET_TIME),
        stale: !coordinator.last_update_success(),
        last_updated: coordinator.last_updated(),
        symbol,
        quote,
    }))
}

/// The target currency when one is configured, else the quote's own currency.
fn display_unit(definition: Option<&SymbolDefinition>, quote: &QuoteRecord) -> Option<String> {
    match definition {
        Some(d) if d.no_unit => None,
        Some(d) if d.target_currency.is_some() => d.target_currency.clone(),
        _ => quote.currency().map(str::to_string),
    }
}

async fn refresh_quotes(State(state): State<Arc<AppState>>) -> StatusCode {
    state.groups.refresh_all().await;
    StatusCode::NO_CONTENT
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/quotes", get(list_quotes))
        .route("/quotes/refresh", post(refresh_quotes))
        .route("/quotes/{symbol}", get(get_quote))
}
