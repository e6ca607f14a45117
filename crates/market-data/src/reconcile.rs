//! Response validation and result reconciliation.
//!
//! The endpoint may omit symbols, reorder them, or report a currency pair under
//! a different name (`EUR=X` for a request of `USDEUR=X`). Reconciliation maps
//! whatever came back onto the requested symbols and never drops previously
//! known data for symbols the response did not cover.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info};

use crate::errors::MalformedResponse;
use crate::models::fields::{SHORT_NAME, SYMBOL};
use crate::models::{QuoteData, QuoteRecord};

/// Suffix of currency conversion pseudo-symbols.
pub const CONVERSION_SUFFIX: &str = "=X";

/// Result of reconciling one response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reconciliation {
    /// Some symbol was unexpected or missing.
    pub error_encountered: bool,
    /// Prior data with every matched symbol replaced.
    pub data: QuoteData,
}

/// Validate the response shape and return the raw result list.
pub fn extract_result(json: &Value) -> Result<&[Value], MalformedResponse> {
    if json.is_null() {
        return Err(MalformedResponse::NoData);
    }

    let quote_response = json
        .get("quoteResponse")
        .ok_or(MalformedResponse::MissingQuoteResponse)?;

    if let Some(error) = quote_response.get("error") {
        if !error.is_null() {
            let message = match error {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            return Err(MalformedResponse::ReportedError(message));
        }
    }

    match quote_response.get("result") {
        None => Err(MalformedResponse::MissingResult),
        Some(Value::Null) => Err(MalformedResponse::NullResult),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(MalformedResponse::ResultNotList),
    }
}

/// Derive the canonical conversion symbol from a record's short name.
///
/// Only applies to symbols ending in `=X`; a short name of `"USD/EUR"` yields
/// `USDEUR=X`. Anything else returns `symbol` unchanged.
pub fn fix_conversion_symbol(symbol: &str, record: &Value) -> String {
    if !symbol.ends_with(CONVERSION_SUFFIX) {
        return symbol.to_string();
    }

    let short_name = record.get(SHORT_NAME).and_then(Value::as_str).unwrap_or("");
    let parts: Vec<&str> = short_name.split('/').collect();

    match parts.as_slice() {
        [from, to] if !from.is_empty() && !to.is_empty() => {
            format!("{}{}{}", from, to, CONVERSION_SUFFIX)
        }
        _ => symbol.to_string(),
    }
}

/// Map raw result records onto the requested symbols.
///
/// Starts from `prior`, so symbols missing from the response keep their
/// previous values. Unexpected and missing symbols set `error_encountered`
/// but never fail the reconciliation.
pub fn reconcile(requested: &[String], results: &[Value], prior: QuoteData) -> Reconciliation {
    let mut data = prior;
    let mut outstanding: HashSet<&str> = requested.iter().map(String::as_str).collect();
    let mut error_encountered = false;

    for item in results {
        let Some(received) = item.get(SYMBOL).and_then(Value::as_str) else {
            info!("Received a result without a symbol");
            error_encountered = true;
            continue;
        };

        let symbol = if outstanding.remove(received) {
            received.to_string()
        } else {
            let fixed = fix_conversion_symbol(received, item);
            if fixed != received && outstanding.remove(fixed.as_str()) {
                debug!("Received {} and mapped it to {}", received, fixed);
                fixed
            } else {
                info!("Received unexpected symbol {}", received);
                error_encountered = true;
                continue;
            }
        };

        let record = item
            .as_object()
            .map(QuoteRecord::from_raw)
            .unwrap_or_default();

        debug!("Updated {} to {}", symbol, record.regular_market_price());
        data.insert(symbol, record);
    }

    for symbol in requested.iter().filter(|s| outstanding.contains(s.as_str())) {
        info!("No data received for {}", symbol);
        error_encountered = true;
    }

    Reconciliation {
        error_encountered,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn requested(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn record(price: f64) -> QuoteRecord {
        QuoteRecord::from_raw(
            json!({ "regularMarketPrice": price })
                .as_object()
                .unwrap(),
        )
    }

    #[test]
    fn test_extract_result_shapes() {
        assert_eq!(extract_result(&Value::Null), Err(MalformedResponse::NoData));
        assert_eq!(
            extract_result(&json!({})),
            Err(MalformedResponse::MissingQuoteResponse)
        );
        assert_eq!(
            extract_result(&json!({ "quoteResponse": { "error": "fake error" } })),
            Err(MalformedResponse::ReportedError("fake error".to_string()))
        );
        assert_eq!(
            extract_result(&json!({ "quoteResponse": {} })),
            Err(MalformedResponse::MissingResult)
        );
        assert_eq!(
            extract_result(&json!({ "quoteResponse": { "result": null } })),
            Err(MalformedResponse::NullResult)
        );
        assert_eq!(
            extract_result(&json!({ "quoteResponse": { "result": {} } })),
            Err(MalformedResponse::ResultNotList)
        );
    }

    #[test]
    fn test_extract_result_accepts_null_error() {
        let json = json!({ "quoteResponse": { "error": null, "result": [{ "symbol": "A" }] } });
        assert_eq!(extract_result(&json).unwrap().len(), 1);

        let json = json!({ "quoteResponse": { "result": [] } });
        assert!(extract_result(&json).unwrap().is_empty());
    }

    #[test]
    fn test_extract_result_error_object() {
        let json = json!({ "quoteResponse": { "error": { "code": "x" }, "result": [] } });
        assert_eq!(
            extract_result(&json),
            Err(MalformedResponse::ReportedError(r#"{"code":"x"}"#.to_string()))
        );
    }

    #[test]
    fn test_fix_conversion_symbol() {
        let item = json!({ "symbol": "EUR=X", "shortName": "USD/EUR" });
        assert_eq!(fix_conversion_symbol("EUR=X", &item), "USDEUR=X");

        // Not a conversion symbol
        assert_eq!(fix_conversion_symbol("BABA", &item), "BABA");

        // Short name without exactly two parts
        let item = json!({ "symbol": "EUR=X", "shortName": "EUR" });
        assert_eq!(fix_conversion_symbol("EUR=X", &item), "EUR=X");
        let item = json!({ "symbol": "EUR=X", "shortName": "USD/" });
        assert_eq!(fix_conversion_symbol("EUR=X", &item), "EUR=X");
        let item = json!({ "symbol": "EUR=X", "shortName": "A/B/C" });
        assert_eq!(fix_conversion_symbol("EUR=X", &item), "EUR=X");
        let item = json!({ "symbol": "EUR=X" });
        assert_eq!(fix_conversion_symbol("EUR=X", &item), "EUR=X");
    }

    #[test]
    fn test_all_symbols_matched_in_any_order() {
        let results = vec![
            json!({ "symbol": "B", "regularMarketPrice": 2.0 }),
            json!({ "symbol": "A", "regularMarketPrice": 1.0 }),
        ];

        let outcome = reconcile(&requested(&["A", "B"]), &results, QuoteData::new());

        assert!(!outcome.error_encountered);
        assert_eq!(outcome.data["A"].regular_market_price(), 1.0);
        assert_eq!(outcome.data["B"].regular_market_price(), 2.0);
    }

    #[test]
    fn test_missing_symbol_keeps_prior_data() {
        let mut prior = QuoteData::new();
        prior.insert("A".to_string(), record(1.0));
        prior.insert("B".to_string(), record(2.0));

        let results = vec![json!({ "symbol": "A", "regularMarketPrice": 10.0 })];
        let outcome = reconcile(&requested(&["A", "B"]), &results, prior.clone());

        assert!(outcome.error_encountered);
        assert_eq!(outcome.data["A"].regular_market_price(), 10.0);
        assert_eq!(outcome.data["B"], prior["B"]);
    }

    #[test]
    fn test_missing_symbol_never_seen_stays_absent() {
        let results = vec![json!({ "symbol": "A" })];
        let outcome = reconcile(&requested(&["A", "B"]), &results, QuoteData::new());

        assert!(outcome.error_encountered);
        assert!(outcome.data.contains_key("A"));
        assert!(!outcome.data.contains_key("B"));
    }

    #[test]
    fn test_renamed_conversion_symbol_is_mapped() {
        let results = vec![json!({
            "symbol": "EUR=X",
            "shortName": "USD/EUR",
            "regularMarketPrice": 0.92,
        })];

        let outcome = reconcile(&requested(&["USDEUR=X"]), &results, QuoteData::new());

        assert!(!outcome.error_encountered);
        assert_eq!(outcome.data["USDEUR=X"].regular_market_price(), 0.92);
        assert!(!outcome.data.contains_key("EUR=X"));
    }

    #[test]
    fn test_conversion_symbol_for_other_pair_is_unexpected() {
        let results = vec![json!({ "symbol": "EUR=X", "shortName": "USD/EUR" })];

        let outcome = reconcile(&requested(&["USDCHF=X"]), &results, QuoteData::new());

        assert!(outcome.error_encountered);
        assert!(outcome.data.is_empty());
    }

    #[test]
    fn test_unexpected_symbol_is_not_stored() {
        let results = vec![
            json!({ "symbol": "A" }),
            json!({ "symbol": "ZZZ" }),
        ];

        let outcome = reconcile(&requested(&["A"]), &results, QuoteData::new());

        assert!(outcome.error_encountered);
        assert_eq!(outcome.data.len(), 1);
        assert!(outcome.data.contains_key("A"));
    }

    #[test]
    fn test_duplicate_result_is_unexpected() {
        let results = vec![
            json!({ "symbol": "A", "regularMarketPrice": 1.0 }),
            json!({ "symbol": "A", "regularMarketPrice": 2.0 }),
        ];

        let outcome = reconcile(&requested(&["A"]), &results, QuoteData::new());

        assert!(outcome.error_encountered);
        assert_eq!(outcome.data["A"].regular_market_price(), 1.0);
    }

    #[test]
    fn test_result_without_symbol() {
        let results = vec![json!({ "regularMarketPrice": 1.0 }), json!({ "symbol": "A" })];

        let outcome = reconcile(&requested(&["A"]), &results, QuoteData::new());

        assert!(outcome.error_encountered);
        assert!(outcome.data.contains_key("A"));
    }
}
