//! Yahoo Finance wire models.
//!
//! Error bodies of the quote endpoint and the hidden inputs of the consent
//! interstitial.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

lazy_static! {
    static ref HIDDEN_INPUT: Regex =
        Regex::new(r#"<input type="hidden" name="(.*?)" value="(.*?)">"#)
            .expect("hidden input pattern is valid");
}

/// Error envelope sent with non-success quote responses
#[derive(Debug, Deserialize)]
pub struct FinanceErrorEnvelope {
    pub finance: FinanceErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct FinanceErrorBody {
    #[serde(default)]
    pub error: Option<FinanceError>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct FinanceError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Extract `finance.error` from a response body, if it has that shape.
pub fn parse_finance_error(body: &str) -> Option<FinanceError> {
    serde_json::from_str::<FinanceErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.finance.error)
}

/// Collect the hidden `<input>` name/value pairs of the consent form.
pub fn hidden_form_fields(html: &str) -> Vec<(String, String)> {
    HIDDEN_INPUT
        .captures_iter(html)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}
