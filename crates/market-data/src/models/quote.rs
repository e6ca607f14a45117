use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::fields::{
    CURRENCY, DATE_FIELDS, NUMERIC_FIELDS, REGULAR_MARKET_PRICE, SHORT_NAME, STRING_FIELDS,
};

/// A single parsed field value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

/// Parsed quote fields for one symbol from one refresh cycle.
///
/// Numeric fields are always present (missing ones default to 0). Date and
/// string fields are only present when the endpoint sent them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl QuoteRecord {
    /// Build a record from one raw result object.
    pub fn from_raw(raw: &Map<String, Value>) -> Self {
        let mut fields = BTreeMap::new();

        for key in NUMERIC_FIELDS {
            let value = raw.get(*key).and_then(Value::as_f64).unwrap_or(0.0);
            fields.insert(key.to_string(), FieldValue::Number(value));
        }

        for key in DATE_FIELDS {
            if let Some(value) = raw.get(*key).and_then(Value::as_f64) {
                fields.insert(key.to_string(), FieldValue::Number(value));
            }
        }

        for key in STRING_FIELDS {
            if let Some(value) = raw.get(*key).and_then(Value::as_str) {
                fields.insert(key.to_string(), FieldValue::Text(value.to_string()));
            }
        }

        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.fields.get(key) {
            Some(FieldValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(FieldValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Read an epoch-second field as a UTC timestamp.
    pub fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        let seconds = self.number(key)?;
        Utc.timestamp_opt(seconds as i64, 0).single()
    }

    pub fn regular_market_price(&self) -> f64 {
        self.number(REGULAR_MARKET_PRICE).unwrap_or_default()
    }

    pub fn short_name(&self) -> Option<&str> {
        self.text(SHORT_NAME)
    }

    pub fn currency(&self) -> Option<&str> {
        self.text(CURRENCY)
    }
}
