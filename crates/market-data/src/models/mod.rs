//! Core data models for the market data crate.

pub mod fields;
mod interval;
mod quote;

pub use interval::{ScanInterval, DEFAULT_SCAN_INTERVAL, MINIMUM_SCAN_INTERVAL};
pub use quote::{FieldValue, QuoteRecord};

use std::collections::HashMap;

/// Quote records keyed by requested symbol.
pub type QuoteData = HashMap<String, QuoteRecord>;
