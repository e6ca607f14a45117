//! Field tables for quote records.
//!
//! The quote endpoint returns dozens of keys per symbol; these tables pick the
//! ones that are kept and say how a missing value is filled in.

pub const SYMBOL: &str = "symbol";
pub const SHORT_NAME: &str = "shortName";
pub const CURRENCY: &str = "currency";
pub const REGULAR_MARKET_PRICE: &str = "regularMarketPrice";
pub const REGULAR_MARKET_TIME: &str = "regularMarketTime";

/// Numeric fields. A missing value becomes 0.
pub const NUMERIC_FIELDS: &[&str] = &[
    "averageDailyVolume10Day",
    "averageDailyVolume3Month",
    "fiftyDayAverage",
    "fiftyDayAverageChange",
    "fiftyDayAverageChangePercent",
    "preMarketChange",
    "preMarketChangePercent",
    "preMarketPrice",
    "postMarketChange",
    "postMarketChangePercent",
    "postMarketPrice",
    "regularMarketChange",
    "regularMarketChangePercent",
    "regularMarketDayHigh",
    "regularMarketDayLow",
    "regularMarketOpen",
    "regularMarketPreviousClose",
    REGULAR_MARKET_PRICE,
    "regularMarketVolume",
    "twoHundredDayAverage",
    "twoHundredDayAverageChange",
    "twoHundredDayAverageChangePercent",
    "dividendRate",
    "dividendYield",
    "trailingAnnualDividendRate",
    "trailingAnnualDividendYield",
    "fiftyTwoWeekLow",
    "fiftyTwoWeekLowChange",
    "fiftyTwoWeekLowChangePercent",
    "fiftyTwoWeekHigh",
    "fiftyTwoWeekHighChange",
    "fiftyTwoWeekHighChangePercent",
];

/// Epoch-second date fields. A missing value stays missing.
pub const DATE_FIELDS: &[&str] = &[
    "dividendDate",
    "preMarketTime",
    "postMarketTime",
    REGULAR_MARKET_TIME,
];

/// String fields. A missing value stays missing.
pub const STRING_FIELDS: &[&str] = &[
    CURRENCY,
    "financialCurrency",
    "quoteType",
    "quoteSourceName",
    SHORT_NAME,
    "longName",
    "marketState",
];
