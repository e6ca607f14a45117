//! Error types for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: every failure the handshake, fetch and validation layers classify
//! - [`MalformedResponse`]: the distinct ways a quote response body can be unusable
//! - [`UpdateFailed`]: what a refresh cycle reports to its caller

use thiserror::Error;

/// Errors that can occur during market data operations.
///
/// Transport failures are classified at the point they happen; nothing leaves
/// the provider as a raw `reqwest` error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    /// The initial navigation returned a non-success status.
    #[error("Navigation failed with status {status}")]
    NavigationFailed {
        /// HTTP status of the navigation response
        status: u16,
    },

    /// The consent form submission returned a non-success status.
    #[error("Consent submission failed with status {status}")]
    ConsentFailed {
        /// HTTP status of the consent POST
        status: u16,
    },

    /// Consent was requested again right after it had been submitted.
    #[error("Consent requested again after submission")]
    ConsentLoopDetected,

    /// The crumb endpoint did not hand out a crumb.
    #[error("Crumb unavailable: status {status}")]
    CrumbUnavailable {
        /// HTTP status of the crumb response
        status: u16,
    },

    /// The request timed out or never reached the endpoint.
    #[error("Network error: {message}")]
    Network {
        /// Description of the transport failure
        message: String,
    },

    /// The quote endpoint answered with a non-success status.
    #[error("HTTP {status}: {}", description.as_deref().unwrap_or("no details"))]
    HttpError {
        /// HTTP status of the response
        status: u16,
        /// `finance.error.code` from the body, when present
        code: Option<String>,
        /// `finance.error.description` from the body, when present
        description: Option<String>,
    },

    /// The response body did not have the expected shape.
    #[error(transparent)]
    MalformedResponse(#[from] MalformedResponse),
}

impl MarketDataError {
    /// Classify a transport error from `reqwest`.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            err.to_string()
        };
        Self::Network { message }
    }

    /// Returns true when the endpoint rejected the request as unauthorized.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::HttpError { code: Some(code), .. } if code == "Unauthorized"
        )
    }
}

/// Ways a quote response can fail validation.
///
/// Each variant is independently triggerable; none of them touch cached data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedResponse {
    /// The body was empty or JSON `null`.
    #[error("No data received")]
    NoData,

    /// The top-level `quoteResponse` object is missing.
    #[error("Data invalid, 'quoteResponse' not found")]
    MissingQuoteResponse,

    /// `quoteResponse.error` is present and not null.
    #[error("Endpoint reported an error: {0}")]
    ReportedError(String),

    /// `quoteResponse.result` is missing.
    #[error("Data invalid, no 'result' found")]
    MissingResult,

    /// `quoteResponse.result` is null.
    #[error("Data invalid, 'result' is null")]
    NullResult,

    /// `quoteResponse.result` is not a list.
    #[error("Data invalid, 'result' is not a list")]
    ResultNotList,

    /// The body could not be decoded as JSON.
    #[error("Response body is not valid JSON: {0}")]
    InvalidJson(String),
}

/// A refresh cycle failed; cached data was left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct UpdateFailed {
    message: String,
    #[source]
    cause: MarketDataError,
}

impl UpdateFailed {
    pub fn new(message: impl Into<String>, cause: MarketDataError) -> Self {
        Self {
            message: message.into(),
            cause,
        }
    }

    /// The classified failure behind this update failure.
    pub fn cause(&self) -> &MarketDataError {
        &self.cause
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<MalformedResponse> for UpdateFailed {
    fn from(err: MalformedResponse) -> Self {
        Self::new(err.to_string(), MarketDataError::MalformedResponse(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_detection() {
        let error = MarketDataError::HttpError {
            status: 401,
            code: Some("Unauthorized".to_string()),
            description: Some("Invalid Crumb".to_string()),
        };
        assert!(error.is_unauthorized());

        let error = MarketDataError::HttpError {
            status: 500,
            code: Some("Internal".to_string()),
            description: None,
        };
        assert!(!error.is_unauthorized());

        let error = MarketDataError::HttpError {
            status: 401,
            code: None,
            description: None,
        };
        assert!(!error.is_unauthorized());
    }

    #[test]
    fn test_error_display() {
        let error = MarketDataError::CrumbUnavailable { status: 429 };
        assert_eq!(format!("{}", error), "Crumb unavailable: status 429");

        let error = MarketDataError::HttpError {
            status: 401,
            code: Some("Unauthorized".to_string()),
            description: Some("Invalid Crumb".to_string()),
        };
        assert_eq!(format!("{}", error), "HTTP 401: Invalid Crumb");

        let error = MarketDataError::HttpError {
            status: 502,
            code: None,
            description: None,
        };
        assert_eq!(format!("{}", error), "HTTP 502: no details");

        let error: MarketDataError = MalformedResponse::NullResult.into();
        assert_eq!(format!("{}", error), "Data invalid, 'result' is null");
    }

    #[test]
    fn test_update_failed_from_malformed() {
        let failure = UpdateFailed::from(MalformedResponse::MissingQuoteResponse);
        assert_eq!(failure.message(), "Data invalid, 'quoteResponse' not found");
        assert_eq!(
            failure.cause(),
            &MarketDataError::MalformedResponse(MalformedResponse::MissingQuoteResponse)
        );
    }
}
