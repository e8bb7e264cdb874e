//! Error types for the EcoFlow power deck.

use thiserror::Error;

/// Title shown while the API client could not be constructed.
pub const API_ERROR_LABEL: &str = "API Error";

/// Title shown when a single poll fails.
pub const CONNECTION_ERROR_LABEL: &str = "Connection\nError";

/// Errors that can occur while fetching and displaying power data.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// EcoFlow API returned an error status code
    #[error("API returned error status {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// EcoFlow accepted the request but answered with a non-zero code
    #[error("EcoFlow rejected request with code {code}: {message}")]
    Vendor {
        /// Vendor result code (`"0"` means success)
        code: String,
        /// Vendor message
        message: String,
    },

    /// Client not configured (missing access or secret key)
    #[error("EcoFlow API not configured (missing {0})")]
    NotConfigured(&'static str),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(String),

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A device did not report a quota we rely on
    #[error("Device {sn} did not report quota {quota}")]
    MissingQuota {
        /// Device serial number
        sn: String,
        /// Quota name, e.g. `20_1.pv1InputWatts`
        quota: String,
    },

    /// A reading was NaN or infinite
    #[error("Invalid {field} reading: {value}")]
    InvalidReading {
        /// Which field carried the bad value
        field: &'static str,
        /// The offending value
        value: f64,
    },

    /// The display sink refused an update
    #[error("Display update failed: {0}")]
    Sink(String),
}

impl Error {
    /// Whether a later poll can be expected to succeed.
    ///
    /// Configuration problems are permanent; everything else is retried
    /// by the next scheduled or user-triggered poll.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Error::NotConfigured(_) | Error::Config(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Request(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
