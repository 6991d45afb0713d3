//! Error types for the load generation engine.
//!
//! Defines [`ScenarioError`] for configuration errors (fatal, surfaced before
//! any traffic is generated) and [`TransportError`] for per-request failures
//! that are absorbed into the metrics stream.

/// Errors that occur while reading, parsing, or validating a scenario.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// JSON parse failure -- the scenario file is not valid JSON or does not
    /// match the expected schema (including unsupported HTTP methods).
    #[error("Failed to parse scenario JSON: {source}")]
    Parse {
        #[from]
        source: serde_json::Error,
    },

    /// A stage duration string is not `<int>s`, `<int>m`, `<int>h`, or `<int>`.
    #[error("Invalid duration format: '{value}'")]
    InvalidDuration { value: String },

    /// Semantic validation failure -- the scenario parsed but contains
    /// invalid values (e.g., no stages, zero-length stage, relative URL).
    #[error("Scenario validation error: {message}")]
    Validation { message: String },

    /// File I/O failure -- the scenario file could not be read from disk.
    #[error("Failed to read scenario file '{path}': {source}")]
    Io {
        source: std::io::Error,
        path: String,
    },
}

impl ScenarioError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Transport-level failures for a single request attempt.
///
/// None of these stop a virtual user: each one becomes a failed
/// [`RequestOutcome`](crate::loadtest::metrics::RequestOutcome) with status 0.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request exceeded the scenario's per-request timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (DNS resolution, TCP connect, TLS handshake).
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Any other failure while building, sending, or reading the request.
    #[error("Request error: {message}")]
    Request { message: String },
}

impl TransportError {
    /// Returns the error category as a static string for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection { .. } => "connection",
            Self::Request { .. } => "request",
        }
    }

    /// Classify a [`reqwest::Error`] into the appropriate variant.
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection {
                message: err.to_string(),
            }
        } else {
            Self::Request {
                message: err.to_string(),
            }
        }
    }
}
