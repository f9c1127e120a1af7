//! Error types for a single poll of the inverter.

use std::num::ParseFloatError;
use std::time::Duration;

use thiserror::Error;

/// Failure to retrieve the measurements document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out after {timeout:?}: {source}")]
    Timeout {
        timeout: Duration,
        #[source]
        source: reqwest::Error,
    },

    /// The device answered with a non-2xx status.
    #[error("Unexpected HTTP status {status}")]
    Status { status: u16 },

    /// Connection, TLS or body transfer failure.
    #[error("Request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl FetchError {
    /// HTTP status code, if the device responded at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }
}

/// The response body is not a measurements document.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Empty response body")]
    Empty,

    /// The body is not well-formed XML.
    #[error("Invalid XML: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("Expected <root> element, found <{0}>")]
    UnexpectedRoot(String),

    #[error("No root element in response body")]
    MissingRoot,

    #[error("Document ended before the root element was closed")]
    Truncated,

    /// Text or a second element outside the root element.
    #[error("Unexpected content outside the root element")]
    ContentOutsideRoot,

    /// Well-formed XML without the `Device`/`Measurements` structure.
    #[error("Malformed measurement document: {0}")]
    Malformed(#[from] quick_xml::DeError),
}

/// A recognized measurement carried a `Value` that is not a number.
#[derive(Debug, Error)]
#[error("Invalid value {raw:?} for {label}: {source}")]
pub struct ConversionError {
    pub label: String,
    pub raw: String,
    #[source]
    pub source: ParseFloatError,
}

/// Why a tick did not update the registry.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
}

impl PollError {
    /// Stable name of the failure class, used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            PollError::Fetch(_) => "fetch",
            PollError::Parse(_) => "parse",
        }
    }
}
