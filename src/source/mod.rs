//! Remote telemetry source.
//!
//! The source answers a GET with `{encrypted_data: <compact hex>,
//! encryption: "rabbit"}`. Anything else is a format failure.

mod http;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub use http::HttpSource;

/// Cipher tag the source must announce.
pub const EXPECTED_ENCRYPTION: &str = "rabbit";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Source unreachable, timed out, or answered with a non-2xx status.
    #[error("Telemetry source transport failure: {0}")]
    Transport(String),

    /// Reachable, but the body is not a valid envelope.
    #[error("Telemetry source format failure: {0}")]
    Format(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "fetch_transport",
            Self::Format(_) => "fetch_format",
        }
    }
}

/// One validated envelope from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePayload {
    /// Ciphertext as compact hex, exactly as sent.
    pub encrypted_data: String,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    encrypted_data: Option<String>,
    encryption: Option<String>,
}

impl SourcePayload {
    /// Validate a response body.
    pub fn from_body(body: &str) -> Result<Self, FetchError> {
        let raw: RawEnvelope =
            serde_json::from_str(body).map_err(|e| FetchError::Format(e.to_string()))?;
        let encrypted_data = raw
            .encrypted_data
            .filter(|d| !d.is_empty())
            .ok_or_else(|| FetchError::Format("missing encrypted_data".into()))?;
        match raw.encryption.as_deref() {
            Some(EXPECTED_ENCRYPTION) => Ok(Self { encrypted_data }),
            Some(other) => Err(FetchError::Format(format!(
                "unexpected encryption tag {:?}",
                other
            ))),
            None => Err(FetchError::Format("missing encryption".into())),
        }
    }
}

/// Something the pipeline can poll for ciphertext.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch(&self) -> Result<SourcePayload, FetchError>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}
