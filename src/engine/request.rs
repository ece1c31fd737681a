//! Request and result types for one engine call.

use serde::{Deserialize, Serialize};

use super::error::EngineError;

/// Plaintext written for a trace call that carries no payload.
pub const DEFAULT_TRACE_MESSAGE: &str = "Test message";

/// Direction the engine traces when asked to visualize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceMode {
    Encrypt,
    #[default]
    Decrypt,
}

impl TraceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
        }
    }

    /// Anything other than `encrypt` means decrypt.
    pub fn parse_lenient(value: &str) -> Self {
        if value == "encrypt" {
            Self::Encrypt
        } else {
            Self::Decrypt
        }
    }
}

/// Engine action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAction {
    Encrypt,
    Decrypt,
    Trace(TraceMode),
}

impl CipherAction {
    /// Positional action keyword understood by the engine.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::Trace(_) => "visualize",
        }
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Empty,
    /// Plaintext bytes, written verbatim.
    Text(String),
    /// Space-separated hex tokens, decoded before writing.
    Hex(String),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) | Self::Hex(s) => s.is_empty(),
        }
    }
}

/// One encrypt, decrypt or trace request.
///
/// Key and IV travel as hex tokens and are validated by the adapter before
/// anything is written.
#[derive(Debug, Clone)]
pub struct CipherRequest {
    pub action: CipherAction,
    pub key: String,
    pub iv: String,
    pub payload: Payload,
}

impl CipherRequest {
    pub fn encrypt(key: impl Into<String>, iv: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action: CipherAction::Encrypt,
            key: key.into(),
            iv: iv.into(),
            payload: Payload::Text(message.into()),
        }
    }

    pub fn decrypt(key: impl Into<String>, iv: impl Into<String>, hex: impl Into<String>) -> Self {
        Self {
            action: CipherAction::Decrypt,
            key: key.into(),
            iv: iv.into(),
            payload: Payload::Hex(hex.into()),
        }
    }

    pub fn trace(
        key: impl Into<String>,
        iv: impl Into<String>,
        mode: TraceMode,
        payload: Payload,
    ) -> Self {
        Self {
            action: CipherAction::Trace(mode),
            key: key.into(),
            iv: iv.into(),
            payload,
        }
    }
}

/// Successful engine output, shaped per action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipherOutput {
    /// Encrypt: output bytes as hex tokens.
    Ciphertext(String),
    /// Decrypt: output bytes as text, unmodified.
    Plaintext(String),
    /// Trace: the trace artifact text.
    Trace(String),
}

impl CipherOutput {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ciphertext(s) | Self::Plaintext(s) | Self::Trace(s) => s,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Self::Ciphertext(s) | Self::Plaintext(s) | Self::Trace(s) => s,
        }
    }
}

/// Result of one engine call. `outcome` holds either the output or the error.
#[derive(Debug, Clone)]
pub struct CipherResult {
    pub action: CipherAction,
    /// Artifact group id; `None` when rejected before allocation.
    pub request_id: Option<String>,
    pub outcome: Result<CipherOutput, EngineError>,
    /// Trace text emitted alongside encrypt/decrypt, if any.
    pub trace_text: Option<String>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CipherResult {
    /// A request rejected before any artifact existed.
    pub fn rejected(action: CipherAction, error: EngineError) -> Self {
        Self {
            action,
            request_id: None,
            outcome: Err(error),
            trace_text: None,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn output(&self) -> Option<&CipherOutput> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&EngineError> {
        self.outcome.as_ref().err()
    }
}
