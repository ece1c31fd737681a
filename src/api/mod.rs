//! JSON request/response surface over the cipher engine.
//!
//! Requests name an action (`encrypt`, `decrypt`, `visualize`), key and IV
//! as hex tokens, and a `message` or `hexData` payload. Responses are
//! `{result, visualization?, vizType?}` or `{error, debug?}`.

use serde::{Deserialize, Serialize};

use crate::codec::{self, IV_LEN, KEY_LEN};
use crate::engine::{
    CipherAction, CipherEngine, CipherRequest, CipherResult, EngineError, Payload, TraceMode,
    INVALID_IV_MESSAGE, INVALID_KEY_MESSAGE,
};

pub const NO_ACTION_MESSAGE: &str = "No action specified";
pub const INVALID_ACTION_MESSAGE: &str = "Invalid action";
pub const EMPTY_OUTPUT_MESSAGE: &str = "Output file is empty or not created";
pub const NO_TRACE_MESSAGE: &str = "Visualization file not created";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    pub action: Option<String>,
    pub key: Option<String>,
    pub iv: Option<String>,
    pub message: Option<String>,
    pub hex_data: Option<String>,
    pub viz_type: Option<String>,
}

/// Engine diagnostics attached to a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDebug {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viz_type: Option<TraceMode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ApiResponse {
    #[serde(rename_all = "camelCase")]
    Success {
        result: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        visualization: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        viz_type: Option<TraceMode>,
    },
    Failure {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        debug: Option<ApiDebug>,
    },
}

impl ApiResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Failure {
            error: message.into(),
            debug: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"error":"serialization failed"}"#.into())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl ApiRequest {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Turn the loose request into an engine request, checking in the order
    /// callers have always seen errors: action present, key, IV, action known.
    pub fn to_cipher_request(&self) -> Result<CipherRequest, ApiResponse> {
        let action = non_empty(&self.action).ok_or_else(|| ApiResponse::error(NO_ACTION_MESSAGE))?;
        let key = self.key.clone().unwrap_or_default();
        let iv = self.iv.clone().unwrap_or_default();
        if !codec::validate_length(&key, Some(KEY_LEN)) {
            return Err(ApiResponse::error(INVALID_KEY_MESSAGE));
        }
        if !codec::validate_length(&iv, Some(IV_LEN)) {
            return Err(ApiResponse::error(INVALID_IV_MESSAGE));
        }

        let message = non_empty(&self.message).map(str::to_string);
        let hex = non_empty(&self.hex_data).map(str::to_string);

        let (action, payload) = match action {
            "encrypt" => (
                CipherAction::Encrypt,
                message.map_or(Payload::Empty, Payload::Text),
            ),
            "decrypt" => (CipherAction::Decrypt, hex.map_or(Payload::Empty, Payload::Hex)),
            "visualize" => {
                let mode = TraceMode::parse_lenient(self.viz_type.as_deref().unwrap_or_default());
                let payload = match (mode, hex, message) {
                    (TraceMode::Encrypt, _, Some(message)) => Payload::Text(message),
                    (TraceMode::Encrypt, _, None) => Payload::Empty,
                    (TraceMode::Decrypt, Some(hex), _) => Payload::Hex(hex),
                    (TraceMode::Decrypt, None, Some(message)) => Payload::Text(message),
                    (TraceMode::Decrypt, None, None) => Payload::Empty,
                };
                (CipherAction::Trace(mode), payload)
            }
            _ => return Err(ApiResponse::error(INVALID_ACTION_MESSAGE)),
        };

        Ok(CipherRequest {
            action,
            key,
            iv,
            payload,
        })
    }
}

fn failure_message(action: CipherAction) -> &'static str {
    match action {
        CipherAction::Encrypt => "Encryption failed",
        CipherAction::Decrypt => "Decryption failed",
        CipherAction::Trace(_) => "Visualization failed",
    }
}

fn viz_type(action: CipherAction) -> Option<TraceMode> {
    match action {
        CipherAction::Trace(mode) => Some(mode),
        _ => None,
    }
}

/// Shape an engine result as an API response.
pub fn response_from_result(result: CipherResult) -> ApiResponse {
    let action = result.action;
    let error = match result.outcome {
        Ok(output) => {
            return match action {
                CipherAction::Trace(mode) => ApiResponse::Success {
                    result: output.into_string(),
                    visualization: None,
                    viz_type: Some(mode),
                },
                _ => ApiResponse::Success {
                    result: output.into_string(),
                    visualization: result.trace_text,
                    viz_type: None,
                },
            };
        }
        Err(error) => error,
    };

    let debug = |command: String, stderr: String| ApiDebug {
        command,
        stdout: result.stdout.clone(),
        stderr,
        return_code: result.exit_code.unwrap_or(crate::process::LAUNCH_FAILURE_EXIT_CODE),
        viz_type: viz_type(action),
    };

    match error {
        EngineError::Validation(message) => ApiResponse::error(message),
        EngineError::EmptyOutput { ref command, .. } => ApiResponse::Failure {
            error: match action {
                CipherAction::Trace(_) => NO_TRACE_MESSAGE,
                _ => EMPTY_OUTPUT_MESSAGE,
            }
            .to_string(),
            debug: Some(debug(command.clone(), result.stderr.clone())),
        },
        EngineError::Launch { ref path, ref reason } => ApiResponse::Failure {
            error: failure_message(action).to_string(),
            debug: Some(debug(path.display().to_string(), reason.clone())),
        },
        EngineError::Engine { ref command, .. } => ApiResponse::Failure {
            error: failure_message(action).to_string(),
            debug: Some(debug(command.clone(), result.stderr.clone())),
        },
        EngineError::TimedOut { ref command, .. } => ApiResponse::Failure {
            error: failure_message(action).to_string(),
            debug: Some(debug(command.clone(), error.to_string())),
        },
        EngineError::InvalidOutput { ref command, .. } => ApiResponse::Failure {
            error: failure_message(action).to_string(),
            debug: Some(debug(command.clone(), result.stderr.clone())),
        },
        EngineError::Artifact(ref reason) => ApiResponse::Failure {
            error: failure_message(action).to_string(),
            debug: Some(debug(String::new(), reason.clone())),
        },
    }
}

/// Validate, execute and shape one request.
pub async fn handle(engine: &dyn CipherEngine, request: &ApiRequest) -> ApiResponse {
    match request.to_cipher_request() {
        Ok(cipher_request) => response_from_result(engine.execute(cipher_request).await),
        Err(response) => response,
    }
}

/// Parse a JSON body and handle it. Malformed JSON is reported as a
/// missing action, matching a request with no usable fields.
pub async fn handle_json(engine: &dyn CipherEngine, body: &str) -> ApiResponse {
    match ApiRequest::from_json(body) {
        Ok(request) => handle(engine, &request).await,
        Err(_) => ApiResponse::error(NO_ACTION_MESSAGE),
    }
}
