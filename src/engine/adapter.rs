//! Subprocess adapter for the external cipher engine.
//!
//! Wire contract, positional and fixed:
//!
//! ```text
//! <engine> encrypt   <key> <iv> <input> <output> <trace>
//! <engine> decrypt   <key> <iv> <input> <output> <trace>
//! <engine> visualize <key> <iv> <input> <trace>  <encrypt|decrypt>
//! ```
//!
//! Key and IV files hold the raw 16 and 8 bytes. Exit code 0 is success.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn, Instrument};

use super::artifacts::{ArtifactKind, ArtifactRegistry, ArtifactSet};
use super::error::EngineError;
use super::request::{
    CipherAction, CipherOutput, CipherRequest, CipherResult, Payload, DEFAULT_TRACE_MESSAGE,
};
use crate::codec::{self, IV_LEN, KEY_LEN};
use crate::process::{display_command, ProcessError, ProcessInvoker, LAUNCH_FAILURE_EXIT_CODE};
use crate::telemetry::{record_engine_call, EngineSpan, SpanExt};

pub const INVALID_KEY_MESSAGE: &str = "Invalid key format. Must be 16 bytes in hex format.";
pub const INVALID_IV_MESSAGE: &str = "Invalid IV format. Must be 8 bytes in hex format.";
pub const INVALID_HEX_MESSAGE: &str = "Invalid hex data format";
pub const NO_MESSAGE_MESSAGE: &str = "No message to encrypt";
pub const NO_DATA_MESSAGE: &str = "No data to decrypt";

/// Anything that can run a `CipherRequest`.
///
/// The subprocess adapter is one implementation; an in-process cipher could
/// replace it without touching callers.
#[async_trait]
pub trait CipherEngine: Send + Sync {
    /// Never fails past this boundary: errors live in `CipherResult::outcome`.
    async fn execute(&self, request: CipherRequest) -> CipherResult;
}

/// Validated bytes ready to be staged on disk.
#[derive(Debug)]
struct Staged {
    key: Vec<u8>,
    iv: Vec<u8>,
    input: Vec<u8>,
}

/// Validate a request completely before any artifact is allocated.
fn stage(request: &CipherRequest) -> Result<Staged, EngineError> {
    let key = codec::decode_exact(&request.key, KEY_LEN)
        .map_err(|_| EngineError::Validation(INVALID_KEY_MESSAGE.into()))?;
    let iv = codec::decode_exact(&request.iv, IV_LEN)
        .map_err(|_| EngineError::Validation(INVALID_IV_MESSAGE.into()))?;

    let decode = |hex: &str| {
        codec::decode_hex(hex).map_err(|_| EngineError::Validation(INVALID_HEX_MESSAGE.into()))
    };

    let input = match (request.action, &request.payload) {
        (CipherAction::Encrypt, Payload::Text(text)) if !text.is_empty() => text.as_bytes().to_vec(),
        (CipherAction::Encrypt, _) => {
            return Err(EngineError::Validation(NO_MESSAGE_MESSAGE.into()));
        }

        (CipherAction::Decrypt, Payload::Hex(hex) | Payload::Text(hex)) if !hex.is_empty() => {
            decode(hex)?
        }
        (CipherAction::Decrypt, _) => {
            return Err(EngineError::Validation(NO_DATA_MESSAGE.into()));
        }

        (CipherAction::Trace(_), Payload::Hex(hex)) if !hex.is_empty() => decode(hex)?,
        (CipherAction::Trace(_), Payload::Text(text)) if !text.is_empty() => {
            text.as_bytes().to_vec()
        }
        (CipherAction::Trace(_), _) => DEFAULT_TRACE_MESSAGE.as_bytes().to_vec(),
    };

    Ok(Staged { key, iv, input })
}

fn build_args(action: CipherAction, set: &ArtifactSet) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        action.as_str().into(),
        set.path(ArtifactKind::Key).into(),
        set.path(ArtifactKind::Iv).into(),
        set.path(ArtifactKind::Input).into(),
    ];
    match action {
        CipherAction::Encrypt | CipherAction::Decrypt => {
            args.push(set.path(ArtifactKind::Output).into());
            args.push(set.path(ArtifactKind::Trace).into());
        }
        CipherAction::Trace(mode) => {
            args.push(set.path(ArtifactKind::Trace).into());
            args.push(mode.as_str().into());
        }
    }
    args
}

/// Try the configured path, then the same file name beside the running
/// binary. Missing everywhere is fatal for startup.
pub fn resolve_executable(configured: &Path) -> Result<PathBuf, EngineError> {
    let mut tried = vec![configured.to_path_buf()];
    if configured.is_file() {
        return Ok(configured.to_path_buf());
    }

    if configured.is_relative() {
        let beside_binary = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .zip(configured.file_name())
            .map(|(dir, name)| dir.join(name));
        if let Some(candidate) = beside_binary {
            if candidate.is_file() {
                return Ok(candidate);
            }
            tried.push(candidate);
        }
    }

    let tried: Vec<String> = tried.iter().map(|p| p.display().to_string()).collect();
    Err(EngineError::Launch {
        path: configured.to_path_buf(),
        reason: format!("executable not found (tried: {})", tried.join(", ")),
    })
}

/// Runs requests against an external engine executable.
pub struct EngineAdapter {
    executable: PathBuf,
    invoker: Arc<dyn ProcessInvoker>,
    artifacts: Arc<ArtifactRegistry>,
}

impl EngineAdapter {
    pub fn new(
        executable: impl Into<PathBuf>,
        invoker: Arc<dyn ProcessInvoker>,
        artifacts: Arc<ArtifactRegistry>,
    ) -> Self {
        Self {
            executable: executable.into(),
            invoker,
            artifacts,
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn artifacts(&self) -> &Arc<ArtifactRegistry> {
        &self.artifacts
    }

    async fn run(&self, request: CipherRequest) -> CipherResult {
        let action = request.action;
        let staged = match stage(&request) {
            Ok(staged) => staged,
            Err(e) => {
                debug!(action = action.as_str(), error = %e, "request rejected");
                return CipherResult::rejected(action, e);
            }
        };

        let set = self.artifacts.allocate();
        tracing::Span::current().record("request_id", set.id());

        let mut result = CipherResult {
            action,
            request_id: Some(set.id().to_string()),
            outcome: Err(EngineError::Artifact("not run".into())),
            trace_text: None,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
        };

        if let Err(e) = write_inputs(&set, &staged).await {
            result.outcome = Err(EngineError::Artifact(e.to_string()));
            return result;
        }

        let args = build_args(action, &set);
        let command = display_command(&self.executable, &args);
        debug!(command = %command, "invoking engine");

        let output = match self.invoker.run(&self.executable, &args).await {
            Ok(output) => output,
            Err(ProcessError::Launch { path, reason }) => {
                result.exit_code = Some(LAUNCH_FAILURE_EXIT_CODE);
                result.outcome = Err(EngineError::Launch { path, reason });
                return result;
            }
            Err(ProcessError::TimedOut { timeout_ms, .. }) => {
                result.exit_code = Some(LAUNCH_FAILURE_EXIT_CODE);
                result.outcome = Err(EngineError::TimedOut {
                    action: action.as_str(),
                    command,
                    timeout_ms,
                });
                return result;
            }
        };

        result.exit_code = Some(output.exit_code);
        result.stdout = output.stdout.clone();
        result.stderr = output.stderr.clone();

        if !output.success() {
            result.outcome = Err(EngineError::Engine {
                action: action.as_str(),
                command,
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
            return result;
        }

        let empty = |path: PathBuf| EngineError::EmptyOutput {
            action: action.as_str(),
            command: command.clone(),
            path,
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
        };

        let invalid = |path: PathBuf| EngineError::InvalidOutput {
            action: action.as_str(),
            command: command.clone(),
            path,
            exit_code: output.exit_code,
            stderr: result.stderr.clone(),
        };

        let outcome = match action {
            CipherAction::Encrypt | CipherAction::Decrypt => {
                let path = set.path(ArtifactKind::Output);
                match set.read(ArtifactKind::Output).await {
                    Ok(Some(bytes)) if !bytes.is_empty() => {
                        if action == CipherAction::Encrypt {
                            Ok(CipherOutput::Ciphertext(codec::encode_hex(&bytes)))
                        } else {
                            String::from_utf8(bytes)
                                .map(CipherOutput::Plaintext)
                                .map_err(|_| invalid(path))
                        }
                    }
                    Ok(_) => Err(empty(path)),
                    Err(e) => Err(EngineError::Artifact(e.to_string())),
                }
            }
            CipherAction::Trace(_) => {
                let path = set.path(ArtifactKind::Trace);
                match set.read(ArtifactKind::Trace).await {
                    Ok(Some(bytes)) if !bytes.is_empty() => String::from_utf8(bytes)
                        .map(CipherOutput::Trace)
                        .map_err(|_| invalid(path)),
                    Ok(_) => Err(empty(path)),
                    Err(e) => Err(EngineError::Artifact(e.to_string())),
                }
            }
        };

        if matches!(action, CipherAction::Encrypt | CipherAction::Decrypt) {
            match set.read(ArtifactKind::Trace).await {
                Ok(Some(bytes)) if !bytes.is_empty() => match String::from_utf8(bytes) {
                    Ok(text) => result.trace_text = Some(text),
                    Err(_) => warn!("trace artifact is not valid UTF-8, dropped"),
                },
                Ok(_) => {}
                Err(e) => warn!(error = %e, "trace artifact unreadable"),
            }
        }

        result.outcome = outcome;
        result
    }
}

async fn write_inputs(set: &ArtifactSet, staged: &Staged) -> std::io::Result<()> {
    set.write(ArtifactKind::Key, &staged.key).await?;
    set.write(ArtifactKind::Iv, &staged.iv).await?;
    set.write(ArtifactKind::Input, &staged.input).await
}

#[async_trait]
impl CipherEngine for EngineAdapter {
    async fn execute(&self, request: CipherRequest) -> CipherResult {
        let action = request.action;
        let span = EngineSpan::new(action.as_str());
        let started = Instant::now();

        // The artifact set is dropped inside `run`, so every file is gone
        // by the time the result is returned.
        let result = self.run(request).instrument(span.clone()).await;

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        span.record("latency_ms", latency_ms);
        if let Some(code) = result.exit_code {
            span.record("exit_code", code);
        }
        span.record_result(&result.outcome);
        record_engine_call(action.as_str(), if result.is_success() { "ok" } else { "error" });

        match &result.outcome {
            Ok(_) => debug!(parent: &span, "engine call completed"),
            Err(e) if e.is_validation() => debug!(parent: &span, error = %e, "engine call rejected"),
            Err(e) => warn!(parent: &span, error = %e, stderr = %result.stderr, "engine call failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::request::TraceMode;

    const KEY: &str = "00 11 22 33 44 55 66 77 88 99 AA BB CC DD EE FF";
    const IV: &str = "01 23 45 67 89 AB CD EF";

    #[test]
    fn test_stage_rejects_bad_key_and_iv() {
        let bad_key = CipherRequest::encrypt("00 11", IV, "hi");
        assert_eq!(
            stage(&bad_key).unwrap_err(),
            EngineError::Validation(INVALID_KEY_MESSAGE.into())
        );
        let bad_iv = CipherRequest::encrypt(KEY, "01 23 45 67 89 AB CD", "hi");
        assert_eq!(
            stage(&bad_iv).unwrap_err(),
            EngineError::Validation(INVALID_IV_MESSAGE.into())
        );
    }

    #[test]
    fn test_stage_encrypt_writes_text_verbatim() {
        let staged = stage(&CipherRequest::encrypt(KEY, IV, "Test message")).unwrap();
        assert_eq!(staged.key.len(), 16);
        assert_eq!(staged.iv.len(), 8);
        assert_eq!(staged.input, b"Test message");
    }

    #[test]
    fn test_stage_decrypt_requires_valid_hex() {
        let staged = stage(&CipherRequest::decrypt(KEY, IV, "7B 7D")).unwrap();
        assert_eq!(staged.input, b"{}");
        assert_eq!(
            stage(&CipherRequest::decrypt(KEY, IV, "7B7D")).unwrap_err(),
            EngineError::Validation(INVALID_HEX_MESSAGE.into())
        );
        assert_eq!(
            stage(&CipherRequest::decrypt(KEY, IV, "")).unwrap_err(),
            EngineError::Validation(NO_DATA_MESSAGE.into())
        );
    }

    #[test]
    fn test_stage_trace_defaults_message() {
        let req = CipherRequest::trace(KEY, IV, TraceMode::Encrypt, Payload::Empty);
        assert_eq!(stage(&req).unwrap().input, DEFAULT_TRACE_MESSAGE.as_bytes());
        let req = CipherRequest::trace(KEY, IV, TraceMode::Decrypt, Payload::Hex("41".into()));
        assert_eq!(stage(&req).unwrap().input, b"A");
        let req = CipherRequest::trace(KEY, IV, TraceMode::Decrypt, Payload::Text("abc".into()));
        assert_eq!(stage(&req).unwrap().input, b"abc");
    }

    #[test]
    fn test_build_args_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ArtifactRegistry::new(dir.path()));
        let set = registry.allocate();

        let args = build_args(CipherAction::Decrypt, &set);
        assert_eq!(args.len(), 6);
        assert_eq!(args[0], OsString::from("decrypt"));
        assert_eq!(PathBuf::from(&args[4]), set.path(ArtifactKind::Output));
        assert_eq!(PathBuf::from(&args[5]), set.path(ArtifactKind::Trace));

        let args = build_args(CipherAction::Trace(TraceMode::Encrypt), &set);
        assert_eq!(args[0], OsString::from("visualize"));
        assert_eq!(PathBuf::from(&args[4]), set.path(ArtifactKind::Trace));
        assert_eq!(args[5], OsString::from("encrypt"));
    }

    #[test]
    fn test_resolve_missing_executable() {
        let err = resolve_executable(Path::new("/no/such/dir/rabbit_cli")).unwrap_err();
        assert_eq!(err.kind(), "launch");
        assert!(err.to_string().contains("/no/such/dir/rabbit_cli"));
    }

    #[test]
    fn test_resolve_existing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rabbit_cli");
        std::fs::write(&path, b"").unwrap();
        assert_eq!(resolve_executable(&path).unwrap(), path);
    }
}
