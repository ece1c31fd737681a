//! JSON API end to end through the subprocess adapter.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use rabbit_relay::api::{
    handle_json, ApiResponse, EMPTY_OUTPUT_MESSAGE, NO_ACTION_MESSAGE, NO_TRACE_MESSAGE,
};
use rabbit_relay::codec;
use rabbit_relay::config::{DEFAULT_IV, DEFAULT_KEY};
use rabbit_relay::engine::{ArtifactRegistry, EngineAdapter, INVALID_HEX_MESSAGE, NO_MESSAGE_MESSAGE};
use rabbit_relay::process::TokioInvoker;
use serde_json::{json, Value};
use tempfile::TempDir;

/// Letter-shifting stand-in engine. Exits 7 when the input holds "FAIL",
/// exits 0 without writing anything on "SILENT", and answers a decrypt of
/// "BINARY" with bytes that are not UTF-8.
const SCRIPT: &str = r#"#!/bin/sh
if grep -q FAIL "$4"; then echo "refused" >&2; exit 7; fi
if grep -q SILENT "$4"; then exit 0; fi
if [ "$1" = decrypt ] && grep -q BINARY "$4"; then
  echo "raw bytes" >&2
  printf '\377\376ok' > "$5"
  exit 0
fi
case "$1" in
  encrypt)
    tr 'a-y' 'b-z' < "$4" > "$5"
    printf 'Step 1: %s\nx[0] = 0x01\n' "$1" > "$6"
    ;;
  decrypt)
    tr 'b-z' 'a-y' < "$4" > "$5"
    printf 'Step 1: %s\nx[0] = 0x01\n' "$1" > "$6"
    ;;
  visualize)
    printf 'Step 1: Trace (%s)\n' "$6" > "$5"
    cat "$4" >> "$5"
    ;;
esac
"#;

fn engine() -> (TempDir, EngineAdapter) {
    static SCRIPT_DIR: OnceLock<(TempDir, PathBuf)> = OnceLock::new();
    let (_, script) = SCRIPT_DIR.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rabbit_cli");
        std::fs::write(&path, SCRIPT).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        (dir, path)
    });

    let artifacts = tempfile::tempdir().unwrap();
    let adapter = EngineAdapter::new(
        script.clone(),
        Arc::new(TokioInvoker::new(Some(Duration::from_secs(5)))),
        Arc::new(ArtifactRegistry::new(artifacts.path())),
    );
    (artifacts, adapter)
}

async fn call(engine: &EngineAdapter, body: Value) -> Value {
    let response = handle_json(engine, &body.to_string()).await;
    serde_json::from_str(&response.to_json()).unwrap()
}

#[tokio::test]
async fn test_encrypt_then_decrypt() {
    let (_dir, engine) = engine();

    let encrypted = call(
        &engine,
        json!({"action": "encrypt", "key": DEFAULT_KEY, "iv": DEFAULT_IV, "message": "abc"}),
    )
    .await;
    assert_eq!(encrypted["result"], "62 63 64");
    assert_eq!(encrypted["visualization"], "Step 1: encrypt\nx[0] = 0x01\n");

    let decrypted = call(
        &engine,
        json!({"action": "decrypt", "key": DEFAULT_KEY, "iv": DEFAULT_IV, "hexData": "62 63 64"}),
    )
    .await;
    assert_eq!(decrypted["result"], "abc");
}

#[tokio::test]
async fn test_visualize_defaults() {
    let (_dir, engine) = engine();

    let response = call(
        &engine,
        json!({"action": "visualize", "key": DEFAULT_KEY, "iv": DEFAULT_IV}),
    )
    .await;
    assert_eq!(response["vizType"], "decrypt");
    assert_eq!(response["result"], "Step 1: Trace (decrypt)\nTest message");
}

#[tokio::test]
async fn test_visualize_decrypt_uses_hex_bytes() {
    let (_dir, engine) = engine();

    let response = call(
        &engine,
        json!({
            "action": "visualize", "key": DEFAULT_KEY, "iv": DEFAULT_IV,
            "vizType": "decrypt", "hexData": "68 69", "message": "ignored"
        }),
    )
    .await;
    assert_eq!(response["result"], "Step 1: Trace (decrypt)\nhi");
}

#[tokio::test]
async fn test_engine_failure_carries_debug() {
    let (_dir, engine) = engine();

    let response = call(
        &engine,
        json!({"action": "visualize", "vizType": "encrypt", "key": DEFAULT_KEY, "iv": DEFAULT_IV, "message": "FAIL"}),
    )
    .await;
    assert_eq!(response["error"], "Visualization failed");
    assert_eq!(response["debug"]["returnCode"], 7);
    assert_eq!(response["debug"]["stderr"], "refused\n");
    assert_eq!(response["debug"]["vizType"], "encrypt");
    assert!(response["debug"]["command"].as_str().unwrap().contains("visualize"));
}

#[tokio::test]
async fn test_visualize_without_trace_file() {
    let (dir, engine) = engine();

    let response = call(
        &engine,
        json!({
            "action": "visualize", "key": DEFAULT_KEY, "iv": DEFAULT_IV,
            "hexData": codec::encode_hex(b"SILENT")
        }),
    )
    .await;
    assert_eq!(response["error"], NO_TRACE_MESSAGE);
    assert_eq!(response["debug"]["returnCode"], 0);
    assert_eq!(response["debug"]["vizType"], "decrypt");
    assert!(response["debug"]["command"].as_str().unwrap().contains("visualize"));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_encrypt_without_output_file() {
    let (_dir, engine) = engine();

    let response = call(
        &engine,
        json!({"action": "encrypt", "key": DEFAULT_KEY, "iv": DEFAULT_IV, "message": "SILENT"}),
    )
    .await;
    assert_eq!(response["error"], EMPTY_OUTPUT_MESSAGE);
    assert_eq!(response["debug"]["returnCode"], 0);
    assert!(response["debug"].get("vizType").is_none());
}

#[tokio::test]
async fn test_non_utf8_plaintext_is_reported() {
    let (_dir, engine) = engine();

    let response = call(
        &engine,
        json!({
            "action": "decrypt", "key": DEFAULT_KEY, "iv": DEFAULT_IV,
            "hexData": codec::encode_hex(b"BINARY")
        }),
    )
    .await;
    assert_eq!(response["error"], "Decryption failed");
    assert!(response.get("result").is_none());
    assert_eq!(response["debug"]["returnCode"], 0);
    assert_eq!(response["debug"]["stderr"], "raw bytes\n");
}

#[tokio::test]
async fn test_validation_errors() {
    let (dir, engine) = engine();

    let response = call(
        &engine,
        json!({"action": "decrypt", "key": DEFAULT_KEY, "iv": DEFAULT_IV, "hexData": "6"}),
    )
    .await;
    assert_eq!(response, json!({"error": INVALID_HEX_MESSAGE}));

    let response = call(
        &engine,
        json!({"action": "encrypt", "key": DEFAULT_KEY, "iv": DEFAULT_IV, "message": ""}),
    )
    .await;
    assert_eq!(response, json!({"error": NO_MESSAGE_MESSAGE}));

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_malformed_body() {
    let (_dir, engine) = engine();
    let response = handle_json(&engine, "{not json").await;
    assert_eq!(response, ApiResponse::error(NO_ACTION_MESSAGE));
}
