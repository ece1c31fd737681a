//! One-shot cipher subcommands: encrypt, decrypt, visualize, request.
//!
//! Each prints the JSON API response on stdout and exits 0 on success.

use std::io::Read;

use crate::api::{self, ApiRequest, ApiResponse};
use crate::config::EnvConfig;
use crate::engine::CipherEngine;

const HEX_FLAG: &str = "--hex";

/// Build the request for `encrypt <message>`, `decrypt <hex>` or
/// `visualize [encrypt|decrypt] [--hex] [payload]` using the configured key
/// and IV. A decrypt-mode visualize payload is plaintext unless `--hex` is
/// given.
pub fn build_request(config: &EnvConfig, action: &str, rest: &[String]) -> ApiRequest {
    let mut request = ApiRequest {
        action: Some(action.to_string()),
        key: Some(config.key.clone()),
        iv: Some(config.iv.clone()),
        ..Default::default()
    };
    let as_hex = rest.iter().any(|a| a == HEX_FLAG);
    let rest: Vec<&String> = rest.iter().filter(|a| *a != HEX_FLAG).collect();
    let first = rest.first().map(|s| s.to_string());
    match action {
        "encrypt" => request.message = first,
        "decrypt" => request.hex_data = first,
        "visualize" => {
            request.viz_type = first;
            let payload = rest.get(1).map(|s| s.to_string());
            match request.viz_type.as_deref() {
                Some("encrypt") => request.message = payload,
                _ if as_hex => request.hex_data = payload,
                _ => request.message = payload,
            }
        }
        _ => {}
    }
    request
}

fn emit(response: &ApiResponse) -> i32 {
    println!("{}", response.to_json());
    if response.is_success() {
        0
    } else {
        1
    }
}

/// Run `encrypt`, `decrypt` or `visualize`.
pub async fn run_cipher(
    engine: &dyn CipherEngine,
    config: &EnvConfig,
    action: &str,
    rest: &[String],
) -> i32 {
    let request = build_request(config, action, rest);
    emit(&api::handle(engine, &request).await)
}

/// Run `request`: one JSON request on stdin.
pub async fn run_request(engine: &dyn CipherEngine) -> i32 {
    let mut body = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut body) {
        eprintln!("Failed to read request from stdin: {}", e);
        return 1;
    }
    emit(&api::handle_json(engine, &body).await)
}
