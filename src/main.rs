//! Rabbit relay entry point.
//!
//! ## CLI Subcommands
//!
//! - `rabbit-relay` or `rabbit-relay serve` - Run the telemetry pipeline (default)
//! - `rabbit-relay encrypt|decrypt|visualize` - One-shot engine calls
//! - `rabbit-relay request` - JSON API request on stdin
//! - `rabbit-relay trace FILE` - Parse a saved engine trace
//! - `rabbit-relay config show|defaults|validate` - Inspect configuration

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use rabbit_relay::cli::{self, config_cmd, EXIT_CONFIG};
use rabbit_relay::config::{self, EnvConfig};
use rabbit_relay::engine::SweepOnDrop;
use rabbit_relay::health::HealthChecker;
use rabbit_relay::pipeline::PipelineHandle;
use rabbit_relay::shutdown::{ShutdownCoordinator, ShutdownResult};
use rabbit_relay::telemetry::init_logging;
use rabbit_relay::Relay;

/// Artifacts older than this at startup belong to a dead process.
const STALE_ARTIFACT_AGE: Duration = Duration::from_secs(300);
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    let raw_args: Vec<String> = std::env::args().collect();
    let config_path = cli::flag_value(&raw_args, "--config").map(str::to_string);
    let args = cli::strip_flag(&raw_args, "--config");
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            return ExitCode::SUCCESS;
        }
        "version" | "--version" | "-V" => {
            println!("rabbit-relay {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        _ => {}
    }

    let config = match load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(code) => return code,
    };

    match command {
        "serve" | "" => {
            if let Err(e) = init_logging(&config.log) {
                eprintln!("Logging setup failed: {}", e);
                return ExitCode::from(EXIT_CONFIG as u8);
            }
            match serve(config).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(code) => code,
            }
        }
        "encrypt" | "decrypt" | "visualize" => {
            let relay = match build_relay(config) {
                Ok(relay) => relay,
                Err(code) => return code,
            };
            let code =
                cli::run_cipher(relay.engine.as_ref(), &relay.config, command, &args[2..]).await;
            ExitCode::from(code as u8)
        }
        "request" => {
            let relay = match build_relay(config) {
                Ok(relay) => relay,
                Err(code) => return code,
            };
            let code = cli::run_request(relay.engine.as_ref()).await;
            ExitCode::from(code as u8)
        }
        "trace" => match args.get(2) {
            Some(file) => {
                let text = args.get(3).map(|s| s.as_str()) == Some("--text");
                ExitCode::from(cli::run_trace(Path::new(file), text) as u8)
            }
            None => {
                print_command_help("trace");
                ExitCode::FAILURE
            }
        },
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    config_cmd::run_show(&config);
                    ExitCode::SUCCESS
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => {
                    let code = config_cmd::run_validate(&config);
                    ExitCode::from(code as u8)
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&str>) -> Result<EnvConfig, ExitCode> {
    match path {
        None => Ok(config::load()),
        Some(path) => config::load_with_file(Path::new(path)).map_err(|e| {
            eprintln!("{}", e);
            ExitCode::from(EXIT_CONFIG as u8)
        }),
    }
}

fn build_relay(config: EnvConfig) -> Result<Relay, ExitCode> {
    Relay::new(config).map_err(|e| {
        eprintln!("Engine unavailable: {}", e);
        ExitCode::from(EXIT_CONFIG as u8)
    })
}

async fn serve(config: EnvConfig) -> Result<(), ExitCode> {
    for warning in config.validate() {
        warn!(%warning, "configuration warning");
    }

    let relay = Relay::new(config).map_err(|e| {
        error!(error = %e, "cipher engine unavailable");
        ExitCode::from(EXIT_CONFIG as u8)
    })?;
    let source = relay.http_source().map_err(|e| {
        error!(error = %e, "telemetry source unavailable");
        ExitCode::from(EXIT_CONFIG as u8)
    })?;

    match relay.artifacts.sweep_stale(STALE_ARTIFACT_AGE) {
        Ok(0) => {}
        Ok(removed) => info!(removed, "removed stale artifacts"),
        Err(e) => warn!(error = %e, "stale artifact sweep failed"),
    }
    install_panic_sweep(&relay);
    let _sweep = SweepOnDrop::new(Arc::clone(&relay.artifacts));

    let shutdown = ShutdownCoordinator::new();
    let shutdown_timeout = relay.config.shutdown_timeout;
    let (pipeline, handle) = relay.pipeline(Arc::new(source));
    let pipeline_task = tokio::spawn(pipeline.run(shutdown.clone()));
    let status_task = tokio::spawn(log_status(handle, shutdown.clone()));

    if let Err(e) = wait_for_signal().await {
        error!(error = %e, "signal handler failed");
    }
    info!("shutdown signal received, draining");

    let (result, cycles) = shutdown.stop_task(pipeline_task, shutdown_timeout).await;
    status_task.abort();
    match result {
        ShutdownResult::Complete => info!(cycles, "shutdown complete"),
        ShutdownResult::Timeout {
            cycles_in_flight,
            pipelines_running,
        } => warn!(
            cycles_in_flight,
            pipelines_running, "shutdown timed out, pipeline aborted"
        ),
    }
    Ok(())
}

/// Sweep registered artifacts before the default panic output.
fn install_panic_sweep(relay: &Relay) {
    let artifacts = Arc::clone(&relay.artifacts);
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        artifacts.sweep_registered();
        previous(info);
    }));
}

async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/// Periodic status line with statistics and health.
async fn log_status(handle: PipelineHandle, shutdown: ShutdownCoordinator) {
    let checker = HealthChecker::default();
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let snapshot = handle.snapshot();
        let report = checker.report(
            shutdown.state().await,
            &snapshot.stats,
            snapshot.consecutive_fallbacks,
        );
        info!(
            cycle = snapshot.cycle,
            total = snapshot.stats.total_packets,
            success = snapshot.stats.success_packets,
            failed = snapshot.stats.failed_packets,
            avg_decrypt_ms = snapshot.stats.avg_decrypt_ms,
            health = ?report.state,
            consecutive_fallbacks = report.consecutive_fallbacks,
            "relay status"
        );
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "rabbit-relay - Rabbit telemetry relay v{}

USAGE:
    rabbit-relay [--config FILE] [COMMAND] [ARGS]

COMMANDS:
    serve        Run the telemetry pipeline (default when no command given)
    encrypt      Encrypt a message with the configured key and IV
    decrypt      Decrypt hex tokens with the configured key and IV
    visualize    Run the engine in trace mode and print the trace
    request      Handle one JSON API request read from stdin
    trace        Parse a saved engine trace file
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    rabbit-relay                            # Run the pipeline
    rabbit-relay --config relay.toml serve  # With a config file
    rabbit-relay encrypt \"Test message\"
    rabbit-relay decrypt \"8F 1A 22\"
    rabbit-relay visualize encrypt \"hi\"
    echo '{{\"action\":\"encrypt\",...}}' | rabbit-relay request
    rabbit-relay trace trace.txt --text
    rabbit-relay config validate

ENVIRONMENT:
    RABBIT_RELAY_*       See 'rabbit-relay config show' for every key
    RUST_LOG             Overrides RABBIT_RELAY_LOG_LEVEL

EXIT CODES:
    0  Success
    1  Failure
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "serve" => {
            eprintln!(
                "rabbit-relay serve - Run the telemetry pipeline

USAGE:
    rabbit-relay [--config FILE] serve

DESCRIPTION:
    Polls the telemetry source, decrypts each packet through the cipher
    engine and keeps bounded logs and statistics. Falls back to synthetic
    samples while the source is unreachable. Stops on Ctrl+C or SIGTERM
    after the in-flight cycle finishes.
"
            );
        }
        "encrypt" | "decrypt" | "visualize" => {
            eprintln!(
                "rabbit-relay encrypt|decrypt|visualize - One-shot engine calls

USAGE:
    rabbit-relay encrypt <MESSAGE>
    rabbit-relay decrypt <HEX>
    rabbit-relay visualize [encrypt|decrypt] [--hex] [PAYLOAD]

DESCRIPTION:
    Uses RABBIT_RELAY_KEY and RABBIT_RELAY_IV. Prints the JSON response.
    Visualize defaults to decrypt mode and the message \"Test message\".
    In decrypt mode the payload is plaintext unless --hex is given.
"
            );
        }
        "request" => {
            eprintln!(
                "rabbit-relay request - JSON API request

USAGE:
    rabbit-relay request < request.json

DESCRIPTION:
    Reads {{action, key, iv, message?, hexData?, vizType?}} from stdin
    and prints {{result, visualization?}} or {{error, debug?}}.
"
            );
        }
        "trace" => {
            eprintln!(
                "rabbit-relay trace - Parse an engine trace

USAGE:
    rabbit-relay trace <FILE> [--text]

OPTIONS:
    --text  Indented listing instead of JSON
"
            );
        }
        "config" => {
            eprintln!(
                "rabbit-relay config - Inspect configuration

USAGE:
    rabbit-relay [--config FILE] config <SUBCOMMAND>

SUBCOMMANDS:
    show           Show effective configuration
    validate       Check key, IV, engine path and URL
    defaults       Show default configuration
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'rabbit-relay help' for general usage.",
                command
            );
        }
    }
}
