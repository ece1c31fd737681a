//! Config CLI subcommands: show, defaults, validate.
//!
//! These read configuration directly from the environment (and the
//! optional file) without starting the pipeline.

use crate::config::{self, EffectiveConfig, EnvConfig};

/// Print effective config as key-value pairs to stdout.
pub fn run_show(config: &EnvConfig) {
    print_config(&config.effective_config());
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    print_config(&config::defaults().effective_config());
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate(config: &EnvConfig) -> i32 {
    let warnings = config.validate();
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        for w in &warnings {
            eprintln!("WARNING: {}", w);
        }
        1
    }
}

fn print_config(cfg: &EffectiveConfig) {
    for (key, value) in cfg.entries() {
        println!("{}={}", key, value);
    }
}
