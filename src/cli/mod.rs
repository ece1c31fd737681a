//! CLI subcommands for the relay binary.
//!
//! ## Usage
//!
//! ```bash
//! rabbit-relay encrypt "hello"          # one-shot encrypt, JSON response
//! rabbit-relay decrypt "8F 1A ..."      # one-shot decrypt
//! rabbit-relay visualize encrypt "hi"   # engine trace as JSON
//! rabbit-relay request < req.json       # raw API request on stdin
//! rabbit-relay trace trace.txt          # parse a saved trace
//! rabbit-relay config show              # effective configuration
//! ```

pub mod cipher_cmd;
pub mod config_cmd;
pub mod trace_cmd;

pub use cipher_cmd::{run_cipher, run_request};
pub use trace_cmd::run_trace;

/// Exit code for a configuration problem.
pub const EXIT_CONFIG: i32 = 2;

/// Value following `flag` in `args`, if present.
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// `args` with `flag` and its value removed.
pub fn strip_flag(args: &[String], flag: &str) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut skip = false;
    for arg in args {
        if skip {
            skip = false;
            continue;
        }
        if arg == flag {
            skip = true;
            continue;
        }
        out.push(arg.clone());
    }
    out
}
