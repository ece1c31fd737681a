//! `trace` subcommand: parse a saved engine trace.

use std::path::Path;

use crate::trace::{parse_trace, DataGroup, TraceModel};

/// Run `trace <file> [--text]`.
///
/// Returns exit code: 0 on success, 1 when the file cannot be read.
pub fn run_trace(path: &Path, text_output: bool) -> i32 {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Failed to read {}: {}", path.display(), e);
            return 1;
        }
    };
    let model = parse_trace(&text);
    if text_output {
        print_trace(&model);
    } else {
        match serde_json::to_string_pretty(&model) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize trace: {}", e);
                return 1;
            }
        }
    }
    0
}

/// Format and print a trace model as an indented listing.
pub fn print_trace(model: &TraceModel) {
    if model.is_empty() {
        println!("No steps found in trace.");
        return;
    }

    for step in &model.steps {
        println!("[{}] {}", step.id, step.title);
        for group in &step.groups {
            match group {
                DataGroup::Values { kind, values } => {
                    println!("    {:?}", kind);
                    for v in values {
                        match &v.note {
                            Some(note) => println!("        {:<16} = {:<20} ({})", v.name, v.value, note),
                            None => println!("        {:<16} = {}", v.name, v.value),
                        }
                    }
                }
                DataGroup::BeforeAfterNote { label, body } => {
                    println!("    {}: {}", label, body);
                }
                DataGroup::FreeformInfo { text } => println!("    {}", text),
            }
        }
    }
    println!("{}", "-".repeat(60));
    println!("{} step(s), {} value(s)", model.steps.len(), model.value_count());
}
