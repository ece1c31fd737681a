//! Line grammar for engine trace text.
//!
//! Lines are trimmed and blank lines skipped. In order of precedence:
//!
//! - `Step ...`, or any line containing "setting key", "initial state" or
//!   "counter values" (case-insensitive), opens a new step. Its title is the
//!   text before the first `:` with `**` markers removed.
//! - `Before...` / `After...` is a note, split on the first `:`.
//! - A line containing `=` is a named value, split on the first `=` after
//!   `**` markers are removed. Text after the first `,` of the value is a note.
//! - Anything else is free-form info.
//!
//! Lines before the first step are dropped.

use super::model::{DataGroup, GroupKind, NamedValue, Step, TraceModel};

const STEP_KEYWORDS: [&str; 3] = ["setting key", "initial state", "counter values"];

fn is_step_start(line: &str) -> bool {
    if line.starts_with("Step ") {
        return true;
    }
    let lower = line.to_lowercase();
    STEP_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn step_title(line: &str) -> String {
    let head = line.split_once(':').map_or(line, |(head, _)| head);
    head.replace("**", "").trim().to_string()
}

fn named_value(line: &str) -> Option<NamedValue> {
    let (name, rest) = line.split_once('=')?;
    let rest = rest.trim();
    let (value, note) = match rest.split_once(',') {
        Some((value, note)) => (value.trim(), Some(note.trim().to_string())),
        None => (rest, None),
    };
    Some(NamedValue {
        name: name.trim().to_string(),
        value: value.to_string(),
        note: note.filter(|n| !n.is_empty()),
    })
}

fn note(line: &str) -> DataGroup {
    let (label, body) = line.split_once(':').unwrap_or((line, ""));
    DataGroup::BeforeAfterNote {
        label: label.trim().to_string(),
        body: body.trim().to_string(),
    }
}

/// Parse trace text into a model. Pure and deterministic.
pub fn parse_trace(text: &str) -> TraceModel {
    let mut steps: Vec<Step> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if is_step_start(line) {
            steps.push(Step {
                id: steps.len() + 1,
                title: step_title(line),
                groups: Vec::new(),
            });
            continue;
        }

        let Some(step) = steps.last_mut() else {
            continue;
        };

        if line.starts_with("Before") || line.starts_with("After") {
            step.groups.push(note(line));
        } else if line.contains('=') {
            let clean = line.replace("**", "");
            if let Some(value) = named_value(&clean) {
                step.values_mut(GroupKind::classify(&clean)).push(value);
            }
        } else {
            step.groups.push(DataGroup::FreeformInfo {
                text: line.to_string(),
            });
        }
    }

    TraceModel { steps }
}
