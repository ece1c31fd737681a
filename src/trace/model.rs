//! Renderer-agnostic model of an engine trace.

use serde::Serialize;

/// Kind of a value group inside a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// `x[i]` state variables.
    StateVar,
    /// `c[i]` counters.
    Counter,
    /// `temp[i]` intermediates.
    Temp,
    Carry,
    /// Output or keystream values.
    Output,
    Other,
}

impl GroupKind {
    /// Classify a value line by its leading name.
    pub fn classify(line: &str) -> Self {
        if line.starts_with("x[") {
            Self::StateVar
        } else if line.starts_with("c[") {
            Self::Counter
        } else if line.starts_with("temp[") {
            Self::Temp
        } else if line.starts_with("carry") {
            Self::Carry
        } else {
            let lower = line.to_lowercase();
            if lower.contains("output") || lower.contains("keystream") {
                Self::Output
            } else {
                Self::Other
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedValue {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataGroup {
    Values {
        kind: GroupKind,
        values: Vec<NamedValue>,
    },
    BeforeAfterNote {
        label: String,
        body: String,
    },
    FreeformInfo {
        text: String,
    },
}

impl DataGroup {
    pub fn values(&self) -> Option<&[NamedValue]> {
        match self {
            Self::Values { values, .. } => Some(values),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    /// 1-based, in encounter order.
    pub id: usize,
    pub title: String,
    pub groups: Vec<DataGroup>,
}

impl Step {
    /// The value group of `kind`, if one was opened in this step.
    pub fn group(&self, kind: GroupKind) -> Option<&[NamedValue]> {
        self.groups.iter().find_map(|g| match g {
            DataGroup::Values { kind: k, values } if *k == kind => Some(values.as_slice()),
            _ => None,
        })
    }

    pub(crate) fn values_mut(&mut self, kind: GroupKind) -> &mut Vec<NamedValue> {
        let pos = self
            .groups
            .iter()
            .position(|g| matches!(g, DataGroup::Values { kind: k, .. } if *k == kind));
        let idx = match pos {
            Some(idx) => idx,
            None => {
                self.groups.push(DataGroup::Values {
                    kind,
                    values: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        match &mut self.groups[idx] {
            DataGroup::Values { values, .. } => values,
            _ => unreachable!("index points at a value group"),
        }
    }
}

/// Parsed trace. Replaced wholesale on each new trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraceModel {
    pub steps: Vec<Step>,
}

impl TraceModel {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Total named values across all steps.
    pub fn value_count(&self) -> usize {
        self.steps
            .iter()
            .flat_map(|s| s.groups.iter())
            .filter_map(DataGroup::values)
            .map(<[NamedValue]>::len)
            .sum()
    }
}
