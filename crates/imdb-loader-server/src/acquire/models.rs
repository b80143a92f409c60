//! Outcomes and reports produced by the acquisition phases

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{AcquireError, AcquireResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Download,
    Extract,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Download => write!(f, "download"),
            Phase::Extract => write!(f, "extraction"),
        }
    }
}

/// Result of one item in one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub item_name: String,
    pub succeeded: bool,
    pub error_detail: Option<String>,
}

impl OperationOutcome {
    pub fn success(item_name: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            succeeded: true,
            error_detail: None,
        }
    }

    pub fn failure(item_name: impl Into<String>, error_detail: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            succeeded: false,
            error_detail: Some(error_detail.into()),
        }
    }
}

/// Aggregate of one phase
///
/// `succeeded` and the keys of `failed` partition `attempted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub attempted: Vec<String>,
    /// In attempted order
    pub succeeded: Vec<String>,
    pub failed: BTreeMap<String, String>,
}

impl PhaseReport {
    pub fn from_outcomes(phase: Phase, outcomes: impl IntoIterator<Item = OperationOutcome>) -> Self {
        let mut report = Self {
            phase,
            attempted: Vec::new(),
            succeeded: Vec::new(),
            failed: BTreeMap::new(),
        };

        for outcome in outcomes {
            report.attempted.push(outcome.item_name.clone());
            if outcome.succeeded {
                report.succeeded.push(outcome.item_name);
            } else {
                let detail = outcome
                    .error_detail
                    .unwrap_or_else(|| "unknown error".to_string());
                report.failed.insert(outcome.item_name, detail);
            }
        }

        report
    }

    pub fn total(&self) -> usize {
        self.attempted.len()
    }

    /// Failures in attempted order
    pub fn failures(&self) -> Vec<(String, String)> {
        self.attempted
            .iter()
            .filter_map(|name| {
                self.failed
                    .get(name)
                    .map(|detail| (name.clone(), detail.clone()))
            })
            .collect()
    }

    pub fn is_consistent(&self) -> bool {
        let disjoint = self.succeeded.iter().all(|s| !self.failed.contains_key(s));
        let exhaustive = self
            .attempted
            .iter()
            .all(|a| self.failed.contains_key(a) || self.succeeded.contains(a));
        disjoint && exhaustive && self.attempted.len() == self.succeeded.len() + self.failed.len()
    }

    /// Escalate a phase with no successes (including an empty one)
    pub fn into_result(self) -> AcquireResult<Self> {
        if self.succeeded.is_empty() {
            return Err(AcquireError::AllItemsFailed {
                phase: self.phase,
                attempted: self.total(),
                failures: self.failures(),
            });
        }
        Ok(self)
    }
}

/// Both phases of a full run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FullProcessReport {
    pub download: PhaseReport,
    pub extract: PhaseReport,
}
