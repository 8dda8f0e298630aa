//! Ternary check verdicts and the aggregated validation report.
//!
//! A predicate result is a tagged variant, not a boolean: "rule absent"
//! must stay distinguishable from "rule present and wrong" so that
//! genuinely optional configuration never reads as a violation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The result of evaluating one invariant predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "verdict")]
pub enum Verdict {
    Satisfied,
    Violated { explanation: String },
    NotApplicable,
}

impl Verdict {
    pub fn violated(explanation: impl Into<String>) -> Verdict {
        Verdict::Violated {
            explanation: explanation.into(),
        }
    }

    pub fn is_satisfied(&self) -> bool {
        matches!(self, Verdict::Satisfied)
    }

    pub fn is_violated(&self) -> bool {
        matches!(self, Verdict::Violated { .. })
    }

    pub fn is_not_applicable(&self) -> bool {
        matches!(self, Verdict::NotApplicable)
    }
}

/// One recorded check: a stable identifier plus its verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub check_id: String,
    pub verdict: Verdict,
}

/// The aggregated result surface of a validation session.
///
/// Maps check identifiers to verdicts and carries aggregate counts.
/// This structure, not any console text, is the output contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub checks: BTreeMap<String, Verdict>,
    pub satisfied: usize,
    pub violated: usize,
    pub not_applicable: usize,
}

impl ValidationReport {
    pub fn new() -> ValidationReport {
        ValidationReport::default()
    }

    /// Record one check outcome. Check ids are unique per session by
    /// construction; recording the same id twice keeps the last
    /// verdict and recounts.
    pub fn record(&mut self, check_id: impl Into<String>, verdict: Verdict) {
        self.checks.insert(check_id.into(), verdict);
        self.recount();
    }

    fn recount(&mut self) {
        self.satisfied = 0;
        self.violated = 0;
        self.not_applicable = 0;
        for verdict in self.checks.values() {
            match verdict {
                Verdict::Satisfied => self.satisfied += 1,
                Verdict::Violated { .. } => self.violated += 1,
                Verdict::NotApplicable => self.not_applicable += 1,
            }
        }
    }

    /// A session passes when nothing was violated. NotApplicable
    /// results do not count against it.
    pub fn passed(&self) -> bool {
        self.violated == 0
    }

    pub fn total(&self) -> usize {
        self.checks.len()
    }
}
