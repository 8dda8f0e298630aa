//! Stateful exploration over a loaded document pair.
//!
//! The session holds one implicit state — the two documents, set once
//! and never mutated — and applies a randomized sequence of
//! transitions, each one invocation of a canonical predicate with
//! sampled arguments. After every transition a fixed set of global
//! invariants must hold regardless of the history so far. On a
//! violation the session shrinks the transition sequence to a minimal
//! reproducing case before reporting.

use crate::predicates;
use crate::verdict::{CheckOutcome, Verdict};
use concord_model::{
    LINE_LENGTH_RULE, PipelineDocument, RuleId, RuleSetDocument, RuleSpec,
    extract_config_references,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One exploration transition: a predicate invocation with sampled
/// arguments, or a structural sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transition {
    AssertRuleExists(RuleId),
    AssertRuleDisabled(RuleId),
    AssertLineLengthBounded { min: u32, max: u32 },
    AssertExemptionsTyped,
    AssertConfigReferenced(String),
    AssertFlagOrder { flag: String, target: String },
    AssertStepOrdering { job_index: usize },
    AssertNoSecrets,
    AssertTriggers,
    SampleStep { job_index: usize, step_index: usize },
}

impl Transition {
    pub fn check_id(&self) -> String {
        match self {
            Transition::AssertRuleExists(id) => format!("explore.rule_exists.{id}"),
            Transition::AssertRuleDisabled(id) => format!("explore.rule_disabled.{id}"),
            Transition::AssertLineLengthBounded { min, max } => {
                format!("explore.line_length_bounded.{min}.{max}")
            }
            Transition::AssertExemptionsTyped => "explore.exemptions_typed".to_string(),
            Transition::AssertConfigReferenced(path) => {
                format!("explore.config_referenced.{path}")
            }
            Transition::AssertFlagOrder { flag, target } => {
                format!("explore.flag_order.{flag}.{target}")
            }
            Transition::AssertStepOrdering { job_index } => {
                format!("explore.step_ordering.{job_index}")
            }
            Transition::AssertNoSecrets => "explore.secret_scan".to_string(),
            Transition::AssertTriggers => "explore.triggers".to_string(),
            Transition::SampleStep {
                job_index,
                step_index,
            } => format!("explore.sample_step.{job_index}.{step_index}"),
        }
    }
}

/// A shrunk, minimal transition sequence reproducing a violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimalViolation {
    pub transitions: Vec<Transition>,
    pub explanation: String,
}

/// The result of one exploration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorationOutcome {
    pub transitions_applied: usize,
    pub history: Vec<CheckOutcome>,
    pub violation: Option<MinimalViolation>,
}

/// A seeded exploration session over an immutable document pair.
pub struct ExplorationSession<'a> {
    ruleset: &'a RuleSetDocument,
    pipeline: &'a PipelineDocument,
    // Digests captured at initialization; the identity half of the
    // global invariants compares against these.
    ruleset_digest: String,
    pipeline_digest: String,
    expected_config: Option<String>,
    rng: StdRng,
    history: Vec<CheckOutcome>,
}

impl<'a> ExplorationSession<'a> {
    pub fn new(
        ruleset: &'a RuleSetDocument,
        pipeline: &'a PipelineDocument,
        seed: u64,
    ) -> ExplorationSession<'a> {
        ExplorationSession {
            ruleset,
            pipeline,
            ruleset_digest: ruleset.digest.clone(),
            pipeline_digest: pipeline.digest.clone(),
            expected_config: None,
            rng: StdRng::seed_from_u64(seed),
            history: Vec::new(),
        }
    }

    /// Add the rule-set's own path to the reference sampling pool, so
    /// the exploration also asserts the cross-document reference.
    pub fn with_expected_config(mut self, path: impl Into<String>) -> ExplorationSession<'a> {
        self.expected_config = Some(path.into());
        self
    }

    /// Apply up to `budget` transitions, stopping early on the first
    /// violation (shrunk before reporting).
    pub fn run(&mut self, budget: usize) -> ExplorationOutcome {
        let mut applied = Vec::with_capacity(budget);
        for _ in 0..budget {
            let transition = self.sample_transition();
            applied.push(transition.clone());

            let before_len = self.history.len();
            let before_digest = history_digest(&self.history);

            let outcome = self.apply(&transition);
            let violated = outcome.verdict.is_violated();
            let explanation = match &outcome.verdict {
                Verdict::Violated { explanation } => explanation.clone(),
                _ => String::new(),
            };
            self.history.push(outcome);

            if let Err(breach) = self.global_invariants(before_len, &before_digest) {
                return ExplorationOutcome {
                    transitions_applied: applied.len(),
                    history: self.history.clone(),
                    violation: Some(MinimalViolation {
                        transitions: applied,
                        explanation: breach,
                    }),
                };
            }

            if violated {
                let minimal = self.shrink(&applied, &explanation);
                return ExplorationOutcome {
                    transitions_applied: applied.len(),
                    history: self.history.clone(),
                    violation: Some(minimal),
                };
            }
        }
        ExplorationOutcome {
            transitions_applied: applied.len(),
            history: self.history.clone(),
            violation: None,
        }
    }

    /// Global invariants, checked after every transition: document
    /// identity (content digests unchanged since initialization),
    /// default flag type, non-empty job and step lists, and
    /// monotonically growing history.
    fn global_invariants(&self, before_len: usize, before_digest: &str) -> Result<(), String> {
        if self.ruleset.digest != self.ruleset_digest {
            return Err("rule-set document changed after initialization".to_string());
        }
        if self.pipeline.digest != self.pipeline_digest {
            return Err("pipeline document changed after initialization".to_string());
        }
        if self.pipeline.jobs.is_empty() {
            return Err("pipeline lost its jobs".to_string());
        }
        // `default` stays boolean: the typed field can only hold one.
        let _: bool = self.ruleset.default_enabled;
        for (job_id, job) in &self.pipeline.jobs {
            if job.steps.is_empty() {
                return Err(format!("job {job_id} lost its steps"));
            }
        }
        if self.history.len() != before_len + 1 {
            return Err("history did not grow by exactly one entry".to_string());
        }
        if history_digest(&self.history[..before_len]) != before_digest {
            return Err("history prefix was rewritten".to_string());
        }
        Ok(())
    }

    /// Replay is pure — documents are immutable — so greedy removal
    /// converges on a minimal reproducing subsequence.
    fn shrink(&self, sequence: &[Transition], explanation: &str) -> MinimalViolation {
        let mut minimal: Vec<Transition> = sequence.to_vec();
        let mut explanation = explanation.to_string();
        let mut idx = 0;
        while idx < minimal.len() {
            let mut candidate = minimal.clone();
            candidate.remove(idx);
            match self.replay_violation(&candidate) {
                Some(repro) => {
                    minimal = candidate;
                    explanation = repro;
                }
                None => idx += 1,
            }
        }
        MinimalViolation {
            transitions: minimal,
            explanation,
        }
    }

    fn replay_violation(&self, sequence: &[Transition]) -> Option<String> {
        for transition in sequence {
            if let Verdict::Violated { explanation } = self.evaluate(transition) {
                return Some(explanation);
            }
        }
        None
    }

    fn apply(&self, transition: &Transition) -> CheckOutcome {
        CheckOutcome {
            check_id: transition.check_id(),
            verdict: self.evaluate(transition),
        }
    }

    fn evaluate(&self, transition: &Transition) -> Verdict {
        match transition {
            Transition::AssertRuleExists(id) => predicates::rule_exists(self.ruleset, id),
            Transition::AssertRuleDisabled(id) => {
                predicates::rule_disabled_exactly(self.ruleset, id)
            }
            Transition::AssertLineLengthBounded { min, max } => {
                if self.line_length_is_parameterized() {
                    match predicates::line_length_bounded(self.ruleset, *min, *max) {
                        Ok(verdict) => verdict,
                        // Unreachable post variant check; surfaced as a
                        // violation rather than silently dropped.
                        Err(err) => Verdict::violated(err.to_string()),
                    }
                } else {
                    Verdict::NotApplicable
                }
            }
            Transition::AssertExemptionsTyped => {
                if self.line_length_is_parameterized() {
                    match predicates::exemptions_consistent(self.ruleset) {
                        Ok(verdict) => verdict,
                        Err(err) => Verdict::violated(err.to_string()),
                    }
                } else {
                    Verdict::NotApplicable
                }
            }
            Transition::AssertConfigReferenced(path) => {
                predicates::config_referenced(self.pipeline, path)
            }
            Transition::AssertFlagOrder { flag, target } => {
                predicates::flag_precedes_target(self.pipeline, flag, target)
            }
            Transition::AssertStepOrdering { job_index } => {
                match self.pipeline.jobs.get(*job_index) {
                    Some((job_id, job)) => predicates::step_ordering_respected(job_id, job),
                    None => Verdict::NotApplicable,
                }
            }
            Transition::AssertNoSecrets => predicates::no_hardcoded_secret(self.pipeline),
            Transition::AssertTriggers => predicates::trigger_present(self.pipeline),
            Transition::SampleStep {
                job_index,
                step_index,
            } => self.sample_step_verdict(*job_index, *step_index),
        }
    }

    /// Structural sampling: an in-range step must carry a name, an
    /// action reference, or a command body (the loader guarantees the
    /// latter two; an empty sample would mean the document decayed).
    fn sample_step_verdict(&self, job_index: usize, step_index: usize) -> Verdict {
        let Some((job_id, job)) = self.pipeline.jobs.get(job_index) else {
            return Verdict::NotApplicable;
        };
        let Some(step) = job.steps.get(step_index) else {
            return Verdict::NotApplicable;
        };
        let substantial = step.name().is_some()
            || step.action_reference().is_some_and(|r| !r.is_empty())
            || step.command_body().is_some_and(|b| !b.is_empty());
        if substantial {
            Verdict::Satisfied
        } else {
            Verdict::violated(format!("{job_id}.steps[{step_index}] is an empty step"))
        }
    }

    fn line_length_is_parameterized(&self) -> bool {
        RuleId::parse(LINE_LENGTH_RULE)
            .and_then(|id| self.ruleset.rule(&id))
            .is_some_and(|spec| matches!(spec, RuleSpec::Parameterized(_)))
    }

    fn sample_transition(&mut self) -> Transition {
        match self.rng.gen_range(0..10u8) {
            // An empty rule map has no id whose existence can be
            // asserted; the disabled check classifies absent ids as
            // not applicable, so it stands in.
            0 => match self.sample_present_rule() {
                Some(id) => Transition::AssertRuleExists(id),
                None => Transition::AssertRuleDisabled(self.sample_disabled_or_absent_rule()),
            },
            1 => Transition::AssertRuleDisabled(self.sample_disabled_or_absent_rule()),
            2 => {
                let (min, max) = self.sample_spanning_bounds();
                Transition::AssertLineLengthBounded { min, max }
            }
            3 => Transition::AssertExemptionsTyped,
            4 => Transition::AssertConfigReferenced(self.sample_referenced_path()),
            5 => {
                let (flag, target) = self.sample_ordered_tokens();
                Transition::AssertFlagOrder { flag, target }
            }
            6 => Transition::AssertStepOrdering {
                job_index: self.rng.gen_range(0..self.pipeline.jobs.len().max(1)),
            },
            7 => Transition::AssertNoSecrets,
            8 => Transition::AssertTriggers,
            _ => {
                let job_index = self.rng.gen_range(0..self.pipeline.jobs.len().max(1));
                let step_count = self
                    .pipeline
                    .jobs
                    .get(job_index)
                    .map(|(_, job)| job.steps.len())
                    .unwrap_or(0);
                Transition::SampleStep {
                    job_index,
                    // One past the end stays in the sampling pool so the
                    // out-of-range branch is exercised too.
                    step_index: self.rng.gen_range(0..step_count.max(1) + 1),
                }
            }
        }
    }

    fn sample_present_rule(&mut self) -> Option<RuleId> {
        let ids: Vec<&RuleId> = self.ruleset.rule_ids().collect();
        if ids.is_empty() {
            return None;
        }
        Some(ids[self.rng.gen_range(0..ids.len())].clone())
    }

    /// Disabled rules from the document, or synthesized absent ids —
    /// both classes keep `rule_disabled_exactly` off the `Violated`
    /// branch for a consistent document.
    fn sample_disabled_or_absent_rule(&mut self) -> RuleId {
        let disabled: Vec<&RuleId> = self
            .ruleset
            .rules
            .iter()
            .filter(|(_, spec)| spec.is_disabled())
            .map(|(id, _)| id)
            .collect();
        if disabled.is_empty() || self.rng.gen_bool(0.3) {
            return absent_rule_id_for(&mut self.rng, self.ruleset);
        }
        disabled[self.rng.gen_range(0..disabled.len())].clone()
    }

    /// Bounds spanning the configured length, when there is one.
    fn sample_spanning_bounds(&mut self) -> (u32, u32) {
        let length = self
            .ruleset
            .line_length_params()
            .map(|p| p.line_length)
            .unwrap_or(100);
        let min = self.rng.gen_range(1..=length);
        let max = self
            .rng
            .gen_range(length..=length.saturating_mul(4).max(length.saturating_add(1)));
        (min, max)
    }

    fn sample_referenced_path(&mut self) -> String {
        let mut pool: Vec<String> = extract_config_references(self.pipeline)
            .into_iter()
            .map(|r| r.path)
            .collect();
        if let Some(expected) = &self.expected_config {
            pool.push(expected.clone());
        }
        if pool.is_empty() {
            return ".markdownlint.json".to_string();
        }
        pool.swap_remove(self.rng.gen_range(0..pool.len()))
    }

    /// Two tokens from one command body, ordered by first occurrence,
    /// so the flag-order predicate sees a satisfiable pair.
    fn sample_ordered_tokens(&mut self) -> (String, String) {
        let bodies: Vec<&str> = self.pipeline.command_bodies().collect();
        if bodies.is_empty() {
            return ("--config".to_string(), ".markdownlint.json".to_string());
        }
        let body = bodies[self.rng.gen_range(0..bodies.len())];
        let tokens: Vec<&str> = body.split_whitespace().collect();
        if tokens.len() < 2 {
            return ("--config".to_string(), ".markdownlint.json".to_string());
        }
        for _ in 0..8 {
            let a = tokens[self.rng.gen_range(0..tokens.len())];
            let b = tokens[self.rng.gen_range(0..tokens.len())];
            let (Some(at_a), Some(at_b)) = (body.find(a), body.find(b)) else {
                continue;
            };
            if at_a < at_b {
                return (a.to_string(), b.to_string());
            }
            if at_b < at_a {
                return (b.to_string(), a.to_string());
            }
        }
        ("--config".to_string(), ".markdownlint.json".to_string())
    }
}

fn history_digest(history: &[CheckOutcome]) -> String {
    let bytes = serde_json::to_vec(history).unwrap_or_default();
    let hash = Sha256::digest(&bytes);
    format!("{hash:x}")
}

fn absent_rule_id(rng: &mut StdRng) -> RuleId {
    let raw = format!("MD{:03}", rng.gen_range(900..=999));
    RuleId::parse(&raw).expect("synthesized id matches the grammar")
}

fn absent_rule_id_for(rng: &mut StdRng, ruleset: &RuleSetDocument) -> RuleId {
    for _ in 0..32 {
        let candidate = absent_rule_id(rng);
        if ruleset.rule(&candidate).is_none() {
            return candidate;
        }
    }
    absent_rule_id(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_model::{load_pipeline, load_ruleset};

    const RULESET: &str = r#"{
        "default": true,
        "MD013": { "line_length": 350, "code_blocks": false, "tables": false },
        "MD033": false,
        "MD041": false,
        "MD022": false,
        "MD032": false
    }"#;

    const PIPELINE: &str = r#"
name: Update profile
on:
  workflow_dispatch:
  schedule:
    - cron: "0 6 * * 1"
jobs:
  refresh-profile:
    runs-on: ubuntu-latest
    steps:
      - name: Checkout repository
        uses: actions/checkout@v4
      - name: Setup Node.js
        uses: actions/setup-node@v4
      - name: Validate organization markdown
        run: npx --yes markdownlint-cli2 --config .markdownlint.json profile/README.md
      - name: Commit refreshed profile
        run: |
          git add profile/README.md
          git commit -m "chore: refresh profile" || true
          git push
"#;

    fn documents() -> (RuleSetDocument, PipelineDocument) {
        (
            load_ruleset(RULESET.as_bytes()).expect("ruleset loads"),
            load_pipeline(PIPELINE.as_bytes()).expect("pipeline loads"),
        )
    }

    #[test]
    fn consistent_documents_survive_a_full_budget() {
        let (ruleset, pipeline) = documents();
        let mut session = ExplorationSession::new(&ruleset, &pipeline, 7);
        let outcome = session.run(1000);
        assert!(outcome.violation.is_none(), "{:?}", outcome.violation);
        assert_eq!(outcome.transitions_applied, 1000);
        assert_eq!(outcome.history.len(), 1000);
    }

    #[test]
    fn runs_are_deterministic_per_seed() {
        let (ruleset, pipeline) = documents();
        let a = ExplorationSession::new(&ruleset, &pipeline, 42).run(200);
        let b = ExplorationSession::new(&ruleset, &pipeline, 42).run(200);
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_diverge() {
        let (ruleset, pipeline) = documents();
        let a = ExplorationSession::new(&ruleset, &pipeline, 1).run(200);
        let b = ExplorationSession::new(&ruleset, &pipeline, 2).run(200);
        assert_ne!(a.history, b.history);
    }

    #[test]
    fn empty_rule_map_stays_consistent_under_exploration() {
        let ruleset = load_ruleset(br#"{ "default": true }"#).expect("bare default loads");
        let pipeline = load_pipeline(
            b"name: w\non:\n  push:\njobs:\n  j:\n    runs-on: ubuntu-latest\n    steps:\n      - run: npx --yes markdownlint-cli2 --config .markdownlint.json README.md\n",
        )
        .expect("pipeline loads");
        for seed in [0u64, 11, 42] {
            let outcome = ExplorationSession::new(&ruleset, &pipeline, seed).run(300);
            assert!(
                outcome.violation.is_none(),
                "seed {seed}: {:?}",
                outcome.violation
            );
        }
    }

    #[test]
    fn documents_are_unchanged_by_exploration() {
        let (ruleset, pipeline) = documents();
        let ruleset_digest = ruleset.digest.clone();
        let pipeline_digest = pipeline.digest.clone();
        let outcome = ExplorationSession::new(&ruleset, &pipeline, 9).run(200);
        assert!(outcome.violation.is_none());
        assert_eq!(ruleset.digest, ruleset_digest);
        assert_eq!(pipeline.digest, pipeline_digest);
    }

    #[test]
    fn violation_shrinks_to_a_single_transition() {
        let (ruleset, _) = documents();
        let bad_pipeline = load_pipeline(
            b"name: w\non: [push, deployment]\njobs:\n  j:\n    runs-on: ubuntu-latest\n    steps:\n      - run: npx --yes markdownlint-cli2 --config .markdownlint.json README.md\n",
        )
        .expect("loads despite bad trigger");
        let mut session = ExplorationSession::new(&ruleset, &bad_pipeline, 11);
        let outcome = session.run(1000);
        let violation = outcome.violation.expect("bad trigger must surface");
        assert_eq!(violation.transitions.len(), 1);
        assert!(violation.explanation.contains("deployment"));
    }

    #[test]
    fn history_is_append_only_up_to_the_violation() {
        let (ruleset, pipeline) = documents();
        let mut session = ExplorationSession::new(&ruleset, &pipeline, 3);
        let outcome = session.run(50);
        assert_eq!(outcome.history.len(), 50);
        // Re-running a fresh session reproduces the same prefix.
        let again = ExplorationSession::new(&ruleset, &pipeline, 3).run(25);
        assert_eq!(again.history[..], outcome.history[..25]);
    }
}
