//! One validation session: load both documents once, evaluate the
//! canonical check suite, aggregate a report.
//!
//! Fatal errors (a document failing to load, a harness-side type
//! mismatch) abort the session with the failing artifact's identity.
//! `Violated` verdicts are recorded and never abort — every remaining
//! check still runs.

use crate::predicates;
use crate::predicates::CheckError;
use crate::store::ArtifactStore;
use crate::verdict::{ValidationReport, Verdict};
use concord_model::{
    LINE_LENGTH_RULE, LoadError, PipelineDocument, RuleId, RuleSetDocument, RuleSpec,
    load_pipeline, load_ruleset,
};

/// Errors that abort a session outright.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Check(#[from] CheckError),
}

/// The example-oracle table: hand-picked expectations the canonical
/// suite asserts against the loaded documents.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    /// Inclusive bounds the line-length rule must fall in.
    pub line_length_bounds: (u32, u32),
    /// Rules expected to be the `Disabled` variant.
    pub expect_disabled: Vec<RuleId>,
    /// Rule pairs whose specs must move together.
    pub coupled_rules: Vec<(RuleId, RuleId)>,
    /// Flag/target pairs where the flag must precede the target within
    /// one command body.
    pub flag_order: Vec<(String, String)>,
}

impl SessionPlan {
    /// The standard plan for the markdownlint/workflow artifact pair.
    pub fn standard() -> SessionPlan {
        let id = |raw: &str| RuleId::parse(raw).expect("standard plan rule ids are valid");
        SessionPlan {
            line_length_bounds: (80, 500),
            expect_disabled: vec![id("MD033"), id("MD041"), id("MD022"), id("MD032")],
            coupled_rules: vec![(id("MD022"), id("MD032"))],
            flag_order: vec![("--config".to_string(), "profile/README.md".to_string())],
        }
    }
}

/// A loaded document pair plus the collaborator view it was loaded
/// against. Both documents are immutable for the session's lifetime.
#[derive(Debug)]
pub struct ValidationSession<S: ArtifactStore> {
    ruleset: RuleSetDocument,
    pipeline: PipelineDocument,
    store: S,
    ruleset_path: String,
}

impl<S: ArtifactStore> ValidationSession<S> {
    /// Parse both byte streams. A document that fails to load aborts
    /// the session before any check runs; no partial report exists.
    pub fn load(
        ruleset_bytes: &[u8],
        pipeline_bytes: &[u8],
        store: S,
        ruleset_path: impl Into<String>,
    ) -> Result<ValidationSession<S>, SessionError> {
        let ruleset = load_ruleset(ruleset_bytes)?;
        let pipeline = load_pipeline(pipeline_bytes)?;
        Ok(ValidationSession {
            ruleset,
            pipeline,
            store,
            ruleset_path: ruleset_path.into(),
        })
    }

    pub fn ruleset(&self) -> &RuleSetDocument {
        &self.ruleset
    }

    pub fn pipeline(&self) -> &PipelineDocument {
        &self.pipeline
    }

    pub fn ruleset_path(&self) -> &str {
        &self.ruleset_path
    }

    /// Evaluate the canonical check suite against the loaded pair.
    pub fn run(&self, plan: &SessionPlan) -> Result<ValidationReport, SessionError> {
        let mut report = ValidationReport::new();

        for id in self.ruleset.rule_ids() {
            report.record(
                format!("ruleset.rule_exists.{id}"),
                predicates::rule_exists(&self.ruleset, id),
            );
        }

        for id in &plan.expect_disabled {
            report.record(
                format!("ruleset.rule_disabled.{id}"),
                predicates::rule_disabled_exactly(&self.ruleset, id),
            );
        }

        let (min, max) = plan.line_length_bounds;
        report.record(
            format!("ruleset.line_length_bounded.{min}.{max}"),
            self.guarded_line_length(min, max)?,
        );
        report.record(
            "ruleset.exemptions_typed",
            self.guarded_exemptions()?,
        );

        for (left, right) in &plan.coupled_rules {
            report.record(
                format!("ruleset.rules_move_together.{left}.{right}"),
                rules_move_together(&self.ruleset, left, right),
            );
        }

        report.record(
            "cross.config_referenced",
            predicates::config_referenced(&self.pipeline, &self.ruleset_path),
        );
        for (flag, target) in &plan.flag_order {
            report.record(
                format!("pipeline.flag_order.{flag}"),
                predicates::flag_precedes_target(&self.pipeline, flag, target),
            );
        }

        for (job_id, job) in &self.pipeline.jobs {
            report.record(
                format!("pipeline.step_ordering.{job_id}"),
                predicates::step_ordering_respected(job_id, job),
            );
        }
        report.record(
            "pipeline.secret_scan",
            predicates::no_hardcoded_secret(&self.pipeline),
        );
        report.record(
            "pipeline.triggers",
            predicates::trigger_present(&self.pipeline),
        );

        report.record(
            "cross.references_resolve",
            predicates::references_resolve(&self.pipeline, &self.store, &self.ruleset_path),
        );

        Ok(report)
    }

    /// The bounded-length predicate presupposes a parameterized spec;
    /// check the variant first so a disabled rule reads as
    /// not-applicable instead of tripping the harness contract.
    fn guarded_line_length(&self, min: u32, max: u32) -> Result<Verdict, CheckError> {
        if self.line_length_is_disabled() {
            return Ok(Verdict::NotApplicable);
        }
        predicates::line_length_bounded(&self.ruleset, min, max)
    }

    fn guarded_exemptions(&self) -> Result<Verdict, CheckError> {
        if self.line_length_is_disabled() {
            return Ok(Verdict::NotApplicable);
        }
        predicates::exemptions_consistent(&self.ruleset)
    }

    fn line_length_is_disabled(&self) -> bool {
        RuleId::parse(LINE_LENGTH_RULE)
            .and_then(|id| self.ruleset.rule(&id).cloned())
            .is_some_and(|spec| spec.is_disabled())
    }
}

/// Two rules "move together" when their specs are structurally equal.
/// Domain folklore for the spacing rules, not an engine invariant;
/// see DESIGN.md.
fn rules_move_together(ruleset: &RuleSetDocument, left: &RuleId, right: &RuleId) -> Verdict {
    match (ruleset.rule(left), ruleset.rule(right)) {
        (Some(a), Some(b)) if a == b => Verdict::Satisfied,
        (Some(RuleSpec::Disabled), Some(RuleSpec::Parameterized(_)))
        | (Some(RuleSpec::Parameterized(_)), Some(RuleSpec::Disabled)) => Verdict::violated(
            format!("{left} and {right} disagree on the disabled/parameterized split"),
        ),
        (Some(_), Some(_)) => {
            Verdict::violated(format!("{left} and {right} carry different parameters"))
        }
        _ => Verdict::NotApplicable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FixedArtifactStore;

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

    fn store() -> FixedArtifactStore {
        FixedArtifactStore::with_paths([".markdownlint.json", "profile/README.md"])
    }

    fn session() -> ValidationSession<FixedArtifactStore> {
        ValidationSession::load(
            RULESET.as_bytes(),
            PIPELINE.as_bytes(),
            store(),
            ".markdownlint.json",
        )
        .expect("fixture pair loads")
    }

    #[test]
    fn canonical_suite_passes_on_the_fixture_pair() {
        let report = session().run(&SessionPlan::standard()).expect("no fatal error");
        assert!(report.passed(), "violations: {:?}", report.checks);
        assert_eq!(report.violated, 0);
        assert!(report.satisfied > 10);
        assert!(
            report
                .checks
                .get("ruleset.line_length_bounded.80.500")
                .expect("bounded check recorded")
                .is_satisfied()
        );
        assert!(
            report
                .checks
                .get("cross.references_resolve")
                .expect("cross check recorded")
                .is_satisfied()
        );
    }

    #[test]
    fn violations_are_recorded_without_aborting() {
        let leaky = PIPELINE.replace(
            "git push",
            "git push\n          echo \"api_key: hunter2\" > creds.yml",
        );
        let session = ValidationSession::load(
            RULESET.as_bytes(),
            leaky.as_bytes(),
            store(),
            ".markdownlint.json",
        )
        .expect("still loads");
        let report = session.run(&SessionPlan::standard()).expect("no fatal error");
        assert!(!report.passed());
        assert!(
            report
                .checks
                .get("pipeline.secret_scan")
                .expect("secret scan recorded")
                .is_violated()
        );
        // Everything else still ran.
        assert!(
            report
                .checks
                .get("pipeline.triggers")
                .expect("trigger check recorded")
                .is_satisfied()
        );
    }

    #[test]
    fn fatal_load_error_yields_no_report() {
        let err = ValidationSession::load(
            b"{ not json",
            PIPELINE.as_bytes(),
            store(),
            ".markdownlint.json",
        )
        .expect_err("malformed ruleset is fatal");
        assert!(matches!(
            err,
            SessionError::Load(LoadError::MalformedDocument { .. })
        ));
    }

    #[test]
    fn disabled_line_length_rule_reads_as_not_applicable() {
        let ruleset = r#"{ "default": true, "MD013": false, "MD022": false, "MD032": false }"#;
        let session = ValidationSession::load(
            ruleset.as_bytes(),
            PIPELINE.as_bytes(),
            store(),
            ".markdownlint.json",
        )
        .expect("loads");
        let report = session.run(&SessionPlan::standard()).expect("no fatal error");
        assert!(
            report
                .checks
                .get("ruleset.line_length_bounded.80.500")
                .expect("recorded")
                .is_not_applicable()
        );
        assert!(
            report
                .checks
                .get("ruleset.exemptions_typed")
                .expect("recorded")
                .is_not_applicable()
        );
    }

    #[test]
    fn coupled_rules_disagreeing_is_a_violation() {
        let ruleset = r#"{
            "default": true,
            "MD013": { "line_length": 350, "code_blocks": false, "tables": false },
            "MD022": false,
            "MD032": { "indent": 2 },
            "MD033": false,
            "MD041": false
        }"#;
        let session = ValidationSession::load(
            ruleset.as_bytes(),
            PIPELINE.as_bytes(),
            store(),
            ".markdownlint.json",
        )
        .expect("loads");
        let report = session.run(&SessionPlan::standard()).expect("no fatal error");
        assert!(
            report
                .checks
                .get("ruleset.rules_move_together.MD022.MD032")
                .expect("coupling recorded")
                .is_violated()
        );
    }
}
