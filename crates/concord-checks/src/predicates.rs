//! The canonical invariant predicates.
//!
//! Each predicate is a total pure function over one or two loaded
//! documents. Results are ternary ([`Verdict`]); predicates never
//! perform I/O and never raise for well-typed documents. The one
//! exception is [`CheckError::TypeMismatch`]: invoking a predicate
//! that presupposes a parameterized rule spec against a `Disabled`
//! one is a defect in the calling harness, not in the document, and
//! is propagated as a hard failure.

use crate::store::ArtifactStore;
use crate::verdict::Verdict;
use concord_model::{
    Job, LINE_LENGTH_RULE, ParamValue, PipelineDocument, RuleId, RuleSetDocument, RuleSpec,
    TriggerKind, extract_config_references,
};

/// Credential-looking key patterns that must never appear in a step
/// name or body. Matched case-insensitively.
pub const SECRET_KEY_PATTERNS: &[&str] =
    &["password:", "api_key:", "secret_key:", "access_token:"];

const CODE_BLOCKS_KEY: &str = "code_blocks";
const TABLES_KEY: &str = "tables";

/// Harness-side contract violations. Never recorded as `Violated`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    /// A predicate expecting a parameterized rule spec was invoked
    /// against an incompatible variant. Callers must check the
    /// variant first.
    #[error("type mismatch on {rule}: expected {expected} spec, got {actual}")]
    TypeMismatch {
        rule: RuleId,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Satisfied iff the rule id is present in the rule-set.
pub fn rule_exists(ruleset: &RuleSetDocument, id: &RuleId) -> Verdict {
    if ruleset.rule(id).is_some() {
        Verdict::Satisfied
    } else {
        Verdict::violated(format!("rule {id} is not configured"))
    }
}

/// Satisfied iff the rule is present and is the `Disabled` variant.
/// Absent rules are not applicable, not violations.
pub fn rule_disabled_exactly(ruleset: &RuleSetDocument, id: &RuleId) -> Verdict {
    match ruleset.rule(id) {
        None => Verdict::NotApplicable,
        Some(RuleSpec::Disabled) => Verdict::Satisfied,
        Some(RuleSpec::Parameterized(_)) => {
            Verdict::violated(format!("rule {id} is parameterized, not disabled"))
        }
    }
}

/// Satisfied iff the line-length rule's configured length falls in
/// `[min, max]` inclusive.
pub fn line_length_bounded(
    ruleset: &RuleSetDocument,
    min: u32,
    max: u32,
) -> Result<Verdict, CheckError> {
    let params = match line_length_spec(ruleset)? {
        None => return Ok(Verdict::NotApplicable),
        Some(params) => params,
    };
    let length = match params.get("line_length").and_then(|v| v.as_int()) {
        Some(n) => n,
        None => {
            return Ok(Verdict::violated(format!(
                "{LINE_LENGTH_RULE}.line_length missing or not an integer"
            )));
        }
    };
    let in_bounds = length >= i64::from(min) && length <= i64::from(max);
    if in_bounds {
        Ok(Verdict::Satisfied)
    } else {
        Ok(Verdict::violated(format!(
            "{LINE_LENGTH_RULE}.line_length {length} outside [{min}, {max}]"
        )))
    }
}

/// Satisfied iff both exemption flags of the line-length rule are
/// present and boolean-typed. A type check, not a value check.
pub fn exemptions_consistent(ruleset: &RuleSetDocument) -> Result<Verdict, CheckError> {
    let params = match line_length_spec(ruleset)? {
        None => return Ok(Verdict::NotApplicable),
        Some(params) => params,
    };
    for key in [CODE_BLOCKS_KEY, TABLES_KEY] {
        match params.get(key) {
            Some(ParamValue::Bool(_)) => {}
            Some(other) => {
                return Ok(Verdict::violated(format!(
                    "{LINE_LENGTH_RULE}.{key} must be boolean, got {}",
                    other.type_label()
                )));
            }
            None => {
                return Ok(Verdict::violated(format!(
                    "{LINE_LENGTH_RULE}.{key} is missing"
                )));
            }
        }
    }
    Ok(Verdict::Satisfied)
}

fn line_length_spec(
    ruleset: &RuleSetDocument,
) -> Result<Option<&std::collections::BTreeMap<String, ParamValue>>, CheckError> {
    let id = match RuleId::parse(LINE_LENGTH_RULE) {
        Some(id) => id,
        None => return Ok(None),
    };
    match ruleset.rule(&id) {
        None => Ok(None),
        Some(RuleSpec::Parameterized(params)) => Ok(Some(params)),
        Some(spec @ RuleSpec::Disabled) => Err(CheckError::TypeMismatch {
            rule: id,
            expected: "parameterized",
            actual: spec.variant_label(),
        }),
    }
}

/// Satisfied iff some command step body contains the path as an exact
/// substring.
pub fn config_referenced(pipeline: &PipelineDocument, path: &str) -> Verdict {
    if pipeline.command_bodies().any(|body| body.contains(path)) {
        Verdict::Satisfied
    } else {
        Verdict::violated(format!("no command step references {path:?}"))
    }
}

/// Satisfied iff, in the first command body containing both, the
/// flag's first occurrence strictly precedes the path's.
pub fn flag_precedes_target(pipeline: &PipelineDocument, flag: &str, path: &str) -> Verdict {
    for body in pipeline.command_bodies() {
        let (Some(flag_at), Some(path_at)) = (body.find(flag), body.find(path)) else {
            continue;
        };
        return if flag_at < path_at {
            Verdict::Satisfied
        } else {
            Verdict::violated(format!(
                "{flag:?} occurs at {flag_at}, after {path:?} at {path_at}"
            ))
        };
    }
    Verdict::NotApplicable
}

/// Tools whose use in a command body requires a prior setup step
/// mentioning the environment name.
const ENVIRONMENT_TOOLS: &[(&str, &[&str])] = &[("node", &["npm", "npx"])];

/// Evaluates the logical dependency order over one job's step
/// sequence: source checkout precedes command execution, environment
/// setup precedes first use of that environment's tool, and
/// validation precedes commit.
///
/// Each clause holds for every step of its class: the last step that
/// must come first is compared against the first step that must come
/// after, so a late straggler (a second validate step after the
/// commit) is still an inversion.
pub fn step_ordering_respected(job_id: &str, job: &Job) -> Verdict {
    let texts: Vec<String> = job.steps.iter().map(|s| s.searchable_text()).collect();

    let mut evaluated = false;

    // Every checkout precedes every non-checkout command.
    let last_checkout = texts.iter().rposition(|t| t.contains("checkout"));
    let first_foreign_command = job
        .steps
        .iter()
        .enumerate()
        .position(|(idx, step)| step.command_body().is_some() && !texts[idx].contains("checkout"));
    if let (Some(checkout_at), Some(command_at)) = (last_checkout, first_foreign_command) {
        evaluated = true;
        if checkout_at > command_at {
            return Verdict::violated(format!(
                "{job_id}: checkout at step {checkout_at} follows command execution at step {command_at}"
            ));
        }
    }

    // Every environment setup precedes the first use of its tool.
    for (environment, tools) in ENVIRONMENT_TOOLS {
        let last_setup = texts
            .iter()
            .rposition(|t| t.contains("setup") && t.contains(environment));
        let first_use = job.steps.iter().enumerate().position(|(idx, step)| {
            step.command_body().is_some() && tools.iter().any(|tool| texts[idx].contains(tool))
        });
        if let (Some(setup_at), Some(use_at)) = (last_setup, first_use) {
            evaluated = true;
            if setup_at > use_at {
                return Verdict::violated(format!(
                    "{job_id}: {environment} setup at step {setup_at} follows its first use at step {use_at}"
                ));
            }
        }
    }

    // Every validation precedes every commit.
    let last_validate = job
        .steps
        .iter()
        .rposition(|s| {
            s.name()
                .map(|n| {
                    let n = n.to_lowercase();
                    n.contains("validate") || n.contains("verify")
                })
                .unwrap_or(false)
        });
    let first_commit = texts.iter().position(|t| t.contains("commit"));
    if let (Some(validate_at), Some(commit_at)) = (last_validate, first_commit) {
        evaluated = true;
        if validate_at > commit_at {
            return Verdict::violated(format!(
                "{job_id}: validation at step {validate_at} follows commit at step {commit_at}"
            ));
        }
    }

    if evaluated {
        Verdict::Satisfied
    } else {
        Verdict::NotApplicable
    }
}

/// Satisfied iff no step name or body contains a credential-looking
/// key pattern.
pub fn no_hardcoded_secret(pipeline: &PipelineDocument) -> Verdict {
    for (job_id, job) in &pipeline.jobs {
        for (idx, step) in job.steps.iter().enumerate() {
            let haystack = step.searchable_text();
            for pattern in SECRET_KEY_PATTERNS {
                if haystack.contains(pattern) {
                    return Verdict::violated(format!(
                        "{job_id}.steps[{idx}] contains credential pattern {pattern:?}"
                    ));
                }
            }
        }
    }
    Verdict::Satisfied
}

/// Satisfied iff the trigger set is non-empty and every member is a
/// recognized trigger kind.
pub fn trigger_present(pipeline: &PipelineDocument) -> Verdict {
    if pipeline.triggers.is_empty() {
        return Verdict::violated("pipeline declares no triggers");
    }
    for name in &pipeline.triggers {
        if TriggerKind::from_name(name).is_none() {
            return Verdict::violated(format!("unrecognized trigger {name:?}"));
        }
    }
    Verdict::Satisfied
}

/// Cross-document check: every config reference extracted from the
/// pipeline names a file the collaborator can see, and a reference to
/// the rule-set's own path must match it exactly — no `./` or
/// absolute-path aliasing.
pub fn references_resolve(
    pipeline: &PipelineDocument,
    store: &dyn ArtifactStore,
    ruleset_path: &str,
) -> Verdict {
    let refs = extract_config_references(pipeline);
    if refs.is_empty() {
        return Verdict::NotApplicable;
    }
    for reference in &refs {
        let path = reference.path.as_str();
        let normalized = path.trim_start_matches("./").trim_start_matches('/');
        if normalized == ruleset_path && path != ruleset_path {
            return Verdict::violated(format!(
                "{}.steps[{}] aliases the rule-set path as {path:?}, expected {ruleset_path:?}",
                reference.job_id, reference.step_index
            ));
        }
        if !store.exists(path) {
            return Verdict::violated(format!(
                "{}.steps[{}] references missing file {path:?}",
                reference.job_id, reference.step_index
            ));
        }
    }
    Verdict::Satisfied
}
