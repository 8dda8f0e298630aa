//! Typed pipeline descriptor and its YAML loader.
//!
//! The pipeline artifact is a CI workflow: a named document with a set
//! of trigger events and an ordered mapping of jobs, each an ordered
//! sequence of steps. A step either invokes a reusable action by
//! reference or runs an inline command. The loader validates structure
//! only — it does not execute anything and does not resolve action
//! references.

use crate::error::{ArtifactKind, LoadError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_yaml::Value;
use sha2::{Digest, Sha256};

/// The recognized trigger events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    WorkflowDispatch,
    Schedule,
    Push,
    PullRequest,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 4] = [
        TriggerKind::WorkflowDispatch,
        TriggerKind::Schedule,
        TriggerKind::Push,
        TriggerKind::PullRequest,
    ];

    pub fn from_name(name: &str) -> Option<TriggerKind> {
        match name {
            "workflow_dispatch" => Some(TriggerKind::WorkflowDispatch),
            "schedule" => Some(TriggerKind::Schedule),
            "push" => Some(TriggerKind::Push),
            "pull_request" => Some(TriggerKind::PullRequest),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TriggerKind::WorkflowDispatch => "workflow_dispatch",
            TriggerKind::Schedule => "schedule",
            TriggerKind::Push => "push",
            TriggerKind::PullRequest => "pull_request",
        }
    }
}

/// One workflow step: an action invocation or an inline command.
///
/// A step mapping with neither an action reference nor a command body
/// is rejected by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    Action {
        name: Option<String>,
        reference: String,
    },
    Command {
        name: Option<String>,
        body: String,
    },
}

impl Step {
    pub fn name(&self) -> Option<&str> {
        match self {
            Step::Action { name, .. } | Step::Command { name, .. } => name.as_deref(),
        }
    }

    pub fn command_body(&self) -> Option<&str> {
        match self {
            Step::Command { body, .. } => Some(body),
            Step::Action { .. } => None,
        }
    }

    pub fn action_reference(&self) -> Option<&str> {
        match self {
            Step::Action { reference, .. } => Some(reference),
            Step::Command { .. } => None,
        }
    }

    /// Lowercased name + reference/body, the haystack ordering
    /// predicates match against.
    pub fn searchable_text(&self) -> String {
        let mut text = String::new();
        if let Some(name) = self.name() {
            text.push_str(&name.to_lowercase());
            text.push('\n');
        }
        match self {
            Step::Action { reference, .. } => text.push_str(&reference.to_lowercase()),
            Step::Command { body, .. } => text.push_str(&body.to_lowercase()),
        }
        text
    }
}

/// One job: an execution environment and a non-empty ordered step list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub runner: String,
    pub steps: Vec<Step>,
}

/// The pipeline document: parsed once, immutable for a session.
///
/// Triggers are kept as the raw event names found in the document so
/// that the trigger predicate can classify unrecognized names instead
/// of the loader erasing them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDocument {
    pub name: String,
    pub triggers: Vec<String>,
    pub jobs: Vec<(String, Job)>,
    pub digest: String,
}

impl PipelineDocument {
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs
            .iter()
            .find(|(job_id, _)| job_id == id)
            .map(|(_, job)| job)
    }

    pub fn command_bodies(&self) -> impl Iterator<Item = &str> {
        self.jobs
            .iter()
            .flat_map(|(_, job)| job.steps.iter())
            .filter_map(Step::command_body)
    }
}

fn schema(detail: impl Into<String>) -> LoadError {
    LoadError::schema(ArtifactKind::Pipeline, detail)
}

fn as_non_empty_str(value: &Value, label: &str) -> Result<String, LoadError> {
    let raw = value
        .as_str()
        .ok_or_else(|| schema(format!("{label} must be a string")))?;
    if raw.trim().is_empty() {
        return Err(schema(format!("{label} must be non-empty")));
    }
    Ok(raw.to_string())
}

/// Parse a pipeline descriptor from raw bytes.
pub fn load_pipeline(bytes: &[u8]) -> Result<PipelineDocument, LoadError> {
    let value: Value = serde_yaml::from_slice(bytes)
        .map_err(|e| LoadError::malformed(ArtifactKind::Pipeline, e.to_string()))?;

    let Value::Mapping(root) = value else {
        return Err(schema("root must be a mapping, not a scalar or sequence"));
    };

    let name_value = root
        .get("name")
        .ok_or_else(|| schema("missing 'name' key"))?;
    let name = as_non_empty_str(name_value, "name")?;

    // YAML 1.1 parsers resolve a bare `on` key to boolean true; accept
    // both spellings so either serialization loads.
    let on_value = root
        .get("on")
        .or_else(|| root.get(Value::Bool(true)))
        .ok_or_else(|| schema("missing 'on' trigger block"))?;
    let triggers = parse_triggers(on_value)?;

    let jobs_value = root
        .get("jobs")
        .ok_or_else(|| schema("missing 'jobs' key"))?;
    let Value::Mapping(jobs_map) = jobs_value else {
        return Err(schema("'jobs' must be a mapping"));
    };
    if jobs_map.is_empty() {
        return Err(schema("'jobs' must contain at least one job"));
    }

    let mut jobs = Vec::with_capacity(jobs_map.len());
    for (key, job_value) in jobs_map {
        let job_id = key
            .as_str()
            .ok_or_else(|| schema("job ids must be strings"))?
            .to_string();
        let job = parse_job(&job_id, job_value)?;
        jobs.push((job_id, job));
    }

    let digest = pipeline_digest(&name, &triggers, &jobs);
    Ok(PipelineDocument {
        name,
        triggers,
        jobs,
        digest,
    })
}

fn parse_triggers(on_value: &Value) -> Result<Vec<String>, LoadError> {
    match on_value {
        Value::Mapping(events) => {
            let mut names = Vec::with_capacity(events.len());
            for (key, _config) in events {
                names.push(as_non_empty_str(key, "trigger name")?);
            }
            Ok(names)
        }
        Value::Sequence(events) => {
            let mut names = Vec::with_capacity(events.len());
            for event in events {
                names.push(as_non_empty_str(event, "trigger name")?);
            }
            Ok(names)
        }
        Value::String(single) => Ok(vec![single.clone()]),
        other => Err(schema(format!(
            "'on' must be a mapping, sequence, or string, got {other:?}"
        ))),
    }
}

fn parse_job(job_id: &str, job_value: &Value) -> Result<Job, LoadError> {
    let Value::Mapping(fields) = job_value else {
        return Err(schema(format!("job {job_id:?} must be a mapping")));
    };

    let runner_value = fields
        .get("runs-on")
        .ok_or_else(|| schema(format!("job {job_id:?} must specify 'runs-on'")))?;
    let runner = as_non_empty_str(runner_value, &format!("{job_id}.runs-on"))?;

    let steps_value = fields
        .get("steps")
        .ok_or_else(|| schema(format!("job {job_id:?} must have 'steps'")))?;
    let Value::Sequence(raw_steps) = steps_value else {
        return Err(schema(format!("job {job_id:?} steps must be a sequence")));
    };
    if raw_steps.is_empty() {
        return Err(schema(format!(
            "job {job_id:?} must have at least one step"
        )));
    }

    let mut steps = Vec::with_capacity(raw_steps.len());
    for (idx, raw) in raw_steps.iter().enumerate() {
        steps.push(parse_step(job_id, idx, raw)?);
    }
    Ok(Job { runner, steps })
}

fn parse_step(job_id: &str, idx: usize, raw: &Value) -> Result<Step, LoadError> {
    let Value::Mapping(fields) = raw else {
        return Err(schema(format!("{job_id}.steps[{idx}] must be a mapping")));
    };

    let name = match fields.get("name") {
        Some(value) => Some(as_non_empty_str(value, &format!("{job_id}.steps[{idx}].name"))?),
        None => None,
    };
    let uses = fields.get("uses");
    let run = fields.get("run");

    match (uses, run) {
        (Some(reference), _) => Ok(Step::Action {
            name,
            reference: as_non_empty_str(reference, &format!("{job_id}.steps[{idx}].uses"))?,
        }),
        (None, Some(body)) => Ok(Step::Command {
            name,
            body: as_non_empty_str(body, &format!("{job_id}.steps[{idx}].run"))?,
        }),
        (None, None) => Err(schema(format!(
            "{job_id}.steps[{idx}] must have 'uses' or 'run'"
        ))),
    }
}

/// Digest over a canonical JSON projection of the parsed structure;
/// stable across loads of the same bytes.
fn pipeline_digest(name: &str, triggers: &[String], jobs: &[(String, Job)]) -> String {
    let projection = json!({
        "name": name,
        "triggers": triggers,
        "jobs": jobs,
    });
    let canonical = projection.to_string();
    let hash = Sha256::digest(canonical.as_bytes());
    format!("pld1_{hash:x}")
}
