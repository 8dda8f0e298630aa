//! Typed rule-set document and its JSON loader.
//!
//! The rule-set artifact is a flat JSON object: one reserved boolean
//! key (`default`) and one entry per lint rule. A rule entry is either
//! the literal `false` (rule disabled) or an object of named
//! sub-options (rule parameterized). The loader validates the full
//! schema up front so invalid documents never reach predicate
//! evaluation.

use crate::error::{ArtifactKind, LoadError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Reserved top-level key controlling rules not named explicitly.
pub const DEFAULT_KEY: &str = "default";

/// The rule id carrying line-length parameters.
pub const LINE_LENGTH_RULE: &str = "MD013";

const LINE_LENGTH_KEY: &str = "line_length";
const CODE_BLOCKS_KEY: &str = "code_blocks";
const TABLES_KEY: &str = "tables";

fn rule_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^MD[0-9]+$").expect("rule id regex must compile"))
}

/// A lint rule identifier: the literal prefix `MD` followed by digits.
///
/// The prefix is case-sensitive; `md013` is not a rule id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn parse(raw: &str) -> Option<RuleId> {
        if rule_id_pattern().is_match(raw) {
            Some(RuleId(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A sub-option value inside a parameterized rule spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
}

impl ParamValue {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(b),
            ParamValue::Int(_) => None,
        }
    }

    pub fn as_int(self) -> Option<i64> {
        match self {
            ParamValue::Int(n) => Some(n),
            ParamValue::Bool(_) => None,
        }
    }

    pub fn type_label(self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
        }
    }
}

/// A rule entry: disabled outright, or parameterized by sub-options.
///
/// The literal `true` is deliberately not representable — enabling a
/// rule without parameters is expressed through `default`, and the
/// loader rejects a bare `true` as a schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleSpec {
    Disabled,
    Parameterized(BTreeMap<String, ParamValue>),
}

impl RuleSpec {
    pub fn is_disabled(&self) -> bool {
        matches!(self, RuleSpec::Disabled)
    }

    pub fn variant_label(&self) -> &'static str {
        match self {
            RuleSpec::Disabled => "disabled",
            RuleSpec::Parameterized(_) => "parameterized",
        }
    }
}

/// Typed view of the line-length rule's parameters.
///
/// The loader guarantees these invariants for the parsed document:
/// `line_length` positive, both exemption flags boolean, no extra keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineLengthParams {
    pub line_length: u32,
    pub code_blocks_exempt: bool,
    pub tables_exempt: bool,
}

/// The rule-set document: parsed once, immutable for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSetDocument {
    pub default_enabled: bool,
    pub rules: BTreeMap<RuleId, RuleSpec>,
    /// Content digest over the canonical re-serialization; two loads
    /// of the same bytes yield the same digest.
    pub digest: String,
}

impl RuleSetDocument {
    pub fn rule(&self, id: &RuleId) -> Option<&RuleSpec> {
        self.rules.get(id)
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = &RuleId> {
        self.rules.keys()
    }

    /// The line-length rule's typed parameters, if the rule is present
    /// and parameterized. Returns `None` when absent; callers that
    /// need to distinguish the `Disabled` variant must inspect
    /// [`RuleSetDocument::rule`] first.
    pub fn line_length_params(&self) -> Option<LineLengthParams> {
        let id = RuleId::parse(LINE_LENGTH_RULE)?;
        match self.rule(&id)? {
            RuleSpec::Disabled => None,
            RuleSpec::Parameterized(params) => typed_line_length(params),
        }
    }
}

fn typed_line_length(params: &BTreeMap<String, ParamValue>) -> Option<LineLengthParams> {
    let line_length = params.get(LINE_LENGTH_KEY)?.as_int()?;
    let code_blocks_exempt = params.get(CODE_BLOCKS_KEY)?.as_bool()?;
    let tables_exempt = params.get(TABLES_KEY)?.as_bool()?;
    Some(LineLengthParams {
        line_length: u32::try_from(line_length).ok()?,
        code_blocks_exempt,
        tables_exempt,
    })
}

fn schema(detail: impl Into<String>) -> LoadError {
    LoadError::schema(ArtifactKind::RuleSet, detail)
}

/// Parse a rule-set document from raw bytes.
///
/// Fatal on malformed JSON or any schema violation; the returned
/// document always satisfies the documented invariants.
pub fn load_ruleset(bytes: &[u8]) -> Result<RuleSetDocument, LoadError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| LoadError::malformed(ArtifactKind::RuleSet, e.to_string()))?;

    let Value::Object(root) = value else {
        return Err(schema("root must be a JSON object, not a scalar or array"));
    };

    let default_value = root
        .get(DEFAULT_KEY)
        .ok_or_else(|| schema("missing reserved 'default' key"))?;
    let Value::Bool(default_enabled) = default_value else {
        return Err(schema("'default' must be a boolean"));
    };

    let mut rules: BTreeMap<RuleId, RuleSpec> = BTreeMap::new();
    for (key, entry) in &root {
        if key.as_str() == DEFAULT_KEY {
            continue;
        }
        let id = RuleId::parse(key)
            .ok_or_else(|| schema(format!("key {key:?} is not a rule id (MD + digits)")))?;
        let spec = parse_rule_spec(&id, entry)?;
        rules.insert(id, spec);
    }

    Ok(RuleSetDocument {
        default_enabled: *default_enabled,
        rules,
        digest: ruleset_digest(&root),
    })
}

fn parse_rule_spec(id: &RuleId, entry: &Value) -> Result<RuleSpec, LoadError> {
    match entry {
        Value::Bool(false) => Ok(RuleSpec::Disabled),
        Value::Bool(true) => Err(schema(format!(
            "{id}: literal true is not a rule spec; use 'default' or parameters"
        ))),
        Value::Object(fields) => {
            let mut params = BTreeMap::new();
            for (name, raw) in fields {
                let value = match raw {
                    Value::Bool(b) => ParamValue::Bool(*b),
                    Value::Number(n) => {
                        let int = n
                            .as_i64()
                            .ok_or_else(|| schema(format!("{id}.{name} must be an integer")))?;
                        ParamValue::Int(int)
                    }
                    other => {
                        return Err(schema(format!(
                            "{id}.{name} must be boolean or integer, got {other}"
                        )));
                    }
                };
                params.insert(name.clone(), value);
            }
            if id.as_str() == LINE_LENGTH_RULE {
                check_line_length_shape(id, &params)?;
            }
            Ok(RuleSpec::Parameterized(params))
        }
        other => Err(schema(format!(
            "{id} must be false or an object of sub-options, got {other}"
        ))),
    }
}

/// The line-length rule must carry exactly the three known keys, with
/// a strictly positive length that fits in 32 bits. Enforced at parse
/// time.
fn check_line_length_shape(
    id: &RuleId,
    params: &BTreeMap<String, ParamValue>,
) -> Result<(), LoadError> {
    let expected = [LINE_LENGTH_KEY, CODE_BLOCKS_KEY, TABLES_KEY];
    for key in expected {
        if !params.contains_key(key) {
            return Err(schema(format!("{id} must specify {key:?}")));
        }
    }
    for key in params.keys() {
        if !expected.contains(&key.as_str()) {
            return Err(schema(format!("{id} has unexpected key {key:?}")));
        }
    }
    let length = params
        .get(LINE_LENGTH_KEY)
        .and_then(|v| v.as_int())
        .ok_or_else(|| schema(format!("{id}.{LINE_LENGTH_KEY} must be an integer")))?;
    if length <= 0 {
        return Err(schema(format!(
            "{id}.{LINE_LENGTH_KEY} must be positive, got {length}"
        )));
    }
    if u32::try_from(length).is_err() {
        return Err(schema(format!(
            "{id}.{LINE_LENGTH_KEY} must fit in an unsigned 32-bit value, got {length}"
        )));
    }
    for key in [CODE_BLOCKS_KEY, TABLES_KEY] {
        let value = params.get(key).copied();
        if value.and_then(ParamValue::as_bool).is_none() {
            return Err(schema(format!("{id}.{key} must be a boolean")));
        }
    }
    Ok(())
}

/// Digest over the canonical (sorted-key, compact) re-serialization.
///
/// serde_json maps are BTreeMaps without the preserve_order feature,
/// so `to_string` is already canonical for our value range.
fn ruleset_digest(root: &serde_json::Map<String, Value>) -> String {
    let canonical =
        serde_json::to_string(&Value::Object(root.clone())).unwrap_or_else(|_| String::new());
    let hash = Sha256::digest(canonical.as_bytes());
    format!("rsd1_{hash:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "default": true,
        "MD013": { "line_length": 350, "code_blocks": false, "tables": false },
        "MD033": false,
        "MD041": false,
        "MD022": false,
        "MD032": false
    }"#;

    #[test]
    fn loads_the_reference_document() {
        let doc = load_ruleset(FIXTURE.as_bytes()).expect("fixture should load");
        assert!(doc.default_enabled);
        assert_eq!(doc.rules.len(), 5);
        let params = doc.line_length_params().expect("MD013 is parameterized");
        assert_eq!(params.line_length, 350);
        assert!(!params.code_blocks_exempt);
        assert!(!params.tables_exempt);
        let md033 = RuleId::parse("MD033").expect("valid id");
        assert!(doc.rule(&md033).expect("MD033 present").is_disabled());
    }

    #[test]
    fn load_is_idempotent() {
        let a = load_ruleset(FIXTURE.as_bytes()).expect("first load");
        let b = load_ruleset(FIXTURE.as_bytes()).expect("second load");
        assert_eq!(a, b);
        assert_eq!(a.digest, b.digest);
    }

    #[test]
    fn rejects_malformed_json() {
        let err = load_ruleset(b"{ \"default\": tru").expect_err("unterminated");
        assert!(matches!(err, LoadError::MalformedDocument { .. }));
    }

    #[test]
    fn rejects_non_object_root() {
        for bytes in [&b"[1, 2]"[..], b"42", b"\"default\""] {
            let err = load_ruleset(bytes).expect_err("root must be an object");
            assert!(matches!(err, LoadError::SchemaViolation { .. }));
        }
    }

    #[test]
    fn rejects_missing_default() {
        let err = load_ruleset(b"{ \"MD033\": false }").expect_err("no default");
        assert!(matches!(err, LoadError::SchemaViolation { .. }));
    }

    #[test]
    fn rejects_non_boolean_default() {
        let err = load_ruleset(b"{ \"default\": 1 }").expect_err("default must be bool");
        assert!(matches!(err, LoadError::SchemaViolation { .. }));
    }

    #[test]
    fn rejects_invalid_rule_key() {
        for key in ["md013", "MD", "MD13x", "rule"] {
            let raw = format!("{{ \"default\": true, {key:?}: false }}");
            let err = load_ruleset(raw.as_bytes()).expect_err("bad rule id");
            assert!(matches!(err, LoadError::SchemaViolation { .. }), "{key}");
        }
    }

    #[test]
    fn rejects_literal_true_rule() {
        let err =
            load_ruleset(b"{ \"default\": true, \"MD033\": true }").expect_err("bare true");
        assert!(matches!(err, LoadError::SchemaViolation { .. }));
    }

    #[test]
    fn rejects_non_positive_line_length() {
        let raw = r#"{
            "default": true,
            "MD013": { "line_length": -5, "code_blocks": false, "tables": false }
        }"#;
        let err = load_ruleset(raw.as_bytes()).expect_err("negative length");
        assert!(matches!(err, LoadError::SchemaViolation { .. }));
        let raw_zero = raw.replace("-5", "0");
        let err = load_ruleset(raw_zero.as_bytes()).expect_err("zero length");
        assert!(matches!(err, LoadError::SchemaViolation { .. }));
    }

    #[test]
    fn rejects_line_length_beyond_u32() {
        let raw = r#"{
            "default": true,
            "MD013": { "line_length": 5000000000, "code_blocks": false, "tables": false }
        }"#;
        let err = load_ruleset(raw.as_bytes()).expect_err("oversized length");
        assert!(matches!(err, LoadError::SchemaViolation { .. }));
        // A loaded document always yields the typed view.
        let max = format!(
            r#"{{ "default": true, "MD013": {{ "line_length": {}, "code_blocks": false, "tables": false }} }}"#,
            u32::MAX
        );
        let doc = load_ruleset(max.as_bytes()).expect("u32::MAX is representable");
        assert_eq!(
            doc.line_length_params().expect("typed view present").line_length,
            u32::MAX
        );
    }

    #[test]
    fn rejects_line_length_rule_with_missing_or_extra_keys() {
        let missing = r#"{ "default": true, "MD013": { "line_length": 80 } }"#;
        let err = load_ruleset(missing.as_bytes()).expect_err("missing keys");
        assert!(matches!(err, LoadError::SchemaViolation { .. }));

        let extra = r#"{
            "default": true,
            "MD013": {
                "line_length": 80, "code_blocks": false, "tables": false,
                "headings": false
            }
        }"#;
        let err = load_ruleset(extra.as_bytes()).expect_err("extra key");
        assert!(matches!(err, LoadError::SchemaViolation { .. }));
    }

    #[test]
    fn rejects_non_scalar_sub_option() {
        let raw = r#"{ "default": true, "MD007": { "indent": [2] } }"#;
        let err = load_ruleset(raw.as_bytes()).expect_err("array sub-option");
        assert!(matches!(err, LoadError::SchemaViolation { .. }));
    }

    #[test]
    fn rule_id_grammar() {
        assert!(RuleId::parse("MD013").is_some());
        assert!(RuleId::parse("MD1").is_some());
        assert!(RuleId::parse("MD000123").is_some());
        assert!(RuleId::parse("md013").is_none());
        assert!(RuleId::parse("MD").is_none());
        assert!(RuleId::parse("MD13 ").is_none());
        assert!(RuleId::parse("XMD13").is_none());
    }
}
