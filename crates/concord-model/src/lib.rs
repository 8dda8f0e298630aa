//! Typed document model for cross-artifact configuration validation.
//!
//! Two independently-authored artifacts are loaded into immutable typed
//! documents: a lint rule-set (JSON) and a CI pipeline descriptor
//! (YAML). The loaders validate each document's schema up front, so a
//! document that loads at all satisfies its declared invariants.

mod error;
mod pipeline;
mod reference;
mod ruleset;

pub use error::{ArtifactKind, LoadError};
pub use pipeline::{Job, PipelineDocument, Step, TriggerKind, load_pipeline};
pub use reference::{ConfigReference, extract_config_references};
pub use ruleset::{
    DEFAULT_KEY, LINE_LENGTH_RULE, LineLengthParams, ParamValue, RuleId, RuleSetDocument,
    RuleSpec, load_ruleset,
};
