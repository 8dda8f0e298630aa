//! Error types for document loading.

use serde::{Deserialize, Serialize};

/// Which of the two configuration artifacts an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    RuleSet,
    Pipeline,
}

impl ArtifactKind {
    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::RuleSet => "rule-set",
            ArtifactKind::Pipeline => "pipeline",
        }
    }
}

/// Errors arising while turning raw bytes into a typed document.
///
/// Both variants are fatal for a validation session: a document that
/// fails to load never reaches predicate evaluation.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The byte stream is not well-formed in its serialization grammar.
    #[error("malformed {} document: {detail}", artifact.label())]
    MalformedDocument {
        artifact: ArtifactKind,
        detail: String,
    },

    /// The bytes parse, but the parsed structure violates the document
    /// schema (wrong root shape, bad rule id, non-positive line length).
    #[error("{} schema violation: {detail}", artifact.label())]
    SchemaViolation {
        artifact: ArtifactKind,
        detail: String,
    },
}

impl LoadError {
    pub fn malformed(artifact: ArtifactKind, detail: impl Into<String>) -> Self {
        LoadError::MalformedDocument {
            artifact,
            detail: detail.into(),
        }
    }

    pub fn schema(artifact: ArtifactKind, detail: impl Into<String>) -> Self {
        LoadError::SchemaViolation {
            artifact,
            detail: detail.into(),
        }
    }

    pub fn artifact(&self) -> ArtifactKind {
        match self {
            LoadError::MalformedDocument { artifact, .. } => *artifact,
            LoadError::SchemaViolation { artifact, .. } => *artifact,
        }
    }
}
