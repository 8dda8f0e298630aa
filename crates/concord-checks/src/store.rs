//! The file-access collaborator seam.
//!
//! The validator never touches the filesystem itself. Whether a
//! referenced path exists is answered by an [`ArtifactStore`], so
//! sessions and tests can run against a fixed in-memory view.

use std::collections::BTreeSet;

/// External collaborator answering file-existence queries.
pub trait ArtifactStore {
    fn exists(&self, path: &str) -> bool;
}

/// An in-memory store over a fixed set of repository paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedArtifactStore {
    paths: BTreeSet<String>,
}

impl FixedArtifactStore {
    pub fn with_paths<I, S>(paths: I) -> FixedArtifactStore
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FixedArtifactStore {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl ArtifactStore for FixedArtifactStore {
    fn exists(&self, path: &str) -> bool {
        self.paths.contains(path)
    }
}
