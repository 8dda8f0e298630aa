//! Invariant checking over a loaded configuration artifact pair.
//!
//! This crate evaluates a fixed set of consistency invariants across a
//! lint rule-set document and a CI pipeline descriptor, and emits a
//! deterministic validation report. Three surfaces:
//!
//! - [`predicates`]: pure ternary-verdict predicates over the typed
//!   documents;
//! - [`ValidationSession`]: load once, run the canonical suite,
//!   aggregate a [`ValidationReport`];
//! - [`ExplorationSession`]: seeded stateful exploration applying
//!   randomized predicate transitions while global invariants are
//!   re-checked after every step.

pub mod predicates;

mod explore;
mod session;
mod store;
mod verdict;

pub use explore::{ExplorationOutcome, ExplorationSession, MinimalViolation, Transition};
pub use predicates::{CheckError, SECRET_KEY_PATTERNS};
pub use session::{SessionError, SessionPlan, ValidationSession};
pub use store::{ArtifactStore, FixedArtifactStore};
pub use verdict::{CheckOutcome, ValidationReport, Verdict};
