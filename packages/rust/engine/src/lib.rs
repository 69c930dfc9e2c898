//! RDFox process wrapper: file staging and scoped engine sessions.
//!
//! A stage is run in three steps:
//! 1. build a [`StagedTree`] with a [`TreeBuilder`] (collisions fail fast),
//! 2. materialise it into a [`Workspace`] (caller-owned or ephemeral),
//! 3. start an [`EngineSession`] with [`RdfoxEngine::run`] and wait for its
//!    [`Readiness`] condition.
//!
//! The session owns the subprocess and the workspace; dropping it kills the
//! engine and removes an ephemeral workspace on every exit path.

mod session;
mod staging;

pub use session::{EngineConfig, EngineSession, RdfoxEngine, Readiness, SESSION_SCRIPT, SessionScript};
pub use staging::{FileSource, StagedTree, TreeBuilder, Workspace};
