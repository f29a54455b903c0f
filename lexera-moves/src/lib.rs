//! Optimistic move reconciliation for kanban boards.
//!
//! Local drags are applied to the board immediately, sent to the server in the
//! background, then either confirmed or rolled back. Moves pushed by other
//! collaborators are merged through the same applier, arbitrated by version.

pub mod api;
pub mod apply;
pub mod config;
pub mod engine;
pub mod error;
pub mod policy;
pub mod protocol;
pub mod realtime;
pub mod store;
pub mod types;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{MoveEngine, MoveOutcome, MutationId, MutationState, Submission};
pub use error::{MoveError, MoveResult};
