use serde::Serialize;
use thiserror::Error;

use crate::host::{ActorHandle, HostError};

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("controller too far from scene start ({distance_sq:.3} squared units)")]
    TooFar { distance_sq: f32 },
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("{resource} not ready within {budget_ms}ms")]
    ResourceTimeout { resource: String, budget_ms: u64 },
    #[error("{0} does not exist")]
    ActorMissing(ActorHandle),
    #[error(transparent)]
    Host(#[from] HostError),
}

/// How a scene invocation ended. Scenes never return errors to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum SceneOutcome {
    Completed,
    /// A precondition or resource check stopped the scene before it started.
    Skipped(String),
    /// An interrupt condition cut the sequence short.
    Aborted(String),
    /// A host fault ended the scene; control was restored.
    Faulted(String),
}

impl SceneOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SceneOutcome::Completed)
    }

    /// Maps a failure raised before or during a scene onto an outcome.
    pub fn from_error(err: &SceneError) -> Self {
        match err {
            SceneError::Host(_) => SceneOutcome::Faulted(err.to_string()),
            _ => SceneOutcome::Skipped(err.to_string()),
        }
    }
}
