//! Exploration errors.

use crate::execution::TransitionRef;
use crate::ids::StateId;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal exploration error. The host must abort the search on any of these.
#[derive(Debug, Error)]
pub enum ExploreError {
    #[error("exploration timed out after {limit} seconds")]
    Timeout { limit: u64 },

    #[error("no snapshot recorded for state {state}")]
    MissingSnapshot { state: StateId },

    #[error("transition {at} is not owned by any recorded execution")]
    UnknownTransition { at: TransitionRef },

    #[error("cannot write report to '{}'", path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ExploreResult<T> = Result<T, ExploreError>;
