//! Crate error type.
//!
//! Configuration errors are raised before the robot moves. Everything else is a
//! runtime fault that terminates the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FabError {
    #[error("Lengths of extrude frames ({deposition}) and travel frames ({travel}) do not match")]
    FrameCountMismatch { travel: usize, deposition: usize },

    #[error("Start index {start_index} is out of range for {len} elements")]
    StartIndexOutOfRange { start_index: usize, len: usize },

    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("Degenerate pose: {0}")]
    DegeneratePose(String),

    #[error("Robot transport failure: {0}")]
    Transport(String),

    #[error("Unexpected robot feedback: expected {expected}, received {received}")]
    UnexpectedFeedback { expected: String, received: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Placement ledger error: {0}")]
    Ledger(#[from] sled::Error),
}

impl FabError {
    /// True for precondition failures that are reported before any motion.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::FrameCountMismatch { .. }
                | Self::StartIndexOutOfRange { .. }
                | Self::InvalidConfig(_)
                | Self::DegeneratePose(_)
        )
    }
}

/// Result type alias for fabrication operations.
pub type FabResult<T> = Result<T, FabError>;
