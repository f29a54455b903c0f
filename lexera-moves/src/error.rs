use std::time::Duration;

pub type MoveResult<T> = Result<T, MoveError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MoveError {
    #[error("Issue not found: {0}")]
    IssueNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Server rejected move: {0}")]
    ServerRejected(String),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Stale event for issue {issue_id}: version {event_version} is not newer than {current_version}")]
    StaleEvent {
        issue_id: String,
        event_version: u64,
        current_version: u64,
    },

    #[error("Invalid board snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Board fetch failed: {0}")]
    FetchFailed(String),
}

impl MoveError {
    /// Failures of the move request itself. These roll the optimistic move back.
    pub fn triggers_rollback(&self) -> bool {
        matches!(
            self,
            MoveError::NetworkFailure(_) | MoveError::ServerRejected(_) | MoveError::Timeout(_)
        )
    }

    /// Stale events are routine and never reach the user.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, MoveError::StaleEvent { .. })
    }
}
