use std::future::Future;

use crate::error::MoveError;
use crate::protocol::{MoveAck, MoveRequest};
use crate::types::BoardSnapshot;

/// The tracker's request/response services the engine depends on.
/// Implementations: HttpBoardApi (lexera-moves-remote), scripted fakes in tests.
pub trait BoardApi: Send + Sync + 'static {
    /// Full board reload. Used on first mount and after unrecoverable drift.
    fn fetch_board(
        &self,
        board_id: &str,
    ) -> impl Future<Output = Result<BoardSnapshot, MoveError>> + Send;

    /// Persist one move. Failures must be NetworkFailure or ServerRejected.
    fn submit_move(
        &self,
        request: &MoveRequest,
    ) -> impl Future<Output = Result<MoveAck, MoveError>> + Send;
}
