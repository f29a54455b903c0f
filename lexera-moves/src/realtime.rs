/// Realtime ingestion: feeds collaborators' moves into the engine.
///
/// The transport (WebSocket, SSE, test harness) publishes RealtimeSignals on a
/// broadcast channel; `pump` drains it. Missed messages, server-requested
/// resets and moves of unknown issues all end in a full reload, since the
/// board can no longer be trusted to be complete.
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::api::BoardApi;
use crate::engine::MoveEngine;
use crate::error::MoveError;
use crate::protocol::RealtimeSignal;
use crate::store::BoardStore;
use crate::types::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Board replaced; carries the new board version.
    Applied(Version),
    /// Duplicate or older than what the board already has.
    Stale,
    /// Our own move coming back over the channel.
    Echo,
}

pub async fn pump<S, A>(engine: Arc<MoveEngine<S, A>>, mut rx: broadcast::Receiver<RealtimeSignal>)
where
    S: BoardStore,
    A: BoardApi,
{
    loop {
        match rx.recv().await {
            Ok(RealtimeSignal::Moved(event)) => match engine.ingest(&event) {
                Ok(_) => {}
                Err(e @ (MoveError::IssueNotFound(_) | MoveError::ColumnNotFound(_))) => {
                    log::warn!(
                        "[lexera.moves.realtime] Move of {} does not fit board {}: {}",
                        event.issue_id,
                        engine.board_id(),
                        e
                    );
                    resync(&engine).await;
                }
                Err(e) => log::warn!(
                    "[lexera.moves.realtime] Could not apply move of {}: {}",
                    event.issue_id,
                    e
                ),
            },
            Ok(RealtimeSignal::Resync) => {
                log::info!(
                    "[lexera.moves.realtime] Server requested resync of board {}",
                    engine.board_id()
                );
                resync(&engine).await;
            }
            Err(RecvError::Lagged(missed)) => {
                log::warn!(
                    "[lexera.moves.realtime] Missed {} events on board {}",
                    missed,
                    engine.board_id()
                );
                resync(&engine).await;
            }
            Err(RecvError::Closed) => {
                log::info!(
                    "[lexera.moves.realtime] Channel closed for board {}",
                    engine.board_id()
                );
                break;
            }
        }
    }
}

pub fn spawn_pump<S, A>(
    engine: Arc<MoveEngine<S, A>>,
    rx: broadcast::Receiver<RealtimeSignal>,
) -> JoinHandle<()>
where
    S: BoardStore + 'static,
    A: BoardApi,
{
    tokio::spawn(pump(engine, rx))
}

async fn resync<S: BoardStore, A: BoardApi>(engine: &MoveEngine<S, A>) {
    if let Err(e) = engine.reload().await {
        log::warn!(
            "[lexera.moves.realtime] Reload of board {} failed: {}",
            engine.board_id(),
            e
        );
    }
}
