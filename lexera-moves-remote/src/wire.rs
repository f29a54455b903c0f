/// Realtime feed protocol.
///
/// Protocol:
///   Client sends Subscribe { boardId, clientId } on connect.
///   Server pushes IssueMoved for every confirmed move on the board,
///   BoardReset when subscribers must refetch, FeedError before giving up.
use lexera_moves::protocol::{RealtimeEvent, RealtimeSignal};
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientFeedMessage {
    Subscribe { board_id: String, client_id: String },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerFeedMessage {
    IssueMoved(RealtimeEvent),
    BoardReset { board_id: String },
    FeedError { message: String },
}

impl ServerFeedMessage {
    /// Translate into what the ingestion pump understands. Resets of other
    /// boards yield `None`.
    pub fn into_signal(self, board_id: &str) -> Result<Option<RealtimeSignal>, FeedError> {
        match self {
            ServerFeedMessage::IssueMoved(event) => Ok(Some(RealtimeSignal::Moved(event))),
            ServerFeedMessage::BoardReset { board_id: reset } if reset == board_id => {
                Ok(Some(RealtimeSignal::Resync))
            }
            ServerFeedMessage::BoardReset { .. } => Ok(None),
            ServerFeedMessage::FeedError { message } => Err(FeedError::Server(message)),
        }
    }
}
