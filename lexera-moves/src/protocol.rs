/// Messages exchanged with the tracker's move service and realtime channel.
///
/// MoveRequest goes out for every submitted intent, MoveAck comes back on
/// success. RealtimeEvent is another collaborator's confirmed move, carrying
/// the server's revision for it.
use serde::{Deserialize, Serialize};

use crate::types::MoveIntent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub board_id: String,
    #[serde(flatten)]
    pub intent: MoveIntent,
    /// Echoed back on the realtime channel so the sender can skip its own moves.
    pub client_id: String,
    pub mutation_id: u64,
}

impl MoveRequest {
    pub fn new(board_id: &str, client_id: &str, mutation_id: u64, intent: &MoveIntent) -> Self {
        Self {
            board_id: board_id.to_string(),
            intent: intent.clone(),
            client_id: client_id.to_string(),
            mutation_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveAck {
    /// Server-assigned revision of the accepted move, if the server has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeEvent {
    pub issue_id: String,
    pub destination_column_id: String,
    pub destination_index: usize,
    pub version: u64,
    /// Client that issued the move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// What the realtime channel hands to the ingestion pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeSignal {
    Moved(RealtimeEvent),
    /// The server lost track of this subscriber; refetch the whole board.
    Resync,
}
