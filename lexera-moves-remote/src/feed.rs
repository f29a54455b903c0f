/// WebSocket realtime feed client.
///
/// Connects to the tracker's feed for one board and republishes every
/// server message as a RealtimeSignal on a broadcast channel, which the
/// engine's ingestion pump consumes.
use futures_util::{SinkExt, StreamExt};
use lexera_moves::protocol::RealtimeSignal;
use percent_encoding::utf8_percent_encode;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::error::FeedError;
use crate::http::SEGMENT;
use crate::wire::{ClientFeedMessage, ServerFeedMessage};

/// `http(s)://host/base` -> `ws(s)://host/base/boards/{boardId}/feed`.
/// Only the scheme is rewritten; other base URLs are used as given.
pub fn feed_url(base_url: &str, board_id: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!(
        "{}/boards/{}/feed",
        base,
        utf8_percent_encode(board_id, SEGMENT)
    )
}

/// Run one feed connection until the server closes it. Undecodable frames
/// are skipped; a FeedError message from the server ends the connection
/// with an error.
pub async fn run_feed(
    ws_url: &str,
    board_id: &str,
    client_id: &str,
    signals: broadcast::Sender<RealtimeSignal>,
) -> Result<(), FeedError> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url).await?;
    log::info!("[lexera.moves.feed] Connected to {}", ws_url);

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let subscribe = serde_json::to_string(&ClientFeedMessage::Subscribe {
        board_id: board_id.to_string(),
        client_id: client_id.to_string(),
    })?;
    ws_tx.send(Message::Text(subscribe.into())).await?;

    while let Some(msg) = ws_rx.next().await {
        let text = match msg? {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => {
                log::info!("[lexera.moves.feed] Feed closed for board {}", board_id);
                break;
            }
            Message::Ping(data) => {
                let _ = ws_tx.send(Message::Pong(data)).await;
                continue;
            }
            _ => continue,
        };

        let parsed: ServerFeedMessage = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!(
                    "[lexera.moves.feed] Skipping undecodable message on board {}: {}",
                    board_id,
                    e
                );
                continue;
            }
        };

        if let Some(signal) = parsed.into_signal(board_id)? {
            if signals.send(signal).is_err() {
                log::debug!(
                    "[lexera.moves.feed] No subscribers for board {}",
                    board_id
                );
            }
        }
    }

    Ok(())
}

/// Run the feed in the background. The sender is dropped when the
/// connection ends, which closes the channel for the pump.
pub fn spawn_feed(
    ws_url: String,
    board_id: String,
    client_id: String,
    signals: broadcast::Sender<RealtimeSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_feed(&ws_url, &board_id, &client_id, signals).await {
            log::error!(
                "[lexera.moves.feed] Feed for board {} failed: {}",
                board_id,
                e
            );
        }
    })
}
