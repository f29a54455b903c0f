/// In-process tracker used by the tests: board fetch, move service and
/// realtime feed on an ephemeral port.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lexera_moves::protocol::{MoveAck, MoveRequest, RealtimeEvent};
use lexera_moves::types::{BoardSnapshot, Column, ColumnCategory, Issue};
use tokio::sync::{broadcast, Notify};

use crate::wire::{ClientFeedMessage, ServerFeedMessage};

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Column A holds I1..I3, column B is empty.
pub(crate) fn server_board() -> BoardSnapshot {
    let mut board = BoardSnapshot::empty("board-1");
    let mut a = Column::new("A", ColumnCategory::Todo);
    a.issues = ["I1", "I2", "I3"]
        .iter()
        .enumerate()
        .map(|(pos, id)| {
            let mut issue = Issue::new(*id, "A");
            issue.position = pos;
            Arc::new(issue)
        })
        .collect();
    board.columns = vec![
        Arc::new(a),
        Arc::new(Column::new("B", ColumnCategory::InProgress)),
    ];
    board
}

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Ack,
    Empty,
    Status(StatusCode, String),
}

#[derive(Debug, Clone)]
enum FeedFrame {
    Text(String),
    Close,
}

pub(crate) struct ServerState {
    pub board: Mutex<BoardSnapshot>,
    pub reply: Mutex<Reply>,
    pub moves: Mutex<Vec<MoveRequest>>,
    pub subscribers: Mutex<Vec<ClientFeedMessage>>,
    pub subscribed: Notify,
    next_revision: AtomicU64,
    feed: broadcast::Sender<FeedFrame>,
}

pub(crate) struct TestServer {
    pub base_url: String,
    pub state: Arc<ServerState>,
}

impl TestServer {
    pub async fn start() -> Self {
        let (feed, _) = broadcast::channel(64);
        let state = Arc::new(ServerState {
            board: Mutex::new(server_board()),
            reply: Mutex::new(Reply::Ack),
            moves: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            subscribed: Notify::new(),
            next_revision: AtomicU64::new(1),
            feed,
        });
        let app = Router::new()
            .route("/boards/{board_id}", get(board_handler))
            .route("/boards/{board_id}/moves", post(move_handler))
            .route("/boards/{board_id}/feed", get(feed_handler))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.state.reply.lock().unwrap() = reply;
    }

    pub fn push(&self, msg: &ServerFeedMessage) {
        let text = serde_json::to_string(msg).unwrap();
        let _ = self.state.feed.send(FeedFrame::Text(text));
    }

    pub fn close_feeds(&self) {
        let _ = self.state.feed.send(FeedFrame::Close);
    }

    pub async fn wait_for_subscriber(&self) {
        self.state.subscribed.notified().await;
    }
}

async fn board_handler(
    Path(board_id): Path<String>,
    State(state): State<Arc<ServerState>>,
) -> Response {
    let board = state.board.lock().unwrap().clone();
    if board.board_id != board_id {
        return (StatusCode::NOT_FOUND, format!("no board {}", board_id)).into_response();
    }
    Json(board).into_response()
}

async fn move_handler(
    Path(_board_id): Path<String>,
    State(state): State<Arc<ServerState>>,
    Json(request): Json<MoveRequest>,
) -> Response {
    let reply = state.reply.lock().unwrap().clone();
    state.moves.lock().unwrap().push(request.clone());
    match reply {
        Reply::Status(status, message) => {
            (status, Json(serde_json::json!({ "error": message }))).into_response()
        }
        Reply::Empty => StatusCode::NO_CONTENT.into_response(),
        Reply::Ack => {
            let revision = state.next_revision.fetch_add(1, Ordering::SeqCst);
            let echo = ServerFeedMessage::IssueMoved(RealtimeEvent {
                issue_id: request.intent.issue_id.clone(),
                destination_column_id: request.intent.destination_column_id.clone(),
                destination_index: request.intent.destination_index,
                version: revision,
                origin: Some(request.client_id.clone()),
            });
            let _ = state
                .feed
                .send(FeedFrame::Text(serde_json::to_string(&echo).unwrap()));
            Json(MoveAck {
                revision: Some(revision),
            })
            .into_response()
        }
    }
}

async fn feed_handler(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> Response {
    ws.on_upgrade(move |socket| feed_session(socket, state))
}

async fn feed_session(mut socket: WebSocket, state: Arc<ServerState>) {
    let mut frames = state.feed.subscribe();

    // the client speaks first
    let hello = match socket.recv().await {
        Some(Ok(Message::Text(text))) => serde_json::from_str::<ClientFeedMessage>(text.as_str()),
        _ => return,
    };
    let Ok(hello) = hello else { return };
    state.subscribers.lock().unwrap().push(hello);
    state.subscribed.notify_one();

    while let Ok(frame) = frames.recv().await {
        match frame {
            FeedFrame::Text(text) => {
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            FeedFrame::Close => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }
}
