use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::api::BoardApi;
use crate::config::EngineConfig;
use crate::engine::MoveEngine;
use crate::error::MoveError;
use crate::protocol::{MoveAck, MoveRequest};
use crate::store::MemoryStore;
use crate::types::{BoardSnapshot, Column, ColumnCategory, Issue};

pub(crate) fn make_board(columns: &[(&str, ColumnCategory, &[&str])]) -> BoardSnapshot {
    BoardSnapshot {
        board_id: "board-1".to_string(),
        version: 0,
        last_mutation_at: None,
        columns: columns
            .iter()
            .map(|(id, category, issues)| {
                let mut col = Column::new(*id, *category);
                col.issues = issues
                    .iter()
                    .enumerate()
                    .map(|(pos, issue_id)| {
                        let mut issue = Issue::new(*issue_id, *id);
                        issue.position = pos;
                        issue.status = category.status();
                        Arc::new(issue)
                    })
                    .collect();
                Arc::new(col)
            })
            .collect(),
    }
}

/// Column A holds I1..I3, column B is empty.
pub(crate) fn scenario_board() -> BoardSnapshot {
    make_board(&[
        ("A", ColumnCategory::Todo, &["I1", "I2", "I3"]),
        ("B", ColumnCategory::InProgress, &[]),
    ])
}

/// BoardApi fake: a reply scripted for the moved issue wins, otherwise replies
/// are consumed in order; with nothing left the request hangs forever.
#[derive(Default)]
pub(crate) struct ScriptedApi {
    pub board: Mutex<Option<BoardSnapshot>>,
    pub replies: Mutex<VecDeque<Result<MoveAck, MoveError>>>,
    pub replies_for: Mutex<HashMap<String, Result<MoveAck, MoveError>>>,
    pub requests: Mutex<Vec<MoveRequest>>,
    pub fetches: AtomicUsize,
}

impl ScriptedApi {
    pub fn replying(replies: Vec<Result<MoveAck, MoveError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn replying_for(self, issue_id: &str, reply: Result<MoveAck, MoveError>) -> Self {
        self.replies_for
            .lock()
            .unwrap()
            .insert(issue_id.to_string(), reply);
        self
    }

    pub fn serving(self, board: BoardSnapshot) -> Self {
        *self.board.lock().unwrap() = Some(board);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl BoardApi for ScriptedApi {
    async fn fetch_board(&self, board_id: &str) -> Result<BoardSnapshot, MoveError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let board = self.board.lock().unwrap().clone();
        board.ok_or_else(|| MoveError::FetchFailed(format!("no board {}", board_id)))
    }

    async fn submit_move(&self, request: &MoveRequest) -> Result<MoveAck, MoveError> {
        self.requests.lock().unwrap().push(request.clone());
        let scripted = self
            .replies_for
            .lock()
            .unwrap()
            .remove(&request.intent.issue_id);
        let reply = scripted.or_else(|| self.replies.lock().unwrap().pop_front());
        match reply {
            Some(reply) => reply,
            None => std::future::pending().await,
        }
    }
}

pub(crate) type TestEngine = MoveEngine<MemoryStore, ScriptedApi>;

/// Engine over `scenario_board()` with a memory store.
pub(crate) fn scenario_engine(api: ScriptedApi, config: EngineConfig) -> Arc<TestEngine> {
    let store = Arc::new(MemoryStore::new(BoardSnapshot::empty("board-1")));
    let engine = MoveEngine::new("board-1", store, Arc::new(api), config);
    engine.load(scenario_board()).unwrap();
    Arc::new(engine)
}
