/// Optimistic mutation engine.
///
/// Lifecycle of one move:
///   submit    -> applied optimistically, record Pending, store replaced at once
///   dispatch  -> request sent; the board is not touched while it is in flight
///   success   -> move re-asserted against the *current* board, record Confirmed
///   failure   -> pre-move board restored, later changes replayed, record RolledBack
///
/// Realtime events from collaborators go through `ingest` and the same applier.
/// All read-apply-replace sequences run under one lock, so concurrent
/// completions never lose each other's updates.
mod ledger;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use crate::api::BoardApi;
use crate::apply::{apply, promote, Applied};
use crate::config::{EngineConfig, RollbackStrategy};
use crate::error::MoveError;
use crate::policy::{self, Verdict};
use crate::protocol::{MoveAck, MoveRequest, RealtimeEvent};
use crate::realtime::IngestOutcome;
use crate::store::BoardStore;
use crate::types::{ApplyMode, BoardSnapshot, MoveIntent};
use crate::version::VersionStamper;

pub use ledger::{MutationId, MutationRecord, MutationState};
use ledger::{JournalEntry, JournalOp, Ledger};

/// Result of accepting an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Pending(MutationId),
    /// The issue already sits where the intent points. Nothing to send.
    Unchanged,
}

/// How a dispatched move ended.
#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    Confirmed(MoveAck),
    /// The card snapped back. The error is meant for the user.
    RolledBack(MoveError),
    Superseded,
}

impl MoveOutcome {
    pub fn state(&self) -> MutationState {
        match self {
            MoveOutcome::Confirmed(_) => MutationState::Confirmed,
            MoveOutcome::RolledBack(_) => MutationState::RolledBack,
            MoveOutcome::Superseded => MutationState::Superseded,
        }
    }
}

pub struct MoveEngine<S, A> {
    board_id: String,
    store: Arc<S>,
    api: Arc<A>,
    config: EngineConfig,
    stamper: VersionStamper,
    ledger: Mutex<Ledger>,
}

impl<S: BoardStore, A: BoardApi> MoveEngine<S, A> {
    pub fn new(
        board_id: impl Into<String>,
        store: Arc<S>,
        api: Arc<A>,
        config: EngineConfig,
    ) -> Self {
        Self {
            board_id: board_id.into(),
            store,
            api,
            config,
            stamper: VersionStamper::new(),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snapshot(&self) -> Arc<BoardSnapshot> {
        self.store.snapshot()
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Pending` while the move is in flight, `None` once it settled.
    pub fn state(&self, id: MutationId) -> Option<MutationState> {
        self.ledger()
            .pending
            .contains_key(&id)
            .then_some(MutationState::Pending)
    }

    pub fn pending(&self) -> Vec<MutationRecord> {
        self.ledger().pending.values().cloned().collect()
    }

    /// Too many emergency recoveries since the last load.
    pub fn needs_resync(&self) -> bool {
        policy::should_resync(self.ledger().recoveries, self.config.resync_after_recoveries)
    }

    /// Replace the board wholesale. The stamper starts over from the new
    /// board's version and pending moves are applied again on top of it, so
    /// their confirmations still re-assert and their failures still roll back.
    pub fn load(&self, snapshot: BoardSnapshot) -> Result<(), MoveError> {
        if snapshot.board_id != self.board_id {
            return Err(MoveError::InvalidSnapshot(format!(
                "expected board {}, got {}",
                self.board_id, snapshot.board_id
            )));
        }
        let snapshot = snapshot.normalized()?;
        let columns = snapshot.columns.len();
        let mut ledger = self.ledger();
        ledger.restart();
        self.stamper.reset();

        let mut board = Arc::new(snapshot);
        let ids: Vec<MutationId> = ledger.pending.keys().copied().collect();
        let mut kept = 0;
        for id in ids {
            let Some(intent) = ledger.pending.get(&id).map(|record| record.intent.clone()) else {
                continue;
            };
            match apply(&board, &intent, ApplyMode::Optimistic, &self.stamper) {
                Ok(applied) => {
                    ledger.rebase(id, Arc::clone(&board));
                    if let Some(next) = moved_snapshot(applied) {
                        board = Arc::new(next);
                    }
                    kept += 1;
                }
                Err(e) => {
                    ledger.take(id);
                    log::warn!(
                        "[lexera.moves.load] Dropped pending move {} of issue {}: {}",
                        id,
                        intent.issue_id,
                        e
                    );
                }
            }
        }
        ledger.prune();

        log::info!(
            "[lexera.moves.load] Loaded board {} ({} columns, {} pending moves kept)",
            self.board_id,
            columns,
            kept
        );
        self.store.replace(board);
        Ok(())
    }

    /// Refetch the board. Skips the store write when the server has nothing new.
    pub async fn reload(&self) -> Result<(), MoveError> {
        let fetched = self.api.fetch_board(&self.board_id).await?.normalized()?;
        {
            let mut ledger = self.ledger();
            let unchanged = ledger.pending.is_empty()
                && fetched.layout_fingerprint() == self.store.snapshot().layout_fingerprint();
            if unchanged {
                ledger.recoveries = 0;
                log::debug!(
                    "[lexera.moves.load] Board {} unchanged on server",
                    self.board_id
                );
                return Ok(());
            }
        }
        self.load(fetched)
    }

    /// Apply an intent optimistically and open a record for it. The store is
    /// updated before this returns; no I/O happens here.
    pub fn submit(&self, intent: MoveIntent) -> Result<Submission, MoveError> {
        let mut ledger = self.ledger();
        let current = self.store.snapshot();
        match apply(&current, &intent, ApplyMode::Optimistic, &self.stamper)? {
            Applied::Unchanged => Ok(Submission::Unchanged),
            Applied::Moved {
                snapshot,
                version,
                recovered,
            } => {
                if recovered {
                    self.note_recovery(&mut ledger);
                }
                let replaced = ledger.supersede(&intent.issue_id);
                if let Some(old) = &replaced {
                    log::debug!(
                        "[lexera.moves.submit] Move {} of issue {} superseded",
                        old.id,
                        intent.issue_id
                    );
                }
                let id = ledger.open(intent, current, version, replaced);
                ledger.prune();
                self.store.replace(Arc::new(snapshot));
                Ok(Submission::Pending(id))
            }
        }
    }

    /// Send a pending move to the server and settle it with the response.
    pub async fn dispatch(&self, id: MutationId) -> MoveOutcome {
        let request = {
            let ledger = self.ledger();
            match ledger.pending.get(&id) {
                Some(record) => {
                    MoveRequest::new(&self.board_id, &self.config.client_id, id, &record.intent)
                }
                None => return MoveOutcome::Superseded,
            }
        };

        let timeout = self.config.move_timeout();
        let outcome = match tokio::time::timeout(timeout, self.api.submit_move(&request)).await {
            Ok(Ok(ack)) => self.on_success(id, ack),
            Ok(Err(error)) => self.on_failure(id, error),
            Err(_) => self.on_failure(id, MoveError::Timeout(timeout)),
        };
        self.on_settled();

        let refetch = matches!(outcome, MoveOutcome::RolledBack(_))
            && self.config.rollback == RollbackStrategy::Refetch;
        if refetch || self.needs_resync() {
            if let Err(e) = self.reload().await {
                log::warn!(
                    "[lexera.moves.resync] Reload of board {} failed: {}",
                    self.board_id,
                    e
                );
            }
        }
        outcome
    }

    /// Server accepted the move. Re-assert it against the board as it is now,
    /// keeping whatever landed while the request was in flight.
    pub fn on_success(&self, id: MutationId, ack: MoveAck) -> MoveOutcome {
        let mut ledger = self.ledger();
        let Some(record) = ledger.take(id) else {
            log::debug!(
                "[lexera.moves.confirm] Ignoring confirmation of settled move {}",
                id
            );
            return MoveOutcome::Superseded;
        };
        ledger.confirm(id, ack.revision);

        let current = self.store.snapshot();
        match self.reassert(&current, &record.intent, &ack) {
            Ok(Some((next, op))) => {
                ledger.record(Some(id), op);
                self.store.replace(Arc::new(next));
            }
            Ok(None) => {}
            Err(e) => log::warn!(
                "[lexera.moves.confirm] Move {} confirmed but not re-asserted: {}",
                id,
                e
            ),
        }
        ledger.prune();
        MoveOutcome::Confirmed(ack)
    }

    /// Server refused the move, or never answered. Restore the board the move
    /// was applied to, then replay everything applied since.
    pub fn on_failure(&self, id: MutationId, error: MoveError) -> MoveOutcome {
        let mut ledger = self.ledger();
        let Some(record) = ledger.take(id) else {
            log::debug!(
                "[lexera.moves.rollback] Ignoring failure of settled move {}: {}",
                id,
                error
            );
            return MoveOutcome::Superseded;
        };
        ledger.discard(id);

        let base = Arc::clone(&record.previous_snapshot);
        let (restored, replayed) = match self.config.rollback {
            RollbackStrategy::Refetch => (base, 0),
            RollbackStrategy::Replay => {
                let later = ledger.entries_after(record.journal_seq);
                let count = later.len();
                (self.replay(&mut ledger, base, &later), count)
            }
        };
        log::warn!(
            "[lexera.moves.rollback] Move {} of issue {} failed ({}), restored version {} and replayed {} later changes",
            id,
            record.intent.issue_id,
            error,
            record.previous_snapshot.version,
            replayed
        );
        self.store.replace(restored);
        ledger.prune();
        MoveOutcome::RolledBack(error)
    }

    /// Nothing is refetched when a move settles; confirmations and realtime
    /// events keep the board current.
    pub fn on_settled(&self) {}

    /// Fail every pending move older than the configured timeout. For hosts
    /// that drive the network themselves instead of using `dispatch`.
    pub fn expire_overdue(&self) -> Vec<(MutationId, MoveOutcome)> {
        let timeout = self.config.move_timeout();
        let overdue: Vec<MutationId> = {
            let ledger = self.ledger();
            ledger
                .pending
                .values()
                .filter(|record| record.started.elapsed() >= timeout)
                .map(|record| record.id)
                .collect()
        };
        overdue
            .into_iter()
            .map(|id| (id, self.on_failure(id, MoveError::Timeout(timeout))))
            .collect()
    }

    /// Merge a collaborator's confirmed move. Duplicates and stale events are
    /// dropped quietly; structural errors leave the board untouched.
    pub fn ingest(&self, event: &RealtimeEvent) -> Result<IngestOutcome, MoveError> {
        if event.origin.as_deref() == Some(self.config.client_id.as_str()) {
            log::debug!(
                "[lexera.moves.realtime] Skipping echo of own move of {}",
                event.issue_id
            );
            return Ok(IngestOutcome::Echo);
        }

        let mut ledger = self.ledger();
        let current = self.store.snapshot();
        let (ci, pos) = current
            .locate(&event.issue_id)
            .ok_or_else(|| MoveError::IssueNotFound(event.issue_id.clone()))?;
        if let Err(stale) = policy::admit(&current.columns[ci].issues[pos], event.version) {
            log::debug!("[lexera.moves.realtime] Discarded: {}", stale);
            return Ok(IngestOutcome::Stale);
        }

        let intent = MoveIntent::new(
            event.issue_id.clone(),
            current.columns[ci].id.clone(),
            event.destination_column_id.clone(),
            event.destination_index,
        );
        let mode = ApplyMode::Authoritative(Some(event.version));
        let (next, op) = match apply(&current, &intent, mode, &self.stamper)? {
            Applied::Moved { snapshot, .. } => (snapshot, JournalOp::Move { intent, mode }),
            // already in place; only the revision is news
            Applied::Unchanged => {
                match promote(&current, &event.issue_id, Some(event.version), &self.stamper)? {
                    Applied::Moved { snapshot, .. } => (
                        snapshot,
                        JournalOp::Promote {
                            issue_id: event.issue_id.clone(),
                            revision: Some(event.version),
                        },
                    ),
                    Applied::Unchanged => return Ok(IngestOutcome::Stale),
                }
            }
        };
        let version = next.version;
        ledger.record(None, op);
        self.store.replace(Arc::new(next));
        Ok(IngestOutcome::Applied(version))
    }

    fn reassert(
        &self,
        current: &BoardSnapshot,
        intent: &MoveIntent,
        ack: &MoveAck,
    ) -> Result<Option<(BoardSnapshot, JournalOp)>, MoveError> {
        let (ci, pos) = current
            .locate(&intent.issue_id)
            .ok_or_else(|| MoveError::IssueNotFound(intent.issue_id.clone()))?;
        let issue = &current.columns[ci].issues[pos];
        if policy::judge_confirmation(issue, ack) != Verdict::Apply {
            log::debug!(
                "[lexera.moves.confirm] Issue {} already at newer revision {:?}",
                issue.id,
                issue.revision
            );
            return Ok(None);
        }

        let column_id = &current.columns[ci].id;
        if *column_id == intent.destination_column_id {
            // positions may have shifted under later authoritative moves; keep them
            let applied = promote(current, &intent.issue_id, ack.revision, &self.stamper)?;
            let op = JournalOp::Promote {
                issue_id: intent.issue_id.clone(),
                revision: ack.revision,
            };
            return Ok(moved_snapshot(applied).map(|next| (next, op)));
        }

        log::info!(
            "[lexera.moves.confirm] Re-asserting move of {} from {} to {}",
            intent.issue_id,
            column_id,
            intent.destination_column_id
        );
        let relocated = intent.from_column(column_id);
        let mode = ApplyMode::Authoritative(ack.revision);
        let applied = apply(current, &relocated, mode, &self.stamper)?;
        Ok(moved_snapshot(applied).map(|next| {
            (
                next,
                JournalOp::Move {
                    intent: relocated,
                    mode,
                },
            )
        }))
    }

    /// Re-apply journaled changes on top of a restored board. Later records
    /// get their pre-move snapshot rebased onto the replayed board.
    fn replay(
        &self,
        ledger: &mut Ledger,
        base: Arc<BoardSnapshot>,
        entries: &[JournalEntry],
    ) -> Arc<BoardSnapshot> {
        let mut board = base;
        for entry in entries {
            if let Some(id) = entry.mutation {
                if let Some(record) = ledger.pending.get_mut(&id) {
                    if record.journal_seq == entry.seq {
                        record.previous_snapshot = Arc::clone(&board);
                    }
                }
            }
            let applied = match &entry.op {
                JournalOp::Move { intent, mode } => apply(&board, intent, *mode, &self.stamper),
                JournalOp::Promote { issue_id, revision } => {
                    promote(&board, issue_id, *revision, &self.stamper)
                }
            };
            match applied {
                Ok(Applied::Moved { snapshot, .. }) => board = Arc::new(snapshot),
                Ok(Applied::Unchanged) => {}
                Err(e) => log::warn!(
                    "[lexera.moves.rollback] Dropped change {} while replaying: {}",
                    entry.seq,
                    e
                ),
            }
        }
        board
    }

    fn note_recovery(&self, ledger: &mut Ledger) {
        ledger.recoveries += 1;
        if policy::should_resync(ledger.recoveries, self.config.resync_after_recoveries) {
            log::warn!(
                "[lexera.moves.resync] {} emergency recoveries on board {}, full resync needed",
                ledger.recoveries,
                self.board_id
            );
        }
    }
}

impl<S, A> MoveEngine<S, A>
where
    S: BoardStore + 'static,
    A: BoardApi,
{
    /// `submit` followed by a background `dispatch`. `None` when the intent was a no-op.
    pub fn spawn_move(
        self: &Arc<Self>,
        intent: MoveIntent,
    ) -> Result<Option<JoinHandle<MoveOutcome>>, MoveError> {
        match self.submit(intent)? {
            Submission::Unchanged => Ok(None),
            Submission::Pending(id) => {
                let engine = Arc::clone(self);
                Ok(Some(tokio::spawn(async move { engine.dispatch(id).await })))
            }
        }
    }

    /// Bulk move: every intent is submitted and dispatched on its own.
    pub fn spawn_bulk(
        self: &Arc<Self>,
        intents: impl IntoIterator<Item = MoveIntent>,
    ) -> Vec<Result<Option<JoinHandle<MoveOutcome>>, MoveError>> {
        intents
            .into_iter()
            .map(|intent| self.spawn_move(intent))
            .collect()
    }
}

fn moved_snapshot(applied: Applied) -> Option<BoardSnapshot> {
    match applied {
        Applied::Moved { snapshot, .. } => Some(snapshot),
        Applied::Unchanged => None,
    }
}
