/// Bookkeeping for in-flight moves.
///
/// Every accepted intent gets a MutationRecord holding the snapshot it was
/// applied to. While any record is pending, every change applied to the board
/// is journaled so a rollback can restore that snapshot and replay what came
/// after. The journal is pruned down to the oldest pending record whenever a
/// record settles, and dropped when none are left.
///
/// A record that supersedes another one for the same issue takes over its
/// pre-move snapshot and journal position, so rejecting the newer move still
/// undoes the older, never confirmed placement.
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::types::{ApplyMode, BoardSnapshot, MoveIntent, Version};

pub type MutationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Confirmed,
    RolledBack,
    /// Replaced by a newer intent for the same issue, or dropped by a reload.
    Superseded,
}

#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub id: MutationId,
    pub intent: MoveIntent,
    /// Board as it was right before the optimistic apply.
    pub previous_snapshot: Arc<BoardSnapshot>,
    pub submitted_version: Version,
    pub submitted_at: DateTime<Utc>,
    /// Runtime clock reading used for timeouts.
    pub(crate) started: Instant,
    pub(crate) journal_seq: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JournalOp {
    Move { intent: MoveIntent, mode: ApplyMode },
    Promote { issue_id: String, revision: Option<u64> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JournalEntry {
    pub seq: u64,
    pub mutation: Option<MutationId>,
    pub op: JournalOp,
}

#[derive(Debug, Default)]
pub(crate) struct Ledger {
    next_id: MutationId,
    next_seq: u64,
    pub pending: BTreeMap<MutationId, MutationRecord>,
    journal: Vec<JournalEntry>,
    pub recoveries: u32,
}

impl Ledger {
    /// Open a record for an intent that was just applied on top of `previous`.
    /// With `replaces`, the record starts from the superseded record's
    /// snapshot and journal position and owns its journal entries.
    pub fn open(
        &mut self,
        intent: MoveIntent,
        previous: Arc<BoardSnapshot>,
        submitted_version: Version,
        replaces: Option<MutationRecord>,
    ) -> MutationId {
        self.next_id += 1;
        let id = self.next_id;
        let own_seq = self.push(
            Some(id),
            JournalOp::Move {
                intent: intent.clone(),
                mode: ApplyMode::Optimistic,
            },
        );
        let (previous, journal_seq) = match replaces {
            Some(old) => {
                for entry in &mut self.journal {
                    if entry.mutation == Some(old.id) {
                        entry.mutation = Some(id);
                    }
                }
                (old.previous_snapshot, old.journal_seq)
            }
            None => (previous, own_seq),
        };
        self.pending.insert(
            id,
            MutationRecord {
                id,
                intent,
                previous_snapshot: previous,
                submitted_version,
                submitted_at: Utc::now(),
                started: Instant::now(),
                journal_seq,
            },
        );
        id
    }

    /// Remove the pending record for an issue; a newer intent replaces it.
    pub fn supersede(&mut self, issue_id: &str) -> Option<MutationRecord> {
        let ids: Vec<MutationId> = self
            .pending
            .values()
            .filter(|record| record.intent.issue_id == issue_id)
            .map(|record| record.id)
            .collect();
        ids.iter()
            .filter_map(|id| self.pending.remove(id))
            .min_by_key(|record| record.journal_seq)
    }

    pub fn take(&mut self, id: MutationId) -> Option<MutationRecord> {
        self.pending.remove(&id)
    }

    /// Journal a change that does not open a record. Skipped when nothing is pending.
    pub fn record(&mut self, mutation: Option<MutationId>, op: JournalOp) {
        if !self.pending.is_empty() {
            self.push(mutation, op);
        }
    }

    /// The record's own optimistic entry now stands confirmed.
    pub fn confirm(&mut self, id: MutationId, revision: Option<u64>) {
        for entry in &mut self.journal {
            if entry.mutation == Some(id) {
                if let JournalOp::Move { mode, .. } = &mut entry.op {
                    *mode = ApplyMode::Authoritative(revision);
                }
            }
        }
    }

    /// Entries journaled after `seq`, oldest first.
    pub fn entries_after(&self, seq: u64) -> Vec<JournalEntry> {
        self.journal
            .iter()
            .filter(|entry| entry.seq > seq)
            .cloned()
            .collect()
    }

    /// Forget a failed record's entries so they are not replayed again later.
    pub fn discard(&mut self, id: MutationId) {
        self.journal.retain(|entry| entry.mutation != Some(id));
    }

    pub fn prune(&mut self) {
        match self.pending.values().map(|record| record.journal_seq).min() {
            Some(oldest) => self.journal.retain(|entry| entry.seq >= oldest),
            None => self.journal.clear(),
        }
    }

    /// Forget the journal before a wholesale board replacement. Pending
    /// records stay; each is journaled again through `rebase`.
    pub fn restart(&mut self) {
        self.journal.clear();
        self.recoveries = 0;
    }

    /// Re-journal a pending record's move on top of a newly loaded board,
    /// `previous` being that board right before the move.
    pub fn rebase(&mut self, id: MutationId, previous: Arc<BoardSnapshot>) {
        let Some(intent) = self.pending.get(&id).map(|record| record.intent.clone()) else {
            return;
        };
        let seq = self.push(
            Some(id),
            JournalOp::Move {
                intent,
                mode: ApplyMode::Optimistic,
            },
        );
        if let Some(record) = self.pending.get_mut(&id) {
            record.previous_snapshot = previous;
            record.journal_seq = seq;
        }
    }

    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    fn push(&mut self, mutation: Option<MutationId>, op: JournalOp) -> u64 {
        self.next_seq += 1;
        self.journal.push(JournalEntry {
            seq: self.next_seq,
            mutation,
            op,
        });
        self.next_seq
    }
}
