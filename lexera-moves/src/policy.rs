/// Reconciliation rules shared by confirmations and realtime ingestion.
///
/// For one issue:
/// - An authoritative update beats a pending optimistic placement
/// - A higher revision beats a lower one
/// - An equal revision is a duplicate, a lower one is stale; both are no-ops
///
/// Local optimistic stamps never count against an authoritative update, so a
/// tentative move cannot make a real server event look stale.
use std::cmp::Ordering;

use crate::error::MoveError;
use crate::protocol::MoveAck;
use crate::types::{Authority, Issue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Apply,
    Duplicate,
    Stale,
}

/// The version an incoming authoritative update has to beat.
/// Server revision when known; otherwise the local stamp of a confirmed
/// placement, or zero for a tentative one.
pub fn current_revision(issue: &Issue) -> u64 {
    match (issue.revision, issue.authority) {
        (Some(revision), _) => revision,
        (None, Authority::Authoritative) => issue.version,
        (None, Authority::Optimistic) => 0,
    }
}

pub fn judge_remote(issue: &Issue, incoming: u64) -> Verdict {
    match incoming.cmp(&current_revision(issue)) {
        Ordering::Greater => Verdict::Apply,
        Ordering::Equal => Verdict::Duplicate,
        Ordering::Less => Verdict::Stale,
    }
}

/// Like `judge_remote`, but as a Result carrying the StaleEvent error.
pub fn admit(issue: &Issue, incoming: u64) -> Result<(), MoveError> {
    match judge_remote(issue, incoming) {
        Verdict::Apply => Ok(()),
        Verdict::Duplicate | Verdict::Stale => Err(MoveError::StaleEvent {
            issue_id: issue.id.clone(),
            event_version: incoming,
            current_version: current_revision(issue),
        }),
    }
}

/// Whether a confirmed local move may re-assert itself. Without a server
/// revision the confirmation always wins (local authority); with one, it
/// loses to a newer revision that already reached the issue.
pub fn judge_confirmation(issue: &Issue, ack: &MoveAck) -> Verdict {
    match (ack.revision, issue.revision) {
        (Some(acked), Some(known)) if known > acked => Verdict::Stale,
        _ => Verdict::Apply,
    }
}

pub fn should_resync(recoveries: u32, threshold: u32) -> bool {
    threshold > 0 && recoveries >= threshold
}
