/// Move applier: the single state transition for every board change.
///
/// Given a snapshot and an intent:
/// - Destination column missing -> ColumnNotFound, nothing changes
/// - Issue in its source column -> move it from there
/// - Issue elsewhere -> full scan (emergency search), logged and flagged
/// - Issue nowhere -> IssueNotFound, nothing changes
/// - Same column, same resulting index -> Unchanged, no stamp consumed
///
/// Otherwise the issue is removed, both columns are reindexed to 0..n-1, and
/// the issue and the snapshot get one fresh stamp. Only the touched columns
/// and the issues whose fields change are copied.
use std::sync::Arc;

use chrono::Utc;

use crate::error::MoveError;
use crate::types::{ApplyMode, Authority, BoardSnapshot, MoveIntent, Version};
use crate::version::VersionStamper;

#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Moved {
        snapshot: BoardSnapshot,
        version: Version,
        /// The issue was not where the intent said; found by full scan.
        recovered: bool,
    },
    Unchanged,
}

pub fn apply(
    snapshot: &BoardSnapshot,
    intent: &MoveIntent,
    mode: ApplyMode,
    stamper: &VersionStamper,
) -> Result<Applied, MoveError> {
    let dest_idx = snapshot
        .column_index(&intent.destination_column_id)
        .ok_or_else(|| MoveError::ColumnNotFound(intent.destination_column_id.clone()))?;
    let (src_idx, pos, recovered) = locate(snapshot, intent)?;

    if src_idx == dest_idx {
        let last = snapshot.columns[src_idx].issues.len() - 1;
        if intent.destination_index.min(last) == pos {
            return Ok(Applied::Unchanged);
        }
    }

    let version = stamper.next(snapshot);
    let mut next = snapshot.clone();

    let source = Arc::make_mut(&mut next.columns[src_idx]);
    let mut issue = source.issues.remove(pos);
    source.reindex();

    let dest = Arc::make_mut(&mut next.columns[dest_idx]);
    {
        let moved = Arc::make_mut(&mut issue);
        moved.column_id = dest.id.clone();
        moved.status = dest.category.status();
        moved.version = version;
        moved.authority = mode.authority();
        if let ApplyMode::Authoritative(Some(revision)) = mode {
            moved.revision = Some(revision);
        }
    }
    let at = intent.destination_index.min(dest.issues.len());
    dest.issues.insert(at, issue);
    dest.reindex();

    next.version = version;
    next.last_mutation_at = Some(Utc::now());

    Ok(Applied::Moved {
        snapshot: next,
        version,
        recovered,
    })
}

/// Mark an issue's current placement as confirmed without moving it.
/// Unchanged when it is already authoritative and the revision adds nothing.
pub fn promote(
    snapshot: &BoardSnapshot,
    issue_id: &str,
    revision: Option<u64>,
    stamper: &VersionStamper,
) -> Result<Applied, MoveError> {
    let (ci, pos) = snapshot
        .locate(issue_id)
        .ok_or_else(|| MoveError::IssueNotFound(issue_id.to_string()))?;
    let current = &snapshot.columns[ci].issues[pos];
    let newer_revision = match (revision, current.revision) {
        (Some(incoming), Some(known)) => incoming > known,
        (Some(_), None) => true,
        (None, _) => false,
    };
    if current.authority == Authority::Authoritative && !newer_revision {
        return Ok(Applied::Unchanged);
    }

    let version = stamper.next(snapshot);
    let mut next = snapshot.clone();
    let column = Arc::make_mut(&mut next.columns[ci]);
    let issue = Arc::make_mut(&mut column.issues[pos]);
    issue.authority = Authority::Authoritative;
    issue.version = version;
    if newer_revision {
        issue.revision = revision;
    }
    next.version = version;
    next.last_mutation_at = Some(Utc::now());

    Ok(Applied::Moved {
        snapshot: next,
        version,
        recovered: false,
    })
}

fn locate(snapshot: &BoardSnapshot, intent: &MoveIntent) -> Result<(usize, usize, bool), MoveError> {
    if let Some(ci) = snapshot.column_index(&intent.source_column_id) {
        if let Some(pos) = snapshot.columns[ci].position_of(&intent.issue_id) {
            return Ok((ci, pos, false));
        }
    }
    match snapshot.locate(&intent.issue_id) {
        Some((ci, pos)) => {
            log::warn!(
                "[lexera.moves.apply] Issue {} not in source column {}, recovered from column {}",
                intent.issue_id,
                intent.source_column_id,
                snapshot.columns[ci].id
            );
            Ok((ci, pos, true))
        }
        None => {
            log::warn!(
                "[lexera.moves.apply] Issue {} not found on board {}",
                intent.issue_id,
                snapshot.board_id
            );
            Err(MoveError::IssueNotFound(intent.issue_id.clone()))
        }
    }
}
