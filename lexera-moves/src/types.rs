use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::MoveError;

/// Logical version stamp. Only meaningful within one board instance.
pub type Version = u64;

/// Workflow category of a column. Decides the status of issues moved into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnCategory {
    Backlog,
    Todo,
    InProgress,
    Review,
    Done,
    #[serde(other)]
    Other,
}

impl ColumnCategory {
    /// Status an issue takes when it lands in a column of this category.
    /// Unknown categories fall back to the baseline status.
    pub fn status(self) -> IssueStatus {
        match self {
            ColumnCategory::Backlog | ColumnCategory::Todo => IssueStatus::Todo,
            ColumnCategory::InProgress => IssueStatus::InProgress,
            ColumnCategory::Review => IssueStatus::InReview,
            ColumnCategory::Done => IssueStatus::Done,
            ColumnCategory::Other => IssueStatus::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueStatus {
    #[default]
    Todo,
    InProgress,
    InReview,
    Done,
}

/// Whether an issue's current placement is confirmed or still tentative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Authority {
    #[default]
    Authoritative,
    Optimistic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    pub column_id: String,
    #[serde(default)]
    pub position: usize,
    #[serde(default)]
    pub status: IssueStatus,
    /// Local stamp from the board's version stamper.
    #[serde(default)]
    pub version: Version,
    /// Last server-assigned revision this issue was authoritatively placed at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    #[serde(default)]
    pub authority: Authority,
    /// Title, assignee and whatever else the tracker sends. Never interpreted here.
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl Issue {
    pub fn new(id: impl Into<String>, column_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            column_id: column_id.into(),
            position: 0,
            status: IssueStatus::default(),
            version: 0,
            revision: None,
            authority: Authority::Authoritative,
            payload: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub category: ColumnCategory,
    #[serde(default)]
    pub issues: Vec<Arc<Issue>>,
}

impl Column {
    pub fn new(id: impl Into<String>, category: ColumnCategory) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            category,
            issues: Vec::new(),
        }
    }

    pub fn position_of(&self, issue_id: &str) -> Option<usize> {
        self.issues.iter().position(|issue| issue.id == issue_id)
    }

    /// Rewrite positions to 0..n-1. Only issues whose position changes are copied.
    pub fn reindex(&mut self) {
        for (index, issue) in self.issues.iter_mut().enumerate() {
            if issue.position != index {
                Arc::make_mut(issue).position = index;
            }
        }
    }
}

/// The client's copy of a board at one logical instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub board_id: String,
    #[serde(default)]
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_mutation_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub columns: Vec<Arc<Column>>,
}

impl BoardSnapshot {
    pub fn empty(board_id: impl Into<String>) -> Self {
        Self {
            board_id: board_id.into(),
            version: 0,
            last_mutation_at: None,
            columns: Vec::new(),
        }
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|col| col.id == column_id)
            .map(|col| col.as_ref())
    }

    pub fn column_index(&self, column_id: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.id == column_id)
    }

    /// Full scan for an issue. Returns (column index, position).
    pub fn locate(&self, issue_id: &str) -> Option<(usize, usize)> {
        self.columns
            .iter()
            .enumerate()
            .find_map(|(ci, col)| col.position_of(issue_id).map(|pos| (ci, pos)))
    }

    pub fn issue(&self, issue_id: &str) -> Option<&Issue> {
        self.locate(issue_id)
            .map(|(ci, pos)| self.columns[ci].issues[pos].as_ref())
    }

    /// Issue ids of a column in display order. Empty for unknown columns.
    pub fn issue_ids(&self, column_id: &str) -> Vec<&str> {
        self.column(column_id)
            .map(|col| col.issues.iter().map(|issue| issue.id.as_str()).collect())
            .unwrap_or_default()
    }

    /// Repair derived fields of a freshly fetched board and reject boards that
    /// hold the same issue twice.
    pub fn normalized(mut self) -> Result<Self, MoveError> {
        let mut seen = HashSet::new();
        let mut newest = self.version;
        for column in &mut self.columns {
            let column = Arc::make_mut(column);
            let status = column.category.status();
            for (index, issue) in column.issues.iter_mut().enumerate() {
                if !seen.insert(issue.id.clone()) {
                    return Err(MoveError::InvalidSnapshot(format!(
                        "issue {} appears in more than one place",
                        issue.id
                    )));
                }
                newest = newest.max(issue.version);
                if issue.position != index || issue.column_id != column.id || issue.status != status {
                    let issue = Arc::make_mut(issue);
                    issue.position = index;
                    issue.column_id = column.id.clone();
                    issue.status = status;
                }
            }
        }
        // stamps handed out later must exceed every issue's stamp
        self.version = newest;
        Ok(self)
    }

    /// Check the ownership and density invariants.
    pub fn validate(&self) -> Result<(), MoveError> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            for (index, issue) in column.issues.iter().enumerate() {
                if !seen.insert(issue.id.as_str()) {
                    return Err(MoveError::InvalidSnapshot(format!(
                        "issue {} appears in more than one place",
                        issue.id
                    )));
                }
                if issue.position != index {
                    return Err(MoveError::InvalidSnapshot(format!(
                        "issue {} has position {} at index {} of column {}",
                        issue.id, issue.position, index, column.id
                    )));
                }
                if issue.column_id != column.id {
                    return Err(MoveError::InvalidSnapshot(format!(
                        "issue {} claims column {} but sits in {}",
                        issue.id, issue.column_id, column.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// SHA-256 over what a user can see or the server has ordered: column and
    /// issue order, statuses and revisions. Local stamps are left out.
    pub fn layout_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for column in &self.columns {
            hasher.update(column.id.as_bytes());
            hasher.update(b"\x1d");
            for issue in &column.issues {
                hasher.update(issue.id.as_bytes());
                hasher.update(format!("|{:?}|{:?}", issue.status, issue.revision).as_bytes());
                hasher.update(b"\x1e");
            }
            hasher.update(b"\x1c");
        }
        hex::encode(hasher.finalize())
    }
}

/// A request to relocate one issue. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveIntent {
    pub issue_id: String,
    pub source_column_id: String,
    pub destination_column_id: String,
    pub destination_index: usize,
}

impl MoveIntent {
    pub fn new(
        issue_id: impl Into<String>,
        source_column_id: impl Into<String>,
        destination_column_id: impl Into<String>,
        destination_index: usize,
    ) -> Self {
        Self {
            issue_id: issue_id.into(),
            source_column_id: source_column_id.into(),
            destination_column_id: destination_column_id.into(),
            destination_index,
        }
    }

    /// Same move, starting from another column.
    pub fn from_column(&self, column_id: &str) -> Self {
        Self {
            source_column_id: column_id.to_string(),
            ..self.clone()
        }
    }
}

/// How the applier stamps the moved issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Tentative, may be rolled back.
    Optimistic,
    /// Server-confirmed or pushed by a collaborator, optionally with the
    /// server's revision for the move.
    Authoritative(Option<u64>),
}

impl ApplyMode {
    pub fn authority(self) -> Authority {
        match self {
            ApplyMode::Optimistic => Authority::Optimistic,
            ApplyMode::Authoritative(_) => Authority::Authoritative,
        }
    }
}
