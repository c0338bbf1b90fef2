//! Administration audit log
//!
//! - Every mutating administration attempt is recorded, whatever the outcome
//! - Append-only, one JSON record per line
//! - File records are synced before `append` returns

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::failure::{Failure, FailureKind};

/// Administrative action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// A node was asked to become master.
    RoleChange,
    /// A node was removed from the group.
    RemoveNode,
    /// Node attributes were changed.
    UpdateAttributes,
    /// A node was added to the group.
    JoinNode,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::RoleChange => "ROLE_CHANGE",
            AuditAction::RemoveNode => "REMOVE_NODE",
            AuditAction::UpdateAttributes => "UPDATE_ATTRIBUTES",
            AuditAction::JoinNode => "JOIN_NODE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    /// The action completed.
    Success,
    /// Authorization refused the request.
    Denied,
    /// The request was malformed.
    Rejected,
    /// The request was valid but did not complete.
    Failed,
}

impl AuditOutcome {
    pub fn of(result: &Result<impl Sized, Failure>) -> Self {
        match result {
            Ok(_) => AuditOutcome::Success,
            Err(failure) => match failure.kind() {
                FailureKind::AccessDenied => AuditOutcome::Denied,
                FailureKind::Validation => AuditOutcome::Rejected,
                FailureKind::ConnectionScoped | FailureKind::ServerScoped => AuditOutcome::Failed,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub principal: String,
    pub action: AuditAction,
    /// Node the action was aimed at.
    pub target: String,
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    pub fn new(
        principal: impl Into<String>,
        action: AuditAction,
        target: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            principal: principal.into(),
            action,
            target: target.into(),
            outcome,
            error: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn to_json(&self) -> io::Result<String> {
        serde_json::to_string(self).map_err(io::Error::from)
    }
}

pub trait AuditLog: Send + Sync {
    /// Durably append one record.
    fn append(&self, record: &AuditRecord) -> io::Result<()>;
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "audit log lock poisoned")
}

/// JSON-lines audit file.
pub struct FileAuditLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileAuditLog {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLog for FileAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let json = record.to_json()?;
        let mut writer = self.writer.lock().map_err(|_| poisoned())?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        writer.get_ref().sync_data()
    }
}

/// In-memory audit log for tests and tooling.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AuditRecord>> {
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        self.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_outcome_from_result() {
        let ok: Result<(), Failure> = Ok(());
        assert_eq!(AuditOutcome::of(&ok), AuditOutcome::Success);
        let denied: Result<(), Failure> = Err(Failure::access_denied("no"));
        assert_eq!(AuditOutcome::of(&denied), AuditOutcome::Denied);
        let bad: Result<(), Failure> = Err(Failure::validation("bad"));
        assert_eq!(AuditOutcome::of(&bad), AuditOutcome::Rejected);
        let failed: Result<(), Failure> = Err(Failure::connection_scoped("timeout"));
        assert_eq!(AuditOutcome::of(&failed), AuditOutcome::Failed);
    }

    #[test]
    fn test_memory_audit_log() {
        let log = MemoryAuditLog::new();
        log.append(&AuditRecord::new(
            "ops",
            AuditAction::RoleChange,
            "node-b",
            AuditOutcome::Success,
        ))
        .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.records()[0].target, "node-b");
    }

    #[test]
    fn test_file_audit_log_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = FileAuditLog::open(&path).unwrap();

        log.append(
            &AuditRecord::new("ops", AuditAction::RemoveNode, "node-c", AuditOutcome::Denied)
                .with_error("not permitted"),
        )
        .unwrap();
        log.append(&AuditRecord::new(
            "ops",
            AuditAction::RoleChange,
            "node-b",
            AuditOutcome::Success,
        ))
        .unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.action, AuditAction::RemoveNode);
        assert_eq!(first.outcome, AuditOutcome::Denied);
        assert_eq!(first.error.as_deref(), Some("not permitted"));
    }
}
