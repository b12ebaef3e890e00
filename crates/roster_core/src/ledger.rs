//! Undo records for operations whose remote call has not settled yet.

use std::{collections::HashMap, fmt};

use shared::domain::{ExternalUuid, Member, MemberId};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Delete,
    Move,
    Create,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Move => "move",
            Self::Create => "create",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key an in-flight operation is filed under.
///
/// Deletes and creates are addressed by local id, moves by durable uuid. The two
/// key spaces never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LedgerKey {
    Local(MemberId),
    Durable(ExternalUuid),
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(id) => write!(f, "local:{id}"),
            Self::Durable(uuid) => write!(f, "uuid:{uuid}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub kind: OperationKind,
    pub snapshot: Member,
    pub original_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("an operation is already pending under {0}")]
    DuplicateKey(LedgerKey),
}

#[derive(Debug, Default)]
pub struct MutationLedger {
    entries: HashMap<LedgerKey, LedgerEntry>,
}

impl MutationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: LedgerKey, entry: LedgerEntry) -> Result<(), LedgerError> {
        if self.entries.contains_key(&key) {
            return Err(LedgerError::DuplicateKey(key));
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    /// Removes and returns the entry. Settling twice finds nothing the second time.
    pub fn take(&mut self, key: &LedgerKey) -> Option<LedgerEntry> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &LedgerKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/ledger_tests.rs"]
mod tests;
