//! Ordered roster of members with structural edits that hand out snapshots.

use std::sync::Arc;

use shared::domain::{Member, MemberId};
use thiserror::Error;

/// Immutable view of the roster at one point in time.
pub type RosterSnapshot = Arc<[Member]>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("member {0} is not in the roster")]
    NotFound(MemberId),
    #[error("member {0} is already in the roster")]
    DuplicateMember(MemberId),
}

#[derive(Debug, Default)]
pub struct RosterStore {
    members: Vec<Member>,
}

impl RosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store from a server listing. Ids must be unique.
    pub fn from_members(members: Vec<Member>) -> Result<Self, StoreError> {
        let mut store = Self {
            members: Vec::with_capacity(members.len()),
        };
        for member in members {
            store.append(member)?;
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn position(&self, id: &MemberId) -> Option<usize> {
        self.members.iter().position(|member| &member.id == id)
    }

    pub fn contains(&self, id: &MemberId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &MemberId) -> Option<&Member> {
        self.members.iter().find(|member| &member.id == id)
    }

    pub fn snapshot(&self) -> RosterSnapshot {
        Arc::from(self.members.as_slice())
    }

    pub fn remove(
        &mut self,
        id: &MemberId,
    ) -> Result<(Member, usize, RosterSnapshot), StoreError> {
        let index = self
            .position(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let member = self.members.remove(index);
        Ok((member, index, self.snapshot()))
    }

    /// Reinserts `member` at `index`, clamped to the current length.
    ///
    /// The index is a hint captured earlier; if the list shrank in the meantime
    /// the member lands at the end instead.
    pub fn insert_at(&mut self, index: usize, member: Member) -> Result<RosterSnapshot, StoreError> {
        if self.contains(&member.id) {
            return Err(StoreError::DuplicateMember(member.id));
        }
        let index = index.min(self.members.len());
        self.members.insert(index, member);
        Ok(self.snapshot())
    }

    pub fn append(&mut self, member: Member) -> Result<RosterSnapshot, StoreError> {
        if self.contains(&member.id) {
            return Err(StoreError::DuplicateMember(member.id));
        }
        self.members.push(member);
        Ok(self.snapshot())
    }

    /// Swaps the member stored under `old_id` for `member`, in place.
    ///
    /// Returns `None` when `old_id` is gone, or when `member.id` already names a
    /// different entry.
    pub fn replace_id(&mut self, old_id: &MemberId, member: Member) -> Option<RosterSnapshot> {
        let index = self.position(old_id)?;
        if &member.id != old_id && self.contains(&member.id) {
            return None;
        }
        self.members[index] = member;
        Some(self.snapshot())
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
