use std::{
    collections::HashMap,
    future::Future,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use shared::{
    domain::{ExternalUuid, GroupId, Member, MemberId},
    error::RemoteError,
    protocol::{CreateMemberRequest, ServerMember},
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub mod config;
pub mod ledger;
mod observer;
pub mod store;

pub use config::CoordinatorSettings;
pub use ledger::{LedgerEntry, LedgerError, LedgerKey, MutationLedger, OperationKind};
pub use observer::{BroadcastObserver, NoopObserver, RosterEvent};
pub use store::{RosterSnapshot, RosterStore, StoreError};

#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn remove_member(&self, member_id: &MemberId) -> Result<(), RemoteError>;
    async fn reassign_member(
        &self,
        external_uuid: &ExternalUuid,
        target_group_id: &GroupId,
    ) -> Result<(), RemoteError>;
    async fn create_member(
        &self,
        request: &CreateMemberRequest,
    ) -> Result<ServerMember, RemoteError>;
}

pub struct UnavailableRemoteClient;

#[async_trait]
impl RemoteClient for UnavailableRemoteClient {
    async fn remove_member(&self, member_id: &MemberId) -> Result<(), RemoteError> {
        Err(RemoteError::Network(format!(
            "roster service unavailable; cannot remove member {member_id}"
        )))
    }

    async fn reassign_member(
        &self,
        external_uuid: &ExternalUuid,
        _target_group_id: &GroupId,
    ) -> Result<(), RemoteError> {
        Err(RemoteError::Network(format!(
            "roster service unavailable; cannot reassign member {external_uuid}"
        )))
    }

    async fn create_member(
        &self,
        _request: &CreateMemberRequest,
    ) -> Result<ServerMember, RemoteError> {
        Err(RemoteError::Network(
            "roster service unavailable; cannot create member".into(),
        ))
    }
}

/// Maps a team name to the durable id the remote service expects.
pub trait GroupDirectory: Send + Sync {
    fn resolve_group_id(&self, group_name: &str) -> Option<GroupId>;
}

impl GroupDirectory for HashMap<String, GroupId> {
    fn resolve_group_id(&self, group_name: &str) -> Option<GroupId> {
        self.get(group_name).cloned()
    }
}

/// Receives every roster change and every terminal operation outcome.
///
/// Callbacks run while the coordinator holds its state lock, so they arrive in
/// mutation order and must not call back into the coordinator.
pub trait RosterObserver: Send + Sync {
    fn on_roster_changed(&self, snapshot: &RosterSnapshot);
    fn on_operation_result(&self, kind: OperationKind, outcome: &OperationOutcome, message: &str);

    fn on_member_moved(&self, _member: &Member, _target_group_id: &GroupId) {}

    fn on_creation_dispatched(&self, _temp_id: &MemberId) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("member {0} is not in the roster")]
    NotFound(MemberId),
    #[error("team '{0}' could not be resolved")]
    UnresolvedTarget(String),
    #[error("member {0} has no durable identity and cannot be moved")]
    MissingDurableIdentity(MemberId),
    #[error("member {0} is still being created")]
    PendingCreation(MemberId),
    #[error("another change to member {0} is still in progress")]
    OperationInProgress(MemberId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Confirmed,
    RolledBack(RemoteError),
    Rejected(OperationError),
}

impl OperationOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

/// Terminal result of an operation whose remote call was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReport {
    pub kind: OperationKind,
    pub outcome: OperationOutcome,
    pub message: String,
    /// The member as it stands after settlement: the server-confirmed record
    /// for a successful create, otherwise the local record the operation acted on.
    pub member: Member,
}

struct CoordinatorState {
    roster: RosterStore,
    ledger: MutationLedger,
    in_flight: HashMap<MemberId, OperationKind>,
    temp_seq: u64,
}

impl CoordinatorState {
    fn next_temp_id(&mut self, prefix: &str) -> MemberId {
        loop {
            self.temp_seq += 1;
            let candidate = MemberId::new(format!("{prefix}{}", self.temp_seq));
            if !self.roster.contains(&candidate) && !self.in_flight.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    // Removes the member and files its undo record; nothing changes on error.
    fn stage_removal(
        &mut self,
        member_id: &MemberId,
        kind: OperationKind,
        key: LedgerKey,
    ) -> Result<(Member, RosterSnapshot), OperationError> {
        let (member, index, snapshot) = self.roster.remove(member_id)?;
        let entry = LedgerEntry {
            kind,
            snapshot: member.clone(),
            original_index: index,
        };
        if let Err(err) = self.ledger.record(key, entry) {
            self.roster.insert_at(index, member)?;
            return Err(err.into());
        }
        self.in_flight.insert(member_id.clone(), kind);
        Ok((member, snapshot))
    }

    // Puts a removed member back after its remote call failed.
    fn restore(&mut self, entry: LedgerEntry) -> Option<RosterSnapshot> {
        let member_id = entry.snapshot.id.clone();
        match self.roster.insert_at(entry.original_index, entry.snapshot) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!("roster: rollback skipped id={member_id}: {err}");
                None
            }
        }
    }
}

pub struct RosterCoordinator {
    remote: Arc<dyn RemoteClient>,
    groups: Arc<dyn GroupDirectory>,
    observer: Arc<dyn RosterObserver>,
    settings: CoordinatorSettings,
    inner: Mutex<CoordinatorState>,
}

impl RosterCoordinator {
    pub fn new(
        members: Vec<Member>,
        remote: Arc<dyn RemoteClient>,
        groups: Arc<dyn GroupDirectory>,
        observer: Arc<dyn RosterObserver>,
    ) -> Result<Arc<Self>, StoreError> {
        Self::new_with_settings(
            members,
            remote,
            groups,
            observer,
            CoordinatorSettings::default(),
        )
    }

    pub fn new_with_settings(
        members: Vec<Member>,
        remote: Arc<dyn RemoteClient>,
        groups: Arc<dyn GroupDirectory>,
        observer: Arc<dyn RosterObserver>,
        settings: CoordinatorSettings,
    ) -> Result<Arc<Self>, StoreError> {
        let roster = RosterStore::from_members(members)?;
        info!(
            "roster: session started members={} temp_prefix={}",
            roster.len(),
            settings.temp_id_prefix
        );
        Ok(Arc::new(Self {
            remote,
            groups,
            observer,
            settings,
            inner: Mutex::new(CoordinatorState {
                roster,
                ledger: MutationLedger::new(),
                in_flight: HashMap::new(),
                temp_seq: 0,
            }),
        }))
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub async fn snapshot(&self) -> RosterSnapshot {
        self.inner.lock().await.roster.snapshot()
    }

    pub async fn pending_operations(&self) -> usize {
        self.inner.lock().await.ledger.len()
    }

    pub async fn is_pending(&self, member_id: &MemberId) -> bool {
        self.inner.lock().await.in_flight.contains_key(member_id)
    }

    /// Optimistically removes a member, then asks the server to delete it.
    ///
    /// Deleting a member that is absent, or already being deleted, is a silent
    /// no-op returning [`OperationError::NotFound`].
    pub async fn delete_member(
        &self,
        member_id: &MemberId,
    ) -> Result<OperationReport, OperationError> {
        let kind = OperationKind::Delete;
        let key = LedgerKey::Local(member_id.clone());

        let member = {
            let mut state = self.inner.lock().await;
            match state.in_flight.get(member_id) {
                Some(OperationKind::Delete) => {
                    debug!("roster: delete already in flight id={member_id}");
                    return Err(OperationError::NotFound(member_id.clone()));
                }
                Some(OperationKind::Create) => {
                    return Err(
                        self.reject(kind, OperationError::PendingCreation(member_id.clone()))
                    );
                }
                Some(OperationKind::Move) => {
                    return Err(
                        self.reject(kind, OperationError::OperationInProgress(member_id.clone()))
                    );
                }
                None => {}
            }
            if !state.roster.contains(member_id) {
                debug!("roster: delete skipped, member absent id={member_id}");
                return Err(OperationError::NotFound(member_id.clone()));
            }

            let (member, snapshot) = state.stage_removal(member_id, kind, key.clone())?;
            debug!("roster: delete applied id={member_id}");
            self.observer.on_roster_changed(&snapshot);
            member
        };

        let result = self
            .call_remote(self.remote.remove_member(member_id))
            .await;

        let mut state = self.inner.lock().await;
        let Some(entry) = state.ledger.take(&key) else {
            warn!("roster: delete settled twice id={member_id}");
            return Ok(settled_elsewhere(kind, result, member));
        };
        state.in_flight.remove(member_id);

        match result {
            Ok(()) => {
                let message = format!("Removed {} from the roster", member.full_name);
                info!("roster: delete confirmed id={member_id}");
                Ok(self.report(kind, OperationOutcome::Confirmed, message, member))
            }
            Err(err) => {
                warn!("roster: delete rolled back id={member_id} reason={err}");
                if let Some(snapshot) = state.restore(entry) {
                    self.observer.on_roster_changed(&snapshot);
                }
                let message = failure_message(kind, &member, &err);
                Ok(self.report(kind, OperationOutcome::RolledBack(err), message, member))
            }
        }
    }

    /// Reassigns a member to `target_group`. The member leaves this roster
    /// immediately and comes back at its old position if the server refuses.
    pub async fn move_member(
        &self,
        member_id: &MemberId,
        target_group: &str,
    ) -> Result<OperationReport, OperationError> {
        let kind = OperationKind::Move;

        let (member, external_uuid, target_group_id) = {
            let mut state = self.inner.lock().await;
            match state.in_flight.get(member_id) {
                Some(OperationKind::Create) => {
                    return Err(
                        self.reject(kind, OperationError::PendingCreation(member_id.clone()))
                    );
                }
                Some(_) => {
                    return Err(
                        self.reject(kind, OperationError::OperationInProgress(member_id.clone()))
                    );
                }
                None => {}
            }
            let Some(current) = state.roster.get(member_id) else {
                return Err(self.reject(kind, OperationError::NotFound(member_id.clone())));
            };
            let Some(target_group_id) = self.groups.resolve_group_id(target_group) else {
                return Err(
                    self.reject(kind, OperationError::UnresolvedTarget(target_group.to_string()))
                );
            };
            let Some(external_uuid) = current.external_uuid.clone() else {
                return Err(self.reject(
                    kind,
                    OperationError::MissingDurableIdentity(member_id.clone()),
                ));
            };

            let key = LedgerKey::Durable(external_uuid.clone());
            let (member, snapshot) = state.stage_removal(member_id, kind, key)?;
            debug!(
                "roster: move applied id={member_id} uuid={external_uuid} target={target_group_id}"
            );
            self.observer.on_roster_changed(&snapshot);

            let mut relocated = member.clone();
            relocated.team = target_group.to_string();
            self.observer.on_member_moved(&relocated, &target_group_id);

            (member, external_uuid, target_group_id)
        };

        let result = self
            .call_remote(
                self.remote
                    .reassign_member(&external_uuid, &target_group_id),
            )
            .await;

        let key = LedgerKey::Durable(external_uuid.clone());
        let mut state = self.inner.lock().await;
        let Some(entry) = state.ledger.take(&key) else {
            warn!("roster: move settled twice uuid={external_uuid}");
            return Ok(settled_elsewhere(kind, result, member));
        };
        state.in_flight.remove(member_id);

        match result {
            Ok(()) => {
                info!("roster: move confirmed uuid={external_uuid} target={target_group_id}");
                let message = format!("Moved {} to {target_group}", member.full_name);
                Ok(self.report(kind, OperationOutcome::Confirmed, message, member))
            }
            Err(err) => {
                warn!("roster: move rolled back uuid={external_uuid} reason={err}");
                if let Some(snapshot) = state.restore(entry) {
                    self.observer.on_roster_changed(&snapshot);
                }
                let message = failure_message(kind, &member, &err);
                Ok(self.report(kind, OperationOutcome::RolledBack(err), message, member))
            }
        }
    }

    /// Shows a provisional member under a temporary id right away and swaps in
    /// the server's record once the create is confirmed.
    pub async fn create_member(
        &self,
        request: CreateMemberRequest,
    ) -> Result<OperationReport, OperationError> {
        let kind = OperationKind::Create;

        let role = request
            .role
            .as_deref()
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .unwrap_or(self.settings.default_role.as_str())
            .to_string();
        let request = CreateMemberRequest {
            role: Some(role.clone()),
            ..request
        };

        let (temp_id, provisional) = {
            let mut state = self.inner.lock().await;
            let temp_id = state.next_temp_id(&self.settings.temp_id_prefix);
            let provisional = Member {
                id: temp_id.clone(),
                full_name: request.full_name(),
                email: request.email.clone(),
                role,
                team: request.team.clone(),
                external_uuid: None,
            };

            let snapshot = state.roster.append(provisional.clone())?;
            let entry = LedgerEntry {
                kind,
                snapshot: provisional.clone(),
                original_index: state.roster.len() - 1,
            };
            if let Err(err) = state.ledger.record(LedgerKey::Local(temp_id.clone()), entry) {
                state.roster.remove(&temp_id)?;
                return Err(err.into());
            }
            state.in_flight.insert(temp_id.clone(), kind);

            debug!("roster: create applied temp_id={temp_id}");
            self.observer.on_roster_changed(&snapshot);
            self.observer.on_creation_dispatched(&temp_id);
            (temp_id, provisional)
        };

        let result = self.call_remote(self.remote.create_member(&request)).await;

        let mut state = self.inner.lock().await;
        let Some(entry) = state.ledger.take(&LedgerKey::Local(temp_id.clone())) else {
            warn!("roster: create settled twice temp_id={temp_id}");
            return Ok(settled_elsewhere(kind, result.map(|_| ()), provisional));
        };
        state.in_flight.remove(&temp_id);

        match result {
            Ok(server_member) => {
                let confirmed = server_member.into_member(&entry.snapshot);
                info!("roster: create confirmed temp_id={temp_id} id={}", confirmed.id);

                if !state.roster.contains(&temp_id) {
                    warn!(
                        "roster: provisional member no longer listed temp_id={temp_id} id={}",
                        confirmed.id
                    );
                } else if confirmed.id != temp_id && state.roster.contains(&confirmed.id) {
                    // The confirmed id is already listed; the provisional row must go.
                    warn!(
                        "roster: confirmed id already listed temp_id={temp_id} id={}",
                        confirmed.id
                    );
                    let (_, _, snapshot) = state.roster.remove(&temp_id)?;
                    self.observer.on_roster_changed(&snapshot);
                    let message = format!(
                        "Added {}, who was already listed in the roster",
                        confirmed.full_name
                    );
                    return Ok(self.report(kind, OperationOutcome::Confirmed, message, confirmed));
                } else if let Some(snapshot) = state.roster.replace_id(&temp_id, confirmed.clone()) {
                    self.observer.on_roster_changed(&snapshot);
                }

                let message = format!("Added {} to the roster", confirmed.full_name);
                Ok(self.report(kind, OperationOutcome::Confirmed, message, confirmed))
            }
            Err(err) => {
                warn!("roster: create rolled back temp_id={temp_id} reason={err}");
                match state.roster.remove(&temp_id) {
                    Ok((_, _, snapshot)) => self.observer.on_roster_changed(&snapshot),
                    Err(remove_err) => warn!(
                        "roster: provisional member already gone temp_id={temp_id}: {remove_err}"
                    ),
                }
                let message = failure_message(kind, &provisional, &err);
                Ok(self.report(kind, OperationOutcome::RolledBack(err), message, provisional))
            }
        }
    }

    async fn call_remote<T>(
        &self,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        match self.settings.remote_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(RemoteError::Timeout(duration_millis(limit)))),
            None => call.await,
        }
    }

    fn reject(&self, kind: OperationKind, err: OperationError) -> OperationError {
        info!("roster: {kind} rejected: {err}");
        let message = err.to_string();
        self.observer
            .on_operation_result(kind, &OperationOutcome::Rejected(err.clone()), &message);
        err
    }

    fn report(
        &self,
        kind: OperationKind,
        outcome: OperationOutcome,
        message: String,
        member: Member,
    ) -> OperationReport {
        self.observer.on_operation_result(kind, &outcome, &message);
        OperationReport {
            kind,
            outcome,
            message,
            member,
        }
    }
}

/// Report for a settlement whose ledger entry was already taken.
///
/// The observer received this operation's report when the entry was taken, so
/// this one is returned to the caller only.
fn settled_elsewhere(
    kind: OperationKind,
    result: Result<(), RemoteError>,
    member: Member,
) -> OperationReport {
    let outcome = match result {
        Ok(()) => OperationOutcome::Confirmed,
        Err(err) => OperationOutcome::RolledBack(err),
    };
    OperationReport {
        kind,
        outcome,
        message: format!("The {kind} of {} was already settled", member.full_name),
        member,
    }
}

fn failure_message(kind: OperationKind, member: &Member, err: &RemoteError) -> String {
    if kind == OperationKind::Create && err.is_conflict() {
        return format!("A member with email {} already exists", member.email);
    }
    let action = match kind {
        OperationKind::Delete => "remove",
        OperationKind::Move => "move",
        OperationKind::Create => "add",
    };
    match err {
        RemoteError::Network(_) | RemoteError::Timeout(_) => format!(
            "Could not {action} {}: the server could not be reached. Your change was undone.",
            member.full_name
        ),
        RemoteError::Rejected { message, .. } => {
            format!("Could not {action} {}: {message}", member.full_name)
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
