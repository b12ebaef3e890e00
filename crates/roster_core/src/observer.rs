//! Ready-made observers: a broadcast fan-out for UI layers and a no-op sink.

use shared::domain::{GroupId, Member, MemberId};
use tokio::sync::broadcast;

use crate::{OperationKind, OperationOutcome, RosterObserver, RosterSnapshot};

#[derive(Debug, Clone)]
pub enum RosterEvent {
    RosterChanged(RosterSnapshot),
    OperationSettled {
        kind: OperationKind,
        outcome: OperationOutcome,
        message: String,
    },
    MemberMoved {
        member: Member,
        target_group_id: GroupId,
    },
    CreationDispatched {
        temp_id: MemberId,
    },
}

/// Forwards observer callbacks onto a broadcast channel.
///
/// Events are dropped while nobody is subscribed; lagging receivers lose the
/// oldest events first, so consumers should treat the latest
/// [`RosterEvent::RosterChanged`] as authoritative.
pub struct BroadcastObserver {
    events: broadcast::Sender<RosterEvent>,
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RosterEvent> {
        self.events.subscribe()
    }
}

impl Default for BroadcastObserver {
    fn default() -> Self {
        Self::new(256)
    }
}

impl RosterObserver for BroadcastObserver {
    fn on_roster_changed(&self, snapshot: &RosterSnapshot) {
        let _ = self.events.send(RosterEvent::RosterChanged(snapshot.clone()));
    }

    fn on_operation_result(&self, kind: OperationKind, outcome: &OperationOutcome, message: &str) {
        let _ = self.events.send(RosterEvent::OperationSettled {
            kind,
            outcome: outcome.clone(),
            message: message.to_string(),
        });
    }

    fn on_member_moved(&self, member: &Member, target_group_id: &GroupId) {
        let _ = self.events.send(RosterEvent::MemberMoved {
            member: member.clone(),
            target_group_id: target_group_id.clone(),
        });
    }

    fn on_creation_dispatched(&self, temp_id: &MemberId) {
        let _ = self.events.send(RosterEvent::CreationDispatched {
            temp_id: temp_id.clone(),
        });
    }
}

pub struct NoopObserver;

impl RosterObserver for NoopObserver {
    fn on_roster_changed(&self, _snapshot: &RosterSnapshot) {}

    fn on_operation_result(
        &self,
        _kind: OperationKind,
        _outcome: &OperationOutcome,
        _message: &str,
    ) {
    }
}
