//! Dungeon instance state machine.
//!
//! Allowed transitions:
//!
//! ```text
//! Waiting ──> Ready ──> Playing ──> Clear ──┐
//!    │          │          │  └────> Fail ──┤
//!    └──────────┴──────────┴───────────────> Terminate
//! ```
//!
//! Entering `Ready` or `Playing` additionally requires the owning party to
//! still exist with its leader present.

use std::collections::HashMap;

use crate::party::{PartyId, PartyService};

pub type InstanceId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum InstanceState {
    Waiting = 0,
    Ready = 1,
    Playing = 2,
    Clear = 3,
    Fail = 4,
    Terminate = 5,
}

impl InstanceState {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub party_id: PartyId,
    pub state: InstanceState,
}

#[derive(Debug, Default)]
pub struct InstanceManager {
    next_instance_id: InstanceId,
    instances: HashMap<InstanceId, InstanceRecord>,
}

impl InstanceManager {
    pub fn new() -> Self {
        Self {
            next_instance_id: 1,
            instances: HashMap::new(),
        }
    }

    /// Creates an instance in `Waiting` for an existing party.
    pub fn create_instance(
        &mut self,
        party_id: PartyId,
        party_service: &PartyService,
    ) -> Option<InstanceId> {
        party_service.get_party_info(party_id)?;

        let id = self.next_instance_id;
        self.next_instance_id += 1;
        self.instances.insert(
            id,
            InstanceRecord {
                id,
                party_id,
                state: InstanceState::Waiting,
            },
        );
        Some(id)
    }

    /// Forces an instance to `Terminate` regardless of its current state.
    pub fn terminate_instance(&mut self, instance_id: InstanceId) -> bool {
        let Some(record) = self.instances.get_mut(&instance_id) else {
            return false;
        };
        record.state = InstanceState::Terminate;
        true
    }

    /// Applies a transition if the state machine and party preconditions
    /// allow it. Self-transitions are denied.
    pub fn request_transition(
        &mut self,
        instance_id: InstanceId,
        next_state: InstanceState,
        party_service: &PartyService,
    ) -> bool {
        let Some(record) = self.instances.get_mut(&instance_id) else {
            return false;
        };
        if record.state == next_state {
            return false;
        }
        if !transition_allowed(record.state, next_state) {
            return false;
        }
        if matches!(next_state, InstanceState::Ready | InstanceState::Playing)
            && !party_ready(record.party_id, party_service)
        {
            return false;
        }
        record.state = next_state;
        true
    }

    pub fn get_instance(&self, instance_id: InstanceId) -> Option<InstanceRecord> {
        self.instances.get(&instance_id).copied()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

fn party_ready(party_id: PartyId, party_service: &PartyService) -> bool {
    let Some(info) = party_service.get_party_info(party_id) else {
        return false;
    };
    if info.members.is_empty() {
        return false;
    }
    info.members
        .iter()
        .any(|member| member.session_id == info.leader_session_id)
}

fn transition_allowed(from: InstanceState, to: InstanceState) -> bool {
    use InstanceState::*;
    match from {
        Waiting => matches!(to, Ready | Terminate),
        Ready => matches!(to, Playing | Terminate),
        Playing => matches!(to, Clear | Fail | Terminate),
        Clear | Fail => matches!(to, Terminate),
        Terminate => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party_with_leader() -> (PartyService, PartyId) {
        let mut party_service = PartyService::new();
        let party_id = party_service.create_party(1, "leader".into()).unwrap();
        (party_service, party_id)
    }

    #[test]
    fn create_requires_live_party() {
        let (party_service, party_id) = party_with_leader();
        let mut manager = InstanceManager::new();
        assert!(manager.create_instance(party_id, &party_service).is_some());
        assert!(manager.create_instance(999, &party_service).is_none());
    }

    #[test]
    fn happy_path_through_clear() {
        let (party_service, party_id) = party_with_leader();
        let mut manager = InstanceManager::new();
        let id = manager.create_instance(party_id, &party_service).unwrap();

        assert!(manager.request_transition(id, InstanceState::Ready, &party_service));
        assert!(manager.request_transition(id, InstanceState::Playing, &party_service));
        assert!(manager.request_transition(id, InstanceState::Clear, &party_service));
        assert!(manager.request_transition(id, InstanceState::Terminate, &party_service));
        assert_eq!(
            manager.get_instance(id).unwrap().state,
            InstanceState::Terminate
        );
    }

    #[test]
    fn illegal_jumps_are_denied() {
        let (party_service, party_id) = party_with_leader();
        let mut manager = InstanceManager::new();
        let id = manager.create_instance(party_id, &party_service).unwrap();

        assert!(!manager.request_transition(id, InstanceState::Playing, &party_service));
        assert!(!manager.request_transition(id, InstanceState::Clear, &party_service));
        assert!(!manager.request_transition(id, InstanceState::Waiting, &party_service));
        assert_eq!(
            manager.get_instance(id).unwrap().state,
            InstanceState::Waiting
        );
    }

    #[test]
    fn self_transition_is_denied() {
        let (party_service, party_id) = party_with_leader();
        let mut manager = InstanceManager::new();
        let id = manager.create_instance(party_id, &party_service).unwrap();
        assert!(!manager.request_transition(id, InstanceState::Waiting, &party_service));
    }

    #[test]
    fn terminate_is_terminal() {
        let (party_service, party_id) = party_with_leader();
        let mut manager = InstanceManager::new();
        let id = manager.create_instance(party_id, &party_service).unwrap();
        assert!(manager.terminate_instance(id));
        assert!(!manager.request_transition(id, InstanceState::Ready, &party_service));
        assert!(!manager.request_transition(id, InstanceState::Waiting, &party_service));
    }

    #[test]
    fn ready_requires_party_with_leader() {
        let (mut party_service, party_id) = party_with_leader();
        let mut manager = InstanceManager::new();
        let id = manager.create_instance(party_id, &party_service).unwrap();

        // Disband the party out from under the instance.
        assert!(party_service.disband_party(party_id, 1));
        assert!(!manager.request_transition(id, InstanceState::Ready, &party_service));
        // Terminate stays allowed.
        assert!(manager.request_transition(id, InstanceState::Terminate, &party_service));
    }

    #[test]
    fn missing_instance_is_denied() {
        let (party_service, _) = party_with_leader();
        let mut manager = InstanceManager::new();
        assert!(!manager.request_transition(42, InstanceState::Ready, &party_service));
        assert!(!manager.terminate_instance(42));
        assert!(manager.get_instance(42).is_none());
    }
}
