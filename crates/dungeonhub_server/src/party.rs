//! Party lifecycle: membership, invites with TTL, and event fan-out.
//!
//! A session belongs to at most one party. The leader leaving (or being
//! removed) disbands the whole party. Invites expire after a configurable
//! timeout, either lazily when accepted too late or eagerly via
//! [`PartyService::expire_invites`].
//!
//! Events are delivered synchronously through the injected sink while the
//! mutating operation runs, so event order follows state order.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::session::SessionId;

pub type PartyId = u64;

/// What happened to a party, carried to every affected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PartyEventKind {
    Created = 1,
    InviteSent = 2,
    InviteAccepted = 3,
    InviteRejected = 4,
    InviteExpired = 5,
    Disbanded = 6,
}

impl PartyEventKind {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone)]
pub struct PartyEvent {
    pub kind: PartyEventKind,
    pub party_id: PartyId,
    pub actor_session_id: SessionId,
    pub target_session_id: SessionId,
    pub member_session_ids: Vec<SessionId>,
    pub message: String,
}

impl PartyEvent {
    fn new(kind: PartyEventKind, party_id: PartyId, message: &str) -> Self {
        Self {
            kind,
            party_id,
            actor_session_id: 0,
            target_session_id: 0,
            member_session_ids: Vec::new(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyMember {
    pub session_id: SessionId,
    pub user_id: String,
}

/// Snapshot of one party, members sorted by session id.
#[derive(Debug, Clone)]
pub struct PartyInfo {
    pub party_id: PartyId,
    pub leader_session_id: SessionId,
    pub members: Vec<PartyMember>,
}

pub type EventSink = Box<dyn Fn(SessionId, &PartyEvent) + Send + Sync>;

#[derive(Debug)]
struct PartyRecord {
    id: PartyId,
    leader_session_id: SessionId,
    members: HashMap<SessionId, PartyMember>,
}

#[derive(Debug)]
struct PartyInvite {
    inviter_session_id: SessionId,
    invitee_user_id: String,
    sent_at: Instant,
}

pub struct PartyService {
    next_party_id: PartyId,
    parties: HashMap<PartyId, PartyRecord>,
    member_index: HashMap<SessionId, PartyId>,
    invites: HashMap<PartyId, HashMap<SessionId, PartyInvite>>,
    event_sink: Option<EventSink>,
    invite_timeout: Duration,
}

impl Default for PartyService {
    fn default() -> Self {
        Self::new()
    }
}

impl PartyService {
    pub fn new() -> Self {
        Self {
            next_party_id: 1,
            parties: HashMap::new(),
            member_index: HashMap::new(),
            invites: HashMap::new(),
            event_sink: None,
            invite_timeout: Duration::from_secs(300),
        }
    }

    pub fn set_event_sink(&mut self, sink: EventSink) {
        self.event_sink = Some(sink);
    }

    pub fn set_invite_timeout(&mut self, timeout: Duration) {
        self.invite_timeout = timeout;
    }

    /// Creates a party with the leader as sole member. Fails if the leader
    /// is already in a party.
    pub fn create_party(
        &mut self,
        leader_session_id: SessionId,
        leader_user_id: String,
    ) -> Option<PartyId> {
        if self.member_index.contains_key(&leader_session_id) {
            return None;
        }

        let id = self.next_party_id;
        self.next_party_id += 1;

        let mut members = HashMap::new();
        members.insert(
            leader_session_id,
            PartyMember {
                session_id: leader_session_id,
                user_id: leader_user_id,
            },
        );
        let record = PartyRecord {
            id,
            leader_session_id,
            members,
        };
        self.member_index.insert(leader_session_id, id);

        let mut event = PartyEvent::new(PartyEventKind::Created, id, "Party created");
        event.actor_session_id = leader_session_id;
        event.member_session_ids.push(leader_session_id);
        self.emit_to_party(&record, &event);

        self.parties.insert(id, record);
        Some(id)
    }

    /// Records an invite. Requires the inviter to be a member, the invitee
    /// to be partyless, and no outstanding invite for the invitee.
    pub fn invite_member(
        &mut self,
        party_id: PartyId,
        inviter_session_id: SessionId,
        invitee_session_id: SessionId,
        invitee_user_id: String,
        now: Instant,
    ) -> bool {
        let Some(party) = self.parties.get(&party_id) else {
            return false;
        };
        if !party.members.contains_key(&inviter_session_id) {
            return false;
        }
        if self.member_index.contains_key(&invitee_session_id) {
            return false;
        }
        let party_invites = self.invites.entry(party_id).or_default();
        if party_invites.contains_key(&invitee_session_id) {
            return false;
        }
        party_invites.insert(
            invitee_session_id,
            PartyInvite {
                inviter_session_id,
                invitee_user_id,
                sent_at: now,
            },
        );

        let mut event = PartyEvent::new(PartyEventKind::InviteSent, party_id, "Party invite sent");
        event.actor_session_id = inviter_session_id;
        event.target_session_id = invitee_session_id;
        let party = &self.parties[&party_id];
        self.emit_to_party(party, &event);
        self.emit_to_session(invitee_session_id, &event);
        true
    }

    /// Accepts an invite. A late accept purges the invite, emits
    /// `InviteExpired` to the party and the invitee, and fails.
    pub fn accept_invite(
        &mut self,
        party_id: PartyId,
        invitee_session_id: SessionId,
        now: Instant,
    ) -> bool {
        if !self.parties.contains_key(&party_id) {
            return false;
        }
        let Some(party_invites) = self.invites.get_mut(&party_id) else {
            return false;
        };
        let Some(invite) = party_invites.get(&invitee_session_id) else {
            return false;
        };

        if now.saturating_duration_since(invite.sent_at) > self.invite_timeout {
            party_invites.remove(&invitee_session_id);
            let mut event =
                PartyEvent::new(PartyEventKind::InviteExpired, party_id, "Party invite expired");
            event.target_session_id = invitee_session_id;
            let party = &self.parties[&party_id];
            self.emit_to_party(party, &event);
            self.emit_to_session(invitee_session_id, &event);
            return false;
        }

        if self.member_index.contains_key(&invitee_session_id) {
            party_invites.remove(&invitee_session_id);
            return false;
        }

        let invite = party_invites.remove(&invitee_session_id).expect("checked above");
        let party = self.parties.get_mut(&party_id).expect("checked above");
        party.members.insert(
            invitee_session_id,
            PartyMember {
                session_id: invitee_session_id,
                user_id: invite.invitee_user_id,
            },
        );
        self.member_index.insert(invitee_session_id, party_id);

        let mut event = PartyEvent::new(
            PartyEventKind::InviteAccepted,
            party_id,
            "Party invite accepted",
        );
        event.actor_session_id = invitee_session_id;
        event.member_session_ids = party.members.keys().copied().collect();
        let party = &self.parties[&party_id];
        self.emit_to_party(party, &event);
        true
    }

    pub fn reject_invite(&mut self, party_id: PartyId, invitee_session_id: SessionId) -> bool {
        if !self.parties.contains_key(&party_id) {
            return false;
        }
        let Some(party_invites) = self.invites.get_mut(&party_id) else {
            return false;
        };
        if party_invites.remove(&invitee_session_id).is_none() {
            return false;
        }

        let mut event = PartyEvent::new(
            PartyEventKind::InviteRejected,
            party_id,
            "Party invite rejected",
        );
        event.actor_session_id = invitee_session_id;
        event.target_session_id = invitee_session_id;
        let party = &self.parties[&party_id];
        self.emit_to_party(party, &event);
        self.emit_to_session(invitee_session_id, &event);
        true
    }

    /// Disbands a party. Leader only.
    pub fn disband_party(&mut self, party_id: PartyId, requester_session_id: SessionId) -> bool {
        let Some(party) = self.parties.get(&party_id) else {
            return false;
        };
        if party.leader_session_id != requester_session_id {
            return false;
        }

        let mut event = PartyEvent::new(PartyEventKind::Disbanded, party_id, "Party disbanded");
        event.actor_session_id = requester_session_id;
        event.member_session_ids = party.members.keys().copied().collect();
        for session_id in &event.member_session_ids {
            self.member_index.remove(session_id);
        }

        let party = self.parties.remove(&party_id).expect("checked above");
        self.emit_to_party(&party, &event);
        self.invites.remove(&party_id);
        true
    }

    /// Removes a session from its party. Removing the leader disbands the
    /// party; removing anyone else also drops their outstanding invites.
    pub fn remove_member(&mut self, member_session_id: SessionId) -> bool {
        let Some(&party_id) = self.member_index.get(&member_session_id) else {
            return false;
        };
        let Some(party) = self.parties.get_mut(&party_id) else {
            self.member_index.remove(&member_session_id);
            return false;
        };

        if party.leader_session_id == member_session_id {
            let mut event = PartyEvent::new(PartyEventKind::Disbanded, party_id, "Party disbanded");
            event.actor_session_id = member_session_id;
            event.member_session_ids = party.members.keys().copied().collect();
            for session_id in &event.member_session_ids {
                self.member_index.remove(session_id);
            }
            let party = self.parties.remove(&party_id).expect("checked above");
            self.emit_to_party(&party, &event);
            self.invites.remove(&party_id);
            return true;
        }

        party.members.remove(&member_session_id);
        self.member_index.remove(&member_session_id);
        if let Some(party_invites) = self.invites.get_mut(&party_id) {
            party_invites.remove(&member_session_id);
        }
        true
    }

    /// Rebinds a member to a new session id, used when a user resumes on a
    /// fresh connection. Leadership follows the member.
    pub fn replace_member_session(
        &mut self,
        old_session_id: SessionId,
        new_session_id: SessionId,
    ) -> bool {
        let Some(party_id) = self.member_index.remove(&old_session_id) else {
            return false;
        };
        let Some(party) = self.parties.get_mut(&party_id) else {
            return false;
        };
        let Some(mut member) = party.members.remove(&old_session_id) else {
            self.member_index.insert(old_session_id, party_id);
            return false;
        };
        member.session_id = new_session_id;
        party.members.insert(new_session_id, member);
        if party.leader_session_id == old_session_id {
            party.leader_session_id = new_session_id;
        }
        self.member_index.insert(new_session_id, party_id);
        true
    }

    /// Purges every invite past the timeout, emitting `InviteExpired` for
    /// each. Returns how many were expired.
    pub fn expire_invites(&mut self, now: Instant) -> usize {
        let timeout = self.invite_timeout;
        let mut expired = Vec::new();
        for (&party_id, party_invites) in &mut self.invites {
            party_invites.retain(|&invitee, invite| {
                let stale = now.saturating_duration_since(invite.sent_at) > timeout;
                if stale {
                    expired.push((party_id, invitee));
                }
                !stale
            });
        }

        for &(party_id, invitee) in &expired {
            let mut event =
                PartyEvent::new(PartyEventKind::InviteExpired, party_id, "Party invite expired");
            event.target_session_id = invitee;
            if let Some(party) = self.parties.get(&party_id) {
                self.emit_to_party(party, &event);
            }
            self.emit_to_session(invitee, &event);
        }
        expired.len()
    }

    pub fn get_party_info(&self, party_id: PartyId) -> Option<PartyInfo> {
        let party = self.parties.get(&party_id)?;
        let mut members: Vec<PartyMember> = party.members.values().cloned().collect();
        members.sort_by_key(|member| member.session_id);
        Some(PartyInfo {
            party_id: party.id,
            leader_session_id: party.leader_session_id,
            members,
        })
    }

    pub fn party_for_member(&self, session_id: SessionId) -> Option<PartyId> {
        self.member_index.get(&session_id).copied()
    }

    fn emit_to_party(&self, party: &PartyRecord, event: &PartyEvent) {
        let Some(sink) = &self.event_sink else {
            return;
        };
        for &session_id in party.members.keys() {
            sink(session_id, event);
        }
    }

    fn emit_to_session(&self, session_id: SessionId, event: &PartyEvent) {
        if let Some(sink) = &self.event_sink {
            sink(session_id, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn collecting_sink() -> (EventSink, Arc<Mutex<Vec<(SessionId, PartyEventKind)>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();
        let sink: EventSink = Box::new(move |session_id, event: &PartyEvent| {
            captured.lock().unwrap().push((session_id, event.kind));
        });
        (sink, events)
    }

    #[test]
    fn create_invite_accept_flow() {
        let now = Instant::now();
        let mut service = PartyService::new();
        let party_id = service.create_party(1, "leader".into()).unwrap();

        assert!(service.invite_member(party_id, 1, 2, "friend".into(), now));
        assert!(service.accept_invite(party_id, 2, now));

        let info = service.get_party_info(party_id).unwrap();
        assert_eq!(info.leader_session_id, 1);
        assert_eq!(info.members.len(), 2);
        assert_eq!(service.party_for_member(2), Some(party_id));
    }

    #[test]
    fn member_cannot_be_in_two_parties() {
        let now = Instant::now();
        let mut service = PartyService::new();
        let first = service.create_party(1, "a".into()).unwrap();
        assert!(service.create_party(1, "a".into()).is_none());

        let second = service.create_party(3, "c".into()).unwrap();
        assert!(service.invite_member(first, 1, 2, "b".into(), now));
        assert!(service.accept_invite(first, 2, now));
        // Session 2 is now a member of `first`; inviting them elsewhere fails.
        assert!(!service.invite_member(second, 3, 2, "b".into(), now));
    }

    #[test]
    fn duplicate_invite_is_rejected() {
        let now = Instant::now();
        let mut service = PartyService::new();
        let party_id = service.create_party(1, "a".into()).unwrap();
        assert!(service.invite_member(party_id, 1, 2, "b".into(), now));
        assert!(!service.invite_member(party_id, 1, 2, "b".into(), now));
    }

    #[test]
    fn non_member_cannot_invite() {
        let now = Instant::now();
        let mut service = PartyService::new();
        let party_id = service.create_party(1, "a".into()).unwrap();
        assert!(!service.invite_member(party_id, 99, 2, "b".into(), now));
    }

    #[test]
    fn late_accept_expires_the_invite() {
        let now = Instant::now();
        let mut service = PartyService::new();
        service.set_invite_timeout(Duration::from_secs(10));
        let (sink, events) = collecting_sink();
        service.set_event_sink(sink);

        let party_id = service.create_party(1, "a".into()).unwrap();
        assert!(service.invite_member(party_id, 1, 2, "b".into(), now));

        let late = now + Duration::from_secs(11);
        assert!(!service.accept_invite(party_id, 2, late));
        // Invite is gone; a retry finds nothing.
        assert!(!service.accept_invite(party_id, 2, now));

        let kinds: Vec<PartyEventKind> =
            events.lock().unwrap().iter().map(|(_, kind)| *kind).collect();
        assert!(kinds.contains(&PartyEventKind::InviteExpired));
    }

    #[test]
    fn expire_invites_sweeps_eagerly() {
        let now = Instant::now();
        let mut service = PartyService::new();
        service.set_invite_timeout(Duration::from_secs(10));
        let party_id = service.create_party(1, "a".into()).unwrap();
        assert!(service.invite_member(party_id, 1, 2, "b".into(), now));
        assert!(service.invite_member(party_id, 1, 3, "c".into(), now));

        assert_eq!(service.expire_invites(now + Duration::from_secs(5)), 0);
        assert_eq!(service.expire_invites(now + Duration::from_secs(11)), 2);
        assert!(!service.accept_invite(party_id, 2, now + Duration::from_secs(11)));
    }

    #[test]
    fn only_leader_disbands() {
        let now = Instant::now();
        let mut service = PartyService::new();
        let party_id = service.create_party(1, "a".into()).unwrap();
        assert!(service.invite_member(party_id, 1, 2, "b".into(), now));
        assert!(service.accept_invite(party_id, 2, now));

        assert!(!service.disband_party(party_id, 2));
        assert!(service.disband_party(party_id, 1));
        assert!(service.get_party_info(party_id).is_none());
        assert_eq!(service.party_for_member(1), None);
        assert_eq!(service.party_for_member(2), None);
    }

    #[test]
    fn leader_removal_disbands_atomically() {
        let now = Instant::now();
        let mut service = PartyService::new();
        let party_id = service.create_party(1, "a".into()).unwrap();
        assert!(service.invite_member(party_id, 1, 2, "b".into(), now));
        assert!(service.accept_invite(party_id, 2, now));

        assert!(service.remove_member(1));
        assert!(service.get_party_info(party_id).is_none());
        assert_eq!(service.party_for_member(2), None);
    }

    #[test]
    fn regular_member_removal_keeps_party() {
        let now = Instant::now();
        let mut service = PartyService::new();
        let party_id = service.create_party(1, "a".into()).unwrap();
        assert!(service.invite_member(party_id, 1, 2, "b".into(), now));
        assert!(service.accept_invite(party_id, 2, now));

        assert!(service.remove_member(2));
        let info = service.get_party_info(party_id).unwrap();
        assert_eq!(info.members.len(), 1);
        assert_eq!(info.leader_session_id, 1);
    }

    #[test]
    fn replace_member_session_preserves_leadership() {
        let mut service = PartyService::new();
        let party_id = service.create_party(1, "a".into()).unwrap();
        assert!(service.replace_member_session(1, 7));
        let info = service.get_party_info(party_id).unwrap();
        assert_eq!(info.leader_session_id, 7);
        assert_eq!(service.party_for_member(7), Some(party_id));
        assert_eq!(service.party_for_member(1), None);
    }

    #[test]
    fn events_reach_members_and_invitee() {
        let now = Instant::now();
        let mut service = PartyService::new();
        let (sink, events) = collecting_sink();
        service.set_event_sink(sink);

        let party_id = service.create_party(1, "a".into()).unwrap();
        assert!(service.invite_member(party_id, 1, 2, "b".into(), now));

        let recorded = events.lock().unwrap().clone();
        assert!(recorded.contains(&(1, PartyEventKind::Created)));
        assert!(recorded.contains(&(1, PartyEventKind::InviteSent)));
        assert!(recorded.contains(&(2, PartyEventKind::InviteSent)));
    }
}
