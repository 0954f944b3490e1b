//! Guild membership.
//!
//! Same shape as a party without invites: create, join, leave. The leader
//! leaving disbands the guild. Events fan out synchronously to current
//! members through the injected sink.

use std::collections::HashMap;

use crate::session::SessionId;

pub type GuildId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum GuildEventKind {
    Created = 1,
    Joined = 2,
    Left = 3,
    Disbanded = 4,
}

impl GuildEventKind {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone)]
pub struct GuildEvent {
    pub kind: GuildEventKind,
    pub guild_id: GuildId,
    pub actor_user_id: String,
    pub member_user_ids: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildMember {
    pub session_id: SessionId,
    pub user_id: String,
}

/// Snapshot of one guild, members sorted by session id.
#[derive(Debug, Clone)]
pub struct GuildInfo {
    pub guild_id: GuildId,
    pub leader_session_id: SessionId,
    pub name: String,
    pub members: Vec<GuildMember>,
}

pub type EventSink = Box<dyn Fn(SessionId, &GuildEvent) + Send + Sync>;

#[derive(Debug)]
struct GuildRecord {
    id: GuildId,
    leader_session_id: SessionId,
    name: String,
    members: HashMap<SessionId, GuildMember>,
}

#[derive(Default)]
pub struct GuildService {
    next_guild_id: GuildId,
    guilds: HashMap<GuildId, GuildRecord>,
    member_index: HashMap<SessionId, GuildId>,
    event_sink: Option<EventSink>,
}

impl GuildService {
    pub fn new() -> Self {
        Self {
            next_guild_id: 1,
            ..Self::default()
        }
    }

    pub fn set_event_sink(&mut self, sink: EventSink) {
        self.event_sink = Some(sink);
    }

    /// Creates a guild with the leader as sole member. Fails for an empty
    /// name or a leader already in a guild.
    pub fn create_guild(
        &mut self,
        leader_session_id: SessionId,
        leader_user_id: String,
        guild_name: String,
    ) -> Option<GuildId> {
        if self.member_index.contains_key(&leader_session_id) || guild_name.is_empty() {
            return None;
        }

        let id = self.next_guild_id;
        self.next_guild_id += 1;

        let mut members = HashMap::new();
        members.insert(
            leader_session_id,
            GuildMember {
                session_id: leader_session_id,
                user_id: leader_user_id.clone(),
            },
        );
        let record = GuildRecord {
            id,
            leader_session_id,
            name: guild_name,
            members,
        };
        self.member_index.insert(leader_session_id, id);

        let event = GuildEvent {
            kind: GuildEventKind::Created,
            guild_id: id,
            actor_user_id: leader_user_id.clone(),
            member_user_ids: vec![leader_user_id],
            message: "Guild created".to_string(),
        };
        self.emit_to_guild(&record, &event);

        self.guilds.insert(id, record);
        Some(id)
    }

    /// Joins an existing guild. Fails if the session is already in one.
    pub fn join_guild(
        &mut self,
        guild_id: GuildId,
        member_session_id: SessionId,
        member_user_id: String,
    ) -> bool {
        if !self.guilds.contains_key(&guild_id) {
            return false;
        }
        if self.member_index.contains_key(&member_session_id) {
            return false;
        }

        let guild = self.guilds.get_mut(&guild_id).expect("checked above");
        guild.members.insert(
            member_session_id,
            GuildMember {
                session_id: member_session_id,
                user_id: member_user_id.clone(),
            },
        );
        self.member_index.insert(member_session_id, guild_id);

        let event = GuildEvent {
            kind: GuildEventKind::Joined,
            guild_id,
            actor_user_id: member_user_id,
            member_user_ids: guild.members.values().map(|m| m.user_id.clone()).collect(),
            message: "Guild member joined".to_string(),
        };
        let guild = &self.guilds[&guild_id];
        self.emit_to_guild(guild, &event);
        true
    }

    /// Leaves a guild. A leaving leader disbands the whole guild.
    pub fn leave_guild(&mut self, guild_id: GuildId, member_session_id: SessionId) -> bool {
        let Some(guild) = self.guilds.get_mut(&guild_id) else {
            return false;
        };
        let Some(member) = guild.members.get(&member_session_id) else {
            return false;
        };
        let actor_user_id = member.user_id.clone();

        if guild.leader_session_id == member_session_id {
            let event = GuildEvent {
                kind: GuildEventKind::Disbanded,
                guild_id,
                actor_user_id,
                member_user_ids: guild.members.values().map(|m| m.user_id.clone()).collect(),
                message: "Guild disbanded".to_string(),
            };
            let member_sessions: Vec<SessionId> = guild.members.keys().copied().collect();
            for session_id in member_sessions {
                self.member_index.remove(&session_id);
            }
            let guild = self.guilds.remove(&guild_id).expect("checked above");
            self.emit_to_guild(&guild, &event);
            return true;
        }

        guild.members.remove(&member_session_id);
        self.member_index.remove(&member_session_id);

        let event = GuildEvent {
            kind: GuildEventKind::Left,
            guild_id,
            actor_user_id,
            member_user_ids: guild.members.values().map(|m| m.user_id.clone()).collect(),
            message: "Guild member left".to_string(),
        };
        let guild = &self.guilds[&guild_id];
        self.emit_to_guild(guild, &event);
        self.emit_to_session(member_session_id, &event);
        true
    }

    /// Session-driven removal used by disconnect cleanup. Same semantics
    /// as [`leave_guild`](Self::leave_guild) but keyed by session only.
    pub fn remove_member(&mut self, member_session_id: SessionId) -> bool {
        let Some(&guild_id) = self.member_index.get(&member_session_id) else {
            return false;
        };
        if !self.guilds.contains_key(&guild_id) {
            self.member_index.remove(&member_session_id);
            return false;
        }
        self.leave_guild(guild_id, member_session_id)
    }

    /// Rebinds a member to a new session id on reconnect.
    pub fn replace_member_session(
        &mut self,
        old_session_id: SessionId,
        new_session_id: SessionId,
    ) -> bool {
        let Some(guild_id) = self.member_index.remove(&old_session_id) else {
            return false;
        };
        let Some(guild) = self.guilds.get_mut(&guild_id) else {
            return false;
        };
        let Some(mut member) = guild.members.remove(&old_session_id) else {
            self.member_index.insert(old_session_id, guild_id);
            return false;
        };
        member.session_id = new_session_id;
        guild.members.insert(new_session_id, member);
        if guild.leader_session_id == old_session_id {
            guild.leader_session_id = new_session_id;
        }
        self.member_index.insert(new_session_id, guild_id);
        true
    }

    pub fn get_guild_info(&self, guild_id: GuildId) -> Option<GuildInfo> {
        let guild = self.guilds.get(&guild_id)?;
        let mut members: Vec<GuildMember> = guild.members.values().cloned().collect();
        members.sort_by_key(|member| member.session_id);
        Some(GuildInfo {
            guild_id: guild.id,
            leader_session_id: guild.leader_session_id,
            name: guild.name.clone(),
            members,
        })
    }

    pub fn guild_for_member(&self, session_id: SessionId) -> Option<GuildId> {
        self.member_index.get(&session_id).copied()
    }

    fn emit_to_guild(&self, guild: &GuildRecord, event: &GuildEvent) {
        let Some(sink) = &self.event_sink else {
            return;
        };
        for &session_id in guild.members.keys() {
            sink(session_id, event);
        }
    }

    fn emit_to_session(&self, session_id: SessionId, event: &GuildEvent) {
        if let Some(sink) = &self.event_sink {
            sink(session_id, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn create_join_leave_flow() {
        let mut service = GuildService::new();
        let guild_id = service
            .create_guild(1, "leader".into(), "Knights".into())
            .unwrap();
        assert!(service.join_guild(guild_id, 2, "member".into()));

        let info = service.get_guild_info(guild_id).unwrap();
        assert_eq!(info.name, "Knights");
        assert_eq!(info.members.len(), 2);

        assert!(service.leave_guild(guild_id, 2));
        assert_eq!(service.get_guild_info(guild_id).unwrap().members.len(), 1);
        assert_eq!(service.guild_for_member(2), None);
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut service = GuildService::new();
        assert!(service.create_guild(1, "leader".into(), String::new()).is_none());
    }

    #[test]
    fn double_membership_is_rejected() {
        let mut service = GuildService::new();
        let first = service.create_guild(1, "a".into(), "First".into()).unwrap();
        service.create_guild(2, "b".into(), "Second".into()).unwrap();
        // Session 2 leads Second already.
        assert!(!service.join_guild(first, 2, "b".into()));
    }

    #[test]
    fn leader_leaving_disbands() {
        let mut service = GuildService::new();
        let guild_id = service.create_guild(1, "a".into(), "G".into()).unwrap();
        assert!(service.join_guild(guild_id, 2, "b".into()));

        assert!(service.leave_guild(guild_id, 1));
        assert!(service.get_guild_info(guild_id).is_none());
        assert_eq!(service.guild_for_member(1), None);
        assert_eq!(service.guild_for_member(2), None);
    }

    #[test]
    fn remove_member_mirrors_leave() {
        let mut service = GuildService::new();
        let guild_id = service.create_guild(1, "a".into(), "G".into()).unwrap();
        assert!(service.join_guild(guild_id, 2, "b".into()));
        assert!(service.remove_member(2));
        assert_eq!(service.get_guild_info(guild_id).unwrap().members.len(), 1);
    }

    #[test]
    fn events_fan_out_to_members() {
        let mut service = GuildService::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();
        service.set_event_sink(Box::new(move |session_id, event: &GuildEvent| {
            captured.lock().unwrap().push((session_id, event.kind));
        }));

        let guild_id = service.create_guild(1, "a".into(), "G".into()).unwrap();
        assert!(service.join_guild(guild_id, 2, "b".into()));

        let recorded = events.lock().unwrap().clone();
        assert!(recorded.contains(&(1, GuildEventKind::Created)));
        assert!(recorded.contains(&(1, GuildEventKind::Joined)));
        assert!(recorded.contains(&(2, GuildEventKind::Joined)));
    }

    #[test]
    fn replace_member_session_moves_binding() {
        let mut service = GuildService::new();
        let guild_id = service.create_guild(1, "a".into(), "G".into()).unwrap();
        assert!(service.replace_member_session(1, 9));
        assert_eq!(service.guild_for_member(9), Some(guild_id));
        assert_eq!(service.get_guild_info(guild_id).unwrap().leader_session_id, 9);
    }
}
