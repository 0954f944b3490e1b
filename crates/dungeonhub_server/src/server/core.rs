//! Server state and lifecycle.
//!
//! The server owns every live session (shared with the I/O layer through
//! `Arc<Mutex<_>>`), the domain services, and the cross-service side
//! tables that tie matches, instances, tickets and characters together.
//! Service event sinks are wired once at construction with a weak
//! reference to the session map; a sink resolves a session id to a live
//! session by lookup and never stores a session handle inside a service.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;

use dashmap::DashMap;
use dungeonhub_protocol::{encode_frame, messages, PacketType};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::auth::TokenService;
use crate::chat::{ChatChannelKind, ChatService};
use crate::config::{ServerConfig, SessionConfig};
use crate::guild::GuildService;
use crate::instance::{InstanceId, InstanceManager};
use crate::inventory::{
    CachedInventoryStorage, InMemoryInventoryStorage, InventoryStorage, PersistentInventoryStorage,
};
use crate::matchmaking::MatchQueue;
use crate::metrics::Metrics;
use crate::party::{PartyId, PartyService};
use crate::registry::SessionRegistry;
use crate::reward::{GrantId, RewardService};
use crate::session::{Session, SessionId, UserContext};

/// A session shared between the server and the I/O layer.
pub type SharedSession = Arc<Mutex<Session>>;

pub(crate) type SessionMap = DashMap<SessionId, SharedSession>;

pub struct Server {
    pub(crate) config: ServerConfig,
    next_session_id: SessionId,
    pub(crate) sessions: Arc<SessionMap>,
    pub(crate) registry: SessionRegistry,
    pub(crate) token_service: TokenService,
    pub(crate) party_service: PartyService,
    pub(crate) guild_service: GuildService,
    pub(crate) chat_service: ChatService,
    pub(crate) match_queue: MatchQueue,
    pub(crate) instance_manager: InstanceManager,
    pub(crate) inventory_storage: Arc<dyn InventoryStorage>,
    pub(crate) reward_service: RewardService,
    pub(crate) party_instances: HashMap<PartyId, InstanceId>,
    pub(crate) instance_tickets: HashMap<InstanceId, String>,
    pub(crate) instance_seeds: HashMap<InstanceId, u32>,
    pub(crate) instance_reward_grants: HashMap<InstanceId, GrantId>,
    pub(crate) session_instances: HashMap<SessionId, InstanceId>,
    pub(crate) session_characters: HashMap<SessionId, u64>,
    pub(crate) next_reward_grant_id: GrantId,
    pub(crate) metrics: Metrics,
    pub(crate) rng: StdRng,
    started_at: Instant,
}

impl Server {
    /// Builds a server with the default cached inventory store (durable
    /// layer fronted by an in-memory cache).
    pub fn new(config: ServerConfig) -> Self {
        let storage: Arc<dyn InventoryStorage> = Arc::new(CachedInventoryStorage::new(
            Box::new(PersistentInventoryStorage::new()),
            Box::new(InMemoryInventoryStorage::new()),
        ));
        Self::with_storage(config, storage)
    }

    /// Builds a server against a caller-provided inventory store.
    pub fn with_storage(config: ServerConfig, inventory_storage: Arc<dyn InventoryStorage>) -> Self {
        let sessions: Arc<SessionMap> = Arc::new(DashMap::new());

        let mut party_service = PartyService::new();
        party_service.set_invite_timeout(config.invite_timeout);
        party_service.set_event_sink(party_sink(Arc::downgrade(&sessions)));

        let mut guild_service = GuildService::new();
        guild_service.set_event_sink(guild_sink(Arc::downgrade(&sessions)));

        let mut chat_service = ChatService::new();
        chat_service.set_event_sink(chat_sink(Arc::downgrade(&sessions)));

        let server = Self {
            next_session_id: 1,
            sessions,
            registry: SessionRegistry::new(),
            token_service: TokenService::new(config.token_ttl),
            party_service,
            guild_service,
            chat_service,
            match_queue: MatchQueue::new(config.match_rule),
            instance_manager: InstanceManager::new(),
            inventory_storage,
            reward_service: RewardService::new(),
            party_instances: HashMap::new(),
            instance_tickets: HashMap::new(),
            instance_seeds: HashMap::new(),
            instance_reward_grants: HashMap::new(),
            session_instances: HashMap::new(),
            session_characters: HashMap::new(),
            next_reward_grant_id: 1,
            metrics: Metrics::default(),
            rng: StdRng::from_entropy(),
            started_at: Instant::now(),
            config,
        };
        info!(event = "server_started", "server started");
        server
    }

    /// Creates a session and registers it in the session map.
    pub fn create_session(&mut self, config: SessionConfig, now: Instant) -> SharedSession {
        let id = self.next_session_id;
        self.next_session_id += 1;
        let session = Arc::new(Mutex::new(Session::new(id, config, now)));
        {
            let guard = session.lock();
            info!(
                event = "session_created",
                session_id = id,
                session_trace_id = %guard.trace_id(),
                "session created"
            );
        }
        self.sessions.insert(id, session.clone());
        session
    }

    /// Drops a session and releases every binding it held: registry entry,
    /// party and guild membership, instance and character bindings.
    pub fn remove_session(&mut self, id: SessionId) {
        if let Some((_, session)) = self.sessions.remove(&id) {
            let mut guard = session.lock();
            info!(
                event = "session_removed",
                session_id = id,
                session_trace_id = %guard.trace_id(),
                "session removed"
            );
            guard.clear_user_context();
        }
        self.registry.remove_session(id);
        self.party_service.remove_member(id);
        self.guild_service.remove_member(id);
        self.session_instances.remove(&id);
        self.session_characters.remove(&id);
    }

    pub fn find_session(&self, id: SessionId) -> Option<SharedSession> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    /// Drives passive timeouts: idle sessions are disconnected and removed,
    /// stale party invites are expired.
    pub fn tick(&mut self, now: Instant) {
        let mut to_remove = Vec::new();
        for entry in self.sessions.iter() {
            if !entry.value().lock().tick(now) {
                to_remove.push(*entry.key());
            }
        }
        for id in to_remove {
            self.remove_session(id);
        }
        self.party_service.expire_invites(now);
    }

    /// Administrative disconnect with cascading cleanup.
    pub fn force_disconnect(&mut self, id: SessionId, reason: &str, request_trace_id: &str) -> bool {
        let Some(session) = self.find_session(id) else {
            warn!(
                event = "session_force_disconnect_failed",
                session_id = id,
                request_trace_id,
                reason = "session not found",
                "force disconnect failed"
            );
            self.metrics.error_total += 1;
            return false;
        };
        {
            let guard = session.lock();
            info!(
                event = "session_force_disconnected",
                session_id = id,
                session_trace_id = %guard.trace_id(),
                request_trace_id,
                reason,
                "session force disconnected"
            );
        }
        self.remove_session(id);
        true
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// User context currently registered for a session, if any.
    pub fn session_user(&self, id: SessionId) -> Option<UserContext> {
        self.registry.find(id).cloned()
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn party_service(&self) -> &PartyService {
        &self.party_service
    }

    pub fn party_service_mut(&mut self) -> &mut PartyService {
        &mut self.party_service
    }

    pub fn guild_service(&self) -> &GuildService {
        &self.guild_service
    }

    pub fn instance_manager(&self) -> &InstanceManager {
        &self.instance_manager
    }

    /// Drives an instance transition with the party preconditions applied,
    /// for callers outside the packet path (dungeon nodes, admin tooling).
    pub fn request_instance_transition(
        &mut self,
        instance_id: InstanceId,
        next_state: crate::instance::InstanceState,
    ) -> bool {
        self.instance_manager
            .request_transition(instance_id, next_state, &self.party_service)
    }

    pub fn match_queue(&self) -> &MatchQueue {
        &self.match_queue
    }

    pub fn inventory_storage(&self) -> &Arc<dyn InventoryStorage> {
        &self.inventory_storage
    }
}

/// Enqueues an encoded frame onto a session resolved through the weak map.
fn enqueue_to_session(sessions: &Weak<SessionMap>, session_id: SessionId, packet_type: PacketType, payload: &[u8]) {
    let Some(sessions) = sessions.upgrade() else {
        return;
    };
    let Some(session) = sessions.get(&session_id) else {
        return;
    };
    let mut guard = session.lock();
    let frame = encode_frame(packet_type.as_u16(), guard.protocol_version(), payload);
    guard.enqueue_send(frame, Instant::now());
}

fn party_sink(sessions: Weak<SessionMap>) -> crate::party::EventSink {
    Box::new(move |session_id, event| {
        let payload = messages::PartyEvent {
            event_type: event.kind.as_u16(),
            party_id: event.party_id,
            actor_session_id: event.actor_session_id,
            target_session_id: event.target_session_id,
            member_session_ids: event.member_session_ids.clone(),
            message: event.message.clone(),
        }
        .encode();
        enqueue_to_session(&sessions, session_id, PacketType::PartyEvent, &payload);
    })
}

fn guild_sink(sessions: Weak<SessionMap>) -> crate::guild::EventSink {
    Box::new(move |session_id, event| {
        let payload = messages::GuildEvent {
            event_type: event.kind.as_u16(),
            guild_id: event.guild_id,
            actor_user_id: event.actor_user_id.clone(),
            member_user_ids: event.member_user_ids.clone(),
            message: event.message.clone(),
        }
        .encode();
        enqueue_to_session(&sessions, session_id, PacketType::GuildEvent, &payload);
    })
}

fn chat_sink(sessions: Weak<SessionMap>) -> crate::chat::EventSink {
    Box::new(move |session_id, message| {
        let channel = match message.channel {
            ChatChannelKind::Global => messages::ChatChannel::Global,
            ChatChannelKind::Party => messages::ChatChannel::Party,
        };
        let payload = messages::ChatEvent {
            channel: channel.as_u16(),
            party_id: message.party_id,
            sender_user_id: message.sender_user_id.clone(),
            message: message.text.clone(),
        }
        .encode();
        enqueue_to_session(&sessions, session_id, PacketType::ChatEvent, &payload);
    })
}
