//! The per-packet pipeline.
//!
//! Every inbound frame runs the same preamble - metrics, a fresh request
//! trace id, a `packet_received` log line, liveness touch, protocol
//! version gate - and is then routed by packet type. Handlers answer every
//! request-type packet; failures are typed response frames, never silent
//! drops. All domain mutations for one packet finish before the call
//! returns, including fan-out frames appended to peer send queues.

use std::time::Instant;

use dungeonhub_protocol::messages::{
    ChatChannel, ChatSendRequest, ChatSendResponse, DungeonEnterRequest, DungeonEnterResponse,
    DungeonResultKind, DungeonResultNotify, DungeonResultResponse, GuildCreateRequest,
    GuildCreateResponse, GuildJoinRequest, GuildJoinResponse, GuildLeaveRequest,
    GuildLeaveResponse, InventoryUpdateNotify, InventoryUpdateResponse, LoginRequest,
    LoginResponse, LogoutRequest, LogoutResponse, MatchFoundNotify, MatchRequest,
    PartyAcceptRequest, PartyAcceptResponse, PartyCreateRequest, PartyCreateResponse,
    PartyDisbandRequest, PartyDisbandResponse, PartyInviteRequest, PartyInviteResponse,
    SessionReconnectRequest, SessionReconnectResponse, VersionReject,
};
use dungeonhub_protocol::{encode_frame, FrameHeader, PacketType};
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::instance::InstanceState;
use crate::matchmaking::MatchCandidate;
use crate::reward::{GrantOutcome, RewardItem, RewardLedger};
use crate::session::{SessionId, UserContext};

use super::core::{Server, SharedSession};

/// Development credential; replace with a credential interface before
/// production use.
const DEV_PASSWORD: &str = "letmein";

/// Log/metric context shared by every handler of one packet.
#[derive(Debug, Clone)]
struct RequestContext {
    session_id: SessionId,
    session_trace_id: String,
    request_trace_id: String,
    packet_type: u16,
    protocol_version: u16,
    bytes: usize,
    user_id: Option<String>,
}

impl Server {
    /// Handles one decoded frame. Returns the response frame for
    /// request-type packets; notify-only packets still produce a typed
    /// response here, and unknown packet types produce `None`.
    pub fn handle_packet(
        &mut self,
        session: &SharedSession,
        header: &FrameHeader,
        payload: &[u8],
        now: Instant,
    ) -> Option<Vec<u8>> {
        self.metrics.packets_total += 1;
        self.metrics.bytes_total += payload.len() as u64;

        let ctx = {
            let mut guard = session.lock();
            guard.on_receive(now);
            guard.set_protocol_version(header.version);
            RequestContext {
                session_id: guard.id(),
                session_trace_id: guard.trace_id().to_string(),
                request_trace_id: Uuid::new_v4().simple().to_string(),
                packet_type: header.packet_type,
                protocol_version: header.version,
                bytes: payload.len(),
                user_id: guard.user_context().map(|user| user.user_id.clone()),
            }
        };

        info!(
            event = "packet_received",
            session_id = ctx.session_id,
            session_trace_id = %ctx.session_trace_id,
            request_trace_id = %ctx.request_trace_id,
            packet_type = ctx.packet_type,
            protocol_version = ctx.protocol_version,
            bytes = ctx.bytes,
            "packet received"
        );

        if header.version < self.config.min_protocol_version
            || header.version > self.config.max_protocol_version
        {
            let reject = VersionReject {
                min_version: self.config.min_protocol_version,
                max_version: self.config.max_protocol_version,
                client_version: header.version,
                message: format!(
                    "Unsupported client version {} (supported {}-{})",
                    header.version,
                    self.config.min_protocol_version,
                    self.config.max_protocol_version
                ),
            };
            self.metrics.error_total += 1;
            self.log_warn(&ctx, "packet_rejected", &reject.message);
            // Framed at the client's own version so it can decode the reject.
            return Some(encode_frame(
                PacketType::VersionReject.as_u16(),
                header.version,
                &reject.encode(),
            ));
        }

        match PacketType::from_u16(header.packet_type) {
            Some(PacketType::LoginReq) => Some(self.handle_login(ctx, session, payload, now)),
            Some(PacketType::LogoutReq) => Some(self.handle_logout(ctx, session, payload)),
            Some(PacketType::SessionReconnectReq) => {
                Some(self.handle_reconnect(ctx, session, payload, now))
            }
            Some(PacketType::PartyCreateReq) => Some(self.handle_party_create(ctx, payload)),
            Some(PacketType::PartyInviteReq) => Some(self.handle_party_invite(ctx, payload, now)),
            Some(PacketType::PartyAcceptReq) => Some(self.handle_party_accept(ctx, payload, now)),
            Some(PacketType::PartyDisbandReq) => Some(self.handle_party_disband(ctx, payload)),
            Some(PacketType::GuildCreateReq) => Some(self.handle_guild_create(ctx, payload)),
            Some(PacketType::GuildJoinReq) => Some(self.handle_guild_join(ctx, payload)),
            Some(PacketType::GuildLeaveReq) => Some(self.handle_guild_leave(ctx, payload)),
            Some(PacketType::ChatSendReq) => Some(self.handle_chat_send(ctx, payload)),
            Some(PacketType::MatchReq) => Some(self.handle_match(ctx, payload, now)),
            Some(PacketType::DungeonEnterReq) => Some(self.handle_dungeon_enter(ctx, payload)),
            Some(PacketType::DungeonResultNotify) => {
                Some(self.handle_dungeon_result(ctx, payload))
            }
            Some(PacketType::InventoryUpdateNotify) => {
                Some(self.handle_inventory_update(ctx, payload))
            }
            _ => {
                self.metrics.error_total += 1;
                self.log_warn(&ctx, "packet_unhandled", "Unknown packet type");
                None
            }
        }
    }

    fn log_warn(&self, ctx: &RequestContext, event: &str, reason: &str) {
        warn!(
            event,
            session_id = ctx.session_id,
            session_trace_id = %ctx.session_trace_id,
            request_trace_id = %ctx.request_trace_id,
            packet_type = ctx.packet_type,
            protocol_version = ctx.protocol_version,
            bytes = ctx.bytes,
            user_id = ctx.user_id.as_deref(),
            reason,
            "{reason}"
        );
    }

    fn log_info(&self, ctx: &RequestContext, event: &str, message: &str) {
        info!(
            event,
            session_id = ctx.session_id,
            session_trace_id = %ctx.session_trace_id,
            request_trace_id = %ctx.request_trace_id,
            packet_type = ctx.packet_type,
            protocol_version = ctx.protocol_version,
            bytes = ctx.bytes,
            user_id = ctx.user_id.as_deref(),
            reason = message,
            "{message}"
        );
    }

    fn frame(&self, packet_type: PacketType, ctx: &RequestContext, payload: &[u8]) -> Vec<u8> {
        encode_frame(packet_type.as_u16(), ctx.protocol_version, payload)
    }

    // ---- login / logout / reconnect -----------------------------------

    fn login_failure(&mut self, ctx: &RequestContext, message: &str) -> Vec<u8> {
        self.metrics.error_total += 1;
        self.log_warn(ctx, "login_failed", message);
        let response = LoginResponse {
            accepted: false,
            token: String::new(),
            message: message.to_string(),
        };
        self.frame(PacketType::LoginRes, ctx, &response.encode())
    }

    fn handle_login(
        &mut self,
        mut ctx: RequestContext,
        session: &SharedSession,
        payload: &[u8],
        now: Instant,
    ) -> Vec<u8> {
        let Ok(request) = LoginRequest::decode(payload) else {
            return self.login_failure(&ctx, "Malformed login payload");
        };
        ctx.user_id = Some(request.user_id.clone());

        if request.password != DEV_PASSWORD {
            return self.login_failure(&ctx, "Invalid credentials");
        }

        if let Some(existing) = self.registry.session_for_user(&request.user_id) {
            if existing != ctx.session_id {
                return self.login_failure(&ctx, "User already logged in");
            }
        }

        let token = self.token_service.issue_token(&request.user_id, now);
        let context = UserContext {
            user_id: request.user_id.clone(),
            token: token.clone(),
        };
        session.lock().attach_user_context(context.clone());
        if !self.registry.register_session(ctx.session_id, context) {
            return self.login_failure(&ctx, "User already logged in");
        }

        let response = LoginResponse {
            accepted: true,
            token,
            message: "Login accepted".to_string(),
        };
        self.log_info(&ctx, "login_success", &response.message);
        self.frame(PacketType::LoginRes, &ctx, &response.encode())
    }

    fn handle_logout(
        &mut self,
        ctx: RequestContext,
        session: &SharedSession,
        payload: &[u8],
    ) -> Vec<u8> {
        if LogoutRequest::decode(payload).is_err() {
            self.metrics.error_total += 1;
            self.log_warn(&ctx, "logout_failed", "Malformed logout payload");
            let response = LogoutResponse {
                success: false,
                message: "Malformed logout payload".to_string(),
            };
            return self.frame(PacketType::LogoutRes, &ctx, &response.encode());
        }

        session.lock().clear_user_context();
        self.registry.remove_session(ctx.session_id);

        let response = LogoutResponse {
            success: true,
            message: "Logout successful".to_string(),
        };
        self.log_info(&ctx, "logout_success", &response.message);
        self.frame(PacketType::LogoutRes, &ctx, &response.encode())
    }

    fn reconnect_failure(&mut self, ctx: &RequestContext, message: &str) -> Vec<u8> {
        self.metrics.error_total += 1;
        self.log_warn(ctx, "session_reconnect_failed", message);
        let response = SessionReconnectResponse {
            success: false,
            message: message.to_string(),
            ..Default::default()
        };
        self.frame(PacketType::SessionReconnectRes, ctx, &response.encode())
    }

    fn handle_reconnect(
        &mut self,
        mut ctx: RequestContext,
        session: &SharedSession,
        payload: &[u8],
        now: Instant,
    ) -> Vec<u8> {
        let Ok(request) = SessionReconnectRequest::decode(payload) else {
            return self.reconnect_failure(&ctx, "Malformed reconnect payload");
        };

        let Some(user_id) = self.token_service.validate_token(&request.token, now) else {
            return self.reconnect_failure(&ctx, "Invalid or expired token");
        };
        ctx.user_id = Some(user_id.clone());

        // If the user still has an old session, migrate its party, guild,
        // instance and character bindings onto this one, then drop it.
        let mut previous_last_seq = 0;
        if let Some(existing_id) = self.registry.session_for_user(&user_id) {
            if existing_id != ctx.session_id {
                if let Some((_, existing_session)) = self.sessions.remove(&existing_id) {
                    previous_last_seq = existing_session.lock().last_seq();
                    self.party_service
                        .replace_member_session(existing_id, ctx.session_id);
                    self.guild_service
                        .replace_member_session(existing_id, ctx.session_id);
                    if let Some(instance_id) = self.session_instances.remove(&existing_id) {
                        self.session_instances.insert(ctx.session_id, instance_id);
                    }
                    if let Some(char_id) = self.session_characters.remove(&existing_id) {
                        self.session_characters.insert(ctx.session_id, char_id);
                    }
                    existing_session.lock().clear_user_context();
                }
                self.registry.remove_session(existing_id);
            }
        }

        let context = UserContext {
            user_id: user_id.clone(),
            token: request.token.clone(),
        };
        session.lock().attach_user_context(context.clone());
        if !self.registry.register_session(ctx.session_id, context) {
            return self.reconnect_failure(&ctx, "User already logged in");
        }

        let restored_last_seq = request.last_seq.max(previous_last_seq);
        session.lock().set_last_seq(restored_last_seq);

        let response = SessionReconnectResponse {
            success: true,
            message: "Reconnect accepted".to_string(),
            session_id: ctx.session_id,
            resume_from_seq: (restored_last_seq + 1) as u32,
        };
        self.log_info(&ctx, "session_reconnected", &response.message);
        self.frame(PacketType::SessionReconnectRes, &ctx, &response.encode())
    }

    // ---- party --------------------------------------------------------

    fn party_create_failure(&mut self, ctx: &RequestContext, message: &str) -> Vec<u8> {
        self.metrics.error_total += 1;
        self.log_warn(ctx, "party_create_failed", message);
        let response = PartyCreateResponse {
            success: false,
            party_id: 0,
            message: message.to_string(),
        };
        self.frame(PacketType::PartyCreateRes, ctx, &response.encode())
    }

    fn handle_party_create(&mut self, ctx: RequestContext, payload: &[u8]) -> Vec<u8> {
        if PartyCreateRequest::decode(payload).is_err() {
            return self.party_create_failure(&ctx, "Malformed party create payload");
        }
        let Some(user_id) = ctx.user_id.clone() else {
            return self.party_create_failure(&ctx, "Authentication required");
        };

        let Some(party_id) = self.party_service.create_party(ctx.session_id, user_id) else {
            return self.party_create_failure(&ctx, "Unable to create party");
        };

        let response = PartyCreateResponse {
            success: true,
            party_id,
            message: "Party created".to_string(),
        };
        self.log_info(&ctx, "party_created", &response.message);
        self.frame(PacketType::PartyCreateRes, &ctx, &response.encode())
    }

    fn party_invite_failure(&mut self, ctx: &RequestContext, message: &str) -> Vec<u8> {
        self.metrics.error_total += 1;
        self.log_warn(ctx, "party_invite_failed", message);
        let response = PartyInviteResponse {
            success: false,
            message: message.to_string(),
        };
        self.frame(PacketType::PartyInviteRes, ctx, &response.encode())
    }

    fn handle_party_invite(&mut self, ctx: RequestContext, payload: &[u8], now: Instant) -> Vec<u8> {
        let Ok(request) = PartyInviteRequest::decode(payload) else {
            return self.party_invite_failure(&ctx, "Malformed party invite payload");
        };
        if ctx.user_id.is_none() {
            return self.party_invite_failure(&ctx, "Authentication required");
        }

        let party_id = if request.party_id == 0 {
            match self.party_service.party_for_member(ctx.session_id) {
                Some(party_id) => party_id,
                None => return self.party_invite_failure(&ctx, "Not in a party"),
            }
        } else {
            request.party_id
        };

        let Some(invitee_session_id) = self.registry.session_for_user(&request.invitee_user_id)
        else {
            return self.party_invite_failure(&ctx, "Invitee not online");
        };

        if !self.party_service.invite_member(
            party_id,
            ctx.session_id,
            invitee_session_id,
            request.invitee_user_id.clone(),
            now,
        ) {
            return self.party_invite_failure(&ctx, "Unable to send party invite");
        }

        let response = PartyInviteResponse {
            success: true,
            message: "Party invite sent".to_string(),
        };
        self.log_info(&ctx, "party_invite_sent", &response.message);
        self.frame(PacketType::PartyInviteRes, &ctx, &response.encode())
    }

    fn party_accept_failure(&mut self, ctx: &RequestContext, message: &str) -> Vec<u8> {
        self.metrics.error_total += 1;
        self.log_warn(ctx, "party_accept_failed", message);
        let response = PartyAcceptResponse {
            success: false,
            message: message.to_string(),
        };
        self.frame(PacketType::PartyAcceptRes, ctx, &response.encode())
    }

    fn handle_party_accept(&mut self, ctx: RequestContext, payload: &[u8], now: Instant) -> Vec<u8> {
        let Ok(request) = PartyAcceptRequest::decode(payload) else {
            return self.party_accept_failure(&ctx, "Malformed party accept payload");
        };
        if ctx.user_id.is_none() {
            return self.party_accept_failure(&ctx, "Authentication required");
        }

        if !self
            .party_service
            .accept_invite(request.party_id, ctx.session_id, now)
        {
            return self.party_accept_failure(&ctx, "Unable to accept party invite");
        }

        let response = PartyAcceptResponse {
            success: true,
            message: "Party invite accepted".to_string(),
        };
        self.log_info(&ctx, "party_invite_accepted", &response.message);
        self.frame(PacketType::PartyAcceptRes, &ctx, &response.encode())
    }

    fn party_disband_failure(&mut self, ctx: &RequestContext, message: &str) -> Vec<u8> {
        self.metrics.error_total += 1;
        self.log_warn(ctx, "party_disband_failed", message);
        let response = PartyDisbandResponse {
            success: false,
            message: message.to_string(),
        };
        self.frame(PacketType::PartyDisbandRes, ctx, &response.encode())
    }

    fn handle_party_disband(&mut self, ctx: RequestContext, payload: &[u8]) -> Vec<u8> {
        let Ok(request) = PartyDisbandRequest::decode(payload) else {
            return self.party_disband_failure(&ctx, "Malformed party disband payload");
        };
        if ctx.user_id.is_none() {
            return self.party_disband_failure(&ctx, "Authentication required");
        }

        let party_id = if request.party_id == 0 {
            match self.party_service.party_for_member(ctx.session_id) {
                Some(party_id) => party_id,
                None => return self.party_disband_failure(&ctx, "Not in a party"),
            }
        } else {
            request.party_id
        };

        if !self.party_service.disband_party(party_id, ctx.session_id) {
            return self.party_disband_failure(&ctx, "Unable to disband party");
        }

        let response = PartyDisbandResponse {
            success: true,
            message: "Party disbanded".to_string(),
        };
        self.log_info(&ctx, "party_disbanded", &response.message);
        self.frame(PacketType::PartyDisbandRes, &ctx, &response.encode())
    }

    // ---- guild --------------------------------------------------------

    fn guild_create_failure(&mut self, ctx: &RequestContext, message: &str) -> Vec<u8> {
        self.metrics.error_total += 1;
        self.log_warn(ctx, "guild_create_failed", message);
        let response = GuildCreateResponse {
            success: false,
            guild_id: 0,
            message: message.to_string(),
        };
        self.frame(PacketType::GuildCreateRes, ctx, &response.encode())
    }

    fn handle_guild_create(&mut self, ctx: RequestContext, payload: &[u8]) -> Vec<u8> {
        let Ok(request) = GuildCreateRequest::decode(payload) else {
            return self.guild_create_failure(&ctx, "Malformed guild create payload");
        };
        let Some(user_id) = ctx.user_id.clone() else {
            return self.guild_create_failure(&ctx, "Authentication required");
        };

        let Some(guild_id) =
            self.guild_service
                .create_guild(ctx.session_id, user_id, request.guild_name)
        else {
            return self.guild_create_failure(&ctx, "Unable to create guild");
        };

        let response = GuildCreateResponse {
            success: true,
            guild_id,
            message: "Guild created".to_string(),
        };
        self.log_info(&ctx, "guild_created", &response.message);
        self.frame(PacketType::GuildCreateRes, &ctx, &response.encode())
    }

    fn guild_join_failure(&mut self, ctx: &RequestContext, message: &str) -> Vec<u8> {
        self.metrics.error_total += 1;
        self.log_warn(ctx, "guild_join_failed", message);
        let response = GuildJoinResponse {
            success: false,
            message: message.to_string(),
        };
        self.frame(PacketType::GuildJoinRes, ctx, &response.encode())
    }

    fn handle_guild_join(&mut self, ctx: RequestContext, payload: &[u8]) -> Vec<u8> {
        let Ok(request) = GuildJoinRequest::decode(payload) else {
            return self.guild_join_failure(&ctx, "Malformed guild join payload");
        };
        let Some(user_id) = ctx.user_id.clone() else {
            return self.guild_join_failure(&ctx, "Authentication required");
        };

        if !self
            .guild_service
            .join_guild(request.guild_id, ctx.session_id, user_id)
        {
            return self.guild_join_failure(&ctx, "Unable to join guild");
        }

        let response = GuildJoinResponse {
            success: true,
            message: "Joined guild".to_string(),
        };
        self.log_info(&ctx, "guild_joined", &response.message);
        self.frame(PacketType::GuildJoinRes, &ctx, &response.encode())
    }

    fn guild_leave_failure(&mut self, ctx: &RequestContext, message: &str) -> Vec<u8> {
        self.metrics.error_total += 1;
        self.log_warn(ctx, "guild_leave_failed", message);
        let response = GuildLeaveResponse {
            success: false,
            message: message.to_string(),
        };
        self.frame(PacketType::GuildLeaveRes, ctx, &response.encode())
    }

    fn handle_guild_leave(&mut self, ctx: RequestContext, payload: &[u8]) -> Vec<u8> {
        let Ok(request) = GuildLeaveRequest::decode(payload) else {
            return self.guild_leave_failure(&ctx, "Malformed guild leave payload");
        };
        if ctx.user_id.is_none() {
            return self.guild_leave_failure(&ctx, "Authentication required");
        }

        let guild_id = if request.guild_id == 0 {
            match self.guild_service.guild_for_member(ctx.session_id) {
                Some(guild_id) => guild_id,
                None => return self.guild_leave_failure(&ctx, "Not in a guild"),
            }
        } else {
            request.guild_id
        };

        if !self.guild_service.leave_guild(guild_id, ctx.session_id) {
            return self.guild_leave_failure(&ctx, "Unable to leave guild");
        }

        let response = GuildLeaveResponse {
            success: true,
            message: "Left guild".to_string(),
        };
        self.log_info(&ctx, "guild_left", &response.message);
        self.frame(PacketType::GuildLeaveRes, &ctx, &response.encode())
    }

    // ---- chat ---------------------------------------------------------

    fn chat_failure(&mut self, ctx: &RequestContext, message: &str) -> Vec<u8> {
        self.metrics.error_total += 1;
        self.log_warn(ctx, "chat_send_failed", message);
        let response = ChatSendResponse {
            success: false,
            message: message.to_string(),
        };
        self.frame(PacketType::ChatSendRes, ctx, &response.encode())
    }

    fn handle_chat_send(&mut self, ctx: RequestContext, payload: &[u8]) -> Vec<u8> {
        let Ok(request) = ChatSendRequest::decode(payload) else {
            return self.chat_failure(&ctx, "Malformed chat payload");
        };
        let Some(user_id) = ctx.user_id.clone() else {
            return self.chat_failure(&ctx, "Authentication required");
        };
        if request.message.is_empty() {
            return self.chat_failure(&ctx, "Chat message cannot be empty");
        }

        match ChatChannel::from_u16(request.channel) {
            Some(ChatChannel::Global) => {
                let mut recipients = Vec::with_capacity(self.sessions.len());
                for entry in self.sessions.iter() {
                    if entry.value().lock().user_context().is_some() {
                        recipients.push(*entry.key());
                    }
                }
                if !self.chat_service.send_global(
                    ctx.session_id,
                    user_id,
                    request.message,
                    &recipients,
                ) {
                    return self.chat_failure(&ctx, "Failed to deliver global chat");
                }
                let response = ChatSendResponse {
                    success: true,
                    message: "Global chat delivered".to_string(),
                };
                self.log_info(&ctx, "chat_sent", &response.message);
                self.frame(PacketType::ChatSendRes, &ctx, &response.encode())
            }
            Some(ChatChannel::Party) => {
                let party_id = if request.party_id == 0 {
                    match self.party_service.party_for_member(ctx.session_id) {
                        Some(party_id) => party_id,
                        None => return self.chat_failure(&ctx, "Not in a party"),
                    }
                } else {
                    request.party_id
                };

                let Some(info) = self.party_service.get_party_info(party_id) else {
                    return self.chat_failure(&ctx, "Party not found");
                };
                let recipients: Vec<SessionId> =
                    info.members.iter().map(|member| member.session_id).collect();
                if !recipients.contains(&ctx.session_id) {
                    return self.chat_failure(&ctx, "Not authorized for party chat");
                }

                if !self.chat_service.send_party(
                    ctx.session_id,
                    user_id,
                    party_id,
                    request.message,
                    &recipients,
                ) {
                    return self.chat_failure(&ctx, "Failed to deliver party chat");
                }
                let response = ChatSendResponse {
                    success: true,
                    message: "Party chat delivered".to_string(),
                };
                self.log_info(&ctx, "chat_sent", &response.message);
                self.frame(PacketType::ChatSendRes, &ctx, &response.encode())
            }
            None => self.chat_failure(&ctx, "Unknown chat channel"),
        }
    }

    // ---- matchmaking --------------------------------------------------

    fn match_failure(&mut self, ctx: &RequestContext, code: &str, message: &str) -> Vec<u8> {
        self.metrics.error_total += 1;
        self.log_warn(ctx, "match_request_failed", message);
        let response = MatchFoundNotify {
            success: false,
            code: code.to_string(),
            message: message.to_string(),
            ..Default::default()
        };
        self.frame(PacketType::MatchFoundNotify, ctx, &response.encode())
    }

    fn handle_match(&mut self, ctx: RequestContext, payload: &[u8], now: Instant) -> Vec<u8> {
        let Ok(request) = MatchRequest::decode(payload) else {
            return self.match_failure(&ctx, "MALFORMED", "Malformed match request");
        };
        if ctx.user_id.is_none() {
            return self.match_failure(&ctx, "UNAUTHENTICATED", "Authentication required");
        }

        let party_id = if request.party_id == 0 {
            match self.party_service.party_for_member(ctx.session_id) {
                Some(party_id) => party_id,
                None => return self.match_failure(&ctx, "NO_PARTY", "Not in a party"),
            }
        } else {
            request.party_id
        };

        let Some(party_info) = self.party_service.get_party_info(party_id) else {
            return self.match_failure(&ctx, "PARTY_NOT_FOUND", "Party not found");
        };
        if !party_info
            .members
            .iter()
            .any(|member| member.session_id == ctx.session_id)
        {
            return self.match_failure(&ctx, "NOT_PARTY_MEMBER", "Not authorized for match");
        }

        let candidate = MatchCandidate {
            party_id,
            mmr: 0,
            party_size: party_info.members.len(),
            enqueue_time: now,
        };
        if !self.match_queue.enqueue(candidate) {
            return self.match_failure(&ctx, "QUEUE_REJECTED", "Unable to enqueue for match");
        }

        let Some((first, second)) = self.match_queue.find_match(now) else {
            // No compatible peer yet. The candidate stays queued so the
            // oldest waiter pairs with the next compatible request; the
            // requester alone learns that nothing fired.
            return self.match_failure(&ctx, "MATCH_NOT_FOUND", "Match not found");
        };

        // A pair fired: spin up one instance per party, mint tickets and
        // seeds, bind the side tables, and fan the notify out to every
        // member. If the second instance fails after the first succeeded,
        // the first is left standing; see DESIGN notes.
        let mut response_to_requester = None;
        for candidate in [first, second] {
            let Some(instance_id) = self
                .instance_manager
                .create_instance(candidate.party_id, &self.party_service)
            else {
                return self.match_failure(
                    &ctx,
                    "INSTANCE_FAILED",
                    "Unable to create dungeon instance",
                );
            };

            let ticket = Uuid::new_v4().simple().to_string();
            self.party_instances.insert(candidate.party_id, instance_id);
            self.instance_tickets.insert(instance_id, ticket.clone());
            let seed = self.rng.gen_range(1..=u32::MAX);
            self.instance_seeds.insert(instance_id, seed);

            let notify = MatchFoundNotify {
                success: true,
                code: "OK".to_string(),
                message: "Match found".to_string(),
                party_id: candidate.party_id,
                instance_id,
                endpoint: self.config.dungeon_endpoint.clone(),
                ticket,
            };
            let notify_payload = notify.encode();

            if let Some(info) = self.party_service.get_party_info(candidate.party_id) {
                for member in &info.members {
                    let Some(member_session) = self.find_session(member.session_id) else {
                        continue;
                    };
                    self.session_instances.insert(member.session_id, instance_id);
                    let is_requester =
                        candidate.party_id == party_id && member.session_id == ctx.session_id;
                    if !is_requester {
                        let mut guard = member_session.lock();
                        let frame = encode_frame(
                            PacketType::MatchFoundNotify.as_u16(),
                            guard.protocol_version(),
                            &notify_payload,
                        );
                        guard.enqueue_send(frame, now);
                    }
                }
            }

            if candidate.party_id == party_id {
                response_to_requester = Some(notify);
            }
        }

        let Some(notify) = response_to_requester else {
            return self.match_failure(&ctx, "MATCH_NOT_FOUND", "Match not found");
        };
        self.log_info(&ctx, "match_found", &notify.message);
        self.frame(PacketType::MatchFoundNotify, &ctx, &notify.encode())
    }

    // ---- dungeon ------------------------------------------------------

    fn dungeon_enter_failure(&mut self, ctx: &RequestContext, code: &str, message: &str) -> Vec<u8> {
        self.metrics.error_total += 1;
        self.log_warn(ctx, "dungeon_enter_failed", message);
        let response = DungeonEnterResponse {
            success: false,
            code: code.to_string(),
            message: message.to_string(),
            ..Default::default()
        };
        self.frame(PacketType::DungeonEnterRes, ctx, &response.encode())
    }

    fn handle_dungeon_enter(&mut self, ctx: RequestContext, payload: &[u8]) -> Vec<u8> {
        let Ok(request) = DungeonEnterRequest::decode(payload) else {
            return self.dungeon_enter_failure(&ctx, "MALFORMED", "Malformed dungeon enter payload");
        };
        if ctx.user_id.is_none() {
            return self.dungeon_enter_failure(&ctx, "UNAUTHENTICATED", "Authentication required");
        }

        let Some(instance) = self.instance_manager.get_instance(request.instance_id) else {
            return self.dungeon_enter_failure(
                &ctx,
                "INSTANCE_NOT_FOUND",
                "Dungeon instance not found",
            );
        };

        if self.instance_tickets.get(&request.instance_id) != Some(&request.ticket) {
            return self.dungeon_enter_failure(&ctx, "INVALID_TICKET", "Invalid enter ticket");
        }

        let Some(party_info) = self.party_service.get_party_info(instance.party_id) else {
            return self.dungeon_enter_failure(
                &ctx,
                "PARTY_NOT_FOUND",
                "Party not found for instance",
            );
        };
        if !party_info
            .members
            .iter()
            .any(|member| member.session_id == ctx.session_id)
        {
            return self.dungeon_enter_failure(
                &ctx,
                "NOT_PARTY_MEMBER",
                "Not authorized for instance",
            );
        }

        if !self.instance_manager.request_transition(
            request.instance_id,
            InstanceState::Ready,
            &self.party_service,
        ) {
            return self.dungeon_enter_failure(&ctx, "INVALID_STATE", "Dungeon not ready to enter");
        }

        self.session_characters.insert(ctx.session_id, request.char_id);
        self.session_instances.insert(ctx.session_id, request.instance_id);

        let response = DungeonEnterResponse {
            success: true,
            code: "OK".to_string(),
            message: "Dungeon entry accepted".to_string(),
            state: InstanceState::Ready.as_u16(),
            seed: self
                .instance_seeds
                .get(&request.instance_id)
                .copied()
                .unwrap_or(0),
        };
        self.log_info(&ctx, "dungeon_entered", &response.message);
        self.frame(PacketType::DungeonEnterRes, &ctx, &response.encode())
    }

    fn dungeon_result_failure(
        &mut self,
        ctx: &RequestContext,
        code: &str,
        message: &str,
    ) -> Vec<u8> {
        self.metrics.error_total += 1;
        self.log_warn(ctx, "dungeon_result_failed", message);
        let response = DungeonResultResponse {
            success: false,
            code: code.to_string(),
            message: message.to_string(),
            summary: "result rejected".to_string(),
        };
        self.frame(PacketType::DungeonResultRes, ctx, &response.encode())
    }

    fn handle_dungeon_result(&mut self, ctx: RequestContext, payload: &[u8]) -> Vec<u8> {
        let Ok(request) = DungeonResultNotify::decode(payload) else {
            return self.dungeon_result_failure(
                &ctx,
                "MALFORMED",
                "Malformed dungeon result payload",
            );
        };
        if ctx.user_id.is_none() {
            return self.dungeon_result_failure(&ctx, "UNAUTHENTICATED", "Authentication required");
        }

        let Some(&instance_id) = self.session_instances.get(&ctx.session_id) else {
            return self.dungeon_result_failure(&ctx, "NO_INSTANCE", "No active dungeon instance");
        };
        if self.instance_manager.get_instance(instance_id).is_none() {
            return self.dungeon_result_failure(
                &ctx,
                "INSTANCE_NOT_FOUND",
                "Dungeon instance missing",
            );
        }

        // A bound character is a precondition alongside the bound
        // instance; nothing may mutate before it is established.
        let Some(&char_id) = self.session_characters.get(&ctx.session_id) else {
            return self.dungeon_result_failure(
                &ctx,
                "CHAR_NOT_SET",
                "Character not registered for session",
            );
        };

        if self.instance_reward_grants.contains_key(&instance_id) {
            return self.dungeon_result_failure(
                &ctx,
                "REWARD_DUPLICATE",
                "Reward grant already processed",
            );
        }

        let next_state = match request.result {
            DungeonResultKind::Clear => InstanceState::Clear,
            DungeonResultKind::Fail => InstanceState::Fail,
        };
        if !self
            .instance_manager
            .request_transition(instance_id, next_state, &self.party_service)
        {
            return self.dungeon_result_failure(
                &ctx,
                "INVALID_STATE",
                "Dungeon state transition rejected",
            );
        }

        let reward_items: Vec<RewardItem> = request
            .rewards
            .iter()
            .map(|item| RewardItem {
                item_id: item.item_id,
                quantity: item.count,
            })
            .collect();

        // Grant against a fresh ephemeral ledger first; this enforces the
        // reward-service idempotence contract before durable state moves.
        let grant_id = self.next_reward_grant_id;
        self.next_reward_grant_id += 1;
        let mut ledger = RewardLedger::default();
        match self
            .reward_service
            .grant_rewards_detailed(&mut ledger, grant_id, &reward_items)
        {
            GrantOutcome::Completed => {}
            GrantOutcome::Duplicate => {
                return self.dungeon_result_failure(
                    &ctx,
                    "REWARD_DUPLICATE",
                    "Reward grant already processed",
                );
            }
            GrantOutcome::Failed => {
                return self.dungeon_result_failure(&ctx, "REWARD_FAILED", "Reward grant failed");
            }
        }

        // Durable grant: all items inside one transaction.
        let transaction = self.inventory_storage.begin_transaction();
        let mut inventory_ok = true;
        for item in &request.rewards {
            if !self
                .inventory_storage
                .add_item(char_id, item.item_id, item.count, "dungeon_reward")
            {
                inventory_ok = false;
                break;
            }
        }
        if !inventory_ok {
            self.inventory_storage.rollback_transaction(&transaction);
            return self.dungeon_result_failure(&ctx, "INVENTORY_FAILED", "Failed to update inventory");
        }
        self.inventory_storage.commit_transaction(&transaction);

        self.instance_reward_grants.insert(instance_id, grant_id);

        let response = DungeonResultResponse {
            success: true,
            code: "OK".to_string(),
            message: "Dungeon result recorded".to_string(),
            summary: "result recorded".to_string(),
        };
        self.log_info(&ctx, "dungeon_result_recorded", &response.message);
        self.frame(PacketType::DungeonResultRes, &ctx, &response.encode())
    }

    // ---- inventory ----------------------------------------------------

    fn handle_inventory_update(&mut self, ctx: RequestContext, payload: &[u8]) -> Vec<u8> {
        let Ok(request) = InventoryUpdateNotify::decode(payload) else {
            self.metrics.error_total += 1;
            self.log_warn(&ctx, "inventory_update_failed", "Malformed inventory update payload");
            let response = InventoryUpdateResponse {
                success: false,
                code: "MALFORMED".to_string(),
                message: "Malformed inventory update payload".to_string(),
                inventory_version: 0,
            };
            return self.frame(PacketType::InventoryUpdateRes, &ctx, &response.encode());
        };
        if ctx.user_id.is_none() {
            self.metrics.error_total += 1;
            self.log_warn(&ctx, "inventory_update_failed", "Authentication required");
            let response = InventoryUpdateResponse {
                success: false,
                code: "UNAUTHENTICATED".to_string(),
                message: "Authentication required".to_string(),
                inventory_version: 0,
            };
            return self.frame(PacketType::InventoryUpdateRes, &ctx, &response.encode());
        }

        let transaction = self.inventory_storage.begin_transaction();
        let mut inventory_ok = true;
        for item in &request.items {
            if !self
                .inventory_storage
                .add_item(request.char_id, item.item_id, item.count, "inventory_update")
            {
                inventory_ok = false;
                break;
            }
        }
        if inventory_ok {
            self.inventory_storage.commit_transaction(&transaction);
        } else {
            self.inventory_storage.rollback_transaction(&transaction);
        }

        let response = InventoryUpdateResponse {
            success: inventory_ok,
            code: if inventory_ok { "OK" } else { "INVENTORY_FAILED" }.to_string(),
            message: if inventory_ok {
                "Inventory updated"
            } else {
                "Failed to update inventory"
            }
            .to_string(),
            inventory_version: self.inventory_storage.change_log(request.char_id).len() as u64,
        };
        if inventory_ok {
            self.log_info(&ctx, "inventory_updated", &response.message);
        } else {
            self.metrics.error_total += 1;
            self.log_warn(&ctx, "inventory_update_failed", &response.message);
        }
        self.frame(PacketType::InventoryUpdateRes, &ctx, &response.encode())
    }
}
