//! Typed payload records for every packet.
//!
//! Each record carries a paired `encode`/`decode`. Field order on the wire
//! is the declaration order of the struct. Decoders must consume the whole
//! payload; trailing bytes fail with [`DecodeError::TrailingBytes`] so a
//! malformed client cannot smuggle extra data past validation.

use crate::wire::{
    put_bool, put_list, put_string, put_u16, put_u32, put_u64, DecodeError, WireReader,
};

/// Chat channel discriminants.
///
/// [`ChatSendRequest`] keeps the raw `u16` so the dispatcher can answer an
/// unknown channel with a typed failure instead of a decode error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ChatChannel {
    Global = 1,
    Party = 2,
}

impl ChatChannel {
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(Self::Global),
            2 => Some(Self::Party),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Outcome a client reports for a dungeon run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DungeonResultKind {
    Clear = 1,
    Fail = 2,
}

impl DungeonResultKind {
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(Self::Clear),
            2 => Some(Self::Fail),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// One item stack inside a reward or inventory payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemCount {
    pub item_id: u32,
    pub count: u32,
}

impl ItemCount {
    fn put(out: &mut Vec<u8>, item: &Self) {
        put_u32(out, item.item_id);
        put_u32(out, item.count);
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            item_id: reader.read_u32()?,
            count: reader.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
}

impl LoginRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_string(&mut out, &self.user_id);
        put_string(&mut out, &self.password);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            user_id: reader.read_string()?,
            password: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginResponse {
    pub accepted: bool,
    pub token: String,
    pub message: String,
}

impl LoginResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, self.accepted);
        put_string(&mut out, &self.token);
        put_string(&mut out, &self.message);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            accepted: reader.read_bool()?,
            token: reader.read_string()?,
            message: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

/// Sent when a frame arrives with a protocol version outside the supported
/// window. Framed at the client's own version so it can always decode it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionReject {
    pub min_version: u16,
    pub max_version: u16,
    pub client_version: u16,
    pub message: String,
}

impl VersionReject {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u16(&mut out, self.min_version);
        put_u16(&mut out, self.max_version);
        put_u16(&mut out, self.client_version);
        put_string(&mut out, &self.message);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            min_version: reader.read_u16()?,
            max_version: reader.read_u16()?,
            client_version: reader.read_u16()?,
            message: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogoutRequest;

impl LogoutRequest {
    pub fn encode(&self) -> Vec<u8> {
        Vec::new()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let reader = WireReader::new(payload);
        reader.finish()?;
        Ok(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

impl LogoutResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, self.success);
        put_string(&mut out, &self.message);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            success: reader.read_bool()?,
            message: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionReconnectRequest {
    pub token: String,
    /// Last server-to-client sequence the client saw before losing the
    /// connection.
    pub last_seq: u64,
}

impl SessionReconnectRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_string(&mut out, &self.token);
        put_u64(&mut out, self.last_seq);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            token: reader.read_string()?,
            last_seq: reader.read_u64()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionReconnectResponse {
    pub success: bool,
    pub message: String,
    pub session_id: u64,
    /// First sequence the server will replay after the resume point.
    pub resume_from_seq: u32,
}

impl SessionReconnectResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, self.success);
        put_string(&mut out, &self.message);
        put_u64(&mut out, self.session_id);
        put_u32(&mut out, self.resume_from_seq);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            success: reader.read_bool()?,
            message: reader.read_string()?,
            session_id: reader.read_u64()?,
            resume_from_seq: reader.read_u32()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartyCreateRequest;

impl PartyCreateRequest {
    pub fn encode(&self) -> Vec<u8> {
        Vec::new()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let reader = WireReader::new(payload);
        reader.finish()?;
        Ok(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartyCreateResponse {
    pub success: bool,
    pub party_id: u64,
    pub message: String,
}

impl PartyCreateResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, self.success);
        put_u64(&mut out, self.party_id);
        put_string(&mut out, &self.message);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            success: reader.read_bool()?,
            party_id: reader.read_u64()?,
            message: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

/// Invitee is addressed by user id; the server resolves the live session
/// through its registry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartyInviteRequest {
    pub party_id: u64,
    pub invitee_user_id: String,
}

impl PartyInviteRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u64(&mut out, self.party_id);
        put_string(&mut out, &self.invitee_user_id);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            party_id: reader.read_u64()?,
            invitee_user_id: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartyInviteResponse {
    pub success: bool,
    pub message: String,
}

impl PartyInviteResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, self.success);
        put_string(&mut out, &self.message);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            success: reader.read_bool()?,
            message: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartyAcceptRequest {
    pub party_id: u64,
}

impl PartyAcceptRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u64(&mut out, self.party_id);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            party_id: reader.read_u64()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartyAcceptResponse {
    pub success: bool,
    pub message: String,
}

impl PartyAcceptResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, self.success);
        put_string(&mut out, &self.message);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            success: reader.read_bool()?,
            message: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartyDisbandRequest {
    pub party_id: u64,
}

impl PartyDisbandRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u64(&mut out, self.party_id);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            party_id: reader.read_u64()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartyDisbandResponse {
    pub success: bool,
    pub message: String,
}

impl PartyDisbandResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, self.success);
        put_string(&mut out, &self.message);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            success: reader.read_bool()?,
            message: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

/// Server-pushed party lifecycle event. `event_type` carries the raw
/// discriminant of the server's party event kind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartyEvent {
    pub event_type: u16,
    pub party_id: u64,
    pub actor_session_id: u64,
    pub target_session_id: u64,
    pub member_session_ids: Vec<u64>,
    pub message: String,
}

impl PartyEvent {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u16(&mut out, self.event_type);
        put_u64(&mut out, self.party_id);
        put_u64(&mut out, self.actor_session_id);
        put_u64(&mut out, self.target_session_id);
        put_list(&mut out, &self.member_session_ids, |buf, id| {
            put_u64(buf, *id)
        });
        put_string(&mut out, &self.message);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            event_type: reader.read_u16()?,
            party_id: reader.read_u64()?,
            actor_session_id: reader.read_u64()?,
            target_session_id: reader.read_u64()?,
            member_session_ids: reader.read_list(|r| r.read_u64())?,
            message: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GuildCreateRequest {
    pub guild_name: String,
}

impl GuildCreateRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_string(&mut out, &self.guild_name);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            guild_name: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GuildCreateResponse {
    pub success: bool,
    pub guild_id: u64,
    pub message: String,
}

impl GuildCreateResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, self.success);
        put_u64(&mut out, self.guild_id);
        put_string(&mut out, &self.message);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            success: reader.read_bool()?,
            guild_id: reader.read_u64()?,
            message: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuildJoinRequest {
    pub guild_id: u64,
}

impl GuildJoinRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u64(&mut out, self.guild_id);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            guild_id: reader.read_u64()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GuildJoinResponse {
    pub success: bool,
    pub message: String,
}

impl GuildJoinResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, self.success);
        put_string(&mut out, &self.message);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            success: reader.read_bool()?,
            message: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

/// `guild_id == 0` resolves to the sender's current guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuildLeaveRequest {
    pub guild_id: u64,
}

impl GuildLeaveRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u64(&mut out, self.guild_id);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            guild_id: reader.read_u64()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GuildLeaveResponse {
    pub success: bool,
    pub message: String,
}

impl GuildLeaveResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, self.success);
        put_string(&mut out, &self.message);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            success: reader.read_bool()?,
            message: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GuildEvent {
    pub event_type: u16,
    pub guild_id: u64,
    pub actor_user_id: String,
    pub member_user_ids: Vec<String>,
    pub message: String,
}

impl GuildEvent {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u16(&mut out, self.event_type);
        put_u64(&mut out, self.guild_id);
        put_string(&mut out, &self.actor_user_id);
        put_list(&mut out, &self.member_user_ids, |buf, id| {
            put_string(buf, id)
        });
        put_string(&mut out, &self.message);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            event_type: reader.read_u16()?,
            guild_id: reader.read_u64()?,
            actor_user_id: reader.read_string()?,
            member_user_ids: reader.read_list(|r| r.read_string())?,
            message: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

/// `channel` stays raw so an unknown channel reaches the dispatcher as a
/// typed failure rather than a decode error. `party_id == 0` resolves to
/// the sender's current party.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatSendRequest {
    pub channel: u16,
    pub party_id: u64,
    pub message: String,
}

impl ChatSendRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u16(&mut out, self.channel);
        put_u64(&mut out, self.party_id);
        put_string(&mut out, &self.message);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            channel: reader.read_u16()?,
            party_id: reader.read_u64()?,
            message: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatSendResponse {
    pub success: bool,
    pub message: String,
}

impl ChatSendResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, self.success);
        put_string(&mut out, &self.message);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            success: reader.read_bool()?,
            message: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatEvent {
    pub channel: u16,
    pub party_id: u64,
    pub sender_user_id: String,
    pub message: String,
}

impl ChatEvent {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u16(&mut out, self.channel);
        put_u64(&mut out, self.party_id);
        put_string(&mut out, &self.sender_user_id);
        put_string(&mut out, &self.message);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            channel: reader.read_u16()?,
            party_id: reader.read_u64()?,
            sender_user_id: reader.read_string()?,
            message: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

/// `party_id == 0` resolves to the sender's current party.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchRequest {
    pub party_id: u64,
    pub dungeon_id: u32,
    pub difficulty: String,
}

impl MatchRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u64(&mut out, self.party_id);
        put_u32(&mut out, self.dungeon_id);
        put_string(&mut out, &self.difficulty);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            party_id: reader.read_u64()?,
            dungeon_id: reader.read_u32()?,
            difficulty: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

/// Doubles as the failure response to a match request (`success == false`
/// with a diagnostic `code`) and the fan-out notification when a pair fires.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchFoundNotify {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub party_id: u64,
    pub instance_id: u64,
    pub endpoint: String,
    pub ticket: String,
}

impl MatchFoundNotify {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, self.success);
        put_string(&mut out, &self.code);
        put_string(&mut out, &self.message);
        put_u64(&mut out, self.party_id);
        put_u64(&mut out, self.instance_id);
        put_string(&mut out, &self.endpoint);
        put_string(&mut out, &self.ticket);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            success: reader.read_bool()?,
            code: reader.read_string()?,
            message: reader.read_string()?,
            party_id: reader.read_u64()?,
            instance_id: reader.read_u64()?,
            endpoint: reader.read_string()?,
            ticket: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DungeonEnterRequest {
    pub instance_id: u64,
    pub ticket: String,
    pub char_id: u64,
}

impl DungeonEnterRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u64(&mut out, self.instance_id);
        put_string(&mut out, &self.ticket);
        put_u64(&mut out, self.char_id);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            instance_id: reader.read_u64()?,
            ticket: reader.read_string()?,
            char_id: reader.read_u64()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DungeonEnterResponse {
    pub success: bool,
    pub code: String,
    pub message: String,
    /// Instance state after the transition, as its raw discriminant.
    pub state: u16,
    pub seed: u32,
}

impl DungeonEnterResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, self.success);
        put_string(&mut out, &self.code);
        put_string(&mut out, &self.message);
        put_u16(&mut out, self.state);
        put_u32(&mut out, self.seed);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            success: reader.read_bool()?,
            code: reader.read_string()?,
            message: reader.read_string()?,
            state: reader.read_u16()?,
            seed: reader.read_u32()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DungeonResultNotify {
    pub result: DungeonResultKind,
    pub time_sec: u32,
    pub deaths: u16,
    pub rewards: Vec<ItemCount>,
}

impl DungeonResultNotify {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u16(&mut out, self.result.as_u16());
        put_u32(&mut out, self.time_sec);
        put_u16(&mut out, self.deaths);
        put_list(&mut out, &self.rewards, ItemCount::put);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let raw_result = reader.read_u16()?;
        let result = DungeonResultKind::from_u16(raw_result)
            .ok_or(DecodeError::InvalidDiscriminant(raw_result))?;
        let message = Self {
            result,
            time_sec: reader.read_u32()?,
            deaths: reader.read_u16()?,
            rewards: reader.read_list(ItemCount::read)?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DungeonResultResponse {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub summary: String,
}

impl DungeonResultResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, self.success);
        put_string(&mut out, &self.code);
        put_string(&mut out, &self.message);
        put_string(&mut out, &self.summary);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            success: reader.read_bool()?,
            code: reader.read_string()?,
            message: reader.read_string()?,
            summary: reader.read_string()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InventoryUpdateNotify {
    pub char_id: u64,
    pub items: Vec<ItemCount>,
}

impl InventoryUpdateNotify {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u64(&mut out, self.char_id);
        put_list(&mut out, &self.items, ItemCount::put);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            char_id: reader.read_u64()?,
            items: reader.read_list(ItemCount::read)?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InventoryUpdateResponse {
    pub success: bool,
    pub code: String,
    pub message: String,
    /// Length of the inventory change log after the update.
    pub inventory_version: u64,
}

impl InventoryUpdateResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_bool(&mut out, self.success);
        put_string(&mut out, &self.code);
        put_string(&mut out, &self.message);
        put_u64(&mut out, self.inventory_version);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self {
            success: reader.read_bool()?,
            code: reader.read_string()?,
            message: reader.read_string()?,
            inventory_version: reader.read_u64()?,
        };
        reader.finish()?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_round_trip() {
        let request = LoginRequest {
            user_id: "user1".into(),
            password: "letmein".into(),
        };
        assert_eq!(LoginRequest::decode(&request.encode()).unwrap(), request);

        let response = LoginResponse {
            accepted: true,
            token: "ab".repeat(16),
            message: "Login accepted".into(),
        };
        assert_eq!(LoginResponse::decode(&response.encode()).unwrap(), response);
    }

    #[test]
    fn login_rejects_trailing_bytes() {
        let mut encoded = LoginRequest {
            user_id: "u".into(),
            password: "p".into(),
        }
        .encode();
        encoded.push(0);
        assert_eq!(
            LoginRequest::decode(&encoded),
            Err(DecodeError::TrailingBytes)
        );
    }

    #[test]
    fn logout_request_must_be_empty() {
        assert!(LogoutRequest::decode(&[]).is_ok());
        assert_eq!(
            LogoutRequest::decode(&[1]),
            Err(DecodeError::TrailingBytes)
        );
    }

    #[test]
    fn version_reject_round_trip() {
        let reject = VersionReject {
            min_version: 1,
            max_version: 3,
            client_version: 4,
            message: "Unsupported client version 4 (supported 1-3)".into(),
        };
        assert_eq!(VersionReject::decode(&reject.encode()).unwrap(), reject);
    }

    #[test]
    fn reconnect_round_trip() {
        let request = SessionReconnectRequest {
            token: "deadbeef".repeat(4),
            last_seq: 7,
        };
        assert_eq!(
            SessionReconnectRequest::decode(&request.encode()).unwrap(),
            request
        );

        let response = SessionReconnectResponse {
            success: true,
            message: "Reconnect accepted".into(),
            session_id: 2,
            resume_from_seq: 8,
        };
        assert_eq!(
            SessionReconnectResponse::decode(&response.encode()).unwrap(),
            response
        );
    }

    #[test]
    fn party_messages_round_trip() {
        let invite = PartyInviteRequest {
            party_id: 9,
            invitee_user_id: "friend".into(),
        };
        assert_eq!(
            PartyInviteRequest::decode(&invite.encode()).unwrap(),
            invite
        );

        let event = PartyEvent {
            event_type: 3,
            party_id: 9,
            actor_session_id: 1,
            target_session_id: 2,
            member_session_ids: vec![1, 2, 5],
            message: "Party invite accepted".into(),
        };
        assert_eq!(PartyEvent::decode(&event.encode()).unwrap(), event);
    }

    #[test]
    fn guild_event_round_trip() {
        let event = GuildEvent {
            event_type: 2,
            guild_id: 4,
            actor_user_id: "user2".into(),
            member_user_ids: vec!["user1".into(), "user2".into()],
            message: "Guild member joined".into(),
        };
        assert_eq!(GuildEvent::decode(&event.encode()).unwrap(), event);
    }

    #[test]
    fn chat_channel_raw_value_survives_decode() {
        let request = ChatSendRequest {
            channel: 9,
            party_id: 0,
            message: "hi".into(),
        };
        let decoded = ChatSendRequest::decode(&request.encode()).unwrap();
        assert_eq!(decoded.channel, 9);
        assert_eq!(ChatChannel::from_u16(decoded.channel), None);
        assert_eq!(ChatChannel::from_u16(1), Some(ChatChannel::Global));
        assert_eq!(ChatChannel::from_u16(2), Some(ChatChannel::Party));
    }

    #[test]
    fn match_messages_round_trip() {
        let request = MatchRequest {
            party_id: 1,
            dungeon_id: 2001,
            difficulty: "normal".into(),
        };
        assert_eq!(MatchRequest::decode(&request.encode()).unwrap(), request);

        let notify = MatchFoundNotify {
            success: true,
            code: "OK".into(),
            message: "Match found".into(),
            party_id: 1,
            instance_id: 10,
            endpoint: "dungeon.local:7777".into(),
            ticket: "cd".repeat(16),
        };
        assert_eq!(
            MatchFoundNotify::decode(&notify.encode()).unwrap(),
            notify
        );
    }

    #[test]
    fn dungeon_messages_round_trip() {
        let enter = DungeonEnterRequest {
            instance_id: 10,
            ticket: "ff".repeat(16),
            char_id: 77,
        };
        assert_eq!(
            DungeonEnterRequest::decode(&enter.encode()).unwrap(),
            enter
        );

        let result = DungeonResultNotify {
            result: DungeonResultKind::Clear,
            time_sec: 320,
            deaths: 1,
            rewards: vec![
                ItemCount {
                    item_id: 501,
                    count: 1,
                },
                ItemCount {
                    item_id: 502,
                    count: 3,
                },
            ],
        };
        assert_eq!(
            DungeonResultNotify::decode(&result.encode()).unwrap(),
            result
        );
    }

    #[test]
    fn dungeon_result_rejects_unknown_kind() {
        let mut encoded = DungeonResultNotify {
            result: DungeonResultKind::Fail,
            time_sec: 0,
            deaths: 0,
            rewards: vec![],
        }
        .encode();
        encoded[0] = 0;
        encoded[1] = 9;
        assert_eq!(
            DungeonResultNotify::decode(&encoded),
            Err(DecodeError::InvalidDiscriminant(9))
        );
    }

    #[test]
    fn inventory_messages_round_trip() {
        let notify = InventoryUpdateNotify {
            char_id: 77,
            items: vec![ItemCount {
                item_id: 900,
                count: 10,
            }],
        };
        assert_eq!(
            InventoryUpdateNotify::decode(&notify.encode()).unwrap(),
            notify
        );

        let response = InventoryUpdateResponse {
            success: true,
            code: "OK".into(),
            message: "Inventory updated".into(),
            inventory_version: 3,
        };
        assert_eq!(
            InventoryUpdateResponse::decode(&response.encode()).unwrap(),
            response
        );
    }

    #[test]
    fn truncated_message_fails_cleanly() {
        let encoded = MatchFoundNotify {
            success: true,
            code: "OK".into(),
            message: "Match found".into(),
            party_id: 1,
            instance_id: 2,
            endpoint: "e".into(),
            ticket: "t".into(),
        }
        .encode();
        for cut in [0, 1, 5, encoded.len() - 1] {
            assert_eq!(
                MatchFoundNotify::decode(&encoded[..cut]),
                Err(DecodeError::Truncated),
                "cut at {cut}"
            );
        }
    }
}
