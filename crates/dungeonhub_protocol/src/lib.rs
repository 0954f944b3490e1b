//! # DungeonHub Wire Protocol
//!
//! Binary protocol shared by the DungeonHub server core and its clients.
//! The transport delivers raw byte streams; this crate turns them into
//! typed messages and back:
//!
//! * **Framing** ([`codec`]) - length/type/version framed packets with an
//!   incremental [`codec::FrameDecoder`] that tolerates arbitrary stream
//!   splits.
//! * **Message records** ([`messages`]) - one encode/decode pair per packet,
//!   big-endian integers, `u16`-length-prefixed UTF-8 strings, `u16`-count
//!   prefixed lists. Decoders consume the whole payload; trailing bytes are
//!   a [`DecodeError`].
//! * **Signature scheme** ([`security`]) - keyed payload signatures for
//!   deployments that want tamper evidence on the wire. Not required for
//!   message flow.
//!
//! ## Frame layout
//!
//! ```text
//! +----------+--------+-----------+------------------+
//! | length   | type   | version   | payload          |
//! | u32 (BE) | u16    | u16       | `length` bytes   |
//! +----------+--------+-----------+------------------+
//! ```
//!
//! Packet type codes are stable; see [`PacketType`].

pub mod codec;
pub mod messages;
pub mod security;
pub mod wire;

pub use codec::{encode_frame, FrameDecoder, FrameHeader, FRAME_HEADER_SIZE};
pub use wire::DecodeError;

/// Lowest protocol version the server accepts.
pub const MIN_PROTOCOL_VERSION: u16 = 1;

/// Highest protocol version the server accepts.
pub const MAX_PROTOCOL_VERSION: u16 = 3;

/// Stable wire codes for every packet the protocol carries.
///
/// Request/response pairs share a prefix; server-pushed events sit at the
/// end of each block. Gaps between blocks leave room for future packets
/// without renumbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketType {
    LoginReq = 1,
    LoginRes = 2,
    VersionReject = 3,
    LogoutReq = 4,
    LogoutRes = 5,
    SessionReconnectReq = 6,
    SessionReconnectRes = 7,

    PartyCreateReq = 100,
    PartyCreateRes = 101,
    PartyInviteReq = 102,
    PartyInviteRes = 103,
    PartyAcceptReq = 104,
    PartyAcceptRes = 105,
    PartyDisbandReq = 106,
    PartyDisbandRes = 107,
    PartyEvent = 108,

    GuildCreateReq = 200,
    GuildCreateRes = 201,
    GuildJoinReq = 202,
    GuildJoinRes = 203,
    GuildLeaveReq = 204,
    GuildLeaveRes = 205,
    GuildEvent = 206,

    ChatSendReq = 300,
    ChatSendRes = 301,
    ChatEvent = 302,

    MatchReq = 400,
    MatchFoundNotify = 401,

    DungeonEnterReq = 500,
    DungeonEnterRes = 501,
    DungeonResultNotify = 502,
    DungeonResultRes = 503,

    InventoryUpdateNotify = 600,
    InventoryUpdateRes = 601,
}

impl PacketType {
    /// Maps a raw wire code back to a packet type.
    pub fn from_u16(raw: u16) -> Option<Self> {
        let packet_type = match raw {
            1 => Self::LoginReq,
            2 => Self::LoginRes,
            3 => Self::VersionReject,
            4 => Self::LogoutReq,
            5 => Self::LogoutRes,
            6 => Self::SessionReconnectReq,
            7 => Self::SessionReconnectRes,
            100 => Self::PartyCreateReq,
            101 => Self::PartyCreateRes,
            102 => Self::PartyInviteReq,
            103 => Self::PartyInviteRes,
            104 => Self::PartyAcceptReq,
            105 => Self::PartyAcceptRes,
            106 => Self::PartyDisbandReq,
            107 => Self::PartyDisbandRes,
            108 => Self::PartyEvent,
            200 => Self::GuildCreateReq,
            201 => Self::GuildCreateRes,
            202 => Self::GuildJoinReq,
            203 => Self::GuildJoinRes,
            204 => Self::GuildLeaveReq,
            205 => Self::GuildLeaveRes,
            206 => Self::GuildEvent,
            300 => Self::ChatSendReq,
            301 => Self::ChatSendRes,
            302 => Self::ChatEvent,
            400 => Self::MatchReq,
            401 => Self::MatchFoundNotify,
            500 => Self::DungeonEnterReq,
            501 => Self::DungeonEnterRes,
            502 => Self::DungeonResultNotify,
            503 => Self::DungeonResultRes,
            600 => Self::InventoryUpdateNotify,
            601 => Self::InventoryUpdateRes,
            _ => return None,
        };
        Some(packet_type)
    }

    /// The raw wire code for this packet type.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_type_round_trips_through_wire_code() {
        let all = [
            PacketType::LoginReq,
            PacketType::LoginRes,
            PacketType::VersionReject,
            PacketType::LogoutReq,
            PacketType::LogoutRes,
            PacketType::SessionReconnectReq,
            PacketType::SessionReconnectRes,
            PacketType::PartyCreateReq,
            PacketType::PartyCreateRes,
            PacketType::PartyInviteReq,
            PacketType::PartyInviteRes,
            PacketType::PartyAcceptReq,
            PacketType::PartyAcceptRes,
            PacketType::PartyDisbandReq,
            PacketType::PartyDisbandRes,
            PacketType::PartyEvent,
            PacketType::GuildCreateReq,
            PacketType::GuildCreateRes,
            PacketType::GuildJoinReq,
            PacketType::GuildJoinRes,
            PacketType::GuildLeaveReq,
            PacketType::GuildLeaveRes,
            PacketType::GuildEvent,
            PacketType::ChatSendReq,
            PacketType::ChatSendRes,
            PacketType::ChatEvent,
            PacketType::MatchReq,
            PacketType::MatchFoundNotify,
            PacketType::DungeonEnterReq,
            PacketType::DungeonEnterRes,
            PacketType::DungeonResultNotify,
            PacketType::DungeonResultRes,
            PacketType::InventoryUpdateNotify,
            PacketType::InventoryUpdateRes,
        ];
        for packet_type in all {
            assert_eq!(PacketType::from_u16(packet_type.as_u16()), Some(packet_type));
        }
    }

    #[test]
    fn unknown_wire_codes_are_rejected() {
        assert_eq!(PacketType::from_u16(0), None);
        assert_eq!(PacketType::from_u16(99), None);
        assert_eq!(PacketType::from_u16(109), None);
        assert_eq!(PacketType::from_u16(65535), None);
    }
}
