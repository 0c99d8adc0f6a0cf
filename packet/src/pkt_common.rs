// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

//! Packets shared by all Blue Burst servers.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use packet_proc::{packet, PacketEnum};

use crate::{assert_def_packet_size, Arr, Payload, PayloadSerializeError, UnboundVec};

/// Any packet not recognized by the receiving server.
#[packet]
pub struct Unknown {
    id: u16,
    data: UnboundVec<u8>,
}

impl Payload for Unknown {
    fn id(&self) -> u16 {
        self.id
    }

    fn serialize_no_hdr(&self, dst: &mut Vec<u8>) -> Result<usize, PayloadSerializeError> {
        dst.extend_from_slice(&self.data);
        Ok(self.data.len())
    }
}

pub const BB_COPYRIGHT: &str =
    "Phantasy Star Online Blue Burst Game Server. Copyright 1999-2004 SONICTEAM.";

/// Sent unencrypted right after accepting the connection.
#[packet(0x03)]
pub struct BbWelcome {
    copyright: Arr<u8, 96>,
    server_vector: Arr<u8, 48>,
    client_vector: Arr<u8, 48>,
}
assert_def_packet_size!(BbWelcome, 0xC8 - 8);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, PacketEnum)]
#[repr(u32)]
pub enum LoginError {
    #[default]
    None = 0x0,
    Unknown = 0x1,
    Password = 0x2,
    Password2 = 0x3,
    Maintenance = 0x4,
    InUse = 0x5,
    Banned = 0x6,
    Banned2 = 0x7,
    Unregistered = 0x8,
    ExpiredSub = 0x9,
    Locked = 0xa,
    Patch = 0xb,
    Disconnect = 0xc,
}

/// Value of [`ClientConfig::magic`] once the login server has seen the client.
pub const CLIENT_CONFIG_MAGIC: u32 = 0x48615467;

/// Opaque blob the client echoes back in the `security` field of its
/// login packet on every following server.
#[packet]
pub struct ClientConfig {
    magic: u32,
    char_selected: u8,
    slot_num: u8,
    flags: u16,
    ports: Arr<u16, 4>,
    unused: Arr<u32, 4>,
    unused2: Arr<u32, 2>,
}
assert_def_packet_size!(ClientConfig, 40);

impl ClientConfig {
    pub fn from_security(security: &Arr<u8, 40>) -> Option<Self> {
        let (cfg, _) = bincode::decode_from_slice::<Self, _>(&security[..], bincode::config::legacy())
            .ok()?;
        Some(cfg)
    }
}

pub const PLAYER_TAG: u32 = 0x0001_0000;
pub const CAPABILITIES: u32 = 0x0000_0102;

#[packet(0xE6)]
pub struct Security {
    error: LoginError,
    player_tag: u32,
    guildcard: u32,
    team_id: u32,
    config: ClientConfig,
    capabilities: u32,
}
assert_def_packet_size!(Security, 0x44 - 8);

/// Client login, sent to every Blue Burst server.
#[packet(0x93)]
pub struct Login {
    unknown: Arr<u8, 8>,
    client_version: u16,
    unknown2: Arr<u8, 3>,
    slot_num: i8,
    phase: u8,
    phase_unknown: u8,
    team_id: u32,
    username: Arr<u8, 16>,
    padding: Arr<u8, 32>,
    password: Arr<u8, 16>,
    unknown3: Arr<u8, 40>,
    hardware_info: Arr<u8, 8>,
    /// Version string on the first visit, [`ClientConfig`] afterwards
    security: Arr<u8, 40>,
}
assert_def_packet_size!(Login, 0xB4 - 8);

impl Login {
    pub fn username(&self) -> String {
        String::from_utf8_lossy(self.username.trimmed()).into_owned()
    }
}

/// Login phase in which the client shows the ship select menu
pub const LOGIN_PHASE_SHIP_SELECT: u8 = 4;

#[packet(0x19)]
pub struct Redirect {
    ip_addr: Arr<u8, 4>,
    port: u16,
    padding: u16,
}
assert_def_packet_size!(Redirect, 8);

pub const CLIENT_MESSAGE_LANGUAGE: u32 = 0x0045_0009;

/// Message box. The client disconnects after dismissing it.
#[packet(0x1A)]
pub struct ClientMessage {
    language: u32,
    message: UnboundVec<u16>,
}

impl ClientMessage {
    pub fn new(message: &str) -> Self {
        Self {
            language: CLIENT_MESSAGE_LANGUAGE,
            message: message.encode_utf16().collect::<Vec<_>>().into(),
        }
    }
}

#[packet(0x10)]
pub struct MenuSelection {
    unknown: u16,
    menu_id: u16,
    item_id: u32,
}
assert_def_packet_size!(MenuSelection, 8);

/// Client is about to close the connection.
#[packet(0x05)]
pub struct Disconnect {}
assert_def_packet_size!(Disconnect, 0);

#[packet(0xB1)]
pub struct Timestamp {
    timestamp: Arr<u8, 28>,
}
assert_def_packet_size!(Timestamp, 28);

/// Scrolling text on the ship select screen.
#[packet(0xEE)]
pub struct ScrollMessage {
    padding: Arr<u32, 2>,
    message: UnboundVec<u8>,
}

impl ScrollMessage {
    pub fn new(message: &str) -> Self {
        let mut bytes = crate::to_utf16le(message);
        // the client misrenders the text without one more byte
        bytes.push(0);
        Self {
            padding: Default::default(),
            message: bytes.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeaderKind, Payload};

    #[test]
    fn login_field_offsets() {
        let mut bytes = vec![0u8; 0xB4 - 8];
        // offsets within the full packet, header included
        bytes[21 - 8] = 0xff;
        bytes[22 - 8] = LOGIN_PHASE_SHIP_SELECT;
        bytes[0x1C - 8..0x1C - 8 + 4].copy_from_slice(b"user");
        bytes[0x4C - 8..0x4C - 8 + 2].copy_from_slice(b"pw");
        bytes[0x8C - 8..0x8C - 8 + 12].copy_from_slice(b"TethVer12510");

        let login = Login::deserialize_no_hdr(&bytes).unwrap();
        assert_eq!(login.slot_num, -1);
        assert_eq!(login.phase, LOGIN_PHASE_SHIP_SELECT);
        assert_eq!(login.username(), "user");
        assert_eq!(login.password.trimmed(), b"pw");
        assert_eq!(login.security.trimmed(), b"TethVer12510");
    }

    #[test]
    fn config_in_security_field() {
        let cfg = ClientConfig {
            magic: CLIENT_CONFIG_MAGIC,
            slot_num: 2,
            char_selected: 1,
            ..Default::default()
        };
        let bytes = bincode::encode_to_vec(&cfg, bincode::config::legacy()).unwrap();
        let security = Arr::<u8, 40>::from_bytes(&bytes);
        assert_eq!(&security[0..4], &[0x67, 0x54, 0x61, 0x48]);
        assert_eq!(ClientConfig::from_security(&security), Some(cfg));
    }

    #[test]
    fn scroll_message_extra_byte() {
        let mut buf = Vec::new();
        let len = ScrollMessage::new("Hi")
            .serialize(&mut buf, HeaderKind::Bb, 0)
            .unwrap();
        // 8 hdr + 8 padding + 4 text + 1 extra, aligned
        assert_eq!(len, 24);
        assert_eq!(&buf[16..21], &[b'H', 0, b'i', 0, 0]);
    }

    #[test]
    fn security_error_code() {
        let mut buf = Vec::new();
        Security {
            error: LoginError::Patch,
            ..Default::default()
        }
        .serialize(&mut buf, HeaderKind::Bb, 0)
        .unwrap();
        assert_eq!(&buf[0..4], &[0x44, 0x00, 0xE6, 0x00]);
        assert_eq!(&buf[8..12], &[0x0b, 0, 0, 0]);
    }
}
