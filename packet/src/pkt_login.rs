// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

//! Character server packets. The character server also receives
//! [`crate::pkt_common::Login`] and [`crate::pkt_common::MenuSelection`].

use packet_proc::packet;

use crate::{assert_def_packet_size, Arr, UnboundVec};

/// Request for [`Options`]
#[packet(0xE0)]
pub struct OptionsRequest {}

/// Key and team configuration.
#[packet(0xE2)]
pub struct Options {
    unknown: Arr<u8, 0x114>,
    key_config: Arr<u8, 0x16C>,
    joystick_config: Arr<u8, 0x38>,
    guildcard: u32,
    team_id: u32,
    team_info: Arr<u32, 2>,
    team_privilege: u16,
    reserved: u16,
    team_name: Arr<u16, 0x10>,
    team_flag: Arr<u8, 0x7FC>,
    team_rewards: Arr<u32, 2>,
}
assert_def_packet_size!(Options, 0xAF8 - 8);

/// Bytes of key configuration followed by the joystick configuration
pub const KEY_CONFIG_SIZE: usize = 0x16C + 0x38;
static_assertions::const_assert_eq!(KEY_CONFIG_SIZE, 420);

#[packet(0xE3)]
pub struct CharSelection {
    slot: u32,
    selecting: u32,
}
assert_def_packet_size!(CharSelection, 8);

pub const CHAR_ACK_UPDATED: u32 = 0;
pub const CHAR_ACK_SELECTED: u32 = 1;
pub const CHAR_ACK_EMPTY: u32 = 2;

#[packet(0xE4)]
pub struct CharAck {
    slot: u32,
    flag: u32,
}
assert_def_packet_size!(CharAck, 8);

/// Appearance data shown on the character select screen.
#[packet]
pub struct CharacterPreview {
    experience: u32,
    level: u32,
    guildcard_str: Arr<u8, 16>,
    unknown: Arr<u32, 2>,
    name_color: u32,
    model: u8,
    padding: Arr<u8, 15>,
    name_color_checksum: u32,
    section_id: u8,
    class: u8,
    v2_flags: u8,
    version: u8,
    v1_flags: u32,
    costume: u16,
    skin: u16,
    face: u16,
    head: u16,
    hair: u16,
    hair_red: u16,
    hair_green: u16,
    hair_blue: u16,
    prop_x: f32,
    prop_y: f32,
    name: Arr<u16, 16>,
    playtime: u32,
}
assert_def_packet_size!(CharacterPreview, 124);

/// Sent by the server as a preview, by the client to create or update
/// the character in `slot`.
#[packet(0xE5)]
pub struct CharPreview {
    slot: u32,
    character: CharacterPreview,
}
assert_def_packet_size!(CharPreview, 0x88 - 8);

#[packet(0x01E8)]
pub struct Checksum {
    checksum: u32,
    padding: u32,
}
assert_def_packet_size!(Checksum, 8);

#[packet(0x02E8)]
pub struct ChecksumAck {
    ack: u32,
}
assert_def_packet_size!(ChecksumAck, 4);

#[packet(0x03E8)]
pub struct GuildcardHeaderRequest {}

#[packet(0x01DC)]
pub struct GuildcardHeader {
    unknown: u32,
    length: u16,
    padding: u16,
    checksum: u32,
}
assert_def_packet_size!(GuildcardHeader, 12);

#[packet(0x03DC)]
pub struct GuildcardChunkRequest {
    unknown: u32,
    chunk_requested: u32,
    continue_request: u32,
}
assert_def_packet_size!(GuildcardChunkRequest, 12);

#[packet(0x02DC)]
pub struct GuildcardChunk {
    unknown: u32,
    chunk: u32,
    data: UnboundVec<u8>,
}

#[packet]
pub struct GuildcardEntry {
    guildcard: u32,
    name: Arr<u16, 24>,
    team_name: Arr<u16, 16>,
    description: Arr<u16, 88>,
    reserved: u8,
    language: u8,
    section_id: u8,
    char_class: u8,
    padding: u32,
    comment: Arr<u16, 88>,
}
assert_def_packet_size!(GuildcardEntry, 444);

/// Number of entries that fit in [`GuildcardData`]
pub const GUILDCARD_DATA_ENTRIES: usize = 104;

/// The whole guildcard file, pulled by the client in chunks.
#[packet]
pub struct GuildcardData {
    unknown: Arr<u8, 0x114>,
    blocked: Arr<u8, 0x1DE8>,
    unknown2: Arr<u8, 0x78>,
    entries: Arr<GuildcardEntry, GUILDCARD_DATA_ENTRIES>,
    unknown3: Arr<u8, 0x1BC>,
}
assert_def_packet_size!(GuildcardData, 0xD590);

#[packet(0x04EB)]
pub struct ParameterHeaderRequest {}

#[packet]
pub struct ParameterEntry {
    size: u32,
    checksum: u32,
    offset: u32,
    filename: Arr<u8, 0x40>,
}
assert_def_packet_size!(ParameterEntry, 76);

/// The header flags carry the number of entries.
#[packet(0x01EB)]
pub struct ParameterHeader {
    entries: UnboundVec<ParameterEntry>,
}

/// The header flags carry the requested chunk index.
#[packet(0x03EB)]
pub struct ParameterChunkRequest {}

#[packet(0x02EB)]
pub struct ParameterChunk {
    chunk: u32,
    data: UnboundVec<u8>,
}

#[packet(0xEC)]
pub struct SetFlag {
    flag: u32,
}
assert_def_packet_size!(SetFlag, 4);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeaderKind, Payload};

    #[test]
    fn preview_name_offset() {
        let preview = CharPreview {
            slot: 3,
            character: CharacterPreview {
                level: 9,
                name: Arr::<u16, 16>::from_str("Sonic"),
                ..Default::default()
            },
        };
        let mut buf = Vec::new();
        assert_eq!(preview.serialize(&mut buf, HeaderKind::Bb, 0).unwrap(), 0x88);
        assert_eq!(&buf[8..12], &[3, 0, 0, 0]);
        assert_eq!(&buf[16..20], &[9, 0, 0, 0]);
        // slot + 88 bytes of preview data precede the name
        assert_eq!(&buf[8 + 4 + 88..8 + 4 + 92], &[b'S', 0, b'o', 0]);

        let decoded = CharPreview::deserialize_no_hdr(&buf[8..]).unwrap();
        assert_eq!(decoded, preview);
    }

    #[test]
    fn parameter_header_layout() {
        let hdr = ParameterHeader {
            entries: vec![
                ParameterEntry {
                    size: 5,
                    checksum: 0x3610a686,
                    offset: 0,
                    filename: Arr::<u8, 0x40>::from_str("ItemPMT.prs"),
                },
                ParameterEntry {
                    size: 3,
                    offset: 5,
                    ..Default::default()
                },
            ]
            .into(),
        };
        let mut buf = Vec::new();
        let len = hdr.serialize(&mut buf, HeaderKind::Bb, 2).unwrap();
        assert_eq!(len, 8 + 2 * 76);
        assert_eq!(&buf[4..8], &[2, 0, 0, 0]);
        assert_eq!(&buf[8 + 4..8 + 8], &[0x86, 0xa6, 0x10, 0x36]);
        assert_eq!(&buf[8 + 12..8 + 19], b"ItemPMT");
        assert_eq!(&buf[8 + 76 + 8..8 + 76 + 12], &[5, 0, 0, 0]);
    }
}
