// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

//! Ship, block and lobby menus.

use packet_proc::packet;

use crate::{assert_def_packet_size, Arr, UnboundVec};

/// Menu id of the ship select menu
pub const SHIP_SELECTION_MENU_ID: u16 = 0x13;
/// Block list item that goes back to the ship select menu
pub const BLOCK_BACK_ITEM_ID: u32 = 0xFF;
pub const LOBBY_MENU_ID: u32 = 0x1A0001;

#[packet]
pub struct ShipMenuEntry {
    menu_id: u16,
    ship_id: u32,
    padding: u16,
    ship_name: Arr<u16, 18>,
}
assert_def_packet_size!(ShipMenuEntry, 44);

/// The header flags carry the number of entries.
#[packet(0xA0)]
pub struct ShipList {
    padding: u16,
    unknown: u16,  // 0x02
    unknown2: u32, // 0xFFFFFFF4
    unknown3: u16, // 0x04
    server_name: Arr<u16, 18>,
    entries: UnboundVec<ShipMenuEntry>,
}

impl ShipList {
    pub fn new(server_name: &str, entries: Vec<ShipMenuEntry>) -> Self {
        Self {
            padding: 0,
            unknown: 0x02,
            unknown2: 0xFFFF_FFF4,
            unknown3: 0x04,
            server_name: Arr::<u16, 18>::from_str(server_name),
            entries: entries.into(),
        }
    }
}

#[packet]
pub struct BlockMenuEntry {
    unknown: u16, // 0x12, or 0x08 for the back entry
    block_id: u32,
    padding: u16,
    block_name: Arr<u16, 18>,
}
assert_def_packet_size!(BlockMenuEntry, 44);

/// The header flags carry the number of blocks.
#[packet(0x07)]
pub struct BlockList {
    padding: Arr<u8, 10>,
    ship_name: Arr<u16, 16>,
    unknown: u32, // 0x08
    blocks: UnboundVec<BlockMenuEntry>,
}

#[packet]
pub struct LobbyMenuEntry {
    menu_id: u32,
    lobby_id: u32,
    padding: u32,
}
assert_def_packet_size!(LobbyMenuEntry, 12);

/// The header flags carry the number of lobbies.
#[packet(0x83)]
pub struct LobbyList {
    lobbies: UnboundVec<LobbyMenuEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeaderKind, Payload};

    #[test]
    fn ship_list_layout() {
        let list = ShipList::new(
            "Archon",
            vec![ShipMenuEntry {
                menu_id: SHIP_SELECTION_MENU_ID,
                ship_id: 1,
                padding: 0,
                ship_name: Arr::<u16, 18>::from_str("Ship 1"),
            }],
        );
        let mut buf = Vec::new();
        let len = list.serialize(&mut buf, HeaderKind::Bb, 1).unwrap();
        // 10 + 36 + 44 bytes, padded
        assert_eq!(len, 8 + 96);
        assert_eq!(&buf[10..12], &[0x02, 0x00]);
        assert_eq!(&buf[12..16], &[0xf4, 0xff, 0xff, 0xff]);
        assert_eq!(&buf[18..20], &[b'A', 0]);
        assert_eq!(&buf[54..56], &[0x13, 0x00]);
        assert_eq!(&buf[56..60], &[1, 0, 0, 0]);
    }

    #[test]
    fn lobby_list_layout() {
        let list = LobbyList {
            lobbies: (0..3)
                .map(|i| LobbyMenuEntry {
                    menu_id: LOBBY_MENU_ID,
                    lobby_id: i,
                    padding: 0,
                })
                .collect::<Vec<_>>()
                .into(),
        };
        let mut buf = Vec::new();
        assert_eq!(list.serialize(&mut buf, HeaderKind::Bb, 2).unwrap(), 8 + 40);
        assert_eq!(&buf[8..12], &[0x01, 0x00, 0x1a, 0x00]);
        assert_eq!(&buf[8 + 24 + 4..8 + 24 + 8], &[2, 0, 0, 0]);
    }
}
