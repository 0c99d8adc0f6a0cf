// SPDX-License-Identifier: MIT
// Copyright(c) 2023 Darek Stojaczyk

use packet_proc::packet_list;

use crate::pkt_common::*;
use crate::pkt_login::*;
use crate::pkt_patch::*;

/// Packets received by the patch and data servers.
#[packet_list]
pub enum PatchPacket {
    PatchWelcomeReply,
    PatchLogin,
    FileStatus,
    ClientListDone,
}

/// Packets received by the login, character, ship and block servers.
#[packet_list]
pub enum BbPacket {
    Login,
    Disconnect,
    MenuSelection,

    // Character
    OptionsRequest,
    CharSelection,
    CharPreview,
    SetFlag,
    Checksum,
    GuildcardHeaderRequest,
    GuildcardChunkRequest,
    ParameterHeaderRequest,
    ParameterChunkRequest,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeaderKind, PacketList, Payload};

    #[test]
    fn dispatch_by_id() {
        let p = PatchPacket::deserialize_with_id(0x0F, &[1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0])
            .unwrap();
        let PatchPacket::FileStatus(status) = p else {
            panic!("Expected FileStatus packet, got {p:?}");
        };
        assert_eq!((status.patch_id, status.checksum, status.file_size), (1, 2, 3));

        // same id, different server
        let p = BbPacket::deserialize_with_id(0x10, &[0, 0, 0x13, 0, 2, 0, 0, 0]).unwrap();
        let BbPacket::MenuSelection(sel) = p else {
            panic!("Expected MenuSelection packet, got {p:?}");
        };
        assert_eq!((sel.menu_id, sel.item_id), (0x13, 2));
    }

    #[test]
    fn unknown_passthrough() {
        let p = BbPacket::deserialize_with_id(0x1234, &[9, 8, 7]).unwrap();
        assert_eq!(p.id(), 0x1234);
        let BbPacket::Unknown(unk) = &p else {
            panic!("Expected Unknown packet, got {p:?}");
        };
        assert_eq!(*unk.data, vec![9, 8, 7]);

        let mut buf = Vec::new();
        assert_eq!(p.serialize(&mut buf, HeaderKind::Bb, 0).unwrap(), 16);
        assert_eq!(&buf[8..11], &[9, 8, 7]);
    }

    #[test]
    fn whole_frame() {
        let frame = [0x0c, 0x00, 0xe3, 0x00, 0, 0, 0, 0, 2, 0, 0, 0];
        let mut padded = frame.to_vec();
        padded.resize(16, 0);
        let (hdr, p) = BbPacket::deserialize(&padded, HeaderKind::Bb).unwrap();
        assert_eq!(hdr.len, 0x0c);
        assert_eq!(hdr.aligned_len(), 16);
        let BbPacket::CharSelection(sel) = p else {
            panic!("Expected CharSelection packet, got {p:?}");
        };
        assert_eq!((sel.slot, sel.selecting), (2, 0));
    }
}
