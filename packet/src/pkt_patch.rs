// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

//! Patch and data server packets. These use the short PC header.

use packet_proc::packet;

use crate::{assert_def_packet_size, Arr, UnboundVec};

pub const PATCH_COPYRIGHT: &str = "Patch Server. Copyright SonicTeam, LTD. 2001";

/// Sent unencrypted right after accepting the connection.
#[packet(0x02)]
pub struct PatchWelcome {
    copyright: Arr<u8, 44>,
    padding: Arr<u8, 20>,
    server_vector: Arr<u8, 4>,
    client_vector: Arr<u8, 4>,
}
assert_def_packet_size!(PatchWelcome, 0x4C - 4);

/// Client's reply to [`PatchWelcome`].
#[packet(0x02)]
pub struct PatchWelcomeReply {}

/// Client credentials. Their contents are not checked.
#[packet(0x04)]
pub struct PatchLogin {
    data: UnboundVec<u8>,
}

#[packet(0x04)]
pub struct PatchAck {}
assert_def_packet_size!(PatchAck, 0);

/// Text displayed on the patch screen, UTF-16LE with a BOM.
#[packet(0x13)]
pub struct PatchMessage {
    message: UnboundVec<u16>,
}

impl PatchMessage {
    pub fn new(message: &str) -> Self {
        let mut text = vec![0xFEFF];
        text.extend(message.encode_utf16());
        Self {
            message: text.into(),
        }
    }
}

/// The port is stored big-endian.
#[packet(0x14)]
pub struct PatchRedirect {
    ip_addr: Arr<u8, 4>,
    port: u16,
    padding: u16,
}
assert_def_packet_size!(PatchRedirect, 8);

impl PatchRedirect {
    pub fn new(ip_addr: [u8; 4], port: u16) -> Self {
        Self {
            ip_addr: ip_addr.into(),
            port: port.swap_bytes(),
            padding: 0,
        }
    }
}

#[packet(0x0B)]
pub struct DataAck {}

/// Step into `dirname` relative to the client's current directory.
#[packet(0x09)]
pub struct ChangeDir {
    dirname: Arr<u8, 64>,
}
assert_def_packet_size!(ChangeDir, 64);

impl ChangeDir {
    pub fn new(dirname: &str) -> Self {
        Self {
            dirname: Arr::<u8, 64>::from_str(dirname),
        }
    }
}

#[packet(0x0A)]
pub struct DirAbove {}

#[packet(0x0C)]
pub struct CheckFile {
    patch_id: u32,
    filename: Arr<u8, 32>,
}
assert_def_packet_size!(CheckFile, 36);

#[packet(0x0D)]
pub struct FileListDone {}

/// Client's checksum of a file requested by [`CheckFile`].
#[packet(0x0F)]
pub struct FileStatus {
    patch_id: u32,
    checksum: u32,
    file_size: u32,
}
assert_def_packet_size!(FileStatus, 12);

#[packet(0x10)]
pub struct ClientListDone {}

#[packet(0x11)]
pub struct UpdateFiles {
    total_size: u32,
    num_files: u32,
}
assert_def_packet_size!(UpdateFiles, 8);

#[packet(0x06)]
pub struct FileHeader {
    padding: u32,
    file_size: u32,
    filename: Arr<u8, 48>,
}
assert_def_packet_size!(FileHeader, 56);

#[packet(0x07)]
pub struct FileChunk {
    chunk: u32,
    checksum: u32,
    size: u32,
    data: UnboundVec<u8>,
}

#[packet(0x08)]
pub struct FileComplete {}

#[packet(0x12)]
pub struct UpdateComplete {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeaderKind, Payload};

    #[test]
    fn redirect_port_swapped() {
        let mut buf = Vec::new();
        PatchRedirect::new([10, 0, 0, 1], 11001)
            .serialize(&mut buf, HeaderKind::Pc, 0)
            .unwrap();
        // 11001 = 0x2AF9
        assert_eq!(buf, [0x0c, 0x00, 0x14, 0x00, 10, 0, 0, 1, 0x2a, 0xf9, 0, 0]);
    }

    #[test]
    fn message_bom() {
        let mut buf = Vec::new();
        let len = PatchMessage::new("Hey")
            .serialize(&mut buf, HeaderKind::Pc, 0)
            .unwrap();
        assert_eq!(len, 12);
        assert_eq!(
            buf,
            [0x0c, 0x00, 0x13, 0x00, 0xff, 0xfe, b'H', 0, b'e', 0, b'y', 0]
        );
    }

    #[test]
    fn empty_packet() {
        let mut buf = Vec::new();
        assert_eq!(PatchAck {}.serialize(&mut buf, HeaderKind::Pc, 0).unwrap(), 4);
        assert_eq!(buf, [0x04, 0x00, 0x04, 0x00]);
    }
}
