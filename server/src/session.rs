// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

use std::fmt::Display;

use anyhow::{anyhow, bail, Context, Result};
use bincode::Decode;
use crypto::{BbCipher, Cipher, PcCipher};
use futures::{AsyncRead, AsyncWrite};
use log::{debug, trace};
use packet::pkt_common::{BbWelcome, BB_COPYRIGHT};
use packet::pkt_patch::{PatchWelcome, PATCH_COPYRIGHT};
use packet::*;
use rand::Rng;
use smol::io::{AsyncReadExt, AsyncWriteExt};

/// Initial size of the receive buffer. It grows as needed.
const RECV_BUF_SIZE: usize = 512;

/// Cipher together with the cleartext welcome packet that carries its keys.
pub trait Handshake: Cipher + Sized + 'static {
    const KIND: HeaderKind;
    type Welcome: Payload + Decode + Sync;

    /// Fresh random key
    fn new_vector() -> Self::Key;
    fn welcome(server_vector: &Self::Key, client_vector: &Self::Key) -> Self::Welcome;
    /// Returns `(server_vector, client_vector)`
    fn vectors(welcome: &Self::Welcome) -> (Self::Key, Self::Key);
}

impl Handshake for PcCipher {
    const KIND: HeaderKind = HeaderKind::Pc;
    type Welcome = PatchWelcome;

    fn new_vector() -> Self::Key {
        rand::thread_rng().gen()
    }

    fn welcome(server_vector: &Self::Key, client_vector: &Self::Key) -> Self::Welcome {
        PatchWelcome {
            copyright: Arr::<u8, 44>::from_str(PATCH_COPYRIGHT),
            padding: Default::default(),
            server_vector: (*server_vector).into(),
            client_vector: (*client_vector).into(),
        }
    }

    fn vectors(welcome: &Self::Welcome) -> (Self::Key, Self::Key) {
        (welcome.server_vector.0, welcome.client_vector.0)
    }
}

impl Handshake for BbCipher {
    const KIND: HeaderKind = HeaderKind::Bb;
    type Welcome = BbWelcome;

    fn new_vector() -> Self::Key {
        let mut key = [0u8; crypto::bb::KEY_LEN];
        rand::thread_rng().fill(&mut key[..]);
        key
    }

    fn welcome(server_vector: &Self::Key, client_vector: &Self::Key) -> Self::Welcome {
        BbWelcome {
            copyright: Arr::<u8, 96>::from_str(BB_COPYRIGHT),
            server_vector: (*server_vector).into(),
            client_vector: (*client_vector).into(),
        }
    }

    fn vectors(welcome: &Self::Welcome) -> (Self::Key, Self::Key) {
        (welcome.server_vector.0, welcome.client_vector.0)
    }
}

/// A wrapper that reads / writes complete encrypted packets
/// to the underlying stream.
///
/// Each direction has its own cipher. On the server side the receiving
/// one is seeded with the client vector, on the client side with the
/// server vector.
pub struct Session<T, C> {
    pub stream: T,
    label: String,
    recv_cipher: C,
    send_cipher: C,
    recv_buf: Vec<u8>,
    send_buf: Vec<u8>,
}

impl<T: Unpin, C: Handshake> Session<T, C> {
    pub fn new(stream: T, label: String, recv_cipher: C, send_cipher: C) -> Self {
        Self {
            stream,
            label,
            recv_cipher,
            send_cipher,
            recv_buf: vec![0u8; RECV_BUF_SIZE],
            send_buf: Vec::new(),
        }
    }

    pub fn kind(&self) -> HeaderKind {
        C::KIND
    }
}

impl<T: Unpin + AsyncRead + AsyncWrite, C: Handshake> Session<T, C> {
    /// Server side: send the cleartext welcome with fresh vectors.
    pub async fn accept(stream: T, label: String) -> Result<Self> {
        let server_vector = C::new_vector();
        let client_vector = C::new_vector();

        let mut session = Self::new(
            stream,
            label,
            C::new(&client_vector),
            C::new(&server_vector),
        );
        session
            .send_raw(&C::welcome(&server_vector, &client_vector))
            .await
            .context("Failed to send the welcome packet")?;
        Ok(session)
    }

    /// Client side: receive the cleartext welcome and key both ciphers.
    pub async fn connect(mut stream: T, label: String) -> Result<Self> {
        let hdr_len = C::KIND.size();
        let mut buf = vec![0u8; hdr_len];
        stream
            .read_exact(&mut buf)
            .await
            .context("Failed to receive the welcome packet")?;
        let hdr = Header::deserialize(&buf, C::KIND)?;
        buf.resize(hdr.aligned_len(), 0);
        stream.read_exact(&mut buf[hdr_len..]).await?;

        let welcome = C::Welcome::deserialize_no_hdr(&buf[hdr_len..])?;
        if welcome.id() != hdr.id {
            bail!("{label}: Expected welcome packet, got {hdr:x?}");
        }
        let (server_vector, client_vector) = C::vectors(&welcome);
        Ok(Self::new(
            stream,
            label,
            C::new(&server_vector),
            C::new(&client_vector),
        ))
    }

    /// Fill `recv_buf[start..end]` from the stream. Returns false if the
    /// stream ended before any byte arrived.
    async fn fill(&mut self, start: usize, end: usize) -> Result<bool> {
        let mut pos = start;
        while pos < end {
            let n = self
                .stream
                .read(&mut self.recv_buf[pos..end])
                .await
                .with_context(|| format!("{}: Failed to read", self.label))?;
            if n == 0 {
                if pos == start {
                    return Ok(false);
                }
                bail!("{}: Connection terminated while receiving a packet", self.label);
            }
            pos += n;
        }
        Ok(true)
    }

    /// Receive and decrypt the next frame. Returns the header and the
    /// payload, including any trailing padding. `Ok(None)` means the
    /// peer closed the connection in between packets.
    pub async fn recv_frame(&mut self) -> Result<Option<(Header, &[u8])>> {
        let hdr_len = C::KIND.size();
        if !self.fill(0, hdr_len).await? {
            return Ok(None);
        }
        self.recv_cipher.decrypt(&mut self.recv_buf[..hdr_len]);
        let hdr = Header::deserialize(&self.recv_buf[..hdr_len], C::KIND)
            .map_err(|e| anyhow!("{}: {e}", self.label))?;

        let len = hdr.aligned_len();
        if len > self.recv_buf.len() {
            let new_len = self.recv_buf.len() + len;
            self.recv_buf.resize(new_len, 0);
        }
        if !self.fill(hdr_len, len).await? {
            bail!("{}: Connection terminated while receiving a packet", self.label);
        }
        self.recv_cipher.decrypt(&mut self.recv_buf[hdr_len..len]);

        Ok(Some((hdr, &self.recv_buf[hdr_len..len])))
    }

    /// Receive the next packet and decode it as one of `P`'s variants.
    pub async fn recv<P: PacketList>(&mut self) -> Result<Option<(Header, P)>> {
        let Some((hdr, payload)) = self.recv_frame().await? else {
            return Ok(None);
        };
        let p = P::deserialize_with_id(hdr.id, payload)
            .map_err(|e| anyhow!("Can't decode packet {hdr:x?}: {e}\nPayload: {payload:x?}"))?;
        debug!("{self}: recv: {p:?}");
        Ok(Some((hdr, p)))
    }

    pub async fn send(&mut self, pkt: &impl Payload) -> Result<()> {
        self.send_flagged(pkt, 0).await
    }

    /// Send a packet with the given header flags. Only Blue Burst
    /// headers have room for them.
    pub async fn send_flagged(&mut self, pkt: &impl Payload, flags: u32) -> Result<()> {
        trace!("{self}: sent: {pkt:?}");
        let len = pkt.serialize(&mut self.send_buf, C::KIND, flags)?;
        self.send_cipher.encrypt(&mut self.send_buf[..len]);
        self.stream
            .write_all(&self.send_buf[..len])
            .await
            .with_context(|| format!("{}: Failed to send", self.label))?;
        Ok(())
    }

    /// Send a packet in the clear. Only the welcome packet is sent this way.
    pub async fn send_raw(&mut self, pkt: &impl Payload) -> Result<()> {
        trace!("{self}: sent raw: {pkt:?}");
        let len = pkt.serialize(&mut self.send_buf, C::KIND, 0)?;
        self.stream.write_all(&self.send_buf[..len]).await?;
        Ok(())
    }
}

impl<T, C> Display for Session<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;
    use packet::pkt_common::{Disconnect, MenuSelection};

    /// Encrypt `pkts` the way a client would for a server keyed with
    /// `client_vector`.
    fn client_frames<C: Handshake>(client_vector: &C::Key, pkts: &[&dyn Payload]) -> Vec<u8> {
        let mut cipher = C::new(client_vector);
        let mut out = Vec::new();
        for pkt in pkts {
            let mut buf = Vec::new();
            let len = pkt.serialize(&mut buf, C::KIND, 0).unwrap();
            cipher.encrypt(&mut buf[..len]);
            out.extend_from_slice(&buf[..len]);
        }
        out
    }

    #[test]
    fn recv_bb() {
        let key = BbCipher::new_vector();
        let sel = MenuSelection {
            menu_id: 0x13,
            item_id: 2,
            ..Default::default()
        };
        let bytes = client_frames::<BbCipher>(&key, &[&sel, &Disconnect {}]);
        let mut session = Session::new(
            Cursor::new(bytes),
            "test".into(),
            BbCipher::new(&key),
            BbCipher::new(&key),
        );

        smol::block_on(async {
            let (hdr, p) = session.recv::<BbPacket>().await.unwrap().unwrap();
            assert_eq!((hdr.len, hdr.id), (16, 0x10));
            assert_eq!(p, BbPacket::MenuSelection(sel));
            let (_, p) = session.recv::<BbPacket>().await.unwrap().unwrap();
            assert_eq!(p, BbPacket::Disconnect(Disconnect {}));
            assert!(session.recv::<BbPacket>().await.unwrap().is_none());
        });
    }

    #[test]
    fn recv_grows_buffer() {
        let key = PcCipher::new_vector();
        let login = packet::pkt_patch::PatchLogin {
            data: vec![0xab; 2000].into(),
        };
        let bytes = client_frames::<PcCipher>(&key, &[&login]);
        let mut session = Session::new(
            Cursor::new(bytes),
            "test".into(),
            PcCipher::new(&key),
            PcCipher::new(&key),
        );

        smol::block_on(async {
            let (hdr, payload) = session.recv_frame().await.unwrap().unwrap();
            assert_eq!(hdr.len, 2004);
            assert_eq!(payload.len(), 2000);
            assert!(payload.iter().all(|b| *b == 0xab));
        });
    }

    #[test]
    fn truncated_packet() {
        let key = PcCipher::new_vector();
        // an ack, then a frame declaring 12 bytes with only 1 byte of body
        let mut bytes = vec![0x04, 0x00, 0x04, 0x00, 0x0c, 0x00, 0x13, 0x00, 0xaa];
        PcCipher::new(&key).encrypt(&mut bytes[..8]);

        let mut session = Session::new(
            Cursor::new(bytes),
            "test".into(),
            PcCipher::new(&key),
            PcCipher::new(&key),
        );
        smol::block_on(async {
            let (_, p) = session.recv::<PatchPacket>().await.unwrap().unwrap();
            assert!(matches!(p, PatchPacket::PatchLogin(_)));
            assert!(session.recv::<PatchPacket>().await.is_err());
        });
    }

    #[test]
    fn zero_size_is_fatal() {
        let key = BbCipher::new_vector();
        let mut frame = [0u8; 8];
        BbCipher::new(&key).encrypt(&mut frame);
        let mut session = Session::new(
            Cursor::new(frame.to_vec()),
            "test".into(),
            BbCipher::new(&key),
            BbCipher::new(&key),
        );
        smol::block_on(async {
            assert!(session.recv_frame().await.is_err());
        });
    }

    #[test]
    fn send_encrypts() {
        let key = BbCipher::new_vector();
        let mut session = Session::new(
            Cursor::new(Vec::new()),
            "test".into(),
            BbCipher::new(&key),
            BbCipher::new(&key),
        );
        smol::block_on(session.send_flagged(&Disconnect {}, 3)).unwrap();

        let mut sent = session.stream.into_inner();
        assert_eq!(sent.len(), 8);
        BbCipher::new(&key).decrypt(&mut sent);
        assert_eq!(sent, [8, 0, 5, 0, 3, 0, 0, 0]);
    }

    #[test]
    fn welcome_round_trip() {
        smol::block_on(async {
            let server = Session::<_, BbCipher>::accept(Cursor::new(Vec::new()), "srv".into())
                .await
                .unwrap();
            let wire = server.stream.into_inner();
            assert_eq!(wire.len(), 0xC8);
            assert_eq!(&wire[8..8 + 10], b"Phantasy S");

            let client = Session::<_, BbCipher>::connect(Cursor::new(wire), "cli".into())
                .await
                .unwrap();
            // the client's receive cipher matches the server's send cipher
            assert_eq!(client.recv_cipher, server.send_cipher);
            assert_eq!(client.send_cipher, server.recv_cipher);
        });
    }
}
