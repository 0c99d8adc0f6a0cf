// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

use std::collections::BTreeSet;
use std::fmt::Display;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use crypto::PcCipher;
use log::{info, warn};
use packet::pkt_patch::*;
use packet::{Arr, PatchPacket};
use smol::io::AsyncReadExt;

use super::index::{PatchEntry, PatchIndex, WalkStep};
use crate::dispatcher::{Endpoint, TcpSession};

/// Maximum size of a single file chunk
pub const FILE_CHUNK_SIZE: usize = 24576;

/// Combined size of the files in an update, if it fits the packet field
fn total_size(entries: &[&PatchEntry]) -> Option<u32> {
    let total: u64 = entries.iter().map(|e| u64::from(e.size)).sum();
    u32::try_from(total).ok()
}

pub struct DataEndpoint {
    index: PatchIndex,
}

impl DataEndpoint {
    pub fn new(index: PatchIndex) -> Self {
        Self { index }
    }
}

impl Endpoint for DataEndpoint {
    type Cipher = PcCipher;

    fn name(&self) -> &str {
        "DATA"
    }

    async fn handle(self: Arc<Self>, session: TcpSession<PcCipher>) -> Result<()> {
        let mut conn = DataConn {
            index: &self.index,
            session,
            acked: false,
            updates: BTreeSet::new(),
        };
        conn.handle().await
    }
}

struct DataConn<'a> {
    index: &'a PatchIndex,
    session: TcpSession<PcCipher>,
    acked: bool,
    /// Indices of files the client needs
    updates: BTreeSet<u32>,
}

impl Display for DataConn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.session.fmt(f)
    }
}

impl DataConn<'_> {
    async fn handle(&mut self) -> Result<()> {
        while let Some((_, p)) = self.session.recv::<PatchPacket>().await? {
            match p {
                PatchPacket::PatchWelcomeReply(_) => {
                    super::ack_once(&mut self.session, &mut self.acked).await?;
                }
                PatchPacket::PatchLogin(_) => {
                    super::ack_once(&mut self.session, &mut self.acked).await?;
                    self.session.send(&DataAck {}).await?;
                    self.send_file_list().await?;
                }
                PatchPacket::FileStatus(p) => {
                    self.handle_file_status(p)?;
                }
                PatchPacket::ClientListDone(_) => {
                    self.update_client_files().await?;
                }
                p => {
                    warn!("{self}: ignoring unexpected packet {p:?}");
                }
            }
        }
        Ok(())
    }

    async fn send_file_list(&mut self) -> Result<()> {
        for step in self.index.walk() {
            match step {
                WalkStep::ChangeDir(dirname) => {
                    self.session.send(&ChangeDir::new(dirname)).await?;
                }
                WalkStep::DirAbove => {
                    self.session.send(&DirAbove {}).await?;
                }
                WalkStep::CheckFile(entry) => {
                    self.session
                        .send(&CheckFile {
                            patch_id: entry.index,
                            filename: Arr::<u8, 32>::from_str(&entry.filename),
                        })
                        .await?;
                }
            }
        }
        self.session.send(&FileListDone {}).await
    }

    fn handle_file_status(&mut self, p: FileStatus) -> Result<()> {
        let Some(entry) = self.index.get(p.patch_id) else {
            bail!("{self}: Status of unknown patch {}", p.patch_id);
        };
        if entry.checksum != p.checksum || entry.size != p.file_size {
            self.updates.insert(entry.index);
        }
        Ok(())
    }

    async fn update_client_files(&mut self) -> Result<()> {
        let index = self.index;
        let entries: Vec<&PatchEntry> = self
            .updates
            .iter()
            .filter_map(|i| index.get(*i))
            .collect();
        self.updates.clear();

        if !entries.is_empty() {
            let Some(total_size) = total_size(&entries) else {
                bail!("{self}: Update of {} files exceeds 4 GiB", entries.len());
            };
            info!(
                "{self}: sending {} file(s), {total_size} bytes",
                entries.len()
            );
            self.session
                .send(&UpdateFiles {
                    total_size,
                    num_files: entries.len() as u32,
                })
                .await?;
            self.session.send(&ChangeDir::new(".")).await?;

            // reused for all files, the tail chunk keeps stale bytes
            let mut buf = vec![0u8; FILE_CHUNK_SIZE];
            for entry in entries {
                self.send_file(entry, &mut buf).await?;
            }
        }

        self.session.send(&UpdateComplete {}).await
    }

    async fn send_file(&mut self, entry: &PatchEntry, buf: &mut [u8]) -> Result<()> {
        for dir in &entry.dirs {
            self.session.send(&ChangeDir::new(dir)).await?;
        }
        self.session
            .send(&FileHeader {
                padding: 0,
                file_size: entry.size,
                filename: Arr::<u8, 48>::from_str(&entry.filename),
            })
            .await?;

        let mut file = smol::fs::File::open(&entry.path)
            .await
            .with_context(|| format!("{self}: Can't open {:?}", entry.path))?;
        let num_chunks = entry.size as usize / FILE_CHUNK_SIZE + 1;
        for chunk in 0..num_chunks {
            let mut len = 0;
            while len < buf.len() {
                let n = file.read(&mut buf[len..]).await?;
                if n == 0 {
                    break;
                }
                len += n;
            }

            // the client expects the checksum of the whole buffer
            self.session
                .send(&FileChunk {
                    chunk: chunk as u32,
                    checksum: crc32fast::hash(buf),
                    size: len as u32,
                    data: buf[..len].to_vec().into(),
                })
                .await?;
        }

        self.session.send(&FileComplete {}).await?;
        for _ in &entry.dirs {
            self.session.send(&DirAbove {}).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(size: u32) -> PatchEntry {
        PatchEntry {
            filename: "a.bin".into(),
            dirs: Vec::new(),
            path: "a.bin".into(),
            index: 0,
            size,
            checksum: 0,
        }
    }

    #[test]
    fn update_size() {
        let (a, b) = (entry(5), entry(u32::MAX - 5));
        assert_eq!(total_size(&[]), Some(0));
        assert_eq!(total_size(&[&a, &b]), Some(u32::MAX));

        let c = entry(1);
        assert_eq!(total_size(&[&a, &b, &c]), None);
    }
}
