// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

//! Parameter files served by the character endpoint, and the base
//! stats of new characters.

use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;
use packet::pkt_login::{ParameterEntry, ParameterHeader};
use packet::Arr;

use crate::prs;
use crate::store::BaseStats;

/// Files sent to the client, in order
pub const PARAMETER_FILES: [&str; 9] = [
    "ItemMagEdit.prs",
    "ItemPMT.prs",
    "BattleParamEntry.dat",
    "BattleParamEntry_on.dat",
    "BattleParamEntry_lab.dat",
    "BattleParamEntry_lab_on.dat",
    "BattleParamEntry_ep4.dat",
    "BattleParamEntry_ep4_on.dat",
    "PlyLevelTbl.prs",
];

/// Compressed table whose head holds the base stats of each class
pub const LEVEL_TABLE_FILE: &str = "PlyLevelTbl.prs";

/// Maximum payload of a parameter or guildcard chunk
pub const CHUNK_SIZE: usize = 0x6800;

pub const NUM_CLASSES: usize = 12;
const BASE_STATS_SIZE: usize = 14;

/// All parameter files concatenated and split into chunks.
#[derive(Debug, Default)]
pub struct ParameterFiles {
    entries: Vec<ParameterEntry>,
    chunks: Vec<Vec<u8>>,
}

impl ParameterFiles {
    pub fn load(dir: &Path) -> Result<Self> {
        info!("Loading parameters from {dir:?}");
        let mut files = Vec::with_capacity(PARAMETER_FILES.len());
        for name in PARAMETER_FILES {
            let path = dir.join(name);
            let data = std::fs::read(&path)
                .with_context(|| format!("Can't read parameter file {path:?}"))?;
            files.push((name, data));
        }
        Self::from_files(files)
    }

    pub fn from_files<'a>(files: impl IntoIterator<Item = (&'a str, Vec<u8>)>) -> Result<Self> {
        let mut entries = Vec::new();
        let mut concat = Vec::new();
        for (name, data) in files {
            let entry = ParameterEntry {
                size: data.len().try_into()?,
                checksum: crc32fast::hash(&data),
                offset: concat.len().try_into()?,
                filename: Arr::<u8, 0x40>::from_str(name),
            };
            info!(
                "{name} ({} bytes, checksum: {:#010x})",
                entry.size, entry.checksum
            );
            entries.push(entry);
            concat.extend_from_slice(&data);
        }

        let chunks = concat.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();
        Ok(Self { entries, chunks })
    }

    /// Number of files, sent in the header flags
    pub fn num_entries(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn header(&self) -> ParameterHeader {
        ParameterHeader {
            entries: self.entries.clone().into(),
        }
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk(&self, index: u32) -> Option<&[u8]> {
        self.chunks.get(index as usize).map(Vec::as_slice)
    }
}

/// Parse the decompressed level table. Starts with a 14-byte record per class.
pub fn parse_base_stats(table: &[u8]) -> Result<[BaseStats; NUM_CLASSES]> {
    if table.len() < NUM_CLASSES * BASE_STATS_SIZE {
        bail!(
            "Level table too short ({} bytes, expected at least {})",
            table.len(),
            NUM_CLASSES * BASE_STATS_SIZE
        );
    }

    let mut stats = [BaseStats::default(); NUM_CLASSES];
    for (dst, src) in stats.iter_mut().zip(table.chunks_exact(BASE_STATS_SIZE)) {
        let field = |i: usize| u16::from_le_bytes([src[i * 2], src[i * 2 + 1]]);
        *dst = BaseStats {
            atp: field(0),
            mst: field(1),
            evp: field(2),
            hp: field(3),
            dfp: field(4),
            ata: field(5),
            lck: field(6),
        };
    }
    Ok(stats)
}

pub fn load_base_stats(dir: &Path) -> Result<[BaseStats; NUM_CLASSES]> {
    let path = dir.join(LEVEL_TABLE_FILE);
    let compressed =
        std::fs::read(&path).with_context(|| format!("Can't read level table {path:?}"))?;
    let table =
        prs::decompress(&compressed).with_context(|| format!("Can't decompress {path:?}"))?;
    parse_base_stats(&table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking() {
        let params = ParameterFiles::from_files([
            ("a.dat", vec![1u8; CHUNK_SIZE - 10]),
            ("b.dat", vec![2u8; 30]),
            ("c.dat", vec![]),
        ])
        .unwrap();

        assert_eq!(params.num_entries(), 3);
        let header = params.header();
        assert_eq!(header.entries[1].offset, CHUNK_SIZE as u32 - 10);
        assert_eq!(header.entries[1].size, 30);
        assert_eq!(header.entries[2].offset, CHUNK_SIZE as u32 + 20);
        assert_eq!(header.entries[0].filename.trimmed(), b"a.dat");

        assert_eq!(params.num_chunks(), 2);
        let first = params.chunk(0).unwrap();
        assert_eq!(first.len(), CHUNK_SIZE);
        assert_eq!(&first[CHUNK_SIZE - 11..], &[1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2]);
        assert_eq!(params.chunk(1).unwrap(), &[2u8; 20]);
        assert!(params.chunk(2).is_none());
    }

    #[test]
    fn exact_chunks() {
        let params = ParameterFiles::from_files([("a", vec![0u8; CHUNK_SIZE * 2])]).unwrap();
        assert_eq!(params.num_chunks(), 2);
    }

    #[test]
    fn base_stats() {
        let mut table = vec![0u8; NUM_CLASSES * BASE_STATS_SIZE + 100];
        // class 1, HP
        table[BASE_STATS_SIZE + 6..BASE_STATS_SIZE + 8].copy_from_slice(&20u16.to_le_bytes());
        // class 11, LCK
        table[11 * BASE_STATS_SIZE + 12] = 10;

        let stats = parse_base_stats(&table).unwrap();
        assert_eq!(stats[1].hp, 20);
        assert_eq!(stats[11].lck, 10);
        assert_eq!(stats[0], BaseStats::default());

        assert!(parse_base_stats(&table[..100]).is_err());
    }
}
