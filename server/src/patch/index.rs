// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use walkdir::{DirEntry, WalkDir};

/// Names never served to the client
const SKIPPED_NAMES: [&str; 4] = [".", "..", ".DS_Store", ".rid"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchEntry {
    pub filename: String,
    /// Directories between the patch root and the file
    pub dirs: Vec<String>,
    /// Location on disk
    pub path: PathBuf,
    /// Position in the depth-first order. The client refers to files by it
    pub index: u32,
    pub size: u32,
    pub checksum: u32,
}

#[derive(Debug, Default)]
struct PatchDir {
    name: String,
    subdirs: Vec<PatchDir>,
    /// Indices into [`PatchIndex::entries`]
    files: Vec<u32>,
}

/// One packet of the file list walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStep<'a> {
    ChangeDir(&'a str),
    DirAbove,
    CheckFile(&'a PatchEntry),
}

/// Immutable tree of patch files, built once at startup.
#[derive(Debug)]
pub struct PatchIndex {
    root: PatchDir,
    entries: Vec<PatchEntry>,
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| SKIPPED_NAMES.contains(&name))
}

impl PatchIndex {
    pub fn build(root_path: &Path) -> Result<Self> {
        let mut entries = Vec::new();
        // directories on the current DFS path, the root first
        let mut stack = vec![PatchDir {
            name: ".".into(),
            ..Default::default()
        }];

        // subdirectories come before files, so they get the lower indices
        let walker = WalkDir::new(root_path)
            .min_depth(1)
            .follow_links(true)
            .sort_by(|a, b| {
                let (a_dir, b_dir) = (a.file_type().is_dir(), b.file_type().is_dir());
                b_dir.cmp(&a_dir).then_with(|| a.file_name().cmp(b.file_name()))
            })
            .into_iter()
            .filter_entry(|e| !is_skipped(e));

        for entry in walker {
            let entry = entry.with_context(|| format!("Can't walk {root_path:?}"))?;
            while stack.len() > entry.depth() {
                let dir = stack.pop().unwrap_or_default();
                if let Some(parent) = stack.last_mut() {
                    parent.subdirs.push(dir);
                }
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().is_dir() {
                stack.push(PatchDir {
                    name,
                    ..Default::default()
                });
                continue;
            }

            let data = std::fs::read(entry.path())
                .with_context(|| format!("Can't read patch file {:?}", entry.path()))?;
            let index = entries.len() as u32;
            let patch = PatchEntry {
                filename: name,
                dirs: stack[1..].iter().map(|d| d.name.clone()).collect(),
                path: entry.path().to_path_buf(),
                index,
                size: data
                    .len()
                    .try_into()
                    .with_context(|| format!("Patch file {:?} is too big", entry.path()))?,
                checksum: crc32fast::hash(&data),
            };
            info!(
                "Patch {index}: {:?} ({} bytes, checksum: {:#010x})",
                patch.path, patch.size, patch.checksum
            );
            entries.push(patch);
            if let Some(dir) = stack.last_mut() {
                dir.files.push(index);
            }
        }

        while stack.len() > 1 {
            let dir = stack.pop().unwrap_or_default();
            if let Some(parent) = stack.last_mut() {
                parent.subdirs.push(dir);
            }
        }
        let root = stack.pop().unwrap_or_default();

        if entries.is_empty() {
            warn!("No patch files found in {root_path:?}");
        }
        Ok(Self { root, entries })
    }

    pub fn get(&self, index: u32) -> Option<&PatchEntry> {
        self.entries.get(index as usize)
    }

    pub fn entries(&self) -> &[PatchEntry] {
        &self.entries
    }

    /// Packets that make the client check every file, starting from
    /// the patch root.
    pub fn walk(&self) -> Vec<WalkStep<'_>> {
        fn visit<'a>(index: &'a PatchIndex, dir: &'a PatchDir, steps: &mut Vec<WalkStep<'a>>) {
            steps.push(WalkStep::ChangeDir(&dir.name));
            for subdir in &dir.subdirs {
                visit(index, subdir, steps);
                steps.push(WalkStep::DirAbove);
            }
            for file in &dir.files {
                steps.push(WalkStep::CheckFile(&index.entries[*file as usize]));
            }
        }

        let mut steps = Vec::new();
        visit(self, &self.root, &mut steps);
        steps
    }
}
