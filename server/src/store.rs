// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

//! Account, character and options records, and the store holding them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Maximum number of guildcard entries of a single player
pub const MAX_GUILDCARD_ENTRIES: usize = 140;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    /// SHA-256 of the password, hex encoded
    pub password: String,
    pub guildcard: u32,
    pub team_id: u32,
    pub gm: bool,
    pub banned: bool,
    pub active: bool,
}

impl Account {
    pub fn new(username: &str, password: &str, guildcard: u32) -> Self {
        Self {
            username: username.into(),
            password: hash_password(password.as_bytes()),
            guildcard,
            team_id: 0,
            gm: false,
            banned: false,
            active: true,
        }
    }
}

pub fn hash_password(password: &[u8]) -> String {
    hex::encode(Sha256::digest(password))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStats {
    pub atp: u16,
    pub mst: u16,
    pub evp: u16,
    pub hp: u16,
    pub dfp: u16,
    pub ata: u16,
    pub lck: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub experience: u32,
    pub level: u32,
    pub guildcard_str: Vec<u8>,
    pub name_color: u32,
    pub model: u8,
    pub name_color_checksum: u32,
    pub section_id: u8,
    pub class: u8,
    pub v2_flags: u8,
    pub version: u8,
    pub v1_flags: u32,
    pub costume: u16,
    pub skin: u16,
    pub face: u16,
    pub head: u16,
    pub hair: u16,
    pub hair_red: u16,
    pub hair_green: u16,
    pub hair_blue: u16,
    pub prop_x: f32,
    pub prop_y: f32,
    /// UTF-16 code units, kept verbatim
    pub name: Vec<u16>,
    pub playtime: u32,
    pub stats: BaseStats,
    pub meseta: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerOptions {
    pub guildcard: u32,
    /// Key config followed by the joystick config
    pub key_config: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildcardEntry {
    pub guildcard: u32,
    pub name: String,
    pub team_name: String,
    pub description: String,
    pub language: u8,
    pub section_id: u8,
    pub char_class: u8,
    pub comment: String,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store backend failure: {0}")]
    Backend(String),
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence used by the endpoint handlers. A missing record is
/// `Ok(None)`, never an error.
pub trait Store: Send + Sync {
    fn find_account(&self, username: &str) -> Result<Option<Account>, StoreError>;

    fn find_character(&self, guildcard: u32, slot: u32) -> Result<Option<Character>, StoreError>;
    fn create_character(
        &self,
        guildcard: u32,
        slot: u32,
        character: Character,
    ) -> Result<(), StoreError>;
    fn update_character(
        &self,
        guildcard: u32,
        slot: u32,
        character: Character,
    ) -> Result<(), StoreError>;
    fn delete_character(&self, guildcard: u32, slot: u32) -> Result<(), StoreError>;

    fn find_player_options(&self, guildcard: u32) -> Result<Option<PlayerOptions>, StoreError>;
    fn upsert_player_options(&self, options: PlayerOptions) -> Result<(), StoreError>;

    /// At most [`MAX_GUILDCARD_ENTRIES`] entries
    fn find_guildcard_entries(&self, guildcard: u32) -> Result<Vec<GuildcardEntry>, StoreError>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Tables {
    accounts: BTreeMap<String, Account>,
    characters: BTreeMap<u32, BTreeMap<u32, Character>>,
    options: BTreeMap<u32, PlayerOptions>,
    guildcards: BTreeMap<u32, Vec<GuildcardEntry>>,
}

/// In-memory [`Store`], optionally persisted to a JSON file
/// which is rewritten after every change.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the snapshot at `path`, or start empty if there's none yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let tables = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            tables: RwLock::new(tables),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> Result<R, StoreError> {
        let mut tables = self.write();
        let Some(path) = &self.path else {
            return Ok(f(&mut tables));
        };

        // memory only changes once the snapshot is on disk
        let mut next = tables.clone();
        let ret = f(&mut next);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&next)?)?;
        std::fs::rename(&tmp, path)?;
        *tables = next;
        Ok(ret)
    }

    pub fn upsert_account(&self, account: Account) -> Result<(), StoreError> {
        self.mutate(|t| {
            t.accounts.insert(account.username.clone(), account);
        })
    }

    /// Apply `f` to an existing account. Returns false if there's none.
    pub fn modify_account(
        &self,
        username: &str,
        f: impl FnOnce(&mut Account),
    ) -> Result<bool, StoreError> {
        self.mutate(|t| t.accounts.get_mut(username).map(f).is_some())
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.read().accounts.values().cloned().collect()
    }

    pub fn add_guildcard_entry(&self, owner: u32, entry: GuildcardEntry) -> Result<(), StoreError> {
        self.mutate(|t| t.guildcards.entry(owner).or_default().push(entry))
    }
}

impl Store for MemoryStore {
    fn find_account(&self, username: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.read().accounts.get(username).cloned())
    }

    fn find_character(&self, guildcard: u32, slot: u32) -> Result<Option<Character>, StoreError> {
        Ok(self
            .read()
            .characters
            .get(&guildcard)
            .and_then(|slots| slots.get(&slot))
            .cloned())
    }

    fn create_character(
        &self,
        guildcard: u32,
        slot: u32,
        character: Character,
    ) -> Result<(), StoreError> {
        self.mutate(|t| {
            t.characters
                .entry(guildcard)
                .or_default()
                .insert(slot, character);
        })
    }

    fn update_character(
        &self,
        guildcard: u32,
        slot: u32,
        character: Character,
    ) -> Result<(), StoreError> {
        let found = self.mutate(|t| {
            t.characters
                .get_mut(&guildcard)
                .and_then(|slots| slots.get_mut(&slot))
                .map(|c| *c = character)
                .is_some()
        })?;
        if !found {
            return Err(StoreError::Backend(format!(
                "No character in slot {slot} of guildcard {guildcard}"
            )));
        }
        Ok(())
    }

    fn delete_character(&self, guildcard: u32, slot: u32) -> Result<(), StoreError> {
        self.mutate(|t| {
            if let Some(slots) = t.characters.get_mut(&guildcard) {
                slots.remove(&slot);
            }
        })
    }

    fn find_player_options(&self, guildcard: u32) -> Result<Option<PlayerOptions>, StoreError> {
        Ok(self.read().options.get(&guildcard).cloned())
    }

    fn upsert_player_options(&self, options: PlayerOptions) -> Result<(), StoreError> {
        self.mutate(|t| {
            t.options.insert(options.guildcard, options);
        })
    }

    fn find_guildcard_entries(&self, guildcard: u32) -> Result<Vec<GuildcardEntry>, StoreError> {
        let tables = self.read();
        let entries = tables.guildcards.get(&guildcard).map(Vec::as_slice);
        Ok(entries
            .unwrap_or_default()
            .iter()
            .take(MAX_GUILDCARD_ENTRIES)
            .cloned()
            .collect())
    }
}
