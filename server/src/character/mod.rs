// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

pub mod params;

use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use crypto::BbCipher;
use log::{debug, info, warn};
use packet::pkt_common::*;
use packet::pkt_login::{self as pkt, *};
use packet::{Arr, BbPacket, Header};

use crate::auth::{self, report_store_error, Player};
use crate::dispatcher::{Endpoint, Flow, TcpSession};
use crate::ship::{self, Ship};
use crate::store::{BaseStats, Character, GuildcardEntry, PlayerOptions};
use crate::ServerContext;
use params::{ParameterFiles, CHUNK_SIZE, NUM_CLASSES};

/// Set by the client before it sends a character from the dressing room
pub const DRESSING_ROOM_FLAG: u32 = 0x2;

/// Meseta of a newly created character
pub const STARTING_MESETA: u32 = 300;

/// Serves the character select screen, the parameter files and the
/// guildcard file. Sends the client to a ship afterwards.
pub struct CharacterEndpoint {
    ctx: Arc<ServerContext>,
    params: ParameterFiles,
    base_stats: [BaseStats; NUM_CLASSES],
    key_config: Vec<u8>,
    ships: Vec<Ship>,
    /// Flags set by clients, by guildcard. They outlive the connection
    /// as the client reconnects between setting a flag and using it.
    flags: Mutex<HashMap<u32, u32>>,
}

impl CharacterEndpoint {
    /// Read all parameter files. Fails if any of them is missing.
    pub fn load(ctx: Arc<ServerContext>) -> Result<Self> {
        let cfg = &ctx.config;
        let params = ParameterFiles::load(&cfg.parameters_dir)?;
        let base_stats = params::load_base_stats(&cfg.parameters_dir)?;
        let key_config = match &cfg.key_config {
            Some(path) => load_key_config(path)?,
            None => vec![0u8; KEY_CONFIG_SIZE],
        };
        Ok(Self::new(ctx, params, base_stats, key_config))
    }

    pub fn new(
        ctx: Arc<ServerContext>,
        params: ParameterFiles,
        base_stats: [BaseStats; NUM_CLASSES],
        key_config: Vec<u8>,
    ) -> Self {
        let ships = vec![Ship::local(&ctx.config)];
        Self {
            ctx,
            params,
            base_stats,
            key_config,
            ships,
            flags: Mutex::new(HashMap::new()),
        }
    }

    fn set_flag(&self, guildcard: u32, flag: u32) {
        let mut flags = self.flags.lock().unwrap_or_else(|e| e.into_inner());
        *flags.entry(guildcard).or_default() |= flag;
    }

    /// Clear `flag` for `guildcard` and return whether it was set
    fn take_flag(&self, guildcard: u32, flag: u32) -> bool {
        let mut flags = self.flags.lock().unwrap_or_else(|e| e.into_inner());
        let Some(cur) = flags.get_mut(&guildcard) else {
            return false;
        };
        let was_set = *cur & flag != 0;
        *cur &= !flag;
        if *cur == 0 {
            flags.remove(&guildcard);
        }
        was_set
    }
}

fn load_key_config(path: &Path) -> Result<Vec<u8>> {
    let data = std::fs::read(path).with_context(|| format!("Can't read key config {path:?}"))?;
    if data.len() != KEY_CONFIG_SIZE {
        bail!(
            "Key config {path:?} has {} bytes, expected {KEY_CONFIG_SIZE}",
            data.len()
        );
    }
    Ok(data)
}

impl Endpoint for CharacterEndpoint {
    type Cipher = BbCipher;

    fn name(&self) -> &str {
        "CHARACTER"
    }

    async fn handle(self: Arc<Self>, session: TcpSession<BbCipher>) -> Result<()> {
        let mut conn = CharacterConn {
            endpoint: &self,
            session,
            player: None,
            flag: 0,
            guildcard_data: None,
        };
        conn.handle().await
    }
}

struct CharacterConn<'a> {
    endpoint: &'a CharacterEndpoint,
    session: TcpSession<BbCipher>,
    player: Option<Player>,
    /// Flags set on this connection
    flag: u32,
    /// Serialized guildcard file, built on the header request
    guildcard_data: Option<Vec<u8>>,
}

impl Display for CharacterConn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.session.fmt(f)
    }
}

impl CharacterConn<'_> {
    async fn handle(&mut self) -> Result<()> {
        while let Some((hdr, p)) = self.session.recv::<BbPacket>().await? {
            let flow = match p {
                BbPacket::Login(p) => self.handle_login(p).await?,
                BbPacket::OptionsRequest(_) => self.handle_options().await?,
                BbPacket::CharSelection(p) => self.handle_char_selection(p).await?,
                BbPacket::CharPreview(p) => self.handle_char_update(p).await?,
                BbPacket::Checksum(_) => {
                    self.session.send(&ChecksumAck { ack: 1 }).await?;
                    Flow::Continue
                }
                BbPacket::GuildcardHeaderRequest(_) => self.handle_guildcard_header().await?,
                BbPacket::GuildcardChunkRequest(p) => self.handle_guildcard_chunk(p).await?,
                BbPacket::ParameterHeaderRequest(_) => {
                    let params = &self.endpoint.params;
                    self.session
                        .send_flagged(&params.header(), params.num_entries())
                        .await?;
                    Flow::Continue
                }
                BbPacket::ParameterChunkRequest(_) => self.handle_parameter_chunk(&hdr).await?,
                BbPacket::SetFlag(p) => self.handle_set_flag(p)?,
                BbPacket::MenuSelection(p) => self.handle_ship_selection(p).await?,
                BbPacket::Disconnect(_) => Flow::Continue,
                p => {
                    warn!("{self}: ignoring unexpected packet {p:?}");
                    Flow::Continue
                }
            };
            if flow == Flow::Close {
                break;
            }
        }
        Ok(())
    }

    fn not_logged_in(&self, what: &str) -> anyhow::Error {
        anyhow::anyhow!("{self}: Expected Login packet before {what}")
    }

    async fn handle_login(&mut self, login: Login) -> Result<Flow> {
        let ctx = &self.endpoint.ctx;
        let Some(player) =
            auth::verify_account(&mut self.session, ctx.store.as_ref(), &login).await?
        else {
            return Ok(Flow::Close);
        };
        if !auth::check_magic(&mut self.session, &player, ctx.config.strict_magic).await? {
            return Ok(Flow::Close);
        }

        self.session.send(&player.security()).await?;
        if login.slot_num >= 0 && login.phase == LOGIN_PHASE_SHIP_SELECT {
            self.session.send(&timestamp()).await?;
            ship::send_ship_list(&mut self.session, &self.endpoint.ships).await?;
            self.session
                .send(&ScrollMessage::new(&ctx.config.scroll_message))
                .await?;
        }
        info!("{self}: {} logged in", player.username);
        self.player = Some(player);
        Ok(Flow::Continue)
    }

    async fn handle_options(&mut self) -> Result<Flow> {
        let Some(player) = &self.player else {
            return Err(self.not_logged_in("OptionsRequest"));
        };
        let guildcard = player.guildcard;
        let team_id = player.team_id;
        let store = self.endpoint.ctx.store.as_ref();

        let mut key_config = match store.find_player_options(guildcard) {
            Ok(Some(options)) => options.key_config,
            Ok(None) => {
                let options = PlayerOptions {
                    guildcard,
                    key_config: self.endpoint.key_config.clone(),
                };
                if let Err(err) = store.upsert_player_options(options) {
                    return report_store_error(&mut self.session, err).await;
                }
                self.endpoint.key_config.clone()
            }
            Err(err) => return report_store_error(&mut self.session, err).await,
        };
        key_config.resize(KEY_CONFIG_SIZE, 0);
        let (keys, joystick) = key_config.split_at(0x16C);

        let options = Options {
            key_config: Arr::<u8, 0x16C>::from_bytes(keys),
            joystick_config: Arr::<u8, 0x38>::from_bytes(joystick),
            guildcard,
            team_id,
            team_rewards: [0xFFFF_FFFF; 2].into(),
            ..Default::default()
        };
        self.session.send(&options).await?;
        Ok(Flow::Continue)
    }

    async fn handle_char_selection(&mut self, sel: CharSelection) -> Result<Flow> {
        let Some(player) = &mut self.player else {
            return Err(self.not_logged_in("CharSelection"));
        };
        let store = self.endpoint.ctx.store.as_ref();

        let character = match store.find_character(player.guildcard, sel.slot) {
            Ok(character) => character,
            Err(err) => return report_store_error(&mut self.session, err).await,
        };
        let Some(character) = character else {
            self.session
                .send(&CharAck {
                    slot: sel.slot,
                    flag: CHAR_ACK_EMPTY,
                })
                .await?;
            return Ok(Flow::Continue);
        };

        if sel.selecting != 1 {
            self.session
                .send(&CharPreview {
                    slot: sel.slot,
                    character: to_preview(&character),
                })
                .await?;
            return Ok(Flow::Continue);
        }

        player.config.char_selected = 1;
        player.config.slot_num = sel.slot as u8;
        let security = player.security();
        self.session.send(&security).await?;
        self.session
            .send(&CharAck {
                slot: sel.slot,
                flag: CHAR_ACK_SELECTED,
            })
            .await?;
        Ok(Flow::Continue)
    }

    /// A new character was created, or an existing one left the dressing room
    async fn handle_char_update(&mut self, update: CharPreview) -> Result<Flow> {
        let Some(player) = &self.player else {
            return Err(self.not_logged_in("CharPreview"));
        };
        let guildcard = player.guildcard;
        let slot = update.slot;
        let store = self.endpoint.ctx.store.as_ref();

        let dressing_room = self.flag & DRESSING_ROOM_FLAG != 0;
        let dressing_room = self.endpoint.take_flag(guildcard, DRESSING_ROOM_FLAG) || dressing_room;
        self.flag &= !DRESSING_ROOM_FLAG;

        let existing = if dressing_room {
            match store.find_character(guildcard, slot) {
                Ok(existing) => existing,
                Err(err) => return report_store_error(&mut self.session, err).await,
            }
        } else {
            None
        };

        let result = match existing {
            Some(mut character) => {
                debug!("{self}: updating character in slot {slot}");
                apply_appearance(&mut character, &update.character);
                store.update_character(guildcard, slot, character)
            }
            None => {
                let class = update.character.class as usize;
                let Some(stats) = self.endpoint.base_stats.get(class) else {
                    bail!("{self}: Invalid character class {class}");
                };
                let character = Character {
                    stats: *stats,
                    meseta: STARTING_MESETA,
                    ..from_preview(&update.character)
                };
                info!("{self}: creating character in slot {slot}");
                store
                    .delete_character(guildcard, slot)
                    .and_then(|_| store.create_character(guildcard, slot, character))
            }
        };
        if let Err(err) = result {
            return report_store_error(&mut self.session, err).await;
        }

        let Some(player) = &mut self.player else {
            return Err(self.not_logged_in("CharPreview"));
        };
        player.config.char_selected = 1;
        player.config.slot_num = slot as u8;
        let security = player.security();
        self.session.send(&security).await?;
        self.session
            .send(&CharAck {
                slot,
                flag: CHAR_ACK_UPDATED,
            })
            .await?;
        Ok(Flow::Continue)
    }

    fn handle_set_flag(&mut self, p: SetFlag) -> Result<Flow> {
        let Some(player) = &self.player else {
            return Err(self.not_logged_in("SetFlag"));
        };
        self.endpoint.set_flag(player.guildcard, p.flag);
        self.flag |= p.flag;
        Ok(Flow::Continue)
    }

    async fn handle_guildcard_header(&mut self) -> Result<Flow> {
        let Some(player) = &self.player else {
            return Err(self.not_logged_in("GuildcardHeaderRequest"));
        };
        let store = self.endpoint.ctx.store.as_ref();
        let entries = match store.find_guildcard_entries(player.guildcard) {
            Ok(entries) => entries,
            Err(err) => return report_store_error(&mut self.session, err).await,
        };

        let data = guildcard_data(&entries)?;
        let header = GuildcardHeader {
            unknown: 1,
            length: data.len().try_into()?,
            padding: 0,
            checksum: crc32fast::hash(&data),
        };
        self.guildcard_data = Some(data);
        self.session.send(&header).await?;
        Ok(Flow::Continue)
    }

    async fn handle_guildcard_chunk(&mut self, req: GuildcardChunkRequest) -> Result<Flow> {
        if req.continue_request != 1 {
            // the client is done
            return Ok(Flow::Continue);
        }
        let Some(data) = &self.guildcard_data else {
            bail!("{self}: Expected GuildcardHeaderRequest before chunk {req:?}");
        };

        let offset = req.chunk_requested as usize * CHUNK_SIZE;
        if offset >= data.len() {
            bail!("{self}: Guildcard chunk {} out of range", req.chunk_requested);
        }
        let end = (offset + CHUNK_SIZE).min(data.len());
        let chunk = GuildcardChunk {
            unknown: 0,
            chunk: req.chunk_requested,
            data: data[offset..end].to_vec().into(),
        };
        self.session.send(&chunk).await?;
        Ok(Flow::Continue)
    }

    async fn handle_parameter_chunk(&mut self, hdr: &Header) -> Result<Flow> {
        let index = hdr.flags;
        let Some(data) = self.endpoint.params.chunk(index) else {
            bail!("{self}: Parameter chunk {index} out of range");
        };
        let chunk = ParameterChunk {
            chunk: index,
            data: data.to_vec().into(),
        };
        self.session.send(&chunk).await?;
        Ok(Flow::Continue)
    }

    async fn handle_ship_selection(&mut self, sel: MenuSelection) -> Result<Flow> {
        let ship = (sel.item_id as usize)
            .checked_sub(1)
            .and_then(|i| self.endpoint.ships.get(i));
        let Some(ship) = ship else {
            bail!("{self}: Invalid ship selection {}", sel.item_id);
        };

        self.session
            .send(&Redirect {
                ip_addr: ship.addr.octets().into(),
                port: ship.port,
                padding: 0,
            })
            .await?;
        info!("{self}: redirecting to ship {}", ship.name);
        Ok(Flow::Continue)
    }
}

fn timestamp() -> Timestamp {
    let now = Utc::now().format("%Y:%m:%d: %H:%M:%S%.3f").to_string();
    Timestamp {
        timestamp: Arr::<u8, 28>::from_str(&now),
    }
}

fn to_preview(c: &Character) -> CharacterPreview {
    let mut name = [0u16; 16];
    for (dst, src) in name.iter_mut().zip(&c.name) {
        *dst = *src;
    }
    CharacterPreview {
        experience: c.experience,
        level: c.level,
        guildcard_str: Arr::<u8, 16>::from_bytes(&c.guildcard_str),
        name_color: c.name_color,
        model: c.model,
        name_color_checksum: c.name_color_checksum,
        section_id: c.section_id,
        class: c.class,
        v2_flags: c.v2_flags,
        version: c.version,
        v1_flags: c.v1_flags,
        costume: c.costume,
        skin: c.skin,
        face: c.face,
        head: c.head,
        hair: c.hair,
        hair_red: c.hair_red,
        hair_green: c.hair_green,
        hair_blue: c.hair_blue,
        prop_x: c.prop_x,
        prop_y: c.prop_y,
        name: name.into(),
        playtime: c.playtime,
        ..Default::default()
    }
}

/// New level 1 character with the client's appearance
fn from_preview(p: &CharacterPreview) -> Character {
    let mut c = Character {
        experience: 0,
        level: 1,
        guildcard_str: p.guildcard_str.to_vec(),
        v2_flags: p.v2_flags,
        version: p.version,
        v1_flags: p.v1_flags,
        playtime: 0,
        ..Default::default()
    };
    apply_appearance(&mut c, p);
    c
}

fn apply_appearance(c: &mut Character, p: &CharacterPreview) {
    c.name_color = p.name_color;
    c.model = p.model;
    c.name_color_checksum = p.name_color_checksum;
    c.section_id = p.section_id;
    c.class = p.class;
    c.costume = p.costume;
    c.skin = p.skin;
    c.face = p.face;
    c.head = p.head;
    c.hair = p.hair;
    c.hair_red = p.hair_red;
    c.hair_green = p.hair_green;
    c.hair_blue = p.hair_blue;
    c.prop_x = p.prop_x;
    c.prop_y = p.prop_y;
    c.name = p.name.to_vec();
}

fn to_guildcard_entry(e: &GuildcardEntry) -> pkt::GuildcardEntry {
    pkt::GuildcardEntry {
        guildcard: e.guildcard,
        name: Arr::<u16, 24>::from_str(&e.name),
        team_name: Arr::<u16, 16>::from_str(&e.team_name),
        description: Arr::<u16, 88>::from_str(&e.description),
        reserved: 0,
        language: e.language,
        section_id: e.section_id,
        char_class: e.char_class,
        padding: 0,
        comment: Arr::<u16, 88>::from_str(&e.comment),
    }
}

/// Serialize the guildcard file. Entries that don't fit are skipped.
fn guildcard_data(entries: &[GuildcardEntry]) -> Result<Vec<u8>> {
    let mut data = GuildcardData::default();
    for (dst, src) in data.entries.iter_mut().zip(entries) {
        *dst = to_guildcard_entry(src);
    }
    Ok(bincode::encode_to_vec(&data, bincode::config::legacy())?)
}
