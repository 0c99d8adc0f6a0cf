// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

pub mod block;

use std::fmt::Display;
use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::{bail, Result};
use crypto::BbCipher;
use futures::{AsyncRead, AsyncWrite};
use log::{info, warn};
use packet::pkt_common::*;
use packet::pkt_ship::*;
use packet::{Arr, BbPacket};

use crate::args::Config;
use crate::auth;
use crate::dispatcher::{Endpoint, Flow, TcpSession};
use crate::session::Session;
use crate::ServerContext;

/// Title of the ship select menu
pub const SHIP_LIST_TITLE: &str = "Blue Burst";

/// Entry of the ship select menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ship {
    pub id: u32,
    pub name: String,
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl Ship {
    /// The ship endpoint running in this process
    pub fn local(cfg: &Config) -> Self {
        Self {
            id: 1,
            name: cfg.ship_name.clone(),
            addr: cfg.external_ip,
            port: cfg.ship_port,
        }
    }
}

pub fn ship_list(ships: &[Ship]) -> ShipList {
    let entries = ships
        .iter()
        .map(|ship| ShipMenuEntry {
            menu_id: SHIP_SELECTION_MENU_ID,
            ship_id: ship.id,
            padding: 0,
            ship_name: Arr::<u16, 18>::from_str(&ship.name),
        })
        .collect();
    ShipList::new(SHIP_LIST_TITLE, entries)
}

pub async fn send_ship_list<T>(session: &mut Session<T, BbCipher>, ships: &[Ship]) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    session
        .send_flagged(&ship_list(ships), ships.len() as u32)
        .await
}

/// Block select menu. The last entry goes back to the ship list.
pub fn block_list(ship_name: &str, num_blocks: u16) -> BlockList {
    let mut blocks: Vec<_> = (1..=num_blocks)
        .map(|i| BlockMenuEntry {
            unknown: 0x12,
            block_id: i.into(),
            padding: 0,
            block_name: Arr::<u16, 18>::from_str(&format!("BLOCK {i:02}")),
        })
        .collect();
    blocks.push(BlockMenuEntry {
        unknown: 0x08,
        block_id: BLOCK_BACK_ITEM_ID,
        padding: 0,
        block_name: Arr::<u16, 18>::from_str("Ship Selection"),
    });

    BlockList {
        padding: Default::default(),
        ship_name: Arr::<u16, 16>::from_str(&format!("1:{ship_name}")),
        unknown: 0x08,
        blocks: blocks.into(),
    }
}

/// Lets the player pick a block of the ship.
pub struct ShipEndpoint {
    ctx: Arc<ServerContext>,
    ships: Vec<Ship>,
    block_list: BlockList,
}

impl ShipEndpoint {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        let cfg = &ctx.config;
        let ships = vec![Ship::local(cfg)];
        let block_list = block_list(&cfg.ship_name, cfg.num_blocks);
        Self {
            ctx,
            ships,
            block_list,
        }
    }
}

impl Endpoint for ShipEndpoint {
    type Cipher = BbCipher;

    fn name(&self) -> &str {
        "SHIP"
    }

    async fn handle(self: Arc<Self>, session: TcpSession<BbCipher>) -> Result<()> {
        let mut conn = ShipConn {
            endpoint: &self,
            session,
        };
        conn.handle().await
    }
}

struct ShipConn<'a> {
    endpoint: &'a ShipEndpoint,
    session: TcpSession<BbCipher>,
}

impl Display for ShipConn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.session.fmt(f)
    }
}

impl ShipConn<'_> {
    async fn handle(&mut self) -> Result<()> {
        while let Some((_, p)) = self.session.recv::<BbPacket>().await? {
            let flow = match p {
                BbPacket::Login(p) => self.handle_login(p).await?,
                BbPacket::MenuSelection(p) => self.handle_menu_selection(p).await?,
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
        let num_entries = self.endpoint.block_list.blocks.len() as u32;
        self.session
            .send_flagged(&self.endpoint.block_list, num_entries)
            .await?;
        info!("{self}: {} entered the ship", player.username);
        Ok(Flow::Continue)
    }

    async fn handle_menu_selection(&mut self, sel: MenuSelection) -> Result<Flow> {
        if sel.menu_id == SHIP_SELECTION_MENU_ID || sel.item_id == BLOCK_BACK_ITEM_ID {
            send_ship_list(&mut self.session, &self.endpoint.ships).await?;
            return Ok(Flow::Continue);
        }

        let cfg = &self.endpoint.ctx.config;
        let (block, port) = match u16::try_from(sel.item_id) {
            Ok(block) if (1..=cfg.num_blocks).contains(&block) => match cfg.block_port(block) {
                Some(port) => (block, port),
                None => bail!("{self}: No port for block {block}"),
            },
            _ => bail!("{self}: Invalid block selection {}", sel.item_id),
        };
        self.session
            .send(&Redirect {
                ip_addr: cfg.external_ip.octets().into(),
                port,
                padding: 0,
            })
            .await?;
        info!("{self}: redirecting to block {block}");
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks() {
        let list = block_list("Ship 1", 2);
        assert_eq!(list.blocks.len(), 3);
        assert_eq!(list.blocks[0].block_id, 1);
        assert_eq!(list.blocks[1].block_name.to_string_lossy(), "BLOCK 02");
        assert_eq!(list.blocks[2].block_id, BLOCK_BACK_ITEM_ID);
        assert_eq!(list.blocks[2].unknown, 0x08);
        assert_eq!(list.ship_name.to_string_lossy(), "1:Ship 1");
    }

    #[test]
    fn ships() {
        let cfg = Config::default();
        let list = ship_list(&[Ship::local(&cfg)]);
        assert_eq!(list.server_name.to_string_lossy(), SHIP_LIST_TITLE);
        assert_eq!(list.entries.len(), 1);
        assert_eq!(list.entries[0].menu_id, SHIP_SELECTION_MENU_ID);
        assert_eq!(list.entries[0].ship_id, 1);
        assert_eq!(list.entries[0].ship_name.to_string_lossy(), "Ship 1");
    }
}
