// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

use std::fmt::Display;
use std::sync::Arc;

use anyhow::Result;
use crypto::BbCipher;
use log::{info, warn};
use packet::pkt_common::*;
use packet::pkt_ship::*;
use packet::BbPacket;

use crate::auth;
use crate::dispatcher::{Endpoint, Flow, TcpSession};
use crate::ServerContext;

/// `num_lobbies + 1` entries, counted from 0
pub fn lobby_list(num_lobbies: u32) -> LobbyList {
    let lobbies: Vec<_> = (0..=num_lobbies)
        .map(|lobby_id| LobbyMenuEntry {
            menu_id: LOBBY_MENU_ID,
            lobby_id,
            padding: 0,
        })
        .collect();
    LobbyList {
        lobbies: lobbies.into(),
    }
}

/// A single block. Only shows the lobby list for now.
pub struct BlockEndpoint {
    ctx: Arc<ServerContext>,
    name: String,
    lobby_list: LobbyList,
}

impl BlockEndpoint {
    /// `block` is counted from 1
    pub fn new(ctx: Arc<ServerContext>, block: u16) -> Self {
        let lobby_list = lobby_list(ctx.config.num_lobbies);
        Self {
            ctx,
            name: format!("BLOCK{block}"),
            lobby_list,
        }
    }
}

impl Endpoint for BlockEndpoint {
    type Cipher = BbCipher;

    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(self: Arc<Self>, session: TcpSession<BbCipher>) -> Result<()> {
        let mut conn = BlockConn {
            endpoint: &self,
            session,
        };
        conn.handle().await
    }
}

struct BlockConn<'a> {
    endpoint: &'a BlockEndpoint,
    session: TcpSession<BbCipher>,
}

impl Display for BlockConn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.session.fmt(f)
    }
}

impl BlockConn<'_> {
    async fn handle(&mut self) -> Result<()> {
        while let Some((_, p)) = self.session.recv::<BbPacket>().await? {
            let flow = match p {
                BbPacket::Login(p) => self.handle_login(p).await?,
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
        self.session
            .send_flagged(&self.endpoint.lobby_list, ctx.config.num_lobbies)
            .await?;
        info!("{self}: {} entered the block", player.username);
        Ok(Flow::Continue)
    }
}
