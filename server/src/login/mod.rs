// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

use std::fmt::Display;
use std::sync::Arc;

use anyhow::Result;
use crypto::BbCipher;
use log::{info, warn};
use packet::pkt_common::*;
use packet::BbPacket;

use crate::auth::{self, security_error, CLIENT_VERSION};
use crate::dispatcher::{Endpoint, Flow, TcpSession};
use crate::ServerContext;

/// First Blue Burst endpoint. Authenticates the client and sends it
/// to the character endpoint.
pub struct LoginEndpoint {
    ctx: Arc<ServerContext>,
}

impl LoginEndpoint {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }
}

impl Endpoint for LoginEndpoint {
    type Cipher = BbCipher;

    fn name(&self) -> &str {
        "LOGIN"
    }

    async fn handle(self: Arc<Self>, session: TcpSession<BbCipher>) -> Result<()> {
        let mut conn = LoginConn {
            ctx: &self.ctx,
            session,
        };
        conn.handle().await
    }
}

struct LoginConn<'a> {
    ctx: &'a ServerContext,
    session: TcpSession<BbCipher>,
}

impl Display for LoginConn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.session.fmt(f)
    }
}

impl LoginConn<'_> {
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
        let store = self.ctx.store.as_ref();
        let Some(mut player) = auth::verify_account(&mut self.session, store, &login).await?
        else {
            return Ok(Flow::Close);
        };

        // A returning client echoes the config from its previous visit,
        // a new one sends the version string in its place.
        if player.config.magic != CLIENT_CONFIG_MAGIC {
            let version = login.security.trimmed();
            if !version.is_empty() && version != CLIENT_VERSION.as_bytes() {
                info!(
                    "{self}: unsupported client version {:?}",
                    String::from_utf8_lossy(version)
                );
                self.session.send(&security_error(LoginError::Patch)).await?;
                return Ok(Flow::Close);
            }
            player.config = ClientConfig::default();
        }
        player.config.magic = CLIENT_CONFIG_MAGIC;

        let cfg = &self.ctx.config;
        self.session.send(&player.security()).await?;
        self.session
            .send(&Redirect {
                ip_addr: cfg.external_ip.octets().into(),
                port: cfg.character_port,
                padding: 0,
            })
            .await?;
        info!(
            "{self}: {} logged in, redirecting to {}:{}",
            player.username, cfg.external_ip, cfg.character_port
        );
        Ok(Flow::Continue)
    }
}
