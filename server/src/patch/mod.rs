// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

//! Patch and data endpoints. The patch endpoint only greets the
//! client and sends it to the data endpoint, which synchronizes the
//! client files with the patch tree.

pub mod data;
pub mod index;

use std::sync::Arc;

use anyhow::Result;
use crypto::PcCipher;
use log::{info, warn};
use packet::pkt_patch::{PatchAck, PatchMessage, PatchRedirect};
use packet::PatchPacket;

use crate::dispatcher::{Endpoint, TcpSession};
use crate::ServerContext;

/// Send the login acknowledgement unless it was sent already.
///
/// Stock clients reply to the welcome packet before logging in and
/// expect the acknowledgement right then, others just log in.
async fn ack_once(session: &mut TcpSession<PcCipher>, acked: &mut bool) -> Result<()> {
    if !*acked {
        session.send(&PatchAck {}).await?;
        *acked = true;
    }
    Ok(())
}

pub struct PatchEndpoint {
    ctx: Arc<ServerContext>,
}

impl PatchEndpoint {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }
}

impl Endpoint for PatchEndpoint {
    type Cipher = PcCipher;

    fn name(&self) -> &str {
        "PATCH"
    }

    async fn handle(self: Arc<Self>, mut session: TcpSession<PcCipher>) -> Result<()> {
        let cfg = &self.ctx.config;
        let mut acked = false;

        while let Some((_, p)) = session.recv::<PatchPacket>().await? {
            match p {
                PatchPacket::PatchWelcomeReply(_) => {
                    ack_once(&mut session, &mut acked).await?;
                }
                PatchPacket::PatchLogin(_) => {
                    ack_once(&mut session, &mut acked).await?;
                    session
                        .send(&PatchMessage::new(&cfg.welcome_message))
                        .await?;
                    session
                        .send(&PatchRedirect::new(
                            cfg.external_ip.octets(),
                            cfg.data_port,
                        ))
                        .await?;
                    info!(
                        "{session}: redirecting to the data server at {}:{}",
                        cfg.external_ip, cfg.data_port
                    );
                }
                p => {
                    warn!("{session}: ignoring unexpected packet {p:?}");
                }
            }
        }
        Ok(())
    }
}
