// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

use std::fmt::Display;
use std::future::Future;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::FutureExt;
use log::{error, info, warn};
use smol::{Async, Timer};

use crate::registry::ConnectionRegistry;
use crate::session::{Handshake, Session};

/// How often a stalled accept loop checks for a free slot
const CAP_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub type TcpSession<C> = Session<Async<TcpStream>, C>;

/// What to do with the connection after handling a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The client was answered with an error and is expected to go away
    Close,
}

/// Per-endpoint connection handler.
pub trait Endpoint: Send + Sync + 'static {
    type Cipher: Handshake;

    /// Used in logs, e.g. "LOGIN"
    fn name(&self) -> &str;

    /// Drive a single connection after the welcome packet was sent.
    /// Returning ends the connection.
    fn handle(
        self: Arc<Self>,
        session: TcpSession<Self::Cipher>,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Accepts connections of a single endpoint.
pub struct Listener<E> {
    tcp_listener: Async<TcpListener>,
    endpoint: Arc<E>,
    registry: Arc<ConnectionRegistry>,
    max_connections: usize,
}

impl<E: Endpoint> Display for Listener<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.endpoint.name(), self.port())
    }
}

impl<E: Endpoint> Listener<E> {
    pub fn new(
        tcp_listener: Async<TcpListener>,
        endpoint: Arc<E>,
        registry: Arc<ConnectionRegistry>,
        max_connections: usize,
    ) -> Self {
        Self {
            tcp_listener,
            endpoint,
            registry,
            max_connections,
        }
    }

    pub fn port(&self) -> u16 {
        self.tcp_listener
            .get_ref()
            .local_addr()
            .map(|a| a.port())
            .unwrap_or_default()
    }

    pub async fn listen(self) -> Result<()> {
        info!(
            "Listener: started on {}",
            self.tcp_listener.get_ref().local_addr()?
        );
        let port = self.port();

        loop {
            while self.registry.live_count() >= self.max_connections {
                Timer::after(CAP_POLL_INTERVAL).await;
            }

            let (stream, peer) = match self.tcp_listener.accept().await {
                Ok(conn) => conn,
                Err(err) => {
                    warn!("{self}: accept failed: {err}");
                    continue;
                }
            };
            let Some(guard) = self.registry.try_register(port, peer.ip()) else {
                warn!("{self}: {peer} is already connected, rejecting");
                continue;
            };

            let endpoint = self.endpoint.clone();
            let name = self.to_string();
            // Give the connection handler its own background task
            smol::spawn(async move {
                info!("{name}: new connection from {peer}");
                let result = AssertUnwindSafe(Self::serve(endpoint, stream, peer))
                    .catch_unwind()
                    .await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => error!("{name}: {peer} error: {err:#}"),
                    Err(_) => error!("{name}: {peer} handler panicked"),
                }
                info!("{name}: closing {peer}");
                drop(guard);
            })
            .detach();
        }
    }

    async fn serve(endpoint: Arc<E>, stream: Async<TcpStream>, peer: SocketAddr) -> Result<()> {
        let label = format!("{}:{peer}", endpoint.name());
        let session = Session::<_, E::Cipher>::accept(stream, label)
            .await
            .with_context(|| format!("Handshake with {peer} failed"))?;
        endpoint.handle(session).await
    }
}
