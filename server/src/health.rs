// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

//! Minimal HTTP liveness endpoint. Answers every request with the
//! number of live sessions.

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use smol::io::{AsyncReadExt, AsyncWriteExt};
use smol::Async;

use crate::registry::ConnectionRegistry;

pub async fn listen(tcp_listener: Async<TcpListener>, registry: Arc<ConnectionRegistry>) -> Result<()> {
    info!(
        "Listener: started on {}",
        tcp_listener.get_ref().local_addr()?
    );
    loop {
        let (stream, peer) = match tcp_listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!("HEALTH: accept failed: {err}");
                continue;
            }
        };
        let registry = registry.clone();
        smol::spawn(async move {
            if let Err(err) = respond(stream, &registry).await {
                warn!("HEALTH: {peer} error: {err}");
            }
        })
        .detach();
    }
}

async fn respond(mut stream: Async<TcpStream>, registry: &ConnectionRegistry) -> Result<()> {
    // the request itself doesn't matter
    let mut buf = [0u8; 1024];
    let _ = stream.read(&mut buf).await?;

    let body = format!("ok {}\n", registry.live_count());
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
