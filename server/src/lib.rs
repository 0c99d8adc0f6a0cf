// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

pub mod args;
pub mod auth;
pub mod character;
pub mod dispatcher;
pub mod health;
pub mod login;
pub mod patch;
pub mod prs;
pub mod registry;
pub mod session;
pub mod ship;
pub mod store;

use std::net::TcpListener;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, LevelFilter};
use smol::{Async, Task};

use args::Config;
use character::CharacterEndpoint;
use dispatcher::{Endpoint, Listener};
use login::LoginEndpoint;
use patch::{data::DataEndpoint, index::PatchIndex, PatchEndpoint};
use registry::ConnectionRegistry;
use ship::{block::BlockEndpoint, ShipEndpoint};
use store::Store;

pub fn setup_log(is_test: bool) {
    let timestamp_fmt = match is_test {
        false => Some(env_logger::fmt::TimestampPrecision::Millis),
        true => None,
    };

    // tests may call this more than once
    let _ = env_logger::Builder::new()
        .filter_module("polling", LevelFilter::Info)
        .filter_module("async_io", LevelFilter::Info)
        .parse_default_env()
        .format_timestamp(timestamp_fmt)
        .is_test(is_test)
        .try_init();
}

/// State shared by all endpoints. Immutable except for the store
/// and the registry, which synchronize internally.
pub struct ServerContext {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub registry: Arc<ConnectionRegistry>,
}

impl ServerContext {
    pub fn new(config: Config, store: Arc<dyn Store>) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            registry: ConnectionRegistry::new(),
        })
    }

    fn bind(&self, port: u16) -> Result<Async<TcpListener>> {
        Async::<TcpListener>::bind((self.config.hostname, port))
            .with_context(|| format!("Cannot bind to {}:{port}", self.config.hostname))
    }

    fn spawn_listener<E: Endpoint>(&self, port: u16, endpoint: E) -> Result<Task<Result<()>>> {
        let listener = Listener::new(
            self.bind(port)?,
            Arc::new(endpoint),
            self.registry.clone(),
            self.config.max_connections,
        );
        Ok(smol::spawn(listener.listen()))
    }
}

/// Load all assets, start every listener and run until one of them fails.
pub async fn run(config: Config, store: Arc<dyn Store>) -> Result<()> {
    config.validate()?;
    let ctx = ServerContext::new(config, store);
    let cfg = &ctx.config;

    info!("Loading patches from {:?}", cfg.patch_dir);
    let patch_index = PatchIndex::build(&cfg.patch_dir)?;
    let character = CharacterEndpoint::load(ctx.clone())?;

    let mut tasks = vec![
        ctx.spawn_listener(cfg.patch_port, PatchEndpoint::new(ctx.clone()))?,
        ctx.spawn_listener(cfg.data_port, DataEndpoint::new(patch_index))?,
        ctx.spawn_listener(cfg.login_port, LoginEndpoint::new(ctx.clone()))?,
        ctx.spawn_listener(cfg.character_port, character)?,
        ctx.spawn_listener(cfg.ship_port, ShipEndpoint::new(ctx.clone()))?,
    ];
    for block in 1..=cfg.num_blocks {
        let endpoint = BlockEndpoint::new(ctx.clone(), block);
        let port = cfg
            .block_port(block)
            .with_context(|| format!("No port for block {block}"))?;
        tasks.push(ctx.spawn_listener(port, endpoint)?);
    }
    if let Some(port) = cfg.health_port {
        let sock = ctx.bind(port)?;
        tasks.push(smol::spawn(health::listen(sock, ctx.registry.clone())));
    }

    // the listeners only return on failure
    let (result, _, _) = futures::future::select_all(tasks).await;
    result
}
