// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = "psobb", version)]
pub struct Config {
    /// Bind address for all listeners
    #[arg(long, default_value = "0.0.0.0")]
    pub hostname: IpAddr,

    /// Address placed into redirect packets
    #[arg(long, default_value = "127.0.0.1")]
    pub external_ip: Ipv4Addr,

    /// Maximum number of live sessions across all endpoints
    #[arg(long, default_value_t = 30000)]
    pub max_connections: usize,

    #[arg(long, default_value_t = 11000)]
    pub patch_port: u16,
    #[arg(long, default_value_t = 11001)]
    pub data_port: u16,
    #[arg(long, default_value_t = 12000)]
    pub login_port: u16,
    #[arg(long, default_value_t = 12001)]
    pub character_port: u16,
    /// Block N listens on ship_port + N
    #[arg(long, default_value_t = 15000)]
    pub ship_port: u16,

    #[arg(long, default_value_t = 2)]
    pub num_blocks: u16,
    #[arg(long, default_value_t = 15)]
    pub num_lobbies: u32,

    /// Text on the patch screen
    #[arg(long, default_value = "")]
    pub welcome_message: String,
    /// Scrolling text on the ship select screen
    #[arg(long, default_value = "")]
    pub scroll_message: String,

    #[arg(long, default_value = "patches")]
    pub patch_dir: PathBuf,
    #[arg(long, default_value = "parameters")]
    pub parameters_dir: PathBuf,

    #[arg(long, default_value = "Ship 1")]
    pub ship_name: String,

    /// JSON snapshot of the account and character store.
    /// Without it, the store lives in memory only.
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Port of the liveness endpoint. Disabled if not set
    #[arg(long)]
    pub health_port: Option<u16>,

    /// Reject clients that don't echo back the login config magic
    #[arg(long)]
    pub strict_magic: bool,

    /// 420-byte default key configuration
    #[arg(long)]
    pub key_config: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_from(["psobb"])
    }
}

impl Config {
    /// Port of block `n`, counted from 1
    pub fn block_port(&self, n: u16) -> Option<u16> {
        self.ship_port.checked_add(n)
    }

    /// Reject option combinations clap can't check on its own
    pub fn validate(&self) -> Result<()> {
        if self.block_port(self.num_blocks).is_none() {
            bail!(
                "{} blocks don't fit above ship port {}",
                self.num_blocks,
                self.ship_port
            );
        }
        Ok(())
    }
}
