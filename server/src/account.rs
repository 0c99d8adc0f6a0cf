// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

//! Account management for the JSON store. The server should be stopped
//! while this runs, as it would overwrite the changes.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use server::store::{Account, MemoryStore};

#[derive(Parser, Debug)]
#[clap(name = "psobb_account", version)]
struct Args {
    /// JSON snapshot used by the server's --store
    #[arg(long)]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account, or reset the password of an existing one
    Add {
        username: String,
        password: String,
        /// Defaults to one above the highest guildcard in use
        #[arg(long)]
        guildcard: Option<u32>,
        #[arg(long, default_value_t = 0)]
        team_id: u32,
        #[arg(long)]
        gm: bool,
    },
    Ban {
        username: String,
    },
    Unban {
        username: String,
    },
    Deactivate {
        username: String,
    },
    List,
}

/// First guildcard handed out
const FIRST_GUILDCARD: u32 = 10_000_000;

fn main() -> Result<()> {
    server::setup_log(false);
    let args = Args::parse();
    let store = MemoryStore::open(&args.store)?;

    match args.command {
        Command::Add {
            username,
            password,
            guildcard,
            team_id,
            gm,
        } => {
            let accounts = store.accounts();
            let existing = accounts.iter().find(|a| a.username == username);
            let guildcard = match (guildcard, existing) {
                (Some(gc), _) => gc,
                (None, Some(account)) => account.guildcard,
                (None, None) => accounts
                    .iter()
                    .map(|a| a.guildcard.saturating_add(1))
                    .max()
                    .unwrap_or(FIRST_GUILDCARD)
                    .max(FIRST_GUILDCARD),
            };
            if let Some(other) = accounts
                .iter()
                .find(|a| a.guildcard == guildcard && a.username != username)
            {
                bail!("Guildcard {guildcard} already belongs to {}", other.username);
            }

            let mut account = Account::new(&username, &password, guildcard);
            account.team_id = team_id;
            account.gm = gm;
            store.upsert_account(account)?;
            println!("{username}: guildcard {guildcard}");
        }
        Command::Ban { username } => set(&store, &username, |a| a.banned = true)?,
        Command::Unban { username } => set(&store, &username, |a| a.banned = false)?,
        Command::Deactivate { username } => set(&store, &username, |a| a.active = false)?,
        Command::List => {
            for a in store.accounts() {
                println!(
                    "{:16} {:>10} team={} gm={} banned={} active={}",
                    a.username, a.guildcard, a.team_id, a.gm, a.banned, a.active
                );
            }
        }
    }
    Ok(())
}

fn set(store: &MemoryStore, username: &str, f: impl FnOnce(&mut Account)) -> Result<()> {
    if !store.modify_account(username, f)? {
        bail!("No such account: {username}");
    }
    Ok(())
}
