// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

// Binary part of the application.
// Everything else is in lib.rs so it can be unit tested.

use std::sync::Arc;

use clap::Parser;
use log::error;
use server::setup_log;
use server::store::{MemoryStore, Store};

fn main() {
    setup_log(false);

    let args = server::args::Config::parse();
    let store = match &args.store {
        Some(path) => match MemoryStore::open(path) {
            Ok(store) => store,
            Err(err) => {
                error!("Cannot open store {path:?}: {err}");
                std::process::exit(1);
            }
        },
        None => MemoryStore::new(),
    };
    let store: Arc<dyn Store> = Arc::new(store);

    if let Err(err) = smol::block_on(server::run(args, store)) {
        error!("{err:#}");
        std::process::exit(1);
    }
}
