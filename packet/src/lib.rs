// SPDX-License-Identifier: MIT
// Copyright(c) 2023 Darek Stojaczyk

// Rust-analyzer complains at the assert_def_packet_size! definition
#![allow(clippy::items_after_test_module)]

mod helper_types;
pub use helper_types::*;

mod types;
pub use types::*;

pub mod pkt_common;
pub mod pkt_login;
pub mod pkt_patch;
pub mod pkt_ship;

mod packets;
pub use packets::*;
