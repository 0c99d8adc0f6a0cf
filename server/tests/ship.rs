// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

mod common;

use common::*;
use packet::pkt_common::*;
use packet::pkt_ship::*;
use packet::Arr;
use smol::io::{AsyncReadExt, AsyncWriteExt};

fn echoed_config() -> Arr<u8, 40> {
    let config = ClientConfig {
        magic: CLIENT_CONFIG_MAGIC,
        char_selected: 1,
        ..Default::default()
    };
    let bytes = bincode::encode_to_vec(&config, bincode::config::legacy()).unwrap();
    Arr::<u8, 40>::from_bytes(&bytes)
}

#[test]
fn block_selection() {
    server::setup_log(true);

    smol::block_on(async {
        let server = start_server(32200);
        let cfg = &server.config;
        let mut client = connect_bb(cfg.ship_port).await;

        client.send(&login("user", "pw")).await.unwrap();
        let security = expect::<Security, _>(&mut client).await;
        assert_eq!(security.error, LoginError::None);
        let (hdr, blocks) = recv::<BlockList, _>(&mut client).await;
        assert_eq!(hdr.flags, 3);
        assert_eq!(blocks.blocks.len(), 3);
        assert_eq!(blocks.blocks[0].block_name.to_string_lossy(), "BLOCK 01");
        assert_eq!(blocks.blocks[2].block_id, BLOCK_BACK_ITEM_ID);

        client
            .send(&MenuSelection {
                unknown: 0,
                menu_id: 0x12,
                item_id: 2,
            })
            .await
            .unwrap();
        let redirect = expect::<Redirect, _>(&mut client).await;
        assert_eq!(*redirect.ip_addr, [127, 0, 0, 1]);
        assert_eq!(redirect.port, cfg.ship_port + 2);

        // back to the ship list
        client
            .send(&MenuSelection {
                unknown: 0,
                menu_id: 0x12,
                item_id: BLOCK_BACK_ITEM_ID,
            })
            .await
            .unwrap();
        let (hdr, ships) = recv::<ShipList, _>(&mut client).await;
        assert_eq!(hdr.flags, 1);
        assert_eq!(ships.entries.len(), 1);

        client
            .send(&MenuSelection {
                unknown: 0,
                menu_id: 0x12,
                item_id: 3,
            })
            .await
            .unwrap();
        expect_closed(&mut client).await;

        server.stop().await;
    });
}

#[test]
fn block_lobbies() {
    server::setup_log(true);

    smol::block_on(async {
        let server = start_server(32300);
        let mut client = connect_bb(server.config.block_port(1).unwrap()).await;

        client.send(&login("user", "pw")).await.unwrap();
        expect::<Security, _>(&mut client).await;
        let (hdr, list) = recv::<LobbyList, _>(&mut client).await;
        assert_eq!(hdr.flags, 15);
        assert_eq!(list.lobbies.len(), 16);
        assert_eq!(list.lobbies[15].lobby_id, 15);
        assert_eq!(list.lobbies[15].menu_id, LOBBY_MENU_ID);

        // the second block has its own listener
        let mut client = connect_bb(server.config.block_port(2).unwrap()).await;
        client.send(&login("user", "wrong")).await.unwrap();
        let security = expect::<Security, _>(&mut client).await;
        assert_eq!(security.error, LoginError::Password);

        server.stop().await;
    });
}

#[test]
fn strict_magic() {
    server::setup_log(true);

    smol::block_on(async {
        let server = start_server_with(32400, |cfg| cfg.strict_magic = true);
        let port = server.config.ship_port;

        let mut client = connect_bb(port).await;
        client.send(&login("user", "pw")).await.unwrap();
        let security = expect::<Security, _>(&mut client).await;
        assert_eq!(security.error, LoginError::Unknown);
        expect_closed(&mut client).await;

        let mut client = connect_bb(port).await;
        let mut login = login("user", "pw");
        login.security = echoed_config();
        client.send(&login).await.unwrap();
        let security = expect::<Security, _>(&mut client).await;
        assert_eq!(security.error, LoginError::None);
        assert_eq!(security.config.char_selected, 1);
        expect::<BlockList, _>(&mut client).await;

        server.stop().await;
    });
}

#[test]
fn health_reports_sessions() {
    server::setup_log(true);

    smol::block_on(async {
        let server = start_server_with(32500, |cfg| cfg.health_port = Some(32519));
        let _client = connect_bb(server.config.ship_port).await;

        let mut stream = connect_timeout(32519).await.unwrap();
        stream.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with("ok 1\n"), "{response}");

        server.stop().await;
    });
}
