// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

#![allow(dead_code)]

use std::fs;
use std::net::{IpAddr, Ipv4Addr, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bincode::Decode;
use crypto::{BbCipher, PcCipher};
use packet::pkt_common::Login;
use packet::{Arr, Header, Payload};
use server::args::Config;
use server::character::params::PARAMETER_FILES;
use server::session::{Handshake, Session};
use server::store::{Account, MemoryStore};
use smol::{Async, Task, Timer};
use tempfile::TempDir;

pub type Client<C> = Session<Async<TcpStream>, C>;

pub const HELLO: &[u8] = b"hello";
pub const BIG_SIZE: usize = 30000;

/// Running server with its own ports and asset directories.
pub struct TestServer {
    pub config: Config,
    pub store: Arc<MemoryStore>,
    pub task: Task<anyhow::Result<()>>,
    _dir: TempDir,
}

impl TestServer {
    pub async fn stop(self) {
        self.task.cancel().await;
    }
}

pub fn big_file() -> Vec<u8> {
    (0..BIG_SIZE).map(|i| (i * 7 % 251) as u8).collect()
}

/// Fake parameter file contents
pub fn parameter_file(name: &str) -> Vec<u8> {
    match name {
        // long enough to span two chunks
        "ItemPMT.prs" => vec![0xAB; 0x7000],
        _ => name.as_bytes().repeat(3),
    }
}

/// Level table with the HP of each class set to 100 + class
pub fn level_table() -> Vec<u8> {
    let mut table = vec![0u8; 12 * 14 + 16];
    for class in 0..12 {
        let hp = 100 + class as u16;
        table[class * 14 + 6..class * 14 + 8].copy_from_slice(&hp.to_le_bytes());
    }
    table
}

/// PRS stream made of literal bytes only
pub fn prs_literal(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut ctrl_pos = 0;
    let mut nbits = 8;
    let mut put_bit = |out: &mut Vec<u8>, bit: bool| {
        if nbits == 8 {
            ctrl_pos = out.len();
            out.push(0);
            nbits = 0;
        }
        if bit {
            out[ctrl_pos] |= 1 << nbits;
        }
        nbits += 1;
    };
    for b in data {
        put_bit(&mut out, true);
        out.push(*b);
    }
    put_bit(&mut out, false);
    put_bit(&mut out, true);
    out.extend_from_slice(&[0, 0]);
    out
}

fn write_assets(root: &Path) {
    let patches = root.join("patches");
    fs::create_dir_all(patches.join("data")).unwrap();
    fs::write(patches.join("hello.txt"), HELLO).unwrap();
    fs::write(patches.join("data/big.bin"), big_file()).unwrap();

    let params = root.join("parameters");
    fs::create_dir_all(&params).unwrap();
    for name in PARAMETER_FILES {
        let data = match name {
            "PlyLevelTbl.prs" => prs_literal(&level_table()),
            _ => parameter_file(name),
        };
        fs::write(params.join(name), data).unwrap();
    }
}

/// Config with all ports derived from `base`
pub fn config(base: u16, root: &Path) -> Config {
    let mut config = Config::default();
    config.hostname = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.patch_port = base;
    config.data_port = base + 1;
    config.login_port = base + 2;
    config.character_port = base + 3;
    config.ship_port = base + 10;
    config.welcome_message = "Welcome".into();
    config.scroll_message = "Have fun".into();
    config.patch_dir = root.join("patches");
    config.parameters_dir = root.join("parameters");
    config
}

pub fn start_server(base: u16) -> TestServer {
    start_server_with(base, |_| {})
}

pub fn start_server_with(base: u16, f: impl FnOnce(&mut Config)) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    write_assets(dir.path());
    let mut config = config(base, dir.path());
    f(&mut config);

    let store = Arc::new(MemoryStore::new());
    store.upsert_account(Account::new("user", "pw", 42)).unwrap();

    let task = smol::spawn(server::run(config.clone(), store.clone()));
    TestServer {
        config,
        store,
        task,
        _dir: dir,
    }
}

pub async fn connect_timeout(port: u16) -> std::io::Result<Async<TcpStream>> {
    let mut attempts = 0;
    loop {
        let conn = Async::<TcpStream>::connect(([127, 0, 0, 1], port)).await;
        if conn.is_ok() {
            return conn;
        }

        attempts += 1;
        if attempts > 10 {
            return conn;
        }

        Timer::after(Duration::from_millis(75)).await;
    }
}

/// Connect and receive the welcome packet. Retries while the server
/// is starting up or still holds our previous connection.
pub async fn connect<C: Handshake>(port: u16) -> Client<C> {
    let mut attempts = 0;
    loop {
        let stream = connect_timeout(port).await.unwrap();
        match Session::<_, C>::connect(stream, format!("client:{port}")).await {
            Ok(session) => return session,
            Err(err) if attempts < 10 => {
                log::trace!("Handshake failed: {err}, retrying");
            }
            Err(err) => panic!("Can't connect to {port}: {err}"),
        }
        attempts += 1;
        Timer::after(Duration::from_millis(75)).await;
    }
}

pub async fn connect_bb(port: u16) -> Client<BbCipher> {
    connect(port).await
}

pub async fn connect_patch(port: u16) -> Client<PcCipher> {
    connect(port).await
}

/// Receive the next packet, which must be a `P`
pub async fn recv<P, C>(client: &mut Client<C>) -> (Header, P)
where
    P: Payload + Decode,
    C: Handshake,
{
    let (hdr, payload) = client
        .recv_frame()
        .await
        .unwrap()
        .expect("Connection closed unexpectedly");
    let p = P::deserialize_no_hdr(payload).unwrap();
    assert_eq!(
        hdr.id,
        p.id(),
        "Expected {}, got {hdr:x?}",
        std::any::type_name::<P>()
    );
    (hdr, p)
}

pub async fn expect<P, C>(client: &mut Client<C>) -> P
where
    P: Payload + Decode,
    C: Handshake,
{
    recv(client).await.1
}

/// The server must close the connection without sending anything else
pub async fn expect_closed<C: Handshake>(client: &mut Client<C>) {
    match client.recv_frame().await {
        Ok(None) | Err(_) => {}
        Ok(Some((hdr, _))) => panic!("Expected the connection to close, got {hdr:x?}"),
    }
}

pub fn login(username: &str, password: &str) -> Login {
    Login {
        username: Arr::<u8, 16>::from_str(username),
        password: Arr::<u8, 16>::from_str(password),
        ..Default::default()
    }
}
