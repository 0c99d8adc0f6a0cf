// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

//! Account verification shared by the Blue Burst endpoints.

use anyhow::Result;
use crypto::BbCipher;
use futures::{AsyncRead, AsyncWrite};
use log::{error, info};
use packet::pkt_common::*;

use crate::dispatcher::Flow;
use crate::session::Session;
use crate::store::{hash_password, Store, StoreError};

pub const DB_ERROR_MESSAGE: &str = "Encountered an unexpected error while accessing the \
     database.\n\nPlease contact your server administrator.";

/// Version string sent by the supported client on its first login
pub const CLIENT_VERSION: &str = "TethVer12510";

/// An authenticated player.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Player {
    pub username: String,
    pub guildcard: u32,
    pub team_id: u32,
    pub gm: bool,
    /// Last config sent to the client. It's echoed back on the next login
    pub config: ClientConfig,
}

impl Player {
    pub fn security(&self) -> Security {
        Security {
            error: LoginError::None,
            player_tag: PLAYER_TAG,
            guildcard: self.guildcard,
            team_id: self.team_id,
            config: self.config.clone(),
            capabilities: CAPABILITIES,
        }
    }
}

pub fn security_error(error: LoginError) -> Security {
    Security {
        error,
        player_tag: PLAYER_TAG,
        capabilities: CAPABILITIES,
        ..Default::default()
    }
}

/// Tell the client about a failed store access. The session should be
/// closed afterwards.
pub async fn report_store_error<T>(
    session: &mut Session<T, BbCipher>,
    err: StoreError,
) -> Result<Flow>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    error!("{session}: {err}");
    session.send(&ClientMessage::new(DB_ERROR_MESSAGE)).await?;
    Ok(Flow::Close)
}

/// Check the credentials of `login`. On failure the client is sent the
/// matching error and `None` is returned. The player's config is the
/// one echoed by the client.
pub async fn verify_account<T>(
    session: &mut Session<T, BbCipher>,
    store: &dyn Store,
    login: &Login,
) -> Result<Option<Player>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let username = login.username();
    let password = hash_password(login.password.trimmed());

    let account = match store.find_account(&username) {
        Ok(Some(account)) if account.password == password => account,
        Ok(_) => {
            info!("{session}: invalid credentials for {username:?}");
            session.send(&security_error(LoginError::Password)).await?;
            return Ok(None);
        }
        Err(err) => {
            report_store_error(session, err).await?;
            return Ok(None);
        }
    };

    if account.banned {
        info!("{session}: account {username:?} is banned");
        session.send(&security_error(LoginError::Banned)).await?;
        return Ok(None);
    }
    if !account.active {
        info!("{session}: account {username:?} is not active");
        session.send(&ClientMessage::new(DB_ERROR_MESSAGE)).await?;
        return Ok(None);
    }

    Ok(Some(Player {
        username,
        guildcard: account.guildcard,
        team_id: account.team_id,
        gm: account.gm,
        config: ClientConfig::from_security(&login.security).unwrap_or_default(),
    }))
}

/// With `strict`, reject clients that didn't go through the login
/// endpoint first. Returns false if the client was rejected.
pub async fn check_magic<T>(
    session: &mut Session<T, BbCipher>,
    player: &Player,
    strict: bool,
) -> Result<bool>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    if strict && player.config.magic != CLIENT_CONFIG_MAGIC {
        info!(
            "{session}: unexpected config magic {:#010x}",
            player.config.magic
        );
        session.send(&security_error(LoginError::Unknown)).await?;
        return Ok(false);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Account, MemoryStore};
    use crypto::Cipher;
    use futures::io::Cursor;
    use packet::Arr;

    fn login(username: &str, password: &str) -> Login {
        Login {
            username: Arr::<u8, 16>::from_str(username),
            password: Arr::<u8, 16>::from_str(password),
            ..Default::default()
        }
    }

    fn session() -> Session<Cursor<Vec<u8>>, BbCipher> {
        let key = [7u8; 48];
        Session::new(
            Cursor::new(Vec::new()),
            "test".into(),
            BbCipher::new(&key),
            BbCipher::new(&key),
        )
    }

    /// Decrypt everything the session sent so far
    fn sent(session: Session<Cursor<Vec<u8>>, BbCipher>) -> Vec<u8> {
        let mut bytes = session.stream.into_inner();
        BbCipher::new(&[7u8; 48]).decrypt(&mut bytes);
        bytes
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.upsert_account(Account::new("user", "pw", 42)).unwrap();
        let mut banned = Account::new("banned", "pw", 43);
        banned.banned = true;
        store.upsert_account(banned).unwrap();
        let mut inactive = Account::new("inactive", "pw", 44);
        inactive.active = false;
        store.upsert_account(inactive).unwrap();
        store
    }

    #[test]
    fn accepted() {
        let store = store();
        let mut session = session();
        let mut pkt = login("user", "pw");
        pkt.security = Arr::<u8, 40>::from_bytes(&[0x67, 0x54, 0x61, 0x48, 1, 3]);

        let player = smol::block_on(verify_account(&mut session, &store, &pkt))
            .unwrap()
            .unwrap();
        assert_eq!(player.guildcard, 42);
        assert_eq!(player.config.magic, CLIENT_CONFIG_MAGIC);
        assert_eq!((player.config.char_selected, player.config.slot_num), (1, 3));
        assert!(sent(session).is_empty());
    }

    #[test]
    fn rejected() {
        let store = store();
        for (username, password, id, code) in [
            ("user", "wrong", 0xE6, Some(0x2)),
            ("nobody", "pw", 0xE6, Some(0x2)),
            ("banned", "pw", 0xE6, Some(0x6)),
            ("inactive", "pw", 0x1A, None),
        ] {
            let mut session = session();
            let pkt = login(username, password);
            let player = smol::block_on(verify_account(&mut session, &store, &pkt)).unwrap();
            assert!(player.is_none());

            let bytes = sent(session);
            assert_eq!(bytes[2], id, "{username}");
            if let Some(code) = code {
                assert_eq!(&bytes[8..12], &[code, 0, 0, 0], "{username}");
            }
        }
    }

    #[test]
    fn strict_magic() {
        let mut player = Player::default();
        let mut session = session();
        assert!(smol::block_on(check_magic(&mut session, &player, false)).unwrap());
        assert!(!smol::block_on(check_magic(&mut session, &player, true)).unwrap());
        player.config.magic = CLIENT_CONFIG_MAGIC;
        assert!(smol::block_on(check_magic(&mut session, &player, true)).unwrap());

        let bytes = sent(session);
        assert_eq!(bytes.len(), 0x44);
        assert_eq!(&bytes[8..12], &[0x1, 0, 0, 0]);
    }
}
