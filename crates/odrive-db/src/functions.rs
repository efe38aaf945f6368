//! Application functions callable from SQL.
//!
//! - `od_change_token(id, change_count, modified_date)` mints change tokens
//!   from triggers.
//! - `od_apply_passphrase(master_key, iv, data)` wraps and unwraps file keys.
//! - `od_permission_mac(master_key, iv, grantee, c, r, u, d, s, encrypt_key)`
//!   computes permission MACs.
//!
//! Each delegates to `odrive-crypto`, so SQL-side rotation and visibility
//! checks produce the same bytes as the application. NULL in any argument
//! yields NULL.

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::Connection;

use odrive_crypto::keys::MasterKey;

use crate::Result;

/// Register every application function on `conn`.
pub fn register(conn: &Connection) -> Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8
        | FunctionFlags::SQLITE_DETERMINISTIC
        | FunctionFlags::SQLITE_INNOCUOUS;

    conn.create_scalar_function("od_change_token", 3, flags, |ctx| {
        let id: Option<Vec<u8>> = ctx.get(0)?;
        let count: Option<i64> = ctx.get(1)?;
        let modified: Option<i64> = ctx.get(2)?;
        Ok(match (id, count, modified) {
            (Some(id), Some(count), Some(modified)) => Some(
                odrive_crypto::digest::change_token(&id, count, modified),
            ),
            _ => None,
        })
    })?;

    conn.create_scalar_function("od_apply_passphrase", 3, flags, |ctx| {
        let (Some(master), Some(iv), Some(data)) = (blob(ctx, 0)?, blob(ctx, 1)?, blob(ctx, 2)?)
        else {
            return Ok(None);
        };
        let master = master_key(master)?;
        odrive_crypto::passphrase::apply_passphrase(&master, &iv, &data)
            .map(Some)
            .map_err(user_error)
    })?;

    conn.create_scalar_function("od_permission_mac", 9, flags, |ctx| {
        let (Some(master), Some(iv), Some(key)) = (blob(ctx, 0)?, blob(ctx, 1)?, blob(ctx, 8)?)
        else {
            return Ok(None);
        };
        let Some(grantee) = ctx.get::<Option<String>>(2)? else {
            return Ok(None);
        };
        let mut cruds = [false; 5];
        for (i, flag) in cruds.iter_mut().enumerate() {
            *flag = ctx.get::<Option<bool>>(3 + i)?.unwrap_or(false);
        }
        let master = master_key(master)?;
        odrive_crypto::mac::do_mac(&master, &iv, &grantee, cruds, &key)
            .map(|mac| Some(mac.to_vec()))
            .map_err(user_error)
    })?;

    Ok(())
}

fn blob(ctx: &Context<'_>, idx: usize) -> rusqlite::Result<Option<Vec<u8>>> {
    ctx.get::<Option<Vec<u8>>>(idx)
}

fn master_key(bytes: Vec<u8>) -> rusqlite::Result<MasterKey> {
    MasterKey::new(bytes).map_err(user_error)
}

fn user_error(e: odrive_crypto::CryptoError) -> rusqlite::Error {
    rusqlite::Error::UserFunctionError(Box::new(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use odrive_crypto::keys::{create_key, create_permission_iv};
    use odrive_crypto::{digest, mac, passphrase};

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        register(&conn).expect("register");
        conn
    }

    #[test]
    fn test_sql_apply_passphrase_matches_application() {
        let conn = conn();
        let master = MasterKey::from_passphrase("master").expect("master");
        let iv = create_permission_iv();
        let key = create_key();
        let expected = passphrase::wrap_file_key(&master, &iv, &key).expect("wrap");
        let from_sql: Vec<u8> = conn
            .query_row(
                "SELECT od_apply_passphrase(?1, ?2, ?3)",
                rusqlite::params![master.as_bytes(), iv.as_slice(), key.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(from_sql, expected);
    }

    #[test]
    fn test_sql_mac_matches_application() {
        let conn = conn();
        let master = MasterKey::from_passphrase("master").expect("master");
        let iv = [3u8; 32];
        let key = [4u8; 32];
        let expected = mac::do_mac(&master, &iv, "cnbob", [false, true, false, false, true], &key)
            .expect("mac");
        let from_sql: Vec<u8> = conn
            .query_row(
                "SELECT od_permission_mac(?1, ?2, 'cnbob', 0, 1, 0, 0, 1, ?3)",
                rusqlite::params![master.as_bytes(), iv.as_slice(), key.as_slice()],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(from_sql, expected.to_vec());
    }

    #[test]
    fn test_sql_change_token_matches_application() {
        let conn = conn();
        let id = [9u8; 16];
        let token: String = conn
            .query_row(
                "SELECT od_change_token(?1, 2, 1000)",
                [id.as_slice()],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(token, digest::change_token(&id, 2, 1000));
    }

    #[test]
    fn test_null_arguments_yield_null() {
        let conn = conn();
        let mac: Option<Vec<u8>> = conn
            .query_row(
                "SELECT od_permission_mac(x'01', NULL, 'g', 1, 1, 1, 1, 1, x'02')",
                [],
                |row| row.get(0),
            )
            .expect("query");
        assert!(mac.is_none());
        let wrapped: Option<Vec<u8>> = conn
            .query_row("SELECT od_apply_passphrase(x'01', x'02', NULL)", [], |row| {
                row.get(0)
            })
            .expect("query");
        assert!(wrapped.is_none());
    }

    #[test]
    fn test_empty_master_key_is_error() {
        let conn = conn();
        let result: rusqlite::Result<Option<Vec<u8>>> = conn.query_row(
            "SELECT od_apply_passphrase(x'', x'02', x'03')",
            [],
            |row| row.get(0),
        );
        assert!(result.is_err());
    }
}
