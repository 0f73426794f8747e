/*
 * Created on Fri Jan 26 2024
 *
 * This file is a part of qmd
 * qmd is the query manager that fronts the game world, login and web
 * services with a typed query protocol over a shared SQL store.
 *
 * Copyright (c) 2024, The qmd developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # Schema gate and patch runner
//!
//! The process refuses to start unless the stored schema version equals
//! [`SCHEMA_VERSION`]. For the embedded backend the process also owns the
//! store: it bootstraps the base schema into a fresh file and plays any
//! unapplied patch files from the configured patch directory in
//! lexicographic order, each inside its own transaction, recording applied
//! file names. The networked backend's schema is managed by its DBA; only
//! the version gate applies there.
//!
//! Flag columns are integers (0/1) and times are integer Unix seconds in
//! the embedded schema; a networked schema may use native TIMESTAMP/INET
//! types instead, the value layer converts either way. Name columns use a
//! case-insensitive collation (`NOCASE` here, a named collation on the
//! networked backend).

use {
    crate::{
        config::BackendConfig,
        db::{DbResult, Session, Value},
        util::error::{Error, QmResult},
    },
    std::{fs, path::Path},
};

/// The schema generation this build expects to find in the store
pub const SCHEMA_VERSION: u32 = 4;

const BASE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schema_info (
    version INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS applied_patches (
    name TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS worlds (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    pvp_type INTEGER NOT NULL DEFAULT 0,
    premium_only INTEGER NOT NULL DEFAULT 0,
    max_players INTEGER NOT NULL DEFAULT 1000
);
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    email TEXT NOT NULL DEFAULT '',
    password TEXT NOT NULL,
    premium_end INTEGER NOT NULL DEFAULT 0,
    final_warning INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    created INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS characters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    account_id INTEGER NOT NULL REFERENCES accounts(id),
    world_id INTEGER NOT NULL REFERENCES worlds(id),
    sex INTEGER NOT NULL DEFAULT 1,
    level INTEGER NOT NULL DEFAULT 1,
    vocation INTEGER NOT NULL DEFAULT 0,
    guild_title TEXT NOT NULL DEFAULT '',
    is_online INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    last_login INTEGER NOT NULL DEFAULT 0,
    last_logout INTEGER NOT NULL DEFAULT 0,
    created INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS character_rights (
    character_id INTEGER NOT NULL REFERENCES characters(id),
    right_name TEXT NOT NULL,
    PRIMARY KEY (character_id, right_name)
);
CREATE TABLE IF NOT EXISTS login_attempts (
    account_id INTEGER NOT NULL,
    ip INTEGER NOT NULL,
    host TEXT NOT NULL DEFAULT '',
    attempted_at INTEGER NOT NULL,
    failed INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS banishments (
    account_id INTEGER NOT NULL,
    gm_id INTEGER NOT NULL DEFAULT 0,
    reason TEXT NOT NULL DEFAULT '',
    banished_at INTEGER NOT NULL,
    banished_until INTEGER NOT NULL,
    permanent INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS notations (
    account_id INTEGER NOT NULL,
    gm_id INTEGER NOT NULL DEFAULT 0,
    reason TEXT NOT NULL DEFAULT '',
    noted_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS namelocks (
    character_id INTEGER NOT NULL,
    gm_id INTEGER NOT NULL DEFAULT 0,
    reason TEXT NOT NULL DEFAULT '',
    locked_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS statements (
    id INTEGER PRIMARY KEY,
    character_id INTEGER NOT NULL,
    world_id INTEGER NOT NULL,
    said_at INTEGER NOT NULL,
    channel TEXT NOT NULL DEFAULT '',
    statement TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS reported_statements (
    statement_id INTEGER NOT NULL,
    character_id INTEGER NOT NULL,
    gm_id INTEGER NOT NULL DEFAULT 0,
    reason TEXT NOT NULL DEFAULT '',
    reported_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS ip_banishments (
    ip INTEGER NOT NULL,
    gm_id INTEGER NOT NULL DEFAULT 0,
    reason TEXT NOT NULL DEFAULT '',
    banished_at INTEGER NOT NULL,
    banished_until INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS buddies (
    account_id INTEGER NOT NULL,
    buddy_id INTEGER NOT NULL,
    world_id INTEGER NOT NULL,
    PRIMARY KEY (account_id, buddy_id, world_id)
);
CREATE TABLE IF NOT EXISTS deaths (
    character_id INTEGER NOT NULL,
    died_at INTEGER NOT NULL,
    level INTEGER NOT NULL,
    killed_by TEXT NOT NULL,
    is_player INTEGER NOT NULL,
    unjustified INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS kill_statistics (
    world_id INTEGER NOT NULL,
    race TEXT NOT NULL,
    killed_players INTEGER NOT NULL DEFAULT 0,
    killed_by_players INTEGER NOT NULL DEFAULT 0,
    logged_at INTEGER NOT NULL,
    PRIMARY KEY (world_id, race)
);
CREATE TABLE IF NOT EXISTS online_characters (
    world_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    level INTEGER NOT NULL,
    vocation INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS houses (
    id INTEGER NOT NULL,
    world_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    rent INTEGER NOT NULL DEFAULT 0,
    guildhouse INTEGER NOT NULL DEFAULT 0,
    transfer_to INTEGER NOT NULL DEFAULT 0,
    transfer_price INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (id, world_id)
);
CREATE TABLE IF NOT EXISTS house_owners (
    house_id INTEGER NOT NULL,
    world_id INTEGER NOT NULL,
    owner_id INTEGER NOT NULL,
    paid_until INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (house_id, world_id)
);
CREATE TABLE IF NOT EXISTS auctions (
    house_id INTEGER NOT NULL,
    world_id INTEGER NOT NULL,
    bidder_id INTEGER NOT NULL DEFAULT 0,
    bid INTEGER NOT NULL DEFAULT 0,
    ends_at INTEGER NOT NULL,
    PRIMARY KEY (house_id, world_id)
);
CREATE TABLE IF NOT EXISTS guilds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    world_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    leader_id INTEGER NOT NULL
);
";

/// Prepare the store for this build: bootstrap + patches for the embedded
/// backend, then the version gate for every backend.
pub fn prepare_store(session: &mut Session, backend: &BackendConfig) -> QmResult<()> {
    if let BackendConfig::Sqlite { patch_dir, .. } = backend {
        bootstrap(session)?;
        if let Some(dir) = patch_dir {
            run_patches(session, dir)?;
        }
    }
    let found = stored_version(session)?;
    if found != SCHEMA_VERSION {
        return Err(Error::SchemaMismatch {
            expected: SCHEMA_VERSION,
            found,
        });
    }
    Ok(())
}

fn stored_version(session: &mut Session) -> DbResult<u32> {
    Ok(session
        .query_row("SELECT version FROM schema_info", &[])?
        .map(|r| r.uint(0))
        .unwrap_or(0))
}

fn bootstrap(session: &mut Session) -> DbResult<()> {
    session.batch(BASE_SCHEMA)?;
    if stored_version(session)? == 0 {
        session.execute(
            "INSERT INTO schema_info (version) VALUES (?)",
            &[Value::from(SCHEMA_VERSION as i64)],
        )?;
    }
    Ok(())
}

fn run_patches(session: &mut Session, dir: &str) -> QmResult<()> {
    let dir_path = Path::new(dir);
    if !dir_path.is_dir() {
        return Ok(());
    }
    let mut patches: Vec<String> = fs::read_dir(dir_path)
        .map_err(|e| Error::ioerror_extra(e, format!("reading patch directory {dir}")))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".sql"))
        .collect();
    patches.sort();
    for name in patches {
        let already = session
            .query_row(
                "SELECT 1 FROM applied_patches WHERE name = ?",
                &[Value::from(name.as_str())],
            )?
            .is_some();
        if already {
            continue;
        }
        let sql = fs::read_to_string(dir_path.join(&name))
            .map_err(|e| Error::ioerror_extra(e, format!("reading patch {name}")))?;
        let mut tx = session.transaction()?;
        tx.batch(&sql)?;
        tx.execute(
            "INSERT INTO applied_patches (name, applied_at) VALUES (?, ?)",
            &[
                Value::from(name.as_str()),
                Value::from(crate::util::unix_time()),
            ],
        )?;
        tx.commit()?;
        log::info!("Applied schema patch {name}");
    }
    Ok(())
}
