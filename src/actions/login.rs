/*
 * Created on Thu Feb 15 2024
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

//! Connection authorization and account authentication.

use {
    super::{done, parsed, sha256_hex, ActionCtx, ActionResult},
    crate::{protocol::PayloadBuf, queryengine::Role, util},
};

/// `LoginAccount` logical error codes
mod ec {
    /// Unknown account, deleted account or wrong password
    pub const INVALID_CREDENTIALS: u8 = 1;
    /// An account banishment is in effect
    pub const BANISHED: u8 = 2;
    /// The peer address is banished
    pub const IP_BANISHED: u8 = 3;
}

/// The worker half of the `Login` opcode. Only game-role logins reach a
/// worker (the other roles are answered inline by the connection): the
/// shared secret was already checked, what is left is resolving the world
/// name and stamping the query with the world id.
///
/// Request: `u8 role`, `string password`, `string worldName`.
/// Reply: status only - `Ok`, or `Failed` (the connection closes on it).
pub fn login(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let role = r.u8();
    let password = r.string();
    let world_name = r.string();
    parsed(&r)?;
    if Role::from_raw(role) != Some(Role::Game) || password != ctx.cfg.password {
        buf.respond_failed();
        return Ok(());
    }
    match ctx.db.world_id_by_name(&world_name)? {
        Some(world_id) => {
            ctx.query.set_world_id(world_id);
            let w = buf.respond_ok();
            done(w)
        }
        None => {
            log::info!("game login refused: unknown world {world_name}");
            buf.respond_failed();
            Ok(())
        }
    }
}

struct AccountLogin {
    premium_end: u32,
    characters: Vec<crate::db::CharacterListEntry>,
}

/// The credential and banishment checks run inside one transaction scope;
/// the attempt row is deliberately written after the scope closes so a
/// rollback can never erase the audit trail.
fn authenticate(
    ctx: &mut ActionCtx<'_>,
    account_id: u32,
    digest: &str,
    ip: u32,
    now: u32,
) -> ActionResult<Result<AccountLogin, u8>> {
    let mut tx = ctx.db.transaction()?;
    let auth = match tx.account_auth(account_id)? {
        Some(auth) if !auth.deleted && auth.password_digest == digest => auth,
        _ => return Ok(Err(ec::INVALID_CREDENTIALS)),
    };
    if tx.ip_banished(ip, now)? {
        return Ok(Err(ec::IP_BANISHED));
    }
    if tx.active_banishment(account_id, now)?.is_some() {
        return Ok(Err(ec::BANISHED));
    }
    let characters = tx.account_characters(account_id)?;
    tx.commit()?;
    Ok(Ok(AccountLogin {
        premium_end: auth.premium_end,
        characters,
    }))
}

/// `LoginAccount`: the login server authenticates a player account.
///
/// Request: `u32 accountId`, `string password`, `u32BE ip`.
/// Reply `Ok`: `u32 premiumEnd`, `u16 count`, then per character
/// `string name`, `string world`, `u16 level`, `bool online`.
/// Errors: see [`ec`].
pub fn login_account(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let account_id = r.u32();
    let password = r.string();
    let ip = r.u32_be();
    parsed(&r)?;
    let now = util::unix_time();
    let digest = sha256_hex(&password);
    let verdict = authenticate(ctx, account_id, &digest, ip, now)?;
    let host = ctx.hosts.resolve(ip);
    ctx.db
        .record_login_attempt(account_id, ip, &host, now, verdict.is_err())?;
    match verdict {
        Ok(login) => {
            let mut w = buf.respond_ok();
            w.put_u32(login.premium_end);
            w.put_u16(login.characters.len() as u16);
            for ch in &login.characters {
                w.put_string(&ch.name);
                w.put_string(&ch.world);
                w.put_u16(ch.level);
                w.put_bool(ch.online);
            }
            done(w)
        }
        Err(code) => {
            buf.respond_error(code);
            Ok(())
        }
    }
}
