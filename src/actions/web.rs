/*
 * Created on Mon Feb 19 2024
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

//! The web front-end's surface: account and character management plus the
//! public listings.

use {
    super::{done, parsed, sha256_hex, ActionCtx, ActionResult},
    crate::{protocol::PayloadBuf, util},
};

/// The public name length cap
const MAX_NAME_LEN: usize = 30;

mod ec {
    /// Unknown account or wrong password
    pub const INVALID_CREDENTIALS: u8 = 1;
    /// The account id is taken (or zero)
    pub const ACCOUNT_EXISTS: u8 = 2;
    /// No such account
    pub const ACCOUNT_NOT_FOUND: u8 = 3;
    /// No such world
    pub const WORLD_NOT_FOUND: u8 = 4;
    /// The character name is taken
    pub const NAME_TAKEN: u8 = 5;
    /// The character name is empty or too long
    pub const BAD_NAME: u8 = 6;
    /// No such character
    pub const CHARACTER_NOT_FOUND: u8 = 7;
}

/// `CheckAccountPassword`. Request: `u32 accountId`, `string password`.
/// Errors: see [`ec`].
pub fn check_account_password(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let account_id = r.u32();
    let password = r.string();
    parsed(&r)?;
    let digest = sha256_hex(&password);
    match ctx.db.account_auth(account_id)? {
        Some(auth) if !auth.deleted && auth.password_digest == digest => {
            done(buf.respond_ok())
        }
        _ => {
            buf.respond_error(ec::INVALID_CREDENTIALS);
            Ok(())
        }
    }
}

/// `CreateAccount`. Request: `u32 accountId`, `string email`,
/// `string password`. Errors: see [`ec`].
pub fn create_account(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let account_id = r.u32();
    let email = r.string();
    let password = r.string();
    parsed(&r)?;
    if account_id == 0 {
        buf.respond_error(ec::ACCOUNT_EXISTS);
        return Ok(());
    }
    let digest = sha256_hex(&password);
    let mut tx = ctx.db.transaction()?;
    if tx.account_exists(account_id)? {
        buf.respond_error(ec::ACCOUNT_EXISTS);
        return Ok(());
    }
    tx.create_account(account_id, &email, &digest, util::unix_time())?;
    tx.commit()?;
    done(buf.respond_ok())
}

/// `CreateCharacter`. Request: `u32 accountId`, `string worldName`,
/// `string characterName`, `u8 sex`. Errors: see [`ec`].
pub fn create_character(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let account_id = r.u32();
    let world_name = r.string();
    let name = r.string();
    let sex = r.u8();
    parsed(&r)?;
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_NAME_LEN {
        buf.respond_error(ec::BAD_NAME);
        return Ok(());
    }
    let mut tx = ctx.db.transaction()?;
    if !tx.account_exists(account_id)? {
        buf.respond_error(ec::ACCOUNT_NOT_FOUND);
        return Ok(());
    }
    let Some(world_id) = tx.world_id_by_name(&world_name)? else {
        buf.respond_error(ec::WORLD_NOT_FOUND);
        return Ok(());
    };
    if tx.character_name_exists(trimmed)? {
        buf.respond_error(ec::NAME_TAKEN);
        return Ok(());
    }
    tx.create_character(account_id, world_id, trimmed, sex, util::unix_time())?;
    tx.commit()?;
    done(buf.respond_ok())
}

/// `GetAccountSummary`. Request: `u32 accountId`.
/// Reply `Ok`: `u32 premiumEnd`, `bool finalWarning`, `u16 count`, then
/// `string name`, `string world`, `u16 level`, `bool online` each.
/// Errors: see [`ec`].
pub fn get_account_summary(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let account_id = r.u32();
    parsed(&r)?;
    let Some(auth) = ctx.db.account_auth(account_id)? else {
        buf.respond_error(ec::ACCOUNT_NOT_FOUND);
        return Ok(());
    };
    if auth.deleted {
        buf.respond_error(ec::ACCOUNT_NOT_FOUND);
        return Ok(());
    }
    let characters = ctx.db.account_characters(account_id)?;
    let mut w = buf.respond_ok();
    w.put_u32(auth.premium_end);
    w.put_bool(auth.final_warning);
    w.put_u16(characters.len() as u16);
    for ch in &characters {
        w.put_string(&ch.name);
        w.put_string(&ch.world);
        w.put_u16(ch.level);
        w.put_bool(ch.online);
    }
    done(w)
}

/// `GetCharacterProfile`. Request: `string name`.
/// Reply `Ok`: `string name`, `string world`, `u8 sex`, `u16 level`,
/// `u8 vocation`, `u32 lastLogin`, `bool online`. Errors: see [`ec`].
pub fn get_character_profile(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let name = r.string();
    parsed(&r)?;
    let Some(profile) = ctx.db.character_profile(&name)? else {
        buf.respond_error(ec::CHARACTER_NOT_FOUND);
        return Ok(());
    };
    let mut w = buf.respond_ok();
    w.put_string(&profile.name);
    w.put_string(&profile.world);
    w.put_u8(profile.sex);
    w.put_u16(profile.level);
    w.put_u8(profile.vocation);
    w.put_u32(profile.last_login);
    w.put_bool(profile.online);
    done(w)
}

/// `GetWorlds`. Reply `Ok`: `u16 count`, then `u16 id`, `string name`,
/// `u8 pvpType`, `u32 online` each.
pub fn get_worlds(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let r = buf.reader();
    parsed(&r)?;
    let worlds = ctx.db.worlds()?;
    let mut w = buf.respond_ok();
    w.put_u16(worlds.len() as u16);
    for world in &worlds {
        w.put_u16(world.id);
        w.put_string(&world.name);
        w.put_u8(world.pvp_type);
        w.put_u32(world.online);
    }
    done(w)
}

/// `GetOnlineCharacters`. Request: `u16 worldId`.
/// Reply `Ok`: `u16 count`, then `string name`, `u16 level`,
/// `u8 vocation` each.
pub fn get_online_characters(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let world_id = r.u16();
    parsed(&r)?;
    let online = ctx.db.online_characters(world_id)?;
    let mut w = buf.respond_ok();
    w.put_u16(online.len() as u16);
    for ch in &online {
        w.put_string(&ch.name);
        w.put_u16(ch.level);
        w.put_u8(ch.vocation);
    }
    done(w)
}

/// `GetKillStatistics`. Request: `u16 worldId`.
/// Reply `Ok`: `u16 count`, then `string race`, `u32 killedPlayers`,
/// `u32 killedByPlayers` each.
pub fn get_kill_statistics(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let world_id = r.u16();
    parsed(&r)?;
    let stats = ctx.db.kill_statistics(world_id)?;
    let mut w = buf.respond_ok();
    w.put_u16(stats.len() as u16);
    for stat in &stats {
        w.put_string(&stat.race);
        w.put_u32(stat.killed_players);
        w.put_u32(stat.killed_by_players);
    }
    done(w)
}
