/*
 * Created on Sat Feb 17 2024
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

//! The game server's bread and butter: player logins/logouts, the online
//! list, deaths, kill statistics and the world configuration.

use {
    super::{done, parsed, sha256_hex, ActionCtx, ActionError, ActionResult},
    crate::{protocol::PayloadBuf, util},
};

/// `LoginGame` logical error codes
mod ec {
    /// Unknown account, deleted account or wrong password
    pub const INVALID_CREDENTIALS: u8 = 1;
    /// No such character, deleted, or not on this account
    pub const CHARACTER_UNAVAILABLE: u8 = 2;
    /// The character lives on another world
    pub const WORLD_MISMATCH: u8 = 3;
    /// An account banishment is in effect
    pub const BANISHED: u8 = 4;
    /// The peer address is banished
    pub const IP_BANISHED: u8 = 5;
}

struct GameLogin {
    sex: u8,
    guild_title: String,
    premium_end: u32,
    rights: Vec<String>,
}

fn authenticate_player(
    ctx: &mut ActionCtx<'_>,
    account_id: u32,
    name: &str,
    digest: &str,
    ip: u32,
    now: u32,
) -> ActionResult<Result<GameLogin, u8>> {
    let world_id = ctx.world();
    let mut tx = ctx.db.transaction()?;
    let auth = match tx.account_auth(account_id)? {
        Some(auth) if !auth.deleted && auth.password_digest == digest => auth,
        _ => return Ok(Err(ec::INVALID_CREDENTIALS)),
    };
    let ch = match tx.character_login(name)? {
        Some(ch) if !ch.deleted && ch.account_id == account_id => ch,
        _ => return Ok(Err(ec::CHARACTER_UNAVAILABLE)),
    };
    if ch.world_id != world_id {
        return Ok(Err(ec::WORLD_MISMATCH));
    }
    if tx.ip_banished(ip, now)? {
        return Ok(Err(ec::IP_BANISHED));
    }
    if tx.active_banishment(account_id, now)?.is_some() {
        return Ok(Err(ec::BANISHED));
    }
    let rights = tx.character_rights(ch.id)?;
    tx.mark_online(ch.id, now)?;
    tx.commit()?;
    Ok(Ok(GameLogin {
        sex: ch.sex,
        guild_title: ch.guild_title,
        premium_end: auth.premium_end,
        rights,
    }))
}

/// `LoginGame`: a player enters the world.
///
/// Request: `u32 accountId`, `string characterName`, `string password`,
/// `u32BE ip`.
/// Reply `Ok`: `u8 sex`, `string guildTitle`, `u32 premiumEnd`,
/// `u16 rightCount`, then `string right` each.
/// Errors: see [`ec`]. The attempt row is written outside the
/// credential transaction, success or failure.
pub fn login_game(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let account_id = r.u32();
    let name = r.string();
    let password = r.string();
    let ip = r.u32_be();
    parsed(&r)?;
    let now = util::unix_time();
    let digest = sha256_hex(&password);
    let verdict = authenticate_player(ctx, account_id, &name, &digest, ip, now)?;
    let host = ctx.hosts.resolve(ip);
    ctx.db
        .record_login_attempt(account_id, ip, &host, now, verdict.is_err())?;
    match verdict {
        Ok(login) => {
            let mut w = buf.respond_ok();
            w.put_u8(login.sex);
            w.put_string(&login.guild_title);
            w.put_u32(login.premium_end);
            w.put_u16(login.rights.len() as u16);
            for right in &login.rights {
                w.put_string(right);
            }
            done(w)
        }
        Err(code) => {
            buf.respond_error(code);
            Ok(())
        }
    }
}

/// `LogoutGame`: persist the character's closing stats and drop the
/// online flag. Request: `string name`, `u16 level`, `u8 vocation`.
/// Error 1: no such character on this world.
pub fn logout_game(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let name = r.string();
    let level = r.u16();
    let vocation = r.u8();
    parsed(&r)?;
    let now = util::unix_time();
    let world_id = ctx.world();
    let key = match ctx.db.character_key(&name)? {
        Some(key) if key.world_id == world_id => key,
        _ => {
            buf.respond_error(1);
            return Ok(());
        }
    };
    let mut tx = ctx.db.transaction()?;
    tx.mark_offline(key.id)?;
    tx.record_logout(key.id, level, vocation, now)?;
    tx.commit()?;
    done(buf.respond_ok())
}

/// `DecrementIsOnline`. Request: `string name`. Error 1: unknown
/// character.
pub fn decrement_is_online(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let name = r.string();
    parsed(&r)?;
    let world_id = ctx.world();
    match ctx.db.character_key(&name)? {
        Some(key) if key.world_id == world_id => {
            ctx.db.mark_offline(key.id)?;
            done(buf.respond_ok())
        }
        _ => {
            buf.respond_error(1);
            Ok(())
        }
    }
}

/// `ClearIsOnline`: zero every online flag of this world (server
/// restart). Reply `Ok`: `u32 cleared`.
pub fn clear_is_online(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let r = buf.reader();
    parsed(&r)?;
    let world_id = ctx.world();
    let mut tx = ctx.db.transaction()?;
    let cleared = tx.clear_online_flags(world_id)?;
    tx.clear_online_list(world_id)?;
    tx.commit()?;
    let mut w = buf.respond_ok();
    w.put_u32(cleared.min(u32::MAX as u64) as u32);
    done(w)
}

/// `CreatePlayerList`: replace the published online list of this world.
/// Request: `u16 count`, then `string name`, `u16 level`, `u8 vocation`
/// each.
pub fn create_player_list(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let count = r.u16();
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = r.string();
        let level = r.u16();
        let vocation = r.u8();
        if r.overflowed() {
            return Err(ActionError::Malformed);
        }
        entries.push((name, level, vocation));
    }
    parsed(&r)?;
    let world_id = ctx.world();
    let mut tx = ctx.db.transaction()?;
    tx.clear_online_list(world_id)?;
    for (name, level, vocation) in &entries {
        tx.add_online_character(world_id, name, *level, *vocation)?;
    }
    tx.commit()?;
    done(buf.respond_ok())
}

/// `LogKilledCreatures`: merge one race-kill tally into the statistics.
/// Request: `u16 count`, then `string race`, `u32 killedPlayers`,
/// `u32 killedByPlayers` each.
pub fn log_killed_creatures(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let count = r.u16();
    let mut races = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let race = r.string();
        let killed_players = r.u32();
        let killed_by_players = r.u32();
        if r.overflowed() {
            return Err(ActionError::Malformed);
        }
        races.push((race, killed_players, killed_by_players));
    }
    parsed(&r)?;
    let now = util::unix_time();
    let world_id = ctx.world();
    let mut tx = ctx.db.transaction()?;
    for (race, kp, kbp) in &races {
        if tx.update_kill_stat(world_id, race, *kp, *kbp, now)? == 0 {
            tx.insert_kill_stat(world_id, race, *kp, *kbp, now)?;
        }
    }
    tx.commit()?;
    done(buf.respond_ok())
}

/// `LoadPlayers`: every character of this world, for the server's boot
/// index. Reply `Ok`: `u32 count`, then `u32 id`, `string name` each.
pub fn load_players(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let r = buf.reader();
    parsed(&r)?;
    let players = ctx.db.characters_of_world(ctx.world())?;
    let mut w = buf.respond_ok();
    w.put_u32(players.len() as u32);
    for p in &players {
        w.put_u32(p.id);
        w.put_string(&p.name);
    }
    done(w)
}

/// `LogCharacterDeath`. Request: `string name`, `u32 time` (0 = now),
/// `u16 level`, `string killedBy`, `bool isPlayer`, `bool unjustified`.
/// Error 1: unknown character.
pub fn log_character_death(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let name = r.string();
    let time = r.u32();
    let level = r.u16();
    let killed_by = r.string();
    let is_player = r.bool();
    let unjustified = r.bool();
    parsed(&r)?;
    let time = if time == 0 { util::unix_time() } else { time };
    let world_id = ctx.world();
    match ctx.db.character_key(&name)? {
        Some(key) if key.world_id == world_id => {
            ctx.db
                .insert_death(key.id, time, level, &killed_by, is_player, unjustified)?;
            done(buf.respond_ok())
        }
        _ => {
            buf.respond_error(1);
            Ok(())
        }
    }
}

/// `LoadWorldConfig`. Reply `Ok`: `u8 pvpType`, `bool premiumOnly`,
/// `u16 maxPlayers`. Error 1: the world row is gone.
pub fn load_world_config(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let r = buf.reader();
    parsed(&r)?;
    match ctx.db.world_config(ctx.world())? {
        Some(config) => {
            let mut w = buf.respond_ok();
            w.put_u8(config.pvp_type);
            w.put_bool(config.premium_only);
            w.put_u16(config.max_players);
            done(w)
        }
        None => {
            buf.respond_error(1);
            Ok(())
        }
    }
}
