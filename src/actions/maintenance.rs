/*
 * Created on Sun Feb 18 2024
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

//! Periodic housekeeping the game server triggers. Each reply carries the
//! number of ownerships that were released.

use {
    super::{done, parsed, ActionCtx, ActionResult},
    crate::{protocol::PayloadBuf, util},
};

/// `EvictFreeAccounts`: houses lose owners whose premium ran out.
pub fn evict_free_accounts(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let r = buf.reader();
    parsed(&r)?;
    let evicted = ctx
        .db
        .evict_free_accounts(ctx.world(), util::unix_time())?;
    let mut w = buf.respond_ok();
    w.put_u32(evicted.min(u32::MAX as u64) as u32);
    done(w)
}

/// `EvictDeletedCharacters`: houses lose owners that no longer exist.
pub fn evict_deleted_characters(
    ctx: &mut ActionCtx<'_>,
    buf: &mut PayloadBuf,
) -> ActionResult<()> {
    let r = buf.reader();
    parsed(&r)?;
    let evicted = ctx.db.evict_deleted_characters(ctx.world())?;
    let mut w = buf.respond_ok();
    w.put_u32(evicted.min(u32::MAX as u64) as u32);
    done(w)
}

/// `EvictExGuildLeaders`: guildhouses lose owners who stopped leading a
/// guild.
pub fn evict_ex_guild_leaders(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let r = buf.reader();
    parsed(&r)?;
    let evicted = ctx.db.evict_ex_guild_leaders(ctx.world())?;
    let mut w = buf.respond_ok();
    w.put_u32(evicted.min(u32::MAX as u64) as u32);
    done(w)
}
