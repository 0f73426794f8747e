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

//! Buddy list maintenance for the game server.

use {
    super::{done, parsed, ActionCtx, ActionResult},
    crate::protocol::PayloadBuf,
};

mod ec {
    /// The buddy does not exist on this world
    pub const BUDDY_NOT_FOUND: u8 = 1;
    /// The pair is already on the list
    pub const ALREADY_BUDDIES: u8 = 2;
    /// The pair is not on the list
    pub const NOT_BUDDIES: u8 = 3;
}

/// `AddBuddy`. Request: `u32 accountId`, `string buddyName`.
/// Reply `Ok`: `u32 buddyCharacterId`. Errors: see [`ec`].
pub fn add_buddy(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let account_id = r.u32();
    let buddy_name = r.string();
    parsed(&r)?;
    let world_id = ctx.world();
    let buddy = match ctx.db.character_key(&buddy_name)? {
        Some(key) if key.world_id == world_id => key,
        _ => {
            buf.respond_error(ec::BUDDY_NOT_FOUND);
            return Ok(());
        }
    };
    if ctx.db.buddy_exists(account_id, buddy.id, world_id)? {
        buf.respond_error(ec::ALREADY_BUDDIES);
        return Ok(());
    }
    ctx.db.insert_buddy(account_id, buddy.id, world_id)?;
    let mut w = buf.respond_ok();
    w.put_u32(buddy.id);
    done(w)
}

/// `RemoveBuddy`. Request: `u32 accountId`, `u32 buddyCharacterId`.
/// Errors: see [`ec`].
pub fn remove_buddy(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let account_id = r.u32();
    let buddy_id = r.u32();
    parsed(&r)?;
    if ctx.db.delete_buddy(account_id, buddy_id, ctx.world())? == 0 {
        buf.respond_error(ec::NOT_BUDDIES);
        return Ok(());
    }
    done(buf.respond_ok())
}
