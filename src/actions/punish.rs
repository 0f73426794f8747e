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

//! Punishment bookkeeping: banishments (with the compound escalation
//! policy), notations, namelocks, statement reports and IP banishments.

use {
    super::{done, parsed, ActionCtx, ActionError, ActionResult},
    crate::{db::Session, protocol::PayloadBuf, util},
};

/// The caller-side default banishment
const DEFAULT_BANISHMENT_SECS: u32 = 7 * 86_400;
/// The floor for a doubled banishment
const MIN_DOUBLED_SECS: u32 = 30 * 86_400;
/// More prior banishments than this escalate the next one
const PRIOR_BANISHMENT_LIMIT: u32 = 5;

mod ec {
    /// No such character on this world
    pub const CHARACTER_NOT_FOUND: u8 = 1;
    /// The issuing gamemaster is unknown
    pub const GM_NOT_FOUND: u8 = 2;
    /// A namelock is already in place
    pub const ALREADY_NAMELOCKED: u8 = 3;
    /// The reported statement is not part of the submitted context
    pub const STATEMENT_MISSING: u8 = 4;
}

/// An empty name means "issued by the system" (gm id 0); a non-empty one
/// must resolve
fn resolve_gm(db: &mut Session, name: &str) -> ActionResult<Option<u32>> {
    if name.is_empty() {
        return Ok(Some(0));
    }
    Ok(db.character_key(name)?.map(|key| key.id))
}

/// What [`banish_account`] decided, echoed back to the game server
struct BanishmentVerdict {
    until: u32,
    permanent: bool,
    final_warning: bool,
}

/// The compound banishment policy:
/// - if the final-warning flag is set, the new banishment is permanent
///   and the flag is consumed
/// - else, with more than [`PRIOR_BANISHMENT_LIMIT`] prior banishments
///   or an explicit elevation, the duration doubles (floor 30 days) and
///   the final-warning flag is set
/// - otherwise the caller-specified duration applies (default 7 days)
fn apply_banishment(
    tx: &mut Session,
    account_id: u32,
    gm_id: u32,
    reason: &str,
    requested_secs: u32,
    elevate: bool,
    now: u32,
) -> ActionResult<BanishmentVerdict> {
    let auth = tx.account_auth(account_id)?;
    let has_final_warning = auth.map(|a| a.final_warning).unwrap_or(false);
    let prior = tx.banishment_count(account_id)?;
    let requested = if requested_secs == 0 {
        DEFAULT_BANISHMENT_SECS
    } else {
        requested_secs
    };
    let verdict = if has_final_warning {
        tx.insert_banishment(account_id, gm_id, reason, now, 0, true)?;
        tx.set_final_warning(account_id, false)?;
        BanishmentVerdict {
            until: 0,
            permanent: true,
            final_warning: false,
        }
    } else if prior > PRIOR_BANISHMENT_LIMIT || elevate {
        let doubled = requested.saturating_mul(2).max(MIN_DOUBLED_SECS);
        let until = now.saturating_add(doubled);
        tx.insert_banishment(account_id, gm_id, reason, now, until, false)?;
        tx.set_final_warning(account_id, true)?;
        BanishmentVerdict {
            until,
            permanent: false,
            final_warning: true,
        }
    } else {
        let until = now.saturating_add(requested);
        tx.insert_banishment(account_id, gm_id, reason, now, until, false)?;
        BanishmentVerdict {
            until,
            permanent: false,
            final_warning: has_final_warning,
        }
    };
    Ok(verdict)
}

/// `BanishAccount`. Request: `string characterName`, `string gmName`,
/// `string reason`, `u32 durationSeconds` (0 = default),
/// `bool elevateToFinalWarning`.
/// Reply `Ok`: `bool permanent`, `u32 until`, `bool finalWarning`.
/// Errors: see [`ec`].
pub fn banish_account(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let name = r.string();
    let gm_name = r.string();
    let reason = r.string();
    let duration = r.u32();
    let elevate = r.bool();
    parsed(&r)?;
    let now = util::unix_time();
    let world_id = ctx.world();
    let subject = match ctx.db.character_key(&name)? {
        Some(key) if key.world_id == world_id => key,
        _ => {
            buf.respond_error(ec::CHARACTER_NOT_FOUND);
            return Ok(());
        }
    };
    let Some(gm_id) = resolve_gm(ctx.db, &gm_name)? else {
        buf.respond_error(ec::GM_NOT_FOUND);
        return Ok(());
    };
    let mut tx = ctx.db.transaction()?;
    let verdict = apply_banishment(
        &mut tx,
        subject.account_id,
        gm_id,
        &reason,
        duration,
        elevate,
        now,
    )?;
    tx.commit()?;
    let mut w = buf.respond_ok();
    w.put_bool(verdict.permanent);
    w.put_u32(verdict.until);
    w.put_bool(verdict.final_warning);
    done(w)
}

/// `SetNotation`. Request: `string characterName`, `string gmName`,
/// `string reason`. Errors: see [`ec`].
pub fn set_notation(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let name = r.string();
    let gm_name = r.string();
    let reason = r.string();
    parsed(&r)?;
    let world_id = ctx.world();
    let subject = match ctx.db.character_key(&name)? {
        Some(key) if key.world_id == world_id => key,
        _ => {
            buf.respond_error(ec::CHARACTER_NOT_FOUND);
            return Ok(());
        }
    };
    let Some(gm_id) = resolve_gm(ctx.db, &gm_name)? else {
        buf.respond_error(ec::GM_NOT_FOUND);
        return Ok(());
    };
    ctx.db
        .insert_notation(subject.account_id, gm_id, &reason, util::unix_time())?;
    done(buf.respond_ok())
}

/// `SetNamelock`. Request: `string characterName`, `string gmName`,
/// `string reason`. Errors: see [`ec`].
pub fn set_namelock(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let name = r.string();
    let gm_name = r.string();
    let reason = r.string();
    parsed(&r)?;
    let world_id = ctx.world();
    let subject = match ctx.db.character_key(&name)? {
        Some(key) if key.world_id == world_id => key,
        _ => {
            buf.respond_error(ec::CHARACTER_NOT_FOUND);
            return Ok(());
        }
    };
    let Some(gm_id) = resolve_gm(ctx.db, &gm_name)? else {
        buf.respond_error(ec::GM_NOT_FOUND);
        return Ok(());
    };
    if ctx.db.namelock_exists(subject.id)? {
        buf.respond_error(ec::ALREADY_NAMELOCKED);
        return Ok(());
    }
    ctx.db
        .insert_namelock(subject.id, gm_id, &reason, util::unix_time())?;
    done(buf.respond_ok())
}

/// `ReportStatement`. Request: `string characterName`, `string gmName`,
/// `string reason`, `u32 statementId`, `u16 contextCount`, then per
/// statement `u32 id`, `u32 saidAt`, `string channel`, `string text`.
/// The reported id must be among the context. Errors: see [`ec`].
pub fn report_statement(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let name = r.string();
    let gm_name = r.string();
    let reason = r.string();
    let statement_id = r.u32();
    let count = r.u16();
    let mut context = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = r.u32();
        let said_at = r.u32();
        let channel = r.string();
        let text = r.string();
        if r.overflowed() {
            return Err(ActionError::Malformed);
        }
        context.push((id, said_at, channel, text));
    }
    parsed(&r)?;
    let world_id = ctx.world();
    let subject = match ctx.db.character_key(&name)? {
        Some(key) if key.world_id == world_id => key,
        _ => {
            buf.respond_error(ec::CHARACTER_NOT_FOUND);
            return Ok(());
        }
    };
    let Some(gm_id) = resolve_gm(ctx.db, &gm_name)? else {
        buf.respond_error(ec::GM_NOT_FOUND);
        return Ok(());
    };
    if !context.iter().any(|(id, ..)| *id == statement_id) {
        buf.respond_error(ec::STATEMENT_MISSING);
        return Ok(());
    }
    let now = util::unix_time();
    let mut tx = ctx.db.transaction()?;
    for (id, said_at, channel, text) in &context {
        if !tx.statement_exists(*id)? {
            tx.insert_statement(*id, subject.id, world_id, *said_at, channel, text)?;
        }
    }
    tx.insert_report(statement_id, subject.id, gm_id, &reason, now)?;
    tx.commit()?;
    done(buf.respond_ok())
}

/// `BanishIP`. Request: `u32BE ip`, `string gmName`, `string reason`,
/// `u32 durationSeconds` (0 = default). Errors: see [`ec`].
pub fn banish_ip(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let ip = r.u32_be();
    let gm_name = r.string();
    let reason = r.string();
    let duration = r.u32();
    parsed(&r)?;
    let Some(gm_id) = resolve_gm(ctx.db, &gm_name)? else {
        buf.respond_error(ec::GM_NOT_FOUND);
        return Ok(());
    };
    let now = util::unix_time();
    let duration = if duration == 0 {
        DEFAULT_BANISHMENT_SECS
    } else {
        duration
    };
    ctx.db
        .insert_ip_banishment(ip, gm_id, &reason, now, now.saturating_add(duration))?;
    done(buf.respond_ok())
}
