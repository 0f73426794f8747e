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

//! House inventory, ownership, auctions and scheduled transfers. All of
//! it is scoped to the world the connection authorized against.

use {
    super::{done, parsed, ActionCtx, ActionError, ActionResult},
    crate::{protocol::PayloadBuf, util},
};

/// How long a fresh auction runs when the game server does not say
const DEFAULT_AUCTION_SECS: u32 = 7 * 86_400;
/// The rent period granted to an auction winner
const RENT_PERIOD_SECS: u32 = 30 * 86_400;

mod ec {
    /// No owner row for that house
    pub const NO_SUCH_OWNER: u8 = 1;
    /// An auction for that house is already running
    pub const AUCTION_EXISTS: u8 = 2;
    /// No transfer is scheduled for that house
    pub const NO_SUCH_TRANSFER: u8 = 3;
}

/// `InsertHouses`: the game server uploads its house inventory at boot.
/// Request: `u16 count`, then `u32 houseId`, `string name`, `u32 rent`,
/// `bool guildhouse` each.
pub fn insert_houses(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let count = r.u16();
    let mut houses = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let house_id = r.u32();
        let name = r.string();
        let rent = r.u32();
        let guildhouse = r.bool();
        if r.overflowed() {
            return Err(ActionError::Malformed);
        }
        houses.push((house_id, name, rent, guildhouse));
    }
    parsed(&r)?;
    let world_id = ctx.world();
    let mut tx = ctx.db.transaction()?;
    for (house_id, name, rent, guildhouse) in &houses {
        if tx.update_house(*house_id, world_id, name, *rent, *guildhouse)? == 0 {
            tx.insert_house(*house_id, world_id, name, *rent, *guildhouse)?;
        }
    }
    tx.commit()?;
    done(buf.respond_ok())
}

/// `InsertHouseOwner`. Request: `u32 houseId`, `u32 ownerId`,
/// `u32 paidUntil`.
pub fn insert_house_owner(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let house_id = r.u32();
    let owner_id = r.u32();
    let paid_until = r.u32();
    parsed(&r)?;
    ctx.db
        .set_house_owner(house_id, ctx.world(), owner_id, paid_until)?;
    done(buf.respond_ok())
}

/// `UpdateHouseOwner`. Request: `u32 houseId`, `u32 ownerId`,
/// `u32 paidUntil`. Errors: see [`ec`].
pub fn update_house_owner(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let house_id = r.u32();
    let owner_id = r.u32();
    let paid_until = r.u32();
    parsed(&r)?;
    if ctx
        .db
        .update_house_owner(house_id, ctx.world(), owner_id, paid_until)?
        == 0
    {
        buf.respond_error(ec::NO_SUCH_OWNER);
        return Ok(());
    }
    done(buf.respond_ok())
}

/// `DeleteHouseOwner`. Request: `u32 houseId`. Errors: see [`ec`].
pub fn delete_house_owner(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let house_id = r.u32();
    parsed(&r)?;
    if ctx.db.delete_house_owner(house_id, ctx.world())? == 0 {
        buf.respond_error(ec::NO_SUCH_OWNER);
        return Ok(());
    }
    done(buf.respond_ok())
}

/// `GetHouseOwners`. Reply `Ok`: `u16 count`, then `u32 houseId`,
/// `u32 ownerId`, `string ownerName`, `u32 paidUntil` each.
pub fn get_house_owners(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let r = buf.reader();
    parsed(&r)?;
    let owners = ctx.db.house_owners(ctx.world())?;
    let mut w = buf.respond_ok();
    w.put_u16(owners.len() as u16);
    for o in &owners {
        w.put_u32(o.house_id);
        w.put_u32(o.owner_id);
        w.put_string(&o.owner_name);
        w.put_u32(o.paid_until);
    }
    done(w)
}

/// `GetAuctions`. Reply `Ok`: `u16 count`, then `u32 houseId`,
/// `u32 bidderId`, `string bidderName`, `u32 bid`, `u32 endsAt` each.
pub fn get_auctions(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let r = buf.reader();
    parsed(&r)?;
    let auctions = ctx.db.auctions(ctx.world())?;
    let mut w = buf.respond_ok();
    w.put_u16(auctions.len() as u16);
    for a in &auctions {
        w.put_u32(a.house_id);
        w.put_u32(a.bidder_id);
        w.put_string(&a.bidder_name);
        w.put_u32(a.bid);
        w.put_u32(a.ends_at);
    }
    done(w)
}

/// `StartAuction`. Request: `u32 houseId`, `u32 endsAt` (0 = a week from
/// now). Errors: see [`ec`].
pub fn start_auction(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let house_id = r.u32();
    let ends_at = r.u32();
    parsed(&r)?;
    let world_id = ctx.world();
    if ctx.db.auction_exists(house_id, world_id)? {
        buf.respond_error(ec::AUCTION_EXISTS);
        return Ok(());
    }
    let ends_at = if ends_at == 0 {
        util::unix_time().saturating_add(DEFAULT_AUCTION_SECS)
    } else {
        ends_at
    };
    ctx.db.start_auction(house_id, world_id, ends_at)?;
    done(buf.respond_ok())
}

/// `FinishAuctions`: settle every auction past its deadline. Auctions
/// with a bid assign the house to the winner; the rest just end.
/// Reply `Ok`: `u16 count`, then `u32 houseId`, `u32 winnerId`,
/// `u32 bid` each (only settled auctions with a winner are listed).
pub fn finish_auctions(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let r = buf.reader();
    parsed(&r)?;
    let now = util::unix_time();
    let world_id = ctx.world();
    let mut tx = ctx.db.transaction()?;
    let finished = tx.finished_auctions(world_id, now)?;
    let mut winners = Vec::new();
    for auction in &finished {
        tx.delete_auction(auction.house_id, world_id)?;
        if auction.bidder_id != 0 && auction.bid > 0 {
            let paid_until = now.saturating_add(RENT_PERIOD_SECS);
            if tx.update_house_owner(auction.house_id, world_id, auction.bidder_id, paid_until)?
                == 0
            {
                tx.set_house_owner(auction.house_id, world_id, auction.bidder_id, paid_until)?;
            }
            winners.push(auction);
        }
    }
    tx.commit()?;
    let mut w = buf.respond_ok();
    w.put_u16(winners.len() as u16);
    for auction in winners {
        w.put_u32(auction.house_id);
        w.put_u32(auction.bidder_id);
        w.put_u32(auction.bid);
    }
    done(w)
}

/// `TransferHouses`: apply every scheduled owner transfer of this world.
/// Reply `Ok`: `u16 count`, then `u32 houseId`, `u32 newOwnerId`,
/// `u32 price` each.
pub fn transfer_houses(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let r = buf.reader();
    parsed(&r)?;
    let now = util::unix_time();
    let world_id = ctx.world();
    let mut tx = ctx.db.transaction()?;
    let transfers = tx.pending_transfers(world_id)?;
    for t in &transfers {
        let paid_until = now.saturating_add(RENT_PERIOD_SECS);
        if tx.update_house_owner(t.house_id, world_id, t.new_owner_id, paid_until)? == 0 {
            tx.set_house_owner(t.house_id, world_id, t.new_owner_id, paid_until)?;
        }
        tx.clear_transfer(t.house_id, world_id)?;
    }
    tx.commit()?;
    let mut w = buf.respond_ok();
    w.put_u16(transfers.len() as u16);
    for t in &transfers {
        w.put_u32(t.house_id);
        w.put_u32(t.new_owner_id);
        w.put_u32(t.price);
    }
    done(w)
}

/// `ExcludeFromAuctions`: strike a character's bids from every open
/// auction (used when the bidder gets punished out of eligibility).
/// Request: `u32 characterId`. Reply `Ok`: `u32 cleared`.
pub fn exclude_from_auctions(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let character_id = r.u32();
    parsed(&r)?;
    let cleared = ctx.db.clear_bidder(ctx.world(), character_id)?;
    let mut w = buf.respond_ok();
    w.put_u32(cleared.min(u32::MAX as u64) as u32);
    done(w)
}

/// `CancelHouseTransfer`: unschedule a pending transfer by clearing the
/// transfer columns on the house row.
///
/// TODO: the original stubs this opcode and it is unclear whether a
/// cancel should instead delete the transfer record outright; clearing
/// the columns was chosen so the house row keeps its identity. Revisit
/// when the game server starts sending this.
///
/// Request: `u32 houseId`. Errors: see [`ec`].
pub fn cancel_house_transfer(ctx: &mut ActionCtx<'_>, buf: &mut PayloadBuf) -> ActionResult<()> {
    let mut r = buf.reader();
    let house_id = r.u32();
    parsed(&r)?;
    if ctx.db.clear_transfer(house_id, ctx.world())? == 0 {
        buf.respond_error(ec::NO_SUCH_TRANSFER);
        return Ok(());
    }
    done(buf.respond_ok())
}
