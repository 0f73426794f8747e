/*
 * Created on Sun Feb 11 2024
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

//! # The query engine
//!
//! The static opcode table: every opcode maps to a name (used only in
//! logs), the application role that may send it, and its handler. The
//! dispatcher never runs a handler whose role does not match the
//! connection - the connection layer checks [`permitted`] before a query
//! is ever enqueued, and unknown opcodes are failed before reaching a
//! handler.

#[cfg(test)]
mod tests;

use crate::{
    actions::{self, ActionCtx, ActionResult},
    protocol::PayloadBuf,
};

/// The application roles a connection can authorize as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Role {
    Game = 1,
    Login = 2,
    Web = 3,
}

impl Role {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Game),
            2 => Some(Self::Login),
            3 => Some(Self::Web),
            _ => None,
        }
    }
}

macro_rules! opcodes {
    ($($variant:ident = $code:literal, $role:expr, $handler:path;)*) => {
        /// Every query kind the manager understands. The discriminants are
        /// stable wire identifiers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        pub enum OpCode {
            $($variant = $code,)*
        }
        impl OpCode {
            pub const fn from_raw(raw: u8) -> Option<Self> {
                match raw {
                    $($code => Some(Self::$variant),)*
                    _ => None,
                }
            }
            /// The log name of this opcode
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)*
                }
            }
            /// The role allowed to send this opcode
            pub const fn role(self) -> Role {
                match self {
                    $(Self::$variant => $role,)*
                }
            }
        }
        /// Run the handler for `op`
        pub fn dispatch(
            op: OpCode,
            ctx: &mut ActionCtx<'_>,
            buf: &mut PayloadBuf,
        ) -> ActionResult<()> {
            match op {
                $(OpCode::$variant => $handler(ctx, buf),)*
            }
        }
    };
}

// `Login` carries Role::Game here only for the worker-side world
// resolution of game connections; the connection layer treats it
// specially (it is the one opcode accepted before authorization and it
// is never accepted after).
opcodes! {
    Login = 0, Role::Game, actions::login::login;
    LoginGame = 1, Role::Game, actions::game::login_game;
    LogoutGame = 2, Role::Game, actions::game::logout_game;
    SetNamelock = 3, Role::Game, actions::punish::set_namelock;
    BanishAccount = 4, Role::Game, actions::punish::banish_account;
    SetNotation = 5, Role::Game, actions::punish::set_notation;
    ReportStatement = 6, Role::Game, actions::punish::report_statement;
    BanishIP = 7, Role::Game, actions::punish::banish_ip;
    LogCharacterDeath = 8, Role::Game, actions::game::log_character_death;
    AddBuddy = 9, Role::Game, actions::buddy::add_buddy;
    RemoveBuddy = 10, Role::Game, actions::buddy::remove_buddy;
    DecrementIsOnline = 11, Role::Game, actions::game::decrement_is_online;
    FinishAuctions = 12, Role::Game, actions::houses::finish_auctions;
    TransferHouses = 13, Role::Game, actions::houses::transfer_houses;
    EvictFreeAccounts = 14, Role::Game, actions::maintenance::evict_free_accounts;
    EvictDeletedCharacters = 15, Role::Game, actions::maintenance::evict_deleted_characters;
    EvictExGuildLeaders = 16, Role::Game, actions::maintenance::evict_ex_guild_leaders;
    InsertHouseOwner = 17, Role::Game, actions::houses::insert_house_owner;
    UpdateHouseOwner = 18, Role::Game, actions::houses::update_house_owner;
    DeleteHouseOwner = 19, Role::Game, actions::houses::delete_house_owner;
    GetHouseOwners = 20, Role::Game, actions::houses::get_house_owners;
    GetAuctions = 21, Role::Game, actions::houses::get_auctions;
    StartAuction = 22, Role::Game, actions::houses::start_auction;
    InsertHouses = 23, Role::Game, actions::houses::insert_houses;
    ClearIsOnline = 24, Role::Game, actions::game::clear_is_online;
    CreatePlayerList = 25, Role::Game, actions::game::create_player_list;
    LogKilledCreatures = 26, Role::Game, actions::game::log_killed_creatures;
    LoadPlayers = 27, Role::Game, actions::game::load_players;
    ExcludeFromAuctions = 28, Role::Game, actions::houses::exclude_from_auctions;
    CancelHouseTransfer = 29, Role::Game, actions::houses::cancel_house_transfer;
    LoadWorldConfig = 30, Role::Game, actions::game::load_world_config;
    LoginAccount = 31, Role::Login, actions::login::login_account;
    CheckAccountPassword = 32, Role::Web, actions::web::check_account_password;
    CreateAccount = 33, Role::Web, actions::web::create_account;
    CreateCharacter = 34, Role::Web, actions::web::create_character;
    GetAccountSummary = 35, Role::Web, actions::web::get_account_summary;
    GetCharacterProfile = 36, Role::Web, actions::web::get_character_profile;
    GetWorlds = 37, Role::Web, actions::web::get_worlds;
    GetOnlineCharacters = 38, Role::Web, actions::web::get_online_characters;
    GetKillStatistics = 39, Role::Web, actions::web::get_kill_statistics;
}

/// Is `op` inside the whitelist of an authorized connection with `role`?
/// `Login` is never permitted here: it is only valid as the first frame,
/// which the connection layer handles before consulting this table.
pub fn permitted(op: OpCode, role: Role) -> bool {
    op != OpCode::Login && op.role() == role
}
