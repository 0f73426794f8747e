/*
 * Created on Mon Jan 29 2024
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

//! # Table interactions
//!
//! One method per interaction: the SQL text, the parameter binding and the
//! row mapping live here, never in a handler. The SQL uses `?`
//! placeholders and is shared by both backends (the networked driver
//! rewrites them to `$n` at prepare time).
//!
//! Missing rows are `None` or empty vectors - never errors. An `Err` from
//! any of these methods means the backend itself failed and the worker
//! will retry the whole handler.

use super::{DbResult, Session};

#[derive(Debug, Clone, PartialEq)]
pub struct AccountAuth {
    pub id: u32,
    pub password_digest: String,
    pub premium_end: u32,
    pub final_warning: bool,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterLogin {
    pub id: u32,
    pub account_id: u32,
    pub world_id: u16,
    pub sex: u8,
    pub level: u16,
    pub guild_title: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterKey {
    pub id: u32,
    pub account_id: u32,
    pub world_id: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterProfile {
    pub name: String,
    pub world: String,
    pub sex: u8,
    pub level: u16,
    pub vocation: u8,
    pub last_login: u32,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacterListEntry {
    pub name: String,
    pub world: String,
    pub level: u16,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    pub pvp_type: u8,
    pub premium_only: bool,
    pub max_players: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldInfo {
    pub id: u16,
    pub name: String,
    pub pvp_type: u8,
    pub online: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Banishment {
    pub until: u32,
    pub permanent: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HouseOwner {
    pub house_id: u32,
    pub owner_id: u32,
    pub owner_name: String,
    pub paid_until: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Auction {
    pub house_id: u32,
    pub bidder_id: u32,
    pub bidder_name: String,
    pub bid: u32,
    pub ends_at: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HouseTransfer {
    pub house_id: u32,
    pub new_owner_id: u32,
    pub price: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KillStat {
    pub race: String,
    pub killed_players: u32,
    pub killed_by_players: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnlineCharacter {
    pub name: String,
    pub level: u16,
    pub vocation: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEntry {
    pub id: u32,
    pub name: String,
}

impl Session {
    // ---- worlds ----

    pub fn world_id_by_name(&mut self, name: &str) -> DbResult<Option<u16>> {
        Ok(self
            .query_row("SELECT id FROM worlds WHERE name = ?", &[name.into()])?
            .map(|r| r.uint(0) as u16))
    }

    pub fn world_config(&mut self, world_id: u16) -> DbResult<Option<WorldConfig>> {
        Ok(self
            .query_row(
                "SELECT pvp_type, premium_only, max_players FROM worlds WHERE id = ?",
                &[world_id.into()],
            )?
            .map(|r| WorldConfig {
                pvp_type: r.uint(0) as u8,
                premium_only: r.bool(1),
                max_players: r.uint(2) as u16,
            }))
    }

    pub fn worlds(&mut self) -> DbResult<Vec<WorldInfo>> {
        let rows = self.query(
            "SELECT w.id, w.name, w.pvp_type, \
             (SELECT COUNT(*) FROM online_characters o WHERE o.world_id = w.id) \
             FROM worlds w ORDER BY w.id",
            &[],
        )?;
        Ok(rows
            .iter()
            .map(|r| WorldInfo {
                id: r.uint(0) as u16,
                name: r.text(1).to_owned(),
                pvp_type: r.uint(2) as u8,
                online: r.uint(3),
            })
            .collect())
    }

    // ---- accounts ----

    pub fn account_auth(&mut self, account_id: u32) -> DbResult<Option<AccountAuth>> {
        Ok(self
            .query_row(
                "SELECT id, password, premium_end, final_warning, deleted \
                 FROM accounts WHERE id = ?",
                &[account_id.into()],
            )?
            .map(|r| AccountAuth {
                id: r.uint(0),
                password_digest: r.text(1).to_owned(),
                premium_end: r.uint(2),
                final_warning: r.bool(3),
                deleted: r.bool(4),
            }))
    }

    pub fn account_exists(&mut self, account_id: u32) -> DbResult<bool> {
        Ok(self
            .query_row("SELECT 1 FROM accounts WHERE id = ?", &[account_id.into()])?
            .is_some())
    }

    pub fn create_account(
        &mut self,
        account_id: u32,
        email: &str,
        password_digest: &str,
        now: u32,
    ) -> DbResult<()> {
        self.execute(
            "INSERT INTO accounts (id, email, password, created) VALUES (?, ?, ?, ?)",
            &[
                account_id.into(),
                email.into(),
                password_digest.into(),
                now.into(),
            ],
        )?;
        Ok(())
    }

    pub fn account_characters(&mut self, account_id: u32) -> DbResult<Vec<CharacterListEntry>> {
        let rows = self.query(
            "SELECT c.name, w.name, c.level, c.is_online FROM characters c \
             JOIN worlds w ON w.id = c.world_id \
             WHERE c.account_id = ? AND c.deleted = 0 ORDER BY c.name",
            &[account_id.into()],
        )?;
        Ok(rows
            .iter()
            .map(|r| CharacterListEntry {
                name: r.text(0).to_owned(),
                world: r.text(1).to_owned(),
                level: r.uint(2) as u16,
                online: r.int(3) != 0,
            })
            .collect())
    }

    pub fn set_final_warning(&mut self, account_id: u32, flag: bool) -> DbResult<()> {
        self.execute(
            "UPDATE accounts SET final_warning = ? WHERE id = ?",
            &[flag.into(), account_id.into()],
        )?;
        Ok(())
    }

    // ---- characters ----

    pub fn character_login(&mut self, name: &str) -> DbResult<Option<CharacterLogin>> {
        Ok(self
            .query_row(
                "SELECT id, account_id, world_id, sex, level, guild_title, deleted \
                 FROM characters WHERE name = ?",
                &[name.into()],
            )?
            .map(|r| CharacterLogin {
                id: r.uint(0),
                account_id: r.uint(1),
                world_id: r.uint(2) as u16,
                sex: r.uint(3) as u8,
                level: r.uint(4) as u16,
                guild_title: r.text(5).to_owned(),
                deleted: r.bool(6),
            }))
    }

    pub fn character_key(&mut self, name: &str) -> DbResult<Option<CharacterKey>> {
        Ok(self
            .query_row(
                "SELECT id, account_id, world_id FROM characters WHERE name = ?",
                &[name.into()],
            )?
            .map(|r| CharacterKey {
                id: r.uint(0),
                account_id: r.uint(1),
                world_id: r.uint(2) as u16,
            }))
    }

    pub fn character_rights(&mut self, character_id: u32) -> DbResult<Vec<String>> {
        let rows = self.query(
            "SELECT right_name FROM character_rights WHERE character_id = ? ORDER BY right_name",
            &[character_id.into()],
        )?;
        Ok(rows.iter().map(|r| r.text(0).to_owned()).collect())
    }

    pub fn character_name_exists(&mut self, name: &str) -> DbResult<bool> {
        Ok(self
            .query_row("SELECT 1 FROM characters WHERE name = ?", &[name.into()])?
            .is_some())
    }

    pub fn create_character(
        &mut self,
        account_id: u32,
        world_id: u16,
        name: &str,
        sex: u8,
        now: u32,
    ) -> DbResult<()> {
        self.execute(
            "INSERT INTO characters (name, account_id, world_id, sex, created) \
             VALUES (?, ?, ?, ?, ?)",
            &[
                name.into(),
                account_id.into(),
                world_id.into(),
                sex.into(),
                now.into(),
            ],
        )?;
        Ok(())
    }

    pub fn character_profile(&mut self, name: &str) -> DbResult<Option<CharacterProfile>> {
        Ok(self
            .query_row(
                "SELECT c.name, w.name, c.sex, c.level, c.vocation, c.last_login, c.is_online \
                 FROM characters c JOIN worlds w ON w.id = c.world_id \
                 WHERE c.name = ? AND c.deleted = 0",
                &[name.into()],
            )?
            .map(|r| CharacterProfile {
                name: r.text(0).to_owned(),
                world: r.text(1).to_owned(),
                sex: r.uint(2) as u8,
                level: r.uint(3) as u16,
                vocation: r.uint(4) as u8,
                last_login: r.uint(5),
                online: r.int(6) != 0,
            }))
    }

    pub fn mark_online(&mut self, character_id: u32, now: u32) -> DbResult<()> {
        self.execute(
            "UPDATE characters SET is_online = is_online + 1, last_login = ? WHERE id = ?",
            &[now.into(), character_id.into()],
        )?;
        Ok(())
    }

    pub fn mark_offline(&mut self, character_id: u32) -> DbResult<()> {
        self.execute(
            "UPDATE characters SET is_online = is_online - 1 WHERE id = ? AND is_online > 0",
            &[character_id.into()],
        )?;
        Ok(())
    }

    pub fn record_logout(
        &mut self,
        character_id: u32,
        level: u16,
        vocation: u8,
        now: u32,
    ) -> DbResult<()> {
        self.execute(
            "UPDATE characters SET level = ?, vocation = ?, last_logout = ? WHERE id = ?",
            &[
                level.into(),
                vocation.into(),
                now.into(),
                character_id.into(),
            ],
        )?;
        Ok(())
    }

    pub fn clear_online_flags(&mut self, world_id: u16) -> DbResult<u64> {
        self.execute(
            "UPDATE characters SET is_online = 0 WHERE world_id = ? AND is_online != 0",
            &[world_id.into()],
        )
    }

    pub fn clear_online_list(&mut self, world_id: u16) -> DbResult<u64> {
        self.execute(
            "DELETE FROM online_characters WHERE world_id = ?",
            &[world_id.into()],
        )
    }

    pub fn add_online_character(
        &mut self,
        world_id: u16,
        name: &str,
        level: u16,
        vocation: u8,
    ) -> DbResult<()> {
        self.execute(
            "INSERT INTO online_characters (world_id, name, level, vocation) VALUES (?, ?, ?, ?)",
            &[
                world_id.into(),
                name.into(),
                level.into(),
                vocation.into(),
            ],
        )?;
        Ok(())
    }

    pub fn online_characters(&mut self, world_id: u16) -> DbResult<Vec<OnlineCharacter>> {
        let rows = self.query(
            "SELECT name, level, vocation FROM online_characters WHERE world_id = ? ORDER BY name",
            &[world_id.into()],
        )?;
        Ok(rows
            .iter()
            .map(|r| OnlineCharacter {
                name: r.text(0).to_owned(),
                level: r.uint(1) as u16,
                vocation: r.uint(2) as u8,
            })
            .collect())
    }

    pub fn characters_of_world(&mut self, world_id: u16) -> DbResult<Vec<PlayerEntry>> {
        let rows = self.query(
            "SELECT id, name FROM characters WHERE world_id = ? AND deleted = 0 ORDER BY id",
            &[world_id.into()],
        )?;
        Ok(rows
            .iter()
            .map(|r| PlayerEntry {
                id: r.uint(0),
                name: r.text(1).to_owned(),
            })
            .collect())
    }

    // ---- punishment ----

    pub fn record_login_attempt(
        &mut self,
        account_id: u32,
        ip: u32,
        host: &str,
        now: u32,
        failed: bool,
    ) -> DbResult<()> {
        self.execute(
            "INSERT INTO login_attempts (account_id, ip, host, attempted_at, failed) \
             VALUES (?, ?, ?, ?, ?)",
            &[
                account_id.into(),
                ip.into(),
                host.into(),
                now.into(),
                failed.into(),
            ],
        )?;
        Ok(())
    }

    pub fn active_banishment(&mut self, account_id: u32, now: u32) -> DbResult<Option<Banishment>> {
        Ok(self
            .query_row(
                "SELECT banished_until, permanent FROM banishments \
                 WHERE account_id = ? AND (permanent != 0 OR banished_until > ?) \
                 ORDER BY permanent DESC, banished_until DESC",
                &[account_id.into(), now.into()],
            )?
            .map(|r| Banishment {
                until: r.uint(0),
                permanent: r.bool(1),
            }))
    }

    pub fn banishment_count(&mut self, account_id: u32) -> DbResult<u32> {
        Ok(self
            .query_row(
                "SELECT COUNT(*) FROM banishments WHERE account_id = ?",
                &[account_id.into()],
            )?
            .map(|r| r.uint(0))
            .unwrap_or(0))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_banishment(
        &mut self,
        account_id: u32,
        gm_id: u32,
        reason: &str,
        now: u32,
        until: u32,
        permanent: bool,
    ) -> DbResult<()> {
        self.execute(
            "INSERT INTO banishments (account_id, gm_id, reason, banished_at, banished_until, permanent) \
             VALUES (?, ?, ?, ?, ?, ?)",
            &[
                account_id.into(),
                gm_id.into(),
                reason.into(),
                now.into(),
                until.into(),
                permanent.into(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_notation(
        &mut self,
        account_id: u32,
        gm_id: u32,
        reason: &str,
        now: u32,
    ) -> DbResult<()> {
        self.execute(
            "INSERT INTO notations (account_id, gm_id, reason, noted_at) VALUES (?, ?, ?, ?)",
            &[account_id.into(), gm_id.into(), reason.into(), now.into()],
        )?;
        Ok(())
    }

    pub fn notation_count(&mut self, account_id: u32) -> DbResult<u32> {
        Ok(self
            .query_row(
                "SELECT COUNT(*) FROM notations WHERE account_id = ?",
                &[account_id.into()],
            )?
            .map(|r| r.uint(0))
            .unwrap_or(0))
    }

    pub fn namelock_exists(&mut self, character_id: u32) -> DbResult<bool> {
        Ok(self
            .query_row(
                "SELECT 1 FROM namelocks WHERE character_id = ?",
                &[character_id.into()],
            )?
            .is_some())
    }

    pub fn insert_namelock(
        &mut self,
        character_id: u32,
        gm_id: u32,
        reason: &str,
        now: u32,
    ) -> DbResult<()> {
        self.execute(
            "INSERT INTO namelocks (character_id, gm_id, reason, locked_at) VALUES (?, ?, ?, ?)",
            &[
                character_id.into(),
                gm_id.into(),
                reason.into(),
                now.into(),
            ],
        )?;
        Ok(())
    }

    pub fn statement_exists(&mut self, statement_id: u32) -> DbResult<bool> {
        Ok(self
            .query_row(
                "SELECT 1 FROM statements WHERE id = ?",
                &[statement_id.into()],
            )?
            .is_some())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_statement(
        &mut self,
        statement_id: u32,
        character_id: u32,
        world_id: u16,
        said_at: u32,
        channel: &str,
        text: &str,
    ) -> DbResult<()> {
        self.execute(
            "INSERT INTO statements (id, character_id, world_id, said_at, channel, statement) \
             VALUES (?, ?, ?, ?, ?, ?)",
            &[
                statement_id.into(),
                character_id.into(),
                world_id.into(),
                said_at.into(),
                channel.into(),
                text.into(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_report(
        &mut self,
        statement_id: u32,
        character_id: u32,
        gm_id: u32,
        reason: &str,
        now: u32,
    ) -> DbResult<()> {
        self.execute(
            "INSERT INTO reported_statements (statement_id, character_id, gm_id, reason, reported_at) \
             VALUES (?, ?, ?, ?, ?)",
            &[
                statement_id.into(),
                character_id.into(),
                gm_id.into(),
                reason.into(),
                now.into(),
            ],
        )?;
        Ok(())
    }

    pub fn ip_banished(&mut self, ip: u32, now: u32) -> DbResult<bool> {
        Ok(self
            .query_row(
                "SELECT 1 FROM ip_banishments WHERE ip = ? AND banished_until > ?",
                &[ip.into(), now.into()],
            )?
            .is_some())
    }

    pub fn insert_ip_banishment(
        &mut self,
        ip: u32,
        gm_id: u32,
        reason: &str,
        now: u32,
        until: u32,
    ) -> DbResult<()> {
        self.execute(
            "INSERT INTO ip_banishments (ip, gm_id, reason, banished_at, banished_until) \
             VALUES (?, ?, ?, ?, ?)",
            &[
                ip.into(),
                gm_id.into(),
                reason.into(),
                now.into(),
                until.into(),
            ],
        )?;
        Ok(())
    }

    // ---- deaths and kill statistics ----

    pub fn insert_death(
        &mut self,
        character_id: u32,
        now: u32,
        level: u16,
        killed_by: &str,
        is_player: bool,
        unjustified: bool,
    ) -> DbResult<()> {
        self.execute(
            "INSERT INTO deaths (character_id, died_at, level, killed_by, is_player, unjustified) \
             VALUES (?, ?, ?, ?, ?, ?)",
            &[
                character_id.into(),
                now.into(),
                level.into(),
                killed_by.into(),
                is_player.into(),
                unjustified.into(),
            ],
        )?;
        Ok(())
    }

    pub fn update_kill_stat(
        &mut self,
        world_id: u16,
        race: &str,
        killed_players: u32,
        killed_by_players: u32,
        now: u32,
    ) -> DbResult<u64> {
        self.execute(
            "UPDATE kill_statistics SET killed_players = killed_players + ?, \
             killed_by_players = killed_by_players + ?, logged_at = ? \
             WHERE world_id = ? AND race = ?",
            &[
                killed_players.into(),
                killed_by_players.into(),
                now.into(),
                world_id.into(),
                race.into(),
            ],
        )
    }

    pub fn insert_kill_stat(
        &mut self,
        world_id: u16,
        race: &str,
        killed_players: u32,
        killed_by_players: u32,
        now: u32,
    ) -> DbResult<()> {
        self.execute(
            "INSERT INTO kill_statistics (world_id, race, killed_players, killed_by_players, logged_at) \
             VALUES (?, ?, ?, ?, ?)",
            &[
                world_id.into(),
                race.into(),
                killed_players.into(),
                killed_by_players.into(),
                now.into(),
            ],
        )?;
        Ok(())
    }

    pub fn kill_statistics(&mut self, world_id: u16) -> DbResult<Vec<KillStat>> {
        let rows = self.query(
            "SELECT race, killed_players, killed_by_players FROM kill_statistics \
             WHERE world_id = ? ORDER BY race",
            &[world_id.into()],
        )?;
        Ok(rows
            .iter()
            .map(|r| KillStat {
                race: r.text(0).to_owned(),
                killed_players: r.uint(1),
                killed_by_players: r.uint(2),
            })
            .collect())
    }

    // ---- buddies ----

    pub fn buddy_exists(&mut self, account_id: u32, buddy_id: u32, world_id: u16) -> DbResult<bool> {
        Ok(self
            .query_row(
                "SELECT 1 FROM buddies WHERE account_id = ? AND buddy_id = ? AND world_id = ?",
                &[account_id.into(), buddy_id.into(), world_id.into()],
            )?
            .is_some())
    }

    pub fn insert_buddy(&mut self, account_id: u32, buddy_id: u32, world_id: u16) -> DbResult<()> {
        self.execute(
            "INSERT INTO buddies (account_id, buddy_id, world_id) VALUES (?, ?, ?)",
            &[account_id.into(), buddy_id.into(), world_id.into()],
        )?;
        Ok(())
    }

    pub fn delete_buddy(&mut self, account_id: u32, buddy_id: u32, world_id: u16) -> DbResult<u64> {
        self.execute(
            "DELETE FROM buddies WHERE account_id = ? AND buddy_id = ? AND world_id = ?",
            &[account_id.into(), buddy_id.into(), world_id.into()],
        )
    }

    // ---- houses ----

    pub fn update_house(
        &mut self,
        house_id: u32,
        world_id: u16,
        name: &str,
        rent: u32,
        guildhouse: bool,
    ) -> DbResult<u64> {
        self.execute(
            "UPDATE houses SET name = ?, rent = ?, guildhouse = ? \
             WHERE id = ? AND world_id = ?",
            &[
                name.into(),
                rent.into(),
                guildhouse.into(),
                house_id.into(),
                world_id.into(),
            ],
        )
    }

    pub fn insert_house(
        &mut self,
        house_id: u32,
        world_id: u16,
        name: &str,
        rent: u32,
        guildhouse: bool,
    ) -> DbResult<()> {
        self.execute(
            "INSERT INTO houses (id, world_id, name, rent, guildhouse) VALUES (?, ?, ?, ?, ?)",
            &[
                house_id.into(),
                world_id.into(),
                name.into(),
                rent.into(),
                guildhouse.into(),
            ],
        )?;
        Ok(())
    }

    pub fn set_house_owner(
        &mut self,
        house_id: u32,
        world_id: u16,
        owner_id: u32,
        paid_until: u32,
    ) -> DbResult<()> {
        self.execute(
            "INSERT INTO house_owners (house_id, world_id, owner_id, paid_until) \
             VALUES (?, ?, ?, ?)",
            &[
                house_id.into(),
                world_id.into(),
                owner_id.into(),
                paid_until.into(),
            ],
        )?;
        Ok(())
    }

    pub fn update_house_owner(
        &mut self,
        house_id: u32,
        world_id: u16,
        owner_id: u32,
        paid_until: u32,
    ) -> DbResult<u64> {
        self.execute(
            "UPDATE house_owners SET owner_id = ?, paid_until = ? \
             WHERE house_id = ? AND world_id = ?",
            &[
                owner_id.into(),
                paid_until.into(),
                house_id.into(),
                world_id.into(),
            ],
        )
    }

    pub fn delete_house_owner(&mut self, house_id: u32, world_id: u16) -> DbResult<u64> {
        self.execute(
            "DELETE FROM house_owners WHERE house_id = ? AND world_id = ?",
            &[house_id.into(), world_id.into()],
        )
    }

    pub fn house_owners(&mut self, world_id: u16) -> DbResult<Vec<HouseOwner>> {
        let rows = self.query(
            "SELECT o.house_id, o.owner_id, c.name, o.paid_until FROM house_owners o \
             JOIN characters c ON c.id = o.owner_id \
             WHERE o.world_id = ? ORDER BY o.house_id",
            &[world_id.into()],
        )?;
        Ok(rows
            .iter()
            .map(|r| HouseOwner {
                house_id: r.uint(0),
                owner_id: r.uint(1),
                owner_name: r.text(2).to_owned(),
                paid_until: r.uint(3),
            })
            .collect())
    }

    pub fn auctions(&mut self, world_id: u16) -> DbResult<Vec<Auction>> {
        let rows = self.query(
            "SELECT a.house_id, a.bidder_id, c.name, a.bid, a.ends_at FROM auctions a \
             LEFT JOIN characters c ON c.id = a.bidder_id \
             WHERE a.world_id = ? ORDER BY a.house_id",
            &[world_id.into()],
        )?;
        Ok(rows
            .iter()
            .map(|r| Auction {
                house_id: r.uint(0),
                bidder_id: r.uint(1),
                bidder_name: r.text(2).to_owned(),
                bid: r.uint(3),
                ends_at: r.uint(4),
            })
            .collect())
    }

    pub fn auction_exists(&mut self, house_id: u32, world_id: u16) -> DbResult<bool> {
        Ok(self
            .query_row(
                "SELECT 1 FROM auctions WHERE house_id = ? AND world_id = ?",
                &[house_id.into(), world_id.into()],
            )?
            .is_some())
    }

    pub fn start_auction(&mut self, house_id: u32, world_id: u16, ends_at: u32) -> DbResult<()> {
        self.execute(
            "INSERT INTO auctions (house_id, world_id, ends_at) VALUES (?, ?, ?)",
            &[house_id.into(), world_id.into(), ends_at.into()],
        )?;
        Ok(())
    }

    pub fn finished_auctions(&mut self, world_id: u16, now: u32) -> DbResult<Vec<Auction>> {
        let rows = self.query(
            "SELECT a.house_id, a.bidder_id, c.name, a.bid, a.ends_at FROM auctions a \
             LEFT JOIN characters c ON c.id = a.bidder_id \
             WHERE a.world_id = ? AND a.ends_at <= ? ORDER BY a.house_id",
            &[world_id.into(), now.into()],
        )?;
        Ok(rows
            .iter()
            .map(|r| Auction {
                house_id: r.uint(0),
                bidder_id: r.uint(1),
                bidder_name: r.text(2).to_owned(),
                bid: r.uint(3),
                ends_at: r.uint(4),
            })
            .collect())
    }

    pub fn delete_auction(&mut self, house_id: u32, world_id: u16) -> DbResult<u64> {
        self.execute(
            "DELETE FROM auctions WHERE house_id = ? AND world_id = ?",
            &[house_id.into(), world_id.into()],
        )
    }

    pub fn clear_bidder(&mut self, world_id: u16, character_id: u32) -> DbResult<u64> {
        self.execute(
            "UPDATE auctions SET bidder_id = 0, bid = 0 WHERE world_id = ? AND bidder_id = ?",
            &[world_id.into(), character_id.into()],
        )
    }

    pub fn pending_transfers(&mut self, world_id: u16) -> DbResult<Vec<HouseTransfer>> {
        let rows = self.query(
            "SELECT id, transfer_to, transfer_price FROM houses \
             WHERE world_id = ? AND transfer_to != 0 ORDER BY id",
            &[world_id.into()],
        )?;
        Ok(rows
            .iter()
            .map(|r| HouseTransfer {
                house_id: r.uint(0),
                new_owner_id: r.uint(1),
                price: r.uint(2),
            })
            .collect())
    }

    pub fn clear_transfer(&mut self, house_id: u32, world_id: u16) -> DbResult<u64> {
        self.execute(
            "UPDATE houses SET transfer_to = 0, transfer_price = 0 \
             WHERE id = ? AND world_id = ? AND transfer_to != 0",
            &[house_id.into(), world_id.into()],
        )
    }

    pub fn evict_free_accounts(&mut self, world_id: u16, now: u32) -> DbResult<u64> {
        self.execute(
            "DELETE FROM house_owners WHERE world_id = ? AND owner_id IN \
             (SELECT c.id FROM characters c JOIN accounts a ON a.id = c.account_id \
              WHERE c.world_id = ? AND a.premium_end < ?)",
            &[world_id.into(), world_id.into(), now.into()],
        )
    }

    pub fn evict_deleted_characters(&mut self, world_id: u16) -> DbResult<u64> {
        self.execute(
            "DELETE FROM house_owners WHERE world_id = ? AND owner_id IN \
             (SELECT id FROM characters WHERE deleted != 0)",
            &[world_id.into()],
        )
    }

    pub fn evict_ex_guild_leaders(&mut self, world_id: u16) -> DbResult<u64> {
        self.execute(
            "DELETE FROM house_owners WHERE world_id = ? AND house_id IN \
             (SELECT id FROM houses WHERE world_id = ? AND guildhouse != 0) \
             AND owner_id NOT IN (SELECT leader_id FROM guilds WHERE world_id = ?)",
            &[world_id.into(), world_id.into(), world_id.into()],
        )
    }
}
