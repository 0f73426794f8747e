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

use super::{permitted, OpCode, Role};

#[test]
fn opcodes_roundtrip_their_wire_codes() {
    for code in 0..=u8::MAX {
        if let Some(op) = OpCode::from_raw(code) {
            assert_eq!(op as u8, code);
        }
    }
    assert_eq!(OpCode::from_raw(0), Some(OpCode::Login));
    assert_eq!(OpCode::from_raw(31), Some(OpCode::LoginAccount));
    assert_eq!(OpCode::from_raw(39), Some(OpCode::GetKillStatistics));
    assert_eq!(OpCode::from_raw(40), None);
}

#[test]
fn role_partition_is_disjoint_and_complete() {
    let mut game = 0;
    let mut login = 0;
    let mut web = 0;
    for code in 0..=u8::MAX {
        let Some(op) = OpCode::from_raw(code) else {
            continue;
        };
        if op == OpCode::Login {
            continue;
        }
        match op.role() {
            Role::Game => game += 1,
            Role::Login => login += 1,
            Role::Web => web += 1,
        }
    }
    assert_eq!(game, 30);
    assert_eq!(login, 1);
    assert_eq!(web, 8);
}

#[test]
fn whitelist_gates_by_role() {
    assert!(permitted(OpCode::LoginGame, Role::Game));
    assert!(!permitted(OpCode::LoginGame, Role::Web));
    assert!(permitted(OpCode::LoginAccount, Role::Login));
    assert!(!permitted(OpCode::LoginAccount, Role::Game));
    assert!(permitted(OpCode::GetWorlds, Role::Web));
    assert!(!permitted(OpCode::GetWorlds, Role::Login));
    // Login is only ever valid as the unauthorized first frame
    assert!(!permitted(OpCode::Login, Role::Game));
    assert!(!permitted(OpCode::Login, Role::Login));
    assert!(!permitted(OpCode::Login, Role::Web));
}

#[test]
fn names_are_log_friendly() {
    assert_eq!(OpCode::LoginGame.name(), "LoginGame");
    assert_eq!(OpCode::EvictExGuildLeaders.name(), "EvictExGuildLeaders");
}
