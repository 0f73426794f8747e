/*
 * Created on Fri Feb 09 2024
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

use {
    super::{execute, query::Query},
    crate::{
        actions::sha256_hex,
        config::{ConfigurationSet, SharedConfig},
        db::{failing::FailingSession, Session, Value},
        protocol::{PayloadReader, Status},
        queryengine::OpCode,
        services::hostcache::HostCache,
    },
    std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

fn test_cfg() -> SharedConfig {
    Arc::new(ConfigurationSet {
        password: "secret".to_owned(),
        max_attempts: 3,
        ..ConfigurationSet::default()
    })
}

fn hosts() -> HostCache {
    HostCache::new(8, 60_000)
}

#[test]
fn retry_exhaustion_fails_the_query() {
    let cfg = test_cfg();
    let hosts = hosts();
    let checkpoints = Arc::new(AtomicU32::new(0));
    let mut session = Session::Failing(FailingSession::new(checkpoints.clone()));
    // GetWorlds has an empty request, so the first database call is what
    // fails
    let query = Query::new(vec![OpCode::GetWorlds as u8], 1024, 0);
    execute(&cfg, &hosts, &mut session, &query);
    assert_eq!(checkpoints.load(Ordering::Relaxed), cfg.max_attempts);
    assert_eq!(query.status(), Status::Failed);
    assert_eq!(query.buffer().bytes(), &[Status::Failed as u8]);
}

#[test]
fn unknown_opcode_is_failed_without_attempts() {
    let cfg = test_cfg();
    let hosts = hosts();
    let checkpoints = Arc::new(AtomicU32::new(0));
    let mut session = Session::Failing(FailingSession::new(checkpoints.clone()));
    let query = Query::new(vec![0xEE], 1024, 0);
    execute(&cfg, &hosts, &mut session, &query);
    assert_eq!(checkpoints.load(Ordering::Relaxed), 0);
    assert_eq!(query.status(), Status::Failed);
}

#[test]
fn malformed_requests_are_final() {
    let cfg = test_cfg();
    let hosts = hosts();
    let checkpoints = Arc::new(AtomicU32::new(0));
    let mut session = Session::Failing(FailingSession::new(checkpoints.clone()));
    // LoginGame with a truncated body never reaches the database
    let query = Query::new(vec![OpCode::LoginGame as u8, 1, 2], 1024, 0);
    execute(&cfg, &hosts, &mut session, &query);
    assert_eq!(checkpoints.load(Ordering::Relaxed), 1);
    assert_eq!(query.status(), Status::Failed);
}

#[test]
fn happy_path_writes_a_typed_response() {
    let cfg = test_cfg();
    let hosts = hosts();
    let mut session = crate::db::tests::mem_session();
    session
        .execute(
            "INSERT INTO worlds (id, name) VALUES (?, ?)",
            &[Value::from(1u16), Value::from("Zanera")],
        )
        .unwrap();
    let query = Query::new(vec![OpCode::GetWorlds as u8], 4096, 0);
    execute(&cfg, &hosts, &mut session, &query);
    assert_eq!(query.status(), Status::Ok);
    let buf = query.buffer();
    let bytes = buf.bytes();
    assert_eq!(bytes[0], Status::Ok as u8);
    let mut r = PayloadReader::new(&bytes[1..]);
    assert_eq!(r.u16(), 1);
    assert_eq!(r.u16(), 1);
    assert_eq!(r.string(), "Zanera");
    assert!(!r.overflowed());
}

#[test]
fn login_resolves_the_world_and_stamps_the_query() {
    let cfg = test_cfg();
    let hosts = hosts();
    let mut session = crate::db::tests::mem_session();
    session
        .execute(
            "INSERT INTO worlds (id, name) VALUES (?, ?)",
            &[Value::from(7u16), Value::from("Zanera")],
        )
        .unwrap();
    let mut payload = vec![OpCode::Login as u8, 1];
    payload.extend_from_slice(&(b"secret".len() as u16).to_le_bytes());
    payload.extend_from_slice(b"secret");
    payload.extend_from_slice(&(b"Zanera".len() as u16).to_le_bytes());
    payload.extend_from_slice(b"Zanera");
    let query = Query::new(payload, 1024, 0);
    execute(&cfg, &hosts, &mut session, &query);
    assert_eq!(query.status(), Status::Ok);
    assert_eq!(query.world_id(), 7);
}

#[test]
fn game_login_audits_even_when_the_transaction_aborts() {
    let cfg = test_cfg();
    let hosts = hosts();
    let mut session = crate::db::tests::mem_session();
    session
        .execute(
            "INSERT INTO worlds (id, name) VALUES (?, ?)",
            &[Value::from(1u16), Value::from("Zanera")],
        )
        .unwrap();
    session
        .create_account(111111, "", &sha256_hex("tibia"), 0)
        .unwrap();
    // wrong password: the credential transaction rolls back, the audit
    // row must survive anyway
    let mut payload = vec![OpCode::LoginGame as u8];
    payload.extend_from_slice(&111111u32.to_le_bytes());
    payload.extend_from_slice(&(b"Nobody".len() as u16).to_le_bytes());
    payload.extend_from_slice(b"Nobody");
    payload.extend_from_slice(&(b"wrong".len() as u16).to_le_bytes());
    payload.extend_from_slice(b"wrong");
    payload.extend_from_slice(&0x7F000001u32.to_be_bytes());
    let query = Query::new(payload, 1024, 1);
    execute(&cfg, &hosts, &mut session, &query);
    assert_eq!(query.status(), Status::Error);
    let attempts = session
        .query("SELECT failed FROM login_attempts", &[])
        .unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].bool(0));
}
