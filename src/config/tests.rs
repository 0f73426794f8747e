/*
 * Created on Sat Feb 03 2024
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
    super::{evaluate_from, BackendConfig},
    crate::db::stmtcache::STATEMENT_CACHE_CEILING,
    std::collections::HashMap,
};

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn defaults_with_password_pass() {
    let (cfg, warnings) =
        evaluate_from(None, |k| (k == "QMD_PASSWORD").then(|| "secret".to_owned())).unwrap();
    assert_eq!(cfg.port, 7172);
    assert_eq!(cfg.password, "secret");
    assert_eq!(cfg.worker_threads, 4);
    assert_eq!(cfg.max_connections, 50);
    assert!(matches!(cfg.backend, BackendConfig::Sqlite { .. }));
    assert!(warnings.is_empty());
}

#[test]
fn missing_password_is_an_error() {
    assert!(evaluate_from(None, no_env).is_err());
}

#[test]
fn file_layer_applies() {
    let yaml = "
system:
  port: 9000
  password: filesecret
  max_connections: 8
database:
  backend: postgres
  host: db.internal
  user: qm
  dbname: game
";
    let (cfg, _) = evaluate_from(Some(yaml), no_env).unwrap();
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.password, "filesecret");
    assert_eq!(cfg.max_connections, 8);
    match cfg.backend {
        BackendConfig::Postgres(p) => {
            assert_eq!(p.host, "db.internal");
            assert_eq!(p.port, 5432);
            assert_eq!(p.user, "qm");
            assert_eq!(p.dbname, "game");
            assert!(!p.tls);
        }
        other => panic!("wrong backend: {other:?}"),
    }
}

#[test]
fn env_layer_beats_the_file() {
    let yaml = "
system:
  port: 9000
  password: filesecret
";
    let env: HashMap<&str, &str> =
        [("QMD_PORT", "9100"), ("QMD_PASSWORD", "envsecret")].into();
    let (cfg, _) = evaluate_from(Some(yaml), |k| env.get(k).map(|v| v.to_string())).unwrap();
    assert_eq!(cfg.port, 9100);
    assert_eq!(cfg.password, "envsecret");
}

#[test]
fn bad_env_values_are_collected() {
    let env: HashMap<&str, &str> = [
        ("QMD_PASSWORD", "x"),
        ("QMD_PORT", "not-a-port"),
        ("QMD_MAX_CONNECTIONS", "many"),
    ]
    .into();
    let err = evaluate_from(None, |k| env.get(k).map(|v| v.to_string())).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("QMD_PORT"));
    assert!(text.contains("QMD_MAX_CONNECTIONS"));
}

#[test]
fn absurd_statement_cache_is_clamped_with_warning() {
    let env: HashMap<&str, &str> = [
        ("QMD_PASSWORD", "x"),
        ("QMD_MAX_CACHED_STATEMENTS", "100000"),
    ]
    .into();
    let (cfg, warnings) = evaluate_from(None, |k| env.get(k).map(|v| v.to_string())).unwrap();
    assert_eq!(cfg.max_cached_statements, STATEMENT_CACHE_CEILING);
    assert_eq!(warnings.len(), 1);
}

#[test]
fn unknown_backend_is_an_error() {
    let yaml = "
system:
  password: x
database:
  backend: oracle
";
    assert!(evaluate_from(Some(yaml), no_env).is_err());
}

#[test]
fn postgres_needs_user_and_dbname() {
    let yaml = "
system:
  password: x
database:
  backend: postgres
";
    assert!(evaluate_from(Some(yaml), no_env).is_err());
}
