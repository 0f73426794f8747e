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

//! # Configuration
//!
//! Three layers, weakest first: compiled-in defaults, the optional YAML
//! configuration file (its path is the single optional CLI argument), and
//! `QMD_*` environment variables. Evaluation collects every error before
//! failing so a bad deployment surfaces all its problems in one run.

mod cfgenv;
mod cfgfile;
pub mod feedback;
#[cfg(test)]
mod tests;

use {
    self::feedback::{ErrorStack, WarningStack},
    crate::{
        db::stmtcache::STATEMENT_CACHE_CEILING,
        util::error::{Error, QmResult},
    },
    std::{env, fs, sync::Arc},
};

// server defaults
const DEFAULT_PORT: u16 = 7172;
const DEFAULT_WORKER_THREADS: usize = 4;
const DEFAULT_BUFFER_SIZE: usize = 65536;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_MAX_CONNECTIONS: usize = 50;
const DEFAULT_MAX_IDLE_TIME_MS: u64 = 300_000;
// cache defaults
const DEFAULT_MAX_CACHED_STATEMENTS: usize = 50;
const DEFAULT_MAX_CACHED_HOST_NAMES: usize = 100;
const DEFAULT_HOST_NAME_EXPIRE_MS: u64 = 600_000;
// database defaults
const DEFAULT_SQLITE_PATH: &str = "querymanager.db";
const DEFAULT_PG_PORT: u16 = 5432;

/// The smallest buffer that can still hold a login frame
const MINIMUM_BUFFER_SIZE: usize = 1024;

/// Connection parameters for the networked backend
#[derive(Debug, Clone, PartialEq)]
pub struct PgParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub tls: bool,
}

/// The chosen database backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendConfig {
    Sqlite {
        path: String,
        patch_dir: Option<String>,
    },
    Postgres(PgParams),
}

/// The fully evaluated configuration
#[derive(Debug, PartialEq)]
pub struct ConfigurationSet {
    pub port: u16,
    pub password: String,
    pub worker_threads: usize,
    pub buffer_size: usize,
    pub max_attempts: u32,
    pub max_connections: usize,
    /// 0 disables the idle check
    pub max_idle_time_ms: u64,
    pub max_cached_statements: usize,
    pub max_cached_host_names: usize,
    pub host_name_expire_ms: u64,
    pub backend: BackendConfig,
}

pub type SharedConfig = Arc<ConfigurationSet>;

impl Default for ConfigurationSet {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            password: String::new(),
            worker_threads: DEFAULT_WORKER_THREADS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_idle_time_ms: DEFAULT_MAX_IDLE_TIME_MS,
            max_cached_statements: DEFAULT_MAX_CACHED_STATEMENTS,
            max_cached_host_names: DEFAULT_MAX_CACHED_HOST_NAMES,
            host_name_expire_ms: DEFAULT_HOST_NAME_EXPIRE_MS,
            backend: BackendConfig::Sqlite {
                path: DEFAULT_SQLITE_PATH.to_owned(),
                patch_dir: None,
            },
        }
    }
}

/// Evaluate the configuration from all sources. The optional CLI argument
/// is the configuration file path.
pub fn evaluate() -> QmResult<(ConfigurationSet, WarningStack)> {
    let file = match env::args().nth(1) {
        Some(path) => {
            let text = fs::read_to_string(&path)
                .map_err(|e| Error::ioerror_extra(e, format!("reading config file {path}")))?;
            Some(text)
        }
        None => None,
    };
    evaluate_from(file.as_deref(), |key| env::var(key).ok())
}

/// The testable core of [`evaluate`]: sources are injected
pub fn evaluate_from(
    file: Option<&str>,
    env_source: impl Fn(&str) -> Option<String>,
) -> QmResult<(ConfigurationSet, WarningStack)> {
    let mut cfg = ConfigurationSet::default();
    let mut warnings = WarningStack::new();
    let mut errors = ErrorStack::new();

    if let Some(text) = file {
        match cfgfile::from_file(text) {
            Ok(parsed) => apply_file(&mut cfg, parsed, &mut errors),
            Err(e) => errors.push(format!("bad configuration file: {e}")),
        }
    }
    cfgenv::apply_env(&mut cfg, env_source, &mut errors);
    validate(&mut cfg, &mut warnings, &mut errors);

    if errors.is_empty() {
        Ok((cfg, warnings))
    } else {
        Err(Error::Config(errors.to_string()))
    }
}

fn apply_file(cfg: &mut ConfigurationSet, file: cfgfile::Config, errors: &mut ErrorStack) {
    if let Some(system) = file.system {
        if let Some(v) = system.port {
            cfg.port = v;
        }
        if let Some(v) = system.password {
            cfg.password = v;
        }
        if let Some(v) = system.worker_threads {
            cfg.worker_threads = v;
        }
        if let Some(v) = system.buffer_size {
            cfg.buffer_size = v;
        }
        if let Some(v) = system.max_attempts {
            cfg.max_attempts = v;
        }
        if let Some(v) = system.max_connections {
            cfg.max_connections = v;
        }
        if let Some(v) = system.max_idle_time {
            cfg.max_idle_time_ms = v;
        }
    }
    if let Some(cache) = file.cache {
        if let Some(v) = cache.max_cached_statements {
            cfg.max_cached_statements = v;
        }
        if let Some(v) = cache.max_cached_host_names {
            cfg.max_cached_host_names = v;
        }
        if let Some(v) = cache.host_name_expire_time {
            cfg.host_name_expire_ms = v;
        }
    }
    if let Some(database) = file.database {
        match database.backend.as_deref() {
            None | Some("sqlite") => {
                cfg.backend = BackendConfig::Sqlite {
                    path: database.path.unwrap_or_else(|| DEFAULT_SQLITE_PATH.to_owned()),
                    patch_dir: database.patch_dir,
                };
            }
            Some("postgres") => {
                cfg.backend = BackendConfig::Postgres(PgParams {
                    host: database.host.unwrap_or_else(|| "localhost".to_owned()),
                    port: database.port.unwrap_or(DEFAULT_PG_PORT),
                    user: database.user.unwrap_or_default(),
                    password: database.password.unwrap_or_default(),
                    dbname: database.dbname.unwrap_or_default(),
                    tls: database.tls.unwrap_or(false),
                });
            }
            Some(other) => errors.push(format!("unknown database backend `{other}`")),
        }
    }
}

fn validate(cfg: &mut ConfigurationSet, warnings: &mut WarningStack, errors: &mut ErrorStack) {
    if cfg.password.is_empty() {
        errors.push("the query manager password must be set");
    }
    if cfg.max_connections == 0 {
        errors.push("max_connections must be at least 1");
    }
    if cfg.worker_threads == 0 {
        errors.push("worker_threads must be at least 1");
    }
    if cfg.max_attempts == 0 {
        errors.push("max_attempts must be at least 1");
    }
    if cfg.buffer_size < MINIMUM_BUFFER_SIZE {
        warnings.push(format!(
            "buffer_size raised to the minimum of {MINIMUM_BUFFER_SIZE}"
        ));
        cfg.buffer_size = MINIMUM_BUFFER_SIZE;
    }
    if cfg.max_cached_statements > STATEMENT_CACHE_CEILING {
        warnings.push(format!(
            "max_cached_statements clamped to {STATEMENT_CACHE_CEILING}"
        ));
        cfg.max_cached_statements = STATEMENT_CACHE_CEILING;
    }
    if cfg.max_cached_statements == 0 {
        warnings.push("max_cached_statements raised to 1");
        cfg.max_cached_statements = 1;
    }
    if let BackendConfig::Postgres(params) = &cfg.backend {
        if params.user.is_empty() || params.dbname.is_empty() {
            errors.push("the networked backend needs at least user and dbname");
        }
    }
}
