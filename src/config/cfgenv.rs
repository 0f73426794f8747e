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

//! `QMD_*` environment overrides, the strongest configuration layer.

use {
    super::{feedback::ErrorStack, BackendConfig, ConfigurationSet},
    core::str::FromStr,
};

fn layer<T: FromStr>(
    source: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
    errors: &mut ErrorStack,
) {
    if let Some(raw) = source(key) {
        match raw.parse() {
            Ok(v) => *target = v,
            Err(_) => errors.push(format!("bad value for {key}: `{raw}`")),
        }
    }
}

pub(super) fn apply_env(
    cfg: &mut ConfigurationSet,
    source: impl Fn(&str) -> Option<String>,
    errors: &mut ErrorStack,
) {
    layer(&source, "QMD_PORT", &mut cfg.port, errors);
    layer(&source, "QMD_PASSWORD", &mut cfg.password, errors);
    layer(&source, "QMD_WORKER_THREADS", &mut cfg.worker_threads, errors);
    layer(&source, "QMD_BUFFER_SIZE", &mut cfg.buffer_size, errors);
    layer(&source, "QMD_MAX_ATTEMPTS", &mut cfg.max_attempts, errors);
    layer(
        &source,
        "QMD_MAX_CONNECTIONS",
        &mut cfg.max_connections,
        errors,
    );
    layer(
        &source,
        "QMD_MAX_IDLE_TIME",
        &mut cfg.max_idle_time_ms,
        errors,
    );
    layer(
        &source,
        "QMD_MAX_CACHED_STATEMENTS",
        &mut cfg.max_cached_statements,
        errors,
    );
    layer(
        &source,
        "QMD_MAX_CACHED_HOST_NAMES",
        &mut cfg.max_cached_host_names,
        errors,
    );
    layer(
        &source,
        "QMD_HOST_NAME_EXPIRE_TIME",
        &mut cfg.host_name_expire_ms,
        errors,
    );
    // the sqlite path is the only backend field that makes sense to flip
    // from the environment (test and container setups)
    if let Some(path) = source("QMD_SQLITE_PATH") {
        cfg.backend = BackendConfig::Sqlite {
            path,
            patch_dir: match &cfg.backend {
                BackendConfig::Sqlite { patch_dir, .. } => patch_dir.clone(),
                BackendConfig::Postgres(_) => None,
            },
        };
    }
}
