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

//! The YAML configuration file shape. Every key is optional; whatever is
//! absent keeps its default or is overridden by the environment later.
//!
//! ```yaml
//! system:
//!   port: 7172
//!   password: oursecret
//!   worker_threads: 4
//!   max_connections: 50
//! database:
//!   backend: sqlite
//!   path: querymanager.db
//!   patch_dir: dbpatches
//! cache:
//!   max_cached_statements: 50
//! ```

use serde::Deserialize;

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    pub system: Option<SystemConfig>,
    pub database: Option<DatabaseConfig>,
    pub cache: Option<CacheConfig>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct SystemConfig {
    pub port: Option<u16>,
    pub password: Option<String>,
    pub worker_threads: Option<usize>,
    pub buffer_size: Option<usize>,
    pub max_attempts: Option<u32>,
    pub max_connections: Option<usize>,
    pub max_idle_time: Option<u64>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub backend: Option<String>,
    // embedded backend
    pub path: Option<String>,
    pub patch_dir: Option<String>,
    // networked backend
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
    pub tls: Option<bool>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct CacheConfig {
    pub max_cached_statements: Option<usize>,
    pub max_cached_host_names: Option<usize>,
    pub host_name_expire_time: Option<u64>,
}

pub fn from_file(text: &str) -> Result<Config, serde_yaml::Error> {
    serde_yaml::from_str(text)
}
