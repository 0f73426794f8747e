/*
 * Created on Thu Feb 15 2024
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

//! # Actions
//!
//! One module per query family. A handler parses its request fields from
//! the payload (checking the overflow flag before trusting anything),
//! issues database operations, and writes its response only once the
//! outcome is final - the response shares the request's buffer. A handler
//! that mutates more than one table runs inside a transaction scope.
//!
//! The error discipline, end to end:
//! - `Err(ActionError::Db(_))` - operational; the worker retries
//! - `Err(ActionError::Malformed)` - protocol garbage; `Failed`, no retry
//! - `buf.respond_error(code)` - a logical outcome; final, per-handler
//!   codes documented on each handler

pub mod buddy;
pub mod game;
pub mod houses;
pub mod login;
pub mod maintenance;
pub mod punish;
pub mod web;

use {
    crate::{
        config::ConfigurationSet,
        db::{DbError, Session},
        protocol::{PayloadReader, PayloadWriter},
        services::hostcache::HostCache,
        workers::query::Query,
    },
    sha2::{Digest, Sha256},
    std::fmt::Write as _,
};

pub type ActionResult<T> = Result<T, ActionError>;

#[derive(Debug)]
pub enum ActionError {
    /// The backend failed; the query stays `Pending` and is retried
    Db(DbError),
    /// The request (or the response) did not fit its frame
    Malformed,
}

impl From<DbError> for ActionError {
    fn from(e: DbError) -> Self {
        Self::Db(e)
    }
}

/// Everything a handler may touch
pub struct ActionCtx<'a> {
    pub db: &'a mut Session,
    pub query: &'a Query,
    pub cfg: &'a ConfigurationSet,
    pub hosts: &'a HostCache,
}

impl ActionCtx<'_> {
    /// The world the connection authorized against
    pub fn world(&self) -> u16 {
        self.query.world_id()
    }
}

/// Bail out with `Malformed` if the request ran short
pub(crate) fn parsed(r: &PayloadReader<'_>) -> ActionResult<()> {
    if r.overflowed() {
        Err(ActionError::Malformed)
    } else {
        Ok(())
    }
}

/// Commit a response writer, failing the query if it overflowed
pub(crate) fn done(w: PayloadWriter<'_>) -> ActionResult<()> {
    if w.finish() {
        Ok(())
    } else {
        Err(ActionError::Malformed)
    }
}

/// The stored form of account passwords
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::sha256_hex;

    #[test]
    fn password_digest_is_hex_sha256() {
        assert_eq!(
            sha256_hex("tibia"),
            "85ba1d26a6f28a7ceb1d34e3e5b7a031497b46c18dd1dcf06bdd6fa27d97e671"
        );
        assert_eq!(sha256_hex("").len(), 64);
    }
}
