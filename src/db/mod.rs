/*
 * Created on Mon Jan 22 2024
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

//! # The database layer
//!
//! A worker owns exactly one [`Session`] for its whole life. The session is
//! an enum over the two supported backends - the embedded SQLite file and a
//! networked PostgreSQL server - so that the query handlers never see a
//! driver type. The split of responsibilities:
//!
//! - this module: the error/value model, the session facade and the
//!   transaction scope guard
//! - [`ops`]: one method per table interaction (what the handlers call)
//! - [`stmtcache`]: the per-session LRU of prepared statements
//! - [`migrate`]: the schema version gate and the patch runner
//!
//! The error contract is the backbone of the retry policy: a `DbError` is
//! always an *operational* failure (lost connection, driver error,
//! deadlock) and makes the worker retry the whole handler. Logical
//! emptiness is never an error - a missing row comes back as `None` or a
//! zero value and the handler decides what it means.

pub mod migrate;
mod ops;
pub mod pg;
pub mod sqlite;
pub mod stmtcache;
pub mod values;

#[cfg(test)]
pub mod failing;

pub use ops::*;

use {
    crate::config::BackendConfig,
    std::{
        fmt,
        ops::{Deref, DerefMut},
    },
};

pub type DbResult<T> = Result<T, DbError>;

/// An operational database failure. Every variant is retryable.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Postgres(postgres::Error),
    Tls(native_tls::Error),
    /// The session is gone and `checkpoint` could not bring it back
    Disconnected,
    /// A value came back in a shape no handler can use
    BadValue(&'static str),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "sqlite error: {}", e),
            Self::Postgres(e) => write!(f, "postgres error: {}", e),
            Self::Tls(e) => write!(f, "tls error: {}", e),
            Self::Disconnected => write!(f, "session disconnected"),
            Self::BadValue(what) => write!(f, "unusable value: {}", what),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

impl From<postgres::Error> for DbError {
    fn from(e: postgres::Error) -> Self {
        Self::Postgres(e)
    }
}

impl From<native_tls::Error> for DbError {
    fn from(e: native_tls::Error) -> Self {
        Self::Tls(e)
    }
}

/// A parameter or result value, backend-agnostic
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(v as i64)
    }
}
impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Self::Int(v as i64)
    }
}
impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::Int(v as i64)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// One result row. Accessors return zero values for `NULL` columns so that
/// logical emptiness needs no unwrapping at the call sites.
#[derive(Debug, Clone)]
pub struct Row(pub(crate) Vec<Value>);

impl Row {
    pub fn int(&self, idx: usize) -> i64 {
        match self.0.get(idx) {
            Some(Value::Int(v)) => *v,
            Some(Value::Bool(b)) => *b as i64,
            // computed intervals reach the row layer as text on backends
            // without a first-class interval type
            Some(Value::Text(s)) => values::parse_interval(s).unwrap_or(0),
            _ => 0,
        }
    }
    pub fn uint(&self, idx: usize) -> u32 {
        self.int(idx).clamp(0, u32::MAX as i64) as u32
    }
    pub fn text(&self, idx: usize) -> &str {
        match self.0.get(idx) {
            Some(Value::Text(s)) => s,
            _ => "",
        }
    }
    pub fn bool(&self, idx: usize) -> bool {
        match self.0.get(idx) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Int(v)) => *v != 0,
            _ => false,
        }
    }
}

/// A long-lived per-worker database session
pub enum Session {
    Sqlite(sqlite::SqliteSession),
    Postgres(pg::PgSession),
    #[cfg(test)]
    Failing(failing::FailingSession),
}

impl Session {
    /// Open a session against the configured backend
    pub fn connect(backend: &BackendConfig, max_cached_statements: usize) -> DbResult<Self> {
        match backend {
            BackendConfig::Sqlite { path, .. } => Ok(Self::Sqlite(sqlite::SqliteSession::open(
                path,
                max_cached_statements,
            )?)),
            BackendConfig::Postgres(params) => Ok(Self::Postgres(pg::PgSession::connect(
                params.clone(),
                max_cached_statements,
            )?)),
        }
    }
    /// The number of sessions the backend tolerates concurrently. The
    /// embedded engine serializes writes, so it caps the worker pool at 1.
    pub fn concurrency_cap(backend: &BackendConfig) -> usize {
        match backend {
            BackendConfig::Sqlite { .. } => 1,
            BackendConfig::Postgres(_) => usize::MAX,
        }
    }
    /// Liveness hook run before every handler attempt. A no-op for the
    /// embedded engine; for the networked backend it reconnects a dead
    /// session, rebuilding the statement cache from empty.
    pub fn checkpoint(&mut self) -> DbResult<()> {
        match self {
            Self::Sqlite(_) => Ok(()),
            Self::Postgres(s) => s.checkpoint(),
            #[cfg(test)]
            Self::Failing(s) => s.checkpoint(),
        }
    }
    pub fn query(&mut self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>> {
        match self {
            Self::Sqlite(s) => s.query(sql, params),
            Self::Postgres(s) => s.query(sql, params),
            #[cfg(test)]
            Self::Failing(s) => s.query(sql, params),
        }
    }
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> DbResult<u64> {
        match self {
            Self::Sqlite(s) => s.execute(sql, params),
            Self::Postgres(s) => s.execute(sql, params),
            #[cfg(test)]
            Self::Failing(s) => s.execute(sql, params),
        }
    }
    /// Run unparameterized statements outside the statement cache
    pub fn batch(&mut self, sql: &str) -> DbResult<()> {
        match self {
            Self::Sqlite(s) => s.batch(sql),
            Self::Postgres(s) => s.batch(sql),
            #[cfg(test)]
            Self::Failing(s) => s.batch(sql),
        }
    }
    /// Open a transaction scope. The scope rolls back on drop unless
    /// explicitly committed.
    pub fn transaction(&mut self) -> DbResult<Transaction<'_>> {
        self.batch("BEGIN")?;
        Ok(Transaction {
            sess: self,
            open: true,
        })
    }
    /// Graceful teardown: release every server-side prepared statement
    /// while the connection is still alive
    pub fn teardown(&mut self) {
        match self {
            Self::Sqlite(_) => (),
            Self::Postgres(s) => s.teardown(),
            #[cfg(test)]
            Self::Failing(_) => (),
        }
    }
    /// Convenience: first row of a query, if any
    pub fn query_row(&mut self, sql: &str, params: &[Value]) -> DbResult<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }
}

/// A transaction scope guard. Dropping the guard without calling
/// [`Transaction::commit`] rolls the transaction back, so every early
/// return inside a handler aborts cleanly.
pub struct Transaction<'a> {
    sess: &'a mut Session,
    open: bool,
}

impl Transaction<'_> {
    pub fn commit(mut self) -> DbResult<()> {
        self.open = false;
        self.sess.batch("COMMIT")
    }
}

impl Deref for Transaction<'_> {
    type Target = Session;
    fn deref(&self) -> &Session {
        self.sess
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.sess
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.open {
            // a rollback failure here means the session is gone; the next
            // checkpoint will notice
            let _ = self.sess.batch("ROLLBACK");
        }
    }
}
