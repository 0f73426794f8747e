/*
 * Created on Fri Jan 26 2024
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

//! A session that refuses every operation; lets the tests watch the retry
//! machinery without a database that actually misbehaves.

use {
    super::{DbError, DbResult, Row, Value},
    std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

#[derive(Default)]
pub struct FailingSession {
    checkpoints: Arc<AtomicU32>,
}

impl FailingSession {
    pub fn new(checkpoints: Arc<AtomicU32>) -> Self {
        Self { checkpoints }
    }
    pub fn checkpoint(&mut self) -> DbResult<()> {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    pub fn query(&mut self, _: &str, _: &[Value]) -> DbResult<Vec<Row>> {
        Err(DbError::Disconnected)
    }
    pub fn execute(&mut self, _: &str, _: &[Value]) -> DbResult<u64> {
        Err(DbError::Disconnected)
    }
    pub fn batch(&mut self, _: &str) -> DbResult<()> {
        Err(DbError::Disconnected)
    }
}
