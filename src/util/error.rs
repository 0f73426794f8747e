/*
 * Created on Tue Jan 16 2024
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
    crate::db::DbError,
    std::{fmt, io::Error as IoError},
};

pub type QmResult<T> = Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Config(String),
    IoError(IoError),
    IoErrorExtra(IoError, String),
    Db(DbError),
    SchemaMismatch { expected: u32, found: u32 },
    WorkerInit(String),
}

impl Error {
    pub fn ioerror_extra(ioe: IoError, extra: impl ToString) -> Self {
        Self::IoErrorExtra(ioe, extra.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(cerr) => write!(f, "Configuration error: {}", cerr),
            Self::IoError(nerr) => write!(f, "I/O error: {}", nerr),
            Self::IoErrorExtra(ioe, extra) => write!(f, "I/O error while {extra}: {ioe}"),
            Self::Db(derr) => write!(f, "Database error: {}", derr),
            Self::SchemaMismatch { expected, found } => write!(
                f,
                "Schema version mismatch: compiled for {expected}, store has {found}"
            ),
            Self::WorkerInit(werr) => write!(f, "Worker startup failure: {}", werr),
        }
    }
}

impl From<IoError> for Error {
    fn from(ioe: IoError) -> Self {
        Self::IoError(ioe)
    }
}

impl From<DbError> for Error {
    fn from(derr: DbError) -> Self {
        Self::Db(derr)
    }
}
