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

//! Feedback for configuration evaluation: warnings are collected and
//! reported in one go, errors abort startup but are also collected so the
//! operator sees every problem at once instead of one per restart.

use std::fmt;

#[derive(Debug, Default, PartialEq)]
pub struct WarningStack {
    stack: Vec<String>,
}

impl WarningStack {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(&mut self, warning: impl ToString) {
        self.stack.push(warning.to_string());
    }
    /// Print every warning through the logger
    pub fn print_warnings(&self) {
        for warning in &self.stack {
            log::warn!("Configuration warning: {}", warning);
        }
    }
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
    pub fn len(&self) -> usize {
        self.stack.len()
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct ErrorStack {
    stack: Vec<String>,
}

impl ErrorStack {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(&mut self, error: impl ToString) {
        self.stack.push(error.to_string());
    }
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

impl fmt::Display for ErrorStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.stack {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
            first = false;
        }
        Ok(())
    }
}
