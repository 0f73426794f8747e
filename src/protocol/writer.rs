/*
 * Created on Thu Jan 18 2024
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

use super::EXTENDED_LENGTH;

/// A bounded typed writer over a response payload.
///
/// A write that would exceed the buffer limit is dropped whole and latches
/// the overflow flag; nothing past the limit is ever touched. Handlers
/// check the flag through [`PayloadWriter::finish`] before committing a
/// response.
#[derive(Debug)]
pub struct PayloadWriter<'a> {
    buf: &'a mut Vec<u8>,
    limit: usize,
    overflow: bool,
}

impl<'a> PayloadWriter<'a> {
    pub fn new(buf: &'a mut Vec<u8>, limit: usize) -> Self {
        Self {
            buf,
            limit,
            overflow: false,
        }
    }
    fn put(&mut self, bytes: &[u8]) {
        if self.buf.len() + bytes.len() > self.limit {
            self.overflow = true;
            return;
        }
        self.buf.extend_from_slice(bytes);
    }
    pub fn put_u8(&mut self, v: u8) {
        self.put(&[v]);
    }
    pub fn put_u16(&mut self, v: u16) {
        self.put(&v.to_le_bytes());
    }
    pub fn put_u32(&mut self, v: u32) {
        self.put(&v.to_le_bytes());
    }
    pub fn put_u16_be(&mut self, v: u16) {
        self.put(&v.to_be_bytes());
    }
    pub fn put_u32_be(&mut self, v: u32) {
        self.put(&v.to_be_bytes());
    }
    pub fn put_bool(&mut self, v: bool) {
        self.put_u8(v as u8);
    }
    pub fn put_string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        // reserve space for the longest prefix the value needs, then write
        // atomically so a partial field never reaches the buffer
        let prefix = if bytes.len() >= EXTENDED_LENGTH as usize {
            6
        } else {
            2
        };
        if self.buf.len() + prefix + bytes.len() > self.limit {
            self.overflow = true;
            return;
        }
        if bytes.len() >= EXTENDED_LENGTH as usize {
            self.buf.extend_from_slice(&EXTENDED_LENGTH.to_le_bytes());
            self.buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        } else {
            self.buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
        }
        self.buf.extend_from_slice(bytes);
    }
    pub fn overflowed(&self) -> bool {
        self.overflow
    }
    /// True if every write fit within the buffer limit
    pub fn finish(self) -> bool {
        !self.overflow
    }
}
