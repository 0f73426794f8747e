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

/// A typed, non-panicking view over a request payload.
///
/// Reads past the end of the payload yield zero values (empty strings,
/// `false`) and latch the overflow flag. A handler must check
/// [`PayloadReader::overflowed`] after parsing and before trusting any
/// value it read.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
    overflow: bool,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            overflow: false,
        }
    }
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            self.pos = self.buf.len();
            self.overflow = true;
            return None;
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }
    pub fn u8(&mut self) -> u8 {
        self.take(1).map(|s| s[0]).unwrap_or(0)
    }
    pub fn u16(&mut self) -> u16 {
        self.take(2)
            .map(|s| u16::from_le_bytes([s[0], s[1]]))
            .unwrap_or(0)
    }
    pub fn u32(&mut self) -> u32 {
        self.take(4)
            .map(|s| u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
            .unwrap_or(0)
    }
    /// 16-bit big-endian (wire order for address fields)
    pub fn u16_be(&mut self) -> u16 {
        self.take(2)
            .map(|s| u16::from_be_bytes([s[0], s[1]]))
            .unwrap_or(0)
    }
    /// 32-bit big-endian; IP addresses cross the wire in this order
    pub fn u32_be(&mut self) -> u32 {
        self.take(4)
            .map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
            .unwrap_or(0)
    }
    pub fn bool(&mut self) -> bool {
        self.u8() != 0
    }
    /// A length-prefixed string, using the same `16/0xFFFF+32` length rule
    /// as the outer frame. No character set transformation is applied
    /// beyond replacing invalid UTF-8 sequences.
    pub fn string(&mut self) -> String {
        let short = self.u16();
        let len = if short == EXTENDED_LENGTH {
            self.u32() as usize
        } else {
            short as usize
        };
        if self.overflow {
            return String::new();
        }
        match self.take(len) {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => String::new(),
        }
    }
    pub fn overflowed(&self) -> bool {
        self.overflow
    }
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}
