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

//! # The wire protocol
//!
//! Every frame on the wire is length-prefixed: a 16-bit little-endian length
//! `L` followed by `L` payload bytes. `L == 0xFFFF` escapes to a 32-bit
//! little-endian length for large payloads; `L == 0` is illegal. The same
//! framing is used in both directions.
//!
//! Within a payload, integers are little-endian unless a field is an IP
//! address (big-endian on the wire), strings are length-prefixed with the
//! same `16/0xFFFF+32` rule and booleans are a single `0`/`1` byte. The
//! typed views in [`reader`] and [`writer`] never panic on short or full
//! buffers: they zero-fill (reads) or drop the write and latch an overflow
//! flag that handlers are required to check.

pub mod reader;
pub mod writer;
#[cfg(test)]
mod tests;

pub use self::{reader::PayloadReader, writer::PayloadWriter};

/// The 16-bit escape value that announces a 32-bit extended length
pub const EXTENDED_LENGTH: u16 = 0xFFFF;
/// Size of the short frame header
pub const SHORT_HEADER: usize = 2;
/// Size of the extended frame header
pub const LONG_HEADER: usize = 6;

/// Outcome of a query, as seen on the wire and inside the pipeline.
///
/// `Pending` is internal only; it marks a query that has not reached a
/// final outcome yet (and is what the retry loop looks for). It never
/// appears in a response preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    Error = 1,
    Failed = 3,
    Pending = 4,
}

impl Status {
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Ok,
            1 => Self::Error,
            3 => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Framing violations that fail the connection
#[derive(Debug, PartialEq, Eq)]
pub enum FrameError {
    /// The peer announced a zero-length payload
    ZeroLength,
    /// The announced payload exceeds the configured buffer size
    TooLarge(usize),
}

/// Result of examining the read buffer for a complete frame
#[derive(Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// Not enough buffered data yet; read more
    Incomplete,
    /// A full frame is buffered: `header` bytes of length prefix followed
    /// by `payload` bytes
    Complete { header: usize, payload: usize },
}

/// Examine `buf` for a complete length-prefixed frame without consuming it
pub fn examine_frame(buf: &[u8], max_payload: usize) -> Result<FrameStatus, FrameError> {
    if buf.len() < SHORT_HEADER {
        return Ok(FrameStatus::Incomplete);
    }
    let short = u16::from_le_bytes([buf[0], buf[1]]);
    let (header, payload) = if short == EXTENDED_LENGTH {
        if buf.len() < LONG_HEADER {
            return Ok(FrameStatus::Incomplete);
        }
        let long = u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]);
        (LONG_HEADER, long as usize)
    } else {
        (SHORT_HEADER, short as usize)
    };
    if payload == 0 {
        return Err(FrameError::ZeroLength);
    }
    if payload > max_payload {
        return Err(FrameError::TooLarge(payload));
    }
    if buf.len() < header + payload {
        return Ok(FrameStatus::Incomplete);
    }
    Ok(FrameStatus::Complete { header, payload })
}

/// Prefix `payload` with its frame header into `out`
pub fn write_frame(out: &mut Vec<u8>, payload: &[u8]) {
    debug_assert!(!payload.is_empty(), "zero-length frames are illegal");
    if payload.len() >= EXTENDED_LENGTH as usize {
        out.extend_from_slice(&EXTENDED_LENGTH.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    } else {
        out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    }
    out.extend_from_slice(payload);
}

/// The single byte buffer a query carries through its life. The request is
/// parsed out of it and the response is written back into it; the two never
/// overlap in time because a response only begins once the handler has
/// settled on a final outcome.
#[derive(Debug)]
pub struct PayloadBuf {
    data: Vec<u8>,
    limit: usize,
    status: Status,
}

impl PayloadBuf {
    pub fn new(request: Vec<u8>, limit: usize) -> Self {
        Self {
            data: request,
            limit,
            status: Status::Pending,
        }
    }
    /// The opcode is always the first byte of the request
    pub fn opcode(&self) -> u8 {
        self.data.first().copied().unwrap_or(0)
    }
    /// A typed reader over the request body (the bytes after the opcode)
    pub fn reader(&self) -> PayloadReader<'_> {
        let body = if self.data.is_empty() {
            &[][..]
        } else {
            &self.data[1..]
        };
        PayloadReader::new(body)
    }
    /// Begin an `Ok` response, discarding the request bytes
    pub fn respond_ok(&mut self) -> PayloadWriter<'_> {
        self.status = Status::Ok;
        self.data.clear();
        let mut w = PayloadWriter::new(&mut self.data, self.limit);
        w.put_u8(Status::Ok as u8);
        w
    }
    /// Write a complete `Error(code)` response
    pub fn respond_error(&mut self, code: u8) {
        self.status = Status::Error;
        self.data.clear();
        self.data.push(Status::Error as u8);
        self.data.push(code);
    }
    /// Write a complete `Failed` response
    pub fn respond_failed(&mut self) {
        self.status = Status::Failed;
        self.data.clear();
        self.data.push(Status::Failed as u8);
    }
    pub fn status(&self) -> Status {
        self.status
    }
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}
