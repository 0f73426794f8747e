/*
 * Created on Wed Feb 21 2024
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

//! # The connection engine
//!
//! One listener on the loopback interface, one task per accepted
//! connection, a semaphore for the connection limit and a broadcast pair
//! for shutdown. Sockets are owned exclusively by this module - workers
//! only ever see query objects.
//!
//! A connection walks the protocol states Reading -> RequestReady ->
//! Responding -> Writing and back; the authorization gate sits between the
//! first frame and everything else.

pub mod connection;
pub mod listener;
#[cfg(test)]
mod tests;

pub use listener::{connect, Listener};

use {
    std::{
        sync::atomic::{AtomicU8, Ordering},
        time::Duration,
    },
    tokio::{sync::broadcast, time},
};

/// A connection limit safety net against absurd configurations
pub const MAXIMUM_CONNECTION_LIMIT: usize = 50_000;

/// Wraps a shutdown broadcast receiver
pub struct Terminator {
    signal: broadcast::Receiver<()>,
}

impl Terminator {
    pub fn new(signal: broadcast::Receiver<()>) -> Self {
        Self { signal }
    }
    /// Completes when the shutdown signal fires (or every sender is gone)
    pub async fn receive_signal(&mut self) {
        let _ = self.signal.recv().await;
    }
}

/// A backoff for transient accept failures
pub(self) struct NetBackoff {
    c: AtomicU8,
}

impl NetBackoff {
    const MAX_BACKOFF: u8 = 64;
    pub const fn new() -> Self {
        Self {
            c: AtomicU8::new(1),
        }
    }
    pub async fn spin(&self) {
        let c = self.c.load(Ordering::Relaxed);
        time::sleep(Duration::from_secs(c as _)).await;
        self.c.store(c << 1, Ordering::Relaxed);
    }
    pub fn should_disconnect(&self) -> bool {
        self.c.load(Ordering::Relaxed) > Self::MAX_BACKOFF
    }
}
