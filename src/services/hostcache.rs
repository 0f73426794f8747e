/*
 * Created on Tue Feb 13 2024
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

//! A bounded, expiring cache of display names for peer IPv4 addresses,
//! consulted when login attempts are audited. Entries live for
//! `HostNameExpireTime` and at most `MaxCachedHostNames` are kept; the
//! oldest entry makes room when the cache is full.

use {
    parking_lot::RwLock,
    std::{
        collections::HashMap,
        net::Ipv4Addr,
        time::{Duration, Instant},
    },
};

struct Entry {
    host: String,
    cached_at: Instant,
}

pub struct HostCache {
    entries: RwLock<HashMap<u32, Entry>>,
    capacity: usize,
    expire: Duration,
}

impl HostCache {
    pub fn new(capacity: usize, expire_ms: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            expire: Duration::from_millis(expire_ms),
        }
    }
    /// The display name for `ip`: a previously stored name while it is
    /// fresh, the dotted-quad form otherwise
    pub fn resolve(&self, ip: u32) -> String {
        if let Some(entry) = self.entries.read().get(&ip) {
            if entry.cached_at.elapsed() < self.expire {
                return entry.host.clone();
            }
        }
        let host = Ipv4Addr::from(ip).to_string();
        self.store(ip, host.clone());
        host
    }
    /// Remember a resolved name for `ip`
    pub fn store(&self, ip: u32, host: String) {
        let mut entries = self.entries.write();
        entries.retain(|_, e| e.cached_at.elapsed() < self.expire);
        if entries.len() >= self.capacity && !entries.contains_key(&ip) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.cached_at)
                .map(|(k, _)| *k)
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            ip,
            Entry {
                host,
                cached_at: Instant::now(),
            },
        );
    }
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
