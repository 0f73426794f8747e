/*
 * Created on Wed Feb 07 2024
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

//! # The query object
//!
//! One `Query` is allocated per request frame and carries the shared byte
//! buffer the request was read into and the response will be written into.
//! Ownership is tracked by an explicit reference count:
//!
//! - count 1: exactly one side owns it (the connection before the handoff
//!   and after the worker releases, or the queue/worker in between)
//! - count 2: the handoff window - the connection and the worker pipeline
//!   both hold it
//! - count 0: the query is dead; dropping the last [`QueryRef`] frees the
//!   buffer
//!
//! The connection never touches the buffer between the enqueue and the
//! moment the count returns to 1, which is what makes the unsynchronized
//! request/response buffer reuse sound. The count going back to 1 pings
//! [`Query::wait_released`], the reply-channel half of the handoff.

use {
    crate::protocol::{PayloadBuf, Status},
    parking_lot::{Mutex, MutexGuard},
    std::sync::{
        atomic::{AtomicU32, AtomicU8, Ordering},
        Arc,
    },
    tokio::sync::Notify,
};

pub type QueryRef = Arc<Query>;

pub struct Query {
    opcode: u8,
    world_id: AtomicU32,
    refs: AtomicU32,
    status: AtomicU8,
    buf: Mutex<PayloadBuf>,
    done: Notify,
}

impl Query {
    /// Allocate a query for a complete request payload. The count starts
    /// at 1: the connection owns it.
    pub fn new(request: Vec<u8>, buffer_limit: usize, world_id: u16) -> QueryRef {
        let opcode = request.first().copied().unwrap_or(0);
        Arc::new(Self {
            opcode,
            world_id: AtomicU32::new(world_id as u32),
            refs: AtomicU32::new(1),
            status: AtomicU8::new(Status::Pending as u8),
            buf: Mutex::new(PayloadBuf::new(request, buffer_limit)),
            done: Notify::new(),
        })
    }
    pub fn opcode(&self) -> u8 {
        self.opcode
    }
    /// The world this query is bound to; 0 until authorization stamps one
    pub fn world_id(&self) -> u16 {
        self.world_id.load(Ordering::Acquire) as u16
    }
    pub fn set_world_id(&self, world_id: u16) {
        self.world_id.store(world_id as u32, Ordering::Release);
    }
    pub fn status(&self) -> Status {
        Status::from_raw(self.status.load(Ordering::Acquire))
    }
    pub fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }
    pub fn refs(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }
    /// Take the second reference for the worker pipeline. Fails unless the
    /// count is exactly 1 - anything else is a pipeline bug.
    pub(crate) fn try_share(&self) -> bool {
        self.refs
            .compare_exchange(1, 2, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
    /// Drop one reference. Returns the remaining count; hitting 1 wakes
    /// the connection task so it can flush the response.
    pub fn release(&self) -> u32 {
        let prev = self.refs.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "query reference count went negative");
        let now = prev - 1;
        if now == 1 {
            self.done.notify_one();
        }
        now
    }
    /// Wait until the worker side has released its reference
    pub async fn wait_released(&self) {
        loop {
            let notified = self.done.notified();
            if self.refs.load(Ordering::Acquire) == 1 {
                return;
            }
            notified.await;
        }
    }
    /// The shared request/response buffer. Uncontended by protocol: the
    /// lock only crosses threads at the handoff edges.
    pub fn buffer(&self) -> MutexGuard<'_, PayloadBuf> {
        self.buf.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refcount_lifecycle() {
        let q = Query::new(vec![1, 2, 3], 64, 0);
        assert_eq!(q.refs(), 1);
        assert!(q.try_share());
        assert_eq!(q.refs(), 2);
        // a second share must fail: the count is not 1
        assert!(!q.try_share());
        assert_eq!(q.release(), 1);
        assert_eq!(q.release(), 0);
    }

    #[test]
    #[should_panic(expected = "reference count went negative")]
    fn release_below_zero_panics() {
        let q = Query::new(vec![1], 64, 0);
        q.release();
        q.release();
    }

    #[tokio::test]
    async fn wait_released_sees_the_worker_release() {
        let q = Query::new(vec![1], 64, 0);
        assert!(q.try_share());
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.wait_released().await });
        // simulate the worker finishing on another thread
        let q3 = q.clone();
        std::thread::spawn(move || {
            q3.release();
        });
        waiter.await.unwrap();
        assert_eq!(q.refs(), 1);
    }

    #[test]
    fn status_and_world_stamp() {
        let q = Query::new(vec![7], 64, 0);
        assert_eq!(q.status(), Status::Pending);
        q.set_status(Status::Ok);
        assert_eq!(q.status(), Status::Ok);
        q.set_world_id(3);
        assert_eq!(q.world_id(), 3);
    }
}
