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

//! # The work queue
//!
//! A bounded FIFO of query handles between the connection side and the
//! worker pool: one mutex, two condition variables (room for producers,
//! work for consumers), monotonic read/write indices taken modulo the
//! capacity. A full queue blocks the producer - that stall is the
//! backpressure that slows the accept side down - and an empty queue parks
//! consumers until either work or shutdown arrives.

use {
    super::query::QueryRef,
    parking_lot::{Condvar, Mutex},
    std::sync::atomic::{AtomicBool, Ordering},
};

#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueError {
    /// The query's reference count was not 1; the caller broke the
    /// handoff protocol
    Rejected,
    /// The queue is shutting down
    ShuttingDown,
}

struct Ring {
    slots: Vec<Option<QueryRef>>,
    read: u64,
    write: u64,
}

impl Ring {
    fn len(&self) -> usize {
        (self.write - self.read) as usize
    }
    fn is_full(&self) -> bool {
        self.len() == self.slots.len()
    }
}

pub struct WorkQueue {
    ring: Mutex<Ring>,
    room: Condvar,
    work: Condvar,
    shutdown: AtomicBool,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "the work queue cannot have zero capacity");
        Self {
            ring: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                read: 0,
                write: 0,
            }),
            room: Condvar::new(),
            work: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }
    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
    /// Hand a query to the workers. Takes the second reference (count
    /// 1 -> 2) before touching the ring; blocks while the queue is full.
    pub fn enqueue(&self, query: QueryRef) -> Result<(), EnqueueError> {
        if !query.try_share() {
            return Err(EnqueueError::Rejected);
        }
        let mut ring = self.ring.lock();
        if ring.is_full() {
            log::warn!("work queue full; stalling the producer");
        }
        while ring.is_full() {
            if self.is_shutdown() {
                drop(ring);
                query.release();
                return Err(EnqueueError::ShuttingDown);
            }
            self.room.wait(&mut ring);
        }
        if self.is_shutdown() {
            drop(ring);
            query.release();
            return Err(EnqueueError::ShuttingDown);
        }
        let capacity = ring.slots.len();
        let at = (ring.write % capacity as u64) as usize;
        debug_assert!(ring.slots[at].is_none(), "ring slot still occupied");
        ring.slots[at] = Some(query);
        ring.write += 1;
        drop(ring);
        self.work.notify_one();
        Ok(())
    }
    /// Take the next query; blocks while empty. `None` means shutdown -
    /// consumers leave immediately and whatever is still queued is
    /// destroyed in bulk by [`WorkQueue::drain`].
    pub fn dequeue(&self) -> Option<QueryRef> {
        let mut ring = self.ring.lock();
        loop {
            if self.is_shutdown() {
                return None;
            }
            if ring.len() > 0 {
                let capacity = ring.slots.len();
                let at = (ring.read % capacity as u64) as usize;
                let query = ring.slots[at].take();
                debug_assert!(query.is_some(), "ring slot empty at read index");
                ring.read += 1;
                drop(ring);
                self.room.notify_one();
                return query;
            }
            self.work.wait(&mut ring);
        }
    }
    /// Raise the shutdown flag and wake everyone
    pub fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _guard = self.ring.lock();
        self.work.notify_all();
        self.room.notify_all();
    }
    /// Destroy whatever never reached a worker. Teardown only.
    pub fn drain(&self) -> usize {
        let mut ring = self.ring.lock();
        let mut dropped = 0;
        while ring.len() > 0 {
            let capacity = ring.slots.len();
            let at = (ring.read % capacity as u64) as usize;
            if let Some(query) = ring.slots[at].take() {
                query.release();
                dropped += 1;
            }
            ring.read += 1;
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::workers::query::Query,
        std::{sync::Arc, thread, time::Duration},
    };

    fn q() -> QueryRef {
        Query::new(vec![1], 64, 0)
    }

    #[test]
    fn fifo_order() {
        let queue = WorkQueue::new(8);
        let a = q();
        let b = q();
        let c = q();
        queue.enqueue(a.clone()).unwrap();
        queue.enqueue(b.clone()).unwrap();
        queue.enqueue(c.clone()).unwrap();
        assert!(Arc::ptr_eq(&queue.dequeue().unwrap(), &a));
        assert!(Arc::ptr_eq(&queue.dequeue().unwrap(), &b));
        assert!(Arc::ptr_eq(&queue.dequeue().unwrap(), &c));
    }

    #[test]
    fn enqueue_takes_the_second_reference() {
        let queue = WorkQueue::new(2);
        let query = q();
        queue.enqueue(query.clone()).unwrap();
        assert_eq!(query.refs(), 2);
        // a query that is already shared is rejected
        let other = q();
        assert!(other.try_share());
        assert_eq!(queue.enqueue(other), Err(EnqueueError::Rejected));
    }

    #[test]
    fn full_queue_blocks_until_room() {
        let queue = Arc::new(WorkQueue::new(2));
        queue.enqueue(q()).unwrap();
        queue.enqueue(q()).unwrap();
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                // this must block until the main thread dequeues
                queue.enqueue(q()).unwrap();
            })
        };
        thread::sleep(Duration::from_millis(100));
        assert!(!producer.is_finished(), "producer should be blocked");
        let taken = queue.dequeue().unwrap();
        taken.release();
        producer.join().unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn shutdown_releases_blocked_consumers() {
        let queue = Arc::new(WorkQueue::new(2));
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || queue.dequeue())
            })
            .collect();
        thread::sleep(Duration::from_millis(50));
        queue.signal_shutdown();
        for c in consumers {
            assert!(c.join().unwrap().is_none());
        }
    }

    #[test]
    fn each_query_reaches_exactly_one_consumer() {
        let queue = Arc::new(WorkQueue::new(64));
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || {
                    let mut taken = 0usize;
                    while let Some(query) = queue.dequeue() {
                        query.release();
                        taken += 1;
                    }
                    taken
                })
            })
            .collect();
        for _ in 0..64 {
            queue.enqueue(q()).unwrap();
        }
        while !queue.is_empty() {
            thread::sleep(Duration::from_millis(5));
        }
        queue.signal_shutdown();
        let total: usize = consumers.into_iter().map(|c| c.join().unwrap()).sum();
        assert_eq!(total, 64);
    }

    #[test]
    fn shutdown_beats_leftover_work() {
        // consumers observing the flag leave even with work still queued
        let queue = Arc::new(WorkQueue::new(8));
        queue.enqueue(q()).unwrap();
        queue.enqueue(q()).unwrap();
        queue.signal_shutdown();
        assert!(queue.dequeue().is_none());
        assert_eq!(queue.drain(), 2);
    }

    #[test]
    fn drain_destroys_leftovers() {
        let queue = WorkQueue::new(4);
        let a = q();
        queue.enqueue(a.clone()).unwrap();
        queue.enqueue(q()).unwrap();
        assert_eq!(queue.drain(), 2);
        assert_eq!(a.refs(), 1);
        assert!(queue.is_empty());
    }
}
