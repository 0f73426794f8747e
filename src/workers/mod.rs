/*
 * Created on Fri Feb 09 2024
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

//! # The worker pool
//!
//! A fixed number of OS threads, each owning one database session and its
//! statement cache for the whole process lifetime. The pool size is the
//! configured thread count capped by what the backend tolerates (the
//! embedded engine caps it at one). Startup is a barrier: the pool is only
//! up once every worker has opened its session, and a single failure fails
//! initialization.
//!
//! The execution loop runs each dequeued query through its handler with
//! `max_attempts` tries. Only an operational error earns a retry - the
//! worker re-checkpoints the session in between, which is what brings a
//! dead networked session back. Logical outcomes are final on the first
//! try.

pub mod query;
pub mod queue;

#[cfg(test)]
mod tests;

use {
    self::{query::QueryRef, queue::WorkQueue},
    crate::{
        actions::{ActionCtx, ActionError},
        config::SharedConfig,
        db::Session,
        protocol::Status,
        queryengine::{self, OpCode},
        services::hostcache::HostCache,
        util::error::{Error, QmResult},
    },
    std::{
        sync::{mpsc, Arc},
        thread,
    },
};

pub struct WorkerPool {
    handles: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn the workers and wait for each to become active. Any worker
    /// that dies before activation fails the whole startup.
    pub fn start(
        cfg: SharedConfig,
        hosts: Arc<HostCache>,
        queue: Arc<WorkQueue>,
    ) -> QmResult<Self> {
        let count = cfg
            .worker_threads
            .min(Session::concurrency_cap(&cfg.backend))
            .max(1);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<usize, String>>();
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let cfg = cfg.clone();
            let hosts = hosts.clone();
            let queue = queue.clone();
            let ready = ready_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("qm-worker-{id}"))
                .spawn(move || {
                    let session = match Session::connect(&cfg.backend, cfg.max_cached_statements)
                    {
                        Ok(session) => {
                            let _ = ready.send(Ok(id));
                            session
                        }
                        Err(e) => {
                            let _ = ready.send(Err(format!("worker {id}: {e}")));
                            return;
                        }
                    };
                    run_worker(id, &cfg, &hosts, queue, session);
                })
                .map_err(|e| Error::ioerror_extra(e, "spawning a worker thread"))?;
            handles.push(handle);
        }
        drop(ready_tx);
        for _ in 0..count {
            match ready_rx.recv() {
                Ok(Ok(id)) => log::debug!("worker {id} active"),
                Ok(Err(e)) => return Err(Error::WorkerInit(e)),
                Err(_) => return Err(Error::WorkerInit("a worker died before activation".into())),
            }
        }
        log::info!("Started {count} query worker(s)");
        Ok(Self { handles })
    }
    /// Wait for every worker to exit; call after the queue was shut down
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn run_worker(
    id: usize,
    cfg: &SharedConfig,
    hosts: &HostCache,
    queue: Arc<WorkQueue>,
    mut session: Session,
) {
    log::debug!("worker {id} entering its run loop");
    while let Some(query) = queue.dequeue() {
        execute(cfg, hosts, &mut session, &query);
        query.release();
    }
    session.teardown();
    log::debug!("worker {id} done");
}

/// Run one query to a final status
pub(crate) fn execute(
    cfg: &SharedConfig,
    hosts: &HostCache,
    session: &mut Session,
    query: &QueryRef,
) {
    let Some(op) = OpCode::from_raw(query.opcode()) else {
        log::error!("unknown opcode {} reached a worker", query.opcode());
        query.buffer().respond_failed();
        query.set_status(Status::Failed);
        return;
    };
    query.set_status(Status::Pending);
    for attempt in 1..=cfg.max_attempts {
        if let Err(e) = session.checkpoint() {
            log::warn!(
                "{}: checkpoint failed (attempt {attempt}/{}): {e}",
                op.name(),
                cfg.max_attempts
            );
            continue;
        }
        let mut buf = query.buffer();
        let mut ctx = ActionCtx {
            db: &mut *session,
            query,
            cfg,
            hosts,
        };
        match queryengine::dispatch(op, &mut ctx, &mut buf) {
            Ok(()) => {
                // a handler that returns without writing a response is a
                // bug; never leak Pending to the wire
                let status = buf.status();
                if status == Status::Pending {
                    log::error!("{}: handler produced no response", op.name());
                    buf.respond_failed();
                    query.set_status(Status::Failed);
                } else {
                    query.set_status(status);
                }
                return;
            }
            Err(ActionError::Malformed) => {
                log::warn!("{}: malformed request", op.name());
                buf.respond_failed();
                query.set_status(Status::Failed);
                return;
            }
            Err(ActionError::Db(e)) => {
                log::warn!(
                    "{}: operational failure (attempt {attempt}/{}): {e}",
                    op.name(),
                    cfg.max_attempts
                );
            }
        }
    }
    query.buffer().respond_failed();
    query.set_status(Status::Failed);
}
