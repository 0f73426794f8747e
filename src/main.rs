/*
 * Created on Mon Feb 26 2024
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

//! # qmd
//!
//! The query manager daemon: a loopback-only TCP front between the game
//! world, login and web services and their shared SQL store. Clients
//! authorize with a shared secret and an application role, then submit
//! typed queries that a pool of database-bound workers answers. See the
//! modules for the details: `protocol` (framing), `dbnet` (connections),
//! `workers` (queue and pool), `queryengine`/`actions` (dispatch and
//! handlers), `db` (the backend abstraction).

mod actions;
mod config;
mod db;
mod dbnet;
mod protocol;
mod queryengine;
mod services;
#[cfg(test)]
mod tests;
mod util;
mod workers;

use {
    crate::{
        config::SharedConfig,
        db::Session,
        services::hostcache::HostCache,
        util::error::QmResult,
        workers::{queue::WorkQueue, WorkerPool},
    },
    env_logger::Builder,
    std::{env, fs, io::Write, path, process, sync::Arc},
    tokio::sync::broadcast,
};

const PID_FILE: &str = ".qmd_pid";

fn main() {
    Builder::new()
        .parse_filters(&env::var("QMD_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();
    let (cfg, warnings) = match config::evaluate() {
        Ok(ret) => ret,
        Err(e) => {
            log::error!("{e}");
            util::exit_error();
        }
    };
    warnings.print_warnings();
    let cfg: SharedConfig = Arc::new(cfg);
    let pid_file = run_pre_startup_tasks();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("server")
        .enable_all()
        .build()
        .unwrap();
    let outcome = runtime.block_on(run(cfg));
    drop(runtime);
    drop(pid_file);
    if let Err(e) = fs::remove_file(PID_FILE) {
        log::error!("Shutdown failure: failed to remove pid file: {e}");
    }
    if let Err(e) = outcome {
        log::error!("{e}");
        util::exit_error();
    }
    log::info!("Goodbye");
}

/// Bring the store, the workers and the listener up; then wait for a
/// termination signal and unwind in reverse order.
async fn run(cfg: SharedConfig) -> QmResult<()> {
    // the schema gate runs on a bootstrap session before anything serves
    {
        let mut bootstrap = Session::connect(&cfg.backend, cfg.max_cached_statements)?;
        db::migrate::prepare_store(&mut bootstrap, &cfg.backend)?;
    }
    let queue = Arc::new(WorkQueue::new(cfg.max_connections * 2));
    let hosts = Arc::new(HostCache::new(
        cfg.max_cached_host_names,
        cfg.host_name_expire_ms,
    ));
    let pool = WorkerPool::start(cfg.clone(), hosts, queue.clone())?;
    let (signal, _) = broadcast::channel(1);
    let mut server = dbnet::connect(cfg.clone(), queue.clone(), signal.clone()).await?;

    let ctrlc = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .map_err(|e| util::error::Error::ioerror_extra(e, "binding to SIGTERM"))?;
        tokio::select! {
            res = server.run() => {
                if let Err(e) = res {
                    log::error!("The listener failed with: {e}");
                }
            }
            _ = ctrlc => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            res = server.run() => {
                if let Err(e) = res {
                    log::error!("The listener failed with: {e}");
                }
            }
            _ = ctrlc => {}
        }
    }

    log::info!("Signalling all workers to shut down");
    // closing the broadcast ends every connection task
    drop(signal);
    server.finish_with_termsig().await;
    queue.signal_shutdown();
    let dropped = queue.drain();
    if dropped > 0 {
        log::debug!("destroyed {dropped} queries that never reached a worker");
    }
    pool.join();
    Ok(())
}

/// Refuse to start while another process owns the data directory; write
/// our PID otherwise
fn run_pre_startup_tasks() -> fs::File {
    let path = path::Path::new(PID_FILE);
    if path.exists() {
        let pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
        log::error!(
            "Startup failure: another process with PID {} is using this directory",
            pid.trim()
        );
        util::exit_error();
    }
    let mut file = match fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(PID_FILE)
    {
        Ok(file) => file,
        Err(e) => {
            log::error!("Startup failure: failed to open pid file: {e}");
            util::exit_error();
        }
    };
    if let Err(e) = file.write_all(process::id().to_string().as_bytes()) {
        log::error!("Startup failure: failed to write to pid file: {e}");
        util::exit_error();
    }
    file
}
