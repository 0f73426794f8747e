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

use {
    super::{connection::ConnectionHandler, NetBackoff, MAXIMUM_CONNECTION_LIMIT},
    crate::{
        config::SharedConfig,
        util::error::{Error, QmResult},
        workers::queue::WorkQueue,
    },
    std::{
        net::Ipv4Addr,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    },
    tokio::{
        io::Result as IoResult,
        net::{TcpListener, TcpStream},
        sync::{broadcast, mpsc, Semaphore},
    },
};

/// The listener's backlog of not-yet-accepted connections
const LISTEN_BACKLOG: u32 = 128;

/// The base TCP listener state
pub struct BaseListener {
    /// the evaluated configuration
    pub cfg: SharedConfig,
    /// where completed frames go
    pub queue: Arc<WorkQueue>,
    /// the bound socket
    pub listener: TcpListener,
    /// the connection limit
    pub climit: Arc<Semaphore>,
    /// the shutdown broadcaster
    pub signal: broadcast::Sender<()>,
    // when every handler has dropped its sender clone the receiver
    // unblocks, which is how shutdown waits for the connections
    pub terminate_tx: mpsc::Sender<()>,
    pub terminate_rx: mpsc::Receiver<()>,
    /// non-loopback accepts refused so far
    pub rejected: Arc<AtomicUsize>,
}

pub struct Listener {
    pub base: BaseListener,
}

/// Bind the listener on the loopback interface. IPv4 only, by design.
pub async fn connect(
    cfg: SharedConfig,
    queue: Arc<WorkQueue>,
    signal: broadcast::Sender<()>,
) -> QmResult<Listener> {
    let port = cfg.port;
    let socket = tokio::net::TcpSocket::new_v4()
        .map_err(|e| Error::ioerror_extra(e, "creating the listener socket"))?;
    socket
        .bind((Ipv4Addr::LOCALHOST, port).into())
        .map_err(|e| Error::ioerror_extra(e, format!("binding to 127.0.0.1:{port}")))?;
    let listener = socket
        .listen(LISTEN_BACKLOG)
        .map_err(|e| Error::ioerror_extra(e, format!("listening on 127.0.0.1:{port}")))?;
    let maxcon = cfg.max_connections.min(MAXIMUM_CONNECTION_LIMIT);
    let (terminate_tx, terminate_rx) = mpsc::channel(1);
    log::info!("Query manager listening on 127.0.0.1:{port}");
    Ok(Listener {
        base: BaseListener {
            cfg,
            queue,
            listener,
            climit: Arc::new(Semaphore::new(maxcon)),
            signal,
            terminate_tx,
            terminate_rx,
            rejected: Arc::new(AtomicUsize::new(0)),
        },
    })
}

impl Listener {
    async fn accept(&mut self) -> IoResult<(TcpStream, std::net::SocketAddr)> {
        let backoff = NetBackoff::new();
        loop {
            match self.base.listener.accept().await {
                Ok(ret) => return Ok(ret),
                Err(e) => {
                    if backoff.should_disconnect() {
                        return Err(e);
                    }
                }
            }
            backoff.spin().await;
        }
    }
    /// Run the accept loop until the socket dies
    pub async fn run(&mut self) -> IoResult<()> {
        loop {
            // take the permit up front; the handler's Drop returns it
            self.base.climit.acquire().await.unwrap().forget();
            let (stream, peer) = match self.accept().await {
                Ok(ret) => ret,
                Err(e) => {
                    self.base.climit.add_permits(1);
                    return Err(e);
                }
            };
            if !peer.ip().is_loopback() {
                // only the local fleet may talk to us
                let total = self.base.rejected.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!("refused non-loopback connection from {peer} ({total} so far)");
                drop(stream);
                self.base.climit.add_permits(1);
                continue;
            }
            let mut chandle = ConnectionHandler::new(
                self.base.cfg.clone(),
                self.base.queue.clone(),
                stream,
                self.base.climit.clone(),
                self.base.signal.subscribe(),
                self.base.terminate_tx.clone(),
            );
            tokio::spawn(async move {
                if let Err(e) = chandle.run().await {
                    log::debug!("connection from {peer} ended with: {e}");
                }
            });
        }
    }
    /// Wait for every connection task to let go of its terminate sender
    pub async fn finish_with_termsig(self) {
        let BaseListener {
            mut terminate_rx,
            terminate_tx,
            signal,
            ..
        } = self.base;
        drop(signal);
        drop(terminate_tx);
        let _ = terminate_rx.recv().await;
    }
}
