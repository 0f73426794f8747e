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

//! One task per connection: frame assembly, the authorization gate, the
//! role whitelist and the query round trip. The task never parses beyond
//! the opcode (and the login frame) - everything else is the workers'
//! business.

use {
    super::Terminator,
    crate::{
        config::SharedConfig,
        protocol::{
            examine_frame, write_frame, FrameStatus, PayloadReader, Status, SHORT_HEADER,
        },
        queryengine::{self, OpCode, Role},
        workers::{
            query::{Query, QueryRef},
            queue::WorkQueue,
        },
    },
    bytes::{Buf, BytesMut},
    std::{io::ErrorKind, sync::Arc, time::Duration},
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt, BufWriter, Error as IoError, Result as IoResult},
        net::TcpStream,
        sync::{broadcast, mpsc, Semaphore},
        time,
    },
};

/// The protocol state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Accepted but not yet serving
    Free,
    /// Assembling a request frame
    Reading,
    /// A full request is buffered
    RequestReady,
    /// The query is with the workers
    Responding,
    /// Flushing the response
    Writing,
}

/// A status-only `Failed` reply
const RESPONSE_FAILED: [u8; 1] = [Status::Failed as u8];
/// A status-only `Ok` reply
const RESPONSE_OK: [u8; 1] = [Status::Ok as u8];

enum FrameRead {
    /// A complete request payload
    Payload(Vec<u8>),
    /// The peer closed cleanly
    Disconnected,
    /// The idle bound expired
    IdleTimeout,
    /// Zero length or oversized frame
    Violation,
}

/// The buffered socket half of a connection
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    limit: usize,
}

impl Connection {
    pub fn new(stream: TcpStream, limit: usize) -> Self {
        Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(limit.min(8192) + SHORT_HEADER),
            limit,
        }
    }
    async fn read_frame(&mut self) -> IoResult<FrameRead> {
        loop {
            match examine_frame(&self.buffer, self.limit) {
                Ok(FrameStatus::Complete { header, payload }) => {
                    self.buffer.advance(header);
                    let bytes = self.buffer.split_to(payload).to_vec();
                    return Ok(FrameRead::Payload(bytes));
                }
                Ok(FrameStatus::Incomplete) => (),
                Err(e) => {
                    log::debug!("framing violation: {e:?}");
                    return Ok(FrameRead::Violation);
                }
            }
            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    Ok(FrameRead::Disconnected)
                } else {
                    Err(IoError::from(ErrorKind::ConnectionReset))
                };
            }
        }
    }
    /// [`Connection::read_frame`] bounded by the inactivity limit
    /// (0 disables the bound)
    async fn read_frame_timeout(&mut self, idle_ms: u64) -> IoResult<FrameRead> {
        if idle_ms == 0 {
            return self.read_frame().await;
        }
        match time::timeout(Duration::from_millis(idle_ms), self.read_frame()).await {
            Ok(res) => res,
            Err(_) => Ok(FrameRead::IdleTimeout),
        }
    }
    async fn write_payload(&mut self, payload: &[u8]) -> IoResult<()> {
        let mut framed = Vec::with_capacity(payload.len() + 6);
        write_frame(&mut framed, payload);
        self.stream.write_all(&framed).await?;
        self.stream.flush().await
    }
}

/// Drives one accepted connection to its end
pub struct ConnectionHandler {
    cfg: SharedConfig,
    queue: Arc<WorkQueue>,
    con: Connection,
    /// the role and world stamp once the authorization gate is passed
    auth: Option<(Role, u16)>,
    state: ConnState,
    climit: Arc<Semaphore>,
    terminator: Terminator,
    _term_sig_tx: mpsc::Sender<()>,
}

impl ConnectionHandler {
    pub fn new(
        cfg: SharedConfig,
        queue: Arc<WorkQueue>,
        stream: TcpStream,
        climit: Arc<Semaphore>,
        termination_signal: broadcast::Receiver<()>,
        _term_sig_tx: mpsc::Sender<()>,
    ) -> Self {
        let limit = cfg.buffer_size;
        Self {
            cfg,
            queue,
            con: Connection::new(stream, limit),
            auth: None,
            state: ConnState::Free,
            climit,
            terminator: Terminator::new(termination_signal),
            _term_sig_tx,
        }
    }
    pub async fn run(&mut self) -> IoResult<()> {
        let idle_ms = self.cfg.max_idle_time_ms;
        loop {
            self.state = ConnState::Reading;
            let frame = tokio::select! {
                f = self.con.read_frame_timeout(idle_ms) => f?,
                _ = self.terminator.receive_signal() => return Ok(()),
            };
            let payload = match frame {
                FrameRead::Payload(payload) => payload,
                FrameRead::Disconnected => return Ok(()),
                FrameRead::IdleTimeout => {
                    log::debug!("dropping a connection idle past the bound");
                    return Ok(());
                }
                FrameRead::Violation => {
                    log::debug!("closing a connection for a framing violation in {:?}", self.state);
                    self.state = ConnState::Writing;
                    let _ = self.con.write_payload(&RESPONSE_FAILED).await;
                    return Ok(());
                }
            };
            self.state = ConnState::RequestReady;
            let keep = match self.auth {
                None => self.authorize(payload).await?,
                Some((role, world_id)) => self.serve(role, world_id, payload).await?,
            };
            if !keep {
                return Ok(());
            }
        }
    }
    /// The first frame must be `Login`: check the shared secret here and,
    /// for the game role, run the world lookup through a worker. Returns
    /// `false` to close.
    async fn authorize(&mut self, payload: Vec<u8>) -> IoResult<bool> {
        if payload.first() != Some(&(OpCode::Login as u8)) {
            log::info!("closing connection: first frame was not Login");
            self.state = ConnState::Writing;
            self.con.write_payload(&RESPONSE_FAILED).await?;
            return Ok(false);
        }
        let mut r = PayloadReader::new(&payload[1..]);
        let role = Role::from_raw(r.u8());
        let password = r.string();
        let (Some(role), false) = (role, r.overflowed()) else {
            self.state = ConnState::Writing;
            self.con.write_payload(&RESPONSE_FAILED).await?;
            return Ok(false);
        };
        if password != self.cfg.password {
            log::info!("authorization refused: bad shared secret");
            self.state = ConnState::Writing;
            self.con.write_payload(&RESPONSE_FAILED).await?;
            return Ok(false);
        }
        match role {
            Role::Login | Role::Web => {
                self.state = ConnState::Writing;
                self.con.write_payload(&RESPONSE_OK).await?;
                self.auth = Some((role, 0));
                Ok(true)
            }
            Role::Game => {
                let Some((status, world_id, response)) = self.run_query(payload, 0).await else {
                    self.state = ConnState::Writing;
                    self.con.write_payload(&RESPONSE_FAILED).await?;
                    return Ok(false);
                };
                self.state = ConnState::Writing;
                self.con.write_payload(&response).await?;
                if status == Status::Ok && world_id != 0 {
                    self.auth = Some((Role::Game, world_id));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
    /// Gate the opcode by the connection's role and run it. Returns
    /// `false` to close.
    async fn serve(&mut self, role: Role, world_id: u16, payload: Vec<u8>) -> IoResult<bool> {
        let opcode = payload.first().copied().unwrap_or(0);
        let allowed = match OpCode::from_raw(opcode) {
            Some(op) => queryengine::permitted(op, role),
            None => {
                log::warn!("unknown opcode {opcode} from an authorized connection");
                false
            }
        };
        if !allowed {
            self.state = ConnState::Writing;
            self.con.write_payload(&RESPONSE_FAILED).await?;
            // the game server survives a stray opcode; from the other
            // roles it is misuse
            return Ok(role == Role::Game);
        }
        match self.run_query(payload, world_id).await {
            Some((_, _, response)) => {
                self.state = ConnState::Writing;
                self.con.write_payload(&response).await?;
                Ok(true)
            }
            None => {
                self.state = ConnState::Writing;
                self.con.write_payload(&RESPONSE_FAILED).await?;
                Ok(false)
            }
        }
    }
    /// The full round trip of one query: enqueue, wait for the workers to
    /// release it, then collect status, world stamp and response bytes.
    /// `None` means the queue refused it (shutdown).
    async fn run_query(
        &mut self,
        payload: Vec<u8>,
        world_id: u16,
    ) -> Option<(Status, u16, Vec<u8>)> {
        self.state = ConnState::Responding;
        let query: QueryRef = Query::new(payload, self.cfg.buffer_size, world_id);
        if let Err(e) = self.queue.enqueue(query.clone()) {
            log::warn!("could not enqueue a query: {e:?}");
            return None;
        }
        query.wait_released().await;
        let status = query.status();
        let world_id = query.world_id();
        let response = {
            let buf = query.buffer();
            if buf.bytes().is_empty() {
                RESPONSE_FAILED.to_vec()
            } else {
                buf.bytes().to_vec()
            }
        };
        // our own reference: the count hits zero and the query dies with
        // the last Arc
        query.release();
        Some((status, world_id, response))
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        // return the permit even if the task panicked
        self.climit.add_permits(1);
    }
}
