/*
 * Created on Wed Feb 28 2024
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

//! End-to-end scenarios: a real listener, real worker threads and a
//! file-backed store, driven through real sockets.

use {
    crate::{
        actions::sha256_hex,
        config::{BackendConfig, ConfigurationSet, SharedConfig},
        db::{migrate, Session, Value},
        dbnet,
        protocol::{PayloadReader, Status, EXTENDED_LENGTH},
        services::hostcache::HostCache,
        workers::{queue::WorkQueue, WorkerPool},
    },
    std::{
        net::SocketAddr,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    },
    tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
        sync::broadcast,
        task::JoinHandle,
        time::sleep,
    },
};

static TEST_ID: AtomicUsize = AtomicUsize::new(0);

fn test_cfg() -> ConfigurationSet {
    ConfigurationSet {
        password: "secret".to_owned(),
        // 0 = no idle bound; individual tests opt in
        max_idle_time_ms: 0,
        ..ConfigurationSet::default()
    }
}

struct TestServer {
    addr: SocketAddr,
    queue: Arc<WorkQueue>,
    pool: Option<WorkerPool>,
    listener_task: JoinHandle<()>,
    signal: broadcast::Sender<()>,
    db_path: std::path::PathBuf,
}

impl TestServer {
    async fn start(mut cfg: ConfigurationSet) -> Self {
        let id = TEST_ID.fetch_add(1, Ordering::Relaxed);
        let db_path = std::env::temp_dir().join(format!(
            "qmd-e2e-{}-{id}.db",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&db_path);
        cfg.port = 0;
        cfg.backend = BackendConfig::Sqlite {
            path: db_path.to_string_lossy().into_owned(),
            patch_dir: None,
        };
        let cfg: SharedConfig = Arc::new(cfg);
        {
            let mut bootstrap =
                Session::connect(&cfg.backend, cfg.max_cached_statements).unwrap();
            migrate::prepare_store(&mut bootstrap, &cfg.backend).unwrap();
            seed(&mut bootstrap);
        }
        let queue = Arc::new(WorkQueue::new(cfg.max_connections * 2));
        let hosts = Arc::new(HostCache::new(
            cfg.max_cached_host_names,
            cfg.host_name_expire_ms,
        ));
        let pool = WorkerPool::start(cfg.clone(), hosts, queue.clone()).unwrap();
        let (signal, _) = broadcast::channel(1);
        let mut server = dbnet::connect(cfg.clone(), queue.clone(), signal.clone())
            .await
            .unwrap();
        let addr = server.base.listener.local_addr().unwrap();
        let listener_task = tokio::spawn(async move {
            let _ = server.run().await;
        });
        Self {
            addr,
            queue,
            pool: Some(pool),
            listener_task,
            signal,
            db_path,
        }
    }
    async fn connect(&self) -> TestClient {
        TestClient {
            stream: TcpStream::connect(self.addr).await.unwrap(),
        }
    }
    fn stop(mut self) {
        self.listener_task.abort();
        drop(self.signal);
        self.queue.signal_shutdown();
        self.queue.drain();
        if let Some(pool) = self.pool.take() {
            pool.join();
        }
        let _ = std::fs::remove_file(&self.db_path);
    }
}

fn seed(session: &mut Session) {
    session
        .execute(
            "INSERT INTO worlds (id, name, pvp_type, premium_only, max_players) \
             VALUES (?, ?, ?, ?, ?)",
            &[
                Value::from(1u16),
                Value::from("Zanera"),
                Value::from(0u8),
                Value::from(false),
                Value::from(900u16),
            ],
        )
        .unwrap();
    session
        .create_account(111111, "player@example.com", &sha256_hex("tibia"), 1000)
        .unwrap();
    session
        .create_character(111111, 1, "Player on Zanera", 1, 1000)
        .unwrap();
    let key = session.character_key("Player on Zanera").unwrap().unwrap();
    for right in ["PLAY", "PREMIUM"] {
        session
            .execute(
                "INSERT INTO character_rights (character_id, right_name) VALUES (?, ?)",
                &[Value::from(key.id), Value::from(right)],
            )
            .unwrap();
    }
}

struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    async fn send_raw(&mut self, payload: &[u8]) {
        let mut framed = Vec::with_capacity(payload.len() + 6);
        crate::protocol::write_frame(&mut framed, payload);
        let _ = self.stream.write_all(&framed).await;
        let _ = self.stream.flush().await;
    }
    /// `None` when the server closed the connection
    async fn read_reply(&mut self) -> Option<Vec<u8>> {
        let mut short = [0u8; 2];
        self.stream.read_exact(&mut short).await.ok()?;
        let short = u16::from_le_bytes(short);
        let len = if short == EXTENDED_LENGTH {
            let mut long = [0u8; 4];
            self.stream.read_exact(&mut long).await.ok()?;
            u32::from_le_bytes(long) as usize
        } else {
            short as usize
        };
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await.ok()?;
        Some(payload)
    }
    async fn request(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
        self.send_raw(payload).await;
        self.read_reply().await
    }
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u16).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn login_payload(role: u8, password: &str, world: Option<&str>) -> Vec<u8> {
    let mut payload = vec![0u8, role];
    put_str(&mut payload, password);
    if let Some(world) = world {
        put_str(&mut payload, world);
    }
    payload
}

fn login_game_payload(account_id: u32, name: &str, password: &str, ip: u32) -> Vec<u8> {
    let mut payload = vec![1u8];
    payload.extend_from_slice(&account_id.to_le_bytes());
    put_str(&mut payload, name);
    put_str(&mut payload, password);
    payload.extend_from_slice(&ip.to_be_bytes());
    payload
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn game_login_happy_path() {
    let server = TestServer::start(test_cfg()).await;
    let mut client = server.connect().await;
    let reply = client
        .request(&login_payload(1, "secret", Some("Zanera")))
        .await
        .unwrap();
    assert_eq!(reply, [Status::Ok as u8]);
    let reply = client
        .request(&login_game_payload(
            111111,
            "Player on Zanera",
            "tibia",
            0x7F000001,
        ))
        .await
        .unwrap();
    assert_eq!(reply[0], Status::Ok as u8);
    let mut r = PayloadReader::new(&reply[1..]);
    assert_eq!(r.u8(), 1, "sex");
    let _guild_title = r.string();
    let _premium_end = r.u32();
    let rights = r.u16();
    assert!(rights > 0, "the rights array must not be empty");
    for _ in 0..rights {
        assert!(!r.string().is_empty());
    }
    assert!(!r.overflowed());
    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wrong_secret_gets_failed_and_closed() {
    let server = TestServer::start(test_cfg()).await;
    let mut client = server.connect().await;
    let reply = client
        .request(&login_payload(1, "wrong", Some("Zanera")))
        .await
        .unwrap();
    assert_eq!(reply, [Status::Failed as u8]);
    assert!(client
        .request(&login_payload(1, "secret", Some("Zanera")))
        .await
        .is_none());
    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_world_gets_failed_and_closed() {
    let server = TestServer::start(test_cfg()).await;
    let mut client = server.connect().await;
    let reply = client
        .request(&login_payload(1, "secret", Some("Atlantis")))
        .await
        .unwrap();
    assert_eq!(reply, [Status::Failed as u8]);
    assert!(client.read_reply().await.is_none());
    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unauthorized_game_query_is_refused() {
    let server = TestServer::start(test_cfg()).await;
    let mut client = server.connect().await;
    let reply = client
        .request(&login_game_payload(
            111111,
            "Player on Zanera",
            "tibia",
            0x7F000001,
        ))
        .await
        .unwrap();
    assert_eq!(reply, [Status::Failed as u8]);
    assert!(client.read_reply().await.is_none());
    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn idle_connections_are_dropped() {
    let mut cfg = test_cfg();
    cfg.max_idle_time_ms = 300;
    let server = TestServer::start(cfg).await;
    let mut client = server.connect().await;
    let reply = client.request(&login_payload(3, "secret", None)).await;
    assert_eq!(reply.unwrap(), [Status::Ok as u8]);
    sleep(Duration::from_millis(900)).await;
    assert!(client.read_reply().await.is_none());
    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn role_whitelist_is_enforced() {
    let server = TestServer::start(test_cfg()).await;
    // a web connection may not send game opcodes, and is closed for it
    let mut web = server.connect().await;
    assert_eq!(
        web.request(&login_payload(3, "secret", None)).await.unwrap(),
        [Status::Ok as u8]
    );
    let reply = web
        .request(&login_game_payload(1, "x", "y", 0))
        .await
        .unwrap();
    assert_eq!(reply, [Status::Failed as u8]);
    assert!(web.read_reply().await.is_none());
    // a game connection gets Failed for a stray web opcode but stays open
    let mut game = server.connect().await;
    assert_eq!(
        game.request(&login_payload(1, "secret", Some("Zanera")))
            .await
            .unwrap(),
        [Status::Ok as u8]
    );
    let reply = game.request(&[37u8]).await.unwrap(); // GetWorlds
    assert_eq!(reply, [Status::Failed as u8]);
    let reply = game.request(&[30u8]).await.unwrap(); // LoadWorldConfig
    assert_eq!(reply[0], Status::Ok as u8);
    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn web_listings_work() {
    let server = TestServer::start(test_cfg()).await;
    let mut client = server.connect().await;
    assert_eq!(
        client
            .request(&login_payload(3, "secret", None))
            .await
            .unwrap(),
        [Status::Ok as u8]
    );
    let reply = client.request(&[37u8]).await.unwrap(); // GetWorlds
    assert_eq!(reply[0], Status::Ok as u8);
    let mut r = PayloadReader::new(&reply[1..]);
    assert_eq!(r.u16(), 1);
    assert_eq!(r.u16(), 1);
    assert_eq!(r.string(), "Zanera");
    // GetAccountSummary for the seeded account
    let mut payload = vec![35u8];
    payload.extend_from_slice(&111111u32.to_le_bytes());
    let reply = client.request(&payload).await.unwrap();
    assert_eq!(reply[0], Status::Ok as u8);
    let mut r = PayloadReader::new(&reply[1..]);
    let _premium_end = r.u32();
    let _final_warning = r.bool();
    assert_eq!(r.u16(), 1);
    assert_eq!(r.string(), "Player on Zanera");
    assert_eq!(r.string(), "Zanera");
    server.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frame_boundary_payloads_route_independently() {
    let mut cfg = test_cfg();
    cfg.buffer_size = 0x20000;
    let server = TestServer::start(cfg).await;
    let mut client = server.connect().await;
    // a login frame padded to exactly 0xFFFE bytes (2-byte header)
    let mut login = login_payload(1, "secret", Some("Zanera"));
    login.resize(0xFFFE, 0);
    assert_eq!(client.request(&login).await.unwrap(), [Status::Ok as u8]);
    // 0xFFFF forces the 6-byte header
    let mut owners = vec![20u8]; // GetHouseOwners
    owners.resize(0xFFFF, 0);
    let reply = client.request(&owners).await.unwrap();
    assert_eq!(reply[0], Status::Ok as u8);
    // and a 2-byte header again
    let mut auctions = vec![21u8]; // GetAuctions
    auctions.resize(0xFFFE, 0);
    let reply = client.request(&auctions).await.unwrap();
    assert_eq!(reply[0], Status::Ok as u8);
    server.stop();
}
