//! Helpers shared by the socket-level integration tests.
//!
//! Each test gets its own worlds directory and a server bound to an
//! ephemeral localhost port, stepped on a background task.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use classic_client::{ClassicClient, ClientOptions};
use classic_server::server::{bind_ephemeral, GameServer};
use classic_shared::config::{ServerConfig, WorldSettings};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Per-step pause of the background server loop.
pub const STEP_PAUSE: Duration = Duration::from_millis(5);

/// Default wait for anything a test expects to see on the wire.
pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A fresh, empty directory under the system temp dir.
pub fn scratch_dir(tag: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("classic-it-{tag}-{}-{n}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Small flat world in its own directory, autosave off.
pub fn test_config(tag: &str) -> ServerConfig {
    ServerConfig {
        server_name: "Test Server".to_string(),
        motd: "integration".to_string(),
        worlds_dir: scratch_dir(tag),
        autosave_ticks: 0,
        world: WorldSettings {
            name: "it".to_string(),
            width: 32,
            depth: 16,
            height: 32,
            generator: "flat".to_string(),
            seed: 7,
        },
        ..ServerConfig::default()
    }
}

/// A server stepping on a background task until stopped.
pub struct TestServer {
    pub addr: SocketAddr,
    console: mpsc::Sender<String>,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<anyhow::Result<GameServer>>,
}

impl TestServer {
    pub async fn start(cfg: ServerConfig) -> anyhow::Result<Self> {
        let (mut server, addr) = bind_ephemeral(cfg).await?;
        let (console, rx) = mpsc::channel(16);
        server.set_console_input(rx);

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = tokio::spawn(async move {
            while !flag.load(Ordering::Relaxed) && !server.is_shutdown_requested() {
                server.step().await?;
                tokio::time::sleep(STEP_PAUSE).await;
            }
            Ok(server)
        });

        Ok(Self {
            addr,
            console,
            stop,
            handle,
        })
    }

    pub fn addr_string(&self) -> String {
        self.addr.to_string()
    }

    /// Queues a console line for the next step.
    pub async fn console(&self, line: &str) -> anyhow::Result<()> {
        self.console
            .send(line.to_string())
            .await
            .context("server loop has exited")
    }

    /// Connects a client and waits until it holds the level.
    pub async fn join(&self, options: ClientOptions) -> anyhow::Result<ClassicClient> {
        let mut client = ClassicClient::connect(&self.addr_string(), options).await?;
        client.join(WAIT).await?;
        Ok(client)
    }

    /// Stops the loop and hands the server back for inspection.
    pub async fn stop(self) -> anyhow::Result<GameServer> {
        self.stop.store(true, Ordering::Relaxed);
        self.handle.await.context("server task panicked")?
    }
}
