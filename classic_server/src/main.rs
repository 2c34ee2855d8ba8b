//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p classic_server -- [--config server.json] [--addr 0.0.0.0:25565] [--tick-hz 20]
//!
//! The server listens for classic clients, runs the world at a fixed tick
//! rate and saves it on shutdown.
//!
//! Console commands:
//!   status                      - Show server status
//!   save                        - Save the world now
//!   weather <clear|rain|snow>   - Change the weather
//!   say <message>               - Broadcast a chat line
//!   kick <name>                 - Disconnect a player
//!   quit                        - Save and shut down

use std::env;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use classic_server::server::GameServer;
use classic_shared::config::ServerConfig;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    addr: Option<String>,
    tick_hz: Option<u32>,
}

fn parse_args() -> Args {
    let mut parsed = Args::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                parsed.config = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--addr" if i + 1 < args.len() => {
                parsed.addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                parsed.tick_hz = args[i + 1].parse().ok();
                i += 2;
            }
            other => {
                warn!(arg = %other, "Ignoring unknown argument");
                i += 1;
            }
        }
    }
    parsed
}

fn load_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("server.json"));
    let mut cfg = ServerConfig::load(&path).with_context(|| format!("load {}", path.display()))?;
    if let Some(addr) = &args.addr {
        cfg.addr = addr.clone();
    }
    if let Some(tick_hz) = args.tick_hz {
        cfg.tick_hz = tick_hz;
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let cfg = load_config(&args)?;
    info!(
        addr = %cfg.addr,
        tick_hz = cfg.tick_hz,
        world = %cfg.world.name,
        generator = %cfg.world.generator,
        "Starting server"
    );

    let mut server = GameServer::new(cfg.clone())
        .await
        .context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    // Set up console input channel.
    let (console_tx, console_rx) = mpsc::channel::<String>(32);
    server.set_console_input(console_rx);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Server ready. Type 'status' for info, 'quit' to exit.");
    println!();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    // Main server loop.
    let tick_interval = std::time::Duration::from_secs_f32(1.0 / cfg.tick_hz as f32);
    let mut next_tick = tokio::time::Instant::now();

    while !server.is_shutdown_requested() {
        server.step().await?;

        next_tick += tick_interval;
        tokio::select! {
            _ = tokio::time::sleep_until(next_tick) => {}
            _ = &mut ctrl_c => {
                info!("Interrupted");
                server.request_shutdown();
            }
        }
    }

    server.shutdown().context("shutdown")?;
    info!("Server stopped");
    Ok(())
}
