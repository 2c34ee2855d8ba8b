//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p classic_client -- [--addr 127.0.0.1:25565] [--name Bot] [--cpe]
//!
//! The client logs in, downloads the level and then relays console commands
//! while printing chat from the server.
//!
//! Console commands:
//!   status                  - Show client status
//!   who                     - List other players
//!   say <message>           - Send chat message
//!   place <x> <y> <z> <id>  - Place a block
//!   break <x> <y> <z>       - Break a block
//!   quit                    - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use classic_client::{ClassicClient, ClientOptions, ClientState};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug)]
struct Args {
    addr: String,
    options: ClientOptions,
}

fn parse_args() -> Args {
    let mut parsed = Args {
        addr: "127.0.0.1:25565".to_string(),
        options: ClientOptions::new("Bot"),
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                parsed.addr = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                parsed.options.name = args[i + 1].clone();
                i += 2;
            }
            "--key" if i + 1 < args.len() => {
                parsed.options.verification_key = args[i + 1].clone();
                i += 2;
            }
            "--cpe" => {
                parsed.options.cpe = true;
                i += 1;
            }
            other => {
                warn!(arg = %other, "Ignoring unknown argument");
                i += 1;
            }
        }
    }
    parsed
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    info!(server = %args.addr, name = %args.options.name, "Starting client");

    let mut client = ClassicClient::connect(&args.addr, args.options)
        .await
        .context("connect")?;
    let level = client.join(Duration::from_secs(30)).await.context("join")?;
    info!(
        width = level.width(),
        depth = level.depth(),
        height = level.height(),
        "Joined"
    );

    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);
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

    println!("Client connected. Type 'status' for info, 'quit' to exit.");
    println!();

    loop {
        while let Ok(line) = console_rx.try_recv() {
            if matches!(line.as_str(), "quit" | "exit") {
                return Ok(());
            }
            match client.exec_console(&line).await {
                Ok(output) => {
                    for line in output {
                        println!("{line}");
                    }
                }
                Err(e) => println!("Error: {e}"),
            }
        }

        client.recv_timeout(Duration::from_millis(50)).await?;

        if client.state() == ClientState::Disconnected {
            println!(
                "Disconnected from server: {}",
                client.disconnect_reason().unwrap_or("connection closed")
            );
            break;
        }
    }

    Ok(())
}
