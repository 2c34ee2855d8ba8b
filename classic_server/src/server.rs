//! Server implementation.
//!
//! One fixed-rate loop owns every session, every player and the level, and
//! performs all mutation of them. Each step:
//! - accepts pending connections
//! - runs queued console commands
//! - drains and handles every session's inbound frames
//! - advances the level one tick and dispatches its events
//! - flushes every session, reaps closed ones and autosaves
//!
//! Determinism notes:
//! - Sessions are visited in id order.
//! - Level events are dispatched in the order they were raised.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use classic_shared::config::ServerConfig;
use classic_shared::error::ProtocolError;
use classic_shared::net::bind_listener;
use classic_shared::protocol::extensions::ENV_WEATHER_TYPE;
use classic_shared::protocol::level_stream::level_packets;
use classic_shared::protocol::packets::{ClientboundPacket, ServerboundPacket, MODE_DESTROY, MODE_PLACE};
use classic_shared::protocol::PacketSink;
use classic_shared::world::persistence;
use classic_shared::world::{Block, BlockPos, Level, LevelEvent, Weather};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::lobby::Lobby;
use crate::player::{Player, PlayerRegistry, Position};
use crate::plugins::{BlockStats, LevelPlugin, PluginManager};
use crate::session::{ConnectionSession, SessionEvent, SessionId};

pub type Session = ConnectionSession<TcpStream>;

/// Reason sent to every session on shutdown.
pub const REASON_SHUTDOWN: &str = "Server shutting down";

/// Game server.
pub struct GameServer {
    pub cfg: ServerConfig,
    listener: TcpListener,
    sessions: BTreeMap<SessionId, Session>,
    lobby: Lobby,
    players: PlayerRegistry,
    level: Level,
    plugins: PluginManager,
    stats: BlockStats,
    world_dir: PathBuf,

    tick: u64,
    next_session: u64,
    shutdown_requested: bool,

    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
}

impl GameServer {
    /// Binds the listener and loads (or generates) the configured world.
    pub async fn new(cfg: ServerConfig) -> anyhow::Result<Self> {
        cfg.validate().context("validate config")?;
        let addr: SocketAddr = cfg.addr.parse().context("parse addr")?;
        let listener = bind_listener(addr).await.context("tcp bind")?;

        let world_dir = cfg.world_dir();
        let level = if persistence::exists(&world_dir) {
            persistence::load_level(&world_dir, &cfg.world.name)
                .with_context(|| format!("load world {}", world_dir.display()))?
        } else {
            let w = &cfg.world;
            Level::generate(&w.name, w.width, w.depth, w.height, &w.generator, w.effective_seed())
                .context("generate world")?
        };

        let stats = BlockStats::new();
        let mut plugins = PluginManager::new();
        plugins.register(Box::new(stats.clone()));

        let mut server = Self {
            lobby: Lobby::new(&cfg),
            cfg,
            listener,
            sessions: BTreeMap::new(),
            players: PlayerRegistry::new(),
            level,
            plugins,
            stats,
            world_dir,
            tick: 0,
            next_session: 1,
            shutdown_requested: false,
            console_rx: None,
        };
        // Generated cells reach the plugins before the load hook.
        server.dispatch_level_events();
        server.plugins.level_loaded(&server.level);
        Ok(server)
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Adds a plugin and tells it about the current level.
    pub fn register_plugin(&mut self, mut plugin: Box<dyn LevelPlugin>) {
        plugin.on_level_loaded(&self.level);
        self.plugins.register(plugin);
    }

    pub fn lobby_mut(&mut self) -> &mut Lobby {
        &mut self.lobby
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn level_mut(&mut self) -> &mut Level {
        &mut self.level
    }

    pub fn players(&self) -> &PlayerRegistry {
        &self.players
    }

    pub fn stats(&self) -> &BlockStats {
        &self.stats
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Accepts one pending connection, waiting at most `timeout`.
    pub async fn try_accept(&mut self, timeout: Duration) -> anyhow::Result<Option<SessionId>> {
        match tokio::time::timeout(timeout, self.listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(%peer, error = %e, "Failed to set TCP_NODELAY");
                }
                let id = SessionId(self.next_session);
                self.next_session += 1;
                self.sessions.insert(id, ConnectionSession::new(id, stream));
                info!(session = %id, %peer, "Client accepted");
                Ok(Some(id))
            }
            Ok(Err(e)) => Err(e).context("tcp accept"),
            Err(_) => Ok(None),
        }
    }

    /// Runs the server for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_secs_f32(1.0 / self.cfg.tick_hz as f32);
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step().await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Executes one fixed step.
    pub async fn step(&mut self) -> anyhow::Result<()> {
        while self.try_accept(Duration::ZERO).await?.is_some() {}
        self.process_console_commands()?;
        self.receive_all();
        self.reap_closed();

        self.level.tick();
        self.dispatch_level_events();

        self.flush_all();
        self.reap_closed();
        self.autosave();
        self.tick += 1;
        Ok(())
    }

    fn process_console_commands(&mut self) -> anyhow::Result<()> {
        // Collect lines first to avoid borrow conflict
        let lines: Vec<String> = if let Some(ref mut rx) = self.console_rx {
            let mut collected = Vec::new();
            while let Ok(line) = rx.try_recv() {
                collected.push(line);
            }
            collected
        } else {
            Vec::new()
        };

        for line in lines {
            for out in self.exec_console(&line)? {
                println!("{out}");
            }
        }
        Ok(())
    }

    /// Executes a console command.
    pub fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let line = line.trim();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        match tokens[0] {
            "status" => {
                let meta = self.level.metadata();
                let mut out = vec![
                    format!("Tick: {}", self.tick),
                    format!(
                        "World: {} {}x{}x{} seed={} generator={} id={}",
                        self.level.name(),
                        meta.width,
                        meta.depth,
                        meta.height,
                        meta.seed,
                        meta.generator,
                        meta.id
                    ),
                    format!(
                        "Pending ticks: {} dirty={}",
                        self.level.pending_ticks(),
                        self.level.is_dirty()
                    ),
                    format!("Block changes: {}", self.stats.total()),
                    format!("Sessions: {}", self.sessions.len()),
                ];
                for session in self.sessions.values() {
                    let player = self.players.get(session.id());
                    out.push(format!(
                        "  {} {} {:?} name={} player={:?}",
                        session.id(),
                        session.peer(),
                        session.state(),
                        session.name().unwrap_or("-"),
                        player.map(|p| p.id)
                    ));
                }
                Ok(out)
            }
            "save" => match self.save() {
                Ok(()) => Ok(vec![format!("Saved to {}", self.world_dir.display())]),
                Err(e) => Ok(vec![format!("Save failed: {e:#}")]),
            },
            "weather" => match tokens.get(1).and_then(|w| Weather::parse(w)) {
                Some(weather) => {
                    self.level.set_weather(weather);
                    Ok(vec![format!("Weather set to {weather:?}")])
                }
                None => Ok(vec!["Usage: weather <clear|rain|snow>".to_string()]),
            },
            "say" => {
                let message = line[tokens[0].len()..].trim();
                if message.is_empty() {
                    return Ok(vec!["Usage: say <message>".to_string()]);
                }
                self.broadcast_message(&format!("[Console] {message}"));
                Ok(Vec::new())
            }
            "kick" => {
                let Some(name) = tokens.get(1) else {
                    return Ok(vec!["Usage: kick <name>".to_string()]);
                };
                match self.lobby.find(name).and_then(|id| self.sessions.get_mut(&id)) {
                    Some(session) => {
                        session.disconnect("Kicked by console");
                        self.reap_closed();
                        Ok(vec![format!("Kicked {name}")])
                    }
                    None => Ok(vec![format!("No player named {name}")]),
                }
            }
            "quit" | "exit" => {
                info!("Shutdown requested from console");
                self.shutdown_requested = true;
                Ok(Vec::new())
            }
            other => Ok(vec![format!("Unknown command: {other}")]),
        }
    }

    /// Requests a graceful stop; the owning loop then calls [`shutdown`](Self::shutdown).
    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    fn receive_all(&mut self) {
        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for id in ids {
            if let Some(session) = self.sessions.get_mut(&id) {
                session.receive();
            }
            loop {
                let Some(session) = self.sessions.get_mut(&id) else {
                    break;
                };
                let Some(packet) = session.next_packet() else {
                    break;
                };
                match session.handle(packet, &mut self.lobby) {
                    Ok(None) => {}
                    Ok(Some(SessionEvent::Joined { name, operator })) => {
                        self.join(id, &name, operator);
                    }
                    Ok(Some(SessionEvent::Forward(packet))) => {
                        self.on_player_packet(id, packet);
                    }
                    Err(e) => {
                        debug!(session = %id, error = %e, "Session error");
                        session.disconnect(e.reason());
                    }
                }
            }
        }
    }

    /// Creates the player, streams the level and introduces everyone.
    fn join(&mut self, id: SessionId, name: &str, operator: bool) {
        let spawn = self.level.spawn_point();
        let Some(player) = self
            .players
            .create(id, name, operator, Position::at_block(spawn))
            .cloned()
        else {
            if let Some(session) = self.sessions.get_mut(&id) {
                session.disconnect(crate::session::REASON_SERVER_FULL);
            }
            return;
        };

        let others: Vec<_> = self
            .players
            .iter()
            .filter(|p| p.session != id)
            .cloned()
            .collect();

        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        let level = match level_packets(self.level.grid(), session.supports_custom_blocks()) {
            Ok(packets) => packets,
            Err(e) => {
                error!(session = %id, error = %e, "Failed to compress level");
                session.disconnect("Failed to send the level");
                return;
            }
        };

        let result = send_join_sequence(session, &level, &self.level, &player, &others);
        if let Err(e) = result {
            warn!(session = %id, error = %e, "Failed to send join sequence");
            session.disconnect(crate::session::REASON_BAD_PACKETS);
            return;
        }

        info!(session = %id, name = %name, player_id = player.id, ?spawn, "Player joined");
        self.broadcast_except(id, &player.spawn_packet(false));
        self.broadcast_message(&format!("{name} joined the game"));
    }

    fn on_player_packet(&mut self, id: SessionId, packet: ServerboundPacket) {
        match packet {
            ServerboundPacket::SetBlock {
                x,
                y,
                z,
                mode,
                block,
            } => self.on_set_block(id, BlockPos::new(x.into(), y.into(), z.into()), mode, Block(block)),
            ServerboundPacket::PositionOrientation {
                x,
                y,
                z,
                yaw,
                pitch,
                ..
            } => {
                let Some(player) = self.players.get_mut(id) else {
                    return;
                };
                player.position = Position {
                    x,
                    y,
                    z,
                    yaw,
                    pitch,
                };
                let update = player.position_packet();
                self.broadcast_except(id, &update);
            }
            ServerboundPacket::Message { message, .. } => {
                let Some(player) = self.players.get(id) else {
                    return;
                };
                info!(name = %player.name, %message, "Chat");
                let line = player.chat_packet(&message);
                self.broadcast(&line);
            }
            other => debug!(session = %id, packet = ?other, "Ignoring packet"),
        }
    }

    fn on_set_block(&mut self, id: SessionId, pos: BlockPos, mode: u8, requested: Block) {
        if !self.level.contains(pos) {
            return;
        }
        let operator = self.players.get(id).map_or(false, |p| p.operator);
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };

        let current = self.level.get_block(pos);
        let block = match mode {
            MODE_DESTROY => Block::AIR,
            MODE_PLACE => requested,
            _ => current,
        };
        let allowed = block.is_valid()
            && (!block.is_custom() || session.supports_custom_blocks())
            && (operator || (current != Block::BEDROCK && block != Block::BEDROCK))
            && mode <= MODE_PLACE;

        let result = if allowed {
            self.level.change_block(pos, block, session).map(|_| ())
        } else {
            debug!(session = %id, ?pos, block = block.id(), "Reverting block change");
            let revert = current.for_peer(session.supports_custom_blocks());
            session.send_packet(ClientboundPacket::set_block(
                pos.x as i16,
                pos.y as i16,
                pos.z as i16,
                revert.id(),
            ))
        };
        if let Err(e) = result {
            warn!(session = %id, error = %e, "Failed to apply block change");
            session.disconnect(crate::session::REASON_BAD_PACKETS);
        }
    }

    fn dispatch_level_events(&mut self) {
        for event in self.level.drain_events() {
            match event {
                LevelEvent::BlockChanged {
                    pos,
                    block,
                    broadcast,
                } => {
                    if broadcast {
                        let packet = ClientboundPacket::set_block(
                            pos.x as i16,
                            pos.y as i16,
                            pos.z as i16,
                            block.id(),
                        );
                        self.broadcast(&packet);
                    }
                    self.plugins.block_changed(&self.level, pos, block);
                }
                LevelEvent::Environment { extension, packet } => {
                    for session in self.sessions.values_mut() {
                        if session.is_playing() && session.supports(extension) {
                            Self::send_or_drop(session, &packet);
                        }
                    }
                }
            }
        }
    }

    fn send_or_drop(session: &mut Session, packet: &ClientboundPacket) {
        if let Err(e) = session.send_adapted(packet) {
            warn!(session = %session.id(), error = %e, "Failed to queue packet");
            session.disconnect(crate::session::REASON_BAD_PACKETS);
        }
    }

    /// Sends a frame to every playing session, adapting blocks per peer.
    pub fn broadcast(&mut self, packet: &ClientboundPacket) {
        for session in self.sessions.values_mut() {
            if session.is_playing() {
                Self::send_or_drop(session, packet);
            }
        }
    }

    fn broadcast_except(&mut self, skip: SessionId, packet: &ClientboundPacket) {
        for (id, session) in self.sessions.iter_mut() {
            if *id != skip && session.is_playing() {
                Self::send_or_drop(session, packet);
            }
        }
    }

    pub fn broadcast_message(&mut self, message: &str) {
        info!(%message, "Broadcast");
        self.broadcast(&ClientboundPacket::chat(message));
    }

    fn flush_all(&mut self) {
        for session in self.sessions.values_mut() {
            session.flush();
        }
    }

    /// Tears down every disconnected session: frees its name, despawns its
    /// player and tells everyone else.
    fn reap_closed(&mut self) {
        loop {
            let closed: Vec<SessionId> = self
                .sessions
                .iter()
                .filter(|(_, s)| !s.is_connected())
                .map(|(id, _)| *id)
                .collect();
            if closed.is_empty() {
                break;
            }
            for id in closed {
                let Some(session) = self.sessions.remove(&id) else {
                    continue;
                };
                self.lobby.release(id);
                // Refused logins never had a player, so nobody is told.
                if let Some(player) = self.players.remove(id) {
                    let reason = session.close_reason().unwrap_or("Disconnected");
                    self.broadcast(&player.despawn_packet());
                    self.broadcast_message(&format!("{} has disconnected. ({reason})", player.name));
                }
                debug!(session = %id, "Session destroyed");
            }
        }
    }

    fn autosave(&mut self) {
        let every = self.cfg.autosave_ticks;
        if every == 0 || self.tick == 0 || self.tick % every != 0 || !self.level.is_dirty() {
            return;
        }
        if let Err(e) = self.save() {
            error!("Autosave failed: {e:#}");
        }
    }

    /// Writes the level to its world directory.
    pub fn save(&mut self) -> anyhow::Result<()> {
        persistence::save_level(&self.world_dir, &self.level)
            .with_context(|| format!("save world to {}", self.world_dir.display()))?;
        self.level.mark_saved();
        Ok(())
    }

    /// Disconnects every session and persists the world.
    pub fn shutdown(&mut self) -> anyhow::Result<()> {
        info!(sessions = self.sessions.len(), "Server shutting down");
        for session in self.sessions.values_mut() {
            session.disconnect(REASON_SHUTDOWN);
        }
        self.sessions.clear();
        self.save()
    }
}

/// Level stream, environment, self spawn and everyone already present.
fn send_join_sequence(
    session: &mut Session,
    level_stream: &[ClientboundPacket],
    level: &Level,
    player: &Player,
    others: &[Player],
) -> Result<(), ProtocolError> {
    for packet in level_stream {
        session.send(packet)?;
    }
    for (extension, packet) in level.environment_packets() {
        if session.supports(extension) {
            session.send(&packet)?;
        }
    }
    if session.supports(ENV_WEATHER_TYPE) {
        session.send(&level.environment().weather_packet())?;
    }
    session.send(&player.spawn_packet(true))?;
    for other in others {
        session.send(&other.spawn_packet(false))?;
    }
    Ok(())
}

/// Helper for tests: bind to an ephemeral port on localhost.
pub async fn bind_ephemeral(mut cfg: ServerConfig) -> anyhow::Result<(GameServer, SocketAddr)> {
    cfg.addr = format!("{}:{}", IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let server = GameServer::new(cfg).await?;
    let addr = server.local_addr()?;
    Ok((server, addr))
}
