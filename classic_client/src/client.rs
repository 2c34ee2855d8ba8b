//! Socket client for a classic server.
//!
//! Used by the bot binary and by the integration tests. Every frame read is
//! also applied to local state (level grid, chat, other players) so callers
//! can wait for an observable outcome instead of a specific frame.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context};
use bytes::{Buf, BytesMut};
use classic_shared::protocol::extensions::{
    PeerExtensions, CUSTOM_BLOCKS, CUSTOM_BLOCKS_SUPPORT_LEVEL, ENV_COLORS, ENV_WEATHER_TYPE,
};
use classic_shared::protocol::level_stream::LevelAssembler;
use classic_shared::protocol::packets::{
    CPE_MAGIC, MODE_DESTROY, MODE_PLACE, PROTOCOL_VERSION, SELF_ID, USER_TYPE_OP,
};
use classic_shared::protocol::{ClientboundPacket, Frame, ServerboundPacket};
use classic_shared::world::{Block, BlockPos, WorldGrid};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

const CLIENT_SOFTWARE: &str = "classic_client";

/// Extensions this client announces when CPE is enabled.
const CLIENT_EXTENSIONS: &[(&str, i32)] = &[(CUSTOM_BLOCKS, 1), (ENV_COLORS, 1), (ENV_WEATHER_TYPE, 1)];

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub name: String,
    pub verification_key: String,
    /// Announce CPE in the identification padding byte.
    pub cpe: bool,
}

impl ClientOptions {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            verification_key: String::new(),
            cpe: false,
        }
    }

    pub fn with_cpe(mut self) -> Self {
        self.cpe = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connected,
    Negotiating,
    Identified,
    Disconnected,
}

/// What the server told us about itself.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    pub name: String,
    pub motd: String,
    pub operator: bool,
}

pub struct ClassicClient {
    stream: TcpStream,
    inbound: BytesMut,
    options: ClientOptions,
    state: ClientState,
    server: Option<ServerInfo>,
    server_extensions: PeerExtensions,
    support_level: Option<u8>,
    assembler: LevelAssembler,
    level: Option<WorldGrid>,
    self_position: Option<(i16, i16, i16)>,
    players: BTreeMap<i8, String>,
    messages: Vec<String>,
    disconnect_reason: Option<String>,
    weather: Option<u8>,
}

impl ClassicClient {
    /// Connects and sends the identification frame.
    pub async fn connect(addr: &str, options: ClientOptions) -> anyhow::Result<Self> {
        info!(%addr, name = %options.name, cpe = options.cpe, "Connecting to server");
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect {addr}"))?;
        stream.set_nodelay(true)?;

        let mut client = Self {
            stream,
            inbound: BytesMut::with_capacity(4096),
            state: ClientState::Connected,
            server: None,
            server_extensions: PeerExtensions::default(),
            support_level: None,
            assembler: LevelAssembler::new(),
            level: None,
            self_position: None,
            players: BTreeMap::new(),
            messages: Vec::new(),
            disconnect_reason: None,
            weather: None,
            options,
        };

        let identification = ServerboundPacket::PlayerIdentification {
            protocol_version: PROTOCOL_VERSION,
            username: client.options.name.clone(),
            verification_key: client.options.verification_key.clone(),
            padding: if client.options.cpe { CPE_MAGIC } else { 0 },
        };
        client.send(&identification).await?;
        Ok(client)
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn server(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }

    pub fn server_extensions(&self) -> &PeerExtensions {
        &self.server_extensions
    }

    pub fn support_level(&self) -> Option<u8> {
        self.support_level
    }

    pub fn level(&self) -> Option<&WorldGrid> {
        self.level.as_ref()
    }

    pub fn self_position(&self) -> Option<(i16, i16, i16)> {
        self.self_position
    }

    pub fn players(&self) -> &BTreeMap<i8, String> {
        &self.players
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn disconnect_reason(&self) -> Option<&str> {
        self.disconnect_reason.as_deref()
    }

    pub fn weather(&self) -> Option<u8> {
        self.weather
    }

    pub async fn send(&mut self, packet: &ServerboundPacket) -> anyhow::Result<()> {
        let frame = packet.encode()?;
        self.stream
            .write_all(&frame)
            .await
            .context("write frame")?;
        Ok(())
    }

    /// Reads the next frame and applies it to local state.
    pub async fn recv(&mut self) -> anyhow::Result<ClientboundPacket> {
        loop {
            if let Some((packet, used)) = ClientboundPacket::decode(&self.inbound)? {
                self.inbound.advance(used);
                self.apply(&packet).await?;
                return Ok(packet);
            }
            let n = self
                .stream
                .read_buf(&mut self.inbound)
                .await
                .context("read frame")?;
            if n == 0 {
                self.state = ClientState::Disconnected;
                bail!("server closed the connection");
            }
        }
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`.
    pub async fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> anyhow::Result<Option<ClientboundPacket>> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(packet) => packet.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Reads frames until `pred` accepts one, or fails after `timeout`.
    pub async fn wait_for<F>(&mut self, timeout: Duration, mut pred: F) -> anyhow::Result<ClientboundPacket>
    where
        F: FnMut(&ClientboundPacket) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            let Some(packet) = self.recv_timeout(left).await? else {
                bail!("timed out after {timeout:?}");
            };
            if pred(&packet) {
                return Ok(packet);
            }
            if let ClientboundPacket::Disconnect { reason } = &packet {
                bail!("disconnected: {reason}");
            }
        }
    }

    /// Runs the login through to a fully received level.
    pub async fn join(&mut self, timeout: Duration) -> anyhow::Result<&WorldGrid> {
        self.wait_for(timeout, |p| matches!(p, ClientboundPacket::LevelFinalize { .. }))
            .await
            .context("wait for level")?;
        self.level.as_ref().context("level not assembled")
    }

    pub async fn set_block(&mut self, pos: BlockPos, block: Block) -> anyhow::Result<()> {
        let (mode, block) = if block == Block::AIR {
            (MODE_DESTROY, Block::STONE)
        } else {
            (MODE_PLACE, block)
        };
        self.send(&ServerboundPacket::SetBlock {
            x: pos.x as i16,
            y: pos.y as i16,
            z: pos.z as i16,
            mode,
            block: block.id(),
        })
        .await
    }

    pub async fn chat(&mut self, message: &str) -> anyhow::Result<()> {
        self.send(&ServerboundPacket::Message {
            unused: SELF_ID as u8,
            message: message.to_string(),
        })
        .await
    }

    pub async fn move_to(&mut self, x: i16, y: i16, z: i16, yaw: u8, pitch: u8) -> anyhow::Result<()> {
        self.send(&ServerboundPacket::PositionOrientation {
            player_id: SELF_ID as u8,
            x,
            y,
            z,
            yaw,
            pitch,
        })
        .await?;
        self.self_position = Some((x, y, z));
        Ok(())
    }

    /// Runs one console line and returns the lines to print.
    pub async fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            return Ok(Vec::new());
        };
        match cmd {
            "status" => {
                let mut out = vec![format!("state: {:?}", self.state)];
                if let Some(server) = &self.server {
                    out.push(format!("server: {} ({})", server.name, server.motd));
                    out.push(format!("operator: {}", server.operator));
                }
                if let Some(level) = &self.level {
                    out.push(format!(
                        "level: {}x{}x{}",
                        level.width(),
                        level.depth(),
                        level.height()
                    ));
                }
                out.push(format!("players: {}", self.players.len()));
                Ok(out)
            }
            "who" => Ok(self
                .players
                .iter()
                .map(|(id, name)| format!("{id:>4} {name}"))
                .collect()),
            "say" => {
                let message = line.trim_start()[cmd.len()..].trim();
                if message.is_empty() {
                    bail!("usage: say <message>");
                }
                self.chat(message).await?;
                Ok(Vec::new())
            }
            "place" | "break" => {
                let nums: Vec<i32> = parts
                    .map(str::parse)
                    .collect::<Result<_, _>>()
                    .context("coordinates must be integers")?;
                let (pos, block) = match (cmd, nums.as_slice()) {
                    ("place", [x, y, z, id]) => (BlockPos::new(*x, *y, *z), Block(*id as u8)),
                    ("break", [x, y, z]) => (BlockPos::new(*x, *y, *z), Block::AIR),
                    ("place", _) => bail!("usage: place <x> <y> <z> <block>"),
                    _ => bail!("usage: break <x> <y> <z>"),
                };
                self.set_block(pos, block).await?;
                Ok(vec![format!("{cmd} {},{},{}", pos.x, pos.y, pos.z)])
            }
            other => bail!("unknown command: {other}"),
        }
    }

    async fn apply(&mut self, packet: &ClientboundPacket) -> anyhow::Result<()> {
        match packet {
            ClientboundPacket::ExtInfo {
                app_name,
                extension_count,
            } => {
                info!(software = %app_name, extensions = extension_count, "Server supports CPE");
                self.state = ClientState::Negotiating;
                self.server_extensions.declare(app_name, *extension_count);
                self.reply_extensions_if_complete().await?;
            }
            ClientboundPacket::ExtEntry { ext_name, version } => {
                debug!(extension = %ext_name, version, "Server extension");
                self.server_extensions.record(ext_name, *version);
                self.reply_extensions_if_complete().await?;
            }
            ClientboundPacket::CustomBlockSupportLevel { support_level } => {
                self.support_level = Some(*support_level);
                self.send(&ServerboundPacket::CustomBlockSupportLevel {
                    support_level: CUSTOM_BLOCKS_SUPPORT_LEVEL,
                })
                .await?;
            }
            ClientboundPacket::ServerIdentification {
                server_name,
                motd,
                user_type,
                ..
            } => {
                info!(server = %server_name, %motd, "Identified");
                self.state = ClientState::Identified;
                self.server = Some(ServerInfo {
                    name: server_name.clone(),
                    motd: motd.clone(),
                    operator: *user_type == USER_TYPE_OP,
                });
            }
            ClientboundPacket::UpdateUserType { user_type } => {
                if let Some(server) = &mut self.server {
                    server.operator = *user_type == USER_TYPE_OP;
                }
            }
            ClientboundPacket::LevelInitialize {} => {
                self.level = None;
                self.assembler.begin();
            }
            ClientboundPacket::LevelDataChunk {
                chunk_length,
                chunk_data,
                percent_complete,
            } => {
                debug!(percent = percent_complete, "Level chunk");
                self.assembler.push_chunk(*chunk_length, chunk_data);
            }
            ClientboundPacket::LevelFinalize {
                x_size,
                y_size,
                z_size,
            } => {
                let grid = self
                    .assembler
                    .finish(*x_size, *y_size, *z_size)
                    .context("assemble level")?;
                info!(width = x_size, depth = y_size, height = z_size, "Level received");
                self.level = Some(grid);
            }
            ClientboundPacket::SetBlock { x, y, z, block } => {
                if let Some(level) = &mut self.level {
                    level.set(
                        BlockPos::new((*x).into(), (*y).into(), (*z).into()),
                        Block(*block),
                    );
                }
            }
            ClientboundPacket::SpawnPlayer {
                player_id,
                name,
                x,
                y,
                z,
                ..
            } => {
                if *player_id == SELF_ID {
                    self.self_position = Some((*x, *y, *z));
                } else {
                    self.players.insert(*player_id, name.clone());
                }
            }
            ClientboundPacket::DespawnPlayer { player_id } => {
                self.players.remove(player_id);
            }
            ClientboundPacket::Message { message, .. } => {
                info!(%message, "Chat");
                self.messages.push(message.clone());
            }
            ClientboundPacket::EnvSetWeatherType { weather } => {
                self.weather = Some(*weather);
            }
            ClientboundPacket::Disconnect { reason } => {
                info!(%reason, "Disconnected by server");
                self.state = ClientState::Disconnected;
                self.disconnect_reason = Some(reason.clone());
            }
            _ => {}
        }
        Ok(())
    }

    async fn reply_extensions_if_complete(&mut self) -> anyhow::Result<()> {
        if !self.server_extensions.is_complete() {
            return Ok(());
        }
        self.send(&ServerboundPacket::ExtInfo {
            app_name: CLIENT_SOFTWARE.to_string(),
            extension_count: CLIENT_EXTENSIONS.len() as i16,
        })
        .await?;
        for (name, version) in CLIENT_EXTENSIONS {
            self.send(&ServerboundPacket::ExtEntry {
                ext_name: (*name).to_string(),
                version: *version,
            })
            .await?;
        }
        Ok(())
    }
}
