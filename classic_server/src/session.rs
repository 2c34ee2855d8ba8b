//! Per-connection protocol state machine.
//!
//! A session owns its transport and two byte buffers. It knows nothing about
//! the level or other players: login decisions go through [`LoginHost`] and
//! everything that happens after identification is handed back to the owning
//! server as a [`SessionEvent`].
//!
//! States: `AwaitingIdentification → NegotiatingExtensions → Playing →
//! Disconnected`. The negotiation state is skipped for peers that do not
//! announce CPE support.

use std::fmt;

use bytes::{Buf, BytesMut};
use classic_shared::error::ProtocolError;
use classic_shared::net::{is_connection_lost, is_transient, Transport};
use classic_shared::protocol::extensions::{
    advertisement, PeerExtensions, CUSTOM_BLOCKS, CUSTOM_BLOCKS_SUPPORT_LEVEL,
};
use classic_shared::protocol::packets::{
    ClientboundPacket, ServerboundPacket, CPE_MAGIC, PROTOCOL_VERSION, USER_TYPE_NORMAL,
    USER_TYPE_OP,
};
use classic_shared::protocol::{Frame, PacketSink};
use classic_shared::world::Block;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Most bytes pulled from the socket per drain.
pub const INBOUND_LIMIT: usize = 64 * 1024;

/// Outbound bytes buffered before an implicit flush. A peer that leaves
/// this much unread is disconnected.
pub const OUTBOUND_LIMIT: usize = 1024 * 1024;

/// Software name sent in our `ExtInfo`.
pub const SOFTWARE_NAME: &str = concat!("classic_server ", env!("CARGO_PKG_VERSION"));

pub const REASON_INVALID_VERSION: &str = "Invalid version";
pub const REASON_DUPLICATE_NAME: &str = "There is already a player with that name!";
pub const REASON_AUTH_FAILED: &str = "Authentication failure";
pub const REASON_NOT_WHITELISTED: &str = "You are not on the whitelist!";
pub const REASON_SERVER_FULL: &str = "The server is full!";
pub const REASON_CLIENT_DISCONNECTED: &str = "Client disconnected";
pub const REASON_BAD_PACKETS: &str = "Unexpected error reading packets.";
pub const REASON_OUTBOUND_OVERFLOW: &str = "Too much pending data, client not reading";

/// Identifies a session for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingIdentification,
    NegotiatingExtensions,
    Playing,
    Disconnected,
}

/// Name and MOTD sent in `ServerIdentification`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    pub name: String,
    pub motd: String,
}

/// What a session needs from the server to admit a player.
pub trait LoginHost {
    fn is_name_taken(&self, name: &str) -> bool;

    fn authenticate(&self, name: &str, credential: &str) -> bool;

    /// Allow-list check; always true when no allow-list is enforced.
    fn is_allowed(&self, name: &str) -> bool;

    fn has_capacity(&self) -> bool;

    fn reserve_name(&mut self, name: &str, session: SessionId);

    fn is_operator(&self, name: &str) -> bool;

    fn identity(&self) -> &ServerIdentity;
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// Login refused; the message is the disconnect reason.
    #[error("{0}")]
    Rejected(&'static str),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("packet {id:#04x} not valid while {state:?}")]
    UnexpectedPacket { id: u8, state: SessionState },
}

impl SessionError {
    /// Disconnect reason shown to the peer.
    pub fn reason(&self) -> &'static str {
        match self {
            SessionError::Rejected(reason) => *reason,
            _ => REASON_BAD_PACKETS,
        }
    }
}

/// Outcome of handling one frame that the server has to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Identification finished; create the player and stream the level.
    Joined { name: String, operator: bool },
    /// A frame for the player this session mediates for.
    Forward(ServerboundPacket),
}

pub struct ConnectionSession<T: Transport> {
    id: SessionId,
    transport: T,
    peer: String,
    state: SessionState,
    inbound: BytesMut,
    outbound: BytesMut,
    name: Option<String>,
    extensions: PeerExtensions,
    custom_blocks: bool,
    close_reason: Option<String>,
    connection_lost: bool,
    closing: bool,
}

impl<T: Transport> fmt::Debug for ConnectionSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ConnectionSession<T> {
    pub fn new(id: SessionId, transport: T) -> Self {
        let peer = transport.peer_label();
        Self {
            id,
            transport,
            peer,
            state: SessionState::AwaitingIdentification,
            inbound: BytesMut::with_capacity(4096),
            outbound: BytesMut::with_capacity(4096),
            name: None,
            extensions: PeerExtensions::default(),
            custom_blocks: false,
            close_reason: None,
            connection_lost: false,
            closing: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state != SessionState::Disconnected
    }

    pub fn is_playing(&self) -> bool {
        self.state == SessionState::Playing
    }

    /// The name the peer identified with, once it has.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn extensions(&self) -> &PeerExtensions {
        &self.extensions
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.extensions.supports(extension)
    }

    pub fn supports_custom_blocks(&self) -> bool {
        self.custom_blocks
    }

    pub fn close_reason(&self) -> Option<&str> {
        self.close_reason.as_deref()
    }

    pub fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }

    /// Drains whatever the socket has ready, up to [`INBOUND_LIMIT`].
    pub fn receive(&mut self) {
        if !self.is_connected() {
            return;
        }
        let mut scratch = [0u8; 4096];
        while self.inbound.len() < INBOUND_LIMIT {
            let room = (INBOUND_LIMIT - self.inbound.len()).min(scratch.len());
            match self.transport.try_read(&mut scratch[..room]) {
                Ok(0) => {
                    self.lose_connection();
                    return;
                }
                Ok(n) => self.inbound.extend_from_slice(&scratch[..n]),
                Err(e) if is_transient(e.kind()) => break,
                Err(e) if is_connection_lost(e.kind()) => {
                    debug!(session = %self.id, error = %e, "Read failed");
                    self.lose_connection();
                    return;
                }
                Err(e) => {
                    warn!(session = %self.id, error = %e, "Read failed");
                    self.disconnect(&format!("An unexpected socket error occured ({:?})", e.kind()));
                    return;
                }
            }
        }
    }

    /// Pops the next complete frame from the inbound buffer.
    ///
    /// A trailing partial frame stays buffered for the next drain. A decode
    /// error drops the buffer and disconnects.
    pub fn next_packet(&mut self) -> Option<ServerboundPacket> {
        if !self.is_connected() {
            return None;
        }
        match ServerboundPacket::decode(&self.inbound) {
            Ok(Some((packet, used))) => {
                self.inbound.advance(used);
                Some(packet)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(session = %self.id, peer = %self.peer, error = %e, "Packet read error");
                self.disconnect(REASON_BAD_PACKETS);
                None
            }
        }
    }

    /// Advances the handshake with one frame.
    pub fn handle(
        &mut self,
        packet: ServerboundPacket,
        host: &mut dyn LoginHost,
    ) -> Result<Option<SessionEvent>, SessionError> {
        match (self.state, packet) {
            (SessionState::Disconnected, _) => Ok(None),
            (
                SessionState::AwaitingIdentification,
                ServerboundPacket::PlayerIdentification {
                    protocol_version,
                    username,
                    verification_key,
                    padding,
                },
            ) => self.identify(protocol_version, username, &verification_key, padding, host),
            (
                SessionState::NegotiatingExtensions,
                ServerboundPacket::ExtInfo {
                    app_name,
                    extension_count,
                },
            ) if !self.extensions.has_declared() => {
                info!(
                    session = %self.id,
                    software = %app_name,
                    extensions = extension_count,
                    "Client declared extensions"
                );
                self.extensions.declare(&app_name, extension_count);
                self.maybe_finish_negotiation(host)
            }
            (SessionState::NegotiatingExtensions, ServerboundPacket::ExtEntry { ext_name, version })
                if self.extensions.has_declared() =>
            {
                debug!(session = %self.id, extension = %ext_name, version, "Client extension");
                if ext_name == CUSTOM_BLOCKS {
                    self.custom_blocks = true;
                }
                self.extensions.record(&ext_name, version);
                self.maybe_finish_negotiation(host)
            }
            (SessionState::Playing, packet) => Ok(Some(SessionEvent::Forward(packet))),
            (state, packet) => Err(SessionError::UnexpectedPacket {
                id: packet.id(),
                state,
            }),
        }
    }

    fn identify(
        &mut self,
        version: u8,
        username: String,
        credential: &str,
        padding: u8,
        host: &mut dyn LoginHost,
    ) -> Result<Option<SessionEvent>, SessionError> {
        info!(session = %self.id, peer = %self.peer, name = %username, "Incoming connection");
        self.name = Some(username.clone());

        if version != PROTOCOL_VERSION {
            return Err(SessionError::Rejected(REASON_INVALID_VERSION));
        }
        if host.is_name_taken(&username) {
            return Err(SessionError::Rejected(REASON_DUPLICATE_NAME));
        }
        if !host.authenticate(&username, credential) {
            return Err(SessionError::Rejected(REASON_AUTH_FAILED));
        }
        if !host.is_allowed(&username) {
            return Err(SessionError::Rejected(REASON_NOT_WHITELISTED));
        }
        if !host.has_capacity() {
            return Err(SessionError::Rejected(REASON_SERVER_FULL));
        }
        host.reserve_name(&username, self.id);

        if padding == CPE_MAGIC {
            for packet in advertisement(SOFTWARE_NAME) {
                self.send(&packet)?;
            }
            self.state = SessionState::NegotiatingExtensions;
            Ok(None)
        } else {
            self.finish_identification(host).map(Some)
        }
    }

    fn maybe_finish_negotiation(
        &mut self,
        host: &mut dyn LoginHost,
    ) -> Result<Option<SessionEvent>, SessionError> {
        if !self.extensions.is_complete() {
            return Ok(None);
        }
        if self.custom_blocks {
            self.send(&ClientboundPacket::CustomBlockSupportLevel {
                support_level: CUSTOM_BLOCKS_SUPPORT_LEVEL,
            })?;
        }
        self.finish_identification(host).map(Some)
    }

    fn finish_identification(
        &mut self,
        host: &mut dyn LoginHost,
    ) -> Result<SessionEvent, SessionError> {
        let name = self.name.clone().unwrap_or_default();
        let operator = host.is_operator(&name);
        let identity = host.identity();
        self.send(&ClientboundPacket::ServerIdentification {
            protocol_version: PROTOCOL_VERSION,
            server_name: identity.name.clone(),
            motd: identity.motd.clone(),
            user_type: if operator { USER_TYPE_OP } else { USER_TYPE_NORMAL },
        })?;
        self.state = SessionState::Playing;
        info!(session = %self.id, name = %name, operator, "Client identified");
        Ok(SessionEvent::Joined { name, operator })
    }

    /// Queues one frame, flushing first if the buffer would overflow.
    ///
    /// If the flush cannot make room the peer is not keeping up and the
    /// session is closed instead of buffering further.
    pub fn send(&mut self, packet: &ClientboundPacket) -> Result<(), ProtocolError> {
        if !self.is_connected() {
            return Ok(());
        }
        let size = ClientboundPacket::frame_size(packet.id())
            .ok_or(ProtocolError::UnknownPacket(packet.id()))?;
        if self.outbound.len() + size > OUTBOUND_LIMIT {
            self.flush();
            if !self.is_connected() {
                return Ok(());
            }
            if self.outbound.len() + size > OUTBOUND_LIMIT {
                if !self.closing {
                    warn!(
                        session = %self.id,
                        pending = self.outbound.len(),
                        "Outbound buffer full"
                    );
                    self.disconnect(REASON_OUTBOUND_OVERFLOW);
                }
                return Ok(());
            }
        }
        packet.encode_into(&mut self.outbound)
    }

    /// Like [`send`](Self::send) but replaces custom blocks in `SetBlock`
    /// for peers that did not negotiate them.
    pub fn send_adapted(&mut self, packet: &ClientboundPacket) -> Result<(), ProtocolError> {
        match packet {
            ClientboundPacket::SetBlock { x, y, z, block } if !self.custom_blocks => {
                let block = Block(*block).for_peer(false).id();
                self.send(&ClientboundPacket::set_block(*x, *y, *z, block))
            }
            _ => self.send(packet),
        }
    }

    /// Writes as much buffered output as the socket takes right now.
    pub fn flush(&mut self) {
        if self.connection_lost {
            return;
        }
        while !self.outbound.is_empty() {
            match self.transport.try_write(&self.outbound) {
                Ok(0) => {
                    self.lose_connection();
                    return;
                }
                Ok(n) => self.outbound.advance(n),
                Err(e) if is_transient(e.kind()) => break,
                Err(e) if is_connection_lost(e.kind()) => {
                    warn!(session = %self.id, error = %e, "While flushing socket data");
                    self.lose_connection();
                    return;
                }
                Err(e) => {
                    warn!(session = %self.id, error = %e, "While flushing socket data");
                    self.disconnect(&format!("An unexpected socket error occured ({:?})", e.kind()));
                    return;
                }
            }
        }
    }

    fn lose_connection(&mut self) {
        self.connection_lost = true;
        self.disconnect(REASON_CLIENT_DISCONNECTED);
    }

    /// Sends the reason (while the peer is still reachable) and closes.
    ///
    /// The owning server notices the `Disconnected` state and tears down the
    /// player and name reservation.
    ///
    /// Re-entrant calls (a write failing while the reason is flushed) return
    /// straight away; the outer call finishes the close.
    pub fn disconnect(&mut self, reason: &str) {
        if !self.is_connected() || self.closing {
            return;
        }
        self.closing = true;
        let first = self.close_reason.is_none();
        if first {
            self.close_reason = Some(reason.to_string());
        }
        if !self.connection_lost {
            if let Err(e) = self.send(&ClientboundPacket::disconnect(reason)) {
                warn!(session = %self.id, error = %e, "Failed to queue disconnect");
            }
            self.flush();
        }
        self.state = SessionState::Disconnected;
        self.inbound.clear();
        self.outbound.clear();
        if first {
            info!(session = %self.id, peer = %self.peer, %reason, "Client connection lost");
        }
    }
}

impl<T: Transport> PacketSink for ConnectionSession<T> {
    fn send_packet(&mut self, packet: ClientboundPacket) -> Result<(), ProtocolError> {
        self.send(&packet)
    }

    fn supports_custom_blocks(&self) -> bool {
        self.custom_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classic_shared::config::ServerConfig;
    use classic_shared::net::{MemoryPeer, MemoryTransport};
    use classic_shared::protocol::extensions::SERVER_EXTENSIONS;

    use crate::lobby::Lobby;

    fn session(id: u64) -> (ConnectionSession<MemoryTransport>, MemoryPeer) {
        let (transport, peer) = MemoryTransport::pair(&format!("mem-{id}"));
        (ConnectionSession::new(SessionId(id), transport), peer)
    }

    fn lobby() -> Lobby {
        Lobby::new(&ServerConfig {
            server_name: "Test".into(),
            motd: "Hi".into(),
            operators: vec!["boss".into()],
            ..ServerConfig::default()
        })
    }

    fn ident(name: &str, padding: u8) -> ServerboundPacket {
        ServerboundPacket::PlayerIdentification {
            protocol_version: PROTOCOL_VERSION,
            username: name.into(),
            verification_key: "-".into(),
            padding,
        }
    }

    fn ext_entry(name: &str) -> ServerboundPacket {
        ServerboundPacket::ExtEntry {
            ext_name: name.into(),
            version: 1,
        }
    }

    /// Frames the server wrote to the peer.
    fn written(s: &mut ConnectionSession<MemoryTransport>, peer: &MemoryPeer) -> Vec<ClientboundPacket> {
        s.flush();
        let bytes = peer.take_written();
        let mut out = Vec::new();
        let mut rest = &bytes[..];
        while let Some((packet, used)) = ClientboundPacket::decode(rest).unwrap() {
            out.push(packet);
            rest = &rest[used..];
        }
        assert!(rest.is_empty());
        out
    }

    /// Feeds frames through the socket path and handles them.
    fn feed(
        s: &mut ConnectionSession<MemoryTransport>,
        peer: &MemoryPeer,
        lobby: &mut Lobby,
        packets: &[ServerboundPacket],
    ) -> Vec<SessionEvent> {
        for p in packets {
            peer.send(&p.encode().unwrap());
        }
        s.receive();
        let mut events = Vec::new();
        while let Some(p) = s.next_packet() {
            match s.handle(p, lobby) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => s.disconnect(e.reason()),
            }
        }
        events
    }

    #[test]
    fn classic_peer_goes_straight_to_playing() {
        let (mut s, peer) = session(1);
        let mut lobby = lobby();
        let events = feed(&mut s, &peer, &mut lobby, &[ident("boss", 0)]);

        assert_eq!(s.state(), SessionState::Playing);
        assert_eq!(
            events,
            vec![SessionEvent::Joined {
                name: "boss".into(),
                operator: true,
            }]
        );
        assert_eq!(
            written(&mut s, &peer),
            vec![ClientboundPacket::ServerIdentification {
                protocol_version: 7,
                server_name: "Test".into(),
                motd: "Hi".into(),
                user_type: USER_TYPE_OP,
            }]
        );
    }

    #[test]
    fn negotiation_waits_for_every_declared_entry() {
        let (mut s, peer) = session(1);
        let mut lobby = lobby();
        feed(&mut s, &peer, &mut lobby, &[ident("steve", CPE_MAGIC)]);
        assert_eq!(s.state(), SessionState::NegotiatingExtensions);

        let advert = written(&mut s, &peer);
        assert_eq!(advert.len(), SERVER_EXTENSIONS.len() + 1);
        assert_eq!(
            advert[0],
            ClientboundPacket::ExtInfo {
                app_name: SOFTWARE_NAME.into(),
                extension_count: SERVER_EXTENSIONS.len() as i16,
            }
        );

        let info = ServerboundPacket::ExtInfo {
            app_name: "TestClient".into(),
            extension_count: 3,
        };
        feed(&mut s, &peer, &mut lobby, &[info, ext_entry("EnvColors"), ext_entry("Foo")]);
        assert_eq!(s.state(), SessionState::NegotiatingExtensions);
        assert!(written(&mut s, &peer).is_empty());

        let events = feed(&mut s, &peer, &mut lobby, &[ext_entry("EnvMapAspect")]);
        assert_eq!(s.state(), SessionState::Playing);
        assert_eq!(events.len(), 1);
        assert!(s.supports("Foo"));
        assert!(!s.supports_custom_blocks());

        let frames = written(&mut s, &peer);
        assert_eq!(frames.len(), 1);
        assert!(matches!(
            frames[0],
            ClientboundPacket::ServerIdentification { user_type: 0, .. }
        ));
    }

    #[test]
    fn custom_blocks_yields_one_support_level_frame() {
        let (mut s, peer) = session(1);
        let mut lobby = lobby();
        feed(&mut s, &peer, &mut lobby, &[ident("steve", CPE_MAGIC)]);
        written(&mut s, &peer);

        let info = ServerboundPacket::ExtInfo {
            app_name: "TestClient".into(),
            extension_count: 2,
        };
        feed(
            &mut s,
            &peer,
            &mut lobby,
            &[info, ext_entry(CUSTOM_BLOCKS), ext_entry("EnvColors")],
        );

        let frames = written(&mut s, &peer);
        let support: Vec<_> = frames
            .iter()
            .filter(|f| matches!(f, ClientboundPacket::CustomBlockSupportLevel { .. }))
            .collect();
        assert_eq!(support.len(), 1);
        assert!(matches!(
            frames[0],
            ClientboundPacket::CustomBlockSupportLevel { support_level: 1 }
        ));
        assert!(matches!(frames[1], ClientboundPacket::ServerIdentification { .. }));
        assert!(s.supports_custom_blocks());
    }

    #[test]
    fn zero_extensions_finishes_on_ext_info() {
        let (mut s, peer) = session(1);
        let mut lobby = lobby();
        let info = ServerboundPacket::ExtInfo {
            app_name: "Bare".into(),
            extension_count: 0,
        };
        let events = feed(&mut s, &peer, &mut lobby, &[ident("steve", CPE_MAGIC), info]);
        assert_eq!(s.state(), SessionState::Playing);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn duplicate_name_is_rejected_and_first_keeps_playing() {
        let mut lobby = lobby();
        let (mut first, first_peer) = session(1);
        feed(&mut first, &first_peer, &mut lobby, &[ident("Steve", 0)]);
        written(&mut first, &first_peer);

        let (mut second, second_peer) = session(2);
        feed(&mut second, &second_peer, &mut lobby, &[ident("steve", 0)]);

        assert_eq!(second.state(), SessionState::Disconnected);
        assert_eq!(second.close_reason(), Some(REASON_DUPLICATE_NAME));
        assert_eq!(
            second_peer.take_written(),
            ClientboundPacket::disconnect(REASON_DUPLICATE_NAME)
                .encode()
                .unwrap()
                .to_vec()
        );
        assert_eq!(first.state(), SessionState::Playing);
        assert_eq!(lobby.find("steve"), Some(SessionId(1)));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let (mut s, peer) = session(1);
        let mut lobby = lobby();
        let old = ServerboundPacket::PlayerIdentification {
            protocol_version: 6,
            username: "old".into(),
            verification_key: String::new(),
            padding: 0,
        };
        feed(&mut s, &peer, &mut lobby, &[old]);
        assert_eq!(s.close_reason(), Some(REASON_INVALID_VERSION));
        assert!(!lobby.is_name_taken("old"));
    }

    #[test]
    fn full_server_rejects() {
        let mut lobby = Lobby::new(&ServerConfig {
            max_players: 1,
            ..ServerConfig::default()
        });
        lobby.reserve_name("someone", SessionId(9));
        let (mut s, peer) = session(1);
        feed(&mut s, &peer, &mut lobby, &[ident("late", 0)]);
        assert_eq!(s.close_reason(), Some(REASON_SERVER_FULL));
    }

    #[test]
    fn frame_split_across_drains_is_decoded_once_complete() {
        let (mut s, peer) = session(1);
        let bytes = ident("steve", 0).encode().unwrap();
        peer.send(&bytes[..50]);
        s.receive();
        assert!(s.next_packet().is_none());
        assert!(s.is_connected());

        peer.send(&bytes[50..]);
        s.receive();
        assert_eq!(s.next_packet(), Some(ident("steve", 0)));
        assert!(s.next_packet().is_none());
    }

    #[test]
    fn unknown_packet_disconnects_with_reason() {
        let (mut s, peer) = session(1);
        peer.send(&[0xee, 1, 2, 3]);
        s.receive();
        assert!(s.next_packet().is_none());
        assert_eq!(s.close_reason(), Some(REASON_BAD_PACKETS));
    }

    #[test]
    fn gameplay_before_identification_is_protocol_error() {
        let (mut s, peer) = session(1);
        let mut lobby = lobby();
        let early = ServerboundPacket::SetBlock {
            x: 0,
            y: 0,
            z: 0,
            mode: 1,
            block: 1,
        };
        feed(&mut s, &peer, &mut lobby, &[early]);
        assert_eq!(s.close_reason(), Some(REASON_BAD_PACKETS));
    }

    #[test]
    fn playing_frames_are_forwarded() {
        let (mut s, peer) = session(1);
        let mut lobby = lobby();
        let chat = ServerboundPacket::Message {
            unused: 0xff,
            message: "hello".into(),
        };
        let events = feed(&mut s, &peer, &mut lobby, &[ident("steve", 0), chat.clone()]);
        assert_eq!(events[1], SessionEvent::Forward(chat));
    }

    #[test]
    fn eof_is_client_disconnected() {
        let (mut s, peer) = session(1);
        peer.close();
        s.receive();
        assert_eq!(s.close_reason(), Some(REASON_CLIENT_DISCONNECTED));
        assert!(peer.take_written().is_empty());
    }

    #[test]
    fn would_block_keeps_remainder_queued() {
        let (mut s, peer) = session(1);
        peer.limit_writes(Some(10));
        s.send(&ClientboundPacket::chat("hello")).unwrap();
        s.flush();
        assert!(s.is_connected());
        assert_eq!(s.pending_outbound(), 66 - 10);

        peer.limit_writes(None);
        s.flush();
        assert_eq!(s.pending_outbound(), 0);
        assert_eq!(peer.take_written().len(), 66);
    }

    #[test]
    fn reset_during_flush_disconnects() {
        let (mut s, peer) = session(1);
        s.send(&ClientboundPacket::chat("x")).unwrap();
        peer.reset();
        s.flush();
        assert_eq!(s.close_reason(), Some(REASON_CLIENT_DISCONNECTED));
    }

    #[test]
    fn hard_write_error_closes_once() {
        let (mut s, peer) = session(1);
        peer.fail_writes(std::io::ErrorKind::TimedOut);
        s.send(&ClientboundPacket::chat("x")).unwrap();
        s.flush();
        assert!(!s.is_connected());
        assert_eq!(
            s.close_reason(),
            Some("An unexpected socket error occured (TimedOut)")
        );
        assert_eq!(s.pending_outbound(), 0);

        s.disconnect("again");
        assert_eq!(
            s.close_reason(),
            Some("An unexpected socket error occured (TimedOut)")
        );
    }

    #[test]
    fn hard_write_error_while_disconnecting() {
        let (mut s, peer) = session(1);
        peer.fail_writes(std::io::ErrorKind::PermissionDenied);
        s.disconnect("bye");
        assert!(!s.is_connected());
        assert_eq!(s.close_reason(), Some("bye"));
        assert!(peer.take_written().is_empty());
    }

    #[test]
    fn stalled_reader_is_disconnected_at_the_limit() {
        let (mut s, peer) = session(1);
        peer.limit_writes(Some(0));
        let mut sent = 0;
        while s.is_connected() && sent < 20_000 {
            s.send(&ClientboundPacket::chat("spam")).unwrap();
            assert!(s.pending_outbound() <= OUTBOUND_LIMIT);
            sent += 1;
        }
        assert!(!s.is_connected());
        assert!(sent < 20_000);
        assert_eq!(s.close_reason(), Some(REASON_OUTBOUND_OVERFLOW));
        assert_eq!(s.pending_outbound(), 0);

        s.send(&ClientboundPacket::chat("late")).unwrap();
        assert_eq!(s.pending_outbound(), 0);
    }

    #[test]
    fn slow_reader_that_drains_stays_connected() {
        let (mut s, peer) = session(1);
        for _ in 0..20_000 {
            s.send(&ClientboundPacket::chat("steady")).unwrap();
            assert!(s.pending_outbound() <= OUTBOUND_LIMIT);
        }
        assert!(s.is_connected());
        s.flush();
        assert_eq!(peer.take_written().len(), 20_000 * 66);
    }

    #[test]
    fn classic_peer_gets_fallback_blocks() {
        let (mut s, peer) = session(1);
        s.send_adapted(&ClientboundPacket::set_block(1, 2, 3, Block::ICE.id()))
            .unwrap();
        assert_eq!(
            written(&mut s, &peer),
            vec![ClientboundPacket::set_block(1, 2, 3, Block::ICE.fallback().id())]
        );
    }
}
