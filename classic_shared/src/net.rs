//! Networking primitives.
//!
//! Sessions talk to their peer through [`Transport`], a non-blocking byte
//! pipe. The real server uses `tokio::net::TcpStream` readiness calls
//! (`try_read`/`try_write`); tests use the in-memory [`MemoryTransport`].

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};

/// Non-blocking byte transport.
///
/// Both calls return `ErrorKind::WouldBlock` when nothing can be moved right
/// now. A read of 0 bytes means the peer closed the connection.
pub trait Transport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Human-readable peer label for logs.
    fn peer_label(&self) -> String;
}

impl Transport for TcpStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        TcpStream::try_read(self, buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        TcpStream::try_write(self, buf)
    }

    fn peer_label(&self) -> String {
        self.peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

/// Errors that only mean "try again later".
pub fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

/// Errors that mean the peer is gone.
pub fn is_connection_lost(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

/// Binds a TCP listener, logging the bound address.
pub async fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    tracing::debug!(addr = %listener.local_addr()?, "Listener bound");
    Ok(listener)
}

#[derive(Debug, Default)]
struct Pipe {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    peer_closed: bool,
    reset: bool,
    write_budget: Option<usize>,
    write_error: Option<io::ErrorKind>,
}

/// In-memory transport, the server half of a [`MemoryPeer`] pair.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    pipe: Arc<Mutex<Pipe>>,
    label: String,
}

/// The remote half of a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    pipe: Arc<Mutex<Pipe>>,
}

impl MemoryTransport {
    pub fn pair(label: &str) -> (MemoryTransport, MemoryPeer) {
        let pipe = Arc::new(Mutex::new(Pipe::default()));
        (
            MemoryTransport {
                pipe: pipe.clone(),
                label: label.to_string(),
            },
            MemoryPeer { pipe },
        )
    }

    fn pipe(&self) -> io::Result<std::sync::MutexGuard<'_, Pipe>> {
        self.pipe
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory pipe poisoned"))
    }
}

impl Transport for MemoryTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pipe = self.pipe()?;
        if pipe.reset {
            return Err(io::ErrorKind::ConnectionReset.into());
        }
        if pipe.inbound.is_empty() {
            return if pipe.peer_closed {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = buf.len().min(pipe.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(pipe.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut pipe = self.pipe()?;
        if pipe.reset {
            return Err(io::ErrorKind::ConnectionReset.into());
        }
        if let Some(kind) = pipe.write_error {
            return Err(kind.into());
        }
        let n = match pipe.write_budget {
            Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(budget) => budget.min(buf.len()),
            None => buf.len(),
        };
        if let Some(budget) = pipe.write_budget.as_mut() {
            *budget -= n;
        }
        pipe.outbound.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn peer_label(&self) -> String {
        self.label.clone()
    }
}

impl MemoryPeer {
    fn with<R>(&self, f: impl FnOnce(&mut Pipe) -> R) -> R {
        let mut pipe = self.pipe.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut pipe)
    }

    /// Queues bytes for the transport to read.
    pub fn send(&self, bytes: &[u8]) {
        self.with(|p| p.inbound.extend(bytes.iter().copied()));
    }

    /// Takes everything the transport has written so far.
    pub fn take_written(&self) -> Vec<u8> {
        self.with(|p| std::mem::take(&mut p.outbound))
    }

    /// Makes further reads return EOF once the queue is empty.
    pub fn close(&self) {
        self.with(|p| p.peer_closed = true);
    }

    /// Makes every further call fail with `ConnectionReset`.
    pub fn reset(&self) {
        self.with(|p| p.reset = true);
    }

    /// Caps how many more bytes the transport may write; `None` lifts it.
    pub fn limit_writes(&self, budget: Option<usize>) {
        self.with(|p| p.write_budget = budget);
    }

    /// Makes every further write fail with `kind`.
    pub fn fail_writes(&self, kind: io::ErrorKind) {
        self.with(|p| p.write_error = Some(kind));
    }
}
