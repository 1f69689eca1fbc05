//! Datagram ingest and forwarding over Unix domain sockets.
//!
//! The engine hands the bridge discrete messages in arrival order, one
//! datagram each, so the transport must preserve message boundaries.
//! `SOCK_DGRAM` Unix sockets give exactly that without inventing a
//! framing layer.
//!
//! Two halves:
//! - [`DatagramTransport`] — the bound ingest side: blocking FIFO
//!   receive plus a startup [`drain`](MessageTransport::drain) that
//!   discards any backlog left over from a previous session.
//! - [`DatagramForwarder`] — the write side used by the forwarding
//!   sink: non-blocking sends that drop when the peer is full or gone.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UnixDatagram;

use crate::error::BridgeError;
use crate::protocol::MAX_MESSAGE_SIZE;

// ── MessageTransport ─────────────────────────────────────────────

/// Boundary to the upstream message channel.
///
/// Implementations must deliver whole messages in arrival order.
#[async_trait]
pub trait MessageTransport: Send {
    /// Receive the next whole message, waiting if none is pending.
    async fn recv(&mut self) -> Result<Bytes, BridgeError>;

    /// Discard any already-queued messages without blocking.
    ///
    /// Returns the number of messages thrown away. Used once at
    /// startup so a new run never consumes a prior session's backlog.
    fn drain(&mut self) -> usize;
}

// ── DatagramTransport ────────────────────────────────────────────

/// Ingest side: a Unix datagram socket bound to a filesystem path.
pub struct DatagramTransport {
    socket: UnixDatagram,
    path: PathBuf,
    buf: Vec<u8>,
}

impl DatagramTransport {
    /// Bind the ingest socket at `path`, replacing any stale socket
    /// file from a previous run.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref().to_path_buf();
        match std::fs::remove_file(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(BridgeError::Resource {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        }
        let socket = UnixDatagram::bind(&path)?;
        Ok(Self {
            socket,
            path,
            buf: vec![0u8; MAX_MESSAGE_SIZE],
        })
    }

    /// The filesystem path the socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MessageTransport for DatagramTransport {
    async fn recv(&mut self) -> Result<Bytes, BridgeError> {
        let n = self.socket.recv(&mut self.buf).await?;
        Ok(Bytes::copy_from_slice(&self.buf[..n]))
    }

    fn drain(&mut self) -> usize {
        let mut discarded = 0;
        while self.socket.try_recv(&mut self.buf).is_ok() {
            discarded += 1;
        }
        discarded
    }
}

impl Drop for DatagramTransport {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// ── DatagramForwarder ────────────────────────────────────────────

/// Write side: fire-and-forget datagrams to a peer socket path.
///
/// Sends never block; a full peer buffer or an absent peer drops the
/// message and reports `false` so callers can count the loss.
pub struct DatagramForwarder {
    socket: UnixDatagram,
    peer: PathBuf,
}

impl DatagramForwarder {
    /// Create a forwarder targeting the peer socket at `peer`.
    ///
    /// The peer does not need to exist yet; sends before it binds are
    /// dropped like any other unavailable-peer send.
    pub fn new(peer: impl AsRef<Path>) -> Result<Self, BridgeError> {
        Ok(Self {
            socket: UnixDatagram::unbound()?,
            peer: peer.as_ref().to_path_buf(),
        })
    }

    /// Attempt a non-blocking send.
    ///
    /// Returns `Ok(true)` if the datagram was handed to the kernel,
    /// `Ok(false)` if it was dropped (peer full or not bound), and an
    /// error only for unexpected socket failures.
    pub fn try_forward(&self, data: &[u8]) -> Result<bool, BridgeError> {
        match self.socket.try_send_to(data, &self.peer) {
            Ok(_) => Ok(true),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::NotFound | ErrorKind::ConnectionRefused
                ) =>
            {
                Ok(false)
            }
            // A peer that bound, filled, or died mid-send shows up as
            // ENOBUFS/EPIPE depending on platform; treat as a drop.
            Err(e) if matches!(e.kind(), ErrorKind::OutOfMemory | ErrorKind::BrokenPipe) => {
                Ok(false)
            }
            Err(e) => Err(BridgeError::Transport(e)),
        }
    }

    /// The peer path this forwarder targets.
    pub fn peer(&self) -> &Path {
        &self.peer
    }
}

// ── Tests ────────────────────────────────────────────────────────
