//! Streaming network sinks for live visualization clients.
//!
//! Two variants over the same best-effort policy (reports produced
//! while nobody is listening are dropped, never queued):
//!
//! - [`StreamSink`] — TCP. A spawned accept loop feeds connections
//!   through a channel; the sink serves one client at a time. Writes
//!   never wait: a client whose send buffer is full costs one dropped
//!   packet (or the connection, if it stalls mid-packet), not a stall
//!   of the dispatch loop. Any write failure is read as a disconnect:
//!   the connection is dropped and the sink reverts to awaiting the
//!   next client, without disturbing the session.
//! - [`DatagramStreamSink`] — UDP. The sink learns the most recently
//!   seen peer address from inbound rendezvous datagrams and streams
//!   to it; before any rendezvous, reports are dropped.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::sink::{DeliveryContext, Sink};

/// Accept-loop backoff after a failed accept.
const ACCEPT_RETRY: Duration = Duration::from_millis(500);

// ── StreamSink (TCP) ─────────────────────────────────────────────

/// Serial one-client TCP streaming sink.
pub struct StreamSink {
    incoming: mpsc::Receiver<TcpStream>,
    client: Option<TcpStream>,
    local_addr: SocketAddr,
    dropped: u64,
}

impl StreamSink {
    /// Bind the listening endpoint and spawn the accept loop.
    ///
    /// Binding failure is returned to the caller — at startup it is
    /// fatal, since the bridge has no degraded mode without its
    /// primary output.
    pub async fn bind(addr: SocketAddr) -> Result<Self, BridgeError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        info!(%peer, "stream client connected");
                        if tx.send(stream).await.is_err() {
                            // Sink dropped; stop accepting.
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed, backing off");
                        tokio::time::sleep(ACCEPT_RETRY).await;
                    }
                }
            }
        });

        Ok(Self {
            incoming: rx,
            client: None,
            local_addr,
            dropped: 0,
        })
    }

    /// The bound listening address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether a client is currently being streamed to.
    pub fn is_streaming(&self) -> bool {
        self.client.is_some()
    }

    /// Reports dropped while no client was connected.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[async_trait]
impl Sink for StreamSink {
    fn name(&self) -> &'static str {
        "stream"
    }

    async fn deliver(
        &mut self,
        _ctx: &DeliveryContext<'_>,
        packet: &[u8],
    ) -> Result<(), BridgeError> {
        // Pick up a waiting client if we have none.
        if self.client.is_none() {
            match self.incoming.try_recv() {
                Ok(stream) => self.client = Some(stream),
                Err(_) => {
                    self.dropped += 1;
                    return Ok(());
                }
            }
        }

        // Unwrap is fine: populated just above or already present.
        let client = self.client.as_mut().unwrap();

        // Non-blocking write: the dispatch loop must never park on a
        // slow client. Packets go out whole or not at all; a client
        // that fills up mid-packet would desync the byte stream, so
        // it is disconnected instead.
        let mut written = 0;
        while written < packet.len() {
            match client.try_write(&packet[written..]) {
                Ok(0) => {
                    info!("stream client closed its socket");
                    self.client = None;
                    break;
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if written == 0 {
                        self.dropped += 1;
                        debug!("client send buffer full, report dropped");
                    } else {
                        info!("stream client stalled mid-packet, disconnecting");
                        self.client = None;
                    }
                    break;
                }
                Err(e) => {
                    // Write failure means the client went away; go
                    // back to accepting. Old reports are not replayed.
                    info!(error = %e, "stream client disconnected");
                    self.client = None;
                    break;
                }
            }
        }
        Ok(())
    }

    async fn session_ended(&mut self) -> Result<(), BridgeError> {
        if let Some(client) = self.client.as_mut() {
            let _ = client.flush().await;
        }
        Ok(())
    }
}

// ── DatagramStreamSink (UDP) ─────────────────────────────────────

/// Connectionless variant: streams to the most recently seen peer.
pub struct DatagramStreamSink {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    local_addr: SocketAddr,
    dropped: u64,
}

impl DatagramStreamSink {
    /// Bind the rendezvous socket.
    pub async fn bind(addr: SocketAddr) -> Result<Self, BridgeError> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        Ok(Self {
            socket,
            peer: None,
            local_addr,
            dropped: 0,
        })
    }

    /// The bound socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The currently learned peer, if any rendezvous arrived.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Drain inbound datagrams, remembering the newest sender.
    fn learn_peer(&mut self) {
        let mut scratch = [0u8; 64];
        while let Ok((_, from)) = self.socket.try_recv_from(&mut scratch) {
            if self.peer != Some(from) {
                info!(%from, "learned stream peer");
            }
            self.peer = Some(from);
        }
    }
}

#[async_trait]
impl Sink for DatagramStreamSink {
    fn name(&self) -> &'static str {
        "stream-udp"
    }

    async fn deliver(
        &mut self,
        _ctx: &DeliveryContext<'_>,
        packet: &[u8],
    ) -> Result<(), BridgeError> {
        self.learn_peer();
        let Some(peer) = self.peer else {
            self.dropped += 1;
            return Ok(());
        };
        match self.socket.try_send_to(packet, peer) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                self.dropped += 1;
                debug!("udp send buffer full, report dropped");
                Ok(())
            }
            Err(e) => Err(BridgeError::Delivery {
                sink: "stream-udp",
                reason: e.to_string(),
            }),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
