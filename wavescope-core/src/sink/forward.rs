//! Non-blocking hand-off of encoded reports to another process.
//!
//! Same transport class as ingest (Unix datagram). The hand-off never
//! waits: when the peer is full or absent the report for that tick is
//! simply dropped and counted. Completeness is traded for keeping the
//! hot path free of backpressure.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::error::BridgeError;
use crate::sink::{DeliveryContext, Sink};
use crate::transport::DatagramForwarder;

// ── ForwardingSink ───────────────────────────────────────────────

/// Forwards each encoded report as one datagram to a peer socket.
pub struct ForwardingSink {
    forwarder: DatagramForwarder,
    dropped: u64,
}

impl ForwardingSink {
    /// Target the peer socket at `peer` (it need not exist yet).
    pub fn new(peer: impl AsRef<Path>) -> Result<Self, BridgeError> {
        Ok(Self {
            forwarder: DatagramForwarder::new(peer)?,
            dropped: 0,
        })
    }

    /// Reports dropped because the peer was full or unavailable.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[async_trait]
impl Sink for ForwardingSink {
    fn name(&self) -> &'static str {
        "forward"
    }

    async fn deliver(
        &mut self,
        ctx: &DeliveryContext<'_>,
        packet: &[u8],
    ) -> Result<(), BridgeError> {
        if !self.forwarder.try_forward(packet)? {
            self.dropped += 1;
            debug!(
                channel = ctx.channel_id,
                dropped = self.dropped,
                "peer unavailable, report dropped"
            );
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
