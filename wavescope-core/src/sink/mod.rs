//! Report delivery: the sink trait and the fan-out dispatcher.
//!
//! Every encoded report is offered to each configured sink
//! independently. A sink owns its own failure and reconnect state;
//! one sink failing, stalling, or dropping a report never prevents
//! delivery attempts to the others and never corrupts session or
//! channel state upstream.

mod file;
mod forward;
mod stream;

pub use file::FileSink;
pub use forward::ForwardingSink;
pub use stream::{DatagramStreamSink, StreamSink};

use std::path::Path;

use async_trait::async_trait;
use tracing::warn;

use crate::error::BridgeError;

// ── DeliveryContext ──────────────────────────────────────────────

/// Per-report metadata sinks may need beyond the opaque packet.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryContext<'a> {
    pub channel_id: i16,
    pub frame_seq: u64,
    /// Filename hint carried by the channel's frames, used by the
    /// file sink to name the per-channel output file.
    pub filename_hint: &'a str,
}

// ── Sink ─────────────────────────────────────────────────────────

/// An independent delivery destination for encoded reports.
#[async_trait]
pub trait Sink: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// A session began; `dir` is its output directory.
    async fn session_started(&mut self, _dir: &Path) -> Result<(), BridgeError> {
        Ok(())
    }

    /// Deliver one encoded report.
    async fn deliver(
        &mut self,
        ctx: &DeliveryContext<'_>,
        packet: &[u8],
    ) -> Result<(), BridgeError>;

    /// The session ended; flush and release per-session resources.
    async fn session_ended(&mut self) -> Result<(), BridgeError> {
        Ok(())
    }
}

// ── Dispatcher ───────────────────────────────────────────────────

/// Fans one report out to every configured sink, isolating failures.
#[derive(Default)]
pub struct Dispatcher {
    sinks: Vec<Box<dyn Sink>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink to the fan-out set.
    pub fn push(&mut self, sink: Box<dyn Sink>) {
        self.sinks.push(sink);
    }

    /// Number of configured sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Notify every sink that a session began.
    pub async fn session_started(&mut self, dir: &Path) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.session_started(dir).await {
                warn!(sink = sink.name(), error = %e, "session start notification failed");
            }
        }
    }

    /// Offer one encoded report to every sink.
    ///
    /// Failures are logged per sink and never short-circuit the rest.
    pub async fn deliver(&mut self, ctx: &DeliveryContext<'_>, packet: &[u8]) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.deliver(ctx, packet).await {
                warn!(
                    sink = sink.name(),
                    channel = ctx.channel_id,
                    error = %e,
                    "report delivery failed"
                );
            }
        }
    }

    /// Notify every sink that the session ended.
    pub async fn session_ended(&mut self) {
        for sink in &mut self.sinks {
            if let Err(e) = sink.session_ended().await {
                warn!(sink = sink.name(), error = %e, "session end flush failed");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records delivered packets; optionally fails every call.
    struct FakeSink {
        name: &'static str,
        fail: bool,
        delivered: Arc<Mutex<Vec<Vec<u8>>>>,
        ended: Arc<Mutex<u32>>,
    }

    impl FakeSink {
        fn new(name: &'static str, fail: bool) -> (Self, Arc<Mutex<Vec<Vec<u8>>>>) {
            let delivered = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    name,
                    fail,
                    delivered: Arc::clone(&delivered),
                    ended: Arc::new(Mutex::new(0)),
                },
                delivered,
            )
        }
    }

    #[async_trait]
    impl Sink for FakeSink {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn deliver(
            &mut self,
            _ctx: &DeliveryContext<'_>,
            packet: &[u8],
        ) -> Result<(), BridgeError> {
            if self.fail {
                return Err(BridgeError::Delivery {
                    sink: self.name,
                    reason: "synthetic failure".into(),
                });
            }
            self.delivered.lock().unwrap().push(packet.to_vec());
            Ok(())
        }

        async fn session_ended(&mut self) -> Result<(), BridgeError> {
            *self.ended.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn ctx() -> DeliveryContext<'static> {
        DeliveryContext {
            channel_id: 1,
            frame_seq: 8,
            filename_hint: "take-1",
        }
    }

    #[tokio::test]
    async fn failing_sink_does_not_block_others() {
        let (bad, bad_log) = FakeSink::new("bad", true);
        let (good, good_log) = FakeSink::new("good", false);

        let mut dispatcher = Dispatcher::new();
        dispatcher.push(Box::new(bad));
        dispatcher.push(Box::new(good));

        dispatcher.deliver(&ctx(), b"packet-1").await;
        dispatcher.deliver(&ctx(), b"packet-2").await;

        assert!(bad_log.lock().unwrap().is_empty());
        let good = good_log.lock().unwrap();
        assert_eq!(good.len(), 2);
        assert_eq!(good[0], b"packet-1");
        assert_eq!(good[1], b"packet-2");
    }

    #[tokio::test]
    async fn delivery_order_preserved_per_sink() {
        let (sink, log) = FakeSink::new("only", false);
        let mut dispatcher = Dispatcher::new();
        dispatcher.push(Box::new(sink));

        for i in 0..5u8 {
            dispatcher.deliver(&ctx(), &[i]).await;
        }

        let log = log.lock().unwrap();
        let order: Vec<u8> = log.iter().map(|p| p[0]).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn empty_dispatcher_is_harmless() {
        let mut dispatcher = Dispatcher::new();
        assert!(dispatcher.is_empty());
        dispatcher.deliver(&ctx(), b"nowhere").await;
        dispatcher.session_ended().await;
    }
}
