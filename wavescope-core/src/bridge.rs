//! The bridge pipeline: one sequential chain per received message.
//!
//! Orchestration order per message:
//!
//! 1. [`MessageTransport`] receives the next datagram.
//! 2. [`ControlMessage::decode`] classifies it.
//! 3. Session records drive the [`SessionController`]; audio meta is
//!    paired with the immediately following payload datagram.
//! 4. The channel's [`WindowAccumulator`] merges frames; on a
//!    completed window the [`Analyzer`] runs synchronously.
//! 5. The [`ReportEncoder`] packs the result and the [`Dispatcher`]
//!    fans it out.
//!
//! There is no parallelism across channels or sinks: per-channel
//! report order equals frame arrival order. Every taxonomy error is
//! logged and the loop returns to waiting; only transport failure
//! tears the loop down.
//!
//! While `Idle`, an audio meta is dropped **without** consuming its
//! payload — audio without a session has no context to attribute it
//! to. The stray payload datagram then classifies as malformed and is
//! discarded quietly (malformed input logs at `debug` while `Idle`,
//! `warn` while `Active`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::aggregate::WindowSpec;
use crate::analysis::{Analyzer, SpectralAnalyzer};
use crate::error::BridgeError;
use crate::protocol::{AudioMeta, ControlMessage};
use crate::report::{OscEncoder, Report, ReportEncoder};
use crate::session::SessionController;
use crate::sink::{DeliveryContext, Dispatcher};
use crate::transport::MessageTransport;

// ── BridgeConfig ─────────────────────────────────────────────────

/// Pipeline-wide tunables.
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    /// Sample rate the engine captures at, handed to the analyzer.
    pub sample_rate: u32,
    /// Window geometry applied to every channel.
    pub window: WindowSpec,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            window: WindowSpec::default(),
        }
    }
}

// ── AudioBridge ──────────────────────────────────────────────────

/// The session/frame bridge.
///
/// # Lifetime
///
/// Call [`run`](Self::run) to start consuming messages. It runs until
/// [`stop`](Self::stop) is called (or the stop handle is flipped) or
/// the transport fails.
pub struct AudioBridge<T: MessageTransport> {
    transport: T,
    controller: SessionController,
    dispatcher: Dispatcher,
    analyzer: Box<dyn Analyzer>,
    encoder: Box<dyn ReportEncoder>,
    config: BridgeConfig,
    running: Arc<AtomicBool>,
}

impl<T: MessageTransport> AudioBridge<T> {
    /// Assemble a bridge with the production analyzer and encoder.
    pub fn new(
        transport: T,
        config: BridgeConfig,
        controller: SessionController,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            transport,
            controller,
            dispatcher,
            analyzer: Box::new(SpectralAnalyzer::new()),
            encoder: Box::new(OscEncoder::new()),
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Swap in a different analyzer.
    pub fn with_analyzer(mut self, analyzer: Box<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Swap in a different report encoder.
    pub fn with_encoder(mut self, encoder: Box<dyn ReportEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// A cloneable handle that can stop the bridge from another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Signal the bridge to stop after the current message.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the run loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Consume messages until stopped or the transport fails.
    pub async fn run(&mut self) -> Result<(), BridgeError> {
        self.running.store(true, Ordering::SeqCst);

        // Never consume a prior session's backlog.
        let discarded = self.transport.drain();
        if discarded > 0 {
            info!(discarded, "flushed stale messages from a previous run");
        }

        while self.running.load(Ordering::SeqCst) {
            let msg = tokio::select! {
                m = self.transport.recv() => m?,
                _ = Self::wait_for_stop(&self.running) => break,
            };
            self.handle_message(msg).await?;
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    // ── Internal ─────────────────────────────────────────────────

    async fn handle_message(&mut self, msg: Bytes) -> Result<(), BridgeError> {
        match ControlMessage::decode(&msg) {
            ControlMessage::SessionStart { dir } => match self.controller.start(&dir) {
                Ok(path) => {
                    let path = path.to_path_buf();
                    self.dispatcher.session_started(&path).await;
                }
                // Sequence errors are already logged by the controller.
                Err(BridgeError::Sequence(_)) => {}
                Err(e) => error!(session = dir, error = %e, "session start failed"),
            },

            ControlMessage::SessionEnd => {
                if self.controller.is_active() {
                    // Sinks flush and close before the archival
                    // hand-off sees the directory.
                    self.dispatcher.session_ended().await;
                }
                let _ = self.controller.end();
            }

            ControlMessage::AudioMeta(meta) => {
                if !self.controller.is_active() {
                    debug!(
                        channel = meta.channel_id,
                        "audio frame with no active session, dropped"
                    );
                    return Ok(());
                }
                // The payload is the immediately following datagram.
                let payload = self.transport.recv().await?;
                self.handle_frame(meta, &payload).await;
            }

            ControlMessage::Malformed { reason } => {
                if self.controller.is_active() {
                    warn!(reason, size = msg.len(), "discarding malformed message");
                } else {
                    debug!(reason, size = msg.len(), "discarding malformed message");
                }
            }
        }
        Ok(())
    }

    async fn handle_frame(&mut self, meta: AudioMeta, payload: &[u8]) {
        let sample_rate = self.config.sample_rate;
        // Always present: the caller checked the session is active.
        let Some(chan) = self.controller.channel_for(&meta) else {
            return;
        };

        let window = match chan.accumulator.accumulate(meta.frame_seq, payload) {
            Ok(Some(window)) => window,
            Ok(None) => return,
            Err(e) => {
                warn!(channel = meta.channel_id, error = %e, "audio frame rejected");
                return;
            }
        };

        // The window buffer is reused; analysis must finish before
        // the next frame is accumulated, which this sequential loop
        // guarantees.
        let features = self.analyzer.analyze(window, sample_rate);

        let report = Report {
            channel_id: meta.channel_id,
            frame_seq: meta.frame_seq,
            features,
        };
        let packet = match self.encoder.encode(&report) {
            Ok(packet) => packet,
            Err(e) => {
                error!(channel = meta.channel_id, error = %e, "report encoding failed");
                return;
            }
        };

        let ctx = DeliveryContext {
            channel_id: meta.channel_id,
            frame_seq: meta.frame_seq,
            filename_hint: &chan.filename_hint,
        };
        self.dispatcher.deliver(&ctx, &packet).await;
    }

    /// Resolves when the running flag flips to `false`.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::analysis::{FeatureSet, MFCC_LEN};
    use crate::session::NoopArchiver;
    use crate::sink::Sink;

    // ── Fakes ────────────────────────────────────────────────────

    /// Replays a fixed script of datagrams, then pends forever.
    struct ScriptTransport {
        msgs: VecDeque<Bytes>,
    }

    impl ScriptTransport {
        fn new(msgs: Vec<Vec<u8>>) -> Self {
            Self {
                msgs: msgs.into_iter().map(Bytes::from).collect(),
            }
        }
    }

    #[async_trait]
    impl MessageTransport for ScriptTransport {
        async fn recv(&mut self) -> Result<Bytes, BridgeError> {
            match self.msgs.pop_front() {
                Some(m) => Ok(m),
                None => std::future::pending().await,
            }
        }

        fn drain(&mut self) -> usize {
            0
        }
    }

    struct CountingAnalyzer {
        calls: Arc<AtomicUsize>,
        last_len: Arc<AtomicUsize>,
    }

    impl Analyzer for CountingAnalyzer {
        fn analyze(&self, samples: &[f32], _sample_rate: u32) -> FeatureSet {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_len.store(samples.len(), Ordering::SeqCst);
            FeatureSet {
                mfcc: vec![0.0; MFCC_LEN],
                ..FeatureSet::default()
            }
        }
    }

    struct CaptureSink {
        delivered: Arc<Mutex<Vec<(i16, u64, String)>>>,
    }

    #[async_trait]
    impl Sink for CaptureSink {
        fn name(&self) -> &'static str {
            "capture"
        }

        async fn deliver(
            &mut self,
            ctx: &DeliveryContext<'_>,
            _packet: &[u8],
        ) -> Result<(), BridgeError> {
            self.delivered.lock().unwrap().push((
                ctx.channel_id,
                ctx.frame_seq,
                ctx.filename_hint.to_string(),
            ));
            Ok(())
        }
    }

    // ── Harness ──────────────────────────────────────────────────

    struct Harness {
        analyzer_calls: Arc<AtomicUsize>,
        analyzed_len: Arc<AtomicUsize>,
        delivered: Arc<Mutex<Vec<(i16, u64, String)>>>,
    }

    async fn run_script(prefix: &Path, msgs: Vec<Vec<u8>>) -> Harness {
        let harness = Harness {
            analyzer_calls: Arc::new(AtomicUsize::new(0)),
            analyzed_len: Arc::new(AtomicUsize::new(0)),
            delivered: Arc::new(Mutex::new(Vec::new())),
        };

        let controller = SessionController::new(
            prefix.to_path_buf(),
            WindowSpec::default(),
            Box::new(NoopArchiver),
        );
        let mut dispatcher = Dispatcher::new();
        dispatcher.push(Box::new(CaptureSink {
            delivered: Arc::clone(&harness.delivered),
        }));

        let mut bridge = AudioBridge::new(
            ScriptTransport::new(msgs),
            BridgeConfig::default(),
            controller,
            dispatcher,
        )
        .with_analyzer(Box::new(CountingAnalyzer {
            calls: Arc::clone(&harness.analyzer_calls),
            last_len: Arc::clone(&harness.analyzed_len),
        }));

        let stop = bridge.stop_handle();
        let task = tokio::spawn(async move { bridge.run().await });

        // Let the script play out, then stop the loop.
        tokio::time::sleep(Duration::from_millis(150)).await;
        stop.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("bridge did not stop")
            .unwrap()
            .unwrap();

        harness
    }

    fn start_msg(dir: &str) -> Vec<u8> {
        ControlMessage::encode_session_start(dir).unwrap().to_vec()
    }

    fn meta_msg(channel_id: i16, frame_seq: u64, hint: &str) -> Vec<u8> {
        AudioMeta {
            channel_id,
            frame_seq,
            offset_secs: 0.0,
            filename_hint: hint.into(),
        }
        .encode()
        .unwrap()
        .to_vec()
    }

    fn frame_msg(value: i16) -> Vec<u8> {
        let mut payload = Vec::with_capacity(256);
        for _ in 0..128 {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        payload
    }

    // ── Scenarios ────────────────────────────────────────────────

    #[tokio::test]
    async fn eight_frames_make_one_report() {
        let tmp = tempfile::tempdir().unwrap();
        let mut script = vec![start_msg("sess1")];
        for seq in 0..8u64 {
            script.push(meta_msg(3, seq, "take"));
            script.push(frame_msg(100));
        }
        let harness = run_script(tmp.path(), script).await;

        assert_eq!(harness.analyzer_calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.analyzed_len.load(Ordering::SeqCst), 1024);

        let delivered = harness.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0], (3, 7, "take".to_string()));
    }

    #[tokio::test]
    async fn audio_before_session_start_is_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        // Meta for channel 5 with no session; its payload datagram is
        // then classified as malformed and discarded.
        let script = vec![meta_msg(5, 0, "x"), frame_msg(1)];
        let harness = run_script(tmp.path(), script).await;

        assert_eq!(harness.analyzer_calls.load(Ordering::SeqCst), 0);
        assert!(harness.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_frame_does_not_advance_window() {
        let tmp = tempfile::tempdir().unwrap();
        let mut script = vec![start_msg("s")];
        // A short (rejected) frame, then a full window of good ones.
        script.push(meta_msg(1, 0, "x"));
        script.push(vec![0u8; 100]);
        for seq in 1..9u64 {
            script.push(meta_msg(1, seq, "x"));
            script.push(frame_msg(7));
        }
        let harness = run_script(tmp.path(), script).await;

        // Exactly one window: the rejected frame contributed nothing.
        assert_eq!(harness.analyzer_calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn session_restart_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let mut script = vec![start_msg("first"), start_msg("second")];
        // Half a window under the surviving session.
        for seq in 0..4u64 {
            script.push(meta_msg(2, seq, "x"));
            script.push(frame_msg(1));
        }
        let harness = run_script(tmp.path(), script).await;

        assert!(tmp.path().join("first").is_dir());
        assert!(!tmp.path().join("second").exists());
        assert_eq!(harness.analyzer_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn two_channels_interleave_independently() {
        let tmp = tempfile::tempdir().unwrap();
        let mut script = vec![start_msg("s")];
        for seq in 0..8u64 {
            script.push(meta_msg(1, seq, "alice"));
            script.push(frame_msg(1));
            script.push(meta_msg(2, seq, "bob"));
            script.push(frame_msg(2));
        }
        let harness = run_script(tmp.path(), script).await;

        assert_eq!(harness.analyzer_calls.load(Ordering::SeqCst), 2);
        let delivered = harness.delivered.lock().unwrap();
        let hints: Vec<&str> = delivered.iter().map(|d| d.2.as_str()).collect();
        assert_eq!(hints, vec!["alice", "bob"]);
    }
}
