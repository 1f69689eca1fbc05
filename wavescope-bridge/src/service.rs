//! Bridge service assembly.
//!
//! Builds the transport, session controller, and configured sinks
//! from a [`BridgeConfig`] and runs the pipeline until stopped. The
//! ingest socket and any stream listener are bound up front: the
//! daemon has no degraded mode without its inputs and outputs, so a
//! failed bind is fatal at startup rather than a silent no-op.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use wavescope_core::session::{Archiver, CommandArchiver, NoopArchiver, SessionController};
use wavescope_core::sink::{DatagramStreamSink, Dispatcher, FileSink, ForwardingSink, StreamSink};
use wavescope_core::transport::DatagramTransport;
use wavescope_core::AudioBridge;

use crate::config::BridgeConfig;

// ── BridgeService ────────────────────────────────────────────────

/// The top-level daemon: owns the configured pipeline's lifecycle.
pub struct BridgeService {
    config: BridgeConfig,
    running: Arc<AtomicBool>,
}

impl BridgeService {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that can stop the service from another task or a signal
    /// handler.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run the pipeline until stopped.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.running.store(true, Ordering::SeqCst);

        let transport = DatagramTransport::bind(&self.config.transport.ingest_path)?;
        info!(path = %self.config.transport.ingest_path, "ingest socket bound");

        let archiver: Box<dyn Archiver> = if self.config.session.archive_command.is_empty() {
            Box::new(NoopArchiver)
        } else {
            Box::new(CommandArchiver::new(&self.config.session.archive_command))
        };
        let pipeline = self.config.to_pipeline_config();
        let controller = SessionController::new(
            self.config.session.output_prefix.clone(),
            pipeline.window,
            archiver,
        );

        let dispatcher = self.build_dispatcher(&pipeline).await?;
        if dispatcher.is_empty() {
            warn!("no sinks configured; reports will be analyzed and discarded");
        }

        let mut bridge = AudioBridge::new(transport, pipeline, controller, dispatcher);

        // Relay the service stop flag into the bridge's own handle.
        let bridge_stop = bridge.stop_handle();
        let service_stop = Arc::clone(&self.running);
        tokio::spawn(async move {
            loop {
                if !service_stop.load(Ordering::SeqCst) {
                    bridge_stop.store(false, Ordering::SeqCst);
                    return;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });

        let result = bridge.run().await;
        self.running.store(false, Ordering::SeqCst);
        result?;
        Ok(())
    }

    async fn build_dispatcher(
        &self,
        pipeline: &wavescope_core::BridgeConfig,
    ) -> Result<Dispatcher, Box<dyn std::error::Error>> {
        let mut dispatcher = Dispatcher::new();

        if self.config.file.enabled {
            let sink = if self.config.file.pad_frame_gaps {
                FileSink::new().with_gap_padding(pipeline.window.frames_per_window as u64)
            } else {
                FileSink::new()
            };
            dispatcher.push(Box::new(sink));
        }

        if self.config.forward.enabled {
            dispatcher.push(Box::new(ForwardingSink::new(&self.config.forward.path)?));
            info!(path = %self.config.forward.path, "forwarding reports");
        }

        if self.config.stream.enabled {
            let addr: SocketAddr = format!("0.0.0.0:{}", self.config.stream.port).parse()?;
            match self.config.stream.mode.as_str() {
                "udp" => {
                    let sink = DatagramStreamSink::bind(addr).await?;
                    info!(addr = %sink.local_addr(), "udp stream rendezvous bound");
                    dispatcher.push(Box::new(sink));
                }
                // Unknown modes fall back to the connection-oriented
                // default rather than silently disabling the stream.
                mode => {
                    if mode != "tcp" {
                        warn!(mode, "unknown stream mode, using tcp");
                    }
                    let sink = StreamSink::bind(addr).await?;
                    info!(addr = %sink.local_addr(), "tcp stream listener bound");
                    dispatcher.push(Box::new(sink));
                }
            }
        }

        Ok(dispatcher)
    }
}

// ── Tests ────────────────────────────────────────────────────────
