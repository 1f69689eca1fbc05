//! # wavescope-core
//!
//! Core library for the wavescope session/frame bridge: it demuxes an
//! ordered control+data datagram stream from an audio engine into
//! session lifecycle events and per-channel PCM frames, aggregates
//! frames into analysis windows, runs feature extraction, and fans the
//! encoded reports out to independently failing sinks.
//!
//! This crate contains:
//! - **Protocol**: `ControlMessage`, `AudioMeta` — fixed-size tagged
//!   record decoding for the ingest stream
//! - **Transport**: `MessageTransport` trait with Unix-datagram ingest
//!   and non-blocking forwarding
//! - **Session**: `SessionController` two-state lifecycle with
//!   per-session channel state and archival hand-off
//! - **Aggregate**: `WindowAccumulator` merging PCM frames into
//!   fixed-size analysis windows
//! - **Analysis**: `Analyzer` boundary plus the in-crate
//!   `SpectralAnalyzer` (FFT, spectral stats, pitch, MFCC)
//! - **Report**: `ReportEncoder` boundary plus the OSC-bundle
//!   `OscEncoder`
//! - **Sink**: `Sink` trait, the fan-out `Dispatcher`, and the file /
//!   forwarding / streaming sink implementations
//! - **Bridge**: `AudioBridge` — the sequential run loop tying the
//!   above together
//! - **Error**: `BridgeError` — typed, `thiserror`-based error
//!   taxonomy

pub mod aggregate;
pub mod analysis;
pub mod bridge;
pub mod error;
mod osc;
pub mod protocol;
pub mod report;
pub mod session;
pub mod sink;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use aggregate::{WindowAccumulator, WindowSpec};
pub use analysis::{Analyzer, FeatureSet, SpectralAnalyzer, MFCC_LEN};
pub use bridge::{AudioBridge, BridgeConfig};
pub use error::BridgeError;
pub use protocol::{
    AudioMeta, ControlMessage, DEFAULT_MIN_FRAME_BYTES, MAX_MESSAGE_SIZE, MAX_NAME_LEN,
    MAX_REPORT_SIZE,
};
pub use report::{OscEncoder, Report, ReportEncoder};
pub use session::{Archiver, CommandArchiver, NoopArchiver, SessionController};
pub use sink::{
    DatagramStreamSink, DeliveryContext, Dispatcher, FileSink, ForwardingSink, Sink, StreamSink,
};
pub use transport::{DatagramForwarder, DatagramTransport, MessageTransport};
