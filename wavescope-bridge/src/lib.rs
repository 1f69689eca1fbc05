//! # wavescope-bridge — audio analysis bridge daemon
//!
//! Daemon that receives session lifecycle records and PCM audio
//! frames from an audio engine over a local datagram socket, runs
//! per-window feature extraction, and fans the encoded reports out to
//! the configured sinks: per-session report files, a peer datagram
//! socket, and a live network stream.
//!
//! The pipeline itself lives in `wavescope-core`; this crate adds the
//! TOML configuration surface and the service wrapper around it.

pub mod config;
pub mod service;
