//! Configuration for the bridge daemon.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Ingest transport settings.
    pub transport: TransportConfig,
    /// Frame and window geometry.
    pub audio: AudioConfig,
    /// Session directory and archival settings.
    pub session: SessionConfig,
    /// Per-channel report file settings.
    pub file: FileConfig,
    /// Report forwarding to a peer process.
    pub forward: ForwardConfig,
    /// Live network streaming of reports.
    pub stream: StreamConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Ingest transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Filesystem path of the ingest datagram socket.
    pub ingest_path: String,
}

/// Frame and window geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Engine capture rate in Hz, handed to the analyzer.
    pub sample_rate: u32,
    /// PCM samples per incoming frame.
    pub samples_per_frame: usize,
    /// Frames aggregated into one analysis window.
    pub frames_per_window: usize,
    /// Smallest plausible frame payload in bytes.
    pub min_frame_bytes: usize,
}

/// Session directory and archival.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory under which per-session directories are created.
    pub output_prefix: String,
    /// Shell command run once per session end, with `{name}` and
    /// `{dir}` substituted. Empty disables archival.
    pub archive_command: String,
}

/// Per-channel report files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Write each channel's reports to a per-session file.
    pub enabled: bool,
    /// Keep file offsets frame-aligned by writing blank records over
    /// sequence gaps.
    pub pad_frame_gaps: bool,
}

/// Report forwarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Forward each report as one datagram to a peer socket.
    pub enabled: bool,
    /// Filesystem path of the peer datagram socket.
    pub path: String,
}

/// Live streaming of reports to network clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Serve reports to a live visualization client.
    pub enabled: bool,
    /// "tcp" (one client, connection-oriented) or "udp" (stream to
    /// the most recently seen peer).
    pub mode: String,
    /// Port to listen on.
    pub port: u16,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            audio: AudioConfig::default(),
            session: SessionConfig::default(),
            file: FileConfig::default(),
            forward: ForwardConfig::default(),
            stream: StreamConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ingest_path: "/tmp/wavescope-ingest.sock".into(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            samples_per_frame: 128,
            frames_per_window: 8,
            min_frame_bytes: 200,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_prefix: "/tmp".into(),
            archive_command: String::new(),
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pad_frame_gaps: false,
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/tmp/wavescope-osc.sock".into(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: "tcp".into(),
            port: 9928,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl BridgeConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let cfg = Self::default();
        let text = toml::to_string_pretty(&cfg)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, text)
    }

    /// Convert the audio section into the pipeline's own config.
    pub fn to_pipeline_config(&self) -> wavescope_core::BridgeConfig {
        wavescope_core::BridgeConfig {
            sample_rate: self.audio.sample_rate.max(1),
            window: wavescope_core::WindowSpec {
                samples_per_frame: self.audio.samples_per_frame.max(1),
                frames_per_window: self.audio.frames_per_window.max(1),
                min_frame_bytes: self.audio.min_frame_bytes,
            },
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
