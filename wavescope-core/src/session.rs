//! Session lifecycle and per-session channel state.
//!
//! The controller is a two-state machine, `Idle` and `Active`. All
//! channel state (window accumulators, filename hints) lives inside
//! the active session and dies with it, so nothing can leak across
//! session boundaries. Out-of-sequence control messages are reported
//! and ignored — the old session always stays intact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::aggregate::{WindowAccumulator, WindowSpec};
use crate::error::BridgeError;
use crate::protocol::AudioMeta;

// ── Archiver ─────────────────────────────────────────────────────

/// External archival hand-off invoked once per session end.
///
/// Fire-and-forget: failures are logged by the implementation, never
/// retried, and never surface into the pipeline.
pub trait Archiver: Send {
    fn archive(&self, session: &str, dir: &Path);
}

/// No archival step configured.
pub struct NoopArchiver;

impl Archiver for NoopArchiver {
    fn archive(&self, _session: &str, _dir: &Path) {}
}

/// Runs a configured shell command with `{name}` and `{dir}`
/// placeholders substituted, detached from the pipeline.
pub struct CommandArchiver {
    template: String,
}

impl CommandArchiver {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl Archiver for CommandArchiver {
    fn archive(&self, session: &str, dir: &Path) {
        let cmd = self
            .template
            .replace("{name}", session)
            .replace("{dir}", &dir.display().to_string());
        info!(session, %cmd, "archival hand-off");
        match tokio::process::Command::new("sh").arg("-c").arg(&cmd).spawn() {
            Ok(mut child) => {
                // Reap in the background; outcome is logged only.
                let session = session.to_string();
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) if status.success() => {}
                        Ok(status) => error!(session, %status, "archival command failed"),
                        Err(e) => error!(session, error = %e, "archival command lost"),
                    }
                });
            }
            Err(e) => error!(session, error = %e, "archival command failed to start"),
        }
    }
}

// ── ChannelState ─────────────────────────────────────────────────

/// One channel's accumulation state within the active session.
pub struct ChannelState {
    pub accumulator: WindowAccumulator,
    /// Hint from the channel's first frame, names its output file.
    pub filename_hint: String,
}

// ── SessionController ────────────────────────────────────────────

struct ActiveSession {
    name: String,
    dir: PathBuf,
    channels: HashMap<i16, ChannelState>,
}

/// Owns the session lifecycle and every per-session resource.
pub struct SessionController {
    prefix: PathBuf,
    window: WindowSpec,
    archiver: Box<dyn Archiver>,
    active: Option<ActiveSession>,
}

impl SessionController {
    /// `prefix` is the directory under which session directories are
    /// created.
    pub fn new(prefix: impl Into<PathBuf>, window: WindowSpec, archiver: Box<dyn Archiver>) -> Self {
        Self {
            prefix: prefix.into(),
            window,
            archiver,
            active: None,
        }
    }

    /// Whether a session is currently active.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Name of the active session, if any.
    pub fn session_name(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.name.as_str())
    }

    /// `Idle → Active`: create the session directory and reset state.
    ///
    /// A start while `Active` is a sequence error; the open session is
    /// left untouched.
    pub fn start(&mut self, name: &str) -> Result<&Path, BridgeError> {
        if let Some(open) = &self.active {
            error!(open = %open.name, ignored = name, "session start while session open");
            return Err(BridgeError::Sequence("session start while session open"));
        }

        let dir = self.prefix.join(name);
        std::fs::create_dir_all(&dir).map_err(|e| BridgeError::Resource {
            path: dir.display().to_string(),
            source: e,
        })?;

        info!(session = name, dir = %dir.display(), "session started");
        self.active = Some(ActiveSession {
            name: name.to_string(),
            dir,
            channels: HashMap::new(),
        });
        // Unwrap is fine: just assigned.
        Ok(&self.active.as_ref().unwrap().dir)
    }

    /// `Active → Idle`: drop all channel state and trigger the
    /// archival hand-off.
    ///
    /// The caller must flush and close sinks *before* calling this, so
    /// the archived directory is complete.
    pub fn end(&mut self) -> Result<(), BridgeError> {
        let Some(session) = self.active.take() else {
            error!("session end with no session open");
            return Err(BridgeError::Sequence("session end with no session open"));
        };
        info!(session = %session.name, "session ended");
        self.archiver.archive(&session.name, &session.dir);
        Ok(())
    }

    /// Per-channel state for an audio frame, created on first sight of
    /// the channel within this session.
    ///
    /// Returns `None` while `Idle`: audio without a session carries no
    /// context and is dropped by the caller.
    pub fn channel_for(&mut self, meta: &AudioMeta) -> Option<&mut ChannelState> {
        let session = self.active.as_mut()?;
        let window = self.window;
        Some(
            session
                .channels
                .entry(meta.channel_id)
                .or_insert_with(|| ChannelState {
                    accumulator: window.accumulator(),
                    filename_hint: meta.filename_hint.clone(),
                }),
        )
    }

    /// Number of channels seen in the active session.
    pub fn channel_count(&self) -> usize {
        self.active.as_ref().map_or(0, |s| s.channels.len())
    }
}

// ── Tests ────────────────────────────────────────────────────────
