//! Per-channel file persistence.
//!
//! One append-only binary file per channel per session, named from the
//! filename hint on the channel's first report. File contents are the
//! concatenation of encoded reports in delivery order — no separators
//! beyond what the encoder embeds.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::sink::{DeliveryContext, Sink};

/// File extension for per-channel report files.
const REPORT_EXT: &str = "dat";

// ── FileSink ─────────────────────────────────────────────────────

/// Sink writing each channel's reports to its own session file.
///
/// Files are opened lazily on the first report for a channel. A failed
/// open is reported and retried on the next report for that channel;
/// a write failure is reported without closing the session or touching
/// other channels.
pub struct FileSink {
    session_dir: Option<PathBuf>,
    files: HashMap<i16, ChannelFile>,
    /// When set, a jump in frame sequence writes zero-filled records
    /// so file offsets stay frame-aligned. Requires constant-size
    /// encoder output.
    pad_frame_gaps: bool,
    frames_per_window: u64,
}

struct ChannelFile {
    writer: BufWriter<File>,
    last_seq: u64,
}

impl FileSink {
    pub fn new() -> Self {
        Self {
            session_dir: None,
            files: HashMap::new(),
            pad_frame_gaps: false,
            frames_per_window: 1,
        }
    }

    /// Enable the gap-padding policy (frame-aligned file offsets).
    pub fn with_gap_padding(mut self, frames_per_window: u64) -> Self {
        self.pad_frame_gaps = true;
        self.frames_per_window = frames_per_window.max(1);
        self
    }

    fn open_channel(&self, ctx: &DeliveryContext<'_>) -> Result<BufWriter<File>, BridgeError> {
        let dir = self
            .session_dir
            .as_ref()
            .ok_or(BridgeError::Sequence("report delivered with no session"))?;
        let path = dir
            .join(sanitize_hint(ctx.filename_hint, ctx.channel_id))
            .with_extension(REPORT_EXT);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| BridgeError::Resource {
                path: path.display().to_string(),
                source: e,
            })?;
        info!(channel = ctx.channel_id, path = %path.display(), "opened report file");
        Ok(BufWriter::new(file))
    }
}

impl Default for FileSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn session_started(&mut self, dir: &Path) -> Result<(), BridgeError> {
        self.files.clear();
        self.session_dir = Some(dir.to_path_buf());
        Ok(())
    }

    async fn deliver(
        &mut self,
        ctx: &DeliveryContext<'_>,
        packet: &[u8],
    ) -> Result<(), BridgeError> {
        if !self.files.contains_key(&ctx.channel_id) {
            let writer = self.open_channel(ctx)?;
            self.files.insert(
                ctx.channel_id,
                ChannelFile {
                    writer,
                    last_seq: ctx.frame_seq,
                },
            );
        }
        // Unwrap is fine: inserted just above if absent.
        let entry = self.files.get_mut(&ctx.channel_id).unwrap();

        if self.pad_frame_gaps && ctx.frame_seq > entry.last_seq {
            let windows_ahead = (ctx.frame_seq - entry.last_seq) / self.frames_per_window;
            if windows_ahead > 1 {
                let blanks = windows_ahead - 1;
                debug!(
                    channel = ctx.channel_id,
                    blanks, "padding frame gap with blank records"
                );
                let blank = vec![0u8; packet.len()];
                for _ in 0..blanks {
                    write_packet(entry, &blank, ctx)?;
                }
            }
        }

        write_packet(entry, packet, ctx)?;
        entry.last_seq = ctx.frame_seq;
        Ok(())
    }

    async fn session_ended(&mut self) -> Result<(), BridgeError> {
        for (channel, mut entry) in self.files.drain() {
            if let Err(e) = entry.writer.flush() {
                warn!(channel, error = %e, "flush on session end failed");
            }
        }
        self.session_dir = None;
        Ok(())
    }
}

fn write_packet(
    entry: &mut ChannelFile,
    packet: &[u8],
    ctx: &DeliveryContext<'_>,
) -> Result<(), BridgeError> {
    entry
        .writer
        .write_all(packet)
        .map_err(|e| BridgeError::Delivery {
            sink: "file",
            reason: format!("channel {}: {e}", ctx.channel_id),
        })
}

/// Make a filename hint safe to join under the session directory.
fn sanitize_hint(hint: &str, channel_id: i16) -> String {
    let cleaned: String = hint
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        format!("channel-{channel_id}")
    } else {
        cleaned.to_string()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(channel_id: i16, frame_seq: u64, hint: &str) -> DeliveryContext<'_> {
        DeliveryContext {
            channel_id,
            frame_seq,
            filename_hint: hint,
        }
    }

    #[tokio::test]
    async fn file_created_lazily_and_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new();
        sink.session_started(dir.path()).await.unwrap();

        let path = dir.path().join("take-3.dat");
        assert!(!path.exists(), "no file before the first report");

        sink.deliver(&ctx(3, 8, "take-3"), b"AAAA").await.unwrap();
        sink.deliver(&ctx(3, 16, "take-3"), b"BBBB").await.unwrap();
        sink.session_ended().await.unwrap();

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents, b"AAAABBBB");
    }

    #[tokio::test]
    async fn resplitting_recovers_report_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new();
        sink.session_started(dir.path()).await.unwrap();

        let packet = vec![0xCD; 248];
        for i in 0..5u64 {
            sink.deliver(&ctx(1, i * 8, "chan"), &packet).await.unwrap();
        }
        sink.session_ended().await.unwrap();

        let contents = std::fs::read(dir.path().join("chan.dat")).unwrap();
        assert_eq!(contents.len() % packet.len(), 0);
        assert_eq!(contents.len() / packet.len(), 5);
    }

    #[tokio::test]
    async fn channels_get_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new();
        sink.session_started(dir.path()).await.unwrap();

        sink.deliver(&ctx(1, 8, "alice"), b"aa").await.unwrap();
        sink.deliver(&ctx(2, 8, "bob"), b"bb").await.unwrap();
        sink.session_ended().await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("alice.dat")).unwrap(), b"aa");
        assert_eq!(std::fs::read(dir.path().join("bob.dat")).unwrap(), b"bb");
    }

    #[tokio::test]
    async fn failed_open_reported_then_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("missing");
        let mut sink = FileSink::new();
        // Session dir never created: opens must fail.
        sink.session_started(&session).await.unwrap();
        assert!(sink.deliver(&ctx(1, 8, "x"), b"drop").await.is_err());

        // Once the directory exists, the next report reopens.
        std::fs::create_dir_all(&session).unwrap();
        sink.deliver(&ctx(1, 16, "x"), b"keep").await.unwrap();
        sink.session_ended().await.unwrap();

        assert_eq!(std::fs::read(session.join("x.dat")).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn gap_padding_writes_blank_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::new().with_gap_padding(8);
        sink.session_started(dir.path()).await.unwrap();

        let packet = vec![0xAB; 16];
        sink.deliver(&ctx(1, 8, "pad"), &packet).await.unwrap();
        // Seq 32 is three windows after 8: two windows went missing.
        sink.deliver(&ctx(1, 32, "pad"), &packet).await.unwrap();
        sink.session_ended().await.unwrap();

        let contents = std::fs::read(dir.path().join("pad.dat")).unwrap();
        assert_eq!(contents.len(), 4 * packet.len());
        assert_eq!(&contents[..16], &packet[..]);
        assert!(contents[16..48].iter().all(|&b| b == 0));
        assert_eq!(&contents[48..], &packet[..]);
    }

    #[tokio::test]
    async fn new_session_forgets_old_channels() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("one");
        let second = dir.path().join("two");
        std::fs::create_dir_all(&first).unwrap();
        std::fs::create_dir_all(&second).unwrap();

        let mut sink = FileSink::new();
        sink.session_started(&first).await.unwrap();
        sink.deliver(&ctx(1, 8, "x"), b"11").await.unwrap();
        sink.session_ended().await.unwrap();

        sink.session_started(&second).await.unwrap();
        sink.deliver(&ctx(1, 8, "x"), b"22").await.unwrap();
        sink.session_ended().await.unwrap();

        assert_eq!(std::fs::read(first.join("x.dat")).unwrap(), b"11");
        assert_eq!(std::fs::read(second.join("x.dat")).unwrap(), b"22");
    }

    #[test]
    fn hints_are_sanitized() {
        assert_eq!(sanitize_hint("take-1", 0), "take-1");
        assert_eq!(sanitize_hint("../../etc/passwd", 0), "etcpasswd");
        assert_eq!(sanitize_hint("", 5), "channel-5");
        assert_eq!(sanitize_hint("a/b\\c", 0), "abc");
    }
}
