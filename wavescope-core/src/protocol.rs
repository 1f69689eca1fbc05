//! Control-record decoding for the ingest message stream.
//!
//! The upstream engine multiplexes session lifecycle records and audio
//! frames over one ordered datagram stream. Control records are
//! fixed-size and tagged; an audio meta record is always followed by
//! exactly one raw PCM payload datagram.
//!
//! ## Wire format (little-endian)
//!
//! **SessionStart** (66 bytes):
//! ```text
//! tag:  u8        (1)  = 0
//! dir:  [u8; 65]  (65) NUL-terminated session directory name
//! ```
//!
//! **SessionEnd** (1 byte):
//! ```text
//! tag:  u8        (1)  = 1
//! ```
//!
//! **AudioMeta** (84 bytes):
//! ```text
//! tag:          u8        (1)  = 2
//! channel_id:   i16       (2)
//! frame_seq:    u64       (8)
//! offset_secs:  f64       (8)
//! filename:     [u8; 65]  (65) NUL-terminated output filename hint
//! ```
//!
//! Classification is by **exact** tag + byte-length match. Anything
//! else is [`ControlMessage::Malformed`]; a malformed datagram is
//! discarded without touching session state, so it can never
//! desynchronize the meta/payload pairing.

use crate::error::BridgeError;

// ── Constants ────────────────────────────────────────────────────

/// Maximum datagram size accepted from or sent to the engine.
pub const MAX_MESSAGE_SIZE: usize = 2048;

/// Maximum length of a session directory name or filename hint.
pub const MAX_NAME_LEN: usize = 64;

/// Upper bound on one encoded report packet.
pub const MAX_REPORT_SIZE: usize = 512;

/// Default lower bound on a plausible audio payload, in bytes.
pub const DEFAULT_MIN_FRAME_BYTES: usize = 200;

/// Record tags.
const TAG_SESSION_START: u8 = 0;
const TAG_SESSION_END: u8 = 1;
const TAG_AUDIO_META: u8 = 2;

/// Encoded record sizes.
pub const SESSION_START_SIZE: usize = 1 + MAX_NAME_LEN + 1;
pub const SESSION_END_SIZE: usize = 1;
pub const AUDIO_META_SIZE: usize = 1 + 2 + 8 + 8 + MAX_NAME_LEN + 1;

// ── AudioMeta ────────────────────────────────────────────────────

/// Header record preceding one raw PCM payload datagram.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioMeta {
    /// Logical audio source within the session.
    pub channel_id: i16,
    /// Monotonically increasing per-channel frame counter.
    pub frame_seq: u64,
    /// Offset of this frame from session start, in seconds.
    pub offset_secs: f64,
    /// Filename hint for this channel's per-session output file.
    pub filename_hint: String,
}

impl AudioMeta {
    /// Serialize to the fixed 84-byte wire record.
    pub fn encode(&self) -> Result<[u8; AUDIO_META_SIZE], BridgeError> {
        let name = fit_name(&self.filename_hint)?;
        let mut buf = [0u8; AUDIO_META_SIZE];
        buf[0] = TAG_AUDIO_META;
        buf[1..3].copy_from_slice(&self.channel_id.to_le_bytes());
        buf[3..11].copy_from_slice(&self.frame_seq.to_le_bytes());
        buf[11..19].copy_from_slice(&self.offset_secs.to_le_bytes());
        buf[19..19 + name.len()].copy_from_slice(name.as_bytes());
        Ok(buf)
    }

    fn decode(data: &[u8]) -> Self {
        Self {
            channel_id: i16::from_le_bytes(data[1..3].try_into().unwrap()),
            frame_seq: u64::from_le_bytes(data[3..11].try_into().unwrap()),
            offset_secs: f64::from_le_bytes(data[11..19].try_into().unwrap()),
            filename_hint: take_name(&data[19..]),
        }
    }
}

// ── ControlMessage ───────────────────────────────────────────────

/// One classified ingest datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Begin a session; payload is the session directory name.
    SessionStart { dir: String },
    /// End the active session.
    SessionEnd,
    /// An audio frame header; the next datagram is its PCM payload.
    AudioMeta(AudioMeta),
    /// Anything that did not exactly match a known record.
    Malformed { reason: &'static str },
}

impl ControlMessage {
    /// Classify one raw datagram.
    ///
    /// Never fails: unknown input becomes [`ControlMessage::Malformed`]
    /// so the caller can log and discard without a state transition.
    pub fn decode(data: &[u8]) -> ControlMessage {
        if data.is_empty() {
            return ControlMessage::Malformed {
                reason: "empty message",
            };
        }
        match (data[0], data.len()) {
            (TAG_SESSION_START, SESSION_START_SIZE) => ControlMessage::SessionStart {
                dir: take_name(&data[1..]),
            },
            (TAG_SESSION_END, SESSION_END_SIZE) => ControlMessage::SessionEnd,
            (TAG_AUDIO_META, AUDIO_META_SIZE) => ControlMessage::AudioMeta(AudioMeta::decode(data)),
            (TAG_SESSION_START, _) => ControlMessage::Malformed {
                reason: "session-start record has wrong size",
            },
            (TAG_SESSION_END, _) => ControlMessage::Malformed {
                reason: "session-end record has wrong size",
            },
            (TAG_AUDIO_META, _) => ControlMessage::Malformed {
                reason: "audio-meta record has wrong size",
            },
            _ => ControlMessage::Malformed {
                reason: "unknown record tag",
            },
        }
    }

    /// Serialize a `SessionStart` record.
    pub fn encode_session_start(dir: &str) -> Result<[u8; SESSION_START_SIZE], BridgeError> {
        let name = fit_name(dir)?;
        let mut buf = [0u8; SESSION_START_SIZE];
        buf[0] = TAG_SESSION_START;
        buf[1..1 + name.len()].copy_from_slice(name.as_bytes());
        Ok(buf)
    }

    /// Serialize a `SessionEnd` record.
    pub fn encode_session_end() -> [u8; SESSION_END_SIZE] {
        [TAG_SESSION_END]
    }
}

// ── Name helpers ─────────────────────────────────────────────────

/// Validate a name against [`MAX_NAME_LEN`].
fn fit_name(name: &str) -> Result<&str, BridgeError> {
    if name.len() > MAX_NAME_LEN {
        return Err(BridgeError::Encoding(format!(
            "name too long: {} bytes (max {MAX_NAME_LEN})",
            name.len()
        )));
    }
    Ok(name)
}

/// Read a NUL-terminated name field, dropping invalid UTF-8.
fn take_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_start_roundtrip() {
        let buf = ControlMessage::encode_session_start("Jam-20240326-145726119").unwrap();
        assert_eq!(buf.len(), SESSION_START_SIZE);
        let msg = ControlMessage::decode(&buf);
        assert_eq!(
            msg,
            ControlMessage::SessionStart {
                dir: "Jam-20240326-145726119".into()
            }
        );
    }

    #[test]
    fn session_end_roundtrip() {
        let buf = ControlMessage::encode_session_end();
        assert_eq!(ControlMessage::decode(&buf), ControlMessage::SessionEnd);
    }

    #[test]
    fn audio_meta_roundtrip() {
        let meta = AudioMeta {
            channel_id: 3,
            frame_seq: 12345,
            offset_secs: 1.5,
            filename_hint: "____-86_175_246_x_22141-0-1".into(),
        };
        let buf = meta.encode().unwrap();
        assert_eq!(buf.len(), AUDIO_META_SIZE);
        match ControlMessage::decode(&buf) {
            ControlMessage::AudioMeta(decoded) => assert_eq!(decoded, meta),
            other => panic!("expected AudioMeta, got {other:?}"),
        }
    }

    #[test]
    fn wrong_size_is_malformed() {
        // Right tag, truncated record.
        let mut buf = vec![0u8; SESSION_START_SIZE - 1];
        buf[0] = 0;
        assert!(matches!(
            ControlMessage::decode(&buf),
            ControlMessage::Malformed { .. }
        ));

        // Audio-meta tag with a payload-sized body.
        let mut buf = vec![0u8; 256];
        buf[0] = 2;
        assert!(matches!(
            ControlMessage::decode(&buf),
            ControlMessage::Malformed { .. }
        ));
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let buf = [9u8; 10];
        assert!(matches!(
            ControlMessage::decode(&buf),
            ControlMessage::Malformed {
                reason: "unknown record tag"
            }
        ));
    }

    #[test]
    fn empty_is_malformed() {
        assert!(matches!(
            ControlMessage::decode(&[]),
            ControlMessage::Malformed { .. }
        ));
    }

    #[test]
    fn oversized_name_rejected() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(ControlMessage::encode_session_start(&long).is_err());
    }

    #[test]
    fn name_field_stops_at_nul() {
        let mut buf = ControlMessage::encode_session_start("abc").unwrap();
        // Garbage after the terminator must be ignored.
        buf[10] = b'z';
        assert_eq!(
            ControlMessage::decode(&buf),
            ControlMessage::SessionStart { dir: "abc".into() }
        );
    }
}
