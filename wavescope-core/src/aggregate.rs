//! Per-channel accumulation of consecutive frames into analysis
//! windows.
//!
//! Frames carry signed 16-bit little-endian PCM. Each accepted frame
//! is widened sample-by-sample to `f32` (direct numeric widening, no
//! scaling — the analyzer must see the source codec's magnitude
//! convention) and copied into a fixed window buffer at the current
//! frame cursor. When the cursor reaches the configured frames per
//! window the whole window is handed out and the cursor resets; the
//! buffer is reused, so the caller must finish with the returned slice
//! before accumulating again.

use tracing::warn;

use crate::error::BridgeError;
use crate::protocol::DEFAULT_MIN_FRAME_BYTES;

// ── WindowSpec ───────────────────────────────────────────────────

/// Window geometry shared by every channel in a session.
#[derive(Debug, Clone, Copy)]
pub struct WindowSpec {
    /// Samples per incoming frame; frames of any other size are
    /// rejected.
    pub samples_per_frame: usize,
    /// Frames merged into one analysis window.
    pub frames_per_window: usize,
    /// Lower bound on a plausible payload, in bytes.
    pub min_frame_bytes: usize,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            samples_per_frame: 128,
            frames_per_window: 8,
            min_frame_bytes: DEFAULT_MIN_FRAME_BYTES,
        }
    }
}

impl WindowSpec {
    /// Samples in one full analysis window.
    pub fn window_len(&self) -> usize {
        self.samples_per_frame * self.frames_per_window
    }

    /// A fresh accumulator with this geometry.
    pub fn accumulator(&self) -> WindowAccumulator {
        WindowAccumulator::new(
            self.samples_per_frame,
            self.frames_per_window,
            self.min_frame_bytes,
        )
    }
}

// ── WindowAccumulator ────────────────────────────────────────────

/// Builds one channel's analysis windows from arriving frames.
#[derive(Debug)]
pub struct WindowAccumulator {
    samples_per_frame: usize,
    frames_per_window: usize,
    min_frame_bytes: usize,
    /// Zero-initialized window buffer, reused across windows.
    buf: Vec<f32>,
    /// Fill cursor in frame units, always `0..frames_per_window`.
    cursor: usize,
    last_seq: Option<u64>,
    gaps: u64,
}

impl WindowAccumulator {
    pub fn new(samples_per_frame: usize, frames_per_window: usize, min_frame_bytes: usize) -> Self {
        Self {
            samples_per_frame,
            frames_per_window,
            min_frame_bytes,
            buf: vec![0.0; samples_per_frame * frames_per_window],
            cursor: 0,
            last_seq: None,
            gaps: 0,
        }
    }

    /// Accumulate one frame payload.
    ///
    /// Returns `Ok(Some(window))` when this frame completed a window;
    /// the slice is valid until the next call. Returns `Ok(None)` when
    /// the window is still filling. A rejected frame never advances
    /// the cursor.
    pub fn accumulate(
        &mut self,
        frame_seq: u64,
        payload: &[u8],
    ) -> Result<Option<&[f32]>, BridgeError> {
        if payload.len() % 2 != 0 {
            return Err(BridgeError::BadFrame(format!(
                "odd payload length {}",
                payload.len()
            )));
        }
        if payload.len() < self.min_frame_bytes {
            return Err(BridgeError::BadFrame(format!(
                "payload {} bytes below minimum {}",
                payload.len(),
                self.min_frame_bytes
            )));
        }
        let sample_count = payload.len() / 2;
        if sample_count != self.samples_per_frame {
            return Err(BridgeError::BadFrame(format!(
                "frame has {sample_count} samples, expected {}",
                self.samples_per_frame
            )));
        }

        // Gap policy: fill in arrival order, but surface the anomaly.
        if let Some(last) = self.last_seq {
            if frame_seq != last.wrapping_add(1) {
                self.gaps += 1;
                warn!(last, frame_seq, "frame sequence gap");
            }
        }
        self.last_seq = Some(frame_seq);

        let offset = self.cursor * self.samples_per_frame;
        for (i, pair) in payload.chunks_exact(2).enumerate() {
            self.buf[offset + i] = i16::from_le_bytes([pair[0], pair[1]]) as f32;
        }

        self.cursor += 1;
        if self.cursor < self.frames_per_window {
            return Ok(None);
        }
        self.cursor = 0;
        Ok(Some(&self.buf))
    }

    /// Current fill cursor in frame units.
    pub fn fill_offset(&self) -> usize {
        self.cursor
    }

    /// Number of frame-sequence gaps observed so far.
    pub fn gap_count(&self) -> u64 {
        self.gaps
    }
}

// ── Tests ────────────────────────────────────────────────────────
