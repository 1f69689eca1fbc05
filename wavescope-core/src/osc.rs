//! Minimal OSC 1.0 bundle writer.
//!
//! Only what the report encoder needs: one bundle, a flat list of
//! messages with `i32`/`f32` arguments. OSC is big-endian with all
//! fields padded to 4-byte boundaries, unlike the rest of the
//! little-endian bridge protocol.
//!
//! ```text
//! bundle:   "#bundle\0"  (8)
//!           timetag u64  (8)
//!           elements     (each: i32 size + message bytes)
//! message:  address      (NUL-terminated, 4-aligned)
//!           ","+typetags (NUL-terminated, 4-aligned)
//!           arguments    (4 bytes each)
//! ```

use crate::error::BridgeError;

/// One OSC message argument.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Arg {
    Int(i32),
    Float(f32),
}

// ── BundleBuilder ────────────────────────────────────────────────

/// Builds a single OSC bundle within a fixed size budget.
pub(crate) struct BundleBuilder {
    buf: Vec<u8>,
    max: usize,
}

impl BundleBuilder {
    /// Start a bundle with the given timetag.
    pub fn new(timetag: u64, max: usize) -> Self {
        let mut buf = Vec::with_capacity(max);
        buf.extend_from_slice(b"#bundle\0");
        buf.extend_from_slice(&timetag.to_be_bytes());
        Self { buf, max }
    }

    /// Append one message element.
    pub fn message(&mut self, addr: &str, args: &[Arg]) -> Result<(), BridgeError> {
        let mut msg = Vec::with_capacity(64);
        push_padded_str(&mut msg, addr);

        let mut tags = String::with_capacity(args.len() + 1);
        tags.push(',');
        for arg in args {
            tags.push(match arg {
                Arg::Int(_) => 'i',
                Arg::Float(_) => 'f',
            });
        }
        push_padded_str(&mut msg, &tags);

        for arg in args {
            match arg {
                Arg::Int(v) => msg.extend_from_slice(&v.to_be_bytes()),
                Arg::Float(v) => msg.extend_from_slice(&v.to_be_bytes()),
            }
        }

        if self.buf.len() + 4 + msg.len() > self.max {
            return Err(BridgeError::Encoding(format!(
                "bundle exceeds {} bytes",
                self.max
            )));
        }
        self.buf.extend_from_slice(&(msg.len() as i32).to_be_bytes());
        self.buf.extend_from_slice(&msg);
        Ok(())
    }

    /// Finish and return the encoded bundle.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Append a NUL-terminated string padded to a 4-byte boundary.
fn push_padded_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    let padded = (s.len() / 4 + 1) * 4;
    buf.resize(buf.len() + padded - s.len(), 0);
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_header_layout() {
        let bundle = BundleBuilder::new(0x0102_0304_0506_0708, 512).finish();
        assert_eq!(&bundle[..8], b"#bundle\0");
        assert_eq!(&bundle[8..16], &0x0102_0304_0506_0708u64.to_be_bytes());
    }

    #[test]
    fn strings_are_nul_terminated_and_aligned() {
        let mut buf = Vec::new();
        push_padded_str(&mut buf, "/osc");
        // 4 chars need a NUL, then pad to 8.
        assert_eq!(buf, b"/osc\0\0\0\0");

        let mut buf = Vec::new();
        push_padded_str(&mut buf, "/abc123");
        assert_eq!(buf, b"/abc123\0");
    }

    #[test]
    fn message_element_is_size_prefixed() {
        let mut builder = BundleBuilder::new(1, 512);
        builder
            .message("/time", &[Arg::Float(1.0), Arg::Float(2.0), Arg::Float(3.0)])
            .unwrap();
        let bundle = builder.finish();

        let size = i32::from_be_bytes(bundle[16..20].try_into().unwrap()) as usize;
        assert_eq!(size, bundle.len() - 20);
        // addr(8) + ",fff\0" padded(8) + 3 floats(12)
        assert_eq!(size, 28);
        assert_eq!(&bundle[20..25], b"/time");
        assert_eq!(&bundle[28..32], b",fff");
    }

    #[test]
    fn int_argument_encoding() {
        let mut builder = BundleBuilder::new(0, 512);
        builder.message("/meta", &[Arg::Int(3)]).unwrap();
        let bundle = builder.finish();
        assert_eq!(&bundle[bundle.len() - 4..], &3i32.to_be_bytes());
    }

    #[test]
    fn size_budget_enforced() {
        let mut builder = BundleBuilder::new(0, 64);
        let args = vec![Arg::Float(0.0); 32];
        assert!(builder.message("/big", &args).is_err());
    }
}
