//! Report packaging and the encoder boundary.
//!
//! One [`Report`] is built per completed window and consumed
//! immediately by the dispatcher; nothing is retained. The wire
//! representation is delegated to a [`ReportEncoder`]; the production
//! implementation is [`OscEncoder`], which packs the feature set into
//! one OSC bundle timetagged with the frame sequence number.

use crate::analysis::FeatureSet;
use crate::error::BridgeError;
use crate::osc::{Arg, BundleBuilder};
use crate::protocol::MAX_REPORT_SIZE;

// ── Report ───────────────────────────────────────────────────────

/// One analyzer result for one window.
#[derive(Debug, Clone)]
pub struct Report {
    pub channel_id: i16,
    /// Frame sequence of the window's final frame, used as an
    /// ordering/timestamp surrogate downstream.
    pub frame_seq: u64,
    pub features: FeatureSet,
}

// ── ReportEncoder ────────────────────────────────────────────────

/// Produces the self-delimited wire packet for one report.
///
/// Output must never exceed [`MAX_REPORT_SIZE`]; the bridge treats it
/// as opaque bytes from here on.
pub trait ReportEncoder: Send {
    fn encode(&self, report: &Report) -> Result<Vec<u8>, BridgeError>;
}

// ── OscEncoder ───────────────────────────────────────────────────

/// OSC bundle encoder.
///
/// Bundle layout (timetag = frame sequence):
/// - `/meta`  — i32 channel id
/// - `/time`  — RMS, peak energy, zero-crossing rate
/// - `/freq`  — centroid, crest, flatness, rolloff, kurtosis
/// - `/onset` — energy diff, spectral diff, HWR diff, complex diff, HFC
/// - `/pitch` — pitch estimate
/// - `/mfcc`  — cepstral coefficient vector
///
/// For a fixed MFCC length every bundle encodes to the same byte
/// count, which the file sink's gap-padding policy and the tests'
/// re-splitting both rely on.
#[derive(Debug, Clone)]
pub struct OscEncoder {
    max_packet: usize,
}

impl Default for OscEncoder {
    fn default() -> Self {
        Self {
            max_packet: MAX_REPORT_SIZE,
        }
    }
}

impl OscEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportEncoder for OscEncoder {
    fn encode(&self, report: &Report) -> Result<Vec<u8>, BridgeError> {
        let f = &report.features;
        let mut bundle = BundleBuilder::new(report.frame_seq, self.max_packet);

        bundle.message("/meta", &[Arg::Int(report.channel_id as i32)])?;
        bundle.message(
            "/time",
            &[
                Arg::Float(f.time.root_mean_square),
                Arg::Float(f.time.peak_energy),
                Arg::Float(f.time.zero_crossing_rate),
            ],
        )?;
        bundle.message(
            "/freq",
            &[
                Arg::Float(f.spectral.centroid),
                Arg::Float(f.spectral.crest),
                Arg::Float(f.spectral.flatness),
                Arg::Float(f.spectral.rolloff),
                Arg::Float(f.spectral.kurtosis),
            ],
        )?;
        bundle.message(
            "/onset",
            &[
                Arg::Float(f.onset.energy_difference),
                Arg::Float(f.onset.spectral_difference),
                Arg::Float(f.onset.spectral_difference_hwr),
                Arg::Float(f.onset.complex_spectral_difference),
                Arg::Float(f.onset.high_frequency_content),
            ],
        )?;
        bundle.message("/pitch", &[Arg::Float(f.pitch)])?;

        let mfcc: Vec<Arg> = f.mfcc.iter().map(|&c| Arg::Float(c)).collect();
        bundle.message("/mfcc", &mfcc)?;

        Ok(bundle.finish())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::MFCC_LEN;

    fn report(channel_id: i16, frame_seq: u64) -> Report {
        Report {
            channel_id,
            frame_seq,
            features: FeatureSet {
                pitch: 440.0,
                mfcc: vec![0.5; MFCC_LEN],
                ..FeatureSet::default()
            },
        }
    }

    /// Count size-prefixed elements in an encoded bundle.
    fn element_count(bundle: &[u8]) -> usize {
        let mut pos = 16; // "#bundle\0" + timetag
        let mut count = 0;
        while pos < bundle.len() {
            let size = i32::from_be_bytes(bundle[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4 + size;
            count += 1;
        }
        assert_eq!(pos, bundle.len(), "trailing bytes after last element");
        count
    }

    #[test]
    fn encodes_six_messages_within_bound() {
        let packet = OscEncoder::new().encode(&report(3, 99)).unwrap();
        assert!(packet.len() <= MAX_REPORT_SIZE);
        assert_eq!(&packet[..8], b"#bundle\0");
        assert_eq!(element_count(&packet), 6);
    }

    #[test]
    fn timetag_is_frame_sequence() {
        let packet = OscEncoder::new().encode(&report(1, 0xDEAD_BEEF)).unwrap();
        assert_eq!(&packet[8..16], &0xDEAD_BEEFu64.to_be_bytes());
    }

    #[test]
    fn packet_size_is_constant() {
        // Self-delimiting by constant length: any two reports with the
        // same MFCC length encode to the same byte count.
        let enc = OscEncoder::new();
        let a = enc.encode(&report(0, 1)).unwrap();
        let b = enc.encode(&report(9, 123_456)).unwrap();
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn channel_id_rides_in_meta() {
        let packet = OscEncoder::new().encode(&report(7, 1)).unwrap();
        // First element: size(4) + "/meta\0\0\0" + ",i\0\0" + i32.
        assert_eq!(&packet[20..25], b"/meta");
        assert_eq!(&packet[32..36], &7i32.to_be_bytes());
    }
}
