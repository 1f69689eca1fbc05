//! Analyzer boundary: one analysis window in, one feature set out.
//!
//! The bridge never interprets feature values — it only forwards them
//! to the encoder — so the boundary is a plain trait. The crate ships
//! [`SpectralAnalyzer`] as its production implementation; tests swap in
//! counting fakes.

mod fft;
mod spectral;

pub use spectral::SpectralAnalyzer;

/// Number of cepstral coefficients in [`FeatureSet::mfcc`].
pub const MFCC_LEN: usize = 13;

// ── Feature groups ───────────────────────────────────────────────

/// Time-domain measures of one window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeFeatures {
    pub root_mean_square: f32,
    pub peak_energy: f32,
    pub zero_crossing_rate: f32,
}

/// Magnitude-spectrum statistics of one window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpectralFeatures {
    pub centroid: f32,
    pub crest: f32,
    pub flatness: f32,
    pub rolloff: f32,
    pub kurtosis: f32,
}

/// Onset/difference measures of one window.
///
/// Differences are taken against a zero history: the analyzer is
/// stateless per window, so the previous frame is treated as silence.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OnsetFeatures {
    pub energy_difference: f32,
    pub spectral_difference: f32,
    pub spectral_difference_hwr: f32,
    pub complex_spectral_difference: f32,
    pub high_frequency_content: f32,
}

// ── FeatureSet ───────────────────────────────────────────────────

/// The fixed, ordered collection of scalar features for one window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    pub time: TimeFeatures,
    pub spectral: SpectralFeatures,
    pub onset: OnsetFeatures,
    /// Fundamental frequency estimate in Hz; 0.0 when unvoiced.
    pub pitch: f32,
    /// Mel-frequency cepstral coefficients, always [`MFCC_LEN`] long.
    pub mfcc: Vec<f32>,
}

// ── Analyzer ─────────────────────────────────────────────────────

/// Converts one window of samples into a [`FeatureSet`].
///
/// Implementations must fully consume `samples` before returning; the
/// caller reuses the underlying buffer for the next window.
pub trait Analyzer: Send {
    fn analyze(&self, samples: &[f32], sample_rate: u32) -> FeatureSet;
}
