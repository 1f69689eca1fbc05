//! Production analyzer: time-domain, spectral, onset, pitch, and MFCC
//! features from one window of samples.
//!
//! Stateless per window — onset differences are taken against silence,
//! so two identical windows produce identical feature sets regardless
//! of what was analyzed before them.

use crate::analysis::fft::magnitude_spectrum;
use crate::analysis::{
    Analyzer, FeatureSet, OnsetFeatures, SpectralFeatures, TimeFeatures, MFCC_LEN,
};

/// Fraction of total spectral magnitude below the rolloff frequency.
const ROLLOFF_THRESHOLD: f32 = 0.85;

/// Minimum normalized autocorrelation peak to call a window voiced.
const PITCH_CONFIDENCE: f32 = 0.3;

/// Pitch search range in Hz.
const PITCH_MIN_HZ: f32 = 80.0;
const PITCH_MAX_HZ: f32 = 1000.0;

const EPS: f32 = 1e-10;

// ── SpectralAnalyzer ─────────────────────────────────────────────

/// FFT-based implementation of [`Analyzer`].
#[derive(Debug, Clone)]
pub struct SpectralAnalyzer {
    /// Number of triangular mel filters feeding the MFCC stage.
    mel_filters: usize,
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self { mel_filters: 26 }
    }
}

impl SpectralAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Analyzer for SpectralAnalyzer {
    fn analyze(&self, samples: &[f32], sample_rate: u32) -> FeatureSet {
        if samples.is_empty() {
            return FeatureSet {
                mfcc: vec![0.0; MFCC_LEN],
                ..FeatureSet::default()
            };
        }

        let time = time_features(samples);

        // Hann-windowed magnitude spectrum for everything spectral.
        let windowed: Vec<f32> = samples
            .iter()
            .enumerate()
            .map(|(i, &x)| x * hann(i, samples.len()))
            .collect();
        let mags = magnitude_spectrum(&windowed);
        let n_fft = (mags.len() - 1) * 2;
        let bin_hz = sample_rate as f32 / n_fft as f32;

        let spectral = spectral_features(&mags, bin_hz);
        let onset = onset_features(samples, &mags);
        let pitch = estimate_pitch(samples, sample_rate);
        let mfcc = mfcc(&mags, bin_hz, self.mel_filters);

        FeatureSet {
            time,
            spectral,
            onset,
            pitch,
            mfcc,
        }
    }
}

// ── Time domain ──────────────────────────────────────────────────

fn time_features(samples: &[f32]) -> TimeFeatures {
    let energy: f32 = samples.iter().map(|x| x * x).sum();
    let peak = samples.iter().fold(0.0f32, |p, x| p.max(x.abs()));
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    TimeFeatures {
        root_mean_square: (energy / samples.len() as f32).sqrt(),
        peak_energy: peak,
        zero_crossing_rate: crossings as f32,
    }
}

// ── Spectral statistics ──────────────────────────────────────────

fn spectral_features(mags: &[f32], bin_hz: f32) -> SpectralFeatures {
    let total: f32 = mags.iter().sum();
    let mean = total / mags.len() as f32;
    let max = mags.iter().fold(0.0f32, |p, &m| p.max(m));

    let centroid = if total > EPS {
        mags.iter()
            .enumerate()
            .map(|(i, &m)| i as f32 * bin_hz * m)
            .sum::<f32>()
            / total
    } else {
        0.0
    };

    let crest = if mean > EPS { max / mean } else { 0.0 };

    let flatness = if mean > EPS {
        let log_mean = mags.iter().map(|&m| (m + EPS).ln()).sum::<f32>() / mags.len() as f32;
        log_mean.exp() / mean
    } else {
        0.0
    };

    let rolloff = if total > EPS {
        let threshold = total * ROLLOFF_THRESHOLD;
        let mut acc = 0.0f32;
        let mut bin = mags.len() - 1;
        for (i, &m) in mags.iter().enumerate() {
            acc += m;
            if acc >= threshold {
                bin = i;
                break;
            }
        }
        bin as f32 * bin_hz
    } else {
        0.0
    };

    let kurtosis = {
        let var = mags.iter().map(|&m| (m - mean).powi(2)).sum::<f32>() / mags.len() as f32;
        if var > EPS {
            let m4 = mags.iter().map(|&m| (m - mean).powi(4)).sum::<f32>() / mags.len() as f32;
            m4 / (var * var) - 3.0
        } else {
            0.0
        }
    };

    SpectralFeatures {
        centroid,
        crest,
        flatness,
        rolloff,
        kurtosis,
    }
}

// ── Onset measures ───────────────────────────────────────────────

/// Difference measures against a zero history (previous window taken
/// as silence).
fn onset_features(samples: &[f32], mags: &[f32]) -> OnsetFeatures {
    let energy: f32 = samples.iter().map(|x| x * x).sum();
    let mag_sum: f32 = mags.iter().sum();
    let hfc: f32 = mags.iter().enumerate().map(|(i, &m)| i as f32 * m).sum();
    OnsetFeatures {
        energy_difference: energy,
        spectral_difference: mag_sum,
        spectral_difference_hwr: mag_sum,
        complex_spectral_difference: mag_sum,
        high_frequency_content: hfc,
    }
}

// ── Pitch ────────────────────────────────────────────────────────

/// Normalized-autocorrelation pitch estimate; 0.0 when unvoiced.
fn estimate_pitch(samples: &[f32], sample_rate: u32) -> f32 {
    let energy: f32 = samples.iter().map(|x| x * x).sum();
    if energy < EPS {
        return 0.0;
    }

    let sr = sample_rate as f32;
    let lag_min = (sr / PITCH_MAX_HZ).floor().max(1.0) as usize;
    let lag_max = ((sr / PITCH_MIN_HZ).ceil() as usize).min(samples.len() / 2);
    if lag_min >= lag_max {
        return 0.0;
    }

    let mut best_lag = 0usize;
    let mut best_corr = 0.0f32;
    for lag in lag_min..=lag_max {
        let corr: f32 = samples[..samples.len() - lag]
            .iter()
            .zip(&samples[lag..])
            .map(|(a, b)| a * b)
            .sum();
        let corr = corr / energy;
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }

    if best_corr < PITCH_CONFIDENCE {
        return 0.0;
    }
    sr / best_lag as f32
}

// ── MFCC ─────────────────────────────────────────────────────────

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank energies → log → DCT-II, first
/// [`MFCC_LEN`] coefficients.
fn mfcc(mags: &[f32], bin_hz: f32, n_filters: usize) -> Vec<f32> {
    let nyquist = (mags.len() - 1) as f32 * bin_hz;
    let mel_max = hz_to_mel(nyquist);

    // Filter edge frequencies, evenly spaced on the mel scale.
    let edges: Vec<f32> = (0..n_filters + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (n_filters + 1) as f32))
        .collect();

    let mut log_energies = Vec::with_capacity(n_filters);
    for f in 0..n_filters {
        let (lo, mid, hi) = (edges[f], edges[f + 1], edges[f + 2]);
        let mut energy = 0.0f32;
        for (i, &m) in mags.iter().enumerate() {
            let freq = i as f32 * bin_hz;
            let weight = if freq > lo && freq <= mid {
                (freq - lo) / (mid - lo).max(EPS)
            } else if freq > mid && freq < hi {
                (hi - freq) / (hi - mid).max(EPS)
            } else {
                0.0
            };
            energy += weight * m * m;
        }
        log_energies.push((energy + EPS).ln());
    }

    (0..MFCC_LEN)
        .map(|k| {
            log_energies
                .iter()
                .enumerate()
                .map(|(j, &e)| {
                    e * (std::f32::consts::PI * k as f32 * (j as f32 + 0.5)
                        / n_filters as f32)
                        .cos()
                })
                .sum()
        })
        .collect()
}

/// Hann window coefficient.
fn hann(i: usize, n: usize) -> f32 {
    if n < 2 {
        return 1.0;
    }
    let x = std::f32::consts::PI * i as f32 / (n - 1) as f32;
    x.sin() * x.sin()
}

// ── Tests ────────────────────────────────────────────────────────
