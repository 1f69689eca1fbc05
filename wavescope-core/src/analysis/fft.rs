//! Minimal iterative radix-2 FFT.
//!
//! Analysis windows are a power-of-two number of samples (frames per
//! window × samples per frame, both powers of two by default), so a
//! plain Cooley–Tukey transform covers every configuration the bridge
//! accepts; callers zero-pad anything else.

/// In-place radix-2 FFT over split real/imaginary buffers.
///
/// Both slices must be the same power-of-two length.
pub(crate) fn fft_in_place(re: &mut [f32], im: &mut [f32]) {
    let n = re.len();
    debug_assert_eq!(n, im.len());
    debug_assert!(n.is_power_of_two());
    if n < 2 {
        return;
    }

    // Bit-reversal permutation.
    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = (i.reverse_bits() >> (usize::BITS - bits)) as usize;
        if j > i {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    // Butterfly passes.
    let mut len = 2;
    while len <= n {
        let angle = -2.0 * std::f32::consts::PI / len as f32;
        let (w_re, w_im) = (angle.cos(), angle.sin());
        for start in (0..n).step_by(len) {
            let mut cur_re = 1.0f32;
            let mut cur_im = 0.0f32;
            for k in 0..len / 2 {
                let a = start + k;
                let b = start + k + len / 2;
                let t_re = cur_re * re[b] - cur_im * im[b];
                let t_im = cur_re * im[b] + cur_im * re[b];
                re[b] = re[a] - t_re;
                im[b] = im[a] - t_im;
                re[a] += t_re;
                im[a] += t_im;
                let next_re = cur_re * w_re - cur_im * w_im;
                cur_im = cur_re * w_im + cur_im * w_re;
                cur_re = next_re;
            }
        }
        len <<= 1;
    }
}

/// Magnitude spectrum (bins `0..=n/2`) of a real signal.
///
/// Input shorter than the next power of two is zero-padded.
pub(crate) fn magnitude_spectrum(samples: &[f32]) -> Vec<f32> {
    let n = samples.len().max(2).next_power_of_two();
    let mut re = vec![0.0f32; n];
    let mut im = vec![0.0f32; n];
    re[..samples.len()].copy_from_slice(samples);

    fft_in_place(&mut re, &mut im);

    (0..=n / 2)
        .map(|i| (re[i] * re[i] + im[i] * im[i]).sqrt())
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────
