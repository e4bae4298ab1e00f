//! 1-D Gaussian kernels and the kernel-size / sigma correspondence.

use crate::error::{ensure_odd_kernel, Result};

/// Fixed kernels used when the sigma is derived from a small kernel size.
const SMALL_KERNELS: [&[f64]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[
        0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
    ],
];

/// Sigma implied by a kernel size: `0.3 * ((ksize - 1) * 0.5 - 1) + 0.8`.
///
/// Kernel 11 gives sigma 2, kernel 17 gives sigma 2.9 (the "sigma 3" kernel).
pub fn sigma_for_kernel(ksize: usize) -> f64 {
    0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Nearest odd kernel size whose implied sigma matches `sigma`.
pub fn kernel_for_sigma(sigma: f64) -> usize {
    let k = ((sigma - 0.8) / 0.3 + 1.0) * 2.0 + 1.0;
    let half = ((k - 1.0) * 0.5).round().max(0.0) as usize;
    2 * half + 1
}

/// Normalized 1-D Gaussian kernel of odd length `ksize`.
///
/// A non-positive `sigma` is derived from the kernel size with
/// [`sigma_for_kernel`]; in that case kernels up to size 7 use fixed
/// binomial-style weights.
pub fn gaussian_kernel_1d(ksize: usize, sigma: f64) -> Result<Vec<f64>> {
    ensure_odd_kernel(ksize)?;
    if sigma <= 0.0 && ksize <= 7 {
        return Ok(SMALL_KERNELS[ksize / 2].to_vec());
    }
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        sigma_for_kernel(ksize)
    };
    let scale = -0.5 / (sigma * sigma);
    let center = (ksize as f64 - 1.0) * 0.5;
    let mut kernel: Vec<f64> = (0..ksize)
        .map(|i| {
            let x = i as f64 - center;
            (scale * x * x).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    Ok(kernel)
}
