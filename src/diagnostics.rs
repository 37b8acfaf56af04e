// SPDX-License-Identifier: MIT

//! Coarse statistical checks over generator output.
//!
//! Three classic statistics, each with a p-value and judged at the 5%
//! significance level:
//!
//! - chi-square over the 256 byte frequencies (df = 255),
//!
//! - the Wald-Wolfowitz runs z-score over the bit sequence,
//!
//! - the Kolmogorov-Smirnov distance between the empirical byte
//!   distribution and the uniform distribution over `0..=255`.
//!
//! A healthy generator fails any single check about one time in twenty,
//! so a failure is a prompt to sample again rather than a verdict.
use core::fmt;
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

/// A check passes when its p-value is at least this level.
pub const SIGNIFICANCE: f64 = 0.05;

/// Statistics and p-values computed over one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub samples: usize,
    pub chi_square: f64,
    pub chi_square_p: f64,
    /// `None` when the sample holds a single bit value only.
    pub runs_z: Option<f64>,
    pub runs_p: Option<f64>,
    pub ks_distance: f64,
    pub ks_p: f64,
}

impl Report {
    pub fn from_bytes(data: &[u8]) -> Self {
        let chi_square = chi_square(data);
        let runs_z = runs_z(data);
        let ks_distance = ks_distance(data);
        Self {
            samples: data.len(),
            chi_square,
            chi_square_p: chi_square_p(chi_square),
            runs_z,
            runs_p: runs_z.map(runs_p),
            ks_distance,
            ks_p: ks_p(ks_distance, data.len()),
        }
    }

    pub fn chi_square_passed(&self) -> bool {
        self.samples > 0 && self.chi_square_p >= SIGNIFICANCE
    }

    pub fn runs_passed(&self) -> bool {
        self.runs_p.is_some_and(|p| p >= SIGNIFICANCE)
    }

    pub fn ks_passed(&self) -> bool {
        self.samples > 0 && self.ks_p >= SIGNIFICANCE
    }

    pub fn passed(&self) -> bool {
        self.chi_square_passed() && self.runs_passed() && self.ks_passed()
    }
}

fn verdict(passed: bool) -> &'static str {
    if passed {
        "not rejected"
    } else {
        "REJECTED"
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sample size: {} bytes", self.samples)?;
        writeln!(f)?;
        writeln!(f, "Chi-square (df = 255)")?;
        writeln!(f, "  statistic      : {:.2}", self.chi_square)?;
        writeln!(f, "  p-value        : {:.4}", self.chi_square_p)?;
        writeln!(f, "  uniformity     : {}", verdict(self.chi_square_passed()))?;
        writeln!(f)?;
        writeln!(f, "Runs test (Wald-Wolfowitz)")?;
        match (self.runs_z, self.runs_p) {
            (Some(z), Some(p)) => {
                writeln!(f, "  z-score        : {z:.3}")?;
                writeln!(f, "  p-value        : {p:.4}")?;
            }
            _ => writeln!(f, "  z-score        : undefined")?,
        }
        writeln!(f, "  independence   : {}", verdict(self.runs_passed()))?;
        writeln!(f)?;
        writeln!(f, "Kolmogorov-Smirnov")?;
        writeln!(f, "  D statistic    : {:.5}", self.ks_distance)?;
        writeln!(f, "  p-value        : {:.4}", self.ks_p)?;
        write!(f, "  uniformity     : {}", verdict(self.ks_passed()))
    }
}

fn byte_histogram(data: &[u8]) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for &b in data {
        hist[b as usize] += 1;
    }
    hist
}

/// Chi-square statistic of the byte frequencies against a uniform
/// expectation. Zero for an empty sample.
pub fn chi_square(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let expected = data.len() as f64 / 256.0;
    byte_histogram(data)
        .iter()
        .map(|&c| {
            let diff = c as f64 - expected;
            diff * diff / expected
        })
        .sum()
}

/// Wald-Wolfowitz runs z-score over the bits of `data`, most
/// significant bit first.
pub fn runs_z(data: &[u8]) -> Option<f64> {
    let bits = data
        .iter()
        .flat_map(|&byte| (0..8).rev().map(move |shift| (byte >> shift) & 1));

    let mut ones = 0u64;
    let mut zeros = 0u64;
    let mut runs = 0u64;
    let mut prev = None;
    for bit in bits {
        if bit == 1 {
            ones += 1;
        } else {
            zeros += 1;
        }
        if prev != Some(bit) {
            runs += 1;
        }
        prev = Some(bit);
    }
    if ones == 0 || zeros == 0 {
        return None;
    }

    let (n1, n0) = (ones as f64, zeros as f64);
    let n = n1 + n0;
    let expected = 2.0 * n0 * n1 / n + 1.0;
    let variance = 2.0 * n0 * n1 * (2.0 * n0 * n1 - n) / (n * n * (n - 1.0));
    Some((runs as f64 - expected) / variance.sqrt())
}

/// Kolmogorov-Smirnov distance between the empirical distribution of
/// the bytes and the discrete uniform distribution over `0..=255`.
///
/// Both distributions step at the same 256 points, so the supremum is
/// taken over those points only.
pub fn ks_distance(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let n = data.len() as f64;
    let mut cumulative = 0u64;
    let mut d_max = 0.0f64;
    for (value, &count) in byte_histogram(data).iter().enumerate() {
        cumulative += count;
        let empirical = cumulative as f64 / n;
        let uniform = (value + 1) as f64 / 256.0;
        d_max = d_max.max((empirical - uniform).abs());
    }
    d_max
}

/// Upper tail probability of a chi-square statistic with 255 degrees
/// of freedom.
pub fn chi_square_p(chi_square: f64) -> f64 {
    ChiSquared::new(255.0).map_or(0.0, |dist| dist.sf(chi_square))
}

/// Two-sided p-value of a standard normal z-score.
pub fn runs_p(z: f64) -> f64 {
    (2.0 * Normal::standard().sf(z.abs())).min(1.0)
}

/// Asymptotic Kolmogorov p-value of distance `d` over `n` samples.
pub fn ks_p(d: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let sqrt_n = (n as f64).sqrt();
    let lambda = (sqrt_n + 0.12 + 0.11 / sqrt_n) * d;
    // The alternating series does not converge near zero, where the
    // tail probability is one anyway.
    if lambda < 0.2 {
        return 1.0;
    }
    let mut p = 0.0;
    for k in 1..=100i32 {
        let sign = if k % 2 == 0 { -1.0 } else { 1.0 };
        p += sign * (-2.0 * (k as f64 * lambda).powi(2)).exp();
    }
    (2.0 * p).clamp(0.0, 1.0)
}
