// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Transform size for a requested frequency resolution

use crate::error::{DataError, Result};
use serde::{Deserialize, Serialize};

/// Default smallest transform size
pub const DEFAULT_MIN_NFFT: usize = 16;

/// Default overlap of consecutive segments as a fraction of `nfft`
pub const DEFAULT_OVERLAP_FRAC: f64 = 0.5;

/// One frequency resolution or an ordered batch of them, in Hz
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrequencyResolution {
    Single(f64),
    Multiple(Vec<f64>),
}

impl FrequencyResolution {
    /// The resolutions in request order
    pub fn values(&self) -> &[f64] {
        match self {
            FrequencyResolution::Single(r) => std::slice::from_ref(r),
            FrequencyResolution::Multiple(rs) => rs,
        }
    }
}

impl From<f64> for FrequencyResolution {
    fn from(resolution: f64) -> Self {
        FrequencyResolution::Single(resolution)
    }
}

impl From<Vec<f64>> for FrequencyResolution {
    fn from(resolutions: Vec<f64>) -> Self {
        FrequencyResolution::Multiple(resolutions)
    }
}

/// Segment length and overlap of a Welch transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSize {
    pub nfft: usize,
    pub noverlap: usize,
}

/// Smallest power of two equal to or larger than `x`, `None` if it does not
/// fit into `usize`. Values up to one give 1.
pub fn next_power_of_two(x: f64) -> Option<usize> {
    if x.is_nan() {
        return None;
    }
    if x <= 1.0 {
        return Some(1);
    }
    let n = x.ceil();
    if n > usize::MAX as f64 {
        return None;
    }
    (n as usize).checked_next_power_of_two()
}

/// Transform size needed to resolve `freq_resolution` Hz at `samplerate`.
///
/// `nfft` is the smallest power of two with `nfft >= samplerate /
/// freq_resolution`, raised to `min_nfft` if smaller, and `noverlap` is
/// `floor(nfft * overlap_frac)`.
///
/// # Errors
///
/// [`DataError::InvalidParameter`] for a non-positive resolution or
/// sampling rate, an overlap fraction outside `[0, 1)`, or a transform
/// size that does not fit into memory.
pub fn transform_size(
    freq_resolution: f64,
    samplerate: f64,
    overlap_frac: f64,
    min_nfft: usize,
) -> Result<TransformSize> {
    if !freq_resolution.is_finite() || freq_resolution <= 0.0 {
        return Err(DataError::InvalidParameter(format!(
            "frequency resolution must be positive, got {}",
            freq_resolution
        )));
    }
    if !samplerate.is_finite() || samplerate <= 0.0 {
        return Err(DataError::InvalidParameter(format!(
            "sampling rate must be positive, got {}",
            samplerate
        )));
    }
    if !(0.0..1.0).contains(&overlap_frac) {
        return Err(DataError::InvalidParameter(format!(
            "overlap fraction must be in [0, 1), got {}",
            overlap_frac
        )));
    }
    let nfft = next_power_of_two(samplerate / freq_resolution)
        .ok_or_else(|| {
            DataError::InvalidParameter(format!(
                "resolution of {} Hz at {} Hz is too fine",
                freq_resolution, samplerate
            ))
        })?
        .max(min_nfft)
        .max(1);
    let noverlap = (nfft as f64 * overlap_frac).floor() as usize;
    Ok(TransformSize { nfft, noverlap })
}
