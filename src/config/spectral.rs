// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration for spectral analysis

use crate::spectral::{
    Detrend, FrequencyResolution, PsdOptions, WindowFunction, DEFAULT_MIN_NFFT,
    DEFAULT_MIN_POWER, DEFAULT_OVERLAP_FRAC, DEFAULT_REF_POWER,
};
use serde::{Deserialize, Serialize};

/// Spectral analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Frequency resolutions in Hz, one spectrum is computed for each
    pub freq_resolutions: Vec<f64>,

    pub overlap_frac: f64,

    pub min_nfft: usize,

    pub window: WindowFunction,

    pub detrend: Detrend,

    /// Zero-padded FFT length, `None` for the segment length
    pub pad_to: Option<usize>,

    pub scale_by_freq: bool,

    /// Reference power for decibel conversion, `None` for the maximum power
    pub ref_power: Option<f64>,

    pub min_power: f64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            freq_resolutions: vec![0.5],
            overlap_frac: DEFAULT_OVERLAP_FRAC,
            min_nfft: DEFAULT_MIN_NFFT,
            window: WindowFunction::Hann,
            detrend: Detrend::None,
            pad_to: None,
            scale_by_freq: true,
            ref_power: Some(DEFAULT_REF_POWER),
            min_power: DEFAULT_MIN_POWER,
        }
    }
}

impl SpectralConfig {
    /// Welch parameters for the configured settings
    pub fn psd_options(&self) -> PsdOptions {
        PsdOptions {
            overlap_frac: self.overlap_frac,
            min_nfft: self.min_nfft,
            window: self.window,
            detrend: self.detrend,
            pad_to: self.pad_to,
            scale_by_freq: self.scale_by_freq,
        }
    }

    /// The configured resolutions, a single one unless several are listed
    pub fn resolution(&self) -> FrequencyResolution {
        match self.freq_resolutions.as_slice() {
            [single] => FrequencyResolution::Single(*single),
            many => FrequencyResolution::Multiple(many.to_vec()),
        }
    }
}
