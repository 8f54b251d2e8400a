// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).
//!
//! Spectral analysis module
//!
//! This module derives FFT sizes from a requested frequency resolution and
//! computes Welch power spectra, spectrograms and decibel conversions.

mod decibel;
mod psd;
mod resolution;

pub use decibel::{max_power, to_decibel, to_power, DEFAULT_MIN_POWER, DEFAULT_REF_POWER};
pub use psd::{
    multi_resolution, power_spectrum, spectrogram, Detrend, MultiResolution, PowerSpectrum,
    PsdOptions, SpectralAnalyzer, Spectrogram, WelchAnalyzer, WindowFunction,
};
pub use resolution::{
    next_power_of_two, transform_size, FrequencyResolution, TransformSize, DEFAULT_MIN_NFFT,
    DEFAULT_OVERLAP_FRAC,
};

/// Create a new spectral analyzer with the given options
pub fn create_spectral_analyzer(options: PsdOptions) -> Box<dyn SpectralAnalyzer> {
    Box::new(WelchAnalyzer::new(options))
}
