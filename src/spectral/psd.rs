// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Welch power spectral density and spectrograms

use super::resolution::{
    transform_size, FrequencyResolution, TransformSize, DEFAULT_MIN_NFFT, DEFAULT_OVERLAP_FRAC,
};
use crate::error::{DataError, Result};
use log::debug;
use ndarray::{s, Array1, Array2, ArrayView1, AsArray, Axis};
use rustfft::{num_complex::Complex64, FftPlanner};
use serde::{Deserialize, Serialize};

/// Available window functions for spectral analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowFunction {
    Rectangular,
    #[default]
    Hann,
    Blackman,
}

impl WindowFunction {
    /// Symmetric window of `n` coefficients
    pub fn coefficients(&self, n: usize) -> Array1<f64> {
        if n < 2 {
            return Array1::ones(n);
        }
        let denom = (n - 1) as f64;
        Array1::from_shape_fn(n, |i| match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hann => {
                0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / denom).cos())
            }
            WindowFunction::Blackman => {
                let a0 = 0.42;
                let a1 = 0.5;
                let a2 = 0.08;
                let x = i as f64 / denom;
                a0 - a1 * (2.0 * std::f64::consts::PI * x).cos()
                    + a2 * (4.0 * std::f64::consts::PI * x).cos()
            }
        })
    }
}

/// Trend removed from every segment before windowing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Detrend {
    #[default]
    None,
    Mean,
    Linear,
}

impl Detrend {
    fn apply(&self, segment: &mut Array1<f64>) {
        let n = segment.len();
        if n == 0 {
            return;
        }
        match self {
            Detrend::None => {}
            Detrend::Mean => {
                let mean = segment.sum() / n as f64;
                segment.mapv_inplace(|v| v - mean);
            }
            Detrend::Linear => {
                // least-squares line over the sample index
                let mean_x = (n - 1) as f64 / 2.0;
                let mean_y = segment.sum() / n as f64;
                let (mut sxy, mut sxx) = (0.0, 0.0);
                for (i, &y) in segment.iter().enumerate() {
                    let dx = i as f64 - mean_x;
                    sxy += dx * (y - mean_y);
                    sxx += dx * dx;
                }
                let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
                for (i, v) in segment.iter_mut().enumerate() {
                    *v -= mean_y + slope * (i as f64 - mean_x);
                }
            }
        }
    }
}

/// Parameters of the Welch estimate besides the resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsdOptions {
    /// Overlap of consecutive segments as a fraction of `nfft`
    pub overlap_frac: f64,
    /// Smallest segment length
    pub min_nfft: usize,
    pub window: WindowFunction,
    pub detrend: Detrend,
    /// Zero-padded FFT length, at least `nfft`. Defaults to `nfft`.
    pub pad_to: Option<usize>,
    /// Return a density (per Hz) instead of a power per bin
    pub scale_by_freq: bool,
}

impl Default for PsdOptions {
    fn default() -> Self {
        Self {
            overlap_frac: DEFAULT_OVERLAP_FRAC,
            min_nfft: DEFAULT_MIN_NFFT,
            window: WindowFunction::Hann,
            detrend: Detrend::None,
            pad_to: None,
            scale_by_freq: true,
        }
    }
}

/// Averaged one-sided power spectrum
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSpectrum {
    pub power: Array1<f64>,
    /// Frequency of each power bin in Hz
    pub frequencies: Array1<f64>,
    pub nfft: usize,
    pub noverlap: usize,
}

impl PowerSpectrum {
    /// Frequency spacing of the bins in Hz
    pub fn resolution(&self) -> f64 {
        if self.frequencies.len() > 1 {
            self.frequencies[1] - self.frequencies[0]
        } else {
            0.0
        }
    }
}

/// Power over time and frequency
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    /// Time × frequency
    pub power: Array2<f64>,
    pub frequencies: Array1<f64>,
    /// Centre of each segment in seconds
    pub times: Array1<f64>,
    pub nfft: usize,
    pub noverlap: usize,
}

/// Spectra of a batched resolution request
#[derive(Debug, Clone, PartialEq)]
pub enum MultiResolution {
    Single(PowerSpectrum),
    /// One spectrum per resolution, in request order
    Multiple(Vec<PowerSpectrum>),
}

impl MultiResolution {
    pub fn spectra(&self) -> &[PowerSpectrum] {
        match self {
            MultiResolution::Single(spectrum) => std::slice::from_ref(spectrum),
            MultiResolution::Multiple(spectra) => spectra,
        }
    }
}

/// Trait for implementing spectral analysis
pub trait SpectralAnalyzer: Send + Sync {
    /// Welch estimate of the power spectral density of `data`
    fn power_spectrum(
        &self,
        data: ArrayView1<'_, f64>,
        samplerate: f64,
        freq_resolution: f64,
    ) -> Result<PowerSpectrum>;

    /// Power of every segment of `data`
    fn spectrogram(
        &self,
        data: ArrayView1<'_, f64>,
        samplerate: f64,
        freq_resolution: f64,
    ) -> Result<Spectrogram>;
}

/// Welch analyzer following the conventions of `matplotlib.mlab.psd`
#[derive(Debug, Clone, Default)]
pub struct WelchAnalyzer {
    options: PsdOptions,
}

/// Periodograms of all segments
struct Segments {
    power: Array2<f64>,
    frequencies: Array1<f64>,
    starts: Vec<usize>,
    size: TransformSize,
}

impl WelchAnalyzer {
    pub fn new(options: PsdOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PsdOptions {
        &self.options
    }

    fn segments(
        &self,
        data: ArrayView1<'_, f64>,
        samplerate: f64,
        freq_resolution: f64,
    ) -> Result<Segments> {
        let opts = &self.options;
        let size = transform_size(freq_resolution, samplerate, opts.overlap_frac, opts.min_nfft)?;
        let TransformSize { nfft, noverlap } = size;
        let pad_to = opts.pad_to.unwrap_or(nfft);
        if pad_to < nfft {
            return Err(DataError::InvalidParameter(format!(
                "pad_to {} is smaller than nfft {}",
                pad_to, nfft
            )));
        }

        // signals shorter than one segment are zero-padded
        let mut signal = data.to_owned();
        if signal.len() < nfft {
            let mut padded = Array1::zeros(nfft);
            padded.slice_mut(s![..signal.len()]).assign(&signal);
            signal = padded;
        }

        let step = nfft - noverlap;
        let nsegments = (signal.len() - noverlap) / step;
        let nfreqs = if pad_to % 2 == 0 {
            pad_to / 2 + 1
        } else {
            (pad_to + 1) / 2
        };

        let window = opts.window.coefficients(nfft);
        let scale = if opts.scale_by_freq {
            1.0 / (samplerate * window.mapv(|w| w * w).sum())
        } else {
            1.0 / window.sum().powi(2)
        };
        // bins that stand for a positive and a negative frequency
        let doubled = if pad_to % 2 == 0 {
            1..nfreqs - 1
        } else {
            1..nfreqs
        };

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(pad_to);
        let mut buffer = vec![Complex64::new(0.0, 0.0); pad_to];
        let mut power = Array2::zeros((nsegments, nfreqs));
        let mut starts = Vec::with_capacity(nsegments);

        for k in 0..nsegments {
            let start = k * step;
            let mut segment = signal.slice(s![start..start + nfft]).to_owned();
            opts.detrend.apply(&mut segment);
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = if i < nfft {
                    Complex64::new(segment[i] * window[i], 0.0)
                } else {
                    Complex64::new(0.0, 0.0)
                };
            }
            fft.process(&mut buffer);

            let mut row = power.row_mut(k);
            for (bin, value) in row.iter_mut().enumerate() {
                let mut p = buffer[bin].norm_sqr() * scale;
                if doubled.contains(&bin) {
                    p *= 2.0;
                }
                *value = p;
            }
            starts.push(start);
        }

        debug!(
            "welch: nfft={} noverlap={} pad_to={} segments={}",
            nfft, noverlap, pad_to, nsegments
        );
        let frequencies = Array1::from_shape_fn(nfreqs, |i| i as f64 * samplerate / pad_to as f64);
        Ok(Segments {
            power,
            frequencies,
            starts,
            size,
        })
    }
}

impl SpectralAnalyzer for WelchAnalyzer {
    fn power_spectrum(
        &self,
        data: ArrayView1<'_, f64>,
        samplerate: f64,
        freq_resolution: f64,
    ) -> Result<PowerSpectrum> {
        let segments = self.segments(data, samplerate, freq_resolution)?;
        let power = segments
            .power
            .mean_axis(Axis(0))
            .ok_or_else(|| DataError::InvalidParameter("no segments to average".to_string()))?;
        Ok(PowerSpectrum {
            power,
            frequencies: segments.frequencies,
            nfft: segments.size.nfft,
            noverlap: segments.size.noverlap,
        })
    }

    fn spectrogram(
        &self,
        data: ArrayView1<'_, f64>,
        samplerate: f64,
        freq_resolution: f64,
    ) -> Result<Spectrogram> {
        let segments = self.segments(data, samplerate, freq_resolution)?;
        let half = segments.size.nfft as f64 / 2.0;
        let times = segments
            .starts
            .iter()
            .map(|&start| (start as f64 + half) / samplerate)
            .collect();
        Ok(Spectrogram {
            power: segments.power,
            frequencies: segments.frequencies,
            times,
            nfft: segments.size.nfft,
            noverlap: segments.size.noverlap,
        })
    }
}

/// Power spectral density of `data` at the given frequency resolution.
///
/// ```
/// use ndarray::Array1;
/// use rust_ephys::spectral::{power_spectrum, PsdOptions};
///
/// let rate = 1000.0;
/// let data = Array1::from_shape_fn(4000, |i| (2.0 * std::f64::consts::PI * 50.0 * i as f64 / rate).sin());
/// let spectrum = power_spectrum(&data, rate, 1.0, &PsdOptions::default())?;
/// assert_eq!(spectrum.nfft, 1024);
/// assert_eq!(spectrum.power.len(), spectrum.frequencies.len());
/// # Ok::<(), rust_ephys::error::DataError>(())
/// ```
pub fn power_spectrum<'a>(
    data: impl AsArray<'a, f64>,
    samplerate: f64,
    freq_resolution: f64,
    options: &PsdOptions,
) -> Result<PowerSpectrum> {
    WelchAnalyzer::new(options.clone()).power_spectrum(data.into(), samplerate, freq_resolution)
}

/// Independent power spectra for every requested resolution
pub fn multi_resolution<'a>(
    data: impl AsArray<'a, f64>,
    samplerate: f64,
    resolution: &FrequencyResolution,
    options: &PsdOptions,
) -> Result<MultiResolution> {
    let analyzer = WelchAnalyzer::new(options.clone());
    let data: ArrayView1<'a, f64> = data.into();
    match resolution {
        FrequencyResolution::Single(r) => Ok(MultiResolution::Single(
            analyzer.power_spectrum(data, samplerate, *r)?,
        )),
        FrequencyResolution::Multiple(rs) => rs
            .iter()
            .map(|&r| analyzer.power_spectrum(data, samplerate, r))
            .collect::<Result<Vec<_>>>()
            .map(MultiResolution::Multiple),
    }
}

/// Spectrogram of `data` with segments sized for `freq_resolution`
pub fn spectrogram<'a>(
    data: impl AsArray<'a, f64>,
    samplerate: f64,
    freq_resolution: f64,
    options: &PsdOptions,
) -> Result<Spectrogram> {
    WelchAnalyzer::new(options.clone()).spectrogram(data.into(), samplerate, freq_resolution)
}
