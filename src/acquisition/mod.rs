// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Recording acquisition module
//!
//! This module loads time-series recordings from the supported on-disk
//! formats and exposes them either as a whole in-memory [`Recording`] or as a
//! [`BufferedTimeSeries`] that keeps only a sliding window in memory.
//!
//! ## Supported formats
//!
//! Formats are probed in this order:
//!
//! 1. **Relacs raw traces**: a directory with `trace-<N>.raw` files (32-bit
//!    floats) and a `stimuli.dat` header holding sampling rate and unit.
//! 2. **Pickled recordings** (`*.pkl`) with `time_trace` (ms) and `raw_data`.
//! 3. **WAV files**, read with `hound`. Their unit is `a.u.`.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_ephys::acquisition::{self, ChannelSelection};
//!
//! let recording = acquisition::load_file("data/2019-01-01-aa", ChannelSelection::All)?;
//! println!(
//!     "{} frames at {} Hz in {}",
//!     recording.samples.frames(),
//!     recording.samplerate,
//!     recording.unit
//! );
//!
//! let mut stream = acquisition::open_stream(&["data/recording.wav"], ChannelSelection::Single(0), 10.0, 2.0)?;
//! for chunk in stream.chunks(1000).rev() {
//!     let (start, samples) = chunk?;
//!     println!("{}: {} frames", start, samples.frames());
//! }
//! # Ok::<(), rust_ephys::error::DataError>(())
//! ```

pub mod buffered;
pub mod container;
pub mod format;
pub mod metadata;
pub mod pickle;
pub mod raw_trace;

pub use buffered::{BufferedTimeSeries, Transition};
pub use container::{ArraySource, ContainerSource, SourceInfo, WavSource};
pub use format::{is_raw_trace_set, is_serialized_blob, DataFormat, FormatLoader};
pub use metadata::{parse_header, rate_and_unit, read_header, Header};
pub use raw_trace::RawTraceSource;

use crate::error::{DataError, Result};
use log::info;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::path::{Path, PathBuf};

/// Which channels of a recording to work on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelSelection {
    /// All channels, as a frames × channels array
    #[default]
    All,
    /// A single channel, as a 1-D array
    Single(usize),
}

impl ChannelSelection {
    /// Index of the selected channel, if a single one is selected
    pub fn index(&self) -> Option<usize> {
        match self {
            ChannelSelection::All => None,
            ChannelSelection::Single(c) => Some(*c),
        }
    }
}

/// Negative channel numbers select all channels
impl From<i64> for ChannelSelection {
    fn from(channel: i64) -> Self {
        if channel < 0 {
            ChannelSelection::All
        } else {
            ChannelSelection::Single(channel as usize)
        }
    }
}

/// Sample values of a recording or of a slice of it
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    /// Frames × channels
    MultiChannel(Array2<f64>),
    /// One value per frame
    SingleChannel(Array1<f64>),
}

impl Samples {
    /// Number of frames
    pub fn frames(&self) -> usize {
        match self {
            Samples::MultiChannel(data) => data.nrows(),
            Samples::SingleChannel(data) => data.len(),
        }
    }

    /// Number of channels
    pub fn channels(&self) -> usize {
        match self {
            Samples::MultiChannel(data) => data.ncols(),
            Samples::SingleChannel(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// View of one channel. A single-channel array only has channel 0.
    pub fn channel(&self, channel: usize) -> Result<ArrayView1<'_, f64>> {
        let channels = self.channels();
        match self {
            Samples::MultiChannel(data) if channel < channels => Ok(data.column(channel)),
            Samples::SingleChannel(data) if channel == 0 => Ok(data.view()),
            _ => Err(DataError::ChannelOutOfRange { channel, channels }),
        }
    }

    /// Frames × channels array, with one column for single-channel data
    pub fn into_multi_channel(self) -> Array2<f64> {
        match self {
            Samples::MultiChannel(data) => data,
            Samples::SingleChannel(data) => data.insert_axis(Axis(1)),
        }
    }
}

/// A recording loaded completely into memory
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub samples: Samples,
    /// Sampling rate in Hz
    pub samplerate: f64,
    /// Physical unit of the samples, empty if unspecified
    pub unit: String,
}

impl Recording {
    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.frames() as f64 / self.samplerate
    }
}

/// Apply a channel selection to a frames × channels array
pub(crate) fn select_channel(data: Array2<f64>, channel: ChannelSelection) -> Result<Samples> {
    match channel {
        ChannelSelection::All => Ok(Samples::MultiChannel(data)),
        ChannelSelection::Single(c) if c < data.ncols() => {
            Ok(Samples::SingleChannel(data.column(c).to_owned()))
        }
        ChannelSelection::Single(c) => Err(DataError::ChannelOutOfRange {
            channel: c,
            channels: data.ncols(),
        }),
    }
}

fn to_path_bufs<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PathBuf>> {
    let empty = match paths {
        [] => true,
        [single] => single.as_ref().as_os_str().is_empty(),
        _ => false,
    };
    if empty {
        return Err(DataError::EmptyInput);
    }
    Ok(paths.iter().map(|p| p.as_ref().to_path_buf()).collect())
}

/// Load a complete recording.
///
/// Several paths are only meaningful for relacs `trace-<N>.raw` files; for
/// the other formats the first path is used.
///
/// # Errors
///
/// * [`DataError::EmptyInput`] if `paths` is empty or a single empty path
/// * [`DataError::ChannelOutOfRange`] if a single channel beyond the
///   recorded ones is requested
/// * the errors of the selected format loader
pub fn load<P: AsRef<Path>>(paths: &[P], channel: ChannelSelection) -> Result<Recording> {
    let paths = to_path_bufs(paths)?;
    let loader = format::select_loader(&paths);
    info!(
        "Loading {} as {:?} ({:?})",
        paths[0].display(),
        loader.format(),
        channel
    );
    loader.load(&paths, channel)
}

/// Load a complete recording from a single path
pub fn load_file<P: AsRef<Path>>(path: P, channel: ChannelSelection) -> Result<Recording> {
    load(&[path.as_ref()], channel)
}

/// Open a recording for buffered random access.
///
/// See [`BufferedTimeSeries::open`].
pub fn open_stream<P: AsRef<Path>>(
    paths: &[P],
    channel: ChannelSelection,
    buffer_seconds: f64,
    back_seconds: f64,
) -> Result<BufferedTimeSeries> {
    BufferedTimeSeries::open(paths, channel, buffer_seconds, back_seconds)
}
