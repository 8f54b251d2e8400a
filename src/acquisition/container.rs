// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Random-access sample sources
//!
//! A [`ContainerSource`] reports sampling rate, frame count and channel count
//! and reads arbitrary frame ranges. The buffered stream works on top of this
//! trait; WAV files are the generic container format and are decoded with
//! `hound`.

use super::format::{DataFormat, FormatLoader};
use super::{select_channel, ChannelSelection, Recording};
use crate::error::{DataError, Result};
use hound::{SampleFormat, WavReader, WavSpec};
use log::{debug, info};
use ndarray::{s, Array2};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Unit reported for containers that carry no physical unit
pub const ARBITRARY_UNIT: &str = "a.u.";

/// Shape and rate of a random-access source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    /// Sampling rate in Hz
    pub samplerate: f64,
    /// Number of frames
    pub frames: usize,
    /// Number of channels per frame
    pub channels: usize,
}

/// A recording that can be read block-wise at arbitrary frame offsets
pub trait ContainerSource: Send {
    /// Sampling rate, frame count and channel count
    fn info(&self) -> SourceInfo;

    /// Physical unit of the samples
    fn unit(&self) -> String;

    /// Read `count` frames starting at frame `start` as a frames × channels
    /// array. Callers keep `start + count` within [`SourceInfo::frames`].
    fn read_block(&mut self, start: usize, count: usize) -> Result<Array2<f64>>;
}

/// WAV file source
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
    spec: WavSpec,
    frames: usize,
    path: PathBuf,
}

impl WavSource {
    /// Open a WAV file for block reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| DataError::open_failed(path, e))?;
        let reader = WavReader::new(BufReader::new(file))?;
        let spec = reader.spec();
        let frames = reader.duration() as usize;

        info!("Opened WAV file: {}", path.display());
        info!("  Sample rate: {} Hz", spec.sample_rate);
        info!("  Channels: {}", spec.channels);
        info!("  Bits per sample: {}", spec.bits_per_sample);
        info!("  Sample format: {:?}", spec.sample_format);
        info!("  Frames: {}", frames);

        Ok(Self {
            reader,
            spec,
            frames,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_values(&mut self, count: usize) -> Result<Vec<f64>> {
        let n = count * self.spec.channels as usize;
        let values = match self.spec.sample_format {
            SampleFormat::Float => self
                .reader
                .samples::<f32>()
                .take(n)
                .map(|s| s.map(f64::from))
                .collect::<std::result::Result<Vec<f64>, hound::Error>>()?,
            SampleFormat::Int => {
                // full scale of signed integers maps to [-1, 1)
                let scale = 1.0 / (1u64 << (self.spec.bits_per_sample - 1)) as f64;
                self.reader
                    .samples::<i32>()
                    .take(n)
                    .map(|s| s.map(|v| f64::from(v) * scale))
                    .collect::<std::result::Result<Vec<f64>, hound::Error>>()?
            }
        };
        Ok(values)
    }
}

impl ContainerSource for WavSource {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            samplerate: f64::from(self.spec.sample_rate),
            frames: self.frames,
            channels: self.spec.channels as usize,
        }
    }

    fn unit(&self) -> String {
        ARBITRARY_UNIT.to_string()
    }

    fn read_block(&mut self, start: usize, count: usize) -> Result<Array2<f64>> {
        let channels = self.spec.channels as usize;
        if count == 0 {
            return Ok(Array2::zeros((0, channels)));
        }
        self.reader.seek(start as u32)?;
        let values = self.read_values(count)?;
        if values.len() != count * channels {
            return Err(DataError::ShortRead {
                start,
                requested: count,
                got: values.len() / channels.max(1),
            });
        }
        debug!(
            "read frames {}..{} from {}",
            start,
            start + count,
            self.path.display()
        );
        Ok(Array2::from_shape_vec((count, channels), values)?)
    }
}

/// In-memory source backed by a frames × channels array
#[derive(Debug, Clone)]
pub struct ArraySource {
    data: Array2<f64>,
    samplerate: f64,
    unit: String,
}

impl ArraySource {
    pub fn new(data: Array2<f64>, samplerate: f64, unit: impl Into<String>) -> Self {
        Self {
            data,
            samplerate,
            unit: unit.into(),
        }
    }
}

impl ContainerSource for ArraySource {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            samplerate: self.samplerate,
            frames: self.data.nrows(),
            channels: self.data.ncols(),
        }
    }

    fn unit(&self) -> String {
        self.unit.clone()
    }

    fn read_block(&mut self, start: usize, count: usize) -> Result<Array2<f64>> {
        let frames = self.data.nrows();
        if start + count > frames {
            return Err(DataError::FrameOutOfRange {
                index: start + count,
                frames,
            });
        }
        Ok(self.data.slice(s![start..start + count, ..]).to_owned())
    }
}

/// Open the generic container at `path`
pub fn open_container<P: AsRef<Path>>(path: P) -> Result<Box<dyn ContainerSource>> {
    Ok(Box::new(WavSource::open(path)?))
}

/// Whole-file loading of generic containers
pub struct ContainerLoader;

impl FormatLoader for ContainerLoader {
    fn format(&self) -> DataFormat {
        DataFormat::GenericContainer
    }

    /// Always accepts, this is the fallback format
    fn probe(&self, _paths: &[PathBuf]) -> bool {
        true
    }

    fn load(&self, paths: &[PathBuf], channel: ChannelSelection) -> Result<Recording> {
        let mut source = self.open(paths)?;
        let info = source.info();
        let data = source.read_block(0, info.frames)?;
        Ok(Recording {
            samples: select_channel(data, channel)?,
            samplerate: info.samplerate,
            unit: source.unit(),
        })
    }

    fn open(&self, paths: &[PathBuf]) -> Result<Box<dyn ContainerSource>> {
        let path = paths.first().ok_or(DataError::EmptyInput)?;
        open_container(path)
    }
}
