// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Pickled recordings
//!
//! A pickle file holds a dictionary with a `time_trace` of timestamps in
//! milliseconds and the samples in `raw_data`, one row per frame. A flat
//! `raw_data` list is read as a single channel. The unit is always `mV`.
//!
//! Only plain lists of numbers are decoded. Pickled numpy arrays fail to
//! decode; convert them with `tolist()` before pickling.

use super::container::{ArraySource, ContainerSource};
use super::format::{is_serialized_blob, DataFormat, FormatLoader};
use super::{select_channel, ChannelSelection, Recording};
use crate::error::{DataError, Result};
use log::info;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Unit of pickled recordings
pub const BLOB_UNIT: &str = "mV";

/// Sample block of a pickled recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawData {
    /// One row of channel values per frame
    Frames(Vec<Vec<f64>>),
    /// One value per frame
    Flat(Vec<f64>),
}

/// On-disk layout of a pickled recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickledRecording {
    /// Timestamps in milliseconds
    pub time_trace: Vec<f64>,
    pub raw_data: RawData,
}

impl PickledRecording {
    /// Sampling rate in Hz derived from the first two timestamps
    pub fn samplerate(&self) -> Option<f64> {
        match self.time_trace.as_slice() {
            [t0, t1, ..] if t1 > t0 => Some(1000.0 / (t1 - t0)),
            _ => None,
        }
    }

    /// Samples as a frames × channels array
    pub fn to_array(&self) -> std::result::Result<Array2<f64>, String> {
        match &self.raw_data {
            RawData::Flat(values) => Array2::from_shape_vec((values.len(), 1), values.clone())
                .map_err(|e| e.to_string()),
            RawData::Frames(rows) => {
                let channels = rows.first().map_or(0, Vec::len);
                if let Some(n) = rows.iter().position(|r| r.len() != channels) {
                    return Err(format!(
                        "frame {} has {} values, expected {}",
                        n,
                        rows[n].len(),
                        channels
                    ));
                }
                let values: Vec<f64> = rows.iter().flatten().copied().collect();
                Array2::from_shape_vec((rows.len(), channels), values).map_err(|e| e.to_string())
            }
        }
    }
}

fn invalid(path: &Path, reason: impl Into<String>) -> DataError {
    DataError::InvalidBlob {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Read and validate a pickled recording, returning the frames × channels
/// samples and the sampling rate
pub fn read_pickle<P: AsRef<Path>>(path: P) -> Result<(Array2<f64>, f64)> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| DataError::open_failed(path, e))?;
    let blob: PickledRecording =
        serde_pickle::from_reader(BufReader::new(file), serde_pickle::DeOptions::new())?;

    if blob.time_trace.len() < 2 {
        return Err(invalid(path, "time_trace needs at least two timestamps"));
    }
    let samplerate = blob
        .samplerate()
        .ok_or_else(|| invalid(path, "time_trace is not increasing"))?;
    let data = blob.to_array().map_err(|reason| invalid(path, reason))?;

    info!("Opened pickle file: {}", path.display());
    info!("  Sample rate: {} Hz", samplerate);
    info!("  Channels: {}", data.ncols());
    info!("  Frames: {}", data.nrows());
    Ok((data, samplerate))
}

/// Whole-file loading of pickled recordings
pub struct PickleLoader;

impl FormatLoader for PickleLoader {
    fn format(&self) -> DataFormat {
        DataFormat::SerializedBlob
    }

    fn probe(&self, paths: &[PathBuf]) -> bool {
        paths.first().map_or(false, is_serialized_blob)
    }

    fn load(&self, paths: &[PathBuf], channel: ChannelSelection) -> Result<Recording> {
        let path = paths.first().ok_or(DataError::EmptyInput)?;
        let (data, samplerate) = read_pickle(path)?;
        Ok(Recording {
            samples: select_channel(data, channel)?,
            samplerate,
            unit: BLOB_UNIT.to_string(),
        })
    }

    /// Pickles are decoded as a whole and served from memory
    fn open(&self, paths: &[PathBuf]) -> Result<Box<dyn ContainerSource>> {
        let path = paths.first().ok_or(DataError::EmptyInput)?;
        let (data, samplerate) = read_pickle(path)?;
        Ok(Box::new(ArraySource::new(data, samplerate, BLOB_UNIT)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::Samples;
    use crate::error::ErrorKind;
    use approx::assert_relative_eq;
    use ndarray::array;
    use serde_pickle::SerOptions;
    use tempfile::tempdir;

    fn write_blob(path: &Path, blob: &PickledRecording) {
        let mut file = File::create(path).unwrap();
        serde_pickle::to_writer(&mut file, blob, SerOptions::new()).unwrap();
    }

    fn blob(time_trace: Vec<f64>, raw_data: RawData) -> PickledRecording {
        PickledRecording {
            time_trace,
            raw_data,
        }
    }

    #[test]
    fn test_load_pickle_rate_and_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recording.pkl");
        write_blob(
            &path,
            &blob(
                vec![0.0, 0.5, 1.0],
                RawData::Frames(vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]]),
            ),
        );

        let recording = PickleLoader
            .load(&[path.clone()], ChannelSelection::Single(1))
            .unwrap();
        assert_relative_eq!(recording.samplerate, 2000.0);
        assert_eq!(recording.unit, "mV");
        assert_eq!(recording.samples, Samples::SingleChannel(array![10.0, 20.0, 30.0]));

        let err = PickleLoader
            .load(&[path], ChannelSelection::Single(2))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
    }

    #[test]
    fn test_flat_raw_data_is_one_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flat.pkl");
        write_blob(&path, &blob(vec![0.0, 1.0, 2.0], RawData::Flat(vec![4.0, 5.0, 6.0])));
        let (data, samplerate) = read_pickle(&path).unwrap();
        assert_eq!(data, array![[4.0], [5.0], [6.0]]);
        assert_relative_eq!(samplerate, 1000.0);
    }

    #[test]
    fn test_invalid_blobs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.pkl");

        write_blob(&path, &blob(vec![0.0], RawData::Flat(vec![1.0])));
        assert!(matches!(read_pickle(&path), Err(DataError::InvalidBlob { .. })));

        write_blob(&path, &blob(vec![1.0, 1.0], RawData::Flat(vec![1.0, 2.0])));
        assert!(matches!(read_pickle(&path), Err(DataError::InvalidBlob { .. })));

        write_blob(
            &path,
            &blob(
                vec![0.0, 1.0],
                RawData::Frames(vec![vec![1.0, 2.0], vec![3.0]]),
            ),
        );
        let err = read_pickle(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
        assert!(err.to_string().contains("frame 1"));
    }

    #[test]
    fn test_open_serves_from_memory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recording.pkl");
        write_blob(
            &path,
            &blob(vec![0.0, 0.1], RawData::Frames(vec![vec![1.0], vec![2.0]])),
        );
        let mut source = PickleLoader.open(&[path]).unwrap();
        assert_eq!(source.unit(), BLOB_UNIT);
        assert_eq!(source.info().frames, 2);
        assert_eq!(source.read_block(1, 1).unwrap(), array![[2.0]]);
    }
}
