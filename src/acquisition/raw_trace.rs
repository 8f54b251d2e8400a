// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Relacs raw trace sets
//!
//! Every channel lives in its own `trace-<N>.raw` file of 32-bit floats in
//! native byte order. The recorder terminates each file with
//! [`RAW_TRACE_SENTINELS`] values that are not part of the signal. Sampling
//! rate and unit of each trace come from the `stimuli.dat` header.

use super::container::{ContainerSource, SourceInfo};
use super::format::{is_raw_trace_set, is_trace_file, DataFormat, FormatLoader};
use super::metadata::{parse_trace_number, rate_and_unit, relacs_dir};
use super::{select_channel, ChannelSelection, Recording};
use crate::error::{DataError, Result};
use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Number of trailing values in each trace file that are not samples
pub const RAW_TRACE_SENTINELS: usize = 2;

const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// All `trace-<N>.raw` files of a relacs directory, sorted by trace number
fn trace_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| DataError::open_failed(dir, e))?;
    let mut traces = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if let Some(n) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_trace_number)
        {
            traces.push((n, path));
        }
    }
    traces.sort_by_key(|(n, _)| *n);
    Ok(traces.into_iter().map(|(_, path)| path).collect())
}

/// Trace files to read for `paths` and the channel selection that applies
/// to the resulting frames × traces array.
///
/// Several paths are taken as trace files and always yield all of them. A
/// single directory, or a non-trace file inside one, yields all traces of
/// the directory, or `trace-<c+1>.raw` for `Single(c)`. A channel beyond
/// the traces of the directory is out of range. A single trace file is
/// itself the selected channel.
pub fn resolve_trace_files(
    paths: &[PathBuf],
    channel: ChannelSelection,
) -> Result<(Vec<PathBuf>, ChannelSelection)> {
    let (files, channel) = match paths {
        [] => return Err(DataError::EmptyInput),
        [path] if !path.is_dir() && is_trace_file(path) => {
            let channel = channel.index().map_or(ChannelSelection::All, |_| {
                ChannelSelection::Single(0)
            });
            (vec![path.clone()], channel)
        }
        [path] => {
            let dir = relacs_dir(path);
            match channel {
                ChannelSelection::All => (trace_files_in(&dir)?, ChannelSelection::All),
                ChannelSelection::Single(c) => {
                    let channels = trace_files_in(&dir)?.len();
                    if c >= channels {
                        return Err(DataError::ChannelOutOfRange {
                            channel: c,
                            channels,
                        });
                    }
                    (
                        vec![dir.join(format!("trace-{}.raw", c + 1))],
                        ChannelSelection::Single(0),
                    )
                }
            }
        }
        _ => (paths.to_vec(), ChannelSelection::All),
    };
    if files.is_empty() {
        return Err(DataError::NoChannels);
    }
    if let Some(bad) = files.iter().find(|f| !is_trace_file(f)) {
        return Err(DataError::InvalidTraceName { path: bad.clone() });
    }
    Ok((files, channel))
}

/// Decode native-endian 32-bit floats
fn decode_f32(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(SAMPLE_BYTES)
        .map(|chunk| {
            let mut raw = [0u8; SAMPLE_BYTES];
            raw.copy_from_slice(chunk);
            f64::from(f32::from_ne_bytes(raw))
        })
        .collect()
}

struct TraceFile {
    path: PathBuf,
    file: File,
}

/// Random-access source over the trace files of a relacs recording.
///
/// The first trace determines the number of frames. A later trace with
/// fewer frames is rejected, a longer one is truncated.
pub struct RawTraceSource {
    traces: Vec<TraceFile>,
    frames: usize,
    samplerate: f64,
    unit: String,
}

impl RawTraceSource {
    /// Open the given trace files, checking that sampling rates and units
    /// agree across traces.
    pub fn open(files: &[PathBuf]) -> Result<Self> {
        let mut traces = Vec::with_capacity(files.len());
        let mut frames = 0;
        let mut samplerate = 0.0;
        let mut unit = String::new();

        for (n, path) in files.iter().enumerate() {
            if !is_trace_file(path) {
                return Err(DataError::InvalidTraceName { path: path.clone() });
            }
            let file = File::open(path).map_err(|e| DataError::open_failed(path, e))?;
            let len = file.metadata()?.len() as usize / SAMPLE_BYTES;
            let usable = len.saturating_sub(RAW_TRACE_SENTINELS);
            let (rate, trace_unit) = rate_and_unit(path, n)?;
            debug!(
                "trace {}: {} frames, {} Hz, unit '{}'",
                path.display(),
                usable,
                rate,
                trace_unit
            );

            if n == 0 {
                frames = usable;
                samplerate = rate;
                unit = trace_unit;
            } else {
                if rate != samplerate {
                    return Err(DataError::SampleRateMismatch {
                        path: path.clone(),
                        expected: samplerate,
                        found: rate,
                    });
                }
                if trace_unit != unit {
                    return Err(DataError::UnitMismatch {
                        path: path.clone(),
                        expected: unit,
                        found: trace_unit,
                    });
                }
                if usable < frames {
                    return Err(DataError::TraceLengthMismatch {
                        path: path.clone(),
                        expected: frames,
                        found: usable,
                    });
                }
                if usable > frames {
                    warn!(
                        "truncating {} from {} to {} frames",
                        path.display(),
                        usable,
                        frames
                    );
                }
            }
            traces.push(TraceFile {
                path: path.clone(),
                file,
            });
        }

        if traces.is_empty() {
            return Err(DataError::NoChannels);
        }
        info!(
            "Opened relacs recording: {} traces, {} frames at {} Hz",
            traces.len(),
            frames,
            samplerate
        );
        Ok(Self {
            traces,
            frames,
            samplerate,
            unit,
        })
    }

    /// Paths of the trace files, one per channel
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.traces.iter().map(|t| t.path.as_path())
    }
}

impl ContainerSource for RawTraceSource {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            samplerate: self.samplerate,
            frames: self.frames,
            channels: self.traces.len(),
        }
    }

    fn unit(&self) -> String {
        self.unit.clone()
    }

    fn read_block(&mut self, start: usize, count: usize) -> Result<Array2<f64>> {
        if start + count > self.frames {
            return Err(DataError::FrameOutOfRange {
                index: start + count,
                frames: self.frames,
            });
        }
        let mut block = Array2::zeros((count, self.traces.len()));
        let mut bytes = vec![0u8; count * SAMPLE_BYTES];
        for (n, trace) in self.traces.iter_mut().enumerate() {
            trace
                .file
                .seek(SeekFrom::Start((start * SAMPLE_BYTES) as u64))?;
            trace.file.read_exact(&mut bytes)?;
            block
                .column_mut(n)
                .assign(&Array1::from(decode_f32(&bytes)));
        }
        Ok(block)
    }
}

/// Whole-recording loading of relacs raw trace sets
pub struct RawTraceLoader;

impl FormatLoader for RawTraceLoader {
    fn format(&self) -> DataFormat {
        DataFormat::RawTraceSet
    }

    fn probe(&self, paths: &[PathBuf]) -> bool {
        is_raw_trace_set(paths)
    }

    fn load(&self, paths: &[PathBuf], channel: ChannelSelection) -> Result<Recording> {
        let (files, channel) = resolve_trace_files(paths, channel)?;
        let mut source = RawTraceSource::open(&files)?;
        let info = source.info();
        let data = source.read_block(0, info.frames)?;
        Ok(Recording {
            samples: select_channel(data, channel)?,
            samplerate: info.samplerate,
            unit: source.unit,
        })
    }

    fn open(&self, paths: &[PathBuf]) -> Result<Box<dyn ContainerSource>> {
        let (files, _) = resolve_trace_files(paths, ChannelSelection::All)?;
        Ok(Box::new(RawTraceSource::open(&files)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::metadata::HEADER_FILE;
    use crate::acquisition::Samples;
    use crate::error::ErrorKind;
    use ndarray::array;
    use tempfile::{tempdir, TempDir};

    fn write_trace(dir: &Path, n: usize, values: &[f32]) -> PathBuf {
        let path = dir.join(format!("trace-{}.raw", n));
        let mut bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        // sentinels
        bytes.extend_from_slice(&f32::MAX.to_ne_bytes());
        bytes.extend_from_slice(&f32::MAX.to_ne_bytes());
        fs::write(&path, bytes).unwrap();
        path
    }

    fn fixture(header: &str) -> TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(HEADER_FILE), header).unwrap();
        write_trace(dir.path(), 1, &[1.0, 2.0, 3.0, 4.0]);
        write_trace(dir.path(), 2, &[-1.0, -2.0, -3.0, -4.0]);
        dir
    }

    const HEADER: &str = "# unit1: mV\n# sampling rate1: 20000Hz\n\
                          # unit2: mV\n# sampling rate2: 20000Hz\n";

    #[test]
    fn test_load_directory_all_channels() {
        let dir = fixture(HEADER);
        let recording = RawTraceLoader
            .load(&[dir.path().to_path_buf()], ChannelSelection::All)
            .unwrap();
        assert_eq!(recording.samplerate, 20000.0);
        assert_eq!(recording.unit, "mV");
        assert_eq!(
            recording.samples,
            Samples::MultiChannel(array![[1.0, -1.0], [2.0, -2.0], [3.0, -3.0], [4.0, -4.0]])
        );
    }

    #[test]
    fn test_load_single_channel_maps_to_trace_file() {
        let dir = fixture(HEADER);
        let recording = RawTraceLoader
            .load(&[dir.path().join("stimuli.dat")], ChannelSelection::Single(1))
            .unwrap();
        assert_eq!(
            recording.samples,
            Samples::SingleChannel(array![-1.0, -2.0, -3.0, -4.0])
        );
    }

    #[test]
    fn test_channel_beyond_traces_is_out_of_range() {
        let dir = fixture(HEADER);
        let err = resolve_trace_files(&[dir.path().to_path_buf()], ChannelSelection::Single(5))
            .unwrap_err();
        assert!(matches!(
            err,
            DataError::ChannelOutOfRange {
                channel: 5,
                channels: 2
            }
        ));
        assert_eq!(err.kind(), crate::error::ErrorKind::Index);
    }

    #[test]
    fn test_multiple_paths_force_all_channels() {
        let dir = fixture(HEADER);
        let paths = [dir.path().join("trace-2.raw"), dir.path().join("trace-1.raw")];
        let recording = RawTraceLoader
            .load(&paths, ChannelSelection::Single(0))
            .unwrap();
        assert_eq!(recording.samples.channels(), 2);
        assert_eq!(recording.samples.channel(0).unwrap(), array![-1.0, -2.0, -3.0, -4.0]);
    }

    #[test]
    fn test_sample_rate_mismatch_is_rejected() {
        let dir = fixture("# unit1: mV\n# sampling rate1: 20000Hz\n# unit2: mV\n# sampling rate2: 10000Hz\n");
        let err = RawTraceLoader
            .load(&[dir.path().to_path_buf()], ChannelSelection::All)
            .unwrap_err();
        assert!(matches!(err, DataError::SampleRateMismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::Value);
    }

    #[test]
    fn test_unit_mismatch_is_rejected() {
        let dir = fixture("# unit1: mV\n# sampling rate1: 20000Hz\n# unit2: V\n# sampling rate2: 20000Hz\n");
        let err = RawTraceLoader
            .load(&[dir.path().to_path_buf()], ChannelSelection::All)
            .unwrap_err();
        assert!(matches!(err, DataError::UnitMismatch { .. }));
    }

    #[test]
    fn test_trace_lengths() {
        let dir = fixture(&format!("{}# unit3: mV\n# sampling rate3: 20000Hz\n", HEADER));
        write_trace(dir.path(), 3, &[5.0, 6.0, 7.0, 8.0, 9.0]);
        let recording = RawTraceLoader
            .load(&[dir.path().to_path_buf()], ChannelSelection::All)
            .unwrap();
        assert_eq!(recording.samples.frames(), 4);
        assert_eq!(recording.samples.channel(2).unwrap(), array![5.0, 6.0, 7.0, 8.0]);

        write_trace(dir.path(), 3, &[5.0]);
        let err = RawTraceLoader
            .load(&[dir.path().to_path_buf()], ChannelSelection::All)
            .unwrap_err();
        assert!(matches!(err, DataError::TraceLengthMismatch { found: 1, .. }));
    }

    #[test]
    fn test_invalid_trace_name() {
        let dir = fixture(HEADER);
        let paths = [dir.path().join("trace-1.raw"), dir.path().join("stimuli.dat")];
        let err = resolve_trace_files(&paths, ChannelSelection::All).unwrap_err();
        assert!(matches!(err, DataError::InvalidTraceName { .. }));
    }

    #[test]
    fn test_source_reads_blocks() {
        let dir = fixture(HEADER);
        let mut source = RawTraceLoader.open(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(source.info().frames, 4);
        assert_eq!(source.read_block(2, 2).unwrap(), array![[3.0, -3.0], [4.0, -4.0]]);
        assert_eq!(source.read_block(0, 1).unwrap(), array![[1.0, -1.0]]);
        assert!(source.read_block(3, 2).is_err());
    }
}
