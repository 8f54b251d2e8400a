// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Storage format detection
//!
//! Detection is purely structural: a path is classified by its name and by
//! the files next to it, never by its content. The raw trace check comes
//! first because it needs the strongest evidence (header plus first trace
//! file), followed by the pickle extension check. Everything else goes to
//! the generic container loader.

use super::container::{ContainerLoader, ContainerSource};
use super::metadata::{parse_trace_number, relacs_dir, HEADER_FILE};
use super::pickle::PickleLoader;
use super::raw_trace::RawTraceLoader;
use super::{ChannelSelection, Recording};
use crate::error::Result;
use std::path::{Path, PathBuf};

/// File extension of pickled recordings
pub const BLOB_EXTENSION: &str = "pkl";

/// The storage formats known to the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// Relacs directory with `trace-<N>.raw` files and a `stimuli.dat` header
    RawTraceSet,
    /// A single pickled recording
    SerializedBlob,
    /// Any file the container collaborator can decode (WAV)
    GenericContainer,
}

impl DataFormat {
    /// Classify `paths`, trying the formats in priority order
    pub fn detect<P: AsRef<Path>>(paths: &[P]) -> DataFormat {
        let paths: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        select_loader(&paths).format()
    }
}

/// Loading strategy for one storage format
pub trait FormatLoader: Send + Sync {
    /// The format handled by this loader
    fn format(&self) -> DataFormat;

    /// Whether `paths` look like a recording of this format
    fn probe(&self, paths: &[PathBuf]) -> bool;

    /// Load the complete recording
    fn load(&self, paths: &[PathBuf], channel: ChannelSelection) -> Result<Recording>;

    /// Open the recording as a random-access source with all channels
    fn open(&self, paths: &[PathBuf]) -> Result<Box<dyn ContainerSource>>;
}

static LOADERS: [&dyn FormatLoader; 3] = [&RawTraceLoader, &PickleLoader, &ContainerLoader];

/// All loaders in detection priority order
pub fn loaders() -> &'static [&'static dyn FormatLoader] {
    &LOADERS
}

/// First loader whose probe accepts `paths`
pub fn select_loader(paths: &[PathBuf]) -> &'static dyn FormatLoader {
    loaders()
        .iter()
        .copied()
        .find(|loader| loader.probe(paths))
        .unwrap_or(&ContainerLoader)
}

pub(crate) fn is_trace_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with("trace") && n.ends_with(".raw"))
}

fn is_relacs_dir(dir: &Path) -> bool {
    dir.join(HEADER_FILE).is_file() && dir.join("trace-1.raw").is_file()
}

/// Whether `paths` denote a relacs raw trace set.
///
/// A single path qualifies if it is, or lies in, a directory holding
/// `stimuli.dat` and `trace-1.raw`. Several paths additionally all have to
/// be `trace-<N>.raw` files.
pub fn is_raw_trace_set<P: AsRef<Path>>(paths: &[P]) -> bool {
    let first = match paths.first() {
        Some(first) => first.as_ref(),
        None => return false,
    };
    if paths.len() > 1
        && !paths.iter().all(|p| {
            p.as_ref()
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_trace_number)
                .is_some()
        })
    {
        return false;
    }
    is_relacs_dir(&relacs_dir(first))
}

/// Whether `path` is a pickled recording
pub fn is_serialized_blob<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .map_or(false, |ext| ext == BLOB_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn relacs_fixture() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(HEADER_FILE), "# sampling rate1: 100Hz\n").unwrap();
        fs::write(dir.path().join("trace-1.raw"), [0u8; 12]).unwrap();
        fs::write(dir.path().join("trace-2.raw"), [0u8; 12]).unwrap();
        fs::write(dir.path().join("info.dat"), "").unwrap();
        dir
    }

    #[test]
    fn test_raw_trace_set_single_paths() {
        let dir = relacs_fixture();
        assert!(is_raw_trace_set(&[dir.path()]));
        assert!(is_raw_trace_set(&[dir.path().join("info.dat")]));
        assert!(is_raw_trace_set(&[dir.path().join("trace-2.raw")]));
    }

    #[test]
    fn test_raw_trace_set_multiple_paths_need_trace_names() {
        let dir = relacs_fixture();
        let traces = [dir.path().join("trace-1.raw"), dir.path().join("trace-2.raw")];
        assert!(is_raw_trace_set(&traces));
        let mixed = [dir.path().join("trace-1.raw"), dir.path().join("info.dat")];
        assert!(!is_raw_trace_set(&mixed));
    }

    #[test]
    fn test_raw_trace_set_requires_header_and_first_trace() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("trace-1.raw"), [0u8; 12]).unwrap();
        assert!(!is_raw_trace_set(&[dir.path()]));
        fs::write(dir.path().join(HEADER_FILE), "").unwrap();
        assert!(is_raw_trace_set(&[dir.path()]));
        fs::remove_file(dir.path().join("trace-1.raw")).unwrap();
        assert!(!is_raw_trace_set(&[dir.path()]));
        let none: [&Path; 0] = [];
        assert!(!is_raw_trace_set(&none));
    }

    #[test]
    fn test_serialized_blob_extension() {
        assert!(is_serialized_blob("recording.pkl"));
        assert!(!is_serialized_blob("recording.wav"));
        assert!(!is_serialized_blob("pkl"));
    }

    #[test]
    fn test_detection_priority() {
        let dir = relacs_fixture();
        // a pickle inside a relacs directory still counts as the directory
        let blob = dir.path().join("extra.pkl");
        assert_eq!(DataFormat::detect(&[&blob]), DataFormat::RawTraceSet);

        let other = tempdir().unwrap();
        let blob = other.path().join("extra.pkl");
        assert_eq!(DataFormat::detect(&[&blob]), DataFormat::SerializedBlob);
        let wav = other.path().join("song.wav");
        assert_eq!(DataFormat::detect(&[&wav]), DataFormat::GenericContainer);
    }
}
