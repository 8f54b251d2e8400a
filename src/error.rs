// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error types shared by the acquisition and spectral modules
//!
//! Every failure of the library is reported as a [`DataError`]. Callers that
//! only care about the broad category (missing file, bad metadata, index out
//! of range, closed stream) can match on [`DataError::kind`].

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, DataError>;

/// Broad category of a [`DataError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A file or directory does not exist
    NotFound,
    /// Malformed or inconsistent input or metadata
    Value,
    /// Channel or frame index out of bounds
    Index,
    /// Operation on a closed stream
    State,
    /// Low-level I/O or decoder failure
    Io,
}

/// Errors that can occur while loading or analysing recordings
#[derive(Error, Debug)]
pub enum DataError {
    #[error("file not found: {}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("input argument filepath is empty string or list")]
    EmptyInput,

    #[error("invalid name {} of relacs trace file", path.display())]
    InvalidTraceName { path: PathBuf },

    #[error("could not retrieve sampling rate of trace {trace} from {}", path.display())]
    MissingSamplingRate { path: PathBuf, trace: usize },

    #[error("malformed {what} '{value}' in {}", path.display())]
    Malformed {
        path: PathBuf,
        what: &'static str,
        value: String,
    },

    #[error("sampling rates of traces differ: {expected} Hz != {found} Hz in {}", path.display())]
    SampleRateMismatch {
        path: PathBuf,
        expected: f64,
        found: f64,
    },

    #[error("unit of traces differ: '{expected}' != '{found}' in {}", path.display())]
    UnitMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("trace {} has {found} frames, expected at least {expected}", path.display())]
    TraceLengthMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("invalid serialized recording {}: {reason}", path.display())]
    InvalidBlob { path: PathBuf, reason: String },

    #[error("invalid channel number {channel} requested ({channels} channels available)")]
    ChannelOutOfRange { channel: usize, channels: usize },

    #[error("recording has no channels")]
    NoChannels,

    #[error("frame index {index} out of range ({frames} frames)")]
    FrameOutOfRange { index: usize, frames: usize },

    #[error("channel axis is collapsed to channel {channel}, no channel index allowed")]
    ChannelAxisCollapsed { channel: usize },

    #[error("stream is closed")]
    StreamClosed,

    #[error("source returned {got} frames at offset {start}, requested {requested}")]
    ShortRead {
        start: usize,
        requested: usize,
        got: usize,
    },

    #[error("invalid spectral parameter: {0}")]
    InvalidParameter(String),

    #[error("array shape mismatch: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Pickle(#[from] serde_pickle::Error),
}

impl DataError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::NotFound { .. } => ErrorKind::NotFound,
            DataError::EmptyInput
            | DataError::InvalidTraceName { .. }
            | DataError::MissingSamplingRate { .. }
            | DataError::Malformed { .. }
            | DataError::SampleRateMismatch { .. }
            | DataError::UnitMismatch { .. }
            | DataError::TraceLengthMismatch { .. }
            | DataError::InvalidBlob { .. }
            | DataError::InvalidParameter(_)
            | DataError::Shape(_) => ErrorKind::Value,
            DataError::ChannelOutOfRange { .. }
            | DataError::NoChannels
            | DataError::FrameOutOfRange { .. }
            | DataError::ChannelAxisCollapsed { .. } => ErrorKind::Index,
            DataError::StreamClosed => ErrorKind::State,
            DataError::ShortRead { .. }
            | DataError::Io(_)
            | DataError::Wav(_)
            | DataError::Pickle(_) => ErrorKind::Io,
        }
    }

    /// Wrap an I/O error raised while opening `path`, turning a missing file
    /// into [`DataError::NotFound`].
    pub(crate) fn open_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            DataError::NotFound {
                path: path.into(),
                source,
            }
        } else {
            DataError::Io(source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_maps_to_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = DataError::open_failed("/nowhere/stimuli.dat", io);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("stimuli.dat"));
    }

    #[test]
    fn test_other_io_errors_stay_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = DataError::open_failed("/root/secret", io);
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_kinds_follow_taxonomy() {
        assert_eq!(DataError::EmptyInput.kind(), ErrorKind::Value);
        assert_eq!(DataError::StreamClosed.kind(), ErrorKind::State);
        assert_eq!(
            DataError::ChannelOutOfRange {
                channel: 5,
                channels: 2
            }
            .kind(),
            ErrorKind::Index
        );
    }
}
