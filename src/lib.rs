// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust ephys library
//!
//! This library loads electrophysiology and acoustic recordings from relacs
//! raw trace directories, pickle files and WAV files, gives buffered access
//! to long recordings, and computes power spectra at requested frequency
//! resolutions.

pub mod acquisition;
pub mod config;
pub mod error;
pub mod spectral;

pub use acquisition::{load, load_file, open_stream, ChannelSelection, Recording, Samples};
pub use error::{DataError, ErrorKind};
