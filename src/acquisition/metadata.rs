// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Header parsing for relacs data directories
//!
//! Relacs writes a `stimuli.dat` file next to its `trace-<N>.raw` files. The
//! leading block of `#`-prefixed lines holds `key: value` pairs, among them
//! `unit<N>` and `sampling rate<N>` for every recorded trace.

use crate::error::{DataError, Result};
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Name of the side-car header file of a relacs data directory
pub const HEADER_FILE: &str = "stimuli.dat";

/// Comment marker that introduces header lines
pub const COMMENT_MARKER: char = '#';

/// Ordered key/value pairs read from the leading comment block of a file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    entries: Vec<(String, String)>,
}

impl Header {
    /// Value of the first entry with the given key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All entries in file order
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }
}

/// Parse the leading comment block of a header stream.
///
/// Reading stops at the first line that does not start with `#`. Each
/// comment line is split at its first colon; lines without a colon are
/// skipped. A repeated key keeps its first position and its last value.
pub fn parse_header<R: BufRead>(reader: R) -> Result<Header> {
    let mut header = Header::default();
    for line in reader.lines() {
        let line = line?;
        if !line.starts_with(COMMENT_MARKER) {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key
                .trim_matches(|c: char| c == COMMENT_MARKER || c.is_whitespace())
                .to_string();
            header.insert(key, value.trim().to_string());
        }
    }
    Ok(header)
}

/// Read the header of a relacs `*.dat` file
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<Header> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| DataError::open_failed(path, e))?;
    parse_header(BufReader::new(file))
}

/// Extract `N` from a file name of the form `trace-<N>.raw`
pub fn parse_trace_number(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix("trace-")?
        .strip_suffix(".raw")?
        .parse()
        .ok()
}

/// Directory holding the relacs files for `path`
pub(crate) fn relacs_dir(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Sampling rate in Hz and unit of one trace of a relacs recording.
///
/// `path` is a relacs data directory, a file inside one, or a
/// `trace-<N>.raw` file. For trace files the trace number comes from the
/// file name, otherwise it is `channel + 1`. The unit is empty when the
/// header does not name one.
pub fn rate_and_unit<P: AsRef<Path>>(path: P, channel: usize) -> Result<(f64, String)> {
    let path = path.as_ref();
    let mut trace = channel + 1;
    if !path.is_dir() {
        if let Some(n) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_trace_number)
        {
            trace = n;
        }
    }

    let header_path = relacs_dir(path).join(HEADER_FILE);
    let header = read_header(&header_path)?;

    let unit = header
        .get(&format!("unit{}", trace))
        .unwrap_or_default()
        .to_string();
    let rate = header
        .get(&format!("sampling rate{}", trace))
        .ok_or_else(|| DataError::MissingSamplingRate {
            path: header_path.clone(),
            trace,
        })?;
    let samplerate = rate
        .trim_end()
        .trim_end_matches("Hz")
        .trim()
        .parse::<f64>()
        .map_err(|_| DataError::Malformed {
            path: header_path.clone(),
            what: "sampling rate",
            value: rate.to_string(),
        })?;

    debug!(
        "trace {} of {}: {} Hz, unit '{}'",
        trace,
        header_path.display(),
        samplerate,
        unit
    );
    Ok((samplerate, unit))
}
