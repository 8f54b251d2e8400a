// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration for recording loading

use crate::acquisition::ChannelSelection;
use serde::{Deserialize, Serialize};

/// Loader settings.
///
/// `channel` follows the command line convention where a negative number
/// selects all channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Channel to load, negative for all channels
    pub channel: i64,

    /// Size of the in-memory window of buffered streams in seconds
    pub buffer_seconds: f64,

    /// Part of the window loaded before a requested frame in seconds
    pub back_seconds: f64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            channel: -1,
            buffer_seconds: 10.0,
            back_seconds: 0.0,
        }
    }
}

impl LoaderConfig {
    pub fn channel_selection(&self) -> ChannelSelection {
        ChannelSelection::from(self.channel)
    }
}
