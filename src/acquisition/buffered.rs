// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Buffered random access to recordings
//!
//! [`BufferedTimeSeries`] keeps a window of `buffer_size` frames of a
//! [`ContainerSource`] in memory and moves it along with the requested
//! frames. Every refill is one of the [`Transition`]s below, so that frames
//! that are already resident are never read again:
//!
//! ```text
//!   buffer   |=========|
//!   forward        |=========|    keep the overlap, fetch the tail
//!   backward |=========|          keep the overlap, fetch the head
//!   expand  |===============|     keep the old buffer, fetch both ends
//!   jump                 |====|   no overlap, fetch the whole window
//! ```
//!
//! A refill places up to `back_size` frames in front of the request, which
//! keeps a small look-back available while sweeping forward.

use super::container::{ContainerSource, SourceInfo};
use super::{format, to_path_bufs, ChannelSelection, Samples};
use crate::error::{DataError, Result};
use log::{debug, warn};
use ndarray::{s, Array1, Array2, ArrayView2};
use std::ops::Range;
use std::path::Path;

/// How the buffer changes to serve a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The request is already buffered
    Resident,
    /// The window moves towards later frames, `keep` frames are reused
    ShiftForward { keep: usize },
    /// The window moves towards earlier frames, `keep` frames are reused
    ShiftBackward { keep: usize },
    /// The window extends past both ends of the buffer
    Expand { keep: usize },
    /// The window does not overlap the buffer
    Jump,
}

impl Transition {
    /// Classify the move from the `buffered` frame range to `window`, the
    /// target range computed for `request`.
    pub fn classify(buffered: Range<usize>, request: Range<usize>, window: Range<usize>) -> Self {
        if request.start >= buffered.start && request.end <= buffered.end {
            return Transition::Resident;
        }
        let lo = window.start.max(buffered.start);
        let hi = window.end.min(buffered.end);
        if lo >= hi {
            return Transition::Jump;
        }
        let keep = hi - lo;
        let before = window.start < buffered.start;
        let after = window.end > buffered.end;
        match (before, after) {
            (false, true) => Transition::ShiftForward { keep },
            (true, false) => Transition::ShiftBackward { keep },
            _ => Transition::Expand { keep },
        }
    }
}

/// Frame range to buffer for `request`.
///
/// The window holds `buffer_size` frames starting up to `back_size` frames
/// before the request, fewer if the request nearly fills the buffer, and is
/// shifted back to stay within `frames`. Requests longer than the buffer are
/// buffered as they are.
pub fn target_window(
    request: Range<usize>,
    buffer_size: usize,
    back_size: usize,
    frames: usize,
) -> Range<usize> {
    let len = request.end - request.start;
    if len >= buffer_size {
        return request;
    }
    let back = back_size.min(buffer_size - len);
    let mut start = request.start.saturating_sub(back);
    let mut end = start + buffer_size;
    if end > frames {
        end = frames;
        start = frames.saturating_sub(buffer_size);
    }
    start..end
}

/// Sliding-window view of a recording.
///
/// Created with [`BufferedTimeSeries::open`] or
/// [`BufferedTimeSeries::from_source`]. The source is released by
/// [`close`](BufferedTimeSeries::close) or when the stream is dropped.
pub struct BufferedTimeSeries {
    source: Option<Box<dyn ContainerSource>>,
    info: SourceInfo,
    unit: String,
    channel: ChannelSelection,
    buffer: Array2<f64>,
    offset: usize,
    buffer_size: usize,
    back_size: usize,
    frames_fetched: usize,
    last_transition: Option<Transition>,
}

impl BufferedTimeSeries {
    /// Open a recording in any supported format.
    ///
    /// `buffer_seconds` is the size of the in-memory window and
    /// `back_seconds` the look-back kept in front of each request.
    pub fn open<P: AsRef<Path>>(
        paths: &[P],
        channel: ChannelSelection,
        buffer_seconds: f64,
        back_seconds: f64,
    ) -> Result<Self> {
        let paths = to_path_bufs(paths)?;
        let loader = format::select_loader(&paths);
        debug!("streaming {} as {:?}", paths[0].display(), loader.format());
        let source = loader.open(&paths)?;
        Self::from_source(source, channel, buffer_seconds, back_seconds)
    }

    /// Stream from an already opened source.
    ///
    /// A single channel beyond the available ones is clamped to the last
    /// channel.
    pub fn from_source(
        mut source: Box<dyn ContainerSource>,
        channel: ChannelSelection,
        buffer_seconds: f64,
        back_seconds: f64,
    ) -> Result<Self> {
        if !buffer_seconds.is_finite() || buffer_seconds <= 0.0 {
            return Err(DataError::InvalidParameter(format!(
                "buffer size must be positive, got {} s",
                buffer_seconds
            )));
        }
        if !back_seconds.is_finite() || back_seconds < 0.0 {
            return Err(DataError::InvalidParameter(format!(
                "back buffer size must not be negative, got {} s",
                back_seconds
            )));
        }

        let info = source.info();
        if info.channels == 0 {
            return Err(DataError::NoChannels);
        }
        let channel = match channel {
            ChannelSelection::Single(c) if c >= info.channels => {
                warn!(
                    "channel {} not available, using last channel {}",
                    c,
                    info.channels - 1
                );
                ChannelSelection::Single(info.channels - 1)
            }
            other => other,
        };

        let buffer_size = ((buffer_seconds * info.samplerate).round() as usize).max(1);
        let back_size =
            ((back_seconds * info.samplerate).round() as usize).min(buffer_size - 1);

        let initial = buffer_size.min(info.frames);
        let buffer = source.read_block(0, initial)?;
        debug!(
            "buffer of {} frames ({} back), initial fill 0..{}",
            buffer_size, back_size, initial
        );

        Ok(Self {
            unit: source.unit(),
            source: Some(source),
            info,
            channel,
            buffer,
            offset: 0,
            buffer_size,
            back_size,
            frames_fetched: initial,
            last_transition: None,
        })
    }

    /// Number of frames of the recording
    pub fn len(&self) -> usize {
        self.info.frames
    }

    pub fn is_empty(&self) -> bool {
        self.info.frames == 0
    }

    pub fn samplerate(&self) -> f64 {
        self.info.samplerate
    }

    /// Channels of the underlying recording, independent of the selection
    pub fn channels(&self) -> usize {
        self.info.channels
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Channel selection in effect, after clamping
    pub fn channel(&self) -> ChannelSelection {
        self.channel
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn back_size(&self) -> usize {
        self.back_size
    }

    /// Frame range currently held in memory
    pub fn buffered(&self) -> Range<usize> {
        self.offset..self.offset + self.buffer.nrows()
    }

    /// Total number of frames read from the source so far
    pub fn frames_fetched(&self) -> usize {
        self.frames_fetched
    }

    /// Transition of the most recent request, `None` before the first one
    pub fn last_transition(&self) -> Option<Transition> {
        self.last_transition
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Release the source. Later reads fail with [`DataError::StreamClosed`].
    pub fn close(&mut self) {
        if self.source.take().is_some() {
            debug!("closing stream after {} fetched frames", self.frames_fetched);
            self.buffer = Array2::zeros((0, self.info.channels));
            self.offset = 0;
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.source.is_none() {
            return Err(DataError::StreamClosed);
        }
        Ok(())
    }

    /// Make `request` resident
    fn fetch(&mut self, request: Range<usize>) -> Result<()> {
        let buffered = self.buffered();
        let window = target_window(
            request.clone(),
            self.buffer_size,
            self.back_size,
            self.info.frames,
        );
        let transition = Transition::classify(buffered.clone(), request, window.clone());
        self.last_transition = Some(transition);
        if transition == Transition::Resident {
            return Ok(());
        }

        let source = self.source.as_mut().ok_or(DataError::StreamClosed)?;
        let channels = self.info.channels;
        let mut buffer = Array2::zeros((window.len(), channels));

        let lo = window.start.max(buffered.start);
        let hi = window.end.min(buffered.end);
        let gaps = if lo < hi {
            buffer
                .slice_mut(s![lo - window.start..hi - window.start, ..])
                .assign(&self.buffer.slice(s![lo - buffered.start..hi - buffered.start, ..]));
            [window.start..lo, hi..window.end]
        } else {
            [window.clone(), window.end..window.end]
        };

        let mut fetched = 0;
        for gap in gaps.into_iter().filter(|g| !g.is_empty()) {
            let block = source.read_block(gap.start, gap.len())?;
            if block.dim() != (gap.len(), channels) {
                return Err(DataError::ShortRead {
                    start: gap.start,
                    requested: gap.len(),
                    got: block.nrows(),
                });
            }
            buffer
                .slice_mut(s![gap.start - window.start..gap.end - window.start, ..])
                .assign(&block);
            fetched += gap.len();
        }

        debug!(
            "{:?}: buffer {}..{} -> {}..{}, fetched {} frames",
            transition, buffered.start, buffered.end, window.start, window.end, fetched
        );
        self.frames_fetched += fetched;
        self.buffer = buffer;
        self.offset = window.start;
        Ok(())
    }

    /// Buffered rows for `start..stop`, all channels
    fn rows(&mut self, start: usize, stop: usize) -> Result<ArrayView2<'_, f64>> {
        self.ensure_open()?;
        let frames = self.info.frames;
        if start < stop && start >= frames {
            return Err(DataError::FrameOutOfRange {
                index: start,
                frames,
            });
        }
        let stop = stop.min(frames);
        if start >= stop {
            return Ok(self.buffer.slice(s![0..0, ..]));
        }
        self.fetch(start..stop)?;
        let offset = self.offset;
        Ok(self.buffer.slice(s![start - offset..stop - offset, ..]))
    }

    /// Frames `start..stop` of the selected channels.
    ///
    /// `stop` beyond the end is truncated, an empty range yields no frames.
    pub fn read(&mut self, start: usize, stop: usize) -> Result<Samples> {
        let channel = self.channel;
        let rows = self.rows(start, stop)?;
        Ok(match channel {
            ChannelSelection::All => Samples::MultiChannel(rows.to_owned()),
            ChannelSelection::Single(c) => Samples::SingleChannel(rows.column(c).to_owned()),
        })
    }

    /// One frame of the selected channels
    pub fn read_one(&mut self, index: usize) -> Result<Array1<f64>> {
        self.ensure_open()?;
        if index >= self.info.frames {
            return Err(DataError::FrameOutOfRange {
                index,
                frames: self.info.frames,
            });
        }
        let channel = self.channel;
        let rows = self.rows(index, index + 1)?;
        Ok(match channel {
            ChannelSelection::All => rows.row(0).to_owned(),
            ChannelSelection::Single(c) => Array1::from_elem(1, rows[[0, c]]),
        })
    }

    /// Frames `start..stop` of one channel of a stream over all channels.
    ///
    /// # Errors
    ///
    /// [`DataError::ChannelAxisCollapsed`] if the stream was opened for a
    /// single channel.
    pub fn read_channel(&mut self, start: usize, stop: usize, channel: usize) -> Result<Array1<f64>> {
        if let ChannelSelection::Single(fixed) = self.channel {
            return Err(DataError::ChannelAxisCollapsed { channel: fixed });
        }
        if channel >= self.info.channels {
            return Err(DataError::ChannelOutOfRange {
                channel,
                channels: self.info.channels,
            });
        }
        let rows = self.rows(start, stop)?;
        Ok(rows.column(channel).to_owned())
    }

    /// Consecutive blocks of `size` frames (at least one) with their start
    /// frame. Reversing the iterator yields the same blocks last to first.
    pub fn chunks(&mut self, size: usize) -> Chunks<'_> {
        let back = self.info.frames;
        Chunks {
            series: self,
            size: size.max(1),
            front: 0,
            back,
        }
    }

    /// Every frame of the selected channels, in either direction
    pub fn frames(&mut self) -> Frames<'_> {
        let back = self.info.frames;
        Frames {
            series: self,
            front: 0,
            back,
        }
    }
}

impl Drop for BufferedTimeSeries {
    fn drop(&mut self) {
        self.close();
    }
}

/// Iterator returned by [`BufferedTimeSeries::chunks`]
pub struct Chunks<'a> {
    series: &'a mut BufferedTimeSeries,
    size: usize,
    front: usize,
    back: usize,
}

impl Iterator for Chunks<'_> {
    type Item = Result<(usize, Samples)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let start = self.front;
        let stop = (start + self.size).min(self.back);
        self.front = stop;
        Some(self.series.read(start, stop).map(|samples| (start, samples)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.back.saturating_sub(self.front) + self.size - 1) / self.size;
        (n, Some(n))
    }
}

impl DoubleEndedIterator for Chunks<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        // keep block boundaries aligned with the forward direction
        let start = self.front + (self.back - self.front - 1) / self.size * self.size;
        let stop = self.back;
        self.back = start;
        Some(self.series.read(start, stop).map(|samples| (start, samples)))
    }
}

/// Iterator returned by [`BufferedTimeSeries::frames`]
pub struct Frames<'a> {
    series: &'a mut BufferedTimeSeries,
    front: usize,
    back: usize,
}

impl Iterator for Frames<'_> {
    type Item = Result<Array1<f64>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let index = self.front;
        self.front += 1;
        Some(self.series.read_one(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back.saturating_sub(self.front);
        (n, Some(n))
    }
}

impl DoubleEndedIterator for Frames<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(self.series.read_one(self.back))
    }
}
