// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use ndarray::{s, Array2};
use rust_ephys::acquisition::pickle::{PickledRecording, RawData};
use rust_ephys::acquisition::{self, BufferedTimeSeries};
use rust_ephys::{ChannelSelection, ErrorKind, Samples};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const RATE: u32 = 1000;
const FRAMES: usize = 10_000;

/// Two-channel ramp with exactly representable values
fn write_ramp_wav(path: &Path) {
    let spec = WavSpec {
        channels: 2,
        sample_rate: RATE,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for i in 0..FRAMES {
        writer.write_sample(i as f32 / 16384.0).unwrap();
        writer.write_sample(-(i as f32) / 16384.0).unwrap();
    }
    writer.finalize().unwrap();
}

fn sweep_forward(stream: &mut BufferedTimeSeries, size: usize) -> Result<Array2<f64>> {
    let mut out = Array2::zeros((stream.len(), stream.channels()));
    for chunk in stream.chunks(size) {
        let (start, samples) = chunk?;
        let data = samples.into_multi_channel();
        out.slice_mut(s![start..start + data.nrows(), ..]).assign(&data);
    }
    Ok(out)
}

fn sweep_backward(stream: &mut BufferedTimeSeries, size: usize) -> Result<Array2<f64>> {
    let mut out = Array2::zeros((stream.len(), stream.channels()));
    let mut previous = stream.len();
    for chunk in stream.chunks(size).rev() {
        let (start, samples) = chunk?;
        let data = samples.into_multi_channel();
        assert_eq!(start + data.nrows(), previous);
        previous = start;
        out.slice_mut(s![start..start + data.nrows(), ..]).assign(&data);
    }
    assert_eq!(previous, 0);
    Ok(out)
}

#[test]
fn test_forward_and_backward_sweeps_match_whole_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("ramp.wav");
    write_ramp_wav(&path);

    let whole = acquisition::load_file(&path, ChannelSelection::All)?
        .samples
        .into_multi_channel();

    let mut stream = acquisition::open_stream(&[&path], ChannelSelection::All, 2.0, 1.0)?;
    assert_eq!(stream.len(), FRAMES);
    assert_eq!(stream.buffer_size(), 2000);
    assert_eq!(stream.back_size(), 1000);

    assert_eq!(sweep_forward(&mut stream, 100)?, whole);
    // every frame is read exactly once going forward
    assert_eq!(stream.frames_fetched(), FRAMES);

    assert_eq!(sweep_backward(&mut stream, 100)?, whole);
    // the last buffer is reused going back
    assert_eq!(stream.frames_fetched(), FRAMES + 8000);
    Ok(())
}

#[test]
fn test_one_second_sweeps_of_mono_ramp() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("mono.wav");
    let spec = WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&path, spec)?;
    for i in 0..FRAMES {
        writer.write_sample(i as f32 / 16384.0)?;
    }
    writer.finalize()?;

    let whole = acquisition::load_file(&path, ChannelSelection::All)?
        .samples
        .into_multi_channel();
    assert_eq!(whole.dim(), (FRAMES, 1));

    let mut stream = acquisition::open_stream(&[&path], ChannelSelection::All, 2.0, 1.0)?;
    assert_eq!(sweep_forward(&mut stream, 1000)?, whole);
    assert_eq!(sweep_backward(&mut stream, 1000)?, whole);

    for (start, stop) in [(8500, 9700), (120, 130), (5000, 7000), (9999, 10000), (0, 1)] {
        let data = stream.read(start, stop)?.into_multi_channel();
        assert_eq!(data, whole.slice(s![start..stop, ..]));
    }
    Ok(())
}

#[test]
fn test_single_channel_stream_matches_load() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("ramp.wav");
    write_ramp_wav(&path);

    let whole = acquisition::load_file(&path, ChannelSelection::Single(1))?;
    let mut stream = BufferedTimeSeries::open(&[&path], ChannelSelection::Single(1), 0.5, 0.1)?;
    assert_eq!(stream.unit(), "a.u.");

    let samples = stream.read(4321, 4400)?;
    let expected = whole.samples.channel(0)?.slice(s![4321..4400]).to_owned();
    assert_eq!(samples, Samples::SingleChannel(expected));

    let values: Vec<f64> = stream.frames().rev().take(3).map(|f| f.unwrap()[0]).collect();
    assert_eq!(values, vec![
        -9999.0 / 16384.0,
        -9998.0 / 16384.0,
        -9997.0 / 16384.0
    ]);
    Ok(())
}

#[test]
fn test_relacs_stream_seeks_in_trace_files() -> Result<()> {
    let dir = tempdir()?;
    let mut header = String::new();
    for n in 1..=3 {
        header.push_str(&format!("# unit{}: mV\n# sampling rate{}: 500Hz\n", n, n));
        let mut bytes: Vec<u8> = (0..1000)
            .flat_map(|i| ((i * n) as f32).to_ne_bytes())
            .collect();
        bytes.extend_from_slice(&[0u8; 8]);
        fs::write(dir.path().join(format!("trace-{}.raw", n)), bytes)?;
    }
    fs::write(dir.path().join("stimuli.dat"), header)?;

    let whole = acquisition::load_file(dir.path(), ChannelSelection::All)?;
    let mut stream = acquisition::open_stream(&[dir.path()], ChannelSelection::All, 0.2, 0.02)?;
    assert_eq!(stream.channels(), 3);
    assert_eq!(stream.samplerate(), 500.0);
    assert_eq!(stream.unit(), "mV");
    assert_eq!(
        sweep_backward(&mut stream, 37)?,
        whole.samples.into_multi_channel()
    );
    assert_eq!(stream.read_channel(10, 12, 2)?.to_vec(), vec![30.0, 33.0]);
    Ok(())
}

#[test]
fn test_pickle_stream() -> Result<()> {
    let dir = tempdir()?;
    let path: PathBuf = dir.path().join("recording.pkl");
    let blob = PickledRecording {
        time_trace: (0..50).map(|i| i as f64 * 0.5).collect(),
        raw_data: RawData::Flat((0..50).map(f64::from).collect()),
    };
    serde_pickle::to_writer(&mut File::create(&path)?, &blob, serde_pickle::SerOptions::new())?;

    let mut stream = acquisition::open_stream(&[&path], ChannelSelection::Single(0), 0.01, 0.0)?;
    assert_eq!(stream.samplerate(), 2000.0);
    assert_eq!(stream.buffer_size(), 20);
    assert_eq!(stream.read_one(42)?.to_vec(), vec![42.0]);
    Ok(())
}

#[test]
fn test_closed_stream_reports_state_error() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("ramp.wav");
    write_ramp_wav(&path);

    let mut stream = acquisition::open_stream(&[&path], ChannelSelection::All, 1.0, 0.0)?;
    stream.read(0, 10)?;
    stream.close();
    let err = stream.read(0, 10).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    Ok(())
}
