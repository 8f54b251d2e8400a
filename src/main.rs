// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the recording inspector
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use rust_ephys::acquisition::{self, Recording};
use rust_ephys::config::{self, Config, DEFAULT_CONFIG_NAME, DEFAULT_MAX_LEVEL};
use rust_ephys::spectral::{multi_resolution, to_decibel, PowerSpectrum};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

/// Load a recording and report its power spectrum
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Recording to load: a relacs directory, trace files, a pickle or a WAV file
    #[arg(required_unless_present = "show_config_schema")]
    paths: Vec<PathBuf>,

    /// Configuration file (default: layered ephys.yaml files)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Channel to analyse, negative for all channels
    #[arg(long, allow_hyphen_values = true)]
    channel: Option<i64>,

    /// Frequency resolution in Hz, may be given several times
    #[arg(short, long)]
    resolution: Vec<f64>,

    /// Buffer size of the streamed sweep in seconds
    #[arg(long)]
    buffer: Option<f64>,

    /// Look-back of the streamed sweep in seconds
    #[arg(long)]
    back: Option<f64>,

    /// Sweep the recording forward and backward through a buffered stream
    #[arg(long)]
    sweep: bool,

    /// Chunk length of the sweep in seconds
    #[arg(long, default_value_t = 1.0)]
    chunk: f64,

    /// Output file for results (JSON)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    show_config_schema: bool,
}

#[derive(Debug, Serialize)]
struct SpectrumSummary {
    channel: usize,
    resolution: f64,
    nfft: usize,
    noverlap: usize,
    peak_frequency: f64,
    peak_power_db: f64,
}

#[derive(Debug, Serialize)]
struct SweepSummary {
    forward_chunks: usize,
    backward_chunks: usize,
    frames_fetched: usize,
}

#[derive(Debug, Serialize)]
struct Summary {
    paths: Vec<PathBuf>,
    samplerate: f64,
    unit: String,
    frames: usize,
    channels: usize,
    duration: f64,
    spectra: Vec<SpectrumSummary>,
    sweep: Option<SweepSummary>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => {
            let (config, files) =
                Config::load_files(DEFAULT_CONFIG_NAME, &args.paths[0], DEFAULT_MAX_LEVEL)?;
            debug!("Configuration read from {:?}", files);
            config
        }
    };
    let resolutions = (!args.resolution.is_empty()).then(|| args.resolution.clone());
    config.apply_args(args.channel, resolutions, args.buffer, args.back);
    config::utils::validate_specific_rules(&config)?;
    Ok(config)
}

fn summarize(
    channel: usize,
    spectrum: &PowerSpectrum,
    config: &Config,
) -> SpectrumSummary {
    let decibel = to_decibel(
        &spectrum.power,
        config.spectral.ref_power,
        config.spectral.min_power,
    );
    let peak = spectrum
        .power
        .iter()
        .enumerate()
        .fold(0, |best, (i, &p)| if p > spectrum.power[best] { i } else { best });
    SpectrumSummary {
        channel,
        resolution: spectrum.resolution(),
        nfft: spectrum.nfft,
        noverlap: spectrum.noverlap,
        peak_frequency: spectrum.frequencies.get(peak).copied().unwrap_or(0.0),
        peak_power_db: decibel.get(peak).copied().unwrap_or(f64::NAN),
    }
}

fn analyse(recording: &Recording, config: &Config) -> Result<Vec<SpectrumSummary>> {
    let options = config.spectral.psd_options();
    let resolution = config.spectral.resolution();
    let mut summaries = Vec::new();
    for channel in 0..recording.samples.channels() {
        let data = recording.samples.channel(channel)?;
        let spectra = multi_resolution(&data, recording.samplerate, &resolution, &options)
            .with_context(|| format!("Failed to compute power spectrum of channel {}", channel))?;
        for spectrum in spectra.spectra() {
            let summary = summarize(channel, spectrum, config);
            println!(
                "channel {}: nfft={} peak at {:.2} Hz ({:.1} dB)",
                channel, summary.nfft, summary.peak_frequency, summary.peak_power_db
            );
            summaries.push(summary);
        }
    }
    Ok(summaries)
}

fn run_sweep(args: &Args, config: &Config, recording: &Recording) -> Result<SweepSummary> {
    let mut stream = acquisition::open_stream(
        &args.paths,
        config.loader.channel_selection(),
        config.loader.buffer_seconds,
        config.loader.back_seconds,
    )?;
    let size = ((args.chunk * stream.samplerate()).round() as usize).max(1);

    let mut forward_chunks = 0;
    for chunk in stream.chunks(size) {
        let (start, samples) = chunk?;
        if samples.frames() == 0 || start >= recording.samples.frames() {
            anyhow::bail!("Unexpected chunk at frame {}", start);
        }
        forward_chunks += 1;
    }
    let mut backward_chunks = 0;
    for chunk in stream.chunks(size).rev() {
        chunk?;
        backward_chunks += 1;
    }
    info!(
        "Swept {} chunks forward and {} backward, {} frames fetched",
        forward_chunks,
        backward_chunks,
        stream.frames_fetched()
    );
    let summary = SweepSummary {
        forward_chunks,
        backward_chunks,
        frames_fetched: stream.frames_fetched(),
    };
    stream.close();
    Ok(summary)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    let config = load_config(&args)?;
    let recording = acquisition::load(&args.paths, config.loader.channel_selection())
        .with_context(|| format!("Failed to load {:?}", args.paths))?;

    println!("Recording: {}", args.paths[0].display());
    println!("  Sample rate: {} Hz", recording.samplerate);
    println!("  Channels: {}", recording.samples.channels());
    println!("  Frames: {}", recording.samples.frames());
    println!("  Duration: {:.3} s", recording.duration());
    println!("  Unit: {}", recording.unit);

    let spectra = analyse(&recording, &config)?;
    let sweep = if args.sweep {
        let summary = run_sweep(&args, &config, &recording)?;
        println!(
            "Sweep: {} chunks forward, {} backward, {} frames fetched",
            summary.forward_chunks, summary.backward_chunks, summary.frames_fetched
        );
        Some(summary)
    } else {
        None
    };

    if let Some(output) = &args.output {
        let summary = Summary {
            paths: args.paths.clone(),
            samplerate: recording.samplerate,
            unit: recording.unit.clone(),
            frames: recording.samples.frames(),
            channels: recording.samples.channels(),
            duration: recording.duration(),
            spectra,
            sweep,
        };
        let file = File::create(output)
            .with_context(|| format!("Failed to create output file {:?}", output))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &summary)
            .with_context(|| format!("Failed to write results to {:?}", output))?;
        info!("Results written to {}", output.display());
    }

    Ok(())
}
