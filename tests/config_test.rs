// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use rust_ephys::config::{self, Config, LoaderConfig, SpectralConfig};
use rust_ephys::spectral::{Detrend, FrequencyResolution, WindowFunction};
use rust_ephys::ChannelSelection;
use std::fs;
use std::path::Path;
use std::sync::Once;
use tempfile::tempdir;

static INIT: Once = Once::new();

// Setup logger for tests
fn setup() {
    INIT.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

#[test]
fn test_config_load_and_save() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("ephys.yaml");

    let config = Config {
        loader: LoaderConfig {
            channel: 1,
            buffer_seconds: 4.0,
            back_seconds: 0.5,
        },
        spectral: SpectralConfig {
            freq_resolutions: vec![0.25, 1.0],
            window: WindowFunction::Blackman,
            detrend: Detrend::Linear,
            ref_power: None,
            ..SpectralConfig::default()
        },
    };
    config.save_to_file(&config_path)?;

    let loaded_config = Config::from_file(&config_path)?;
    assert_eq!(loaded_config, config);
    assert_eq!(loaded_config.loader.channel_selection(), ChannelSelection::Single(1));
    assert_eq!(
        loaded_config.spectral.resolution(),
        FrequencyResolution::Multiple(vec![0.25, 1.0])
    );

    // Test loading default config for non-existent file
    let non_existent_path = temp_dir.path().join("non_existent.yaml");
    let default_config = Config::from_file(&non_existent_path)?;
    assert!(non_existent_path.exists());
    assert_eq!(default_config, Config::default());
    assert_eq!(default_config.loader.channel_selection(), ChannelSelection::All);
    assert_eq!(default_config.spectral.resolution(), FrequencyResolution::Single(0.5));
    Ok(())
}

#[test]
fn test_partial_config_uses_defaults() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("ephys.yaml");
    fs::write(&config_path, "spectral:\n  window: rectangular\n  min_nfft: 64\n")?;

    let config = Config::from_file(&config_path)?;
    assert_eq!(config.spectral.window, WindowFunction::Rectangular);
    assert_eq!(config.spectral.min_nfft, 64);
    assert_eq!(config.spectral.overlap_frac, 0.5);
    assert_eq!(config.loader, LoaderConfig::default());

    let options = config.spectral.psd_options();
    assert_eq!(options.min_nfft, 64);
    assert!(options.scale_by_freq);
    Ok(())
}

#[test]
fn test_config_validation_error_creates_sample_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("ephys.yaml");

    // overlap fraction out of range
    fs::write(&config_path, "spectral:\n  overlap_frac: 1.5\n")?;
    let result = Config::from_file(&config_path);
    assert!(result.is_err(), "Config loading should have failed");

    let sample_path = config_path.with_extension("sample.yaml");
    assert!(Path::new(&sample_path).exists(), "Sample config file was not created");
    let sample_config = Config::from_file(&sample_path)?;
    assert_eq!(sample_config, Config::default());
    Ok(())
}

#[test]
fn test_unknown_keys_and_bad_enums_are_rejected() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("ephys.yaml");

    fs::write(&config_path, "loader:\n  chanel: 2\n")?;
    assert!(Config::from_file(&config_path).is_err());

    fs::write(&config_path, "spectral:\n  window: hamming\n")?;
    assert!(Config::from_file(&config_path).is_err());

    fs::write(&config_path, "spectral:\n  freq_resolutions: []\n")?;
    assert!(Config::from_file(&config_path).is_err());
    Ok(())
}

#[test]
fn test_specific_rules_reject_long_back_buffer() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("ephys.yaml");
    fs::write(
        &config_path,
        "loader:\n  buffer_seconds: 2.0\n  back_seconds: 3.0\n",
    )?;
    let err = Config::from_file(&config_path).unwrap_err();
    assert!(err.to_string().contains("shorter"));
    Ok(())
}

#[test]
fn test_layered_config_nearest_wins() -> Result<()> {
    setup();
    let root = tempdir()?;
    let session = root.path().join("2019").join("2019-05-01-aa");
    fs::create_dir_all(&session)?;
    let data = session.join("trace-1.raw");

    fs::write(
        root.path().join("2019").join("ephys.yaml"),
        "loader:\n  channel: 3\n  buffer_seconds: 20.0\nspectral:\n  freq_resolutions: [2.0]\n",
    )?;
    fs::write(session.join("ephys.yaml"), "loader:\n  channel: 0\n")?;

    let (config, files) = Config::load_files("ephys.yaml", &data, 3)?;
    assert_eq!(
        files,
        vec![
            root.path().join("2019").join("ephys.yaml"),
            session.join("ephys.yaml")
        ]
    );
    assert_eq!(config.loader.channel, 0);
    assert_eq!(config.loader.buffer_seconds, 20.0);
    assert_eq!(config.spectral.freq_resolutions, vec![2.0]);

    // only the nearest level
    let (config, files) = Config::load_files("ephys.yaml", &data, 1)?;
    assert_eq!(files.len(), 1);
    assert_eq!(config.loader.buffer_seconds, 10.0);
    Ok(())
}

#[test]
fn test_layered_config_without_files_is_default() -> Result<()> {
    let root = tempdir()?;
    let (config, files) =
        Config::load_files("no-such-config.yaml", root.path().join("song.wav"), 3)?;
    assert!(files.is_empty());
    assert_eq!(config, Config::default());
    Ok(())
}

#[test]
fn test_config_schema_output() -> Result<()> {
    config::output_config_schema()?;
    Ok(())
}
