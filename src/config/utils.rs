// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation, merging and schema management.

use anyhow::{Context, Result};
use log::debug;

use super::Config;

const SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line. It outputs the full JSON schema for the configuration
/// to stdout, formatted for readability.
///
/// # Example
///
/// ```bash
/// ./rust_ephys --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Validate a parsed configuration file against the embedded JSON schema
pub fn validate_against_schema(value: &serde_yml::Value) -> Result<()> {
    let json_value =
        serde_json::to_value(value).context("Failed to convert YAML to JSON for validation")?;

    let schema: serde_json::Value = serde_json::from_str(SCHEMA).with_context(|| {
        debug!("JSON schema string: {}", SCHEMA);
        "Failed to parse JSON schema"
    })?;

    let validator = jsonschema::draft202012::options()
        .should_validate_formats(true)
        .build(&schema)?;

    if let Err(error) = validator.validate(&json_value) {
        anyhow::bail!("{}", error);
    }
    Ok(())
}

/// Merge `overlay` into `base`.
///
/// Mappings are merged key by key, recursively. Any other value of
/// `overlay`, sequences included, replaces the value in `base`.
pub fn merge_values(base: &mut serde_yml::Value, overlay: serde_yml::Value) {
    match (base, overlay) {
        (serde_yml::Value::Mapping(base), serde_yml::Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Validates the configuration against rules that aren't covered by the JSON schema.
///
/// # Validation Rules
///
/// - **Buffer sizes**: the look-back has to be shorter than the buffer
/// - **Resolutions**: at least one, all positive and finite
/// - **Decibel conversion**: positive minimum and reference power
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    let loader = &config.loader;
    if !(loader.buffer_seconds.is_finite() && loader.buffer_seconds > 0.0) {
        anyhow::bail!("Invalid buffer size: {} s", loader.buffer_seconds);
    }
    if loader.back_seconds < 0.0 || loader.back_seconds >= loader.buffer_seconds {
        anyhow::bail!(
            "Back buffer of {} s must be shorter than the buffer of {} s",
            loader.back_seconds,
            loader.buffer_seconds
        );
    }

    let spectral = &config.spectral;
    if spectral.freq_resolutions.is_empty() {
        anyhow::bail!("At least one frequency resolution is required");
    }
    if let Some(r) = spectral
        .freq_resolutions
        .iter()
        .find(|r| !(r.is_finite() && **r > 0.0))
    {
        anyhow::bail!("Invalid frequency resolution: {} Hz", r);
    }
    if !(0.0..1.0).contains(&spectral.overlap_frac) {
        anyhow::bail!("Invalid overlap fraction: {}", spectral.overlap_frac);
    }
    if spectral.min_power <= 0.0 {
        anyhow::bail!("Invalid minimum power: {}", spectral.min_power);
    }
    if let Some(reference) = spectral.ref_power {
        if reference <= 0.0 {
            anyhow::bail!("Invalid reference power: {}", reference);
        }
    }

    Ok(())
}
