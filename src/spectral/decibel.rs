// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ephys project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Conversion between power and decibel

use ndarray::{Array, ArrayBase, Data, Dimension};

/// Default reference power
pub const DEFAULT_REF_POWER: f64 = 1.0;

/// Powers below this value have no decibel representation by default
pub const DEFAULT_MIN_POWER: f64 = 1e-20;

/// Largest non-NaN value, `None` if there is none
pub fn max_power<S, D>(power: &ArrayBase<S, D>) -> Option<f64>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    power
        .iter()
        .copied()
        .filter(|p| !p.is_nan())
        .fold(None, |max: Option<f64>, p| Some(max.map_or(p, |m| m.max(p))))
}

/// `10 * log10(power / ref_power)` for every element.
///
/// With `ref_power` set to `None` the maximum power is the reference. Powers
/// below `min_power` become NaN.
pub fn to_decibel<S, D>(power: &ArrayBase<S, D>, ref_power: Option<f64>, min_power: f64) -> Array<f64, D>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let reference = ref_power
        .or_else(|| max_power(power))
        .unwrap_or(DEFAULT_REF_POWER);
    power.mapv(|p| {
        if p < min_power || p.is_nan() {
            f64::NAN
        } else {
            10.0 * (p / reference).log10()
        }
    })
}

/// `ref_power * 10^(decibel / 10)` for every element, the inverse of
/// [`to_decibel`]
pub fn to_power<S, D>(decibel: &ArrayBase<S, D>, ref_power: f64) -> Array<f64, D>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    decibel.mapv(|db| ref_power * 10f64.powf(0.1 * db))
}
