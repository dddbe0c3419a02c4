/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use yaml_rust::Yaml;

use crate::Bucketer;

fn normalize_key(raw: &str) -> String {
    raw.to_lowercase().replace('-', "_")
}

fn as_f64(v: &Yaml) -> anyhow::Result<f64> {
    match v {
        Yaml::String(s) => Ok(f64::from_str(s)?),
        Yaml::Integer(i) => Ok(*i as f64),
        Yaml::Real(s) => Ok(f64::from_str(s)?),
        _ => Err(anyhow!(
            "yaml value type for 'f64' should be 'string', 'integer' or 'real'"
        )),
    }
}

fn as_usize(v: &Yaml) -> anyhow::Result<usize> {
    match v {
        Yaml::String(s) => Ok(usize::from_str(s)?),
        Yaml::Integer(i) => Ok(usize::try_from(*i)?),
        _ => Err(anyhow!(
            "yaml value type for 'usize' should be 'string' or 'integer'"
        )),
    }
}

fn as_bounds(v: &Yaml) -> anyhow::Result<Vec<f64>> {
    let Yaml::Array(seq) = v else {
        return Err(anyhow!("yaml value type for 'custom bounds' should be 'seq'"));
    };
    let mut bounds = Vec::with_capacity(seq.len());
    for (i, v) in seq.iter().enumerate() {
        let b = as_f64(v).context(format!("invalid bound value for element #{i}"))?;
        bounds.push(b);
    }
    Ok(bounds)
}

/// Parse a bucketer, either a preset name or a map of parameters:
///
/// ```yaml
/// bucketer: default            # or none
/// bucketer: { powers_of: 2, scale: 0.001, max_value: 60 }
/// bucketer: { width: 10, max_buckets: 80 }
/// bucketer: { growth_factor: 1.5, scale_factor: 1, max_buckets: 40 }
/// bucketer: { custom: [0, 1, 5, 25, 125] }
/// ```
pub fn as_bucketer(value: &Yaml) -> anyhow::Result<Arc<Bucketer>> {
    match value {
        Yaml::String(s) => match normalize_key(s).as_str() {
            "default" => Ok(Bucketer::default_instance()),
            "none" => Ok(Bucketer::none()),
            _ => Err(anyhow!("unknown bucketer preset {s}")),
        },
        Yaml::Hash(map) => {
            let mut width = 0.0;
            let mut growth_factor = 0.0;
            let mut scale_factor = 1.0;
            let mut max_buckets = None;
            let mut max_value = u32::MAX as f64;
            let mut powers_of = None;
            let mut custom = None;

            for (k, v) in map.iter() {
                let Yaml::String(k) = k else {
                    return Err(anyhow!("key of bucketer map should be string"));
                };
                match normalize_key(k).as_str() {
                    "width" | "fixed_width" => {
                        width = as_f64(v).context(format!("invalid f64 value for key {k}"))?;
                    }
                    "growth_factor" => {
                        growth_factor =
                            as_f64(v).context(format!("invalid f64 value for key {k}"))?;
                    }
                    "scale" | "scale_factor" => {
                        scale_factor =
                            as_f64(v).context(format!("invalid f64 value for key {k}"))?;
                    }
                    "buckets" | "max_buckets" => {
                        let n = as_usize(v).context(format!("invalid usize value for key {k}"))?;
                        max_buckets = Some(n);
                    }
                    "max_value" => {
                        max_value = as_f64(v).context(format!("invalid f64 value for key {k}"))?;
                    }
                    "powers_of" => {
                        let g = as_f64(v).context(format!("invalid f64 value for key {k}"))?;
                        powers_of = Some(g);
                    }
                    "custom" | "bounds" => {
                        custom = Some(as_bounds(v).context(format!("invalid value for key {k}"))?);
                    }
                    _ => return Err(anyhow!("invalid key {k}")),
                }
            }

            let bucketer = if let Some(bounds) = custom {
                Bucketer::custom(&bounds)?
            } else if let Some(g) = powers_of {
                Bucketer::scaled_powers_of(g, scale_factor, max_value)?
            } else {
                let Some(max_buckets) = max_buckets else {
                    return Err(anyhow!("max_buckets is required for linear/exponential buckets"));
                };
                Bucketer::linear_exponential(width, growth_factor, scale_factor, max_buckets)?
            };
            Ok(bucketer)
        }
        _ => Err(anyhow!(
            "yaml value type for 'bucketer' should be 'string' or 'map'"
        )),
    }
}
