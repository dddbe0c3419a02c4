/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use foldhash::fast::FixedState;

use crate::BucketerError;

/// Upper limit of finite buckets for any bucketer.
pub const MAX_FINITE_BUCKETS: usize = 5000;

/// Smallest growth factor accepted for exponential buckets.
pub const MIN_GROWTH_FACTOR: f64 = 1.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BucketId {
    Underflow,
    Finite(usize),
    Overflow,
}

impl BucketId {
    pub fn finite(&self) -> Option<usize> {
        match self {
            BucketId::Finite(i) => Some(*i),
            _ => None,
        }
    }
}

#[derive(PartialEq, Eq, Hash)]
enum BucketerKey {
    Parametric {
        width: u64,
        growth_factor: u64,
        scale_factor: u64,
        max_buckets: usize,
    },
    Custom(Box<[u64]>),
}

static BUCKETER_CACHE: Mutex<HashMap<BucketerKey, Arc<Bucketer>, FixedState>> =
    Mutex::new(HashMap::with_hasher(FixedState::with_seed(0)));

fn intern<F>(key: BucketerKey, build: F) -> Result<Arc<Bucketer>, BucketerError>
where
    F: FnOnce() -> Result<Bucketer, BucketerError>,
{
    if let Some(b) = BUCKETER_CACHE.lock().unwrap().get(&key) {
        return Ok(b.clone());
    }

    // build outside of the lock, a concurrent builder may win the insert
    let bucketer = Arc::new(build()?);
    let mut cache = BUCKETER_CACHE.lock().unwrap();
    Ok(cache.entry(key).or_insert(bucketer).clone())
}

/// Maps sample values to histogram buckets.
///
/// Bucketers are immutable and interned, equal parameters always give the
/// same `Arc`. Compare them with [`Arc::ptr_eq`].
#[derive(Debug)]
pub struct Bucketer {
    width: f64,
    growth_factor: f64,
    scale_factor: f64,
    num_finite_buckets: usize,
    bounds: Box<[f64]>,
    custom: bool,
}

impl Bucketer {
    /// Bucket `i` starts at `width * i + scale_factor * growth_factor ^ (i - 1)`,
    /// bucket 0 starts at 0.
    pub fn linear_exponential(
        width: f64,
        growth_factor: f64,
        scale_factor: f64,
        max_buckets: usize,
    ) -> Result<Arc<Bucketer>, BucketerError> {
        if max_buckets < 1 {
            return Err(BucketerError::TooFewBuckets(max_buckets));
        }
        if width < 0.0 {
            return Err(BucketerError::NegativeWidth(width));
        }
        if !width.is_finite() {
            return Err(BucketerError::InfiniteWidth(width));
        }
        if !(growth_factor == 0.0 || growth_factor >= MIN_GROWTH_FACTOR) {
            return Err(BucketerError::InvalidGrowthFactor(growth_factor));
        }
        if width == 0.0 && growth_factor == 0.0 {
            return Err(BucketerError::NoWidthOrGrowth);
        }
        if !(scale_factor > 0.0) {
            return Err(BucketerError::InvalidScaleFactor(scale_factor));
        }
        if width != 0.0 && scale_factor != 1.0 {
            return Err(BucketerError::ScaleWithFixedWidth);
        }

        // -0.0 and 0.0 are the same coefficient
        let width = width + 0.0;
        let max_buckets = max_buckets.min(MAX_FINITE_BUCKETS);
        let key = BucketerKey::Parametric {
            width: width.to_bits(),
            growth_factor: growth_factor.to_bits(),
            scale_factor: scale_factor.to_bits(),
            max_buckets,
        };
        intern(key, || {
            let mut bounds = Vec::with_capacity(max_buckets + 1);
            bounds.push(0.0);
            for i in 1..=max_buckets {
                let mut bound = width * i as f64;
                if growth_factor > 0.0 {
                    bound += scale_factor * growth_factor.powf((i - 1) as f64);
                }
                if !(bound > bounds[i - 1]) {
                    return Err(BucketerError::NotMonotonic(i));
                }
                bounds.push(bound);
            }
            Ok(Bucketer {
                width,
                growth_factor,
                scale_factor,
                num_finite_buckets: max_buckets,
                bounds: bounds.into_boxed_slice(),
                custom: false,
            })
        })
    }

    /// Buckets with explicit lower bounds.
    ///
    /// The last element is the exclusive upper bound of the last finite bucket.
    pub fn custom(bounds: &[f64]) -> Result<Arc<Bucketer>, BucketerError> {
        if bounds.len() < 2 {
            return Err(BucketerError::TooFewBounds(bounds.len()));
        }
        for (i, b) in bounds.iter().enumerate() {
            if !b.is_finite() {
                return Err(BucketerError::NonFiniteBound(i));
            }
            if i > 0 && !(*b > bounds[i - 1]) {
                return Err(BucketerError::UnsortedBounds(i));
            }
        }

        let key = BucketerKey::Custom(bounds.iter().map(|b| (b + 0.0).to_bits()).collect());
        intern(key, || {
            Ok(Bucketer {
                width: 0.0,
                growth_factor: 0.0,
                scale_factor: 1.0,
                num_finite_buckets: bounds.len() - 1,
                bounds: bounds.into(),
                custom: true,
            })
        })
    }

    pub fn fixed_width(width: f64, num_buckets: usize) -> Result<Arc<Bucketer>, BucketerError> {
        Bucketer::linear_exponential(width, 0.0, 1.0, num_buckets)
    }

    /// Exponential buckets starting from 1 and covering `[0, u32::MAX]`.
    pub fn powers_of(growth_factor: f64) -> Result<Arc<Bucketer>, BucketerError> {
        Bucketer::scaled_powers_of(growth_factor, 1.0, u32::MAX as f64)
    }

    /// Exponential buckets with the first bound at `scale_factor`, with enough
    /// buckets to hold `max_value`.
    pub fn scaled_powers_of(
        growth_factor: f64,
        scale_factor: f64,
        max_value: f64,
    ) -> Result<Arc<Bucketer>, BucketerError> {
        if !(growth_factor >= MIN_GROWTH_FACTOR) {
            return Err(BucketerError::InvalidGrowthFactor(growth_factor));
        }
        if !(scale_factor > 0.0) {
            return Err(BucketerError::InvalidScaleFactor(scale_factor));
        }
        if !(max_value >= 0.0) {
            return Err(BucketerError::NegativeMaxValue(max_value));
        }

        let n = 1.0 + ((max_value.ln() - scale_factor.ln()) / growth_factor.ln()).ceil();
        let num_buckets = if n.is_nan() || n < 1.0 {
            1
        } else if n > MAX_FINITE_BUCKETS as f64 {
            MAX_FINITE_BUCKETS
        } else {
            n as usize
        };
        Bucketer::linear_exponential(0.0, growth_factor, scale_factor, num_buckets)
    }

    /// Powers of 4, 17 finite buckets covering `[0, 2^32)`.
    pub fn default_instance() -> Arc<Bucketer> {
        static DEFAULT: OnceLock<Arc<Bucketer>> = OnceLock::new();
        DEFAULT
            .get_or_init(|| Bucketer::powers_of(4.0).expect("powers of 4 is a valid bucketer"))
            .clone()
    }

    /// A single bucket covering all non-negative values, only count and
    /// moments of such a distribution are meaningful.
    pub fn none() -> Arc<Bucketer> {
        static NONE: OnceLock<Arc<Bucketer>> = OnceLock::new();
        NONE.get_or_init(|| {
            Bucketer::fixed_width(f64::MAX, 1).expect("single max width bucket is valid")
        })
        .clone()
    }

    pub fn find_bucket(&self, value: f64) -> BucketId {
        if value < self.bounds[0] {
            return BucketId::Underflow;
        }
        // NaN goes to overflow
        if !(value < self.bounds[self.num_finite_buckets]) {
            return BucketId::Overflow;
        }
        // bounds[0] <= value < bounds[n], so the partition point lies in 1..=n
        let upper = self.bounds.partition_point(|b| *b <= value);
        BucketId::Finite(upper - 1)
    }

    /// Whether `value` falls into `bucket`, without a full lookup.
    pub fn holds(&self, bucket: BucketId, value: f64) -> bool {
        match bucket {
            BucketId::Underflow => value < self.bounds[0],
            BucketId::Overflow => !(value < self.bounds[self.num_finite_buckets]),
            BucketId::Finite(i) => {
                i < self.num_finite_buckets
                    && self.bounds[i] <= value
                    && value < self.bounds[i + 1]
            }
        }
    }

    #[inline]
    pub fn num_finite_buckets(&self) -> usize {
        self.num_finite_buckets
    }

    /// Inclusive lower bound of finite bucket `i`.
    pub fn bucket_min(&self, i: usize) -> f64 {
        self.bounds[i]
    }

    /// Exclusive upper bound of finite bucket `i`.
    pub fn bucket_max(&self, i: usize) -> f64 {
        self.bounds[i + 1]
    }

    /// All `num_finite_buckets + 1` boundaries.
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.width
    }

    #[inline]
    pub fn growth_factor(&self) -> f64 {
        self.growth_factor
    }

    #[inline]
    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    #[inline]
    pub fn is_custom(&self) -> bool {
        self.custom
    }
}

impl fmt::Display for Bucketer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.custom {
            write!(f, "Bucketer(bounds={:?})", self.bounds)
        } else {
            write!(
                f,
                "Bucketer(width={}, growth_factor={}, scale_factor={}, num_finite_buckets={})",
                self.width, self.growth_factor, self.scale_factor, self.num_finite_buckets
            )
        }
    }
}
