/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BucketerError {
    #[error("histograms must have at least 1 bucket: {0}")]
    TooFewBuckets(usize),
    #[error("growth factors, if given, must be at least 1.01: {0}")]
    InvalidGrowthFactor(f64),
    #[error("negative width coefficients are not allowed: {0}")]
    NegativeWidth(f64),
    #[error("bucket width must be finite: {0}")]
    InfiniteWidth(f64),
    #[error("must give a growth factor or a width")]
    NoWidthOrGrowth,
    #[error("scale factors of 0.0 or less are not allowed: {0}")]
    InvalidScaleFactor(f64),
    #[error("cannot give scale factor with fixed width")]
    ScaleWithFixedWidth,
    #[error("max value must not be negative: {0}")]
    NegativeMaxValue(f64),
    #[error("bucketing function not monotonic at bucket {0}")]
    NotMonotonic(usize),
    #[error("custom bounds need at least 2 elements, got {0}")]
    TooFewBounds(usize),
    #[error("custom bound {0} is not finite")]
    NonFiniteBound(usize),
    #[error("custom bounds not strictly increasing at index {0}")]
    UnsortedBounds(usize),
}

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("no bucketer in distribution message")]
    MissingBucketer,
    #[error("invalid bucketer: {0}")]
    InvalidBucketer(#[from] BucketerError),
    #[error("zero value at position {0} of the encoded buckets")]
    ZeroInBuckets(usize),
    #[error("{0} encoded buckets exceed the {1} finite buckets of the bucketer")]
    TooManyBuckets(usize, usize),
    #[error("negative count {0} in {1}")]
    NegativeCount(i64, &'static str),
    #[error("count ({count}) not equal to sum of buckets ({sum})")]
    CountMismatch { count: i64, sum: i64 },
    #[error("exemplar value {0} is not in value order")]
    UnorderedExemplar(f64),
    #[error("more than one exemplar maps to bucket {0}")]
    DuplicateExemplar(usize),
    #[error("exemplar value {0} is out of the finite bucket range")]
    ExemplarOutOfRange(f64),
}
