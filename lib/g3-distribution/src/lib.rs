/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod error;
pub use error::{BucketerError, DecodeError};

mod bucketer;
pub use bucketer::{BucketId, Bucketer, MAX_FINITE_BUCKETS, MIN_GROWTH_FACTOR};

mod exemplar;
pub use exemplar::{Exemplar, ExemplarAttachment};

mod distribution;
pub use distribution::Distribution;

mod wire;
pub use wire::{BucketerMessage, DistributionMessage, ExemplarAttachmentMessage, ExemplarMessage};

#[cfg(feature = "yaml")]
pub mod yaml;
