/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    BucketId, Bucketer, BucketerError, DecodeError, Distribution, Exemplar, ExemplarAttachment,
};

fn default_scale_factor() -> f64 {
    1.0
}

/// Wire form of a [`Bucketer`].
///
/// `num_finite_buckets == 0` marks the custom form, which only carries
/// `lower_bounds`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BucketerMessage {
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub growth_factor: f64,
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
    #[serde(default)]
    pub num_finite_buckets: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lower_bounds: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExemplarAttachmentMessage {
    pub type_url: String,
    #[serde(default)]
    pub value: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExemplarMessage {
    pub value: f64,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<ExemplarAttachmentMessage>,
}

/// Wire form of a [`Distribution`].
///
/// Runs of empty buckets are encoded as a negative run length, 0 never
/// appears in `buckets`. Trailing empty buckets are not encoded.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionMessage {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub mean: f64,
    #[serde(default)]
    pub sum_of_squared_deviation: f64,
    #[serde(default)]
    pub overflow: i64,
    #[serde(default)]
    pub underflow: i64,
    #[serde(default)]
    pub bucketer: Option<BucketerMessage>,
    #[serde(default)]
    pub buckets: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exemplars: Vec<ExemplarMessage>,
}

impl Bucketer {
    pub fn to_message(&self) -> BucketerMessage {
        if self.is_custom() {
            BucketerMessage {
                width: 0.0,
                growth_factor: 0.0,
                scale_factor: 1.0,
                num_finite_buckets: 0,
                lower_bounds: self.bounds().to_vec(),
            }
        } else {
            BucketerMessage {
                width: self.width(),
                growth_factor: self.growth_factor(),
                scale_factor: self.scale_factor(),
                num_finite_buckets: self.num_finite_buckets() as u32,
                lower_bounds: Vec::new(),
            }
        }
    }

    pub fn from_message(msg: &BucketerMessage) -> Result<Arc<Bucketer>, BucketerError> {
        if !msg.lower_bounds.is_empty() {
            Bucketer::custom(&msg.lower_bounds)
        } else {
            Bucketer::linear_exponential(
                msg.width,
                msg.growth_factor,
                msg.scale_factor,
                msg.num_finite_buckets as usize,
            )
        }
    }
}

impl From<&Exemplar> for ExemplarMessage {
    fn from(e: &Exemplar) -> Self {
        ExemplarMessage {
            value: e.value,
            timestamp: e.timestamp_micros,
            attachments: e
                .attachments
                .iter()
                .map(|a| ExemplarAttachmentMessage {
                    type_url: a.type_url.clone(),
                    value: a.value.clone(),
                })
                .collect(),
        }
    }
}

impl From<&ExemplarMessage> for Exemplar {
    fn from(m: &ExemplarMessage) -> Self {
        Exemplar {
            value: m.value,
            timestamp_micros: m.timestamp,
            attachments: m
                .attachments
                .iter()
                .map(|a| ExemplarAttachment {
                    type_url: a.type_url.clone(),
                    value: a.value.clone(),
                })
                .collect(),
        }
    }
}

impl Distribution {
    pub fn to_message(&self) -> DistributionMessage {
        let mut buckets = Vec::with_capacity(self.buckets().len());
        let mut zeroes = 0i64;
        let mut total = self.overflow() + self.underflow();
        for c in self.buckets() {
            total += *c;
            if *c == 0 {
                zeroes += 1;
            } else {
                if zeroes > 0 {
                    buckets.push(-zeroes);
                    zeroes = 0;
                }
                buckets.push(*c);
            }
        }
        debug_assert_eq!(total, self.count());

        DistributionMessage {
            count: self.count(),
            mean: self.mean(),
            sum_of_squared_deviation: self.sum_of_squared_deviation(),
            overflow: self.overflow(),
            underflow: self.underflow(),
            bucketer: Some(self.bucketer().to_message()),
            buckets,
            exemplars: self.exemplars().map(ExemplarMessage::from).collect(),
        }
    }

    pub fn from_message(msg: &DistributionMessage) -> Result<Self, DecodeError> {
        let bucketer = msg.bucketer.as_ref().ok_or(DecodeError::MissingBucketer)?;
        let bucketer = Bucketer::from_message(bucketer)?;
        if msg.overflow < 0 {
            return Err(DecodeError::NegativeCount(msg.overflow, "overflow"));
        }
        if msg.underflow < 0 {
            return Err(DecodeError::NegativeCount(msg.underflow, "underflow"));
        }

        let mut num_buckets = 0usize;
        for (i, v) in msg.buckets.iter().enumerate() {
            match *v {
                0 => return Err(DecodeError::ZeroInBuckets(i)),
                v if v > 0 => num_buckets += 1,
                v => num_buckets = num_buckets.saturating_add(v.unsigned_abs() as usize),
            }
        }
        if num_buckets > bucketer.num_finite_buckets() {
            return Err(DecodeError::TooManyBuckets(
                num_buckets,
                bucketer.num_finite_buckets(),
            ));
        }

        let mut buckets = Vec::with_capacity(num_buckets);
        let mut total = msg.overflow.saturating_add(msg.underflow);
        for v in &msg.buckets {
            if *v > 0 {
                buckets.push(*v);
                total = total.saturating_add(*v);
            } else {
                buckets.resize(buckets.len() + v.unsigned_abs() as usize, 0);
            }
        }
        if msg.count != total {
            return Err(DecodeError::CountMismatch {
                count: msg.count,
                sum: total,
            });
        }

        let mut exemplars: Vec<Option<Exemplar>> = Vec::new();
        let mut last_value = f64::MIN;
        for m in &msg.exemplars {
            if m.value < last_value {
                return Err(DecodeError::UnorderedExemplar(m.value));
            }
            last_value = m.value;
            // exemplars in the under or overflow bucket are dropped
            let BucketId::Finite(i) = bucketer.find_bucket(m.value) else {
                continue;
            };
            if i >= num_buckets {
                return Err(DecodeError::ExemplarOutOfRange(m.value));
            }
            if exemplars.get(i).is_some_and(|e| e.is_some()) {
                return Err(DecodeError::DuplicateExemplar(i));
            }
            // value order keeps bucket ids non-decreasing
            if i >= exemplars.len() {
                exemplars.resize(i + 1, None);
            }
            exemplars[i] = Some(Exemplar::from(m));
        }

        Ok(Distribution::from_parts(
            bucketer,
            msg.count,
            msg.mean,
            msg.sum_of_squared_deviation,
            msg.overflow,
            msg.underflow,
            buckets,
            exemplars,
        ))
    }
}
