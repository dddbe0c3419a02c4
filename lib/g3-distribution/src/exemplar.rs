/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

/// Opaque typed payload carried along with an exemplar, e.g. a trace context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExemplarAttachment {
    pub type_url: String,
    pub value: Vec<u8>,
}

/// A sample kept as a representative of its histogram bucket.
#[derive(Clone, Debug, PartialEq)]
pub struct Exemplar {
    pub value: f64,
    /// Microseconds since the unix epoch, 0 if unknown.
    pub timestamp_micros: i64,
    pub attachments: Vec<ExemplarAttachment>,
}

impl Exemplar {
    pub fn new(value: f64, timestamp_micros: i64) -> Self {
        Exemplar {
            value,
            timestamp_micros,
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, type_url: impl Into<String>, value: Vec<u8>) -> Self {
        self.attachments.push(ExemplarAttachment {
            type_url: type_url.into(),
            value,
        });
        self
    }

    /// Whether `self` should take the place of `current` in a bucket.
    ///
    /// An exemplar without timestamp is older than any timestamped one.
    pub(crate) fn supersedes(&self, current: Option<&Exemplar>) -> bool {
        let Some(current) = current else {
            return true;
        };
        if self.timestamp_micros == 0 {
            return false;
        }
        current.timestamp_micros == 0 || current.timestamp_micros < self.timestamp_micros
    }
}
