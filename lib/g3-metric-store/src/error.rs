/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use thiserror::Error;

use crate::{FieldKind, FieldTuple};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("metric {metric} expects {expected} field values, got {actual}")]
    Arity {
        metric: String,
        expected: usize,
        actual: usize,
    },
    #[error("field {field} of metric {metric} expects {expected:?} value, got {actual:?}")]
    Kind {
        metric: String,
        field: String,
        expected: FieldKind,
        actual: FieldKind,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallbackError {
    #[error("metric {0} can only be set by its trigger while the scope is refreshing")]
    NotInTrigger(String),
    #[error(transparent)]
    InvalidFields(#[from] FieldError),
    #[error("cell {fields} of metric {metric} was set twice in one refresh")]
    DuplicateCell { metric: String, fields: FieldTuple },
    #[error("timestamp {timestamp} is older than the reset timestamp {reset}")]
    TimestampBeforeReset { timestamp: i64, reset: i64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("a trigger should own at least one metric")]
    NoMetrics,
}
