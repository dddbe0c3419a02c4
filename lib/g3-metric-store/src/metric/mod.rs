/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::LazyLock;

use chrono::Utc;

use crate::{Field, FieldError, FieldTuple};

mod stored;
pub use stored::StoredMetric;

mod event;
pub use event::EventMetric;

static ATOMIC_METRIC_ID: AtomicU64 = AtomicU64::new(1); // start from 1

static PROCESS_START_MICROS: LazyLock<i64> = LazyLock::new(now_micros);

pub(crate) fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

/// Time the metric library was first used in this process, the default
/// reset timestamp of non-cumulative cells.
pub fn process_start_micros() -> i64 {
    *PROCESS_START_MICROS
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId(u64);

impl MetricId {
    pub(crate) fn new_unique() -> Self {
        MetricId(ATOMIC_METRIC_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Declaration of a metric: name, field layout and whether its cells
/// accumulate since their creation.
#[derive(Clone, Debug)]
pub struct MetricInfo {
    name: String,
    fields: Vec<Field>,
    cumulative: bool,
}

impl MetricInfo {
    pub fn new(name: &str) -> Self {
        MetricInfo {
            name: name.to_string(),
            fields: Vec::new(),
            cumulative: false,
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn cumulative(mut self) -> Self {
        self.cumulative = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_cumulative(&self) -> bool {
        self.cumulative
    }

    pub fn verify_fields(&self, fields: &FieldTuple) -> Result<(), FieldError> {
        if fields.len() != self.fields.len() {
            return Err(FieldError::Arity {
                metric: self.name.clone(),
                expected: self.fields.len(),
                actual: fields.len(),
            });
        }
        for (declared, value) in self.fields.iter().zip(fields.iter()) {
            if declared.kind() != value.kind() {
                return Err(FieldError::Kind {
                    metric: self.name.clone(),
                    field: declared.name().to_string(),
                    expected: declared.kind(),
                    actual: value.kind(),
                });
            }
        }
        Ok(())
    }
}

const INVALID_RESET_TIMESTAMP: i64 = i64::MIN;

/// Per metric state shared by the metric kinds.
pub(crate) struct MetricCore {
    id: MetricId,
    info: MetricInfo,
    new_cell_reset: AtomicI64,
}

impl MetricCore {
    pub(crate) fn new(info: MetricInfo) -> Self {
        MetricCore {
            id: MetricId::new_unique(),
            info,
            new_cell_reset: AtomicI64::new(process_start_micros()),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> MetricId {
        self.id
    }

    #[inline]
    pub(crate) fn info(&self) -> &MetricInfo {
        &self.info
    }

    pub(crate) fn name(&self) -> &str {
        &self.info.name
    }

    /// Reset timestamp for a cell created now.
    pub(crate) fn cell_reset_timestamp(&self) -> i64 {
        if self.info.cumulative {
            return now_micros();
        }
        let ts = self.new_cell_reset.load(Ordering::Acquire);
        if ts != INVALID_RESET_TIMESTAMP {
            return ts;
        }
        let now = now_micros();
        match self.new_cell_reset.compare_exchange(
            INVALID_RESET_TIMESTAMP,
            now,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => now,
            Err(ts) => ts,
        }
    }

    /// Cells created after this call start from a fresh timestamp.
    pub(crate) fn invalidate_reset_timestamp(&self) {
        self.new_cell_reset
            .store(INVALID_RESET_TIMESTAMP, Ordering::Release);
    }
}

/// Read-only view of one cell, valid during a single visit.
pub struct CellView<'a, V> {
    pub fields: &'a FieldTuple,
    pub value: V,
    /// Microseconds since the unix epoch.
    pub reset_timestamp: i64,
    /// Explicit sample time, if the value carries one.
    pub timestamp: Option<i64>,
}
