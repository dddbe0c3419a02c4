/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod error;
pub use error::{CallbackError, FieldError, TriggerError};

mod field;
pub use field::{Field, FieldKind, FieldTuple, FieldValue};

mod value;
pub use value::{AtomicValue, CellStorage, CellStrategy, CellValue, NumericValue, ValueType};

mod cell;
pub use cell::{AtomicCell, DistributionCell, MonitorCell, StoredCell};

mod metric;
pub use metric::{
    CellView, EventMetric, MetricId, MetricInfo, StoredMetric, process_start_micros,
};

mod callback;
pub use callback::{CallbackMetric, CallbackTrigger, CollectSession, TriggerBuilder, TriggerId};
