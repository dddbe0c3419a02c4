/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use foldhash::fast::FixedState;

use super::{CellView, MetricCore, MetricId, MetricInfo};
use crate::{CellValue, FieldError, FieldTuple, NumericValue, StoredCell};

/// A metric whose cells keep their values until overwritten or cleared.
pub struct StoredMetric<V: CellValue> {
    core: MetricCore,
    default_value: V,
    cells: RwLock<HashMap<FieldTuple, Arc<StoredCell<V>>, FixedState>>,
}

impl<V: CellValue + Default> StoredMetric<V> {
    pub fn new(info: MetricInfo) -> Self {
        StoredMetric::with_default(info, V::default())
    }
}

impl<V: CellValue> StoredMetric<V> {
    /// New cells start from a copy of `default_value`.
    pub fn with_default(info: MetricInfo, default_value: V) -> Self {
        StoredMetric {
            core: MetricCore::new(info),
            default_value,
            cells: RwLock::new(HashMap::with_hasher(FixedState::default())),
        }
    }

    pub fn id(&self) -> MetricId {
        self.core.id()
    }

    pub fn info(&self) -> &MetricInfo {
        self.core.info()
    }

    fn existing_cell(&self, fields: &FieldTuple) -> Option<Arc<StoredCell<V>>> {
        self.cells.read().unwrap().get(fields).cloned()
    }

    pub(crate) fn cell(&self, fields: &FieldTuple) -> Result<Arc<StoredCell<V>>, FieldError> {
        if let Some(cell) = self.existing_cell(fields) {
            return Ok(cell);
        }
        self.core.info().verify_fields(fields)?;

        let mut cells = self.cells.write().unwrap();
        let cell = cells.entry(fields.clone()).or_insert_with(|| {
            Arc::new(StoredCell::new(
                self.default_value.clone(),
                self.core.cell_reset_timestamp(),
            ))
        });
        Ok(cell.clone())
    }

    /// Current value of the cell, `None` if it was never written.
    pub fn get(&self, fields: &FieldTuple) -> Option<V> {
        self.existing_cell(fields).map(|c| c.get())
    }

    pub fn set(&self, fields: &FieldTuple, value: V) -> Result<(), FieldError> {
        if let Some(cell) = self.existing_cell(fields) {
            cell.update(value);
            return Ok(());
        }
        self.core.info().verify_fields(fields)?;

        let mut cells = self.cells.write().unwrap();
        match cells.get(fields) {
            Some(cell) => cell.update(value),
            None => {
                let cell = StoredCell::new(value, self.core.cell_reset_timestamp());
                cells.insert(fields.clone(), Arc::new(cell));
            }
        }
        Ok(())
    }

    pub fn apply<F>(&self, fields: &FieldTuple, changer: F) -> Result<(), FieldError>
    where
        F: FnMut(&mut V) + Send + 'static,
    {
        self.cell(fields)?.apply(changer);
        Ok(())
    }

    /// Drops all cells.
    pub fn clear(&self) {
        let mut cells = self.cells.write().unwrap();
        cells.clear();
        self.core.invalidate_reset_timestamp();
    }

    /// Drops one cell, returns whether it existed.
    pub fn clear_cell(&self, fields: &FieldTuple) -> bool {
        self.cells.write().unwrap().remove(fields).is_some()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.read().unwrap().len()
    }

    pub fn keys(&self) -> Vec<FieldTuple> {
        self.cells.read().unwrap().keys().cloned().collect()
    }

    /// Reset timestamp of one cell.
    pub fn reset_timestamp(&self, fields: &FieldTuple) -> Option<i64> {
        self.existing_cell(fields).map(|c| c.reset_timestamp())
    }

    /// Visits every cell with a copy of its value.
    ///
    /// The map lock is not held while `visit` runs.
    pub fn for_each_cell<F>(&self, mut visit: F)
    where
        F: FnMut(CellView<'_, V>),
    {
        let cells: Vec<(FieldTuple, Arc<StoredCell<V>>)> = self
            .cells
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (fields, cell) in &cells {
            visit(CellView {
                fields,
                value: cell.get(),
                reset_timestamp: cell.reset_timestamp(),
                timestamp: None,
            });
        }
    }
}

impl<V: NumericValue> StoredMetric<V> {
    pub fn increment_by(&self, fields: &FieldTuple, step: V) -> Result<(), FieldError> {
        self.cell(fields)?.increment_by(step);
        Ok(())
    }

    pub fn increment(&self, fields: &FieldTuple) -> Result<(), FieldError> {
        self.increment_by(fields, V::ONE)
    }

    pub fn decrement(&self, fields: &FieldTuple) -> Result<(), FieldError> {
        let cell = self.cell(fields)?;
        cell.apply(|v: &mut V| *v = v.sub_step(V::ONE));
        Ok(())
    }
}
