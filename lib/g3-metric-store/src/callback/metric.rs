/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::{ArcSwap, ArcSwapOption};
use foldhash::fast::FixedState;

use super::scope::{CallbackScope, ScopeMember};
use super::{CallbackTrigger, CollectSession, ExecutionState, TriggerBuilder};
use crate::metric::{MetricCore, now_micros};
use crate::{CallbackError, CellValue, CellView, FieldTuple, MetricId, MetricInfo};

struct CallbackCell<V> {
    fields: FieldTuple,
    value: V,
    reset_timestamp: i64,
    timestamp: Option<i64>,
}

struct PendingCells<V> {
    execution: Option<Arc<ExecutionState>>,
    cells: HashMap<FieldTuple, CallbackCell<V>, FixedState>,
}

/// A metric whose values are produced by triggers at collection time.
///
/// Values set during one refresh become visible together, after all
/// triggers of the scope have run, and are dropped at the next refresh.
pub struct CallbackMetric<V> {
    core: MetricCore,
    created: i64,
    pending: Mutex<PendingCells<V>>,
    published: ArcSwap<Vec<CallbackCell<V>>>,
    scope: ArcSwapOption<CallbackScope>,
}

impl<V: CellValue> CallbackMetric<V> {
    pub fn new(info: MetricInfo) -> Arc<Self> {
        Arc::new(CallbackMetric {
            core: MetricCore::new(info),
            created: now_micros(),
            pending: Mutex::new(PendingCells {
                execution: None,
                cells: HashMap::with_hasher(FixedState::default()),
            }),
            published: ArcSwap::from_pointee(Vec::new()),
            scope: ArcSwapOption::empty(),
        })
    }

    pub fn id(&self) -> MetricId {
        self.core.id()
    }

    pub fn info(&self) -> &MetricInfo {
        self.core.info()
    }

    /// Registers a trigger owning only this metric.
    pub fn create_trigger<F>(self: &Arc<Self>, callback: F) -> CallbackTrigger
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        match TriggerBuilder::new().metric(self).register(callback) {
            Ok(trigger) => trigger,
            Err(_) => unreachable!("trigger built with one metric"),
        }
    }

    pub fn has_triggers(&self) -> bool {
        self.scope.load().is_some()
    }

    /// Id of the scope the metric is refreshed in.
    pub fn scope_id(&self) -> Option<u64> {
        Option::as_ref(&self.scope.load()).map(|s| s.id())
    }

    /// Sets the value of one cell, only allowed from a trigger owning this
    /// metric while it runs.
    pub fn set(&self, fields: &FieldTuple, value: V) -> Result<(), CallbackError> {
        self.set_cell(fields, value, None, None)
    }

    pub fn set_with_timestamp(
        &self,
        fields: &FieldTuple,
        value: V,
        timestamp: i64,
    ) -> Result<(), CallbackError> {
        self.set_cell(fields, value, None, Some(timestamp))
    }

    /// Like [`Self::set_with_timestamp`], with the start time of a cumulative
    /// value given explicitly.
    pub fn set_with_timestamps(
        &self,
        fields: &FieldTuple,
        value: V,
        reset_timestamp: i64,
        timestamp: i64,
    ) -> Result<(), CallbackError> {
        self.set_cell(fields, value, Some(reset_timestamp), Some(timestamp))
    }

    fn set_cell(
        &self,
        fields: &FieldTuple,
        value: V,
        reset: Option<i64>,
        timestamp: Option<i64>,
    ) -> Result<(), CallbackError> {
        let mut pending = self.pending.lock().unwrap();
        let updatable = pending
            .execution
            .as_ref()
            .is_some_and(|s| s.is_metric_updatable(self.core.id()));
        if !updatable {
            return Err(CallbackError::NotInTrigger(self.core.name().to_string()));
        }
        self.core.info().verify_fields(fields)?;
        if pending.cells.contains_key(fields) {
            return Err(CallbackError::DuplicateCell {
                metric: self.core.name().to_string(),
                fields: fields.clone(),
            });
        }
        if let (Some(reset), Some(timestamp)) = (reset, timestamp)
            && timestamp < reset
        {
            return Err(CallbackError::TimestampBeforeReset { timestamp, reset });
        }

        pending.cells.insert(
            fields.clone(),
            CallbackCell {
                fields: fields.clone(),
                value,
                reset_timestamp: reset.unwrap_or(self.created),
                timestamp,
            },
        );
        Ok(())
    }

    /// Refreshes the scope of the metric and visits the values set by its
    /// triggers. Must not be called from a trigger.
    pub fn for_each_cell<F>(&self, visit: F)
    where
        F: FnMut(CellView<'_, V>),
    {
        let mut session = CollectSession::begin();
        session.visit(self, visit);
    }

    pub(crate) fn scope(&self) -> Option<Arc<CallbackScope>> {
        self.scope.load_full()
    }

    pub(crate) fn visit_published<F>(&self, mut visit: F)
    where
        F: FnMut(CellView<'_, V>),
    {
        let execution = self.pending.lock().unwrap().execution.clone();
        if let Some(state) = execution {
            state.wait_ready();
        }
        let published = self.published.load_full();
        for cell in published.iter() {
            visit(CellView {
                fields: &cell.fields,
                value: cell.value.clone(),
                reset_timestamp: cell.reset_timestamp,
                timestamp: cell.timestamp,
            });
        }
    }
}

impl<V: CellValue> ScopeMember for CallbackMetric<V> {
    fn reset(&self, state: Option<Arc<ExecutionState>>) {
        let mut pending = self.pending.lock().unwrap();
        pending.execution = state;
        pending.cells.clear();
        self.published.store(Arc::new(Vec::new()));
    }

    fn publish(&self) {
        let mut pending = self.pending.lock().unwrap();
        let cells: Vec<CallbackCell<V>> = pending.cells.drain().map(|(_, c)| c).collect();
        self.published.store(Arc::new(cells));
    }

    fn set_scope(&self, scope: Option<Arc<CallbackScope>>) {
        self.scope.store(scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Field, FieldKind};

    fn collect<V: CellValue>(m: &CallbackMetric<V>) -> Vec<(String, V, i64, Option<i64>)> {
        let mut out = Vec::new();
        m.for_each_cell(|v| {
            out.push((v.fields.to_string(), v.value, v.reset_timestamp, v.timestamp))
        });
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    #[test]
    fn created_at_construction() {
        let before = now_micros();
        let m = CallbackMetric::<u64>::new(MetricInfo::new("/test/callback/created"));
        let after = now_micros();
        assert!(before <= m.created && m.created <= after);
    }

    #[test]
    fn set_outside_trigger() {
        let m = CallbackMetric::<i64>::new(MetricInfo::new("/test/callback/outside"));
        assert_eq!(
            m.set(&FieldTuple::empty(), 1),
            Err(CallbackError::NotInTrigger("/test/callback/outside".to_string()))
        );
        assert!(!m.has_triggers());
        assert!(collect(&m).is_empty());
    }

    #[test]
    fn refresh_on_collect() {
        let m = CallbackMetric::<i64>::new(
            MetricInfo::new("/test/callback/queue").with_field(Field::new("queue", FieldKind::Str)),
        );
        let created = m.created;
        let mm = m.clone();
        let _t = m.create_trigger(move || {
            mm.set(&FieldTuple::from(["high"]), 3)?;
            mm.set_with_timestamp(&FieldTuple::from(["low"]), 7, 100)?;
            Ok(())
        });
        assert!(m.has_triggers());

        let cells = collect(&m);
        assert_eq!(
            cells,
            vec![
                ("(\"high\")".to_string(), 3, created, None),
                ("(\"low\")".to_string(), 7, created, Some(100)),
            ]
        );
        // triggers run again on the next collection
        assert_eq!(collect(&m).len(), 2);
    }

    #[test]
    fn rejected_writes() {
        let m = CallbackMetric::<f64>::new(
            MetricInfo::new("/test/callback/rejected")
                .with_field(Field::new("shard", FieldKind::Int)),
        );
        let errors = Arc::new(Mutex::new(Vec::new()));
        let (mm, e) = (m.clone(), errors.clone());
        let _t = m.create_trigger(move || {
            let f = FieldTuple::from([1]);
            let mut e = e.lock().unwrap();
            e.push(mm.set(&f, 1.0));
            e.push(mm.set(&f, 2.0));
            e.push(mm.set(&FieldTuple::from(["1"]), 1.0));
            e.push(mm.set_with_timestamps(&FieldTuple::from([2]), 1.0, 200, 100));
            e.push(mm.set_with_timestamps(&FieldTuple::from([3]), 1.0, 100, 200));
            Ok(())
        });

        let cells = collect(&m);
        assert_eq!(
            cells,
            vec![
                ("(1)".to_string(), 1.0, m.created, None),
                ("(3)".to_string(), 1.0, 100, Some(200)),
            ]
        );

        let errors = errors.lock().unwrap();
        assert_eq!(errors[0], Ok(()));
        assert_eq!(
            errors[1],
            Err(CallbackError::DuplicateCell {
                metric: "/test/callback/rejected".to_string(),
                fields: FieldTuple::from([1]),
            })
        );
        assert!(matches!(errors[2], Err(CallbackError::InvalidFields(_))));
        assert_eq!(
            errors[3],
            Err(CallbackError::TimestampBeforeReset {
                timestamp: 100,
                reset: 200
            })
        );
        assert_eq!(errors[4], Ok(()));
    }

    #[test]
    fn failing_trigger_keeps_set_values() {
        let m = CallbackMetric::<bool>::new(
            MetricInfo::new("/test/callback/failing").with_field(Field::new("ok", FieldKind::Bool)),
        );
        let mm = m.clone();
        let t = m.create_trigger(move || {
            mm.set(&FieldTuple::from([true]), true)?;
            anyhow::bail!("backend down")
        });
        let cells = collect(&m);
        assert_eq!(cells.len(), 1);
        assert!(cells[0].1);

        assert!(t.deregister());
        assert!(!m.has_triggers());
        assert!(collect(&m).is_empty());
    }
}
