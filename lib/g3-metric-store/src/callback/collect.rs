/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use parking_lot::RwLockReadGuard;

use super::CallbackMetric;
use super::graph::{REGISTRATION, ScopeGraph};
use super::scope::CallbackScope;
use crate::{CellValue, CellView};

/// One pass of a collector over callback metrics.
///
/// Every scope is refreshed at most once per session, so metrics sharing a
/// scope are read from the same refresh. Triggers can not be registered or
/// removed while a session is alive, but the thread owning a session may
/// start nested ones.
pub struct CollectSession {
    _registration: RwLockReadGuard<'static, ScopeGraph>,
    entered: Vec<Arc<CallbackScope>>,
}

impl CollectSession {
    pub fn begin() -> Self {
        CollectSession {
            _registration: REGISTRATION.read_recursive(),
            entered: Vec::new(),
        }
    }

    /// Visits the current values of `metric`, refreshing its scope first if
    /// this session has not done so yet.
    pub fn visit<V, F>(&mut self, metric: &CallbackMetric<V>, visit: F)
    where
        V: CellValue,
        F: FnMut(CellView<'_, V>),
    {
        let Some(scope) = metric.scope() else {
            return;
        };
        if !self.entered.iter().any(|s| Arc::ptr_eq(s, &scope)) {
            scope.enter();
            self.entered.push(scope);
        }
        metric.visit_published(visit);
    }

    /// Number of scopes refreshed or joined by this session.
    pub fn scope_count(&self) -> usize {
        self.entered.len()
    }
}

impl Drop for CollectSession {
    fn drop(&mut self) {
        for scope in &self.entered {
            scope.exit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::{FieldTuple, MetricInfo, TriggerBuilder};

    #[test]
    fn one_refresh_per_session() {
        let hits = CallbackMetric::<i64>::new(MetricInfo::new("/test/collect/hits"));
        let misses = CallbackMetric::<i64>::new(MetricInfo::new("/test/collect/misses"));
        let runs = Arc::new(AtomicUsize::new(0));

        let (h, m, r) = (hits.clone(), misses.clone(), runs.clone());
        let _t = TriggerBuilder::new()
            .metric(&hits)
            .metric(&misses)
            .register(move || {
                let n = r.fetch_add(1, Ordering::Relaxed) as i64;
                h.set(&FieldTuple::empty(), n)?;
                m.set(&FieldTuple::empty(), n)?;
                Ok(())
            })
            .unwrap();

        let mut session = CollectSession::begin();
        let mut values = Vec::new();
        session.visit(&hits, |v| values.push(v.value));
        session.visit(&misses, |v| values.push(v.value));
        assert_eq!(session.scope_count(), 1);
        drop(session);
        assert_eq!(values, vec![0, 0]);
        assert_eq!(runs.load(Ordering::Relaxed), 1);

        hits.for_each_cell(|v| assert_eq!(v.value, 1));
        assert_eq!(runs.load(Ordering::Relaxed), 2);
    }
}
