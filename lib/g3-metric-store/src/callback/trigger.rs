/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use log::warn;

use super::graph::{self, REGISTRATION};
use super::scope::{CallbackScope, ScopeMember};
use super::{CallbackMetric, ExecutionState};
use crate::{CellValue, MetricId, TriggerError};

static ATOMIC_TRIGGER_ID: AtomicU64 = AtomicU64::new(1); // start from 1

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerId(u64);

impl TriggerId {
    fn new_unique() -> Self {
        TriggerId(ATOMIC_TRIGGER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

type TriggerFn = Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

pub(crate) struct TriggerInner {
    id: TriggerId,
    callback: TriggerFn,
    metrics: Arc<[MetricId]>,
    scope: ArcSwapOption<CallbackScope>,
}

impl TriggerInner {
    #[inline]
    pub(crate) fn id(&self) -> TriggerId {
        self.id
    }

    pub(crate) fn metrics(&self) -> &[MetricId] {
        &self.metrics
    }

    pub(crate) fn scope(&self) -> Option<Arc<CallbackScope>> {
        self.scope.load_full()
    }

    pub(crate) fn set_scope(&self, scope: Option<Arc<CallbackScope>>) {
        self.scope.store(scope);
    }

    /// Runs the callback with writes opened to the owned metrics only.
    pub(crate) fn execute(&self, state: &ExecutionState) {
        state.allow(Some(self.metrics.clone()));
        match panic::catch_unwind(AssertUnwindSafe(|| (self.callback)())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("callback trigger {} failed: {e:?}", self.id.0),
            Err(payload) => warn!(
                "callback trigger {} panicked: {}",
                self.id.0,
                panic_message(payload.as_ref())
            ),
        }
        state.allow(None);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Handle of a registered trigger.
///
/// Dropping the handle keeps the trigger registered, call
/// [`CallbackTrigger::deregister`] to remove it.
pub struct CallbackTrigger {
    inner: Arc<TriggerInner>,
}

impl CallbackTrigger {
    pub fn id(&self) -> TriggerId {
        self.inner.id
    }

    pub fn is_registered(&self) -> bool {
        REGISTRATION.read_recursive().contains_trigger(self.inner.id)
    }

    /// Removes the trigger, the metrics it owned stop reporting values.
    /// Returns false if it was already removed.
    pub fn deregister(&self) -> bool {
        REGISTRATION.write().remove_trigger(self.inner.id)
    }
}

/// Collects the metrics a new trigger will own.
///
/// Triggers must not be registered from inside a trigger callback, the
/// registration lock is held by the collecting thread at that time.
#[derive(Default)]
pub struct TriggerBuilder {
    metrics: Vec<(MetricId, Weak<dyn ScopeMember>)>,
}

impl TriggerBuilder {
    pub fn new() -> Self {
        TriggerBuilder::default()
    }

    pub fn metric<V: CellValue>(mut self, metric: &Arc<CallbackMetric<V>>) -> Self {
        let id = metric.id();
        if !self.metrics.iter().any(|(m, _)| *m == id) {
            let member: Arc<dyn ScopeMember> = metric.clone();
            self.metrics.push((id, Arc::downgrade(&member)));
        }
        self
    }

    pub fn register<F>(self, callback: F) -> Result<CallbackTrigger, TriggerError>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        if self.metrics.is_empty() {
            return Err(TriggerError::NoMetrics);
        }
        let metric_ids: Arc<[MetricId]> = self.metrics.iter().map(|(id, _)| *id).collect();
        let inner = Arc::new(TriggerInner {
            id: TriggerId::new_unique(),
            callback: Box::new(callback),
            metrics: metric_ids,
            scope: ArcSwapOption::empty(),
        });
        graph::register(inner.clone(), self.metrics);
        Ok(CallbackTrigger { inner })
    }
}
