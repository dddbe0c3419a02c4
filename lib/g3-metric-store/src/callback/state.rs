/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};

use crate::MetricId;

/// Token of one scope refresh.
///
/// Only the refreshing thread may write, and only to the metrics of the
/// trigger it is running. Readers wait on it until the refresh is done.
pub(crate) struct ExecutionState {
    runner: ThreadId,
    allowed: Mutex<Option<Arc<[MetricId]>>>,
    ready: Mutex<bool>,
    ready_cond: Condvar,
}

impl ExecutionState {
    pub(crate) fn new() -> Self {
        ExecutionState {
            runner: thread::current().id(),
            allowed: Mutex::new(None),
            ready: Mutex::new(false),
            ready_cond: Condvar::new(),
        }
    }

    pub(crate) fn allow(&self, metrics: Option<Arc<[MetricId]>>) {
        *self.allowed.lock().unwrap() = metrics;
    }

    pub(crate) fn is_metric_updatable(&self, metric: MetricId) -> bool {
        if thread::current().id() != self.runner {
            return false;
        }
        self.allowed
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|m| m.contains(&metric))
    }

    pub(crate) fn mark_ready(&self) {
        *self.ready.lock().unwrap() = true;
        self.ready_cond.notify_all();
    }

    pub(crate) fn wait_ready(&self) {
        let mut ready = self.ready.lock().unwrap();
        while !*ready {
            ready = self.ready_cond.wait(ready).unwrap();
        }
    }
}
