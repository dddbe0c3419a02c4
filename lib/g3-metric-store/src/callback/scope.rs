/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};

use super::ExecutionState;
use super::trigger::TriggerInner;

static ATOMIC_SCOPE_ID: AtomicU64 = AtomicU64::new(1); // start from 1

/// The side of a callback metric seen by its scope.
pub(crate) trait ScopeMember: Send + Sync {
    /// Drops pending and published values and installs the new refresh
    /// token, `None` when the metric loses a trigger.
    fn reset(&self, state: Option<Arc<ExecutionState>>);

    /// Makes the values set during the current refresh visible.
    fn publish(&self);

    fn set_scope(&self, scope: Option<Arc<CallbackScope>>);
}

#[derive(Default)]
struct LatchState {
    running: bool,
    readers: usize,
    generation: u64,
}

/// Single flight latch with a designated runner.
///
/// The first reader finding the latch idle becomes the runner. Readers
/// arriving during the run wait for it, readers arriving while others still
/// read the last result share it.
#[derive(Default)]
struct RefreshLatch {
    state: Mutex<LatchState>,
    done: Condvar,
}

impl RefreshLatch {
    /// Registers a reader, returns true if the caller has to run the refresh.
    fn enter(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.running && state.readers == 0 {
            state.running = true;
            state.readers = 1;
            return true;
        }
        while state.running {
            state = self.done.wait(state).unwrap();
        }
        state.readers += 1;
        false
    }

    fn finish_run(&self) {
        let mut state = self.state.lock().unwrap();
        state.running = false;
        state.generation += 1;
        drop(state);
        self.done.notify_all();
    }

    fn exit(&self) {
        let mut state = self.state.lock().unwrap();
        state.readers = state.readers.saturating_sub(1);
    }

    #[cfg(test)]
    fn generation(&self) -> u64 {
        self.state.lock().unwrap().generation
    }
}

struct FinishOnDrop<'a>(&'a RefreshLatch);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.finish_run();
    }
}

/// Triggers and metrics connected through ownership, refreshed as a unit.
pub(crate) struct CallbackScope {
    id: u64,
    triggers: Vec<Arc<TriggerInner>>,
    metrics: Vec<Weak<dyn ScopeMember>>,
    latch: RefreshLatch,
}

impl CallbackScope {
    pub(crate) fn new(
        triggers: Vec<Arc<TriggerInner>>,
        metrics: Vec<Weak<dyn ScopeMember>>,
    ) -> Self {
        CallbackScope {
            id: ATOMIC_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            triggers,
            metrics,
            latch: RefreshLatch::default(),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn triggers(&self) -> &[Arc<TriggerInner>] {
        &self.triggers
    }

    /// Joins the scope as a reader, refreshing it first if no one else is
    /// reading or refreshing. Each call must be paired with [`Self::exit`].
    pub(crate) fn enter(&self) {
        if self.latch.enter() {
            let _finish = FinishOnDrop(&self.latch);
            self.refresh();
        }
    }

    pub(crate) fn exit(&self) {
        self.latch.exit();
    }

    fn refresh(&self) {
        let state = Arc::new(ExecutionState::new());
        let metrics: Vec<Arc<dyn ScopeMember>> =
            self.metrics.iter().filter_map(Weak::upgrade).collect();

        for m in &metrics {
            m.reset(Some(state.clone()));
        }
        for t in &self.triggers {
            t.execute(&state);
        }
        // values set before a trigger failed are kept
        for m in &metrics {
            m.publish();
        }
        state.mark_ready();
    }
}
