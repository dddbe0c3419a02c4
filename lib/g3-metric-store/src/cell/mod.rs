/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use g3_distribution::Distribution;

use crate::{CellStorage, CellStrategy, CellValue, NumericValue};

mod atomic;
pub use atomic::AtomicCell;

mod monitor;
pub use monitor::MonitorCell;

mod distribution;
pub use distribution::DistributionCell;

/// Storage of one metric cell.
///
/// The synchronization strategy is the storage type of `V`, checked
/// against `V::VALUE_TYPE` at compile time.
pub struct StoredCell<V: CellValue> {
    storage: V::Storage,
    reset_timestamp: i64,
}

impl<V: CellValue> StoredCell<V> {
    pub fn new(value: V, reset_timestamp: i64) -> Self {
        const {
            assert!(
                V::VALUE_TYPE
                    .strategy()
                    .same_as(<V::Storage as CellStorage<V>>::STRATEGY),
                "cell storage does not match the value type"
            )
        };
        StoredCell {
            storage: V::Storage::new(value),
            reset_timestamp,
        }
    }

    /// Start time of the value, in microseconds since the unix epoch.
    #[inline]
    pub fn reset_timestamp(&self) -> i64 {
        self.reset_timestamp
    }

    pub fn strategy(&self) -> CellStrategy {
        <V::Storage as CellStorage<V>>::STRATEGY
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> V {
        self.storage.get()
    }

    pub fn update(&self, value: V) {
        self.storage.update(value)
    }

    /// Modifies the value in place.
    ///
    /// On atomic cells the changer may run more than once, on distribution
    /// cells it may run later on another thread, but always before the next
    /// [`get`](Self::get) returns.
    pub fn apply<F>(&self, changer: F)
    where
        F: FnMut(&mut V) + Send + 'static,
    {
        self.storage.apply(changer)
    }
}

impl<V: NumericValue> StoredCell<V> {
    pub fn increment_by(&self, step: V) {
        self.storage.increment_by(step)
    }
}

impl StoredCell<Distribution> {
    pub(crate) fn record<F>(&self, changer: F)
    where
        F: FnOnce(&mut Distribution) + Send + 'static,
    {
        self.storage.submit(Box::new(changer))
    }
}
