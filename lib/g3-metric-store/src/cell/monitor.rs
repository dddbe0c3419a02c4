/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Mutex;

use crate::value::private::Sealed;
use crate::{CellStorage, CellStrategy};

/// Cell storage behind a mutex, values are cloned in and out.
pub struct MonitorCell<V> {
    value: Mutex<V>,
}

impl<V: Clone> MonitorCell<V> {
    pub(crate) fn new(value: V) -> Self {
        MonitorCell {
            value: Mutex::new(value),
        }
    }

    pub(crate) fn get(&self) -> V {
        self.value.lock().unwrap().clone()
    }

    pub(crate) fn update(&self, value: V) {
        *self.value.lock().unwrap() = value;
    }

    pub(crate) fn apply<F>(&self, mut changer: F)
    where
        F: FnMut(&mut V),
    {
        let mut value = self.value.lock().unwrap();
        changer(&mut value);
    }
}

impl<V> Sealed for MonitorCell<V> {}

impl<V: Clone + Send + 'static> CellStorage<V> for MonitorCell<V> {
    const STRATEGY: CellStrategy = CellStrategy::ExclusiveMonitor;

    fn new(value: V) -> Self {
        MonitorCell::new(value)
    }

    fn get(&self) -> V {
        MonitorCell::get(self)
    }

    fn update(&self, value: V) {
        MonitorCell::update(self, value)
    }

    fn apply<F>(&self, changer: F)
    where
        F: FnMut(&mut V) + Send + 'static,
    {
        MonitorCell::apply(self, changer)
    }
}
