/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::value::private::Sealed;
use crate::{AtomicValue, CellStorage, CellStrategy, NumericValue};

/// Cell storage in one atomic word, lock free.
pub struct AtomicCell<V> {
    bits: AtomicU64,
    _value: PhantomData<fn() -> V>,
}

impl<V: AtomicValue> AtomicCell<V> {
    pub(crate) fn new(value: V) -> Self {
        AtomicCell {
            bits: AtomicU64::new(value.to_cell_bits()),
            _value: PhantomData,
        }
    }

    pub(crate) fn get(&self) -> V {
        V::from_cell_bits(self.bits.load(Ordering::Acquire))
    }

    pub(crate) fn update(&self, value: V) {
        self.bits.store(value.to_cell_bits(), Ordering::Release);
    }

    /// The changer may run more than once if other writers race with it.
    pub(crate) fn apply<F>(&self, mut changer: F)
    where
        F: FnMut(&mut V),
    {
        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            let mut value = V::from_cell_bits(current);
            changer(&mut value);
            match self.bits.compare_exchange_weak(
                current,
                value.to_cell_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

impl<V: NumericValue> AtomicCell<V> {
    pub(crate) fn increment_by(&self, step: V) {
        self.apply(|v| *v = v.add_step(step));
    }
}

impl<V> Sealed for AtomicCell<V> {}

impl<V: AtomicValue> CellStorage<V> for AtomicCell<V> {
    const STRATEGY: CellStrategy = CellStrategy::AtomicNumeric;

    fn new(value: V) -> Self {
        AtomicCell::new(value)
    }

    fn get(&self) -> V {
        AtomicCell::get(self)
    }

    fn update(&self, value: V) {
        AtomicCell::update(self, value)
    }

    fn apply<F>(&self, changer: F)
    where
        F: FnMut(&mut V) + Send + 'static,
    {
        AtomicCell::apply(self, changer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer() {
        let cell = AtomicCell::new(5i64);
        cell.increment_by(3);
        assert_eq!(cell.get(), 8);
        cell.update(-1);
        assert_eq!(cell.get(), -1);
        cell.apply(|v| *v *= 10);
        assert_eq!(cell.get(), -10);
    }

    #[test]
    fn wrapping() {
        let cell = AtomicCell::new(i32::MAX);
        cell.increment_by(1);
        assert_eq!(cell.get(), i32::MIN);
    }

    #[test]
    fn float() {
        let cell = AtomicCell::new(0.5f64);
        cell.increment_by(0.25);
        assert_eq!(cell.get(), 0.75);
    }

    #[test]
    fn boolean() {
        let cell = AtomicCell::new(false);
        cell.apply(|v| *v = !*v);
        assert!(cell.get());
    }
}
