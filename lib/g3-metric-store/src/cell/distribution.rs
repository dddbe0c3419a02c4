/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use arc_swap::ArcSwapOption;
use log::debug;

use g3_distribution::Distribution;

use crate::value::private::Sealed;
use crate::{CellStorage, CellStrategy};

pub(crate) type Changer = Box<dyn FnOnce(&mut Distribution) + Send>;

type Slots = Vec<Arc<ChangerSlot>>;

const SPINS_BEFORE_YIELD: usize = 64;

fn max_slots() -> usize {
    static MAX_SLOTS: OnceLock<usize> = OnceLock::new();
    *MAX_SLOTS.get_or_init(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

/// Holds at most one changer submitted while the cell was locked.
struct ChangerSlot {
    changer: AtomicPtr<Changer>,
}

impl ChangerSlot {
    fn new() -> Self {
        ChangerSlot {
            changer: AtomicPtr::new(ptr::null_mut()),
        }
    }

    fn offer(&self, changer: Box<Changer>) -> Result<(), Box<Changer>> {
        let raw = Box::into_raw(changer);
        match self.changer.compare_exchange(
            ptr::null_mut(),
            raw,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            // not published, still owned here
            Err(_) => Err(unsafe { Box::from_raw(raw) }),
        }
    }

    fn take(&self) -> Option<Box<Changer>> {
        let raw = self.changer.swap(ptr::null_mut(), Ordering::AcqRel);
        if raw.is_null() {
            None
        } else {
            Some(unsafe { Box::from_raw(raw) })
        }
    }
}

impl Drop for ChangerSlot {
    fn drop(&mut self) {
        drop(self.take());
    }
}

/// A distribution cell tuned for frequent recording and rare reading.
///
/// The live value is guarded by a spin lock. Writers that find the lock
/// held park their changer in a free slot and return at once, the next
/// lock holder runs the parked changers. Slots are added on demand, up to
/// one per available core.
pub struct DistributionCell {
    locked: AtomicBool,
    value: UnsafeCell<Distribution>,
    offset: AtomicUsize,
    slots: ArcSwapOption<Slots>,
    serial: Mutex<()>,
}

unsafe impl Sync for DistributionCell {}

struct SpinGuard<'a> {
    cell: &'a DistributionCell,
}

impl SpinGuard<'_> {
    fn value(&mut self) -> &mut Distribution {
        unsafe { &mut *self.cell.value.get() }
    }

    /// Runs parked changers up to the first empty slot.
    ///
    /// Returns whether more slots are wanted.
    fn flush(&mut self, slots: Option<&Slots>) -> bool {
        let Some(slots) = slots else {
            return max_slots() > 1;
        };
        for slot in slots {
            let Some(changer) = slot.take() else {
                return false;
            };
            (*changer)(self.value());
        }
        slots.len() < max_slots()
    }

    fn flush_all(&mut self) {
        if let Some(slots) = self.cell.slots.load_full() {
            for slot in slots.iter() {
                if let Some(changer) = slot.take() {
                    (*changer)(self.value());
                }
            }
        }
    }

    fn discard_all(&mut self) {
        if let Some(slots) = self.cell.slots.load_full() {
            for slot in slots.iter() {
                drop(slot.take());
            }
        }
    }

    fn reset_offset(&mut self) {
        self.cell.offset.store(0, Ordering::Relaxed);
    }
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.cell.locked.store(false, Ordering::Release);
    }
}

impl DistributionCell {
    pub(crate) fn new(value: Distribution) -> Self {
        DistributionCell {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
            offset: AtomicUsize::new(0),
            slots: ArcSwapOption::empty(),
            serial: Mutex::new(()),
        }
    }

    fn try_lock(&self) -> Option<SpinGuard<'_>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinGuard { cell: self })
    }

    fn lock(&self) -> SpinGuard<'_> {
        let mut spins = 0usize;
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            while self.locked.load(Ordering::Relaxed) {
                if spins < SPINS_BEFORE_YIELD {
                    spins += 1;
                    std::hint::spin_loop();
                } else {
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Guards no data, poisoning is ignored.
    fn serial_lock(&self) -> MutexGuard<'_, ()> {
        self.serial.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn submit(&self, changer: Changer) {
        if let Some(mut guard) = self.try_lock() {
            changer(guard.value());
            return;
        }

        let slots = self.slots.load_full();
        let mut changer = Box::new(changer);
        if let Some(slots) = &slots {
            while self.offset.load(Ordering::Relaxed) < slots.len() {
                let pos = self.offset.fetch_add(1, Ordering::Relaxed);
                let Some(slot) = slots.get(pos) else {
                    break;
                };
                match slot.offer(changer) {
                    Ok(()) => return,
                    Err(c) => changer = c,
                }
            }
        }

        let grow = match self.try_lock() {
            Some(guard) => Self::flush_and_apply(guard, slots.as_deref(), *changer),
            None => {
                // queue up here instead of spinning on the lock
                let _serial = self.serial_lock();
                let guard = self.lock();
                Self::flush_and_apply(guard, slots.as_deref(), *changer)
            }
        };
        if grow {
            self.grow_slots(slots);
        }
    }

    fn flush_and_apply(mut guard: SpinGuard<'_>, slots: Option<&Slots>, changer: Changer) -> bool {
        let grow = guard.flush(slots);
        changer(guard.value());
        guard.reset_offset();
        grow
    }

    fn grow_slots(&self, current: Option<Arc<Slots>>) {
        let len = current.as_ref().map_or(0, |s| s.len());
        let new_len = (if len == 0 { 2 } else { len * 2 }).min(max_slots());
        if new_len <= len {
            return;
        }

        let mut slots = Vec::with_capacity(new_len);
        if let Some(current) = &current {
            slots.extend(current.iter().cloned());
        }
        slots.resize_with(new_len, || Arc::new(ChangerSlot::new()));

        let prev = self.slots.compare_and_swap(&current, Some(Arc::new(slots)));
        let prev: &Option<Arc<Slots>> = &prev;
        let swapped = match (prev, &current) {
            (Some(p), Some(c)) => Arc::ptr_eq(p, c),
            (None, None) => true,
            _ => false,
        };
        if swapped {
            debug!("distribution cell changer slots grown from {len} to {new_len}");
        }
    }

    /// Snapshot including every changer submitted before this call.
    pub(crate) fn get(&self) -> Distribution {
        let mut guard = self.lock();
        guard.flush_all();
        let value = guard.value().clone();
        guard.reset_offset();
        value
    }

    /// Replaces the value, changers still parked are dropped.
    pub(crate) fn update(&self, value: Distribution) {
        let mut guard = self.lock();
        guard.discard_all();
        *guard.value() = value;
        guard.reset_offset();
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        Option::as_ref(&self.slots.load()).map_or(0, |s| s.len())
    }
}

impl Sealed for DistributionCell {}

impl CellStorage<Distribution> for DistributionCell {
    const STRATEGY: CellStrategy = CellStrategy::Distribution;

    fn new(value: Distribution) -> Self {
        DistributionCell::new(value)
    }

    fn get(&self) -> Distribution {
        DistributionCell::get(self)
    }

    fn update(&self, value: Distribution) {
        DistributionCell::update(self, value)
    }

    fn apply<F>(&self, mut changer: F)
    where
        F: FnMut(&mut Distribution) + Send + 'static,
    {
        self.submit(Box::new(move |d: &mut Distribution| changer(d)))
    }
}
