/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use smol_str::SmolStr;

use g3_distribution::Distribution;

use crate::{AtomicCell, DistributionCell, MonitorCell};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    /// Any value with a lossless 64 bit encoding.
    Enum,
    String,
    /// Immutable opaque values.
    Message,
    Distribution,
}

/// How the cells of a value type are synchronized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellStrategy {
    AtomicNumeric,
    ExclusiveMonitor,
    Distribution,
}

impl ValueType {
    pub const fn strategy(self) -> CellStrategy {
        match self {
            ValueType::Bool | ValueType::Int | ValueType::Float | ValueType::Enum => {
                CellStrategy::AtomicNumeric
            }
            ValueType::String | ValueType::Message => CellStrategy::ExclusiveMonitor,
            ValueType::Distribution => CellStrategy::Distribution,
        }
    }
}

impl CellStrategy {
    pub(crate) const fn same_as(self, other: CellStrategy) -> bool {
        self as u8 == other as u8
    }
}

pub(crate) mod private {
    pub trait Sealed {}
}

/// Storage backend of one cell.
///
/// Implemented by [`AtomicCell`], [`MonitorCell`] and [`DistributionCell`]
/// only.
pub trait CellStorage<V>: Send + Sync + private::Sealed {
    const STRATEGY: CellStrategy;

    fn new(value: V) -> Self;

    fn get(&self) -> V;

    fn update(&self, value: V);

    fn apply<F>(&self, changer: F)
    where
        F: FnMut(&mut V) + Send + 'static;
}

/// A type that can be stored in metric cells.
///
/// `Storage` must match the strategy of `VALUE_TYPE`, a mismatch is
/// rejected when the first cell of the type is compiled in:
///
/// * `Bool`, `Int`, `Float`, `Enum`: [`AtomicCell<Self>`], which needs
///   [`AtomicValue`]
/// * `String`, `Message`: [`MonitorCell<Self>`], values are cloned in and
///   out, so `Message` types should be cheap to clone, e.g. behind an `Arc`
/// * `Distribution`: [`DistributionCell`], for [`Distribution`] only
pub trait CellValue: Clone + Send + Sync + 'static {
    const VALUE_TYPE: ValueType;

    type Storage: CellStorage<Self>;
}

/// Values kept in one atomic word.
pub trait AtomicValue: Clone + Send + Sync + 'static {
    fn to_cell_bits(&self) -> u64;

    fn from_cell_bits(bits: u64) -> Self;
}

/// Values that support `increment_by`.
pub trait NumericValue:
    CellValue<Storage = AtomicCell<Self>> + AtomicValue + Copy + private::Sealed
{
    const ONE: Self;

    fn add_step(self, step: Self) -> Self;

    fn sub_step(self, step: Self) -> Self;
}

macro_rules! impl_int_value {
    ($t:ty) => {
        impl AtomicValue for $t {
            fn to_cell_bits(&self) -> u64 {
                *self as u64
            }

            fn from_cell_bits(bits: u64) -> Self {
                bits as $t
            }
        }

        impl CellValue for $t {
            const VALUE_TYPE: ValueType = ValueType::Int;
            type Storage = AtomicCell<Self>;
        }

        impl private::Sealed for $t {}

        impl NumericValue for $t {
            const ONE: Self = 1;

            fn add_step(self, step: Self) -> Self {
                self.wrapping_add(step)
            }

            fn sub_step(self, step: Self) -> Self {
                self.wrapping_sub(step)
            }
        }
    };
}

impl_int_value!(i32);
impl_int_value!(i64);
impl_int_value!(u32);
impl_int_value!(u64);

macro_rules! impl_float_value {
    ($t:ty) => {
        impl AtomicValue for $t {
            fn to_cell_bits(&self) -> u64 {
                (*self as f64).to_bits()
            }

            fn from_cell_bits(bits: u64) -> Self {
                f64::from_bits(bits) as $t
            }
        }

        impl CellValue for $t {
            const VALUE_TYPE: ValueType = ValueType::Float;
            type Storage = AtomicCell<Self>;
        }

        impl private::Sealed for $t {}

        impl NumericValue for $t {
            const ONE: Self = 1.0;

            fn add_step(self, step: Self) -> Self {
                self + step
            }

            fn sub_step(self, step: Self) -> Self {
                self - step
            }
        }
    };
}

impl_float_value!(f32);
impl_float_value!(f64);

impl AtomicValue for bool {
    fn to_cell_bits(&self) -> u64 {
        *self as u64
    }

    fn from_cell_bits(bits: u64) -> Self {
        bits != 0
    }
}

impl CellValue for bool {
    const VALUE_TYPE: ValueType = ValueType::Bool;
    type Storage = AtomicCell<Self>;
}

impl CellValue for String {
    const VALUE_TYPE: ValueType = ValueType::String;
    type Storage = MonitorCell<Self>;
}

impl CellValue for SmolStr {
    const VALUE_TYPE: ValueType = ValueType::String;
    type Storage = MonitorCell<Self>;
}

impl CellValue for Arc<str> {
    const VALUE_TYPE: ValueType = ValueType::String;
    type Storage = MonitorCell<Self>;
}

impl CellValue for Distribution {
    const VALUE_TYPE: ValueType = ValueType::Distribution;
    type Storage = DistributionCell;
}
