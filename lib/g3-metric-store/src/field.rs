/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;

use smallvec::SmallVec;
use smol_str::SmolStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Str,
    Int,
    Bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldValue {
    Str(SmolStr),
    Int(i64),
    Bool(bool),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Str(_) => FieldKind::Str,
            FieldValue::Int(_) => FieldKind::Int,
            FieldValue::Bool(_) => FieldKind::Bool,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{s:?}"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(SmolStr::new(s))
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(SmolStr::from(s))
    }
}

impl From<SmolStr> for FieldValue {
    fn from(s: SmolStr) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int(i as i64)
    }
}

impl From<u32> for FieldValue {
    fn from(i: u32) -> Self {
        FieldValue::Int(i as i64)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// A declared dimension of a metric.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    name: SmolStr,
    kind: FieldKind,
}

impl Field {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Field {
            name: SmolStr::new(name),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }
}

/// Ordered field values that address one cell of a metric.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldTuple(SmallVec<[FieldValue; 4]>);

impl FieldTuple {
    pub fn empty() -> Self {
        FieldTuple(SmallVec::new())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&FieldValue> {
        self.0.get(i)
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldValue> {
        self.0.iter()
    }
}

impl FromIterator<FieldValue> for FieldTuple {
    fn from_iter<I: IntoIterator<Item = FieldValue>>(iter: I) -> Self {
        FieldTuple(iter.into_iter().collect())
    }
}

impl From<Vec<FieldValue>> for FieldTuple {
    fn from(v: Vec<FieldValue>) -> Self {
        FieldTuple(SmallVec::from_vec(v))
    }
}

impl<T: Into<FieldValue>, const N: usize> From<[T; N]> for FieldTuple {
    fn from(a: [T; N]) -> Self {
        a.into_iter().map(Into::into).collect()
    }
}

impl fmt::Display for FieldTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str(")")
    }
}
