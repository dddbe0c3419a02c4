/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use g3_distribution::{BucketId, Bucketer, Distribution, Exemplar};

use super::{CellView, MetricId, MetricInfo, StoredMetric};
use crate::{FieldError, FieldTuple};

/// A distribution metric fed one sample at a time.
pub struct EventMetric {
    inner: StoredMetric<Distribution>,
    bucketer: Arc<Bucketer>,
}

impl EventMetric {
    pub fn new(info: MetricInfo, bucketer: Arc<Bucketer>) -> Self {
        EventMetric {
            inner: StoredMetric::with_default(info, Distribution::new(bucketer.clone())),
            bucketer,
        }
    }

    pub fn id(&self) -> MetricId {
        self.inner.id()
    }

    pub fn info(&self) -> &MetricInfo {
        self.inner.info()
    }

    pub fn bucketer(&self) -> &Arc<Bucketer> {
        &self.bucketer
    }

    pub fn record(&self, fields: &FieldTuple, value: f64) -> Result<(), FieldError> {
        self.record_multiple(fields, value, 1)
    }

    /// Records `n` samples of `value`, ignored if `n <= 0` or the value is
    /// not finite.
    pub fn record_multiple(
        &self,
        fields: &FieldTuple,
        value: f64,
        n: i64,
    ) -> Result<(), FieldError> {
        if n <= 0 || !value.is_finite() {
            return Ok(());
        }
        // keep the lookup out of the cell lock
        let bucket: BucketId = self.bucketer.find_bucket(value);
        self.inner
            .cell(fields)?
            .record(move |d| d.add_to_bucket(bucket, value, n));
        Ok(())
    }

    pub fn record_with_exemplar(
        &self,
        fields: &FieldTuple,
        exemplar: Exemplar,
    ) -> Result<(), FieldError> {
        self.inner
            .cell(fields)?
            .record(move |d| d.add_with_exemplar(exemplar));
        Ok(())
    }

    pub fn get(&self, fields: &FieldTuple) -> Option<Distribution> {
        self.inner.get(fields)
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn clear_cell(&self, fields: &FieldTuple) -> bool {
        self.inner.clear_cell(fields)
    }

    pub fn cell_count(&self) -> usize {
        self.inner.cell_count()
    }

    pub fn keys(&self) -> Vec<FieldTuple> {
        self.inner.keys()
    }

    pub fn reset_timestamp(&self, fields: &FieldTuple) -> Option<i64> {
        self.inner.reset_timestamp(fields)
    }

    pub fn for_each_cell<F>(&self, visit: F)
    where
        F: FnMut(CellView<'_, Distribution>),
    {
        self.inner.for_each_cell(visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Field, FieldKind};

    #[test]
    fn record() {
        let m = EventMetric::new(
            MetricInfo::new("/rpc/latency").with_field(Field::new("method", FieldKind::Str)),
            Bucketer::fixed_width(10.0, 10).unwrap(),
        );
        let f = FieldTuple::from(["Get"]);
        m.record(&f, 5.0).unwrap();
        m.record_multiple(&f, 15.0, 3).unwrap();
        m.record_multiple(&f, 15.0, 0).unwrap();
        m.record(&f, f64::NAN).unwrap();
        m.record_with_exemplar(&f, Exemplar::new(25.0, 42)).unwrap();

        let d = m.get(&f).unwrap();
        assert!(Arc::ptr_eq(d.bucketer(), m.bucketer()));
        assert_eq!(d.count(), 5);
        assert_eq!(d.buckets(), &[1, 3, 1]);
        assert_eq!(d.exemplar(2).map(|e| e.timestamp_micros), Some(42));

        assert!(m.record(&FieldTuple::empty(), 1.0).is_err());
        assert_eq!(m.cell_count(), 1);
        assert_eq!(m.keys(), vec![f.clone()]);
        assert!(m.clear_cell(&f));
        assert!(m.get(&f).is_none());
    }

    #[test]
    fn buckets_bounded_by_bucketer() {
        let m = EventMetric::new(
            MetricInfo::new("/rpc/queue_depth"),
            Bucketer::fixed_width(1.0, 100).unwrap(),
        );
        let f = FieldTuple::empty();
        for v in [0.5, 50.0, 99.5, 150.0] {
            m.record(&f, v).unwrap();
        }

        let d = m.get(&f).unwrap();
        assert_eq!(d.count(), 4);
        assert_eq!(d.overflow(), 1);
        assert!(d.buckets().len() <= m.bucketer().num_finite_buckets());
        assert_eq!(d.bucket_count(50), 1);
        assert_eq!(d.bucket_count(99), 1);
        assert!(m.reset_timestamp(&f).is_some());
    }
}
