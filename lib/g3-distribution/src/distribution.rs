/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::sync::Arc;

use crate::{BucketId, Bucketer, Exemplar};

/// Count, moments and histogram of a stream of samples.
///
/// The moments are kept with the provisional means method. The bucket array
/// only holds the prefix up to the highest bucket ever hit, the missing
/// tail counts as zero.
///
/// A distribution is not synchronized, wrap it in a cell to share it.
#[derive(Clone, Debug)]
pub struct Distribution {
    bucketer: Arc<Bucketer>,
    count: i64,
    mean: f64,
    sum_of_squared_deviation: f64,
    overflow: i64,
    underflow: i64,
    buckets: Vec<i64>,
    exemplars: Vec<Option<Exemplar>>,
}

impl Default for Distribution {
    fn default() -> Self {
        Distribution::new(Bucketer::default_instance())
    }
}

impl Distribution {
    pub fn new(bucketer: Arc<Bucketer>) -> Self {
        Distribution {
            bucketer,
            count: 0,
            mean: 0.0,
            sum_of_squared_deviation: 0.0,
            overflow: 0,
            underflow: 0,
            buckets: Vec::new(),
            exemplars: Vec::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        bucketer: Arc<Bucketer>,
        count: i64,
        mean: f64,
        sum_of_squared_deviation: f64,
        overflow: i64,
        underflow: i64,
        buckets: Vec<i64>,
        exemplars: Vec<Option<Exemplar>>,
    ) -> Self {
        Distribution {
            bucketer,
            count,
            mean,
            sum_of_squared_deviation,
            overflow,
            underflow,
            buckets,
            exemplars,
        }
    }

    #[inline]
    pub fn add(&mut self, value: f64) {
        self.add_multiple(value, 1);
    }

    /// Records `n` samples of `value`.
    ///
    /// Non-finite values and non-positive `n` are ignored.
    pub fn add_multiple(&mut self, value: f64, n: i64) {
        if n <= 0 || !value.is_finite() {
            return;
        }
        let bucket = self.bucketer.find_bucket(value);
        self.record(bucket, value, n);
    }

    /// Records `n` samples of `value` into a bucket looked up in advance.
    ///
    /// A bucket not holding `value` under the bucketer of this distribution,
    /// e.g. one found with another bucketer, is looked up again.
    pub fn add_to_bucket(&mut self, bucket: BucketId, value: f64, n: i64) {
        if n <= 0 || !value.is_finite() {
            return;
        }
        let bucket = if self.bucketer.holds(bucket, value) {
            bucket
        } else {
            self.bucketer.find_bucket(value)
        };
        self.record(bucket, value, n);
    }

    /// Records the exemplar value as one sample and keeps the exemplar for
    /// its bucket if it is the latest one.
    pub fn add_with_exemplar(&mut self, exemplar: Exemplar) {
        let value = exemplar.value;
        if !value.is_finite() {
            return;
        }
        let bucket = self.bucketer.find_bucket(value);
        self.record(bucket, value, 1);
        if let BucketId::Finite(i) = bucket {
            self.offer_exemplar(i, exemplar);
        }
    }

    fn record(&mut self, bucket: BucketId, value: f64, n: i64) {
        self.count += n;
        let dev = value - self.mean;
        if n == 1 {
            self.mean += dev / self.count as f64;
            self.sum_of_squared_deviation += dev * (value - self.mean);
        } else {
            self.mean += dev * (n as f64 / self.count as f64);
            self.sum_of_squared_deviation += dev * (value - self.mean) * n as f64;
        }

        match bucket {
            BucketId::Underflow => self.underflow += n,
            BucketId::Overflow => self.overflow += n,
            BucketId::Finite(i) => {
                // grow to just what is needed, sparse histograms stay small
                if i >= self.buckets.len() {
                    self.buckets.resize(i + 1, 0);
                }
                self.buckets[i] += n;
            }
        }
    }

    fn offer_exemplar(&mut self, i: usize, exemplar: Exemplar) {
        if exemplar.supersedes(self.exemplar(i)) {
            if i >= self.exemplars.len() {
                self.exemplars.resize(i + 1, None);
            }
            self.exemplars[i] = Some(exemplar);
        }
    }

    #[inline]
    pub fn bucketer(&self) -> &Arc<Bucketer> {
        &self.bucketer
    }

    #[inline]
    pub fn count(&self) -> i64 {
        self.count
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    #[inline]
    pub fn sum(&self) -> f64 {
        self.count as f64 * self.mean
    }

    #[inline]
    pub fn sum_of_squared_deviation(&self) -> f64 {
        self.sum_of_squared_deviation
    }

    /// Population variance, 0 for an empty distribution.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_of_squared_deviation / self.count as f64
        }
    }

    pub fn standard_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    #[inline]
    pub fn overflow(&self) -> i64 {
        self.overflow
    }

    #[inline]
    pub fn underflow(&self) -> i64 {
        self.underflow
    }

    /// Number of samples in finite bucket `i`.
    pub fn bucket_count(&self, i: usize) -> i64 {
        self.buckets.get(i).copied().unwrap_or(0)
    }

    pub fn bucket_min(&self, i: usize) -> f64 {
        self.bucketer.bucket_min(i)
    }

    pub fn bucket_max(&self, i: usize) -> f64 {
        self.bucketer.bucket_max(i)
    }

    /// The stored bucket prefix, trailing buckets not listed are empty.
    pub fn buckets(&self) -> &[i64] {
        &self.buckets
    }

    pub fn exemplar(&self, i: usize) -> Option<&Exemplar> {
        self.exemplars.get(i).and_then(|e| e.as_ref())
    }

    /// Stored exemplars in bucket order, and so in value order.
    pub fn exemplars(&self) -> impl Iterator<Item = &Exemplar> {
        self.exemplars.iter().filter_map(|e| e.as_ref())
    }

    pub fn median(&self) -> f64 {
        self.nth_percentile(50.0)
    }

    /// Estimates the value below which `p` percent of the samples fall,
    /// assuming samples spread evenly within each bucket.
    ///
    /// Returns 0 if the distribution is empty or the target is reached in the
    /// underflow bucket, and the upper bound of the last finite bucket if the
    /// target lies in the overflow bucket.
    pub fn nth_percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let p = p.clamp(0.0, 100.0);
        let target = self.count as f64 * p / 100.0;

        let mut seen = self.underflow as f64;
        if seen >= target {
            return 0.0;
        }
        for (i, height) in self.buckets.iter().enumerate() {
            let height = *height as f64;
            if seen + height >= target {
                let left = self.bucketer.bucket_min(i);
                let right = self.bucketer.bucket_max(i);
                return left + ((target - seen) / height) * (right - left);
            }
            seen += height;
        }
        self.bucketer.bucket_max(self.bucketer.num_finite_buckets() - 1)
    }

    /// Estimates the fraction of samples less than `x`, in `[0, 1]`.
    ///
    /// `x` equal to the upper bound of the last finite bucket is counted as
    /// inside that bucket, not in the overflow one.
    pub fn fraction_less_than(&self, x: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let num_buckets = self.bucketer.num_finite_buckets();
        let bn = match self.bucketer.find_bucket(x) {
            BucketId::Underflow => return 0.0,
            BucketId::Overflow => {
                if x == self.bucketer.bucket_max(num_buckets - 1) {
                    num_buckets - 1
                } else {
                    return 1.0;
                }
            }
            BucketId::Finite(i) => i,
        };

        let limit = bn.min(self.buckets.len());
        let mut total = self.underflow as f64;
        total += self.buckets[..limit].iter().sum::<i64>() as f64;
        if bn < self.buckets.len() {
            let left = self.bucketer.bucket_min(bn);
            let right = self.bucketer.bucket_max(bn);
            total += self.buckets[bn] as f64 * (x - left) / (right - left);
        }
        total / self.count as f64
    }
}

fn trimmed(buckets: &[i64]) -> &[i64] {
    let len = buckets.iter().rposition(|c| *c != 0).map_or(0, |p| p + 1);
    &buckets[..len]
}

impl PartialEq for Distribution {
    /// Exemplars are not compared.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bucketer, &other.bucketer)
            && self.count == other.count
            && self.mean == other.mean
            && self.sum_of_squared_deviation == other.sum_of_squared_deviation
            && self.overflow == other.overflow
            && self.underflow == other.underflow
            && trimmed(&self.buckets) == trimmed(&other.buckets)
    }
}

/// printf style `%.{precision}g`
fn fmt_significant(f: &mut fmt::Formatter<'_>, v: f64, precision: usize) -> fmt::Result {
    if v == 0.0 || !v.is_finite() {
        return write!(f, "{:.*}", precision - 1, v);
    }
    let exp = v.abs().log10().floor() as i32;
    if exp < -4 || exp >= precision as i32 {
        write!(f, "{:.*e}", precision - 1, v)
    } else {
        write!(f, "{:.*}", (precision as i32 - 1 - exp) as usize, v)
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distribution(n={}, mean=", self.count)?;
        fmt_significant(f, self.mean, 4)?;
        f.write_str(", stddev=")?;
        fmt_significant(f, self.standard_deviation(), 4)?;
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(expected: f64, actual: f64, tolerance: f64) {
        assert!(
            (expected - actual).abs() <= tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn one_to_ten() {
        let mut d = Distribution::default();
        for i in 1..=10 {
            d.add(i as f64);
        }
        assert_eq!(d.count(), 10);
        assert_close(5.5, d.mean(), 1e-12);
        assert_close(55.0, d.sum(), 1e-12);
        assert_close(8.25, d.variance(), 1e-12);
        assert_close(2.8723, d.standard_deviation(), 1e-4);
        assert_eq!(d.buckets(), &[0, 3, 7]);
        assert_eq!(d.bucket_count(1), 3);
        assert_eq!(d.bucket_count(16), 0);
        assert_eq!(d.underflow(), 0);
        assert_eq!(d.overflow(), 0);
        assert_eq!(d.to_string(), "Distribution(n=10, mean=5.500, stddev=2.872)");
    }

    #[test]
    fn empty() {
        let d = Distribution::default();
        assert_eq!(d.count(), 0);
        assert_eq!(d.variance(), 0.0);
        assert_eq!(d.nth_percentile(50.0), 0.0);
        assert_eq!(d.fraction_less_than(10.0), 0.0);
        assert!(d.buckets().is_empty());
    }

    #[test]
    fn ignored_samples() {
        let mut d = Distribution::default();
        d.add(f64::NAN);
        d.add(f64::INFINITY);
        d.add(f64::NEG_INFINITY);
        d.add_multiple(1.0, 0);
        d.add_multiple(1.0, -3);
        assert_eq!(d, Distribution::default());
    }

    #[test]
    fn under_and_overflow() {
        let mut d = Distribution::new(Bucketer::fixed_width(1.0, 2).unwrap());
        d.add(-0.5);
        d.add_multiple(2.0, 3);
        assert_eq!(d.underflow(), 1);
        assert_eq!(d.overflow(), 3);
        assert!(d.buckets().is_empty());
        assert_eq!(d.nth_percentile(100.0), 2.0);
    }

    #[test]
    fn foreign_bucket_id() {
        let wide = Bucketer::fixed_width(1.0, 100).unwrap();
        let mut d = Distribution::new(Bucketer::fixed_width(1.0, 2).unwrap());
        d.add_to_bucket(wide.find_bucket(50.0), 50.0, 2);
        d.add_to_bucket(wide.find_bucket(1.5), 1.5, 1);
        d.add_to_bucket(BucketId::Underflow, 0.5, 1);
        assert_eq!(d.count(), 4);
        assert_eq!(d.overflow(), 2);
        assert_eq!(d.underflow(), 0);
        assert_eq!(d.buckets(), &[1, 1]);
    }

    #[test]
    fn provisional_means() {
        for ii in 0..32 {
            let k = (1u64 << ii) as f64;
            let mut d = Distribution::default();
            d.add(k + 1.0);
            d.add(k + 2.0);
            d.add(k + 3.0);
            assert_close(k + 2.0, d.mean(), 1e-9 * k.max(1.0));
            assert_close(2.0 / 3.0, d.variance(), 1e-9);
        }
    }

    #[test]
    fn add_multiple_matches_repeated_add() {
        let samples = [(0.5, 3), (7.25, 10), (123.0, 1), (-4.0, 2), (1e6, 5)];
        let mut bulk = Distribution::default();
        let mut single = Distribution::default();
        for (v, n) in samples {
            bulk.add_multiple(v, n);
            for _ in 0..n {
                single.add(v);
            }
        }
        assert_eq!(bulk.count(), single.count());
        assert_eq!(bulk.buckets(), single.buckets());
        assert_eq!(bulk.underflow(), single.underflow());
        assert_close(single.mean(), bulk.mean(), 1e-9 * single.mean().abs());
        assert_close(
            single.variance(),
            bulk.variance(),
            1e-9 * single.variance(),
        );
    }

    #[test]
    fn percentiles_of_uniform_sweep() {
        let mut d = Distribution::new(Bucketer::fixed_width(10.0, 80).unwrap());
        for i in 0..800 {
            d.add(i as f64);
        }
        assert_eq!(d.nth_percentile(0.0), 0.0);
        assert_close(400.0, d.median(), 1e-9);
        for i in 1..=100 {
            assert_close(8.0, d.nth_percentile(i as f64) / i as f64, 1e-9);
        }
        assert_eq!(d.nth_percentile(250.0), d.nth_percentile(100.0));
        assert_eq!(d.nth_percentile(-1.0), 0.0);

        let mut last = 0.0;
        for i in 0..800 {
            let f = d.fraction_less_than(i as f64);
            assert_close(i as f64, 800.0 * f, 1e-9);
            assert!(f >= last);
            last = f;
        }
    }

    #[test]
    fn percentiles_with_underflow() {
        let mut d = Distribution::new(Bucketer::fixed_width(10.0, 80).unwrap());
        for i in -100..=100 {
            d.add(i as f64);
        }
        assert_close(0.5, d.median(), 1e-9);
        assert_eq!(d.nth_percentile(25.0), 0.0);
        assert_close(50.75, d.nth_percentile(75.0), 1e-9);

        assert_close(0.4975, d.fraction_less_than(0.0), 1e-4);
        assert_close(0.7462, d.fraction_less_than(50.0), 1e-4);
        assert_close(0.9950, d.fraction_less_than(100.0), 1e-4);
        assert_close(0.9955, d.fraction_less_than(101.0), 1e-4);
        assert_eq!(d.fraction_less_than(500000.0), 1.0);
        assert_eq!(d.fraction_less_than(-200.0), 0.0);
    }

    #[test]
    fn fraction_at_last_bound() {
        let mut d = Distribution::new(Bucketer::fixed_width(1.0, 2).unwrap());
        d.add(0.5);
        d.add(1.5);
        d.add(5.0);
        // the last bound counts as inside the last finite bucket
        assert_close(2.0 / 3.0, d.fraction_less_than(2.0), 1e-12);
        assert_eq!(d.fraction_less_than(2.0001), 1.0);
    }

    #[test]
    fn exemplars() {
        let mut d = Distribution::new(Bucketer::fixed_width(10.0, 5).unwrap());
        d.add_with_exemplar(Exemplar::new(5.0, 0));
        d.add_with_exemplar(Exemplar::new(6.0, 100));
        d.add_with_exemplar(Exemplar::new(7.0, 50));
        d.add_with_exemplar(Exemplar::new(35.0, 10));
        d.add_with_exemplar(Exemplar::new(-1.0, 500));
        d.add_with_exemplar(Exemplar::new(99.0, 500));

        assert_eq!(d.count(), 6);
        assert_eq!(d.exemplar(0).map(|e| e.value), Some(6.0));
        assert!(d.exemplar(1).is_none());
        assert_eq!(d.exemplar(3).map(|e| e.timestamp_micros), Some(10));
        let values: Vec<f64> = d.exemplars().map(|e| e.value).collect();
        assert_eq!(values, vec![6.0, 35.0]);
    }

    #[test]
    fn equality() {
        let b = Bucketer::fixed_width(1.0, 10).unwrap();
        let mut x = Distribution::new(b.clone());
        x.add(0.5);
        x.add(0.5);
        let mut y = x.clone();
        assert_eq!(x, y);

        // [2, 0] equals [2]
        y.buckets.push(0);
        assert_eq!(x, y);

        y.add(3.5);
        assert_ne!(x, y);

        let mut other = Distribution::new(Bucketer::fixed_width(2.0, 10).unwrap());
        other.add(0.5);
        other.add(0.5);
        assert_ne!(x, other);
    }

    #[test]
    fn clone_is_deep() {
        let mut d = Distribution::default();
        d.add(2.0);
        let snapshot = d.clone();
        d.add(20.0);
        assert_eq!(snapshot.count(), 1);
        assert_eq!(snapshot.buckets(), &[0, 1]);
    }

    #[test]
    fn display_precision() {
        let mut d = Distribution::default();
        d.add(123456.0);
        assert_eq!(d.to_string(), "Distribution(n=1, mean=1.235e5, stddev=0.000)");
    }
}
