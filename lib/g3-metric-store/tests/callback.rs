/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use g3_metric_store::{
    CallbackError, CallbackMetric, CellValue, CollectSession, Field, FieldKind, FieldTuple,
    MetricInfo, TriggerBuilder,
};

fn values<V: CellValue>(m: &CallbackMetric<V>) -> Vec<V> {
    let mut out = Vec::new();
    m.for_each_cell(|v| out.push(v.value));
    out
}

#[test]
fn consistent_ratio() {
    let hits = CallbackMetric::<i64>::new(MetricInfo::new("/cache/hits"));
    let lookups = CallbackMetric::<i64>::new(MetricInfo::new("/cache/lookups"));
    let source = Arc::new(AtomicI64::new(0));

    let (h, l, s) = (hits.clone(), lookups.clone(), source.clone());
    let _t = TriggerBuilder::new()
        .metric(&hits)
        .metric(&lookups)
        .register(move || {
            let n = s.fetch_add(1, Ordering::SeqCst);
            h.set(&FieldTuple::empty(), n)?;
            l.set(&FieldTuple::empty(), n * 2)?;
            Ok(())
        })
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let (hits, lookups) = (hits.clone(), lookups.clone());
            thread::spawn(move || {
                for _ in 0..200 {
                    let mut session = CollectSession::begin();
                    let mut h = Vec::new();
                    let mut l = Vec::new();
                    session.visit(&hits, |v| h.push(v.value));
                    session.visit(&lookups, |v| l.push(v.value));
                    drop(session);
                    assert_eq!(h.len(), 1);
                    assert_eq!(l, vec![h[0] * 2]);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn failing_triggers_do_not_blank_scope() {
    let good = CallbackMetric::<i64>::new(MetricInfo::new("/pool/idle"));
    let erroring = CallbackMetric::<i64>::new(MetricInfo::new("/pool/busy"));
    let panicking = CallbackMetric::<i64>::new(MetricInfo::new("/pool/waiting"));
    let shared = CallbackMetric::<String>::new(
        MetricInfo::new("/pool/state").with_field(Field::new("pool", FieldKind::Str)),
    );

    let g = good.clone();
    let _t1 = TriggerBuilder::new()
        .metric(&good)
        .metric(&shared)
        .register(move || {
            g.set(&FieldTuple::empty(), 5)?;
            Ok(())
        })
        .unwrap();
    let (e, s) = (erroring.clone(), shared.clone());
    let _t2 = TriggerBuilder::new()
        .metric(&erroring)
        .metric(&shared)
        .register(move || {
            e.set(&FieldTuple::empty(), 1)?;
            s.set(&FieldTuple::from(["main"]), "degraded".to_string())?;
            anyhow::bail!("pool stats unavailable")
        })
        .unwrap();
    let p = panicking.clone();
    let _t3 = TriggerBuilder::new()
        .metric(&panicking)
        .metric(&shared)
        .register(move || {
            p.set(&FieldTuple::empty(), 2)?;
            panic!("pool stats corrupted")
        })
        .unwrap();

    assert_eq!(good.scope_id(), shared.scope_id());
    assert_eq!(erroring.scope_id(), panicking.scope_id());

    // values set before the failures are still published
    let mut session = CollectSession::begin();
    let mut seen = Vec::new();
    session.visit(&good, |v| seen.push(v.value));
    session.visit(&erroring, |v| seen.push(v.value));
    session.visit(&panicking, |v| seen.push(v.value));
    let mut states = Vec::new();
    session.visit(&shared, |v| states.push((v.fields.to_string(), v.value)));
    drop(session);
    assert_eq!(seen, vec![5, 1, 2]);
    assert_eq!(
        states,
        vec![("(\"main\")".to_string(), "degraded".to_string())]
    );
}

#[test]
fn writes_limited_to_running_trigger() {
    let owned = CallbackMetric::<i64>::new(MetricInfo::new("/queue/depth"));
    let other = CallbackMetric::<i64>::new(MetricInfo::new("/queue/age"));
    let results = Arc::new(Mutex::new(Vec::new()));

    let (o, x, r) = (owned.clone(), other.clone(), results.clone());
    let _t = owned.create_trigger(move || {
        let from_thread = {
            let o = o.clone();
            thread::spawn(move || o.set(&FieldTuple::empty(), 1))
                .join()
                .unwrap()
        };
        let mut r = r.lock().unwrap();
        r.push(from_thread);
        r.push(x.set(&FieldTuple::empty(), 1));
        r.push(o.set(&FieldTuple::empty(), 3));
        Ok(())
    });
    let _t2 = other.create_trigger(|| Ok(()));

    assert_eq!(values(&owned), vec![3]);
    assert!(values(&other).is_empty());
    assert_eq!(
        owned.set(&FieldTuple::empty(), 4),
        Err(CallbackError::NotInTrigger("/queue/depth".to_string()))
    );

    let results = results.lock().unwrap();
    assert_eq!(
        results[0],
        Err(CallbackError::NotInTrigger("/queue/depth".to_string()))
    );
    assert_eq!(
        results[1],
        Err(CallbackError::NotInTrigger("/queue/age".to_string()))
    );
    assert_eq!(results[2], Ok(()));
}

#[test]
fn deregister_splits_scope() {
    let a = CallbackMetric::<bool>::new(MetricInfo::new("/link/up"));
    let b = CallbackMetric::<bool>::new(MetricInfo::new("/link/flapping"));

    let aa = a.clone();
    let joint = TriggerBuilder::new()
        .metric(&a)
        .metric(&b)
        .register(move || {
            aa.set(&FieldTuple::empty(), true)?;
            Ok(())
        })
        .unwrap();
    let bb = b.clone();
    let single = b.create_trigger(move || {
        bb.set(&FieldTuple::empty(), false)?;
        Ok(())
    });
    assert!(joint.is_registered());
    assert_eq!(a.scope_id(), b.scope_id());
    assert_eq!(values(&a), vec![true]);
    assert_eq!(values(&b), vec![false]);

    assert!(joint.deregister());
    assert!(!joint.is_registered());
    assert!(!a.has_triggers());
    assert!(values(&a).is_empty());
    assert!(a.scope_id().is_none());
    assert!(b.scope_id().is_some());
    assert_eq!(values(&b), vec![false]);

    assert!(single.deregister());
    assert!(values(&b).is_empty());
}
