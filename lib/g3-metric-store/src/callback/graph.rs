/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};

use foldhash::fast::FixedState;
use log::debug;
use parking_lot::RwLock;
use smallvec::SmallVec;

use super::scope::{CallbackScope, ScopeMember};
use super::trigger::{TriggerId, TriggerInner};
use crate::MetricId;

/// Trigger to metric ownership of the whole process.
///
/// Writers hold it while scopes are recomputed, collectors hold it for
/// reading during a whole collection pass. Readers use `read_recursive` so
/// a thread already collecting can read again while a writer is queued.
pub(crate) static REGISTRATION: RwLock<ScopeGraph> = parking_lot::const_rwlock(ScopeGraph::new());

struct MetricNode {
    member: Weak<dyn ScopeMember>,
    triggers: SmallVec<[TriggerId; 2]>,
}

pub(crate) struct ScopeGraph {
    triggers: HashMap<TriggerId, Arc<TriggerInner>, FixedState>,
    metrics: HashMap<MetricId, MetricNode, FixedState>,
}

pub(crate) fn register(
    trigger: Arc<TriggerInner>,
    metrics: Vec<(MetricId, Weak<dyn ScopeMember>)>,
) {
    REGISTRATION.write().add_trigger(trigger, metrics);
}

impl ScopeGraph {
    const fn new() -> Self {
        ScopeGraph {
            triggers: HashMap::with_hasher(FixedState::with_seed(0)),
            metrics: HashMap::with_hasher(FixedState::with_seed(0)),
        }
    }

    pub(crate) fn contains_trigger(&self, id: TriggerId) -> bool {
        self.triggers.contains_key(&id)
    }

    fn add_trigger(
        &mut self,
        trigger: Arc<TriggerInner>,
        metrics: Vec<(MetricId, Weak<dyn ScopeMember>)>,
    ) {
        let id = trigger.id();
        for (metric_id, member) in metrics {
            let node = self.metrics.entry(metric_id).or_insert_with(|| MetricNode {
                member,
                triggers: SmallVec::new(),
            });
            node.triggers.push(id);
        }
        self.triggers.insert(id, trigger);
        self.rebuild(id);
    }

    pub(crate) fn remove_trigger(&mut self, id: TriggerId) -> bool {
        let Some(trigger) = self.triggers.remove(&id) else {
            return false;
        };
        let old_scope = trigger.scope();
        trigger.set_scope(None);

        for metric_id in trigger.metrics() {
            let Some(node) = self.metrics.get_mut(metric_id) else {
                continue;
            };
            node.triggers.retain(|t| *t != id);
            let member = node.member.upgrade();
            if let Some(m) = &member {
                m.reset(None);
            }
            if node.triggers.is_empty() {
                if let Some(m) = member {
                    m.set_scope(None);
                }
                self.metrics.remove(metric_id);
            }
        }

        // the rest of the old scope may have split apart
        if let Some(scope) = old_scope {
            let mut rebuilt = HashSet::new();
            for t in scope.triggers() {
                let t = t.id();
                if t == id || rebuilt.contains(&t) || !self.triggers.contains_key(&t) {
                    continue;
                }
                rebuilt.extend(self.rebuild(t));
            }
        }
        true
    }

    /// Builds a new scope for the connected component of `start` and installs
    /// it on every member. Returns the triggers of the component.
    fn rebuild(&mut self, start: TriggerId) -> Vec<TriggerId> {
        let mut trigger_ids = vec![start];
        let mut metric_ids = Vec::new();
        let mut seen_triggers = HashSet::from([start]);
        let mut seen_metrics = HashSet::new();
        let mut queue = VecDeque::from([start]);

        while let Some(t) = queue.pop_front() {
            let Some(trigger) = self.triggers.get(&t) else {
                continue;
            };
            for m in trigger.metrics() {
                if !seen_metrics.insert(*m) {
                    continue;
                }
                let Some(node) = self.metrics.get(m) else {
                    continue;
                };
                metric_ids.push(*m);
                for next in &node.triggers {
                    if seen_triggers.insert(*next) {
                        trigger_ids.push(*next);
                        queue.push_back(*next);
                    }
                }
            }
        }

        let triggers: Vec<Arc<TriggerInner>> = trigger_ids
            .iter()
            .filter_map(|t| self.triggers.get(t).cloned())
            .collect();
        let members: Vec<Weak<dyn ScopeMember>> = metric_ids
            .iter()
            .filter_map(|m| self.metrics.get(m).map(|n| n.member.clone()))
            .collect();
        let scope = Arc::new(CallbackScope::new(triggers, members));
        debug!(
            "callback scope {} rebuilt with {} triggers and {} metrics",
            scope.id(),
            trigger_ids.len(),
            metric_ids.len()
        );

        for t in scope.triggers() {
            t.set_scope(Some(scope.clone()));
        }
        for m in &metric_ids {
            if let Some(member) = self.metrics.get(m).and_then(|n| n.member.upgrade()) {
                member.set_scope(Some(scope.clone()));
            }
        }
        trigger_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallbackMetric, MetricInfo, TriggerBuilder};

    #[test]
    fn components() {
        let a = CallbackMetric::<i64>::new(MetricInfo::new("/test/graph/a"));
        let b = CallbackMetric::<i64>::new(MetricInfo::new("/test/graph/b"));
        let c = CallbackMetric::<i64>::new(MetricInfo::new("/test/graph/c"));

        let ta = a.create_trigger(|| Ok(()));
        let tc = c.create_trigger(|| Ok(()));
        assert_ne!(a.scope_id(), c.scope_id());
        assert!(b.scope_id().is_none());

        // a and c become one scope through b
        let tab = TriggerBuilder::new()
            .metric(&a)
            .metric(&b)
            .register(|| Ok(()))
            .unwrap();
        let tbc = TriggerBuilder::new()
            .metric(&b)
            .metric(&c)
            .register(|| Ok(()))
            .unwrap();
        assert!(a.scope_id().is_some());
        assert_eq!(a.scope_id(), b.scope_id());
        assert_eq!(b.scope_id(), c.scope_id());

        // splits again
        assert!(tbc.deregister());
        assert!(!tbc.deregister());
        assert!(!tbc.is_registered());
        assert_eq!(a.scope_id(), b.scope_id());
        assert_ne!(a.scope_id(), c.scope_id());
        assert!(c.scope_id().is_some());

        assert!(tab.deregister());
        assert!(b.scope_id().is_none());
        assert!(!b.has_triggers());
        assert!(a.has_triggers());

        assert!(ta.deregister());
        assert!(tc.deregister());
        assert!(a.scope_id().is_none());
        assert!(c.scope_id().is_none());
    }
}
