/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod state;
use state::ExecutionState;

mod scope;
mod graph;

mod trigger;
pub use trigger::{CallbackTrigger, TriggerBuilder, TriggerId};

mod metric;
pub use metric::CallbackMetric;

mod collect;
pub use collect::CollectSession;
