/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! One complete scheduling pass.
//!
//! [`Scheduler`] turns a loaded cluster scenario into a [`Plan`]: where
//! every resource should run and which actions get it there.
//!
//! ```text
//! ClusterConfigManager ──► WorkingSet ──► assign ──► create actions
//!                                                        │
//!         Plan ◄── propagate orderings ◄── order ◄───────┘
//! ```
//!
//! | Phase | Work |
//! |---|---|
//! | assign | every top-level resource picks nodes, colocations first |
//! | create actions | stop/start/promote/demote per primitive, pseudo-actions for groups and collectives |
//! | order | implicit orderings, configured orderings, then live-migration fixups |
//! | propagate | optional/runnable flags flow along orderings to a fixpoint |
//!
//! The pass always produces a plan once the scenario is valid; anomalies on
//! the way are logged, not returned.

pub mod error;

pub use error::{BanReason, SchedulerError};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::actions::internal_constraints;
use crate::actions::migration::apply_migration_orderings;
use crate::config::ClusterConfigManager;
use crate::ordering::{apply_user_orderings, propagate_orderings};
use crate::resource::Variant;
use crate::variant::methods;
use crate::working_set::WorkingSet;

// ── Plan ──────────────────────────────────────────────────────────────────────

/// One action of the transition, as handed to an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedAction {
    pub uuid: String,
    pub resource: Option<String>,
    pub task: String,
    pub node: Option<String>,
    pub optional: bool,
    pub runnable: bool,
    pub pseudo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Actions that must complete first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
}

/// Result of one scheduling pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Primitive name → assigned node (`None` = stopped).
    pub assignments: BTreeMap<String, Option<String>>,
    pub actions: Vec<PlannedAction>,
}

impl Plan {
    fn from_working_set(ws: &WorkingSet) -> Self {
        let assignments = ws
            .resources()
            .iter()
            .filter(|r| r.variant == Variant::Primitive)
            .map(|r| {
                let node = r.assigned_to.map(|n| ws.node(n).name.clone());
                (r.name.clone(), node)
            })
            .collect();

        let actions = ws
            .actions()
            .iter()
            .map(|a| PlannedAction {
                uuid: a.uuid.clone(),
                resource: a.rsc.map(|r| ws.rsc(r).name.clone()),
                task: a.task.to_string(),
                node: a.node.map(|n| ws.node(n).name.clone()),
                optional: a.is_optional(),
                runnable: a.is_runnable(),
                pseudo: a.is_pseudo(),
                reason: a.reason.clone(),
                after: a
                    .actions_before
                    .iter()
                    .map(|e| ws.action(e.action).uuid.clone())
                    .collect(),
            })
            .collect();

        Self { assignments, actions }
    }

    /// Node `resource` is assigned to, if any.
    pub fn assigned_node(&self, resource: &str) -> Option<&str> {
        self.assignments.get(resource)?.as_deref()
    }

    /// Actions that will actually be executed: mandatory and runnable.
    pub fn required_actions(&self) -> impl Iterator<Item = &PlannedAction> {
        self.actions.iter().filter(|a| !a.optional && a.runnable)
    }

    /// First action with `uuid` (on `node`, if given).
    pub fn action(&self, uuid: &str, node: Option<&str>) -> Option<&PlannedAction> {
        self.actions
            .iter()
            .find(|a| a.uuid == uuid && (node.is_none() || a.node.as_deref() == node))
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// Runs scheduling passes over the scenario held by a
/// [`ClusterConfigManager`].
///
/// Every call to [`schedule`](Self::schedule) builds a fresh working set, so
/// the scheduler itself holds no per-pass state.
pub struct Scheduler {
    config: Arc<ClusterConfigManager>,
}

impl Scheduler {
    pub fn new(config: Arc<ClusterConfigManager>) -> Self {
        Self { config }
    }

    /// Build the working set from the loaded scenario and run one pass.
    ///
    /// # Errors
    /// [`SchedulerError::ConfigNotLoaded`] before the scenario is loaded,
    /// reference errors from building the working set, and
    /// [`SchedulerError::NoResources`] for an empty scenario.
    pub fn schedule(&self) -> Result<Plan, SchedulerError> {
        if !self.config.is_loaded() {
            return Err(SchedulerError::ConfigNotLoaded);
        }
        let mut ws = self.config.build_working_set()?;
        run(&mut ws)
    }
}

/// Run one complete pass over `ws` and extract the plan.
pub fn run(ws: &mut WorkingSet) -> Result<Plan, SchedulerError> {
    if ws.resources().is_empty() {
        return Err(SchedulerError::NoResources);
    }
    let top = ws.top_level();
    info!(
        nodes = ws.nodes().len(),
        resources = ws.resources().len(),
        top_level = top.len(),
        "=== Scheduling pass ==="
    );

    // ── Assignment ────────────────────────────────────────────────────────────
    for &rsc in &top {
        if ws.rsc(rsc).is_provisional() {
            let variant = ws.rsc(rsc).variant;
            (methods(variant).assign)(ws, rsc, None, true)?;
        }
    }

    // ── Actions ───────────────────────────────────────────────────────────────
    for &rsc in &top {
        let variant = ws.rsc(rsc).variant;
        (methods(variant).create_actions)(ws, rsc);
    }
    debug!(actions = ws.actions().len(), "Actions created");

    // ── Orderings ─────────────────────────────────────────────────────────────
    for &rsc in &top {
        internal_constraints(ws, rsc);
    }
    apply_user_orderings(ws);
    apply_migration_orderings(ws);
    propagate_orderings(ws);

    let plan = Plan::from_working_set(ws);
    info!(
        assigned = plan.assignments.values().filter(|n| n.is_some()).count(),
        stopped = plan.assignments.values().filter(|n| n.is_none()).count(),
        actions = plan.actions.len(),
        required = plan.required_actions().count(),
        "=== Scheduling complete ==="
    );
    Ok(plan)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
