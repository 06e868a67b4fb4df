/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Orderings involving clones and bundles.
//!
//! An ordering between two collectives is either applied to the collectives'
//! pseudo-actions and then pushed down to every instance of the `then` side,
//! or, when interleaving is enabled, split into per-node pairs: each
//! instance of `then` is ordered after the instance of `first` that is (or
//! will be) on the same node.
//!
//! The resource whose interleave setting decides is the one doing the
//! stopping side of the ordering: `first` when `then` is a stop or demote,
//! `then` otherwise.

use tracing::{debug, error, info, trace};

use crate::action::{ActionFlags, ActionId, OrderingType, Task, Updated};
use crate::assign::assign_resource;
use crate::resource::{NodeId, ResourceFlags, ResourceId, Role, Variant};
use crate::variant::methods;
use crate::working_set::WorkingSet;

use super::{update_action_for_orderings, update_ordered_actions};

// ── Action flags ──────────────────────────────────────────────────────────────

/// Flags of a collective action, summarised over its instances.
pub fn collective_action_flags(ws: &mut WorkingSet, action: ActionId, node: Option<NodeId>) -> ActionFlags {
    let Some(rsc) = ws.action(action).rsc else {
        return ws.action(action).flags;
    };
    let children = ws.rsc(rsc).children.clone();
    summary_action_flags(ws, action, &children, node)
}

/// Summarise `children`'s actions matching aggregate `action`.
///
/// The summary is mandatory if any child's matching action is, and
/// unrunnable if none of them is runnable.  Only a computation without a
/// `node` writes its findings back to `action`.
pub fn summary_action_flags(
    ws: &mut WorkingSet,
    action: ActionId,
    children: &[ResourceId],
    node: Option<NodeId>,
) -> ActionFlags {
    let Some(task) = clone_child_action(ws, action) else {
        return ws.action(action).flags;
    };
    let mut flags = ActionFlags::OPTIONAL | ActionFlags::RUNNABLE | ActionFlags::PSEUDO;
    let mut any_runnable = false;

    for &child in children {
        let scope = if ws.rsc(child).children.is_empty() { node } else { None };
        let Some(child_action) = ws.find_action(child, task, scope) else {
            continue;
        };
        let variant = ws.rsc(child).variant;
        let child_flags = (methods(variant).action_flags)(ws, child_action, node);

        if flags.contains(ActionFlags::OPTIONAL) && !child_flags.contains(ActionFlags::OPTIONAL) {
            trace!(
                action = %ws.action(action).uuid,
                child = %ws.action(child_action).uuid,
                "Aggregate action is mandatory because of child"
            );
            flags.remove(ActionFlags::OPTIONAL);
            if node.is_none() {
                ws.action_mut(action).clear(ActionFlags::OPTIONAL);
            }
        }
        if child_flags.contains(ActionFlags::RUNNABLE) {
            any_runnable = true;
        }
    }

    if !any_runnable {
        trace!(action = %ws.action(action).uuid, "Aggregate action is unrunnable because no children are");
        flags.remove(ActionFlags::RUNNABLE);
        if node.is_none() {
            ws.action_mut(action).clear(ActionFlags::RUNNABLE);
        }
    }
    flags
}

/// The task an instance performs for aggregate `action`.
///
/// Notifications resolve to the task being notified about.  Primitive
/// instances have no completion actions, so completions fold to the
/// executable task.  `None` when the collective has no instances.
pub fn clone_child_action(ws: &WorkingSet, action: ActionId) -> Option<Task> {
    let a = ws.action(action);
    let rsc = a.rsc?;
    let child = *ws.rsc(rsc).children.first()?;
    let task = match (a.task, a.key.notify) {
        (Task::Notify | Task::Notified, Some(notify)) => notify.task,
        (task, _) => task,
    };
    if ws.rsc(child).variant == Variant::Primitive {
        Some(task.atomic())
    } else {
        Some(task)
    }
}

// ── Instance pairing ──────────────────────────────────────────────────────────

/// Whether `child` is (`current = true`) or will be on `local_node` in role
/// `filter` (`Role::Unknown` matches any role).
pub fn is_child_compatible(
    ws: &WorkingSet,
    child: ResourceId,
    local_node: NodeId,
    filter: Role,
    current: bool,
) -> bool {
    let r = ws.rsc(child);
    let role = r.state(current);
    // Blocked instances have failed somewhere; never pair with them.
    let node = if ws.is_blocked_recursive(child) {
        None
    } else {
        ws.location(child, current)
    };

    if filter != Role::Unknown && role != filter {
        trace!(child = %r.name, ?role, "Filtered by role");
        return false;
    }
    match node {
        Some(node) if node == local_node => true,
        Some(node) => {
            trace!(
                child = %r.name,
                node = %ws.node_name(Some(node)),
                wanted = %ws.node_name(Some(local_node)),
                "Instance is elsewhere"
            );
            false
        }
        None => {
            trace!(child = %r.name, current, "Instance is not located");
            false
        }
    }
}

fn find_compatible_child_by_node(
    ws: &WorkingSet,
    local_child: ResourceId,
    local_node: NodeId,
    rsc: ResourceId,
    filter: Role,
    current: bool,
) -> Option<ResourceId> {
    trace!(
        "Looking for compatible child from {} for {} on {}",
        ws.rsc(local_child).name,
        ws.rsc(rsc).name,
        ws.node_name(Some(local_node))
    );
    let pair = ws
        .rsc(rsc)
        .children
        .iter()
        .copied()
        .find(|&child| is_child_compatible(ws, child, local_node, filter, current));
    if let Some(pair) = pair {
        trace!(
            "Pairing {} with {} on {}",
            ws.rsc(local_child).name,
            ws.rsc(pair).name,
            ws.node_name(Some(local_node))
        );
    }
    pair
}

/// The instance of collective `rsc` that shares a node with `local_child`.
///
/// When `local_child` has no location, its allowed nodes are tried in
/// preference order.
pub fn find_compatible_child(
    ws: &WorkingSet,
    local_child: ResourceId,
    rsc: ResourceId,
    filter: Role,
    current: bool,
) -> Option<ResourceId> {
    if let Some(local_node) = ws.location(local_child, current) {
        return find_compatible_child_by_node(ws, local_child, local_node, rsc, filter, current);
    }

    let candidates = ws.sorted_nodes(&ws.rsc(local_child).allowed_nodes, None);
    let pair = candidates.iter().find_map(|allowed| {
        find_compatible_child_by_node(ws, local_child, allowed.node, rsc, filter, current)
    });
    if pair.is_none() {
        debug!("Can't pair {} with {}", ws.rsc(local_child).name, ws.rsc(rsc).name);
    }
    pair
}

// ── Ordering update ───────────────────────────────────────────────────────────

/// Whether the ordering `first → then` should be applied per node pair.
pub fn can_interleave_actions(ws: &WorkingSet, first: ActionId, then: ActionId) -> bool {
    let (f, t) = (ws.action(first), ws.action(then));
    let (Some(first_rsc), Some(then_rsc)) = (f.rsc, t.rsc) else {
        trace!(first = %f.uuid, then = %t.uuid, "Not interleaving (both must be resources)");
        return false;
    };
    if first_rsc == then_rsc {
        trace!(first = %f.uuid, then = %t.uuid, "Not interleaving (same resource)");
        return false;
    }
    if !ws.rsc(first_rsc).variant.is_collective() || !ws.rsc(then_rsc).variant.is_collective() {
        trace!(first = %f.uuid, then = %t.uuid, "Not interleaving (both must be clones or bundles)");
        return false;
    }

    let decider = if t.task.is_stop_or_demote() { first_rsc } else { then_rsc };
    let interleave = ws.rsc(decider).is_interleaved();
    trace!(
        "Interleave {} -> {}: {} (based on {})",
        f.uuid,
        t.uuid,
        if interleave { "yes" } else { "no" },
        ws.rsc(decider).name
    );
    interleave
}

/// `update_ordered_actions` for clones and bundles.
pub fn multi_update_actions(
    ws: &mut WorkingSet,
    first: ActionId,
    then: ActionId,
    node: Option<NodeId>,
    flags: ActionFlags,
    filter: ActionFlags,
    kind: OrderingType,
) -> Updated {
    trace!(first = %ws.action(first).uuid, then = %ws.action(then).uuid, "Updating collective ordering");

    if can_interleave_actions(ws, first, then) {
        return update_interleaved_actions(ws, first, then, node, filter, kind);
    }

    let mut changed = update_ordered_actions(ws, first, then, node, flags, filter, kind);
    let Some(then_rsc) = ws.action(then).rsc else {
        return changed;
    };
    let task = ws.action(then).task;

    for child in ws.rsc(then_rsc).children.clone() {
        let Some(child_action) = ws.find_action(child, task, node) else {
            continue;
        };
        let variant = ws.rsc(child).variant;
        let child_flags = (methods(variant).action_flags)(ws, child_action, node);
        if !child_flags.contains(ActionFlags::RUNNABLE) {
            continue;
        }
        let child_changed =
            (methods(variant).update_ordered_actions)(ws, first, child_action, node, flags, filter, kind);
        changed |= child_changed;
        if child_changed.contains(Updated::THEN) {
            for after in ws.action(child_action).actions_after.clone() {
                update_action_for_orderings(ws, after.action);
            }
        }
    }
    changed
}

fn update_interleaved_actions(
    ws: &mut WorkingSet,
    first: ActionId,
    then: ActionId,
    node: Option<NodeId>,
    filter: ActionFlags,
    kind: OrderingType,
) -> Updated {
    let mut changed = Updated::empty();
    let (Some(first_rsc), Some(then_rsc)) = (ws.action(first).rsc, ws.action(then).rsc) else {
        return changed;
    };
    let first_task = ws.action(first).task;
    let then_task = ws.action(then).task;
    let current = first_task.is_stopped_or_demoted() || then_task.is_stop_or_demote();

    for then_child in ws.rsc(then_rsc).children.clone() {
        let Some(first_child) = find_compatible_child(ws, then_child, first_rsc, Role::Unknown, current)
        else {
            if current {
                trace!(instance = %ws.rsc(then_child).name, "No active peer to order against");
                continue;
            }
            debug!(
                "No match found for {} ({} / {} / {})",
                ws.rsc(then_child).name,
                current,
                ws.action(first).uuid,
                ws.action(then).uuid
            );
            // Nothing is active or about to be active next to this instance.
            if kind.is_mandatory() {
                info!("Inhibiting {} from being active", ws.rsc(then_child).name);
                if assign_resource(ws, then_child, None, true, true) {
                    changed |= Updated::THEN;
                }
            }
            continue;
        };

        let Some(child_task) = clone_child_action(ws, first) else {
            continue;
        };

        let first_action = match ws.rsc(first_child).contained {
            Some(inner) if first_task.is_stop_class() => ws.find_action(inner, child_task, node),
            _ => ws.find_action(first_child, child_task, node),
        };
        let then_action = match ws.rsc(then_child).contained {
            Some(inner) if then_task.is_role_change() => ws.find_action(inner, then_task, node),
            _ => ws.find_action(then_child, then_task, node),
        };

        let Some(first_action) = first_action else {
            report_missing(ws, first_child, child_task, "first");
            continue;
        };
        let Some(then_action) = then_action else {
            report_missing(ws, then_child, then_task, "then");
            continue;
        };

        if ws.order_actions(first_action, then_action, kind) {
            debug!(
                "Created constraint for {} ({}) -> {} ({}) {:?}",
                ws.action(first_action).uuid,
                ws.action(first_action).is_optional(),
                ws.action(then_action).uuid,
                ws.action(then_action).is_optional(),
                kind
            );
            changed |= Updated::FIRST | Updated::THEN;
        }

        let first_variant = ws.rsc(first_child).variant;
        let then_variant = ws.rsc(then_child).variant;
        let first_flags = (methods(first_variant).action_flags)(ws, first_action, node);
        changed |= (methods(then_variant).update_ordered_actions)(
            ws,
            first_action,
            then_action,
            node,
            first_flags,
            filter,
            kind,
        );
    }
    changed
}

/// Stop and demote actions are legitimately absent, as is anything on an
/// orphan.
fn missing_is_expected(ws: &WorkingSet, instance: ResourceId, task: Task) -> bool {
    ws.rsc(instance).is_set(ResourceFlags::ORPHAN) || task.is_stop_or_demote()
}

/// Anything missing that is not expected to be is an internal inconsistency.
fn report_missing(ws: &WorkingSet, instance: ResourceId, task: Task, side: &str) {
    let r = ws.rsc(instance);
    if !missing_is_expected(ws, instance, task) {
        error!("Internal error: No action found for {} in {} ({})", task, r.name, side);
    } else {
        trace!(
            "No action found for {} in {}{} ({})",
            task,
            r.name,
            if r.is_set(ResourceFlags::ORPHAN) { " (ORPHAN)" } else { "" },
            side
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
