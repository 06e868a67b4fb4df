/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Action creation and implicit orderings.
//!
//! A primitive walks from its current role to its next role one step at a
//! time.  Two tables drive the walk:
//!
//! * [`next_step`]: the immediate next role on the way to a target role
//!   (stopped → promoted goes through unpromoted).
//! * [`transition`]: which action moves the resource one step.
//!
//! When the resource has to be restarted (moving, failed, blocked, multiply
//! active per its `multiple-active` policy) it is first walked all the way down to stopped on its current
//! node and then back up on its assigned node.
//!
//! Groups and collectives get pseudo-actions (`start`, `running`, `stop`,
//! `stopped`) that summarise their members.

pub mod instances;
pub mod migration;
pub mod notify;

use tracing::{debug, trace, warn};

use crate::action::{ActionFlags, ActionId, ActionKey, OrderingType, Task};
use crate::resource::{MultipleActive, NodeId, ResourceFlags, ResourceId, Role, Variant};
use crate::score::INFINITY;
use crate::variant::methods;
use crate::working_set::WorkingSet;

// ── Role transition tables ────────────────────────────────────────────────────

/// What moves a primitive one role step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Nothing,
    Stop,
    Start,
    Promote,
    Demote,
    Invalid,
}

fn role_index(role: Role) -> usize {
    match role {
        Role::Unknown => 0,
        Role::Stopped => 1,
        Role::Started => 2,
        Role::Unpromoted => 3,
        Role::Promoted => 4,
    }
}

/// Immediate next role when going from `current` towards `target`.
fn next_step(current: Role, target: Role) -> Role {
    use Role::*;
    const STEPS: [[Role; 5]; 5] = [
        // target:  Unknown   Stopped  Started     Unpromoted  Promoted
        /* Unknown */ [Unknown, Stopped, Stopped, Stopped, Stopped],
        /* Stopped */ [Stopped, Stopped, Started, Unpromoted, Unpromoted],
        /* Started */ [Stopped, Stopped, Started, Unpromoted, Promoted],
        /* Unpromoted */ [Stopped, Stopped, Stopped, Unpromoted, Promoted],
        /* Promoted */ [Stopped, Unpromoted, Unpromoted, Unpromoted, Promoted],
    ];
    STEPS[role_index(current)][role_index(target)]
}

/// Action that takes a primitive directly from `current` to `next`.
fn transition(current: Role, next: Role) -> Transition {
    use Transition::*;
    const ACTIONS: [[Transition; 5]; 5] = [
        // next:      Unknown  Stopped  Started  Unpromoted Promoted
        /* Unknown */ [Invalid, Stop, Invalid, Invalid, Invalid],
        /* Stopped */ [Invalid, Nothing, Start, Start, Invalid],
        /* Started */ [Invalid, Stop, Nothing, Nothing, Promote],
        /* Unpromoted */ [Invalid, Stop, Stop, Nothing, Promote],
        /* Promoted */ [Invalid, Demote, Demote, Demote, Nothing],
    ];
    ACTIONS[role_index(current)][role_index(next)]
}

// ── Primitive ─────────────────────────────────────────────────────────────────

/// Create every action a primitive needs to reach its next role.
pub fn create_primitive_actions(ws: &mut WorkingSet, rsc: ResourceId) {
    if ws.rsc(rsc).next_role.is_none() {
        let role = ws.rsc(rsc).state(false);
        ws.rsc_mut(rsc).next_role = Some(role);
    }

    let mut need_stop = recover_multiply_active(ws, rsc);

    let r = ws.rsc(rsc);
    let next_role = r.state(false);
    let current = r.current_node();
    let assigned = r.assigned_to;
    debug!(
        "Creating all actions for {} transition from {:?} to {:?} on {}",
        r.name,
        r.role,
        next_role,
        ws.node_name(assigned)
    );

    let is_moving = current.is_some()
        && assigned.is_some()
        && current != assigned
        && next_role >= Role::Started;
    if is_moving {
        trace!(
            resource = %r.name,
            from = %ws.node_name(current),
            to = %ws.node_name(assigned),
            "Moving resource"
        );
        need_stop = true;
    }

    if !is_moving {
        if r.is_set(ResourceFlags::FAILED) {
            trace!(resource = %r.name, "Recovering failed resource");
            need_stop = true;
        } else if r.is_set(ResourceFlags::BLOCKED) {
            trace!(resource = %r.name, "Blocking further actions");
            need_stop = true;
        } else if r.role > Role::Started && current.is_some() && assigned.is_some() {
            let start = start_action(ws, rsc, assigned, true);
            if !ws.action(start).is_optional() {
                trace!(resource = %ws.rsc(rsc).name, "Restart is required for recovery");
                need_stop = true;
            }
        }
    }

    schedule_restart_actions(ws, rsc, current, need_stop);
    schedule_role_transition_actions(ws, rsc);
    migration::schedule_migration(ws, rsc);
}

/// Apply the `multiple-active` policy when `rsc` is active on more than one
/// healthy node; returns whether the resource must stop everywhere first.
fn recover_multiply_active(ws: &mut WorkingSet, rsc: ResourceId) -> bool {
    let clean_active = ws
        .rsc(rsc)
        .running_on
        .iter()
        .filter(|&&n| !ws.node(n).unclean)
        .count();
    if clean_active <= 1 {
        ws.rsc_mut(rsc).flags.remove(ResourceFlags::STOP_UNEXPECTED);
        return false;
    }

    let recovery = match ws.inherited_meta(rsc, "multiple-active") {
        None => MultipleActive::default(),
        Some(value) => MultipleActive::parse(value).unwrap_or_else(|| {
            warn!(resource = %ws.rsc(rsc).name, value, "Unknown multiple-active policy, using restart");
            MultipleActive::default()
        }),
    };
    warn!(
        "Resource {} is active on {} nodes; recovering with {}",
        ws.rsc(rsc).name,
        clean_active,
        recovery.as_str()
    );

    match recovery {
        MultipleActive::Restart => true,
        MultipleActive::StopUnexpected => {
            ws.rsc_mut(rsc).flags.insert(ResourceFlags::STOP_UNEXPECTED);
            true
        }
        MultipleActive::StopOnly => {
            ws.resource_location(rsc, None, -INFINITY, "multiple-active");
            ws.rsc_mut(rsc).next_role = Some(Role::Stopped);
            true
        }
        MultipleActive::Block => {
            let r = ws.rsc_mut(rsc);
            r.flags.remove(ResourceFlags::MANAGED);
            r.flags.insert(ResourceFlags::BLOCKED);
            false
        }
    }
}

/// Whether `node` is where a `stop_unexpected` resource is meant to keep
/// running.
fn is_expected_node(ws: &WorkingSet, rsc: ResourceId, node: NodeId) -> bool {
    let r = ws.rsc(rsc);
    r.is_set(ResourceFlags::STOP_UNEXPECTED) && r.state(false) > Role::Stopped && r.assigned_to == Some(node)
}

/// Walk down to stopped on `current`, then back up to the current role on
/// the assigned node.
fn schedule_restart_actions(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    current: Option<NodeId>,
    need_stop: bool,
) {
    let start_role = ws.rsc(rsc).role;
    let mut role = start_role;

    while role != Role::Stopped {
        let next = next_step(role, Role::Stopped);
        let step = transition(role, next);
        if step == Transition::Nothing || step == Transition::Invalid {
            break;
        }
        apply_transition(ws, rsc, step, current, !need_stop);
        role = next;
    }

    let assigned = ws.rsc(rsc).assigned_to;
    while start_role <= ws.rsc(rsc).state(false)
        && role != start_role
        && !ws.rsc(rsc).is_set(ResourceFlags::BLOCKED)
    {
        let next = next_step(role, start_role);
        let step = transition(role, next);
        if step == Transition::Nothing || step == Transition::Invalid {
            break;
        }
        apply_transition(ws, rsc, step, assigned, !need_stop);
        role = next;
    }
}

/// Walk from the current role to the next role on the assigned node.
fn schedule_role_transition_actions(ws: &mut WorkingSet, rsc: ResourceId) {
    let target = ws.rsc(rsc).state(false);
    let assigned = ws.rsc(rsc).assigned_to;
    let mut role = ws.rsc(rsc).role;

    while role != target {
        let next = next_step(role, target);
        let step = transition(role, next);
        trace!(
            resource = %ws.rsc(rsc).name,
            from = ?role,
            to = ?next,
            target = ?target,
            "Role transition step"
        );
        if step == Transition::Nothing || step == Transition::Invalid {
            break;
        }
        apply_transition(ws, rsc, step, assigned, false);
        role = next;
    }
}

fn apply_transition(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    step: Transition,
    node: Option<NodeId>,
    optional: bool,
) {
    match step {
        Transition::Stop => stop_resource(ws, rsc, optional),
        Transition::Start => start_resource(ws, rsc, node, optional),
        Transition::Promote => promote_resource(ws, rsc, node, optional),
        Transition::Demote => demote_resource(ws, rsc, optional),
        Transition::Nothing | Transition::Invalid => {}
    }
}

/// Stop on every node the resource is active on.
fn stop_resource(ws: &mut WorkingSet, rsc: ResourceId, optional: bool) {
    for current in ws.rsc(rsc).running_on.clone() {
        if is_expected_node(ws, rsc, current) {
            trace!(resource = %ws.rsc(rsc).name, node = %ws.node(current).name, "Keeping expected instance");
            continue;
        }
        trace!(
            resource = %ws.rsc(rsc).name,
            node = %ws.node(current).name,
            optional,
            "Scheduling stop"
        );
        let stop = ws.new_action(ActionKey::new(Some(rsc), Task::Stop), Some(current), optional);
        let unclean = ws.node(current).unclean;
        let unassigned = ws.rsc(rsc).assigned_to.is_none();
        let managed = ws.rsc(rsc).is_set(ResourceFlags::MANAGED);
        let unexpected = ws.rsc(rsc).is_set(ResourceFlags::STOP_UNEXPECTED);

        let action = ws.action_mut(stop);
        if unclean {
            // Implied by fencing the node.
            action.flags |= ActionFlags::PSEUDO;
        }
        if unassigned {
            action.reason = Some("node availability".to_string());
        } else if unexpected {
            action.reason = Some("being multiply active".to_string());
        }
        if !managed {
            action.flags.remove(ActionFlags::RUNNABLE);
        }
    }
}

/// Find or create the start of `rsc` on `node`.  Unrunnable when the node
/// cannot run resources or the resource is unmanaged.
fn start_action(ws: &mut WorkingSet, rsc: ResourceId, node: Option<NodeId>, optional: bool) -> ActionId {
    let start = ws.new_action(ActionKey::new(Some(rsc), Task::Start), node, optional);
    let eligible = node.is_some_and(|n| ws.node(n).is_eligible());
    let managed = ws.rsc(rsc).is_set(ResourceFlags::MANAGED);
    let action = ws.action_mut(start);
    if !eligible {
        if action.clear(ActionFlags::RUNNABLE) {
            action.reason = Some("node availability".to_string());
        }
    } else if !managed {
        action.flags.remove(ActionFlags::RUNNABLE);
    }
    start
}

fn start_resource(ws: &mut WorkingSet, rsc: ResourceId, node: Option<NodeId>, optional: bool) {
    if node.is_none() {
        trace!(resource = %ws.rsc(rsc).name, "Not scheduling start: no node");
        return;
    }
    trace!(
        resource = %ws.rsc(rsc).name,
        node = %ws.node_name(node),
        optional,
        "Scheduling start"
    );
    let start = start_action(ws, rsc, node, true);
    let keep = node.is_some_and(|n| is_expected_node(ws, rsc, n) && ws.rsc(rsc).running_on.contains(&n));
    let action = ws.action_mut(start);
    if action.is_runnable() && !optional {
        action.flags.remove(ActionFlags::OPTIONAL);
    }
    if keep {
        // Already running there; nothing to execute.
        action.flags |= ActionFlags::PSEUDO;
    }
}

/// Promote on `node`, runnable only if every start there is.
fn promote_resource(ws: &mut WorkingSet, rsc: ResourceId, node: Option<NodeId>, optional: bool) {
    let Some(node) = node else {
        return;
    };
    let runnable = ws
        .resource_actions(rsc, Task::Start, Some(node))
        .into_iter()
        .all(|a| ws.action(a).is_runnable());

    if runnable {
        trace!(resource = %ws.rsc(rsc).name, node = %ws.node(node).name, optional, "Scheduling promotion");
        ws.new_action(ActionKey::new(Some(rsc), Task::Promote), Some(node), optional);
    } else {
        trace!(resource = %ws.rsc(rsc).name, node = %ws.node(node).name, "Not promoting: start unrunnable");
        for promote in ws.resource_actions(rsc, Task::Promote, Some(node)) {
            ws.action_mut(promote).flags.remove(ActionFlags::RUNNABLE);
        }
    }
}

/// Demote on every node the resource is active on.
fn demote_resource(ws: &mut WorkingSet, rsc: ResourceId, optional: bool) {
    for current in ws.rsc(rsc).running_on.clone() {
        trace!(resource = %ws.rsc(rsc).name, node = %ws.node(current).name, optional, "Scheduling demotion");
        ws.new_action(ActionKey::new(Some(rsc), Task::Demote), Some(current), optional);
    }
}

// ── Group ─────────────────────────────────────────────────────────────────────

/// Create the members' actions and the group's pseudo-actions.
pub fn create_group_actions(ws: &mut WorkingSet, rsc: ResourceId) {
    trace!(group = %ws.rsc(rsc).name, "Creating actions");
    for member in ws.rsc(rsc).children.clone() {
        let variant = ws.rsc(member).variant;
        (methods(variant).create_actions)(ws, member);
    }
    ws.new_pseudo_action(rsc, Task::Start, true, true);
    ws.new_pseudo_action(rsc, Task::Started, true, true);
    ws.new_pseudo_action(rsc, Task::Stop, true, true);
    ws.new_pseudo_action(rsc, Task::Stopped, true, true);
}

// ── Implicit orderings ────────────────────────────────────────────────────────

/// Order every `first_task` action of `first` before every `then_task`
/// action of `then`.
pub fn order_resource_actions(
    ws: &mut WorkingSet,
    first: ResourceId,
    first_task: Task,
    then: ResourceId,
    then_task: Task,
    kind: OrderingType,
) {
    let firsts = ws.resource_actions(first, first_task, None);
    let thens = ws.resource_actions(then, then_task, None);
    for &f in &firsts {
        for &t in &thens {
            ws.order_actions(f, t, kind);
        }
    }
}

/// Create the implicit orderings of `rsc` and everything below it.
pub fn internal_constraints(ws: &mut WorkingSet, rsc: ResourceId) {
    match ws.rsc(rsc).variant {
        Variant::Primitive => primitive_internal_constraints(ws, rsc),
        Variant::Group => group_internal_constraints(ws, rsc),
        Variant::Clone | Variant::Bundle => instances::collective_internal_constraints(ws, rsc),
    }
}

/// stop → start, demote → stop, start → promote.
fn primitive_internal_constraints(ws: &mut WorkingSet, rsc: ResourceId) {
    if !ws.rsc(rsc).is_set(ResourceFlags::MANAGED) {
        trace!(resource = %ws.rsc(rsc).name, "Skipping implicit constraints for unmanaged resource");
        return;
    }
    order_resource_actions(
        ws,
        rsc,
        Task::Stop,
        rsc,
        Task::Start,
        OrderingType::ORDERED | OrderingType::IMPLIES_THEN,
    );
    order_resource_actions(ws, rsc, Task::Demote, rsc, Task::Stop, OrderingType::IMPLIES_FIRST);
    order_resource_actions(ws, rsc, Task::Start, rsc, Task::Promote, OrderingType::RUNNABLE_LEFT);
}

fn group_internal_constraints(ws: &mut WorkingSet, rsc: ResourceId) {
    let members = ws.rsc(rsc).children.clone();
    let up = OrderingType::ORDERED | OrderingType::IMPLIES_THEN | OrderingType::RUNNABLE_LEFT;

    order_resource_actions(ws, rsc, Task::Stopped, rsc, Task::Start, OrderingType::ORDERED);

    let mut previous: Option<ResourceId> = None;
    for &member in &members {
        internal_constraints(ws, member);

        order_resource_actions(ws, rsc, Task::Start, member, Task::Start, up);
        order_resource_actions(ws, member, Task::Start, rsc, Task::Started, OrderingType::ORDERED);
        order_resource_actions(
            ws,
            rsc,
            Task::Stop,
            member,
            Task::Stop,
            OrderingType::ORDERED | OrderingType::IMPLIES_THEN,
        );
        order_resource_actions(ws, member, Task::Stop, rsc, Task::Stopped, OrderingType::ORDERED);

        if let Some(prev) = previous {
            order_resource_actions(ws, prev, Task::Start, member, Task::Start, up);
            order_resource_actions(
                ws,
                member,
                Task::Stop,
                prev,
                Task::Stop,
                OrderingType::ORDERED | OrderingType::IMPLIES_FIRST,
            );
        }
        previous = Some(member);
    }

    if let Some(last) = previous {
        order_resource_actions(ws, last, Task::Start, rsc, Task::Started, OrderingType::RUNNABLE_LEFT);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
