/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Collective actions.
//!
//! After each instance has created its own actions, the collective folds
//! their state into a summary and derives its four pseudo-actions from it:
//!
//! | Pseudo-action | Optional unless | Runnable when |
//! |---|---|---|
//! | `start` | an instance is starting | always |
//! | `running` | an instance is starting | an instance is starting or active |
//! | `stop` | an instance is stopping | always |
//! | `stopped` | an instance is stopping | always |
//!
//! `stop` may additionally be used for live migration unless instances are
//! both starting and stopping.

use bitflags::bitflags;
use tracing::{error, trace};

use crate::action::{ActionFlags, OrderingType, Task};
use crate::resource::{ResourceId, Variant};
use crate::scheduler::SchedulerError;
use crate::score::INFINITY;
use crate::variant::methods;
use crate::working_set::WorkingSet;

use super::migration::schedule_migration;
use super::notify::{create_notifications, CollectiveNotify, NotifyData};
use super::{internal_constraints, order_resource_actions};

bitflags! {
    /// What the instances of a collective are doing in this transition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InstanceState: u32 {
        const STARTING   = 1 << 0;
        const STOPPING   = 1 << 1;
        /// Some instance is starting while some instance is stopping.
        const RESTARTING = 1 << 2;
        const ACTIVE     = 1 << 3;
    }
}

/// Fold the state of `instance` (recursing into nested collectives and
/// groups) into `state`.
pub fn check_instance_state(ws: &WorkingSet, instance: ResourceId, state: &mut InstanceState) {
    let all = InstanceState::STARTING | InstanceState::STOPPING | InstanceState::ACTIVE;
    if state.contains(all) {
        return;
    }

    let r = ws.rsc(instance);
    if r.variant != Variant::Primitive {
        for &child in &r.children {
            if state.contains(all) {
                break;
            }
            check_instance_state(ws, child, state);
        }
        return;
    }

    if !r.running_on.is_empty() {
        state.insert(InstanceState::ACTIVE);
    }
    for &id in &r.actions {
        if state.contains(InstanceState::STARTING | InstanceState::STOPPING) {
            break;
        }
        let action = ws.action(id);
        if action.is_optional() {
            continue;
        }
        match action.task {
            Task::Start if action.is_runnable() => {
                trace!(instance = %r.name, action = %action.uuid, "Instance is starting");
                state.insert(InstanceState::STARTING);
            }
            // A pseudo stop is implied by fencing the node.
            Task::Stop if action.is_runnable() || action.is_pseudo() => {
                trace!(instance = %r.name, action = %action.uuid, "Instance is stopping");
                state.insert(InstanceState::STOPPING);
            }
            _ => {}
        }
    }
}

/// Create the actions of every instance and the collective's own
/// start/running/stop/stopped pseudo-actions.
///
/// When `start_notify`/`stop_notify` are given and still empty, they are
/// filled with notification pseudo-actions, and stop notifications are
/// ordered to complete before start notifications begin.
pub fn create_instance_actions(
    ws: &mut WorkingSet,
    collective: ResourceId,
    instances: &[ResourceId],
    start_notify: Option<&mut Option<NotifyData>>,
    stop_notify: Option<&mut Option<NotifyData>>,
) -> Result<(), SchedulerError> {
    let c = ws.rsc(collective);
    if !c.variant.is_collective() {
        return Err(SchedulerError::NotCollective {
            resource: c.name.clone(),
            variant: c.variant.as_str(),
        });
    }
    for &instance in instances {
        if ws.rsc(instance).parent != Some(collective) {
            return Err(SchedulerError::ForeignInstance {
                instance: ws.rsc(instance).name.clone(),
                collective: c.name.clone(),
            });
        }
    }
    trace!(collective = %c.name, "Creating collective instance actions");

    let mut state = InstanceState::empty();
    for &instance in instances {
        let variant = ws.rsc(instance).variant;
        (methods(variant).create_actions)(ws, instance);
        check_instance_state(ws, instance, &mut state);
    }
    if state.contains(InstanceState::STARTING | InstanceState::STOPPING) {
        state.insert(InstanceState::RESTARTING);
    }

    let starting = state.contains(InstanceState::STARTING);
    let start = ws.new_pseudo_action(collective, Task::Start, !starting, true);
    let started = ws.new_pseudo_action(collective, Task::Started, !starting, false);
    {
        let action = ws.action_mut(started);
        action.priority = INFINITY;
        if state.intersects(InstanceState::ACTIVE | InstanceState::STARTING) {
            action.flags.insert(ActionFlags::RUNNABLE);
        }
    }

    let mut start_data = None;
    if let Some(slot) = start_notify {
        if slot.is_none() {
            *slot = Some(create_notifications(ws, collective, Task::Start, start, started));
        }
        start_data = slot.clone();
    }

    let stopping = state.contains(InstanceState::STOPPING);
    let stop = ws.new_pseudo_action(collective, Task::Stop, !stopping, true);
    let stopped = ws.new_pseudo_action(collective, Task::Stopped, !stopping, true);
    ws.action_mut(stopped).priority = INFINITY;
    if !state.contains(InstanceState::RESTARTING) {
        ws.action_mut(stop).flags.insert(ActionFlags::MIGRATE_RUNNABLE);
        for &instance in instances {
            if ws.rsc(instance).variant == Variant::Primitive {
                schedule_migration(ws, instance);
            }
        }
    }

    if let Some(slot) = stop_notify {
        if slot.is_none() {
            *slot = Some(create_notifications(ws, collective, Task::Stop, stop, stopped));
            if let (Some(start_data), Some(stop_data)) = (&start_data, slot.as_ref()) {
                ws.order_actions(stop_data.post_done, start_data.pre, OrderingType::ORDERED);
            }
        }
    }
    Ok(())
}

/// Create the actions of a clone or bundle (and of the resources inside
/// bundle replicas).  Collectives with `notify=true` also get notification
/// pseudo-actions.
pub fn create_collective_actions(ws: &mut WorkingSet, rsc: ResourceId) {
    let instances = ws.rsc(rsc).children.clone();

    let result = if ws.rsc(rsc).meta_bool("notify") {
        let mut start = None;
        let mut stop = None;
        let result = create_instance_actions(ws, rsc, &instances, Some(&mut start), Some(&mut stop));
        ws.notifications.insert(rsc, CollectiveNotify { start, stop });
        result
    } else {
        create_instance_actions(ws, rsc, &instances, None, None)
    };
    if let Err(err) = result {
        error!(resource = %ws.rsc(rsc).name, %err, "Could not create collective actions");
    }

    for container in instances {
        if let Some(inner) = ws.rsc(container).contained {
            let variant = ws.rsc(inner).variant;
            (methods(variant).create_actions)(ws, inner);
        }
    }
}

/// Implicit orderings between a collective's pseudo-actions and its
/// instances.
pub fn collective_internal_constraints(ws: &mut WorkingSet, rsc: ResourceId) {
    let ordered = OrderingType::ORDERED;
    let gate = OrderingType::ORDERED | OrderingType::RUNNABLE_LEFT;

    order_resource_actions(ws, rsc, Task::Stopped, rsc, Task::Start, ordered);
    order_resource_actions(ws, rsc, Task::Start, rsc, Task::Started, gate);
    order_resource_actions(ws, rsc, Task::Stop, rsc, Task::Stopped, gate);

    for instance in ws.rsc(rsc).children.clone() {
        internal_constraints(ws, instance);

        order_resource_actions(ws, rsc, Task::Start, instance, Task::Start, gate);
        order_resource_actions(ws, instance, Task::Start, rsc, Task::Started, ordered);
        order_resource_actions(ws, rsc, Task::Stop, instance, Task::Stop, ordered);
        order_resource_actions(ws, instance, Task::Stop, rsc, Task::Stopped, ordered);

        if let Some(inner) = ws.rsc(instance).contained {
            internal_constraints(ws, inner);
            order_resource_actions(
                ws,
                instance,
                Task::Start,
                inner,
                Task::Start,
                OrderingType::ORDERED | OrderingType::IMPLIES_THEN | OrderingType::RUNNABLE_LEFT,
            );
            order_resource_actions(
                ws,
                inner,
                Task::Stop,
                instance,
                Task::Stop,
                OrderingType::ORDERED | OrderingType::IMPLIES_FIRST,
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
