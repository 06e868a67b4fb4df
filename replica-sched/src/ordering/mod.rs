/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Ordering propagation.
//!
//! Each ordering edge `first → then` carries [`OrderingType`] bits that say
//! how the flags of one side restrict the other:
//!
//! | Bit | Effect |
//! |---|---|
//! | `IMPLIES_THEN` | a mandatory `first` makes `then` mandatory |
//! | `RUNNABLE_LEFT` | an unrunnable `first` makes `then` unrunnable |
//! | `IMPLIES_FIRST` | a mandatory `then` makes `first` mandatory |
//! | `ORDERED` | sequencing only |
//!
//! Propagation only ever clears `OPTIONAL` and `RUNNABLE`, so repeating it
//! until nothing changes always terminates.

pub mod instances;

use tracing::{debug, trace};

use crate::action::{ActionFlags, ActionId, OrderingType, Task, Updated};
use crate::actions::order_resource_actions;
use crate::resource::{NodeId, ResourceId, Variant};
use crate::variant::methods;
use crate::working_set::{OrderingKind, WorkingSet};

// ── Action flags ──────────────────────────────────────────────────────────────

/// A primitive's action flags are its own.
pub fn primitive_action_flags(ws: &mut WorkingSet, action: ActionId, _node: Option<NodeId>) -> ActionFlags {
    ws.action(action).flags
}

/// A group action is mandatory if any member's matching action is, and a
/// group completion (`running`, `stopped`, ...) is unrunnable if any
/// member's matching action is.
///
/// Without a `node` the findings are also written back to the group action.
pub fn group_action_flags(ws: &mut WorkingSet, action: ActionId, node: Option<NodeId>) -> ActionFlags {
    let group = match ws.action(action).rsc {
        Some(rsc) => rsc,
        None => return ws.action(action).flags,
    };
    let task = ws.action(action).task;
    let mut flags = ActionFlags::OPTIONAL | ActionFlags::RUNNABLE | ActionFlags::PSEUDO;

    for member in ws.rsc(group).children.clone() {
        let variant = ws.rsc(member).variant;
        let member_task = if variant == Variant::Primitive { task.atomic() } else { task };
        let Some(member_action) = ws.find_action(member, member_task, node) else {
            continue;
        };
        let member_flags = (methods(variant).action_flags)(ws, member_action, node);

        if flags.contains(ActionFlags::OPTIONAL) && !member_flags.contains(ActionFlags::OPTIONAL) {
            trace!(
                action = %ws.action(action).uuid,
                member = %ws.action(member_action).uuid,
                "Group action is mandatory because of member"
            );
            flags.remove(ActionFlags::OPTIONAL);
            if node.is_none() {
                ws.action_mut(action).clear(ActionFlags::OPTIONAL);
            }
        }
        if member_task != task
            && flags.contains(ActionFlags::RUNNABLE)
            && !member_flags.contains(ActionFlags::RUNNABLE)
        {
            trace!(
                action = %ws.action(action).uuid,
                member = %ws.action(member_action).uuid,
                "Group action is unrunnable because of member"
            );
            flags.remove(ActionFlags::RUNNABLE);
            if node.is_none() {
                ws.action_mut(action).clear(ActionFlags::RUNNABLE);
            }
        }
    }
    flags
}

/// Flags of `first` as seen from an ordering scoped to `node`.  A
/// collective action runnable anywhere stays runnable for a node-scoped
/// ordering.
fn action_flags_for_ordering(ws: &mut WorkingSet, action: ActionId, node: Option<NodeId>) -> ActionFlags {
    let Some(rsc) = ws.action(action).rsc else {
        return ws.action(action).flags;
    };
    let variant = ws.rsc(rsc).variant;
    let flags = (methods(variant).action_flags)(ws, action, None);
    if node.is_none() || !variant.is_collective() {
        return flags;
    }
    let mut scoped = (methods(variant).action_flags)(ws, action, node);
    if flags.contains(ActionFlags::RUNNABLE) {
        scoped.insert(ActionFlags::RUNNABLE);
    }
    scoped
}

// ── Single pair ───────────────────────────────────────────────────────────────

/// Apply one ordering edge between `first` and `then`.
///
/// `flags` are `first`'s effective flags; `filter` selects which of
/// `OPTIONAL`/`RUNNABLE` may be propagated.  Returns the side(s) whose flags
/// changed.
pub fn update_ordered_actions(
    ws: &mut WorkingSet,
    first: ActionId,
    then: ActionId,
    _node: Option<NodeId>,
    flags: ActionFlags,
    filter: ActionFlags,
    kind: OrderingType,
) -> Updated {
    let mut changed = Updated::empty();

    if kind.contains(OrderingType::IMPLIES_THEN)
        && filter.contains(ActionFlags::OPTIONAL)
        && !flags.contains(ActionFlags::OPTIONAL)
        && ws.action_mut(then).clear(ActionFlags::OPTIONAL)
    {
        trace!(
            first = %ws.action(first).uuid,
            then = %ws.action(then).uuid,
            "Then action is now mandatory"
        );
        changed |= Updated::THEN;
    }

    if kind.contains(OrderingType::RUNNABLE_LEFT)
        && filter.contains(ActionFlags::RUNNABLE)
        && !flags.contains(ActionFlags::RUNNABLE)
        && ws.action_mut(then).clear(ActionFlags::RUNNABLE)
    {
        let reason = format!("{} is unrunnable", ws.action(first).uuid);
        trace!(then = %ws.action(then).uuid, %reason, "Then action is now unrunnable");
        ws.action_mut(then).reason.get_or_insert(reason);
        changed |= Updated::THEN;
    }

    if kind.contains(OrderingType::IMPLIES_FIRST)
        && filter.contains(ActionFlags::OPTIONAL)
        && !ws.action(then).is_optional()
        && ws.action_mut(first).clear(ActionFlags::OPTIONAL)
    {
        trace!(
            first = %ws.action(first).uuid,
            then = %ws.action(then).uuid,
            "First action is now mandatory"
        );
        changed |= Updated::FIRST;
    }

    changed
}

/// Apply an ordering to a group action, then to each member's matching
/// action.
pub fn update_group_ordered_actions(
    ws: &mut WorkingSet,
    first: ActionId,
    then: ActionId,
    node: Option<NodeId>,
    flags: ActionFlags,
    filter: ActionFlags,
    kind: OrderingType,
) -> Updated {
    let mut changed = update_ordered_actions(ws, first, then, node, flags, filter, kind);

    let Some(group) = ws.action(then).rsc else {
        return changed;
    };
    let task = ws.action(then).task;
    for member in ws.rsc(group).children.clone() {
        if let Some(member_action) = ws.find_action(member, task, node) {
            let variant = ws.rsc(member).variant;
            changed |= (methods(variant).update_ordered_actions)(
                ws,
                first,
                member_action,
                node,
                flags,
                filter,
                kind,
            );
        }
    }
    changed
}

// ── Fixpoint ──────────────────────────────────────────────────────────────────

/// Re-evaluate every ordering that ends at `then`, and keep going from any
/// action whose flags changed as a result.
pub fn update_action_for_orderings(ws: &mut WorkingSet, then: ActionId) {
    let edges = ws.action(then).actions_before.clone();
    let node = ws.action(then).node;
    let filter = ActionFlags::OPTIONAL | ActionFlags::RUNNABLE;

    for edge in edges {
        let first = edge.action;
        let first_flags = action_flags_for_ordering(ws, first, node);
        let update = match ws.action(then).rsc {
            Some(rsc) => methods(ws.rsc(rsc).variant).update_ordered_actions,
            None => update_ordered_actions,
        };
        let changed = update(ws, first, then, node, first_flags, filter, edge.kind);

        if changed.contains(Updated::FIRST) {
            trace!(first = %ws.action(first).uuid, "Ordering changed first action");
            for after in ws.action(first).actions_after.clone() {
                update_action_for_orderings(ws, after.action);
            }
            update_action_for_orderings(ws, first);
        }
        if changed.contains(Updated::THEN) {
            trace!(then = %ws.action(then).uuid, "Ordering changed then action");
            for after in ws.action(then).actions_after.clone() {
                update_action_for_orderings(ws, after.action);
            }
        }
    }
}

/// Propagate flags along every ordering until the action graph stops
/// changing.
pub fn propagate_orderings(ws: &mut WorkingSet) {
    let mut passes = 0usize;
    loop {
        let before = fingerprint(ws);
        for id in 0..ws.actions().len() {
            update_action_for_orderings(ws, ActionId(id));
        }
        passes += 1;
        if fingerprint(ws) == before {
            break;
        }
    }
    debug!(passes, actions = ws.actions().len(), "Ordering propagation settled");
}

fn fingerprint(ws: &WorkingSet) -> Vec<(ActionFlags, usize)> {
    ws.actions()
        .iter()
        .map(|a| (a.flags, a.actions_before.len()))
        .collect()
}

// ── Configured orderings ──────────────────────────────────────────────────────

/// The task an ordering should address on `rsc`: groups and collectives are
/// ordered on their completion pseudo-actions when they come first, and
/// primitives only ever have executable tasks.
fn resolve_task(ws: &WorkingSet, rsc: ResourceId, task: Task, is_first: bool) -> Task {
    match ws.rsc(rsc).variant {
        Variant::Primitive => task.atomic(),
        _ if is_first => task.completion(),
        _ => task,
    }
}

/// Turn every configured ordering constraint into action edges.
pub fn apply_user_orderings(ws: &mut WorkingSet) {
    for ordering in ws.orderings().to_vec() {
        let first_task = resolve_task(ws, ordering.first, ordering.first_task, true);
        let then_task = resolve_task(ws, ordering.then, ordering.then_task, false);
        let kind = match ordering.kind {
            OrderingKind::Mandatory if first_task.is_bring_up() => {
                OrderingType::ORDERED | OrderingType::IMPLIES_THEN | OrderingType::RUNNABLE_LEFT
            }
            OrderingKind::Mandatory => OrderingType::ORDERED | OrderingType::IMPLIES_THEN,
            OrderingKind::Optional => OrderingType::ORDERED,
        };
        debug!(
            ordering = %ordering.id,
            first = %ws.rsc(ordering.first).name,
            %first_task,
            then = %ws.rsc(ordering.then).name,
            %then_task,
            "Applying ordering"
        );
        order_resource_actions(ws, ordering.first, first_task, ordering.then, then_task, kind);

        if !ordering.symmetrical {
            continue;
        }
        let (Some(inv_first), Some(inv_then)) =
            (ordering.then_task.inverse(), ordering.first_task.inverse())
        else {
            trace!(ordering = %ordering.id, "No inverse ordering for these tasks");
            continue;
        };
        let inv_first = resolve_task(ws, ordering.then, inv_first, true);
        let inv_then = resolve_task(ws, ordering.first, inv_then, false);
        let kind = match ordering.kind {
            OrderingKind::Mandatory => OrderingType::ORDERED | OrderingType::IMPLIES_FIRST,
            OrderingKind::Optional => OrderingType::ORDERED,
        };
        order_resource_actions(ws, ordering.then, inv_first, ordering.first, inv_then, kind);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKey;
    use crate::working_set::OrderingConstraint;

    fn chain() -> (WorkingSet, Vec<ActionId>) {
        let mut ws = WorkingSet::new();
        let n1 = ws.add_node("node1");
        let ids = ["a", "b", "c"]
            .iter()
            .map(|name| {
                let rsc = ws.add_resource(name, Variant::Primitive, None).unwrap();
                ws.new_action(ActionKey::new(Some(rsc), Task::Start), Some(n1), true)
            })
            .collect();
        (ws, ids)
    }

    #[test]
    fn unrunnable_first_ripples_down_the_chain() {
        let (mut ws, a) = chain();
        ws.action_mut(a[0]).clear(ActionFlags::RUNNABLE);
        ws.order_actions(a[0], a[1], OrderingType::RUNNABLE_LEFT);
        ws.order_actions(a[1], a[2], OrderingType::RUNNABLE_LEFT);

        update_action_for_orderings(&mut ws, a[1]);
        assert!(!ws.action(a[1]).is_runnable());
        assert!(!ws.action(a[2]).is_runnable());
        assert_eq!(ws.action(a[2]).reason.as_deref(), Some("b_start_0 is unrunnable"));
    }

    #[test]
    fn mandatory_then_pulls_first() {
        let (mut ws, a) = chain();
        ws.action_mut(a[2]).clear(ActionFlags::OPTIONAL);
        ws.order_actions(a[0], a[1], OrderingType::IMPLIES_FIRST);
        ws.order_actions(a[1], a[2], OrderingType::IMPLIES_FIRST);

        propagate_orderings(&mut ws);
        assert!(!ws.action(a[0]).is_optional());
        assert!(!ws.action(a[1]).is_optional());
    }

    #[test]
    fn implies_then_needs_the_optional_filter() {
        let (mut ws, a) = chain();
        let flags = ActionFlags::RUNNABLE;
        let changed = update_ordered_actions(
            &mut ws,
            a[0],
            a[1],
            None,
            flags,
            ActionFlags::RUNNABLE,
            OrderingType::IMPLIES_THEN,
        );
        assert!(changed.is_empty());
        assert!(ws.action(a[1]).is_optional());

        let changed = update_ordered_actions(
            &mut ws,
            a[0],
            a[1],
            None,
            flags,
            ActionFlags::OPTIONAL,
            OrderingType::IMPLIES_THEN,
        );
        assert_eq!(changed, Updated::THEN);
        assert!(!ws.action(a[1]).is_optional());
    }

    #[test]
    fn propagation_never_restores_flags() {
        let (mut ws, a) = chain();
        ws.action_mut(a[0]).flags = ActionFlags::empty();
        ws.order_actions(a[0], a[1], OrderingType::IMPLIES_THEN | OrderingType::RUNNABLE_LEFT);
        ws.order_actions(a[1], a[2], OrderingType::ORDERED);
        ws.order_actions(a[2], a[0], OrderingType::IMPLIES_FIRST);

        let mut seen: Vec<ActionFlags> = ws.actions().iter().map(|x| x.flags).collect();
        for _ in 0..3 {
            propagate_orderings(&mut ws);
            for (i, action) in ws.actions().iter().enumerate() {
                assert!(seen[i].contains(action.flags), "{} regained a flag", action.uuid);
                seen[i] = action.flags;
            }
        }
        assert!(!ws.action(a[1]).is_runnable());
        assert!(!ws.action(a[1]).is_optional());
    }

    #[test]
    fn group_completion_is_unrunnable_with_an_unrunnable_member() {
        let mut ws = WorkingSet::new();
        let n1 = ws.add_node("node1");
        let group = ws.add_resource("g", Variant::Group, None).unwrap();
        let m1 = ws.add_resource("m1", Variant::Primitive, Some(group)).unwrap();
        let m2 = ws.add_resource("m2", Variant::Primitive, Some(group)).unwrap();
        ws.new_action(ActionKey::new(Some(m1), Task::Start), Some(n1), false);
        let s2 = ws.new_action(ActionKey::new(Some(m2), Task::Start), Some(n1), true);
        ws.action_mut(s2).clear(ActionFlags::RUNNABLE);
        let start = ws.new_pseudo_action(group, Task::Start, true, true);
        let started = ws.new_pseudo_action(group, Task::Started, true, true);

        let flags = group_action_flags(&mut ws, start, None);
        assert!(!flags.contains(ActionFlags::OPTIONAL));
        assert!(flags.contains(ActionFlags::RUNNABLE));
        assert!(!ws.action(start).is_optional());

        let flags = group_action_flags(&mut ws, started, Some(n1));
        assert!(!flags.contains(ActionFlags::RUNNABLE));
        assert!(ws.action(started).is_runnable());
    }

    #[test]
    fn symmetrical_ordering_adds_the_inverse() {
        let mut ws = WorkingSet::new();
        let n1 = ws.add_node("node1");
        let db = ws.add_resource("db", Variant::Primitive, None).unwrap();
        let web = ws.add_resource("web", Variant::Primitive, None).unwrap();
        for rsc in [db, web] {
            ws.new_action(ActionKey::new(Some(rsc), Task::Start), Some(n1), true);
            ws.new_action(ActionKey::new(Some(rsc), Task::Stop), Some(n1), true);
        }
        ws.add_ordering(OrderingConstraint {
            id: "db-then-web".into(),
            first: db,
            first_task: Task::Start,
            then: web,
            then_task: Task::Start,
            kind: OrderingKind::Mandatory,
            symmetrical: true,
        });

        apply_user_orderings(&mut ws);
        let db_start = ws.find_action(db, Task::Start, None).unwrap();
        let web_start = ws.find_action(web, Task::Start, None).unwrap();
        let db_stop = ws.find_action(db, Task::Stop, None).unwrap();
        let web_stop = ws.find_action(web, Task::Stop, None).unwrap();

        let forward = ws.action(db_start).actions_after[0];
        assert_eq!(forward.action, web_start);
        assert!(forward.kind.contains(OrderingType::RUNNABLE_LEFT));
        let inverse = ws.action(web_stop).actions_after[0];
        assert_eq!(inverse.action, db_stop);
        assert_eq!(inverse.kind, OrderingType::ORDERED | OrderingType::IMPLIES_FIRST);
    }

    #[test]
    fn collective_first_orders_on_completion() {
        let mut ws = WorkingSet::new();
        ws.add_node("node1");
        let clone = ws.add_resource("db", Variant::Clone, None).unwrap();
        assert_eq!(resolve_task(&ws, clone, Task::Start, true), Task::Started);
        assert_eq!(resolve_task(&ws, clone, Task::Start, false), Task::Start);
        let prim = ws.add_resource("web", Variant::Primitive, None).unwrap();
        assert_eq!(resolve_task(&ws, prim, Task::Stopped, false), Task::Stop);
    }
}
