/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-variant capability table.
//!
//! Every variant answers the same four questions.  Instead of trait objects,
//! each variant gets a static table of plain function pointers, selected by
//! an exhaustive `match` so a new variant cannot be added without deciding
//! all four.
//!
//! | Variant | `assign` | `create_actions` | `action_flags` | `update_ordered_actions` |
//! |---|---|---|---|---|
//! | primitive | best allowed node | stop/start/promote/demote | raw flags | single pair |
//! | group | members in order | members + pseudo actions | all members | pair + members |
//! | clone / bundle | instance driver | instances + aggregates | any instance | interleave-aware |

use crate::action::{ActionFlags, ActionId, OrderingType, Updated};
use crate::resource::{NodeId, ResourceId, Variant};
use crate::scheduler::SchedulerError;
use crate::working_set::WorkingSet;
use crate::{actions, assign, ordering};

/// Choose a node (or none) for a resource.  `prefer` is a tie-break hint;
/// `stop_if_fail` makes a failed assignment final (next role stopped).
pub type AssignFn =
    fn(&mut WorkingSet, ResourceId, Option<NodeId>, bool) -> Result<Option<NodeId>, SchedulerError>;

/// Populate a resource's actions from its current state and assignment.
pub type CreateActionsFn = fn(&mut WorkingSet, ResourceId);

/// Flags of an action for ordering purposes, optionally scoped to a node.
pub type ActionFlagsFn = fn(&mut WorkingSet, ActionId, Option<NodeId>) -> ActionFlags;

/// Apply one ordering edge `(first, then)`: `flags` are `first`'s effective
/// flags, `filter` selects which bits may be propagated.
pub type UpdateOrderedFn = fn(
    &mut WorkingSet,
    ActionId,
    ActionId,
    Option<NodeId>,
    ActionFlags,
    ActionFlags,
    OrderingType,
) -> Updated;

pub struct VariantMethods {
    pub assign: AssignFn,
    pub create_actions: CreateActionsFn,
    pub action_flags: ActionFlagsFn,
    pub update_ordered_actions: UpdateOrderedFn,
}

static PRIMITIVE_METHODS: VariantMethods = VariantMethods {
    assign: assign::assign_primitive,
    create_actions: actions::create_primitive_actions,
    action_flags: ordering::primitive_action_flags,
    update_ordered_actions: ordering::update_ordered_actions,
};

static GROUP_METHODS: VariantMethods = VariantMethods {
    assign: assign::assign_group,
    create_actions: actions::create_group_actions,
    action_flags: ordering::group_action_flags,
    update_ordered_actions: ordering::update_group_ordered_actions,
};

static COLLECTIVE_METHODS: VariantMethods = VariantMethods {
    assign: assign::instances::assign_collective,
    create_actions: actions::instances::create_collective_actions,
    action_flags: ordering::instances::collective_action_flags,
    update_ordered_actions: ordering::instances::multi_update_actions,
};

/// The capability table for `variant`.
pub fn methods(variant: Variant) -> &'static VariantMethods {
    match variant {
        Variant::Primitive => &PRIMITIVE_METHODS,
        Variant::Group => &GROUP_METHODS,
        Variant::Clone | Variant::Bundle => &COLLECTIVE_METHODS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::INFINITY;

    #[test]
    fn primitive_assign_dispatches_to_best_node() {
        let mut ws = WorkingSet::new();
        ws.add_node("node1");
        let n2 = ws.add_node("node2");
        let rsc = ws.add_resource("r", Variant::Primitive, None).unwrap();
        ws.resource_location(rsc, Some(n2), 10, "location");

        let chosen = (methods(Variant::Primitive).assign)(&mut ws, rsc, None, true).unwrap();
        assert_eq!(chosen, Some(n2));
    }

    #[test]
    fn collective_assign_returns_no_single_node() {
        let mut ws = WorkingSet::new();
        ws.add_node("node1");
        ws.add_node("node2");
        let clone = ws.add_resource("c", Variant::Clone, None).unwrap();
        let i0 = ws.add_resource("c:0", Variant::Primitive, Some(clone)).unwrap();
        let i1 = ws.add_resource("c:1", Variant::Primitive, Some(clone)).unwrap();

        let chosen = (methods(Variant::Clone).assign)(&mut ws, clone, None, true).unwrap();
        assert_eq!(chosen, None);
        assert!(ws.rsc(i0).assigned_to.is_some());
        assert!(ws.rsc(i1).assigned_to.is_some());
        assert_ne!(ws.rsc(i0).assigned_to, ws.rsc(i1).assigned_to);
        assert!(!ws.rsc(clone).is_provisional());
    }

    #[test]
    fn banned_primitive_stays_unassigned() {
        let mut ws = WorkingSet::new();
        ws.add_node("node1");
        let rsc = ws.add_resource("r", Variant::Primitive, None).unwrap();
        ws.resource_location(rsc, None, -INFINITY, "ban");

        let chosen = (methods(Variant::Primitive).assign)(&mut ws, rsc, None, true).unwrap();
        assert_eq!(chosen, None);
        assert!(!ws.rsc(rsc).is_provisional());
    }
}
