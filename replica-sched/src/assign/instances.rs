/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Assigning the instances of a clone or bundle.
//!
//! The driver ([`assign_instances`]) makes two passes over the instances:
//!
//! 1. **Stickiness**: each instance that is running somewhere tries to stay
//!    there, as long as that node does not already hold its fair share
//!    (`max_total / available`).  Such a try is *speculative*: if the
//!    assigner picks a different node, the instance's tables are restored
//!    and it is left provisional.
//! 2. **Final**: every instance still provisional is assigned normally, or
//!    banned everywhere once `max_total` instances are placed.
//!
//! Per-node instance counts live in a [`NodeCounts`] map created by the
//! driver for one pass and passed down explicitly.

use tracing::{debug, info, trace, warn};

use crate::resource::{NodeCounts, NodeId, ResourceFlags, ResourceId, Variant};
use crate::score::INFINITY;
use crate::scheduler::{BanReason, SchedulerError};
use crate::variant::methods;
use crate::working_set::WorkingSet;

use super::colocation::{add_dependent_scores, propagate_colocations};
use super::unassign_resource;

// ── Eligibility ───────────────────────────────────────────────────────────────

/// Whether `instance` may be placed on `node` in the current pass.
pub fn can_run_instance(
    ws: &WorkingSet,
    instance: ResourceId,
    node: NodeId,
    max_per_node: u32,
    counts: &NodeCounts,
) -> Result<(), BanReason> {
    if ws.rsc(instance).is_set(ResourceFlags::ORPHAN) {
        return Err(BanReason::Orphaned);
    }
    if !ws.node(node).is_eligible() {
        return Err(BanReason::NodeCannotRunResources);
    }
    let top = ws
        .top_allowed_node(instance, node)
        .ok_or(BanReason::NotAllowed)?;
    if top.weight < 0 {
        return Err(BanReason::NegativeParentScore { score: top.weight });
    }
    if counts.get(&node).copied().unwrap_or(0) >= max_per_node {
        return Err(BanReason::NodeFull { max_per_node });
    }
    Ok(())
}

/// Ban `instance` from every allowed node it cannot run on.
fn ban_unavailable_allowed_nodes(
    ws: &mut WorkingSet,
    instance: ResourceId,
    max_per_node: u32,
    counts: &NodeCounts,
) {
    let nodes: Vec<NodeId> = ws.rsc(instance).allowed_nodes.keys().copied().collect();
    for node in nodes {
        if let Err(reason) = can_run_instance(ws, instance, node, max_per_node, counts) {
            if reason == BanReason::NotAllowed {
                warn!(
                    instance = %ws.rsc(instance).name,
                    node = %ws.node(node).name,
                    "Node is not allowed for the collective"
                );
            } else {
                trace!(
                    instance = %ws.rsc(instance).name,
                    node = %ws.node(node).name,
                    %reason,
                    "Instance cannot run on node"
                );
            }
            ws.resource_location(instance, Some(node), -INFINITY, "instance-ban");
        }
    }
}

// ── Single instance ───────────────────────────────────────────────────────────

/// Assign one instance, to `prefer` only (speculative) or to the best node.
///
/// Returns whether the instance ended up with a node.  A speculative
/// assignment that lands anywhere but `prefer` is rolled back completely.
pub fn assign_instance(
    ws: &mut WorkingSet,
    instance: ResourceId,
    prefer: Option<NodeId>,
    include_all: bool,
    max_per_node: u32,
    counts: &mut NodeCounts,
) -> Result<bool, SchedulerError> {
    trace!(
        instance = %ws.rsc(instance).name,
        prefer = %ws.node_name(prefer),
        colocations = if include_all { "all" } else { "essential" },
        "Assigning instance"
    );

    let r = ws.rsc(instance);
    if !r.is_provisional() {
        return Ok(ws.location(instance, false).is_some());
    }
    if r.is_set(ResourceFlags::ALLOCATING) {
        debug!("Assignment loop detected involving {} colocations", r.name);
        return Ok(false);
    }

    if let Some(prefer) = prefer {
        match ws.allowed_node(instance, prefer) {
            Some(entry) if entry.weight >= 0 => {}
            _ => {
                trace!(
                    instance = %ws.rsc(instance).name,
                    node = %ws.node_name(Some(prefer)),
                    "Not assigning instance to preferred node: unavailable"
                );
                return Ok(false);
            }
        }
    }

    if let Some(parent) = ws.rsc(instance).parent {
        propagate_colocations(ws, parent, instance, include_all);
    }

    let snapshot = prefer.map(|_| ws.snapshot_tables(instance));
    ban_unavailable_allowed_nodes(ws, instance, max_per_node, counts);

    let variant = ws.rsc(instance).variant;
    let mut chosen = (methods(variant).assign)(ws, instance, prefer, prefer.is_none())?;

    if let (Some(prefer), Some(snapshot)) = (prefer, snapshot) {
        if chosen != Some(prefer) {
            info!(
                "Not assigning {} to preferred node {}: {} is better",
                ws.rsc(instance).name,
                ws.node_name(Some(prefer)),
                ws.node_name(chosen)
            );
            ws.restore_tables(snapshot);
            unassign_resource(ws, instance);
            chosen = None;
        }
    }

    let Some(node) = chosen else {
        return Ok(false);
    };
    if ws.top_allowed_node(instance, node).is_some() {
        *counts.entry(node).or_insert(0) += 1;
    } else if ws.rsc(instance).is_set(ResourceFlags::MANAGED) {
        warn!(
            instance = %ws.rsc(instance).name,
            node = %ws.node(node).name,
            "Instance assigned to a node its collective does not allow; count not tracked"
        );
    }
    Ok(true)
}

/// Node `instance` should stay on in the stickiness pass, if any.
fn preferred_node(
    ws: &WorkingSet,
    instance: ResourceId,
    optimal_per_node: u32,
    counts: &NodeCounts,
) -> Option<NodeId> {
    let r = ws.rsc(instance);
    if r.running_on.is_empty() || !r.is_provisional() || r.is_set(ResourceFlags::FAILED) {
        return None;
    }
    let node = ws.location(instance, true)?;
    if !ws.node(node).is_eligible() {
        trace!(instance = %r.name, node = %ws.node(node).name, "Current node cannot run resources");
        return None;
    }
    if ws.top_allowed_node(instance, node).is_some()
        && counts.get(&node).copied().unwrap_or(0) >= optimal_per_node
    {
        trace!(
            instance = %r.name,
            node = %ws.node(node).name,
            optimal_per_node,
            "Current node already has the optimal instance count"
        );
        return None;
    }
    Some(node)
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// Assign `instances` of `collective`: at most `max_total` overall and
/// `max_per_node` on any one node.
pub fn assign_instances(
    ws: &mut WorkingSet,
    collective: ResourceId,
    instances: &[ResourceId],
    max_total: u32,
    max_per_node: u32,
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
    ws.rsc_mut(collective).flags.insert(ResourceFlags::ALLOCATING);

    let mut counts: NodeCounts = ws
        .rsc(collective)
        .allowed_nodes
        .keys()
        .map(|&node| (node, 0))
        .collect();
    let available = ws
        .rsc(collective)
        .allowed_nodes
        .values()
        .filter(|a| ws.node_available(a, false))
        .count() as u32;

    let include_all = max_total < available;
    let optimal_per_node = if available > 0 {
        (max_total / available).max(1)
    } else {
        1
    };
    debug!(
        collective = %ws.rsc(collective).name,
        max_total,
        available,
        max_per_node,
        optimal_per_node,
        "Assigning instances"
    );

    let mut assigned: u32 = 0;

    for &instance in instances {
        if assigned >= max_total {
            break;
        }
        propagate_colocations(ws, collective, instance, include_all);

        if let Some(current) = preferred_node(ws, instance, optimal_per_node, &counts) {
            if assign_instance(ws, instance, Some(current), include_all, max_per_node, &mut counts)? {
                trace!(
                    instance = %ws.rsc(instance).name,
                    node = %ws.node(current).name,
                    "Assigned instance to its current node"
                );
                assigned += 1;
            }
        }
    }
    trace!(assigned, max_total, "Assigned instances to their current nodes");

    for &instance in instances {
        if !ws.rsc(instance).is_provisional() {
            continue;
        }

        if let Some(current) = ws.rsc(instance).current_node() {
            let allowed = ws
                .top_allowed_node(instance, current)
                .is_some_and(|a| a.weight > -INFINITY);
            if !allowed {
                let r = ws.rsc(instance);
                info!(
                    "{}{} is running on {} which is no longer allowed",
                    if r.is_set(ResourceFlags::MANAGED) { "" } else { "Unmanaged resource " },
                    r.name,
                    ws.node(current).name
                );
            }
        }

        if assigned >= max_total {
            debug!(
                instance = %ws.rsc(instance).name,
                max_total,
                "Not assigning instance: maximum instances already assigned"
            );
            ws.resource_location(instance, None, -INFINITY, "collective_limit_reached");
        } else if assign_instance(ws, instance, None, include_all, max_per_node, &mut counts)? {
            assigned += 1;
        }
    }

    debug!(
        "Assigned {} of {} possible instances of {}",
        assigned,
        max_total,
        ws.rsc(collective).name
    );
    ws.rsc_mut(collective)
        .flags
        .remove(ResourceFlags::ALLOCATING | ResourceFlags::PROVISIONAL);
    Ok(())
}

// ── Clone / bundle assign entry point ─────────────────────────────────────────

/// Instance limits of a collective: `(max_total, max_per_node)`.
///
/// Clones read `clone-max` (default: number of nodes) and `clone-node-max`
/// (default 1); bundles read `replicas` and `replicas-per-host` (both
/// default 1).
pub fn instance_limits(ws: &WorkingSet, collective: ResourceId) -> (u32, u32) {
    let r = ws.rsc(collective);
    match r.variant {
        Variant::Clone => (
            r.meta_u32("clone-max").unwrap_or(ws.nodes().len() as u32),
            r.meta_u32("clone-node-max").unwrap_or(1),
        ),
        Variant::Bundle => (
            r.meta_u32("replicas").unwrap_or(1),
            r.meta_u32("replicas-per-host").unwrap_or(1),
        ),
        Variant::Primitive | Variant::Group => (1, 1),
    }
}

/// Assign a clone or bundle: colocation primaries first, then the
/// instances, then (bundles) the resources inside the replica containers.
pub fn assign_collective(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    _prefer: Option<NodeId>,
    stop_if_fail: bool,
) -> Result<Option<NodeId>, SchedulerError> {
    let r = ws.rsc(rsc);
    if !r.is_provisional() {
        return Ok(None);
    }
    if r.is_set(ResourceFlags::ALLOCATING) {
        debug!("Assignment loop detected involving {}", r.name);
        return Ok(None);
    }
    ws.rsc_mut(rsc).flags.insert(ResourceFlags::ALLOCATING);

    for coloc in ws.rsc(rsc).this_with.clone() {
        let primary = ws.colocation(coloc).primary;
        if ws.rsc(primary).is_provisional() {
            let variant = ws.rsc(primary).variant;
            (methods(variant).assign)(ws, primary, None, true)?;
        }
    }
    for coloc in ws.rsc(rsc).with_this.clone() {
        add_dependent_scores(ws, rsc, coloc);
    }

    let (max_total, max_per_node) = instance_limits(ws, rsc);
    let instances = ws.rsc(rsc).children.clone();
    assign_instances(ws, rsc, &instances, max_total, max_per_node)?;

    if ws.rsc(rsc).variant == Variant::Bundle {
        assign_contained(ws, rsc, stop_if_fail)?;
    }
    Ok(None)
}

/// Pin each replica's contained resource to its container's node.
fn assign_contained(
    ws: &mut WorkingSet,
    bundle: ResourceId,
    stop_if_fail: bool,
) -> Result<(), SchedulerError> {
    for container in ws.rsc(bundle).children.clone() {
        let Some(inner) = ws.rsc(container).contained else {
            continue;
        };
        let node = ws.rsc(container).assigned_to;
        let others: Vec<NodeId> = ws
            .rsc(inner)
            .allowed_nodes
            .keys()
            .copied()
            .filter(|&n| Some(n) != node)
            .collect();
        for n in others {
            ws.resource_location(inner, Some(n), -INFINITY, "bundle-replica");
        }

        let variant = ws.rsc(inner).variant;
        let chosen = (methods(variant).assign)(ws, inner, node, stop_if_fail)?;
        if node.is_some() && chosen != node {
            warn!(
                resource = %ws.rsc(inner).name,
                container = %ws.rsc(container).name,
                node = %ws.node_name(node),
                "Replica resource cannot run with its container"
            );
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::resource::Role;

    fn clone_with(nodes: &[&str], instances: usize) -> (WorkingSet, Vec<NodeId>, ResourceId, Vec<ResourceId>) {
        let mut ws = WorkingSet::new();
        let n = nodes.iter().map(|name| ws.add_node(name)).collect();
        let clone = ws.add_resource("db", Variant::Clone, None).unwrap();
        let inst = (0..instances)
            .map(|i| {
                ws.add_resource(&format!("db:{i}"), Variant::Primitive, Some(clone))
                    .unwrap()
            })
            .collect();
        (ws, n, clone, inst)
    }

    fn per_node(ws: &WorkingSet, instances: &[ResourceId]) -> BTreeMap<NodeId, u32> {
        let mut counts = BTreeMap::new();
        for &i in instances {
            if let Some(node) = ws.rsc(i).assigned_to {
                *counts.entry(node).or_insert(0) += 1;
            }
        }
        counts
    }

    fn run_on(ws: &mut WorkingSet, instance: ResourceId, node: NodeId) {
        let r = ws.rsc_mut(instance);
        r.running_on = vec![node];
        r.role = Role::Started;
    }

    #[test]
    fn caps_are_never_exceeded() {
        let (mut ws, _n, clone, inst) = clone_with(&["node1", "node2", "node3"], 5);
        assign_instances(&mut ws, clone, &inst, 4, 2).unwrap();

        let counts = per_node(&ws, &inst);
        assert!(counts.values().sum::<u32>() <= 4);
        assert!(counts.values().all(|&c| c <= 2));
        assert_eq!(ws.rsc(inst[4]).exclusions, vec!["collective_limit_reached"]);
        assert!(!ws.rsc(clone).is_provisional());
        assert!(!ws.rsc(clone).is_set(ResourceFlags::ALLOCATING));
    }

    #[test]
    fn instances_stay_on_their_current_nodes() {
        let (mut ws, n, clone, inst) = clone_with(&["nodeA", "nodeB", "nodeC"], 3);
        // Running in reverse name order so that fresh placement would differ.
        run_on(&mut ws, inst[0], n[2]);
        run_on(&mut ws, inst[1], n[1]);
        run_on(&mut ws, inst[2], n[0]);

        assign_instances(&mut ws, clone, &inst, 3, 1).unwrap();
        assert_eq!(ws.rsc(inst[0]).assigned_to, Some(n[2]));
        assert_eq!(ws.rsc(inst[1]).assigned_to, Some(n[1]));
        assert_eq!(ws.rsc(inst[2]).assigned_to, Some(n[0]));
    }

    #[test]
    fn assigned_instance_is_left_alone() {
        let (mut ws, _n, clone, inst) = clone_with(&["node1", "node2"], 2);
        assign_instances(&mut ws, clone, &inst, 2, 1).unwrap();
        let node = ws.rsc(inst[0]).assigned_to;
        let table = ws.rsc(inst[0]).allowed_nodes.clone();

        let mut counts = NodeCounts::new();
        for _ in 0..2 {
            assert!(assign_instance(&mut ws, inst[0], None, false, 1, &mut counts).unwrap());
            assert_eq!(ws.rsc(inst[0]).assigned_to, node);
            assert_eq!(ws.rsc(inst[0]).allowed_nodes, table);
        }
        assert!(counts.is_empty());
    }

    #[test]
    fn rejected_speculative_assignment_is_rolled_back() {
        let (mut ws, n, clone, inst) = clone_with(&["node1", "node2", "node3"], 1);
        ws.resource_location(inst[0], Some(n[1]), 100, "location");
        run_on(&mut ws, inst[0], n[0]);
        ws.rsc_mut(clone).flags.insert(ResourceFlags::ALLOCATING);
        let before = ws.rsc(inst[0]).allowed_nodes.clone();

        let mut counts = NodeCounts::from([(n[2], 1)]);
        let ok = assign_instance(&mut ws, inst[0], Some(n[0]), false, 1, &mut counts).unwrap();
        assert!(!ok);
        assert_eq!(ws.rsc(inst[0]).allowed_nodes, before);
        assert!(ws.rsc(inst[0]).is_provisional());
        assert_eq!(ws.rsc(inst[0]).assigned_to, None);
        assert_eq!(counts, NodeCounts::from([(n[2], 1)]));
    }

    #[test]
    fn negative_preferred_node_fails_fast() {
        let (mut ws, n, clone, inst) = clone_with(&["node1", "node2"], 1);
        ws.resource_location(inst[0], Some(n[0]), -5, "location");
        ws.rsc_mut(clone).flags.insert(ResourceFlags::ALLOCATING);

        let mut counts = NodeCounts::new();
        assert!(!assign_instance(&mut ws, inst[0], Some(n[0]), false, 1, &mut counts).unwrap());
        assert!(ws.rsc(inst[0]).is_provisional());
    }

    #[test]
    fn reentrant_assignment_fails() {
        let (mut ws, _n, clone, inst) = clone_with(&["node1"], 1);
        ws.rsc_mut(clone).flags.insert(ResourceFlags::ALLOCATING);
        ws.rsc_mut(inst[0]).flags.insert(ResourceFlags::ALLOCATING);

        let mut counts = NodeCounts::new();
        assert!(!assign_instance(&mut ws, inst[0], None, false, 1, &mut counts).unwrap());
        assert!(ws.rsc(inst[0]).is_provisional());
    }

    #[test]
    fn full_and_unhealthy_nodes_are_banned() {
        let (mut ws, n, clone, inst) = clone_with(&["node1", "node2", "node3"], 1);
        ws.node_mut(n[0]).standby = true;
        let counts = NodeCounts::from([(n[1], 1)]);

        assert_eq!(
            can_run_instance(&ws, inst[0], n[0], 1, &counts),
            Err(BanReason::NodeCannotRunResources)
        );
        assert_eq!(
            can_run_instance(&ws, inst[0], n[1], 1, &counts),
            Err(BanReason::NodeFull { max_per_node: 1 })
        );
        assert_eq!(can_run_instance(&ws, inst[0], n[2], 1, &counts), Ok(()));

        ws.resource_location(clone, Some(n[2]), -1, "location");
        assert_eq!(
            can_run_instance(&ws, inst[0], n[2], 1, &counts),
            Err(BanReason::NegativeParentScore { score: -1 })
        );

        ws.rsc_mut(inst[0]).flags.insert(ResourceFlags::ORPHAN);
        assert_eq!(
            can_run_instance(&ws, inst[0], n[2], 1, &counts),
            Err(BanReason::Orphaned)
        );
    }

    #[test]
    fn four_nodes_get_one_instance_each() {
        let (mut ws, _n, clone, inst) = clone_with(&["N1", "N2", "N3", "N4"], 4);
        assign_instances(&mut ws, clone, &inst, 4, 1).unwrap();

        let counts = per_node(&ws, &inst);
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&c| c == 1));
    }

    #[test]
    fn cloned_group_counts_at_the_top_level() {
        let mut ws = WorkingSet::new();
        let n1 = ws.add_node("node1");
        let n2 = ws.add_node("node2");
        let clone = ws.add_resource("cg", Variant::Clone, None).unwrap();
        let mut groups = Vec::new();
        for i in 0..2 {
            let g = ws.add_resource(&format!("cg:{i}"), Variant::Group, Some(clone)).unwrap();
            ws.add_resource(&format!("cg:{i}/a"), Variant::Primitive, Some(g)).unwrap();
            ws.add_resource(&format!("cg:{i}/b"), Variant::Primitive, Some(g)).unwrap();
            groups.push(g);
        }

        assign_instances(&mut ws, clone, &groups, 2, 1).unwrap();
        let placed: Vec<_> = groups.iter().map(|&g| ws.rsc(g).assigned_to).collect();
        assert_eq!(placed, vec![Some(n1), Some(n2)]);
        for &g in &groups {
            for &member in &ws.rsc(g).children {
                assert_eq!(ws.rsc(member).assigned_to, ws.rsc(g).assigned_to);
            }
        }
    }

    #[test]
    fn driver_rejects_foreign_instances_and_primitives() {
        let (mut ws, _n, clone, _inst) = clone_with(&["node1"], 1);
        let loner = ws.add_resource("loner", Variant::Primitive, None).unwrap();

        let err = assign_instances(&mut ws, clone, &[loner], 1, 1).unwrap_err();
        assert!(matches!(err, SchedulerError::ForeignInstance { .. }));
        let err = assign_instances(&mut ws, loner, &[], 1, 1).unwrap_err();
        assert!(matches!(err, SchedulerError::NotCollective { .. }));
    }

    #[test]
    fn bundle_replica_follows_its_container() {
        let mut ws = WorkingSet::new();
        ws.add_node("node1");
        let n2 = ws.add_node("node2");
        let bundle = ws.add_resource("web", Variant::Bundle, None).unwrap();
        let container = ws.add_resource("web-0", Variant::Primitive, Some(bundle)).unwrap();
        let inner = ws.add_contained(container, "httpd", Variant::Primitive).unwrap();
        ws.resource_location(container, Some(n2), 10, "location");

        assign_collective(&mut ws, bundle, None, true).unwrap();
        assert_eq!(ws.rsc(container).assigned_to, Some(n2));
        assert_eq!(ws.rsc(inner).assigned_to, Some(n2));
    }
}
