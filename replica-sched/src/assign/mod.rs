/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Node assignment.
//!
//! [`assign_primitive`] is the single-resource primitive every other
//! assigner bottoms out in.  For one resource it:
//!
//! 1. assigns the parent first when the parent is still provisional,
//! 2. applies mandatory colocations, then optional ones (see
//!    [`colocation`]),
//! 3. bans every node if the resource must stop,
//! 4. keeps unmanaged resources where they are, and otherwise
//! 5. picks the best node from the sorted allowed-node table.
//!
//! The `ALLOCATING` flag marks a resource whose assignment is in progress.
//! Reaching it again through a colocation chain breaks the loop: the
//! re-entrant call fails and the outer call carries on without that
//! colocation.
//!
//! Collectives are handled in [`instances`].

pub mod colocation;
pub mod instances;

pub use colocation::propagate_colocations;
pub use instances::{assign_instance, assign_instances, can_run_instance};

use tracing::{debug, info, trace, warn};

use crate::action::{ActionFlags, Task};
use crate::resource::{AllowedNode, ColocationId, NodeId, ResourceFlags, ResourceId, Role, Variant};
use crate::score::{readable_score, INFINITY};
use crate::scheduler::SchedulerError;
use crate::variant::methods;
use crate::working_set::WorkingSet;

// ── Primitive ─────────────────────────────────────────────────────────────────

/// Assign a primitive to a node (or to none).
///
/// `prefer` wins only if it scores at least as well as the best node and is
/// available.  With `stop_if_fail`, ending up without a node sets the next
/// role to stopped.
pub fn assign_primitive(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    prefer: Option<NodeId>,
    stop_if_fail: bool,
) -> Result<Option<NodeId>, SchedulerError> {
    if let Some(parent) = ws.rsc(rsc).parent {
        let p = ws.rsc(parent);
        if p.is_provisional() && !p.is_set(ResourceFlags::ALLOCATING) {
            let variant = p.variant;
            debug!(resource = %ws.rsc(rsc).name, parent = %p.name, "Assigning parent first");
            (methods(variant).assign)(ws, parent, prefer, stop_if_fail)?;
        }
    }

    let r = ws.rsc(rsc);
    if !r.is_provisional() {
        return Ok(r.assigned_to);
    }
    if r.is_set(ResourceFlags::ALLOCATING) {
        debug!("Breaking assignment loop involving {}", r.name);
        return Ok(None);
    }
    ws.rsc_mut(rsc).flags.insert(ResourceFlags::ALLOCATING);

    let this_with = this_with_colocations(ws, rsc);
    let with_this = with_this_colocations(ws, rsc);
    for mandatory in [true, false] {
        for &coloc in &this_with {
            if ws.colocation(coloc).is_mandatory() == mandatory {
                colocation::apply_this_with(ws, rsc, coloc)?;
            }
        }
        for &coloc in &with_this {
            if ws.colocation(coloc).is_mandatory() == mandatory {
                colocation::add_dependent_scores(ws, rsc, coloc);
            }
        }
    }

    if ws.rsc(rsc).next_role == Some(Role::Stopped) {
        trace!(resource = %ws.rsc(rsc).name, "Banning from all nodes: next role is stopped");
        ws.resource_location(rsc, None, -INFINITY, "target-role");
    }

    if !ws.rsc(rsc).is_set(ResourceFlags::MANAGED) {
        let current = ws.rsc(rsc).current_node();
        info!(
            resource = %ws.rsc(rsc).name,
            node = %ws.node_name(current),
            "Unmanaged resource stays on its current node"
        );
        if current.is_some() {
            let role = ws.rsc(rsc).role;
            ws.rsc_mut(rsc).next_role = Some(role);
        }
        assign_resource(ws, rsc, current, true, stop_if_fail);
    } else {
        let chosen = assign_best_node(ws, rsc, prefer, stop_if_fail);
        let r = ws.rsc(rsc);
        if chosen.is_none() {
            if r.is_set(ResourceFlags::ORPHAN) {
                info!(resource = %r.name, "Stopping orphan resource");
            } else {
                debug!(resource = %r.name, "Resource cannot run anywhere");
            }
        }
    }

    ws.rsc_mut(rsc).flags.remove(ResourceFlags::ALLOCATING);
    Ok(ws.rsc(rsc).assigned_to)
}

/// Pick the best allowed node for `rsc` and assign it there.
fn assign_best_node(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    prefer: Option<NodeId>,
    stop_if_fail: bool,
) -> Option<NodeId> {
    let current = ws.rsc(rsc).current_node();
    let nodes = ws.sorted_nodes(&ws.rsc(rsc).allowed_nodes, current);
    let best = nodes.first().copied();
    let name = ws.rsc(rsc).name.clone();

    let mut chosen: Option<AllowedNode> = None;
    if let (Some(prefer), Some(best)) = (prefer, best) {
        match ws.allowed_node(rsc, prefer) {
            None => trace!(resource = %name, node = %ws.node_name(Some(prefer)), "Preferred node is not allowed"),
            Some(entry) if entry.weight < best.weight => trace!(
                resource = %name,
                node = %ws.node_name(Some(prefer)),
                score = %readable_score(entry.weight),
                "Preferred node scores below the best node"
            ),
            Some(entry) if !ws.node_available(&entry, true) => trace!(
                resource = %name,
                node = %ws.node_name(Some(prefer)),
                "Preferred node is unavailable"
            ),
            Some(entry) => chosen = Some(entry),
        }
    }

    if chosen.is_none() {
        if let Some(mut pick) = best {
            let is_instance = ws
                .rsc(rsc)
                .parent
                .is_some_and(|p| ws.rsc(p).variant.is_collective());

            // Among equally good nodes keep the current one.
            if !is_instance && pick.weight > 0 && ws.node_available(&pick, false) {
                if let Some(running) = current {
                    let mut equal = 1;
                    for other in nodes.iter().skip(1) {
                        if other.weight != pick.weight {
                            break;
                        }
                        if other.node == running {
                            pick = *other;
                        }
                        equal += 1;
                    }
                    if equal > 1 {
                        let msg = format!(
                            "Chose {} for {} from {} nodes with score {}",
                            ws.node_name(Some(pick.node)),
                            name,
                            equal,
                            readable_score(pick.weight)
                        );
                        if pick.weight >= INFINITY {
                            warn!("{msg}");
                        } else {
                            info!("{msg}");
                        }
                    }
                }
            }
            chosen = Some(pick);
        }
    }

    assign_resource(ws, rsc, chosen.map(|a| a.node), false, stop_if_fail);
    ws.rsc(rsc).assigned_to
}

// ── Group ─────────────────────────────────────────────────────────────────────

/// Assign a group's members in order.  The group itself is placed where its
/// first placed member went.
pub fn assign_group(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    prefer: Option<NodeId>,
    stop_if_fail: bool,
) -> Result<Option<NodeId>, SchedulerError> {
    let r = ws.rsc(rsc);
    if !r.is_provisional() {
        return Ok(r.assigned_to);
    }
    if r.is_set(ResourceFlags::ALLOCATING) {
        debug!("Assignment loop detected involving group {}", r.name);
        return Ok(None);
    }
    ws.rsc_mut(rsc).flags.insert(ResourceFlags::ALLOCATING);

    let mut first_node = None;
    for member in ws.rsc(rsc).children.clone() {
        let variant = ws.rsc(member).variant;
        let node = (methods(variant).assign)(ws, member, prefer, stop_if_fail)?;
        if first_node.is_none() {
            first_node = node;
        }
    }

    let r = ws.rsc_mut(rsc);
    r.assigned_to = first_node;
    r.flags.remove(ResourceFlags::ALLOCATING | ResourceFlags::PROVISIONAL);
    debug!(group = %ws.rsc(rsc).name, node = %ws.node_name(first_node), "Group assigned");
    Ok(first_node)
}

// ── Assign / unassign ─────────────────────────────────────────────────────────

/// Record `node` as the assignment of `rsc` and everything below it.
///
/// Without `force`, a node that is unknown to the resource, scores
/// negative, or cannot run resources is replaced by no node.  Returns
/// whether the assignment of any primitive changed.
pub fn assign_resource(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    node: Option<NodeId>,
    force: bool,
    stop_if_fail: bool,
) -> bool {
    let variant = ws.rsc(rsc).variant;
    if variant != Variant::Primitive {
        let mut changed = false;
        for child in ws.rsc(rsc).children.clone() {
            changed |= assign_resource(ws, child, node, force, stop_if_fail);
        }
        let r = ws.rsc_mut(rsc);
        r.flags.remove(ResourceFlags::PROVISIONAL);
        if variant == Variant::Group {
            r.assigned_to = node;
        }
        return changed;
    }

    let mut node = node;
    if !force {
        if let Some(n) = node {
            let usable = ws
                .allowed_node(rsc, n)
                .is_some_and(|a| ws.node_available(&a, true));
            if !usable {
                debug!(
                    resource = %ws.rsc(rsc).name,
                    node = %ws.node_name(Some(n)),
                    "Resource cannot run on node"
                );
                node = None;
            }
        }
    }

    let r = ws.rsc_mut(rsc);
    let changed = r.assigned_to != node;
    r.flags.remove(ResourceFlags::PROVISIONAL);
    r.assigned_to = node;

    match node {
        Some(n) => {
            debug!(resource = %ws.rsc(rsc).name, node = %ws.node_name(Some(n)), "Assigning resource");
        }
        None => {
            debug!(resource = %ws.rsc(rsc).name, "Resource assigned to no node");
            if stop_if_fail {
                ws.rsc_mut(rsc).next_role = Some(Role::Stopped);
                for task in [Task::Start, Task::Promote] {
                    for action in ws.resource_actions(rsc, task, None) {
                        let a = ws.action_mut(action);
                        if a.clear(ActionFlags::RUNNABLE) {
                            a.reason = Some("node availability".to_string());
                        }
                    }
                }
            }
        }
    }
    changed
}

/// Undo the assignment of `rsc` and everything below it, making them
/// provisional again.
pub fn unassign_resource(ws: &mut WorkingSet, rsc: ResourceId) {
    for id in ws.descendants(rsc) {
        let r = ws.rsc_mut(id);
        if let Some(node) = r.assigned_to.take() {
            trace!(resource = %r.name, node = node.0, "Unassigning resource");
        }
        r.flags.insert(ResourceFlags::PROVISIONAL);
    }
}

// ── Colocation lists ──────────────────────────────────────────────────────────

/// Colocations that place `rsc` relative to something else.  A group's own
/// colocations apply through its first member.
pub fn this_with_colocations(ws: &WorkingSet, rsc: ResourceId) -> Vec<ColocationId> {
    let mut list = ws.rsc(rsc).this_with.clone();
    if let Some(group) = first_member_of(ws, rsc) {
        for coloc in this_with_colocations(ws, group) {
            if !list.contains(&coloc) {
                list.push(coloc);
            }
        }
    }
    list
}

/// Colocations that place something else relative to `rsc`.
pub fn with_this_colocations(ws: &WorkingSet, rsc: ResourceId) -> Vec<ColocationId> {
    let mut list = ws.rsc(rsc).with_this.clone();
    if let Some(group) = first_member_of(ws, rsc) {
        for coloc in with_this_colocations(ws, group) {
            if !list.contains(&coloc) {
                list.push(coloc);
            }
        }
    }
    list
}

/// The group `rsc` leads, if it is a group's first member.
fn first_member_of(ws: &WorkingSet, rsc: ResourceId) -> Option<ResourceId> {
    let parent = ws.rsc(rsc).parent?;
    let p = ws.rsc(parent);
    (p.variant == Variant::Group && p.children.first() == Some(&rsc)).then_some(parent)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
