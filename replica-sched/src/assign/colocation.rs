/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Applying colocations to allowed-node tables.
//!
//! | Direction | Effect on the table of the resource being assigned |
//! |---|---|
//! | this with (`rsc` is the dependent) | follow / avoid where the primary went |
//! | with this (`rsc` is the primary) | add the dependent's scores, scaled by `score / INFINITY` |
//!
//! Finite negative and optional colocations are undone when they would
//! leave the resource with nowhere to run.

use tracing::{debug, info, trace};

use crate::resource::{ColocationId, NodeId, ResourceId, Variant};
use crate::score::{add_scores, clamp_score, readable_score, INFINITY};
use crate::scheduler::SchedulerError;
use crate::variant::methods;
use crate::working_set::WorkingSet;

/// Apply colocation `coloc` (with `rsc` as the dependent) to `rsc`'s table,
/// assigning the primary first if needed.
pub fn apply_this_with(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    coloc: ColocationId,
) -> Result<(), SchedulerError> {
    let c = ws.colocation(coloc).clone();
    let primary = c.primary;

    if ws.rsc(primary).is_provisional() {
        trace!(
            colocation = %c.name,
            primary = %ws.rsc(primary).name,
            "Assigning colocation primary first"
        );
        let variant = ws.rsc(primary).variant;
        (methods(variant).assign)(ws, primary, None, true)?;
    }
    if ws.rsc(primary).is_provisional() {
        debug!(
            colocation = %c.name,
            resource = %ws.rsc(rsc).name,
            "Skipping colocation with primary caught in an assignment loop"
        );
        return Ok(());
    }

    let archive = (c.score < 0 && c.score > -INFINITY).then(|| ws.rsc(rsc).allowed_nodes.clone());

    let primary_nodes = assigned_nodes(ws, primary);
    if primary_nodes.is_empty() && c.score < 0 {
        trace!(colocation = %c.name, "Primary is inactive; nothing to avoid");
        return Ok(());
    }

    for entry in ws.rsc_mut(rsc).allowed_nodes.values_mut() {
        if primary_nodes.is_empty() {
            entry.weight = add_scores(entry.weight, -c.score);
        } else if primary_nodes.contains(&entry.node) {
            if c.score < INFINITY {
                entry.weight = add_scores(entry.weight, c.score);
            }
        } else if c.score >= INFINITY {
            entry.weight = -INFINITY;
        }
    }
    trace!(
        colocation = %c.name,
        resource = %ws.rsc(rsc).name,
        score = %readable_score(c.score),
        "Applied colocation"
    );

    if let Some(archive) = archive {
        if !any_available(ws, rsc) {
            info!(
                "{}: Reverting scores from colocation with {} because no nodes allowed",
                ws.rsc(rsc).name,
                ws.rsc(primary).name
            );
            ws.rsc_mut(rsc).allowed_nodes = archive;
        }
    }
    Ok(())
}

/// Fold the node preferences of `coloc`'s dependent into `rsc`'s table
/// (`rsc` is the primary).
pub fn add_dependent_scores(ws: &mut WorkingSet, rsc: ResourceId, coloc: ColocationId) {
    let c = ws.colocation(coloc).clone();
    let dependent = ws.rsc(c.dependent).allowed_nodes.clone();
    let before = ws.rsc(rsc).allowed_nodes.clone();

    for entry in ws.rsc_mut(rsc).allowed_nodes.values_mut() {
        let Some(dep) = dependent.get(&entry.node) else {
            continue;
        };
        if dep.weight == 0 {
            continue;
        }
        let scaled = clamp_score(i64::from(dep.weight) * i64::from(c.score) / i64::from(INFINITY));
        entry.weight = add_scores(entry.weight, scaled);
    }

    if !c.is_mandatory() && !any_available(ws, rsc) {
        info!(
            "{}: Reverting scores from colocation with {} because no nodes allowed",
            ws.rsc(rsc).name,
            ws.rsc(c.dependent).name
        );
        ws.rsc_mut(rsc).allowed_nodes = before;
    }
}

/// Copy the colocations of collective `parent` onto `instance`.
///
/// "This with" colocations are copied when `include_all` is set or they
/// are negative or mandatory; "with this" colocations when `include_all` is
/// set or they are negative, and only if they can influence `instance`.
pub fn propagate_colocations(
    ws: &mut WorkingSet,
    parent: ResourceId,
    instance: ResourceId,
    include_all: bool,
) {
    for coloc in ws.rsc(parent).this_with.clone() {
        let score = ws.colocation(coloc).score;
        if include_all || score < 0 || score == INFINITY {
            ws.add_this_with(instance, coloc);
        }
    }
    for coloc in ws.rsc(parent).with_this.clone() {
        let c = ws.colocation(coloc);
        if !c.has_influence(ws.rsc(instance)) {
            continue;
        }
        if include_all || c.score < 0 {
            ws.add_with_this(instance, coloc);
        }
    }
}

/// Nodes the primitives at or below `rsc` are assigned to.
fn assigned_nodes(ws: &WorkingSet, rsc: ResourceId) -> Vec<NodeId> {
    let mut nodes: Vec<NodeId> = ws
        .descendants(rsc)
        .into_iter()
        .filter(|&id| ws.rsc(id).variant == Variant::Primitive)
        .filter_map(|id| ws.rsc(id).assigned_to)
        .collect();
    nodes.sort();
    nodes.dedup();
    nodes
}

fn any_available(ws: &WorkingSet, rsc: ResourceId) -> bool {
    ws.rsc(rsc)
        .allowed_nodes
        .values()
        .any(|a| ws.node_available(a, true))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceFlags;

    fn setup() -> (WorkingSet, Vec<NodeId>, ResourceId, ResourceId) {
        let mut ws = WorkingSet::new();
        let n = ["node1", "node2", "node3"]
            .iter()
            .map(|name| ws.add_node(name))
            .collect();
        let dep = ws.add_resource("dep", Variant::Primitive, None).unwrap();
        let primary = ws.add_resource("primary", Variant::Primitive, None).unwrap();
        (ws, n, dep, primary)
    }

    #[test]
    fn finite_positive_adds_on_primary_node() {
        let (mut ws, n, dep, primary) = setup();
        let coloc = ws.add_colocation("c", dep, primary, 30, true);
        ws.rsc_mut(primary).assigned_to = Some(n[1]);
        ws.rsc_mut(primary).flags.remove(ResourceFlags::PROVISIONAL);

        apply_this_with(&mut ws, dep, coloc).unwrap();
        assert_eq!(ws.allowed_node(dep, n[1]).unwrap().weight, 30);
        assert_eq!(ws.allowed_node(dep, n[0]).unwrap().weight, 0);
    }

    #[test]
    fn finite_negative_is_reverted_when_nothing_is_left() {
        let (mut ws, n, dep, primary) = setup();
        ws.resource_location(dep, Some(n[0]), -INFINITY, "ban");
        ws.resource_location(dep, Some(n[2]), -INFINITY, "ban");
        let coloc = ws.add_colocation("c", dep, primary, -10, true);
        ws.rsc_mut(primary).assigned_to = Some(n[1]);
        ws.rsc_mut(primary).flags.remove(ResourceFlags::PROVISIONAL);

        apply_this_with(&mut ws, dep, coloc).unwrap();
        assert_eq!(ws.allowed_node(dep, n[1]).unwrap().weight, 0);
    }

    #[test]
    fn mandatory_with_stopped_primary_bans_everywhere() {
        let (mut ws, _n, dep, primary) = setup();
        let coloc = ws.add_colocation("c", dep, primary, INFINITY, true);
        ws.resource_location(primary, None, -INFINITY, "ban");

        apply_this_with(&mut ws, dep, coloc).unwrap();
        assert_eq!(ws.rsc(primary).assigned_to, None);
        assert!(ws.rsc(dep).allowed_nodes.values().all(|a| a.weight == -INFINITY));
    }

    #[test]
    fn dependent_scores_are_scaled() {
        let (mut ws, n, dep, primary) = setup();
        ws.resource_location(dep, Some(n[2]), 100, "location");
        let coloc = ws.add_colocation("c", dep, primary, INFINITY / 2, true);

        add_dependent_scores(&mut ws, primary, coloc);
        assert_eq!(ws.allowed_node(primary, n[2]).unwrap().weight, 50);
        assert_eq!(ws.allowed_node(primary, n[0]).unwrap().weight, 0);
    }

    #[test]
    fn propagation_filters_by_sign_and_strength() {
        let mut ws = WorkingSet::new();
        ws.add_node("node1");
        let other = ws.add_resource("other", Variant::Primitive, None).unwrap();
        let clone = ws.add_resource("c", Variant::Clone, None).unwrap();
        let inst = ws.add_resource("c:0", Variant::Primitive, Some(clone)).unwrap();

        let pos = ws.add_colocation("pos", clone, other, 10, true);
        let neg = ws.add_colocation("neg", clone, other, -10, true);
        let mandatory = ws.add_colocation("mandatory", clone, other, INFINITY, true);
        let dep_pos = ws.add_colocation("dep-pos", other, clone, 10, true);
        let dep_neg = ws.add_colocation("dep-neg", other, clone, -10, false);

        propagate_colocations(&mut ws, clone, inst, false);
        assert_eq!(ws.rsc(inst).this_with, vec![neg, mandatory]);
        assert_eq!(ws.rsc(inst).with_this, vec![dep_neg]);

        propagate_colocations(&mut ws, clone, inst, true);
        assert_eq!(ws.rsc(inst).this_with, vec![neg, mandatory, pos]);
        assert_eq!(ws.rsc(inst).with_this, vec![dep_neg, dep_pos]);
    }

    #[test]
    fn influence_gates_propagation_to_active_instances() {
        let mut ws = WorkingSet::new();
        let n1 = ws.add_node("node1");
        let other = ws.add_resource("other", Variant::Primitive, None).unwrap();
        let clone = ws.add_resource("c", Variant::Clone, None).unwrap();
        let inst = ws.add_resource("c:0", Variant::Primitive, Some(clone)).unwrap();
        ws.rsc_mut(inst).running_on = vec![n1];
        ws.add_colocation("dep-neg", other, clone, -10, false);

        propagate_colocations(&mut ws, clone, inst, true);
        assert!(ws.rsc(inst).with_this.is_empty());
    }
}
