/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The arena that owns every node, resource, action and constraint of one
//! scheduling pass.
//!
//! Built once (by [`ClusterConfigManager`](crate::config::ClusterConfigManager)
//! or directly through the builder methods), mutated in place by the pass,
//! and dropped once the [`Plan`](crate::scheduler::Plan) has been extracted.
//! All cross references are plain indices, so colocation chains and action
//! graphs may be cyclic without any ownership cycles.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, info, trace};

use crate::action::{
    find_first_action, Action, ActionEdge, ActionFlags, ActionId, ActionKey, OrderingType, Task,
};
use crate::actions::notify::CollectiveNotify;
use crate::resource::{
    AllowedNode, Colocation, ColocationId, Node, NodeId, NodeTable, Resource, ResourceFlags,
    ResourceId, Variant,
};
use crate::score::{add_scores, readable_score, INFINITY};
use crate::scheduler::SchedulerError;

// ── User orderings ────────────────────────────────────────────────────────────

/// Strength of a configured ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderingKind {
    #[default]
    Mandatory,
    Optional,
}

/// "Do `first_task` on `first` before `then_task` on `then`", at resource
/// level.  Turned into action edges once actions exist.
#[derive(Debug, Clone)]
pub struct OrderingConstraint {
    pub id: String,
    pub first: ResourceId,
    pub first_task: Task,
    pub then: ResourceId,
    pub then_task: Task,
    pub kind: OrderingKind,
    pub symmetrical: bool,
}

// ── WorkingSet ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct WorkingSet {
    nodes: Vec<Node>,
    resources: Vec<Resource>,
    actions: Vec<Action>,
    colocations: Vec<Colocation>,
    orderings: Vec<OrderingConstraint>,

    /// Notification pseudo-actions per collective, filled during action
    /// creation for collectives with `notify=true`.
    pub(crate) notifications: BTreeMap<ResourceId, CollectiveNotify>,

    node_names: BTreeMap<String, NodeId>,
    resource_names: BTreeMap<String, ResourceId>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Nodes ─────────────────────────────────────────────────────────────────

    /// Add a healthy node.  Every existing resource becomes allowed on it
    /// with score 0.  Adding a known name returns the existing id.
    pub fn add_node(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.node_names.get(name) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(id, name));
        self.node_names.insert(name.to_string(), id);
        for rsc in &mut self.resources {
            rsc.allowed_nodes
                .insert(id, AllowedNode { node: id, weight: 0 });
        }
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.node_names.get(name).copied()
    }

    /// Node name for logs; `"no node"` for `None`.
    pub fn node_name(&self, id: Option<NodeId>) -> &str {
        match id {
            Some(id) => &self.nodes[id.0].name,
            None => "no node",
        }
    }

    // ── Resources ─────────────────────────────────────────────────────────────

    /// Add a resource.  A child inherits a copy of its parent's allowed-node
    /// table; a top-level resource is allowed everywhere with score 0.
    ///
    /// Members of a group are implicitly colocated (`+INFINITY`) with the
    /// member before them.
    pub fn add_resource(
        &mut self,
        name: &str,
        variant: Variant,
        parent: Option<ResourceId>,
    ) -> Result<ResourceId, SchedulerError> {
        let id = self.insert_resource(name, variant, parent)?;
        if let Some(parent) = parent {
            let previous = self.resources[parent.0].children.last().copied();
            self.resources[parent.0].children.push(id);

            if self.resources[parent.0].variant == Variant::Group {
                if let Some(previous) = previous {
                    let coloc_name = format!("{}-with-{}", name, self.resources[previous.0].name);
                    self.add_colocation(&coloc_name, id, previous, INFINITY, true);
                }
            }
        }
        Ok(id)
    }

    /// Add the resource that runs inside bundle replica container
    /// `container`.
    pub fn add_contained(
        &mut self,
        container: ResourceId,
        name: &str,
        variant: Variant,
    ) -> Result<ResourceId, SchedulerError> {
        let id = self.insert_resource(name, variant, Some(container))?;
        self.resources[container.0].contained = Some(id);
        Ok(id)
    }

    fn insert_resource(
        &mut self,
        name: &str,
        variant: Variant,
        parent: Option<ResourceId>,
    ) -> Result<ResourceId, SchedulerError> {
        if self.resource_names.contains_key(name) {
            return Err(SchedulerError::DuplicateResource(name.to_string()));
        }
        let id = ResourceId(self.resources.len());
        let mut rsc = Resource::new(id, name, variant);
        rsc.parent = parent;
        rsc.allowed_nodes = match parent {
            Some(parent) => self.resources[parent.0].allowed_nodes.clone(),
            None => self
                .nodes
                .iter()
                .map(|n| (n.id, AllowedNode { node: n.id, weight: 0 }))
                .collect(),
        };
        self.resources.push(rsc);
        self.resource_names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn rsc(&self, id: ResourceId) -> &Resource {
        &self.resources[id.0]
    }

    pub fn rsc_mut(&mut self, id: ResourceId) -> &mut Resource {
        &mut self.resources[id.0]
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource_by_name(&self, name: &str) -> Option<ResourceId> {
        self.resource_names.get(name).copied()
    }

    /// Resources without a parent, in creation order.
    pub fn top_level(&self) -> Vec<ResourceId> {
        self.resources
            .iter()
            .filter(|r| r.parent.is_none())
            .map(|r| r.id)
            .collect()
    }

    /// `rsc` followed by all its descendants (children, then the resource
    /// inside a replica container), depth first.
    pub fn descendants(&self, rsc: ResourceId) -> Vec<ResourceId> {
        let mut out = Vec::new();
        let mut stack = vec![rsc];
        while let Some(id) = stack.pop() {
            out.push(id);
            let r = &self.resources[id.0];
            if let Some(inner) = r.contained {
                stack.push(inner);
            }
            stack.extend(r.children.iter().rev().copied());
        }
        out
    }

    /// Meta-attribute `key` of `rsc` or of its nearest ancestor that sets it.
    pub fn inherited_meta(&self, rsc: ResourceId, key: &str) -> Option<&str> {
        let mut next = Some(rsc);
        while let Some(id) = next {
            let r = &self.resources[id.0];
            if let Some(value) = r.meta.get(key) {
                return Some(value);
            }
            next = r.parent;
        }
        None
    }

    /// Whether `rsc` or anything below it is blocked.
    pub fn is_blocked_recursive(&self, rsc: ResourceId) -> bool {
        self.descendants(rsc)
            .into_iter()
            .any(|id| self.resources[id.0].is_set(ResourceFlags::BLOCKED))
    }

    /// Add `score` to `rsc` (and everything below it) on `node`, or on every
    /// allowed node when `node` is `None`.
    ///
    /// A node-wide `-INFINITY` also drops an existing assignment and is
    /// recorded under `tag`.
    pub fn resource_location(
        &mut self,
        rsc: ResourceId,
        node: Option<NodeId>,
        score: i32,
        tag: &str,
    ) {
        for id in self.descendants(rsc) {
            let r = &mut self.resources[id.0];
            match node {
                Some(node) => {
                    let entry = r
                        .allowed_nodes
                        .entry(node)
                        .or_insert(AllowedNode { node, weight: 0 });
                    entry.weight = add_scores(entry.weight, score);
                }
                None => {
                    for entry in r.allowed_nodes.values_mut() {
                        entry.weight = add_scores(entry.weight, score);
                    }
                }
            }
        }

        if node.is_none() && score <= -INFINITY {
            let r = &mut self.resources[rsc.0];
            if !r.exclusions.iter().any(|t| t == tag) {
                r.exclusions.push(tag.to_string());
            }
            if r.assigned_to.is_some() {
                info!(resource = %r.name, tag, "Deallocating resource");
                r.assigned_to = None;
            }
        }
        trace!(
            resource = %self.resources[rsc.0].name,
            node = %self.node_name(node),
            score = %readable_score(score),
            tag,
            "Location score applied"
        );
    }

    /// Copy of the allowed-node tables of `rsc` and its descendants.
    pub fn snapshot_tables(&self, rsc: ResourceId) -> Vec<(ResourceId, NodeTable)> {
        self.descendants(rsc)
            .into_iter()
            .map(|id| (id, self.resources[id.0].allowed_nodes.clone()))
            .collect()
    }

    pub fn restore_tables(&mut self, snapshot: Vec<(ResourceId, NodeTable)>) {
        for (id, table) in snapshot {
            self.resources[id.0].allowed_nodes = table;
        }
    }

    // ── Node/score lookups ────────────────────────────────────────────────────

    /// The allowed-node entry for `node` in `rsc`'s own table.
    pub fn allowed_node(&self, rsc: ResourceId, node: NodeId) -> Option<AllowedNode> {
        self.resources[rsc.0].allowed_nodes.get(&node).copied()
    }

    /// The allowed-node entry for `node` in the table of `instance`'s
    /// top-level ancestor.  Counts of instances placed per node are shared
    /// through this entry even when the instance sits inside a cloned group.
    pub fn top_allowed_node(&self, instance: ResourceId, node: NodeId) -> Option<AllowedNode> {
        let mut top = instance;
        while let Some(parent) = self.resources[top.0].parent {
            top = parent;
        }
        self.allowed_node(top, node)
    }

    /// Whether an allowed node can run resources; with `consider_score`,
    /// also require a non-negative score.
    pub fn node_available(&self, allowed: &AllowedNode, consider_score: bool) -> bool {
        self.nodes[allowed.node.0].is_eligible() && (!consider_score || allowed.weight >= 0)
    }

    /// Allowed nodes in preference order: available before unavailable, then
    /// higher score, then `current`, then node name.
    pub fn sorted_nodes(&self, table: &NodeTable, current: Option<NodeId>) -> Vec<AllowedNode> {
        let mut nodes: Vec<AllowedNode> = table.values().copied().collect();
        nodes.sort_by(|a, b| {
            self.node_available(b, true)
                .cmp(&self.node_available(a, true))
                .then(b.weight.cmp(&a.weight))
                .then((Some(b.node) == current).cmp(&(Some(a.node) == current)))
                .then(self.nodes[a.node.0].name.cmp(&self.nodes[b.node.0].name))
        });
        nodes
    }

    /// Where `rsc` is (`current = true`) or will be, if that is exactly one
    /// node.  Groups and collectives report the single node shared by all
    /// their located descendants.
    pub fn location(&self, rsc: ResourceId, current: bool) -> Option<NodeId> {
        let mut found = Vec::new();
        self.collect_locations(rsc, current, &mut found);
        found.sort();
        found.dedup();
        match found.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    fn collect_locations(&self, rsc: ResourceId, current: bool, out: &mut Vec<NodeId>) {
        let r = &self.resources[rsc.0];
        if r.variant == Variant::Primitive {
            if current {
                out.extend(r.running_on.iter().copied());
            } else if let Some(node) = r.assigned_to {
                out.push(node);
            }
            return;
        }
        for &child in &r.children {
            self.collect_locations(child, current, out);
        }
    }

    // ── Colocations ───────────────────────────────────────────────────────────

    pub fn add_colocation(
        &mut self,
        name: &str,
        dependent: ResourceId,
        primary: ResourceId,
        score: i32,
        influence: bool,
    ) -> ColocationId {
        let id = ColocationId(self.colocations.len());
        self.colocations.push(Colocation {
            id,
            name: name.to_string(),
            dependent,
            primary,
            score,
            influence,
        });
        self.add_this_with(dependent, id);
        self.add_with_this(primary, id);
        id
    }

    pub fn colocation(&self, id: ColocationId) -> &Colocation {
        &self.colocations[id.0]
    }

    pub fn colocations(&self) -> &[Colocation] {
        &self.colocations
    }

    /// Attach `coloc` to `rsc` as a "this with" colocation, once.
    pub fn add_this_with(&mut self, rsc: ResourceId, coloc: ColocationId) {
        let list = &mut self.resources[rsc.0].this_with;
        if !list.contains(&coloc) {
            list.push(coloc);
        }
    }

    /// Attach `coloc` to `rsc` as a "with this" colocation, once.
    pub fn add_with_this(&mut self, rsc: ResourceId, coloc: ColocationId) {
        let list = &mut self.resources[rsc.0].with_this;
        if !list.contains(&coloc) {
            list.push(coloc);
        }
    }

    // ── Orderings ─────────────────────────────────────────────────────────────

    pub fn add_ordering(&mut self, ordering: OrderingConstraint) {
        self.orderings.push(ordering);
    }

    pub fn orderings(&self) -> &[OrderingConstraint] {
        &self.orderings
    }

    // ── Actions ───────────────────────────────────────────────────────────────

    pub fn action(&self, id: ActionId) -> &Action {
        &self.actions[id.0]
    }

    pub fn action_mut(&mut self, id: ActionId) -> &mut Action {
        &mut self.actions[id.0]
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Find or create the action `key` on `node`.
    ///
    /// New actions are runnable, and optional when `optional` is set.
    /// Asking for a mandatory version of an existing optional action makes
    /// the existing one mandatory.
    pub fn new_action(&mut self, key: ActionKey, node: Option<NodeId>, optional: bool) -> ActionId {
        let owner = match key.resource {
            Some(rsc) => self.resources[rsc.0].name.clone(),
            None => "cluster".to_string(),
        };
        let uuid = key.render(&owner);

        let existing = key.resource.and_then(|rsc| {
            self.resources[rsc.0]
                .actions
                .iter()
                .copied()
                .find(|&a| self.actions[a.0].uuid == uuid && self.actions[a.0].node == node)
        });
        if let Some(id) = existing {
            if !optional && self.actions[id.0].clear(ActionFlags::OPTIONAL) {
                trace!(action = %uuid, "Existing action is now mandatory");
            }
            return id;
        }

        let id = ActionId(self.actions.len());
        let mut flags = ActionFlags::RUNNABLE;
        if optional {
            flags |= ActionFlags::OPTIONAL;
        }
        trace!(action = %uuid, node = %self.node_name(node), optional, "Creating action");
        self.actions.push(Action {
            id,
            task: key.task,
            rsc: key.resource,
            key,
            uuid,
            node,
            flags,
            priority: 0,
            actions_before: Vec::new(),
            actions_after: Vec::new(),
            reason: None,
        });
        if let Some(rsc) = self.actions[id.0].rsc {
            self.resources[rsc.0].actions.push(id);
        }
        id
    }

    /// Find or create a node-less pseudo-action for `rsc`.
    pub fn new_pseudo_action(
        &mut self,
        rsc: ResourceId,
        task: Task,
        optional: bool,
        runnable: bool,
    ) -> ActionId {
        let id = self.new_action(ActionKey::new(Some(rsc), task), None, optional);
        let action = &mut self.actions[id.0];
        action.flags |= ActionFlags::PSEUDO;
        if runnable {
            action.flags |= ActionFlags::RUNNABLE;
        } else {
            action.flags.remove(ActionFlags::RUNNABLE);
        }
        id
    }

    /// First action of `rsc` with `task` (on `node`, if given).
    pub fn find_action(&self, rsc: ResourceId, task: Task, node: Option<NodeId>) -> Option<ActionId> {
        find_first_action(
            self.resources[rsc.0].actions.iter().map(|a| &self.actions[a.0]),
            task,
            node,
        )
    }

    /// Every action of `rsc` with `task` (on `node`, if given).
    pub fn resource_actions(&self, rsc: ResourceId, task: Task, node: Option<NodeId>) -> Vec<ActionId> {
        self.resources[rsc.0]
            .actions
            .iter()
            .copied()
            .filter(|a| {
                let action = &self.actions[a.0];
                action.task == task && node.map_or(true, |n| action.node == Some(n))
            })
            .collect()
    }

    /// Add the edge `first → then`.
    ///
    /// Returns `false` when the edge already carries every bit of `kind`
    /// (or `first == then`); otherwise the bits are merged into an existing
    /// edge or a new edge is created.
    pub fn order_actions(&mut self, first: ActionId, then: ActionId, kind: OrderingType) -> bool {
        if first == then {
            return false;
        }
        let existing = self.actions[first.0]
            .actions_after
            .iter()
            .position(|e| e.action == then);
        if let Some(pos) = existing {
            let edge = &mut self.actions[first.0].actions_after[pos];
            if edge.kind.contains(kind) {
                return false;
            }
            edge.kind |= kind;
            if let Some(back) = self.actions[then.0]
                .actions_before
                .iter_mut()
                .find(|e| e.action == first)
            {
                back.kind |= kind;
            }
            return true;
        }

        debug!(
            first = %self.actions[first.0].uuid,
            then = %self.actions[then.0].uuid,
            kind = ?kind,
            "Ordering actions"
        );
        self.actions[first.0]
            .actions_after
            .push(ActionEdge { action: then, kind });
        self.actions[then.0]
            .actions_before
            .push(ActionEdge { action: first, kind });
        true
    }

    /// Notification pseudo-actions recorded for `collective`, if any.
    pub fn notification_data(&self, collective: ResourceId) -> Option<&CollectiveNotify> {
        self.notifications.get(&collective)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn three_nodes() -> WorkingSet {
        let mut ws = WorkingSet::new();
        for name in ["node1", "node2", "node3"] {
            ws.add_node(name);
        }
        ws
    }

    #[test]
    fn children_inherit_parent_tables() {
        let mut ws = three_nodes();
        let clone = ws.add_resource("db", Variant::Clone, None).unwrap();
        let n2 = ws.node_by_name("node2").unwrap();
        ws.resource_location(clone, Some(n2), 50, "location");

        let inst = ws.add_resource("db:0", Variant::Primitive, Some(clone)).unwrap();
        assert_eq!(ws.allowed_node(inst, n2).unwrap().weight, 50);
        assert_eq!(ws.rsc(clone).children, vec![inst]);
        assert_eq!(ws.top_level(), vec![clone]);
    }

    #[test]
    fn duplicate_resource_names_are_rejected() {
        let mut ws = three_nodes();
        ws.add_resource("web", Variant::Primitive, None).unwrap();
        let err = ws.add_resource("web", Variant::Primitive, None).unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateResource(name) if name == "web"));
    }

    #[test]
    fn group_members_are_chained_by_colocation() {
        let mut ws = three_nodes();
        let group = ws.add_resource("g", Variant::Group, None).unwrap();
        let a = ws.add_resource("a", Variant::Primitive, Some(group)).unwrap();
        let b = ws.add_resource("b", Variant::Primitive, Some(group)).unwrap();

        assert_eq!(ws.rsc(b).this_with.len(), 1);
        let coloc = ws.colocation(ws.rsc(b).this_with[0]);
        assert_eq!(coloc.primary, a);
        assert_eq!(coloc.score, INFINITY);
        assert!(ws.rsc(a).this_with.is_empty());
    }

    #[test]
    fn top_allowed_node_walks_to_the_root() {
        let mut ws = three_nodes();
        let n1 = ws.node_by_name("node1").unwrap();
        let clone = ws.add_resource("c", Variant::Clone, None).unwrap();
        let group = ws.add_resource("c:0", Variant::Group, Some(clone)).unwrap();
        let member = ws.add_resource("c:0/a", Variant::Primitive, Some(group)).unwrap();

        ws.resource_location(member, Some(n1), 10, "location");
        assert_eq!(ws.top_allowed_node(member, n1).unwrap().weight, 0);
        ws.resource_location(clone, Some(n1), 7, "location");
        assert_eq!(ws.top_allowed_node(member, n1).unwrap().weight, 7);
    }

    #[test]
    fn node_wide_ban_deallocates_and_is_tagged() {
        let mut ws = three_nodes();
        let n1 = ws.node_by_name("node1").unwrap();
        let rsc = ws.add_resource("r", Variant::Primitive, None).unwrap();
        ws.rsc_mut(rsc).assigned_to = Some(n1);

        ws.resource_location(rsc, None, -INFINITY, "collective_limit_reached");
        assert_eq!(ws.rsc(rsc).assigned_to, None);
        assert_eq!(ws.rsc(rsc).exclusions, vec!["collective_limit_reached"]);
        assert!(ws.rsc(rsc).allowed_nodes.values().all(|a| a.weight == -INFINITY));
    }

    #[test]
    fn sorted_nodes_prefers_available_then_score_then_current_then_name() {
        let mut ws = three_nodes();
        let n1 = ws.node_by_name("node1").unwrap();
        let n2 = ws.node_by_name("node2").unwrap();
        let n3 = ws.node_by_name("node3").unwrap();
        ws.node_mut(n1).standby = true;
        let rsc = ws.add_resource("r", Variant::Primitive, None).unwrap();
        ws.resource_location(rsc, Some(n1), 100, "location");

        let order: Vec<NodeId> = ws
            .sorted_nodes(&ws.rsc(rsc).allowed_nodes, Some(n3))
            .into_iter()
            .map(|a| a.node)
            .collect();
        assert_eq!(order, vec![n3, n2, n1]);
    }

    #[test]
    fn location_requires_a_single_node() {
        let mut ws = three_nodes();
        let n1 = ws.node_by_name("node1").unwrap();
        let n2 = ws.node_by_name("node2").unwrap();
        let rsc = ws.add_resource("r", Variant::Primitive, None).unwrap();

        ws.rsc_mut(rsc).running_on = vec![n1];
        assert_eq!(ws.location(rsc, true), Some(n1));
        ws.rsc_mut(rsc).running_on = vec![n1, n2];
        assert_eq!(ws.location(rsc, true), None);
        assert_eq!(ws.location(rsc, false), None);
    }

    #[test]
    fn order_actions_merges_and_deduplicates() {
        let mut ws = three_nodes();
        let rsc = ws.add_resource("r", Variant::Primitive, None).unwrap();
        let stop = ws.new_action(ActionKey::new(Some(rsc), Task::Stop), None, true);
        let start = ws.new_action(ActionKey::new(Some(rsc), Task::Start), None, true);

        assert!(ws.order_actions(stop, start, OrderingType::ORDERED));
        assert!(!ws.order_actions(stop, start, OrderingType::ORDERED));
        assert!(ws.order_actions(stop, start, OrderingType::IMPLIES_THEN));
        assert_eq!(ws.action(stop).actions_after.len(), 1);
        assert_eq!(
            ws.action(start).actions_before[0].kind,
            OrderingType::ORDERED | OrderingType::IMPLIES_THEN
        );
        assert!(!ws.order_actions(start, start, OrderingType::ORDERED));
    }

    #[test]
    fn new_action_reuses_existing_and_upgrades_to_mandatory() {
        let mut ws = three_nodes();
        let n1 = ws.node_by_name("node1").unwrap();
        let rsc = ws.add_resource("r", Variant::Primitive, None).unwrap();
        let a = ws.new_action(ActionKey::new(Some(rsc), Task::Start), Some(n1), true);
        assert!(ws.action(a).is_optional());

        let b = ws.new_action(ActionKey::new(Some(rsc), Task::Start), Some(n1), false);
        assert_eq!(a, b);
        assert!(!ws.action(a).is_optional());
        assert_eq!(ws.rsc(rsc).actions.len(), 1);
        assert_eq!(ws.action(a).uuid, "r_start_0");
    }

    #[test]
    fn snapshot_restores_descendant_tables() {
        let mut ws = three_nodes();
        let n1 = ws.node_by_name("node1").unwrap();
        let group = ws.add_resource("g", Variant::Group, None).unwrap();
        let member = ws.add_resource("a", Variant::Primitive, Some(group)).unwrap();

        let before = ws.snapshot_tables(group);
        ws.resource_location(group, Some(n1), -INFINITY, "ban");
        assert_eq!(ws.allowed_node(member, n1).unwrap().weight, -INFINITY);

        ws.restore_tables(before);
        assert_eq!(ws.allowed_node(member, n1).unwrap().weight, 0);
    }

    #[test]
    fn meta_is_inherited_from_the_nearest_ancestor() {
        let mut ws = three_nodes();
        let clone = ws.add_resource("vm", Variant::Clone, None).unwrap();
        let inst = ws.add_resource("vm:0", Variant::Primitive, Some(clone)).unwrap();
        ws.rsc_mut(clone).meta.insert("allow-migrate".into(), "true".into());
        assert_eq!(ws.inherited_meta(inst, "allow-migrate"), Some("true"));

        ws.rsc_mut(inst).meta.insert("allow-migrate".into(), "false".into());
        assert_eq!(ws.inherited_meta(inst, "allow-migrate"), Some("false"));
        assert_eq!(ws.inherited_meta(inst, "multiple-active"), None);
    }
}
