/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Node, resource and colocation records for one scheduling pass.
//!
//! Every record lives in the [`WorkingSet`](crate::working_set::WorkingSet)
//! arena and refers to the others by index ([`NodeId`], [`ResourceId`],
//! [`ColocationId`], [`ActionId`]).  Nothing here owns another record, so the
//! cyclic shapes that colocation chains and parent/child links form never
//! become ownership cycles.
//!
//! ```text
//! clone "db" ──children──► "db:0", "db:1"        (instances)
//!    │                        │
//!    └── allowed_nodes         └── allowed_nodes  (copied from the parent)
//! ```

use std::collections::BTreeMap;

use bitflags::bitflags;
use serde::Deserialize;

use crate::action::ActionId;
use crate::score::INFINITY;

// ── Identifiers ───────────────────────────────────────────────────────────────

/// Index of a [`Node`] in the working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Index of a [`Resource`] in the working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub usize);

/// Index of a [`Colocation`] in the working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColocationId(pub usize);

// ── Node ──────────────────────────────────────────────────────────────────────

/// A cluster node as seen by the scheduler.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    /// Unique node name; also the final tie-break key when ordering nodes.
    pub name: String,
    pub online: bool,
    pub standby: bool,
    /// Node is scheduled to be fenced.  Stops there become pseudo-actions.
    pub unclean: bool,
    pub shutdown: bool,
    pub maintenance: bool,
}

impl Node {
    /// A healthy, online node.
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            online: true,
            standby: false,
            unclean: false,
            shutdown: false,
            maintenance: false,
        }
    }

    /// Whether the node can currently accept resources.
    pub fn is_eligible(&self) -> bool {
        self.online && !self.standby && !self.unclean && !self.shutdown && !self.maintenance
    }
}

// ── Allowed-node table ────────────────────────────────────────────────────────

/// Per-(resource, node) score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowedNode {
    pub node: NodeId,
    /// `+INFINITY` = mandatory, `-INFINITY` = banned.
    pub weight: i32,
}

/// A resource's allowed nodes, keyed by node.
///
/// `BTreeMap` so that iteration (and therefore logging and snapshot
/// comparison) is deterministic.
pub type NodeTable = BTreeMap<NodeId, AllowedNode>;

/// Number of instances of one collective placed on each node during a single
/// assignment pass.  Created fresh by every pass and dropped afterwards.
pub type NodeCounts = BTreeMap<NodeId, u32>;

// ── Variant / role ────────────────────────────────────────────────────────────

/// Resource variant.  Declaration order matters: anything at or above
/// [`Variant::Clone`] is a collective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Primitive,
    Group,
    Clone,
    Bundle,
}

impl Variant {
    /// Clone or bundle.
    pub fn is_collective(self) -> bool {
        self >= Variant::Clone
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Primitive => "primitive",
            Variant::Group => "group",
            Variant::Clone => "clone",
            Variant::Bundle => "bundle",
        }
    }
}

/// Resource role.  Ordered from least to most active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Unknown,
    Stopped,
    Started,
    Unpromoted,
    Promoted,
}

bitflags! {
    /// Mutable per-resource state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceFlags: u32 {
        /// Not yet assigned in this pass.
        const PROVISIONAL = 1 << 0;
        /// Assignment in progress; re-entry means a colocation loop.
        const ALLOCATING  = 1 << 1;
        /// Present in status but no longer configured.
        const ORPHAN      = 1 << 2;
        const FAILED      = 1 << 3;
        const MANAGED     = 1 << 4;
        /// Further actions are blocked (e.g. failed stop).
        const BLOCKED     = 1 << 5;
        /// Multiply active; only the copies off the assigned node stop.
        const STOP_UNEXPECTED = 1 << 6;
    }
}

/// Recovery of a primitive found active on more than one node, from the
/// `multiple-active` meta-attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultipleActive {
    /// Stop every copy, then start on the assigned node.
    #[default]
    Restart,
    /// Stop every copy and keep the resource stopped.
    StopOnly,
    /// Leave everything as it is and stop managing the resource.
    Block,
    /// Stop only the copies off the assigned node.
    StopUnexpected,
}

impl MultipleActive {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "restart" => Some(MultipleActive::Restart),
            "stop_only" => Some(MultipleActive::StopOnly),
            "block" => Some(MultipleActive::Block),
            "stop_unexpected" => Some(MultipleActive::StopUnexpected),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MultipleActive::Restart => "restart",
            MultipleActive::StopOnly => "stop_only",
            MultipleActive::Block => "block",
            MultipleActive::StopUnexpected => "stop_unexpected",
        }
    }
}

// ── Resource ──────────────────────────────────────────────────────────────────

/// A schedulable unit: primitive, group, clone or bundle.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub variant: Variant,
    pub flags: ResourceFlags,

    /// Role the resource currently has.
    pub role: Role,
    /// Role requested for the end of this transition.  `None` until set
    /// explicitly or derived from the assignment during action creation.
    pub next_role: Option<Role>,

    pub allowed_nodes: NodeTable,
    /// Nodes the resource is active on right now (more than one when
    /// multiply active).
    pub running_on: Vec<NodeId>,
    pub assigned_to: Option<NodeId>,

    pub parent: Option<ResourceId>,
    /// Instances for clones, replica containers for bundles, members for
    /// groups.
    pub children: Vec<ResourceId>,
    /// Resource running inside a bundle replica container.
    pub contained: Option<ResourceId>,

    /// Colocations where this resource is the dependent.
    pub this_with: Vec<ColocationId>,
    /// Colocations where this resource is the primary.
    pub with_this: Vec<ColocationId>,

    pub actions: Vec<ActionId>,
    pub meta: BTreeMap<String, String>,

    /// Tags of forced exclusions (`-INFINITY` on every node), for the plan.
    pub exclusions: Vec<String>,
}

impl Resource {
    /// A managed, provisional, stopped resource with no allowed nodes yet.
    pub fn new(id: ResourceId, name: impl Into<String>, variant: Variant) -> Self {
        Self {
            id,
            name: name.into(),
            variant,
            flags: ResourceFlags::PROVISIONAL | ResourceFlags::MANAGED,
            role: Role::Stopped,
            next_role: None,
            allowed_nodes: NodeTable::new(),
            running_on: Vec::new(),
            assigned_to: None,
            parent: None,
            children: Vec::new(),
            contained: None,
            this_with: Vec::new(),
            with_this: Vec::new(),
            actions: Vec::new(),
            meta: BTreeMap::new(),
            exclusions: Vec::new(),
        }
    }

    pub fn is_set(&self, flags: ResourceFlags) -> bool {
        self.flags.contains(flags)
    }

    pub fn is_provisional(&self) -> bool {
        self.is_set(ResourceFlags::PROVISIONAL)
    }

    /// First node the resource is active on.
    pub fn current_node(&self) -> Option<NodeId> {
        self.running_on.first().copied()
    }

    /// Boolean meta-attribute (`true`/`yes`/`on`/`y`/`1`).
    pub fn meta_bool(&self, key: &str) -> bool {
        self.meta.get(key).is_some_and(|v| is_true(v))
    }

    /// Unsigned meta-attribute; `None` when absent or unparsable.
    pub fn meta_u32(&self, key: &str) -> Option<u32> {
        self.meta.get(key).and_then(|v| v.trim().parse().ok())
    }

    /// Whether instances of this collective pair node-for-node in orderings.
    pub fn is_interleaved(&self) -> bool {
        self.meta_bool("interleave")
    }

    /// Role now (`current = true`) or after the transition.
    pub fn state(&self, current: bool) -> Role {
        if current {
            return self.role;
        }
        match self.next_role {
            Some(role) => role,
            None if self.assigned_to.is_some() => Role::Started,
            None => Role::Stopped,
        }
    }
}

/// Interpret a meta-attribute value as a boolean.
pub fn is_true(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "on" | "y" | "1"
    )
}

// ── Colocation ────────────────────────────────────────────────────────────────

/// "Place `dependent` relative to `primary` with this score."
#[derive(Debug, Clone)]
pub struct Colocation {
    pub id: ColocationId,
    pub name: String,
    pub dependent: ResourceId,
    pub primary: ResourceId,
    pub score: i32,
    /// Whether the dependent may pull an already-active primary towards it.
    pub influence: bool,
}

impl Colocation {
    /// `±INFINITY`.
    pub fn is_mandatory(&self) -> bool {
        self.score >= INFINITY || self.score <= -INFINITY
    }

    /// Whether this colocation should apply to `candidate`.
    ///
    /// An inactive candidate is always influenced; an active one only when
    /// the colocation's `influence` option is set.
    pub fn has_influence(&self, candidate: &Resource) -> bool {
        self.influence || candidate.running_on.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unhealthy_nodes_are_not_eligible() {
        let mut node = Node::new(NodeId(0), "n1");
        assert!(node.is_eligible());

        node.standby = true;
        assert!(!node.is_eligible());

        let mut node = Node::new(NodeId(1), "n2");
        node.unclean = true;
        assert!(!node.is_eligible());

        let mut node = Node::new(NodeId(2), "n3");
        node.online = false;
        assert!(!node.is_eligible());
    }

    #[test]
    fn multiple_active_values() {
        assert_eq!(MultipleActive::parse("stop_only"), Some(MultipleActive::StopOnly));
        assert_eq!(MultipleActive::parse(" Block "), Some(MultipleActive::Block));
        assert_eq!(
            MultipleActive::parse("stop_unexpected"),
            Some(MultipleActive::StopUnexpected)
        );
        assert_eq!(MultipleActive::parse("reboot"), None);
        assert_eq!(MultipleActive::default(), MultipleActive::Restart);
    }

    #[test]
    fn collectives_sort_above_groups() {
        assert!(Variant::Clone.is_collective());
        assert!(Variant::Bundle.is_collective());
        assert!(!Variant::Group.is_collective());
        assert!(Variant::Primitive < Variant::Group);
    }

    #[test]
    fn meta_booleans_accept_common_spellings() {
        for v in ["true", "TRUE", "yes", "on", "y", "1"] {
            assert!(is_true(v), "{v} should be true");
        }
        for v in ["false", "no", "0", "", "maybe"] {
            assert!(!is_true(v), "{v} should be false");
        }
    }

    #[test]
    fn new_resource_is_provisional_and_managed() {
        let rsc = Resource::new(ResourceId(0), "r", Variant::Primitive);
        assert!(rsc.is_provisional());
        assert!(rsc.is_set(ResourceFlags::MANAGED));
        assert_eq!(rsc.state(true), Role::Stopped);
        assert_eq!(rsc.state(false), Role::Stopped);
    }

    #[test]
    fn next_state_follows_assignment_when_unset() {
        let mut rsc = Resource::new(ResourceId(0), "r", Variant::Primitive);
        rsc.assigned_to = Some(NodeId(3));
        assert_eq!(rsc.state(false), Role::Started);

        rsc.next_role = Some(Role::Promoted);
        assert_eq!(rsc.state(false), Role::Promoted);
    }

    #[test]
    fn influence_applies_to_inactive_candidates() {
        let coloc = Colocation {
            id: ColocationId(0),
            name: "c".into(),
            dependent: ResourceId(0),
            primary: ResourceId(1),
            score: 50,
            influence: false,
        };
        let mut candidate = Resource::new(ResourceId(2), "i", Variant::Primitive);
        assert!(coloc.has_influence(&candidate));

        candidate.running_on.push(NodeId(0));
        assert!(!coloc.has_influence(&candidate));
    }
}
