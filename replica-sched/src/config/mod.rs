/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cluster scenario loading.
//!
//! A scenario describes the input of one scheduling pass: nodes and their
//! health, the resource tree with current state, and constraints.
//!
//! The expected YAML structure is:
//! ```yaml
//! nodes:
//!   node1: { online: true }
//!   node2: { standby: true }
//! resources:
//!   - id: db
//!     variant: clone
//!     meta: { clone-max: 2, clone-node-max: 1, interleave: true }
//!     instances:
//!       - id: "db:0"
//!         running_on: [node1]
//!   - id: web
//! locations:
//!   - { resource: db, node: node1, score: 100 }
//! colocations:
//!   - { id: web-with-db, dependent: web, primary: db, score: INFINITY }
//! orderings:
//!   - { first: db, first_action: start, then: web, then_action: start,
//!       kind: mandatory, symmetrical: true }
//! ```
//!
//! Scores are integers or `INFINITY` / `+INFINITY` / `-INFINITY`.  Every
//! resource starts allowed on every node with score 0.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::action::Task;
use crate::resource::{NodeId, ResourceFlags, ResourceId, Role, Variant};
use crate::scheduler::SchedulerError;
use crate::score::{clamp_score, parse_score};
use crate::working_set::{OrderingConstraint, OrderingKind, WorkingSet};

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Default, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    nodes: BTreeMap<String, Option<NodeEntry>>,
    #[serde(default)]
    resources: Vec<ResourceEntry>,
    #[serde(default)]
    locations: Vec<LocationEntry>,
    #[serde(default)]
    colocations: Vec<ColocationEntry>,
    #[serde(default)]
    orderings: Vec<OrderingEntry>,
}

/// Node health.  A node listed without fields is online and healthy.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
struct NodeEntry {
    online: bool,
    standby: bool,
    unclean: bool,
    shutdown: bool,
    maintenance: bool,
}

impl Default for NodeEntry {
    fn default() -> Self {
        Self {
            online: true,
            standby: false,
            unclean: false,
            shutdown: false,
            maintenance: false,
        }
    }
}

/// One resource and, recursively, what it contains.
#[derive(Debug, Clone, Deserialize)]
struct ResourceEntry {
    id: String,
    #[serde(default = "default_variant")]
    variant: Variant,
    /// Meta-attributes; scalar values of any YAML type are kept as text.
    #[serde(default)]
    meta: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    running_on: Vec<String>,
    /// Current role; defaults to started when `running_on` is non-empty.
    role: Option<Role>,
    /// Role the resource must end in; `stopped` bans it everywhere.
    target_role: Option<Role>,
    #[serde(default)]
    failed: bool,
    #[serde(default)]
    orphan: bool,
    #[serde(default = "default_true")]
    managed: bool,
    /// Group members, in order.
    #[serde(default)]
    members: Vec<ResourceEntry>,
    /// Clone instances or bundle replica containers.
    #[serde(default)]
    instances: Vec<ResourceEntry>,
    /// Resource run inside a bundle replica container.
    contained: Option<Box<ResourceEntry>>,
}

/// A score as written in YAML: a plain integer or an `INFINITY` sentinel.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ScoreValue {
    Number(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct LocationEntry {
    resource: String,
    /// All nodes when absent.
    node: Option<String>,
    score: ScoreValue,
}

#[derive(Debug, Deserialize)]
struct ColocationEntry {
    id: String,
    dependent: String,
    primary: String,
    score: ScoreValue,
    #[serde(default = "default_true")]
    influence: bool,
}

#[derive(Debug, Deserialize)]
struct OrderingEntry {
    id: Option<String>,
    first: String,
    #[serde(default = "default_task")]
    first_action: Task,
    then: String,
    #[serde(default = "default_task")]
    then_action: Task,
    #[serde(default)]
    kind: OrderingKind,
    #[serde(default)]
    symmetrical: bool,
}

fn default_variant() -> Variant {
    Variant::Primitive
}

fn default_true() -> bool {
    true
}

fn default_task() -> Task {
    Task::Start
}

// ── ClusterConfigManager ──────────────────────────────────────────────────────

/// Loads a cluster scenario from YAML and turns it into a [`WorkingSet`].
#[derive(Debug, Default)]
pub struct ClusterConfigManager {
    scenario: ScenarioFile,

    /// Set to `true` after a successful [`load_from_file`](Self::load_from_file).
    loaded: bool,
}

impl ClusterConfigManager {
    /// Creates a new, empty `ClusterConfigManager`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `path` as a scenario.
    ///
    /// Calling this method a second time replaces the previous scenario.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or if the YAML is
    /// structurally invalid.  References between entries are checked later,
    /// by [`build_working_set`](Self::build_working_set).
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading cluster scenario from: {}", path.display());

        self.scenario = ScenarioFile::default();
        self.loaded = false;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open scenario file: {}", path.display()))?;

        let scenario: ScenarioFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        if scenario.nodes.is_empty() {
            warn!("Scenario defines no nodes; every resource will stay stopped");
        }
        if scenario.resources.is_empty() {
            warn!("Scenario defines no resources");
        }

        info!(
            nodes = scenario.nodes.len(),
            resources = scenario.resources.len(),
            locations = scenario.locations.len(),
            colocations = scenario.colocations.len(),
            orderings = scenario.orderings.len(),
            "Successfully loaded cluster scenario"
        );
        self.scenario = scenario;
        self.loaded = true;
        Ok(())
    }

    /// Returns `true` after a successful call to [`load_from_file`](Self::load_from_file).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Names of the nodes in the loaded scenario, sorted.
    pub fn node_names(&self) -> Vec<&str> {
        self.scenario.nodes.keys().map(String::as_str).collect()
    }

    /// Ids of the top-level resources in the loaded scenario, in file order.
    pub fn resource_ids(&self) -> Vec<&str> {
        self.scenario.resources.iter().map(|r| r.id.as_str()).collect()
    }

    /// Build the working set for one scheduling pass.
    ///
    /// # Errors
    /// [`SchedulerError::ConfigNotLoaded`] before a successful load;
    /// otherwise unknown node or resource names, duplicate resource ids, and
    /// unparseable scores.
    pub fn build_working_set(&self) -> Result<WorkingSet, SchedulerError> {
        if !self.loaded {
            return Err(SchedulerError::ConfigNotLoaded);
        }
        let mut ws = WorkingSet::new();

        for (name, entry) in &self.scenario.nodes {
            let id = ws.add_node(name);
            let entry = entry.unwrap_or_default();
            let node = ws.node_mut(id);
            node.online = entry.online;
            node.standby = entry.standby;
            node.unclean = entry.unclean;
            node.shutdown = entry.shutdown;
            node.maintenance = entry.maintenance;
            debug!(
                node = %name,
                eligible = node.is_eligible(),
                "  Node"
            );
        }

        for entry in &self.scenario.resources {
            add_entry(&mut ws, entry, None, None)?;
        }
        apply_stickiness(&mut ws);

        for loc in &self.scenario.locations {
            let rsc = resource_id(&ws, &loc.resource)?;
            let node = match &loc.node {
                Some(name) => Some(node_id(&ws, name)?),
                None => None,
            };
            let score = score_value(&loc.score, &format!("location of {}", loc.resource))?;
            ws.resource_location(rsc, node, score, &format!("location:{}", loc.resource));
        }

        for coloc in &self.scenario.colocations {
            let dependent = resource_id(&ws, &coloc.dependent)?;
            let primary = resource_id(&ws, &coloc.primary)?;
            let score = score_value(&coloc.score, &format!("colocation {}", coloc.id))?;
            ws.add_colocation(&coloc.id, dependent, primary, score, coloc.influence);
        }

        for order in &self.scenario.orderings {
            let first = resource_id(&ws, &order.first)?;
            let then = resource_id(&ws, &order.then)?;
            let id = order
                .id
                .clone()
                .unwrap_or_else(|| format!("{}-then-{}", order.first, order.then));
            ws.add_ordering(OrderingConstraint {
                id,
                first,
                first_task: order.first_action,
                then,
                then_task: order.then_action,
                kind: order.kind,
                symmetrical: order.symmetrical,
            });
        }

        info!(
            nodes = ws.nodes().len(),
            resources = ws.resources().len(),
            "Built working set"
        );
        Ok(ws)
    }
}

// ── Working-set construction ──────────────────────────────────────────────────

/// Add `entry` (under `parent`, or inside bundle replica `container`) and
/// everything it contains.
fn add_entry(
    ws: &mut WorkingSet,
    entry: &ResourceEntry,
    parent: Option<ResourceId>,
    container: Option<ResourceId>,
) -> Result<ResourceId, SchedulerError> {
    let id = match container {
        Some(container) => ws.add_contained(container, &entry.id, entry.variant)?,
        None => ws.add_resource(&entry.id, entry.variant, parent)?,
    };

    let mut running_on = Vec::with_capacity(entry.running_on.len());
    for name in &entry.running_on {
        running_on.push(node_id(ws, name)?);
    }

    let r = ws.rsc_mut(id);
    r.meta = entry
        .meta
        .iter()
        .map(|(k, v)| (k.clone(), meta_text(v)))
        .collect();
    r.role = match entry.role {
        Some(role) => role,
        None if !running_on.is_empty() => Role::Started,
        None => Role::Stopped,
    };
    r.running_on = running_on;
    r.next_role = entry.target_role;
    r.flags.set(ResourceFlags::FAILED, entry.failed);
    r.flags.set(ResourceFlags::ORPHAN, entry.orphan);
    r.flags.set(ResourceFlags::MANAGED, entry.managed);

    for child in entry.members.iter().chain(&entry.instances) {
        add_entry(ws, child, Some(id), None)?;
    }
    if let Some(inner) = &entry.contained {
        add_entry(ws, inner, None, Some(id))?;
    }
    Ok(id)
}

/// `resource-stickiness` (own, or inherited from the nearest ancestor)
/// raises the score of the nodes a primitive is running on.
fn apply_stickiness(ws: &mut WorkingSet) {
    for index in 0..ws.resources().len() {
        let rsc = ResourceId(index);
        if ws.rsc(rsc).variant != Variant::Primitive || ws.rsc(rsc).running_on.is_empty() {
            continue;
        }
        let mut holder = Some(rsc);
        let mut stickiness = None;
        while let Some(id) = holder {
            if let Some(value) = ws.rsc(id).meta.get("resource-stickiness") {
                stickiness = parse_score(value);
                break;
            }
            holder = ws.rsc(id).parent;
        }
        let Some(stickiness) = stickiness.filter(|&s| s != 0) else {
            continue;
        };
        for node in ws.rsc(rsc).running_on.clone() {
            ws.resource_location(rsc, Some(node), stickiness, "stickiness");
        }
    }
}

fn meta_text(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn score_value(value: &ScoreValue, context: &str) -> Result<i32, SchedulerError> {
    match value {
        ScoreValue::Number(n) => Ok(clamp_score(*n)),
        ScoreValue::Text(text) => parse_score(text).ok_or_else(|| SchedulerError::InvalidScore {
            value: text.clone(),
            context: context.to_string(),
        }),
    }
}

fn resource_id(ws: &WorkingSet, name: &str) -> Result<ResourceId, SchedulerError> {
    ws.resource_by_name(name)
        .ok_or_else(|| SchedulerError::UnknownResource(name.to_string()))
}

fn node_id(ws: &WorkingSet, name: &str) -> Result<NodeId, SchedulerError> {
    ws.node_by_name(name)
        .ok_or_else(|| SchedulerError::UnknownNode(name.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
