/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Actions and ordering edges.
//!
//! An [`Action`] is one step of the transition plan (start `db:0` on
//! `node1`, the clone-level `db_started_0` pseudo-action, a notification,
//! ...).  Actions are linked by [`ActionEdge`]s carrying an [`OrderingType`]
//! bitmask that decides how flags flow along the edge:
//!
//! | Bit | Effect when the edge is evaluated |
//! |---|---|
//! | `ORDERED` | sequencing only |
//! | `IMPLIES_THEN` | mandatory `first` makes `then` mandatory |
//! | `IMPLIES_FIRST` | mandatory `then` makes `first` mandatory |
//! | `RUNNABLE_LEFT` | unrunnable `first` makes `then` unrunnable |
//!
//! Identity is structured ([`ActionKey`]); the textual uuid is rendered once
//! at creation time for logs and the output plan and is never parsed back.

use std::fmt;

use bitflags::bitflags;
use serde::Deserialize;

use crate::resource::{NodeId, ResourceId};

/// Index of an [`Action`] in the working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(pub usize);

// ── Task ──────────────────────────────────────────────────────────────────────

/// What an action does.
///
/// The past-tense variants are the completion pseudo-actions of groups and
/// collectives ("all members have started").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Monitor,
    Start,
    Started,
    Stop,
    Stopped,
    Promote,
    Promoted,
    Demote,
    Demoted,
    Notify,
    Notified,
    #[serde(rename = "migrate_to")]
    MigrateTo,
    #[serde(rename = "migrate_from")]
    MigrateFrom,
}

impl Task {
    pub fn as_str(self) -> &'static str {
        match self {
            Task::Monitor => "monitor",
            Task::Start => "start",
            Task::Started => "running",
            Task::Stop => "stop",
            Task::Stopped => "stopped",
            Task::Promote => "promote",
            Task::Promoted => "promoted",
            Task::Demote => "demote",
            Task::Demoted => "demoted",
            Task::Notify => "notify",
            Task::Notified => "notified",
            Task::MigrateTo => "migrate_to",
            Task::MigrateFrom => "migrate_from",
        }
    }

    /// The completion task of a state change (`start` → `started`).
    pub fn completion(self) -> Task {
        match self {
            Task::Start => Task::Started,
            Task::Stop => Task::Stopped,
            Task::Promote => Task::Promoted,
            Task::Demote => Task::Demoted,
            Task::Notify => Task::Notified,
            other => other,
        }
    }

    /// The executable task behind a completion task (`started` → `start`).
    ///
    /// Primitives have no completion actions, so anything addressed to a
    /// primitive is folded through this first.
    pub fn atomic(self) -> Task {
        match self {
            Task::Started => Task::Start,
            Task::Stopped => Task::Stop,
            Task::Promoted => Task::Promote,
            Task::Demoted => Task::Demote,
            Task::Notified => Task::Notify,
            other => other,
        }
    }

    /// The task undoing this one, used for symmetrical orderings.
    pub fn inverse(self) -> Option<Task> {
        match self {
            Task::Start => Some(Task::Stop),
            Task::Started => Some(Task::Stopped),
            Task::Stop => Some(Task::Start),
            Task::Stopped => Some(Task::Started),
            Task::Promote => Some(Task::Demote),
            Task::Promoted => Some(Task::Demoted),
            Task::Demote => Some(Task::Promote),
            Task::Demoted => Some(Task::Promoted),
            Task::Monitor
            | Task::Notify
            | Task::Notified
            | Task::MigrateTo
            | Task::MigrateFrom => None,
        }
    }

    /// `stop` or `demote`: actions that take something away.
    pub fn is_stop_or_demote(self) -> bool {
        matches!(self, Task::Stop | Task::Demote)
    }

    /// `stopped` or `demoted`.
    pub fn is_stopped_or_demoted(self) -> bool {
        matches!(self, Task::Stopped | Task::Demoted)
    }

    /// `stop` or `stopped`.
    pub fn is_stop_class(self) -> bool {
        matches!(self, Task::Stop | Task::Stopped)
    }

    /// Promote/demote and their completions.
    pub fn is_role_change(self) -> bool {
        matches!(
            self,
            Task::Promote | Task::Promoted | Task::Demote | Task::Demoted
        )
    }

    /// `start`/`promote` and their completions.
    pub fn is_bring_up(self) -> bool {
        matches!(
            self,
            Task::Start | Task::Started | Task::Promote | Task::Promoted
        )
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Action key ────────────────────────────────────────────────────────────────

/// Before or after the action being notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyPhase {
    Pre,
    Post,
}

impl NotifyPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            NotifyPhase::Pre => "pre",
            NotifyPhase::Post => "post",
        }
    }
}

/// The action a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotifyKey {
    pub phase: NotifyPhase,
    pub task: Task,
}

/// Structured action identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey {
    pub resource: Option<ResourceId>,
    pub task: Task,
    pub interval_ms: u32,
    /// Set for `notify`/`notified` actions.
    pub notify: Option<NotifyKey>,
}

impl ActionKey {
    pub fn new(resource: Option<ResourceId>, task: Task) -> Self {
        Self {
            resource,
            task,
            interval_ms: 0,
            notify: None,
        }
    }

    /// Key of a notification pseudo-action (`notify` for the request,
    /// `notified` for its confirmation).
    pub fn notification(resource: ResourceId, confirmed: bool, notify: NotifyKey) -> Self {
        Self {
            resource: Some(resource),
            task: if confirmed { Task::Notified } else { Task::Notify },
            interval_ms: 0,
            notify: Some(notify),
        }
    }

    /// Render the textual uuid, e.g. `db_start_0` or
    /// `db_confirmed-post_notify_stop_0`.
    pub fn render(&self, owner: &str) -> String {
        match self.notify {
            Some(notify) => {
                let phase = if self.task == Task::Notified {
                    format!("confirmed-{}", notify.phase.as_str())
                } else {
                    notify.phase.as_str().to_string()
                };
                format!("{owner}_{phase}_notify_{}_0", notify.task)
            }
            None => format!("{owner}_{}_{}", self.task, self.interval_ms),
        }
    }
}

// ── Flags ─────────────────────────────────────────────────────────────────────

bitflags! {
    /// Per-action state bits.  Propagation only ever clears `OPTIONAL` and
    /// `RUNNABLE`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ActionFlags: u32 {
        const OPTIONAL         = 1 << 0;
        const RUNNABLE         = 1 << 1;
        const PSEUDO           = 1 << 2;
        /// Set on a collective `stop`: its instances may live-migrate.
        const MIGRATE_RUNNABLE = 1 << 3;
        /// Start, stop or `migrate_to` standing in for a live migration.
        const MIGRATABLE       = 1 << 4;
    }
}

bitflags! {
    /// Semantics of an ordering edge.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OrderingType: u32 {
        const ORDERED       = 1 << 0;
        const IMPLIES_FIRST = 1 << 1;
        const IMPLIES_THEN  = 1 << 2;
        const RUNNABLE_LEFT = 1 << 3;
    }
}

impl OrderingType {
    /// Edges that let nothing stay active on the `then` side without a
    /// matching `first`.
    pub fn is_mandatory(self) -> bool {
        self.intersects(OrderingType::RUNNABLE_LEFT | OrderingType::IMPLIES_THEN)
    }
}

bitflags! {
    /// Which side(s) of an ordering had flags altered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Updated: u32 {
        const FIRST = 1 << 0;
        const THEN  = 1 << 1;
    }
}

// ── Action ────────────────────────────────────────────────────────────────────

/// One side of an ordering edge as stored on the other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionEdge {
    pub action: ActionId,
    pub kind: OrderingType,
}

#[derive(Debug, Clone)]
pub struct Action {
    pub id: ActionId,
    pub key: ActionKey,
    pub uuid: String,
    pub rsc: Option<ResourceId>,
    pub node: Option<NodeId>,
    pub task: Task,
    pub flags: ActionFlags,
    /// `INFINITY` marks actions that must never be pruned.
    pub priority: i32,
    /// Incoming edges (this action is `then`).
    pub actions_before: Vec<ActionEdge>,
    /// Outgoing edges (this action is `first`).
    pub actions_after: Vec<ActionEdge>,
    pub reason: Option<String>,
}

impl Action {
    pub fn is_set(&self, flags: ActionFlags) -> bool {
        self.flags.contains(flags)
    }

    pub fn is_optional(&self) -> bool {
        self.is_set(ActionFlags::OPTIONAL)
    }

    pub fn is_runnable(&self) -> bool {
        self.is_set(ActionFlags::RUNNABLE)
    }

    pub fn is_pseudo(&self) -> bool {
        self.is_set(ActionFlags::PSEUDO)
    }

    /// Clear `flags`; returns whether anything was actually cleared.
    pub fn clear(&mut self, flags: ActionFlags) -> bool {
        let before = self.flags;
        self.flags.remove(flags);
        before != self.flags
    }
}

/// First action in `actions` with the given task and, when `node` is given,
/// on that node.  Node-less actions never match a node-scoped search.
pub fn find_first_action<'a>(
    actions: impl IntoIterator<Item = &'a Action>,
    task: Task,
    node: Option<NodeId>,
) -> Option<ActionId> {
    actions
        .into_iter()
        .find(|action| {
            action.task == task
                && match node {
                    None => true,
                    Some(node) => action.node == Some(node),
                }
        })
        .map(|action| action.id)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn action(id: usize, task: Task, node: Option<usize>) -> Action {
        Action {
            id: ActionId(id),
            key: ActionKey::new(Some(ResourceId(0)), task),
            uuid: format!("r_{task}_0"),
            rsc: Some(ResourceId(0)),
            node: node.map(NodeId),
            task,
            flags: ActionFlags::RUNNABLE,
            priority: 0,
            actions_before: Vec::new(),
            actions_after: Vec::new(),
            reason: None,
        }
    }

    #[test]
    fn completion_and_atomic_are_inverse_for_state_changes() {
        for task in [Task::Start, Task::Stop, Task::Promote, Task::Demote] {
            assert_eq!(task.completion().atomic(), task);
        }
        assert_eq!(Task::Monitor.completion(), Task::Monitor);
    }

    #[test]
    fn inverse_swaps_start_and_stop() {
        assert_eq!(Task::Start.inverse(), Some(Task::Stop));
        assert_eq!(Task::Promoted.inverse(), Some(Task::Demoted));
        assert_eq!(Task::Notify.inverse(), None);
        assert_eq!(Task::MigrateTo.inverse(), None);
    }

    #[test]
    fn uuid_rendering() {
        let key = ActionKey::new(Some(ResourceId(0)), Task::Start);
        assert_eq!(key.render("db"), "db_start_0");

        let key = ActionKey::new(Some(ResourceId(0)), Task::Started);
        assert_eq!(key.render("db"), "db_running_0");

        let key = ActionKey::new(Some(ResourceId(0)), Task::MigrateFrom);
        assert_eq!(key.render("vm"), "vm_migrate_from_0");

        let notify = NotifyKey {
            phase: NotifyPhase::Post,
            task: Task::Stop,
        };
        assert_eq!(
            ActionKey::notification(ResourceId(0), true, notify).render("db"),
            "db_confirmed-post_notify_stop_0"
        );
        assert_eq!(
            ActionKey::notification(ResourceId(0), false, notify).render("db"),
            "db_post_notify_stop_0"
        );
    }

    #[test]
    fn find_first_action_skips_node_less_actions_for_node_queries() {
        let actions = [
            action(0, Task::Start, None),
            action(1, Task::Start, Some(2)),
            action(2, Task::Stop, Some(2)),
        ];
        assert_eq!(
            find_first_action(&actions, Task::Start, None),
            Some(ActionId(0))
        );
        assert_eq!(
            find_first_action(&actions, Task::Start, Some(NodeId(2))),
            Some(ActionId(1))
        );
        assert_eq!(find_first_action(&actions, Task::Start, Some(NodeId(9))), None);
    }

    #[test]
    fn clear_reports_change_once() {
        let mut a = action(0, Task::Start, None);
        a.flags |= ActionFlags::OPTIONAL;
        assert!(a.clear(ActionFlags::OPTIONAL));
        assert!(!a.clear(ActionFlags::OPTIONAL));
        assert!(a.is_runnable());
    }

    #[test]
    fn mandatory_edges() {
        assert!(OrderingType::IMPLIES_THEN.is_mandatory());
        assert!((OrderingType::ORDERED | OrderingType::RUNNABLE_LEFT).is_mandatory());
        assert!(!OrderingType::ORDERED.is_mandatory());
        assert!(!OrderingType::IMPLIES_FIRST.is_mandatory());
    }
}
