/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the replica scheduler.
//!
//! Two types model the two failure layers:
//!
//! * [`BanReason`]: why one instance cannot run on one node.  Never fatal;
//!   it turns into a `-INFINITY` score and a trace event.
//! * [`SchedulerError`]: a caller broke a precondition (unknown id, wrong
//!   variant, empty input).  Fatal to the current pass.
//!
//! Placement failures, assignment loops and missing actions are *not*
//! errors.  They surface as `false`/`None` return values and `tracing`
//! events, and the pass still produces a plan.

use thiserror::Error;

// ── Instance bans ─────────────────────────────────────────────────────────────

/// Reason an instance is banned from a node before assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanReason {
    /// The instance is no longer configured.
    Orphaned,

    /// The node is offline, in standby, unclean, shutting down or in
    /// maintenance.
    NodeCannotRunResources,

    /// The top-level collective has no entry for the node.
    NotAllowed,

    /// The top-level collective's score for the node is negative.
    NegativeParentScore { score: i32 },

    /// The node already holds `max_per_node` instances.
    NodeFull { max_per_node: u32 },
}

impl std::fmt::Display for BanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BanReason::Orphaned => write!(f, "orphaned"),

            BanReason::NodeCannotRunResources => write!(f, "node cannot run resources"),

            BanReason::NotAllowed => write!(f, "node not allowed"),

            BanReason::NegativeParentScore { score } => write!(
                f,
                "parent score is {} there",
                crate::score::readable_score(*score)
            ),

            BanReason::NodeFull { max_per_node } => write!(
                f,
                "node already has {} instance{}",
                max_per_node,
                if *max_per_node == 1 { "" } else { "s" }
            ),
        }
    }
}

// ── Top-level scheduler errors ────────────────────────────────────────────────

/// Precondition violations that abort a scheduling pass.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `run()` was called on a working set without resources.
    #[error("no resources provided: the working set is empty")]
    NoResources,

    /// [`ClusterConfigManager`] has not loaded a scenario yet.
    ///
    /// [`ClusterConfigManager`]: crate::config::ClusterConfigManager
    #[error("cluster configuration is not loaded")]
    ConfigNotLoaded,

    /// A constraint or status entry names a node that does not exist.
    #[error("unknown node '{0}'")]
    UnknownNode(String),

    /// A constraint names a resource that does not exist.
    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    /// Two resources share one name.
    #[error("resource '{0}' is defined more than once")]
    DuplicateResource(String),

    /// A collective-only operation was invoked on a primitive or group.
    #[error("resource '{resource}' is a {variant}, not a clone or bundle")]
    NotCollective {
        resource: String,
        variant: &'static str,
    },

    /// An instance passed to a collective operation belongs elsewhere.
    #[error("resource '{instance}' is not an instance of '{collective}'")]
    ForeignInstance {
        instance: String,
        collective: String,
    },

    /// A score was neither an integer nor an `INFINITY` sentinel.
    #[error("invalid score '{value}' in {context}")]
    InvalidScore { value: String, context: String },
}
