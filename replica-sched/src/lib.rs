/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! replica-sched – instance placement and ordering propagation for
//! replicated cluster resources
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── score          – INFINITY-saturating score arithmetic
//! ├── resource       – nodes, resources, roles, resource flags
//! ├── action         – actions, tasks, action/ordering flags
//! ├── working_set    – arena holding one scheduling pass
//! ├── variant        – per-variant capability table
//! ├── assign/        – node assignment (primitives, groups, instances)
//! ├── actions/       – action creation, implicit orderings, notifications,
//! │                    live migration
//! ├── ordering/      – flag propagation along orderings, interleaving
//! ├── config/        – YAML cluster scenario loading
//! └── scheduler/     – one complete pass → Plan
//! ```

pub mod action;
pub mod actions;
pub mod assign;
pub mod config;
pub mod ordering;
pub mod resource;
pub mod scheduler;
pub mod score;
pub mod variant;
pub mod working_set;
