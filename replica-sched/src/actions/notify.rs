/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Notification pseudo-actions around a collective's start or stop.
//!
//! ```text
//! pre ──► pre_done ──► action ··· complete ──► post ──► post_done
//!            └──────────────────────────────────┘
//! ```
//!
//! `pre`/`pre_done` are as optional as the action they surround; `post` and
//! `post_done` are runnable only if the completion action is, and are
//! never pruned.

use tracing::trace;

use crate::action::{ActionFlags, ActionId, ActionKey, NotifyKey, NotifyPhase, OrderingType, Task};
use crate::resource::ResourceId;
use crate::score::INFINITY;
use crate::working_set::WorkingSet;

/// Notification pseudo-actions built for one collective action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyData {
    /// The task being notified about (`start` or `stop`).
    pub task: Task,
    pub action: ActionId,
    pub complete: ActionId,
    pub pre: ActionId,
    pub pre_done: ActionId,
    pub post: ActionId,
    pub post_done: ActionId,
}

/// Start and stop notifications of one collective.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectiveNotify {
    pub start: Option<NotifyData>,
    pub stop: Option<NotifyData>,
}

fn notify_pseudo(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    phase: NotifyPhase,
    confirmed: bool,
    task: Task,
    optional: bool,
    runnable: bool,
) -> ActionId {
    let key = ActionKey::notification(rsc, confirmed, NotifyKey { phase, task });
    let id = ws.new_action(key, None, optional);
    let action = ws.action_mut(id);
    action.flags |= ActionFlags::PSEUDO;
    if !runnable {
        action.flags.remove(ActionFlags::RUNNABLE);
    }
    id
}

/// Create the notification pseudo-actions for `action` (collective
/// `task`) and its completion `complete`, and order them around the two.
pub fn create_notifications(
    ws: &mut WorkingSet,
    rsc: ResourceId,
    task: Task,
    action: ActionId,
    complete: ActionId,
) -> NotifyData {
    let optional = ws.action(action).is_optional();
    let runnable = ws.action(action).is_runnable();
    trace!(
        resource = %ws.rsc(rsc).name,
        %task,
        optional,
        "Creating notification pseudo-actions"
    );

    let pre = notify_pseudo(ws, rsc, NotifyPhase::Pre, false, task, optional, runnable);
    let pre_done = notify_pseudo(ws, rsc, NotifyPhase::Pre, true, task, optional, runnable);
    ws.order_actions(pre, pre_done, OrderingType::ORDERED);
    ws.order_actions(pre_done, action, OrderingType::ORDERED);

    let complete_optional = ws.action(complete).is_optional();
    let complete_runnable = ws.action(complete).is_runnable();
    let post = notify_pseudo(
        ws,
        rsc,
        NotifyPhase::Post,
        false,
        task,
        complete_optional,
        complete_runnable,
    );
    let post_done = notify_pseudo(
        ws,
        rsc,
        NotifyPhase::Post,
        true,
        task,
        complete_optional,
        complete_runnable,
    );
    ws.action_mut(post).priority = INFINITY;
    ws.action_mut(post_done).priority = INFINITY;

    ws.order_actions(complete, post, OrderingType::IMPLIES_THEN | OrderingType::ORDERED);
    ws.order_actions(post, post_done, OrderingType::IMPLIES_THEN | OrderingType::ORDERED);
    ws.order_actions(pre_done, post, OrderingType::ORDERED);

    NotifyData {
        task,
        action,
        complete,
        pre,
        pre_done,
        post,
        post_done,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
