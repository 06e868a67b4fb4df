/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Live migration of primitives.
//!
//! A managed primitive with `allow-migrate` that moves between two healthy
//! nodes is migrated instead of restarted.  `migrate_to` runs on the source,
//! `migrate_from` on the target, and the start on the target becomes a
//! pseudo-action completed by the migration.  The stop on the source still
//! runs afterwards to clean up.
//!
//! ```text
//! migrate_to ──► migrate_from ──► stop (source) ──► start (target, pseudo)
//! ```
//!
//! | Situation | Outcome |
//! |---|---|
//! | top-level primitive | migrates |
//! | clone/bundle instance | migrates only while the collective's `stop` is migrate-runnable |
//! | group member | restarts with its group |
//! | must stop before a restarting collective | migration abandoned, plain stop/start |

use tracing::{debug, error, trace};

use crate::action::{ActionFlags, ActionId, ActionKey, OrderingType, Task};
use crate::resource::{is_true, NodeId, ResourceFlags, ResourceId, Role};
use crate::working_set::WorkingSet;

/// The node `rsc` would migrate away from, if it can migrate at all.
pub fn migration_source(ws: &WorkingSet, rsc: ResourceId) -> Option<NodeId> {
    let r = ws.rsc(rsc);
    if !ws.inherited_meta(rsc, "allow-migrate").is_some_and(is_true) {
        return None;
    }
    let [source] = r.running_on[..] else {
        return None;
    };
    let target = r.assigned_to?;
    if source == target {
        return None;
    }

    let reason = if !r.is_set(ResourceFlags::MANAGED) {
        Some("unmanaged")
    } else if r.is_set(ResourceFlags::FAILED) {
        Some("failed")
    } else if r.is_set(ResourceFlags::BLOCKED) {
        Some("blocked")
    } else if r.role != Role::Started || r.state(false) != Role::Started {
        Some("role change")
    } else if ws.node(source).unclean || !ws.node(source).online {
        Some("source unavailable")
    } else if !ws.node(target).is_eligible() {
        Some("target unavailable")
    } else {
        None
    };
    if let Some(reason) = reason {
        trace!(resource = %r.name, reason, "Cannot migrate");
        return None;
    }
    Some(source)
}

fn parent_allows_migration(ws: &WorkingSet, rsc: ResourceId) -> bool {
    let Some(parent) = ws.rsc(rsc).parent else {
        return true;
    };
    if !ws.rsc(parent).variant.is_collective() {
        trace!(resource = %ws.rsc(rsc).name, "Group members restart with their group");
        return false;
    }
    match ws.find_action(parent, Task::Stop, None) {
        Some(stop) if ws.action(stop).is_set(ActionFlags::MIGRATE_RUNNABLE) => true,
        Some(_) => {
            debug!(
                "Not migrating {}: {} is restarting",
                ws.rsc(rsc).name,
                ws.rsc(parent).name
            );
            false
        }
        // The collective has not created its own actions yet.
        None => false,
    }
}

/// Migrate `rsc` if it can migrate; returns whether migration actions exist.
pub fn schedule_migration(ws: &mut WorkingSet, rsc: ResourceId) -> bool {
    let Some(source) = migration_source(ws, rsc) else {
        return false;
    };
    if !parent_allows_migration(ws, rsc) {
        return false;
    }
    create_migration_actions(ws, rsc, source)
}

/// Create `migrate_to`/`migrate_from` for moving `rsc` off `source`.
fn create_migration_actions(ws: &mut WorkingSet, rsc: ResourceId, source: NodeId) -> bool {
    let target = ws.rsc(rsc).assigned_to;
    let start = target.and_then(|t| ws.find_action(rsc, Task::Start, Some(t)));
    let stop = ws.find_action(rsc, Task::Stop, Some(source));
    let (Some(start), Some(stop)) = (start, stop) else {
        error!("Internal error: {} is moving without a stop and start", ws.rsc(rsc).name);
        return false;
    };

    debug!(
        "Migrating {} from {} to {}",
        ws.rsc(rsc).name,
        ws.node_name(Some(source)),
        ws.node_name(target)
    );
    let optional = ws.action(stop).is_optional();
    let migrate_to = ws.new_action(ActionKey::new(Some(rsc), Task::MigrateTo), Some(source), optional);
    let migrate_from = ws.new_action(ActionKey::new(Some(rsc), Task::MigrateFrom), target, optional);

    for id in [start, stop, migrate_to] {
        ws.action_mut(id).flags |= ActionFlags::MIGRATABLE;
    }
    ws.action_mut(start).flags |= ActionFlags::PSEUDO;

    let start_runnable = ws.action(start).is_runnable();
    let stop_runnable = ws.action(stop).is_runnable();
    if !(start_runnable && stop_runnable) {
        let action = ws.action_mut(migrate_to);
        if action.clear(ActionFlags::RUNNABLE) {
            action.reason = Some("stop or start unrunnable".to_string());
        }
    }
    if !start_runnable {
        ws.action_mut(migrate_from).clear(ActionFlags::RUNNABLE);
    }

    ws.order_actions(migrate_to, migrate_from, OrderingType::ORDERED | OrderingType::RUNNABLE_LEFT);
    ws.order_actions(migrate_from, stop, OrderingType::ORDERED);
    ws.order_actions(migrate_from, start, OrderingType::ORDERED);
    true
}

/// The migration actions of `rsc`, if it is migrating.
fn migration_actions(ws: &WorkingSet, rsc: ResourceId) -> Option<(ActionId, ActionId)> {
    let migrate_to = ws.find_action(rsc, Task::MigrateTo, None)?;
    let migrate_from = ws.find_action(rsc, Task::MigrateFrom, None)?;
    Some((migrate_to, migrate_from))
}

/// Abandon migrations that ordering makes unsafe, and give the surviving
/// ones the orderings of the start they replace.
///
/// A migrating resource ordered to stop before a collective that is stopping
/// without being migrate-runnable has to really stop: its start loses the
/// pseudo flag and the migration actions become unrunnable.
pub fn apply_migration_orderings(ws: &mut WorkingSet) {
    let migrating: Vec<ResourceId> = ws
        .resources()
        .iter()
        .filter(|r| migration_actions(ws, r.id).is_some())
        .map(|r| r.id)
        .collect();

    for rsc in migrating {
        let Some((migrate_to, migrate_from)) = migration_actions(ws, rsc) else {
            continue;
        };
        let stops = ws.resource_actions(rsc, Task::Stop, None);
        let starts = ws.resource_actions(rsc, Task::Start, None);

        let blocker = stops.iter().find_map(|&stop| {
            ws.action(stop).actions_after.iter().find_map(|edge| {
                let after = ws.action(edge.action);
                let collective = after.rsc.filter(|&r| ws.rsc(r).variant.is_collective())?;
                let blocks = after.task == Task::Stop
                    && !after.is_optional()
                    && !after.is_set(ActionFlags::MIGRATE_RUNNABLE);
                blocks.then_some(collective)
            })
        });

        if let Some(collective) = blocker {
            let reason = format!("{} is restarting", ws.rsc(collective).name);
            debug!("Abandoning migration of {}: {}", ws.rsc(rsc).name, reason);
            for id in [migrate_to, migrate_from] {
                let action = ws.action_mut(id);
                if action.clear(ActionFlags::RUNNABLE) {
                    action.reason = Some(reason.clone());
                }
            }
            for &start in &starts {
                ws.action_mut(start).flags.remove(ActionFlags::MIGRATABLE | ActionFlags::PSEUDO);
            }
            for &stop in &stops {
                ws.action_mut(stop).flags.remove(ActionFlags::MIGRATABLE);
            }
            continue;
        }

        for &start in &starts {
            for edge in ws.action(start).actions_before.clone() {
                if ws.action(edge.action).rsc == Some(rsc) {
                    continue;
                }
                ws.order_actions(edge.action, migrate_to, edge.kind);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::instances::create_collective_actions;
    use crate::actions::{create_primitive_actions, internal_constraints, order_resource_actions};
    use crate::resource::Variant;

    fn moving_vm(ws: &mut WorkingSet, name: &str, from: NodeId, to: NodeId) -> ResourceId {
        let vm = ws.add_resource(name, Variant::Primitive, None).unwrap();
        let r = ws.rsc_mut(vm);
        r.meta.insert("allow-migrate".into(), "true".into());
        r.running_on = vec![from];
        r.role = Role::Started;
        r.assigned_to = Some(to);
        vm
    }

    fn ordered_after(ws: &WorkingSet, first: ActionId, then: ActionId) -> bool {
        ws.action(first).actions_after.iter().any(|e| e.action == then)
    }

    #[test]
    fn moving_resource_migrates_instead_of_restarting() {
        let mut ws = WorkingSet::new();
        let n1 = ws.add_node("node1");
        let n2 = ws.add_node("node2");
        let vm = moving_vm(&mut ws, "vm", n1, n2);

        create_primitive_actions(&mut ws, vm);
        internal_constraints(&mut ws, vm);

        let migrate_to = ws.find_action(vm, Task::MigrateTo, Some(n1)).unwrap();
        let migrate_from = ws.find_action(vm, Task::MigrateFrom, Some(n2)).unwrap();
        let stop = ws.find_action(vm, Task::Stop, Some(n1)).unwrap();
        let start = ws.find_action(vm, Task::Start, Some(n2)).unwrap();

        assert_eq!(ws.action(migrate_to).uuid, "vm_migrate_to_0");
        assert!(!ws.action(migrate_to).is_optional() && ws.action(migrate_to).is_runnable());
        assert!(ws.action(start).is_pseudo());
        assert!(!ws.action(stop).is_pseudo());
        assert!(ordered_after(&ws, migrate_to, migrate_from));
        assert!(ordered_after(&ws, migrate_from, stop));
        assert!(ordered_after(&ws, migrate_from, start));
    }

    #[test]
    fn resources_without_allow_migrate_restart() {
        let mut ws = WorkingSet::new();
        let n1 = ws.add_node("node1");
        let n2 = ws.add_node("node2");
        let vm = moving_vm(&mut ws, "vm", n1, n2);
        ws.rsc_mut(vm).meta.insert("allow-migrate".into(), "false".into());

        create_primitive_actions(&mut ws, vm);
        assert_eq!(ws.find_action(vm, Task::MigrateTo, None), None);
        let start = ws.find_action(vm, Task::Start, Some(n2)).unwrap();
        assert!(!ws.action(start).is_pseudo());
    }

    #[test]
    fn unhealthy_source_or_failure_prevents_migration() {
        let mut ws = WorkingSet::new();
        let n1 = ws.add_node("node1");
        let n2 = ws.add_node("node2");
        let vm = moving_vm(&mut ws, "vm", n1, n2);
        assert_eq!(migration_source(&ws, vm), Some(n1));

        ws.node_mut(n1).unclean = true;
        assert_eq!(migration_source(&ws, vm), None);

        ws.node_mut(n1).unclean = false;
        ws.rsc_mut(vm).flags.insert(ResourceFlags::FAILED);
        assert_eq!(migration_source(&ws, vm), None);

        ws.rsc_mut(vm).flags.remove(ResourceFlags::FAILED);
        ws.rsc_mut(vm).running_on.push(n2);
        assert_eq!(migration_source(&ws, vm), None);
    }

    #[test]
    fn moving_instance_makes_its_clone_restart_and_does_not_migrate() {
        let mut ws = WorkingSet::new();
        let n1 = ws.add_node("node1");
        let n2 = ws.add_node("node2");
        let clone = ws.add_resource("vms", Variant::Clone, None).unwrap();
        ws.rsc_mut(clone).meta.insert("allow-migrate".into(), "true".into());
        let inst = ws.add_resource("vms:0", Variant::Primitive, Some(clone)).unwrap();
        let r = ws.rsc_mut(inst);
        r.running_on = vec![n1];
        r.role = Role::Started;
        r.assigned_to = Some(n2);

        create_collective_actions(&mut ws, clone);

        let stop = ws.find_action(clone, Task::Stop, None).unwrap();
        assert!(!ws.action(stop).is_set(ActionFlags::MIGRATE_RUNNABLE));
        assert_eq!(ws.find_action(inst, Task::MigrateTo, None), None);
    }

    #[test]
    fn instance_migrates_while_its_clone_stop_is_migrate_runnable() {
        let mut ws = WorkingSet::new();
        let n1 = ws.add_node("node1");
        let n2 = ws.add_node("node2");
        let clone = ws.add_resource("vms", Variant::Clone, None).unwrap();
        let inst = moving_vm(&mut ws, "vms:0", n1, n2);
        ws.rsc_mut(inst).parent = Some(clone);
        ws.rsc_mut(clone).children.push(inst);
        let stop = ws.new_pseudo_action(clone, Task::Stop, true, true);

        create_primitive_actions(&mut ws, inst);
        assert!(!schedule_migration(&mut ws, inst));

        ws.action_mut(stop).flags |= ActionFlags::MIGRATE_RUNNABLE;
        assert!(schedule_migration(&mut ws, inst));
        assert!(ws.find_action(inst, Task::MigrateFrom, Some(n2)).is_some());
    }

    #[test]
    fn restarting_collective_underneath_abandons_the_migration() {
        let mut ws = WorkingSet::new();
        let n1 = ws.add_node("node1");
        let n2 = ws.add_node("node2");
        let vm = moving_vm(&mut ws, "vm", n1, n2);
        let storage = ws.add_resource("storage", Variant::Clone, None).unwrap();
        create_primitive_actions(&mut ws, vm);
        let storage_stop = ws.new_pseudo_action(storage, Task::Stop, false, true);
        order_resource_actions(&mut ws, vm, Task::Stop, storage, Task::Stop, OrderingType::ORDERED);

        apply_migration_orderings(&mut ws);

        let migrate_to = ws.find_action(vm, Task::MigrateTo, Some(n1)).unwrap();
        let start = ws.find_action(vm, Task::Start, Some(n2)).unwrap();
        assert!(!ws.action(migrate_to).is_runnable());
        assert_eq!(ws.action(migrate_to).reason.as_deref(), Some("storage is restarting"));
        assert!(!ws.action(start).is_pseudo());
        assert!(ws.action(start).is_runnable());
        assert!(!ws.action(storage_stop).is_set(ActionFlags::MIGRATE_RUNNABLE));
    }

    #[test]
    fn surviving_migration_inherits_the_start_orderings() {
        let mut ws = WorkingSet::new();
        let n1 = ws.add_node("node1");
        let n2 = ws.add_node("node2");
        let vm = moving_vm(&mut ws, "vm", n1, n2);
        let storage = ws.add_resource("storage", Variant::Clone, None).unwrap();
        create_primitive_actions(&mut ws, vm);
        let running = ws.new_pseudo_action(storage, Task::Started, true, false);
        let storage_stop = ws.new_pseudo_action(storage, Task::Stop, true, true);
        ws.action_mut(storage_stop).flags |= ActionFlags::MIGRATE_RUNNABLE;
        let gate = OrderingType::ORDERED | OrderingType::RUNNABLE_LEFT;
        order_resource_actions(&mut ws, storage, Task::Started, vm, Task::Start, gate);
        order_resource_actions(&mut ws, vm, Task::Stop, storage, Task::Stop, OrderingType::ORDERED);

        apply_migration_orderings(&mut ws);

        let migrate_to = ws.find_action(vm, Task::MigrateTo, Some(n1)).unwrap();
        assert!(ordered_after(&ws, running, migrate_to));
        assert!(ws.action(migrate_to).is_runnable());
        let start = ws.find_action(vm, Task::Start, Some(n2)).unwrap();
        assert!(ws.action(start).is_pseudo());
    }
}
