//! Derived aggregate counters.
//!
//! `compute_stats` is a pure function of a snapshot, a filter, and the
//! caller's calendar date. It recomputes everything from scratch after
//! each store mutation; the dataset is small enough that incremental
//! diffing buys nothing. Identical inputs yield identical output; no
//! state is carried between calls.

use chrono::NaiveDate;
use serde::Serialize;

use crate::records::{AgeBracket, Entity, TaskRecord};
use crate::recurrence::{is_due_today, is_overdue};
use crate::store::Snapshot;

// =============================================================================
// Stats
// =============================================================================

/// Capacity counters. Toddlers are excluded from capacity-consuming
/// totals; checked-in and pending are tracked separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CapacityStats {
    pub total: u64,
    pub checked_in: u64,
    pub pending: u64,
}

/// Collection counters, restricted to entities that actually carry a
/// shirt order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub orders: u64,
    pub paid: u64,
    pub unpaid: u64,
}

/// Task counters with calendar-date due semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: u64,
    pub incomplete: u64,
    pub complete: u64,
    pub overdue: u64,
    pub due_today: u64,
}

/// The full derived-counter set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub capacity: CapacityStats,
    pub collections: CollectionStats,
    pub tasks: TaskStats,
}

// =============================================================================
// Filters
// =============================================================================

/// Filter predicates applied before counting. Entity-level filters
/// (brackets, check-in state) scope the capacity and collection counters;
/// task-level filters (assignee, category) scope the task counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsFilter {
    /// Count only these age brackets; `None` means all.
    pub brackets: Option<Vec<AgeBracket>>,

    /// Count only entities with this check-in state; `None` means all.
    pub checked_in: Option<bool>,

    /// Count only tasks with this assignee; `None` means all.
    pub assignee: Option<String>,

    /// Count only tasks in this category; `None` means all.
    pub category: Option<String>,
}

impl StatsFilter {
    pub fn matches_entity(&self, entity: &Entity) -> bool {
        if let Some(brackets) = &self.brackets {
            if !brackets.contains(&entity.age_bracket()) {
                return false;
            }
        }
        if let Some(checked_in) = self.checked_in {
            if entity.checked_in() != checked_in {
                return false;
            }
        }
        true
    }

    pub fn matches_task(&self, task: &TaskRecord) -> bool {
        if let Some(assignee) = &self.assignee {
            if &task.assignee != assignee {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &task.category != category {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// Computation
// =============================================================================

/// Recompute all derived counters from a snapshot.
pub fn compute_stats(snapshot: &Snapshot, filter: &StatsFilter, today: NaiveDate) -> Stats {
    let mut stats = Stats::default();

    for entity in snapshot.entities.values() {
        if !filter.matches_entity(entity) {
            continue;
        }

        if entity.age_bracket().consumes_capacity() {
            stats.capacity.total += 1;
            if entity.checked_in() {
                stats.capacity.checked_in += 1;
            } else {
                stats.capacity.pending += 1;
            }
        }

        if entity.has_shirt_order() {
            stats.collections.orders += 1;
            if entity.shirt.paid {
                stats.collections.paid += 1;
            } else {
                stats.collections.unpaid += 1;
            }
        }
    }

    for task in snapshot.tasks.values() {
        if !filter.matches_task(task) {
            continue;
        }

        stats.tasks.total += 1;
        if task.status.is_complete() {
            stats.tasks.complete += 1;
        } else {
            stats.tasks.incomplete += 1;
        }
        if is_overdue(task, today) {
            stats.tasks.overdue += 1;
        }
        if is_due_today(task, today) {
            stats.tasks.due_today += 1;
        }
    }

    stats
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{
        PersonId, RecurrenceRule, TaskId, TaskPriority, TaskRecord, TaskStatus,
    };
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn entity(name: &str, age: Option<u32>, checked_in: bool, size: &str, paid: bool) -> Entity {
        let mut entity = Entity::new(PersonId::new());
        entity.identity.name = name.to_string();
        entity.identity.age = age;
        entity.attendance.registered = checked_in;
        entity.shirt.size = size.to_string();
        entity.shirt.paid = paid;
        entity
    }

    fn snapshot(entities: Vec<Entity>, tasks: Vec<TaskRecord>) -> Snapshot {
        Snapshot {
            entities: entities.into_iter().map(|e| (e.id, e)).collect(),
            tasks: tasks.into_iter().map(|t| (t.id, t)).collect(),
        }
    }

    fn task(assignee: &str, status: TaskStatus, due_day: u32) -> TaskRecord {
        TaskRecord {
            id: TaskId::new(),
            person_id: PersonId::new(),
            text: "task".into(),
            due_date: Utc.with_ymd_and_hms(2024, 6, due_day, 12, 0, 0).unwrap(),
            priority: TaskPriority::Normal,
            category: "general".into(),
            assignee: assignee.into(),
            status,
            recurrence: RecurrenceRule::None,
            recurrence_end: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[test]
    fn test_toddlers_excluded_from_capacity() {
        let snap = snapshot(
            vec![
                entity("a", Some(2), true, "", false),
                entity("b", Some(8), true, "", false),
                entity("c", Some(30), false, "", false),
                entity("d", None, false, "", false),
            ],
            vec![],
        );
        let stats = compute_stats(&snap, &StatsFilter::default(), today());
        assert_eq!(stats.capacity.total, 3);
        assert_eq!(stats.capacity.checked_in, 1);
        assert_eq!(stats.capacity.pending, 2);
    }

    #[test]
    fn test_collections_require_an_actual_order() {
        let snap = snapshot(
            vec![
                entity("a", Some(30), false, "M", true),
                entity("b", Some(30), false, "L", false),
                entity("c", Some(30), false, "", false),
                entity("d", Some(30), false, "  ", true),
            ],
            vec![],
        );
        let stats = compute_stats(&snap, &StatsFilter::default(), today());
        assert_eq!(stats.collections.orders, 2);
        assert_eq!(stats.collections.paid, 1);
        assert_eq!(stats.collections.unpaid, 1);
    }

    #[test]
    fn test_task_counters_with_date_semantics() {
        let snap = snapshot(
            vec![],
            vec![
                task("sam", TaskStatus::Incomplete, 14), // overdue
                task("sam", TaskStatus::Incomplete, 15), // due today
                task("sam", TaskStatus::Complete, 14),   // neither
                task("sam", TaskStatus::Incomplete, 16), // upcoming
            ],
        );
        let stats = compute_stats(&snap, &StatsFilter::default(), today());
        assert_eq!(stats.tasks.total, 4);
        assert_eq!(stats.tasks.incomplete, 3);
        assert_eq!(stats.tasks.complete, 1);
        assert_eq!(stats.tasks.overdue, 1);
        assert_eq!(stats.tasks.due_today, 1);
    }

    #[test]
    fn test_filters_scope_counters() {
        let snap = snapshot(
            vec![
                entity("a", Some(8), true, "M", true),
                entity("b", Some(30), false, "L", false),
            ],
            vec![
                task("sam", TaskStatus::Incomplete, 16),
                task("alex", TaskStatus::Incomplete, 16),
            ],
        );

        let filter = StatsFilter {
            brackets: Some(vec![AgeBracket::Kid]),
            assignee: Some("sam".into()),
            ..Default::default()
        };
        let stats = compute_stats(&snap, &filter, today());
        assert_eq!(stats.capacity.total, 1);
        assert_eq!(stats.collections.orders, 1);
        assert_eq!(stats.tasks.total, 1);
    }

    #[test]
    fn test_compute_stats_is_pure() {
        let snap = snapshot(
            vec![entity("a", Some(30), true, "M", true)],
            vec![task("sam", TaskStatus::Incomplete, 14)],
        );
        let filter = StatsFilter {
            assignee: Some("sam".into()),
            ..Default::default()
        };
        let first = compute_stats(&snap, &filter, today());
        let second = compute_stats(&snap, &filter, today());
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_snapshot_yields_zeroes() {
        let stats = compute_stats(&Snapshot::default(), &StatsFilter::default(), today());
        assert_eq!(stats, Stats::default());
    }

    #[test]
    fn test_checked_in_filter() {
        let snap = snapshot(
            vec![
                entity("a", Some(30), true, "", false),
                entity("b", Some(30), false, "", false),
            ],
            vec![],
        );
        let filter = StatsFilter {
            checked_in: Some(true),
            ..Default::default()
        };
        let stats = compute_stats(&snap, &filter, today());
        assert_eq!(stats.capacity.total, 1);
        assert_eq!(stats.capacity.checked_in, 1);
        assert_eq!(stats.capacity.pending, 0);
    }

    #[test]
    fn test_unused_maps_do_not_leak_between_runs() {
        // Two structurally equal snapshots built independently must agree.
        let build = || {
            let mut entities = BTreeMap::new();
            let id = PersonId(uuid::Uuid::nil());
            let mut e = Entity::new(id);
            e.identity.age = Some(10);
            entities.insert(id, e);
            Snapshot {
                entities,
                tasks: BTreeMap::new(),
            }
        };
        let a = compute_stats(&build(), &StatsFilter::default(), today());
        let b = compute_stats(&build(), &StatsFilter::default(), today());
        assert_eq!(a, b);
    }
}
