//! The materialized view store (reconciler).
//!
//! Owns the authoritative in-memory mapping `entityId -> mergedRecord` and
//! the task ledger. Patches are applied field-group-scoped with
//! last-writer-wins semantics inside each group, so an identity update and
//! a shirt update can never clobber each other's fields. Readers consume
//! immutable snapshots; a reader never observes a partially applied patch.
//!
//! Cross-source ordering: the sources give no causal guarantee, so a child
//! event can precede its parent's identity event. The configured
//! [`OrphanPolicy`] decides between dropping such events and parking them
//! in a bounded per-entity buffer for replay once the identity arrives.

pub mod patch;

pub use patch::{
    AttendancePatch, EntityPatch, GroupPatch, IdentityPatch, ShirtPatch, TaskPatch,
};

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::config::{OrphanPolicy, ReconcilerConfig};
use crate::error::{CoreError, Result};
use crate::events::Operation;
use crate::records::{AttendanceFields, Entity, PersonId, ShirtFields, TaskId, TaskRecord};

// =============================================================================
// Snapshot
// =============================================================================

/// An immutable, internally consistent copy of the full entity set and
/// task ledger, for consumption by the stats engine and the presentation
/// layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub entities: BTreeMap<PersonId, Entity>,
    pub tasks: BTreeMap<TaskId, TaskRecord>,
}

impl Snapshot {
    pub fn entity(&self, id: &PersonId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn task(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.tasks.get(id)
    }
}

// =============================================================================
// Apply Report
// =============================================================================

/// What happened when a patch was applied.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// The patch was parked in the orphan buffer instead of applied.
    pub parked: bool,

    /// Number of parked child patches replayed after an identity arrival.
    pub replayed_orphans: usize,

    /// Set when this patch transitioned a task from incomplete to
    /// complete: the post-merge ledger entry, for the recurrence
    /// scheduler.
    pub completed_task: Option<TaskRecord>,
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, Default)]
struct StoreInner {
    entities: BTreeMap<PersonId, Entity>,
    tasks: BTreeMap<TaskId, TaskRecord>,
    parked: BTreeMap<PersonId, VecDeque<EntityPatch>>,
}

/// The reconciler. All mutation goes through [`MaterializedViewStore::apply`];
/// all reads go through snapshots or per-call filtered views.
pub struct MaterializedViewStore {
    config: ReconcilerConfig,
    inner: RwLock<StoreInner>,
}

impl MaterializedViewStore {
    /// Create an empty store with the given reconciler configuration.
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(StoreInner::default()),
        }
    }

    /// Apply one canonical patch.
    ///
    /// Effectively atomic with respect to [`Self::snapshot`]: the write
    /// lock is held for the whole merge, including orphan replay.
    #[instrument(skip(self, patch), fields(entity = %patch.entity_id, group = patch.group.label(), operation = %patch.operation))]
    pub fn apply(&self, patch: EntityPatch) -> Result<ApplyReport> {
        let mut inner = self.inner.write();
        let label = patch.group.label();

        let result = if matches!(patch.group, GroupPatch::Identity(_)) {
            Self::apply_identity(&mut inner, patch)
        } else if patch.group.is_child_group() {
            self.apply_child(&mut inner, patch)
        } else {
            Self::apply_task(&mut inner, patch)
        };

        if result.is_ok() {
            counter!("roster_events_applied_total", "group" => label).increment(1);
        }
        result
    }

    /// Take an immutable snapshot of the current state.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let inner = self.inner.read();
        Arc::new(Snapshot {
            entities: inner.entities.clone(),
            tasks: inner.tasks.clone(),
        })
    }

    /// A finite, restartable view of the entities matching `predicate`,
    /// ordered by name then id. Recomputed per call; not a live cursor.
    pub fn filtered_view<F>(&self, predicate: F) -> Vec<Entity>
    where
        F: Fn(&Entity) -> bool,
    {
        let inner = self.inner.read();
        let mut out: Vec<Entity> = inner
            .entities
            .values()
            .filter(|entity| predicate(entity))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.identity
                .name
                .cmp(&b.identity.name)
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    /// Number of entities currently materialized.
    pub fn len(&self) -> usize {
        self.inner.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Per-group application
    // ─────────────────────────────────────────────────────────────────────────

    fn apply_identity(inner: &mut StoreInner, patch: EntityPatch) -> Result<ApplyReport> {
        match patch.operation {
            Operation::Delete => {
                // Hard delete: the entity goes away entirely, merged child
                // fields and parked orphans included. No tombstone.
                let removed = inner.entities.remove(&patch.entity_id).is_some();
                let discarded = inner
                    .parked
                    .remove(&patch.entity_id)
                    .map(|queue| queue.len())
                    .unwrap_or(0);
                debug!(entity = %patch.entity_id, removed, discarded, "entity deleted");
                Ok(ApplyReport::default())
            }
            Operation::Insert | Operation::Update => {
                let queue = inner.parked.remove(&patch.entity_id);
                let entity = inner
                    .entities
                    .entry(patch.entity_id)
                    .or_insert_with(|| Entity::new(patch.entity_id));
                if let GroupPatch::Identity(identity) = &patch.group {
                    identity.apply_to(&mut entity.identity);
                }

                let mut replayed = 0;
                if let Some(queue) = queue {
                    for parked in queue {
                        Self::merge_child_group(entity, &parked);
                        replayed += 1;
                    }
                    if replayed > 0 {
                        debug!(entity = %patch.entity_id, replayed, "replayed parked child patches");
                    }
                }

                Ok(ApplyReport {
                    replayed_orphans: replayed,
                    ..Default::default()
                })
            }
        }
    }

    fn apply_child(&self, inner: &mut StoreInner, patch: EntityPatch) -> Result<ApplyReport> {
        let label = patch.group.label();

        if let Some(entity) = inner.entities.get_mut(&patch.entity_id) {
            Self::merge_child_group(entity, &patch);
            return Ok(ApplyReport::default());
        }

        match self.config.orphan_policy {
            OrphanPolicy::Drop => {
                counter!(
                    "roster_events_dropped_total",
                    "source" => label,
                    "reason" => "orphan",
                )
                .increment(1);
                Err(CoreError::unknown_entity(patch.entity_id, label))
            }
            OrphanPolicy::Buffer => {
                let queue = inner.parked.entry(patch.entity_id).or_default();
                if queue.len() >= self.config.orphan_buffer_capacity {
                    counter!(
                        "roster_events_dropped_total",
                        "source" => label,
                        "reason" => "orphan_buffer_full",
                    )
                    .increment(1);
                    return Err(CoreError::orphan_buffer_overflow(
                        patch.entity_id,
                        self.config.orphan_buffer_capacity,
                    ));
                }
                queue.push_back(patch);
                counter!("roster_events_parked_total", "source" => label).increment(1);
                Ok(ApplyReport {
                    parked: true,
                    ..Default::default()
                })
            }
        }
    }

    /// Merge a child-group patch onto an existing entity. A delete resets
    /// the group to its documented default rather than touching the parent.
    fn merge_child_group(entity: &mut Entity, patch: &EntityPatch) {
        match (&patch.group, patch.operation) {
            (GroupPatch::Shirt(_), Operation::Delete) => {
                entity.shirt = ShirtFields::default();
            }
            (GroupPatch::Shirt(shirt), _) => {
                shirt.apply_to(&mut entity.shirt);
            }
            (GroupPatch::Attendance(_), Operation::Delete) => {
                entity.attendance = AttendanceFields::default();
            }
            (GroupPatch::Attendance(attendance), _) => {
                attendance.apply_to(&mut entity.attendance);
            }
            // Identity and task patches never reach this merge.
            _ => {}
        }
    }

    fn apply_task(inner: &mut StoreInner, patch: EntityPatch) -> Result<ApplyReport> {
        let GroupPatch::Task(task_patch) = patch.group else {
            return Err(CoreError::internal("non-task patch routed to task ledger"));
        };

        match patch.operation {
            Operation::Delete => {
                // The core never deletes tasks itself; a backend delete
                // still removes the ledger entry so the two cannot diverge.
                inner.tasks.remove(&task_patch.id);
                Ok(ApplyReport::default())
            }
            Operation::Insert => {
                let record = task_patch.materialize(patch.entity_id)?;
                inner.tasks.insert(record.id, record);
                Ok(ApplyReport::default())
            }
            Operation::Update => match inner.tasks.get_mut(&task_patch.id) {
                Some(task) => {
                    let was_complete = task.status.is_complete();
                    task_patch.apply_to(task);
                    let completed = !was_complete && task.status.is_complete();
                    Ok(ApplyReport {
                        completed_task: completed.then(|| task.clone()),
                        ..Default::default()
                    })
                }
                None => {
                    // An update can race ahead of its insert. Materialize
                    // when the row is self-sufficient, otherwise drop. A
                    // record materialized this way has no observable
                    // incomplete -> complete transition, so it never
                    // triggers recurrence.
                    if task_patch.due_date.is_some() {
                        let record = task_patch.materialize(patch.entity_id)?;
                        inner.tasks.insert(record.id, record);
                        Ok(ApplyReport::default())
                    } else {
                        Err(CoreError::unknown_entity(task_patch.id, "task"))
                    }
                }
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
