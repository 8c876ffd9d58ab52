//! The routing stage: heterogeneous notifications to canonical patches.
//!
//! This stage only does addressing. It derives the canonical entity id
//! (the record's own key for persons, the foreign key to the owning person
//! for child kinds) and repackages the partial row into a tagged group
//! patch. No field values are transformed here.

use metrics::counter;
use tracing::instrument;

use crate::error::{CoreError, Result};
use crate::records::PersonId;
use crate::store::{
    AttendancePatch, EntityPatch, GroupPatch, IdentityPatch, ShirtPatch, TaskPatch,
};

use super::notification::{ChangeNotification, RowData, SourceKind};

/// Normalizes change notifications into [`EntityPatch`]es.
///
/// Events whose entity id cannot be derived are rejected with
/// [`crate::error::ErrorCode::MalformedEvent`] and never reach the store.
#[derive(Debug, Default)]
pub struct ChangeEventRouter;

impl ChangeEventRouter {
    pub fn new() -> Self {
        Self
    }

    /// Route one notification to its canonical patch.
    #[instrument(skip(self, notification), fields(source = %notification.source, operation = %notification.operation))]
    pub fn route(&self, notification: &ChangeNotification) -> Result<EntityPatch> {
        let row = notification.addressing_row().ok_or_else(|| {
            self.dropped(notification.source);
            CoreError::malformed_event(format!("{} event carries no row", notification.source))
        })?;

        if row.source_kind() != notification.source {
            self.dropped(notification.source);
            return Err(CoreError::malformed_event(format!(
                "{} event carries a {} row",
                notification.source,
                row.source_kind()
            )));
        }

        let (entity_id, group) = match row {
            RowData::Person(person) => {
                let id = person.id.ok_or_else(|| self.missing_id(notification.source))?;
                (
                    id,
                    GroupPatch::Identity(IdentityPatch {
                        name: person.name.clone(),
                        age: person.age,
                        gender: person.gender.clone(),
                        location: person.location.clone(),
                        contact: person.contact.clone(),
                    }),
                )
            }
            RowData::ShirtOrder(shirt) => {
                let id = self.owner_id(shirt.person_id, notification.source)?;
                (
                    id,
                    GroupPatch::Shirt(ShirtPatch {
                        size: shirt.size.clone(),
                        paid: shirt.paid,
                        given: shirt.given,
                        print_requested: shirt.print_requested,
                    }),
                )
            }
            RowData::AttendanceRecord(attendance) => {
                let id = self.owner_id(attendance.person_id, notification.source)?;
                (
                    id,
                    GroupPatch::Attendance(AttendancePatch {
                        registered: attendance.registered,
                        registered_at: attendance.registered_at,
                    }),
                )
            }
            RowData::Task(task) => {
                let id = self.owner_id(task.person_id, notification.source)?;
                let task_id = task.id.ok_or_else(|| {
                    self.dropped(notification.source);
                    CoreError::malformed_event("task event without task id")
                })?;
                (
                    id,
                    GroupPatch::Task(TaskPatch {
                        id: task_id,
                        text: task.text.clone(),
                        due_date: task.due_date,
                        priority: task.priority,
                        category: task.category.clone(),
                        assignee: task.assignee.clone(),
                        status: task.status,
                        recurrence: task.recurrence,
                        recurrence_end: task.recurrence_end,
                    }),
                )
            }
        };

        Ok(EntityPatch {
            entity_id,
            operation: notification.operation,
            group,
        })
    }

    fn owner_id(&self, person_id: Option<PersonId>, source: SourceKind) -> Result<PersonId> {
        person_id.ok_or_else(|| {
            self.dropped(source);
            CoreError::malformed_event(format!("{} event without owner foreign key", source))
        })
    }

    fn missing_id(&self, source: SourceKind) -> CoreError {
        self.dropped(source);
        CoreError::malformed_event(format!("{} event without record key", source))
    }

    fn dropped(&self, source: SourceKind) {
        counter!(
            "roster_events_dropped_total",
            "source" => source.label(),
            "reason" => "malformed",
        )
        .increment(1);
    }
}
