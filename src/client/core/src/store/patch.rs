//! Explicit tagged patch structures.
//!
//! Every field is an explicit `Option`: `Some` means "present in this
//! patch, overwrite", `None` means "absent, leave untouched". This makes
//! merge precedence a tested property instead of an accident of object
//! spreading. A patch only ever touches its own field group.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::events::Operation;
use crate::records::{
    AttendanceFields, IdentityFields, PersonId, RecurrenceRule, ShirtFields, TaskId, TaskPriority,
    TaskRecord, TaskStatus,
};

// =============================================================================
// Group Patches
// =============================================================================

/// Patch over the identity field group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityPatch {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub location: Option<String>,
    pub contact: Option<String>,
}

impl IdentityPatch {
    /// Merge present fields onto the target group, last writer wins.
    pub fn apply_to(&self, fields: &mut IdentityFields) {
        if let Some(name) = &self.name {
            fields.name = name.clone();
        }
        if let Some(age) = self.age {
            fields.age = Some(age);
        }
        if let Some(gender) = &self.gender {
            fields.gender = gender.clone();
        }
        if let Some(location) = &self.location {
            fields.location = location.clone();
        }
        if let Some(contact) = &self.contact {
            fields.contact = contact.clone();
        }
    }
}

/// Patch over the shirt-order field group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShirtPatch {
    pub size: Option<String>,
    pub paid: Option<bool>,
    pub given: Option<bool>,
    pub print_requested: Option<bool>,
}

impl ShirtPatch {
    pub fn apply_to(&self, fields: &mut ShirtFields) {
        if let Some(size) = &self.size {
            fields.size = size.clone();
        }
        if let Some(paid) = self.paid {
            fields.paid = paid;
        }
        if let Some(given) = self.given {
            fields.given = given;
        }
        if let Some(print_requested) = self.print_requested {
            fields.print_requested = print_requested;
        }
    }
}

/// Patch over the attendance field group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttendancePatch {
    pub registered: Option<bool>,
    pub registered_at: Option<DateTime<Utc>>,
}

impl AttendancePatch {
    pub fn apply_to(&self, fields: &mut AttendanceFields) {
        if let Some(registered) = self.registered {
            fields.registered = registered;
        }
        if let Some(registered_at) = self.registered_at {
            fields.registered_at = Some(registered_at);
        }
    }
}

/// Patch over a task ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub id: TaskId,
    pub text: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<TaskPriority>,
    pub category: Option<String>,
    pub assignee: Option<String>,
    pub status: Option<TaskStatus>,
    pub recurrence: Option<RecurrenceRule>,
    pub recurrence_end: Option<NaiveDate>,
}

impl TaskPatch {
    /// Merge present fields onto an existing ledger entry.
    ///
    /// The due date is immutable once an instance exists, so `due_date`
    /// is ignored here even when present.
    pub fn apply_to(&self, task: &mut TaskRecord) {
        if let Some(text) = &self.text {
            task.text = text.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(category) = &self.category {
            task.category = category.clone();
        }
        if let Some(assignee) = &self.assignee {
            task.assignee = assignee.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(recurrence) = self.recurrence {
            task.recurrence = recurrence;
        }
        if let Some(recurrence_end) = self.recurrence_end {
            task.recurrence_end = Some(recurrence_end);
        }
    }

    /// Materialize a brand-new ledger entry from an insert patch.
    ///
    /// A task cannot exist without a due date; inserts lacking one are
    /// rejected as malformed.
    pub fn materialize(&self, person_id: PersonId) -> Result<TaskRecord> {
        let due_date = self
            .due_date
            .ok_or_else(|| CoreError::malformed_event(format!("task {} insert without due date", self.id)))?;

        Ok(TaskRecord {
            id: self.id,
            person_id,
            text: self.text.clone().unwrap_or_default(),
            due_date,
            priority: self.priority.unwrap_or_default(),
            category: self.category.clone().unwrap_or_default(),
            assignee: self.assignee.clone().unwrap_or_default(),
            status: self.status.unwrap_or(TaskStatus::Incomplete),
            recurrence: self.recurrence.unwrap_or_default(),
            recurrence_end: self.recurrence_end,
        })
    }
}

// =============================================================================
// Entity Patch
// =============================================================================

/// Which field group a patch targets, with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupPatch {
    Identity(IdentityPatch),
    Shirt(ShirtPatch),
    Attendance(AttendancePatch),
    Task(TaskPatch),
}

impl GroupPatch {
    /// Stable label used in logs and metrics.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Identity(_) => "identity",
            Self::Shirt(_) => "shirt",
            Self::Attendance(_) => "attendance",
            Self::Task(_) => "task",
        }
    }

    /// Whether this patch targets a child field group of the entity
    /// (as opposed to identity or the task ledger).
    pub const fn is_child_group(&self) -> bool {
        matches!(self, Self::Shirt(_) | Self::Attendance(_))
    }
}

/// The canonical patch shape everything downstream of the router consumes:
/// `(entityId, fieldGroup, operation, partialFields)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPatch {
    /// The owning person entity
    pub entity_id: PersonId,

    /// Insert, update, or delete
    pub operation: Operation,

    /// The targeted field group and its present fields
    pub group: GroupPatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_patch_merges_present_fields_only() {
        let mut fields = IdentityFields {
            name: "Ada".into(),
            age: Some(30),
            gender: "f".into(),
            location: "hall A".into(),
            contact: "ada@example.org".into(),
        };
        let patch = IdentityPatch {
            location: Some("hall B".into()),
            ..Default::default()
        };
        patch.apply_to(&mut fields);

        assert_eq!(fields.location, "hall B");
        assert_eq!(fields.name, "Ada");
        assert_eq!(fields.age, Some(30));
        assert_eq!(fields.contact, "ada@example.org");
    }

    #[test]
    fn test_task_patch_never_moves_due_date() {
        let due = Utc::now();
        let mut task = TaskPatch {
            id: TaskId::new(),
            text: Some("hand out badges".into()),
            due_date: Some(due),
            priority: None,
            category: None,
            assignee: None,
            status: None,
            recurrence: None,
            recurrence_end: None,
        }
        .materialize(PersonId::new())
        .unwrap();

        let moved = due + chrono::Duration::days(3);
        let patch = TaskPatch {
            id: task.id,
            text: None,
            due_date: Some(moved),
            priority: None,
            category: None,
            assignee: None,
            status: Some(TaskStatus::Complete),
            recurrence: None,
            recurrence_end: None,
        };
        patch.apply_to(&mut task);

        assert_eq!(task.due_date, due);
        assert_eq!(task.status, TaskStatus::Complete);
    }

    #[test]
    fn test_task_insert_without_due_date_is_malformed() {
        let patch = TaskPatch {
            id: TaskId::new(),
            text: Some("orphan".into()),
            due_date: None,
            priority: None,
            category: None,
            assignee: None,
            status: None,
            recurrence: None,
            recurrence_end: None,
        };
        assert!(patch.materialize(PersonId::new()).is_err());
    }
}
