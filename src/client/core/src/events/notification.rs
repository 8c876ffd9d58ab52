//! Change notification shapes consumed from the record streams.
//!
//! Rows are always partial: only changed/known fields are present, and no
//! consumer may assume completeness. `before` carries the pre-image where
//! the backend provides one (deletes in particular).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::records::{PersonId, RecurrenceRule, TaskId, TaskPriority, TaskStatus};

// =============================================================================
// Source Kinds and Operations
// =============================================================================

/// Which underlying record stream produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Person,
    ShirtOrder,
    AttendanceRecord,
    Task,
}

impl SourceKind {
    /// Stable label used in logs and metrics.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::ShirtOrder => "shirt_order",
            Self::AttendanceRecord => "attendance_record",
            Self::Task => "task",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The operation a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

// =============================================================================
// Partial Rows
// =============================================================================

/// Partial person (identity) row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonRow {
    pub id: Option<PersonId>,
    pub name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub location: Option<String>,
    pub contact: Option<String>,
}

/// Partial shirt-order row. `person_id` is the foreign key to the owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShirtOrderRow {
    pub id: Option<Uuid>,
    pub person_id: Option<PersonId>,
    pub size: Option<String>,
    pub paid: Option<bool>,
    pub given: Option<bool>,
    pub print_requested: Option<bool>,
}

/// Partial attendance row. `person_id` is the foreign key to the owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceRow {
    pub id: Option<Uuid>,
    pub person_id: Option<PersonId>,
    pub registered: Option<bool>,
    pub registered_at: Option<DateTime<Utc>>,
}

/// Partial task row. `person_id` is the foreign key to the owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskRow {
    pub id: Option<TaskId>,
    pub person_id: Option<PersonId>,
    pub text: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Option<TaskPriority>,
    pub category: Option<String>,
    pub assignee: Option<String>,
    pub status: Option<TaskStatus>,
    pub recurrence: Option<RecurrenceRule>,
    pub recurrence_end: Option<NaiveDate>,
}

/// A partial row, tagged by record kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowData {
    Person(PersonRow),
    ShirtOrder(ShirtOrderRow),
    AttendanceRecord(AttendanceRow),
    Task(TaskRow),
}

impl RowData {
    /// The source kind this row belongs to.
    pub const fn source_kind(&self) -> SourceKind {
        match self {
            Self::Person(_) => SourceKind::Person,
            Self::ShirtOrder(_) => SourceKind::ShirtOrder,
            Self::AttendanceRecord(_) => SourceKind::AttendanceRecord,
            Self::Task(_) => SourceKind::Task,
        }
    }
}

// =============================================================================
// Change Notification
// =============================================================================

/// A tagged insert/update/delete event describing a partial change to one
/// underlying record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// Which record stream produced this notification
    pub source: SourceKind,

    /// The operation performed
    pub operation: Operation,

    /// Pre-image, when the backend supplies one (deletes in particular)
    pub before: Option<RowData>,

    /// Post-image; absent for deletes
    pub after: Option<RowData>,

    /// When this notification was received by the client
    pub received_at: DateTime<Utc>,
}

impl ChangeNotification {
    /// An insert notification carrying the new row.
    pub fn insert(after: RowData) -> Self {
        Self {
            source: after.source_kind(),
            operation: Operation::Insert,
            before: None,
            after: Some(after),
            received_at: Utc::now(),
        }
    }

    /// An update notification; `before` is optional.
    pub fn update(before: Option<RowData>, after: RowData) -> Self {
        Self {
            source: after.source_kind(),
            operation: Operation::Update,
            before,
            after: Some(after),
            received_at: Utc::now(),
        }
    }

    /// A delete notification carrying the last known row.
    pub fn delete(before: RowData) -> Self {
        Self {
            source: before.source_kind(),
            operation: Operation::Delete,
            before: Some(before),
            after: None,
            received_at: Utc::now(),
        }
    }

    /// The row the router should address by: the post-image when present,
    /// otherwise the pre-image.
    pub fn addressing_row(&self) -> Option<&RowData> {
        self.after.as_ref().or(self.before.as_ref())
    }
}
