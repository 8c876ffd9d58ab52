//! Domain records and the merged entity shape.
//!
//! The materialized view holds one [`Entity`] per person: identity fields
//! plus two denormalized child field groups (shirt order, attendance) that
//! arrive from independent record streams. Task records live in their own
//! ledger and drive the task counters and the recurrence scheduler.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// Record IDs
// =============================================================================

/// Unique identifier for a person entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PersonId(pub Uuid);

impl PersonId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PersonId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PersonId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Unique identifier for a task instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// =============================================================================
// Field Groups
// =============================================================================

/// Identity field group, sourced from the person record stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityFields {
    pub name: String,
    pub age: Option<u32>,
    pub gender: String,
    pub location: String,
    pub contact: String,
}

/// Shirt-order field group, denormalized from the order record stream.
///
/// Documented default (no order on file): empty size, all flags false.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShirtFields {
    /// Shirt size; empty string means no shirt ordered.
    pub size: String,
    pub paid: bool,
    pub given: bool,
    pub print_requested: bool,
}

/// Attendance field group, denormalized from the attendance record stream.
///
/// Documented default (no record on file): not registered, which renders
/// as "attending" (pending check-in).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceFields {
    pub registered: bool,
    pub registered_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Entity
// =============================================================================

/// The merged, denormalized view of a person: identity plus the two child
/// field groups. Each group is patched independently by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: PersonId,
    pub identity: IdentityFields,
    pub shirt: ShirtFields,
    pub attendance: AttendanceFields,
}

impl Entity {
    /// Create an entity with all field groups at their documented defaults.
    pub fn new(id: PersonId) -> Self {
        Self {
            id,
            identity: IdentityFields::default(),
            shirt: ShirtFields::default(),
            attendance: AttendanceFields::default(),
        }
    }

    /// Age bracket classification of this entity.
    pub fn age_bracket(&self) -> AgeBracket {
        age_bracket(self.identity.age)
    }

    /// Whether the person has checked in.
    pub fn checked_in(&self) -> bool {
        self.attendance.registered
    }

    /// Whether the person actually carries a shirt order (placeholder and
    /// empty sizes do not count).
    pub fn has_shirt_order(&self) -> bool {
        !self.shirt.size.trim().is_empty()
    }
}

// =============================================================================
// Age Brackets
// =============================================================================

/// Age bracket used by capacity counters and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeBracket {
    Toddler,
    Kid,
    Youth,
    Adult,
}

impl AgeBracket {
    /// Toddlers do not consume venue capacity.
    pub fn consumes_capacity(&self) -> bool {
        !matches!(self, Self::Toddler)
    }
}

impl fmt::Display for AgeBracket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toddler => write!(f, "toddler"),
            Self::Kid => write!(f, "kid"),
            Self::Youth => write!(f, "youth"),
            Self::Adult => write!(f, "adult"),
        }
    }
}

/// Classify an age into a bracket. A missing age defaults to [`AgeBracket::Adult`].
pub fn age_bracket(age: Option<u32>) -> AgeBracket {
    match age {
        Some(0..=3) => AgeBracket::Toddler,
        Some(4..=12) => AgeBracket::Kid,
        Some(13..=20) => AgeBracket::Youth,
        Some(_) => AgeBracket::Adult,
        None => AgeBracket::Adult,
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// Completion status of a task instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Incomplete,
    Complete,
}

impl TaskStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete => write!(f, "incomplete"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Priority level for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Recurrence rule for a task series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceRule {
    None,
    Daily,
    Weekly,
    Monthly,
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        Self::None
    }
}

impl RecurrenceRule {
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// A single task instance.
///
/// The due date is immutable once the instance is created; recurrence
/// produces a new instance rather than mutating a completed one, so
/// completed history is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub person_id: PersonId,
    pub text: String,
    pub due_date: DateTime<Utc>,
    pub priority: TaskPriority,
    pub category: String,
    pub assignee: String,
    pub status: TaskStatus,
    pub recurrence: RecurrenceRule,
    pub recurrence_end: Option<NaiveDate>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_bracket_boundaries() {
        for age in [0, 1, 2, 3] {
            assert_eq!(age_bracket(Some(age)), AgeBracket::Toddler);
        }
        for age in 4..=12 {
            assert_eq!(age_bracket(Some(age)), AgeBracket::Kid);
        }
        for age in 13..=20 {
            assert_eq!(age_bracket(Some(age)), AgeBracket::Youth);
        }
        for age in [21, 45, 120] {
            assert_eq!(age_bracket(Some(age)), AgeBracket::Adult);
        }
    }

    #[test]
    fn test_age_bracket_missing_defaults_to_adult() {
        assert_eq!(age_bracket(None), AgeBracket::Adult);
    }

    #[test]
    fn test_toddlers_do_not_consume_capacity() {
        assert!(!AgeBracket::Toddler.consumes_capacity());
        assert!(AgeBracket::Kid.consumes_capacity());
        assert!(AgeBracket::Youth.consumes_capacity());
        assert!(AgeBracket::Adult.consumes_capacity());
    }

    #[test]
    fn test_entity_defaults() {
        let entity = Entity::new(PersonId::new());
        assert_eq!(entity.shirt.size, "");
        assert!(!entity.attendance.registered);
        assert!(!entity.checked_in());
        assert!(!entity.has_shirt_order());
        assert_eq!(entity.age_bracket(), AgeBracket::Adult);
    }

    #[test]
    fn test_placeholder_size_is_not_an_order() {
        let mut entity = Entity::new(PersonId::new());
        entity.shirt.size = "   ".to_string();
        assert!(!entity.has_shirt_order());
        entity.shirt.size = "M".to_string();
        assert!(entity.has_shirt_order());
    }
}
