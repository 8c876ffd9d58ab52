//! Recurring-task scheduling.
//!
//! Per-task state machine over `{incomplete, complete}`. The only
//! transition of interest is incomplete -> complete: when the completed
//! task carries a recurrence rule, the scheduler computes the next due
//! date, checks the series boundary, and persists a fresh instance. The
//! completed instance itself is never mutated again, so the series history
//! is preserved forever.
//!
//! The persistence write is the one genuinely asynchronous operation in
//! this core. It is dispatched fire-and-forget so it can never block the
//! event-processing loop; its outcome is surfaced through the notice
//! channel.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::records::{RecurrenceRule, TaskId, TaskRecord, TaskStatus};
use crate::store::TaskPatch;

// =============================================================================
// Persistence Interface
// =============================================================================

/// The persistence backend, as seen by this core: a black box with a
/// success/failure contract. Creating the next recurrence instance goes
/// through here; the resulting change notification flows back in through
/// the router.
#[async_trait]
pub trait TaskPersistence: Send + Sync {
    /// Persist a brand-new task instance.
    async fn create(&self, task: TaskRecord) -> Result<TaskRecord>;

    /// Apply field changes to an existing task.
    async fn update(&self, task_id: TaskId, fields: TaskPatch) -> Result<TaskRecord>;
}

// =============================================================================
// Date Arithmetic
// =============================================================================

/// Add calendar months with clamped rollover: the day-of-month is clamped
/// to the last day of the target month, never spilling into the month
/// after. January 31 plus one month is February 28 (29 in leap years).
pub fn add_months_clamped(date: NaiveDate, months: u32) -> NaiveDate {
    let zero_based = date.month0() + months;
    let year = date.year() + (zero_based / 12) as i32;
    let month = zero_based % 12 + 1;
    let day = date.day().min(last_day_of_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// The next due date for a recurring task: one interval past the
/// completed instance's own due date, preserving the time of day.
/// `None` for non-recurring tasks.
pub fn next_due_date(task: &TaskRecord) -> Option<DateTime<Utc>> {
    match task.recurrence {
        RecurrenceRule::None => None,
        RecurrenceRule::Daily => Some(task.due_date + chrono::Duration::days(1)),
        RecurrenceRule::Weekly => Some(task.due_date + chrono::Duration::days(7)),
        RecurrenceRule::Monthly => {
            let date = add_months_clamped(task.due_date.date_naive(), 1);
            Some(NaiveDateTime::new(date, task.due_date.time()).and_utc())
        }
    }
}

// =============================================================================
// Due / Overdue Classification
// =============================================================================

/// Whether a task falls due exactly on `today`. Pure calendar-date
/// comparison, time of day ignored; status does not matter here.
pub fn is_due_today(task: &TaskRecord, today: NaiveDate) -> bool {
    task.due_date.date_naive() == today
}

/// Whether a task is overdue as of `today`: strictly earlier calendar
/// date AND still incomplete. Completed tasks are never overdue.
pub fn is_overdue(task: &TaskRecord, today: NaiveDate) -> bool {
    task.status == TaskStatus::Incomplete && task.due_date.date_naive() < today
}

// =============================================================================
// Recurrence Outcome
// =============================================================================

/// Outcome of running the recurrence state machine over a completed task.
#[derive(Debug, Clone, PartialEq)]
pub enum RecurrenceOutcome {
    /// The task carries no recurrence rule.
    NotRecurring,

    /// The next due date would exceed the series end date. This is the
    /// normal terminal state of a bounded series, not an error.
    BoundaryReached,

    /// A successor instance was produced and dispatched for persistence.
    Spawned(TaskRecord),
}

/// Compute the successor instance for a completed task, without touching
/// persistence. Descriptive fields are cloned; the successor starts
/// incomplete at the next due date.
pub fn next_instance(completed: &TaskRecord) -> RecurrenceOutcome {
    let Some(next_due) = next_due_date(completed) else {
        return RecurrenceOutcome::NotRecurring;
    };

    if let Some(end) = completed.recurrence_end {
        if next_due.date_naive() > end {
            return RecurrenceOutcome::BoundaryReached;
        }
    }

    RecurrenceOutcome::Spawned(TaskRecord {
        id: TaskId::new(),
        person_id: completed.person_id,
        text: completed.text.clone(),
        due_date: next_due,
        priority: completed.priority,
        category: completed.category.clone(),
        assignee: completed.assignee.clone(),
        status: TaskStatus::Incomplete,
        recurrence: completed.recurrence,
        recurrence_end: completed.recurrence_end,
    })
}

// =============================================================================
// Scheduler
// =============================================================================

/// Non-blocking report of a scheduler action, surfaced to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerNotice {
    /// The successor instance was persisted.
    Spawned {
        completed: TaskId,
        successor: TaskId,
    },

    /// The series ended at its boundary date; no successor was created.
    BoundaryReached { completed: TaskId },

    /// Persisting the successor failed. The completed task stays
    /// complete; nothing is rolled back and nothing is retried.
    PersistFailed { completed: TaskId, error: String },
}

/// Drives recurrence off task-completion transitions.
pub struct RecurrenceScheduler {
    persistence: Arc<dyn TaskPersistence>,
    notices: mpsc::UnboundedSender<SchedulerNotice>,
}

impl RecurrenceScheduler {
    /// Create a scheduler around a persistence backend. The returned
    /// receiver carries the non-blocking outcome notices.
    pub fn new(
        persistence: Arc<dyn TaskPersistence>,
    ) -> (Self, mpsc::UnboundedReceiver<SchedulerNotice>) {
        let (notices, receiver) = mpsc::unbounded_channel();
        (
            Self {
                persistence,
                notices,
            },
            receiver,
        )
    }

    /// React to an incomplete -> complete transition.
    ///
    /// Computes the outcome synchronously; the persistence write for a
    /// spawned successor runs on a detached task so event processing is
    /// never gated on storage.
    pub fn on_task_completed(&self, completed: &TaskRecord) -> RecurrenceOutcome {
        let outcome = next_instance(completed);

        match &outcome {
            RecurrenceOutcome::NotRecurring => {}
            RecurrenceOutcome::BoundaryReached => {
                info!(task = %completed.id, "recurrence series reached its end date");
                counter!("roster_recurrence_boundary_total").increment(1);
                let _ = self.notices.send(SchedulerNotice::BoundaryReached {
                    completed: completed.id,
                });
            }
            RecurrenceOutcome::Spawned(next) => {
                counter!("roster_recurrence_spawned_total").increment(1);
                let persistence = self.persistence.clone();
                let notices = self.notices.clone();
                let completed_id = completed.id;
                let next = next.clone();

                tokio::spawn(async move {
                    let successor = next.id;
                    match persistence.create(next).await {
                        Ok(created) => {
                            debug!(
                                completed = %completed_id,
                                successor = %created.id,
                                due = %created.due_date,
                                "recurrence successor persisted"
                            );
                            let _ = notices.send(SchedulerNotice::Spawned {
                                completed: completed_id,
                                successor: created.id,
                            });
                        }
                        Err(err) => {
                            warn!(
                                completed = %completed_id,
                                successor = %successor,
                                error = %err,
                                "failed to persist recurrence successor"
                            );
                            counter!("roster_recurrence_failed_total").increment(1);
                            let _ = notices.send(SchedulerNotice::PersistFailed {
                                completed: completed_id,
                                error: err.to_string(),
                            });
                        }
                    }
                });
            }
        }

        outcome
    }
}

// =============================================================================
// Tests
// =============================================================================
