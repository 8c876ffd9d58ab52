//! # Roster Core
//!
//! Client-side state reconciliation and recurrence core for the Roster
//! event manager.
//!
//! ## Architecture
//!
//! - **ChangeEventRouter**: Normalizes heterogeneous change notifications
//!   into canonical entity patches
//! - **MaterializedViewStore**: Field-group-scoped reconciliation of the
//!   denormalized per-entity view, with orphan buffering for out-of-order
//!   child events
//! - **DerivedStatsEngine**: Pure recomputation of capacity, collection,
//!   and task counters from immutable snapshots
//! - **RecurrenceScheduler**: Spawns successor task instances on
//!   completion, bounded by the series end date
//! - **ReconcilerSession**: Explicit init/teardown lifecycle owning the
//!   source channels and the single consumer loop
//! - **Telemetry**: Structured logging and event-level counters
//!
//! The delivery mechanism for change notifications, authorization, and the
//! persistence backend itself are external collaborators; this crate only
//! consumes their contracts.

pub mod config;
pub mod error;
pub mod events;
pub mod records;
pub mod recurrence;
pub mod session;
pub mod stats;
pub mod store;
pub mod telemetry;

pub use error::{CoreError, ErrorCode, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{CoreConfig, OrphanPolicy, ReconcilerConfig};
    pub use crate::error::{CoreError, ErrorCode, ErrorSeverity, Result};
    pub use crate::events::{
        ChangeEventRouter, ChangeNotification, Operation, RowData, SourceKind,
    };
    pub use crate::records::{
        age_bracket, AgeBracket, Entity, PersonId, RecurrenceRule, TaskId, TaskPriority,
        TaskRecord, TaskStatus,
    };
    pub use crate::recurrence::{
        add_months_clamped, next_due_date, next_instance, RecurrenceOutcome,
        RecurrenceScheduler, SchedulerNotice, TaskPersistence,
    };
    pub use crate::session::{ReconcilerSession, SessionId, SourceHandle};
    pub use crate::stats::{compute_stats, Stats, StatsFilter};
    pub use crate::store::{
        ApplyReport, AttendancePatch, EntityPatch, GroupPatch, IdentityPatch,
        MaterializedViewStore, ShirtPatch, Snapshot, TaskPatch,
    };
}
