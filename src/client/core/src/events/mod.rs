//! Change notifications and the routing stage.
//!
//! Four independent record streams (person, shirt order, attendance, task)
//! emit insert/update/delete notifications carrying partial rows. The
//! router normalizes each notification into a canonical entity patch
//! addressed by the owning person id; everything downstream of the router
//! works in that canonical shape.

pub mod notification;
pub mod router;

pub use notification::{
    AttendanceRow, ChangeNotification, Operation, PersonRow, RowData, ShirtOrderRow, SourceKind,
    TaskRow,
};
pub use router::ChangeEventRouter;
