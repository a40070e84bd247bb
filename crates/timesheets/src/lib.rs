//! Timesheets: time logged by users against projects, approved, then billed.

pub mod entry;

pub use entry::{
    ApproveTimeEntry, LogTime, MarkTimeBilled, RejectTimeEntry, TimeApproved, TimeBilled,
    TimeEntry, TimeEntryCommand, TimeEntryEvent, TimeEntryId, TimeEntryStatus,
    TimeEntryUpdated, TimeLogged, TimeRejected, UpdateTimeEntry, MAX_MINUTES_PER_ENTRY,
};
