//! Weekly scheduling core: timetable and catalog views, placement constraints,
//! bulk auto-fill and single drag-and-drop placement. Everything here is pure;
//! loading and persisting schedules is the store's job.

pub mod autofill;
pub mod catalog;
pub mod constraints;
pub mod error;
pub mod model;
pub mod placement;
pub mod priority;
pub mod timetable;

pub use autofill::generate;
pub use catalog::ActivityCatalog;
pub use error::{ModelError, Rejection};
pub use model::{
    Activity, ActivityId, Day, PacingOptions, PacingStrategy, ScheduleItem, TimeSlot,
    WeeklySchedule,
};
pub use priority::PriorityKind;
pub use timetable::TimetableModel;
