use super::model::{ActivityId, SlotId};

/// Why a placement was refused. On the wire it travels as `reason()`, the bare
/// variant name the UI switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("slot belongs to a different day")]
    SlotDayMismatch,
    #[error("slot is blocked or belongs to a different subject")]
    SubjectMismatch,
    #[error("slot is already occupied")]
    SlotOccupied,
    #[error("activity is longer than the slot")]
    ActivityTooLong,
    #[error("no timetable slot on that day for the activity's subject")]
    NoSlotsForSubject,
}

impl Rejection {
    pub fn reason(self) -> &'static str {
        match self {
            Self::SlotDayMismatch => "SlotDayMismatch",
            Self::SubjectMismatch => "SubjectMismatch",
            Self::SlotOccupied => "SlotOccupied",
            Self::ActivityTooLong => "ActivityTooLong",
            Self::NoSlotsForSubject => "NoSlotsForSubject",
        }
    }
}

/// Malformed timetable or catalog input, caught before scheduling starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("slot {slot_id}: day {day} is outside Monday..Friday")]
    SlotDayOutOfRange { slot_id: SlotId, day: i64 },
    #[error("slot {slot_id}: start {start_min} must be before end {end_min} within 0..=1440")]
    SlotBounds {
        slot_id: SlotId,
        start_min: i64,
        end_min: i64,
    },
    #[error("duplicate slot id {0}")]
    DuplicateSlot(SlotId),
    #[error("activity {activity_id}: duration {duration_mins} must be positive")]
    NonPositiveDuration {
        activity_id: ActivityId,
        duration_mins: i64,
    },
    #[error("duplicate activity id {0}")]
    DuplicateActivity(ActivityId),
}
