use super::error::Rejection;
use super::model::{Activity, Day, TimeSlot, WeeklySchedule};

/// Decides whether `activity` may go into `slot` on `day` given the current
/// schedule. Checks run in a fixed order and the first failure wins.
pub fn can_place(
    schedule: &WeeklySchedule,
    day: Day,
    slot: &TimeSlot,
    activity: &Activity,
) -> Result<(), Rejection> {
    if slot.day != day {
        return Err(Rejection::SlotDayMismatch);
    }
    check_subject(slot, activity)?;
    if schedule.is_occupied(day, slot.id) {
        return Err(Rejection::SlotOccupied);
    }
    check_duration(slot, activity)
}

/// Blocked slots reject everything; an activity without a subject matches any
/// open slot.
pub fn check_subject(slot: &TimeSlot, activity: &Activity) -> Result<(), Rejection> {
    let Some(slot_subject) = slot.subject_id.as_deref() else {
        return Err(Rejection::SubjectMismatch);
    };
    match activity.subject_id.as_deref() {
        Some(subject) if subject != slot_subject => Err(Rejection::SubjectMismatch),
        _ => Ok(()),
    }
}

/// Inclusive: an activity exactly as long as the slot fits.
pub fn check_duration(slot: &TimeSlot, activity: &Activity) -> Result<(), Rejection> {
    match activity.duration_mins {
        Some(d) if d > slot.duration_mins() => Err(Rejection::ActivityTooLong),
        _ => Ok(()),
    }
}
