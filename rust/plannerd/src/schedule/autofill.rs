use super::catalog::ActivityCatalog;
use super::constraints::can_place;
use super::model::{
    Activity, ActivityId, Day, PacingOptions, PacingStrategy, TimeSlot, WeeklySchedule, WEEKDAYS,
};
use super::priority::{sort_candidates, PriorityOrder};
use super::timetable::TimetableModel;
use chrono::NaiveDate;

#[derive(Debug, Clone)]
pub struct AutoFillReport {
    pub schedule: WeeklySchedule,
    /// Strict pacing: activities that found no slot, in priority order.
    pub unscheduled: Vec<ActivityId>,
    /// Relaxed pacing: activities dropped for lack of room, in priority order.
    pub dropped: Vec<ActivityId>,
    /// Items in the schedule this run replaces.
    pub replaced_items: usize,
}

impl AutoFillReport {
    pub fn placed(&self) -> usize {
        self.schedule.len()
    }
}

/// Slots auto-fill may use on `day`, in scan order. With a buffer the last
/// open slot of the day stays free.
pub fn eligible_slots<'a>(
    timetable: &'a TimetableModel,
    day: Day,
    options: &PacingOptions,
) -> Vec<&'a TimeSlot> {
    let mut slots: Vec<&TimeSlot> = timetable.open_slots_for_day(day).collect();
    if options.preserve_buffer {
        slots.pop();
    }
    slots
}

/// Builds a fresh schedule for the week. Never fails: activities that cannot be
/// placed are reported instead. The result replaces `existing` wholesale and
/// only inherits its revision.
pub fn generate(
    week_start: NaiveDate,
    timetable: &TimetableModel,
    catalog: &ActivityCatalog,
    options: &PacingOptions,
    order: &dyn PriorityOrder,
    existing: Option<&WeeklySchedule>,
) -> AutoFillReport {
    let mut schedule = WeeklySchedule::new(week_start);
    schedule.revision = existing.map(|s| s.revision).unwrap_or(0);

    let mut candidates: Vec<&Activity> = catalog
        .activities()
        .iter()
        .filter(|a| timetable.has_slots_for_subject(a.subject_id.as_deref()))
        .collect();
    sort_candidates(&mut candidates, order);

    let mut free: Vec<Vec<&TimeSlot>> = (0..WEEKDAYS)
        .map(|day| eligible_slots(timetable, day, options))
        .collect();

    let mut unscheduled = Vec::new();
    let mut dropped = Vec::new();
    for activity in candidates {
        if place_first_fit(&mut schedule, &mut free, activity) {
            continue;
        }
        match options.pacing_strategy {
            PacingStrategy::Relaxed => dropped.push(activity.id),
            PacingStrategy::Strict => unscheduled.push(activity.id),
        }
    }

    tracing::debug!(
        week = %schedule.week_start,
        placed = schedule.len(),
        unscheduled = unscheduled.len(),
        dropped = dropped.len(),
        priority = order.name(),
        "auto-fill finished"
    );

    AutoFillReport {
        schedule,
        unscheduled,
        dropped,
        replaced_items: existing.map(|s| s.len()).unwrap_or(0),
    }
}

fn place_first_fit(
    schedule: &mut WeeklySchedule,
    free: &mut [Vec<&TimeSlot>],
    activity: &Activity,
) -> bool {
    for (day, slots) in free.iter_mut().enumerate() {
        let day = day as Day;
        let hit = slots
            .iter()
            .position(|slot| can_place(schedule, day, slot, activity).is_ok());
        if let Some(idx) = hit {
            let slot = slots.remove(idx);
            schedule.put(day, slot.id, activity.id);
            return true;
        }
    }
    false
}
