use super::constraints::{can_place, check_duration};
use super::error::Rejection;
use super::model::{Activity, ActivityId, Day, SlotId, TimeSlot, WeeklySchedule};
use super::timetable::TimetableModel;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub schedule: WeeklySchedule,
    pub slot_id: SlotId,
    /// Activity that held the slot before a swap. It is not re-queued.
    pub evicted: Option<ActivityId>,
}

/// Slots on `day` an activity may be dropped into, in start order.
pub fn matching_slots<'a>(
    timetable: &'a TimetableModel,
    day: Day,
    activity: &'a Activity,
) -> Vec<&'a TimeSlot> {
    match activity.subject_id.as_deref() {
        Some(subject) => timetable.slots_for_subject_and_day(subject, day).collect(),
        None => timetable.open_slots_for_day(day).collect(),
    }
}

/// Drops `activity` onto `day`. The first free matching slot wins; when the
/// day is full for that subject the first matching slot is taken over and its
/// occupant evicted. The input schedule is never modified.
pub fn place(
    schedule: &WeeklySchedule,
    timetable: &TimetableModel,
    day: Day,
    activity: &Activity,
) -> Result<Placement, Rejection> {
    let candidates = matching_slots(timetable, day, activity);
    let Some(first) = candidates.first().copied() else {
        return Err(Rejection::NoSlotsForSubject);
    };
    let used: HashSet<SlotId> = schedule.used_slot_ids(day).collect();
    let chosen = candidates
        .iter()
        .copied()
        .find(|s| !used.contains(&s.id))
        .unwrap_or(first);

    check_duration(chosen, activity)?;

    let mut next = schedule.clone();
    let evicted = next.take(day, chosen.id);
    can_place(&next, day, chosen, activity)?;
    next.put(day, chosen.id, activity.id);

    Ok(Placement {
        schedule: next,
        slot_id: chosen.id,
        evicted,
    })
}

/// Hover feedback for a specific cell: would dropping `activity` into `slot`
/// succeed without a swap?
pub fn check(
    schedule: &WeeklySchedule,
    day: Day,
    slot: &TimeSlot,
    activity: &Activity,
) -> Result<(), Rejection> {
    can_place(schedule, day, slot, activity)
}

/// Clears one cell. Returns the removed activity, or `None` (and an unchanged
/// copy) when the cell was empty.
pub fn remove(schedule: &WeeklySchedule, day: Day, slot_id: SlotId) -> (WeeklySchedule, Option<ActivityId>) {
    let mut next = schedule.clone();
    let removed = next.take(day, slot_id);
    (next, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::model::ScheduleItem;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn week() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 12).expect("date")
    }

    fn slot(id: SlotId, day: Day, subject: Option<&str>, start: i64, end: i64) -> TimeSlot {
        TimeSlot {
            id,
            day,
            subject_id: subject.map(|s| s.to_string()),
            start_min: start,
            end_min: end,
        }
    }

    fn activity(id: ActivityId, subject: Option<&str>, duration: Option<i64>) -> Activity {
        Activity {
            id,
            title: format!("Activity {}", id),
            subject_id: subject.map(|s| s.to_string()),
            duration_mins: duration,
            outcome_ids: Vec::new(),
        }
    }

    #[test]
    fn full_day_swap_evicts_current_occupant() {
        let timetable = TimetableModel::new(vec![slot(1, 0, Some("math"), 540, 580)]).expect("t");
        let before = WeeklySchedule::from_items(
            week(),
            4,
            [ScheduleItem {
                day: 0,
                slot_id: 1,
                activity_id: 100,
            }],
        );
        let b = activity(200, Some("math"), None);
        let placed = place(&before, &timetable, 0, &b).expect("placed");
        assert_eq!(placed.slot_id, 1);
        assert_eq!(placed.evicted, Some(100));
        assert_eq!(placed.schedule.occupant(0, 1), Some(200));
        assert_eq!(placed.schedule.len(), 1);
        assert_eq!(before.occupant(0, 1), Some(100));
    }

    #[test]
    fn first_free_matching_slot_is_preferred() {
        let timetable = TimetableModel::new(vec![
            slot(1, 0, Some("math"), 540, 580),
            slot(2, 0, Some("math"), 600, 640),
            slot(3, 0, Some("sci"), 480, 520),
        ])
        .expect("t");
        let before = WeeklySchedule::from_items(
            week(),
            0,
            [ScheduleItem {
                day: 0,
                slot_id: 1,
                activity_id: 100,
            }],
        );
        let placed = place(&before, &timetable, 0, &activity(7, Some("math"), None)).expect("placed");
        assert_eq!(placed.slot_id, 2);
        assert_eq!(placed.evicted, None);
        assert_eq!(placed.schedule.len(), 2);
    }

    #[test]
    fn too_long_activity_is_rejected_and_schedule_kept() {
        let timetable = TimetableModel::new(vec![slot(1, 3, Some("sci"), 600, 660)]).expect("t");
        let before = WeeklySchedule::new(week());
        let mut fair = activity(5, Some("sci"), Some(90));
        fair.title = "Science Fair Prep".into();
        assert_eq!(
            place(&before, &timetable, 3, &fair),
            Err(Rejection::ActivityTooLong)
        );
        assert!(before.is_empty());
    }

    #[test]
    fn day_without_subject_slots_is_rejected() {
        let timetable = TimetableModel::new(vec![
            slot(1, 0, Some("math"), 540, 580),
            slot(2, 1, None, 540, 580),
        ])
        .expect("t");
        let s = WeeklySchedule::new(week());
        assert_eq!(
            place(&s, &timetable, 1, &activity(1, Some("math"), None)),
            Err(Rejection::NoSlotsForSubject)
        );
        assert_eq!(
            place(&s, &timetable, 1, &activity(1, None, None)),
            Err(Rejection::NoSlotsForSubject)
        );
        assert_eq!(
            place(&s, &timetable, 0, &activity(1, Some("art"), None)),
            Err(Rejection::NoSlotsForSubject)
        );
    }

    #[test]
    fn subjectless_activity_uses_any_open_slot() {
        let timetable = TimetableModel::new(vec![
            slot(1, 2, None, 480, 520),
            slot(2, 2, Some("art"), 540, 580),
        ])
        .expect("t");
        let placed = place(&WeeklySchedule::new(week()), &timetable, 2, &activity(3, None, Some(40)))
            .expect("placed");
        assert_eq!(placed.slot_id, 2);
    }

    #[test]
    fn matching_slots_follow_subject_then_open_slots() {
        let timetable = TimetableModel::new(vec![
            slot(3, 1, Some("math"), 600, 640),
            slot(1, 1, Some("math"), 540, 580),
            slot(2, 1, None, 500, 530),
            slot(4, 1, Some("art"), 700, 740),
        ])
        .expect("t");
        let math = activity(1, Some("math"), None);
        let ids: Vec<SlotId> = matching_slots(&timetable, 1, &math).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3]);
        let any = activity(2, None, None);
        let ids: Vec<SlotId> = matching_slots(&timetable, 1, &any).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert!(matching_slots(&timetable, 0, &math).is_empty());
    }

    #[test]
    fn check_reports_occupied_without_swapping() {
        let timetable = TimetableModel::new(vec![slot(1, 0, Some("math"), 540, 580)]).expect("t");
        let s = WeeklySchedule::from_items(
            week(),
            0,
            [ScheduleItem { day: 0, slot_id: 1, activity_id: 9 }],
        );
        let target = timetable.slot(1).expect("slot");
        assert_eq!(
            check(&s, 0, target, &activity(1, Some("math"), None)),
            Err(Rejection::SlotOccupied)
        );
        assert_eq!(
            check(&s, 1, target, &activity(1, Some("math"), None)),
            Err(Rejection::SlotDayMismatch)
        );
        assert_eq!(
            check(&WeeklySchedule::new(week()), 0, target, &activity(1, None, Some(40))),
            Ok(())
        );
    }

    #[test]
    fn remove_clears_only_the_named_cell() {
        let s = WeeklySchedule::from_items(
            week(),
            0,
            [
                ScheduleItem { day: 0, slot_id: 1, activity_id: 1 },
                ScheduleItem { day: 1, slot_id: 1, activity_id: 2 },
            ],
        );
        let (next, removed) = remove(&s, 1, 1);
        assert_eq!(removed, Some(2));
        assert_eq!(next.len(), 1);
        let (same, none) = remove(&next, 4, 1);
        assert_eq!(none, None);
        assert_eq!(same, next);
    }

    proptest! {
        #[test]
        fn repeated_drops_never_double_book(
            drops in prop::collection::vec((0u8..5, 0u8..3, prop::option::of(10i64..90)), 1..40),
        ) {
            let mut slots = Vec::new();
            let mut id = 1;
            for day in 0u8..5 {
                for (i, subject) in ["s0", "s1", "s2"].iter().enumerate() {
                    let start = 480 + (i as i64) * 60;
                    slots.push(slot(id, day, Some(*subject), start, start + 45));
                    id += 1;
                }
            }
            let timetable = TimetableModel::new(slots).expect("t");
            let mut schedule = WeeklySchedule::new(week());
            for (n, (day, subject, duration)) in drops.into_iter().enumerate() {
                let subject = format!("s{}", subject);
                let a = activity(n as ActivityId + 1, Some(subject.as_str()), duration);
                match place(&schedule, &timetable, day, &a) {
                    Ok(p) => {
                        prop_assert!(p.schedule.len() <= schedule.len() + 1);
                        prop_assert_eq!(p.schedule.occupant(day, p.slot_id), Some(a.id));
                        schedule = p.schedule;
                    }
                    Err(r) => {
                        prop_assert_eq!(r, Rejection::ActivityTooLong);
                    }
                }
            }
            let cells: HashSet<(Day, SlotId)> =
                schedule.items().map(|i| (i.day, i.slot_id)).collect();
            prop_assert_eq!(cells.len(), schedule.len());
        }
    }
}
