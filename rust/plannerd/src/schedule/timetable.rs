use super::error::ModelError;
use super::model::{is_weekday, Day, SlotId, TimeSlot, MINUTES_PER_DAY, WEEKDAYS};
use std::collections::HashSet;

/// The fixed weekly grid. Slots are kept per day in ascending start order (ties
/// by id) so every scan over a day is deterministic.
#[derive(Debug, Clone, Default)]
pub struct TimetableModel {
    days: [Vec<TimeSlot>; WEEKDAYS as usize],
}

pub fn validate_slot(slot: &TimeSlot) -> Result<(), ModelError> {
    if !is_weekday(slot.day as i64) {
        return Err(ModelError::SlotDayOutOfRange {
            slot_id: slot.id,
            day: slot.day as i64,
        });
    }
    if slot.start_min < 0 || slot.start_min >= slot.end_min || slot.end_min > MINUTES_PER_DAY {
        return Err(ModelError::SlotBounds {
            slot_id: slot.id,
            start_min: slot.start_min,
            end_min: slot.end_min,
        });
    }
    Ok(())
}

impl TimetableModel {
    pub fn new<I>(slots: I) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = TimeSlot>,
    {
        let mut seen: HashSet<SlotId> = HashSet::new();
        let mut model = Self::default();
        for slot in slots {
            validate_slot(&slot)?;
            if !seen.insert(slot.id) {
                return Err(ModelError::DuplicateSlot(slot.id));
            }
            model.days[slot.day as usize].push(slot);
        }
        for day in model.days.iter_mut() {
            day.sort_by_key(|s| (s.start_min, s.id));
        }
        Ok(model)
    }

    /// All slots of `day`, blocked ones included.
    pub fn slots_for_day(&self, day: Day) -> &[TimeSlot] {
        self.days
            .get(day as usize)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn open_slots_for_day(&self, day: Day) -> impl Iterator<Item = &TimeSlot> {
        self.slots_for_day(day).iter().filter(|s| !s.is_blocked())
    }

    pub fn slots_for_subject_and_day<'a>(
        &'a self,
        subject_id: &'a str,
        day: Day,
    ) -> impl Iterator<Item = &'a TimeSlot> + 'a {
        self.slots_for_day(day)
            .iter()
            .filter(move |s| s.subject_id.as_deref() == Some(subject_id))
    }

    pub fn slot(&self, slot_id: SlotId) -> Option<&TimeSlot> {
        self.days.iter().flatten().find(|s| s.id == slot_id)
    }

    pub fn slots(&self) -> impl Iterator<Item = &TimeSlot> {
        self.days.iter().flatten()
    }

    /// `None` means "any subject": true if the week has a single open slot.
    pub fn has_slots_for_subject(&self, subject_id: Option<&str>) -> bool {
        match subject_id {
            Some(sid) => self.slots().any(|s| s.subject_id.as_deref() == Some(sid)),
            None => self.slots().any(|s| !s.is_blocked()),
        }
    }

    pub fn len(&self) -> usize {
        self.days.iter().map(|d| d.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
