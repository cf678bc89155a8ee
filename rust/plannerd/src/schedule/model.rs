use chrono::{Datelike, Duration as ChronoDuration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Day = u8;
pub type SlotId = i64;
pub type ActivityId = i64;
pub type SubjectId = String;
pub type OutcomeId = String;

/// Monday..Friday.
pub const WEEKDAYS: Day = 5;
pub const MINUTES_PER_DAY: i64 = 1440;

pub fn is_weekday(day: i64) -> bool {
    (0..WEEKDAYS as i64).contains(&day)
}

/// Snap any date to the Monday of its ISO week.
pub fn normalize_week_start(date: NaiveDate) -> NaiveDate {
    let offset = date.weekday().num_days_from_monday() as i64;
    date - ChronoDuration::days(offset)
}

pub fn parse_week_start(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .map(normalize_week_start)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub id: SlotId,
    pub day: Day,
    pub subject_id: Option<SubjectId>,
    pub start_min: i64,
    pub end_min: i64,
}

impl TimeSlot {
    pub fn duration_mins(&self) -> i64 {
        self.end_min - self.start_min
    }

    /// Slots without a subject (prep, lunch duty) never take placements.
    pub fn is_blocked(&self) -> bool {
        self.subject_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: ActivityId,
    pub title: String,
    pub subject_id: Option<SubjectId>,
    pub duration_mins: Option<i64>,
    #[serde(default)]
    pub outcome_ids: Vec<OutcomeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleItem {
    pub day: Day,
    pub slot_id: SlotId,
    pub activity_id: ActivityId,
}

/// One week's placements. Items are keyed by `(day, slot_id)` so two items can
/// never share a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklySchedule {
    pub week_start: NaiveDate,
    pub revision: i64,
    cells: BTreeMap<(Day, SlotId), ActivityId>,
}

impl WeeklySchedule {
    pub fn new(week_start: NaiveDate) -> Self {
        Self {
            week_start: normalize_week_start(week_start),
            revision: 0,
            cells: BTreeMap::new(),
        }
    }

    /// Builds a schedule from stored rows. Later duplicates of a cell win, which
    /// cannot happen for rows read back from the store's primary key.
    pub fn from_items<I>(week_start: NaiveDate, revision: i64, items: I) -> Self
    where
        I: IntoIterator<Item = ScheduleItem>,
    {
        let mut schedule = Self::new(week_start);
        schedule.revision = revision;
        for item in items {
            schedule.cells.insert((item.day, item.slot_id), item.activity_id);
        }
        schedule
    }

    pub fn occupant(&self, day: Day, slot_id: SlotId) -> Option<ActivityId> {
        self.cells.get(&(day, slot_id)).copied()
    }

    pub fn is_occupied(&self, day: Day, slot_id: SlotId) -> bool {
        self.occupant(day, slot_id).is_some()
    }

    pub fn used_slot_ids(&self, day: Day) -> impl Iterator<Item = SlotId> + '_ {
        self.cells
            .range((day, SlotId::MIN)..=(day, SlotId::MAX))
            .map(|((_, slot_id), _)| *slot_id)
    }

    /// Puts `activity_id` into the cell and returns whatever was there before.
    pub(crate) fn put(&mut self, day: Day, slot_id: SlotId, activity_id: ActivityId) -> Option<ActivityId> {
        self.cells.insert((day, slot_id), activity_id)
    }

    pub(crate) fn take(&mut self, day: Day, slot_id: SlotId) -> Option<ActivityId> {
        self.cells.remove(&(day, slot_id))
    }

    pub fn items(&self) -> impl Iterator<Item = ScheduleItem> + '_ {
        self.cells.iter().map(|(&(day, slot_id), &activity_id)| ScheduleItem {
            day,
            slot_id,
            activity_id,
        })
    }

    #[cfg(test)]
    pub fn activity_ids(&self) -> impl Iterator<Item = ActivityId> + '_ {
        self.cells.values().copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let items: Vec<ScheduleItem> = self.items().collect();
        serde_json::json!({
            "weekStart": self.week_start.format("%Y-%m-%d").to_string(),
            "revision": self.revision,
            "items": items,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingStrategy {
    Strict,
    #[default]
    Relaxed,
}

impl PacingStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "relaxed" => Some(Self::Relaxed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Relaxed => "relaxed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacingOptions {
    pub preserve_buffer: bool,
    pub pacing_strategy: PacingStrategy,
}
