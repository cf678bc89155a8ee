use crate::schedule::{
    Activity, ActivityCatalog, ActivityId, ScheduleItem, TimeSlot, TimetableModel, WeeklySchedule,
};
use anyhow::Context;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const DB_FILE: &str = "planner.sqlite3";

/// Conditional schedule write lost against a newer revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("schedule revision is {actual}, expected {expected}")]
pub struct RevisionConflict {
    pub expected: i64,
    pub actual: i64,
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS outcomes(
            id TEXT PRIMARY KEY,
            subject_id TEXT,
            code TEXT NOT NULL,
            description TEXT NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_outcomes_subject ON outcomes(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetable_slots(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            day INTEGER NOT NULL,
            subject_id TEXT,
            start_min INTEGER NOT NULL,
            end_min INTEGER NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timetable_slots_day ON timetable_slots(day, start_min)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activities(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id TEXT,
            title TEXT NOT NULL,
            duration_mins INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activities_subject ON activities(subject_id)",
        [],
    )?;
    // Workspaces created before archiving existed lack the column.
    ensure_activities_archived(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activity_outcomes(
            activity_id INTEGER NOT NULL,
            outcome_id TEXT NOT NULL,
            PRIMARY KEY(activity_id, outcome_id),
            FOREIGN KEY(activity_id) REFERENCES activities(id) ON DELETE CASCADE,
            FOREIGN KEY(outcome_id) REFERENCES outcomes(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS weekly_schedules(
            id TEXT PRIMARY KEY,
            week_start TEXT NOT NULL UNIQUE,
            revision INTEGER NOT NULL DEFAULT 0,
            generated_at TEXT,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule_items(
            schedule_id TEXT NOT NULL,
            day INTEGER NOT NULL,
            slot_id INTEGER NOT NULL,
            activity_id INTEGER NOT NULL,
            PRIMARY KEY(schedule_id, day, slot_id),
            FOREIGN KEY(schedule_id) REFERENCES weekly_schedules(id) ON DELETE CASCADE,
            FOREIGN KEY(slot_id) REFERENCES timetable_slots(id) ON DELETE CASCADE,
            FOREIGN KEY(activity_id) REFERENCES activities(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_items_activity ON schedule_items(activity_id)",
        [],
    )?;

    tracing::debug!(path = %db_path.to_string_lossy(), "workspace database ready");
    Ok(conn)
}

fn ensure_activities_archived(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "activities", "archived")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE activities ADD COLUMN archived INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn now_ts() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        params![key, serde_json::to_string(value)?],
    )?;
    Ok(())
}

// Out-of-range days map to a value the timetable validation rejects.
fn day_from_row(raw: i64) -> u8 {
    u8::try_from(raw).unwrap_or(u8::MAX)
}

fn week_key(week_start: NaiveDate) -> String {
    week_start.format("%Y-%m-%d").to_string()
}

/// Row shape: `id, day, subject_id, start_min, end_min`.
pub fn slot_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<TimeSlot> {
    Ok(TimeSlot {
        id: r.get(0)?,
        day: day_from_row(r.get(1)?),
        subject_id: r.get(2)?,
        start_min: r.get(3)?,
        end_min: r.get(4)?,
    })
}

pub fn load_timetable(conn: &Connection) -> anyhow::Result<TimetableModel> {
    let mut stmt = conn.prepare(
        "SELECT id, day, subject_id, start_min, end_min FROM timetable_slots ORDER BY id",
    )?;
    let slots = stmt
        .query_map([], slot_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TimetableModel::new(slots)?)
}

/// Row shape: `id, title, subject_id, duration_mins`. Outcomes are attached
/// separately.
pub fn activity_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: r.get(0)?,
        title: r.get(1)?,
        subject_id: r.get(2)?,
        duration_mins: r.get(3)?,
        outcome_ids: Vec::new(),
    })
}

fn outcome_links(conn: &Connection) -> anyhow::Result<HashMap<ActivityId, Vec<String>>> {
    let mut stmt = conn.prepare(
        "SELECT activity_id, outcome_id FROM activity_outcomes ORDER BY activity_id, outcome_id",
    )?;
    let mut rows = stmt.query([])?;
    let mut out: HashMap<ActivityId, Vec<String>> = HashMap::new();
    while let Some(row) = rows.next()? {
        out.entry(row.get(0)?).or_default().push(row.get(1)?);
    }
    Ok(out)
}

/// Non-archived activities, each with its subject resolved and outcomes attached.
pub fn load_catalog(conn: &Connection) -> anyhow::Result<ActivityCatalog> {
    let mut links = outcome_links(conn)?;
    let mut stmt = conn.prepare(
        "SELECT id, title, subject_id, duration_mins FROM activities WHERE archived = 0 ORDER BY id",
    )?;
    let activities = stmt
        .query_map([], activity_from_row)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|mut a| {
            a.outcome_ids = links.remove(&a.id).unwrap_or_default();
            a
        });
    Ok(ActivityCatalog::new(activities)?)
}

pub fn load_activity(conn: &Connection, activity_id: ActivityId) -> anyhow::Result<Option<Activity>> {
    let row = conn
        .query_row(
            "SELECT id, title, subject_id, duration_mins FROM activities WHERE id = ?",
            [activity_id],
            activity_from_row,
        )
        .optional()?;
    let Some(mut activity) = row else {
        return Ok(None);
    };
    let mut stmt = conn.prepare(
        "SELECT outcome_id FROM activity_outcomes WHERE activity_id = ? ORDER BY outcome_id",
    )?;
    activity.outcome_ids = stmt
        .query_map([activity_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(activity))
}

/// The stored schedule for the week, or an empty revision-0 one.
pub fn load_schedule(conn: &Connection, week_start: NaiveDate) -> anyhow::Result<WeeklySchedule> {
    let header: Option<(String, i64)> = conn
        .query_row(
            "SELECT id, revision FROM weekly_schedules WHERE week_start = ?",
            [week_key(week_start)],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((schedule_id, revision)) = header else {
        return Ok(WeeklySchedule::new(week_start));
    };
    let mut stmt = conn.prepare(
        "SELECT day, slot_id, activity_id FROM schedule_items WHERE schedule_id = ? ORDER BY day, slot_id",
    )?;
    let items = stmt
        .query_map([&schedule_id], |r| {
            Ok(ScheduleItem {
                day: day_from_row(r.get(0)?),
                slot_id: r.get(1)?,
                activity_id: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(WeeklySchedule::from_items(week_start, revision, items))
}

/// Replaces the stored week with `schedule` and returns the new revision.
/// With `expected_revision`, the write only goes through if the stored
/// revision still matches; otherwise a `RevisionConflict` is returned.
pub fn save_schedule(
    conn: &Connection,
    schedule: &WeeklySchedule,
    expected_revision: Option<i64>,
    generated: bool,
) -> anyhow::Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let key = week_key(schedule.week_start);
    let current: Option<(String, i64)> = tx
        .query_row(
            "SELECT id, revision FROM weekly_schedules WHERE week_start = ?",
            [&key],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let actual = current.as_ref().map(|(_, rev)| *rev).unwrap_or(0);
    if let Some(expected) = expected_revision {
        if expected != actual {
            return Err(RevisionConflict { expected, actual }.into());
        }
    }

    let ts = now_ts();
    let next_revision = actual + 1;
    let schedule_id = match current {
        Some((id, _)) => {
            tx.execute(
                "UPDATE weekly_schedules
                 SET revision = ?, updated_at = ?, generated_at = CASE WHEN ? THEN ? ELSE generated_at END
                 WHERE id = ?",
                params![next_revision, ts, generated, ts, id],
            )?;
            tx.execute("DELETE FROM schedule_items WHERE schedule_id = ?", [&id])?;
            id
        }
        None => {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO weekly_schedules(id, week_start, revision, generated_at, updated_at)
                 VALUES(?, ?, ?, ?, ?)",
                params![id, key, next_revision, generated.then(|| ts.clone()), ts],
            )?;
            id
        }
    };

    {
        let mut insert = tx.prepare(
            "INSERT INTO schedule_items(schedule_id, day, slot_id, activity_id) VALUES(?, ?, ?, ?)",
        )?;
        for item in schedule.items() {
            insert.execute(params![schedule_id, item.day as i64, item.slot_id, item.activity_id])?;
        }
    }
    tx.commit()?;
    tracing::debug!(
        week = %key,
        revision = next_revision,
        items = schedule.len(),
        "schedule saved"
    );
    Ok(next_revision)
}

/// Deletes the stored week. Returns how many items it held.
pub fn clear_schedule(conn: &Connection, week_start: NaiveDate) -> anyhow::Result<usize> {
    let key = week_key(week_start);
    let tx = conn.unchecked_transaction()?;
    let removed: i64 = tx.query_row(
        "SELECT COUNT(*) FROM schedule_items si
         JOIN weekly_schedules ws ON ws.id = si.schedule_id
         WHERE ws.week_start = ?",
        [&key],
        |r| r.get(0),
    )?;
    tx.execute(
        "DELETE FROM schedule_items WHERE schedule_id IN (SELECT id FROM weekly_schedules WHERE week_start = ?)",
        [&key],
    )?;
    tx.execute("DELETE FROM weekly_schedules WHERE week_start = ?", [&key])?;
    tx.commit()?;
    Ok(removed.max(0) as usize)
}

/// What a cascading item removal is keyed on.
#[derive(Debug, Clone, Copy)]
pub enum ItemOwner {
    Slot(i64),
    Activity(ActivityId),
}

/// Removes every schedule item held by `owner`, in all weeks, and bumps the
/// revision of each week that lost an item. Run it inside the caller's
/// transaction so the edit and the cleanup commit together.
pub fn remove_items_for(conn: &Connection, owner: ItemOwner) -> anyhow::Result<usize> {
    let (column, id) = match owner {
        ItemOwner::Slot(id) => ("slot_id", id),
        ItemOwner::Activity(id) => ("activity_id", id),
    };
    let bumped = conn.execute(
        &format!(
            "UPDATE weekly_schedules
             SET revision = revision + 1, updated_at = ?
             WHERE id IN (SELECT DISTINCT schedule_id FROM schedule_items WHERE {} = ?)",
            column
        ),
        params![now_ts(), id],
    )?;
    let removed = conn.execute(
        &format!("DELETE FROM schedule_items WHERE {} = ?", column),
        [id],
    )?;
    if removed > 0 {
        tracing::debug!(?owner, removed, weeks = bumped, "placements cleared");
    }
    Ok(removed)
}

/// Activities placed in any week other than `week_start`.
pub fn scheduled_activity_ids_outside_week(
    conn: &Connection,
    week_start: NaiveDate,
) -> anyhow::Result<HashSet<ActivityId>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT si.activity_id
         FROM schedule_items si
         JOIN weekly_schedules ws ON ws.id = si.schedule_id
         WHERE ws.week_start <> ?",
    )?;
    let ids = stmt
        .query_map([week_key(week_start)], |r| r.get::<_, i64>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(ids)
}

/// Outcomes already taught by an activity scheduled in another week.
pub fn covered_outcomes_outside_week(
    conn: &Connection,
    week_start: NaiveDate,
) -> anyhow::Result<HashSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT ao.outcome_id
         FROM activity_outcomes ao
         JOIN schedule_items si ON si.activity_id = ao.activity_id
         JOIN weekly_schedules ws ON ws.id = si.schedule_id
         WHERE ws.week_start <> ?",
    )?;
    let ids = stmt
        .query_map([week_key(week_start)], |r| r.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(ids)
}
