use crate::db;
use crate::ipc::error::{err, ok, rejected};
use crate::ipc::handlers::setup::{load_scheduler_setup, SchedulerSetup};
use crate::ipc::helpers::{
    db_conn, parse_bool, parse_opt_i64, parse_opt_i64_array, parse_string_array, required_day,
    required_i64, required_week_start, store_err,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{
    generate, placement, Activity, ActivityId, PacingStrategy, PriorityKind, TimetableModel, WeeklySchedule,
};
use rusqlite::Connection;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashSet;

/// Applies per-request `options` over the stored scheduler defaults.
fn apply_options(setup: &mut SchedulerSetup, options: &Map<String, JsonValue>) -> Result<(), String> {
    for (k, v) in options {
        match k.as_str() {
            "preserveBuffer" => {
                setup.pacing.preserve_buffer = v
                    .as_bool()
                    .ok_or_else(|| "options.preserveBuffer must be boolean".to_string())?;
            }
            "pacingStrategy" => {
                setup.pacing.pacing_strategy = v
                    .as_str()
                    .and_then(PacingStrategy::parse)
                    .ok_or_else(|| "options.pacingStrategy must be one of: strict, relaxed".to_string())?;
            }
            "priority" => {
                setup.priority = v
                    .as_str()
                    .and_then(PriorityKind::parse)
                    .ok_or_else(|| "options.priority must be one of: coverage, id".to_string())?;
            }
            _ => return Err(format!("unknown option: {}", k)),
        }
    }
    Ok(())
}

fn load_timetable(req: &Request, conn: &Connection) -> Result<TimetableModel, JsonValue> {
    db::load_timetable(conn).map_err(|e| store_err(req, "db_query_failed", e))
}

fn load_schedule(
    req: &Request,
    conn: &Connection,
    week_start: chrono::NaiveDate,
) -> Result<WeeklySchedule, JsonValue> {
    db::load_schedule(conn, week_start).map_err(|e| store_err(req, "db_query_failed", e))
}

/// Resolves `activityId` against the live catalog, so archived activities
/// cannot be dropped onto the grid.
fn load_activity(req: &Request, conn: &Connection) -> Result<Activity, JsonValue> {
    let activity_id = required_i64(req, "activityId")?;
    let catalog = db::load_catalog(conn).map_err(|e| store_err(req, "db_query_failed", e))?;
    catalog
        .activity(activity_id)
        .cloned()
        .ok_or_else(|| err(&req.id, "not_found", "activity not found or archived", None))
}

/// The revision a write is conditioned on: the caller's, or the one just read.
fn expected_revision(req: &Request, loaded: &WeeklySchedule) -> Result<i64, JsonValue> {
    match parse_opt_i64(req.params.get("expectedRevision")) {
        Ok(v) => Ok(v.unwrap_or(loaded.revision)),
        Err(m) => Err(err(&req.id, "bad_params", format!("expectedRevision {}", m), None)),
    }
}

fn handle_schedule_open(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let week_start = match required_week_start(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let schedule = match load_schedule(req, conn, week_start) {
        Ok(s) => s,
        Err(e) => return e,
    };
    ok(&req.id, json!({ "schedule": schedule.to_json() }))
}

fn handle_schedule_generate(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let week_start = match required_week_start(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut setup = match load_scheduler_setup(conn) {
        Ok(v) => v,
        Err(e) => return store_err(req, "db_query_failed", e),
    };
    match req.params.get("options") {
        None | Some(JsonValue::Null) => {}
        Some(JsonValue::Object(options)) => {
            if let Err(m) = apply_options(&mut setup, options) {
                return err(&req.id, "bad_params", m, None);
            }
        }
        Some(_) => return err(&req.id, "bad_params", "options must be an object", None),
    }
    let activity_ids = match parse_opt_i64_array(req.params.get("activityIds")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("activityIds {}", m), None),
    };
    let explicit_covered = match parse_string_array(req.params.get("coveredOutcomeIds")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("coveredOutcomeIds {}", m), None),
    };
    let include_elsewhere = match parse_bool(
        req.params.get("includeScheduledElsewhere"),
        !setup.exclude_scheduled_elsewhere,
    ) {
        Ok(v) => v,
        Err(m) => {
            return err(
                &req.id,
                "bad_params",
                format!("includeScheduledElsewhere {}", m),
                None,
            )
        }
    };
    let expected = match parse_opt_i64(req.params.get("expectedRevision")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("expectedRevision {}", m), None),
    };

    let timetable = match load_timetable(req, conn) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let mut catalog = match db::load_catalog(conn) {
        Ok(c) => c,
        Err(e) => return store_err(req, "db_query_failed", e),
    };
    if let Some(ids) = activity_ids {
        let ids: HashSet<ActivityId> = ids.into_iter().collect();
        catalog.retain_ids(&ids);
    }
    if !include_elsewhere {
        match db::scheduled_activity_ids_outside_week(conn, week_start) {
            Ok(ids) => catalog.exclude_ids(&ids),
            Err(e) => return store_err(req, "db_query_failed", e),
        }
    }
    if timetable.is_empty() || catalog.is_empty() {
        tracing::debug!(
            slots = timetable.len(),
            activities = catalog.len(),
            "nothing to schedule"
        );
    }
    let mut covered: HashSet<String> = match db::covered_outcomes_outside_week(conn, week_start) {
        Ok(v) => v,
        Err(e) => return store_err(req, "db_query_failed", e),
    };
    covered.extend(explicit_covered);

    let existing = match load_schedule(req, conn, week_start) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let order = setup.priority.build(covered);
    let mut report = generate(
        week_start,
        &timetable,
        &catalog,
        &setup.pacing,
        order.as_ref(),
        Some(&existing),
    );
    if report.schedule.is_empty() && !catalog.is_empty() {
        tracing::debug!(
            week = %week_start,
            candidates = catalog.len(),
            "auto-fill placed nothing"
        );
    }
    report.schedule.revision = match db::save_schedule(conn, &report.schedule, expected, true) {
        Ok(rev) => rev,
        Err(e) => return store_err(req, "db_update_failed", e),
    };

    tracing::info!(
        week = %week_start,
        placed = report.placed(),
        unscheduled = report.unscheduled.len(),
        dropped = report.dropped.len(),
        replaced = report.replaced_items,
        pacing = setup.pacing.pacing_strategy.as_str(),
        "schedule generated"
    );
    ok(
        &req.id,
        json!({
            "schedule": report.schedule.to_json(),
            "placed": report.placed(),
            "unscheduled": report.unscheduled,
            "dropped": report.dropped,
            "replacedItems": report.replaced_items,
        }),
    )
}

fn handle_schedule_place(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let week_start = match required_week_start(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let day = match required_day(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let activity = match load_activity(req, conn) {
        Ok(a) => a,
        Err(e) => return e,
    };
    let timetable = match load_timetable(req, conn) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let current = match load_schedule(req, conn, week_start) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let expected = match expected_revision(req, &current) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut placed = match placement::place(&current, &timetable, day, &activity) {
        Ok(p) => p,
        Err(rejection) => {
            tracing::debug!(activity_id = activity.id, day, reason = rejection.reason(), "drop rejected");
            return rejected(&req.id, rejection, day);
        }
    };
    placed.schedule.revision = match db::save_schedule(conn, &placed.schedule, Some(expected), false) {
        Ok(rev) => rev,
        Err(e) => return store_err(req, "db_update_failed", e),
    };
    if let Some(evicted) = placed.evicted {
        tracing::info!(
            week = %week_start,
            day,
            slot_id = placed.slot_id,
            activity_id = activity.id,
            evicted,
            "placement evicted an activity"
        );
    }
    ok(
        &req.id,
        json!({
            "schedule": placed.schedule.to_json(),
            "slotId": placed.slot_id,
            "evicted": placed.evicted,
        }),
    )
}

fn handle_schedule_check(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let week_start = match required_week_start(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let day = match required_day(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let slot_id = match required_i64(req, "slotId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let activity = match load_activity(req, conn) {
        Ok(a) => a,
        Err(e) => return e,
    };
    let timetable = match load_timetable(req, conn) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let Some(slot) = timetable.slot(slot_id) else {
        return err(&req.id, "not_found", "slot not found", None);
    };
    let current = match load_schedule(req, conn, week_start) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match placement::check(&current, day, slot, &activity) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(rejection) => ok(&req.id, json!({ "ok": false, "reason": rejection.reason() })),
    }
}

fn handle_schedule_remove(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let week_start = match required_week_start(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let day = match required_day(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let slot_id = match required_i64(req, "slotId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let current = match load_schedule(req, conn, week_start) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let expected = match expected_revision(req, &current) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let (mut next, removed) = placement::remove(&current, day, slot_id);
    // Empty cell: nothing to write.
    if removed.is_some() {
        next.revision = match db::save_schedule(conn, &next, Some(expected), false) {
            Ok(rev) => rev,
            Err(e) => return store_err(req, "db_update_failed", e),
        };
    }
    ok(
        &req.id,
        json!({ "schedule": next.to_json(), "removed": removed }),
    )
}

fn handle_schedule_clear(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let week_start = match required_week_start(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::clear_schedule(conn, week_start) {
        Ok(removed_items) => {
            tracing::info!(week = %week_start, removed_items, "schedule cleared");
            ok(&req.id, json!({ "ok": true, "removedItems": removed_items }))
        }
        Err(e) => store_err(req, "db_delete_failed", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<JsonValue> {
    match req.method.as_str() {
        "schedule.open" => Some(handle_schedule_open(state, req)),
        "schedule.generate" => Some(handle_schedule_generate(state, req)),
        "schedule.place" => Some(handle_schedule_place(state, req)),
        "schedule.check" => Some(handle_schedule_check(state, req)),
        "schedule.remove" => Some(handle_schedule_remove(state, req)),
        "schedule.clear" => Some(handle_schedule_clear(state, req)),
        _ => None,
    }
}
