use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::subjects::subject_exists;
use crate::ipc::helpers::{
    db_conn, parse_bool, parse_opt_i64, parse_opt_string, parse_string_array, required_i64,
};
use crate::ipc::types::{AppState, Request};
use crate::schedule::catalog::validate_activity;
use crate::schedule::Activity;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Map, Value as JsonValue};

fn activity_to_json(activity: &Activity, archived: bool) -> JsonValue {
    json!({
        "id": activity.id,
        "title": activity.title,
        "subjectId": activity.subject_id,
        "durationMins": activity.duration_mins,
        "outcomeIds": activity.outcome_ids,
        "archived": archived,
    })
}

fn ensure_outcomes_exist(conn: &Connection, outcome_ids: &[String]) -> Result<(), String> {
    for oid in outcome_ids {
        let exists = conn
            .query_row(
                "SELECT 1 FROM outcomes WHERE id = ? LIMIT 1",
                [oid],
                |_r| Ok(()),
            )
            .optional()
            .map_err(|e| e.to_string())?;
        if exists.is_none() {
            return Err(format!("outcome not found: {}", oid));
        }
    }
    Ok(())
}

fn replace_outcome_links(
    conn: &Connection,
    activity_id: i64,
    outcome_ids: &[String],
) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM activity_outcomes WHERE activity_id = ?",
        [activity_id],
    )?;
    for oid in outcome_ids {
        conn.execute(
            "INSERT INTO activity_outcomes(activity_id, outcome_id) VALUES(?, ?)",
            params![activity_id, oid],
        )?;
    }
    Ok(())
}

/// Shared checks for create and update once the fields are parsed.
fn check_activity(req: &Request, conn: &Connection, activity: &Activity) -> Result<(), JsonValue> {
    if activity.title.is_empty() {
        return Err(err(&req.id, "bad_params", "title must not be empty", None));
    }
    if let Err(e) = validate_activity(activity) {
        return Err(err(&req.id, "bad_params", e.to_string(), None));
    }
    if let Some(ref sid) = activity.subject_id {
        match subject_exists(conn, sid) {
            Ok(true) => {}
            Ok(false) => return Err(err(&req.id, "not_found", "subject not found", None)),
            Err(e) => return Err(err(&req.id, "db_query_failed", e.to_string(), None)),
        }
    }
    if let Err(m) = ensure_outcomes_exist(conn, &activity.outcome_ids) {
        return Err(err(&req.id, "not_found", m, None));
    }
    Ok(())
}

fn handle_activities_list(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match parse_opt_string(req.params.get("subjectId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("subjectId {}", m), None),
    };
    let include_archived = match parse_bool(req.params.get("includeArchived"), false) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("includeArchived {}", m), None),
    };

    let sql = if include_archived {
        "SELECT id, title, subject_id, duration_mins, archived
         FROM activities
         WHERE (? IS NULL OR subject_id = ?)
         ORDER BY id"
    } else {
        "SELECT id, title, subject_id, duration_mins, archived
         FROM activities
         WHERE (? IS NULL OR subject_id = ?) AND archived = 0
         ORDER BY id"
    };
    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = match stmt.query_map(params![subject_id, subject_id], |r| {
        Ok((db::activity_from_row(r)?, r.get::<_, i64>(4)? != 0))
    }) {
        Ok(rows) => match rows.collect::<Result<Vec<_>, _>>() {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut activities = Vec::with_capacity(rows.len());
    for (activity, archived) in rows {
        let full = match db::load_activity(conn, activity.id) {
            Ok(Some(a)) => a,
            Ok(None) => activity,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        activities.push(activity_to_json(&full, archived));
    }
    ok(&req.id, json!({ "activities": activities }))
}

fn handle_activities_create(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(input) = req.params.get("input").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing input", None);
    };
    let title = match input.get("title").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "input.title is required", None),
    };
    let subject_id = match parse_opt_string(input.get("subjectId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("input.subjectId {}", m), None),
    };
    let duration_mins = match parse_opt_i64(input.get("durationMins")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("input.durationMins {}", m), None),
    };
    let outcome_ids = match parse_string_array(input.get("outcomeIds")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("input.outcomeIds {}", m), None),
    };
    let mut activity = Activity {
        id: 0,
        title,
        subject_id,
        duration_mins,
        outcome_ids,
    };
    if let Err(e) = check_activity(req, conn, &activity) {
        return e;
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let ts = db::now_ts();
    if let Err(e) = tx.execute(
        "INSERT INTO activities(subject_id, title, duration_mins, archived, created_at, updated_at)
         VALUES(?, ?, ?, 0, ?, ?)",
        params![activity.subject_id, activity.title, activity.duration_mins, ts, ts],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    activity.id = tx.last_insert_rowid();
    if let Err(e) = replace_outcome_links(&tx, activity.id, &activity.outcome_ids) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "activityId": activity.id }))
}

fn apply_patch(activity: &mut Activity, patch: &Map<String, JsonValue>) -> Result<bool, String> {
    let mut outcomes_changed = false;
    for (k, v) in patch {
        match k.as_str() {
            "title" => {
                let s = v
                    .as_str()
                    .ok_or_else(|| "patch.title must be string".to_string())?;
                activity.title = s.trim().to_string();
            }
            "subjectId" => {
                activity.subject_id =
                    parse_opt_string(Some(v)).map_err(|m| format!("patch.subjectId {}", m))?;
            }
            "durationMins" => {
                activity.duration_mins =
                    parse_opt_i64(Some(v)).map_err(|m| format!("patch.durationMins {}", m))?;
            }
            "outcomeIds" => {
                activity.outcome_ids =
                    parse_string_array(Some(v)).map_err(|m| format!("patch.outcomeIds {}", m))?;
                outcomes_changed = true;
            }
            _ => return Err(format!("unknown patch field: {}", k)),
        }
    }
    Ok(outcomes_changed)
}

fn handle_activities_update(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let activity_id = match required_i64(req, "activityId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    let mut activity = match db::load_activity(conn, activity_id) {
        Ok(Some(a)) => a,
        Ok(None) => return err(&req.id, "not_found", "activity not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let before = (activity.subject_id.clone(), activity.duration_mins);
    let outcomes_changed = match apply_patch(&mut activity, patch) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if let Err(e) = check_activity(req, conn, &activity) {
        return e;
    }
    // Existing placements were checked against the old subject and duration.
    let placement_changed = before != (activity.subject_id.clone(), activity.duration_mins);

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute(
        "UPDATE activities SET title = ?, subject_id = ?, duration_mins = ?, updated_at = ? WHERE id = ?",
        params![
            activity.title,
            activity.subject_id,
            activity.duration_mins,
            db::now_ts(),
            activity_id
        ],
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if outcomes_changed {
        if let Err(e) = replace_outcome_links(&tx, activity_id, &activity.outcome_ids) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    let removed_items = if placement_changed {
        match db::remove_items_for(&tx, db::ItemOwner::Activity(activity_id)) {
            Ok(n) => n,
            Err(e) => return err(&req.id, "db_delete_failed", e.to_string(), None),
        }
    } else {
        0
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    if removed_items > 0 {
        tracing::info!(activity_id, removed_items, "activity edit cleared its placements");
    }
    ok(&req.id, json!({ "ok": true, "removedItems": removed_items }))
}

/// Archived activities leave the auto-fill pool and can no longer be placed by
/// hand, but stay in schedules that already hold them.
fn handle_activities_archive(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let activity_id = match required_i64(req, "activityId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let archived = match parse_bool(req.params.get("archived"), true) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("archived {}", m), None),
    };
    match conn.execute(
        "UPDATE activities SET archived = ?, updated_at = ? WHERE id = ?",
        params![if archived { 1 } else { 0 }, db::now_ts(), activity_id],
    ) {
        Ok(0) => err(&req.id, "not_found", "activity not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<JsonValue> {
    match req.method.as_str() {
        "activities.list" => Some(handle_activities_list(state, req)),
        "activities.create" => Some(handle_activities_create(state, req)),
        "activities.update" => Some(handle_activities_update(state, req)),
        "activities.archive" => Some(handle_activities_archive(state, req)),
        _ => None,
    }
}
