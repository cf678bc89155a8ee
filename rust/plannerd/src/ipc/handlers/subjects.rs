use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, parse_opt_string, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub fn subject_exists(conn: &Connection, subject_id: &str) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT 1 FROM subjects WHERE id = ? LIMIT 1",
        [subject_id],
        |_r| Ok(()),
    )
    .optional()
    .map(|v| v.is_some())
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    // Counts let the timetable editor show which subjects are actually taught.
    let mut stmt = match conn.prepare(
        "SELECT
           s.id,
           s.name,
           (SELECT COUNT(*) FROM timetable_slots t WHERE t.subject_id = s.id) AS slot_count,
           (SELECT COUNT(*) FROM activities a WHERE a.subject_id = s.id AND a.archived = 0) AS activity_count
         FROM subjects s
         ORDER BY s.name, s.id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let subjects = match stmt.query_map([], |r| {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "name": r.get::<_, String>(1)?,
            "slotCount": r.get::<_, i64>(2)?,
            "activityCount": r.get::<_, i64>(3)?,
        }))
    }) {
        Ok(rows) => match rows.collect::<Result<Vec<_>, _>>() {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "subjects": subjects }))
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO subjects(id, name) VALUES(?, ?)",
        params![subject_id, name],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "subjectId": subject_id }))
}

fn handle_outcomes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match parse_opt_string(req.params.get("subjectId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("subjectId {}", m), None),
    };
    let mut stmt = match conn.prepare(
        "SELECT id, subject_id, code, description
         FROM outcomes
         WHERE (? IS NULL OR subject_id = ?)
         ORDER BY code, id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let outcomes = match stmt.query_map(params![subject_id, subject_id], |r| {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "subjectId": r.get::<_, Option<String>>(1)?,
            "code": r.get::<_, String>(2)?,
            "description": r.get::<_, String>(3)?,
        }))
    }) {
        Ok(rows) => match rows.collect::<Result<Vec<_>, _>>() {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "outcomes": outcomes }))
}

fn handle_outcomes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let code = match required_str(req, "code") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match parse_opt_string(req.params.get("subjectId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("subjectId {}", m), None),
    };
    let description = match parse_opt_string(req.params.get("description")) {
        Ok(v) => v.unwrap_or_default(),
        Err(m) => return err(&req.id, "bad_params", format!("description {}", m), None),
    };
    if let Some(ref sid) = subject_id {
        match subject_exists(conn, sid) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "subject not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    let outcome_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO outcomes(id, subject_id, code, description) VALUES(?, ?, ?, ?)",
        params![outcome_id, subject_id, code, description],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "outcomeId": outcome_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "outcomes.list" => Some(handle_outcomes_list(state, req)),
        "outcomes.create" => Some(handle_outcomes_create(state, req)),
        _ => None,
    }
}
