use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::subjects::subject_exists;
use crate::ipc::helpers::{db_conn, parse_opt_i64, parse_opt_string, required_i64};
use crate::ipc::types::{AppState, Request};
use crate::schedule::model::is_weekday;
use crate::schedule::timetable::validate_slot;
use crate::schedule::TimeSlot;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;

fn slot_to_json(slot: &TimeSlot) -> serde_json::Value {
    json!({
        "id": slot.id,
        "day": slot.day,
        "subjectId": slot.subject_id,
        "startMin": slot.start_min,
        "endMin": slot.end_min,
        "blocked": slot.is_blocked(),
    })
}

fn load_slot(conn: &Connection, slot_id: i64) -> Result<Option<TimeSlot>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, day, subject_id, start_min, end_min FROM timetable_slots WHERE id = ?",
        [slot_id],
        db::slot_from_row,
    )
    .optional()
}

/// Rejects malformed slots before they reach the store.
fn check_slot(req: &Request, conn: &Connection, slot: &TimeSlot) -> Result<(), serde_json::Value> {
    if let Err(e) = validate_slot(slot) {
        return Err(err(&req.id, "bad_params", e.to_string(), None));
    }
    if let Some(ref sid) = slot.subject_id {
        match subject_exists(conn, sid) {
            Ok(true) => {}
            Ok(false) => return Err(err(&req.id, "not_found", "subject not found", None)),
            Err(e) => return Err(err(&req.id, "db_query_failed", e.to_string(), None)),
        }
    }
    Ok(())
}

fn parse_day_field(v: Option<&serde_json::Value>, key: &str) -> Result<Option<u8>, String> {
    match parse_opt_i64(v) {
        Ok(None) => Ok(None),
        Ok(Some(d)) if is_weekday(d) => Ok(Some(d as u8)),
        Ok(Some(_)) => Err(format!("{} must be in 0..=4", key)),
        Err(m) => Err(format!("{} {}", key, m)),
    }
}

fn handle_slots_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let day = match parse_day_field(req.params.get("day"), "day") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let subject_id = match parse_opt_string(req.params.get("subjectId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("subjectId {}", m), None),
    };
    let mut stmt = match conn.prepare(
        "SELECT id, day, subject_id, start_min, end_min
         FROM timetable_slots
         WHERE (? IS NULL OR day = ?) AND (? IS NULL OR subject_id = ?)
         ORDER BY day, start_min, id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let day_param = day.map(|d| d as i64);
    let slots = match stmt.query_map(params![day_param, day_param, subject_id, subject_id], db::slot_from_row) {
        Ok(rows) => match rows.collect::<Result<Vec<_>, _>>() {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let slots: Vec<serde_json::Value> = slots.iter().map(slot_to_json).collect();
    ok(&req.id, json!({ "slots": slots }))
}

fn handle_slots_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let day = match required_i64(req, "day") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let start_min = match required_i64(req, "startMin") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let end_min = match required_i64(req, "endMin") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match parse_opt_string(req.params.get("subjectId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("subjectId {}", m), None),
    };
    if !is_weekday(day) {
        return err(&req.id, "bad_params", "day must be in 0..=4", None);
    }
    let candidate = TimeSlot {
        id: 0,
        day: day as u8,
        subject_id,
        start_min,
        end_min,
    };
    if let Err(e) = check_slot(req, conn, &candidate) {
        return e;
    }
    if let Err(e) = conn.execute(
        "INSERT INTO timetable_slots(day, subject_id, start_min, end_min) VALUES(?, ?, ?, ?)",
        params![day, candidate.subject_id, start_min, end_min],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "slotId": conn.last_insert_rowid() }))
}

fn handle_slots_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let slot_id = match required_i64(req, "slotId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    let mut slot = match load_slot(conn, slot_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "slot not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    for (k, v) in patch {
        match k.as_str() {
            "day" => match parse_day_field(Some(v), "patch.day") {
                Ok(Some(d)) => slot.day = d,
                Ok(None) => return err(&req.id, "bad_params", "patch.day must not be null", None),
                Err(m) => return err(&req.id, "bad_params", m, None),
            },
            "startMin" | "endMin" => {
                let Some(n) = v.as_i64() else {
                    return err(&req.id, "bad_params", format!("patch.{} must be integer", k), None);
                };
                if k == "startMin" {
                    slot.start_min = n;
                } else {
                    slot.end_min = n;
                }
            }
            "subjectId" => match parse_opt_string(Some(v)) {
                Ok(v) => slot.subject_id = v,
                Err(m) => return err(&req.id, "bad_params", format!("patch.subjectId {}", m), None),
            },
            _ => return err(&req.id, "bad_params", format!("unknown patch field: {}", k), None),
        }
    }
    if let Err(e) = check_slot(req, conn, &slot) {
        return e;
    }
    // Placements in an edited slot may no longer satisfy the constraints, so
    // they are cleared along with the edit.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute(
        "UPDATE timetable_slots SET day = ?, subject_id = ?, start_min = ?, end_min = ? WHERE id = ?",
        params![slot.day as i64, slot.subject_id, slot.start_min, slot.end_min, slot_id],
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    let removed_items = match db::remove_items_for(&tx, db::ItemOwner::Slot(slot_id)) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_delete_failed", e.to_string(), None),
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({ "ok": true, "slot": slot_to_json(&slot), "removedItems": removed_items }),
    )
}

fn handle_slots_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let slot_id = match required_i64(req, "slotId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let removed_items = match db::remove_items_for(&tx, db::ItemOwner::Slot(slot_id)) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_delete_failed", e.to_string(), None),
    };
    let deleted = match tx.execute("DELETE FROM timetable_slots WHERE id = ?", [slot_id]) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_delete_failed", e.to_string(), None),
    };
    if deleted == 0 {
        return err(&req.id, "not_found", "slot not found", None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    if removed_items > 0 {
        tracing::info!(slot_id, removed_items, "slot deleted with scheduled items");
    }
    ok(&req.id, json!({ "ok": true, "removedItems": removed_items }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timetable.slots.list" => Some(handle_slots_list(state, req)),
        "timetable.slots.create" => Some(handle_slots_create(state, req)),
        "timetable.slots.update" => Some(handle_slots_update(state, req)),
        "timetable.slots.delete" => Some(handle_slots_delete(state, req)),
        _ => None,
    }
}
