use crate::db::RevisionConflict;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::schedule::model::{is_weekday, parse_week_start};
use crate::schedule::{Day, ModelError};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::Value as JsonValue;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, JsonValue> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, JsonValue> {
    match req.params.get(key) {
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be integer", key), None)),
    }
}

pub fn required_week_start(req: &Request) -> Result<NaiveDate, JsonValue> {
    let raw = required_str(req, "weekStart")?;
    parse_week_start(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "weekStart must be an ISO date (YYYY-MM-DD)",
            None,
        )
    })
}

pub fn required_day(req: &Request) -> Result<Day, JsonValue> {
    let day = required_i64(req, "day")?;
    if !is_weekday(day) {
        return Err(err(&req.id, "bad_params", "day must be in 0..=4", None));
    }
    Ok(day as Day)
}

pub fn parse_bool(v: Option<&JsonValue>, default: bool) -> Result<bool, &'static str> {
    match v {
        None => Ok(default),
        Some(v) if v.is_null() => Ok(default),
        Some(v) => v.as_bool().ok_or("must be boolean"),
    }
}

pub fn parse_opt_string(v: Option<&JsonValue>) -> Result<Option<String>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v.as_str().ok_or("must be string or null")?.trim().to_string();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s))
            }
        }
    }
}

pub fn parse_opt_i64(v: Option<&JsonValue>) -> Result<Option<i64>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or("must be integer or null"),
    }
}

pub fn parse_string_array(v: Option<&JsonValue>) -> Result<Vec<String>, &'static str> {
    match v {
        None => Ok(Vec::new()),
        Some(v) if v.is_null() => Ok(Vec::new()),
        Some(v) => {
            let arr = v.as_array().ok_or("must be array of strings")?;
            let mut out = Vec::with_capacity(arr.len());
            for item in arr {
                let s = item
                    .as_str()
                    .ok_or("must be array of strings")?
                    .trim()
                    .to_string();
                if !s.is_empty() && !out.contains(&s) {
                    out.push(s);
                }
            }
            Ok(out)
        }
    }
}

/// `None` when the key is absent or null; an empty list is kept as such.
pub fn parse_opt_i64_array(v: Option<&JsonValue>) -> Result<Option<Vec<i64>>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let arr = v.as_array().ok_or("must be array of integers")?;
            let mut out = Vec::with_capacity(arr.len());
            for item in arr {
                let n = item.as_i64().ok_or("must be array of integers")?;
                if !out.contains(&n) {
                    out.push(n);
                }
            }
            Ok(Some(out))
        }
    }
}

/// Maps store errors onto the envelope, keeping typed failures distinct from
/// generic query errors.
pub fn store_err(req: &Request, fallback_code: &str, e: anyhow::Error) -> JsonValue {
    if let Some(conflict) = e.downcast_ref::<RevisionConflict>() {
        return err(
            &req.id,
            "revision_conflict",
            conflict.to_string(),
            Some(serde_json::json!({
                "expected": conflict.expected,
                "actual": conflict.actual,
            })),
        );
    }
    if let Some(model) = e.downcast_ref::<ModelError>() {
        let code = match model {
            ModelError::NonPositiveDuration { .. } | ModelError::DuplicateActivity(_) => {
                "invalid_catalog"
            }
            _ => "invalid_timetable",
        };
        return err(&req.id, code, model.to_string(), None);
    }
    tracing::warn!(method = %req.method, error = %e, "store call failed");
    err(&req.id, fallback_code, e.to_string(), None)
}
