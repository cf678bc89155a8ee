use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{PacingOptions, PacingStrategy, PriorityKind};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Scheduler,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduler" => Some(Self::Scheduler),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Scheduler => "setup.scheduler",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Scheduler => json!({
            "preserveBuffer": false,
            "pacingStrategy": "relaxed",
            "priority": "coverage",
            "excludeScheduledElsewhere": true
        }),
    }
}

/// Scheduler defaults after merging the stored section over the built-ins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerSetup {
    pub pacing: PacingOptions,
    pub priority: PriorityKind,
    pub exclude_scheduled_elsewhere: bool,
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Scheduler => match k.as_str() {
                "preserveBuffer" | "excludeScheduledElsewhere" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "pacingStrategy" => {
                    let s = parse_string_max(v, k, 16)?;
                    let Some(strategy) = PacingStrategy::parse(&s) else {
                        return Err("pacingStrategy must be one of: strict, relaxed".into());
                    };
                    obj.insert(k.clone(), Value::String(strategy.as_str().to_string()));
                }
                "priority" => {
                    let s = parse_string_max(v, k, 16)?.to_ascii_lowercase();
                    if PriorityKind::parse(&s).is_none() {
                        return Err("priority must be one of: coverage, id".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown scheduler field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: malformed historical values fall back to defaults.
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.key(), error = %e, "ignoring stored setup values");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

pub fn load_scheduler_setup(conn: &rusqlite::Connection) -> anyhow::Result<SchedulerSetup> {
    let obj = load_section(conn, SetupSection::Scheduler)?;
    let preserve_buffer = obj
        .get("preserveBuffer")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let pacing_strategy = obj
        .get("pacingStrategy")
        .and_then(|v| v.as_str())
        .and_then(PacingStrategy::parse)
        .unwrap_or_default();
    let priority = obj
        .get("priority")
        .and_then(|v| v.as_str())
        .and_then(PriorityKind::parse)
        .unwrap_or_default();
    let exclude_scheduled_elsewhere = obj
        .get("excludeScheduledElsewhere")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    Ok(SchedulerSetup {
        pacing: PacingOptions {
            preserve_buffer,
            pacing_strategy,
        },
        priority,
        exclude_scheduled_elsewhere,
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let scheduler = match load_section(conn, SetupSection::Scheduler) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "scheduler": scheduler }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(section = section.key(), "setup updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
