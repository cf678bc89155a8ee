#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_plannerd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn plannerd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Returns the `error` object of a failed response.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().expect("error object")
}

pub fn select_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> PathBuf {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    workspace
}

pub fn create_subject(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    name: &str,
) -> String {
    let res = request_ok(
        stdin,
        reader,
        &format!("subject-{}", name),
        "subjects.create",
        json!({ "name": name }),
    );
    res.get("subjectId")
        .and_then(|v| v.as_str())
        .expect("subjectId")
        .to_string()
}

pub fn create_slot(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    day: i64,
    subject_id: Option<&str>,
    start_min: i64,
    end_min: i64,
) -> i64 {
    let res = request_ok(
        stdin,
        reader,
        "slot",
        "timetable.slots.create",
        json!({
            "day": day,
            "subjectId": subject_id,
            "startMin": start_min,
            "endMin": end_min
        }),
    );
    res.get("slotId").and_then(|v| v.as_i64()).expect("slotId")
}

pub fn create_activity(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    title: &str,
    subject_id: Option<&str>,
    duration_mins: Option<i64>,
    outcome_ids: &[&str],
) -> i64 {
    let res = request_ok(
        stdin,
        reader,
        "activity",
        "activities.create",
        json!({
            "input": {
                "title": title,
                "subjectId": subject_id,
                "durationMins": duration_mins,
                "outcomeIds": outcome_ids
            }
        }),
    );
    res.get("activityId")
        .and_then(|v| v.as_i64())
        .expect("activityId")
}

/// `(day, slotId, activityId)` triples of a serialized schedule.
pub fn schedule_items(schedule: &serde_json::Value) -> Vec<(i64, i64, i64)> {
    schedule
        .get("items")
        .and_then(|v| v.as_array())
        .expect("items")
        .iter()
        .map(|item| {
            (
                item.get("day").and_then(|v| v.as_i64()).expect("day"),
                item.get("slotId").and_then(|v| v.as_i64()).expect("slotId"),
                item.get("activityId")
                    .and_then(|v| v.as_i64())
                    .expect("activityId"),
            )
        })
        .collect()
}
