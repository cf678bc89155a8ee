mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{request, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("plannerd-router-smoke");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["version"].is_string());
    assert!(health["workspacePath"].is_null());

    let no_ws = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.open",
        json!({ "weekStart": "2026-10-12" }),
    );
    assert_eq!(no_ws["code"], "no_workspace");

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["workspacePath"], json!(workspace.to_string_lossy()));

    let calls = [
        ("setup.get", json!({})),
        ("subjects.list", json!({})),
        ("outcomes.list", json!({})),
        ("timetable.slots.list", json!({})),
        ("activities.list", json!({})),
        ("schedule.open", json!({ "weekStart": "2026-10-12" })),
        ("schedule.generate", json!({ "weekStart": "2026-10-12" })),
        ("schedule.clear", json!({ "weekStart": "2026-10-12" })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let _ = request_ok(&mut stdin, &mut reader, &format!("c{}", i), method, params);
    }

    let unknown = request(&mut stdin, &mut reader, "4", "grades.open", json!({}));
    assert_eq!(unknown["error"]["code"], "not_implemented");

    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let bad: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(bad["error"]["code"], "bad_json");

    // The loop keeps serving after a malformed line.
    let _ = request_ok(&mut stdin, &mut reader, "5", "health", json!({}));
}
