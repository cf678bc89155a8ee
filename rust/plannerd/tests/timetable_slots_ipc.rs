mod test_support;

use serde_json::json;
use test_support::{
    create_activity, create_slot, create_subject, request_err, request_ok, schedule_items,
    select_workspace, spawn_sidecar,
};

#[test]
fn slot_validation_rejects_malformed_input() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "plannerd-slots-validation");
    let math = create_subject(&mut stdin, &mut reader, "Math");

    for (i, params) in [
        json!({ "day": 5, "startMin": 540, "endMin": 580, "subjectId": math }),
        json!({ "day": -1, "startMin": 540, "endMin": 580 }),
        json!({ "day": 0, "startMin": 580, "endMin": 580 }),
        json!({ "day": 0, "startMin": 600, "endMin": 540 }),
        json!({ "day": 0, "startMin": -10, "endMin": 30 }),
        json!({ "day": 0, "startMin": 1400, "endMin": 1441 }),
        json!({ "day": 0, "endMin": 580 }),
    ]
    .into_iter()
    .enumerate()
    {
        let error = request_err(
            &mut stdin,
            &mut reader,
            &format!("bad-{}", i),
            "timetable.slots.create",
            params,
        );
        assert_eq!(error["code"], "bad_params", "case {}", i);
    }

    let unknown_subject = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "timetable.slots.create",
        json!({ "day": 0, "startMin": 540, "endMin": 580, "subjectId": "nope" }),
    );
    assert_eq!(unknown_subject["code"], "not_found");

    // The whole day is a valid slot.
    let _ = create_slot(&mut stdin, &mut reader, 4, None, 0, 1440);
}

#[test]
fn slots_list_sorted_and_filtered() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "plannerd-slots-list");
    let math = create_subject(&mut stdin, &mut reader, "Math");
    let art = create_subject(&mut stdin, &mut reader, "Art");
    let late = create_slot(&mut stdin, &mut reader, 1, Some(&math), 660, 700);
    let early = create_slot(&mut stdin, &mut reader, 1, Some(&art), 480, 520);
    let monday = create_slot(&mut stdin, &mut reader, 0, Some(&math), 540, 580);
    let lunch = create_slot(&mut stdin, &mut reader, 1, None, 720, 760);

    let all = request_ok(&mut stdin, &mut reader, "1", "timetable.slots.list", json!({}));
    let ids: Vec<i64> = all["slots"]
        .as_array()
        .expect("slots")
        .iter()
        .map(|s| s["id"].as_i64().expect("id"))
        .collect();
    assert_eq!(ids, vec![monday, early, late, lunch]);
    assert_eq!(all["slots"][3]["blocked"], true);
    assert_eq!(all["slots"][0]["blocked"], false);

    let tuesday_math = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "timetable.slots.list",
        json!({ "day": 1, "subjectId": math }),
    );
    assert_eq!(tuesday_math["slots"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(tuesday_math["slots"][0]["id"].as_i64(), Some(late));
}

#[test]
fn editing_or_deleting_a_slot_clears_its_placements() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "plannerd-slots-edit");
    let math = create_subject(&mut stdin, &mut reader, "Math");
    let s1 = create_slot(&mut stdin, &mut reader, 0, Some(&math), 540, 580);
    let s2 = create_slot(&mut stdin, &mut reader, 2, Some(&math), 540, 580);
    let a = create_activity(&mut stdin, &mut reader, "Graphs", Some(&math), None, &[]);
    let b = create_activity(&mut stdin, &mut reader, "Tables", Some(&math), None, &[]);
    let generated = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.generate",
        json!({ "weekStart": "2026-10-12" }),
    );
    assert_eq!(
        schedule_items(&generated["schedule"]),
        vec![(0, s1, a), (2, s2, b)]
    );
    assert_eq!(generated["schedule"]["revision"].as_i64(), Some(1));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "timetable.slots.update",
        json!({ "slotId": s1, "patch": { "endMin": 600 } }),
    );
    assert_eq!(updated["removedItems"].as_u64(), Some(1));
    assert_eq!(updated["slot"]["endMin"].as_i64(), Some(600));

    // A client still holding revision 1 must not write over the cleared week.
    let stale = request_err(
        &mut stdin,
        &mut reader,
        "2b",
        "schedule.remove",
        json!({ "weekStart": "2026-10-12", "day": 2, "slotId": s2, "expectedRevision": 1 }),
    );
    assert_eq!(stale["code"], "revision_conflict");
    assert_eq!(stale["details"], json!({ "expected": 1, "actual": 2 }));

    let bad_patch = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "timetable.slots.update",
        json!({ "slotId": s1, "patch": { "startMin": 700 } }),
    );
    assert_eq!(bad_patch["code"], "bad_params");

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "timetable.slots.delete",
        json!({ "slotId": s2 }),
    );
    assert_eq!(deleted, json!({ "ok": true, "removedItems": 1 }));

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "schedule.open",
        json!({ "weekStart": "2026-10-12" }),
    );
    assert!(schedule_items(&opened["schedule"]).is_empty());
    assert_eq!(opened["schedule"]["revision"].as_i64(), Some(3));

    let untouched = request_ok(
        &mut stdin,
        &mut reader,
        "5b",
        "timetable.slots.update",
        json!({ "slotId": s1, "patch": { "endMin": 610 } }),
    );
    assert_eq!(untouched["removedItems"].as_u64(), Some(0));
    let reopened = request_ok(
        &mut stdin,
        &mut reader,
        "5c",
        "schedule.open",
        json!({ "weekStart": "2026-10-12" }),
    );
    assert_eq!(reopened["schedule"]["revision"].as_i64(), Some(3));

    let missing = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "timetable.slots.delete",
        json!({ "slotId": s2 }),
    );
    assert_eq!(missing["code"], "not_found");
}
