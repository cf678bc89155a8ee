use crate::schedule::{Day, Rejection};
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Placement refusal. `invalidDay` tells the UI to flash the target day; how
/// long is up to the UI.
pub fn rejected(id: &str, rejection: Rejection, day: Day) -> serde_json::Value {
    err(
        id,
        "placement_rejected",
        rejection.to_string(),
        Some(json!({
            "reason": rejection.reason(),
            "day": day,
            "invalidDay": true,
        })),
    )
}
