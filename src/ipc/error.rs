use log::error;
use serde_json::json;

use crate::error::EngineError;

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

/// Error envelope for an engine failure. Broken invariants are logged in full
/// and reported to the caller with a generic message.
pub fn engine_err(id: &str, e: &EngineError) -> serde_json::Value {
    if e.is_internal() {
        error!("request {id}: {e}");
    }
    err(id, e.code(), e.user_message(), e.details())
}
