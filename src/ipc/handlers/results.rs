use crate::engine;
use crate::error::EngineError;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::report::CgpaReport;
use log::warn;
use serde_json::json;
use std::time::Duration;

/// Upper bound on a caller-supplied lookup timeout.
const MAX_TIMEOUT_MS: u64 = 120_000;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Reads a string param, accepting the camelCase name sent by the result
/// pages and its snake_case spelling.
fn string_param<'a>(req: &'a Request, camel: &str, snake: &str) -> Result<&'a str, HandlerErr> {
    let v = req.params.get(camel).or_else(|| req.params.get(snake));
    match v {
        Some(serde_json::Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(HandlerErr {
            code: "bad_params",
            message: format!("params.{camel} must be a string"),
            details: Some(json!({ "got": other })),
        }),
        None => Err(HandlerErr {
            code: "bad_params",
            message: format!("missing params.{camel}"),
            details: None,
        }),
    }
}

fn timeout_param(state: &AppState, req: &Request) -> Result<Duration, HandlerErr> {
    let Some(raw) = req.params.get("timeoutMs").filter(|v| !v.is_null()) else {
        return Ok(state.config.source_timeout);
    };
    match raw.as_u64() {
        Some(ms) if ms > 0 && ms <= MAX_TIMEOUT_MS => Ok(Duration::from_millis(ms)),
        _ => Err(HandlerErr {
            code: "bad_params",
            message: format!("params.timeoutMs must be an integer in 1..={MAX_TIMEOUT_MS}"),
            details: Some(json!({ "timeoutMs": raw })),
        }),
    }
}

fn report_response(id: &str, report: &CgpaReport) -> serde_json::Value {
    match serde_json::to_value(report) {
        Ok(v) => ok(id, v),
        Err(e) => err(id, "internal_error", format!("cannot encode report: {e}"), None),
    }
}

fn handle_csv(state: &AppState, req: &Request) -> serde_json::Value {
    let csv = match string_param(req, "csvString", "csv_string") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match engine::process_multiseme_csv_data(&state.scale, state.config.policy, csv) {
        Ok(report) => report_response(&req.id, &report),
        Err(e) => engine_err(&req.id, &e),
    }
}

async fn handle_lookup(state: &AppState, req: &Request) -> serde_json::Value {
    let reg = match string_param(req, "regNumber", "reg_number") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let timeout = match timeout_param(state, req) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let result = engine::process_student_results(
        &state.scale,
        state.config.policy,
        state.source.as_ref(),
        reg,
        timeout,
    )
    .await;
    match result {
        Ok(report) => report_response(&req.id, &report),
        Err(e) => {
            if !matches!(e, EngineError::InvalidRegistrationNumber) {
                warn!("lookup {} failed: {e}", reg.trim());
            }
            engine_err(&req.id, &e)
        }
    }
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "process_multiseme_csv_data" => Some(handle_csv(state, req)),
        "process_student_results" => Some(handle_lookup(state, req).await),
        _ => None,
    }
}
