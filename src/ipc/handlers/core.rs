use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_health(state: &AppState, req: &Request) -> serde_json::Value {
    let timeout_ms = u64::try_from(state.config.source_timeout.as_millis()).unwrap_or(u64::MAX);
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "policy": state.config.policy,
            "sourceUrl": state.source.describe(),
            "sourceTimeoutMs": timeout_ms,
        }),
    )
}

fn handle_scale_get(state: &AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "bands": state.scale.bands() }))
}

pub fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "scale.get" => Some(handle_scale_get(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::EngineResult;
    use crate::parser::TranscriptPayload;
    use crate::resolver::TranscriptSource;
    use crate::scale::GradingScale;
    use async_trait::async_trait;
    use std::time::Duration;

    struct NoSource;

    #[async_trait]
    impl TranscriptSource for NoSource {
        async fn fetch(&self, _reg: &str, _timeout: Duration) -> EngineResult<TranscriptPayload> {
            Ok(TranscriptPayload::default())
        }

        fn describe(&self) -> String {
            "none".to_string()
        }
    }

    fn state(timeout: Duration) -> AppState {
        let mut config = Config::from_lookup(|_: &str| None).expect("default config");
        config.source_timeout = timeout;
        AppState {
            config,
            scale: GradingScale::default(),
            source: Box::new(NoSource),
        }
    }

    fn health(state: &AppState) -> serde_json::Value {
        let req = Request {
            id: "1".to_string(),
            method: "health".to_string(),
            params: json!({}),
        };
        try_handle(state, &req).expect("health is routed")
    }

    #[test]
    fn health_reports_timeout_in_millis() {
        let v = health(&state(Duration::from_millis(2_500)));
        assert_eq!(v["result"]["sourceTimeoutMs"].as_u64(), Some(2_500));
        assert_eq!(v["result"]["sourceUrl"], "none");
    }

    #[test]
    fn oversized_timeout_saturates() {
        let v = health(&state(Duration::MAX));
        assert_eq!(v["result"]["sourceTimeoutMs"].as_u64(), Some(u64::MAX));
    }
}
