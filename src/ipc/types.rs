use serde::Deserialize;

use crate::config::Config;
use crate::resolver::TranscriptSource;
use crate::scale::GradingScale;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Read-only after startup; shared by every in-flight request.
pub struct AppState {
    pub config: Config,
    pub scale: GradingScale,
    pub source: Box<dyn TranscriptSource>,
}
