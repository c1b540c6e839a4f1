use anyhow::Context;
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::gpa::CgpaPolicy;
use crate::scale::GradingScale;

pub const DEFAULT_SOURCE_URL: &str = "http://lms.uaf.edu.pk/login/index.php";
pub const DEFAULT_SOURCE_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub source_url: Url,
    pub source_timeout: Duration,
    pub policy: CgpaPolicy,
    pub scale_path: Option<PathBuf>,
    pub log_level: LevelFilter,
}

impl Config {
    /// Reads `CGPAD_*` variables from the process environment. Call after
    /// `dotenv()` so a local `.env` file is honoured.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let raw_url = var("CGPAD_SOURCE_URL").unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string());
        let mut cfg = Config {
            source_url: Url::parse(&raw_url)
                .with_context(|| format!("CGPAD_SOURCE_URL is not a valid url: {raw_url}"))?,
            source_timeout: Duration::from_millis(DEFAULT_SOURCE_TIMEOUT_MS),
            policy: CgpaPolicy::default(),
            scale_path: None,
            log_level: LevelFilter::Info,
        };
        if let Some(v) = var("CGPAD_SOURCE_TIMEOUT_MS") {
            let ms: u64 = v
                .parse()
                .with_context(|| format!("CGPAD_SOURCE_TIMEOUT_MS must be milliseconds: {v}"))?;
            if ms == 0 {
                anyhow::bail!("CGPAD_SOURCE_TIMEOUT_MS must be greater than 0");
            }
            cfg.source_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = var("CGPAD_CGPA_POLICY") {
            cfg.policy = v
                .parse::<CgpaPolicy>()
                .map_err(anyhow::Error::msg)
                .context("CGPAD_CGPA_POLICY")?;
        }
        if let Some(v) = var("CGPAD_SCALE_PATH") {
            cfg.scale_path = Some(PathBuf::from(v));
        }
        if let Some(v) = var("CGPAD_LOG_LEVEL") {
            cfg.log_level = v
                .parse::<LevelFilter>()
                .with_context(|| format!("CGPAD_LOG_LEVEL is not a log level: {v}"))?;
        }
        Ok(cfg)
    }

    /// Loads the configured grading scale, or the built-in one. Any problem
    /// with a configured file is fatal.
    pub fn grading_scale(&self) -> anyhow::Result<GradingScale> {
        match &self.scale_path {
            Some(path) => GradingScale::load(path)
                .with_context(|| format!("loading grading scale from {}", path.display())),
            None => Ok(GradingScale::default()),
        }
    }
}
