mod config;
mod engine;
mod error;
mod gpa;
mod ipc;
mod parser;
mod record;
mod report;
mod resolver;
mod scale;

use dotenv::dotenv;
use log::{error, info, warn};
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::resolver::HttpTranscriptSource;

fn build_state(config: Config) -> anyhow::Result<ipc::AppState> {
    let scale = config.grading_scale()?;
    info!(
        "grading scale loaded ({} bands, {})",
        scale.bands().len(),
        config
            .scale_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in".to_string())
    );
    let source = HttpTranscriptSource::new(config.source_url.clone(), config.source_timeout)?;
    Ok(ipc::AppState {
        config,
        scale,
        source: Box::new(source),
    })
}

/// Reads one JSON request per line from stdin and answers each on its own
/// task; responses are written as they complete, tagged with the request id.
async fn serve(state: Arc<ipc::AppState>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<serde_json::Value>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(resp) = rx.recv().await {
            let line = serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string());
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                warn!("stdout closed, dropping remaining responses");
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(v)) => v,
            Ok(None) => break,
            Err(e) => {
                warn!("stdin read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let mut resp = ipc::err("", "bad_json", e.to_string(), None);
                if let Some(obj) = resp.as_object_mut() {
                    obj.remove("id");
                }
                let _ = tx.send(resp);
                continue;
            }
        };

        let state = Arc::clone(&state);
        let tx = tx.clone();
        tasks.spawn(async move {
            let resp = ipc::handle_request(&state, req).await;
            let _ = tx.send(resp);
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("request task failed: {e}");
        }
    }
    drop(tx);
    let _ = writer.await;
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("cgpad: invalid configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    // stdout carries the protocol, so logs go to stderr only.
    if TermLogger::init(
        config.log_level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Never,
    )
    .is_err()
    {
        eprintln!("cgpad: logger already initialised");
    }

    info!(
        "cgpad {} starting (policy {:?}, source {}, timeout {} ms)",
        env!("CARGO_PKG_VERSION"),
        config.policy,
        config.source_url,
        config.source_timeout.as_millis()
    );

    let state = match build_state(config) {
        Ok(s) => s,
        Err(e) => {
            error!("startup failed: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    serve(Arc::new(state)).await;
    info!("stdin closed, exiting");
    ExitCode::SUCCESS
}
