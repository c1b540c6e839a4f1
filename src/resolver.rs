use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use url::Url;

use crate::error::{EngineError, EngineResult};
use crate::parser::{
    parse_transcript, Cell, ParsedRecord, TranscriptPayload, TranscriptSemester, TranscriptSubject,
};

/// Where transcripts come from. Implementations map their own failures onto
/// `RecordNotFound`, `SourceUnavailable` and `UpstreamFormat`.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch(&self, reg_number: &str, timeout: Duration) -> EngineResult<TranscriptPayload>;

    /// Endpoint description for `health`.
    fn describe(&self) -> String;
}

pub fn validate_registration_number(raw: &str) -> EngineResult<&str> {
    let reg = raw.trim();
    if reg.is_empty() {
        return Err(EngineError::InvalidRegistrationNumber);
    }
    Ok(reg)
}

/// validate → fetch (bounded by `timeout`) → parse. The lookup is read-only,
/// so a `SourceUnavailable` failure can simply be retried.
pub async fn resolve(
    source: &dyn TranscriptSource,
    reg_number: &str,
    timeout: Duration,
) -> EngineResult<ParsedRecord> {
    let reg = validate_registration_number(reg_number)?;

    let payload = match tokio::time::timeout(timeout, source.fetch(reg, timeout)).await {
        Ok(fetched) => fetched?,
        Err(_) => {
            return Err(EngineError::SourceUnavailable {
                reason: format!("lookup timed out after {} ms", timeout.as_millis()),
            })
        }
    };
    if payload.semesters.is_empty() {
        return Err(EngineError::RecordNotFound {
            reg_number: reg.to_string(),
        });
    }
    parse_transcript(&payload)
}

pub struct HttpTranscriptSource {
    client: Client,
    url: Url,
}

impl HttpTranscriptSource {
    pub fn new(url: Url, connect_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("cgpad/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, url })
    }
}

fn unavailable(err: reqwest::Error) -> EngineError {
    let reason = if err.is_timeout() {
        "result source timed out".to_string()
    } else if err.is_connect() {
        format!("cannot connect to result source: {err}")
    } else {
        err.to_string()
    };
    EngineError::SourceUnavailable { reason }
}

#[async_trait]
impl TranscriptSource for HttpTranscriptSource {
    async fn fetch(&self, reg_number: &str, timeout: Duration) -> EngineResult<TranscriptPayload> {
        debug!("looking up {reg_number} at {}", self.url);
        let resp = self
            .client
            .post(self.url.clone())
            .form(&[("Register", reg_number)])
            .timeout(timeout)
            .send()
            .await
            .map_err(unavailable)?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(EngineError::RecordNotFound {
                reg_number: reg_number.to_string(),
            });
        }
        if !status.is_success() {
            warn!("result source answered {status} for {reg_number}");
            return Err(EngineError::SourceUnavailable {
                reason: format!("result source answered {status}"),
            });
        }

        let is_json = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("json"))
            .unwrap_or(false);
        let body = resp.text().await.map_err(unavailable)?;

        if is_json {
            decode_json(reg_number, &body)
        } else {
            decode_html(reg_number, &body)
        }
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

fn decode_json(reg_number: &str, body: &str) -> EngineResult<TranscriptPayload> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| EngineError::UpstreamFormat {
            reason: format!("invalid json: {e}"),
        })?;
    if value.get("found").and_then(|v| v.as_bool()) == Some(false) {
        return Err(EngineError::RecordNotFound {
            reg_number: reg_number.to_string(),
        });
    }
    let payload: TranscriptPayload =
        serde_json::from_value(value).map_err(|e| EngineError::UpstreamFormat {
            reason: format!("unexpected transcript shape: {e}"),
        })?;
    if payload.semesters.is_empty() {
        return Err(EngineError::RecordNotFound {
            reg_number: reg_number.to_string(),
        });
    }
    Ok(payload)
}

fn selector(css: &str) -> EngineResult<Selector> {
    Selector::parse(css)
        .map_err(|e| EngineError::InternalConsistency(format!("bad selector {css}: {e:?}")))
}

fn cell_text(el: &ElementRef) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Column positions of a result table, located by header text.
#[derive(Debug, Clone, Copy)]
struct Columns {
    semester: usize,
    credit_hours: usize,
    obtained: usize,
    course_code: Option<usize>,
    max_marks: Option<usize>,
}

impl Columns {
    fn locate(headers: &[String]) -> Option<Self> {
        let lower: Vec<String> = headers.iter().map(|h| h.to_ascii_lowercase()).collect();
        let find = |pred: fn(&str) -> bool| lower.iter().position(|h| pred(h));

        let semester = find(|h| h.contains("semester"))?;
        let credit_hours = find(|h| h.contains("credit"))?;
        let max_marks = find(|h| h.contains("max") || h.contains("out of") || h == "total marks");
        // Institutional result pages label the obtained sum plain "Total".
        let obtained = find(|h| h.contains("obtained")).or_else(|| find(|h| h == "total"))?;
        let course_code = find(|h| h.contains("code"));
        Some(Self {
            semester,
            credit_hours,
            obtained,
            course_code,
            max_marks,
        })
    }

    fn width(&self) -> usize {
        [
            Some(self.semester),
            Some(self.credit_hours),
            Some(self.obtained),
            self.course_code,
            self.max_marks,
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0)
            + 1
    }
}

/// Reads the institution's HTML result page. Rows with a blank semester cell
/// belong to the semester above them.
fn decode_html(reg_number: &str, body: &str) -> EngineResult<TranscriptPayload> {
    let document = Html::parse_document(body);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;

    for table in document.select(&table_sel) {
        let mut rows = table.select(&row_sel);
        let Some(header) = rows.next() else {
            continue;
        };
        let headers: Vec<String> = header.select(&cell_sel).map(|c| cell_text(&c)).collect();
        let Some(cols) = Columns::locate(&headers) else {
            continue;
        };

        let mut semesters: Vec<TranscriptSemester> = Vec::new();
        let mut current: Option<String> = None;
        for row in rows {
            let cells: Vec<String> = row.select(&cell_sel).map(|c| cell_text(&c)).collect();
            if cells.len() < cols.width() {
                continue;
            }
            // Repeated header rows.
            if cells[cols.credit_hours].to_ascii_lowercase().contains("credit") {
                continue;
            }
            if !cells[cols.semester].is_empty() {
                current = Some(cells[cols.semester].clone());
            }
            let Some(label) = current.clone() else {
                continue;
            };

            let subject = TranscriptSubject {
                course_code: cols
                    .course_code
                    .map(|i| cells[i].clone())
                    .unwrap_or_default(),
                credit_hours: Cell::Text(cells[cols.credit_hours].clone()),
                total_marks: cols.max_marks.map(|i| Cell::Text(cells[i].clone())),
                obtained_marks: Cell::Text(cells[cols.obtained].clone()),
            };
            match semesters.iter_mut().find(|s| s.label == label) {
                Some(s) => s.subjects.push(subject),
                None => semesters.push(TranscriptSemester {
                    label,
                    subjects: vec![subject],
                }),
            }
        }

        if semesters.is_empty() {
            return Err(EngineError::RecordNotFound {
                reg_number: reg_number.to_string(),
            });
        }
        return Ok(TranscriptPayload { semesters });
    }

    let text = document
        .root_element()
        .text()
        .collect::<String>()
        .to_ascii_lowercase();
    if text.contains("no record") || text.contains("not found") {
        return Err(EngineError::RecordNotFound {
            reg_number: reg_number.to_string(),
        });
    }
    Err(EngineError::UpstreamFormat {
        reason: "no result table in page".to_string(),
    })
}
