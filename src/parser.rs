use log::debug;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{EngineError, EngineResult, RowIssue};
use crate::record::{AcademicRecord, Semester, SubjectMark};

const CSV_FIELDS: usize = 4;
/// Transcript rows without a total are marked out of 20 per credit hour.
const MARKS_PER_CREDIT_HOUR: f64 = 20.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub record: AcademicRecord,
    /// Rows that were skipped, in input order.
    pub issues: Vec<RowIssue>,
}

/// A numeric cell as delivered by a transcript source: JSON sources send
/// numbers, scraped pages send text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            Cell::Text(s) => parse_number(s),
        }
    }

    fn describe(&self) -> String {
        match self {
            Cell::Number(v) => v.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranscriptSubject {
    #[serde(default)]
    pub course_code: String,
    pub credit_hours: Cell,
    #[serde(default)]
    pub total_marks: Option<Cell>,
    pub obtained_marks: Cell,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranscriptSemester {
    pub label: String,
    #[serde(default)]
    pub subjects: Vec<TranscriptSubject>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct TranscriptPayload {
    #[serde(default)]
    pub semesters: Vec<TranscriptSemester>,
}

/// Accepts plain decimals and a leading integer followed by a parenthesised
/// breakdown, e.g. credit hours written as `3(2-1)`.
fn parse_number(raw: &str) -> Option<f64> {
    let t = raw.trim();
    let t = match t.find('(') {
        Some(i) if i > 0 => t[..i].trim(),
        _ => t,
    };
    t.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Semesters in first-seen order with the subjects that survived validation.
#[derive(Default)]
struct SemesterGroups {
    order: Vec<(String, Vec<SubjectMark>)>,
    index: HashMap<String, usize>,
}

impl SemesterGroups {
    fn touch(&mut self, label: &str) -> usize {
        if let Some(&i) = self.index.get(label) {
            return i;
        }
        self.order.push((label.to_string(), Vec::new()));
        self.index.insert(label.to_string(), self.order.len() - 1);
        self.order.len() - 1
    }

    fn push(&mut self, idx: usize, subject: SubjectMark) {
        self.order[idx].1.push(subject);
    }

    fn finish(self, issues: Vec<RowIssue>) -> EngineResult<ParsedRecord> {
        if self.order.is_empty() {
            return Err(EngineError::EmptyRecord { issues });
        }
        let blank: Vec<String> = self
            .order
            .iter()
            .filter(|(_, subjects)| subjects.is_empty())
            .map(|(label, _)| label.clone())
            .collect();
        if !blank.is_empty() {
            return Err(EngineError::EmptySemester {
                labels: blank,
                issues,
            });
        }

        let semesters = self
            .order
            .into_iter()
            .map(|(label, subjects)| Semester::new(label, subjects))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(ParsedRecord {
            record: AcademicRecord::new(semesters)?,
            issues,
        })
    }
}

fn csv_field(line: usize, name: &str, raw: &str) -> Result<f64, RowIssue> {
    let t = raw.trim();
    t.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RowIssue::malformed(line, format!("{name} '{t}' is not a number")))
}

fn csv_row(line: usize, fields: &[&str]) -> Result<SubjectMark, RowIssue> {
    let credit_hours = csv_field(line, "credit hours", fields[0])?;
    let total_marks = csv_field(line, "total marks", fields[1])?;
    let obtained_marks = csv_field(line, "obtained marks", fields[2])?;
    SubjectMark::new(line, credit_hours, total_marks, obtained_marks)
}

/// Parses `creditHours,totalMarks,obtainedMarks,semesterLabel` rows. The first
/// line is a header and is never read as data.
pub fn parse_csv(text: &str) -> EngineResult<ParsedRecord> {
    let mut groups = SemesterGroups::default();
    let mut issues = Vec::new();

    for (i, raw) in text.lines().enumerate().skip(1) {
        let line = i + 1;
        if raw.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = raw.split(',').collect();
        if fields.len() != CSV_FIELDS {
            issues.push(RowIssue::malformed(
                line,
                format!("expected {CSV_FIELDS} fields, got {}", fields.len()),
            ));
            continue;
        }
        let label = fields[3].trim();
        if label.is_empty() {
            issues.push(RowIssue::malformed(line, "semester label is empty"));
            continue;
        }

        // The label counts as entered even when the rest of the row is bad.
        let idx = groups.touch(label);
        match csv_row(line, &fields) {
            Ok(subject) => groups.push(idx, subject),
            Err(issue) => {
                debug!("skipping csv row {line}: {}", issue.message);
                issues.push(issue);
            }
        }
    }

    groups.finish(issues)
}

fn transcript_row(line: usize, subject: &TranscriptSubject) -> Result<SubjectMark, RowIssue> {
    let number = |name: &str, cell: &Cell| {
        cell.as_number().ok_or_else(|| {
            RowIssue::malformed(
                line,
                format!("{name} '{}' is not a number", cell.describe().trim()),
            )
        })
    };
    let credit_hours = number("credit hours", &subject.credit_hours)?;
    let obtained_marks = number("obtained marks", &subject.obtained_marks)?;
    let total_marks = match &subject.total_marks {
        Some(cell) => number("total marks", cell)?,
        None => credit_hours * MARKS_PER_CREDIT_HOUR,
    };
    Ok(SubjectMark::new(line, credit_hours, total_marks, obtained_marks)?
        .with_course_code(subject.course_code.as_str()))
}

/// Normalizes a fetched transcript. A course attempted more than once counts
/// only for its best attempt (highest percentage, later attempt on a tie);
/// semesters left with nothing but superseded attempts are dropped.
pub fn parse_transcript(payload: &TranscriptPayload) -> EngineResult<ParsedRecord> {
    let mut issues = Vec::new();
    // (semester position, subject) for every valid row, in payload order.
    let mut valid: Vec<(usize, SubjectMark)> = Vec::new();
    let mut labels: Vec<String> = Vec::new();
    let mut line = 0usize;

    for semester in &payload.semesters {
        let label = semester.label.trim();
        let label = if label.is_empty() {
            format!("Semester {}", labels.len() + 1)
        } else {
            label.to_string()
        };
        let pos = match labels.iter().position(|l| *l == label) {
            Some(p) => p,
            None => {
                labels.push(label);
                labels.len() - 1
            }
        };
        for subject in &semester.subjects {
            line += 1;
            match transcript_row(line, subject) {
                Ok(mark) => valid.push((pos, mark)),
                Err(issue) => {
                    debug!("skipping transcript row {line}: {}", issue.message);
                    issues.push(issue);
                }
            }
        }
    }

    let mut best: HashMap<String, usize> = HashMap::new();
    for (i, (_, mark)) in valid.iter().enumerate() {
        let Some(code) = mark.course_code() else {
            continue;
        };
        let key = code.to_ascii_uppercase();
        match best.get(&key) {
            Some(&j) if valid[j].1.percentage() > mark.percentage() => {}
            _ => {
                best.insert(key, i);
            }
        }
    }

    let mut had_valid = vec![false; labels.len()];
    let mut groups = SemesterGroups::default();
    let slots: Vec<usize> = labels.iter().map(|l| groups.touch(l)).collect();
    for (i, (pos, mark)) in valid.into_iter().enumerate() {
        had_valid[pos] = true;
        let superseded = mark
            .course_code()
            .map(|code| best.get(&code.to_ascii_uppercase()) != Some(&i))
            .unwrap_or(false);
        if superseded {
            debug!(
                "course {} in {} superseded by a later or better attempt",
                mark.course_code().unwrap_or_default(),
                labels[pos]
            );
            continue;
        }
        groups.push(slots[pos], mark);
    }

    // Drop semesters that only held superseded attempts.
    let mut kept = SemesterGroups::default();
    for (pos, (label, subjects)) in groups.order.into_iter().enumerate() {
        if subjects.is_empty() && had_valid[pos] {
            continue;
        }
        let idx = kept.touch(&label);
        for s in subjects {
            kept.push(idx, s);
        }
    }

    kept.finish(issues)
}
