use serde::Serialize;

use crate::error::{EngineError, EngineResult, RowIssue};
use crate::gpa::{round_2_decimals, CgpaPolicy};
use crate::record::AcademicRecord;
use crate::scale::MAX_GRADE_POINT;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemesterReport {
    pub semester_label: String,
    pub gpa: f64,
    pub credit_hours: f64,
}

/// Response body of both result methods. `cgpa`, `semesters[].semester_label`
/// and `semesters[].gpa` are what the result pages read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CgpaReport {
    pub cgpa: f64,
    pub policy: CgpaPolicy,
    pub total_credit_hours: f64,
    pub semesters: Vec<SemesterReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_rows: Vec<RowIssue>,
}

fn check_figure(what: &str, value: f64) -> EngineResult<()> {
    if value.is_finite() && (0.0..=MAX_GRADE_POINT).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::InternalConsistency(format!(
            "{what} {value} is outside 0..=4"
        )))
    }
}

/// Zips the record's semesters with their computed GPAs, preserving order.
pub fn build(
    record: &AcademicRecord,
    semester_gpas: &[f64],
    cgpa: f64,
    policy: CgpaPolicy,
    issues: Vec<RowIssue>,
) -> EngineResult<CgpaReport> {
    let semesters = record.semesters();
    if semesters.len() != semester_gpas.len() {
        return Err(EngineError::InternalConsistency(format!(
            "{} semesters but {} gpas",
            semesters.len(),
            semester_gpas.len()
        )));
    }
    check_figure("cgpa", cgpa)?;

    let mut out = Vec::with_capacity(semesters.len());
    for (semester, &gpa) in semesters.iter().zip(semester_gpas) {
        check_figure("gpa", gpa)?;
        out.push(SemesterReport {
            semester_label: semester.label().to_string(),
            gpa,
            credit_hours: semester.credit_hours(),
        });
    }

    Ok(CgpaReport {
        cgpa,
        policy,
        total_credit_hours: round_2_decimals(record.credit_hours()),
        semesters: out,
        skipped_rows: issues,
    })
}
