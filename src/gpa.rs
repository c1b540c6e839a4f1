use serde::Serialize;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};
use crate::record::{AcademicRecord, Semester, SubjectMark};
use crate::scale::{GradingScale, MAX_GRADE_POINT};

/// Half-away-from-zero rounding to two decimals, used for percentages and GPAs.
pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// How semester figures are combined into the cumulative GPA. The two are not
/// algebraically equivalent once credit hours differ between semesters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CgpaPolicy {
    /// Σ(credit hours × grade point) over every subject / Σ credit hours.
    #[default]
    CreditWeighted,
    /// Plain mean of the per-semester GPAs.
    SemesterWeighted,
}

impl FromStr for CgpaPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "credit-weighted" | "credit" => Ok(CgpaPolicy::CreditWeighted),
            "semester-weighted" | "semester" => Ok(CgpaPolicy::SemesterWeighted),
            other => Err(format!(
                "unknown cgpa policy '{other}' (expected credit-weighted or semester-weighted)"
            )),
        }
    }
}

pub fn subject_grade_point(scale: &GradingScale, subject: &SubjectMark) -> EngineResult<f64> {
    scale.grade_point_for(round_2_decimals(subject.percentage()))
}

/// Returns (Σ credit hours × grade point, Σ credit hours).
fn quality_points<'a, I>(scale: &GradingScale, subjects: I) -> EngineResult<(f64, f64)>
where
    I: IntoIterator<Item = &'a SubjectMark>,
{
    let mut points = 0.0;
    let mut credits = 0.0;
    for s in subjects {
        points += s.credit_hours() * subject_grade_point(scale, s)?;
        credits += s.credit_hours();
    }
    Ok((points, credits))
}

fn weighted_mean(points: f64, credits: f64) -> EngineResult<f64> {
    if credits <= 0.0 {
        return Err(EngineError::InternalConsistency(
            "credit hours must be positive".to_string(),
        ));
    }
    Ok(points / credits)
}

/// Credit-weighted mean grade point of one semester, rounded to two decimals.
pub fn semester_gpa(scale: &GradingScale, semester: &Semester) -> EngineResult<f64> {
    let (points, credits) = quality_points(scale, semester.subjects())?;
    Ok(round_2_decimals(weighted_mean(points, credits)?))
}

pub fn cumulative_gpa(
    scale: &GradingScale,
    record: &AcademicRecord,
    policy: CgpaPolicy,
) -> EngineResult<f64> {
    let raw = match policy {
        CgpaPolicy::CreditWeighted => {
            let (points, credits) = quality_points(scale, record.subjects())?;
            weighted_mean(points, credits)?
        }
        CgpaPolicy::SemesterWeighted => {
            let gpas = record
                .semesters()
                .iter()
                .map(|s| semester_gpa(scale, s))
                .collect::<EngineResult<Vec<_>>>()?;
            gpas.iter().sum::<f64>() / gpas.len() as f64
        }
    };
    Ok(round_2_decimals(raw).clamp(0.0, MAX_GRADE_POINT))
}
