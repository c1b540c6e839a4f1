use crate::error::{EngineError, EngineResult, RowIssue};

/// Largest credit hours or total marks accepted for one subject. Keeps the
/// quality-point sums finite for any number of rows.
pub const MAX_SUBJECT_VALUE: f64 = 1e6;

/// One validated subject row. Fields are private so the invariants checked in
/// [`SubjectMark::new`] hold for the lifetime of the value.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectMark {
    credit_hours: f64,
    total_marks: f64,
    obtained_marks: f64,
    course_code: Option<String>,
}

impl SubjectMark {
    /// Checks `0 < credit_hours <= MAX_SUBJECT_VALUE`,
    /// `0 < total_marks <= MAX_SUBJECT_VALUE` and `0 <= obtained <= total`.
    /// `line` is only used to label the returned issue.
    pub fn new(
        line: usize,
        credit_hours: f64,
        total_marks: f64,
        obtained_marks: f64,
    ) -> Result<Self, RowIssue> {
        if !(credit_hours.is_finite() && total_marks.is_finite() && obtained_marks.is_finite()) {
            return Err(RowIssue::malformed(line, "marks must be finite numbers"));
        }
        if credit_hours <= 0.0 {
            return Err(RowIssue::invalid_marks(
                line,
                format!("credit hours must be > 0, got {credit_hours}"),
            ));
        }
        if credit_hours > MAX_SUBJECT_VALUE {
            return Err(RowIssue::invalid_marks(
                line,
                format!("credit hours {credit_hours} exceed {MAX_SUBJECT_VALUE}"),
            ));
        }
        if total_marks <= 0.0 {
            return Err(RowIssue::invalid_marks(
                line,
                format!("total marks must be > 0, got {total_marks}"),
            ));
        }
        if total_marks > MAX_SUBJECT_VALUE {
            return Err(RowIssue::invalid_marks(
                line,
                format!("total marks {total_marks} exceed {MAX_SUBJECT_VALUE}"),
            ));
        }
        if obtained_marks < 0.0 {
            return Err(RowIssue::invalid_marks(
                line,
                format!("obtained marks must not be negative, got {obtained_marks}"),
            ));
        }
        if obtained_marks > total_marks {
            return Err(RowIssue::invalid_marks(
                line,
                format!("obtained marks {obtained_marks} exceed total marks {total_marks}"),
            ));
        }
        Ok(Self {
            credit_hours,
            total_marks,
            obtained_marks,
            course_code: None,
        })
    }

    pub fn with_course_code(mut self, code: impl Into<String>) -> Self {
        let code = code.into();
        self.course_code = if code.trim().is_empty() {
            None
        } else {
            Some(code.trim().to_string())
        };
        self
    }

    pub fn credit_hours(&self) -> f64 {
        self.credit_hours
    }

    pub fn total_marks(&self) -> f64 {
        self.total_marks
    }

    pub fn obtained_marks(&self) -> f64 {
        self.obtained_marks
    }

    pub fn course_code(&self) -> Option<&str> {
        self.course_code.as_deref()
    }

    /// Unrounded `obtained / total * 100`; always within 0..=100.
    pub fn percentage(&self) -> f64 {
        self.obtained_marks / self.total_marks * 100.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Semester {
    label: String,
    subjects: Vec<SubjectMark>,
}

impl Semester {
    pub fn new(label: impl Into<String>, subjects: Vec<SubjectMark>) -> EngineResult<Self> {
        let label = label.into();
        if subjects.is_empty() {
            return Err(EngineError::EmptySemester {
                labels: vec![label],
                issues: Vec::new(),
            });
        }
        Ok(Self { label, subjects })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn subjects(&self) -> &[SubjectMark] {
        &self.subjects
    }

    pub fn credit_hours(&self) -> f64 {
        self.subjects.iter().map(SubjectMark::credit_hours).sum()
    }
}

/// The normalized input of one computation request.
#[derive(Debug, Clone, PartialEq)]
pub struct AcademicRecord {
    semesters: Vec<Semester>,
}

impl AcademicRecord {
    pub fn new(semesters: Vec<Semester>) -> EngineResult<Self> {
        if semesters.is_empty() {
            return Err(EngineError::EmptyRecord { issues: Vec::new() });
        }
        Ok(Self { semesters })
    }

    pub fn semesters(&self) -> &[Semester] {
        &self.semesters
    }

    pub fn subjects(&self) -> impl Iterator<Item = &SubjectMark> {
        self.semesters.iter().flat_map(|s| s.subjects.iter())
    }

    pub fn credit_hours(&self) -> f64 {
        self.semesters.iter().map(Semester::credit_hours).sum()
    }
}
