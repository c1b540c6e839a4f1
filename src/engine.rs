use std::time::Duration;

use crate::error::EngineResult;
use crate::gpa::{cumulative_gpa, semester_gpa, CgpaPolicy};
use crate::parser::{parse_csv, ParsedRecord};
use crate::report::{self, CgpaReport};
use crate::resolver::{resolve, TranscriptSource};
use crate::scale::GradingScale;

/// Per-semester GPAs, then the cumulative figure, then the report.
pub fn compute_report(
    scale: &GradingScale,
    policy: CgpaPolicy,
    parsed: ParsedRecord,
) -> EngineResult<CgpaReport> {
    let ParsedRecord { record, issues } = parsed;
    let gpas = record
        .semesters()
        .iter()
        .map(|s| semester_gpa(scale, s))
        .collect::<EngineResult<Vec<_>>>()?;
    let cgpa = cumulative_gpa(scale, &record, policy)?;
    report::build(&record, &gpas, cgpa, policy, issues)
}

/// Manual entry path.
pub fn process_multiseme_csv_data(
    scale: &GradingScale,
    policy: CgpaPolicy,
    csv: &str,
) -> EngineResult<CgpaReport> {
    let parsed = parse_csv(csv)?;
    compute_report(scale, policy, parsed)
}

/// Lookup path.
pub async fn process_student_results(
    scale: &GradingScale,
    policy: CgpaPolicy,
    source: &dyn TranscriptSource,
    reg_number: &str,
    timeout: Duration,
) -> EngineResult<CgpaReport> {
    let parsed = resolve(source, reg_number, timeout).await?;
    compute_report(scale, policy, parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, RowIssueKind};
    use crate::gpa::round_2_decimals;
    use crate::parser::{Cell, TranscriptPayload, TranscriptSemester, TranscriptSubject};
    use async_trait::async_trait;

    const POLICY: CgpaPolicy = CgpaPolicy::CreditWeighted;

    struct FixedSource(TranscriptPayload);

    #[async_trait]
    impl TranscriptSource for FixedSource {
        async fn fetch(&self, _reg: &str, _timeout: Duration) -> EngineResult<TranscriptPayload> {
            Ok(self.0.clone())
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    #[test]
    fn two_subject_semester_scenario() {
        let csv = "CH,TM,OM,Semester\n3,100,90,Semester 1\n4,100,70,Semester 1";
        let report =
            process_multiseme_csv_data(&GradingScale::default(), POLICY, csv).expect("report");
        assert_eq!(report.semesters.len(), 1);
        assert_eq!(report.semesters[0].semester_label, "Semester 1");
        assert_eq!(report.semesters[0].gpa, 3.43);
        assert_eq!(report.cgpa, 3.43);
        assert_eq!(report.total_credit_hours, 7.0);
        assert!(report.skipped_rows.is_empty());
    }

    #[test]
    fn lone_malformed_row_empties_its_semester() {
        let csv = "CH,TM,OM,Semester\nabc,100,90,Semester 1";
        match process_multiseme_csv_data(&GradingScale::default(), POLICY, csv) {
            Err(EngineError::EmptySemester { labels, issues }) => {
                assert_eq!(labels, vec!["Semester 1".to_string()]);
                assert_eq!(issues[0].kind, RowIssueKind::MalformedRow);
            }
            other => panic!("expected EmptySemester, got {other:?}"),
        }
    }

    #[test]
    fn malformed_row_is_skipped_when_semester_has_others() {
        let csv = "CH,TM,OM,Semester\nabc,100,90,Semester 1\n3,100,90,Semester 1";
        let report =
            process_multiseme_csv_data(&GradingScale::default(), POLICY, csv).expect("report");
        assert_eq!(report.cgpa, 4.0);
        assert_eq!(report.skipped_rows.len(), 1);
        assert_eq!(report.skipped_rows[0].line, 2);
    }

    #[test]
    fn huge_numbers_are_input_errors_not_internal_ones() {
        let scale = GradingScale::default();
        let csv = "CH,TM,OM,Semester\n1e308,100,90,Semester 1\n1e308,100,90,Semester 1";
        let err = process_multiseme_csv_data(&scale, POLICY, csv).unwrap_err();
        assert_eq!(err.code(), "empty_semester");
        assert!(!err.is_internal());

        let csv = "CH,TM,OM,Semester\n1e308,100,90,Semester 1\n3,100,90,Semester 1";
        let report = process_multiseme_csv_data(&scale, POLICY, csv).expect("report");
        assert_eq!(report.cgpa, 4.0);
        assert_eq!(report.skipped_rows[0].kind, RowIssueKind::InvalidMarks);
    }

    #[test]
    fn header_only_input_is_empty_record() {
        let err = process_multiseme_csv_data(&GradingScale::default(), POLICY, "CH,TM,OM,Semester")
            .unwrap_err();
        assert_eq!(err.code(), "empty_record");
    }

    #[test]
    fn report_cgpa_is_credit_weighted_not_mean_of_semesters() {
        // Semester 1 carries 9 credit hours at 4.0, Semester 2 one hour at 0.0.
        let csv = "CH,TM,OM,Semester\n\
                   3,100,95,Semester 1\n\
                   3,100,88,Semester 1\n\
                   3,100,90,Semester 1\n\
                   1,100,30,Semester 2\n";
        let report =
            process_multiseme_csv_data(&GradingScale::default(), POLICY, csv).expect("report");
        let semester_mean = round_2_decimals(
            report.semesters.iter().map(|s| s.gpa).sum::<f64>() / report.semesters.len() as f64,
        );
        assert_eq!(semester_mean, 2.0);
        assert_eq!(report.cgpa, 3.6);
        assert_ne!(report.cgpa, semester_mean);
    }

    #[test]
    fn semester_order_follows_input() {
        let csv = "CH,TM,OM,Semester\n3,100,60,Semester 3\n3,100,90,Semester 1\n3,100,75,Semester 2";
        let report =
            process_multiseme_csv_data(&GradingScale::default(), POLICY, csv).expect("report");
        let labels: Vec<&str> = report
            .semesters
            .iter()
            .map(|s| s.semester_label.as_str())
            .collect();
        assert_eq!(labels, vec!["Semester 3", "Semester 1", "Semester 2"]);
    }

    #[tokio::test]
    async fn lookup_path_computes_the_same_figures() {
        let subject = |code: &str, ch: f64, om: f64| TranscriptSubject {
            course_code: code.to_string(),
            credit_hours: Cell::Number(ch),
            total_marks: Some(Cell::Number(100.0)),
            obtained_marks: Cell::Number(om),
        };
        let source = FixedSource(TranscriptPayload {
            semesters: vec![TranscriptSemester {
                label: "Semester 1".to_string(),
                subjects: vec![subject("CS-101", 3.0, 90.0), subject("CS-102", 4.0, 70.0)],
            }],
        });
        let report = process_student_results(
            &GradingScale::default(),
            POLICY,
            &source,
            "2019-ag-1234",
            Duration::from_secs(1),
        )
        .await
        .expect("report");
        assert_eq!(report.cgpa, 3.43);
        assert_eq!(report.semesters[0].gpa, 3.43);
    }

    #[tokio::test]
    async fn empty_registration_number_is_rejected() {
        let source = FixedSource(TranscriptPayload::default());
        let err = process_student_results(
            &GradingScale::default(),
            POLICY,
            &source,
            "",
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "invalid_registration_number");
    }
}
