use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{Classification, JourneyStatus, ReviewFlag, StatusSummary, StoredStatus};

pub fn summarize_by_status(statuses: &[StoredStatus]) -> Vec<StatusSummary> {
    let mut summaries: Vec<StatusSummary> = JourneyStatus::ALL
        .into_iter()
        .map(|status| StatusSummary {
            status,
            count: statuses.iter().filter(|s| s.status == status).count(),
        })
        .filter(|summary| summary.count > 0)
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count));
    summaries
}

pub fn build_report(
    generated_on: NaiveDate,
    statuses: &[StoredStatus],
    flags: &[ReviewFlag],
) -> String {
    let summaries = summarize_by_status(statuses);
    let mut output = String::new();

    let _ = writeln!(output, "# Student Journey Status Report");
    let _ = writeln!(
        output,
        "Generated on {} for {} classified students",
        generated_on,
        statuses.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No students have been classified yet.");
    } else {
        for summary in summaries.iter() {
            let share = summary.count as f64 * 100.0 / statuses.len() as f64;
            let _ = writeln!(
                output,
                "- {}: {} students ({:.1}%)",
                summary.status, summary.count, share
            );
        }
    }

    let corrected: Vec<&StoredStatus> = statuses
        .iter()
        .filter(|s| s.notes.iter().any(|note| note.starts_with("status corrected")))
        .collect();

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Corrections");

    if corrected.is_empty() {
        let _ = writeln!(output, "No statuses have been corrected.");
    } else {
        for status in corrected.iter().take(10) {
            let note = status
                .notes
                .iter()
                .rev()
                .find(|note| note.starts_with("status corrected"))
                .map(String::as_str)
                .unwrap_or_default();
            let _ = writeln!(
                output,
                "- {} ({}) as of {}: {}",
                status.full_name, status.student_number, status.as_of, note
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Flagged For Review");

    if flags.is_empty() {
        let _ = writeln!(output, "No students need manual review.");
    } else {
        for flag in flags.iter() {
            let _ = writeln!(
                output,
                "- {} [{}] on {}: {}",
                flag.student_number,
                flag.error_code,
                flag.flagged_at.date_naive(),
                flag.message
            );
        }
    }

    output
}

/// Plain-text rendering of a single classification for the terminal.
pub fn render_classification(student_number: &str, classification: &Classification) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "{student_number}: {}", classification.status);
    if let Some(months) = classification.months_since_last_term {
        let _ = writeln!(output, "  months since last term: {months}");
    }

    for (index, evaluated) in classification.phases.iter().enumerate() {
        let phase = &evaluated.phase;
        let first = phase
            .enrollments
            .first()
            .map(|e| e.term_code.as_str())
            .unwrap_or("?");
        let last = phase
            .last_enrollment()
            .map(|e| e.term_code.as_str())
            .unwrap_or("?");
        let _ = writeln!(
            output,
            "  phase {}: {} {} ({} enrollments, {} to {})",
            index + 1,
            phase.kind,
            evaluated.status.label(),
            phase.enrollments.len(),
            first,
            last
        );
    }

    for (from, to) in classification.transitions() {
        let _ = writeln!(output, "  transition: {from} -> {to}");
    }

    for note in classification.notes.iter() {
        let _ = writeln!(output, "  note: {note}");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn stored(number: &str, status: JourneyStatus, notes: &[&str]) -> StoredStatus {
        StoredStatus {
            student_number: number.to_string(),
            full_name: format!("Student {number}"),
            status,
            notes: notes.iter().map(|n| n.to_string()).collect(),
            as_of: NaiveDate::from_ymd_opt(2026, 6, 1).expect("valid date"),
            classified_at: Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn summary_orders_by_count_and_skips_empty_statuses() {
        let statuses = vec![
            stored("S1", JourneyStatus::Active, &[]),
            stored("S2", JourneyStatus::Graduated, &[]),
            stored("S3", JourneyStatus::Active, &[]),
        ];
        let summaries = summarize_by_status(&statuses);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].status, JourneyStatus::Active);
        assert_eq!(summaries[0].count, 2);
    }

    #[test]
    fn report_lists_corrections_and_flags() {
        let statuses = vec![
            stored(
                "S1001",
                JourneyStatus::Graduated,
                &[
                    "completed language track IEAP at IEAP-4",
                    "status corrected from DROPPED to GRADUATED",
                ],
            ),
            stored("S1004", JourneyStatus::Active, &["status initialised as ACTIVE"]),
        ];
        let flags = vec![ReviewFlag {
            student_number: "S1005".to_string(),
            error_code: "DATA_QUALITY".to_string(),
            message: "term 2026SU has no term end date".to_string(),
            flagged_at: Utc.with_ymd_and_hms(2026, 6, 2, 8, 0, 0).unwrap(),
        }];

        let report = build_report(
            NaiveDate::from_ymd_opt(2026, 6, 2).unwrap(),
            &statuses,
            &flags,
        );

        assert!(report.contains("- GRADUATED: 1 students (50.0%)"));
        assert!(report.contains(
            "- Student S1001 (S1001) as of 2026-06-01: status corrected from DROPPED to GRADUATED"
        ));
        assert!(!report.contains("S1004) as of"));
        assert!(report.contains("- S1005 [DATA_QUALITY] on 2026-06-02"));
    }

    #[test]
    fn renders_phases_and_transitions() {
        use crate::models::{
            CompletionStatus, EnrollmentRecord, EvaluatedPhase, Grade, Phase, ProgramKind,
            ProgramType,
        };

        let enrollment = |course: &str, program: ProgramType, term: &str| EnrollmentRecord {
            student_id: Uuid::nil(),
            course_code: course.to_string(),
            credits: 3,
            program,
            term_code: term.to_string(),
            term_end: NaiveDate::from_ymd_opt(2025, 5, 8),
            grade: Grade::A,
        };
        let language = ProgramType::Language {
            track: "IEAP".to_string(),
            level: 4,
        };
        let classification = Classification {
            status: JourneyStatus::Active,
            phases: vec![
                EvaluatedPhase {
                    phase: Phase {
                        kind: ProgramKind::Language,
                        enrollments: vec![enrollment("IEAP-4", language, "2025SP")],
                    },
                    status: CompletionStatus::Completed,
                },
                EvaluatedPhase {
                    phase: Phase {
                        kind: ProgramKind::Bachelor,
                        enrollments: vec![
                            enrollment("BUS101", ProgramType::Bachelor, "2025FA"),
                            enrollment("BUS102", ProgramType::Bachelor, "2026SP"),
                        ],
                    },
                    status: CompletionStatus::Active,
                },
            ],
            notes: vec!["completed language track IEAP at IEAP-4 then began bachelor".to_string()],
            months_since_last_term: Some(2),
        };

        let text = render_classification("S1004", &classification);
        assert!(text.starts_with("S1004: ACTIVE\n"));
        assert!(text.contains("  phase 2: bachelor active (2 enrollments, 2025FA to 2026SP)"));
        assert!(text.contains("  transition: language -> bachelor"));
    }

    #[test]
    fn empty_report_has_placeholders() {
        let report = build_report(NaiveDate::from_ymd_opt(2026, 6, 2).unwrap(), &[], &[]);
        assert!(report.contains("No students have been classified yet."));
        assert!(report.contains("No students need manual review."));
    }
}
