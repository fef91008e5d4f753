//! Property-based tests for journey classification
//!
//! These use proptest to check the decision order across generated histories.

#[cfg(test)]
mod tests {
    use chrono::{Days, NaiveDate};
    use proptest::prelude::*;
    use uuid::Uuid;

    use crate::journey::{classify, months_between};
    use crate::models::{EnrollmentRecord, Grade, JourneyStatus, ProgramType};
    use crate::policy::ProgressionPolicy;

    // ===== STRATEGY HELPERS =====

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).expect("valid date")
    }

    fn any_grade() -> impl Strategy<Value = Grade> {
        prop_oneof![
            Just(Grade::A),
            Just(Grade::B),
            Just(Grade::C),
            Just(Grade::D),
            Just(Grade::F),
            Just(Grade::Cr),
            Just(Grade::Nc),
            Just(Grade::W),
            Just(Grade::I),
        ]
    }

    fn any_program() -> impl Strategy<Value = ProgramType> {
        prop_oneof![
            (1u32..=4).prop_map(|level| ProgramType::Language {
                track: "IEAP".to_string(),
                level,
            }),
            Just(ProgramType::Bachelor),
            Just(ProgramType::Master),
        ]
    }

    /// A single enrollment whose term ended `days_ago` days before `as_of`.
    fn any_enrollment() -> impl Strategy<Value = EnrollmentRecord> {
        (any_program(), any_grade(), 0u32..=5, 0u64..=2000).prop_map(
            |(program, grade, credits, days_ago)| {
                let course_code = match &program {
                    ProgramType::Language { track, level } => format!("{track}-{level}"),
                    ProgramType::Bachelor => "ECON101".to_string(),
                    ProgramType::Master => "MBA500".to_string(),
                };
                EnrollmentRecord {
                    student_id: Uuid::nil(),
                    course_code,
                    credits,
                    program,
                    term_code: format!("T{days_ago}"),
                    term_end: Some(as_of() - Days::new(days_ago)),
                    grade,
                }
            },
        )
    }

    fn any_history() -> impl Strategy<Value = Vec<EnrollmentRecord>> {
        prop::collection::vec(any_enrollment(), 0..30)
    }

    fn policy() -> ProgressionPolicy {
        ProgressionPolicy {
            master_credit_threshold: Some(36),
            ..ProgressionPolicy::default()
        }
    }

    fn completed_bachelor(days_ago: u64) -> Vec<EnrollmentRecord> {
        (0..40)
            .map(|i| EnrollmentRecord {
                student_id: Uuid::nil(),
                course_code: format!("BA{i:03}"),
                credits: 3,
                program: ProgramType::Bachelor,
                term_code: "FINAL".to_string(),
                term_end: Some(as_of() - Days::new(days_ago)),
                grade: Grade::A,
            })
            .collect()
    }

    // ===== PROPERTIES =====

    proptest! {
        #[test]
        fn classification_is_deterministic(history in any_history()) {
            let first = classify(&history, as_of(), &policy());
            let second = classify(&history, as_of(), &policy());
            prop_assert_eq!(first, second);
        }

        #[test]
        fn empty_history_is_always_unknown(days in 0u64..20_000) {
            let when = NaiveDate::from_ymd_opt(1990, 1, 1).expect("valid date") + Days::new(days);
            let result = classify(&[], when, &policy()).expect("empty history classifies");
            prop_assert_eq!(result.status, JourneyStatus::Unknown);
        }

        #[test]
        fn completed_bachelor_graduates_regardless_of_recency(
            days_ago in 0u64..5000,
            prefix in prop::collection::vec(any_enrollment(), 0..10),
        ) {
            let mut history = prefix;
            history.extend(completed_bachelor(days_ago));
            let result = classify(&history, as_of(), &policy()).expect("history classifies");
            prop_assert_eq!(result.status, JourneyStatus::Graduated);
        }

        #[test]
        fn recent_history_without_degree_is_active(
            mut history in prop::collection::vec(any_enrollment(), 1..20),
            recent_days in 0u64..150,
        ) {
            for record in history.iter_mut() {
                if matches!(record.program, ProgramType::Bachelor | ProgramType::Master) {
                    record.grade = Grade::F;
                }
            }
            let last = history.len() - 1;
            history[last].term_end = Some(as_of() - Days::new(recent_days));

            let result = classify(&history, as_of(), &policy()).expect("history classifies");
            prop_assert!(result.months_since_last_term.unwrap_or_default() < 6);
            prop_assert_eq!(result.status, JourneyStatus::Active);
        }

        #[test]
        fn months_between_never_overshoots(a in 0u64..10_000, b in 0u64..10_000) {
            let base = NaiveDate::from_ymd_opt(2000, 1, 1).expect("valid date");
            let (from, to) = (base + Days::new(a), base + Days::new(b));
            let months = months_between(from, to);
            prop_assert!(months >= 0);
            if months > 0 {
                prop_assert!(from + chrono::Months::new(months as u32) <= to);
            }
            prop_assert!(from + chrono::Months::new(months as u32 + 1) > to || to <= from);
        }
    }
}
