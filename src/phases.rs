use chrono::NaiveDate;

use crate::error::ClassificationError;
use crate::journey::months_between;
use crate::models::{CompletionStatus, EnrollmentRecord, Phase, ProgramKind};
use crate::policy::ProgressionPolicy;

/// Splits a term-ordered history into phases, opening a new phase each time the
/// program kind changes.
pub fn segment(history: &[EnrollmentRecord]) -> Vec<Phase> {
    let mut phases: Vec<Phase> = Vec::new();

    for record in history {
        let kind = record.program.kind();
        match phases.last_mut() {
            Some(current) if current.kind == kind => {
                current.enrollments.push(record.clone());
                continue;
            }
            _ => {}
        }
        phases.push(Phase {
            kind,
            enrollments: vec![record.clone()],
        });
    }

    phases
}

/// Decides whether a phase completed its program.
///
/// Incomplete phases are `active` only while they are the student's latest
/// phase and have not gone stale; anything else is `dropped`.
pub fn evaluate(
    phase: &Phase,
    is_latest: bool,
    as_of: NaiveDate,
    policy: &ProgressionPolicy,
) -> Result<CompletionStatus, ClassificationError> {
    if is_complete(phase, policy)? {
        return Ok(CompletionStatus::Completed);
    }

    if !is_latest {
        return Ok(CompletionStatus::Dropped);
    }

    let last_end = phase.last_term_end().ok_or_else(|| {
        ClassificationError::DataQuality(format!("{} phase has no term end dates", phase.kind))
    })?;

    if months_between(last_end, as_of) < policy.dropped_after_months {
        Ok(CompletionStatus::Active)
    } else {
        Ok(CompletionStatus::Dropped)
    }
}

fn is_complete(phase: &Phase, policy: &ProgressionPolicy) -> Result<bool, ClassificationError> {
    match phase.kind {
        ProgramKind::Language => {
            let Some(last) = phase.last_enrollment() else {
                return Ok(false);
            };
            let track = last.program.track().ok_or_else(|| {
                ClassificationError::DataQuality(format!(
                    "course {} in a language phase has no language track",
                    last.course_code
                ))
            })?;
            let terminal = policy.terminal_level(track)?;
            Ok(last.course_code.eq_ignore_ascii_case(terminal)
                && last.is_passing(&policy.passing_grades))
        }
        ProgramKind::Bachelor | ProgramKind::Master => {
            let threshold = policy.credit_threshold(phase.kind)?;
            Ok(phase.passing_credits(&policy.passing_grades) >= threshold)
        }
    }
}
