use chrono::{Datelike, Months, NaiveDate};

use crate::error::ClassificationError;
use crate::models::{
    Classification, CompletionStatus, EnrollmentRecord, EvaluatedPhase, JourneyStatus,
    ProgramKind,
};
use crate::phases;
use crate::policy::ProgressionPolicy;

/// Classifies one student's journey from their term-ordered enrollment history.
///
/// Degree completion is checked before recency, so a finished bachelor or
/// master phase is never reported as dropped however long ago it ended.
pub fn classify(
    history: &[EnrollmentRecord],
    as_of: NaiveDate,
    policy: &ProgressionPolicy,
) -> Result<Classification, ClassificationError> {
    let latest_end = latest_term_end(history)?;
    let segments = phases::segment(history);

    let Some(latest_end) = latest_end else {
        return Ok(Classification {
            status: JourneyStatus::Unknown,
            phases: Vec::new(),
            notes: vec!["no enrollment history".to_string()],
            months_since_last_term: None,
        });
    };

    let last_index = segments.len().saturating_sub(1);
    let mut evaluated = Vec::with_capacity(segments.len());
    for (index, phase) in segments.into_iter().enumerate() {
        let status = phases::evaluate(&phase, index == last_index, as_of, policy)?;
        evaluated.push(EvaluatedPhase { phase, status });
    }

    let elapsed = months_between(latest_end, as_of);
    let mut notes = phase_notes(&evaluated);

    let status = decide(&evaluated, elapsed, policy, &mut notes);

    Ok(Classification {
        status,
        phases: evaluated,
        notes,
        months_since_last_term: Some(elapsed),
    })
}

fn decide(
    phases: &[EvaluatedPhase],
    elapsed: i32,
    policy: &ProgressionPolicy,
    notes: &mut Vec<String>,
) -> JourneyStatus {
    let degree_completed = phases
        .iter()
        .any(|p| p.phase.kind.is_degree() && p.status == CompletionStatus::Completed);

    if degree_completed {
        if elapsed >= policy.inactive_after_months {
            notes.push(format!(
                "degree completion takes precedence over {elapsed} months without enrollment"
            ));
        }
        return JourneyStatus::Graduated;
    }

    if elapsed < policy.inactive_after_months {
        return JourneyStatus::Active;
    }
    if elapsed < policy.dropped_after_months {
        return JourneyStatus::Inactive;
    }

    let finished_language = phases.last().is_some_and(|p| {
        p.phase.kind == ProgramKind::Language && p.status == CompletionStatus::Completed
    });

    if finished_language {
        notes.push(format!(
            "language program completed; {elapsed} months since last term treated as departure"
        ));
        JourneyStatus::Graduated
    } else {
        notes.push(format!("no enrollment for {elapsed} months without completion"));
        JourneyStatus::Dropped
    }
}

fn phase_notes(phases: &[EvaluatedPhase]) -> Vec<String> {
    let mut notes = Vec::new();

    for (index, evaluated) in phases.iter().enumerate() {
        if evaluated.status != CompletionStatus::Completed {
            continue;
        }

        let completed = match evaluated.phase.last_enrollment() {
            Some(last) if evaluated.phase.kind == ProgramKind::Language => format!(
                "completed language track {} at {}",
                last.program.track().unwrap_or("?"),
                last.course_code
            ),
            _ => format!("completed {} program", evaluated.phase.kind),
        };

        match phases.get(index + 1) {
            Some(next) => notes.push(format!("{completed} then began {}", next.phase.kind)),
            None => notes.push(completed),
        }
    }

    notes
}

/// Latest term end across the history, rejecting records without one.
fn latest_term_end(history: &[EnrollmentRecord]) -> Result<Option<NaiveDate>, ClassificationError> {
    let mut latest: Option<NaiveDate> = None;

    for record in history {
        let end = record.term_end.ok_or_else(|| {
            ClassificationError::DataQuality(format!(
                "student {} course {} term {} has no term end date",
                record.student_id, record.course_code, record.term_code
            ))
        })?;
        latest = Some(latest.map_or(end, |current| current.max(end)));
    }

    Ok(latest)
}

/// Whole calendar months from `from` to `to`. A `to` on or before `from`
/// counts as zero.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    if to <= from {
        return 0;
    }

    let mut months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    while months > 0
        && from
            .checked_add_months(Months::new(months as u32))
            .map_or(true, |shifted| shifted > to)
    {
        months -= 1;
    }
    months
}
