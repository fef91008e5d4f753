use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ClassificationError;
use crate::journey;
use crate::models::{EnrollmentRecord, JourneyStatus, StatusChange};
use crate::policy::ProgressionPolicy;
use crate::store::{EnrollmentSource, StatusStore};

#[derive(Debug, Clone)]
pub struct CorrectionOptions {
    pub as_of: NaiveDate,
    pub dry_run: bool,
    /// Maximum number of students to examine.
    pub limit: Option<usize>,
    /// Wall-clock budget; students not reached keep their stored status.
    pub deadline: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectionSummary {
    pub examined: usize,
    pub corrected: usize,
    pub unchanged: usize,
    pub flagged: usize,
    pub halted_early: bool,
    pub changes: Vec<StatusChange>,
}

/// Re-classifies every student and rewrites statuses that no longer match.
///
/// Classification failures are flagged for review and the run moves on to the
/// next student. Storage failures abort the run; students already written stay
/// written.
pub async fn run_correction<S, T>(
    source: &S,
    store: &T,
    policy: &ProgressionPolicy,
    options: &CorrectionOptions,
) -> anyhow::Result<CorrectionSummary>
where
    S: EnrollmentSource,
    T: StatusStore,
{
    policy.validate()?;

    let started = Instant::now();
    let student_ids = source.student_ids().await?;
    let mut summary = CorrectionSummary::default();

    info!(
        students = student_ids.len(),
        as_of = %options.as_of,
        dry_run = options.dry_run,
        "starting journey status correction"
    );

    for student_id in student_ids {
        if options.limit.is_some_and(|limit| summary.examined >= limit) {
            summary.halted_early = true;
            break;
        }
        if options
            .deadline
            .is_some_and(|deadline| started.elapsed() >= deadline)
        {
            warn!(examined = summary.examined, "deadline reached, halting correction");
            summary.halted_early = true;
            break;
        }

        summary.examined += 1;

        match correct_student(source, store, policy, options, student_id).await? {
            Outcome::Corrected(change) => {
                summary.corrected += 1;
                summary.changes.push(change);
            }
            Outcome::Unchanged => summary.unchanged += 1,
            Outcome::Flagged => summary.flagged += 1,
        }
    }

    info!(
        examined = summary.examined,
        corrected = summary.corrected,
        unchanged = summary.unchanged,
        flagged = summary.flagged,
        halted_early = summary.halted_early,
        "journey status correction finished"
    );

    Ok(summary)
}

/// Fetches one student's history. Malformed rows come back in the inner
/// `Err` so callers can flag the student; anything else propagates.
pub async fn load_history<S: EnrollmentSource>(
    source: &S,
    student_id: Uuid,
) -> anyhow::Result<Result<Vec<EnrollmentRecord>, ClassificationError>> {
    match source.enrollment_history(student_id).await {
        Ok(history) => Ok(Ok(history)),
        Err(err) => err.downcast::<ClassificationError>().map(Err),
    }
}

enum Outcome {
    Corrected(StatusChange),
    Unchanged,
    Flagged,
}

async fn correct_student<S, T>(
    source: &S,
    store: &T,
    policy: &ProgressionPolicy,
    options: &CorrectionOptions,
    student_id: Uuid,
) -> anyhow::Result<Outcome>
where
    S: EnrollmentSource,
    T: StatusStore,
{
    let history = match load_history(source, student_id).await? {
        Ok(history) => history,
        Err(err) => return flag(store, options, student_id, &err).await,
    };

    let classification = match journey::classify(&history, options.as_of, policy) {
        Ok(classification) => classification,
        Err(err) => return flag(store, options, student_id, &err).await,
    };

    let previous = store.current_status(student_id).await?;
    if previous == Some(classification.status) {
        debug!(%student_id, status = %classification.status, "status unchanged");
        if !options.dry_run {
            store.clear_review_flag(student_id).await?;
        }
        return Ok(Outcome::Unchanged);
    }

    let mut notes = classification.notes;
    notes.push(correction_note(previous, classification.status));

    if !options.dry_run {
        store
            .upsert_status(student_id, classification.status, &notes, options.as_of)
            .await?;
    }

    info!(
        %student_id,
        from = previous.map(|s| s.as_str()).unwrap_or("none"),
        to = %classification.status,
        dry_run = options.dry_run,
        "journey status corrected"
    );

    Ok(Outcome::Corrected(StatusChange {
        student_id,
        previous,
        current: classification.status,
    }))
}

async fn flag<T: StatusStore>(
    store: &T,
    options: &CorrectionOptions,
    student_id: Uuid,
    error: &ClassificationError,
) -> anyhow::Result<Outcome> {
    warn!(%student_id, code = error.code(), error = %error, "classification failed, flagging for review");
    if !options.dry_run {
        store.flag_for_review(student_id, error).await?;
    }
    Ok(Outcome::Flagged)
}

pub fn correction_note(previous: Option<JourneyStatus>, current: JourneyStatus) -> String {
    match previous {
        Some(previous) => format!("status corrected from {previous} to {current}"),
        None => format!("status initialised as {current}"),
    }
}
