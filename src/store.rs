use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::ClassificationError;
use crate::models::{EnrollmentRecord, JourneyStatus};

/// Supplies enrollment history for classification.
///
/// Malformed rows should surface as [`ClassificationError::DataQuality`] inside
/// the returned `anyhow::Error` so batch callers can flag the student instead
/// of aborting.
#[allow(async_fn_in_trait)]
pub trait EnrollmentSource {
    async fn student_ids(&self) -> anyhow::Result<Vec<Uuid>>;

    /// History for one student, ordered by term start.
    async fn enrollment_history(&self, student_id: Uuid) -> anyhow::Result<Vec<EnrollmentRecord>>;
}

/// Persists classification outcomes.
#[allow(async_fn_in_trait)]
pub trait StatusStore {
    async fn current_status(&self, student_id: Uuid) -> anyhow::Result<Option<JourneyStatus>>;

    /// Idempotent upsert. A successful write also clears any review flag.
    async fn upsert_status(
        &self,
        student_id: Uuid,
        status: JourneyStatus,
        notes: &[String],
        as_of: NaiveDate,
    ) -> anyhow::Result<()>;

    /// Removes any review flag once the student classifies cleanly again.
    async fn clear_review_flag(&self, student_id: Uuid) -> anyhow::Result<()>;

    /// Records the latest failure for manual review, replacing any earlier one.
    async fn flag_for_review(
        &self,
        student_id: Uuid,
        error: &ClassificationError,
    ) -> anyhow::Result<()>;
}
