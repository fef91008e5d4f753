use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::ClassificationError;
use crate::models::{
    EnrollmentRecord, Grade, JourneyStatus, ProgramType, ReviewFlag, StoredStatus,
};
use crate::store::{EnrollmentSource, StatusStore};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_student(pool: &PgPool, student_number: &str, full_name: &str) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO journey.students (id, student_number, full_name)
        VALUES ($1, $2, $3)
        ON CONFLICT (student_number) DO UPDATE
        SET full_name = EXCLUDED.full_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_number)
    .bind(full_name)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

async fn upsert_term(
    pool: &PgPool,
    code: &str,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO journey.terms (code, start_date, end_date)
        VALUES ($1, $2, $3)
        ON CONFLICT (code) DO UPDATE
        SET start_date = EXCLUDED.start_date,
            end_date = COALESCE(EXCLUDED.end_date, journey.terms.end_date)
        "#,
    )
    .bind(code)
    .bind(start_date)
    .bind(end_date)
    .execute(pool)
    .await?;
    Ok(())
}

async fn upsert_course(
    pool: &PgPool,
    code: &str,
    credits: u32,
    program: &ProgramType,
) -> anyhow::Result<()> {
    let credits = i32::try_from(credits).context("course credits out of range")?;
    sqlx::query(
        r#"
        INSERT INTO journey.courses (code, credits, program_type)
        VALUES ($1, $2, $3)
        ON CONFLICT (code) DO UPDATE
        SET credits = EXCLUDED.credits, program_type = EXCLUDED.program_type
        "#,
    )
    .bind(code)
    .bind(credits)
    .bind(program.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns `true` when a new row was written.
async fn insert_enrollment(
    pool: &PgPool,
    student_id: Uuid,
    course_code: &str,
    term_code: &str,
    grade: Grade,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO journey.enrollments
        (id, student_id, course_code, term_code, grade, source_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(course_code)
    .bind(term_code)
    .bind(grade.as_str())
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Spring and fall terms from 2019SP through 2026SP, plus an open 2026SU.
fn seed_terms() -> anyhow::Result<Vec<(String, NaiveDate, Option<NaiveDate>)>> {
    let date = |y: i32, m: u32, d: u32| NaiveDate::from_ymd_opt(y, m, d).context("invalid date");
    let mut terms = Vec::new();

    for year in 2019..=2026 {
        terms.push((format!("{year}SP"), date(year, 1, 13)?, Some(date(year, 5, 8)?)));
        if year < 2026 {
            terms.push((format!("{year}FA"), date(year, 8, 26)?, Some(date(year, 12, 13)?)));
        }
    }
    terms.push(("2026SU".to_string(), date(2026, 6, 1)?, None));

    Ok(terms)
}

/// Three-credit bachelor courses spread evenly over `terms`, all passing.
fn bachelor_rows(terms: &[&str], per_term: usize) -> Vec<(String, String, Grade)> {
    terms
        .iter()
        .enumerate()
        .flat_map(|(i, term)| {
            (0..per_term).map(move |j| {
                (
                    term.to_string(),
                    format!("BUS{}", 101 + i * per_term + j),
                    Grade::B,
                )
            })
        })
        .collect()
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    for (code, start, end) in seed_terms()? {
        upsert_term(pool, &code, start, end).await?;
    }

    for level in 1..=4 {
        let program = ProgramType::Language {
            track: "IEAP".to_string(),
            level,
        };
        upsert_course(pool, &program.to_string(), 0, &program).await?;
    }
    for n in 101..=140 {
        upsert_course(pool, &format!("BUS{n}"), 3, &ProgramType::Bachelor).await?;
    }

    let students: Vec<(&str, &str, Vec<(String, String, Grade)>)> = vec![
        (
            "S1001",
            "Avery Lee",
            ["2020SP", "2020FA", "2021SP", "2021FA"]
                .iter()
                .enumerate()
                .map(|(i, term)| (term.to_string(), format!("IEAP-{}", i + 1), Grade::Cr))
                .collect(),
        ),
        (
            "S1002",
            "Jules Moreno",
            bachelor_rows(
                &["2019FA", "2020SP", "2020FA", "2021SP", "2021FA", "2022SP", "2022FA", "2023SP"],
                5,
            ),
        ),
        (
            "S1003",
            "Kiara Patel",
            bachelor_rows(&["2020FA", "2021SP", "2021FA", "2022SP"], 5),
        ),
        ("S1004", "Noor Haddad", {
            let mut rows = vec![
                ("2024FA".to_string(), "IEAP-3".to_string(), Grade::Cr),
                ("2025SP".to_string(), "IEAP-4".to_string(), Grade::Cr),
            ];
            rows.extend(bachelor_rows(&["2025FA", "2026SP"], 3));
            rows
        }),
        (
            "S1005",
            "Tomas Silva",
            vec![("2026SU".to_string(), "BUS101".to_string(), Grade::Ip)],
        ),
    ];

    for (student_number, full_name, enrollments) in students {
        let student_id = upsert_student(pool, student_number, full_name).await?;
        for (term, course, grade) in enrollments {
            let source_key = format!("seed-{student_number}-{term}-{course}");
            insert_enrollment(pool, student_id, &course, &term, grade, &source_key).await?;
        }
    }

    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_number: String,
        full_name: String,
        course_code: String,
        credits: u32,
        program_type: String,
        term_code: String,
        term_start: NaiveDate,
        term_end: Option<NaiveDate>,
        grade: String,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed CSV row at line {line}"))?;
        let program: ProgramType = row
            .program_type
            .parse()
            .with_context(|| format!("line {line}"))?;
        let grade: Grade = row.grade.parse().with_context(|| format!("line {line}"))?;

        let student_id = upsert_student(pool, &row.student_number, &row.full_name).await?;
        upsert_term(pool, &row.term_code, row.term_start, row.term_end).await?;
        upsert_course(pool, &row.course_code, row.credits, &program).await?;

        let source_key = row.source_key.unwrap_or_else(|| {
            format!(
                "import-{}-{}-{}",
                row.student_number, row.term_code, row.course_code
            )
        });

        if insert_enrollment(
            pool,
            student_id,
            &row.course_code,
            &row.term_code,
            grade,
            &source_key,
        )
        .await?
        {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn find_student(pool: &PgPool, student_number: &str) -> anyhow::Result<Option<Uuid>> {
    let row = sqlx::query("SELECT id FROM journey.students WHERE student_number = $1")
        .bind(student_number)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| row.get("id")))
}

pub async fn fetch_enrollments(
    pool: &PgPool,
    student_id: Uuid,
) -> anyhow::Result<Vec<EnrollmentRecord>> {
    let rows = sqlx::query(
        "SELECT e.student_id, e.course_code, c.credits, c.program_type, \
         e.term_code, t.end_date, e.grade \
         FROM journey.enrollments e \
         JOIN journey.courses c ON c.code = e.course_code \
         JOIN journey.terms t ON t.code = e.term_code \
         WHERE e.student_id = $1 \
         ORDER BY t.start_date, t.code, e.course_code",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let course_code: String = row.get("course_code");
        let credits: i32 = row.get("credits");
        let program: String = row.get("program_type");
        let grade: String = row.get("grade");

        records.push(EnrollmentRecord {
            student_id: row.get("student_id"),
            credits: u32::try_from(credits).map_err(|_| {
                ClassificationError::DataQuality(format!(
                    "course {course_code} has negative credits ({credits})"
                ))
            })?,
            course_code,
            program: program.parse()?,
            term_code: row.get("term_code"),
            term_end: row.get("end_date"),
            grade: grade.parse()?,
        });
    }

    Ok(records)
}

pub async fn fetch_statuses(pool: &PgPool) -> anyhow::Result<Vec<StoredStatus>> {
    let rows = sqlx::query(
        "SELECT st.student_number, st.full_name, s.status, s.notes, \
         s.as_of, s.classified_at \
         FROM journey.statuses s \
         JOIN journey.students st ON st.id = s.student_id \
         ORDER BY s.classified_at DESC, st.student_number",
    )
    .fetch_all(pool)
    .await?;

    let mut statuses = Vec::with_capacity(rows.len());
    for row in rows {
        let status: String = row.get("status");
        statuses.push(StoredStatus {
            student_number: row.get("student_number"),
            full_name: row.get("full_name"),
            status: status.parse()?,
            notes: row.get("notes"),
            as_of: row.get("as_of"),
            classified_at: row.get("classified_at"),
        });
    }

    Ok(statuses)
}

pub async fn fetch_review_flags(pool: &PgPool) -> anyhow::Result<Vec<ReviewFlag>> {
    let rows = sqlx::query(
        "SELECT st.student_number, f.error_code, f.message, f.flagged_at \
         FROM journey.review_flags f \
         JOIN journey.students st ON st.id = f.student_id \
         ORDER BY f.flagged_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ReviewFlag {
            student_number: row.get("student_number"),
            error_code: row.get("error_code"),
            message: row.get("message"),
            flagged_at: row.get("flagged_at"),
        })
        .collect())
}

/// Postgres-backed enrollment source and status store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl EnrollmentSource for PgStore {
    async fn student_ids(&self) -> anyhow::Result<Vec<Uuid>> {
        let rows = sqlx::query("SELECT id FROM journey.students ORDER BY student_number")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }

    async fn enrollment_history(&self, student_id: Uuid) -> anyhow::Result<Vec<EnrollmentRecord>> {
        fetch_enrollments(&self.pool, student_id).await
    }
}

impl StatusStore for PgStore {
    async fn current_status(&self, student_id: Uuid) -> anyhow::Result<Option<JourneyStatus>> {
        let row = sqlx::query("SELECT status FROM journey.statuses WHERE student_id = $1")
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let status: String = row.get("status");
                Ok(Some(status.parse()?))
            }
            None => Ok(None),
        }
    }

    async fn upsert_status(
        &self,
        student_id: Uuid,
        status: JourneyStatus,
        notes: &[String],
        as_of: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO journey.statuses (student_id, status, notes, as_of, classified_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (student_id) DO UPDATE
            SET status = EXCLUDED.status,
                notes = EXCLUDED.notes,
                as_of = EXCLUDED.as_of,
                classified_at = now()
            "#,
        )
        .bind(student_id)
        .bind(status.as_str())
        .bind(notes.to_vec())
        .bind(as_of)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM journey.review_flags WHERE student_id = $1")
            .bind(student_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn clear_review_flag(&self, student_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM journey.review_flags WHERE student_id = $1")
            .bind(student_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn flag_for_review(
        &self,
        student_id: Uuid,
        error: &ClassificationError,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO journey.review_flags (student_id, error_code, message, flagged_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (student_id) DO UPDATE
            SET error_code = EXCLUDED.error_code,
                message = EXCLUDED.message,
                flagged_at = now()
            "#,
        )
        .bind(student_id)
        .bind(error.code())
        .bind(error.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn seed_terms_cover_fall_and_spring() {
        let terms = seed_terms().expect("seed terms build");
        assert_eq!(terms.first().map(|t| t.0.as_str()), Some("2019SP"));
        assert!(terms.iter().any(|t| t.0 == "2025FA"));
        assert!(!terms.iter().any(|t| t.0 == "2026FA"));

        let open: Vec<_> = terms.iter().filter(|t| t.2.is_none()).collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].0, "2026SU");
    }

    #[test]
    fn bachelor_rows_number_courses_sequentially() {
        let rows = bachelor_rows(&["2020FA", "2021SP"], 2);
        let courses: Vec<_> = rows.iter().map(|r| r.1.as_str()).collect();
        assert_eq!(courses, vec!["BUS101", "BUS102", "BUS103", "BUS104"]);
        assert_eq!(rows[2].0, "2021SP");
    }

    #[test]
    fn seed_term_dates_are_ordered() {
        for (code, start, end) in seed_terms().expect("seed terms build") {
            if let Some(end) = end {
                assert!(start < end, "term {code}");
                assert_eq!(start.year(), end.year(), "term {code}");
            }
        }
    }
}
