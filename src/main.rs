use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use uuid::Uuid;

mod config;
mod correction;
mod db;
mod error;
mod journey;
mod models;
mod phases;
mod policy;
mod property_tests;
mod report;
mod store;
mod telemetry;

use crate::config::AppConfig;
use crate::correction::{correction_note, CorrectionOptions};
use crate::db::PgStore;
use crate::error::ClassificationError;
use crate::policy::ProgressionPolicy;
use crate::store::StatusStore;

#[derive(Parser)]
#[command(name = "journey-classifier")]
#[command(about = "Student academic journey status classifier", long_about = None)]
struct Cli {
    /// JSON progression policy; overrides PROGRESSION_POLICY
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students, terms, courses and enrollments
    Seed,
    /// Import enrollment rows from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Classify a single student's journey
    Classify {
        #[arg(long)]
        student: String,
        /// Classification date (defaults to today)
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Persist the resulting status
        #[arg(long)]
        write: bool,
    },
    /// Re-classify all students and rewrite statuses that changed
    Correct {
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// Generate a markdown status report
    Report {
        #[arg(long, default_value = "journey-report.md")]
        out: PathBuf,
    },
}

async fn reject_student(
    store: &PgStore,
    student_id: Uuid,
    err: ClassificationError,
    write: bool,
) -> anyhow::Result<()> {
    error!(%student_id, code = err.code(), error = %err, "classification failed");
    if write {
        store.flag_for_review(student_id, &err).await?;
    }
    Err(err.into())
}

fn load_policy(path: Option<PathBuf>) -> anyhow::Result<ProgressionPolicy> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading progression policy");
            ProgressionPolicy::from_json_file(&path)
        }
        None => Ok(ProgressionPolicy::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.log_level)?;

    let policy = load_policy(cli.policy.clone().or(config.policy_path.clone()))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url()?)
        .await
        .context("failed to connect to Postgres")?;
    let store = PgStore::new(pool.clone());

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} enrollments from {}.", csv.display());
        }
        Commands::Classify {
            student,
            as_of,
            write,
        } => {
            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            let student_id = db::find_student(&pool, &student)
                .await?
                .with_context(|| format!("no student with number {student}"))?;
            let history = match correction::load_history(&store, student_id).await? {
                Ok(history) => history,
                Err(err) => return reject_student(&store, student_id, err, write).await,
            };

            let classification = match journey::classify(&history, as_of, &policy) {
                Ok(classification) => classification,
                Err(err) => return reject_student(&store, student_id, err, write).await,
            };

            print!("{}", report::render_classification(&student, &classification));

            if write {
                let previous = store.current_status(student_id).await?;
                let mut notes = classification.notes.clone();
                if previous != Some(classification.status) {
                    notes.push(correction_note(previous, classification.status));
                }
                store
                    .upsert_status(student_id, classification.status, &notes, as_of)
                    .await?;
                println!("Status saved.");
            }
        }
        Commands::Correct {
            as_of,
            dry_run,
            limit,
            deadline_secs,
        } => {
            let options = CorrectionOptions {
                as_of: as_of.unwrap_or_else(|| Utc::now().date_naive()),
                dry_run,
                limit,
                deadline: deadline_secs.map(Duration::from_secs),
            };
            let summary = correction::run_correction(&store, &store, &policy, &options).await?;

            println!(
                "Examined {} students: {} corrected, {} unchanged, {} flagged for review.",
                summary.examined, summary.corrected, summary.unchanged, summary.flagged
            );
            for change in summary.changes.iter() {
                println!(
                    "- {}: {}",
                    change.student_id,
                    correction_note(change.previous, change.current)
                );
            }
            if summary.halted_early {
                println!("Stopped before reaching every student; the rest keep their stored status.");
            }
            if dry_run {
                println!("Dry run: no statuses were written.");
            }
        }
        Commands::Report { out } => {
            let statuses = db::fetch_statuses(&pool).await?;
            let flags = db::fetch_review_flags(&pool).await?;
            let report = report::build_report(Utc::now().date_naive(), &statuses, &flags);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
