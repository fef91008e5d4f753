use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ClassificationError;

/// Final grade recorded against an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
    /// Credit awarded without a letter grade.
    Cr,
    /// No credit.
    Nc,
    /// Withdrawn.
    W,
    /// Incomplete.
    I,
    /// In progress.
    Ip,
    /// Audit.
    Au,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
            Grade::Cr => "CR",
            Grade::Nc => "NC",
            Grade::W => "W",
            Grade::I => "I",
            Grade::Ip => "IP",
            Grade::Au => "AU",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = ClassificationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Grade::A),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            "D" => Ok(Grade::D),
            "F" => Ok(Grade::F),
            "CR" => Ok(Grade::Cr),
            "NC" => Ok(Grade::Nc),
            "W" => Ok(Grade::W),
            "I" => Ok(Grade::I),
            "IP" => Ok(Grade::Ip),
            "AU" => Ok(Grade::Au),
            other => Err(ClassificationError::DataQuality(format!(
                "unrecognized grade '{other}'"
            ))),
        }
    }
}

/// Program a course belongs to, as labelled on the course record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProgramType {
    /// Language-program level such as `IEAP-4`.
    Language { track: String, level: u32 },
    Bachelor,
    Master,
}

impl ProgramType {
    pub fn kind(&self) -> ProgramKind {
        match self {
            ProgramType::Language { .. } => ProgramKind::Language,
            ProgramType::Bachelor => ProgramKind::Bachelor,
            ProgramType::Master => ProgramKind::Master,
        }
    }

    pub fn track(&self) -> Option<&str> {
        match self {
            ProgramType::Language { track, .. } => Some(track),
            _ => None,
        }
    }
}

impl fmt::Display for ProgramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramType::Language { track, level } => write!(f, "{track}-{level}"),
            ProgramType::Bachelor => f.write_str("bachelor"),
            ProgramType::Master => f.write_str("master"),
        }
    }
}

impl FromStr for ProgramType {
    type Err = ClassificationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "bachelor" | "ba" | "bs" => return Ok(ProgramType::Bachelor),
            "master" | "ma" | "ms" => return Ok(ProgramType::Master),
            _ => {}
        }

        let invalid = || {
            ClassificationError::DataQuality(format!("unrecognized program type '{trimmed}'"))
        };

        let (track, level) = trimmed.rsplit_once('-').ok_or_else(invalid)?;
        if track.is_empty() || !track.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid());
        }
        let level = level.parse::<u32>().map_err(|_| invalid())?;

        Ok(ProgramType::Language {
            track: track.to_ascii_uppercase(),
            level,
        })
    }
}

/// Program type at phase granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Language,
    Bachelor,
    Master,
}

impl ProgramKind {
    pub fn is_degree(&self) -> bool {
        matches!(self, ProgramKind::Bachelor | ProgramKind::Master)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProgramKind::Language => "language",
            ProgramKind::Bachelor => "bachelor",
            ProgramKind::Master => "master",
        }
    }
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRecord {
    pub student_id: Uuid,
    pub course_code: String,
    pub credits: u32,
    pub program: ProgramType,
    pub term_code: String,
    pub term_end: Option<NaiveDate>,
    pub grade: Grade,
}

impl EnrollmentRecord {
    pub fn is_passing(&self, passing: &BTreeSet<Grade>) -> bool {
        passing.contains(&self.grade)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Completed,
    Active,
    Dropped,
}

impl CompletionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CompletionStatus::Completed => "completed",
            CompletionStatus::Active => "active",
            CompletionStatus::Dropped => "dropped",
        }
    }
}

/// Contiguous run of enrollments sharing one program kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub kind: ProgramKind,
    pub enrollments: Vec<EnrollmentRecord>,
}

impl Phase {
    pub fn last_enrollment(&self) -> Option<&EnrollmentRecord> {
        self.enrollments.last()
    }

    /// Latest term end in the phase. Callers validate end dates beforehand.
    pub fn last_term_end(&self) -> Option<NaiveDate> {
        self.enrollments.iter().filter_map(|e| e.term_end).max()
    }

    pub fn passing_credits(&self, passing: &BTreeSet<Grade>) -> u32 {
        self.enrollments
            .iter()
            .filter(|e| e.is_passing(passing))
            .map(|e| e.credits)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatedPhase {
    pub phase: Phase,
    pub status: CompletionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JourneyStatus {
    Active,
    Inactive,
    Graduated,
    Transitioned,
    Dropped,
    Unknown,
}

impl JourneyStatus {
    pub const ALL: [JourneyStatus; 6] = [
        JourneyStatus::Active,
        JourneyStatus::Inactive,
        JourneyStatus::Graduated,
        JourneyStatus::Transitioned,
        JourneyStatus::Dropped,
        JourneyStatus::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JourneyStatus::Active => "ACTIVE",
            JourneyStatus::Inactive => "INACTIVE",
            JourneyStatus::Graduated => "GRADUATED",
            JourneyStatus::Transitioned => "TRANSITIONED",
            JourneyStatus::Dropped => "DROPPED",
            JourneyStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for JourneyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JourneyStatus {
    type Err = ClassificationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        JourneyStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                ClassificationError::DataQuality(format!("unrecognized journey status '{value}'"))
            })
    }
}

/// Result of one classification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: JourneyStatus,
    pub phases: Vec<EvaluatedPhase>,
    pub notes: Vec<String>,
    pub months_since_last_term: Option<i32>,
}

impl Classification {
    /// Completed phases that were followed by a later program.
    pub fn transitions(&self) -> Vec<(ProgramKind, ProgramKind)> {
        self.phases
            .windows(2)
            .filter(|pair| pair[0].status == CompletionStatus::Completed)
            .map(|pair| (pair[0].phase.kind, pair[1].phase.kind))
            .collect()
    }
}

/// Status row as persisted by the status store.
#[derive(Debug, Clone)]
pub struct StoredStatus {
    pub student_number: String,
    pub full_name: String,
    pub status: JourneyStatus,
    pub notes: Vec<String>,
    pub as_of: NaiveDate,
    pub classified_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReviewFlag {
    pub student_number: String,
    pub error_code: String,
    pub message: String,
    pub flagged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub student_id: Uuid,
    pub previous: Option<JourneyStatus>,
    pub current: JourneyStatus,
}

#[derive(Debug, Clone)]
pub struct StatusSummary {
    pub status: JourneyStatus,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_language_levels() {
        let program: ProgramType = "IEAP-4".parse().expect("language level parses");
        assert_eq!(
            program,
            ProgramType::Language {
                track: "IEAP".to_string(),
                level: 4
            }
        );
        assert_eq!(program.kind(), ProgramKind::Language);
        assert_eq!(program.to_string(), "IEAP-4");
    }

    #[test]
    fn parses_degree_programs_case_insensitively() {
        assert_eq!("Bachelor".parse::<ProgramType>().unwrap(), ProgramType::Bachelor);
        assert_eq!(" master ".parse::<ProgramType>().unwrap(), ProgramType::Master);
    }

    #[test]
    fn rejects_unknown_program_labels() {
        for label in ["", "doctorate", "IEAP", "IEAP-x", "-4", "IE4P-2"] {
            let err = label.parse::<ProgramType>().unwrap_err();
            assert_eq!(err.code(), "DATA_QUALITY", "label {label:?}");
        }
    }

    #[test]
    fn grades_round_trip_through_labels() {
        assert_eq!("cr".parse::<Grade>().unwrap(), Grade::Cr);
        assert_eq!(Grade::Ip.to_string(), "IP");
        assert!("A+".parse::<Grade>().is_err());
    }

    #[test]
    fn journey_status_parses_stored_labels() {
        assert_eq!(
            "transitioned".parse::<JourneyStatus>().unwrap(),
            JourneyStatus::Transitioned
        );
        assert!("LOST".parse::<JourneyStatus>().is_err());
    }

    #[test]
    fn passing_credits_ignore_failed_courses() {
        let student_id = Uuid::new_v4();
        let record = |grade, credits| EnrollmentRecord {
            student_id,
            course_code: "ECON101".to_string(),
            credits,
            program: ProgramType::Bachelor,
            term_code: "2024FA".to_string(),
            term_end: NaiveDate::from_ymd_opt(2024, 12, 15),
            grade,
        };
        let phase = Phase {
            kind: ProgramKind::Bachelor,
            enrollments: vec![record(Grade::A, 3), record(Grade::F, 3), record(Grade::Cr, 2)],
        };
        let passing: BTreeSet<Grade> = [Grade::A, Grade::Cr].into_iter().collect();
        assert_eq!(phase.passing_credits(&passing), 5);
    }
}
