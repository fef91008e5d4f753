use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::ClassificationError;
use crate::models::{Grade, ProgramKind};

/// Institutional rules the classifier evaluates against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionPolicy {
    /// Terminal course code per language track, e.g. `IEAP -> IEAP-4`.
    pub language_terminal_levels: BTreeMap<String, String>,
    pub bachelor_credit_threshold: Option<u32>,
    pub master_credit_threshold: Option<u32>,
    pub passing_grades: BTreeSet<Grade>,
    pub inactive_after_months: i32,
    pub dropped_after_months: i32,
}

impl Default for ProgressionPolicy {
    fn default() -> Self {
        Self {
            language_terminal_levels: BTreeMap::from([("IEAP".to_string(), "IEAP-4".to_string())]),
            bachelor_credit_threshold: Some(120),
            master_credit_threshold: None,
            passing_grades: [Grade::A, Grade::B, Grade::C, Grade::D, Grade::Cr]
                .into_iter()
                .collect(),
            inactive_after_months: 6,
            dropped_after_months: 24,
        }
    }
}

impl ProgressionPolicy {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read policy file {}", path.display()))?;
        let policy: ProgressionPolicy = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse policy file {}", path.display()))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), ClassificationError> {
        if self.passing_grades.is_empty() {
            return Err(ClassificationError::Configuration(
                "passing grade set is empty".to_string(),
            ));
        }
        if self.inactive_after_months <= 0 {
            return Err(ClassificationError::Configuration(
                "inactive_after_months must be positive".to_string(),
            ));
        }
        if self.inactive_after_months >= self.dropped_after_months {
            return Err(ClassificationError::Configuration(format!(
                "inactive_after_months ({}) must be below dropped_after_months ({})",
                self.inactive_after_months, self.dropped_after_months
            )));
        }
        for (kind, threshold) in [
            (ProgramKind::Bachelor, self.bachelor_credit_threshold),
            (ProgramKind::Master, self.master_credit_threshold),
        ] {
            if threshold == Some(0) {
                return Err(ClassificationError::Configuration(format!(
                    "{kind} credit threshold must be positive"
                )));
            }
        }
        Ok(())
    }

    pub fn terminal_level(&self, track: &str) -> Result<&str, ClassificationError> {
        self.language_terminal_levels
            .get(track)
            .map(String::as_str)
            .ok_or_else(|| {
                ClassificationError::Configuration(format!(
                    "no terminal level configured for language track '{track}'"
                ))
            })
    }

    pub fn credit_threshold(&self, kind: ProgramKind) -> Result<u32, ClassificationError> {
        let threshold = match kind {
            ProgramKind::Bachelor => self.bachelor_credit_threshold,
            ProgramKind::Master => self.master_credit_threshold,
            ProgramKind::Language => None,
        };
        threshold.ok_or_else(|| {
            ClassificationError::Configuration(format!("no credit threshold configured for {kind}"))
        })
    }
}
