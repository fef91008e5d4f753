use thiserror::Error;

/// Failures raised while classifying a single student's journey.
///
/// Callers running batches are expected to catch these per student and flag the
/// record for review; neither variant is ever turned into a fallback status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    /// A required enrollment field is missing or malformed.
    #[error("data quality error: {0}")]
    DataQuality(String),

    /// Policy data needed to evaluate a phase is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ClassificationError {
    pub fn code(&self) -> &'static str {
        match self {
            ClassificationError::DataQuality(_) => "DATA_QUALITY",
            ClassificationError::Configuration(_) => "CONFIGURATION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            ClassificationError::DataQuality("x".into()).code(),
            "DATA_QUALITY"
        );
        assert_eq!(
            ClassificationError::Configuration("x".into()).code(),
            "CONFIGURATION"
        );
    }

    #[test]
    fn display_includes_detail() {
        let err = ClassificationError::DataQuality("term 2024FA has no end date".into());
        assert_eq!(
            err.to_string(),
            "data quality error: term 2024FA has no end date"
        );
    }
}
