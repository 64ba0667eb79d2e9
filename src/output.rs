//! Result types returned to callers of the batch API.

use crate::schema::CardRecord;
use serde::{Deserialize, Serialize};

/// Per-card result of the pipeline.
///
/// `Failure` means the card never produced a record (upload or VLM call
/// failed). An unreadable card that the VLM *did* answer for is a `Success`
/// whose record satisfies [`CardRecord::is_unreadable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Success { filename: String, record: CardRecord },
    Failure { filename: String, reason: String },
}

impl ExtractionOutcome {
    pub fn filename(&self) -> &str {
        match self {
            Self::Success { filename, .. } | Self::Failure { filename, .. } => filename,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn record(&self) -> Option<&CardRecord> {
        match self {
            Self::Success { record, .. } => Some(record),
            Self::Failure { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { reason, .. } => Some(reason),
        }
    }
}

/// Aggregate statistics for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total_cards: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Successes whose record only carries a diagnostic, judged by
    /// [`CardRecord::is_unreadable`]: any success with nothing but a
    /// `company_name` lands here, including a card that really shows only a
    /// company name.
    pub unreadable: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

/// Outcomes in input order plus batch statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOutput {
    pub outcomes: Vec<ExtractionOutcome>,
    pub stats: ScanStats,
}

impl ScanOutput {
    /// Records of every successful card, in input order, paired with the filename.
    pub fn records(&self) -> impl Iterator<Item = (&str, &CardRecord)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.record().map(|r| (o.filename(), r)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serialises_with_status_tag() {
        let ok = ExtractionOutcome::Success {
            filename: "a.jpg".into(),
            record: CardRecord::unreadable("blurry"),
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["record"]["company_name"], "blurry");

        let err = ExtractionOutcome::Failure {
            filename: "b.jpg".into(),
            reason: "upload failed".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["reason"], "upload failed");
    }

    #[test]
    fn accessors() {
        let err = ExtractionOutcome::Failure {
            filename: "b.jpg".into(),
            reason: "timeout".into(),
        };
        assert!(!err.is_success());
        assert_eq!(err.filename(), "b.jpg");
        assert_eq!(err.failure_reason(), Some("timeout"));
        assert!(err.record().is_none());
    }

    #[test]
    fn records_skips_failures() {
        let out = ScanOutput {
            outcomes: vec![
                ExtractionOutcome::Success {
                    filename: "a.jpg".into(),
                    record: CardRecord::default(),
                },
                ExtractionOutcome::Failure {
                    filename: "b.jpg".into(),
                    reason: "x".into(),
                },
            ],
            stats: ScanStats::default(),
        };
        let names: Vec<&str> = out.records().map(|(f, _)| f).collect();
        assert_eq!(names, vec!["a.jpg"]);
    }
}
