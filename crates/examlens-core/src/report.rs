//! Student report type with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::TopicMastery;
use crate::model::{percentage, Section};

/// Everything produced by analyzing one answer sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Where the answer sheet came from (file name), if known.
    #[serde(default)]
    pub source: Option<String>,
    /// Segmented sections with final topic labels.
    pub sections: Vec<Section>,
    /// Final per-topic mastery, in first-seen topic order.
    pub mastery: Vec<TopicMastery>,
    /// Learning suggestions (at most 5).
    pub suggestions: Vec<String>,
    /// Notes about degraded steps, e.g. a defaulted oracle call.
    #[serde(default)]
    pub advisories: Vec<String>,
    /// Total wall-clock duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
}

impl StudentReport {
    /// Sum of section totals.
    pub fn total_score(&self) -> u64 {
        self.sections.iter().map(|s| u64::from(s.total_score)).sum()
    }

    /// Sum of section scores earned.
    pub fn student_total_score(&self) -> u64 {
        self.sections.iter().map(|s| u64::from(s.student_score)).sum()
    }

    /// Earned percentage over the whole sheet, 2 decimals; 0 when the total is 0.
    pub fn overall_percentage(&self) -> f64 {
        percentage(self.student_total_score(), self.total_score())
    }

    /// Whether any oracle-backed step fell back to its default.
    pub fn is_degraded(&self) -> bool {
        !self.advisories.is_empty()
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: StudentReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionType;

    fn make_report(scores: &[(u32, u32)]) -> StudentReport {
        StudentReport {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            source: Some("sheet.md".into()),
            sections: scores
                .iter()
                .map(|&(total, earned)| Section {
                    question_type: QuestionType::SingleChoice,
                    name: "单选题".into(),
                    total_score: total,
                    student_score: earned,
                    items: vec![],
                })
                .collect(),
            mastery: vec![TopicMastery {
                topic: "列表".into(),
                mastery: 50.0,
                objective_items: 2,
                subjective_items: 0,
            }],
            suggestions: vec!["多练习列表操作".into()],
            advisories: vec![],
            duration_ms: 12,
        }
    }

    #[test]
    fn totals_and_percentage() {
        let report = make_report(&[(10, 8), (20, 11)]);
        assert_eq!(report.total_score(), 30);
        assert_eq!(report.student_total_score(), 19);
        assert_eq!(report.overall_percentage(), 63.33);
    }

    #[test]
    fn totals_near_u32_max_do_not_wrap() {
        let report = make_report(&[(u32::MAX, u32::MAX), (u32::MAX, 0)]);
        assert_eq!(report.total_score(), 2 * u32::MAX as u64);
        assert_eq!(report.student_total_score(), u32::MAX as u64);
        assert_eq!(report.overall_percentage(), 50.0);
    }

    #[test]
    fn empty_total_is_zero_percent() {
        let report = make_report(&[]);
        assert_eq!(report.overall_percentage(), 0.0);
        assert!(!report.is_degraded());
    }

    #[test]
    fn json_roundtrip() {
        let report = make_report(&[(10, 8)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");

        report.save_json(&path).unwrap();
        let loaded = StudentReport::load_json(&path).unwrap();

        assert_eq!(loaded.id, report.id);
        assert_eq!(loaded.sections, report.sections);
        assert_eq!(loaded.mastery, report.mastery);
        assert_eq!(loaded.suggestions, report.suggestions);
    }

    #[test]
    fn load_missing_file_has_context() {
        let err = StudentReport::load_json(Path::new("/nonexistent/report.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read report"));
    }
}
