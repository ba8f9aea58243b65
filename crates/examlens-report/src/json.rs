//! JSON summary of an analyzed answer sheet.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use examlens_core::aggregate::TopicMastery;
use examlens_core::model::Section;
use examlens_core::report::StudentReport;

use crate::markdown::render_report;

/// Machine-readable summary, with the Markdown report embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub report_id: String,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub total_score: u64,
    pub student_total_score: u64,
    pub overall_percentage: f64,
    pub sections: Vec<SectionSummary>,
    /// Final mastery, in first-seen topic order.
    pub knowledge_mastery: Vec<TopicMastery>,
    pub learning_suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisories: Vec<String>,
    pub markdown_report: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub section_name: String,
    /// Canonical type name, e.g. "单选题".
    pub question_type: String,
    pub total_score: u32,
    pub student_score: u32,
    pub percentage: f64,
    pub item_count: usize,
}

impl From<&Section> for SectionSummary {
    fn from(section: &Section) -> Self {
        Self {
            section_name: section.name.clone(),
            question_type: section.question_type.canonical_name().to_string(),
            total_score: section.total_score,
            student_score: section.student_score,
            percentage: section.percentage(),
            item_count: section.items.len(),
        }
    }
}

/// Build the summary for `report`.
pub fn generate_summary(report: &StudentReport) -> ReportSummary {
    ReportSummary {
        report_id: report.id.to_string(),
        generated_at: report.created_at,
        source: report.source.clone(),
        total_score: report.total_score(),
        student_total_score: report.student_total_score(),
        overall_percentage: report.overall_percentage(),
        sections: report.sections.iter().map(SectionSummary::from).collect(),
        knowledge_mastery: report.mastery.clone(),
        learning_suggestions: report.suggestions.clone(),
        advisories: report.advisories.clone(),
        markdown_report: render_report(report),
    }
}

/// Write the summary to `path` as pretty JSON.
pub fn write_json_summary(report: &StudentReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&generate_summary(report))
        .context("failed to serialize summary")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, json)
        .with_context(|| format!("failed to write summary to {}", path.display()))?;
    Ok(())
}
