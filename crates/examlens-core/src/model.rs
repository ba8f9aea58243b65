//! Core data model types for examlens.
//!
//! These types represent a segmented answer sheet (sections and items) and the
//! single-question artifacts that go through verification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Question categories.
///
/// The first six are the section types of an answer sheet, in the order the
/// segmenter looks for them. `Calculation` only appears on question artifacts.
///
/// Serializes as snake_case; deserializes from either snake_case or the
/// Chinese name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    FillBlank,
    ShortAnswer,
    Programming,
    Calculation,
}

impl QuestionType {
    /// Section types in document order.
    pub const SECTION_TYPES: [QuestionType; 6] = [
        QuestionType::SingleChoice,
        QuestionType::MultipleChoice,
        QuestionType::TrueFalse,
        QuestionType::FillBlank,
        QuestionType::ShortAnswer,
        QuestionType::Programming,
    ];

    /// The name used on answer sheets and in prompts (e.g. "单选题").
    pub fn canonical_name(self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "单选题",
            QuestionType::MultipleChoice => "多选题",
            QuestionType::TrueFalse => "判断题",
            QuestionType::FillBlank => "填空题",
            QuestionType::ShortAnswer => "简答题",
            QuestionType::Programming => "编程题",
            QuestionType::Calculation => "计算题",
        }
    }

    /// Objective items are scored right-or-wrong.
    pub fn is_objective(self) -> bool {
        matches!(
            self,
            QuestionType::SingleChoice
                | QuestionType::MultipleChoice
                | QuestionType::TrueFalse
                | QuestionType::FillBlank
        )
    }

    /// Subjective items carry partial credit and may span multiple lines.
    pub fn is_subjective(self) -> bool {
        !self.is_objective()
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "单选题" | "single_choice" => Ok(QuestionType::SingleChoice),
            "多选题" | "multiple_choice" => Ok(QuestionType::MultipleChoice),
            "判断题" | "true_false" => Ok(QuestionType::TrueFalse),
            "填空题" | "fill_blank" => Ok(QuestionType::FillBlank),
            "简答题" | "short_answer" => Ok(QuestionType::ShortAnswer),
            "编程题" | "programming" => Ok(QuestionType::Programming),
            "计算题" | "calculation" => Ok(QuestionType::Calculation),
            other => Err(format!("unknown question type: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for QuestionType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One question-type block of an answer sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Which question type this block holds.
    pub question_type: QuestionType,
    /// Name shown in the heading, e.g. "单项选择题".
    pub name: String,
    /// Total possible score (`共N分`), 0 when absent.
    pub total_score: u32,
    /// Score the student earned on the block (`得分：N`), 0 when absent.
    pub student_score: u32,
    /// Items in document order.
    pub items: Vec<Item>,
}

impl Section {
    /// Earned percentage of this section, rounded to 2 decimals.
    pub fn percentage(&self) -> f64 {
        percentage(self.student_score as u64, self.total_score as u64)
    }
}

/// One question inside a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// 1-based position inside the section.
    pub ordinal: u32,
    pub question_type: QuestionType,
    /// Knowledge point. Starts as the first line of the item text and may be
    /// replaced by the labeling step.
    pub topic: String,
    pub score: u32,
    pub student_score: u32,
    pub reference_answer: String,
    pub student_answer: String,
}

impl Item {
    /// Objective correctness: full marks earned.
    pub fn is_correct(&self) -> bool {
        self.student_score == self.score
    }
}

/// A single exam question subject to verification and remediation.
///
/// Field names on the wire follow the oracle schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamArtifact {
    pub question: String,
    pub answer: String,
    pub answer_analysis: String,
    /// Free-form type tag, e.g. "填空题". Unrecognized tags are allowed.
    pub question_type: String,
    #[serde(rename = "knowledge_point", default)]
    pub topic: String,
    #[serde(rename = "knowledge_point_description", default)]
    pub topic_description: String,
    #[serde(default)]
    pub extra_requirement: String,
}

impl ExamArtifact {
    /// Parsed question type, if the tag is one we know.
    pub fn kind(&self) -> Option<QuestionType> {
        self.question_type.parse().ok()
    }

    /// Copy with every field trimmed of surrounding whitespace.
    pub fn trimmed(&self) -> Self {
        Self {
            question: self.question.trim().to_string(),
            answer: self.answer.trim().to_string(),
            answer_analysis: self.answer_analysis.trim().to_string(),
            question_type: self.question_type.trim().to_string(),
            topic: self.topic.trim().to_string(),
            topic_description: self.topic_description.trim().to_string(),
            extra_requirement: self.extra_requirement.trim().to_string(),
        }
    }
}

/// Outcome of one verification step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(rename = "is_compliant")]
    pub compliant: bool,
    /// Present only when the artifact is non-compliant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Verdict {
    pub fn compliant() -> Self {
        Self {
            compliant: true,
            suggestion: None,
        }
    }

    pub fn non_compliant(suggestion: impl Into<String>) -> Self {
        Self {
            compliant: false,
            suggestion: Some(suggestion.into()),
        }
    }
}

/// `earned / possible * 100` rounded to 2 decimals; 0 when nothing is possible.
pub fn percentage(earned: u64, possible: u64) -> f64 {
    if possible == 0 {
        return 0.0;
    }
    (earned as f64 / possible as f64 * 10_000.0).round() / 100.0
}
