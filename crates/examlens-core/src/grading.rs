//! Score judgment for a single subjective answer.
//!
//! If no grading criteria are supplied, the oracle designs them first. The
//! judgment itself must return an integer score within `0..=full_score`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{ExtractionError, GradingError};
use crate::extraction::{Extractor, FieldKind, Record, Schema};
use crate::model::QuestionType;
use crate::prompts;

/// Reason attached to the zero score used when judgment cannot complete.
pub const MANUAL_REVIEW_REASON: &str = "系统无法正确解析AI评分结果，该题得分需人工复核。";

/// One answer to grade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingRequest {
    pub question: String,
    /// Parsed from a tag such as "简答题" or "short_answer".
    pub question_type: QuestionType,
    pub standard_answer: String,
    pub student_answer: String,
    pub full_score: u32,
    /// Rubric to grade against; designed by the oracle when absent.
    #[serde(default)]
    pub grading_criteria: Option<String>,
}

/// Outcome of a judgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    pub score: u32,
    #[serde(rename = "sj_reason")]
    pub reason: String,
    /// The rubric actually used.
    pub grading_criteria: String,
    /// `true` when the score is the manual-review fallback.
    pub needs_review: bool,
}

/// Grades subjective answers through an [`Extractor`].
#[derive(Clone)]
pub struct ScoreJudge {
    extractor: Extractor,
}

impl ScoreJudge {
    pub fn new(extractor: Extractor) -> Self {
        Self {
            extractor: extractor.with_system_prompt(prompts::GRADING_SYSTEM_PROMPT),
        }
    }

    /// Grade `request`. Only input validation can fail.
    pub async fn judge(&self, request: &GradingRequest) -> Result<Judgment, GradingError> {
        validate(request)?;

        let grading_criteria = match request
            .grading_criteria
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            Some(criteria) => criteria.to_string(),
            None => self.design_criteria(request).await,
        };

        let prompt = prompts::score_judgment_prompt(
            &request.question,
            request.question_type,
            &request.standard_answer,
            request.full_score,
            &request.student_answer,
            &grading_criteria,
        );
        let schema = Schema::new()
            .field("score", FieldKind::Integer)
            .field("sj_reason", FieldKind::String);
        let full_score = request.full_score;

        let result = self
            .extractor
            .extract_with(
                &prompt,
                &schema,
                |record| parse_judgment(&record, full_score),
                || (0, MANUAL_REVIEW_REASON.to_string()),
            )
            .await;

        let (score, reason) = result.value;
        info!(
            score,
            full_score,
            defaulted = result.defaulted,
            "answer graded"
        );

        Ok(Judgment {
            score,
            reason,
            grading_criteria,
            needs_review: result.defaulted,
        })
    }

    /// Ask the oracle for a rubric, falling back to a generic one.
    pub async fn design_criteria(&self, request: &GradingRequest) -> String {
        let prompt = prompts::grading_criteria_prompt(
            &request.question,
            request.question_type,
            &request.standard_answer,
            request.full_score,
        );
        let schema = Schema::new().field("grading_criteria", FieldKind::String);
        self.extractor
            .extract_with(
                &prompt,
                &schema,
                |record| {
                    record
                        .get("grading_criteria")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string)
                        .ok_or_else(|| ExtractionError::Rejected("empty grading criteria".into()))
                },
                || prompts::generic_grading_criteria(request.full_score),
            )
            .await
            .value
    }
}

fn validate(request: &GradingRequest) -> Result<(), GradingError> {
    if request.full_score == 0 {
        return Err(GradingError::ZeroFullScore);
    }
    match request.question_type {
        QuestionType::FillBlank
        | QuestionType::ShortAnswer
        | QuestionType::Programming
        | QuestionType::Calculation => Ok(()),
        QuestionType::SingleChoice | QuestionType::MultipleChoice | QuestionType::TrueFalse => Err(
            GradingError::UnsupportedQuestionType(request.question_type.to_string()),
        ),
    }
}

fn parse_judgment(record: &Record, full_score: u32) -> Result<(u32, String), ExtractionError> {
    let score = record
        .get("score")
        .and_then(Value::as_i64)
        .ok_or_else(|| ExtractionError::MissingField("score".into()))?;
    if score < 0 || score > full_score as i64 {
        return Err(ExtractionError::Rejected(format!(
            "score {score} outside 0..={full_score}"
        )));
    }
    let reason = record
        .get("sj_reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    Ok((score as u32, reason))
}
