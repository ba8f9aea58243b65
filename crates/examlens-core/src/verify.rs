//! Bounded verify-then-fix loop for single exam questions.
//!
//! ```text
//! Verifying ──compliant or attempts == max──▶ Done
//!     │ non-compliant
//!     ▼
//!  Fixing ──new artifact, attempts += 1──▶ Verifying
//! ```
//!
//! The loop never fails. An oracle that cannot be parsed yields a
//! non-compliant verdict on verification and the unchanged artifact on fix.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::ExtractionError;
use crate::extraction::{Extractor, FieldKind, Record, Schema};
use crate::model::{ExamArtifact, Verdict};
use crate::prompts;

/// Suggestion attached to the verdict used when verification cannot complete.
pub const UNVERIFIED_SUGGESTION: &str = "系统无法正确解析AI响应，请手动检查题目合规性。";

/// Settings for [`QuestionVerifier`].
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Upper bound on verification steps. 0 is treated as 1.
    pub max_fix_attempts: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self { max_fix_attempts: 3 }
    }
}

/// Result of [`QuestionVerifier::verify_and_fix`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutcome {
    /// Last artifact produced (the input when no fix ran).
    pub artifact: ExamArtifact,
    /// Every verdict, in order.
    pub verdicts: Vec<Verdict>,
    pub verifications: u32,
    pub fixes: u32,
    /// Whether the last verdict was compliant.
    pub compliant: bool,
}

#[derive(Debug)]
enum State {
    Verifying(ExamArtifact),
    Fixing(ExamArtifact, Verdict),
    Done(ExamArtifact),
}

fn verdict_schema() -> Schema {
    Schema::new()
        .field("is_compliant", FieldKind::Bool)
        .field("suggestion", FieldKind::NullableString)
}

fn artifact_schema() -> Schema {
    [
        "question",
        "answer",
        "answer_analysis",
        "question_type",
        "knowledge_point",
        "knowledge_point_description",
        "extra_requirement",
    ]
    .into_iter()
    .fold(Schema::new(), |schema, name| schema.field(name, FieldKind::String))
}

/// Verifies and remediates exam questions through an [`Extractor`].
#[derive(Clone)]
pub struct QuestionVerifier {
    verifier: Extractor,
    fixer: Extractor,
    config: VerifyConfig,
}

impl QuestionVerifier {
    pub fn new(extractor: Extractor, config: VerifyConfig) -> Self {
        Self {
            verifier: extractor.with_system_prompt(prompts::VERIFY_SYSTEM_PROMPT),
            fixer: extractor.with_system_prompt(prompts::FIX_SYSTEM_PROMPT),
            config,
        }
    }

    /// One verification step.
    pub async fn verify(&self, artifact: &ExamArtifact) -> Verdict {
        let prompt = prompts::verification_prompt(artifact);
        self.verifier
            .extract_with(&prompt, &verdict_schema(), parse_verdict, || {
                Verdict::non_compliant(UNVERIFIED_SUGGESTION)
            })
            .await
            .value
    }

    /// One fix step. Returns `artifact` unchanged when `verdict` is compliant
    /// or the oracle cannot produce a valid replacement.
    pub async fn fix(&self, artifact: &ExamArtifact, verdict: &Verdict) -> ExamArtifact {
        if verdict.compliant {
            return artifact.clone();
        }
        let suggestion = verdict.suggestion.as_deref().unwrap_or_default();
        let prompt = prompts::fix_prompt(artifact, suggestion);
        self.fixer
            .extract_with(&prompt, &artifact_schema(), parse_artifact, || artifact.clone())
            .await
            .value
    }

    /// Run the loop until compliant or the bound is reached.
    pub async fn verify_and_fix(&self, artifact: ExamArtifact) -> VerifyOutcome {
        let max = self.config.max_fix_attempts.max(1);
        let mut attempt = 1;
        let mut verdicts = Vec::new();
        let mut fixes = 0;
        let mut state = State::Verifying(artifact);

        let artifact = loop {
            state = match state {
                State::Verifying(artifact) => {
                    let verdict = self.verify(&artifact).await;
                    debug!(attempt, compliant = verdict.compliant, "verification step");
                    verdicts.push(verdict.clone());
                    if verdict.compliant || attempt >= max {
                        State::Done(artifact)
                    } else {
                        State::Fixing(artifact, verdict)
                    }
                }
                State::Fixing(artifact, verdict) => {
                    let fixed = self.fix(&artifact, &verdict).await;
                    fixes += 1;
                    attempt += 1;
                    State::Verifying(fixed)
                }
                State::Done(artifact) => break artifact,
            };
        };

        let compliant = verdicts.last().is_some_and(|v| v.compliant);
        info!(
            verifications = verdicts.len(),
            fixes, compliant, "question verification finished"
        );

        VerifyOutcome {
            artifact,
            verifications: verdicts.len() as u32,
            verdicts,
            fixes,
            compliant,
        }
    }
}

fn parse_verdict(record: Record) -> Result<Verdict, ExtractionError> {
    let compliant = record
        .get("is_compliant")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let suggestion = record
        .get("suggestion")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    if compliant {
        Ok(Verdict::compliant())
    } else {
        Ok(Verdict::non_compliant(
            suggestion.unwrap_or_else(|| "题目不合规，但未给出具体建议。".to_string()),
        ))
    }
}

fn parse_artifact(record: Record) -> Result<ExamArtifact, ExtractionError> {
    let artifact: ExamArtifact = serde_json::from_value(Value::Object(record))
        .map_err(|e| ExtractionError::Rejected(e.to_string()))?;
    let artifact = artifact.trimmed();
    if artifact.question.is_empty() {
        return Err(ExtractionError::Rejected("question is empty".into()));
    }
    Ok(artifact)
}

/// JSON form of an artifact as the oracle sees it.
pub fn artifact_to_json(artifact: &ExamArtifact) -> Value {
    json!({
        "question": artifact.question,
        "answer": artifact.answer,
        "answer_analysis": artifact.answer_analysis,
        "question_type": artifact.question_type,
        "knowledge_point": artifact.topic,
        "knowledge_point_description": artifact.topic_description,
        "extra_requirement": artifact.extra_requirement,
    })
}
