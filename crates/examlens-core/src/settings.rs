//! Exam settings extraction from free-form notices.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExtractionError;
use crate::extraction::{Extraction, Extractor, FieldKind, Record, Schema};
use crate::prompts;

/// Settings found in an exam notice. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamSettings {
    /// e.g. "2024-01-15 14:00-16:30"
    pub exam_time: Option<String>,
    /// e.g. "2小时30分钟"
    pub duration: Option<String>,
    /// Minutes before start that entry opens.
    pub early_entry_time: Option<String>,
    /// Minutes after start that entry closes.
    pub late_entry_deadline: Option<String>,
    /// Minutes before the end that submission opens.
    pub submission_time_setting: Option<String>,
    /// e.g. "60%"
    pub passing_score_percentage: Option<String>,
}

const FIELDS: [&str; 6] = [
    "exam_time",
    "duration",
    "early_entry_time",
    "late_entry_deadline",
    "submission_time_setting",
    "passing_score_percentage",
];

fn settings_schema() -> Schema {
    FIELDS
        .into_iter()
        .fold(Schema::new(), |schema, name| schema.field(name, FieldKind::NullableString))
}

fn parse_settings(record: Record) -> Result<ExamSettings, ExtractionError> {
    let field = |name: &str| {
        record
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != "null")
            .map(str::to_string)
    };
    Ok(ExamSettings {
        exam_time: field("exam_time"),
        duration: field("duration"),
        early_entry_time: field("early_entry_time"),
        late_entry_deadline: field("late_entry_deadline"),
        submission_time_setting: field("submission_time_setting"),
        passing_score_percentage: field("passing_score_percentage"),
    })
}

/// Extract settings from `text`. Exhaustion yields all fields absent.
pub async fn extract_settings(extractor: &Extractor, text: &str) -> Extraction<ExamSettings> {
    let prompt = prompts::exam_settings_prompt(text);
    extractor
        .with_system_prompt(prompts::SETTINGS_SYSTEM_PROMPT)
        .extract_with(&prompt, &settings_schema(), parse_settings, ExamSettings::default)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractorConfig;
    use crate::mock::MockOracle;
    use std::sync::Arc;

    #[tokio::test]
    async fn extracts_present_fields_and_nulls() {
        let reply = r#"```json
{
  "exam_time": "2024-01-15 14:00-16:30",
  "duration": "2小时30分钟",
  "early_entry_time": "15",
  "late_entry_deadline": null,
  "submission_time_setting": "",
  "passing_score_percentage": "60%"
}
```"#;
        let oracle = Arc::new(MockOracle::with_fixed_response(reply));
        let extractor = Extractor::new(oracle, ExtractorConfig::default());
        let result = extract_settings(&extractor, "1月15日14点开考，考试150分钟").await;

        assert!(!result.defaulted);
        let s = result.value;
        assert_eq!(s.exam_time.as_deref(), Some("2024-01-15 14:00-16:30"));
        assert_eq!(s.early_entry_time.as_deref(), Some("15"));
        assert_eq!(s.late_entry_deadline, None);
        assert_eq!(s.submission_time_setting, None);
        assert_eq!(s.passing_score_percentage.as_deref(), Some("60%"));
    }

    #[tokio::test]
    async fn missing_field_exhausts_to_empty_settings() {
        let oracle = Arc::new(MockOracle::with_fixed_response(r#"{"exam_time": "明天"}"#));
        let extractor = Extractor::new(oracle.clone(), ExtractorConfig::default());
        let result = extract_settings(&extractor, "明天考试").await;

        assert!(result.defaulted);
        assert_eq!(result.value, ExamSettings::default());
        assert_eq!(oracle.call_count(), 3);
    }
}
