//! Answer-sheet analysis pipeline.
//!
//! segment → label topics (oracle) → preliminary mastery → refine mastery
//! (oracle, optional) → learning suggestions (oracle) → [`StudentReport`].
//!
//! Each oracle step degrades independently: a defaulted step keeps the
//! deterministic value and records an advisory on the report.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::aggregate::{self, TopicGroup, TopicMastery};
use crate::error::ExtractionError;
use crate::extraction::{Extractor, FieldKind, Record, Schema};
use crate::model::Section;
use crate::parser;
use crate::prompts::{self, LabelingLine, RefinementTopic, SectionRate};
use crate::report::StudentReport;

/// Settings for [`ExamAnalyzer`].
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Ask the oracle to re-score the preliminary mastery.
    pub refine_mastery: bool,
    /// Prompts longer than this many characters are truncated.
    pub prompt_char_limit: usize,
    /// Suggestions kept in the report.
    pub max_suggestions: usize,
    /// Topics listed in the suggestion prompt.
    pub max_prompt_topics: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            refine_mastery: true,
            prompt_char_limit: 8000,
            max_suggestions: 5,
            max_prompt_topics: 30,
        }
    }
}

pub const LABELING_ADVISORY: &str = "知识点提取失败，已使用题目原文作为知识点。";
pub const REFINEMENT_ADVISORY: &str = "掌握程度精细评估失败，已使用初步计算结果。";
pub const SUGGESTION_ADVISORY: &str = "学习建议生成失败，已根据薄弱知识点给出默认建议。";
pub const NO_SECTIONS_ADVISORY: &str = "未识别到任何题型部分，请检查答题卡格式。";

/// Analyzes answer sheets. One instance can serve many documents; it holds no
/// per-document state.
#[derive(Clone)]
pub struct ExamAnalyzer {
    extractor: Extractor,
    config: AnalyzerConfig,
}

impl ExamAnalyzer {
    pub fn new(extractor: Extractor, config: AnalyzerConfig) -> Self {
        Self {
            extractor: extractor.with_system_prompt(prompts::ANALYSIS_SYSTEM_PROMPT),
            config,
        }
    }

    /// Run the whole pipeline on one answer sheet. Never fails.
    #[instrument(skip_all, fields(chars = document.chars().count()))]
    pub async fn analyze(&self, document: &str) -> StudentReport {
        let start = Instant::now();
        let mut advisories = Vec::new();

        let mut sections = parser::segment(document);
        if sections.is_empty() {
            warn!("no sections recognized");
            advisories.push(NO_SECTIONS_ADVISORY.to_string());
        }
        for warning in parser::check_sections(&sections) {
            debug!(%warning, "answer sheet check");
        }

        if let Some(note) = self.label_topics(&mut sections).await {
            advisories.push(note);
        }

        let groups = aggregate::group_by_topic(&sections);
        let preliminary = aggregate::aggregate(&groups);
        let (mastery, note) = self.refine_mastery(&groups, preliminary).await;
        advisories.extend(note);

        let (suggestions, note) = self.suggest(&sections, &mastery).await;
        advisories.extend(note);

        info!(
            sections = sections.len(),
            topics = mastery.len(),
            degraded = !advisories.is_empty(),
            "answer sheet analyzed"
        );

        StudentReport {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            source: None,
            sections,
            mastery,
            suggestions,
            advisories,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    // -----------------------------------------------------------------------
    // Topic labeling
    // -----------------------------------------------------------------------

    /// Replace each item's topic with an oracle-chosen label. Items are
    /// numbered across the whole document so ordinals do not collide between
    /// sections. Returns an advisory when the oracle step was defaulted.
    pub async fn label_topics(&self, sections: &mut [Section]) -> Option<String> {
        let lines: Vec<LabelingLine<'_>> = sections
            .iter()
            .flat_map(|s| s.items.iter())
            .enumerate()
            .map(|(i, item)| LabelingLine {
                seq: i + 1,
                question_type: item.question_type,
                text: &item.topic,
            })
            .collect();
        if lines.is_empty() {
            return None;
        }

        let prompt = prompts::limit_prompt(
            &prompts::knowledge_point_prompt(&lines),
            self.config.prompt_char_limit,
        );
        let schema = Schema::new().field("knowledge_points", FieldKind::Object);
        let result = self
            .extractor
            .extract_with(&prompt, &schema, parse_labels, HashMap::new)
            .await;

        let labels = result.value;
        let items = sections.iter_mut().flat_map(|s| s.items.iter_mut());
        for (seq, item) in (1usize..).zip(items) {
            if let Some(label) = labels.get(&seq) {
                item.topic = label.clone();
            }
        }

        result.defaulted.then(|| LABELING_ADVISORY.to_string())
    }

    // -----------------------------------------------------------------------
    // Mastery refinement
    // -----------------------------------------------------------------------

    /// Best-effort oracle re-scoring. A topic whose refined value is missing
    /// or not a number in 0..=100 keeps its preliminary value.
    pub async fn refine_mastery(
        &self,
        groups: &[TopicGroup<'_>],
        preliminary: Vec<TopicMastery>,
    ) -> (Vec<TopicMastery>, Option<String>) {
        if !self.config.refine_mastery || preliminary.is_empty() {
            return (preliminary, None);
        }

        let topics: Vec<RefinementTopic<'_>> = groups
            .iter()
            .zip(&preliminary)
            .map(|(group, pre)| RefinementTopic {
                topic: &group.topic,
                preliminary: pre.mastery,
                item_lines: group
                    .items
                    .iter()
                    .map(|item| {
                        let verdict = if item.question_type.is_objective() {
                            if item.is_correct() {
                                "（答对）"
                            } else {
                                "（答错）"
                            }
                        } else {
                            ""
                        };
                        format!(
                            "{} 第{}题：得分 {}/{}{verdict}",
                            item.question_type, item.ordinal, item.student_score, item.score
                        )
                    })
                    .collect(),
            })
            .collect();

        let prompt = prompts::limit_prompt(
            &prompts::mastery_refinement_prompt(&topics),
            self.config.prompt_char_limit,
        );
        let schema = Schema::new().field("mastery", FieldKind::Object);
        let result = self
            .extractor
            .extract_with(&prompt, &schema, parse_mastery_map, HashMap::new)
            .await;

        let refined = result.value;
        let mastery = preliminary
            .into_iter()
            .map(|mut record| {
                match refined.get(&clean_label(&record.topic)) {
                    Some(&value) => record.mastery = value,
                    None => debug!(topic = %record.topic, "keeping preliminary mastery"),
                }
                record
            })
            .collect();

        (mastery, result.defaulted.then(|| REFINEMENT_ADVISORY.to_string()))
    }

    // -----------------------------------------------------------------------
    // Learning suggestions
    // -----------------------------------------------------------------------

    /// Suggestions from the oracle, or deterministic ones built from the
    /// weakest topics.
    pub async fn suggest(
        &self,
        sections: &[Section],
        mastery: &[TopicMastery],
    ) -> (Vec<String>, Option<String>) {
        let max = self.config.max_suggestions;
        if mastery.is_empty() {
            return (default_suggestions(mastery, max), None);
        }

        let mut sorted: Vec<&TopicMastery> = mastery.iter().collect();
        sorted.sort_by(|a, b| a.mastery.total_cmp(&b.mastery));
        let listed: Vec<(String, f64, String)> = sorted
            .iter()
            .take(self.config.max_prompt_topics)
            .map(|t| (clean_label(&t.topic), t.mastery, t.level().to_string()))
            .collect();
        let listed_refs: Vec<(&str, f64, &str)> = listed
            .iter()
            .map(|(topic, m, status)| (topic.as_str(), *m, status.as_str()))
            .collect();
        let omitted = sorted.len().saturating_sub(self.config.max_prompt_topics);

        let rates: Vec<SectionRate<'_>> = sections
            .iter()
            .map(|section| SectionRate {
                name: &section.name,
                objective: section.question_type.is_objective(),
                percentage: section.percentage(),
            })
            .collect();

        let prompt = prompts::limit_prompt(
            &prompts::learning_suggestions_prompt(&listed_refs, omitted, &rates),
            self.config.prompt_char_limit,
        );
        let schema = Schema::new().field("suggestions", FieldKind::Array);
        let result = self
            .extractor
            .extract_with(
                &prompt,
                &schema,
                |record| parse_suggestions(&record, max),
                || default_suggestions(mastery, max),
            )
            .await;

        (
            result.value,
            result.defaulted.then(|| SUGGESTION_ADVISORY.to_string()),
        )
    }
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

/// Strip quotes and collapse whitespace in an oracle-provided label.
pub fn clean_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '"' | '\'' | '“' | '”' | '‘' | '’' | '「' | '」'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_labels(record: Record) -> Result<HashMap<usize, String>, ExtractionError> {
    let Some(Value::Object(map)) = record.get("knowledge_points") else {
        return Err(ExtractionError::MissingField("knowledge_points".into()));
    };

    let labels: HashMap<usize, String> = map
        .iter()
        .filter_map(|(key, value)| {
            let seq = key
                .trim()
                .trim_start_matches('第')
                .trim_end_matches('题')
                .parse::<usize>()
                .ok()?;
            let label = match value {
                Value::String(s) => clean_label(s),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            (!label.is_empty()).then_some((seq, label))
        })
        .collect();

    if labels.is_empty() && !map.is_empty() {
        return Err(ExtractionError::Rejected(
            "no usable question number → label entries".into(),
        ));
    }
    Ok(labels)
}

/// A refined mastery value: a number, a numeric string, or a percentage
/// string, within 0..=100.
pub fn parse_mastery_value(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches(['%', '％']).trim().parse().ok()?,
        _ => return None,
    };
    (n.is_finite() && (0.0..=100.0).contains(&n)).then_some(n)
}

fn parse_mastery_map(record: Record) -> Result<HashMap<String, f64>, ExtractionError> {
    let Some(Value::Object(map)) = record.get("mastery") else {
        return Err(ExtractionError::MissingField("mastery".into()));
    };
    Ok(map
        .iter()
        .filter_map(|(topic, value)| match parse_mastery_value(value) {
            Some(m) => Some((clean_label(topic), m)),
            None => {
                debug!(%topic, %value, "discarding refined mastery");
                None
            }
        })
        .collect())
}

/// Drop a leading "1." / "2、" / "3)" style number.
fn strip_numbering(line: &str) -> &str {
    let trimmed = line.trim();
    let rest = trimmed.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == trimmed.len() {
        return trimmed;
    }
    match rest.strip_prefix(['.', '、', ')', '）', '．']) {
        Some(after) => after.trim_start(),
        None => trimmed,
    }
}

fn parse_suggestions(record: &Record, max: usize) -> Result<Vec<String>, ExtractionError> {
    let Some(Value::Array(values)) = record.get("suggestions") else {
        return Err(ExtractionError::MissingField("suggestions".into()));
    };

    let suggestions: Vec<String> = values
        .iter()
        .filter_map(Value::as_str)
        .map(strip_numbering)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if suggestions.is_empty() {
        return Err(ExtractionError::Rejected("no suggestions".into()));
    }
    if suggestions
        .iter()
        .any(|s| s.contains("无法") || s.contains("不能"))
    {
        return Err(ExtractionError::Rejected(
            "reply declares it cannot answer".into(),
        ));
    }

    Ok(suggestions.into_iter().take(max).collect())
}

/// Suggestions that need no oracle: one per weak topic (weakest first), plus
/// a closing general one.
pub fn default_suggestions(mastery: &[TopicMastery], max: usize) -> Vec<String> {
    let mut weak: Vec<&TopicMastery> = mastery.iter().filter(|t| t.mastery < 80.0).collect();
    weak.sort_by(|a, b| a.mastery.total_cmp(&b.mastery));

    let mut suggestions: Vec<String> = weak
        .iter()
        .take(max.saturating_sub(1).max(1))
        .map(|t| {
            format!(
                "重点复习「{}」（当前掌握程度 {:.1}%），梳理相关概念并完成针对性练习。",
                t.topic, t.mastery
            )
        })
        .collect();

    if weak.is_empty() && !mastery.is_empty() {
        suggestions.push("整体掌握良好，建议对已掌握的知识点进行拓展练习，提升综合运用能力。".into());
    }
    suggestions.push("考试后回顾错题，整理错误原因并定期复习。".into());
    suggestions.truncate(max);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractorConfig;
    use crate::mock::MockOracle;
    use serde_json::json;
    use std::sync::Arc;

    const SHEET: &str = "\
## 一、单选题（共4分）
得分：2
### 第1题
列表长度函数（2分）
**学生答案**：A
**正确答案**：A
得分：2
### 第2题
字典键类型（2分）
**学生答案**：B
**正确答案**：C
得分：0
## 二、简答题（共10分）
得分：6
### 第1题
列表与元组区别（10分）
**学生答案**：
不知道
**正确答案**：
可变与不可变
得分：6
## 考试总结
";

    const LABELS: &str = r#"{"knowledge_points": {"1": "列表", "2": "“字典”", "3": "列表"}}"#;
    const MASTERY: &str = r#"{"mastery": {"列表": 78, "字典": "5%"}}"#;
    const SUGGESTIONS: &str = r#"{"suggestions": ["1. 复习字典的键约束", "多练习列表切片"]}"#;

    fn routed_oracle() -> MockOracle {
        MockOracle::new()
            .with_route("提取核心知识点", LABELS)
            .with_route("分析各知识点的掌握程度", MASTERY)
            .with_route("生成个性化的学习建议", SUGGESTIONS)
    }

    fn analyzer(oracle: Arc<MockOracle>, config: AnalyzerConfig) -> ExamAnalyzer {
        ExamAnalyzer::new(Extractor::new(oracle, ExtractorConfig::default()), config)
    }

    #[tokio::test]
    async fn full_pipeline() {
        let oracle = Arc::new(routed_oracle());
        let report = analyzer(oracle.clone(), AnalyzerConfig::default())
            .analyze(SHEET)
            .await;

        assert_eq!(report.total_score(), 14);
        assert_eq!(report.student_total_score(), 8);
        assert!(report.advisories.is_empty(), "{:?}", report.advisories);

        let topics: Vec<_> = report.mastery.iter().map(|t| t.topic.as_str()).collect();
        assert_eq!(topics, vec!["列表", "字典"]);
        assert_eq!(report.mastery[0].mastery, 78.0);
        assert_eq!(report.mastery[0].objective_items, 1);
        assert_eq!(report.mastery[0].subjective_items, 1);
        assert_eq!(report.mastery[1].mastery, 5.0);

        assert_eq!(report.suggestions, vec!["复习字典的键约束", "多练习列表切片"]);
        assert_eq!(report.sections[1].items[0].topic, "列表");
        assert_eq!(oracle.call_count(), 3);
    }

    #[tokio::test]
    async fn labeling_prompt_numbers_items_across_sections() {
        let oracle = Arc::new(routed_oracle());
        analyzer(oracle.clone(), AnalyzerConfig::default())
            .analyze(SHEET)
            .await;

        let prompt = &oracle.prompts()[0];
        assert!(prompt.contains("1. [单选题] 列表长度函数（2分）"));
        assert!(prompt.contains("3. [简答题] 列表与元组区别（10分）"));
    }

    #[tokio::test]
    async fn garbage_oracle_degrades_every_step() {
        let oracle = Arc::new(MockOracle::with_fixed_response("???"));
        let report = analyzer(oracle.clone(), AnalyzerConfig::default())
            .analyze(SHEET)
            .await;

        assert_eq!(oracle.call_count(), 9);
        assert_eq!(
            report.advisories,
            vec![LABELING_ADVISORY, REFINEMENT_ADVISORY, SUGGESTION_ADVISORY]
        );

        // Initial labels and preliminary mastery survive
        let mastery: Vec<_> = report
            .mastery
            .iter()
            .map(|t| (t.topic.as_str(), t.mastery))
            .collect();
        assert_eq!(
            mastery,
            vec![
                ("列表长度函数（2分）", 100.0),
                ("字典键类型（2分）", 0.0),
                ("列表与元组区别（10分）", 60.0),
            ]
        );
        assert!(report.suggestions[0].contains("字典键类型"));
        assert!(report.suggestions.len() <= 5);
    }

    #[tokio::test]
    async fn refinement_can_be_disabled() {
        let oracle = Arc::new(routed_oracle());
        let config = AnalyzerConfig {
            refine_mastery: false,
            ..Default::default()
        };
        let report = analyzer(oracle.clone(), config).analyze(SHEET).await;

        assert_eq!(oracle.call_count(), 2);
        // 列表: objective 100 and subjective 60, one item each
        assert_eq!(report.mastery[0].mastery, 80.0);
    }

    #[tokio::test]
    async fn out_of_range_refinement_keeps_preliminary() {
        let oracle = Arc::new(
            MockOracle::new()
                .with_route("提取核心知识点", LABELS)
                .with_route(
                    "分析各知识点的掌握程度",
                    r#"{"mastery": {"列表": 120, "字典": "不清楚"}}"#,
                )
                .with_route("生成个性化的学习建议", SUGGESTIONS),
        );
        let report = analyzer(oracle, AnalyzerConfig::default())
            .analyze(SHEET)
            .await;

        assert_eq!(report.mastery[0].mastery, 80.0);
        assert_eq!(report.mastery[1].mastery, 0.0);
        assert!(report.advisories.is_empty());
    }

    #[tokio::test]
    async fn refusal_suggestions_fall_back() {
        let oracle = Arc::new(
            MockOracle::new()
                .with_route("提取核心知识点", LABELS)
                .with_route("分析各知识点的掌握程度", MASTERY)
                .with_route(
                    "生成个性化的学习建议",
                    r#"{"suggestions": ["抱歉，我无法生成建议"]}"#,
                ),
        );
        let report = analyzer(oracle, AnalyzerConfig::default())
            .analyze(SHEET)
            .await;

        assert_eq!(report.advisories, vec![SUGGESTION_ADVISORY]);
        assert!(report.suggestions[0].contains("「字典」"));
    }

    #[tokio::test]
    async fn empty_document_makes_no_oracle_calls() {
        let oracle = Arc::new(routed_oracle());
        let report = analyzer(oracle.clone(), AnalyzerConfig::default())
            .analyze("这不是答题卡")
            .await;

        assert_eq!(oracle.call_count(), 0);
        assert!(report.sections.is_empty());
        assert_eq!(report.advisories, vec![NO_SECTIONS_ADVISORY]);
        assert_eq!(report.overall_percentage(), 0.0);
        assert!(!report.suggestions.is_empty());
    }

    #[tokio::test]
    async fn long_prompts_are_truncated() {
        let oracle = Arc::new(routed_oracle());
        let config = AnalyzerConfig {
            prompt_char_limit: 40,
            ..Default::default()
        };
        analyzer(oracle.clone(), config).analyze(SHEET).await;

        for prompt in oracle.prompts() {
            assert!(prompt.ends_with(prompts::TRUNCATION_MARKER), "{prompt}");
        }
    }

    #[test]
    fn mastery_values() {
        assert_eq!(parse_mastery_value(&json!(85)), Some(85.0));
        assert_eq!(parse_mastery_value(&json!("72.5")), Some(72.5));
        assert_eq!(parse_mastery_value(&json!("60%")), Some(60.0));
        assert_eq!(parse_mastery_value(&json!(-1)), None);
        assert_eq!(parse_mastery_value(&json!(100.5)), None);
        assert_eq!(parse_mastery_value(&json!("high")), None);
        assert_eq!(parse_mastery_value(&json!(null)), None);
    }

    #[test]
    fn suggestions_are_capped_and_unnumbered() {
        let record: Record = serde_json::from_value(json!({
            "suggestions": ["1. a", "2、b", "3) c", "d", "e", "f", "  "]
        }))
        .unwrap();
        let parsed = parse_suggestions(&record, 5).unwrap();
        assert_eq!(parsed, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn labels_accept_decorated_keys() {
        let record: Record = serde_json::from_value(json!({
            "knowledge_points": {"第1题": " 列表\n切片 ", "2": 42, "x": "忽略"}
        }))
        .unwrap();
        let labels = parse_labels(record).unwrap();
        assert_eq!(labels[&1], "列表 切片");
        assert_eq!(labels[&2], "42");
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn default_suggestions_target_weak_topics() {
        let mastery = vec![
            TopicMastery {
                topic: "A".into(),
                mastery: 90.0,
                objective_items: 1,
                subjective_items: 0,
            },
            TopicMastery {
                topic: "B".into(),
                mastery: 30.0,
                objective_items: 0,
                subjective_items: 1,
            },
        ];
        let s = default_suggestions(&mastery, 5);
        assert_eq!(s.len(), 2);
        assert!(s[0].contains("「B」"));

        let strong = default_suggestions(&mastery[..1], 5);
        assert!(strong[0].starts_with("整体掌握良好"));
    }
}
