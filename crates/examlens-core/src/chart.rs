//! Class statistics chart analysis.
//!
//! A chart arrives as a text description (what a reader or a vision model saw
//! in the image). The description is turned into a [`ChartAnalysis`], which
//! then drives teaching suggestions for one chart or for a batch of charts.
//!
//! Descriptions already written in the numbered layout
//!
//! ```text
//! 1. 图表类型：柱状图
//! 2. 图表标题：...
//! 3. 图表描述：...
//! 4. 数据洞察：
//! - ...
//! 5. 总结：...
//! ```
//!
//! are parsed without consulting the oracle.

use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ExtractionError;
use crate::extraction::{Extraction, Extractor, FieldKind, Record, Schema};
use crate::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartType {
    #[serde(rename = "柱状图")]
    Bar,
    #[serde(rename = "折线图")]
    Line,
    #[serde(rename = "饼图")]
    Pie,
    #[serde(rename = "散点图")]
    Scatter,
    #[serde(rename = "直方图")]
    Histogram,
    #[serde(rename = "其他")]
    Other,
}

impl ChartType {
    /// Map a free-form label to a chart type. Unknown labels are `Other`.
    pub fn from_label(label: &str) -> Self {
        if label.contains("柱状图") {
            ChartType::Bar
        } else if label.contains("折线图") {
            ChartType::Line
        } else if label.contains("饼图") {
            ChartType::Pie
        } else if label.contains("散点图") {
            ChartType::Scatter
        } else if label.contains("直方图") {
            ChartType::Histogram
        } else {
            ChartType::Other
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChartType::Bar => "柱状图",
            ChartType::Line => "折线图",
            ChartType::Pie => "饼图",
            ChartType::Scatter => "散点图",
            ChartType::Histogram => "直方图",
            ChartType::Other => "其他",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartAnalysis {
    pub chart_type: ChartType,
    pub title: String,
    pub description: String,
    pub data_insights: Vec<String>,
    pub summary: String,
}

/// Title used when neither the reply nor the caller names the chart.
pub const UNKNOWN_TITLE: &str = "未知标题";

pub const SUGGESTION_FAILURE: &str = "教学建议生成失败，请重试。";
pub const COMPREHENSIVE_SUGGESTION_FAILURE: &str = "综合教学建议生成失败，请重试。";

/// Prompts are cut to this many characters.
pub const PROMPT_CHAR_LIMIT: usize = 8000;

/// A suggestion reply needs more than this many non-blank lines.
const MIN_SUGGESTION_LINES: usize = 3;
/// ...and at least this many characters.
const MIN_SUGGESTION_CHARS: usize = 50;

/// The analysis used when a description cannot be interpreted.
pub fn fallback_analysis(title_hint: Option<&str>) -> ChartAnalysis {
    ChartAnalysis {
        chart_type: ChartType::Bar,
        title: title_hint
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(UNKNOWN_TITLE)
            .to_string(),
        description: "该图表展示了相关数据的分布情况".into(),
        data_insights: vec![
            "数据存在明显差异".into(),
            "需要进一步分析具体数值".into(),
        ],
        summary: "图表反映了数据的分布特征，需要结合具体数值进行深入分析".into(),
    }
}

const DATA_NEEDS: [&str; 4] = [
    "## 数据需求",
    "- 各分数段学生人数分布",
    "- 具体知识点的正确率数据",
    "- 学生群体的成绩对比信息",
];

const MISSING_DATA_ADVICE: [&str; 4] = [
    "## 二、针对性教学建议",
    "- 建议补充图表的具体数据信息",
    "- 提供学生成绩分布或知识点掌握的具体数值",
    "- 明确教学中需要关注的重点问题",
];

/// Suggestions for a chart with no insights to work from.
pub fn empty_insights_suggestions(title: &str) -> Vec<String> {
    let mut lines = vec![
        "# 教学诊断与针对性教学建议".to_string(),
        "## 一、总体诊断".to_string(),
        format!("- 基于图表 '{title}' 分析，数据洞察信息不足"),
        "- 无法提供具体的教学诊断".to_string(),
        String::new(),
    ];
    lines.extend(MISSING_DATA_ADVICE.iter().map(|s| s.to_string()));
    lines.push(String::new());
    lines.extend(DATA_NEEDS.iter().map(|s| s.to_string()));
    lines
}

/// Suggestions for an empty batch of charts.
pub fn empty_comprehensive_suggestions() -> Vec<String> {
    let mut lines = vec![
        "# 综合教学诊断与针对性教学建议".to_string(),
        "## 一、总体诊断".to_string(),
        "- 未能获取有效的图表分析数据".to_string(),
        "- 无法提供具体的教学诊断".to_string(),
        String::new(),
    ];
    lines.extend(MISSING_DATA_ADVICE.iter().map(|s| s.to_string()));
    lines.push(String::new());
    lines.extend(DATA_NEEDS.iter().map(|s| s.to_string()));
    lines
}

// ---------------------------------------------------------------------------
// Numbered-layout parsing
// ---------------------------------------------------------------------------

fn heading_value<'a>(line: &'a str, heading: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(heading)?;
    rest.strip_prefix('：')
        .or_else(|| rest.strip_prefix(':'))
        .map(str::trim)
}

/// Parse a description written in the numbered layout.
///
/// Returns `None` unless the type, title and summary headings are all
/// present. Insights are the `- ` lines following `4. 数据洞察`.
pub fn parse_analysis_lines(text: &str) -> Option<ChartAnalysis> {
    let mut chart_type = None;
    let mut title = None;
    let mut description = String::new();
    let mut summary = None;
    let mut insights = Vec::new();
    let mut in_insights = false;

    for line in text.lines().map(str::trim) {
        if let Some(v) = heading_value(line, "1. 图表类型") {
            chart_type = Some(ChartType::from_label(v));
            in_insights = false;
        } else if let Some(v) = heading_value(line, "2. 图表标题") {
            title = Some(v.to_string());
            in_insights = false;
        } else if let Some(v) = heading_value(line, "3. 图表描述") {
            description = v.to_string();
            in_insights = false;
        } else if heading_value(line, "4. 数据洞察").is_some() {
            in_insights = true;
        } else if let Some(v) = heading_value(line, "5. 总结") {
            summary = Some(v.to_string());
            in_insights = false;
        } else if in_insights {
            if let Some(insight) = line.strip_prefix("- ").map(str::trim) {
                if !insight.is_empty() {
                    insights.push(insight.to_string());
                }
            }
        }
    }

    Some(ChartAnalysis {
        chart_type: chart_type?,
        title: title.filter(|t| !t.is_empty())?,
        description,
        data_insights: insights,
        summary: summary?,
    })
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

fn analysis_schema() -> Schema {
    Schema::new()
        .field("chart_type", FieldKind::String)
        .field("title", FieldKind::String)
        .field("description", FieldKind::String)
        .field("data_insights", FieldKind::Array)
        .field("summary", FieldKind::String)
}

fn text_field(record: &Record, name: &str) -> String {
    record
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn parse_analysis(
    record: &Record,
    title_hint: Option<&str>,
) -> Result<ChartAnalysis, ExtractionError> {
    let description = text_field(record, "description");
    let summary = text_field(record, "summary");
    if [&description, &summary]
        .iter()
        .any(|s| s.contains("无法") || s.contains("不能"))
    {
        return Err(ExtractionError::Rejected(
            "reply declares it cannot read the chart".into(),
        ));
    }

    let mut title = text_field(record, "title");
    if title.is_empty() {
        title = title_hint.unwrap_or(UNKNOWN_TITLE).to_string();
    }
    let data_insights = match record.get("data_insights") {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().trim_start_matches("- ").trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => return Err(ExtractionError::MissingField("data_insights".into())),
    };

    Ok(ChartAnalysis {
        chart_type: ChartType::from_label(&text_field(record, "chart_type")),
        title,
        description,
        data_insights,
        summary,
    })
}

fn parse_suggestion_lines(record: &Record) -> Result<Vec<String>, ExtractionError> {
    let Some(Value::Array(values)) = record.get("suggestions") else {
        return Err(ExtractionError::MissingField("suggestions".into()));
    };
    let mut lines: Vec<String> = values
        .iter()
        .filter_map(Value::as_str)
        .flat_map(|s| s.split('\n'))
        .map(|s| s.trim_end().to_string())
        .collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    let first = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    lines.drain(..first);

    let filled = lines.iter().filter(|l| !l.trim().is_empty()).count();
    let chars: usize = lines.iter().map(|l| l.chars().count()).sum();
    if filled <= MIN_SUGGESTION_LINES || chars < MIN_SUGGESTION_CHARS {
        return Err(ExtractionError::Rejected(format!(
            "suggestions too short ({filled} lines, {chars} characters)"
        )));
    }
    Ok(lines)
}

fn immediate<T>(value: T) -> Extraction<T> {
    Extraction {
        value,
        attempts: 0,
        defaulted: false,
        last_error: None,
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Turns chart descriptions into analyses and teaching suggestions.
#[derive(Clone)]
pub struct ChartAnalyzer {
    extractor: Extractor,
}

impl ChartAnalyzer {
    pub fn new(extractor: &Extractor) -> Self {
        Self {
            extractor: extractor.with_system_prompt(prompts::CHART_SYSTEM_PROMPT),
        }
    }

    /// Analyze one chart description.
    ///
    /// `title_hint` (usually the file stem) names the chart when the reply
    /// does not. Exhaustion yields [`fallback_analysis`].
    pub async fn analyze(
        &self,
        description: &str,
        title_hint: Option<&str>,
    ) -> Extraction<ChartAnalysis> {
        if let Some(analysis) = parse_analysis_lines(description) {
            debug!(title = %analysis.title, "chart description already structured");
            return immediate(analysis);
        }

        let prompt = prompts::limit_prompt(
            &prompts::chart_analysis_prompt(description),
            PROMPT_CHAR_LIMIT,
        );
        let result = self
            .extractor
            .extract_with(
                &prompt,
                &analysis_schema(),
                |record| parse_analysis(&record, title_hint),
                || fallback_analysis(title_hint),
            )
            .await;
        info!(
            title = %result.value.title,
            chart_type = %result.value.chart_type,
            insights = result.value.data_insights.len(),
            defaulted = result.defaulted,
            "chart analyzed"
        );
        result
    }

    /// Teaching suggestions for one chart, one Markdown line per entry.
    pub async fn teaching_suggestions(&self, analysis: &ChartAnalysis) -> Extraction<Vec<String>> {
        if analysis.data_insights.is_empty() {
            return immediate(empty_insights_suggestions(&analysis.title));
        }

        let mut insights = String::from("- 关键数据：");
        for insight in &analysis.data_insights {
            let _ = write!(insights, "\n- {insight}");
        }
        self.suggest(&insights, SUGGESTION_FAILURE).await
    }

    /// Suggestions covering every chart in `analyses`.
    pub async fn comprehensive_suggestions(
        &self,
        analyses: &[ChartAnalysis],
    ) -> Extraction<Vec<String>> {
        if analyses.is_empty() {
            return immediate(empty_comprehensive_suggestions());
        }

        let mut insights = String::new();
        for (i, analysis) in analyses.iter().enumerate() {
            let _ = writeln!(insights, "图表 {} ({}):", i + 1, analysis.title);
            for insight in &analysis.data_insights {
                let _ = writeln!(insights, "  - {insight}");
            }
            insights.push('\n');
        }
        self.suggest(insights.trim_end(), COMPREHENSIVE_SUGGESTION_FAILURE)
            .await
    }

    async fn suggest(&self, insights: &str, failure: &str) -> Extraction<Vec<String>> {
        let prompt = prompts::limit_prompt(
            &prompts::teaching_suggestions_prompt(insights),
            PROMPT_CHAR_LIMIT,
        );
        let schema = Schema::new().field("suggestions", FieldKind::Array);
        self.extractor
            .extract_with(
                &prompt,
                &schema,
                |record| parse_suggestion_lines(&record),
                || vec![failure.to_string()],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractorConfig;
    use crate::mock::MockOracle;
    use std::sync::Arc;

    const ANALYSIS: &str = r#"{
  "chart_type": "柱状图",
  "title": "第三单元知识点得分率",
  "description": "各知识点得分率对比",
  "data_insights": ["- 列表操作得分率 45%", "函数定义得分率 88%", ""],
  "summary": "列表操作需要重点补救"
}"#;

    const SUGGESTIONS: &str = r##"{"suggestions": [
  "# 一、总体诊断",
  "- 函数定义掌握较好（88%），列表操作薄弱（45%）",
  "",
  "# 二、针对性教学建议",
  "1. 列表操作：增加两课时专项练习，设计切片与推导式小组活动",
  "2. 作业布置：每日三道列表综合题，次日课堂讲评"
]}"##;

    fn analyzer(oracle: &Arc<MockOracle>) -> ChartAnalyzer {
        ChartAnalyzer::new(&Extractor::new(oracle.clone(), ExtractorConfig::default()))
    }

    fn analysis(insights: &[&str]) -> ChartAnalysis {
        ChartAnalysis {
            chart_type: ChartType::Bar,
            title: "期中成绩分布".into(),
            description: String::new(),
            data_insights: insights.iter().map(|s| s.to_string()).collect(),
            summary: String::new(),
        }
    }

    #[test]
    fn chart_type_labels() {
        assert_eq!(ChartType::from_label("这是一张折线图"), ChartType::Line);
        assert_eq!(ChartType::from_label("雷达图"), ChartType::Other);
        assert_eq!(
            serde_json::to_string(&ChartType::Histogram).unwrap(),
            "\"直方图\""
        );
    }

    #[test]
    fn numbered_layout_is_parsed() {
        let text = "1. 图表类型：饼图\n\
                    2. 图表标题：成绩等级占比\n\
                    3. 图表描述: 各等级人数占比\n\
                    4. 数据洞察：\n\
                    - 优秀占 20%\n\
                    -  \n\
                    - 不及格占 15%\n\
                    5. 总结：两极分化明显";
        let parsed = parse_analysis_lines(text).unwrap();
        assert_eq!(parsed.chart_type, ChartType::Pie);
        assert_eq!(parsed.title, "成绩等级占比");
        assert_eq!(parsed.description, "各等级人数占比");
        assert_eq!(parsed.data_insights, vec!["优秀占 20%", "不及格占 15%"]);
        assert_eq!(parsed.summary, "两极分化明显");
    }

    #[test]
    fn free_text_is_not_numbered_layout() {
        assert!(parse_analysis_lines("柱状图，展示各题得分率").is_none());
        assert!(parse_analysis_lines("1. 图表类型：柱状图\n5. 总结：无").is_none());
    }

    #[tokio::test]
    async fn structured_description_skips_the_oracle() {
        let oracle = Arc::new(MockOracle::new());
        let text = "1. 图表类型：直方图\n2. 图表标题：分数分布\n4. 数据洞察：\n- 集中在 70-80 分\n5. 总结：中等偏上";
        let result = analyzer(&oracle).analyze(text, None).await;

        assert_eq!(result.attempts, 0);
        assert_eq!(result.value.chart_type, ChartType::Histogram);
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn analyze_reads_reply() {
        let oracle = Arc::new(MockOracle::with_fixed_response(ANALYSIS));
        let result = analyzer(&oracle)
            .analyze("横轴为知识点，纵轴为得分率……", Some("unit3"))
            .await;

        assert!(!result.defaulted);
        let a = result.value;
        assert_eq!(a.chart_type, ChartType::Bar);
        assert_eq!(a.title, "第三单元知识点得分率");
        assert_eq!(a.data_insights, vec!["列表操作得分率 45%", "函数定义得分率 88%"]);
        assert!(oracle.prompts()[0].contains("横轴为知识点"));
    }

    #[tokio::test]
    async fn refusal_falls_back_to_default_analysis() {
        let reply = r#"{"chart_type": "其他", "title": "", "description": "我无法识别该图表",
            "data_insights": [], "summary": ""}"#;
        let oracle = Arc::new(MockOracle::with_fixed_response(reply));
        let result = analyzer(&oracle).analyze("一张模糊的图片", Some("scan-01")).await;

        assert!(result.defaulted);
        assert_eq!(oracle.call_count(), 3);
        assert_eq!(result.value, fallback_analysis(Some("scan-01")));
        assert_eq!(fallback_analysis(None).title, UNKNOWN_TITLE);
    }

    #[tokio::test]
    async fn empty_insights_need_no_oracle() {
        let oracle = Arc::new(MockOracle::new());
        let result = analyzer(&oracle).teaching_suggestions(&analysis(&[])).await;

        assert_eq!(oracle.call_count(), 0);
        assert!(!result.defaulted);
        assert_eq!(result.value[0], "# 教学诊断与针对性教学建议");
        assert!(result.value.contains(&"- 基于图表 '期中成绩分布' 分析，数据洞察信息不足".to_string()));
        assert_eq!(result.value.last().unwrap(), "- 学生群体的成绩对比信息");
    }

    #[tokio::test]
    async fn suggestions_are_split_into_lines() {
        let oracle = Arc::new(MockOracle::with_fixed_response(SUGGESTIONS));
        let result = analyzer(&oracle)
            .teaching_suggestions(&analysis(&["列表操作得分率 45%", "函数定义得分率 88%"]))
            .await;

        assert!(!result.defaulted);
        assert_eq!(result.value.len(), 6);
        assert_eq!(result.value[2], "");
        let prompt = &oracle.prompts()[0];
        assert!(prompt.contains("- 关键数据：\n- 列表操作得分率 45%\n- 函数定义得分率 88%"));
    }

    #[tokio::test]
    async fn short_suggestions_are_retried_then_defaulted() {
        let oracle = Arc::new(MockOracle::with_fixed_response(
            r#"{"suggestions": ["多练习", "多复习"]}"#,
        ));
        let result = analyzer(&oracle)
            .teaching_suggestions(&analysis(&["正确率 30%"]))
            .await;

        assert!(result.defaulted);
        assert_eq!(oracle.call_count(), 3);
        assert_eq!(result.value, vec![SUGGESTION_FAILURE.to_string()]);
        assert!(matches!(result.last_error, Some(ExtractionError::Rejected(_))));
    }

    #[tokio::test]
    async fn comprehensive_lists_every_chart() {
        let oracle = Arc::new(MockOracle::new().with_reply("not json").with_reply(SUGGESTIONS));
        let mut second = analysis(&["及格率 72%"]);
        second.title = "及格率趋势".into();
        let result = analyzer(&oracle)
            .comprehensive_suggestions(&[analysis(&["平均分 68"]), second])
            .await;

        assert!(!result.defaulted);
        assert_eq!(result.attempts, 2);
        let prompt = &oracle.prompts()[0];
        assert!(prompt.contains("图表 1 (期中成绩分布):\n  - 平均分 68"));
        assert!(prompt.contains("图表 2 (及格率趋势):\n  - 及格率 72%"));
    }

    #[tokio::test]
    async fn comprehensive_without_charts() {
        let oracle = Arc::new(MockOracle::new());
        let result = analyzer(&oracle).comprehensive_suggestions(&[]).await;

        assert_eq!(oracle.call_count(), 0);
        assert_eq!(result.value, empty_comprehensive_suggestions());
        assert!(result.value.contains(&"- 未能获取有效的图表分析数据".to_string()));
    }
}
