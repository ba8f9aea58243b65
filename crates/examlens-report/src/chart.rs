//! Markdown reports for class chart analysis.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use examlens_core::chart::ChartAnalysis;

/// Printed when a report has no suggestions to show.
pub const NO_SUGGESTIONS: &str = "未能生成具体的教学建议，请检查图表分析结果。";

fn push_suggestions(md: &mut String, suggestions: &[String]) {
    if suggestions.is_empty() {
        md.push_str(NO_SUGGESTIONS);
    } else {
        md.push_str(&suggestions.join("\n"));
    }
    md.push('\n');
}

/// Report for a single chart: numbered insights, summary, suggestions.
pub fn render_chart_report(analysis: &ChartAnalysis, suggestions: &[String]) -> String {
    let mut md = String::from("# 图表分析报告\n\n");
    let _ = writeln!(md, "**{}**（{}）\n", analysis.title, analysis.chart_type);
    if !analysis.description.is_empty() {
        let _ = writeln!(md, "{}\n", analysis.description);
    }

    md.push_str("## 数据洞察\n");
    for (i, insight) in analysis.data_insights.iter().enumerate() {
        let _ = writeln!(md, "{}. {insight}", i + 1);
    }
    let _ = write!(md, "\n## 总结\n{}\n\n## 教学建议\n", analysis.summary);
    push_suggestions(&mut md, suggestions);
    md
}

/// Report for a batch of charts.
pub fn render_comprehensive_chart_report(
    analyses: &[ChartAnalysis],
    suggestions: &[String],
) -> String {
    let mut md = String::from("# 图表分析综合报告\n\n");
    if !analyses.is_empty() {
        md.push_str("## 图表列表\n");
        for (i, analysis) in analyses.iter().enumerate() {
            let _ = writeln!(md, "{}. {}（{}）", i + 1, analysis.title, analysis.chart_type);
        }
        md.push('\n');
    }
    md.push_str("## 综合总结与教学建议\n\n");
    push_suggestions(&mut md, suggestions);
    md
}

/// Write an already rendered chart report to `path`.
pub fn write_chart_report(markdown: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, markdown)
        .with_context(|| format!("failed to write chart report to {}", path.display()))?;
    Ok(())
}
