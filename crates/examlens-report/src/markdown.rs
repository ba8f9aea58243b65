//! Markdown learning report.
//!
//! Layout:
//!
//! ```text
//! # 学生个性化学习报告
//! ## 知识点掌握情况总结
//! 整体掌握情况：N% (良好|一般|较差)
//! <up to five topic buckets, empty ones omitted>
//! ## 学习建议
//! 1. ...
//! ```

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use examlens_core::aggregate::{MasteryLevel, TopicMastery};
use examlens_core::report::StudentReport;

/// Suggestions listed in the report.
pub const MAX_SUGGESTIONS: usize = 5;

/// Topics partitioned for display.
///
/// A topic whose mastery is exactly 0 or 100 is shown as an objective topic.
/// Objective-only topics can only score 0 or 100 before refinement, so this
/// value test stands in for the topic's item types.
#[derive(Debug, Default, PartialEq)]
pub struct TopicBuckets<'a> {
    pub objective_correct: Vec<&'a str>,
    pub objective_wrong: Vec<&'a str>,
    pub subjective_good: Vec<(&'a str, f64)>,
    pub subjective_partial: Vec<(&'a str, f64)>,
    pub subjective_weak: Vec<(&'a str, f64)>,
}

/// Partition topics into the five display buckets, keeping input order.
pub fn bucket_topics(mastery: &[TopicMastery]) -> TopicBuckets<'_> {
    let mut buckets = TopicBuckets::default();
    for record in mastery {
        let topic = record.topic.as_str();
        let m = record.mastery;
        if m == 100.0 {
            buckets.objective_correct.push(topic);
        } else if m == 0.0 {
            buckets.objective_wrong.push(topic);
        } else {
            match MasteryLevel::from_mastery(m) {
                MasteryLevel::Good => buckets.subjective_good.push((topic, m)),
                MasteryLevel::Fair => buckets.subjective_partial.push((topic, m)),
                MasteryLevel::Poor => buckets.subjective_weak.push((topic, m)),
            }
        }
    }
    buckets
}

fn push_plain(out: &mut String, header: &str, topics: &[&str]) {
    if topics.is_empty() {
        return;
    }
    let _ = writeln!(out, "{header}");
    for topic in topics {
        let _ = writeln!(out, "- {topic}");
    }
    out.push('\n');
}

fn push_rated(out: &mut String, header: &str, topics: &[(&str, f64)]) {
    if topics.is_empty() {
        return;
    }
    let _ = writeln!(out, "{header}");
    for (topic, m) in topics {
        let _ = writeln!(out, "- {topic} ({m:.1}%)");
    }
    out.push('\n');
}

/// Render the report text from final mastery, suggestions and the overall
/// score percentage.
pub fn assemble(mastery: &[TopicMastery], suggestions: &[String], overall: f64) -> String {
    let mut md = String::from("# 学生个性化学习报告\n\n## 知识点掌握情况总结\n\n");
    let _ = writeln!(
        md,
        "整体掌握情况：{overall}% ({})\n",
        MasteryLevel::from_mastery(overall).short_label()
    );

    let buckets = bucket_topics(mastery);
    push_plain(&mut md, "客观题答对的知识点：", &buckets.objective_correct);
    push_plain(&mut md, "客观题答错的知识点：", &buckets.objective_wrong);
    push_rated(&mut md, "主观题掌握良好（得分率 ≥80%）：", &buckets.subjective_good);
    push_rated(
        &mut md,
        "主观题部分掌握（得分率 60%–79%）：",
        &buckets.subjective_partial,
    );
    push_rated(&mut md, "主观题掌握较差（得分率 <60%）：", &buckets.subjective_weak);

    md.push_str("## 学习建议\n\n");
    for (i, suggestion) in suggestions.iter().take(MAX_SUGGESTIONS).enumerate() {
        let _ = writeln!(md, "{}. {suggestion}", i + 1);
    }

    md
}

/// Render a full report. Degraded steps are listed after the suggestions.
pub fn render_report(report: &StudentReport) -> String {
    let mut md = assemble(
        &report.mastery,
        &report.suggestions,
        report.overall_percentage(),
    );
    if report.is_degraded() {
        md.push_str("\n## 说明\n\n");
        for note in &report.advisories {
            let _ = writeln!(md, "> {note}");
        }
    }
    md
}

/// Write the Markdown report to `path`.
pub fn write_markdown_report(report: &StudentReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, render_report(report))
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use examlens_core::model::{QuestionType, Section};

    fn topic(name: &str, mastery: f64) -> TopicMastery {
        TopicMastery {
            topic: name.into(),
            mastery,
            objective_items: 1,
            subjective_items: 0,
        }
    }

    fn make_report() -> StudentReport {
        StudentReport {
            id: uuid::Uuid::nil(),
            created_at: chrono::Utc::now(),
            source: None,
            sections: vec![Section {
                question_type: QuestionType::SingleChoice,
                name: "单选题".into(),
                total_score: 10,
                student_score: 8,
                items: vec![],
            }],
            mastery: vec![topic("列表", 100.0), topic("字典", 45.0)],
            suggestions: vec!["复习字典".into()],
            advisories: vec![],
            duration_ms: 0,
        }
    }

    #[test]
    fn buckets_follow_value_rules() {
        let mastery = vec![
            topic("A", 100.0),
            topic("B", 0.0),
            topic("C", 85.0),
            topic("D", 80.0),
            topic("E", 79.9),
            topic("F", 60.0),
            topic("G", 59.9),
        ];
        let b = bucket_topics(&mastery);
        assert_eq!(b.objective_correct, vec!["A"]);
        assert_eq!(b.objective_wrong, vec!["B"]);
        assert_eq!(b.subjective_good, vec![("C", 85.0), ("D", 80.0)]);
        assert_eq!(b.subjective_partial, vec![("E", 79.9), ("F", 60.0)]);
        assert_eq!(b.subjective_weak, vec![("G", 59.9)]);
    }

    #[test]
    fn assemble_full_layout() {
        let mastery = vec![topic("列表", 100.0), topic("字典", 0.0), topic("递归", 72.5)];
        let suggestions = vec!["复习字典".to_string(), "练习递归".to_string()];
        let md = assemble(&mastery, &suggestions, 66.67);

        let expected = "\
# 学生个性化学习报告

## 知识点掌握情况总结

整体掌握情况：66.67% (一般)

客观题答对的知识点：
- 列表

客观题答错的知识点：
- 字典

主观题部分掌握（得分率 60%–79%）：
- 递归 (72.5%)

## 学习建议

1. 复习字典
2. 练习递归
";
        assert_eq!(md, expected);
    }

    #[test]
    fn empty_buckets_are_omitted() {
        let md = assemble(&[topic("图", 90.0)], &[], 90.0);
        assert!(md.contains("主观题掌握良好（得分率 ≥80%）：\n- 图 (90.0%)"));
        assert!(!md.contains("客观题答对"));
        assert!(!md.contains("主观题掌握较差"));
        assert!(md.ends_with("## 学习建议\n\n"));
    }

    #[test]
    fn suggestions_are_capped() {
        let suggestions: Vec<String> = (1..=7).map(|i| format!("建议{i}")).collect();
        let md = assemble(&[], &suggestions, 0.0);
        assert!(md.contains("5. 建议5"));
        assert!(!md.contains("6. 建议6"));
        assert!(md.contains("整体掌握情况：0% (较差)"));
    }

    #[test]
    fn render_lists_advisories() {
        let mut report = make_report();
        assert!(!render_report(&report).contains("## 说明"));

        report.advisories.push("学习建议生成失败".into());
        let md = render_report(&report);
        assert!(md.contains("整体掌握情况：80% (良好)"));
        assert!(md.contains("## 说明\n\n> 学习建议生成失败"));
    }

    #[test]
    fn writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.md");
        write_markdown_report(&make_report(), &path).unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("# 学生个性化学习报告"));
        assert!(content.contains("客观题答对的知识点：\n- 列表"));
    }

    #[test]
    fn unwritable_directory_names_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, "a file, not a directory").unwrap();

        let path = blocker.join("out").join("report.md");
        let err = write_markdown_report(&make_report(), &path).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("failed to create directory"), "got: {message}");
        assert!(message.contains("taken"));
    }
}
