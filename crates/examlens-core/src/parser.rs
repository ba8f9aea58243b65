//! Answer-sheet segmentation and item field extraction.
//!
//! An answer sheet is Markdown-like text. Each question type has a numbered
//! heading (`## 一、单选题（共10分）`), an optional section score line
//! (`得分：8`), and items introduced by `### 第N题`. Items carry labeled
//! fields such as `**学生答案**：` and `**正确答案**：`.
//!
//! Nothing here fails: a missing pattern degrades to 0, an empty string, or an
//! ordinal-derived label.

use regex::Regex;
use std::sync::LazyLock;

use crate::model::{Item, QuestionType, Section};

macro_rules! sheet_pattern {
    ($name:ident, $regex_str:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

// ── Section level ──────────────────────────────────────────────────────────
sheet_pattern!(RE_NUMBERED_HEADING, r"^##\s*[^\s#]+?、");
sheet_pattern!(RE_SECTION_NAME, r"^##\s*[^\s#]+?、\s*(.+?)\s*[（(]");
sheet_pattern!(RE_TOTAL_SCORE, r"共\s*(\d+)\s*分");
sheet_pattern!(RE_EARNED_SCORE, r"得分\s*[：:]\s*(\d+)");
sheet_pattern!(RE_SUMMARY_HEADING, &format!(r"^##\s*{SUMMARY_MARKER}"));

// ── Item level ─────────────────────────────────────────────────────────────
sheet_pattern!(RE_ITEM_MARKER, r"###\s*第\s*\d+\s*题");
sheet_pattern!(RE_ITEM_SCORE, r"[（(]\s*(\d+)\s*分\s*[）)]");
sheet_pattern!(RE_STUDENT_ANSWER, r"\*\*学生答案\*\*\s*[：:]");
sheet_pattern!(RE_REFERENCE_ANSWER, r"\*\*正确答案\*\*\s*[：:]");
sheet_pattern!(RE_ANY_FIELD, r"\*\*[^*\n]+\*\*\s*[：:]");
sheet_pattern!(RE_SCORE_LINE, r"(?m)^\s*得分\s*[：:]");

/// Heading text that ends the last (programming) section.
pub const SUMMARY_MARKER: &str = "考试总结";

// ---------------------------------------------------------------------------
// Segmentation
// ---------------------------------------------------------------------------

/// Split an answer sheet into typed sections.
///
/// Sections come back in the fixed type order. A type whose heading is not
/// found is simply absent.
pub fn segment(document: &str) -> Vec<Section> {
    let lines = line_offsets(document);

    QuestionType::SECTION_TYPES
        .iter()
        .filter_map(|&question_type| {
            let (start, end) = locate_section(document, &lines, question_type)?;
            Some(parse_section(&document[start..end], question_type))
        })
        .collect()
}

/// Byte offset and content (without line terminator) of every line.
fn line_offsets(document: &str) -> Vec<(usize, &str)> {
    let mut offset = 0;
    document
        .split_inclusive('\n')
        .map(|raw| {
            let start = offset;
            offset += raw.len();
            (start, raw.trim_end_matches(['\n', '\r']))
        })
        .collect()
}

fn is_summary_heading(line: &str) -> bool {
    RE_SUMMARY_HEADING
        .as_ref()
        .is_some_and(|re| re.is_match(line))
}

fn is_numbered_heading(line: &str) -> bool {
    RE_NUMBERED_HEADING
        .as_ref()
        .is_some_and(|re| re.is_match(line))
}

/// Byte range of the section for `question_type`, heading line included.
fn locate_section(
    document: &str,
    lines: &[(usize, &str)],
    question_type: QuestionType,
) -> Option<(usize, usize)> {
    let name = question_type.canonical_name();
    let heading_idx = lines
        .iter()
        .position(|(_, line)| is_numbered_heading(line) && line.contains(name))?;
    let start = lines[heading_idx].0;

    let stops_here = |line: &str| {
        if is_summary_heading(line) {
            return true;
        }
        question_type != QuestionType::Programming && is_numbered_heading(line)
    };

    let end = lines[heading_idx + 1..]
        .iter()
        .find(|(_, line)| stops_here(line))
        .map(|(offset, _)| *offset)
        .unwrap_or(document.len());

    Some((start, end))
}

/// Parse one section block (starting at its heading line).
pub fn parse_section(block: &str, question_type: QuestionType) -> Section {
    let heading = block.lines().next().unwrap_or_default();
    let name = RE_SECTION_NAME
        .as_ref()
        .and_then(|re| re.captures(heading))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| question_type.canonical_name().to_string());

    // Section-level scores live before the first item so an item's own
    // `得分` line is never mistaken for the section total.
    let preamble_end = RE_ITEM_MARKER
        .as_ref()
        .and_then(|re| re.find(block))
        .map(|m| m.start())
        .unwrap_or(block.len());
    let preamble = &block[..preamble_end];

    Section {
        question_type,
        name,
        total_score: first_number(&RE_TOTAL_SCORE, preamble).unwrap_or(0),
        student_score: first_number(&RE_EARNED_SCORE, preamble).unwrap_or(0),
        items: parse_items(block, question_type),
    }
}

/// Split a section block on `### 第N题` markers. Text before the first marker
/// is discarded; items are numbered from 1.
pub fn parse_items(block: &str, question_type: QuestionType) -> Vec<Item> {
    let Some(re) = RE_ITEM_MARKER.as_ref() else {
        return Vec::new();
    };

    re.split(block)
        .skip(1)
        .zip(1u32..)
        .map(|(chunk, ordinal)| parse_item(chunk, question_type, ordinal))
        .collect()
}

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

/// Extract one item's fields from the text following its `### 第N题` marker.
pub fn parse_item(block: &str, question_type: QuestionType, ordinal: u32) -> Item {
    let multiline = question_type.is_subjective();

    let topic = block
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}{ordinal}", question_type.canonical_name()));

    Item {
        ordinal,
        question_type,
        topic,
        score: first_number(&RE_ITEM_SCORE, block).unwrap_or(0),
        student_score: first_number(&RE_EARNED_SCORE, block).unwrap_or(0),
        reference_answer: capture_field(block, &RE_REFERENCE_ANSWER, multiline),
        student_answer: capture_field(block, &RE_STUDENT_ANSWER, multiline),
    }
}

/// Text after a labeled field marker.
///
/// Single-line capture stops at the end of the line. Multi-line capture runs
/// to the next `**label**：` marker, a score line, or the end of the block.
fn capture_field(block: &str, marker: &LazyLock<Option<Regex>>, multiline: bool) -> String {
    let Some(found) = marker.as_ref().and_then(|re| re.find(block)) else {
        return String::new();
    };
    let rest = &block[found.end()..];

    let end = if multiline {
        let next_field = RE_ANY_FIELD
            .as_ref()
            .and_then(|re| re.find(rest))
            .map(|m| m.start());
        let next_score = RE_SCORE_LINE
            .as_ref()
            .and_then(|re| re.find(rest))
            .map(|m| m.start());
        [next_field, next_score]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(rest.len())
    } else {
        rest.find('\n').unwrap_or(rest.len())
    };

    rest[..end].trim().to_string()
}

fn first_number(pattern: &LazyLock<Option<Regex>>, text: &str) -> Option<u32> {
    pattern
        .as_ref()?
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

// ---------------------------------------------------------------------------
// Consistency checks
// ---------------------------------------------------------------------------

/// Report suspicious but tolerated values in segmented sections.
///
/// The segmenter passes source numbers through unchanged; these warnings are
/// advisory and never block analysis.
pub fn check_sections(sections: &[Section]) -> Vec<String> {
    let mut warnings = Vec::new();

    for section in sections {
        if section.items.is_empty() {
            warnings.push(format!("{}: no items found", section.name));
        }
        if section.total_score == 0 {
            warnings.push(format!("{}: section total score missing or 0", section.name));
        }
        if section.student_score > section.total_score {
            warnings.push(format!(
                "{}: student score {} exceeds total {}",
                section.name, section.student_score, section.total_score
            ));
        }

        let item_total: u64 = section.items.iter().map(|i| u64::from(i.score)).sum();
        if section.total_score > 0
            && !section.items.is_empty()
            && item_total != u64::from(section.total_score)
        {
            warnings.push(format!(
                "{}: item scores sum to {item_total}, section says {}",
                section.name, section.total_score
            ));
        }

        for item in &section.items {
            if item.student_score > item.score {
                warnings.push(format!(
                    "{} 第{}题: student score {} exceeds item score {}",
                    section.name, item.ordinal, item.student_score, item.score
                ));
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_SHEET: &str = "\
# 期末考试答题卡

## 一、单选题（共4分）
得分：2

### 第1题
Python 中用于定义函数的关键字是？（2分）
**学生答案**：A
**正确答案**：A
得分：2

### 第2题
列表的长度用哪个函数获取？（2分）
**学生答案**：B
**正确答案**：C
得分：0

## 二、多选题（共3分）
得分：3

### 第1题
以下哪些是可变类型？（3分）
**学生答案**：AB
**正确答案**：AB
得分：3

## 三、判断题（共2分）
得分：0

### 第1题
元组可以修改。（2分）
**学生答案**：对
**正确答案**：错
得分：0

## 四、填空题（共2分）
得分：2

### 第1题
字典的键必须是____类型。（2分）
**学生答案**：不可变
**正确答案**：不可变
得分：2

## 五、简答题（共10分）
得分：7

### 第1题
简述列表与元组的区别。（10分）
**学生答案**：
列表可变，
元组不可变。
**正确答案**：
列表是可变序列，元组是不可变序列，
元组可作为字典键。
得分：7

## 六、编程题（共10分）
得分：6

### 第1题
编写函数求列表最大值。（10分）
**学生答案**：
def top(xs):
    return sorted(xs)[-1]
**正确答案**：
def top(xs):
    return max(xs)
得分：6

## 考试总结
本次考试整体表现良好。
";

    #[test]
    fn segments_single_choice_scenario() {
        let doc = "## 一、单选题（共10分）\n得分：8\n### 第1题\n题目内容（10分）\n";
        let sections = segment(doc);
        assert_eq!(sections.len(), 1);
        let s = &sections[0];
        assert_eq!(s.question_type, QuestionType::SingleChoice);
        assert_eq!(s.total_score, 10);
        assert_eq!(s.student_score, 8);
        assert_eq!(s.items.len(), 1);
        assert_eq!(s.name, "单选题");
    }

    #[test]
    fn segments_all_six_types_in_order() {
        let sections = segment(FULL_SHEET);
        let types: Vec<_> = sections.iter().map(|s| s.question_type).collect();
        assert_eq!(types, QuestionType::SECTION_TYPES.to_vec());

        let totals: Vec<_> = sections
            .iter()
            .map(|s| (s.total_score, s.student_score))
            .collect();
        assert_eq!(totals, vec![(4, 2), (3, 3), (2, 0), (2, 2), (10, 7), (10, 6)]);
    }

    #[test]
    fn objective_items_extract_single_line_fields() {
        let sections = segment(FULL_SHEET);
        let single = &sections[0];
        assert_eq!(single.items.len(), 2);

        let second = &single.items[1];
        assert_eq!(second.ordinal, 2);
        assert_eq!(second.topic, "列表的长度用哪个函数获取？（2分）");
        assert_eq!(second.score, 2);
        assert_eq!(second.student_score, 0);
        assert_eq!(second.student_answer, "B");
        assert_eq!(second.reference_answer, "C");
        assert!(!second.is_correct());
    }

    #[test]
    fn subjective_items_capture_multiple_lines() {
        let sections = segment(FULL_SHEET);
        let short = &sections[4].items[0];
        assert_eq!(short.student_answer, "列表可变，\n元组不可变。");
        assert_eq!(
            short.reference_answer,
            "列表是可变序列，元组是不可变序列，\n元组可作为字典键。"
        );
        assert_eq!(short.student_score, 7);

        let program = &sections[5].items[0];
        assert_eq!(
            program.student_answer,
            "def top(xs):\n    return sorted(xs)[-1]"
        );
        assert_eq!(program.reference_answer, "def top(xs):\n    return max(xs)");
    }

    #[test]
    fn programming_section_stops_at_summary() {
        let sections = segment(FULL_SHEET);
        let program = sections.last().unwrap();
        assert_eq!(program.question_type, QuestionType::Programming);
        assert_eq!(program.items.len(), 1);
        assert!(!program.items[0].reference_answer.contains("考试总结"));
    }

    #[test]
    fn summary_text_inside_an_item_does_not_end_the_section() {
        let doc = "\
## 一、编程题（共20分）
得分：15

### 第1题
打印考试总结标题。（10分）
**学生答案**：
print('考试总结')
**正确答案**：
print('考试总结')
得分：10

### 第2题
编写函数求和。（10分）
**学生答案**：
def add(a, b): return a + b
得分：5

## 考试总结
整体良好。
";
        let sections = segment(doc);
        let program = &sections[0];
        assert_eq!(program.items.len(), 2);
        assert_eq!(program.items[0].student_answer, "print('考试总结')");
        assert_eq!(program.items[0].topic, "打印考试总结标题。（10分）");
        assert_eq!(program.items[1].student_score, 5);
        assert!(!program.items[1].student_answer.contains("整体良好"));
    }

    #[test]
    fn huge_scores_do_not_overflow_checks() {
        let doc = "## 一、单选题（共4000000000分）\n得分：0\n\
                   ### 第1题\n题（3000000000分）\n得分：0\n\
                   ### 第2题\n题（3000000000分）\n得分：0\n";
        let sections = segment(doc);
        assert_eq!(sections[0].items[0].score, 3_000_000_000);
        let warnings = check_sections(&sections);
        assert!(warnings.iter().any(|w| w.contains("sum to 6000000000")));
    }

    #[test]
    fn absent_types_are_skipped() {
        let doc = "## 一、判断题（共2分）\n得分：2\n### 第1题\n题（2分）\n得分：2\n";
        let sections = segment(doc);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].question_type, QuestionType::TrueFalse);
    }

    #[test]
    fn missing_scores_default_to_zero() {
        let doc = "## 一、填空题\n### 第1题\n没有分值的题目\n**学生答案**：x\n";
        let sections = segment(doc);
        let s = &sections[0];
        assert_eq!(s.total_score, 0);
        assert_eq!(s.student_score, 0);
        assert_eq!(s.items[0].score, 0);
        assert_eq!(s.items[0].student_score, 0);
        assert_eq!(s.items[0].reference_answer, "");
        assert_eq!(s.items[0].student_answer, "x");
    }

    #[test]
    fn section_score_ignores_item_scores() {
        let doc = "## 一、单选题（共2分）\n### 第1题\n题（2分）\n得分：2\n";
        let sections = segment(doc);
        assert_eq!(sections[0].student_score, 0);
        assert_eq!(sections[0].items[0].student_score, 2);
    }

    #[test]
    fn display_name_falls_back_to_canonical() {
        let named = segment("## 一、单项选择题（单选题，共2分）\n");
        assert_eq!(named[0].name, "单项选择题");

        let unnamed = segment("## 一、单选题 共2分\n");
        assert_eq!(unnamed[0].name, "单选题");
        assert_eq!(unnamed[0].total_score, 2);
    }

    #[test]
    fn empty_item_block_gets_ordinal_label() {
        let doc = "## 一、多选题（共0分）\n### 第1题\n### 第2题\n真正的题目（3分）\n";
        let sections = segment(doc);
        let items = &sections[0].items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].topic, "多选题1");
        assert_eq!(items[1].topic, "真正的题目（3分）");
        assert_eq!(items[1].score, 3);
    }

    #[test]
    fn ascii_punctuation_is_accepted() {
        let doc = "## 一、判断题(共2分)\n得分: 1\n### 第1题\n题目(2分)\n**学生答案**: 对\n得分: 1\n";
        let s = &segment(doc)[0];
        assert_eq!((s.total_score, s.student_score), (2, 1));
        assert_eq!(s.items[0].score, 2);
        assert_eq!(s.items[0].student_answer, "对");
    }

    #[test]
    fn text_without_headings_yields_nothing() {
        assert!(segment("").is_empty());
        assert!(segment("随便写点什么\n### 第1题\n").is_empty());
    }

    #[test]
    fn check_sections_flags_inconsistencies() {
        let doc = "## 一、单选题（共2分）\n得分：5\n### 第1题\n题（3分）\n得分：4\n";
        let warnings = check_sections(&segment(doc));
        assert!(warnings.iter().any(|w| w.contains("exceeds total")));
        assert!(warnings.iter().any(|w| w.contains("sum to 3")));
        assert!(warnings.iter().any(|w| w.contains("exceeds item score")));

        assert!(check_sections(&segment(FULL_SHEET)).is_empty());
    }
}
