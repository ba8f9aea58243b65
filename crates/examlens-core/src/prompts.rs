//! Prompt text for every oracle interaction.
//!
//! Verification rules are selected by an exhaustive match on
//! [`QuestionType`]; tags that do not parse fall back to a generic rule set.

use crate::model::{ExamArtifact, QuestionType};

// ---------------------------------------------------------------------------
// System prompts
// ---------------------------------------------------------------------------

pub const ANALYSIS_SYSTEM_PROMPT: &str =
    "你是一个专业的教育数据分析专家，能够从学生的答题卡中提取知识点并生成学习建议。";

pub const VERIFY_SYSTEM_PROMPT: &str =
    "你是一位严谨的命题审核专家，负责检查考试题目是否科学、规范、无歧义，并给出明确的修改建议。";

pub const FIX_SYSTEM_PROMPT: &str =
    "你是一位经验丰富的命题专家，能够根据审核意见修改考试题目，使其符合命题规范。";

pub const GRADING_SYSTEM_PROMPT: &str =
    "你是一位公正、细致的阅卷老师，严格依据评分细则给学生答案打分，并说明理由。";

pub const SETTINGS_SYSTEM_PROMPT: &str =
    "你是一位专业的考试管理专家，擅长从文本中准确提取考试相关的设置信息，并以结构化的JSON格式输出结果。";

pub const CHART_SYSTEM_PROMPT: &str =
    "你是一个专业的教育数据分析专家，能够从图表信息中提取洞察并生成教学建议。";

/// Marker appended when a prompt is cut to the configured length.
pub const TRUNCATION_MARKER: &str = "... (内容过长已截断)";

/// Cut `prompt` to at most `max_chars` characters (marker included).
pub fn limit_prompt(prompt: &str, max_chars: usize) -> String {
    if prompt.chars().count() <= max_chars {
        return prompt.to_string();
    }
    let keep = max_chars.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut out: String = prompt.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

// ---------------------------------------------------------------------------
// Answer-sheet analysis
// ---------------------------------------------------------------------------

/// One line per item for the labeling prompt.
pub struct LabelingLine<'a> {
    pub seq: usize,
    pub question_type: QuestionType,
    pub text: &'a str,
}

pub fn knowledge_point_prompt(lines: &[LabelingLine<'_>]) -> String {
    let mut prompt =
        String::from("请从以下题目中提取核心知识点，每个题目提取一个简洁明了的知识点名称：\n\n");
    for line in lines {
        prompt.push_str(&format!(
            "{}. [{}] {}\n",
            line.seq, line.question_type, line.text
        ));
    }
    prompt.push_str(
        "\n请为每个题目提取一个核心知识点，要求：\n\
         1. 知识点名称应简洁明了\n\
         2. 能准确反映题目的核心考查内容\n\
         3. 避免过于宽泛或过于具体的描述\n\
         4. 考查内容相同的题目使用相同的知识点名称\n\n\
         请以JSON格式返回结果，键为题号，值为知识点名称：\n\
         {\"knowledge_points\": {\"1\": \"数据可视化\", \"2\": \"列表操作\"}}\n",
    );
    prompt
}

/// Per-topic context for the refinement prompt.
pub struct RefinementTopic<'a> {
    pub topic: &'a str,
    pub preliminary: f64,
    /// One line per item, e.g. "单选题 第1题：得分 2/2".
    pub item_lines: Vec<String>,
}

pub fn mastery_refinement_prompt(topics: &[RefinementTopic<'_>]) -> String {
    let mut prompt = String::from(
        "请根据以下学生的答题情况，分析各知识点的掌握程度，以百分比形式给出评估结果：\n\n",
    );
    for topic in topics {
        prompt.push_str(&format!(
            "知识点：{}（初步掌握程度 {:.1}%）\n",
            topic.topic, topic.preliminary
        ));
        for line in &topic.item_lines {
            prompt.push_str(&format!("  - {line}\n"));
        }
    }
    prompt.push_str(
        "\n请为每个知识点给出一个掌握程度评分（0-100的数值），评分需要考虑：\n\
         1. 客观题的答对比例\n\
         2. 主观题的得分率\n\
         3. 题目难度和分值\n\
         4. 答题的稳定性\n\
         5. 知识点重要性\n\n\
         请参考提供的初步掌握程度，结合题目具体情况给出更准确的评分。\n\
         请以JSON格式返回结果，键为知识点名称，值为0-100的数值：\n\
         {\"mastery\": {\"数据可视化\": 85}}\n",
    );
    prompt
}

/// One section's line in the suggestion prompt.
pub struct SectionRate<'a> {
    pub name: &'a str,
    pub objective: bool,
    pub percentage: f64,
}

pub fn learning_suggestions_prompt(
    topics: &[(&str, f64, &str)],
    omitted: usize,
    sections: &[SectionRate<'_>],
) -> String {
    let mut prompt =
        String::from("请根据以下学生的考试情况，生成个性化的学习建议：\n\n知识点掌握情况：\n");
    for (topic, mastery, status) in topics {
        prompt.push_str(&format!("- {topic}：{mastery:.1}% ({status})\n"));
    }
    if omitted > 0 {
        prompt.push_str(&format!("... (另有{omitted}个知识点已省略)\n"));
    }

    prompt.push_str("\n各题型得分情况：\n");
    for section in sections {
        let rate = if section.objective { "正确率" } else { "得分率" };
        prompt.push_str(&format!(
            "- {}：{rate} {:.2}%\n",
            section.name, section.percentage
        ));
    }

    prompt.push_str(
        "\n请根据以上信息，生成3-5条具体的学习建议，要求：\n\
         1. 针对掌握较差的知识点给出具体的学习方法\n\
         2. 针对掌握一般的知识点给出巩固建议\n\
         3. 对掌握良好的知识点给出进一步提升的建议\n\
         4. 根据题型表现给出练习建议\n\
         5. 建议要具体可行，避免空泛的表述\n\n\
         请以JSON格式返回结果，每条建议为一个字符串，不要添加序号：\n\
         {\"suggestions\": [\"建议一\", \"建议二\"]}\n",
    );
    prompt
}

// ---------------------------------------------------------------------------
// Question verification
// ---------------------------------------------------------------------------

/// Checklist specific to one question type.
fn type_rules(question_type: QuestionType) -> &'static str {
    match question_type {
        QuestionType::SingleChoice => {
            "1. 题干表述清晰完整，不依赖选项才能理解\n\
             2. 有且只有一个正确选项，其余选项具有干扰性且明确错误\n\
             3. 选项长度、结构基本一致，不含“以上都对/都不对”等暗示\n\
             4. 答案与解析一致，解析能说明为何其他选项错误"
        }
        QuestionType::MultipleChoice => {
            "1. 题干明确说明为多选，表述清晰\n\
             2. 至少两个正确选项，每个错误选项都有明确的错误点\n\
             3. 选项之间不互相包含，不存在部分正确的模糊选项\n\
             4. 答案与解析一致，解析逐项说明正误"
        }
        QuestionType::TrueFalse => {
            "1. 命题为单一判断，不混合多个判断点\n\
             2. 命题在知识范围内有确定的对错，不存在争议\n\
             3. 避免使用“总是”“从不”等绝对化措辞暗示答案\n\
             4. 答案与解析一致"
        }
        QuestionType::FillBlank => {
            "1. 空格位置合理，填写内容为考查的关键知识\n\
             2. 每个空的答案唯一或可明确列举可接受的等价答案\n\
             3. 空格数量适当，上下文足以确定答案\n\
             4. 答案与解析一致"
        }
        QuestionType::ShortAnswer => {
            "1. 问题指向明确，考查范围与知识点匹配\n\
             2. 参考答案要点完整、层次清楚，便于按点给分\n\
             3. 题目难度与篇幅适合作答时间\n\
             4. 解析说明了各要点的依据"
        }
        QuestionType::Programming => {
            "1. 题目给出明确的输入输出要求与边界条件\n\
             2. 参考答案代码可以正确运行并覆盖边界情况\n\
             3. 对语言、函数签名等约束表述清楚\n\
             4. 解析说明了解题思路与复杂度"
        }
        QuestionType::Calculation => {
            "1. 已知条件完整，数据之间不矛盾\n\
             2. 参考答案的计算过程与结果正确，单位规范\n\
             3. 题目所求明确，结果唯一\n\
             4. 解析给出了关键计算步骤"
        }
    }
}

const GENERIC_RULES: &str = "1. 题干表述清晰、无歧义、无科学性错误\n\
     2. 答案正确且唯一（或明确给出评分要点）\n\
     3. 题目与所标注的题型要求相符\n\
     4. 答案与解析一致";

fn artifact_block(artifact: &ExamArtifact) -> String {
    format!(
        "题目：{}\n答案：{}\n答案解析：{}\n知识点：{}\n知识点描述：{}\n额外要求：{}\n",
        artifact.question,
        artifact.answer,
        artifact.answer_analysis,
        artifact.topic,
        artifact.topic_description,
        artifact.extra_requirement,
    )
}

/// Verification prompt for `artifact`, keyed by its question-type tag.
pub fn verification_prompt(artifact: &ExamArtifact) -> String {
    let (type_name, rules) = match artifact.kind() {
        Some(kind) => (kind.canonical_name().to_string(), type_rules(kind)),
        None => (artifact.question_type.clone(), GENERIC_RULES),
    };

    format!(
        "请审核以下{type_name}是否符合命题规范。\n\n\
         审核要点：\n{rules}\n\
         5. 题目与知识点及知识点描述相符\n\
         6. 若给出了额外要求，题目必须满足额外要求\n\n\
         {}\n\
         若完全合规，is_compliant 为 true，suggestion 为空字符串；\
         否则 is_compliant 为 false，并在 suggestion 中给出具体的修改建议。\n\
         请以JSON格式返回：{{\"is_compliant\": true/false, \"suggestion\": \"修正建议内容\"}}",
        artifact_block(artifact)
    )
}

/// Remediation prompt for `artifact` given the reviewer's suggestion.
pub fn fix_prompt(artifact: &ExamArtifact, suggestion: &str) -> String {
    format!(
        "请根据审核意见修改以下{}。\n\n{}\n题目类型：{}\n\n审核意见：{suggestion}\n\n\
         要求：只修改存在问题的部分，保持知识点不变；若额外要求要求改变题型，question_type 填写新的题型。\n\
         请以JSON格式返回修改后的完整题目，包含 question、answer、answer_analysis、question_type、\
         knowledge_point、knowledge_point_description、extra_requirement 七个字段。",
        artifact.question_type,
        artifact_block(artifact),
        artifact.question_type,
    )
}

// ---------------------------------------------------------------------------
// Score judgment
// ---------------------------------------------------------------------------

pub fn grading_criteria_prompt(
    question: &str,
    question_type: QuestionType,
    standard_answer: &str,
    full_score: u32,
) -> String {
    format!(
        "请为以下{question_type}设计评分细则。\n\n\
         题目：{question}\n标准答案：{standard_answer}\n满分：{full_score}分\n\n\
         要求：按得分要点分配分值，分值之和等于满分，并列出常见扣分情形。\n\
         请以JSON格式返回：{{\"grading_criteria\": \"评分细则内容\"}}"
    )
}

/// Rubric used when the oracle cannot design one.
pub fn generic_grading_criteria(full_score: u32) -> String {
    format!(
        "评分细则：对照标准答案逐点给分。答案完全正确得{full_score}分；\
         部分正确按要点比例给分；答案缺失或完全错误得0分。"
    )
}

pub fn score_judgment_prompt(
    question: &str,
    question_type: QuestionType,
    standard_answer: &str,
    full_score: u32,
    student_answer: &str,
    grading_criteria: &str,
) -> String {
    format!(
        "请根据评分细则给以下{question_type}的学生答案打分。\n\n\
         题目：{question}\n标准答案：{standard_answer}\n满分：{full_score}分\n\
         评分细则：{grading_criteria}\n\n学生答案：{student_answer}\n\n\
         分数为0到{full_score}之间的整数。\n\
         请以JSON格式返回：{{\"score\": <整数>, \"sj_reason\": \"评分理由\"}}"
    )
}

// ---------------------------------------------------------------------------
// Exam settings
// ---------------------------------------------------------------------------

pub fn exam_settings_prompt(text: &str) -> String {
    format!(
        "请从以下文本中提取考试设置信息：\n\n{text}\n\n\
         请提取以下信息（如果文本中没有相关信息，请将对应字段设置为null）：\n\
         - 考试时间（exam_time）：以\"YYYY-MM-DD HH:MM-HH:MM\"格式表示，例如\"2024-01-15 14:00-16:30\"\n\
         - 考试时长（duration）：以\"HH小时MM分钟\"格式表示，例如\"2小时30分钟\"\n\
         - 提前入场时间（early_entry_time）：单位为分钟的数字，例如\"15\"\n\
         - 禁止入场时间（late_entry_deadline）：开考后多少分钟禁止入场，例如\"10\"\n\
         - 交卷时间设置（submission_time_setting）：考试剩余多少分钟后可以交卷，例如\"30\"\n\
         - 及格线设置（passing_score_percentage）：及格分数百分比，例如\"60%\"\n\n\
         请以JSON格式输出，确保包含所有字段。"
    )
}

// ---------------------------------------------------------------------------
// Teacher charts
// ---------------------------------------------------------------------------

pub fn chart_analysis_prompt(description: &str) -> String {
    format!(
        "你是一名教育数据分析师，请从以下图表描述中提取关键的教育相关信息：\n\n\
         {description}\n\n\
         请重点关注：\n\
         1. 涉及的教学知识点名称\n\
         2. 学生的掌握程度数据（百分比、得分率）\n\
         3. 教学优势和薄弱环节\n\
         4. 需要改进的教学领域\n\n\
         chart_type 取值为：柱状图、折线图、饼图、散点图、直方图、其他。\n\
         data_insights 每项是一条教学相关的数据发现，特别是得分率、掌握程度等。\n\
         请以JSON格式返回：{{\"chart_type\": \"图表类型\", \"title\": \"图表标题\", \
         \"description\": \"从教学角度描述图表意义\", \"data_insights\": [\"数据发现\", ...], \
         \"summary\": \"教学改进的关键点\"}}"
    )
}

/// `insights` is a pre-rendered block of chart facts.
pub fn teaching_suggestions_prompt(insights: &str) -> String {
    format!(
        "你是一名教育数据分析专家，请基于以下图表分析结果生成一份《教学诊断与针对性教学建议》报告。\n\n\
         图表信息：\n{insights}\n\n\
         请严格按照以下结构生成报告：\n\n\
         # 一、总体诊断\n\
         - 从图表中识别学生的知识掌握情况（优势知识点、薄弱环节）\n\
         - 分析各知识点的得分率分布\n\
         - 指出教学中的重点和难点\n\n\
         # 二、针对性教学建议\n\
         1. 对于薄弱知识点（得分率低）：补救教学方案、课时安排、教学活动设计\n\
         2. 对于中等掌握知识点：巩固强化措施、概念澄清方法、实践应用训练\n\
         3. 教学实施建议：课堂活动设计、作业布置建议、评价反馈机制\n\n\
         要求：基于数据说话，引用具体的得分率；建议具体可操作；总字数控制在400-600字。\n\
         请以JSON格式返回，报告的每一行作为数组的一项：{{\"suggestions\": [\"# 一、总体诊断\", \"- ...\", ...]}}"
    )
}
