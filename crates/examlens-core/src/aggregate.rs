//! Per-topic mastery aggregation.
//!
//! Objective items contribute a correctness ratio, subjective items a score
//! ratio. Topics that mix both use the item-count-weighted average of the two.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Item, Section};

/// Final mastery of one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMastery {
    pub topic: String,
    /// 0–100.
    pub mastery: f64,
    pub objective_items: u32,
    pub subjective_items: u32,
}

impl TopicMastery {
    pub fn level(&self) -> MasteryLevel {
        MasteryLevel::from_mastery(self.mastery)
    }
}

/// Coarse mastery band used in prompts and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryLevel {
    /// ≥ 80
    Good,
    /// 60–79
    Fair,
    /// < 60
    Poor,
}

impl MasteryLevel {
    pub fn from_mastery(mastery: f64) -> Self {
        if mastery >= 80.0 {
            MasteryLevel::Good
        } else if mastery >= 60.0 {
            MasteryLevel::Fair
        } else {
            MasteryLevel::Poor
        }
    }

    /// Short label, e.g. "良好".
    pub fn short_label(self) -> &'static str {
        match self {
            MasteryLevel::Good => "良好",
            MasteryLevel::Fair => "一般",
            MasteryLevel::Poor => "较差",
        }
    }
}

impl fmt::Display for MasteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "掌握{}", self.short_label())
    }
}

/// Items sharing one topic label.
#[derive(Debug, Clone)]
pub struct TopicGroup<'a> {
    pub topic: String,
    pub items: Vec<&'a Item>,
}

/// Group every item of every section by topic label, in first-seen order.
pub fn group_by_topic(sections: &[Section]) -> Vec<TopicGroup<'_>> {
    let mut groups: Vec<TopicGroup<'_>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for item in sections.iter().flat_map(|s| s.items.iter()) {
        match index.get(item.topic.as_str()) {
            Some(&i) => groups[i].items.push(item),
            None => {
                index.insert(item.topic.as_str(), groups.len());
                groups.push(TopicGroup {
                    topic: item.topic.clone(),
                    items: vec![item],
                });
            }
        }
    }

    groups
}

/// `100 × correct / count` over objective items; `None` when there are none.
pub fn objective_mastery(items: &[&Item]) -> Option<f64> {
    let objective: Vec<_> = items
        .iter()
        .filter(|i| i.question_type.is_objective())
        .collect();
    if objective.is_empty() {
        return None;
    }
    let correct = objective.iter().filter(|i| i.is_correct()).count();
    Some(correct as f64 * 100.0 / objective.len() as f64)
}

/// `100 × earned / possible` over subjective items; `None` when there are
/// none, 0 when the possible score is 0.
pub fn subjective_mastery(items: &[&Item]) -> Option<f64> {
    let subjective: Vec<_> = items
        .iter()
        .filter(|i| i.question_type.is_subjective())
        .collect();
    if subjective.is_empty() {
        return None;
    }
    let earned: u64 = subjective.iter().map(|i| i.student_score as u64).sum();
    let possible: u64 = subjective.iter().map(|i| i.score as u64).sum();
    if possible == 0 {
        return Some(0.0);
    }
    Some(earned as f64 * 100.0 / possible as f64)
}

/// Preliminary mastery of one topic. An empty group scores 0.
pub fn topic_mastery(items: &[&Item]) -> f64 {
    let objective_count = items
        .iter()
        .filter(|i| i.question_type.is_objective())
        .count() as f64;
    let subjective_count = items.len() as f64 - objective_count;

    match (objective_mastery(items), subjective_mastery(items)) {
        (Some(o), Some(s)) => {
            (o * objective_count + s * subjective_count) / (objective_count + subjective_count)
        }
        (Some(o), None) => o,
        (None, Some(s)) => s,
        (None, None) => 0.0,
    }
}

/// Preliminary mastery for every group, in group order.
pub fn aggregate(groups: &[TopicGroup<'_>]) -> Vec<TopicMastery> {
    groups
        .iter()
        .map(|group| {
            let objective_items = group
                .items
                .iter()
                .filter(|i| i.question_type.is_objective())
                .count() as u32;
            TopicMastery {
                topic: group.topic.clone(),
                mastery: topic_mastery(&group.items),
                objective_items,
                subjective_items: group.items.len() as u32 - objective_items,
            }
        })
        .collect()
}

/// Group and aggregate in one step.
pub fn aggregate_sections(sections: &[Section]) -> Vec<TopicMastery> {
    aggregate(&group_by_topic(sections))
}
