use criterion::{black_box, criterion_group, criterion_main, Criterion};

use examlens_core::aggregate::{aggregate, group_by_topic, topic_mastery};
use examlens_core::model::{Item, QuestionType, Section};

fn make_sections(topics: usize, items_per_topic: usize) -> Vec<Section> {
    [QuestionType::SingleChoice, QuestionType::ShortAnswer]
        .into_iter()
        .map(|question_type| {
            let items: Vec<Item> = (0..topics * items_per_topic)
                .map(|i| Item {
                    ordinal: i as u32 + 1,
                    question_type,
                    topic: format!("知识点{}", i % topics),
                    score: 10,
                    student_score: (i % 11) as u32,
                    reference_answer: String::new(),
                    student_answer: String::new(),
                })
                .collect();
            Section {
                question_type,
                name: question_type.canonical_name().to_string(),
                total_score: items.iter().map(|i| i.score).sum(),
                student_score: items.iter().map(|i| i.student_score).sum(),
                items,
            }
        })
        .collect()
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");

    for (topics, per_topic) in [(5, 2), (50, 4), (200, 10)] {
        let sections = make_sections(topics, per_topic);
        group.bench_function(format!("{topics}_topics_x{per_topic}"), |b| {
            b.iter(|| aggregate(&group_by_topic(black_box(&sections))))
        });
    }

    group.finish();
}

fn bench_topic_mastery(c: &mut Criterion) {
    let sections = make_sections(1, 100);
    let items: Vec<&Item> = sections.iter().flat_map(|s| s.items.iter()).collect();

    c.bench_function("topic_mastery_200_items", |b| {
        b.iter(|| topic_mastery(black_box(&items)))
    });
}

criterion_group!(benches, bench_aggregate, bench_topic_mastery);
criterion_main!(benches);
