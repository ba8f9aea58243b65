//! The `examlens segment` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use examlens_core::aggregate::aggregate_sections;
use examlens_core::parser::{check_sections, segment};

pub fn execute(sheet: PathBuf) -> Result<()> {
    let document = std::fs::read_to_string(&sheet)
        .with_context(|| format!("failed to read {}", sheet.display()))?;

    let sections = segment(&document);
    anyhow::ensure!(
        !sections.is_empty(),
        "no sections recognized in {}",
        sheet.display()
    );

    let mut table = Table::new();
    table.set_header(vec!["Section", "Type", "Items", "Score", "Percentage"]);
    for section in &sections {
        table.add_row(vec![
            Cell::new(&section.name),
            Cell::new(section.question_type.canonical_name()),
            Cell::new(section.items.len()),
            Cell::new(format!("{}/{}", section.student_score, section.total_score)),
            Cell::new(format!("{:.2}%", section.percentage())),
        ]);
    }
    println!("{table}");

    let mut topics = Table::new();
    topics.set_header(vec!["Topic", "Objective", "Subjective", "Mastery", "Level"]);
    for record in aggregate_sections(&sections) {
        topics.add_row(vec![
            Cell::new(&record.topic),
            Cell::new(record.objective_items),
            Cell::new(record.subjective_items),
            Cell::new(format!("{:.1}%", record.mastery)),
            Cell::new(record.level().short_label()),
        ]);
    }
    println!("{topics}");

    for warning in check_sections(&sections) {
        eprintln!("Warning: {warning}");
    }

    Ok(())
}
