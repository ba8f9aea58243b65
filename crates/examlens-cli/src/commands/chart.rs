//! The `examlens chart` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use examlens_core::chart::{ChartAnalysis, ChartAnalyzer};
use examlens_providers::config::load_config_from;
use examlens_report::chart::{
    render_chart_report, render_comprehensive_chart_report, write_chart_report,
};

/// Report name used when a directory of charts is analyzed together.
const COMPREHENSIVE_STEM: &str = "charts";

/// A single description file, or every `.txt`/`.md` file in a directory (sorted).
fn collect_descriptions(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        anyhow::ensure!(path.exists(), "chart description not found: {}", path.display());
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e == "txt" || e == "md")
        })
        .collect();
    files.sort();
    anyhow::ensure!(
        !files.is_empty(),
        "no .txt or .md chart descriptions in {}",
        path.display()
    );
    Ok(files)
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chart".to_string())
}

pub async fn execute(
    input: PathBuf,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let output = output.unwrap_or_else(|| config.output_dir.clone());
    let files = collect_descriptions(&input)?;

    let analyzer = ChartAnalyzer::new(&super::build_extractor(&config)?);
    let mut analyses: Vec<ChartAnalysis> = Vec::with_capacity(files.len());
    for file in &files {
        let description = std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let name = stem(file);
        let result = analyzer.analyze(&description, Some(&name)).await;
        if result.defaulted {
            eprintln!(
                "Warning: {}: chart could not be analyzed after {} attempt(s), using a generic analysis",
                file.display(),
                result.attempts
            );
        }
        analyses.push(result.value);
    }

    let (report_stem, markdown) = if input.is_dir() {
        let suggestions = analyzer.comprehensive_suggestions(&analyses).await;
        if suggestions.defaulted {
            eprintln!("Warning: comprehensive teaching suggestions could not be generated");
        }
        (
            COMPREHENSIVE_STEM.to_string(),
            render_comprehensive_chart_report(&analyses, &suggestions.value),
        )
    } else {
        let analysis = analyses.first().context("no chart analyzed")?;
        let suggestions = analyzer.teaching_suggestions(analysis).await;
        if suggestions.defaulted {
            eprintln!("Warning: teaching suggestions could not be generated");
        }
        (stem(&input), render_chart_report(analysis, &suggestions.value))
    };

    let path = output.join(format!("{report_stem}-chart-report.md"));
    write_chart_report(&markdown, &path)?;

    println!("{}", serde_json::to_string_pretty(&analyses)?);
    eprintln!("Wrote {}", path.display());
    Ok(())
}
