//! The `examlens analyze` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;

use examlens_core::analyzer::ExamAnalyzer;
use examlens_core::report::StudentReport;
use examlens_providers::config::load_config_from;
use examlens_report::json::write_json_summary;
use examlens_report::markdown::write_markdown_report;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Markdown,
    Json,
}

fn parse_formats(format: &str) -> Result<Vec<OutputFormat>> {
    if format == "all" {
        return Ok(vec![OutputFormat::Markdown, OutputFormat::Json]);
    }
    format
        .split(',')
        .map(|f| match f.trim() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            other => anyhow::bail!("unknown format '{other}' (expected markdown, json or all)"),
        })
        .collect()
}

/// A single file, or every `.md`/`.txt` file in a directory (sorted).
fn collect_sheets(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        anyhow::ensure!(path.exists(), "answer sheet not found: {}", path.display());
        return Ok(vec![path.to_path_buf()]);
    }

    let mut sheets: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e == "md" || e == "txt")
        })
        .collect();
    sheets.sort();
    anyhow::ensure!(
        !sheets.is_empty(),
        "no .md or .txt answer sheets in {}",
        path.display()
    );
    Ok(sheets)
}

fn write_outputs(
    report: &StudentReport,
    stem: &str,
    output: &Path,
    formats: &[OutputFormat],
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for format in formats {
        let path = match format {
            OutputFormat::Markdown => {
                let path = output.join(format!("{stem}-report.md"));
                write_markdown_report(report, &path)?;
                path
            }
            OutputFormat::Json => {
                let path = output.join(format!("{stem}-summary.json"));
                write_json_summary(report, &path)?;
                path
            }
        };
        written.push(path);
    }
    Ok(written)
}

pub async fn execute(
    sheet: PathBuf,
    output: Option<PathBuf>,
    format: String,
    no_refine: bool,
    parallelism: Option<usize>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let parallelism = parallelism.unwrap_or(config.parallelism);
    anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");

    let formats = parse_formats(&format)?;
    let sheets = collect_sheets(&sheet)?;
    let output = output.unwrap_or_else(|| config.output_dir.clone());
    std::fs::create_dir_all(&output)
        .with_context(|| format!("failed to create {}", output.display()))?;

    let mut analyzer_config = config.analyzer_config();
    if no_refine {
        analyzer_config.refine_mastery = false;
    }
    let analyzer = ExamAnalyzer::new(super::build_extractor(&config)?, analyzer_config);

    eprintln!(
        "examlens v{} — analyzing {} answer sheet(s) with {}",
        env!("CARGO_PKG_VERSION"),
        sheets.len(),
        config.default_model
    );

    let start = Instant::now();
    let semaphore = Arc::new(Semaphore::new(parallelism));
    let formats = Arc::new(formats);
    let output = Arc::new(output);
    let mut futures = FuturesUnordered::new();

    for path in sheets {
        let analyzer = analyzer.clone();
        let semaphore = Arc::clone(&semaphore);
        let formats = Arc::clone(&formats);
        let output = Arc::clone(&output);

        futures.push(async move {
            let inner = async {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| anyhow::anyhow!("semaphore closed"))?;

                let document = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let mut report = analyzer.analyze(&document).await;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                report.source = Some(file_name);

                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| report.id.to_string());
                let written = write_outputs(&report, &stem, &output, &formats)?;
                Ok::<_, anyhow::Error>((report, written))
            };
            (path.clone(), inner.await)
        });
    }

    let mut reports = Vec::new();
    let mut failed = 0usize;
    while let Some((path, result)) = futures.next().await {
        match result {
            Ok((report, written)) => {
                for file in &written {
                    eprintln!("  {} → {}", path.display(), file.display());
                }
                for note in &report.advisories {
                    eprintln!("  Warning: {}: {note}", path.display());
                }
                reports.push(report);
            }
            Err(e) => {
                failed += 1;
                eprintln!("  ERROR: {}: {e:#}", path.display());
            }
        }
    }

    reports.sort_by(|a, b| a.source.cmp(&b.source));
    print_summary(&reports);
    eprintln!(
        "\nComplete: {}/{} analyzed ({:.1}s)",
        reports.len(),
        reports.len() + failed,
        start.elapsed().as_secs_f64()
    );

    anyhow::ensure!(failed == 0, "{failed} answer sheet(s) could not be analyzed");
    Ok(())
}

fn print_summary(reports: &[StudentReport]) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec![
        "Sheet",
        "Score",
        "Overall %",
        "Topics",
        "Suggestions",
        "Degraded",
    ]);

    for report in reports {
        table.add_row(vec![
            Cell::new(report.source.as_deref().unwrap_or("-")),
            Cell::new(format!(
                "{}/{}",
                report.student_total_score(),
                report.total_score()
            )),
            Cell::new(format!("{:.2}%", report.overall_percentage())),
            Cell::new(report.mastery.len()),
            Cell::new(report.suggestions.len()),
            Cell::new(if report.is_degraded() { "yes" } else { "no" }),
        ]);
    }

    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats() {
        assert_eq!(parse_formats("markdown").unwrap(), vec![OutputFormat::Markdown]);
        assert_eq!(
            parse_formats("all").unwrap(),
            vec![OutputFormat::Markdown, OutputFormat::Json]
        );
        assert_eq!(
            parse_formats("json, md").unwrap(),
            vec![OutputFormat::Json, OutputFormat::Markdown]
        );
        assert!(parse_formats("html").is_err());
    }

    #[test]
    fn collects_sheets_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::write(dir.path().join("notes.json"), "").unwrap();

        let sheets = collect_sheets(dir.path()).unwrap();
        let names: Vec<_> = sheets
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.md"]);
    }

    #[test]
    fn missing_sheet_is_an_error() {
        let err = collect_sheets(Path::new("/nonexistent/sheet.md")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
