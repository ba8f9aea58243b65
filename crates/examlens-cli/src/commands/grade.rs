//! The `examlens grade` command.

use std::path::PathBuf;

use anyhow::Result;

use examlens_core::grading::{GradingRequest, ScoreJudge};
use examlens_providers::config::load_config_from;

pub async fn execute(input: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let request: GradingRequest = super::read_json(&input)?;

    let judge = ScoreJudge::new(super::build_extractor(&config)?);
    let judgment = judge.judge(&request).await?;

    eprintln!("Score: {}/{}", judgment.score, request.full_score);
    if judgment.needs_review {
        eprintln!("Warning: grading could not complete, manual review needed");
    }

    println!("{}", serde_json::to_string_pretty(&judgment)?);
    Ok(())
}
