//! The `examlens verify` command.

use std::path::PathBuf;

use anyhow::Result;

use examlens_core::model::ExamArtifact;
use examlens_core::verify::QuestionVerifier;
use examlens_providers::config::load_config_from;

pub async fn execute(
    question: PathBuf,
    max_fix_attempts: Option<u32>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let artifact: ExamArtifact = super::read_json(&question)?;
    anyhow::ensure!(
        !artifact.question.trim().is_empty(),
        "question text is empty in {}",
        question.display()
    );
    if artifact.kind().is_none() {
        eprintln!(
            "Warning: unknown question type '{}', using generic rules",
            artifact.question_type
        );
    }

    let mut verify_config = config.verify_config();
    if let Some(max) = max_fix_attempts {
        verify_config.max_fix_attempts = max;
    }

    let verifier = QuestionVerifier::new(super::build_extractor(&config)?, verify_config);
    let outcome = verifier.verify_and_fix(artifact).await;

    eprintln!(
        "{} after {} verification(s) and {} fix(es)",
        if outcome.compliant {
            "Compliant"
        } else {
            "Not compliant"
        },
        outcome.verifications,
        outcome.fixes
    );
    if let Some(suggestion) = outcome
        .verdicts
        .last()
        .and_then(|v| v.suggestion.as_deref())
        .filter(|_| !outcome.compliant)
    {
        eprintln!("Last suggestion: {suggestion}");
    }

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
