//! examlens CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "examlens",
    version,
    about = "Answer-sheet analysis and exam question verification"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze answer sheets and write learning reports
    Analyze {
        /// Answer sheet file, or a directory of .md/.txt sheets
        #[arg(long)]
        sheet: PathBuf,

        /// Output directory (default: output_dir from config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: markdown, json, all
        #[arg(long, default_value = "markdown")]
        format: String,

        /// Skip oracle refinement of topic mastery
        #[arg(long)]
        no_refine: bool,

        /// Max sheets analyzed concurrently (default: parallelism from config)
        #[arg(long)]
        parallelism: Option<usize>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Segment an answer sheet offline and show preliminary mastery
    Segment {
        /// Answer sheet file
        #[arg(long)]
        sheet: PathBuf,
    },

    /// Verify an exam question and fix it until compliant
    Verify {
        /// Question JSON file
        #[arg(long)]
        question: PathBuf,

        /// Upper bound on verification steps
        #[arg(long)]
        max_fix_attempts: Option<u32>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Grade one subjective answer
    Grade {
        /// Grading request JSON file
        #[arg(long)]
        input: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Extract exam settings from a free-text notice
    Settings {
        /// Text file with the notice
        #[arg(long)]
        text: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Analyze class chart descriptions and write teaching suggestions
    Chart {
        /// Chart description file, or a directory of .txt/.md descriptions
        #[arg(long)]
        input: PathBuf,

        /// Output directory (default: output_dir from config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and a sample answer sheet
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("examlens=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Analyze {
            sheet,
            output,
            format,
            no_refine,
            parallelism,
            config,
        } => {
            commands::analyze::execute(sheet, output, format, no_refine, parallelism, config).await
        }
        Commands::Segment { sheet } => commands::segment::execute(sheet),
        Commands::Verify {
            question,
            max_fix_attempts,
            config,
        } => commands::verify::execute(question, max_fix_attempts, config).await,
        Commands::Grade { input, config } => commands::grade::execute(input, config).await,
        Commands::Settings { text, config } => commands::settings::execute(text, config).await,
        Commands::Chart {
            input,
            output,
            config,
        } => commands::chart::execute(input, output, config).await,
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config).await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
