use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "wfbench",
    version,
    about = "Benchmark LLMs on rewriting code to a workflow-orchestration SDK"
)]
pub struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Clone)]
pub enum Command {
    /// Run every selected model over the corpus and write reports
    Run(RunArgs),
    /// List the cases discovered in the corpus
    Cases(CasesArgs),
    /// Re-aggregate and render a saved outcomes.json
    Report(ReportArgs),
    Version,
}

#[derive(Parser, Clone, Debug)]
pub struct RunArgs {
    #[arg(long, default_value = "wfbench.yaml", env = "WFBENCH_CONFIG")]
    pub config: PathBuf,

    /// Corpus root (overrides `corpus` in the config)
    #[arg(long)]
    pub cases: Option<PathBuf>,

    /// Only run cases for these languages
    #[arg(long = "language", value_delimiter = ',')]
    pub languages: Vec<String>,

    /// Candidate model ids (overrides `candidates` in the config)
    #[arg(long, value_delimiter = ',')]
    pub models: Vec<String>,

    /// Judge model id (overrides `judge` in the config)
    #[arg(long, env = "WFBENCH_JUDGE")]
    pub judge: Option<String>,

    /// Maximum pairs in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Directory with refactor.txt / grading.txt template overrides
    #[arg(long)]
    pub templates: Option<PathBuf>,

    /// Output directory for outcomes.json and summary.json
    #[arg(long, default_value = "wfbench-out")]
    pub out: PathBuf,

    /// Prior outcomes.json; pairs with a valid verdict are not re-run
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// With --resume, also re-run pairs whose generation failed
    #[arg(long, requires = "resume")]
    pub retry_failed_generation: bool,

    /// List every pair that scored 0 through infrastructure failure
    #[arg(long)]
    pub show_failures: bool,

    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Parser, Clone, Debug)]
pub struct CasesArgs {
    #[arg(long, default_value = "wfbench.yaml", env = "WFBENCH_CONFIG")]
    pub config: PathBuf,

    /// Corpus root; when given the config file is optional
    #[arg(long)]
    pub cases: Option<PathBuf>,

    #[arg(long = "language", value_delimiter = ',')]
    pub languages: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
pub struct ReportArgs {
    /// outcomes.json written by `wfbench run`
    #[arg(long)]
    pub outcomes: PathBuf,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,

    /// Also write summary.json to this path
    #[arg(long)]
    pub summary: Option<PathBuf>,

    #[arg(long)]
    pub show_failures: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    /// Score table
    Text,
    /// summary.json
    Json,
    /// The full outcome set, re-serialized
    Outcomes,
}
