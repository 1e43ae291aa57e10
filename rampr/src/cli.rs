use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use rampr_core::Stage;

/// Parses `DURATION:TARGET`, e.g. `30s:10`.
fn parse_stage(input: &str) -> Result<Stage, String> {
    let (duration, target) = input
        .trim()
        .rsplit_once(':')
        .ok_or_else(|| format!("invalid stage '{input}' (expected DURATION:TARGET, e.g. 30s:10)"))?;

    let duration = humantime::parse_duration(duration.trim())
        .map_err(|err| format!("invalid stage duration '{duration}': {err}"))?;
    let target: u64 = target
        .trim()
        .parse()
        .map_err(|_| format!("invalid stage target '{target}' (expected a non-negative integer)"))?;

    Ok(Stage::new(duration, target))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar on stderr and a text summary on stdout.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) and a final summary line to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "rampr",
    author,
    version,
    about = "Staged HTTP load generator with pass/fail thresholds",
    long_about = "rampr drives a pool of virtual users through a sequence of ramp stages against one HTTP endpoint and checks the aggregated metrics against thresholds.\n\nA test is described in a YAML file: stages, thresholds, the request template and engine options.\n\nEnvironment variables of the current process are visible to `request.urlEnv`; use `--env KEY=VALUE` to add or override values.",
    after_help = "Examples:\n  rampr init\n  rampr run rampr.yaml\n  rampr run rampr.yaml --stage 10s:5 --stage 20s:10 --stage 10s:0\n  rampr run rampr.yaml --env HEALTH_URL=http://localhost:8080/health --output json\n  rampr validate rampr.yaml"
)]
pub struct Cli {
    /// Log level used when RAMPR_LOG is not set (e.g. warn, info, debug, rampr_core=trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test
    #[command(
        long_about = "Run the test described by a YAML file.\n\nCLI flags override values from the file. Ctrl-C once stops gracefully; a second Ctrl-C aborts."
    )]
    Run(RunArgs),

    /// Check a test file without sending any traffic
    Validate(ValidateArgs),

    /// Write a starter test file
    Init(InitArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Target directory to initialize (created if missing)
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,

    /// Test filename to create in the target directory
    #[arg(long, default_value = "rampr.yaml")]
    pub file: String,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Path to the test file (.yaml)
    pub test: PathBuf,

    /// Add/override env vars visible to the test file (repeatable, KEY=VALUE).
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the test file (.yaml)
    pub test: PathBuf,

    /// Replace the file's stages (repeatable, DURATION:TARGET, e.g. 30s:10)
    #[arg(long = "stage", value_name = "DURATION:TARGET", value_parser = parse_stage)]
    pub stages: Vec<Stage>,

    /// Add/override env vars visible to the test file (repeatable, KEY=VALUE).
    /// CLI-provided vars override the current process env.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Also write the JSON summary to this file
    #[arg(long, value_name = "PATH")]
    pub summary_export: Option<PathBuf>,
}
