use anyhow::Context as _;
use std::path::Path;

use rampr_core::{RunControls, RunController, RunReport};

use crate::cli::{RunArgs, ValidateArgs};
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::run_support::merged_env;
use crate::test_yaml;

pub(crate) async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let env = merged_env(&args.env).map_err(RunError::InvalidInput)?;
    let mut config = test_yaml::load(&args.test, &env)
        .await
        .map_err(RunError::InvalidInput)?;
    if !args.stages.is_empty() {
        config.stages = args.stages.clone();
    }

    let out = output::formatter(args.output);
    let mut controller = RunController::new(config.clone())?;
    controller.preflight()?;
    if let Some(progress) = out.progress() {
        controller = controller.with_progress(progress);
    }

    out.print_header(&args.test, &config);

    let handle = controller.start();
    let signals = tokio::spawn(handle_interrupts(handle.controls()));
    let result = handle.wait().await;
    signals.abort();
    let report = result?;

    out.print_summary(&report).map_err(RunError::RuntimeError)?;

    if let Some(path) = &args.summary_export {
        write_summary(path, &report)
            .await
            .map_err(RunError::RuntimeError)?;
    }

    Ok(ExitCode::from_report(&report))
}

/// Parses the test file and resolves its thresholds without sending traffic.
pub(crate) async fn validate(args: ValidateArgs) -> Result<ExitCode, RunError> {
    let env = merged_env(&args.env).map_err(RunError::InvalidInput)?;
    let config = test_yaml::load(&args.test, &env)
        .await
        .map_err(RunError::InvalidInput)?;

    let controller = RunController::new(config.clone())?;
    let thresholds = controller.preflight()?;

    println!(
        "{}: ok ({} stages, {} thresholds, {} {})",
        args.test.display(),
        config.stages.len(),
        thresholds.len(),
        config.request.method,
        config.request.url
    );
    Ok(ExitCode::Success)
}

/// First Ctrl-C stops gracefully, a second one aborts.
async fn handle_interrupts(controls: RunControls) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::warn!("interrupt received, stopping");
    eprintln!("stopping gracefully (press Ctrl-C again to abort)");
    controls.request_stop();

    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tracing::warn!("second interrupt received, aborting");
    controls.abort();
}

async fn write_summary(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let doc = output::summary_document(report);
    let json = serde_json::to_vec_pretty(&doc).context("failed to encode summary")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create summary dir: {}", parent.display()))?;
    }
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write summary: {}", path.display()))
}
