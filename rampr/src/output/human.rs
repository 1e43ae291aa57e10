use std::path::Path;
use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_bytes, format_duration, format_ms_opt, format_rate};
use progress::HumanProgress;
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, test_path: &Path, config: &rampr_core::TestConfig) {
        println!("test: {}", test_path.display());
        println!(
            "target: {} {}",
            config.request.method, config.request.url
        );
        let stages = config
            .stages
            .iter()
            .map(|s| format!("{}:{}", format_duration(s.duration), s.target))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "stages: {stages} (total {}, max {} vus)",
            format_duration(config.total_duration()),
            config.max_target()
        );
        for t in &config.thresholds {
            let abort = if t.abort_on_fail { " [abortOnFail]" } else { "" };
            println!("threshold: {}: {}{abort}", t.metric, t.expression);
        }
        println!();
    }

    fn progress(&self) -> Option<rampr_core::ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u| {
            let m = &u.metrics;
            let errors_total = m
                .failed_requests_total
                .saturating_add(m.checks_failed_total);

            let mut message = format!(
                "{} vus={}/{} elapsed={} rps={} err={:.2}% p95={} errors={errors_total} recv={}",
                u.state,
                u.active_vus,
                u.target_vus,
                format_duration(u.elapsed),
                format_rate(m.rps_now),
                m.error_rate_now * 100.0,
                format_ms_opt(m.latency_p95_ms_now),
                format_bytes(m.bytes_received_total),
            );
            if let Some(stage) = &u.stage {
                message = format!(
                    "stage={}/{} remaining={} {message}",
                    stage.stage,
                    stage.stages,
                    format_duration(stage.stage_remaining)
                );
            }

            progress.update(u.total_duration, u.elapsed, message);
        }))
    }

    fn print_summary(&self, report: &rampr_core::RunReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(report));

        let failed: Vec<_> = report.failed_thresholds().collect();
        if !failed.is_empty() {
            eprintln!("thresholds failed:");
            for t in failed {
                match (&t.error, t.observed) {
                    (Some(err), _) => eprintln!("  {}: {} ({err})", t.metric, t.expression),
                    (None, Some(obs)) => {
                        eprintln!("  {}: {} (observed {obs})", t.metric, t.expression)
                    }
                    (None, None) => eprintln!("  {}: {} (no data)", t.metric, t.expression),
                }
            }
        }
        if let Some(reason) = &report.abort_reason {
            eprintln!("run aborted: {reason}");
        }

        Ok(())
    }
}
