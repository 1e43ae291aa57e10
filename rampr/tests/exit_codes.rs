use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::Context as _;
use rampr_testserver::TestServer;

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn ensure_exit(out: &Output, expected: i32) -> anyhow::Result<()> {
    anyhow::ensure!(
        status_code(out.status) == expected,
        "expected exit code {expected}, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

fn test_file(url: &str, thresholds: &str) -> String {
    format!(
        r#"stages:
  - {{ duration: 600ms, target: 1 }}
thresholds:
{thresholds}
request:
  url: "{url}"
  timeout: 2s
sleep: 50ms
options: {{ schedulerTick: 50ms, evaluationInterval: 100ms, gracefulStop: 2s }}
"#
    )
}

fn write_test(dir: &Path, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

async fn run_rampr(args: Vec<String>) -> anyhow::Result<Output> {
    let exe = env!("CARGO_BIN_EXE_rampr");
    tokio::task::spawn_blocking(move || Command::new(exe).args(&args).output())
        .await
        .context("spawn_blocking join")?
        .context("run rampr binary")
}

fn path_arg(p: &Path) -> String {
    p.display().to_string()
}

#[test]
fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let exe = env!("CARGO_BIN_EXE_rampr");

    let out = Command::new(exe)
        .arg("run")
        .arg("./does-not-matter.yaml")
        .arg("--stage")
        .arg("10x:1")
        .output()
        .context("run rampr binary")?;

    ensure_exit(&out, 30)
}

#[test]
fn missing_test_file_exits_30() -> anyhow::Result<()> {
    let exe = env!("CARGO_BIN_EXE_rampr");

    let out = Command::new(exe)
        .arg("run")
        .arg("./no-such-test-file.yaml")
        .output()
        .context("run rampr binary")?;

    ensure_exit(&out, 30)
}

#[tokio::test]
async fn unresolvable_threshold_exits_30_without_traffic() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_test(
        dir.path(),
        "unknown.yaml",
        &test_file(&server.urls().health, "  no_such_metric: \"count>0\""),
    )?;

    let out = run_rampr(vec!["run".into(), path_arg(&path)]).await?;
    let requests = server.stats().requests_total();
    server.shutdown().await;

    ensure_exit(&out, 30)?;
    anyhow::ensure!(requests == 0, "expected no traffic, got {requests} requests");
    Ok(())
}

#[tokio::test]
async fn thresholds_failed_exit_11() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_test(
        dir.path(),
        "failing.yaml",
        &test_file(
            &server.urls().status(500),
            "  http_req_failed: \"rate<0.01\"",
        ),
    )?;

    let out = run_rampr(vec![
        "run".into(),
        path_arg(&path),
        "--output".into(),
        "json".into(),
    ])
    .await?;
    server.shutdown().await;

    ensure_exit(&out, 11)
}

#[tokio::test]
async fn passing_run_exits_0_and_exports_summary() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_test(
        dir.path(),
        "health.yaml",
        &test_file(
            &server.urls().health,
            "  http_req_failed: \"rate<0.01\"\n  http_req_duration: \"p(95)<1000\"",
        ),
    )?;
    let summary = dir.path().join("out/summary.json");

    let out = run_rampr(vec![
        "run".into(),
        path_arg(&path),
        "--output".into(),
        "json".into(),
        "--summary-export".into(),
        path_arg(&summary),
    ])
    .await?;
    server.shutdown().await;

    ensure_exit(&out, 0)?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    let last = stdout.lines().last().context("no output")?;
    let line: serde_json::Value = serde_json::from_str(last).context("parse summary line")?;
    anyhow::ensure!(line["kind"] == "summary", "unexpected last line: {last}");
    anyhow::ensure!(line["passed"] == true, "run did not pass: {last}");

    let exported: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&summary).context("read exported summary")?)?;
    anyhow::ensure!(exported["state"] == "completed");
    let reqs = exported["metrics"]["http_reqs"]["count"].as_u64().unwrap_or_default();
    anyhow::ensure!(reqs > 0, "no requests in exported summary");
    Ok(())
}

#[tokio::test]
async fn stage_flags_override_the_file() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_test(
        dir.path(),
        "override.yaml",
        &test_file(&server.urls().health, "  vus: \"max<=2\""),
    )?;

    let out = run_rampr(vec![
        "run".into(),
        path_arg(&path),
        "--stage".into(),
        "300ms:3".into(),
        "--stage".into(),
        "300ms:0".into(),
        "--output".into(),
        "json".into(),
    ])
    .await?;
    server.shutdown().await;

    // Three VUs exceed the file's `vus` threshold, proving the flags took effect.
    ensure_exit(&out, 11)
}

#[tokio::test]
async fn validate_reports_bad_and_good_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;

    let bad = write_test(
        dir.path(),
        "bad.yaml",
        &test_file("http://127.0.0.1:9/", "  http_req_duration: \"p95 < 800\""),
    )?;
    let out = run_rampr(vec!["validate".into(), path_arg(&bad)]).await?;
    ensure_exit(&out, 30)?;

    let wrong_kind = write_test(
        dir.path(),
        "wrong_kind.yaml",
        &test_file("http://127.0.0.1:9/", "  http_reqs: \"p(95)<800\""),
    )?;
    let out = run_rampr(vec!["validate".into(), path_arg(&wrong_kind)]).await?;
    ensure_exit(&out, 30)?;

    let good = write_test(
        dir.path(),
        "good.yaml",
        &test_file("http://127.0.0.1:9/", "  http_req_duration: \"p(95)<800\""),
    )?;
    let out = run_rampr(vec!["validate".into(), path_arg(&good)]).await?;
    ensure_exit(&out, 0)
}
