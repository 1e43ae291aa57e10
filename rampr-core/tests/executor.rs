use std::time::{Duration, Instant};

use rampr_core::{CheckSpec, FailureKind, RequestExecutor, RequestTemplate, StatusPredicate};
use rampr_testserver::TestServer;
use tokio_util::sync::CancellationToken;

async fn server() -> TestServer {
    match TestServer::start().await {
        Ok(s) => s,
        Err(err) => panic!("failed to start test server: {err}"),
    }
}

#[tokio::test]
async fn ok_response_is_a_success_with_checks() {
    let server = server().await;
    let exec = RequestExecutor::default();

    let template = RequestTemplate::get(server.urls().health.clone())
        .with_check(CheckSpec::status("status is 200", 200))
        .with_check(CheckSpec::body_contains("body says ok", "\"ok\""))
        .with_check(CheckSpec::status("status is 201", 201));
    let executed = exec.execute(&template).await;

    let o = &executed.outcome;
    assert!(o.success);
    assert_eq!(o.status, Some(200));
    assert_eq!(o.failure, None);
    assert!(o.bytes_sent > 0);
    assert!(o.bytes_received > 0);
    assert!(o.duration_micros > 0);
    assert_eq!(executed.checks.as_slice(), &[true, true, false]);

    server.shutdown().await;
}

#[tokio::test]
async fn unexpected_status_is_a_failed_outcome() {
    let server = server().await;
    let exec = RequestExecutor::default();

    let executed = exec
        .execute(&RequestTemplate::get(server.urls().status(500)))
        .await;
    assert!(!executed.outcome.success);
    assert_eq!(executed.outcome.status, Some(500));
    assert_eq!(executed.outcome.failure, Some(FailureKind::Status));

    // The same status is fine once the predicate allows it.
    let lenient = RequestTemplate::get(server.urls().status(500))
        .with_expected_status(StatusPredicate::exact(500));
    assert!(exec.execute(&lenient).await.outcome.success);

    server.shutdown().await;
}

#[tokio::test]
async fn slow_endpoint_times_out_within_bound() {
    let server = server().await;
    let exec = RequestExecutor::default();

    let template = RequestTemplate::get(server.urls().hang.clone())
        .with_timeout(Duration::from_millis(200))
        .with_check(CheckSpec::status("status is 200", 200));
    let started = Instant::now();
    let executed = exec.execute(&template).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!executed.outcome.success);
    assert_eq!(executed.outcome.status, None);
    assert_eq!(executed.outcome.failure, Some(FailureKind::Timeout));
    assert!(executed.outcome.duration_micros >= 200_000);
    assert_eq!(executed.checks.as_slice(), &[false]);

    server.shutdown().await;
}

#[tokio::test]
async fn killed_request_still_yields_a_failed_outcome() {
    let server = server().await;
    let exec = RequestExecutor::default();

    let template = RequestTemplate::get(server.urls().hang.clone())
        .with_timeout(Duration::from_secs(30))
        .with_check(CheckSpec::status("status is 200", 200));
    let kill = CancellationToken::new();
    let killer = {
        let kill = kill.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            kill.cancel();
        })
    };

    let started = Instant::now();
    let executed = exec.execute_until(&template, &kill).await;
    let _ = killer.await;

    assert!(started.elapsed() < Duration::from_secs(5));
    let o = &executed.outcome;
    assert!(!o.success);
    assert_eq!(o.status, None);
    assert_eq!(o.failure, Some(FailureKind::Aborted));
    assert!(o.duration_micros >= 200_000, "duration={}", o.duration_micros);
    assert_eq!((o.bytes_sent, o.bytes_received), (0, 0));
    assert_eq!(executed.checks.as_slice(), &[false]);

    server.shutdown().await;
}

#[tokio::test]
async fn unreachable_host_is_a_network_failure() {
    let exec = RequestExecutor::new(rampr_http::HttpClient::new(Some(Duration::from_millis(200))));

    // TEST-NET-1, never routed.
    let template = RequestTemplate::get("http://192.0.2.1:81/").with_timeout(Duration::from_secs(1));
    let executed = exec.execute(&template).await;

    assert!(!executed.outcome.success);
    assert_eq!(executed.outcome.status, None);
    assert!(matches!(
        executed.outcome.failure,
        Some(FailureKind::Connect | FailureKind::Network | FailureKind::Timeout)
    ));
    assert_eq!(executed.outcome.bytes_received, 0);
}

#[tokio::test]
async fn malformed_url_never_reaches_the_network() {
    let exec = RequestExecutor::default();
    let executed = exec.execute(&RequestTemplate::get("not a url")).await;

    assert!(!executed.outcome.success);
    assert_eq!(executed.outcome.failure, Some(FailureKind::InvalidRequest));
}
