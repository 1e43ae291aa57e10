use std::time::{Instant, SystemTime};

use rampr_http::{HttpClient, HttpResponse};
use smallvec::SmallVec;
use tokio_util::sync::CancellationToken;

use crate::outcome::{ExecutedRequest, FailureKind, RequestOutcome};
use crate::request::{CheckCondition, CheckSpec, RequestTemplate};

/// Issues exactly one request per call and classifies the result. Never
/// retries and never returns an error: transport problems become failed
/// outcomes.
#[derive(Debug, Clone, Default)]
pub struct RequestExecutor {
    client: HttpClient,
}

impl RequestExecutor {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    pub async fn execute(&self, template: &RequestTemplate) -> ExecutedRequest {
        self.execute_until(template, &CancellationToken::new()).await
    }

    /// Like [`execute`](Self::execute), but gives up as soon as `kill` fires.
    /// A killed request still yields an outcome: failed with
    /// [`FailureKind::Aborted`] and the time spent until the kill.
    pub async fn execute_until(
        &self,
        template: &RequestTemplate,
        kill: &CancellationToken,
    ) -> ExecutedRequest {
        let timestamp = SystemTime::now();
        let started = Instant::now();
        let res = tokio::select! {
            biased;
            _ = kill.cancelled() => {
                tracing::trace!("request killed");
                return failed(template, timestamp, elapsed_micros(started), FailureKind::Aborted);
            }
            res = self.client.request(template.to_http_request()) => res,
        };
        let duration_micros = elapsed_micros(started);

        match res {
            Ok(res) => {
                let success = template.expected_status.matches(res.status);
                ExecutedRequest {
                    checks: template.checks.iter().map(|c| check_passes(c, &res)).collect(),
                    outcome: RequestOutcome {
                        timestamp,
                        duration_micros,
                        success,
                        status: Some(res.status),
                        failure: (!success).then_some(FailureKind::Status),
                        bytes_sent: res.bytes_sent,
                        bytes_received: res.bytes_received,
                    },
                }
            }
            Err(err) => {
                let kind = err.transport_error_kind();
                tracing::trace!(error = %err, kind = %kind, "request failed");
                failed(template, timestamp, duration_micros, kind.into())
            }
        }
    }
}

fn elapsed_micros(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Outcome of a request that produced no response. Without one there is no
/// reliable way to tell how much of the request reached the wire.
fn failed(
    template: &RequestTemplate,
    timestamp: SystemTime,
    duration_micros: u64,
    kind: FailureKind,
) -> ExecutedRequest {
    ExecutedRequest {
        checks: SmallVec::from_elem(false, template.checks.len()),
        outcome: RequestOutcome {
            timestamp,
            duration_micros,
            success: false,
            status: None,
            failure: Some(kind),
            bytes_sent: 0,
            bytes_received: 0,
        },
    }
}

fn check_passes(check: &CheckSpec, res: &HttpResponse) -> bool {
    match &check.condition {
        CheckCondition::Status(code) => res.status == *code,
        CheckCondition::BodyContains(needle) => res
            .body_utf8()
            .is_some_and(|body| body.contains(needle.as_str())),
    }
}
