use std::time::SystemTime;

use rampr_http::HttpTransportErrorKind;
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// The request could not be built (bad URL, header, scheme).
    InvalidRequest,
    /// No connection could be established.
    Connect,
    /// The connection failed after it was established.
    Network,
    Timeout,
    BodyRead,
    /// A response arrived with a status outside the accepted set.
    Status,
    /// The run killed the request before it finished.
    Aborted,
}

impl From<HttpTransportErrorKind> for FailureKind {
    fn from(kind: HttpTransportErrorKind) -> Self {
        match kind {
            k if k.is_invalid_request() => Self::InvalidRequest,
            HttpTransportErrorKind::Connect => Self::Connect,
            HttpTransportErrorKind::Timeout => Self::Timeout,
            HttpTransportErrorKind::BodyRead => Self::BodyRead,
            _ => Self::Network,
        }
    }
}

/// Result of one request. Produced once per iteration and aggregated once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub timestamp: SystemTime,
    pub duration_micros: u64,
    pub success: bool,
    pub status: Option<u16>,
    pub failure: Option<FailureKind>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedRequest {
    pub outcome: RequestOutcome,
    /// Pass/fail per check, in template order.
    pub checks: SmallVec<[bool; 4]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_map_to_failure_kinds() {
        assert_eq!(
            FailureKind::from(HttpTransportErrorKind::InvalidUrl),
            FailureKind::InvalidRequest
        );
        assert_eq!(
            FailureKind::from(HttpTransportErrorKind::HeaderValue),
            FailureKind::InvalidRequest
        );
        assert_eq!(
            FailureKind::from(HttpTransportErrorKind::Connect),
            FailureKind::Connect
        );
        assert_eq!(
            FailureKind::from(HttpTransportErrorKind::Request),
            FailureKind::Network
        );
        assert_eq!(
            FailureKind::from(HttpTransportErrorKind::Timeout),
            FailureKind::Timeout
        );
        assert_eq!(FailureKind::Status.to_string(), "status");
        assert_eq!(FailureKind::Aborted.to_string(), "aborted");
    }
}
