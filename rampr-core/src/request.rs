use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use rampr_http::HttpRequest;

use crate::{Error, Result};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Set of acceptable response statuses, as inclusive ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPredicate {
    ranges: Vec<(u16, u16)>,
}

impl Default for StatusPredicate {
    fn default() -> Self {
        Self {
            ranges: vec![(200, 399)],
        }
    }
}

impl StatusPredicate {
    pub fn exact(code: u16) -> Self {
        Self {
            ranges: vec![(code, code)],
        }
    }

    /// Builds a predicate from entries such as `"200"` or `"200-299"`.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let ranges = entries
            .into_iter()
            .map(parse_range)
            .collect::<Result<Vec<_>>>()?;
        if ranges.is_empty() {
            return Err(Error::InvalidStatusPredicate(String::new()));
        }
        Ok(Self { ranges })
    }

    #[inline]
    pub fn matches(&self, status: u16) -> bool {
        self.ranges
            .iter()
            .any(|(lo, hi)| (*lo..=*hi).contains(&status))
    }
}

fn parse_range(raw: &str) -> Result<(u16, u16)> {
    let raw = raw.trim();
    let invalid = || Error::InvalidStatusPredicate(raw.to_string());
    let parse = |s: &str| -> Result<u16> {
        let code: u16 = s.trim().parse().map_err(|_| invalid())?;
        if (100..=599).contains(&code) {
            Ok(code)
        } else {
            Err(invalid())
        }
    };

    let (lo, hi) = match raw.split_once('-') {
        Some((lo, hi)) => (parse(lo)?, parse(hi)?),
        None => {
            let code = parse(raw)?;
            (code, code)
        }
    };
    if lo > hi {
        return Err(invalid());
    }
    Ok((lo, hi))
}

impl FromStr for StatusPredicate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_entries(s.split(','))
    }
}

impl fmt::Display for StatusPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (lo, hi)) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if lo == hi {
                write!(f, "{lo}")?;
            } else {
                write!(f, "{lo}-{hi}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckCondition {
    Status(u16),
    BodyContains(String),
}

/// Named assertion on a response. Results feed the `checks` rate and never
/// change whether the request itself counts as failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSpec {
    pub name: String,
    pub condition: CheckCondition,
}

impl CheckSpec {
    pub fn status(name: impl Into<String>, code: u16) -> Self {
        Self {
            name: name.into(),
            condition: CheckCondition::Status(code),
        }
    }

    pub fn body_contains(name: impl Into<String>, needle: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: CheckCondition::BodyContains(needle.into()),
        }
    }
}

/// Declarative description of the one request a VU issues per iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTemplate {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Duration,
    pub expected_status: StatusPredicate,
    pub checks: Vec<CheckSpec>,
}

impl RequestTemplate {
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            expected_status: StatusPredicate::default(),
            checks: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(http::Method::GET, url)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_expected_status(mut self, expected: StatusPredicate) -> Self {
        self.expected_status = expected;
        self
    }

    #[must_use]
    pub fn with_check(mut self, check: CheckSpec) -> Self {
        self.checks.push(check);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|err| Error::InvalidRequest(format!("url `{}`: {err}", self.url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidRequest(format!(
                "url `{}` must use http or https",
                self.url
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidInterval("request.timeout"));
        }
        for (name, value) in &self.headers {
            http::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::InvalidRequest(format!("header name `{name}`")))?;
            http::header::HeaderValue::from_str(value)
                .map_err(|_| Error::InvalidRequest(format!("header `{name}` value")))?;
        }
        Ok(())
    }

    pub(crate) fn to_http_request(&self) -> HttpRequest {
        HttpRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            timeout: Some(self.timeout),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationContext {
    pub vu_id: u64,
    /// 0-based iteration number within this VU.
    pub iteration: u64,
    pub elapsed: Duration,
}

/// Produces the request for each iteration.
pub trait RequestBuilder: Send + Sync + 'static {
    fn build_request(&self, ctx: &IterationContext) -> Cow<'_, RequestTemplate>;
}

/// Sends the same template on every iteration.
#[derive(Debug, Clone)]
pub struct StaticRequest(RequestTemplate);

impl StaticRequest {
    pub fn new(template: RequestTemplate) -> Self {
        Self(template)
    }
}

impl RequestBuilder for StaticRequest {
    fn build_request(&self, _ctx: &IterationContext) -> Cow<'_, RequestTemplate> {
        Cow::Borrowed(&self.0)
    }
}
