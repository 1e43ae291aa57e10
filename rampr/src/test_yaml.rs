use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;

use rampr_core::{
    CheckSpec, EngineOptions, EnvVars, RequestTemplate, Stage, StatusPredicate, TestConfig,
    ThresholdSpec,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct TestFileYaml {
    #[serde(default)]
    pub stages: Vec<StageYaml>,

    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdsYaml>,

    pub request: RequestYaml,

    /// Pause after every iteration.
    #[serde(default)]
    pub sleep: Option<YamlDuration>,

    #[serde(default)]
    pub options: OptionsYaml,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct StageYaml {
    pub duration: YamlDuration,
    pub target: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdsYaml {
    One(ThresholdEntryYaml),
    Many(Vec<ThresholdEntryYaml>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdEntryYaml {
    Expr(String),
    Detailed(ThresholdObjectYaml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ThresholdObjectYaml {
    pub threshold: String,
    #[serde(default)]
    pub abort_on_fail: bool,
    #[serde(default)]
    pub delay_abort_eval: Option<YamlDuration>,
    #[serde(default)]
    pub window: Option<YamlDuration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RequestYaml {
    #[serde(default = "default_method")]
    pub method: String,

    pub url: String,

    /// Env var that overrides `url` when set.
    #[serde(default)]
    pub url_env: Option<String>,

    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Option<String>,

    #[serde(default)]
    pub timeout: Option<YamlDuration>,

    #[serde(default)]
    pub expected_statuses: Vec<StatusEntryYaml>,

    #[serde(default)]
    pub checks: BTreeMap<String, CheckYaml>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum StatusEntryYaml {
    Code(u16),
    Range(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CheckYaml {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub body_contains: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct OptionsYaml {
    #[serde(default)]
    pub scheduler_tick: Option<YamlDuration>,
    #[serde(default)]
    pub evaluation_interval: Option<YamlDuration>,
    #[serde(default)]
    pub graceful_stop: Option<YamlDuration>,
    #[serde(default)]
    pub abort_grace: Option<YamlDuration>,
    #[serde(default)]
    pub metric_shards: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

fn deserialize_scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();

    for (k, v) in raw {
        let s = match v {
            serde_yaml::Value::Null => continue,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            _ => {
                return Err(serde::de::Error::custom(format!(
                    "header `{k}` must be a scalar value"
                )));
            }
        };
        out.insert(k, s);
    }

    Ok(out)
}

pub(crate) async fn load(path: &Path, env: &EnvVars) -> anyhow::Result<TestConfig> {
    let src = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read test file: {}", path.display()))?;
    parse(&src, env).with_context(|| format!("invalid test file: {}", path.display()))
}

pub(crate) fn parse(src: &str, env: &EnvVars) -> anyhow::Result<TestConfig> {
    let doc: TestFileYaml = serde_yaml::from_str(src)?;
    doc.into_config(env)
}

impl TestFileYaml {
    pub(crate) fn into_config(self, env: &EnvVars) -> anyhow::Result<TestConfig> {
        let stages = self
            .stages
            .into_iter()
            .map(|s| Stage::new(s.duration.into_inner(), s.target))
            .collect();

        let mut config = TestConfig::new(stages, self.request.into_template(env)?)
            .with_sleep(self.sleep.map(YamlDuration::into_inner).unwrap_or_default())
            .with_options(self.options.into_options());

        for (metric, entries) in self.thresholds {
            let entries = match entries {
                ThresholdsYaml::One(e) => vec![e],
                ThresholdsYaml::Many(v) => v,
            };
            for entry in entries {
                config = config.with_threshold(entry.into_spec(&metric));
            }
        }

        Ok(config)
    }
}

impl ThresholdEntryYaml {
    fn into_spec(self, metric: &str) -> ThresholdSpec {
        match self {
            Self::Expr(expr) => ThresholdSpec::new(metric, expr),
            Self::Detailed(t) => {
                let mut spec = ThresholdSpec::new(metric, t.threshold);
                if let Some(window) = t.window {
                    spec = spec.with_window(window.into_inner());
                }
                if t.abort_on_fail {
                    spec = spec.abort_on_fail(t.delay_abort_eval.map(YamlDuration::into_inner));
                }
                spec
            }
        }
    }
}

impl RequestYaml {
    fn into_template(self, env: &EnvVars) -> anyhow::Result<RequestTemplate> {
        let method = http::Method::from_bytes(self.method.trim().to_ascii_uppercase().as_bytes())
            .with_context(|| format!("invalid request method `{}`", self.method))?;
        let url = rampr_core::resolve_url(&self.url, self.url_env.as_deref(), env);

        let mut template = RequestTemplate::new(method, url);
        for (name, value) in self.headers {
            template = template.with_header(name, value);
        }
        if let Some(body) = self.body {
            template = template.with_body(body);
        }
        if let Some(timeout) = self.timeout {
            template = template.with_timeout(timeout.into_inner());
        }

        if !self.expected_statuses.is_empty() {
            let entries: Vec<String> = self
                .expected_statuses
                .into_iter()
                .map(|e| match e {
                    StatusEntryYaml::Code(code) => code.to_string(),
                    StatusEntryYaml::Range(raw) => raw,
                })
                .collect();
            let predicate = StatusPredicate::from_entries(entries.iter().map(String::as_str))?;
            template = template.with_expected_status(predicate);
        }

        for (name, check) in self.checks {
            let spec = match (check.status, check.body_contains) {
                (Some(code), None) => CheckSpec::status(name, code),
                (None, Some(needle)) => CheckSpec::body_contains(name, needle),
                _ => anyhow::bail!(
                    "check `{name}` must set exactly one of `status` or `bodyContains`"
                ),
            };
            template = template.with_check(spec);
        }

        Ok(template)
    }
}

impl OptionsYaml {
    fn into_options(self) -> EngineOptions {
        let defaults = EngineOptions::default();
        let pick = |v: Option<YamlDuration>, d: Duration| v.map_or(d, YamlDuration::into_inner);

        EngineOptions {
            scheduler_tick: pick(self.scheduler_tick, defaults.scheduler_tick),
            evaluation_interval: pick(self.evaluation_interval, defaults.evaluation_interval),
            graceful_stop: pick(self.graceful_stop, defaults.graceful_stop),
            abort_grace: pick(self.abort_grace, defaults.abort_grace),
            metric_shards: self.metric_shards.or(defaults.metric_shards),
            connect_timeout: defaults.connect_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEALTH: &str = r#"
stages:
  - { duration: 10s, target: 5 }
  - { duration: 20s, target: 10 }
  - { duration: 10s, target: 0 }
thresholds:
  http_req_failed: "rate<0.01"
  http_req_duration:
    - "p(95)<800"
    - { threshold: "p(99)<1500", abortOnFail: true, delayAbortEval: 10s, window: 30s }
request:
  method: get
  url: https://staging.example/api/health
  urlEnv: HEALTH_URL
  headers: { accept: application/json, x-retries: 0 }
  timeout: 5s
  expectedStatuses: [200, "300-302"]
  checks:
    status is 200: { status: 200 }
    says ok: { bodyContains: ok }
sleep: 1s
options: { schedulerTick: 500ms, gracefulStop: 0s }
"#;

    fn no_env() -> EnvVars {
        rampr_core::env_vars(Vec::<(String, String)>::new())
    }

    fn parse_ok(src: &str, env: &EnvVars) -> TestConfig {
        match parse(src, env) {
            Ok(c) => c,
            Err(err) => panic!("parse failed: {err:#}"),
        }
    }

    #[test]
    fn parses_the_full_document() {
        let c = parse_ok(HEALTH, &no_env());

        assert_eq!(c.stages.len(), 3);
        assert_eq!(c.total_duration(), Duration::from_secs(40));
        assert_eq!(c.max_target(), 10);
        assert_eq!(c.sleep, Duration::from_secs(1));

        assert_eq!(c.request.method, http::Method::GET);
        assert_eq!(c.request.url, "https://staging.example/api/health");
        assert_eq!(c.request.timeout, Duration::from_secs(5));
        assert!(c.request.headers.contains(&("x-retries".to_string(), "0".to_string())));
        assert!(c.request.expected_status.matches(301));
        assert!(!c.request.expected_status.matches(204));
        assert_eq!(c.request.checks.len(), 2);

        assert_eq!(c.options.scheduler_tick, Duration::from_millis(500));
        assert_eq!(c.options.graceful_stop, Duration::ZERO);
        assert_eq!(c.options.abort_grace, Duration::from_secs(5));

        assert_eq!(c.thresholds.len(), 3);
        let p99 = c
            .thresholds
            .iter()
            .find(|t| t.expression == "p(99)<1500")
            .unwrap_or_else(|| panic!("missing p99 threshold"));
        assert!(p99.abort_on_fail);
        assert_eq!(p99.delay_abort_eval, Some(Duration::from_secs(10)));
        assert_eq!(p99.window, Some(Duration::from_secs(30)));

        assert!(c.validate().is_ok());
    }

    #[test]
    fn url_env_overrides_the_file_url() {
        let env = rampr_core::env_vars([("HEALTH_URL", "http://127.0.0.1:8080/health")]);
        let c = parse_ok(HEALTH, &env);
        assert_eq!(c.request.url, "http://127.0.0.1:8080/health");
    }

    #[test]
    fn rejects_unknown_fields_and_ambiguous_checks() {
        let typo = "stages: [{ duration: 1s, target: 1 }]\nrequest: { url: \"http://x/\" }\nsleeep: 1s\n";
        assert!(parse(typo, &no_env()).is_err());

        let ambiguous = r#"
stages: [{ duration: 1s, target: 1 }]
request:
  url: "http://x/"
  checks:
    both: { status: 200, bodyContains: ok }
"#;
        assert!(parse(ambiguous, &no_env()).is_err());
    }

    #[test]
    fn bad_status_entries_are_rejected() {
        let src = "stages: [{ duration: 1s, target: 1 }]\nrequest: { url: \"http://x/\", expectedStatuses: [\"2xx\"] }\n";
        assert!(parse(src, &no_env()).is_err());
    }
}
