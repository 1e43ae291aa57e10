use std::sync::Arc;

/// Environment visible to a test definition, sorted by key.
pub type EnvVars = Arc<[(Arc<str>, Arc<str>)]>;

/// Builds an [`EnvVars`] from `(key, value)` pairs. Later pairs override
/// earlier ones with the same key.
pub fn env_vars<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> EnvVars
where
    K: Into<Arc<str>>,
    V: Into<Arc<str>>,
{
    let mut vars: Vec<(Arc<str>, Arc<str>)> = Vec::new();
    for (k, v) in pairs {
        let (k, v) = (k.into(), v.into());
        match vars.binary_search_by(|(existing, _)| existing.cmp(&k)) {
            Ok(i) => vars[i].1 = v,
            Err(i) => vars.insert(i, (k, v)),
        }
    }
    Arc::from(vars.into_boxed_slice())
}

pub fn lookup<'a>(env: &'a EnvVars, key: &str) -> Option<&'a str> {
    env.binary_search_by(|(k, _)| (**k).cmp(key))
        .ok()
        .map(|i| &*env[i].1)
}

/// Target URL: the value of `url_env` when it is set and non-blank,
/// otherwise `default`.
pub fn resolve_url<'a>(default: &'a str, url_env: Option<&str>, env: &'a EnvVars) -> &'a str {
    url_env
        .and_then(|key| lookup(env, key))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}
