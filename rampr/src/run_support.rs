use anyhow::Context as _;

pub(crate) fn merged_env(overrides: &[String]) -> anyhow::Result<rampr_core::EnvVars> {
    let overrides = overrides
        .iter()
        .map(|raw| parse_env_override(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(rampr_core::env_vars(std::env::vars().chain(overrides)))
}

fn parse_env_override(s: &str) -> anyhow::Result<(String, String)> {
    let (k, v) = s
        .split_once('=')
        .with_context(|| format!("invalid --env (expected KEY=VALUE): {s}"))?;
    if k.is_empty() {
        anyhow::bail!("invalid --env (empty KEY): {s}");
    }
    Ok((k.to_string(), v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_process_env() {
        let env = match merged_env(&["PATH=overridden".to_string(), "RAMPR_X=".to_string()]) {
            Ok(env) => env,
            Err(err) => panic!("merged_env failed: {err:#}"),
        };
        assert_eq!(rampr_core::lookup_env(&env, "PATH"), Some("overridden"));
        assert_eq!(rampr_core::lookup_env(&env, "RAMPR_X"), Some(""));
    }

    #[test]
    fn malformed_overrides_are_rejected() {
        assert!(parse_env_override("NOVALUE").is_err());
        assert!(parse_env_override("=x").is_err());
        assert_eq!(
            parse_env_override("A=b=c").ok(),
            Some(("A".to_string(), "b=c".to_string()))
        );
    }
}
