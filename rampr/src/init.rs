mod fs;

use anyhow::Context as _;

use crate::cli::InitArgs;

const STARTER_TEST: &str = r#"# rampr test file. Run it with `rampr run <file>`.
stages:
  - { duration: 10s, target: 5 }
  - { duration: 20s, target: 5 }
  - { duration: 10s, target: 0 }

thresholds:
  http_req_failed: "rate<0.01"
  http_req_duration:
    - "p(95)<800"
    - { threshold: "p(99)<1500", abortOnFail: true, delayAbortEval: 10s }

request:
  method: GET
  url: "http://localhost:8080/health"
  # Overrides `url` when the variable is set, e.g. `--env BASE_URL=...`.
  urlEnv: BASE_URL
  timeout: 5s
  expectedStatuses: ["200-299"]
  checks:
    status is 200: { status: 200 }

sleep: 1s
"#;

pub(crate) async fn init(args: InitArgs) -> anyhow::Result<()> {
    let root = &args.dir;
    tokio::fs::create_dir_all(root)
        .await
        .with_context(|| format!("failed to create dir: {}", root.display()))?;

    let path = root.join(&args.file);
    fs::write_file(&path, STARTER_TEST, args.force).await?;
    println!("created {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starter_test_parses() {
        let env = rampr_core::env_vars(Vec::<(String, String)>::new());
        match crate::test_yaml::parse(STARTER_TEST, &env) {
            Ok(config) => {
                assert_eq!(config.stages.len(), 3);
                assert_eq!(config.thresholds.len(), 3);
            }
            Err(err) => panic!("starter test does not parse: {err:#}"),
        }
    }

    #[tokio::test]
    async fn init_refuses_to_overwrite_without_force() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(err) => panic!("tempdir: {err}"),
        };
        let args = || InitArgs {
            dir: dir.path().join("nested"),
            force: false,
            file: "rampr.yaml".to_string(),
        };

        if let Err(err) = init(args()).await {
            panic!("first init failed: {err:#}");
        }
        assert!(init(args()).await.is_err());

        let forced = InitArgs {
            force: true,
            ..args()
        };
        if let Err(err) = init(forced).await {
            panic!("forced init failed: {err:#}");
        }
    }
}
