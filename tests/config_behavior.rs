use std::fs;
use std::time::Duration;

use snapline_core::{ConfigError, ConfigLoader, DataKind, EndpointKey, Provider, SnaplineConfig};

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("snapline.toml");
    fs::write(&path, contents).expect("write config");
    (dir, path)
}

// Each test uses its own env prefix; the process environment is shared.

#[test]
fn missing_file_falls_back_to_defaults() {
    let config = ConfigLoader::new()
        .with_config_path("/definitely/not/here/snapline.toml")
        .with_env_prefix("SNAPLINE_CFG_DEFAULTS_")
        .load()
        .expect("defaults load");

    assert_eq!(config, SnaplineConfig::default());
}

#[test]
fn file_values_override_defaults_and_replace_endpoints() {
    // Given a file that tunes retries and declares a single endpoint
    let (_dir, path) = write_config(
        r#"
[retry]
max_attempts = 2
initial_delay_ms = 100

[scheduler]
interval_secs = 60

[scheduler.record_caps]
usage = 1200

[[endpoints]]
key = "Games"
kind = "schedule"
provider = "stats"
path = "/games/{season}/{week}"
timeout_ms = 2500

[endpoints.retry]
max_attempts = 6
"#,
    );

    // When it is loaded
    let config = ConfigLoader::new()
        .with_config_path(&path)
        .with_env_prefix("SNAPLINE_CFG_FILE_")
        .load()
        .expect("file loads");

    // Then file values win and untouched sections keep their defaults
    assert_eq!(config.retry.max_attempts, 2);
    assert_eq!(config.retry.initial_delay_ms, 100);
    assert_eq!(config.retry.max_delay_ms, 8_000);
    assert_eq!(config.scheduler.config().interval, Duration::from_secs(60));
    assert_eq!(config.scheduler.record_caps.get(DataKind::Usage), 1_200);
    assert_eq!(config.scheduler.record_caps.get(DataKind::Schedule), 600);

    assert_eq!(config.endpoints.len(), 1);
    let games = config
        .endpoint(&EndpointKey::parse("games").expect("key"))
        .expect("games endpoint");
    assert_eq!(games.provider, Provider::Stats);
    assert_eq!(games.timeout_ms, Some(2_500));
    assert_eq!(config.retry_for(games).max_attempts, 6);
    assert_eq!(
        games.url_template(&config.upstream),
        "http://127.0.0.1:8700/games/{season}/{week}"
    );
}

#[test]
fn environment_overrides_the_file() {
    let (_dir, path) = write_config("[retry]\nmax_attempts = 2\n");
    std::env::set_var("SNAPLINE_CFG_ENV_RETRY__MAX_ATTEMPTS", "7");
    std::env::set_var("SNAPLINE_CFG_ENV_CACHE__CACHE_ESTIMATES", "true");

    let config = ConfigLoader::new()
        .with_config_path(&path)
        .with_env_prefix("SNAPLINE_CFG_ENV_")
        .load()
        .expect("env loads");

    std::env::remove_var("SNAPLINE_CFG_ENV_RETRY__MAX_ATTEMPTS");
    std::env::remove_var("SNAPLINE_CFG_ENV_CACHE__CACHE_ESTIMATES");
    assert_eq!(config.retry.max_attempts, 7);
    assert!(config.cache.cache_estimates);
}

#[test]
fn out_of_range_values_are_invalid() {
    std::env::set_var("SNAPLINE_CFG_RANGE_BREAKER__FAILURE_THRESHOLD", "0");

    let result = ConfigLoader::new()
        .with_env_prefix("SNAPLINE_CFG_RANGE_")
        .load();

    std::env::remove_var("SNAPLINE_CFG_RANGE_BREAKER__FAILURE_THRESHOLD");
    assert!(matches!(result, Err(ConfigError::Invalid { .. })));
}

#[test]
fn coverage_thresholds_must_be_fractions() {
    let (_dir, path) = write_config("[validation.coverage_threshold]\nsnap_pct = 30.0\n");

    let error = ConfigLoader::new()
        .with_config_path(&path)
        .with_env_prefix("SNAPLINE_CFG_COVERAGE_")
        .load()
        .expect_err("30.0 is not a fraction");

    assert!(error.to_string().contains("validation.coverage_threshold.snap_pct"));
}

#[test]
fn unknown_url_placeholders_are_rejected() {
    let (_dir, path) = write_config(
        r#"
[[endpoints]]
key = "depth-charts"
kind = "usage"
provider = "league"
path = "/v1/depth/{team}/{week}"
"#,
    );

    let error = ConfigLoader::new()
        .with_config_path(&path)
        .with_env_prefix("SNAPLINE_CFG_PLACEHOLDER_")
        .load()
        .expect_err("{team} is not supported");

    assert!(matches!(error, ConfigError::Invalid { ref field, .. } if field == "endpoints.depth-charts"));
    assert!(error.to_string().contains("{team}"));
}

#[test]
fn malformed_values_fail_to_load() {
    std::env::set_var("SNAPLINE_CFG_TYPE_RETRY__MAX_ATTEMPTS", "lots");

    let result = ConfigLoader::new()
        .with_env_prefix("SNAPLINE_CFG_TYPE_")
        .load();

    std::env::remove_var("SNAPLINE_CFG_TYPE_RETRY__MAX_ATTEMPTS");
    assert!(matches!(result, Err(ConfigError::Load(_))));
}

#[test]
fn unknown_data_kinds_fail_to_load() {
    let (_dir, path) = write_config(
        r#"
[[endpoints]]
key = "weather"
kind = "weather"
provider = "stats"
path = "/weather/{season}/{week}"
"#,
    );

    let result = ConfigLoader::new()
        .with_config_path(&path)
        .with_env_prefix("SNAPLINE_CFG_KIND_")
        .load();

    assert!(matches!(result, Err(ConfigError::Load(_))));
}
