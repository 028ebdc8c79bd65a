use super::*;
use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;
use std::collections::HashMap;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |name| map.get(name).cloned()
}

#[test]
fn test_defaults_without_file() {
    let cfg = Config::from_toml_str("").unwrap();
    assert_eq!(cfg.storage.timeout_secs, 30);
    assert_eq!(cfg.import.data_dir, PathBuf::from("data"));
    assert_eq!(cfg.report_path(), PathBuf::from("data").join("import_report.txt"));
    assert_eq!(cfg.retry_policy(), RetryPolicy::default());
    assert_eq!(cfg.batch_options(EntityKind::Formulas), BatchOptions::for_kind(EntityKind::Formulas));
}

#[test]
fn test_batch_overrides_merge_with_defaults() {
    let cfg = Config::from_toml_str(
        r#"
        [import]
        data_dir = "fixtures"
        retry_attempts = 5

        [import.batches.herbs]
        batch_size = 50

        [import.batches.acupoints]
        delay_ms = 0
        "#,
    )
    .unwrap();

    let herbs = cfg.batch_options(EntityKind::Herbs);
    assert_eq!(herbs.batch_size, 50);
    assert_eq!(herbs.delay, EntityKind::Herbs.default_batch_delay());

    let acupoints = cfg.batch_options(EntityKind::Acupoints);
    assert_eq!(acupoints.batch_size, 20);
    assert!(acupoints.delay.is_zero());

    assert_eq!(cfg.retry_policy().max_attempts, 5);
    assert_eq!(cfg.report_path(), PathBuf::from("fixtures/import_report.txt"));
}

#[test]
fn test_unknown_batch_kind_is_rejected() {
    assert!(Config::from_toml_str("[import.batches.minerals]\nbatch_size = 1\n").is_err());
}

#[test]
fn test_credentials_require_url_and_key() {
    let cfg = Config::default();
    let err = cfg.credentials_from(env_of(&[("SUPABASE_ANON_KEY", "anon")])).unwrap_err();
    assert!(err.to_string().contains("SUPABASE_URL"));

    let err = cfg
        .credentials_from(env_of(&[("SUPABASE_URL", "https://x.supabase.co")]))
        .unwrap_err();
    assert!(err.to_string().contains("SUPABASE_SERVICE_ROLE_KEY"));

    let err = cfg
        .credentials_from(env_of(&[("SUPABASE_URL", "https://x.supabase.co"), ("SUPABASE_ANON_KEY", "  ")]))
        .unwrap_err();
    assert!(err.to_string().contains("key"));
}

#[test]
fn test_env_url_overrides_file_and_service_key_wins() {
    let cfg = Config::from_toml_str("[storage]\nurl = \"https://file.supabase.co\"\n").unwrap();
    let creds = cfg
        .credentials_from(env_of(&[
            ("SUPABASE_URL", "https://env.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("SUPABASE_SERVICE_ROLE_KEY", "service"),
        ]))
        .unwrap();
    assert_eq!(creds.url.as_str(), "https://env.supabase.co/");
    assert_eq!(creds.api_key.expose_secret(), "service");

    let creds = cfg.credentials_from(env_of(&[("SUPABASE_ANON_KEY", "anon")])).unwrap();
    assert_eq!(creds.url.host_str(), Some("file.supabase.co"));
}

#[test]
fn test_invalid_url_rejected() {
    let cfg = Config::default();
    for bad in ["not a url", "ftp://x.supabase.co"] {
        assert!(cfg
            .credentials_from(env_of(&[("SUPABASE_URL", bad), ("SUPABASE_ANON_KEY", "k")]))
            .is_err());
    }
}

#[test]
fn test_explicit_missing_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::from_file(&dir.path().join("nope.toml")).is_err());

    let path = dir.path().join("bencao.toml");
    std::fs::write(&path, "[storage]\ntimeout_secs = 5\n").unwrap();
    assert_eq!(Config::from_file(&path).unwrap().storage.timeout_secs, 5);
}
