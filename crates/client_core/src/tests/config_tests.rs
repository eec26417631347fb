use super::*;
use crate::MemoryPreferenceStore;

const SAMPLE: &str = r#"
api_base_url = "https://profile.example.test/api/"
season = "5"

[[credential_options]]
label = "main"
value = "token-main"

[[credential_options]]
label = "alt"
value = "token-alt"

[[collects]]
title = "Keys"

[[collects.info]]
id = "1"
pid = "p-1"
name = "Blue key"
img = "blue.png"
"#;

#[test]
fn parses_settings_file_with_defaults_for_missing_fields() {
    let settings = parse_settings(SAMPLE).expect("settings");
    assert_eq!(settings.api_base_url, "https://profile.example.test/api/");
    assert_eq!(settings.database_url, ClientSettings::default().database_url);
    assert_eq!(settings.season, Some(SeasonId::from("5")));
    assert!(settings.credential.is_none());
    assert_eq!(settings.credential_options.len(), 2);
    assert_eq!(settings.collects.len(), 1);
    assert_eq!(settings.collects[0].info[0].pid, "p-1");
}

#[test]
fn malformed_settings_are_reported() {
    let err = parse_settings("season = [").expect_err("malformed");
    assert!(matches!(err, SyncError::InvalidConfig(_)));
}

#[test]
fn env_overrides_take_precedence_over_file() {
    let mut settings = parse_settings(SAMPLE).expect("settings");
    apply_env_overrides(&mut settings, |name| match name {
        "APP__API_BASE_URL" => Some("http://127.0.0.1:9999/".to_string()),
        "APP__CK" => Some("token-env".to_string()),
        _ => None,
    });
    assert_eq!(settings.api_base_url, "http://127.0.0.1:9999/");
    assert_eq!(settings.credential, Some(Credential::from("token-env")));
    assert_eq!(settings.season, Some(SeasonId::from("5")));
}

#[test]
fn missing_settings_file_falls_back_to_defaults() {
    let path = std::env::temp_dir().join("profile_settings_that_does_not_exist.toml");
    let settings = load_settings_from(&path, |name| {
        (name == "APP__SEASONID").then(|| "2".to_string())
    })
    .expect("settings");
    assert_eq!(settings.api_base_url, ClientSettings::default().api_base_url);
    assert_eq!(settings.season, Some(SeasonId::from("2")));
}

#[test]
fn resolve_prefers_stored_then_settings_then_defaults() {
    let settings = parse_settings(SAMPLE).expect("settings");

    let resolved = SyncConfig::resolve(&settings, None, None).expect("resolve");
    assert_eq!(resolved, SyncConfig::new("token-main", "5"));

    let resolved = SyncConfig::resolve(
        &settings,
        Some("token-stored".to_string()),
        Some("3".to_string()),
    )
    .expect("resolve");
    assert_eq!(resolved, SyncConfig::new("token-stored", "3"));

    let resolved =
        SyncConfig::resolve(&settings, Some(String::new()), Some(String::new())).expect("resolve");
    assert_eq!(resolved, SyncConfig::new("token-main", "5"));

    let bare = ClientSettings {
        credential: Some(Credential::from("token-bare")),
        ..ClientSettings::default()
    };
    let resolved = SyncConfig::resolve(&bare, None, None).expect("resolve");
    assert_eq!(resolved, SyncConfig::new("token-bare", DEFAULT_SEASON));
}

#[test]
fn resolve_without_any_credential_fails() {
    let err = SyncConfig::resolve(&ClientSettings::default(), None, Some("4".to_string()))
        .expect_err("no credential");
    assert!(matches!(err, SyncError::MissingCredential));
}

#[tokio::test]
async fn load_reads_stored_preferences() {
    let settings = parse_settings(SAMPLE).expect("settings");
    let store = MemoryPreferenceStore::new();
    store
        .persist(PreferenceKey::Credential, "token-alt")
        .await
        .expect("persist");

    let config = SyncConfig::load(&settings, &store).await.expect("load");
    assert_eq!(config, SyncConfig::new("token-alt", "5"));
}
