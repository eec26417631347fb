use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use shared::{
    domain::{Credential, CredentialOption, PreferenceKey, SeasonId},
    protocol::CollectCategory,
};
use tracing::warn;

use crate::{PreferenceStore, SyncError, DEFAULT_SEASON};

pub const DEFAULT_SETTINGS_FILE: &str = "profile.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub database_url: String,
    pub credential: Option<Credential>,
    pub season: Option<SeasonId>,
    pub credential_options: Vec<CredentialOption>,
    pub collects: Vec<CollectCategory>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080/".into(),
            database_url: "sqlite://./data/profile.db".into(),
            credential: None,
            season: None,
            credential_options: Vec::new(),
            collects: Vec::new(),
        }
    }
}

pub fn parse_settings(raw: &str) -> std::result::Result<ClientSettings, SyncError> {
    toml::from_str(raw).map_err(|err| SyncError::InvalidConfig(err.to_string()))
}

/// Reads `path` when it exists, then applies `APP__*` overrides looked up through `env`.
pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientSettings> {
    let mut settings = if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
        parse_settings(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", path.display()))?
    } else {
        ClientSettings::default()
    };

    apply_env_overrides(&mut settings, env);
    Ok(settings)
}

pub fn apply_env_overrides(settings: &mut ClientSettings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__CK") {
        settings.credential = Some(Credential::new(v));
    }
    if let Some(v) = env("APP__SEASONID") {
        settings.season = Some(SeasonId::new(v));
    }
}

/// Initial credential and season for a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub credential: Credential,
    pub season: SeasonId,
}

impl SyncConfig {
    pub fn new(credential: impl Into<Credential>, season: impl Into<SeasonId>) -> Self {
        Self {
            credential: credential.into(),
            season: season.into(),
        }
    }

    /// Stored value wins over the settings value; the first credential option
    /// and the default season fill whatever is still missing. Empty strings
    /// count as unset.
    pub fn resolve(
        settings: &ClientSettings,
        stored_credential: Option<String>,
        stored_season: Option<String>,
    ) -> std::result::Result<Self, SyncError> {
        let credential = stored_credential
            .filter(|v| !v.is_empty())
            .map(Credential::new)
            .or_else(|| {
                settings
                    .credential
                    .clone()
                    .filter(|c| !c.as_str().is_empty())
            })
            .or_else(|| {
                settings
                    .credential_options
                    .first()
                    .map(|option| option.value.clone())
            })
            .ok_or(SyncError::MissingCredential)?;

        let season = stored_season
            .filter(|v| !v.is_empty())
            .map(SeasonId::new)
            .or_else(|| settings.season.clone().filter(|s| !s.as_str().is_empty()))
            .unwrap_or_else(|| SeasonId::from(DEFAULT_SEASON));

        Ok(Self { credential, season })
    }

    pub async fn load(settings: &ClientSettings, store: &dyn PreferenceStore) -> Result<Self> {
        let stored_credential = load_or_warn(store, PreferenceKey::Credential).await;
        let stored_season = load_or_warn(store, PreferenceKey::Season).await;
        Ok(Self::resolve(settings, stored_credential, stored_season)?)
    }
}

async fn load_or_warn(store: &dyn PreferenceStore, key: PreferenceKey) -> Option<String> {
    match store.load(key).await {
        Ok(value) => value,
        Err(err) => {
            warn!(%key, error = %format!("{err:#}"), "failed to load stored preference");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
