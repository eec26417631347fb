//! HTTP transport for the profile service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::{
    domain::{Credential, SeasonId},
    protocol::{Accessory, AssetTriple, CareerData, CollectsResponse, PersonResource},
};
use tracing::debug;
use url::Url;

use crate::{CollectsApi, ProfileApi};

const CAREER_PATH: &str = "career";
const ASSETS_PATH: &str = "assets";
const ACCESSORIES_PATH: &str = "accessories";
const PERSON_RESOURCE_PATH: &str = "person-resource";
const COLLECTS_PATH: &str = "collects";

pub struct HttpProfileApi {
    http: Client,
    base_url: Url,
}

impl HttpProfileApi {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .with_context(|| format!("invalid profile api base url '{base_url}'"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GETs `path` and decodes a JSON body. An empty or `null` body is "no data".
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("failed to build url for '{path}'"))?;
        debug!(%path, "profile api request");
        let body = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to '{path}' failed"))?
            .error_for_status()?
            .bytes()
            .await
            .with_context(|| format!("failed to read '{path}' response body"))?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice::<Option<T>>(&body)
            .with_context(|| format!("failed to decode '{path}' response"))
    }
}

#[async_trait]
impl ProfileApi for HttpProfileApi {
    async fn fetch_career(
        &self,
        season: &SeasonId,
        credential: &Credential,
    ) -> Result<Option<CareerData>> {
        self.get_json(
            CAREER_PATH,
            &[("seasonid", season.as_str()), ("ck", credential.as_str())],
        )
        .await
    }

    async fn fetch_assets(&self, credential: &Credential) -> Result<Option<AssetTriple>> {
        self.get_json(ASSETS_PATH, &[("ck", credential.as_str())])
            .await
    }

    async fn fetch_accessory_page(
        &self,
        page: u32,
        credential: &Credential,
    ) -> Result<Option<Vec<Accessory>>> {
        let page = page.to_string();
        self.get_json(
            ACCESSORIES_PATH,
            &[("page", page.as_str()), ("ck", credential.as_str())],
        )
        .await
    }

    async fn fetch_person_resource(
        &self,
        credential: &Credential,
        season: &SeasonId,
        all_seasons: bool,
    ) -> Result<Option<PersonResource>> {
        let all_seasons = if all_seasons { "true" } else { "false" };
        self.get_json(
            PERSON_RESOURCE_PATH,
            &[
                ("ck", credential.as_str()),
                ("seasonid", season.as_str()),
                ("all_seasons", all_seasons),
            ],
        )
        .await
    }
}

#[async_trait]
impl CollectsApi for HttpProfileApi {
    async fn fetch_collects(&self, credential: &Credential) -> Result<Option<CollectsResponse>> {
        self.get_json(COLLECTS_PATH, &[("ck", credential.as_str())])
            .await
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
