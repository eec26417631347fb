use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    domain::{Credential, PreferenceKey, SeasonId, StreamKind},
    error::FetchFailure,
    protocol::{
        Accessory, AssetTriple, CareerData, CollectsResponse, PersonResource, ACCESSORY_PAGE_SIZE,
    },
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

pub mod collects;
pub mod config;
mod preferences;
pub mod transport;

pub use collects::{CollectsBoard, CollectsTracker};
pub use config::{ClientSettings, SyncConfig};
pub use preferences::MemoryPreferenceStore;
pub use transport::HttpProfileApi;

pub const DEFAULT_SEASON: &str = "4";
/// Season whose career data `refresh` reloads, regardless of the selected season.
pub const REFRESH_CAREER_SEASON: &str = "3";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no credential configured and no credential options available")]
    MissingCredential,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[async_trait]
pub trait ProfileApi: Send + Sync {
    async fn fetch_career(
        &self,
        season: &SeasonId,
        credential: &Credential,
    ) -> Result<Option<CareerData>>;
    async fn fetch_assets(&self, credential: &Credential) -> Result<Option<AssetTriple>>;
    async fn fetch_accessory_page(
        &self,
        page: u32,
        credential: &Credential,
    ) -> Result<Option<Vec<Accessory>>>;
    async fn fetch_person_resource(
        &self,
        credential: &Credential,
        season: &SeasonId,
        all_seasons: bool,
    ) -> Result<Option<PersonResource>>;
}

#[async_trait]
pub trait CollectsApi: Send + Sync {
    async fn fetch_collects(&self, credential: &Credential) -> Result<Option<CollectsResponse>>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn persist(&self, key: PreferenceKey, value: &str) -> Result<()>;
    async fn load(&self, key: PreferenceKey) -> Result<Option<String>>;
}

pub struct MissingPreferenceStore;

#[async_trait]
impl PreferenceStore for MissingPreferenceStore {
    async fn persist(&self, key: PreferenceKey, _value: &str) -> Result<()> {
        Err(anyhow!("preference store is unavailable; '{key}' not persisted"))
    }

    async fn load(&self, _key: PreferenceKey) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub credential: Option<Credential>,
    pub season: Option<SeasonId>,
}

pub trait ConfigNotifier: Send + Sync {
    fn update_config(&self, update: ConfigUpdate);
}

pub struct DetachedConfigNotifier;

impl ConfigNotifier for DetachedConfigNotifier {
    fn update_config(&self, _update: ConfigUpdate) {}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessoryPageState {
    pub items: Vec<Accessory>,
    pub page: u32,
    pub has_more: bool,
}

impl Default for AccessoryPageState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            page: 1,
            has_more: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSnapshot {
    pub credential: Credential,
    pub season: SeasonId,
    pub accessories: AccessoryPageState,
    pub career: Option<CareerData>,
    pub assets: Option<AssetTriple>,
    pub person_resource: Option<PersonResource>,
    pub loading: bool,
    pub is_fetching_list: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Outcome of a paging request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFetch {
    Applied,
    Failed,
    Superseded,
    NotIssued,
}

impl PageFetch {
    pub fn is_applied(self) -> bool {
        self == PageFetch::Applied
    }
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    StreamUpdated(StreamKind),
    StreamFailed(FetchFailure),
    StaleResponseDiscarded {
        stream: StreamKind,
        generation: u64,
    },
    SelectionChanged {
        credential: Credential,
        season: SeasonId,
    },
    LoadingChanged {
        loading: bool,
        is_fetching_list: bool,
    },
}

#[derive(Debug, Default)]
struct StreamGenerations {
    issued: [u64; 4],
}

impl StreamGenerations {
    fn index(stream: StreamKind) -> usize {
        match stream {
            StreamKind::Career => 0,
            StreamKind::Assets => 1,
            StreamKind::Accessories => 2,
            StreamKind::PersonResource => 3,
        }
    }

    fn issue(&mut self, stream: StreamKind) -> u64 {
        let slot = &mut self.issued[Self::index(stream)];
        *slot += 1;
        *slot
    }

    fn is_current(&self, stream: StreamKind, generation: u64) -> bool {
        self.issued[Self::index(stream)] == generation
    }
}

struct CareerRequest {
    generation: u64,
    season: SeasonId,
    credential: Credential,
}

struct AssetsRequest {
    generation: u64,
    credential: Credential,
}

struct AccessoryRequest {
    generation: u64,
    page: u32,
    credential: Credential,
}

struct PersonResourceRequest {
    generation: u64,
    season: SeasonId,
    credential: Credential,
    all_seasons: bool,
}

struct SyncState {
    credential: Credential,
    season: SeasonId,
    accessories: AccessoryPageState,
    career: Option<CareerData>,
    assets: Option<AssetTriple>,
    person_resource: Option<PersonResource>,
    loading: bool,
    is_fetching_list: bool,
    last_synced_at: Option<DateTime<Utc>>,
    generations: StreamGenerations,
    // highest accessory page applied to `items`; 0 until page 1 lands
    loaded_page: u32,
}

impl SyncState {
    fn new(config: SyncConfig) -> Self {
        Self {
            credential: config.credential,
            season: config.season,
            accessories: AccessoryPageState::default(),
            career: None,
            assets: None,
            person_resource: None,
            loading: true,
            is_fetching_list: false,
            last_synced_at: None,
            generations: StreamGenerations::default(),
            loaded_page: 0,
        }
    }

    fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            credential: self.credential.clone(),
            season: self.season.clone(),
            accessories: self.accessories.clone(),
            career: self.career.clone(),
            assets: self.assets.clone(),
            person_resource: self.person_resource.clone(),
            loading: self.loading,
            is_fetching_list: self.is_fetching_list,
            last_synced_at: self.last_synced_at,
        }
    }

    fn begin_career(
        &mut self,
        season: Option<SeasonId>,
        credential: Option<Credential>,
    ) -> CareerRequest {
        CareerRequest {
            generation: self.generations.issue(StreamKind::Career),
            season: season.unwrap_or_else(|| self.season.clone()),
            credential: credential.unwrap_or_else(|| self.credential.clone()),
        }
    }

    fn begin_assets(&mut self, credential: Option<Credential>) -> AssetsRequest {
        AssetsRequest {
            generation: self.generations.issue(StreamKind::Assets),
            credential: credential.unwrap_or_else(|| self.credential.clone()),
        }
    }

    fn begin_accessories(&mut self, page: u32, credential: Option<Credential>) -> AccessoryRequest {
        self.loading = page == 1;
        self.is_fetching_list = true;
        AccessoryRequest {
            generation: self.generations.issue(StreamKind::Accessories),
            page,
            credential: credential.unwrap_or_else(|| self.credential.clone()),
        }
    }

    fn begin_person_resource(
        &mut self,
        season: SeasonId,
        credential: Option<Credential>,
        all_seasons: bool,
    ) -> PersonResourceRequest {
        PersonResourceRequest {
            generation: self.generations.issue(StreamKind::PersonResource),
            season,
            credential: credential.unwrap_or_else(|| self.credential.clone()),
            all_seasons,
        }
    }
}

fn failure_context(stream: StreamKind) -> &'static str {
    match stream {
        StreamKind::Career => "failed to fetch career data",
        StreamKind::Assets => "failed to fetch assets",
        StreamKind::Accessories => "failed to fetch accessories",
        StreamKind::PersonResource => "failed to fetch person resource",
    }
}

/// Owns every piece of remotely synchronized profile state and coordinates
/// the four fetch streams that feed it.
pub struct ProfileSyncController {
    api: Arc<dyn ProfileApi>,
    preferences: Arc<dyn PreferenceStore>,
    config_notifier: Arc<dyn ConfigNotifier>,
    inner: Mutex<SyncState>,
    events: broadcast::Sender<SyncEvent>,
}

impl ProfileSyncController {
    pub fn new(config: SyncConfig, api: Arc<dyn ProfileApi>) -> Arc<Self> {
        Self::new_with_dependencies(
            config,
            api,
            Arc::new(MissingPreferenceStore),
            Arc::new(DetachedConfigNotifier),
        )
    }

    pub fn new_with_dependencies(
        config: SyncConfig,
        api: Arc<dyn ProfileApi>,
        preferences: Arc<dyn PreferenceStore>,
        config_notifier: Arc<dyn ConfigNotifier>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            api,
            preferences,
            config_notifier,
            inner: Mutex::new(SyncState::new(config)),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> ProfileSnapshot {
        self.inner.lock().await.snapshot()
    }

    pub async fn credential(&self) -> Credential {
        self.inner.lock().await.credential.clone()
    }

    pub async fn season(&self) -> SeasonId {
        self.inner.lock().await.season.clone()
    }

    pub async fn initialize(&self) {
        let (career, accessories, assets, person) = {
            let mut guard = self.inner.lock().await;
            guard.loading = true;
            let season = guard.season.clone();
            let requests = (
                guard.begin_career(Some(season.clone()), None),
                guard.begin_accessories(1, None),
                guard.begin_assets(None),
                guard.begin_person_resource(season, None, false),
            );
            self.publish_loading(&guard);
            info!(season = %guard.season, "starting initial profile sync");
            requests
        };

        let accessory_generation = accessories.generation;
        futures::join!(
            self.run_career(career),
            self.run_accessories(accessories),
            self.run_assets(assets),
            self.run_person_resource(person),
        );

        // A newer list fetch issued during the sweep owns the flag.
        let mut guard = self.inner.lock().await;
        if guard
            .generations
            .is_current(StreamKind::Accessories, accessory_generation)
        {
            guard.loading = false;
            self.publish_loading(&guard);
        }
    }

    pub async fn fetch_career(&self, season: Option<SeasonId>, credential: Option<Credential>) {
        let request = self.inner.lock().await.begin_career(season, credential);
        self.run_career(request).await;
    }

    pub async fn fetch_assets(&self, credential: Option<Credential>) {
        let request = self.inner.lock().await.begin_assets(credential);
        self.run_assets(request).await;
    }

    pub async fn fetch_accessory_page(
        &self,
        page: u32,
        credential: Option<Credential>,
    ) -> PageFetch {
        let request = {
            let mut guard = self.inner.lock().await;
            let request = guard.begin_accessories(page, credential);
            self.publish_loading(&guard);
            request
        };
        self.run_accessories(request).await
    }

    pub async fn fetch_person_resource(
        &self,
        season: SeasonId,
        credential: Option<Credential>,
        all_seasons: bool,
    ) {
        let request = self
            .inner
            .lock()
            .await
            .begin_person_resource(season, credential, all_seasons);
        self.run_person_resource(request).await;
    }

    pub async fn switch_credential(
        self: &Arc<Self>,
        credential: impl Into<Credential>,
    ) -> JoinHandle<()> {
        let credential = credential.into();
        if let Err(err) = self
            .preferences
            .persist(PreferenceKey::Credential, credential.as_str())
            .await
        {
            warn!(key = %PreferenceKey::Credential, error = %format!("{err:#}"), "failed to persist credential");
        }
        self.config_notifier.update_config(ConfigUpdate {
            credential: Some(credential.clone()),
            season: None,
        });

        let (career, person, accessories, assets) = {
            let mut guard = self.inner.lock().await;
            guard.credential = credential.clone();
            guard.accessories = AccessoryPageState::default();
            guard.loaded_page = 0;
            let season = guard.season.clone();
            let _ = self.events.send(SyncEvent::SelectionChanged {
                credential: credential.clone(),
                season: season.clone(),
            });
            let requests = (
                guard.begin_career(Some(season.clone()), Some(credential.clone())),
                guard.begin_person_resource(season, Some(credential.clone()), false),
                guard.begin_accessories(1, Some(credential.clone())),
                guard.begin_assets(Some(credential.clone())),
            );
            self.publish_loading(&guard);
            requests
        };
        info!(credential = %credential.redacted(), "switched credential");

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            futures::join!(
                controller.run_career(career),
                controller.run_person_resource(person),
                controller.run_accessories(accessories),
                controller.run_assets(assets),
            );
        })
    }

    pub async fn switch_season(self: &Arc<Self>, season: impl Into<SeasonId>) -> JoinHandle<()> {
        let season = season.into();
        if let Err(err) = self
            .preferences
            .persist(PreferenceKey::Season, season.as_str())
            .await
        {
            warn!(key = %PreferenceKey::Season, error = %format!("{err:#}"), "failed to persist season");
        }
        self.config_notifier.update_config(ConfigUpdate {
            credential: None,
            season: Some(season.clone()),
        });

        let (career, person) = {
            let mut guard = self.inner.lock().await;
            guard.season = season.clone();
            let _ = self.events.send(SyncEvent::SelectionChanged {
                credential: guard.credential.clone(),
                season: season.clone(),
            });
            (
                guard.begin_career(Some(season.clone()), None),
                guard.begin_person_resource(season.clone(), None, false),
            )
        };
        info!(%season, "switched season");

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            futures::join!(
                controller.run_career(career),
                controller.run_person_resource(person),
            );
        })
    }

    pub async fn advance_page(&self) -> PageFetch {
        let request = {
            let mut guard = self.inner.lock().await;
            let page = guard.accessories.page;
            self.begin_advance(&mut guard, page)
        };
        match request {
            Some(request) => self.run_accessories(request).await,
            None => PageFetch::NotIssued,
        }
    }

    /// Only the page right after the last applied one is accepted, and only
    /// while no other list fetch is in flight.
    pub async fn set_page(&self, page: u32) -> PageFetch {
        let request = {
            let mut guard = self.inner.lock().await;
            self.begin_advance(&mut guard, page)
        };
        match request {
            Some(request) => self.run_accessories(request).await,
            None => PageFetch::NotIssued,
        }
    }

    pub async fn request_next_page(&self) -> PageFetch {
        let request = {
            let mut guard = self.inner.lock().await;
            if !guard.accessories.has_more || guard.is_fetching_list {
                debug!(
                    page = guard.accessories.page,
                    has_more = guard.accessories.has_more,
                    "next page request ignored"
                );
                return PageFetch::NotIssued;
            }
            let page = guard.loaded_page + 1;
            guard.accessories.page = page;
            let request = guard.begin_accessories(page, None);
            self.publish_loading(&guard);
            request
        };
        self.run_accessories(request).await
    }

    pub async fn refresh(&self) {
        let (career, accessories, assets) = {
            let mut guard = self.inner.lock().await;
            guard.accessories.page = 1;
            let requests = (
                guard.begin_career(Some(SeasonId::from(REFRESH_CAREER_SEASON)), None),
                guard.begin_accessories(1, None),
                guard.begin_assets(None),
            );
            self.publish_loading(&guard);
            requests
        };

        futures::join!(
            self.run_career(career),
            self.run_accessories(accessories),
            self.run_assets(assets),
        );
    }

    fn begin_advance(&self, state: &mut SyncState, page: u32) -> Option<AccessoryRequest> {
        if page <= 1
            || page != state.loaded_page + 1
            || !state.accessories.has_more
            || state.is_fetching_list
        {
            debug!(
                page,
                loaded_page = state.loaded_page,
                has_more = state.accessories.has_more,
                in_flight = state.is_fetching_list,
                "advance skipped"
            );
            return None;
        }
        state.accessories.page = page;
        let request = state.begin_accessories(page, None);
        self.publish_loading(state);
        Some(request)
    }

    async fn run_career(&self, request: CareerRequest) {
        let result = self
            .api
            .fetch_career(&request.season, &request.credential)
            .await;
        let mut guard = self.inner.lock().await;
        if !self.accept(&guard, StreamKind::Career, request.generation) {
            return;
        }
        match result {
            Ok(Some(data)) => {
                guard.career = Some(data);
                guard.loading = false;
                self.mark_updated(&mut guard, StreamKind::Career);
                self.publish_loading(&guard);
            }
            Ok(None) => debug!(season = %request.season, "no career data returned"),
            Err(err) => self.report_failure(StreamKind::Career, &err),
        }
    }

    async fn run_assets(&self, request: AssetsRequest) {
        let result = self.api.fetch_assets(&request.credential).await;
        let mut guard = self.inner.lock().await;
        if !self.accept(&guard, StreamKind::Assets, request.generation) {
            return;
        }
        match result {
            Ok(Some(assets)) => {
                guard.assets = Some(assets);
                guard.loading = false;
                self.mark_updated(&mut guard, StreamKind::Assets);
                self.publish_loading(&guard);
            }
            Ok(None) => debug!("no assets returned"),
            Err(err) => self.report_failure(StreamKind::Assets, &err),
        }
    }

    async fn run_accessories(&self, request: AccessoryRequest) -> PageFetch {
        let result = self
            .api
            .fetch_accessory_page(request.page, &request.credential)
            .await;
        let mut guard = self.inner.lock().await;
        if !self.accept(&guard, StreamKind::Accessories, request.generation) {
            return PageFetch::Superseded;
        }
        let outcome = match result {
            Ok(fetched) => {
                let fetched = fetched.unwrap_or_default();
                let exhausted = fetched.len() < ACCESSORY_PAGE_SIZE;
                if request.page == 1 {
                    guard.accessories.items = fetched;
                } else {
                    guard.accessories.items.extend(fetched);
                }
                if exhausted {
                    guard.accessories.has_more = false;
                }
                guard.loaded_page = request.page;
                debug!(
                    page = request.page,
                    total = guard.accessories.items.len(),
                    exhausted,
                    "applied accessory page"
                );
                self.mark_updated(&mut guard, StreamKind::Accessories);
                PageFetch::Applied
            }
            Err(err) => {
                self.report_failure(StreamKind::Accessories, &err);
                if request.page > 1 && guard.accessories.page == request.page {
                    guard.accessories.page -= 1;
                }
                PageFetch::Failed
            }
        };
        guard.loading = false;
        guard.is_fetching_list = false;
        self.publish_loading(&guard);
        outcome
    }

    async fn run_person_resource(&self, request: PersonResourceRequest) {
        let result = self
            .api
            .fetch_person_resource(&request.credential, &request.season, request.all_seasons)
            .await;
        let mut guard = self.inner.lock().await;
        if !self.accept(&guard, StreamKind::PersonResource, request.generation) {
            return;
        }
        match result {
            Ok(Some(resource)) => {
                guard.person_resource = Some(resource);
                self.mark_updated(&mut guard, StreamKind::PersonResource);
            }
            Ok(None) => debug!(season = %request.season, "no person resource returned"),
            Err(err) => self.report_failure(StreamKind::PersonResource, &err),
        }
    }

    fn accept(&self, state: &SyncState, stream: StreamKind, generation: u64) -> bool {
        if state.generations.is_current(stream, generation) {
            return true;
        }
        debug!(%stream, generation, "discarding superseded response");
        let _ = self
            .events
            .send(SyncEvent::StaleResponseDiscarded { stream, generation });
        false
    }

    fn mark_updated(&self, state: &mut SyncState, stream: StreamKind) {
        state.last_synced_at = Some(Utc::now());
        let _ = self.events.send(SyncEvent::StreamUpdated(stream));
    }

    fn publish_loading(&self, state: &SyncState) {
        let _ = self.events.send(SyncEvent::LoadingChanged {
            loading: state.loading,
            is_fetching_list: state.is_fetching_list,
        });
    }

    fn report_failure(&self, stream: StreamKind, err: &anyhow::Error) {
        let message = format!("{err:#}");
        error!(%stream, error = %message, "{}", failure_context(stream));
        let _ = self
            .events
            .send(SyncEvent::StreamFailed(FetchFailure::new(stream, message)));
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
