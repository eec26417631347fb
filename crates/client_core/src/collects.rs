//! Collection board: remote per-item counts joined against the local catalog.

use std::sync::Arc;

use serde::Serialize;
use shared::{
    domain::Credential,
    protocol::{CollectCategory, CollectItem, CollectsResponse},
};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::CollectsApi;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectItemCount {
    pub item: CollectItem,
    pub count: String,
}

impl CollectItemCount {
    pub fn is_owned(&self) -> bool {
        self.count != "0"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectCategoryCounts {
    pub title: String,
    pub items: Vec<CollectItemCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectsBoard {
    pub categories: Vec<CollectCategoryCounts>,
}

impl CollectsBoard {
    /// `None` when there is no catalog to show counts against.
    pub fn build(catalog: &[CollectCategory], response: &CollectsResponse) -> Option<Self> {
        if catalog.is_empty() {
            return None;
        }
        let categories = catalog
            .iter()
            .map(|category| CollectCategoryCounts {
                title: category.title.clone(),
                items: category
                    .info
                    .iter()
                    .map(|item| CollectItemCount {
                        item: item.clone(),
                        count: response.count_for(&item.pid).to_string(),
                    })
                    .collect(),
            })
            .collect();
        Some(Self { categories })
    }

    pub fn owned_count(&self) -> usize {
        self.categories
            .iter()
            .flat_map(|category| category.items.iter())
            .filter(|item| item.is_owned())
            .count()
    }
}

#[derive(Default)]
struct TrackerState {
    credential: Option<Credential>,
    board: Option<CollectsBoard>,
}

/// Keeps a collects board in step with the credential it is given.
pub struct CollectsTracker {
    api: Arc<dyn CollectsApi>,
    catalog: Vec<CollectCategory>,
    state: Mutex<TrackerState>,
}

impl CollectsTracker {
    pub fn new(api: Arc<dyn CollectsApi>, catalog: Vec<CollectCategory>) -> Self {
        Self {
            api,
            catalog,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub async fn board(&self) -> Option<CollectsBoard> {
        self.state.lock().await.board.clone()
    }

    /// Reloads only when `credential` differs from the one last loaded.
    pub async fn sync(&self, credential: &Credential) -> Option<CollectsBoard> {
        {
            let guard = self.state.lock().await;
            if guard.credential.as_ref() == Some(credential) {
                return guard.board.clone();
            }
        }
        self.reload(credential).await
    }

    /// A failed fetch keeps the board of the same credential; an absent
    /// response clears it.
    pub async fn reload(&self, credential: &Credential) -> Option<CollectsBoard> {
        let result = self.api.fetch_collects(credential).await;
        let mut guard = self.state.lock().await;
        match result {
            Ok(response) => {
                guard.credential = Some(credential.clone());
                guard.board = response
                    .as_ref()
                    .and_then(|response| CollectsBoard::build(&self.catalog, response));
                debug!(found = guard.board.is_some(), "collects board updated");
            }
            Err(err) => {
                error!(error = %format!("{err:#}"), "failed to fetch collects");
                // Another credential's board must not be shown for this one.
                if guard.credential.as_ref() != Some(credential) {
                    guard.credential = None;
                    guard.board = None;
                }
            }
        }
        guard.board.clone()
    }
}

#[cfg(test)]
#[path = "tests/collects_tests.rs"]
mod tests;
