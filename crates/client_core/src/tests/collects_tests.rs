use super::*;
use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

#[derive(Default)]
struct FakeCollectsApi {
    responses: Mutex<HashMap<String, Option<CollectsResponse>>>,
    failing: Mutex<bool>,
    calls: Mutex<Vec<String>>,
}

impl FakeCollectsApi {
    async fn respond(&self, credential: &str, counts: &[(&str, &str)]) {
        let response = CollectsResponse {
            itemid_list: counts
                .iter()
                .map(|(pid, count)| (pid.to_string(), count.to_string()))
                .collect(),
        };
        self.responses
            .lock()
            .await
            .insert(credential.to_string(), Some(response));
    }

    async fn set_failing(&self, failing: bool) {
        *self.failing.lock().await = failing;
    }

    async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl CollectsApi for FakeCollectsApi {
    async fn fetch_collects(&self, credential: &Credential) -> Result<Option<CollectsResponse>> {
        self.calls.lock().await.push(credential.to_string());
        if *self.failing.lock().await {
            return Err(anyhow!("collects endpoint unreachable"));
        }
        Ok(self
            .responses
            .lock()
            .await
            .get(credential.as_str())
            .cloned()
            .flatten())
    }
}

fn catalog() -> Vec<CollectCategory> {
    vec![CollectCategory {
        title: "Keys".into(),
        info: vec![
            CollectItem {
                id: "1".into(),
                pid: "p-1".into(),
                name: "Blue key".into(),
                img: None,
            },
            CollectItem {
                id: "2".into(),
                pid: "p-2".into(),
                name: "Red key".into(),
                img: Some("red.png".into()),
            },
        ],
    }]
}

#[test]
fn board_defaults_missing_counts_to_zero() {
    let response = CollectsResponse {
        itemid_list: HashMap::from([("p-2".to_string(), "4".to_string())]),
    };
    let board = CollectsBoard::build(&catalog(), &response).expect("board");
    let counts: Vec<&str> = board.categories[0]
        .items
        .iter()
        .map(|item| item.count.as_str())
        .collect();
    assert_eq!(counts, vec!["0", "4"]);
    assert_eq!(board.owned_count(), 1);
}

#[test]
fn empty_catalog_yields_no_board() {
    assert!(CollectsBoard::build(&[], &CollectsResponse::default()).is_none());
}

#[tokio::test]
async fn sync_refetches_only_when_credential_changes() {
    let api = Arc::new(FakeCollectsApi::default());
    api.respond("a", &[("p-1", "1")]).await;
    api.respond("b", &[("p-1", "7"), ("p-2", "2")]).await;
    let tracker = CollectsTracker::new(api.clone(), catalog());

    let board = tracker.sync(&Credential::from("a")).await.expect("board a");
    assert_eq!(board.owned_count(), 1);
    tracker.sync(&Credential::from("a")).await;
    assert_eq!(api.call_count().await, 1);

    let board = tracker.sync(&Credential::from("b")).await.expect("board b");
    assert_eq!(board.owned_count(), 2);
    assert_eq!(api.call_count().await, 2);
}

#[tokio::test]
async fn failed_fetch_keeps_previous_board_and_absent_response_clears_it() {
    let api = Arc::new(FakeCollectsApi::default());
    api.respond("a", &[("p-1", "1")]).await;
    let tracker = CollectsTracker::new(api.clone(), catalog());

    let first = tracker.reload(&Credential::from("a")).await;
    assert!(first.is_some());

    api.set_failing(true).await;
    assert_eq!(tracker.reload(&Credential::from("a")).await, first);

    api.set_failing(false).await;
    assert!(tracker.reload(&Credential::from("unknown")).await.is_none());
    assert!(tracker.board().await.is_none());
}

#[tokio::test]
async fn failed_fetch_for_new_credential_drops_previous_board() {
    let api = Arc::new(FakeCollectsApi::default());
    api.respond("a", &[("p-1", "1")]).await;
    api.respond("b", &[("p-2", "3")]).await;
    let tracker = CollectsTracker::new(api.clone(), catalog());
    assert!(tracker.sync(&Credential::from("a")).await.is_some());

    api.set_failing(true).await;
    assert!(tracker.sync(&Credential::from("b")).await.is_none());
    assert!(tracker.board().await.is_none());

    api.set_failing(false).await;
    let board = tracker.sync(&Credential::from("b")).await.expect("board b");
    assert_eq!(board.categories[0].items[1].count, "3");
    assert_eq!(api.call_count().await, 3);
}
