use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed number of accessories the remote service returns per page.
pub const ACCESSORY_PAGE_SIZE: usize = 50;

/// Career stats for one (season, credential) pair. Replaced wholesale, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CareerData(pub Value);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Accessory(pub Value);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonResource(pub Value);

/// Three asset summary values, in the order the service reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetTriple(pub [String; 3]);

impl AssetTriple {
    pub fn new(
        first: impl Into<String>,
        second: impl Into<String>,
        third: impl Into<String>,
    ) -> Self {
        Self([first.into(), second.into(), third.into()])
    }

    pub fn values(&self) -> &[String; 3] {
        &self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectsResponse {
    #[serde(rename = "itemidList", default)]
    pub itemid_list: HashMap<String, String>,
}

impl CollectsResponse {
    pub fn count_for(&self, pid: &str) -> &str {
        self.itemid_list.get(pid).map(String::as_str).unwrap_or("0")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectItem {
    pub id: String,
    pub pid: String,
    pub name: String,
    #[serde(default)]
    pub img: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectCategory {
    pub title: String,
    #[serde(default)]
    pub info: Vec<CollectItem>,
}
