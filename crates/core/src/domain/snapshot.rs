use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable record of the last completed run.
///
/// Field names are part of the published JSON document read by the website, so they stay
/// camelCase and timestamps stay unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub average_score: f64,
    #[serde(default)]
    pub item_count: usize,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub next_update_at: DateTime<Utc>,
    #[serde(default)]
    pub last_published_reply_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub text: String,
    pub sentiment: f64,
    pub id: String,
    #[serde(default)]
    pub embed_html: String,
}

impl Snapshot {
    /// Snapshot used when no previous run has been persisted anywhere.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            captured_at: now,
            items: Vec::new(),
            average_score: 0.0,
            item_count: 0,
            next_update_at: now,
            last_published_reply_id: String::new(),
        }
    }

    pub fn newest(&self) -> Option<&Item> {
        self.items.first()
    }

    pub fn oldest(&self) -> Option<&Item> {
        self.items.last()
    }

    pub fn to_json(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> anyhow::Result<Self> {
        let snapshot: Snapshot = serde_json::from_slice(bytes)?;
        anyhow::ensure!(
            snapshot.item_count == snapshot.items.len(),
            "itemCount {} does not match {} items",
            snapshot.item_count,
            snapshot.items.len()
        );
        Ok(snapshot)
    }
}

/// Arithmetic mean of the items' sentiment; 0 for an empty slice.
pub fn average_sentiment(items: &[Item]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().map(|i| i.sentiment).sum::<f64>() / items.len() as f64
}
