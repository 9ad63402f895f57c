pub mod oauth;
pub mod twitter;

use serde::{Deserialize, Serialize};

/// A post as returned by the timeline, before scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    pub id: String,
    pub text: String,
}

#[async_trait::async_trait]
pub trait SocialClient: Send + Sync {
    /// Newest-first posts by `handle` strictly newer than `since_id` (`None` = latest page).
    async fn fetch_timeline(
        &self,
        handle: &str,
        since_id: Option<&str>,
        count: u32,
    ) -> anyhow::Result<Vec<RawPost>>;

    /// Embeddable HTML for one post.
    async fn fetch_embed_html(&self, handle: &str, id: &str) -> anyhow::Result<String>;

    /// Posts `text` as a threaded reply and returns the new post's id.
    async fn post_reply(&self, text: &str, in_reply_to: &str) -> anyhow::Result<String>;
}
