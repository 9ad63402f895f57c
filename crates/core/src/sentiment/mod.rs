pub mod google;

#[async_trait::async_trait]
pub trait SentimentClient: Send + Sync {
    fn provider(&self) -> &'static str;

    /// Document-level score in [-1, 1]; negative means negative sentiment.
    async fn analyze(&self, text: &str) -> anyhow::Result<f64>;
}
