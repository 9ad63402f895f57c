use crate::domain::snapshot::Item;
use crate::sentiment::SentimentClient;
use crate::social::RawPost;
use rand::{Rng, RngCore};

/// Linear remap of a sentiment score onto 0..=100, where 100 is maximally negative.
pub fn meltdown_percentage(sentiment: f64) -> i32 {
    let s = sentiment.clamp(-1.0, 1.0);
    100 - ((s + 1.0) * 50.0).round() as i32
}

/// Share of letters in `text` that are uppercase, truncated to a whole percentage.
///
/// Only alphabetic characters count toward the denominator; text without letters scores 0.
pub fn caps_ratio(text: &str) -> i32 {
    let (letters, upper) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0u64, 0u64), |(letters, upper), c| {
            (letters + 1, upper + u64::from(c.is_uppercase()))
        });
    if letters == 0 {
        return 0;
    }
    ((upper * 100) / letters) as i32
}

/// Produces the sentiment for each fetched post.
pub enum Scorer<'a> {
    /// External sentiment analysis.
    Live(&'a dyn SentimentClient),
    /// Uniform synthetic scores in [-1, 1]; no external calls.
    Simulated,
}

impl Scorer<'_> {
    pub async fn score(
        &self,
        post: &RawPost,
        embed_html: String,
        rng: &mut (dyn RngCore + Send),
    ) -> anyhow::Result<Item> {
        let sentiment = match self {
            Scorer::Live(client) => client.analyze(&post.text).await?,
            Scorer::Simulated => rng.gen_range(-1.0..=1.0),
        };

        Ok(Item {
            text: post.text.clone(),
            sentiment,
            id: post.id.clone(),
            embed_html,
        })
    }
}
