use anyhow::Context;
use serde::Serialize;

/// One scored post as recorded for offline analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct TweetRow {
    pub tweet_id: String,
    pub text: String,
    pub embed_html: String,
    pub meltdown_pct: i32,
    pub caps_percentage: i32,
}

/// A row of the export query; column order matches the CSV header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub id: i64,
    pub sentiment: i32,
    pub caps_percentage: i32,
    pub length: i32,
    pub not_meltdown_votes: Option<i32>,
    pub meltdown_votes: Option<i32>,
}

#[async_trait::async_trait]
pub trait TweetLog: Send + Sync {
    async fn record(&self, row: &TweetRow) -> anyhow::Result<()>;

    async fn export_rows(&self) -> anyhow::Result<Vec<ExportRow>>;
}

/// `tweets` table in Postgres. The schema is owned elsewhere.
#[derive(Debug, Clone)]
pub struct PgTweetLog {
    pool: sqlx::PgPool,
}

impl PgTweetLog {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TweetLog for PgTweetLog {
    async fn record(&self, row: &TweetRow) -> anyhow::Result<()> {
        let length = i32::try_from(row.text.chars().count()).unwrap_or(i32::MAX);

        sqlx::query(
            "INSERT INTO tweets (sentiment, caps_percentage, length, tweet_id, tweet_text, html) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .persistent(false)
        .bind(row.meltdown_pct)
        .bind(row.caps_percentage)
        .bind(length)
        .bind(&row.tweet_id)
        .bind(&row.text)
        .bind(&row.embed_html)
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert tweets failed (tweet_id={})", row.tweet_id))?;

        Ok(())
    }

    async fn export_rows(&self) -> anyhow::Result<Vec<ExportRow>> {
        let rows = sqlx::query_as::<_, (i64, i32, i32, i32, Option<i32>, Option<i32>)>(
            "SELECT id, sentiment, caps_percentage, length, not_meltdown_votes, meltdown_votes \
             FROM tweets \
             ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("select tweets failed")?;

        Ok(rows
            .into_iter()
            .map(
                |(id, sentiment, caps_percentage, length, not_meltdown_votes, meltdown_votes)| {
                    ExportRow {
                        id,
                        sentiment,
                        caps_percentage,
                        length,
                        not_meltdown_votes,
                        meltdown_votes,
                    }
                },
            )
            .collect())
    }
}
