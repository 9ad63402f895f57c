use crate::config::Settings;
use crate::social::oauth::Credentials;
use crate::social::{RawPost, SocialClient};
use anyhow::Context;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;

const DEFAULT_API_BASE_URL: &str = "https://api.twitter.com/1.1";
const DEFAULT_OEMBED_URL: &str = "https://publish.twitter.com/oembed";
const OEMBED_RELATED: &str = "istrumpmeltdown";

#[derive(Debug, Clone)]
pub struct TwitterClient {
    http: reqwest::Client,
    credentials: Credentials,
    api_base_url: String,
    oembed_url: String,
}

impl TwitterClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let credentials = Credentials {
            consumer_key: settings.require_consumer_key()?.to_string(),
            consumer_secret: settings.require_consumer_secret()?.to_string(),
            access_token: settings.require_access_token()?.to_string(),
            access_secret: settings.require_access_secret()?.to_string(),
        };

        Ok(Self {
            http: settings.http_client()?,
            credentials,
            api_base_url: settings
                .twitter_api_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            oembed_url: settings
                .twitter_oembed_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OEMBED_URL.to_string()),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url.trim_end_matches('/'), path)
    }

    async fn read_success(res: reqwest::Response, what: &str) -> anyhow::Result<String> {
        let status = res.status();
        let text = res
            .text()
            .await
            .with_context(|| format!("failed to read {what} response"))?;
        if !status.is_success() {
            anyhow::bail!("{what} HTTP {status}: {text}");
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl SocialClient for TwitterClient {
    async fn fetch_timeline(
        &self,
        handle: &str,
        since_id: Option<&str>,
        count: u32,
    ) -> anyhow::Result<Vec<RawPost>> {
        let url = self.endpoint("statuses/user_timeline.json");
        let count = count.to_string();
        let mut params = vec![
            ("screen_name", handle),
            ("count", count.as_str()),
            ("tweet_mode", "extended"),
        ];
        if let Some(since_id) = since_id.filter(|s| !s.is_empty()) {
            params.push(("since_id", since_id));
        }

        let auth = self.credentials.authorization_header("GET", &url, &params)?;
        let res = self
            .http
            .get(&url)
            .header(AUTHORIZATION, auth)
            .query(&params)
            .send()
            .await
            .context("timeline request failed")?;

        let text = Self::read_success(res, "timeline").await?;
        parse_timeline(&text)
    }

    async fn fetch_embed_html(&self, handle: &str, id: &str) -> anyhow::Result<String> {
        let status_url = format!("https://twitter.com/{handle}/status/{id}");
        let res = self
            .http
            .get(&self.oembed_url)
            .query(&[
                ("url", status_url.as_str()),
                ("omit_script", "true"),
                ("align", "center"),
                ("related", OEMBED_RELATED),
            ])
            .send()
            .await
            .context("oembed request failed")?;

        let text = Self::read_success(res, "oembed").await?;
        let parsed = serde_json::from_str::<OEmbed>(&text)
            .with_context(|| format!("failed to decode oembed response: {text}"))?;
        Ok(parsed.html)
    }

    async fn post_reply(&self, text: &str, in_reply_to: &str) -> anyhow::Result<String> {
        let url = self.endpoint("statuses/update.json");
        let params = [
            ("status", text),
            ("in_reply_to_status_id", in_reply_to),
            ("auto_populate_reply_metadata", "true"),
        ];

        let auth = self.credentials.authorization_header("POST", &url, &params)?;
        let res = self
            .http
            .post(&url)
            .header(AUTHORIZATION, auth)
            .form(&params)
            .send()
            .await
            .context("status update request failed")?;

        let body = Self::read_success(res, "status update").await?;
        let posted = serde_json::from_str::<ApiStatus>(&body)
            .with_context(|| format!("failed to decode status update response: {body}"))?;
        Ok(posted.id_str)
    }
}

fn parse_timeline(text: &str) -> anyhow::Result<Vec<RawPost>> {
    let statuses = serde_json::from_str::<Vec<ApiStatus>>(text)
        .with_context(|| format!("failed to decode timeline response: {text}"))?;
    Ok(statuses
        .into_iter()
        .map(|s| RawPost {
            text: s.full_text.or(s.text).unwrap_or_default(),
            id: s.id_str,
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    id_str: String,
    #[serde(default)]
    full_text: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OEmbed {
    #[serde(default)]
    html: String,
}
