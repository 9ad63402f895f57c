use crate::config::Settings;
use crate::sentiment::SentimentClient;
use anyhow::Context;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://language.googleapis.com";

/// Google Cloud Natural Language `documents:analyzeSentiment` over REST.
#[derive(Debug, Clone)]
pub struct GoogleLanguageClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleLanguageClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            http: settings.http_client()?,
            api_key: settings.require_language_api_key()?.to_string(),
            base_url: settings
                .language_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/documents:analyzeSentiment",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl SentimentClient for GoogleLanguageClient {
    fn provider(&self) -> &'static str {
        "google_language"
    }

    async fn analyze(&self, text: &str) -> anyhow::Result<f64> {
        let req = AnalyzeSentimentRequest {
            document: Document {
                kind: "PLAIN_TEXT",
                content: text,
            },
            encoding_type: "UTF8",
        };

        let res = self
            .http
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&req)
            .send()
            .await
            .context("sentiment request failed")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("failed to read sentiment response body")?;
        if !status.is_success() {
            anyhow::bail!("sentiment API HTTP {status}: {body}");
        }

        parse_score(&body)
    }
}

fn parse_score(body: &str) -> anyhow::Result<f64> {
    let parsed = serde_json::from_str::<AnalyzeSentimentResponse>(body)
        .with_context(|| format!("failed to decode sentiment response: {body}"))?;
    let score = parsed
        .document_sentiment
        .context("sentiment response has no documentSentiment")?
        .score;
    anyhow::ensure!(score.is_finite(), "sentiment score is not finite");
    Ok(score.clamp(-1.0, 1.0))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeSentimentRequest<'a> {
    document: Document<'a>,
    encoding_type: &'static str,
}

#[derive(Debug, Serialize)]
struct Document<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeSentimentResponse {
    #[serde(default)]
    document_sentiment: Option<DocumentSentiment>,
}

#[derive(Debug, Deserialize)]
struct DocumentSentiment {
    #[serde(default)]
    score: f64,
}
