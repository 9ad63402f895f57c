use crate::config::Settings;
use anyhow::Context;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;

const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const PUBLIC_CACHE_CONTROL: &str = "public, max-age=60";

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(None)` when the object does not exist; `Err` when the store could not be asked.
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        cache_control: &str,
    ) -> anyhow::Result<()>;

    async fn copy(&self, src: &str, dst: &str) -> anyhow::Result<()>;

    /// Grants anonymous read access to `key`.
    async fn make_public(&self, key: &str) -> anyhow::Result<()>;
}

/// Google Cloud Storage over the JSON API. The bearer token is passed through as-is.
#[derive(Debug, Clone)]
pub struct GcsObjectStore {
    http: reqwest::Client,
    bucket: String,
    token: Option<String>,
    base_url: String,
}

impl GcsObjectStore {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            http: settings.http_client()?,
            bucket: settings.require_bucket()?.to_string(),
            token: settings.gcs_access_token.clone(),
            base_url: settings
                .gcs_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.base_url,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(key)
        )
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.header(AUTHORIZATION, format!("Bearer {token}")),
            None => req,
        }
    }

    async fn expect_success(res: reqwest::Response, what: &str) -> anyhow::Result<()> {
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("{what} HTTP {status}: {body}");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ObjectStore for GcsObjectStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let res = self
            .authorized(self.http.get(self.object_url(key)))
            .query(&[("alt", "media")])
            .send()
            .await
            .with_context(|| format!("read gs://{}/{key} failed", self.bucket))?;

        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("read gs://{}/{key} HTTP {status}: {body}", self.bucket);
        }
        let bytes = res
            .bytes()
            .await
            .with_context(|| format!("read body of gs://{}/{key} failed", self.bucket))?;
        Ok(Some(bytes.to_vec()))
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        cache_control: &str,
    ) -> anyhow::Result<()> {
        let url = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.base_url,
            urlencoding::encode(&self.bucket)
        );
        let res = self
            .authorized(self.http.post(url))
            .query(&[("uploadType", "media"), ("name", key)])
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .with_context(|| format!("upload gs://{}/{key} failed", self.bucket))?;
        Self::expect_success(res, "upload").await?;

        // Media uploads cannot carry metadata; set it in a follow-up patch.
        let res = self
            .authorized(self.http.patch(self.object_url(key)))
            .json(&serde_json::json!({ "cacheControl": cache_control }))
            .send()
            .await
            .with_context(|| format!("set metadata on gs://{}/{key} failed", self.bucket))?;
        Self::expect_success(res, "metadata patch").await
    }

    async fn copy(&self, src: &str, dst: &str) -> anyhow::Result<()> {
        let bucket = urlencoding::encode(&self.bucket);
        let url = format!(
            "{}/storage/v1/b/{bucket}/o/{}/rewriteTo/b/{bucket}/o/{}",
            self.base_url,
            urlencoding::encode(src),
            urlencoding::encode(dst)
        );
        let res = self
            .authorized(self.http.post(url))
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body("{}")
            .send()
            .await
            .with_context(|| format!("copy {src} -> {dst} failed"))?;
        Self::expect_success(res, "copy").await
    }

    async fn make_public(&self, key: &str) -> anyhow::Result<()> {
        let res = self
            .authorized(self.http.post(format!("{}/acl", self.object_url(key))))
            .json(&serde_json::json!({ "entity": "allUsers", "role": "READER" }))
            .send()
            .await
            .with_context(|| format!("set ACL on gs://{}/{key} failed", self.bucket))?;
        Self::expect_success(res, "acl").await
    }
}
