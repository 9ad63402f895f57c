pub mod domain;
pub mod error;
pub mod phrases;
pub mod pipeline;
pub mod scoring;
pub mod sentiment;
pub mod social;
pub mod storage;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    const DEFAULT_SUBJECT: &str = "realDonaldTrump";
    const DEFAULT_SUBJECT_TAG: &str = "Trump";
    const DEFAULT_SITE_URL: &str = "https://isTrumpMeltingDown.com";
    const DEFAULT_DB_NAME: &str = "trumpmeltdown";
    const DEFAULT_PORT: u16 = 8080;
    const DEFAULT_WINDOW: usize = 10;
    const DEFAULT_PAGE_SIZE: u32 = 20;
    const DEFAULT_NEXT_UPDATE_SECS: i64 = 5;
    const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub consumer_key: Option<String>,
        pub consumer_secret: Option<String>,
        pub access_token: Option<String>,
        pub access_secret: Option<String>,
        /// Screen name whose timeline is scored and replied to.
        pub subject: String,
        /// Hashtag used in the editorial clause of every reply.
        pub subject_tag: String,
        pub site_url: String,

        pub database_url: Option<String>,
        pub bucket: Option<String>,
        pub gcs_access_token: Option<String>,
        pub gcs_base_url: Option<String>,
        pub language_api_key: Option<String>,
        pub language_base_url: Option<String>,
        pub twitter_api_base_url: Option<String>,
        pub twitter_oembed_url: Option<String>,
        pub sentry_dsn: Option<String>,

        pub cache_dir: PathBuf,
        pub phrases_path: PathBuf,
        pub export_path: PathBuf,

        pub target_window: usize,
        pub page_size: u32,
        pub next_update_secs: i64,
        pub http_timeout_secs: u64,
        pub port: u16,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
        where
            F: Fn(&str) -> Option<String>,
        {
            let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

            Ok(Self {
                consumer_key: get("TRUMPMELTDOWN_CONSUMER_KEY"),
                consumer_secret: get("TRUMPMELTDOWN_CONSUMER_SECRET"),
                access_token: get("TRUMPMELTDOWN_ACCESS_TOKEN"),
                access_secret: get("TRUMPMELTDOWN_ACCESS_SECRET"),
                subject: get("TRUMPMELTDOWN_SUBJECT").unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
                subject_tag: get("TRUMPMELTDOWN_SUBJECT_TAG")
                    .unwrap_or_else(|| DEFAULT_SUBJECT_TAG.to_string()),
                site_url: get("TRUMPMELTDOWN_SITE_URL")
                    .unwrap_or_else(|| DEFAULT_SITE_URL.to_string()),

                database_url: get("DATABASE_URL").or_else(|| {
                    compose_database_url(
                        get("TRUMPMELTDOWN_DBUSER")?,
                        get("TRUMPMELTDOWN_DBPASS").unwrap_or_default(),
                        get("DBHOST")?,
                        get("TRUMPMELTDOWN_DBNAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
                    )
                }),
                bucket: get("TRUMPMELTDOWN_SENTIMENT_BUCKET"),
                gcs_access_token: get("GCS_ACCESS_TOKEN"),
                gcs_base_url: get("GCS_BASE_URL"),
                language_api_key: get("GOOGLE_LANGUAGE_API_KEY"),
                language_base_url: get("GOOGLE_LANGUAGE_BASE_URL"),
                twitter_api_base_url: get("TWITTER_API_BASE_URL"),
                twitter_oembed_url: get("TWITTER_OEMBED_URL"),
                sentry_dsn: get("SENTRY_DSN"),

                cache_dir: get("TRUMPMELTDOWN_CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(".")),
                phrases_path: get("TRUMPMELTDOWN_PHRASES")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("phrases.json")),
                export_path: get("TRUMPMELTDOWN_EXPORT_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("tweet_data.csv")),

                target_window: parse_or(get("TRUMPMELTDOWN_WINDOW"), "TRUMPMELTDOWN_WINDOW", DEFAULT_WINDOW)?,
                page_size: parse_or(get("TRUMPMELTDOWN_PAGE_SIZE"), "TRUMPMELTDOWN_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
                next_update_secs: parse_or(
                    get("TRUMPMELTDOWN_NEXT_UPDATE_SECS"),
                    "TRUMPMELTDOWN_NEXT_UPDATE_SECS",
                    DEFAULT_NEXT_UPDATE_SECS,
                )?,
                http_timeout_secs: parse_or(
                    get("HTTP_TIMEOUT_SECS"),
                    "HTTP_TIMEOUT_SECS",
                    DEFAULT_HTTP_TIMEOUT_SECS,
                )?,
                port: parse_or(get("PORT"), "PORT", DEFAULT_PORT)?,
            })
        }

        pub fn require_consumer_key(&self) -> anyhow::Result<&str> {
            self.consumer_key
                .as_deref()
                .context("TRUMPMELTDOWN_CONSUMER_KEY is required")
        }

        pub fn require_consumer_secret(&self) -> anyhow::Result<&str> {
            self.consumer_secret
                .as_deref()
                .context("TRUMPMELTDOWN_CONSUMER_SECRET is required")
        }

        pub fn require_access_token(&self) -> anyhow::Result<&str> {
            self.access_token
                .as_deref()
                .context("TRUMPMELTDOWN_ACCESS_TOKEN is required")
        }

        pub fn require_access_secret(&self) -> anyhow::Result<&str> {
            self.access_secret
                .as_deref()
                .context("TRUMPMELTDOWN_ACCESS_SECRET is required")
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL (or TRUMPMELTDOWN_DBUSER/DBHOST) is required")
        }

        pub fn require_bucket(&self) -> anyhow::Result<&str> {
            self.bucket
                .as_deref()
                .context("TRUMPMELTDOWN_SENTIMENT_BUCKET is required")
        }

        pub fn require_language_api_key(&self) -> anyhow::Result<&str> {
            self.language_api_key
                .as_deref()
                .context("GOOGLE_LANGUAGE_API_KEY is required")
        }

        pub fn http_client(&self) -> anyhow::Result<reqwest::Client> {
            reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(self.http_timeout_secs))
                .build()
                .context("failed to build reqwest client")
        }
    }

    fn compose_database_url(user: String, pass: String, host: String, db: String) -> Option<String> {
        let user = urlencoding::encode(&user);
        let pass = urlencoding::encode(&pass);
        Some(format!("postgres://{user}:{pass}@{host}/{db}"))
    }

    fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T> {
        match raw {
            Some(s) => s
                .trim()
                .parse::<T>()
                .map_err(|_| anyhow::anyhow!("{key} has an invalid value: {s}")),
            None => Ok(default),
        }
    }

}
