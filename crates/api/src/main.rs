use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meltdown_core::config::Settings;
use meltdown_core::pipeline::{RunOptions, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let services = Services::from_settings(&settings).await?;
    let state = AppState {
        settings: Arc::new(settings),
        services: Arc::new(services),
        run_guard: Arc::new(tokio::sync::Mutex::new(())),
    };
    let port = state.settings.port;

    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "trigger listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(trigger))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    services: Arc<Services>,
    /// One run per process at a time.
    run_guard: Arc<tokio::sync::Mutex<()>>,
}

#[derive(Debug, Default, Deserialize)]
struct TriggerParams {
    testing: Option<String>,
    #[serde(rename = "machineLearning")]
    machine_learning: Option<String>,
}

impl TriggerParams {
    /// Live posting needs an explicit `testing=false`; anything else, including a missing
    /// parameter, is a dry run. Export needs an explicit `machineLearning=true`.
    fn options(&self) -> RunOptions {
        let is = |v: &Option<String>, expected: &str| {
            v.as_deref()
                .is_some_and(|s| s.trim().eq_ignore_ascii_case(expected))
        };
        RunOptions {
            testing: !is(&self.testing, "false"),
            machine_learning: is(&self.machine_learning, "true"),
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

/// Always answers 200 right away; run failures only surface in logs and Sentry.
async fn trigger(State(state): State<AppState>, Query(params): Query<TriggerParams>) -> &'static str {
    let opts = params.options();
    tracing::info!(testing = opts.testing, machine_learning = opts.machine_learning, "run requested");

    let Ok(running) = state.run_guard.clone().try_lock_owned() else {
        tracing::warn!("run already in progress; ignoring trigger");
        return "ok";
    };

    // Detached from the request: a caller hanging up must not stop a run halfway.
    tokio::spawn(async move {
        let _running = running;
        run_and_report(&state, opts).await;
    });

    "ok"
}

async fn run_and_report(state: &AppState, opts: RunOptions) {
    let mut rng = StdRng::from_entropy();
    match state
        .services
        .run_once(&state.settings, opts, &mut rng, chrono::Utc::now())
        .await
    {
        Ok(Some(report)) => {
            for err in &report.recovered {
                sentry_anyhow::capture_anyhow(&anyhow::anyhow!("{err}"));
            }
            tracing::info!(
                new_items = report.new_items,
                replies = report.replies.len(),
                recovered = report.recovered.len(),
                average = report.snapshot.average_score,
                "run finished"
            );
        }
        Ok(None) => {}
        Err(err) => {
            sentry_anyhow::capture_anyhow(&anyhow::anyhow!("{err}"));
            tracing::error!(error = %err, "run aborted");
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meltdown_core::domain::snapshot::Snapshot;
    use meltdown_core::phrases::PhraseBook;
    use meltdown_core::social::{RawPost, SocialClient};
    use meltdown_core::storage::cache::LocalCache;
    use meltdown_core::storage::state::{LATEST_KEY, TEST_OUTPUT_NAME};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    fn params(testing: Option<&str>, ml: Option<&str>) -> TriggerParams {
        TriggerParams {
            testing: testing.map(str::to_string),
            machine_learning: ml.map(str::to_string),
        }
    }

    #[test]
    fn missing_parameters_mean_dry_run_without_export() {
        assert_eq!(
            params(None, None).options(),
            RunOptions {
                testing: true,
                machine_learning: false,
            }
        );
    }

    #[test]
    fn live_mode_requires_explicit_false() {
        assert!(!params(Some("false"), None).options().testing);
        assert!(!params(Some("FALSE"), None).options().testing);
        assert!(params(Some("0"), None).options().testing);
        assert!(params(Some("no"), None).options().testing);
        assert!(params(Some("true"), None).options().testing);
    }

    #[test]
    fn export_requires_explicit_true() {
        assert!(params(None, Some("True")).options().machine_learning);
        assert!(!params(None, Some("yes")).options().machine_learning);
        assert!(!params(None, Some("")).options().machine_learning);
    }

    #[test]
    fn query_string_names_are_camel_case() {
        let parsed: TriggerParams =
            parse_query("testing=false&machineLearning=true");
        assert_eq!(
            parsed.options(),
            RunOptions {
                testing: false,
                machine_learning: true,
            }
        );
    }

    fn parse_query(query: &str) -> TriggerParams {
        let uri: axum::http::Uri = format!("/?{query}").parse().unwrap();
        Query::<TriggerParams>::try_from_uri(&uri).unwrap().0
    }

    struct SlowSocial {
        delay: Duration,
        fetched: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl SocialClient for SlowSocial {
        async fn fetch_timeline(
            &self,
            _handle: &str,
            _since_id: Option<&str>,
            _count: u32,
        ) -> anyhow::Result<Vec<RawPost>> {
            tokio::time::sleep(self.delay).await;
            self.fetched.store(true, Ordering::SeqCst);
            Ok(vec![RawPost {
                id: "200".to_string(),
                text: "new".to_string(),
            }])
        }

        async fn fetch_embed_html(&self, _handle: &str, _id: &str) -> anyhow::Result<String> {
            Ok(String::new())
        }

        async fn post_reply(&self, _text: &str, _in_reply_to: &str) -> anyhow::Result<String> {
            anyhow::bail!("dry runs never post")
        }
    }

    #[tokio::test]
    async fn run_completes_after_caller_hangs_up() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let cache = LocalCache::new(root.clone());
        cache
            .write(LATEST_KEY, &Snapshot::empty(chrono::Utc::now()).to_json().unwrap())
            .await
            .unwrap();

        let settings = Settings::from_lookup(|k| match k {
            "TRUMPMELTDOWN_CACHE_DIR" => Some(root.display().to_string()),
            _ => None,
        })
        .unwrap();
        let fetched = Arc::new(AtomicBool::new(false));
        let services = Services {
            social: Box::new(SlowSocial {
                delay: Duration::from_millis(500),
                fetched: fetched.clone(),
            }),
            sentiment: None,
            objects: None,
            tweet_log: None,
            pool: None,
            phrases: PhraseBook::default(),
            cache: cache.clone(),
        };
        let state = AppState {
            settings: Arc::new(settings),
            services: Arc::new(services),
            run_guard: Arc::new(tokio::sync::Mutex::new(())),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(state)).await });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /?testing=true HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(stream);

        let output = cache.path(TEST_OUTPUT_NAME);
        for _ in 0..60 {
            if output.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(fetched.load(Ordering::SeqCst));
        assert!(output.exists(), "dry-run output missing at {}", output.display());
    }
}
