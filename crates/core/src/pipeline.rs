use crate::config::Settings;
use crate::domain::merge::merge;
use crate::domain::snapshot::{Item, Snapshot};
use crate::error::RunError;
use crate::phrases::{PhraseBook, ReplyContext};
use crate::scoring::{caps_ratio, meltdown_percentage, Scorer};
use crate::sentiment::google::GoogleLanguageClient;
use crate::sentiment::SentimentClient;
use crate::social::twitter::TwitterClient;
use crate::social::SocialClient;
use crate::storage::cache::LocalCache;
use crate::storage::lock;
use crate::storage::objects::{GcsObjectStore, ObjectStore};
use crate::storage::state::{self, SnapshotSource};
use crate::storage::tweets::{PgTweetLog, TweetLog, TweetRow};
use crate::storage::export;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Dry run: synthetic scores, no posting, no remote writes.
    pub testing: bool,
    /// Export the recorded rows to CSV after the run.
    pub machine_learning: bool,
}

/// Borrowed view of everything a run talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub social: &'a dyn SocialClient,
    pub sentiment: Option<&'a dyn SentimentClient>,
    pub objects: Option<&'a dyn ObjectStore>,
    pub tweet_log: Option<&'a dyn TweetLog>,
    pub phrases: &'a PhraseBook,
    pub cache: &'a LocalCache,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub item_id: String,
    pub text: String,
    /// Id of the posted reply; `None` for dry runs and failed posts.
    pub posted_id: Option<String>,
}

#[derive(Debug)]
pub struct RunReport {
    pub snapshot: Snapshot,
    pub source: SnapshotSource,
    pub new_items: usize,
    pub trending_toward_meltdown: bool,
    pub replies: Vec<Reply>,
    pub exported_rows: Option<usize>,
    /// Non-fatal failures, in the order they happened.
    pub recovered: Vec<RunError>,
}

/// Executes one run: load, fetch, score, merge, reply, persist, export.
///
/// Fatal errors (state unavailable/corrupt, fetch failure) are returned before any reply is
/// posted or any snapshot is written. Everything after that point is best-effort and lands in
/// [`RunReport::recovered`]. Replies already posted are never rolled back.
pub async fn run(
    settings: &Settings,
    deps: Collaborators<'_>,
    opts: RunOptions,
    rng: &mut (dyn RngCore + Send),
    now: DateTime<Utc>,
) -> Result<RunReport, RunError> {
    let mut recovered = Vec::new();

    let (previous, source) = state::load(deps.cache, deps.objects, now).await?;
    tracing::info!(
        ?source,
        previous_items = previous.items.len(),
        previous_average = previous.average_score,
        "loaded previous snapshot"
    );

    // Dry runs re-read from the oldest retained item so there is something to score.
    let since = if opts.testing {
        previous.oldest()
    } else {
        previous.newest()
    }
    .map(|item| item.id.as_str());

    let posts = deps
        .social
        .fetch_timeline(&settings.subject, since, settings.page_size)
        .await
        .map_err(RunError::FetchFailed)?;
    tracing::info!(new_posts = posts.len(), since_id = since.unwrap_or(""), "fetched timeline");

    let scorer = match (opts.testing, deps.sentiment) {
        (true, _) => Some(Scorer::Simulated),
        (false, Some(client)) => Some(Scorer::Live(client)),
        (false, None) => None,
    };

    let mut new_items: Vec<Item> = Vec::with_capacity(posts.len());
    for post in &posts {
        let embed_html = match deps.social.fetch_embed_html(&settings.subject, &post.id).await {
            Ok(html) => html,
            Err(err) => {
                tracing::warn!(item_id = %post.id, error = %format!("{err:#}"), "embed html unavailable");
                String::new()
            }
        };

        let scored = match &scorer {
            Some(scorer) => scorer.score(post, embed_html, rng).await,
            None => Err(anyhow::anyhow!("no sentiment backend configured")),
        };
        let item = match scored {
            Ok(item) => item,
            Err(source) => {
                let err = RunError::ScoreFailed {
                    item_id: post.id.clone(),
                    source,
                };
                tracing::error!(error = %err, "skipping item");
                recovered.push(err);
                continue;
            }
        };

        let meltdown_pct = meltdown_percentage(item.sentiment);
        tracing::info!(
            item_id = %item.id,
            sentiment = item.sentiment,
            meltdown_pct,
            positive = item.sentiment >= 0.0,
            "scored item"
        );

        if !opts.testing {
            if let Some(log) = deps.tweet_log {
                let row = TweetRow {
                    tweet_id: item.id.clone(),
                    text: item.text.clone(),
                    embed_html: item.embed_html.clone(),
                    meltdown_pct,
                    caps_percentage: caps_ratio(&item.text),
                };
                if let Err(err) = log.record(&row).await {
                    tracing::warn!(item_id = %item.id, error = %format!("{err:#}"), "failed to record item row");
                }
            }
        }

        new_items.push(item);
    }

    let merged = merge(new_items.clone(), &previous, settings.target_window);
    tracing::info!(
        new_items = new_items.len(),
        retained = merged.items.len().saturating_sub(new_items.len()),
        average = merged.average_score,
        trending = merged.trending_toward_meltdown,
        "merged working set"
    );

    let mut snapshot = Snapshot {
        captured_at: now,
        item_count: merged.items.len(),
        items: merged.items,
        average_score: merged.average_score,
        next_update_at: now + Duration::seconds(settings.next_update_secs),
        last_published_reply_id: previous.last_published_reply_id.clone(),
    };

    let mut replies = Vec::with_capacity(new_items.len());
    for item in &new_items {
        let text = deps.phrases.compose_reply(
            &ReplyContext {
                handle: &settings.subject,
                subject_tag: &settings.subject_tag,
                site_url: &settings.site_url,
                item_id: &item.id,
                meltdown_pct: meltdown_percentage(item.sentiment),
                average_score: snapshot.average_score,
                trending_toward_meltdown: merged.trending_toward_meltdown,
            },
            rng,
        );

        if opts.testing {
            tracing::info!(item_id = %item.id, %text, "dry run; not posting reply");
            replies.push(Reply {
                item_id: item.id.clone(),
                text,
                posted_id: None,
            });
            continue;
        }

        tracing::info!(item_id = %item.id, "posting reply");
        let posted_id = match deps.social.post_reply(&text, &item.id).await {
            Ok(reply_id) => {
                tracing::info!(item_id = %item.id, %reply_id, "reply posted");
                snapshot.last_published_reply_id = reply_id.clone();
                Some(reply_id)
            }
            Err(source) => {
                let err = RunError::PostFailed {
                    item_id: item.id.clone(),
                    source,
                };
                tracing::error!(error = %err, "reply not posted");
                recovered.push(err);
                None
            }
        };
        replies.push(Reply {
            item_id: item.id.clone(),
            text,
            posted_id,
        });
    }

    for err in state::persist(
        deps.cache,
        deps.objects,
        &snapshot,
        opts.testing,
        !new_items.is_empty(),
    )
    .await
    {
        tracing::error!(error = %err, "snapshot not fully persisted");
        recovered.push(err);
    }

    let mut exported_rows = None;
    if opts.machine_learning {
        match export_rows(settings, deps.tweet_log).await {
            Ok(n) => {
                tracing::info!(rows = n, path = %settings.export_path.display(), "exported tweet data");
                exported_rows = Some(n);
            }
            Err(source) => {
                let err = RunError::ExportFailed(source);
                tracing::error!(error = %err, "export failed");
                recovered.push(err);
            }
        }
    }

    Ok(RunReport {
        snapshot,
        source,
        new_items: new_items.len(),
        trending_toward_meltdown: merged.trending_toward_meltdown,
        replies,
        exported_rows,
        recovered,
    })
}

async fn export_rows(settings: &Settings, log: Option<&dyn TweetLog>) -> anyhow::Result<usize> {
    let log = log.ok_or_else(|| anyhow::anyhow!("no database configured"))?;
    let rows = log.export_rows().await?;
    export::write_csv(&settings.export_path, &rows)
}

/// Owned clients built once from [`Settings`].
pub struct Services {
    pub social: Box<dyn SocialClient>,
    pub sentiment: Option<Box<dyn SentimentClient>>,
    pub objects: Option<Box<dyn ObjectStore>>,
    pub tweet_log: Option<Box<dyn TweetLog>>,
    pub pool: Option<sqlx::PgPool>,
    pub phrases: PhraseBook,
    pub cache: LocalCache,
}

impl Services {
    /// Optional backends that are not configured are left out with a warning; the social
    /// client is always required.
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let social: Box<dyn SocialClient> = Box::new(TwitterClient::from_settings(settings)?);

        let sentiment: Option<Box<dyn SentimentClient>> =
            match GoogleLanguageClient::from_settings(settings) {
                Ok(client) => {
                    tracing::info!(provider = client.provider(), "sentiment backend enabled");
                    Some(Box::new(client) as Box<dyn SentimentClient>)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "sentiment backend disabled; only dry runs possible");
                    None
                }
            };

        let objects: Option<Box<dyn ObjectStore>> = match GcsObjectStore::from_settings(settings) {
            Ok(store) => Some(Box::new(store) as Box<dyn ObjectStore>),
            Err(err) => {
                tracing::warn!(error = %err, "bucket disabled; snapshot is local only");
                None
            }
        };

        let pool = match settings.require_database_url() {
            Ok(url) => match crate::storage::connect(url).await {
                Ok(pool) => Some(pool),
                Err(err) => {
                    tracing::error!(error = %format!("{err:#}"), "database unavailable; rows will not be recorded");
                    None
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "database disabled");
                None
            }
        };
        let tweet_log = pool
            .clone()
            .map(|pool| Box::new(PgTweetLog::new(pool)) as Box<dyn TweetLog>);

        let phrases = match PhraseBook::load(&settings.phrases_path) {
            Ok(book) => book,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "using fallback reply phrase");
                PhraseBook::default()
            }
        };

        Ok(Self {
            social,
            sentiment,
            objects,
            tweet_log,
            pool,
            phrases,
            cache: LocalCache::new(settings.cache_dir.clone()),
        })
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            social: self.social.as_ref(),
            sentiment: self.sentiment.as_deref(),
            objects: self.objects.as_deref(),
            tweet_log: self.tweet_log.as_deref(),
            phrases: &self.phrases,
            cache: &self.cache,
        }
    }

    /// Runs once, holding the database run lock for live runs when a database is configured.
    /// Returns `Ok(None)` when another process holds the lock.
    pub async fn run_once(
        &self,
        settings: &Settings,
        opts: RunOptions,
        rng: &mut (dyn RngCore + Send),
        now: DateTime<Utc>,
    ) -> Result<Option<RunReport>, RunError> {
        let run_lock = match (&self.pool, opts.testing) {
            (Some(pool), false) => match lock::try_acquire_run_lock(pool).await {
                Ok(Some(guard)) => Some(guard),
                Ok(None) => {
                    tracing::warn!("run lock not acquired; another run in progress");
                    return Ok(None);
                }
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "run lock unavailable; continuing without it");
                    None
                }
            },
            _ => None,
        };

        let result = run(settings, self.collaborators(), opts, rng, now).await;

        if let Some(guard) = run_lock {
            if let Err(err) = guard.release().await {
                tracing::warn!(error = %format!("{err:#}"), "failed to release run lock");
            }
        }

        result.map(Some)
    }
}
