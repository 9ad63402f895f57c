use crate::domain::snapshot::Snapshot;
use crate::error::RunError;
use crate::storage::cache::LocalCache;
use crate::storage::objects::{ObjectStore, JSON_CONTENT_TYPE, PUBLIC_CACHE_CONTROL};
use chrono::{DateTime, Utc};

/// Canonical key of the published snapshot, locally and in the bucket.
pub const LATEST_KEY: &str = "latest";
/// Local file written by dry runs instead of the canonical snapshot.
pub const TEST_OUTPUT_NAME: &str = "testjson";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    LocalCache,
    Remote,
    /// Nothing persisted yet anywhere; started from an empty snapshot.
    Bootstrap,
}

/// Loads the previous run's snapshot: local cache first, then the bucket.
///
/// A corrupt document is never treated as missing.
pub async fn load(
    cache: &LocalCache,
    objects: Option<&dyn ObjectStore>,
    now: DateTime<Utc>,
) -> Result<(Snapshot, SnapshotSource), RunError> {
    match cache.read(LATEST_KEY).await {
        Ok(Some(bytes)) => {
            let snapshot = Snapshot::from_json(&bytes).map_err(|e| {
                RunError::StateCorrupt(e.context(format!(
                    "local snapshot {} is not valid",
                    cache.path(LATEST_KEY).display()
                )))
            })?;
            return Ok((snapshot, SnapshotSource::LocalCache));
        }
        Ok(None) => {
            tracing::info!(path = %cache.path(LATEST_KEY).display(), "local snapshot not found; reaching out to bucket");
        }
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "local snapshot unreadable; reaching out to bucket");
        }
    }

    let Some(objects) = objects else {
        return Err(RunError::StateUnavailable(anyhow::anyhow!(
            "no local snapshot and no bucket configured"
        )));
    };

    match objects.get(LATEST_KEY).await {
        Ok(Some(bytes)) => {
            let snapshot = Snapshot::from_json(&bytes).map_err(|e| {
                RunError::StateCorrupt(e.context("remote snapshot is not valid"))
            })?;
            Ok((snapshot, SnapshotSource::Remote))
        }
        Ok(None) => {
            tracing::warn!(key = LATEST_KEY, "no snapshot in bucket; starting from an empty snapshot");
            Ok((Snapshot::empty(now), SnapshotSource::Bootstrap))
        }
        Err(err) => Err(RunError::StateUnavailable(err)),
    }
}

/// Writes the final snapshot.
///
/// Dry runs only write [`TEST_OUTPUT_NAME`]. Live runs always refresh the local cache and, when
/// the run produced new items, upload a timestamped copy and promote it over [`LATEST_KEY`].
/// Returns every failure encountered; the local timestamped file is removed either way.
pub async fn persist(
    cache: &LocalCache,
    objects: Option<&dyn ObjectStore>,
    snapshot: &Snapshot,
    testing: bool,
    has_new_items: bool,
) -> Vec<RunError> {
    let body = match snapshot.to_json() {
        Ok(body) => body,
        Err(source) => {
            return vec![RunError::PersistFailed {
                stage: "serialize",
                source,
            }]
        }
    };

    if testing {
        return match cache.write(TEST_OUTPUT_NAME, &body).await {
            Ok(()) => Vec::new(),
            Err(source) => vec![RunError::PersistFailed {
                stage: "local",
                source,
            }],
        };
    }

    let mut failures = Vec::new();
    let archive_key = snapshot.captured_at.timestamp().to_string();

    for name in [archive_key.as_str(), LATEST_KEY] {
        if let Err(source) = cache.write(name, &body).await {
            failures.push(RunError::PersistFailed {
                stage: "local",
                source,
            });
        }
    }

    if has_new_items {
        tracing::info!(key = %archive_key, "new items exist; publishing snapshot to bucket");
        if let Err(source) = publish(objects, &archive_key, body).await {
            failures.push(RunError::PersistFailed {
                stage: "remote",
                source,
            });
        }
    }

    if let Err(source) = cache.remove(&archive_key).await {
        failures.push(RunError::PersistFailed {
            stage: "cleanup",
            source,
        });
    }

    failures
}

async fn publish(
    objects: Option<&dyn ObjectStore>,
    archive_key: &str,
    body: Vec<u8>,
) -> anyhow::Result<()> {
    let objects = objects.ok_or_else(|| anyhow::anyhow!("no bucket configured"))?;
    objects
        .put(archive_key, body, JSON_CONTENT_TYPE, PUBLIC_CACHE_CONTROL)
        .await?;
    objects.copy(archive_key, LATEST_KEY).await?;
    objects.make_public(LATEST_KEY).await
}
