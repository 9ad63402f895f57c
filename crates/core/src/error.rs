use std::fmt;

/// Failure classes of a run. Fatal ones end the run; the rest are recorded and the run continues.
#[derive(Debug)]
pub enum RunError {
    /// Neither the local cache nor the bucket could be read.
    StateUnavailable(anyhow::Error),
    /// A snapshot was found but could not be parsed.
    StateCorrupt(anyhow::Error),
    FetchFailed(anyhow::Error),
    ScoreFailed { item_id: String, source: anyhow::Error },
    PostFailed { item_id: String, source: anyhow::Error },
    PersistFailed { stage: &'static str, source: anyhow::Error },
    ExportFailed(anyhow::Error),
}

impl RunError {
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::StateUnavailable(_) => "state_unavailable",
            RunError::StateCorrupt(_) => "state_corrupt",
            RunError::FetchFailed(_) => "fetch_failed",
            RunError::ScoreFailed { .. } => "score_failed",
            RunError::PostFailed { .. } => "post_failed",
            RunError::PersistFailed { .. } => "persist_failed",
            RunError::ExportFailed(_) => "export_failed",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RunError::StateUnavailable(_) | RunError::StateCorrupt(_) | RunError::FetchFailed(_)
        )
    }

    fn source_error(&self) -> &anyhow::Error {
        match self {
            RunError::StateUnavailable(e)
            | RunError::StateCorrupt(e)
            | RunError::FetchFailed(e)
            | RunError::ExportFailed(e) => e,
            RunError::ScoreFailed { source, .. }
            | RunError::PostFailed { source, .. }
            | RunError::PersistFailed { source, .. } => source,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::ScoreFailed { item_id, source } => {
                write!(f, "scoring item {item_id} failed: {source:#}")
            }
            RunError::PostFailed { item_id, source } => {
                write!(f, "reply to item {item_id} failed: {source:#}")
            }
            RunError::PersistFailed { stage, source } => {
                write!(f, "persisting snapshot failed (stage={stage}): {source:#}")
            }
            other => write!(f, "{} ({:#})", other.kind(), other.source_error()),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source_error().as_ref())
    }
}
