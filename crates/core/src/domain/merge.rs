use crate::domain::snapshot::{average_sentiment, Item, Snapshot};
use std::collections::HashSet;

pub const DEFAULT_TARGET_WINDOW: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    /// Newest first: every new item, then retained items from the previous snapshot.
    pub items: Vec<Item>,
    pub average_score: f64,
    /// The aggregate dropped since the previous run.
    pub trending_toward_meltdown: bool,
}

/// Combines freshly scored items with the previous snapshot, bounded by `target_window`.
///
/// New items come first. Retained items only fill the remaining room, in their existing order,
/// and an item whose id was fetched again is not retained twice. A batch larger than the window
/// keeps its newest `target_window` items.
///
/// The result holds `min(target_window, n + p)` items for `n` new and `p` retained items with
/// distinct ids. When fetched ids overlap retained ones (dry runs re-read from the oldest
/// retained item) each overlapping id counts once.
pub fn merge(new_items: Vec<Item>, previous: &Snapshot, target_window: usize) -> Merged {
    let mut items = new_items;
    items.truncate(target_window);
    let seen: HashSet<String> = items.iter().map(|i| i.id.clone()).collect();

    let room = target_window.saturating_sub(items.len());
    items.extend(
        previous
            .items
            .iter()
            .filter(|old| !seen.contains(&old.id))
            .take(room)
            .cloned(),
    );

    let average_score = average_sentiment(&items);
    Merged {
        trending_toward_meltdown: previous.average_score > average_score,
        items,
        average_score,
    }
}
