//! Persistent deduplication cache.
//!
//! Turns the news fetched in this run into the items not seen in earlier
//! runs, while keeping the persisted store bounded:
//!
//! ```text
//! cache_dir/
//! ├── news_cache.bin                    # active store (current + previous quarter)
//! ├── news_cache.bin.corrupt            # quarantined undecodable store, if any
//! └── archive/
//!     ├── news_archive_Q3_2024.bin      # one append-only bucket per old quarter
//!     └── news_archive_Q4_2024.bin
//! ```
//!
//! # Lookup window
//!
//! Only the most recent `lookup_window` active entries are consulted when
//! deciding whether an incoming URL is new. An item older than that boundary
//! can therefore come back as "new". This bounds lookup cost and is kept as a
//! configurable tradeoff (`cache.lookup_window`).

pub mod quarter;
pub mod store;

use crate::backoff::Clock;
use crate::errors::{CacheError, StoreError};
use crate::models::{CacheEntry, NewsItem};
use quarter::QuarterKey;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};

pub const ACTIVE_STORE_FILE: &str = "news_cache.bin";
pub const ARCHIVE_DIR: &str = "archive";

/// Existing entries split around the retention threshold.
#[derive(Debug, Default, PartialEq)]
pub struct Partitioned {
    /// Entries at or after the threshold, in stored order.
    pub active: Vec<CacheEntry>,
    /// Entries older than the threshold, by quarter, in stored order.
    pub archive: BTreeMap<QuarterKey, Vec<CacheEntry>>,
    /// Entries dropped for an unparseable date.
    pub dropped: usize,
}

/// Split entries by quarter; partitions older than `threshold` go to `archive`.
pub fn partition(entries: Vec<CacheEntry>, threshold: QuarterKey) -> Partitioned {
    let mut out = Partitioned::default();
    for entry in entries {
        let Some(date) = entry.published_on() else {
            out.dropped += 1;
            continue;
        };
        let key = QuarterKey::from_date(date);
        if key < threshold {
            out.archive.entry(key).or_default().push(entry);
        } else {
            out.active.push(entry);
        }
    }
    out
}

/// Keep incoming items whose URL is not among the last `window` active entries.
///
/// Repeated URLs inside `incoming` are kept once.
pub fn filter_new(active: &[CacheEntry], incoming: Vec<NewsItem>, window: usize) -> Vec<NewsItem> {
    let start = active.len().saturating_sub(window);
    let mut seen: HashSet<String> = active[start..].iter().map(|e| e.url.clone()).collect();
    incoming
        .into_iter()
        .filter(|item| seen.insert(item.url.clone()))
        .collect()
}

/// Owner of the on-disk store. Exactly one should exist per cache directory.
#[derive(Debug)]
pub struct DedupCache<C> {
    dir: PathBuf,
    lookup_window: usize,
    clock: C,
}

impl<C: Clock> DedupCache<C> {
    pub fn new(dir: impl Into<PathBuf>, lookup_window: usize, clock: C) -> Self {
        Self {
            dir: dir.into(),
            lookup_window,
            clock,
        }
    }

    pub fn active_path(&self) -> PathBuf {
        self.dir.join(ACTIVE_STORE_FILE)
    }

    pub fn archive_path(&self, key: QuarterKey) -> PathBuf {
        self.dir.join(ARCHIVE_DIR).join(key.archive_file_name())
    }

    /// Filter `new_items` down to the ones not seen before and record them.
    ///
    /// Load, archive stale quarters, filter, persist. Takes `&mut self` so the
    /// whole load-modify-persist sequence runs as one critical section.
    ///
    /// # Errors
    ///
    /// Both variants are recoverable and carry the items to report:
    /// - [`CacheError::Unreadable`]: the store could not be read; nothing filtered
    /// - [`CacheError::Persist`]: the delta is valid but was not saved
    #[instrument(level = "info", skip_all, fields(incoming = new_items.len(), dir = %self.dir.display()))]
    pub async fn filter_and_update(
        &mut self,
        new_items: Vec<NewsItem>,
    ) -> Result<Vec<NewsItem>, CacheError> {
        let path = self.active_path();
        let existing = match self.load_active(&path).await {
            Ok(entries) => entries,
            Err(source) => {
                error!(path = %path.display(), error = %source, "News cache unreadable; skipping dedup");
                return Err(CacheError::Unreadable {
                    path,
                    source,
                    items: new_items,
                });
            }
        };

        let threshold = QuarterKey::retention_threshold(self.clock.today());
        let Partitioned {
            mut active,
            archive,
            dropped,
        } = partition(existing, threshold);
        if dropped > 0 {
            debug!(dropped, "Dropped cache entries with unparseable dates");
        }

        let delta = filter_new(&active, new_items, self.lookup_window);

        for (key, entries) in archive {
            let count = entries.len();
            let archive_path = self.archive_path(key);
            if let Err(source) = self.append_to_archive(&archive_path, entries).await {
                error!(path = %archive_path.display(), error = %source, "Failed to write archive bucket");
                return Err(CacheError::Persist {
                    path: archive_path,
                    source,
                    delta,
                });
            }
            info!(quarter = %key, count, "Archived cache partition");
        }

        active.extend(delta.iter().cloned().map(CacheEntry::from));
        if let Err(source) = store::write_atomic(&path, &active).await {
            error!(path = %path.display(), error = %source, "Failed to persist news cache");
            return Err(CacheError::Persist {
                path,
                source,
                delta,
            });
        }

        info!(
            threshold = %threshold,
            new = delta.len(),
            active = active.len(),
            "News cache updated"
        );
        Ok(delta)
    }

    /// Read the active store, quarantining it if undecodable.
    async fn load_active(&self, path: &Path) -> Result<Vec<CacheEntry>, StoreError> {
        match store::load(path).await {
            Ok(entries) => Ok(entries),
            Err(e) if e.is_corruption() => {
                let moved = store::quarantine(path).await?;
                warn!(
                    error = %e,
                    quarantined = %moved.display(),
                    "News cache was corrupt; starting from an empty store"
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Merge entries into an archive bucket; URLs already archived are skipped.
    async fn append_to_archive(
        &self,
        path: &Path,
        entries: Vec<CacheEntry>,
    ) -> Result<(), StoreError> {
        let mut bucket = match store::load(path).await {
            Ok(bucket) => bucket,
            Err(e) if e.is_corruption() => {
                let moved = store::quarantine(path).await?;
                warn!(error = %e, quarantined = %moved.display(), "Archive bucket was corrupt; starting it afresh");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let mut urls: HashSet<String> = bucket.iter().map(|e| e.url.clone()).collect();
        bucket.extend(entries.into_iter().filter(|e| urls.insert(e.url.clone())));
        store::write_atomic(path, &bucket).await
    }
}
