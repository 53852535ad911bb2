//! Result Aggregator
//!
//! Accumulates discovered, visited and failed URLs for a run. Invariants
//! kept by every operation:
//!
//! - a URL is never both visited and failed
//! - a URL is only visited or failed after it was discovered
//! - a later success replaces an earlier failure for the same URL

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

/// Final outcome of a crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub start_url: String,
    pub discovered_urls: BTreeSet<String>,
    pub visited_urls: BTreeSet<String>,
    /// URL to failure reason
    pub failed_urls: BTreeMap<String, String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Deepest level among visited URLs
    pub max_depth_reached: u32,
}

impl CrawlResult {
    pub fn duration(&self) -> Duration {
        (self.end_time - self.start_time)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// `visited / (visited + failed)`, 1.0 when nothing was attempted
    pub fn success_rate(&self) -> f64 {
        let visited = self.visited_urls.len();
        let attempted = visited + self.failed_urls.len();
        if attempted == 0 {
            1.0
        } else {
            visited as f64 / attempted as f64
        }
    }
}

/// Serializable aggregator contents, stored in checkpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsSnapshot {
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// URL to discovery depth
    #[serde(default)]
    pub discovered: BTreeMap<String, u32>,
    #[serde(default)]
    pub visited: BTreeSet<String>,
    #[serde(default)]
    pub failed: BTreeMap<String, String>,
}

#[derive(Debug)]
struct Tally {
    start_url: String,
    start_time: DateTime<Utc>,
    discovered: BTreeMap<String, u32>,
    visited: BTreeSet<String>,
    failed: BTreeMap<String, String>,
}

/// Thread-safe accumulator behind a single lock
#[derive(Debug)]
pub struct ResultAggregator {
    tally: Mutex<Tally>,
}

impl ResultAggregator {
    pub fn new(start_url: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            tally: Mutex::new(Tally {
                start_url: start_url.into(),
                start_time,
                discovered: BTreeMap::new(),
                visited: BTreeSet::new(),
                failed: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tally> {
        self.tally.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records an admitted URL; the first recorded depth wins
    pub fn record_discovered(&self, url: &str, depth: u32) {
        self.lock().discovered.entry(url.to_string()).or_insert(depth);
    }

    /// Records a successful fetch, replacing any earlier failure
    pub fn record_visited(&self, url: &str, depth: u32) {
        let mut tally = self.lock();
        tally.discovered.entry(url.to_string()).or_insert(depth);
        tally.failed.remove(url);
        tally.visited.insert(url.to_string());
    }

    /// Records a terminal failure; ignored if the URL was already visited
    pub fn record_failed(&self, url: &str, depth: u32, reason: &str) {
        let mut tally = self.lock();
        if tally.visited.contains(url) {
            return;
        }
        tally.discovered.entry(url.to_string()).or_insert(depth);
        tally.failed.insert(url.to_string(), reason.to_string());
    }

    /// `(discovered, visited, failed)` counts
    pub fn counts(&self) -> (usize, usize, usize) {
        let tally = self.lock();
        (
            tally.discovered.len(),
            tally.visited.len(),
            tally.failed.len(),
        )
    }

    pub fn snapshot(&self) -> ResultsSnapshot {
        let tally = self.lock();
        ResultsSnapshot {
            start_time: Some(tally.start_time),
            discovered: tally.discovered.clone(),
            visited: tally.visited.clone(),
            failed: tally.failed.clone(),
        }
    }

    /// Merges checkpointed results into this aggregator
    ///
    /// The snapshot's start time is kept so durations span the whole run.
    pub fn restore(&self, snapshot: &ResultsSnapshot) {
        let mut tally = self.lock();
        if let Some(start) = snapshot.start_time {
            tally.start_time = tally.start_time.min(start);
        }
        for (url, depth) in &snapshot.discovered {
            tally.discovered.entry(url.clone()).or_insert(*depth);
        }
        for url in &snapshot.visited {
            tally.failed.remove(url);
            tally.visited.insert(url.clone());
        }
        for (url, reason) in &snapshot.failed {
            if !tally.visited.contains(url) {
                tally.failed.insert(url.clone(), reason.clone());
            }
        }
    }

    /// Builds the final result, stamping `end_time`
    pub fn finalize(&self, end_time: DateTime<Utc>) -> CrawlResult {
        let tally = self.lock();
        let max_depth_reached = tally
            .visited
            .iter()
            .filter_map(|url| tally.discovered.get(url))
            .copied()
            .max()
            .unwrap_or(0);

        CrawlResult {
            start_url: tally.start_url.clone(),
            discovered_urls: tally.discovered.keys().cloned().collect(),
            visited_urls: tally.visited.clone(),
            failed_urls: tally.failed.clone(),
            start_time: tally.start_time,
            end_time,
            max_depth_reached,
        }
    }
}
