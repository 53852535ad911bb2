//! Frontier & Traversal Controller
//!
//! Holds pending work and hands it to workers in strategy order. All queue
//! mutations happen under one lock; the [`DedupStore`] and the
//! [`ResultAggregator`] are only touched while that lock is held, so a
//! snapshot taken under it is consistent across all three.
//!
//! Entries move through three places:
//!
//! - the queue (BFS levels or a DFS stack), ready to be popped
//! - the deferred list, waiting for a wake time (rate limit, circuit, backoff)
//! - the in-flight map, leased to a worker until completed or put back
//!
//! For BFS, an entry at depth `d + 1` is only popped once no entry at depth
//! `d` or less remains in any of the three places.

use crate::config::TraversalStrategy;
use crate::frontier::dedup::DedupStore;
use crate::frontier::entry::{DedupKey, FrontierEntry};
use crate::output::ResultAggregator;
use crate::url::{extract_host, has_skipped_extension, DomainAllowList};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use url::Url;

/// Failure reason for URLs whose host is outside the allowed domains
pub const DOMAIN_NOT_ALLOWED: &str = "domain not in allow-list";

/// Caller-supplied predicate; URLs for which it returns false are not admitted
pub type UrlFilter = Arc<dyn Fn(&Url) -> bool + Send + Sync>;

/// Admission rules applied on every push
#[derive(Clone, Default)]
pub struct AdmissionRules {
    pub max_depth: Option<u32>,
    pub max_urls: Option<usize>,
    pub allowed_domains: DomainAllowList,
    pub url_filter: Option<UrlFilter>,
}

impl std::fmt::Debug for AdmissionRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionRules")
            .field("max_depth", &self.max_depth)
            .field("max_urls", &self.max_urls)
            .field("allowed_domains", &self.allowed_domains)
            .field("url_filter", &self.url_filter.is_some())
            .finish()
    }
}

/// Outcome of offering an entry to the frontier
///
/// Only `Admitted` entries are queued. `DomainNotAllowed` entries are
/// recorded as discovered and failed with [`DOMAIN_NOT_ALLOWED`]; every
/// other outcome is a silent drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Admitted,
    /// Key was admitted before
    Duplicate,
    /// Link points back at the page it was found on
    SelfLink,
    DepthExceeded,
    /// The run already admitted `max_urls` URLs
    CountExceeded,
    /// Host is outside the allowed domains; counts toward `max_urls`
    DomainNotAllowed,
    /// Rejected by the URL filter or the skipped-extension list
    Filtered,
}

/// How a leased entry ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Visited,
    Failed(String),
}

/// An entry leased to a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub entry: FrontierEntry,
    /// Retries already spent on this entry
    pub retries: u32,
}

/// Pending entry as stored in a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEntry {
    #[serde(flatten)]
    pub entry: FrontierEntry,
    #[serde(default)]
    pub retries: u32,
}

#[derive(Debug)]
enum Queue {
    Levels(BTreeMap<u32, VecDeque<PendingEntry>>),
    Stack(Vec<PendingEntry>),
}

impl Queue {
    fn new(strategy: TraversalStrategy) -> Self {
        match strategy {
            TraversalStrategy::Bfs => Self::Levels(BTreeMap::new()),
            TraversalStrategy::Dfs | TraversalStrategy::DfsPreorder => Self::Stack(Vec::new()),
        }
    }

    fn push_back(&mut self, pending: PendingEntry) {
        match self {
            Self::Levels(levels) => levels
                .entry(pending.entry.depth())
                .or_default()
                .push_back(pending),
            Self::Stack(stack) => stack.push(pending),
        }
    }

    /// Puts an entry back so it is the next one popped at its position
    fn push_front(&mut self, pending: PendingEntry) {
        match self {
            Self::Levels(levels) => levels
                .entry(pending.entry.depth())
                .or_default()
                .push_front(pending),
            Self::Stack(stack) => stack.push(pending),
        }
    }

    /// Pops the next entry; BFS only pops at or below `depth_floor`
    fn pop(&mut self, depth_floor: Option<u32>) -> Option<PendingEntry> {
        match self {
            Self::Levels(levels) => {
                let mut level = levels.first_entry()?;
                if depth_floor.is_some_and(|floor| *level.key() > floor) {
                    return None;
                }
                let pending = level.get_mut().pop_front();
                if level.get().is_empty() {
                    level.remove();
                }
                pending
            }
            Self::Stack(stack) => stack.pop(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Levels(levels) => levels.values().map(VecDeque::len).sum(),
            Self::Stack(stack) => stack.len(),
        }
    }

    /// Entries in pop order
    fn ordered(&self) -> Vec<PendingEntry> {
        match self {
            Self::Levels(levels) => levels.values().flatten().cloned().collect(),
            Self::Stack(stack) => stack.iter().rev().cloned().collect(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    queue: Queue,
    deferred: Vec<(Instant, PendingEntry)>,
    in_flight: HashMap<Url, PendingEntry>,
    closed: bool,
}

impl Inner {
    /// Moves deferred entries whose wake time has passed back into the queue
    fn promote_due(&mut self, now: Instant) {
        if self.deferred.is_empty() {
            return;
        }
        let mut due = Vec::new();
        self.deferred.retain(|(wake, pending)| {
            if *wake <= now {
                due.push((*wake, pending.clone()));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(wake, _)| *wake);
        for (_, pending) in due {
            self.queue.push_front(pending);
        }
    }

    /// Lowest depth still waiting outside the queue
    fn outstanding_floor(&self) -> Option<u32> {
        let in_flight = self.in_flight.values().map(|p| p.entry.depth());
        let deferred = self.deferred.iter().map(|(_, p)| p.entry.depth());
        in_flight.chain(deferred).min()
    }

    fn next_wake(&self) -> Option<Instant> {
        self.deferred.iter().map(|(wake, _)| *wake).min()
    }

    fn is_drained(&self) -> bool {
        self.queue.len() == 0 && self.deferred.is_empty() && self.in_flight.is_empty()
    }

    fn pending_entries(&self) -> Vec<PendingEntry> {
        let mut entries: Vec<PendingEntry> = self.in_flight.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.entry
                .depth()
                .cmp(&b.entry.depth())
                .then_with(|| a.entry.url().cmp(b.entry.url()))
        });
        let mut deferred: Vec<&(Instant, PendingEntry)> = self.deferred.iter().collect();
        deferred.sort_by_key(|(wake, _)| *wake);
        entries.extend(deferred.into_iter().map(|(_, p)| p.clone()));
        entries.extend(self.queue.ordered());
        entries
    }
}

/// Consistent copy of frontier, dedup and result state
#[derive(Debug, Clone)]
pub struct FrontierSnapshot {
    pub pending: Vec<PendingEntry>,
    pub dedup: Vec<DedupKey>,
    pub results: crate::output::ResultsSnapshot,
}

/// Live counts for progress reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrontierStats {
    pub queued: usize,
    pub deferred: usize,
    pub in_flight: usize,
    pub admitted: usize,
}

pub struct Frontier {
    strategy: TraversalStrategy,
    rules: AdmissionRules,
    dedup: DedupStore,
    results: Arc<ResultAggregator>,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Frontier {
    pub fn new(
        strategy: TraversalStrategy,
        rules: AdmissionRules,
        results: Arc<ResultAggregator>,
    ) -> Self {
        Self::with_dedup(strategy, rules, DedupStore::new(), results)
    }

    fn with_dedup(
        strategy: TraversalStrategy,
        rules: AdmissionRules,
        dedup: DedupStore,
        results: Arc<ResultAggregator>,
    ) -> Self {
        Self {
            strategy,
            rules,
            dedup,
            results,
            inner: Mutex::new(Inner {
                queue: Queue::new(strategy),
                deferred: Vec::new(),
                in_flight: HashMap::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Rebuilds a frontier from checkpointed state
    ///
    /// Pending entries go straight back into the queue without admission
    /// checks: their keys are already in `dedup`, and re-checking would drop
    /// them as duplicates.
    pub fn restore(
        strategy: TraversalStrategy,
        rules: AdmissionRules,
        pending: Vec<PendingEntry>,
        dedup: Vec<DedupKey>,
        results: Arc<ResultAggregator>,
    ) -> Self {
        let frontier = Self::with_dedup(strategy, rules, DedupStore::from_keys(dedup), results);
        {
            let mut inner = frontier.lock();
            // Snapshots list entries in pop order
            let ordered: Vec<PendingEntry> = match strategy {
                TraversalStrategy::Bfs => pending,
                _ => pending.into_iter().rev().collect(),
            };
            for pending in ordered {
                let key = pending.entry.key();
                frontier.dedup.try_admit(&key);
                frontier
                    .results
                    .record_discovered(key.as_str(), pending.entry.depth());
                inner.queue.push_back(pending);
            }
        }
        frontier
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn strategy(&self) -> TraversalStrategy {
        self.strategy
    }

    pub fn results(&self) -> &Arc<ResultAggregator> {
        &self.results
    }

    fn check(&self, entry: &FrontierEntry) -> Option<PushOutcome> {
        if entry.source() == crate::frontier::DiscoverySource::Link && entry.is_self_link() {
            return Some(PushOutcome::SelfLink);
        }
        if self
            .rules
            .max_depth
            .is_some_and(|max| entry.depth() > max)
        {
            return Some(PushOutcome::DepthExceeded);
        }
        let host = extract_host(entry.url()).unwrap_or_default();
        if !self.rules.allowed_domains.permits(&host) {
            return Some(PushOutcome::DomainNotAllowed);
        }
        if has_skipped_extension(entry.url()) {
            return Some(PushOutcome::Filtered);
        }
        if let Some(filter) = &self.rules.url_filter {
            if !filter(entry.url()) {
                return Some(PushOutcome::Filtered);
            }
        }
        None
    }

    /// Runs admission; callers hold the frontier lock
    ///
    /// A URL outside the allow-list still takes a dedup slot so it is
    /// recorded as failed once and stays within the count ceiling.
    fn admit(&self, entry: &FrontierEntry) -> PushOutcome {
        let rejected = self.check(entry);
        if let Some(outcome) = rejected.filter(|o| *o != PushOutcome::DomainNotAllowed) {
            return outcome;
        }
        let key = entry.key();
        if self.dedup.contains(&key) {
            return PushOutcome::Duplicate;
        }
        if self
            .rules
            .max_urls
            .is_some_and(|max| self.dedup.len() >= max)
        {
            return PushOutcome::CountExceeded;
        }
        if !self.dedup.try_admit(&key) {
            return PushOutcome::Duplicate;
        }
        self.results.record_discovered(key.as_str(), entry.depth());
        if let Some(outcome) = rejected {
            self.results
                .record_failed(key.as_str(), entry.depth(), DOMAIN_NOT_ALLOWED);
            return outcome;
        }
        PushOutcome::Admitted
    }

    /// Offers one entry; admitted entries are queued immediately
    ///
    /// # Returns
    ///
    /// The admission outcome; see [`PushOutcome`]
    pub fn push(&self, entry: FrontierEntry) -> PushOutcome {
        self.push_all(vec![entry])
            .pop()
            .unwrap_or(PushOutcome::Duplicate)
    }

    /// Offers a batch of entries discovered together (e.g. one page's links)
    ///
    /// Admission runs in the given order, so the first of two equal URLs
    /// wins. With [`TraversalStrategy::DfsPreorder`] the admitted batch is
    /// stacked so its first entry is popped first, matching a recursive walk.
    ///
    /// # Arguments
    ///
    /// * `entries` - Candidates in discovery order
    ///
    /// # Returns
    ///
    /// One [`PushOutcome`] per entry, in the same order
    pub fn push_all(&self, entries: Vec<FrontierEntry>) -> Vec<PushOutcome> {
        let mut outcomes = Vec::with_capacity(entries.len());
        let mut admitted = Vec::new();
        {
            let mut inner = self.lock();
            for entry in entries {
                let outcome = self.admit(&entry);
                if outcome == PushOutcome::Admitted {
                    admitted.push(PendingEntry { entry, retries: 0 });
                } else {
                    tracing::trace!("Dropped {} ({:?})", entry.url(), outcome);
                }
                outcomes.push(outcome);
            }

            if self.strategy == TraversalStrategy::DfsPreorder {
                admitted.reverse();
            }
            for pending in admitted {
                inner.queue.push_back(pending);
            }
        }
        self.notify.notify_waiters();
        outcomes
    }

    /// Waits for the next entry in strategy order
    ///
    /// Returns `None` once the frontier is closed, or when nothing is queued,
    /// deferred or in flight (the crawl is complete).
    ///
    /// # Returns
    ///
    /// * `Some(Lease)` - Work to process; it must end with `complete`,
    ///   `retry`, `defer` or `requeue`
    /// * `None` - No more work will be handed out
    pub async fn next(&self) -> Option<Lease> {
        loop {
            let notified = self.notify.notified();
            let wake_at = {
                let mut inner = self.lock();
                if inner.closed {
                    return None;
                }

                inner.promote_due(Instant::now());

                let floor = match self.strategy {
                    TraversalStrategy::Bfs => inner.outstanding_floor(),
                    _ => None,
                };
                if let Some(pending) = inner.queue.pop(floor) {
                    let lease = Lease {
                        entry: pending.entry.clone(),
                        retries: pending.retries,
                    };
                    inner.in_flight.insert(pending.entry.url().clone(), pending);
                    return Some(lease);
                }

                if inner.is_drained() {
                    drop(inner);
                    self.notify.notify_waiters();
                    return None;
                }
                inner.next_wake()
            };

            match wake_at {
                Some(at) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Finishes a lease and records its outcome
    ///
    /// # Arguments
    ///
    /// * `url` - URL of the leased entry
    /// * `outcome` - Visited, or failed with a reason
    ///
    /// # Returns
    ///
    /// * `true` - The outcome was recorded
    /// * `false` - The URL was not in flight (already recovered by the
    ///   health monitor, for instance); nothing is recorded
    pub fn complete(&self, url: &Url, outcome: Outcome) -> bool {
        let finished = {
            let mut inner = self.lock();
            match inner.in_flight.remove(url) {
                Some(pending) => {
                    let depth = pending.entry.depth();
                    match &outcome {
                        Outcome::Visited => self.results.record_visited(url.as_str(), depth),
                        Outcome::Failed(reason) => {
                            self.results.record_failed(url.as_str(), depth, reason)
                        }
                    }
                    true
                }
                None => false,
            }
        };
        if finished {
            self.notify.notify_waiters();
        }
        finished
    }

    /// Returns a lease to the deferred list after a retryable failure
    pub fn retry(&self, lease: &Lease, delay: Duration) -> bool {
        self.put_back(lease, Some(delay), lease.retries + 1)
    }

    /// Returns a lease to the deferred list without spending a retry
    pub fn defer(&self, lease: &Lease, delay: Duration) -> bool {
        self.put_back(lease, Some(delay), lease.retries)
    }

    /// Returns a lease to the front of the queue (cancelled work)
    pub fn requeue(&self, lease: &Lease) -> bool {
        self.put_back(lease, None, lease.retries)
    }

    fn put_back(&self, lease: &Lease, delay: Option<Duration>, retries: u32) -> bool {
        let restored = {
            let mut inner = self.lock();
            match inner.in_flight.remove(lease.entry.url()) {
                Some(mut pending) => {
                    pending.retries = retries;
                    match delay {
                        Some(delay) => inner.deferred.push((Instant::now() + delay, pending)),
                        None => inner.queue.push_front(pending),
                    }
                    true
                }
                None => false,
            }
        };
        if restored {
            self.notify.notify_waiters();
        }
        restored
    }

    /// Stops handing out work; in-flight leases can still be completed
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn stats(&self) -> FrontierStats {
        let inner = self.lock();
        FrontierStats {
            queued: inner.queue.len(),
            deferred: inner.deferred.len(),
            in_flight: inner.in_flight.len(),
            admitted: self.dedup.len(),
        }
    }

    /// Copies frontier, dedup and results under the frontier lock
    ///
    /// In-flight and deferred entries are included as pending work, so a
    /// resume retries anything that had not finished.
    pub fn snapshot(&self) -> FrontierSnapshot {
        let inner = self.lock();
        FrontierSnapshot {
            pending: inner.pending_entries(),
            dedup: self.dedup.snapshot(),
            results: self.results.snapshot(),
        }
    }
}

impl std::fmt::Debug for Frontier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frontier")
            .field("strategy", &self.strategy)
            .field("rules", &self.rules)
            .field("stats", &self.stats())
            .finish()
    }
}
