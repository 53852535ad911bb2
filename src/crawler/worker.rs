//! Fetch worker
//!
//! One worker handles one lease at a time:
//!
//! 1. robots.txt check (disallowed URLs are recorded as failed)
//! 2. domain admission (rate limit, per-domain cap, circuit breaker);
//!    a refusal defers the entry with a wake time instead of sleeping
//! 3. fetch under a timeout
//! 4. on success, extract links and push them to the frontier
//! 5. on failure, retry with backoff or record the failure
//!
//! Both network steps (robots.txt and the page) race the abort signal and
//! are visible to the health monitor. A cancelled lease is requeued.

use crate::crawler::shutdown::{stopped, StopSignal};
use crate::crawler::{FetchError, FetchResponse, Fetcher, LinkExtractor};
use crate::frontier::{Frontier, FrontierEntry, Lease, Outcome, PushOutcome};
use crate::robots::RobotsCache;
use crate::state::{Admission, DomainRegistry, RetryPolicy};
use crate::url::extract_domain;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Failure reason for URLs excluded by robots.txt
pub const ROBOTS_DISALLOWED: &str = "disallowed by robots.txt";

/// Services shared by every worker of one crawl
pub(crate) struct WorkerContext {
    pub frontier: Arc<Frontier>,
    pub registry: Arc<DomainRegistry>,
    pub robots: Arc<RobotsCache>,
    pub fetcher: Arc<dyn Fetcher>,
    pub extractor: Arc<dyn LinkExtractor>,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub respect_robots: bool,
    /// robots.txt product token
    pub robots_agent: String,
    /// In-flight fetches are cancelled once this reaches `Abort`
    pub stop: watch::Receiver<StopSignal>,
}

/// A fetch in progress, visible to the health monitor
#[derive(Debug, Clone)]
pub(crate) struct ActiveFetch {
    pub lease: Lease,
    pub domain: String,
    pub started_at: Instant,
    /// Whether a per-domain slot was acquired and must be released
    pub holds_slot: bool,
}

impl ActiveFetch {
    fn new(lease: &Lease, domain: &str, holds_slot: bool) -> Self {
        Self {
            lease: lease.clone(),
            domain: domain.to_string(),
            started_at: Instant::now(),
            holds_slot,
        }
    }
}

/// Heartbeat published by a worker
#[derive(Debug)]
pub(crate) struct WorkerStatus {
    pub last_activity: Instant,
    pub current: Option<ActiveFetch>,
}

impl WorkerStatus {
    pub fn new() -> Self {
        Self {
            last_activity: Instant::now(),
            current: None,
        }
    }
}

pub(crate) type SharedStatus = Arc<Mutex<WorkerStatus>>;

fn update(status: &SharedStatus, current: Option<ActiveFetch>) {
    let mut status = status.lock().unwrap_or_else(|e| e.into_inner());
    status.last_activity = Instant::now();
    status.current = current;
}

/// Worker loop; returns when the frontier is drained or closed
pub(crate) async fn run_worker(id: usize, ctx: Arc<WorkerContext>, status: SharedStatus) {
    tracing::trace!("Worker {} started", id);
    while let Some(lease) = ctx.frontier.next().await {
        if *ctx.stop.borrow() == StopSignal::Abort {
            ctx.frontier.requeue(&lease);
            break;
        }
        process(&ctx, lease, &status).await;
        update(&status, None);
    }
    tracing::trace!("Worker {} finished", id);
}

async fn process(ctx: &WorkerContext, lease: Lease, status: &SharedStatus) {
    let url = lease.entry.url().clone();
    let Some(domain) = extract_domain(&url) else {
        ctx.frontier
            .complete(&url, Outcome::Failed("URL has no domain".to_string()));
        return;
    };

    if ctx.respect_robots {
        update(status, Some(ActiveFetch::new(&lease, &domain, false)));
        let permitted = tokio::select! {
            permitted = ctx.robots.permits(&url, &ctx.robots_agent) => permitted,
            _ = stopped(ctx.stop.clone(), StopSignal::Abort) => {
                tracing::debug!("robots.txt lookup for {} cancelled", url);
                ctx.frontier.requeue(&lease);
                return;
            }
        };
        if !permitted {
            tracing::debug!("{} {}", url, ROBOTS_DISALLOWED);
            ctx.frontier
                .complete(&url, Outcome::Failed(ROBOTS_DISALLOWED.to_string()));
            return;
        }
        ctx.registry
            .set_crawl_delay(&domain, ctx.robots.crawl_delay(&domain, &ctx.robots_agent));
    }

    match ctx.registry.try_acquire(&domain) {
        Admission::Granted { trial } => {
            if trial {
                tracing::info!("Sending half-open trial request to {}", domain);
            }
        }
        Admission::Deferred {
            retry_after,
            reason,
        } => {
            tracing::trace!("Deferring {} for {:?} ({})", url, retry_after, reason);
            ctx.frontier.defer(&lease, retry_after);
            return;
        }
    }

    update(status, Some(ActiveFetch::new(&lease, &domain, true)));

    let fetch = tokio::time::timeout(ctx.timeout, ctx.fetcher.fetch(&url, ctx.timeout));
    let result = tokio::select! {
        result = fetch => result.unwrap_or_else(|_| Err(FetchError::timeout(ctx.timeout))),
        _ = stopped(ctx.stop.clone(), StopSignal::Abort) => {
            tracing::debug!("Fetch of {} cancelled", url);
            ctx.registry.release(&domain);
            ctx.frontier.requeue(&lease);
            return;
        }
    };

    match result {
        Ok(response) => handle_response(ctx, &lease, &domain, response),
        Err(error) => handle_error(ctx, &lease, &domain, error),
    }
}

fn handle_response(ctx: &WorkerContext, lease: &Lease, domain: &str, response: FetchResponse) {
    ctx.registry.record_success(domain);

    if response.is_html() {
        let entries: Vec<FrontierEntry> = ctx
            .extractor
            .extract(&response.body, &response.final_url)
            .into_iter()
            .filter_map(|link| FrontierEntry::link(link.url, &lease.entry).ok())
            .collect();
        let found = entries.len();
        let admitted = ctx
            .frontier
            .push_all(entries)
            .into_iter()
            .filter(|outcome| *outcome == PushOutcome::Admitted)
            .count();
        tracing::debug!(
            "Fetched {} ({} in {:?}): {} links, {} new",
            lease.entry.url(),
            response.status,
            response.elapsed,
            found,
            admitted
        );
    }

    ctx.frontier.complete(lease.entry.url(), Outcome::Visited);
}

fn handle_error(ctx: &WorkerContext, lease: &Lease, domain: &str, error: FetchError) {
    let url = lease.entry.url();
    let reason = error.reason();

    if !error.kind.counts_against_domain() {
        ctx.registry.record_success(domain);
        tracing::debug!("{} failed: {}", url, reason);
        ctx.frontier.complete(url, Outcome::Failed(reason));
        return;
    }

    ctx.registry.record_failure(domain, &reason);

    if error.kind.is_retryable() && ctx.retry.should_retry(lease.retries) {
        let delay = ctx.retry.delay_for(lease.retries);
        tracing::debug!(
            "Retrying {} in {:?} (attempt {}/{}): {}",
            url,
            delay,
            lease.retries + 1,
            ctx.retry.max_retries,
            reason
        );
        ctx.frontier.retry(lease, delay);
    } else {
        tracing::debug!("Giving up on {}: {}", url, reason);
        ctx.frontier.complete(url, Outcome::Failed(reason));
    }
}
