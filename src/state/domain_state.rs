use crate::config::{CircuitBreakerConfig, Config};
use crate::state::clock::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Shortest wait handed back for a deferral that has no natural deadline
const MIN_DEFER: Duration = Duration::from_millis(100);

/// Circuit breaker states
///
/// | From     | Event                          | To       |
/// |----------|--------------------------------|----------|
/// | Closed   | failure streak hits threshold  | Open     |
/// | Open     | cooldown elapsed on admission  | HalfOpen |
/// | HalfOpen | trial succeeds                 | Closed   |
/// | HalfOpen | trial fails                    | Open (cooldown doubled, capped) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation
    #[default]
    Closed,
    /// Requests are deferred until the cooldown elapses
    Open,
    /// One trial request is allowed through
    HalfOpen,
}

/// Limits applied by the domain registry on every admission check
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    /// Minimum gap between request starts for one domain
    pub rate_limit: Duration,
    /// Concurrent in-flight fetches per domain
    pub max_in_flight: usize,
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Initial open-circuit cooldown
    pub cooldown: Duration,
    /// Ceiling for escalated cooldowns
    pub max_cooldown: Duration,
}

impl AdmissionPolicy {
    pub fn from_config(config: &Config) -> Self {
        let breaker: &CircuitBreakerConfig = &config.circuit_breaker;
        Self {
            rate_limit: config.politeness.rate_limit(),
            max_in_flight: config.politeness.max_per_domain.max(1),
            failure_threshold: breaker.failure_threshold.max(1),
            cooldown: breaker.cooldown(),
            max_cooldown: breaker.max_cooldown(),
        }
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Why a domain refused to start a request right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// Circuit is open and the cooldown has not elapsed
    CircuitOpen,
    /// Circuit is half-open and its single trial is still running
    TrialInFlight,
    /// The per-domain concurrency cap is reached
    Busy,
    /// The minimum gap since the previous request has not elapsed
    RateLimited,
}

impl std::fmt::Display for DeferReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::CircuitOpen => "circuit open",
            Self::TrialInFlight => "circuit trial in flight",
            Self::Busy => "domain busy",
            Self::RateLimited => "rate limited",
        };
        f.write_str(text)
    }
}

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The caller may start the request now; `trial` marks a half-open trial request
    Granted { trial: bool },
    /// The caller should put the entry back and retry after the given wait
    Deferred {
        retry_after: Duration,
        reason: DeferReason,
    },
}

/// Politeness and health state for a single domain
///
/// Instances are owned by [`crate::state::DomainRegistry`]; workers only see
/// clones returned for inspection.
#[derive(Debug, Clone)]
pub struct DomainState {
    pub domain: String,

    /// When the most recent request to this domain was admitted
    pub last_request_at: Option<Instant>,

    /// Crawl-delay advertised by robots.txt
    pub crawl_delay: Option<Duration>,

    pub consecutive_failures: u32,

    pub circuit_state: CircuitState,

    pub circuit_opened_at: Option<Instant>,

    /// Cooldown applied the next time the circuit is open
    pub cooldown: Duration,

    /// Requests admitted and not yet finished
    pub in_flight: usize,

    /// Whether the half-open trial has been handed out
    pub trial_in_flight: bool,

    pub total_requests: u64,
    pub total_failures: u64,
}

impl DomainState {
    /// Creates a fresh, closed-circuit state for a domain
    pub fn new(domain: impl Into<String>, policy: &AdmissionPolicy) -> Self {
        Self {
            domain: domain.into(),
            last_request_at: None,
            crawl_delay: None,
            consecutive_failures: 0,
            circuit_state: CircuitState::Closed,
            circuit_opened_at: None,
            cooldown: policy.cooldown,
            in_flight: 0,
            trial_in_flight: false,
            total_requests: 0,
            total_failures: 0,
        }
    }

    /// Minimum gap between two request starts: max(rate limit, crawl-delay)
    pub fn required_gap(&self, policy: &AdmissionPolicy) -> Duration {
        match self.crawl_delay {
            Some(delay) => delay.max(policy.rate_limit),
            None => policy.rate_limit,
        }
    }

    /// Decides whether a request may start now
    ///
    /// A grant reserves the slot immediately: `last_request_at` moves to `now`
    /// and the in-flight count is incremented, so concurrent callers see the
    /// reservation before the fetch begins. Every grant must be paired with
    /// exactly one of [`record_success`](Self::record_success),
    /// [`record_failure`](Self::record_failure) or [`release`](Self::release).
    pub fn try_admit(&mut self, now: Instant, policy: &AdmissionPolicy) -> Admission {
        match self.circuit_state {
            CircuitState::Closed => {}
            CircuitState::Open => {
                let opened_at = self.circuit_opened_at.unwrap_or(now);
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed < self.cooldown {
                    return Admission::Deferred {
                        retry_after: self.cooldown - elapsed,
                        reason: DeferReason::CircuitOpen,
                    };
                }
                self.circuit_state = CircuitState::HalfOpen;
                self.trial_in_flight = false;
                tracing::info!(
                    "Circuit half-open for {} after {:?} cooldown",
                    self.domain,
                    elapsed
                );
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    return Admission::Deferred {
                        retry_after: self.required_gap(policy).max(MIN_DEFER),
                        reason: DeferReason::TrialInFlight,
                    };
                }
            }
        }

        if self.in_flight >= policy.max_in_flight {
            return Admission::Deferred {
                retry_after: self.time_until_next_request(now, policy).max(MIN_DEFER),
                reason: DeferReason::Busy,
            };
        }

        let wait = self.time_until_next_request(now, policy);
        if !wait.is_zero() {
            return Admission::Deferred {
                retry_after: wait,
                reason: DeferReason::RateLimited,
            };
        }

        self.last_request_at = Some(now);
        self.in_flight += 1;
        self.total_requests += 1;

        let trial = self.circuit_state == CircuitState::HalfOpen;
        if trial {
            self.trial_in_flight = true;
        }
        Admission::Granted { trial }
    }

    /// Time left before the rate limit allows another request
    pub fn time_until_next_request(&self, now: Instant, policy: &AdmissionPolicy) -> Duration {
        match self.last_request_at {
            Some(last) => self
                .required_gap(policy)
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Records a completed request whose response shows the host is healthy
    pub fn record_success(&mut self, policy: &AdmissionPolicy) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.consecutive_failures = 0;

        if self.circuit_state == CircuitState::HalfOpen {
            self.circuit_state = CircuitState::Closed;
            self.circuit_opened_at = None;
            self.trial_in_flight = false;
            self.cooldown = policy.cooldown;
            tracing::info!("Circuit closed for {} after successful trial", self.domain);
        }
    }

    /// Records a failed request and drives the breaker toward open
    pub fn record_failure(&mut self, now: Instant, policy: &AdmissionPolicy, reason: &str) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.consecutive_failures += 1;
        self.total_failures += 1;

        match self.circuit_state {
            CircuitState::HalfOpen => {
                self.circuit_state = CircuitState::Open;
                self.circuit_opened_at = Some(now);
                self.trial_in_flight = false;
                self.cooldown = self.cooldown.saturating_mul(2).min(policy.max_cooldown);
                tracing::warn!(
                    "Circuit re-opened for {} after failed trial ({}), cooldown {:?}",
                    self.domain,
                    reason,
                    self.cooldown
                );
            }
            CircuitState::Closed if self.consecutive_failures >= policy.failure_threshold => {
                self.circuit_state = CircuitState::Open;
                self.circuit_opened_at = Some(now);
                self.cooldown = policy.cooldown;
                tracing::warn!(
                    "Circuit opened for {} after {} consecutive failures (last: {})",
                    self.domain,
                    self.consecutive_failures,
                    reason
                );
            }
            CircuitState::Closed => {
                tracing::debug!(
                    "Failure {}/{} for {}: {}",
                    self.consecutive_failures,
                    policy.failure_threshold,
                    self.domain,
                    reason
                );
            }
            // Late failure from a request admitted before the circuit opened
            CircuitState::Open => {}
        }
    }

    /// Returns an admitted slot without an outcome (cancelled or abandoned)
    ///
    /// A released half-open trial lets the next admission run a new trial.
    pub fn release(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.circuit_state == CircuitState::HalfOpen {
            self.trial_in_flight = false;
        }
    }

    /// Serializable view of this state
    pub fn snapshot(&self, clock: &dyn Clock) -> DomainSnapshot {
        DomainSnapshot {
            domain: self.domain.clone(),
            last_request_at: self.last_request_at.map(|i| clock.to_wall(i)),
            crawl_delay_secs: self.crawl_delay.map(|d| d.as_secs_f64()),
            consecutive_failures: self.consecutive_failures,
            circuit_state: self.circuit_state,
            circuit_opened_at: self.circuit_opened_at.map(|i| clock.to_wall(i)),
            cooldown_secs: self.cooldown.as_secs_f64(),
            total_requests: self.total_requests,
            total_failures: self.total_failures,
        }
    }

    /// Rebuilds a state from a snapshot
    ///
    /// In-flight bookkeeping is not persisted: requests running when the
    /// snapshot was taken are back in the frontier after a resume. A
    /// half-open circuit therefore restarts with its trial available.
    pub fn from_snapshot(snapshot: &DomainSnapshot, clock: &dyn Clock) -> Self {
        Self {
            domain: snapshot.domain.clone(),
            last_request_at: snapshot.last_request_at.map(|w| clock.from_wall(w)),
            crawl_delay: snapshot
                .crawl_delay_secs
                .filter(|s| s.is_finite() && *s >= 0.0)
                .map(Duration::from_secs_f64),
            consecutive_failures: snapshot.consecutive_failures,
            circuit_state: snapshot.circuit_state,
            circuit_opened_at: snapshot.circuit_opened_at.map(|w| clock.from_wall(w)),
            cooldown: if snapshot.cooldown_secs.is_finite() && snapshot.cooldown_secs >= 0.0 {
                Duration::from_secs_f64(snapshot.cooldown_secs)
            } else {
                Duration::ZERO
            },
            in_flight: 0,
            trial_in_flight: false,
            total_requests: snapshot.total_requests,
            total_failures: snapshot.total_failures,
        }
    }
}

/// Checkpoint form of [`DomainState`], with wall-clock timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSnapshot {
    pub domain: String,
    #[serde(default)]
    pub last_request_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub crawl_delay_secs: Option<f64>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub circuit_state: CircuitState,
    #[serde(default)]
    pub circuit_opened_at: Option<DateTime<Utc>>,
    pub cooldown_secs: f64,
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub total_failures: u64,
}
