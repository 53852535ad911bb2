//! Domain State Registry
//!
//! Owns every [`DomainState`]. The map itself sits behind one short-held lock
//! used only to look up or create a domain's entry; each entry then has its
//! own lock so admission checks on different domains never contend.

use crate::state::clock::Clock;
use crate::state::domain_state::{
    Admission, AdmissionPolicy, CircuitState, DomainSnapshot, DomainState,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub struct DomainRegistry {
    policy: AdmissionPolicy,
    clock: Arc<dyn Clock>,
    domains: Mutex<HashMap<String, Arc<Mutex<DomainState>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding a domain lock leaves plain data behind; keep going
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl DomainRegistry {
    pub fn new(policy: AdmissionPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            domains: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn entry(&self, domain: &str) -> Arc<Mutex<DomainState>> {
        let mut domains = lock(&self.domains);
        domains
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(DomainState::new(domain, &self.policy))))
            .clone()
    }

    fn existing(&self, domain: &str) -> Option<Arc<Mutex<DomainState>>> {
        lock(&self.domains).get(domain).cloned()
    }

    /// Admission check before a fetch; see [`DomainState::try_admit`]
    ///
    /// Only the lock of `domain` is held while deciding.
    ///
    /// # Arguments
    ///
    /// * `domain` - Host plus any non-default port, as from
    ///   [`extract_domain`](crate::url::extract_domain)
    ///
    /// # Returns
    ///
    /// * `Admission::Granted` - A slot is reserved and must be settled with
    ///   `record_success`, `record_failure` or `release`
    /// * `Admission::Deferred` - Try again after `retry_after`
    pub fn try_acquire(&self, domain: &str) -> Admission {
        let entry = self.entry(domain);
        let mut state = lock(&entry);
        state.try_admit(self.clock.now(), &self.policy)
    }

    /// Records a response that shows the domain is healthy
    pub fn record_success(&self, domain: &str) {
        if let Some(entry) = self.existing(domain) {
            lock(&entry).record_success(&self.policy);
        }
    }

    /// Records a failure counted by the circuit breaker
    ///
    /// # Arguments
    ///
    /// * `domain` - Domain passed to the matching `try_acquire`
    /// * `reason` - Failure description, used in breaker log lines
    pub fn record_failure(&self, domain: &str, reason: &str) {
        if let Some(entry) = self.existing(domain) {
            lock(&entry).record_failure(self.clock.now(), &self.policy, reason);
        }
    }

    /// Returns an admitted slot without an outcome
    pub fn release(&self, domain: &str) {
        if let Some(entry) = self.existing(domain) {
            lock(&entry).release();
        }
    }

    /// Applies a robots.txt crawl-delay to a domain
    pub fn set_crawl_delay(&self, domain: &str, delay: Option<Duration>) {
        let entry = self.entry(domain);
        let mut state = lock(&entry);
        if state.crawl_delay != delay {
            tracing::debug!("Crawl-delay for {} set to {:?}", domain, delay);
            state.crawl_delay = delay;
        }
    }

    pub fn circuit_state(&self, domain: &str) -> CircuitState {
        self.existing(domain)
            .map(|entry| lock(&entry).circuit_state)
            .unwrap_or_default()
    }

    /// Copy of a domain's current state
    pub fn get(&self, domain: &str) -> Option<DomainState> {
        self.existing(domain).map(|entry| lock(&entry).clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.domains).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consistent per-domain copies for a checkpoint, sorted by domain
    pub fn snapshot(&self) -> Vec<DomainSnapshot> {
        let entries: Vec<Arc<Mutex<DomainState>>> =
            lock(&self.domains).values().cloned().collect();

        let mut snapshots: Vec<DomainSnapshot> = entries
            .iter()
            .map(|entry| lock(entry).snapshot(self.clock.as_ref()))
            .collect();
        snapshots.sort_by(|a, b| a.domain.cmp(&b.domain));
        snapshots
    }

    /// Replaces all domain states with the given snapshots
    pub fn restore(&self, snapshots: &[DomainSnapshot]) {
        let mut domains = lock(&self.domains);
        domains.clear();
        for snapshot in snapshots {
            let state = DomainState::from_snapshot(snapshot, self.clock.as_ref());
            domains.insert(snapshot.domain.clone(), Arc::new(Mutex::new(state)));
        }
        tracing::debug!("Restored state for {} domains", domains.len());
    }
}

impl std::fmt::Debug for DomainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainRegistry")
            .field("policy", &self.policy)
            .field("domains", &self.len())
            .finish()
    }
}
