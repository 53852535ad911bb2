//! State module for per-domain politeness and health
//!
//! # Components
//!
//! - `Clock`: monotonic + wall-clock time source (real or manual)
//! - `DomainState`: rate-limit clock, crawl-delay and circuit breaker for one domain
//! - `DomainRegistry`: the only owner of domain states, locked per domain
//! - `RetryPolicy`: exponential backoff with jitter for retryable failures

mod backoff;
mod clock;
mod domain_state;
mod registry;

pub use backoff::RetryPolicy;
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain_state::{
    Admission, AdmissionPolicy, CircuitState, DeferReason, DomainSnapshot, DomainState,
};
pub use registry::DomainRegistry;
