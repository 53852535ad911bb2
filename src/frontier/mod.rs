//! Frontier module for pending crawl work
//!
//! # Components
//!
//! - `FrontierEntry`: one unit of work (normalized URL, depth, parent, source)
//! - `DedupKey`: normalized identity of a resource
//! - `DedupStore`: every key admitted during the run
//! - `Frontier`: strategy-ordered queue with admission rules, deferral and leases

mod dedup;
mod entry;
mod traversal;

pub use crate::config::TraversalStrategy;
pub use dedup::DedupStore;
pub use entry::{DedupKey, DiscoverySource, FrontierEntry};
pub use traversal::{
    AdmissionRules, Frontier, FrontierSnapshot, FrontierStats, Lease, Outcome, PendingEntry,
    PushOutcome, UrlFilter, DOMAIN_NOT_ALLOWED,
};
