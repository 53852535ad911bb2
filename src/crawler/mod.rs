//! Crawler module for web page fetching and processing
//!
//! This module contains the crawl engine proper:
//! - The fetch collaborator (`Fetcher`, default `HttpFetcher`)
//! - The extraction collaborator (`LinkExtractor`, default `HtmlLinkExtractor`)
//! - Workers that move leases through admission, fetch and link extraction
//! - The scheduler supervising the worker pool
//! - The coordinator wiring one crawl or resume together

mod checkpointer;
mod coordinator;
mod fetcher;
mod parser;
mod scheduler;
mod shutdown;
mod worker;

#[cfg(test)]
pub mod testing;

pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use fetcher::{
    build_http_client, FetchError, FetchErrorKind, FetchResponse, Fetcher, HttpFetcher,
    MAX_REDIRECTS,
};
pub use parser::{
    ExtractedLink, ExtractionRule, ExtractionRules, HtmlLinkExtractor, LinkExtractor,
    LinkMetadata,
};
pub use scheduler::{WORKER_PANICKED, WORKER_STALLED};
pub use shutdown::{ShutdownHandle, StopSignal};
pub use worker::ROBOTS_DISALLOWED;
