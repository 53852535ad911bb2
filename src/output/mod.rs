//! Output module for crawl results and reports
//!
//! This module handles:
//! - Accumulating discovered, visited and failed URLs during a run
//! - Building the final `CrawlResult` and its `CrawlSummary`
//! - Writing markdown reports

mod aggregator;
mod markdown;
mod summary;

pub use aggregator::{CrawlResult, ResultAggregator, ResultsSnapshot};
pub use markdown::{format_markdown_summary, write_markdown_summary};
pub use summary::CrawlSummary;
