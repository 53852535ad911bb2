//! Crawl summary for CLI and report output

use crate::output::CrawlResult;
use chrono::{DateTime, Utc};
use std::fmt;

/// Headline numbers of a finished (or interrupted) crawl
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlSummary {
    pub start_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub discovered: usize,
    pub visited: usize,
    pub failed: usize,
    pub duration_seconds: f64,
    pub success_rate: f64,
    pub max_depth_reached: u32,
}

impl CrawlSummary {
    /// Builds a summary from a crawl result
    pub fn from_result(result: &CrawlResult) -> Self {
        Self {
            start_url: result.start_url.clone(),
            started_at: result.start_time,
            finished_at: result.end_time,
            discovered: result.discovered_urls.len(),
            visited: result.visited_urls.len(),
            failed: result.failed_urls.len(),
            duration_seconds: result.duration().as_secs_f64(),
            success_rate: result.success_rate(),
            max_depth_reached: result.max_depth_reached,
        }
    }

    /// URLs admitted but never fetched (ceiling reached or run aborted)
    pub fn unvisited(&self) -> usize {
        self.discovered
            .saturating_sub(self.visited)
            .saturating_sub(self.failed)
    }
}

impl From<&CrawlResult> for CrawlSummary {
    fn from(result: &CrawlResult) -> Self {
        Self::from_result(result)
    }
}

impl fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Crawl of {}", self.start_url)?;
        writeln!(f, "  Discovered:        {}", self.discovered)?;
        writeln!(f, "  Visited:           {}", self.visited)?;
        writeln!(f, "  Failed:            {}", self.failed)?;
        if self.unvisited() > 0 {
            writeln!(f, "  Not fetched:       {}", self.unvisited())?;
        }
        writeln!(f, "  Max depth reached: {}", self.max_depth_reached)?;
        writeln!(f, "  Duration:          {:.1}s", self.duration_seconds)?;
        write!(f, "  Success rate:      {:.1}%", self.success_rate * 100.0)
    }
}
