//! Markdown summary generation
//!
//! This module writes a human-readable markdown report of a crawl result,
//! including headline statistics and every failed URL with its reason.

use crate::output::{CrawlResult, CrawlSummary};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown report for a crawl result
///
/// # Arguments
///
/// * `result` - The finished crawl result
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(io::Error)` - Failed to create or write the file
pub fn write_markdown_summary(result: &CrawlResult, output_path: &Path) -> std::io::Result<()> {
    let markdown = format_markdown_summary(result);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl result as markdown
pub fn format_markdown_summary(result: &CrawlResult) -> String {
    let summary = CrawlSummary::from_result(result);
    let mut md = String::new();

    md.push_str("# Sumi-Sweep Crawl Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Start URL**: {}\n", summary.start_url));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n\n",
        summary.duration_seconds
    ));

    md.push_str("## Statistics\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Discovered | {} |\n", summary.discovered));
    md.push_str(&format!("| Visited | {} |\n", summary.visited));
    md.push_str(&format!("| Failed | {} |\n", summary.failed));
    md.push_str(&format!("| Not fetched | {} |\n", summary.unvisited()));
    md.push_str(&format!(
        "| Max depth reached | {} |\n",
        summary.max_depth_reached
    ));
    md.push_str(&format!(
        "| Success rate | {:.2}% |\n\n",
        summary.success_rate * 100.0
    ));

    if !result.failed_urls.is_empty() {
        md.push_str("## Failed URLs\n\n");
        md.push_str("| URL | Reason |\n");
        md.push_str("|-----|--------|\n");
        for (url, reason) in &result.failed_urls {
            md.push_str(&format!("| {} | {} |\n", url, escape_cell(reason)));
        }
        md.push('\n');
    }

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::{BTreeMap, BTreeSet};
    use tempfile::TempDir;

    fn create_test_result() -> CrawlResult {
        let now = Utc::now();
        let mut failed = BTreeMap::new();
        failed.insert(
            "https://a.test/admin/page".to_string(),
            "disallowed by robots.txt".to_string(),
        );
        failed.insert("https://a.test/odd".to_string(), "bad | pipe".to_string());

        CrawlResult {
            start_url: "https://a.test/".to_string(),
            discovered_urls: BTreeSet::new(),
            visited_urls: ["https://a.test/".to_string()].into_iter().collect(),
            failed_urls: failed,
            start_time: now,
            end_time: now,
            max_depth_reached: 0,
        }
    }

    #[test]
    fn test_format_markdown_summary() {
        let markdown = format_markdown_summary(&create_test_result());

        assert!(markdown.contains("# Sumi-Sweep Crawl Summary"));
        assert!(markdown.contains("| Visited | 1 |"));
        assert!(markdown.contains("## Failed URLs"));
        assert!(markdown.contains("| https://a.test/admin/page | disallowed by robots.txt |"));
        assert!(markdown.contains("bad \\| pipe"));
    }

    #[test]
    fn test_write_markdown_summary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.md");

        write_markdown_summary(&create_test_result(), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Sumi-Sweep Crawl Summary"));
    }
}
