//! End-to-end `search` pipeline: query → listing URL → materialize → extract.

use std::time::{Duration, Instant};

use tracing::{info, instrument};
use url::Url;

use lazylist_extractor::{ExtractionEngine, extract_listing};
use lazylist_materializer::{Materializer, Outcome};
use lazylist_shared::{Item, LazyListError, MAX_SCROLLS_LIMIT, Result};

/// Configuration for [`run_search`].
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Free-text search terms.
    pub query: String,
    /// Listing root the query slug is appended to.
    pub listing_base: String,
    /// Keep at most this many items, clamped to `[1, 200]`. `None` keeps all.
    pub take: Option<u32>,
}

/// Result of one search run.
#[derive(Debug)]
pub struct SearchReport {
    /// Listing page that was loaded.
    pub url: Url,
    /// Extracted items, in engine output order (not necessarily page order).
    pub items: Vec<Item>,
    /// How the scroll loop ended.
    pub outcome: Outcome,
    /// Rendered card count when the page was captured.
    pub final_count: usize,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the pipeline completes.
    fn done(&self, report: &SearchReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _report: &SearchReport) {}
}

/// Build the listing URL for `query`.
///
/// Terms are split on whitespace and joined with `-`, then appended to
/// `base` as one path segment.
pub fn search_url(base: &str, query: &str) -> Result<Url> {
    let slug = query.split_whitespace().collect::<Vec<_>>().join("-");
    if slug.is_empty() {
        return Err(LazyListError::validation("search query must not be empty"));
    }

    let mut url = Url::parse(base)
        .map_err(|e| LazyListError::config(format!("invalid listing base URL '{base}': {e}")))?;
    url.path_segments_mut()
        .map_err(|_| LazyListError::config(format!("listing base URL '{base}' cannot take a path")))?
        .pop_if_empty()
        .push(&slug);

    Ok(url)
}

/// Run the full `search` pipeline.
///
/// 1. Build the listing URL
/// 2. Materialize the page (scroll until stable)
/// 3. Extract items with the engine
/// 4. Trim to `take`
///
/// A materialization failure ends the run before the engine is called.
#[instrument(skip_all, fields(query = %config.query))]
pub async fn run_search(
    config: &SearchConfig,
    materializer: &Materializer,
    engine: &dyn ExtractionEngine,
    progress: &dyn ProgressReporter,
) -> Result<SearchReport> {
    let start = Instant::now();
    let url = search_url(&config.listing_base, &config.query)?;

    info!(%url, "starting search pipeline");

    // --- Phase 1: Materialize ---
    progress.phase("Loading listing");
    let page = materializer.materialize(&url).await?;

    // --- Phase 2: Extract ---
    progress.phase("Extracting items");
    let mut result = extract_listing(engine, &page.html).await?;

    // --- Phase 3: Trim ---
    if let Some(take) = config.take {
        result.truncate(take.clamp(1, MAX_SCROLLS_LIMIT) as usize);
    }

    let report = SearchReport {
        url: page.url,
        items: result.items,
        outcome: page.outcome,
        final_count: page.final_count,
        elapsed: start.elapsed(),
    };

    progress.done(&report);

    info!(
        items = report.items.len(),
        converged = report.outcome.is_converged(),
        final_count = report.final_count,
        elapsed_ms = report.elapsed.as_millis(),
        "search pipeline complete"
    );

    Ok(report)
}
