//! Scroll-until-stable page loader.
//!
//! Opens a browser session, scrolls the listing until the number of rendered
//! cards stops changing (or the check budget runs out), and returns the final
//! document HTML. The session is closed on every exit path.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};
use url::Url;

use lazylist_shared::{LazyListError, Result, ScrollConfig};

use crate::session::{BrowserSession, SessionLauncher, SessionProfile};
use crate::stabilizer::{Outcome, Phase, Stabilizer};

/// Wait after the initial load so first-paint cards appear.
const SETTLE_DELAY: Duration = Duration::from_millis(800);

/// Wait after the final scroll-back nudge.
const NUDGE_DELAY: Duration = Duration::from_millis(600);

pub const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// Some lazy loaders only fill placeholders once scroll direction reverses.
pub const NUDGE_BACK: &str = "window.scrollTo(0, document.body.scrollHeight - 500)";

// ---------------------------------------------------------------------------
// Materialized
// ---------------------------------------------------------------------------

/// A fully (or best-effort) rendered listing page.
#[derive(Debug, Clone)]
pub struct Materialized {
    /// Page that was loaded.
    pub url: Url,
    /// Serialized document HTML after scrolling.
    pub html: String,
    /// Whether the item count converged or the budget ran out.
    pub outcome: Outcome,
    /// Item count after the final nudge.
    pub final_count: usize,
    /// Wall time from launch to capture.
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// Materializer
// ---------------------------------------------------------------------------

/// Drives one browser session per page load.
pub struct Materializer {
    config: ScrollConfig,
    launcher: Arc<dyn SessionLauncher>,
    profile: SessionProfile,
}

impl Materializer {
    /// Create a materializer; `config` is clamped before use.
    pub fn new(config: ScrollConfig, launcher: Arc<dyn SessionLauncher>) -> Self {
        let profile = SessionProfile::default().with_visible(config.visible);
        Self {
            config: config.clamped(),
            launcher,
            profile,
        }
    }

    /// Override the client identity / viewport. Window visibility still
    /// follows [`ScrollConfig::visible`].
    pub fn with_profile(mut self, profile: SessionProfile) -> Self {
        self.profile = profile.with_visible(self.config.visible);
        self
    }

    pub fn config(&self) -> &ScrollConfig {
        &self.config
    }

    /// Load `url`, scroll until stable, and return the rendered HTML.
    ///
    /// Exhausting `max_scrolls` is not an error; check
    /// [`Materialized::outcome`]. A teardown failure is reported as
    /// [`LazyListError::Session`] even when the load itself succeeded.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn materialize(&self, url: &Url) -> Result<Materialized> {
        let start = Instant::now();
        let mut session = self.launcher.launch(&self.profile).await?;

        let loaded = self.drive(session.as_mut(), url).await;
        let teardown = tokio::time::timeout(self.config.step_timeout(), session.close());
        let closed = match teardown.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.is_session() => Err(e),
            Ok(Err(e)) => Err(LazyListError::session(format!("browser teardown failed: {e}"))),
            Err(_) => Err(LazyListError::session(
                "browser teardown timed out, process may be leaked",
            )),
        };

        match (loaded, closed) {
            (Ok((html, outcome, final_count)), Ok(())) => {
                let page = Materialized {
                    url: url.clone(),
                    html,
                    outcome,
                    final_count,
                    duration: start.elapsed(),
                };
                info!(
                    converged = outcome.is_converged(),
                    checks = outcome.checks(),
                    final_count,
                    bytes = page.html.len(),
                    duration_ms = page.duration.as_millis(),
                    "page materialized"
                );
                Ok(page)
            }
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(error = %e, "load failed and session teardown failed too");
                Err(LazyListError::session(format!("{close_err} (after: {e})")))
            }
        }
    }

    /// Everything between launch and close.
    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        url: &Url,
    ) -> Result<(String, Outcome, usize)> {
        let config = &self.config;
        let step = config.step_timeout();

        info!(timeout_s = config.navigation_timeout_secs, "navigating");
        match tokio::time::timeout(config.navigation_timeout(), session.navigate(url)).await {
            Ok(loaded) => loaded?,
            Err(_) => {
                return Err(LazyListError::navigation(format!(
                    "page load exceeded {}s",
                    config.navigation_timeout_secs
                )));
            }
        }
        session.wait_for(SETTLE_DELAY).await;

        let mut detector = Stabilizer::new(config.max_scrolls, config.stable_checks);
        while detector.has_budget() {
            let count = bounded(step, "item count", session.count_matching(&config.item_selector))
                .await?;
            let phase = detector.observe(count);
            debug!(
                count,
                streak = detector.streak(),
                check = detector.checks(),
                "observed item count"
            );
            if phase == Phase::Converged {
                break;
            }

            bounded(step, "scroll", session.evaluate(SCROLL_TO_BOTTOM)).await?;
            session.wait_for(config.scroll_pause()).await;
            session.wait_for(config.network_idle()).await;
        }

        let outcome = detector.finish();
        match outcome {
            Outcome::Converged { checks, count } => info!(checks, count, "item count stable"),
            Outcome::Exhausted { checks, count } => warn!(
                checks,
                count,
                "scroll budget exhausted before item count stabilized, returning partial page"
            ),
        }

        bounded(step, "scroll nudge", session.evaluate(NUDGE_BACK)).await?;
        session.wait_for(NUDGE_DELAY).await;

        let final_count =
            bounded(step, "item count", session.count_matching(&config.item_selector)).await?;
        let html = bounded(step, "content capture", session.content()).await?;

        Ok((html, outcome, final_count))
    }
}

/// Apply a timeout to one browser call; expiry is a navigation failure.
async fn bounded<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| LazyListError::navigation(format!("{what} exceeded {}s", limit.as_secs())))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, NavigationFault, ScriptedLauncher};

    fn fast_config(max_scrolls: u32) -> ScrollConfig {
        ScrollConfig {
            max_scrolls,
            ..ScrollConfig::default()
        }
    }

    fn url() -> Url {
        Url::parse("https://example.test/list").unwrap()
    }

    #[tokio::test]
    async fn identical_counts_converge_and_capture_html() {
        let launcher = ScriptedLauncher::new([4, 4, 4]).with_html("<ul><li>1</li></ul>");
        let materializer = Materializer::new(fast_config(20), Arc::new(launcher.clone()));

        let page = materializer.materialize(&url()).await.unwrap();

        assert_eq!(page.outcome, Outcome::Converged { checks: 3, count: 4 });
        assert_eq!(page.final_count, 4);
        assert_eq!(page.html, "<ul><li>1</li></ul>");
        assert_eq!(page.url, url());

        // Scrolls happen only after non-converging checks.
        assert_eq!(launcher.scripts(SCROLL_TO_BOTTOM), 2);
        assert_eq!(launcher.scripts(NUDGE_BACK), 1);
        assert_eq!(launcher.count(&Call::Close), 1);
        assert_eq!(launcher.navigated(), vec![url()]);
    }

    #[tokio::test]
    async fn growing_page_exhausts_budget_but_still_succeeds() {
        let launcher = ScriptedLauncher::new([3, 5, 7, 9, 11]);
        let materializer = Materializer::new(fast_config(4), Arc::new(launcher.clone()));

        let page = materializer.materialize(&url()).await.unwrap();

        assert_eq!(page.outcome, Outcome::Exhausted { checks: 4, count: 9 });
        assert_eq!(page.final_count, 11);
        assert_eq!(launcher.scripts(SCROLL_TO_BOTTOM), 4);
        assert_eq!(launcher.count(&Call::Close), 1);
    }

    #[tokio::test]
    async fn single_scroll_budget_does_one_cycle_then_nudges() {
        let launcher = ScriptedLauncher::new([6]);
        let materializer = Materializer::new(fast_config(1), Arc::new(launcher.clone()));

        let page = materializer.materialize(&url()).await.unwrap();

        assert!(!page.outcome.is_converged());
        assert_eq!(page.outcome.checks(), 1);
        assert_eq!(launcher.scripts(SCROLL_TO_BOTTOM), 1);
        assert_eq!(launcher.scripts(NUDGE_BACK), 1);
    }

    #[tokio::test]
    async fn zero_max_scrolls_is_clamped_to_one() {
        let launcher = ScriptedLauncher::new([2, 2]);
        let materializer = Materializer::new(fast_config(0), Arc::new(launcher.clone()));
        assert_eq!(materializer.config().max_scrolls, 1);

        let page = materializer.materialize(&url()).await.unwrap();
        assert_eq!(page.outcome.checks(), 1);
    }

    #[tokio::test]
    async fn waits_follow_the_configured_pacing() {
        let launcher = ScriptedLauncher::new([1, 1, 1]);
        let config = ScrollConfig {
            scroll_pause_ms: 250,
            network_idle_ms: 400,
            ..fast_config(10)
        };
        let materializer = Materializer::new(config, Arc::new(launcher.clone()));

        materializer.materialize(&url()).await.unwrap();

        let ms = |n| Duration::from_millis(n);
        assert_eq!(
            launcher.waits(),
            vec![ms(800), ms(250), ms(400), ms(250), ms(400), ms(600)]
        );
    }

    #[tokio::test]
    async fn navigation_failure_still_releases_session() {
        let launcher = ScriptedLauncher::new([1]).with_navigation_fault(NavigationFault::Error);
        let materializer = Materializer::new(fast_config(5), Arc::new(launcher.clone()));

        let err = materializer.materialize(&url()).await.unwrap_err();

        assert!(matches!(err, LazyListError::Navigation(_)));
        assert_eq!(launcher.count(&Call::Close), 1);
        assert_eq!(launcher.count(&Call::Count), 0);
        assert_eq!(launcher.count(&Call::Content), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_timeout_is_a_navigation_error() {
        let launcher = ScriptedLauncher::new([1]).with_navigation_fault(NavigationFault::Hang);
        let config = ScrollConfig {
            navigation_timeout_secs: 120,
            ..fast_config(5)
        };
        let materializer = Materializer::new(config, Arc::new(launcher.clone()));

        let err = materializer.materialize(&url()).await.unwrap_err();

        assert!(err.to_string().contains("exceeded 120s"));
        assert!(matches!(err, LazyListError::Navigation(_)));
        assert_eq!(launcher.count(&Call::Close), 1);
    }

    #[tokio::test]
    async fn teardown_failure_is_a_session_error() {
        let launcher = ScriptedLauncher::new([5, 5, 5]).with_close_failure();
        let materializer = Materializer::new(fast_config(10), Arc::new(launcher.clone()));

        let err = materializer.materialize(&url()).await.unwrap_err();

        assert!(err.is_session());
        assert_eq!(launcher.count(&Call::Close), 1);
    }

    #[tokio::test]
    async fn teardown_failure_after_navigation_failure_mentions_both() {
        let launcher = ScriptedLauncher::new([1])
            .with_navigation_fault(NavigationFault::Error)
            .with_close_failure();
        let materializer = Materializer::new(fast_config(10), Arc::new(launcher.clone()));

        let err = materializer.materialize(&url()).await.unwrap_err();

        assert!(err.is_session());
        let msg = err.to_string();
        assert!(msg.contains("teardown"));
        assert!(msg.contains("scripted navigation failure"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_teardown_is_bounded() {
        let launcher = ScriptedLauncher::new([3, 3, 3]).with_close_hang();
        let materializer = Materializer::new(fast_config(10), Arc::new(launcher.clone()));

        let err = materializer.materialize(&url()).await.unwrap_err();

        assert!(err.is_session());
        assert!(err.to_string().contains("teardown timed out"));
        assert_eq!(launcher.count(&Call::Close), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_item_count_is_a_navigation_error_and_releases_session() {
        let launcher = ScriptedLauncher::new([3]).with_count_hang();
        let config = ScrollConfig {
            step_timeout_secs: 30,
            ..fast_config(10)
        };
        let materializer = Materializer::new(config, Arc::new(launcher.clone()));

        let err = materializer.materialize(&url()).await.unwrap_err();

        assert!(matches!(err, LazyListError::Navigation(_)));
        assert!(err.to_string().contains("item count exceeded 30s"));
        assert_eq!(launcher.count(&Call::Count), 1);
        assert_eq!(launcher.count(&Call::Content), 0);
        assert_eq!(launcher.count(&Call::Close), 1);
    }

    #[tokio::test]
    async fn launch_failure_is_a_session_error_without_close() {
        let launcher = ScriptedLauncher::new([1]).with_launch_failure();
        let materializer = Materializer::new(fast_config(10), Arc::new(launcher.clone()));

        let err = materializer.materialize(&url()).await.unwrap_err();

        assert!(err.is_session());
        assert_eq!(launcher.count(&Call::Close), 0);
    }

    #[tokio::test]
    async fn session_uses_desktop_profile() {
        let launcher = ScriptedLauncher::new([1, 1, 1]);
        let config = ScrollConfig {
            visible: true,
            ..fast_config(5)
        };
        let materializer = Materializer::new(config, Arc::new(launcher.clone()));

        materializer.materialize(&url()).await.unwrap();

        let profile = launcher.last_profile().expect("launched");
        assert!(profile.visible);
        assert_eq!(profile.viewport_width, 1366);
    }

    #[tokio::test]
    async fn custom_profile_keeps_configured_visibility() {
        let launcher = ScriptedLauncher::new([1, 1, 1]);
        let config = ScrollConfig {
            visible: true,
            ..fast_config(5)
        };
        let profile = SessionProfile {
            viewport_width: 1920,
            ..SessionProfile::default()
        };
        let materializer =
            Materializer::new(config, Arc::new(launcher.clone())).with_profile(profile);

        materializer.materialize(&url()).await.unwrap();

        let used = launcher.last_profile().expect("launched");
        assert!(used.visible);
        assert_eq!(used.viewport_width, 1920);
    }
}
