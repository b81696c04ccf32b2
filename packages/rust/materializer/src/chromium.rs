//! Chromium backend for [`BrowserSession`] via the DevTools protocol.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use lazylist_shared::{LazyListError, Result};

use crate::session::{BrowserSession, SessionLauncher, SessionProfile, count_script};

/// Interval between `document.readyState` polls after navigation starts.
const READY_POLL: Duration = Duration::from_millis(100);

/// True once the navigated document has parsed (DOMContentLoaded fired).
const DOM_READY: &str =
    "document.readyState !== 'loading' && window.location.href !== 'about:blank'";

/// Launches a fresh local Chromium process per session.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    /// Explicit browser binary; `None` lets chromiumoxide locate one.
    executable: Option<std::path::PathBuf>,
}

impl ChromiumLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific Chrome/Chromium binary.
    pub fn with_executable(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    fn browser_config(&self, profile: &SessionProfile) -> Result<BrowserConfig> {
        let viewport = Viewport {
            width: profile.viewport_width,
            height: profile.viewport_height,
            ..Viewport::default()
        };

        let mut builder = BrowserConfig::builder()
            .window_size(profile.viewport_width, profile.viewport_height)
            .viewport(viewport)
            .arg(format!("--user-agent={}", profile.user_agent));

        if profile.visible {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }

        builder
            .build()
            .map_err(|e| LazyListError::session(format!("invalid browser config: {e}")))
    }
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn launch(&self, profile: &SessionProfile) -> Result<Box<dyn BrowserSession>> {
        let config = self.browser_config(profile)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| LazyListError::session(format!("failed to launch browser: {e}")))?;

        // The handler stream must be polled for any CDP call to make progress.
        let handler_task = tokio::spawn(async move {
            drain_events(&mut handler).await;
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    warn!(error = %close_err, "failed to close browser after page creation error");
                }
                handler_task.abort();
                return Err(LazyListError::session(format!("failed to open page: {e}")));
            }
        };

        info!(visible = profile.visible, "browser session opened");

        Ok(Box::new(ChromiumSession {
            browser,
            page: Some(page),
            handler_task: Some(handler_task),
        }))
    }
}

/// Poll a CDP event stream until it ends, returning how many errors it
/// yielded. Individual errors (e.g. unknown CDP events) are not fatal.
async fn drain_events<S, E>(events: &mut S) -> usize
where
    S: futures::Stream<Item = std::result::Result<(), E>> + Unpin,
    E: std::fmt::Display,
{
    let mut errors = 0;
    while let Some(event) = events.next().await {
        if let Err(e) = event {
            errors += 1;
            debug!(error = %e, "browser handler error");
        }
    }
    debug!(errors, "browser handler stream ended");
    errors
}

/// A Chromium process with one page.
pub struct ChromiumSession {
    browser: Browser,
    page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| LazyListError::session("page already closed"))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    /// Start navigation and return once the DOM is parsed, without waiting
    /// for the load event (images, third-party scripts).
    async fn navigate(&mut self, url: &Url) -> Result<()> {
        let page = self.page()?;
        let started = page
            .execute(NavigateParams::new(url.as_str()))
            .await
            .map_err(|e| LazyListError::navigation(format!("failed to load {url}: {e}")))?;
        if let Some(reason) = &started.result.error_text {
            return Err(LazyListError::navigation(format!(
                "failed to load {url}: {reason}"
            )));
        }

        loop {
            match page.evaluate(DOM_READY).await.map(|r| r.into_value::<bool>()) {
                Ok(Ok(true)) => return Ok(()),
                Ok(_) => {}
                // The old execution context is torn down mid-navigation.
                Err(e) => debug!(error = %e, "readyState poll failed, retrying"),
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<()> {
        self.page()?
            .evaluate(script)
            .await
            .map_err(|e| LazyListError::navigation(format!("script failed: {e}")))?;
        Ok(())
    }

    async fn count_matching(&mut self, selector: &str) -> Result<usize> {
        let value: serde_json::Value = self
            .page()?
            .evaluate(count_script(selector))
            .await
            .map_err(|e| LazyListError::navigation(format!("item count failed: {e}")))?
            .into_value()
            .map_err(|e| LazyListError::navigation(format!("item count not a number: {e}")))?;

        value
            .as_u64()
            .or_else(|| value.as_f64().map(|n| n as u64))
            .map(|n| n as usize)
            .ok_or_else(|| LazyListError::navigation(format!("item count not a number: {value}")))
    }

    async fn content(&mut self) -> Result<String> {
        self.page()?
            .content()
            .await
            .map_err(|e| LazyListError::navigation(format!("failed to capture content: {e}")))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!(error = %e, "page close failed, closing browser anyway");
            }
        }

        let closed = self.browser.close().await;
        let reaped = match &closed {
            // Reap the child process so it does not linger as a zombie.
            Ok(_) => self.browser.wait().await.map(|_| ()),
            // Chrome did not take the close command; it would never exit on its own.
            Err(_) => self.browser.kill().await.unwrap_or(Ok(())),
        };

        if let Some(task) = self.handler_task.take() {
            task.abort();
        }

        closed.map_err(|e| {
            LazyListError::session(format!(
                "browser teardown failed, process may be leaked: {e}"
            ))
        })?;
        reaped.map_err(|e| {
            LazyListError::session(format!("browser process did not exit cleanly: {e}"))
        })?;

        info!("browser session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn handler_errors_do_not_stop_the_event_loop() {
        let mut events = stream::iter(vec![
            Ok(()),
            Err("unknown CDP event"),
            Ok(()),
            Err("bad message"),
            Ok(()),
        ]);

        let errors = drain_events(&mut events).await;

        assert_eq!(errors, 2);
        assert!(events.next().await.is_none());
    }

    #[test]
    fn readiness_waits_for_parsed_dom_not_load_event() {
        assert!(DOM_READY.contains("document.readyState !== 'loading'"));
        assert!(!DOM_READY.contains("complete"));
        assert!(DOM_READY.contains("about:blank"));
    }
}
