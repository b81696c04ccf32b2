//! Browser-session seam.
//!
//! The materializer only needs a handful of operations from a browser
//! backend. [`BrowserSession`] names them; [`SessionLauncher`] opens one
//! session per page load.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use lazylist_shared::Result;

/// Desktop Chrome on Windows; listing sites serve their full layout to it.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Client identity and surface a session is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProfile {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Show a browser window instead of running headless.
    pub visible: bool,
}

impl SessionProfile {
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }
}

impl Default for SessionProfile {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport_width: 1366,
            viewport_height: 900,
            visible: false,
        }
    }
}

/// One open browser page plus whatever process/context backs it.
#[async_trait]
pub trait BrowserSession: Send {
    /// Load `url` and wait for the document to be ready.
    ///
    /// Unbounded on its own; the caller applies the navigation timeout.
    async fn navigate(&mut self, url: &Url) -> Result<()>;

    /// Run a script in the page, discarding its result.
    async fn evaluate(&mut self, script: &str) -> Result<()>;

    /// Number of elements currently matching a CSS selector.
    async fn count_matching(&mut self, selector: &str) -> Result<usize>;

    /// Full serialized document HTML.
    async fn content(&mut self) -> Result<String>;

    /// Suspend for a fixed duration.
    async fn wait_for(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Release the page, the browser context, and the browser process.
    async fn close(&mut self) -> Result<()>;
}

/// Opens browser sessions.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, profile: &SessionProfile) -> Result<Box<dyn BrowserSession>>;
}

/// JavaScript for `document.querySelectorAll(selector).length`, with the
/// selector embedded as a JSON string literal.
pub fn count_script(selector: &str) -> String {
    let literal = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!("document.querySelectorAll({literal}).length")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_script_escapes_selector() {
        assert_eq!(
            count_script("li.ui-search-layout__item"),
            r#"document.querySelectorAll("li.ui-search-layout__item").length"#
        );
        assert_eq!(
            count_script(r#"div[data-kind="card"]"#),
            r#"document.querySelectorAll("div[data-kind=\"card\"]").length"#
        );
    }

    #[test]
    fn default_profile_is_desktop_chrome() {
        let profile = SessionProfile::default().with_visible(true);
        assert!(profile.user_agent.contains("Chrome/120"));
        assert_eq!((profile.viewport_width, profile.viewport_height), (1366, 900));
        assert!(profile.visible);
    }
}
