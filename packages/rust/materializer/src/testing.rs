//! Scripted browser backend for tests.
//!
//! [`ScriptedLauncher`] hands out sessions that replay a fixed sequence of
//! item counts and record every call, so the scroll loop can be checked
//! without a real browser.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use lazylist_shared::{LazyListError, Result};

use crate::session::{BrowserSession, SessionLauncher, SessionProfile};

/// One recorded session call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Navigate(Url),
    Evaluate(String),
    Count,
    Wait(Duration),
    Content,
    Close,
}

/// How navigation should misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationFault {
    /// Return a navigation error immediately.
    Error,
    /// Never complete.
    Hang,
}

#[derive(Debug, Default)]
struct Log {
    calls: Vec<Call>,
    profiles: Vec<SessionProfile>,
}

/// Launcher whose sessions replay scripted item counts.
///
/// Cloning shares the call log, so a test can keep one clone for assertions.
#[derive(Debug, Clone)]
pub struct ScriptedLauncher {
    counts: Vec<usize>,
    html: String,
    navigation_fault: Option<NavigationFault>,
    close_fails: bool,
    close_hangs: bool,
    count_hangs: bool,
    launch_fails: bool,
    log: Arc<Mutex<Log>>,
}

impl ScriptedLauncher {
    /// Sessions report `counts` in order, then repeat the last one.
    pub fn new(counts: impl IntoIterator<Item = usize>) -> Self {
        Self {
            counts: counts.into_iter().collect(),
            html: "<html><body></body></html>".to_string(),
            navigation_fault: None,
            close_fails: false,
            close_hangs: false,
            count_hangs: false,
            launch_fails: false,
            log: Arc::new(Mutex::new(Log::default())),
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    pub fn with_navigation_fault(mut self, fault: NavigationFault) -> Self {
        self.navigation_fault = Some(fault);
        self
    }

    pub fn with_close_failure(mut self) -> Self {
        self.close_fails = true;
        self
    }

    /// `close` never completes.
    pub fn with_close_hang(mut self) -> Self {
        self.close_hangs = true;
        self
    }

    /// `count_matching` never completes.
    pub fn with_count_hang(mut self) -> Self {
        self.count_hangs = true;
        self
    }

    pub fn with_launch_failure(mut self) -> Self {
        self.launch_fails = true;
        self
    }

    fn log(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every call recorded across all sessions, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.log().calls.clone()
    }

    /// How many times `call` was recorded.
    pub fn count(&self, call: &Call) -> usize {
        self.log().calls.iter().filter(|c| *c == call).count()
    }

    /// How many times `script` was evaluated.
    pub fn scripts(&self, script: &str) -> usize {
        self.count(&Call::Evaluate(script.to_string()))
    }

    /// URLs passed to `navigate`.
    pub fn navigated(&self) -> Vec<Url> {
        self.log()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Navigate(url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    /// Durations passed to `wait_for`.
    pub fn waits(&self) -> Vec<Duration> {
        self.log()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Wait(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    /// Profile of the most recent launch.
    pub fn last_profile(&self) -> Option<SessionProfile> {
        self.log().profiles.last().cloned()
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    async fn launch(&self, profile: &SessionProfile) -> Result<Box<dyn BrowserSession>> {
        if self.launch_fails {
            return Err(LazyListError::session("scripted launch failure"));
        }
        self.log().profiles.push(profile.clone());

        Ok(Box::new(ScriptedSession {
            counts: self.counts.iter().copied().collect(),
            last: 0,
            html: self.html.clone(),
            navigation_fault: self.navigation_fault,
            close_fails: self.close_fails,
            close_hangs: self.close_hangs,
            count_hangs: self.count_hangs,
            log: Arc::clone(&self.log),
        }))
    }
}

struct ScriptedSession {
    counts: VecDeque<usize>,
    last: usize,
    html: String,
    navigation_fault: Option<NavigationFault>,
    close_fails: bool,
    close_hangs: bool,
    count_hangs: bool,
    log: Arc<Mutex<Log>>,
}

impl ScriptedSession {
    fn record(&self, call: Call) {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .calls
            .push(call);
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&mut self, url: &Url) -> Result<()> {
        self.record(Call::Navigate(url.clone()));
        match self.navigation_fault {
            None => Ok(()),
            Some(NavigationFault::Error) => Err(LazyListError::navigation(format!(
                "scripted navigation failure for {url}"
            ))),
            Some(NavigationFault::Hang) => std::future::pending::<Result<()>>().await,
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<()> {
        self.record(Call::Evaluate(script.to_string()));
        Ok(())
    }

    async fn count_matching(&mut self, _selector: &str) -> Result<usize> {
        self.record(Call::Count);
        if self.count_hangs {
            return std::future::pending::<Result<usize>>().await;
        }
        if let Some(next) = self.counts.pop_front() {
            self.last = next;
        }
        Ok(self.last)
    }

    async fn content(&mut self) -> Result<String> {
        self.record(Call::Content);
        Ok(self.html.clone())
    }

    async fn wait_for(&mut self, duration: Duration) {
        self.record(Call::Wait(duration));
    }

    async fn close(&mut self) -> Result<()> {
        self.record(Call::Close);
        if self.close_hangs {
            return std::future::pending::<Result<()>>().await;
        }
        if self.close_fails {
            return Err(LazyListError::session(
                "scripted teardown failure, process may be leaked",
            ));
        }
        Ok(())
    }
}
