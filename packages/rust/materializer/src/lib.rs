//! Progressive page materialization for lazily-rendered listings.
//!
//! This crate provides:
//! - [`stabilizer`]: the debounced item-count convergence detector
//! - [`session`]: the browser-session seam ([`BrowserSession`], [`SessionLauncher`])
//! - [`chromium`]: a chromiumoxide-backed launcher
//! - [`engine`]: [`Materializer`], the scroll / wait / stabilize loop

pub mod chromium;
pub mod engine;
pub mod session;
pub mod stabilizer;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use chromium::{ChromiumLauncher, ChromiumSession};
pub use engine::{Materialized, Materializer};
pub use session::{BrowserSession, DEFAULT_USER_AGENT, SessionLauncher, SessionProfile};
pub use stabilizer::{Outcome, Phase, Stabilizer};
