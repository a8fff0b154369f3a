//! Browser-automation seam: the traits the extraction engine drives, plus the backends.
//!
//! Everything above this module talks to a page only through [`BrowserSession`].
//! `chrome` drives a real Chromium over CDP; `snapshot` serves saved HTML and is
//! what the replay command and the tests run against.

pub mod chrome;
pub mod error;
pub mod snapshot;

pub use chrome::{ChromeLauncher, ChromeSession};
pub use error::{DriverError, DriverResult};
pub use snapshot::{SnapshotFactory, SnapshotSession};

use crate::config::ParserConfig;
use async_trait::async_trait;
use std::path::Path;
use std::time::{Duration, Instant};

/// Poll interval for [`BrowserSession::wait_for`].
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One exclusive browser session (one tab) for one product pipeline.
///
/// Element handles are backend specific and only valid for the session that
/// produced them.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    type Element: Send + Sync;

    /// Loads `url` in the session's tab.
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// Returns the URL currently displayed.
    async fn current_url(&self) -> DriverResult<String>;

    /// Queries the whole document.
    async fn find_all(&self, selector: &str) -> DriverResult<Vec<Self::Element>>;

    /// Queries the descendants of `root`.
    async fn find_within(
        &self,
        root: &Self::Element,
        selector: &str,
    ) -> DriverResult<Vec<Self::Element>>;

    /// Visible text of an element.
    async fn text(&self, element: &Self::Element) -> DriverResult<String>;

    async fn attribute(&self, element: &Self::Element, name: &str) -> DriverResult<Option<String>>;

    async fn outer_html(&self, element: &Self::Element) -> DriverResult<String>;

    /// Runs a script in page context and returns its JSON-converted value.
    async fn execute_script(&self, script: &str) -> DriverResult<serde_json::Value>;

    async fn scroll_into_view(&self, element: &Self::Element) -> DriverResult<()>;

    /// Real (input-dispatched) click.
    async fn click(&self, element: &Self::Element) -> DriverResult<()>;

    /// Script-dispatched click, for elements covered by overlays.
    async fn force_click(&self, element: &Self::Element) -> DriverResult<()>;

    /// Waits until `selector` matches at least one element or `timeout` elapses.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> DriverResult<()> {
        let started = Instant::now();
        loop {
            match self.find_all(selector).await {
                Ok(found) if !found.is_empty() => return Ok(()),
                Ok(_) => {}
                Err(e) if e.is_dom_miss() => {}
                Err(e) => return Err(e),
            }
            if started.elapsed() >= timeout {
                return Err(DriverError::timeout(selector, timeout));
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Writes a full-page PNG screenshot to `path`.
    async fn screenshot(&self, path: &Path) -> DriverResult<()>;

    /// Serialized markup of the current document.
    async fn page_source(&self) -> DriverResult<String>;

    /// Tears the session down. Called exactly once per session.
    async fn close(&mut self) -> DriverResult<()>;
}

/// Creates sessions; one call per product pipeline.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: BrowserSession + 'static;

    async fn open(&self, config: &ParserConfig) -> DriverResult<Self::Session>;
}
