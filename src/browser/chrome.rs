//! Chromium backend over the DevTools protocol.

use super::{BrowserSession, DriverError, DriverResult, SessionFactory};
use crate::config::ParserConfig;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Element, Handler, Page};
use futures::StreamExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Hides the automation flag before any page script runs.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
"#;

const FORCE_CLICK_FN: &str = "function() { this.click(); }";

/// Launches one Chromium process per session.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    executable: Option<std::path::PathBuf>,
}

impl ChromeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a specific browser binary instead of auto-detection.
    pub fn with_executable(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    fn browser_config(&self, config: &ParserConfig) -> DriverResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .window_size(config.window_width, config.window_height)
            .request_timeout(config.page_load_timeout())
            .arg(format!("--user-agent={}", config.user_agent))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .no_sandbox();

        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(DriverError::Launch)
    }
}

#[async_trait]
impl SessionFactory for ChromeLauncher {
    type Session = ChromeSession;

    async fn open(&self, config: &ParserConfig) -> DriverResult<ChromeSession> {
        let browser_config = self.browser_config(config)?;
        let (browser, handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, Arc::clone(&closed));

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(DriverError::Launch(format!("failed to open tab: {}", e)));
            }
        };

        if let Err(e) = page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT)).await {
            warn!("Failed to inject stealth script: {}", e);
        }

        debug!(
            "Browser launched ({}, {}x{})",
            if config.headless { "headless" } else { "headed" },
            config.window_width,
            config.window_height
        );

        Ok(ChromeSession {
            browser,
            page,
            handler_task,
            closed,
            request_timeout: config.page_load_timeout(),
        })
    }
}

fn spawn_handler_task(mut handler: Handler, closed: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("CDP handler event error: {}", e);
            }
        }
        closed.store(true, Ordering::SeqCst);
    })
}

/// One Chromium process with a single working tab.
///
/// If the session is dropped without `close`, `Browser`'s own drop kills the
/// child process.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    closed: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl ChromeSession {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Maps a protocol error, reporting a dead connection as a crash.
    fn driver_error(&self, error: CdpError) -> DriverError {
        if self.is_closed() {
            return DriverError::Crashed(error.to_string());
        }
        match error {
            CdpError::Timeout => DriverError::timeout("browser response", self.request_timeout),
            CdpError::NotFound => DriverError::Detached,
            CdpError::JavascriptException(details) => DriverError::Script(details.text.clone()),
            other => DriverError::Script(other.to_string()),
        }
    }

    fn map_query_err(&self, selector: &str, error: CdpError) -> DriverError {
        match error {
            CdpError::Chrome(e) if !self.is_closed() => DriverError::InvalidSelector {
                selector: selector.to_string(),
                reason: e.to_string(),
            },
            other => self.driver_error(other),
        }
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    type Element = Element;

    async fn navigate(&self, url: &str) -> DriverResult<()> {
        debug!("Navigating to {}", url);
        self.page.goto(url).await.map_err(|e| {
            if self.is_closed() {
                DriverError::Crashed(e.to_string())
            } else {
                DriverError::Navigation { url: url.to_string(), reason: e.to_string() }
            }
        })?;
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let url = self.page.url().await.map_err(|e| self.driver_error(e))?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn find_all(&self, selector: &str) -> DriverResult<Vec<Element>> {
        self.page.find_elements(selector).await.map_err(|e| self.map_query_err(selector, e))
    }

    async fn find_within(&self, root: &Element, selector: &str) -> DriverResult<Vec<Element>> {
        root.find_elements(selector).await.map_err(|e| self.map_query_err(selector, e))
    }

    async fn text(&self, element: &Element) -> DriverResult<String> {
        let text = element.inner_text().await.map_err(|e| self.driver_error(e))?;
        Ok(text.unwrap_or_default())
    }

    async fn attribute(&self, element: &Element, name: &str) -> DriverResult<Option<String>> {
        element.attribute(name).await.map_err(|e| self.driver_error(e))
    }

    async fn outer_html(&self, element: &Element) -> DriverResult<String> {
        let html = element.outer_html().await.map_err(|e| self.driver_error(e))?;
        Ok(html.unwrap_or_default())
    }

    async fn execute_script(&self, script: &str) -> DriverResult<serde_json::Value> {
        let result = self.page.evaluate(script).await.map_err(|e| self.driver_error(e))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn scroll_into_view(&self, element: &Element) -> DriverResult<()> {
        element.scroll_into_view().await.map_err(|e| self.driver_error(e))?;
        Ok(())
    }

    async fn click(&self, element: &Element) -> DriverResult<()> {
        element.click().await.map_err(|e| self.driver_error(e))?;
        Ok(())
    }

    async fn force_click(&self, element: &Element) -> DriverResult<()> {
        element.call_js_fn(FORCE_CLICK_FN, false).await.map_err(|e| self.driver_error(e))?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page.save_screenshot(params, path).await.map_err(|e| self.driver_error(e))?;
        Ok(())
    }

    async fn page_source(&self) -> DriverResult<String> {
        self.page.content().await.map_err(|e| self.driver_error(e))
    }

    async fn close(&mut self) -> DriverResult<()> {
        let result = if self.is_closed() {
            Ok(())
        } else {
            self.browser.close().await.map(|_| ()).map_err(|e| DriverError::Crashed(e.to_string()))
        };

        if let Err(e) = self.browser.wait().await {
            warn!("Browser process did not exit cleanly: {}", e);
        }
        self.handler_task.abort();
        debug!("Browser session closed");
        result
    }
}
