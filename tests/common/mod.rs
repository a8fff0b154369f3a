//! Shared helpers for integration tests: an instrumented snapshot backend.

#![allow(dead_code)]

use async_trait::async_trait;
use reviews_crawler::browser::{
    BrowserSession, DriverError, DriverResult, SessionFactory, SnapshotFactory, SnapshotSession,
};
use reviews_crawler::config::ParserConfig;
use reviews_crawler::pacing::DelayRange;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const NAVIGATION_LATENCY: Duration = Duration::from_millis(20);

pub fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("missing fixture {}: {}", path.display(), e))
}

/// Fast, headless config writing into `dir`.
pub fn test_config(dir: &Path) -> ParserConfig {
    ParserConfig {
        headless: true,
        write_results: false,
        page_delay: DelayRange::zero(),
        review_delay: DelayRange::zero(),
        batch_pause_ms: 0,
        output_dir: dir.join("output"),
        screenshots_dir: dir.join("screenshots"),
        debug_dir: dir.join("debug"),
        ..ParserConfig::default()
    }
}

/// Session counters shared by a factory and all its sessions.
#[derive(Debug, Default)]
pub struct Probe {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Probe {
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Injected misbehaviour: on loading a given URL, or when reading the page source.
#[derive(Debug, Clone)]
pub enum Fault {
    Panic(String),
    Crash(String),
    /// Reading the page source panics (breaks diagnostics capture).
    PanicOnSource,
}

/// Snapshot factory that counts sessions and can inject faults.
pub struct InstrumentedFactory {
    inner: SnapshotFactory,
    probe: Arc<Probe>,
    faults: Vec<Fault>,
}

impl InstrumentedFactory {
    pub fn new(inner: SnapshotFactory) -> Self {
        Self { inner, probe: Arc::new(Probe::default()), faults: Vec::new() }
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn probe(&self) -> Arc<Probe> {
        Arc::clone(&self.probe)
    }
}

#[async_trait]
impl SessionFactory for InstrumentedFactory {
    type Session = InstrumentedSession;

    async fn open(&self, config: &ParserConfig) -> DriverResult<InstrumentedSession> {
        let inner = self.inner.open(config).await?;
        self.probe.enter();
        Ok(InstrumentedSession { inner, probe: Arc::clone(&self.probe), faults: self.faults.clone() })
    }
}

pub struct InstrumentedSession {
    inner: SnapshotSession,
    probe: Arc<Probe>,
    faults: Vec<Fault>,
}

#[async_trait]
impl BrowserSession for InstrumentedSession {
    type Element = <SnapshotSession as BrowserSession>::Element;

    async fn navigate(&self, url: &str) -> DriverResult<()> {
        tokio::time::sleep(NAVIGATION_LATENCY).await;
        for fault in &self.faults {
            match fault {
                Fault::Panic(target) if target == url => panic!("renderer exploded on {}", url),
                Fault::Crash(target) if target == url => {
                    return Err(DriverError::Crashed("websocket closed".to_string()))
                }
                _ => {}
            }
        }
        self.inner.navigate(url).await
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.inner.current_url().await
    }

    async fn find_all(&self, selector: &str) -> DriverResult<Vec<Self::Element>> {
        self.inner.find_all(selector).await
    }

    async fn find_within(&self, root: &Self::Element, selector: &str) -> DriverResult<Vec<Self::Element>> {
        self.inner.find_within(root, selector).await
    }

    async fn text(&self, element: &Self::Element) -> DriverResult<String> {
        self.inner.text(element).await
    }

    async fn attribute(&self, element: &Self::Element, name: &str) -> DriverResult<Option<String>> {
        self.inner.attribute(element, name).await
    }

    async fn outer_html(&self, element: &Self::Element) -> DriverResult<String> {
        self.inner.outer_html(element).await
    }

    async fn execute_script(&self, script: &str) -> DriverResult<serde_json::Value> {
        self.inner.execute_script(script).await
    }

    async fn scroll_into_view(&self, element: &Self::Element) -> DriverResult<()> {
        self.inner.scroll_into_view(element).await
    }

    async fn click(&self, element: &Self::Element) -> DriverResult<()> {
        self.inner.click(element).await
    }

    async fn force_click(&self, element: &Self::Element) -> DriverResult<()> {
        self.inner.force_click(element).await
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> DriverResult<()> {
        self.inner.wait_for(selector, timeout).await
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        self.inner.screenshot(path).await
    }

    async fn page_source(&self) -> DriverResult<String> {
        if self.faults.iter().any(|f| matches!(f, Fault::PanicOnSource)) {
            panic!("page source unavailable");
        }
        self.inner.page_source().await
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.probe.leave();
        self.inner.close().await
    }
}
