//! Offline backend serving saved HTML through the [`BrowserSession`] interface.
//!
//! Used by the `replay` command to re-run extraction against a dumped page,
//! and by the test suite. Each page is re-parsed on every query; element
//! handles are document-order indices tagged with the page generation they
//! came from, so a handle taken before a navigation reports `Detached`.

use super::{BrowserSession, DriverError, DriverResult, SessionFactory};
use crate::config::ParserConfig;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, trace};

const BLANK: &str = "about:blank";

/// Elements whose text never reaches the reader.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Which query entry point was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Page,
    Within,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotElement {
    index: usize,
    generation: u64,
}

#[derive(Debug, Default)]
struct PageState {
    url: String,
    html: String,
    generation: u64,
    journal: Vec<(QueryKind, String)>,
    text_reads: usize,
    closed: bool,
}

/// Session over a fixed set of saved pages keyed by URL.
#[derive(Debug)]
pub struct SnapshotSession {
    routes: HashMap<String, String>,
    state: Mutex<PageState>,
}

impl SnapshotSession {
    /// Creates a session on `about:blank` that can navigate to any of `routes`.
    pub fn new(routes: HashMap<String, String>) -> Self {
        Self {
            routes,
            state: Mutex::new(PageState { url: BLANK.to_string(), ..PageState::default() }),
        }
    }

    /// Creates a session already showing `html` at `url`.
    pub fn from_html(url: &str, html: &str) -> Self {
        let mut routes = HashMap::new();
        routes.insert(url.to_string(), html.to_string());
        Self {
            routes,
            state: Mutex::new(PageState {
                url: url.to_string(),
                html: html.to_string(),
                ..PageState::default()
            }),
        }
    }

    /// Selectors queried so far through the given entry point, in order.
    pub fn queried_selectors(&self, kind: QueryKind) -> Vec<String> {
        self.state()
            .journal
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, s)| s.clone())
            .collect()
    }

    /// Number of element text reads so far.
    pub fn text_reads(&self) -> usize {
        self.state().text_reads
    }

    pub fn clear_journal(&self) {
        let mut state = self.state();
        state.journal.clear();
        state.text_reads = 0;
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current markup and generation, recording the query in the journal.
    fn snapshot_for(&self, kind: QueryKind, selector: &str) -> (String, u64) {
        let mut state = self.state();
        state.journal.push((kind, selector.to_string()));
        (state.html.clone(), state.generation)
    }

    fn current(&self) -> (String, u64) {
        let state = self.state();
        (state.html.clone(), state.generation)
    }

    fn load(&self, url: &str) -> DriverResult<()> {
        let html = self.routes.get(url).ok_or_else(|| DriverError::Navigation {
            url: url.to_string(),
            reason: "no saved page for this URL".to_string(),
        })?;

        let mut state = self.state();
        state.url = url.to_string();
        state.html = html.clone();
        state.generation += 1;
        debug!("Snapshot loaded {} ({} bytes)", url, html.len());
        Ok(())
    }

    /// Runs `f` against the element behind `handle` in a freshly parsed document.
    fn with_element<T>(
        &self,
        handle: &SnapshotElement,
        f: impl FnOnce(ElementRef<'_>) -> T,
    ) -> DriverResult<T> {
        let (html, generation) = self.current();
        if handle.generation != generation {
            return Err(DriverError::Detached);
        }
        let doc = Html::parse_document(&html);
        let element = document_elements(&doc)
            .into_iter()
            .nth(handle.index)
            .ok_or(DriverError::Detached)?;
        Ok(f(element))
    }
}

fn parse_selector(selector: &str) -> DriverResult<Selector> {
    Selector::parse(selector).map_err(|e| DriverError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{:?}", e),
    })
}

/// All elements of the document in document order.
fn document_elements(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.root_element().descendants().filter_map(ElementRef::wrap).collect()
}

/// Handles for `matches`, in document order.
fn handles<'a>(
    all: &[ElementRef<'a>],
    matches: impl Iterator<Item = ElementRef<'a>>,
    generation: u64,
) -> Vec<SnapshotElement> {
    let positions: HashMap<_, usize> = all.iter().enumerate().map(|(i, e)| (e.id(), i)).collect();
    let mut found: Vec<SnapshotElement> = matches
        .filter_map(|e| positions.get(&e.id()).copied())
        .map(|index| SnapshotElement { index, generation })
        .collect();
    found.sort_by_key(|h| h.index);
    found.dedup();
    found
}

/// Visible text with runs of whitespace collapsed to single spaces.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut words = Vec::new();
    collect_words(element, &mut words);
    words.join(" ")
}

fn collect_words<'a>(element: ElementRef<'a>, words: &mut Vec<&'a str>) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            words.extend(text.split_whitespace());
        } else if let Some(child_element) = ElementRef::wrap(child) {
            if !HIDDEN_TAGS.contains(&child_element.value().name()) {
                collect_words(child_element, words);
            }
        }
    }
}

/// Resolves a link target against the page URL.
fn resolve_href(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    let without_query = base.split(['?', '#']).next().unwrap_or(base);
    if let Some(query) = href.strip_prefix('?') {
        return format!("{}?{}", without_query, query);
    }

    let origin_end = without_query
        .find("://")
        .and_then(|scheme| without_query[scheme + 3..].find('/').map(|p| p + scheme + 3))
        .unwrap_or(without_query.len());
    let origin = &without_query[..origin_end];

    if href.starts_with('/') {
        format!("{}{}", origin, href)
    } else {
        let dir_end = without_query.rfind('/').filter(|p| *p >= origin_end).unwrap_or(origin_end);
        format!("{}/{}", &without_query[..dir_end], href)
    }
}

#[async_trait]
impl BrowserSession for SnapshotSession {
    type Element = SnapshotElement;

    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.load(url)
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.state().url.clone())
    }

    async fn find_all(&self, selector: &str) -> DriverResult<Vec<SnapshotElement>> {
        let (html, generation) = self.snapshot_for(QueryKind::Page, selector);
        let parsed = parse_selector(selector)?;
        let doc = Html::parse_document(&html);
        let all = document_elements(&doc);
        Ok(handles(&all, doc.select(&parsed), generation))
    }

    async fn find_within(
        &self,
        root: &SnapshotElement,
        selector: &str,
    ) -> DriverResult<Vec<SnapshotElement>> {
        let (html, generation) = self.snapshot_for(QueryKind::Within, selector);
        let parsed = parse_selector(selector)?;
        if root.generation != generation {
            return Err(DriverError::Detached);
        }

        let doc = Html::parse_document(&html);
        let all = document_elements(&doc);
        let scope = *all.get(root.index).ok_or(DriverError::Detached)?;
        let matches = scope.select(&parsed).filter(|e| e.id() != scope.id());
        Ok(handles(&all, matches, generation))
    }

    async fn text(&self, element: &SnapshotElement) -> DriverResult<String> {
        self.state().text_reads += 1;
        self.with_element(element, visible_text)
    }

    async fn attribute(&self, element: &SnapshotElement, name: &str) -> DriverResult<Option<String>> {
        self.with_element(element, |e| e.value().attr(name).map(str::to_string))
    }

    async fn outer_html(&self, element: &SnapshotElement) -> DriverResult<String> {
        self.with_element(element, |e| e.html())
    }

    async fn execute_script(&self, script: &str) -> DriverResult<serde_json::Value> {
        trace!("Snapshot ignores script: {}", script);
        Ok(serde_json::Value::Null)
    }

    async fn scroll_into_view(&self, element: &SnapshotElement) -> DriverResult<()> {
        self.with_element(element, |_| ())
    }

    async fn click(&self, element: &SnapshotElement) -> DriverResult<()> {
        let href = self.with_element(element, |e| {
            (e.value().name() == "a").then(|| e.value().attr("href").map(str::to_string)).flatten()
        })?;

        match href {
            Some(href) => {
                let base = self.state().url.clone();
                self.load(&resolve_href(&base, &href))
            }
            None => Ok(()),
        }
    }

    async fn force_click(&self, element: &SnapshotElement) -> DriverResult<()> {
        self.click(element).await
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> DriverResult<()> {
        // Saved pages never change, so a single look is enough
        match self.find_all(selector).await {
            Ok(found) if !found.is_empty() => Ok(()),
            Ok(_) => Err(DriverError::timeout(selector, timeout)),
            Err(e) if e.is_dom_miss() => Err(DriverError::timeout(selector, timeout)),
            Err(e) => Err(e),
        }
    }

    async fn screenshot(&self, _path: &Path) -> DriverResult<()> {
        Err(DriverError::Unsupported("screenshot"))
    }

    async fn page_source(&self) -> DriverResult<String> {
        Ok(self.state().html.clone())
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.state().closed = true;
        Ok(())
    }
}

/// Opens [`SnapshotSession`]s over a shared set of saved pages.
#[derive(Debug, Clone, Default)]
pub struct SnapshotFactory {
    routes: HashMap<String, String>,
}

impl SnapshotFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the markup served for `url`.
    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.routes.insert(url.into(), html.into());
        self
    }
}

#[async_trait]
impl SessionFactory for SnapshotFactory {
    type Session = SnapshotSession;

    async fn open(&self, _config: &ParserConfig) -> DriverResult<SnapshotSession> {
        Ok(SnapshotSession::new(self.routes.clone()))
    }
}
