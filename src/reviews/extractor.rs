//! Turns candidate DOM elements into review records.

use super::ladder::resolve_rating;
use super::models::{ReviewRecord, UNKNOWN_AUTHOR};
use crate::browser::BrowserSession;
use crate::config::SelectorConfig;
use crate::pacing::{DelayProvider, DelayRange};
use tracing::{debug, trace};

/// Candidates with less visible text than this are noise.
pub const MIN_REVIEW_CHARS: usize = 10;

/// Blocks must carry more text than this to pass the generic container heuristic.
pub const GENERIC_BLOCK_MIN_CHARS: usize = 50;

/// Bounds (exclusive) on the text length of a page-scan block.
pub const SCAN_MIN_CHARS: usize = 30;
pub const SCAN_MAX_CHARS: usize = 2000;

/// Maximum number of records the page scan returns.
pub const SCAN_LIMIT: usize = 50;

/// Page-scan blocks containing any of these (case-insensitive) are chrome, not reviews.
pub const SCAN_EXCLUDED_WORDS: &[&str] = &["cookie", "реклама", "навигация", "меню"];

const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// Extracts reviews from one session using the configured ladders.
pub struct ReviewExtractor<'a, S: BrowserSession> {
    session: &'a S,
    selectors: &'a SelectorConfig,
    delay: &'a dyn DelayProvider,
    settle: DelayRange,
}

impl<'a, S: BrowserSession> ReviewExtractor<'a, S> {
    /// `settle` is the pause taken after scrolling, before the page scan reads the DOM.
    pub fn new(
        session: &'a S,
        selectors: &'a SelectorConfig,
        delay: &'a dyn DelayProvider,
        settle: DelayRange,
    ) -> Self {
        Self { session, selectors, delay, settle }
    }

    /// Builds a record from an element believed to hold one review.
    ///
    /// Returns `None` when the element carries fewer than
    /// [`MIN_REVIEW_CHARS`] characters of text.
    pub async fn extract(&self, candidate: &S::Element) -> Option<ReviewRecord> {
        let full_text = match self.session.text(candidate).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                trace!("Candidate text unreadable: {}", e);
                return None;
            }
        };
        if full_text.chars().count() < MIN_REVIEW_CHARS {
            trace!("Rejected short candidate: {:?}", full_text);
            return None;
        }

        let author = self.selectors.author.resolve(self.session, candidate).await;
        let rating =
            resolve_rating(self.session, candidate, &self.selectors.rating, &self.selectors.stars)
                .await;

        let mut text = self.selectors.text.resolve(self.session, candidate).await;
        if text.is_empty() {
            text = full_text;
        }

        let date = self.selectors.date.resolve(self.session, candidate).await;
        let snippet = self.session.outer_html(candidate).await.unwrap_or_default();

        let author = if author.is_empty() { UNKNOWN_AUTHOR.to_string() } else { author };
        ReviewRecord::new(author, rating, text, date, &snippet)
    }

    /// Elements inside `container` that may each hold one review.
    ///
    /// Uses the first review-item strategy that matches. When none does,
    /// every block element with more than [`GENERIC_BLOCK_MIN_CHARS`]
    /// characters of text is a candidate.
    pub async fn candidates(&self, container: &S::Element) -> Vec<S::Element> {
        if let Some((rank, items)) = self.selectors.review_items.first_match(self.session, container).await {
            debug!("Review items matched strategy {} ({} items)", rank, items.len());
            return items;
        }

        let blocks = match self.session.find_within(container, &self.selectors.generic_block).await {
            Ok(blocks) => blocks,
            Err(e) => {
                debug!("Generic block query failed: {}", e);
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        for block in blocks {
            if let Ok(text) = self.session.text(&block).await {
                if text.trim().chars().count() > GENERIC_BLOCK_MIN_CHARS {
                    candidates.push(block);
                }
            }
        }
        debug!("Generic heuristic found {} candidates", candidates.len());
        candidates
    }

    /// Extracts every accepted review under `container`.
    pub async fn find_reviews_in_container(&self, container: &S::Element) -> Vec<ReviewRecord> {
        let mut reviews = Vec::new();
        for candidate in self.candidates(container).await {
            if let Some(review) = self.extract(&candidate).await {
                reviews.push(review);
            }
        }
        reviews
    }

    /// Last-resort scan of every `div` on the page.
    ///
    /// Scrolls to the bottom, waits for lazy content, then keeps divs whose
    /// text length lies strictly between [`SCAN_MIN_CHARS`] and
    /// [`SCAN_MAX_CHARS`] and that contain no excluded word. Records get the
    /// default author, rating 0 and no date. Nested divs are not collapsed,
    /// so one review can appear more than once.
    pub async fn scan_page(&self) -> Vec<ReviewRecord> {
        if let Err(e) = self.session.execute_script(SCROLL_TO_BOTTOM).await {
            debug!("Scroll before page scan failed: {}", e);
        }
        self.delay.jitter(self.settle).await;

        let divs = match self.session.find_all("div").await {
            Ok(divs) => divs,
            Err(e) => {
                debug!("Page scan query failed: {}", e);
                return Vec::new();
            }
        };

        let mut reviews = Vec::new();
        for div in &divs {
            if reviews.len() >= SCAN_LIMIT {
                break;
            }
            let Ok(text) = self.session.text(div).await else {
                continue;
            };
            if !is_scan_candidate(&text) {
                continue;
            }
            let snippet = self.session.outer_html(div).await.unwrap_or_default();
            if let Some(review) = ReviewRecord::new(UNKNOWN_AUTHOR, 0, text, "", &snippet) {
                reviews.push(review);
            }
        }
        debug!("Page scan kept {} of {} divs", reviews.len(), divs.len());
        reviews
    }
}

fn is_scan_candidate(text: &str) -> bool {
    let text = text.trim();
    let len = text.chars().count();
    if len <= SCAN_MIN_CHARS || len >= SCAN_MAX_CHARS {
        return false;
    }
    let lower = text.to_lowercase();
    !SCAN_EXCLUDED_WORDS.iter().any(|word| lower.contains(word))
}
