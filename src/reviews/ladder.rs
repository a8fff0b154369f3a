//! Selector ladders: ordered, short-circuiting DOM query strategies.

use crate::browser::{BrowserSession, DriverError};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Ordered list of CSS selectors for one semantic field.
///
/// Strategies are tried in order and evaluation stops at the first one that
/// matches anything; lower-priority strategies are never queried after that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorLadder(Vec<String>);

impl SelectorLadder {
    pub fn new<I, S>(strategies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(strategies.into_iter().map(Into::into).collect())
    }

    pub fn strategies(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Elements matched by the first strategy that matches under `root`.
    pub async fn first_match<S: BrowserSession>(
        &self,
        session: &S,
        root: &S::Element,
    ) -> Option<(usize, Vec<S::Element>)> {
        for (rank, selector) in self.0.iter().enumerate() {
            match session.find_within(root, selector).await {
                Ok(found) if !found.is_empty() => {
                    trace!("Ladder hit at {}: {} ({} elements)", rank, selector, found.len());
                    return Some((rank, found));
                }
                Ok(_) => trace!("Ladder miss: {}", selector),
                Err(e) => log_query_error(selector, &e),
            }
        }
        None
    }

    /// Same as [`first_match`](Self::first_match) but scoped to the whole document.
    pub async fn first_match_on_page<S: BrowserSession>(
        &self,
        session: &S,
    ) -> Option<(usize, Vec<S::Element>)> {
        for (rank, selector) in self.0.iter().enumerate() {
            match session.find_all(selector).await {
                Ok(found) if !found.is_empty() => {
                    debug!("Page match for {} ({} elements)", selector, found.len());
                    return Some((rank, found));
                }
                Ok(_) => trace!("Page miss: {}", selector),
                Err(e) => log_query_error(selector, &e),
            }
        }
        None
    }

    /// Trimmed text of the first element of the first matching strategy.
    ///
    /// Returns an empty string when nothing matches. A strategy whose first
    /// element cannot be read counts as a miss.
    pub async fn resolve<S: BrowserSession>(&self, session: &S, root: &S::Element) -> String {
        for selector in &self.0 {
            let found = match session.find_within(root, selector).await {
                Ok(found) if !found.is_empty() => found,
                Ok(_) => continue,
                Err(e) => {
                    log_query_error(selector, &e);
                    continue;
                }
            };

            match session.text(&found[0]).await {
                Ok(text) => return text.trim().to_string(),
                Err(e) => log_query_error(selector, &e),
            }
        }
        String::new()
    }
}

impl From<&[&str]> for SelectorLadder {
    fn from(list: &[&str]) -> Self {
        Self::new(list.iter().copied())
    }
}

/// Resolves a 0-5 star rating under `root`.
///
/// For each rating strategy that matches, the filled star markers of its
/// first element are counted; if there are none, the element text is scanned
/// for the first digit in `0..=5`. A strategy that yields neither falls
/// through to the next one. Unknown ratings are 0.
pub async fn resolve_rating<S: BrowserSession>(
    session: &S,
    root: &S::Element,
    ladder: &SelectorLadder,
    star_selector: &str,
) -> u8 {
    for selector in ladder.strategies() {
        let found = match session.find_within(root, selector).await {
            Ok(found) if !found.is_empty() => found,
            Ok(_) => continue,
            Err(e) => {
                log_query_error(selector, &e);
                continue;
            }
        };
        let rating_element = &found[0];

        match session.find_within(rating_element, star_selector).await {
            Ok(stars) if !stars.is_empty() => return stars.len().min(5) as u8,
            Ok(_) => {}
            Err(e) => log_query_error(star_selector, &e),
        }

        match session.text(rating_element).await {
            Ok(text) => {
                if let Some(rating) = first_rating_digit(&text) {
                    return rating;
                }
            }
            Err(e) => log_query_error(selector, &e),
        }
    }
    0
}

/// First ASCII digit in `0..=5` found in `text`.
pub fn first_rating_digit(text: &str) -> Option<u8> {
    text.chars()
        .filter_map(|c| c.to_digit(10))
        .find(|d| *d <= 5)
        .map(|d| d as u8)
}

fn log_query_error(selector: &str, error: &DriverError) {
    if error.is_dom_miss() {
        trace!("Query {} skipped: {}", selector, error);
    } else {
        debug!("Query {} failed: {}", selector, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::snapshot::{QueryKind, SnapshotSession};

    const FRAGMENT: &str = r#"
        <html><body>
            <div id="review">
                <span class="author">Anna K.</span>
                <span class="review-author">Anna Karenina</span>
                <p class="review-text">  Arrived quickly, fits well.  </p>
            </div>
        </body></html>
    "#;

    async fn review_root(session: &SnapshotSession) -> <SnapshotSession as BrowserSession>::Element {
        session.find_all("#review").await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn test_resolve_first_matching_strategy() {
        let session = SnapshotSession::from_html("https://shop.test/p/1", FRAGMENT);
        let root = review_root(&session).await;

        let ladder = SelectorLadder::new([".review-author", ".author"]);
        assert_eq!(ladder.resolve(&session, &root).await, "Anna Karenina");

        let ladder = SelectorLadder::new([".author", ".review-author"]);
        assert_eq!(ladder.resolve(&session, &root).await, "Anna K.");
    }

    #[tokio::test]
    async fn test_resolve_trims_text() {
        let session = SnapshotSession::from_html("https://shop.test/p/1", FRAGMENT);
        let root = review_root(&session).await;

        let ladder = SelectorLadder::new([".review-text"]);
        assert_eq!(ladder.resolve(&session, &root).await, "Arrived quickly, fits well.");
    }

    #[tokio::test]
    async fn test_resolve_short_circuits() {
        let session = SnapshotSession::from_html("https://shop.test/p/1", FRAGMENT);
        let root = review_root(&session).await;
        session.clear_journal();

        let ladder = SelectorLadder::new([".missing", ".review-author", ".author", ".review-text"]);
        let text = ladder.resolve(&session, &root).await;
        assert_eq!(text, "Anna Karenina");

        let queried = session.queried_selectors(QueryKind::Within);
        assert_eq!(queried, vec![".missing".to_string(), ".review-author".to_string()]);
    }

    #[tokio::test]
    async fn test_resolve_skips_invalid_selector() {
        let session = SnapshotSession::from_html("https://shop.test/p/1", FRAGMENT);
        let root = review_root(&session).await;

        let ladder = SelectorLadder::new(["span:contains('Anna')", "[[broken", ".author"]);
        assert_eq!(ladder.resolve(&session, &root).await, "Anna K.");
    }

    #[tokio::test]
    async fn test_resolve_nothing_matches() {
        let session = SnapshotSession::from_html("https://shop.test/p/1", FRAGMENT);
        let root = review_root(&session).await;

        let ladder = SelectorLadder::new([".nope", ".also-nope"]);
        assert_eq!(ladder.resolve(&session, &root).await, "");
        assert_eq!(SelectorLadder::new(Vec::<String>::new()).resolve(&session, &root).await, "");
    }

    #[tokio::test]
    async fn test_first_match_on_page() {
        let session = SnapshotSession::from_html("https://shop.test/p/1", FRAGMENT);
        let ladder = SelectorLadder::new([".nope", "span", "p"]);

        let (rank, found) = ladder.first_match_on_page(&session).await.unwrap();
        assert_eq!(rank, 1);
        assert_eq!(found.len(), 2);

        assert!(SelectorLadder::new([".nope"]).first_match_on_page(&session).await.is_none());
    }

    #[tokio::test]
    async fn test_rating_counts_filled_stars_without_text_scan() {
        let html = r#"<html><body><div id="review">
            <div data-widget="webRating">
                <span data-index="1" data-state="filled"></span>
                <span data-index="2" data-state="filled"></span>
                <span data-index="3" data-state="filled"></span>
                <span data-index="4" data-state="empty"></span>
                <span data-index="5" data-state="empty"></span>
                4 of 5
            </div>
        </div></body></html>"#;
        let session = SnapshotSession::from_html("https://shop.test/p/1", html);
        let root = review_root(&session).await;
        session.clear_journal();

        let ladder = SelectorLadder::from(crate::reviews::selectors::review::RATING);
        let rating =
            resolve_rating(&session, &root, &ladder, crate::reviews::selectors::review::FILLED_STAR)
                .await;

        assert_eq!(rating, 3);
        assert_eq!(session.text_reads(), 0);
    }

    #[tokio::test]
    async fn test_rating_falls_back_to_text_digit() {
        let html = r#"<html><body><div id="review">
            <div class="rating">Rated 4 out of 5</div>
        </div></body></html>"#;
        let session = SnapshotSession::from_html("https://shop.test/p/1", html);
        let root = review_root(&session).await;

        let ladder = SelectorLadder::from(crate::reviews::selectors::review::RATING);
        let rating =
            resolve_rating(&session, &root, &ladder, crate::reviews::selectors::review::FILLED_STAR)
                .await;
        assert_eq!(rating, 4);
    }

    #[tokio::test]
    async fn test_rating_next_strategy_when_first_yields_nothing() {
        let html = r#"<html><body><div id="review">
            <div class="rating">no score</div>
            <div class="stars"><i data-index="1"></i><i data-index="2"></i></div>
        </div></body></html>"#;
        let session = SnapshotSession::from_html("https://shop.test/p/1", html);
        let root = review_root(&session).await;

        let ladder = SelectorLadder::new([".rating", ".stars"]);
        assert_eq!(resolve_rating(&session, &root, &ladder, "[data-index]").await, 2);
    }

    #[tokio::test]
    async fn test_rating_unknown_is_zero() {
        let session = SnapshotSession::from_html("https://shop.test/p/1", FRAGMENT);
        let root = review_root(&session).await;

        let ladder = SelectorLadder::from(crate::reviews::selectors::review::RATING);
        let rating =
            resolve_rating(&session, &root, &ladder, crate::reviews::selectors::review::FILLED_STAR)
                .await;
        assert_eq!(rating, 0);
    }

    #[tokio::test]
    async fn test_rating_capped_at_five() {
        let stars: String = (1..=7).map(|i| format!(r#"<b data-index="{i}"></b>"#)).collect();
        let html = format!(r#"<html><body><div id="review"><div class="stars">{stars}</div></div></body></html>"#);
        let session = SnapshotSession::from_html("https://shop.test/p/1", &html);
        let root = review_root(&session).await;

        let ladder = SelectorLadder::new([".stars"]);
        assert_eq!(resolve_rating(&session, &root, &ladder, "[data-index]").await, 5);
    }

    #[test]
    fn test_first_rating_digit() {
        assert_eq!(first_rating_digit("5 stars"), Some(5));
        assert_eq!(first_rating_digit("rated 9/10, 3 stars"), Some(1));
        assert_eq!(first_rating_digit("rated 9 of 9, 3 stars"), Some(3));
        assert_eq!(first_rating_digit("0"), Some(0));
        assert_eq!(first_rating_digit("six"), None);
        assert_eq!(first_rating_digit("789"), None);
    }

    #[test]
    fn test_ladder_serde_transparent() {
        let ladder: SelectorLadder = serde_json::from_str(r#"[".a", ".b"]"#).unwrap();
        assert_eq!(ladder.strategies(), &[".a".to_string(), ".b".to_string()]);
        assert_eq!(serde_json::to_string(&ladder).unwrap(), r#"[".a",".b"]"#);
        assert_eq!(ladder.len(), 2);
        assert!(!ladder.is_empty());
    }
}
