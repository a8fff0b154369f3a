//! Navigation state machine that brings a product page to a scrapeable state.

use super::extractor::ReviewExtractor;
use super::models::ReviewRecord;
use crate::browser::{BrowserSession, DriverError, DriverResult};
use crate::config::ParserConfig;
use crate::pacing::DelayProvider;
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::Write;
use tracing::{debug, info, warn};

const SCROLL_HALFWAY: &str = "window.scrollTo(0, document.body.scrollHeight / 2);";

/// Where the navigator is in bringing reviews onto the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationState {
    Loaded,
    ObstacleCheck,
    ReviewsOnPage,
    ReviewsElsewhere,
    ReviewsVisible,
    Failed,
}

/// Human in the loop for obstacles that cannot be automated.
#[async_trait]
pub trait Operator: Send + Sync {
    /// Blocks until the operator reports the captcha on `url` as solved.
    async fn resolve_captcha(&self, url: &str) -> DriverResult<()>;
}

/// Prompts on stderr and waits for Enter on stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinOperator;

#[async_trait]
impl Operator for StdinOperator {
    async fn resolve_captcha(&self, url: &str) -> DriverResult<()> {
        let prompt = format!("Captcha detected on {url}. Solve it in the browser window, then press Enter...");
        tokio::task::spawn_blocking(move || {
            eprintln!("{}", prompt);
            std::io::stderr().flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            Ok::<_, std::io::Error>(())
        })
        .await
        .map_err(|e| DriverError::Io(std::io::Error::other(e)))??;
        Ok(())
    }
}

/// Drives one session from page load to collected reviews.
///
/// Created per product and consumed by [`Navigator::run`].
pub struct Navigator<'a, S: BrowserSession> {
    session: &'a S,
    config: &'a ParserConfig,
    delay: &'a dyn DelayProvider,
    operator: &'a dyn Operator,
    state: NavigationState,
}

impl<'a, S: BrowserSession> Navigator<'a, S> {
    pub fn new(
        session: &'a S,
        config: &'a ParserConfig,
        delay: &'a dyn DelayProvider,
        operator: &'a dyn Operator,
    ) -> Self {
        Self { session, config, delay, operator, state: NavigationState::Loaded }
    }

    fn extractor(&self) -> ReviewExtractor<'a, S> {
        ReviewExtractor::new(self.session, &self.config.selectors, self.delay, self.config.review_delay)
    }

    /// Loads `url` and returns every review reachable from it.
    pub async fn run(mut self, url: &str) -> DriverResult<Vec<ReviewRecord>> {
        let mut reviews = Vec::new();

        loop {
            debug!("Navigation state: {:?}", self.state);
            let step = match self.state {
                NavigationState::Loaded => self.load(url).await.map(|_| NavigationState::ObstacleCheck),
                NavigationState::ObstacleCheck => {
                    self.clear_obstacles(url).await.map(|_| NavigationState::ReviewsOnPage)
                }
                NavigationState::ReviewsOnPage => {
                    reviews = self.discover().await;
                    if reviews.is_empty() {
                        Ok(NavigationState::ReviewsElsewhere)
                    } else {
                        Ok(NavigationState::ReviewsVisible)
                    }
                }
                NavigationState::ReviewsElsewhere => self.open_reviews_view(url).await.map(|found| {
                    reviews = found;
                    NavigationState::ReviewsVisible
                }),
                NavigationState::ReviewsVisible => {
                    self.paginate(&mut reviews).await;
                    info!("Collected {} reviews from {}", reviews.len(), url);
                    return Ok(reviews);
                }
                NavigationState::Failed => {
                    return Err(DriverError::Crashed("navigator reused after failure".to_string()));
                }
            };

            match step {
                Ok(next) => self.state = next,
                Err(e) => {
                    warn!("Navigation failed in {:?}: {}", self.state, e);
                    self.state = NavigationState::Failed;
                    return Err(e);
                }
            }
        }
    }

    async fn load(&self, url: &str) -> DriverResult<()> {
        self.navigate_bounded(url).await?;
        self.session
            .wait_for(&self.config.selectors.root_marker, self.config.page_load_timeout())
            .await
    }

    async fn navigate_bounded(&self, url: &str) -> DriverResult<()> {
        let limit = self.config.page_load_timeout();
        match tokio::time::timeout(limit, self.session.navigate(url)).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::timeout(format!("page load of {}", url), limit)),
        }
    }

    async fn clear_obstacles(&self, url: &str) -> DriverResult<()> {
        if let Err(e) = self.session.execute_script(SCROLL_HALFWAY).await {
            lost_or_logged(e, "scroll")?;
        }
        self.delay.jitter(self.config.review_delay).await;

        let selectors = &self.config.selectors;
        if selectors.captcha.first_match_on_page(self.session).await.is_some() {
            if self.config.headless {
                warn!("Captcha on {} in headless mode, results may be incomplete", url);
            } else {
                warn!("Captcha on {}, waiting for operator", url);
                if let Err(e) = self.operator.resolve_captcha(url).await {
                    warn!("Operator did not confirm captcha: {}", e);
                }
            }
        }

        if let Some((_, buttons)) = selectors.cookie_consent.first_match_on_page(self.session).await {
            match self.session.click(&buttons[0]).await {
                Ok(()) => debug!("Accepted cookie consent"),
                Err(e) => lost_or_logged(e, "cookie consent click")?,
            }
        }

        self.delay.jitter(self.config.page_delay).await;
        Ok(())
    }

    /// Reviews from the first page container that yields any.
    async fn discover(&self) -> Vec<ReviewRecord> {
        let extractor = self.extractor();
        for selector in self.config.selectors.containers.strategies() {
            let containers = match self.session.find_all(selector).await {
                Ok(found) if !found.is_empty() => found,
                _ => continue,
            };
            let container = &containers[0];

            if let Err(e) = self.session.scroll_into_view(container).await {
                debug!("Could not scroll to container {}: {}", selector, e);
            }
            self.delay.jitter(self.config.review_delay).await;

            let reviews = extractor.find_reviews_in_container(container).await;
            if !reviews.is_empty() {
                debug!("Container {} yielded {} reviews", selector, reviews.len());
                return reviews;
            }
            debug!("Container {} matched but yielded no reviews", selector);
        }
        Vec::new()
    }

    async fn open_reviews_view(&self, url: &str) -> DriverResult<Vec<ReviewRecord>> {
        if !self.follow_reviews_link().await? {
            let current = self.session.current_url().await.unwrap_or_else(|_| url.to_string());
            let target = reviews_view_url(&current, &self.config.reviews_tab_query);
            info!("No usable reviews link, opening {}", target);
            self.navigate_bounded(&target).await?;
        }

        self.session
            .wait_for(&self.config.selectors.root_marker, self.config.element_wait_timeout())
            .await?;
        self.delay.jitter(self.config.page_delay).await;

        let reviews = self.discover().await;
        if !reviews.is_empty() {
            return Ok(reviews);
        }
        debug!("No review container in reviews view, scanning page");
        Ok(self.extractor().scan_page().await)
    }

    /// Clicks the reviews link; `false` when there is none or it cannot be clicked.
    async fn follow_reviews_link(&self) -> DriverResult<bool> {
        let Some((_, links)) = self.config.selectors.reviews_link.first_match_on_page(self.session).await
        else {
            return Ok(false);
        };
        match self.click_through(&links[0]).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_session_lost() => Err(e),
            Err(e) => {
                debug!("Reviews link not clickable: {}", e);
                Ok(false)
            }
        }
    }

    /// Scrolls to `element` and clicks it, retrying with a scripted click.
    async fn click_through(&self, element: &S::Element) -> DriverResult<()> {
        if let Err(e) = self.session.scroll_into_view(element).await {
            lost_or_logged(e, "scroll into view")?;
        }
        self.delay.jitter(self.config.review_delay).await;

        match self.session.click(element).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_session_lost() => Err(e),
            Err(e) => {
                debug!("Click failed ({}), retrying with script", e);
                self.session.force_click(element).await
            }
        }
    }

    /// Follows next-page links until `max_pages` pages have been read.
    async fn paginate(&self, reviews: &mut Vec<ReviewRecord>) {
        let mut seen: HashSet<(String, String)> = reviews
            .iter()
            .map(|r| (r.author().to_string(), r.text().to_string()))
            .collect();
        let mut pages = 1;

        while pages < self.config.max_pages {
            let Some((_, links)) = self.config.selectors.next_page.first_match_on_page(self.session).await
            else {
                break;
            };
            if let Err(e) = self.click_through(&links[0]).await {
                warn!("Stopping pagination after page {}: {}", pages, e);
                break;
            }
            if let Err(e) = self
                .session
                .wait_for(&self.config.selectors.root_marker, self.config.element_wait_timeout())
                .await
            {
                warn!("Stopping pagination after page {}: {}", pages, e);
                break;
            }
            self.delay.jitter(self.config.page_delay).await;
            pages += 1;

            let mut added = 0;
            for review in self.discover().await {
                let (author, text) = review.dedupe_key();
                if seen.insert((author.to_string(), text.to_string())) {
                    reviews.push(review);
                    added += 1;
                }
            }
            debug!("Page {} added {} reviews", pages, added);
            if added == 0 {
                break;
            }
        }
    }
}

/// Escalates a lost session, logs anything else.
fn lost_or_logged(error: DriverError, action: &str) -> DriverResult<()> {
    if error.is_session_lost() {
        return Err(error);
    }
    debug!("{} failed: {}", action, error);
    Ok(())
}

/// `url` with its query and fragment replaced by `query`.
pub fn reviews_view_url(url: &str, query: &str) -> String {
    let base = url.split(['?', '#']).next().unwrap_or(url);
    format!("{}?{}", base, query.trim_start_matches('?'))
}
