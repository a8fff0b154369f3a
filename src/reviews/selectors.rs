//! Default selector ladders for marketplace review pages.
//!
//! Each list is ordered by priority: the first entry that matches wins.
//! The storefront A/B-tests its markup, so the `data-widget` hooks come
//! first and generic class names act as fallbacks. Every list can be
//! replaced from the `[selectors]` table of the config file.
//!
//! **Update process**: When extraction degrades, replay the saved debug
//! page with `reviews-crawler replay`, adjust the ladder, and add a fixture.

/// Selectors for locating reviews and their fields.
pub mod review {
    /// Page-level containers that hold the review list.
    pub const CONTAINERS: &[&str] = &[
        "[data-widget='webReviews']",
        "[data-widget='webListReviews']",
        "[data-widget='reviews']",
        ".reviews-section",
        ".product-reviews",
        "[data-testid='reviews']",
        ".review-list",
        ".reviews-container",
    ];

    /// One review inside a container.
    pub const ITEMS: &[&str] = &[
        "div[data-widget='webReviewCard']",
        ".review-item",
        ".review-card",
        "[data-testid='review']",
        ".review",
        "div:has(.review-text)",
        "div:has([data-widget='webReviewText'])",
    ];

    pub const AUTHOR: &[&str] = &[
        ".review-author",
        ".author",
        "[data-widget='webReviewAuthor']",
        ".user-name",
        ".reviewer-name",
        ".review-user",
    ];

    pub const RATING: &[&str] = &["[data-widget='webRating']", ".rating", ".stars", ".review-rating"];

    /// Filled star markers inside a rating element.
    pub const FILLED_STAR: &str = "[data-index]:not([data-state='empty'])";

    pub const TEXT: &[&str] = &[
        ".review-text",
        "[data-widget='webReviewText']",
        ".review-content",
        ".comment-text",
        ".review-body",
    ];

    pub const DATE: &[&str] =
        &[".review-date", ".date", "[data-widget='webReviewDate']", "time", ".review-time"];

    /// Block elements considered by the generic container heuristic.
    pub const GENERIC_BLOCK: &str = "div, article, section, li";
}

/// Selectors for reaching the reviews view.
pub mod navigation {
    /// Present once the document has rendered.
    pub const ROOT_MARKER: &str = "body";

    /// Links from the product page to the dedicated reviews view.
    pub const REVIEWS_LINK: &[&str] = &[
        "[data-widget='webReviewProductScore'] a",
        "a[href*='reviews']",
        "[data-widget='webProductRating'] a",
        ".product-review-summary a",
        "[data-testid='reviews-link']",
        ".reviews-link",
    ];

    /// Link to the next page of reviews.
    pub const NEXT_PAGE: &[&str] = &[
        "[data-widget='webPagination'] a[rel='next']",
        "a[rel='next']",
        ".pagination-next a",
        "[data-testid='pagination-next']",
    ];

    /// Query appended to the product URL when no reviews link is found.
    pub const REVIEWS_TAB_QUERY: &str = "tab=reviews";
}

/// Selectors for page obstacles.
pub mod obstacles {
    pub const CAPTCHA: &[&str] = &["[data-widget='captcha']", ".captcha", "#captcha"];

    pub const COOKIE_CONSENT: &[&str] = &[
        "[data-widget='cookieConsent'] button",
        "button[data-testid='cookie-accept']",
        ".cookie-consent button",
    ];
}
