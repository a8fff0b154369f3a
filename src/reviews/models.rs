//! Data models for extracted reviews and per-product parse results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author recorded when no author ladder matches.
pub const UNKNOWN_AUTHOR: &str = "Unknown author";

/// Maximum number of characters of outer markup kept per review.
pub const SNIPPET_LIMIT: usize = 500;

/// Version stamped into every result.
pub const PARSER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One customer review extracted from a page.
///
/// Fields are read-only; [`ReviewRecord::new`] is the only way to build a
/// record from extracted data and it refuses empty text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewRecord {
    author: String,
    rating: u8,
    text: String,
    date: String,
    source_snippet: String,
}

impl ReviewRecord {
    /// Creates a record, or `None` when `text` is blank.
    ///
    /// The rating is clamped to 5, a blank author becomes [`UNKNOWN_AUTHOR`]
    /// and the snippet is cut to [`SNIPPET_LIMIT`] characters.
    pub fn new(
        author: impl Into<String>,
        rating: u8,
        text: impl Into<String>,
        date: impl Into<String>,
        source_snippet: &str,
    ) -> Option<Self> {
        let text = text.into().trim().to_string();
        if text.is_empty() {
            return None;
        }

        let author = author.into().trim().to_string();
        Some(Self {
            author: if author.is_empty() { UNKNOWN_AUTHOR.to_string() } else { author },
            rating: rating.min(5),
            text,
            date: date.into().trim().to_string(),
            source_snippet: truncate_chars(source_snippet, SNIPPET_LIMIT),
        })
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    /// Star rating, 0 when unknown.
    pub fn rating(&self) -> u8 {
        self.rating
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn source_snippet(&self) -> &str {
        &self.source_snippet
    }

    /// Identity used to drop the same review seen on two pages.
    pub fn dedupe_key(&self) -> (&str, &str) {
        (&self.author, &self.text)
    }
}

fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Outcome of one product page run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub product_url: String,
    /// Marketplace product id, empty if the URL has none
    pub product_id: String,
    pub total_reviews: usize,
    pub reviews: Vec<ReviewRecord>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub parser_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ParseResult {
    /// Result for a run that finished.
    pub fn success(
        product_url: impl Into<String>,
        product_id: impl Into<String>,
        reviews: Vec<ReviewRecord>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            product_url: product_url.into(),
            product_id: product_id.into(),
            total_reviews: reviews.len(),
            reviews,
            start_time,
            end_time,
            duration_seconds: duration_between(start_time, end_time),
            parser_version: PARSER_VERSION.to_string(),
            error: None,
        }
    }

    /// Result for a run that failed; carries no reviews.
    pub fn failure(
        product_url: impl Into<String>,
        product_id: impl Into<String>,
        error: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::success(product_url, product_id, Vec::new(), start_time, end_time)
        }
    }

    /// Result for a URL that was never started because the batch was cancelled.
    pub fn cancelled(product_url: impl Into<String>) -> Self {
        let product_url = product_url.into();
        let now = Utc::now();
        let product_id = product_id_from_url(&product_url);
        Self::failure(product_url, product_id, "cancelled", now, now)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Base name of the result file, without extension.
    pub fn file_stem(&self) -> String {
        let id = if self.product_id.is_empty() { "unknown" } else { &self.product_id };
        format!("reviews_{}_{}", id, self.start_time.format("%Y%m%d_%H%M%S_%3f"))
    }

    /// Preferred file name; a numbered variant is used when it is taken.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.file_stem())
    }
}

/// Seconds between two instants, at millisecond precision.
fn duration_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = (end - start).num_milliseconds().max(0);
    millis as f64 / 1000.0
}

/// Extracts the product id from a marketplace URL.
///
/// Takes the last `-`-separated token of the path after `/product/`, cut at
/// the first `/` or `?`. Returns an empty string when there is no
/// `/product/` segment.
///
/// ```
/// use reviews_crawler::reviews::models::product_id_from_url;
/// assert_eq!(product_id_from_url("https://shop.test/product/red-shoe-123456/?sh=1"), "123456");
/// assert_eq!(product_id_from_url("https://shop.test/category/shoes"), "");
/// ```
pub fn product_id_from_url(url: &str) -> String {
    let Some((_, tail)) = url.split_once("/product/") else {
        return String::new();
    };
    let slug = tail.split(['/', '?', '#']).next().unwrap_or_default();
    slug.rsplit('-').next().unwrap_or_default().to_string()
}
