//! Output formatting for batch summaries and reviews (table, JSON, markdown, CSV).

use crate::config::OutputFormat;
use crate::reviews::{ParseResult, ReviewRecord};

/// Formats results for output.
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Creates a new formatter.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a batch summary, one entry per product.
    pub fn format_results(&self, results: &[ParseResult]) -> String {
        if results.is_empty() {
            return match self.format {
                OutputFormat::Json => "[]".to_string(),
                OutputFormat::Csv => Self::results_csv_header(),
                _ => "No products processed.".to_string(),
            };
        }

        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(results).unwrap_or_else(|_| "[]".to_string())
            }
            OutputFormat::Table => self.table_results(results),
            OutputFormat::Markdown => self.markdown_results(results),
            OutputFormat::Csv => self.csv_results(results),
        }
    }

    /// Formats the reviews of a single product.
    pub fn format_reviews(&self, reviews: &[ReviewRecord]) -> String {
        if reviews.is_empty() {
            return match self.format {
                OutputFormat::Json => "[]".to_string(),
                OutputFormat::Csv => Self::reviews_csv_header(),
                _ => "No reviews found.".to_string(),
            };
        }

        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(reviews).unwrap_or_else(|_| "[]".to_string())
            }
            OutputFormat::Table => self.table_reviews(reviews),
            OutputFormat::Markdown => self.markdown_reviews(reviews),
            OutputFormat::Csv => self.csv_reviews(reviews),
        }
    }

    // Table formatting

    fn table_results(&self, results: &[ParseResult]) -> String {
        let id_width = 14;
        let count_width = 7;
        let time_width = 8;
        let status_width = 30;

        let mut lines = Vec::new();

        lines.push(format!(
            "{:<id_width$}  {:>count_width$}  {:>time_width$}  {:<status_width$}  {}",
            "Product", "Reviews", "Time", "Status", "URL"
        ));
        lines.push(format!(
            "{:-<id_width$}  {:-<count_width$}  {:-<time_width$}  {:-<status_width$}  {:-<40}",
            "", "", "", "", ""
        ));

        for result in results {
            let id = if result.product_id.is_empty() { "-" } else { &result.product_id };
            let status = match &result.error {
                None => "ok".to_string(),
                Some(e) => truncate(e, status_width),
            };

            lines.push(format!(
                "{:<id_width$}  {:>count_width$}  {:>time_width$}  {:<status_width$}  {}",
                truncate(id, id_width),
                result.total_reviews,
                format!("{:.1}s", result.duration_seconds),
                status,
                result.product_url
            ));
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        let reviews: usize = results.iter().map(|r| r.total_reviews).sum();
        lines.push(String::new());
        lines.push(format!(
            "Total: {} products, {} reviews, {} failed",
            results.len(),
            reviews,
            failed
        ));

        lines.join("\n")
    }

    fn table_reviews(&self, reviews: &[ReviewRecord]) -> String {
        let rating_width = 6;
        let author_width = 20;
        let date_width = 16;

        let mut lines = Vec::new();

        lines.push(format!(
            "{:<rating_width$}  {:<author_width$}  {:<date_width$}  {}",
            "Rating", "Author", "Date", "Text"
        ));
        lines.push(format!(
            "{:-<rating_width$}  {:-<author_width$}  {:-<date_width$}  {:-<50}",
            "", "", "", ""
        ));

        for review in reviews {
            lines.push(format!(
                "{:<rating_width$}  {:<author_width$}  {:<date_width$}  {}",
                stars(review.rating()),
                truncate(review.author(), author_width),
                truncate(review.date(), date_width),
                truncate(&single_line(review.text()), 80)
            ));
        }

        lines.push(String::new());
        lines.push(format!("Total: {} reviews", reviews.len()));

        lines.join("\n")
    }

    // Markdown formatting

    fn markdown_results(&self, results: &[ParseResult]) -> String {
        let mut lines = Vec::new();

        lines.push("| Product | Reviews | Time | Status |".to_string());
        lines.push("|---------|---------|------|--------|".to_string());

        for result in results {
            let id = if result.product_id.is_empty() { "unknown" } else { &result.product_id };
            let status = result.error.as_deref().unwrap_or("ok");
            lines.push(format!(
                "| [{}]({}) | {} | {:.1}s | {} |",
                id,
                result.product_url,
                result.total_reviews,
                result.duration_seconds,
                status.replace('|', "\\|")
            ));
        }

        lines.push(String::new());
        lines.push(format!("*{} products processed*", results.len()));

        lines.join("\n")
    }

    fn markdown_reviews(&self, reviews: &[ReviewRecord]) -> String {
        let mut lines = Vec::new();

        lines.push("| Rating | Author | Date | Text |".to_string());
        lines.push("|--------|--------|------|------|".to_string());

        for review in reviews {
            lines.push(format!(
                "| {} | {} | {} | {} |",
                stars(review.rating()),
                review.author().replace('|', "\\|"),
                review.date(),
                single_line(review.text()).replace('|', "\\|")
            ));
        }

        lines.push(String::new());
        lines.push(format!("*{} reviews found*", reviews.len()));

        lines.join("\n")
    }

    // CSV formatting

    fn results_csv_header() -> String {
        "product_url,product_id,reviews,duration_seconds,error".to_string()
    }

    fn reviews_csv_header() -> String {
        "author,rating,date,text".to_string()
    }

    fn csv_results(&self, results: &[ParseResult]) -> String {
        let mut lines = Vec::new();
        lines.push(Self::results_csv_header());

        for result in results {
            lines.push(format!(
                "{},{},{},{:.3},{}",
                Self::csv_escape(&result.product_url),
                result.product_id,
                result.total_reviews,
                result.duration_seconds,
                result.error.as_deref().map(Self::csv_escape).unwrap_or_default()
            ));
        }

        lines.join("\n")
    }

    fn csv_reviews(&self, reviews: &[ReviewRecord]) -> String {
        let mut lines = Vec::new();
        lines.push(Self::reviews_csv_header());

        for review in reviews {
            lines.push(format!(
                "{},{},{},{}",
                Self::csv_escape(review.author()),
                review.rating(),
                Self::csv_escape(review.date()),
                Self::csv_escape(review.text())
            ));
        }

        lines.join("\n")
    }

    fn csv_escape(s: &str) -> String {
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s.to_string()
        }
    }
}

fn stars(rating: u8) -> String {
    if rating == 0 {
        "-".to_string()
    } else {
        "*".repeat(rating as usize)
    }
}

fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cuts `s` to at most `max` characters, marking the cut with "...".
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
