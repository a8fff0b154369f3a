//! Replay command: re-runs extraction against a saved page.

use crate::browser::SnapshotFactory;
use crate::config::ParserConfig;
use crate::format::Formatter;
use crate::pacing::{DelayRange, NoDelay};
use crate::reviews::navigator::reviews_view_url;
use crate::reviews::{ReviewPipeline, StdinOperator};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// URL used when the saved page's origin is not given.
const DEFAULT_REPLAY_URL: &str = "https://replay.invalid/product/replay/";

/// Runs the navigator over a saved HTML file to tune selector ladders offline.
pub struct ReplayCommand {
    config: ParserConfig,
}

impl ReplayCommand {
    /// Creates a new replay command.
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Loads `html_path` and returns the formatted reviews found in it.
    pub async fn execute(&self, html_path: &Path, url: Option<&str>) -> Result<String> {
        let html = tokio::fs::read_to_string(html_path)
            .await
            .with_context(|| format!("Failed to read saved page: {}", html_path.display()))?;
        let url = url.unwrap_or(DEFAULT_REPLAY_URL);
        info!("Replaying {} as {}", html_path.display(), url);

        self.execute_html(&html, url).await
    }

    /// Extracts reviews from in-memory markup served at `url`.
    pub async fn execute_html(&self, html: &str, url: &str) -> Result<String> {
        let config = ParserConfig {
            headless: true,
            write_results: false,
            page_delay: DelayRange::zero(),
            review_delay: DelayRange::zero(),
            ..self.config.clone()
        };

        // The fallback reviews view resolves to the same page so the page scan still runs
        let factory = SnapshotFactory::new()
            .with_page(url, html)
            .with_page(reviews_view_url(url, &config.reviews_tab_query), html);

        let format = config.format;
        let pipeline =
            ReviewPipeline::new(Arc::new(factory), Arc::new(config), Arc::new(NoDelay), Arc::new(StdinOperator));
        let result = pipeline.run(url).await;

        if let Some(error) = result.error {
            anyhow::bail!("Extraction failed: {}", error);
        }
        Ok(Formatter::new(format).format_reviews(&result.reviews))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn test_config() -> ParserConfig {
        ParserConfig {
            format: OutputFormat::Csv,
            debug_dir: std::env::temp_dir(),
            screenshots_dir: std::env::temp_dir(),
            ..ParserConfig::default()
        }
    }

    #[tokio::test]
    async fn test_replay_saved_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"<html><body><div class="reviews-section">
                <div class="review"><span class="user-name">Mila</span>
                <span class="rating">5</span>
                <div class="review-content">Best purchase this winter.</div></div>
            </div></body></html>"#
        )
        .unwrap();

        let output = ReplayCommand::new(test_config()).execute(file.path(), None).await.unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "author,rating,date,text");
        assert_eq!(lines[1], "Mila,5,,Best purchase this winter.");
    }

    #[tokio::test]
    async fn test_replay_falls_back_to_page_scan() {
        let html = "<html><body><div>Heavy but very warm, wore them through January.</div></body></html>";
        let output = ReplayCommand::new(test_config())
            .execute_html(html, "https://shop.test/product/boots-77/")
            .await
            .unwrap();
        assert!(output.contains("Heavy but very warm"));
    }

    #[tokio::test]
    async fn test_replay_missing_file() {
        let err = ReplayCommand::new(test_config())
            .execute(Path::new("/nonexistent/page.html"), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read saved page"));
    }
}
