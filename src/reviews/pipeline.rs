//! Single-product pipeline: one session, one navigator run, one result file.

use super::diagnostics::DiagnosticsSink;
use super::models::{product_id_from_url, ParseResult, ReviewRecord};
use super::navigator::{Navigator, Operator};
use crate::browser::{BrowserSession, DriverError, SessionFactory};
use crate::config::ParserConfig;
use crate::output::write_unique;
use crate::pacing::DelayProvider;
use anyhow::{Context, Result};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Runs extraction for one product URL at a time.
///
/// Cheap to clone; every clone shares the factory, config, delay provider
/// and operator.
pub struct ReviewPipeline<F: SessionFactory> {
    factory: Arc<F>,
    config: Arc<ParserConfig>,
    delay: Arc<dyn DelayProvider>,
    operator: Arc<dyn Operator>,
    diagnostics: DiagnosticsSink,
}

impl<F: SessionFactory> Clone for ReviewPipeline<F> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            config: Arc::clone(&self.config),
            delay: Arc::clone(&self.delay),
            operator: Arc::clone(&self.operator),
            diagnostics: self.diagnostics.clone(),
        }
    }
}

impl<F: SessionFactory> ReviewPipeline<F> {
    pub fn new(
        factory: Arc<F>,
        config: Arc<ParserConfig>,
        delay: Arc<dyn DelayProvider>,
        operator: Arc<dyn Operator>,
    ) -> Self {
        let diagnostics = DiagnosticsSink::from_config(&config);
        Self { factory, config, delay, operator, diagnostics }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn delay(&self) -> &dyn DelayProvider {
        self.delay.as_ref()
    }

    /// Parses one product page. Never fails: errors end up in the result.
    pub async fn run(&self, url: &str) -> ParseResult {
        let start_time = Utc::now();
        let product_id = product_id_from_url(url);
        info!("Parsing reviews for {}", url);

        let mut result = match self.factory.open(&self.config).await {
            Ok(mut session) => {
                let outcome = self.drive(&session, url, &product_id).await;
                if let Err(e) = session.close().await {
                    warn!("Failed to close browser session for {}: {}", url, e);
                }
                match outcome {
                    Ok(reviews) => ParseResult::success(url, &product_id, reviews, start_time, Utc::now()),
                    Err(e) => ParseResult::failure(url, &product_id, e.to_string(), start_time, Utc::now()),
                }
            }
            Err(e) => ParseResult::failure(
                url,
                &product_id,
                format!("could not start browser: {}", e),
                start_time,
                Utc::now(),
            ),
        };

        match &result.error {
            None => info!(
                "Parsed {} reviews for {} in {:.1}s",
                result.total_reviews, url, result.duration_seconds
            ),
            Some(e) => error!("Failed to parse {}: {}", url, e),
        }

        if self.config.write_results {
            if let Err(e) = self.write(&result).await {
                warn!("{:#}", e);
                if result.error.is_none() {
                    result.error = Some(format!("{:#}", e));
                }
            }
        }
        result
    }

    /// Runs the navigator with panics caught, capturing diagnostics on failure.
    async fn drive(
        &self,
        session: &F::Session,
        url: &str,
        product_id: &str,
    ) -> Result<Vec<ReviewRecord>, DriverError> {
        let navigator = Navigator::new(session, &self.config, self.delay.as_ref(), self.operator.as_ref());
        let outcome = match AssertUnwindSafe(navigator.run(url)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(DriverError::Crashed(panic_message(panic))),
        };

        if outcome.is_err() {
            let capture = self.diagnostics.capture(session, product_id);
            if let Err(panic) = AssertUnwindSafe(capture).catch_unwind().await {
                warn!("Diagnostics capture for {} aborted: {}", url, panic_message(panic));
            }
        }
        outcome
    }

    /// Persists `result` as pretty JSON in the output directory.
    ///
    /// Never overwrites: a second result with the same name gets a numbered suffix.
    pub async fn write(&self, result: &ParseResult) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(result).context("Failed to serialize result")?;
        let path = write_unique(&self.config.output_dir, &result.file_stem(), "json", json.as_bytes())
            .await
            .with_context(|| {
                format!("Failed to write result file: {}", self.config.output_dir.join(result.file_name()).display())
            })?;
        info!("Saved results to {}", path.display());
        Ok(path)
    }
}

/// Human-readable text of a caught panic payload.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    format!("panic during extraction: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{DriverResult, SnapshotFactory};
    use crate::pacing::NoDelay;
    use async_trait::async_trait;
    use tempfile::TempDir;

    const PRODUCT: &str = "https://shop.test/product/boots-77/";

    struct NoOperator;

    #[async_trait]
    impl Operator for NoOperator {
        async fn resolve_captcha(&self, _url: &str) -> DriverResult<()> {
            Ok(())
        }
    }

    fn config_in(dir: &TempDir) -> ParserConfig {
        let config = ParserConfig {
            headless: true,
            output_dir: dir.path().join("output"),
            screenshots_dir: dir.path().join("screenshots"),
            debug_dir: dir.path().join("debug"),
            ..ParserConfig::default()
        };
        config.prepare_dirs().unwrap();
        config
    }

    fn pipeline(factory: SnapshotFactory, config: ParserConfig) -> ReviewPipeline<SnapshotFactory> {
        ReviewPipeline::new(Arc::new(factory), Arc::new(config), Arc::new(NoDelay), Arc::new(NoOperator))
    }

    #[tokio::test]
    async fn test_success_writes_result_file() {
        let dir = TempDir::new().unwrap();
        let html = r#"<html><body><div data-widget="webReviews">
            <div class="review-item"><span class="author">Anna</span><p class="review-text">Warm and light, love them.</p></div>
        </div></body></html>"#;
        let factory = SnapshotFactory::new().with_page(PRODUCT, html);
        let pipeline = pipeline(factory, config_in(&dir));

        let result = pipeline.run(PRODUCT).await;
        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.product_id, "77");
        assert_eq!(result.total_reviews, 1);

        let files: Vec<_> = std::fs::read_dir(dir.path().join("output")).unwrap().collect();
        assert_eq!(files.len(), 1);
        let path = files[0].as_ref().unwrap().path();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("reviews_77_"));

        let saved: ParseResult = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(saved, result);
    }

    #[tokio::test]
    async fn test_failure_captures_diagnostics() {
        let dir = TempDir::new().unwrap();
        // Product page loads but neither the link nor the fallback view exists
        let factory = SnapshotFactory::new().with_page(PRODUCT, "<html><body>Access denied</body></html>");
        let pipeline = pipeline(factory, config_in(&dir));

        let result = pipeline.run(PRODUCT).await;
        assert!(!result.is_success());
        assert!(result.reviews.is_empty());
        assert!(result.error.as_deref().unwrap().contains("tab=reviews"));

        let dumps: Vec<_> = std::fs::read_dir(dir.path().join("debug")).unwrap().collect();
        assert_eq!(dumps.len(), 1);
    }

    #[tokio::test]
    async fn test_unwritable_output_is_recorded() {
        let dir = TempDir::new().unwrap();
        let html = r#"<html><body><div data-widget="webReviews">
            <div class="review-item"><p class="review-text">Warm and light, love them.</p></div>
        </div></body></html>"#;
        let factory = SnapshotFactory::new().with_page(PRODUCT, html);
        let config = ParserConfig { output_dir: dir.path().join("missing/dir"), ..config_in(&dir) };
        let pipeline = pipeline(factory, config);

        let result = pipeline.run(PRODUCT).await;
        assert_eq!(result.total_reviews, 1);
        assert!(result.error.unwrap().contains("Failed to write result file"));
    }

    #[tokio::test]
    async fn test_write_disabled() {
        let dir = TempDir::new().unwrap();
        let factory = SnapshotFactory::new().with_page(PRODUCT, "<html><body></body></html>");
        let config = ParserConfig { write_results: false, ..config_in(&dir) };
        let pipeline = pipeline(factory, config);

        pipeline.run(PRODUCT).await;
        assert_eq!(std::fs::read_dir(dir.path().join("output")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_write_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(SnapshotFactory::new(), config_in(&dir));
        let now = Utc::now();
        let result = ParseResult::success(PRODUCT, "77", Vec::new(), now, now);

        let first = pipeline.write(&result).await.unwrap();
        let second = pipeline.write(&result).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(first.file_name().unwrap().to_string_lossy(), result.file_name());
        assert_eq!(std::fs::read_dir(dir.path().join("output")).unwrap().count(), 2);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "panic during extraction: boom");
        assert_eq!(panic_message(Box::new(String::from("bad"))), "panic during extraction: bad");
        assert_eq!(panic_message(Box::new(42)), "panic during extraction: unknown panic");
    }
}
