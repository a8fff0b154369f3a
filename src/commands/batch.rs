//! Batch command: runs the review pipeline across many product URLs.

use crate::browser::{ChromeLauncher, SessionFactory};
use crate::config::ParserConfig;
use crate::format::Formatter;
use crate::pacing::JitterDelay;
use crate::reviews::models::product_id_from_url;
use crate::reviews::pipeline::panic_message;
use crate::reviews::{ParseResult, ReviewPipeline, StdinOperator};
use anyhow::Result;
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Error recorded for URLs skipped after cancellation.
pub const CANCELLED: &str = "cancelled";

/// Parses reviews for a list of product URLs.
pub struct BatchCommand<F: SessionFactory> {
    pipeline: ReviewPipeline<F>,
    cancel: CancellationToken,
}

impl BatchCommand<ChromeLauncher> {
    /// Creates a batch command driving real Chromium sessions.
    pub fn new(config: ParserConfig) -> Self {
        let pipeline = ReviewPipeline::new(
            Arc::new(ChromeLauncher::new()),
            Arc::new(config),
            Arc::new(JitterDelay),
            Arc::new(StdinOperator),
        );
        Self::with_pipeline(pipeline)
    }
}

impl<F: SessionFactory> BatchCommand<F> {
    /// Creates a batch command over a prepared pipeline (for testing).
    pub fn with_pipeline(pipeline: ReviewPipeline<F>) -> Self {
        Self { pipeline, cancel: CancellationToken::new() }
    }

    /// Token that stops the batch; URLs not yet started are reported as cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the batch with the configured concurrency and formats a summary.
    pub async fn execute(&self, urls: &[String]) -> Result<String> {
        let config = self.pipeline.config();
        let results = self.run_batch(urls, config.concurrency).await;

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!("Batch finished: {} products, {} failed", results.len(), failed);

        let formatter = Formatter::new(config.format);
        Ok(formatter.format_results(&results))
    }

    /// Returns exactly one result per URL.
    ///
    /// With `concurrency <= 1` URLs run in input order with the politeness
    /// pause between them. Otherwise results come back in completion order.
    pub async fn run_batch(&self, urls: &[String], concurrency: usize) -> Vec<ParseResult> {
        info!("Processing {} products (concurrency {})", urls.len(), concurrency.max(1));
        if concurrency <= 1 {
            self.run_serial(urls).await
        } else {
            self.run_concurrent(urls, concurrency).await
        }
    }

    async fn run_serial(&self, urls: &[String]) -> Vec<ParseResult> {
        let pause = self.pipeline.config().batch_pause();
        let mut results = Vec::with_capacity(urls.len());

        for (index, url) in urls.iter().enumerate() {
            if self.cancel.is_cancelled() {
                results.push(ParseResult::cancelled(url));
                continue;
            }

            info!("[{}/{}] {}", index + 1, urls.len(), url);
            results.push(run_isolated(&self.pipeline, url).await);

            if index + 1 < urls.len() && !self.cancel.is_cancelled() {
                debug!("Pausing {}ms before next product", pause.as_millis());
                tokio::select! {
                    _ = self.pipeline.delay().sleep(pause) => {}
                    _ = self.cancel.cancelled() => info!("Batch cancelled during pause"),
                }
            }
        }
        results
    }

    async fn run_concurrent(&self, urls: &[String], concurrency: usize) -> Vec<ParseResult> {
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();

        for (index, url) in urls.iter().cloned().enumerate() {
            let pipeline = self.pipeline.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();

            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) if cancel.is_cancelled() => ParseResult::cancelled(&url),
                    Ok(_permit) => run_isolated(&pipeline, &url).await,
                    Err(e) => failed_result(&url, format!("worker pool closed: {}", e)),
                };
                (index, result)
            });
        }

        let mut finished = vec![false; urls.len()];
        let mut results = Vec::with_capacity(urls.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    finished[index] = true;
                    results.push(result);
                }
                Err(e) => error!("Worker task lost: {}", e),
            }
        }

        for (url, _) in urls.iter().zip(&finished).filter(|(_, done)| !**done) {
            results.push(failed_result(url, "worker task lost".to_string()));
        }
        results
    }
}

/// Runs one product, turning a panic anywhere in the pipeline into an error result.
async fn run_isolated<F: SessionFactory>(pipeline: &ReviewPipeline<F>, url: &str) -> ParseResult {
    match AssertUnwindSafe(pipeline.run(url)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => failed_result(url, panic_message(panic)),
    }
}

fn failed_result(url: &str, error: String) -> ParseResult {
    let now = Utc::now();
    ParseResult::failure(url, product_id_from_url(url), error, now, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{DriverResult, SnapshotFactory};
    use crate::config::OutputFormat;
    use crate::pacing::{DelayProvider, DelayRange};
    use crate::reviews::Operator;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct NoOperator;

    #[async_trait]
    impl Operator for NoOperator {
        async fn resolve_captcha(&self, _url: &str) -> DriverResult<()> {
            Ok(())
        }
    }

    /// Records requested pauses without waiting.
    #[derive(Default)]
    struct RecordingDelay {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl DelayProvider for RecordingDelay {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    fn product(id: u32) -> String {
        format!("https://shop.test/product/item-{id}/")
    }

    fn page(author: &str) -> String {
        format!(
            r#"<html><body><div data-widget="webReviews"><div class="review-item">
                <span class="author">{author}</span><p class="review-text">Exactly as described.</p>
            </div></div></body></html>"#
        )
    }

    fn test_config() -> ParserConfig {
        ParserConfig {
            headless: true,
            write_results: false,
            page_delay: DelayRange::zero(),
            review_delay: DelayRange::zero(),
            batch_pause_ms: 30_000,
            debug_dir: std::env::temp_dir(),
            screenshots_dir: std::env::temp_dir(),
            ..ParserConfig::default()
        }
    }

    fn factory(count: u32) -> SnapshotFactory {
        (1..=count).fold(SnapshotFactory::new(), |f, id| f.with_page(product(id), page(&format!("Buyer {id}"))))
    }

    fn command(
        factory: SnapshotFactory,
        config: ParserConfig,
        delay: Arc<dyn DelayProvider>,
    ) -> BatchCommand<SnapshotFactory> {
        let pipeline = ReviewPipeline::new(Arc::new(factory), Arc::new(config), delay, Arc::new(NoOperator));
        BatchCommand::with_pipeline(pipeline)
    }

    #[tokio::test]
    async fn test_serial_in_order_with_pauses_between() {
        let delay = Arc::new(RecordingDelay::default());
        let cmd = command(factory(3), test_config(), delay.clone());
        let urls: Vec<String> = (1..=3).map(product).collect();

        let results = cmd.run_batch(&urls, 1).await;
        let order: Vec<&str> = results.iter().map(|r| r.product_url.as_str()).collect();
        assert_eq!(order, urls.iter().map(String::as_str).collect::<Vec<_>>());
        assert!(results.iter().all(|r| r.is_success()));

        let pauses: Vec<Duration> = delay
            .sleeps
            .lock()
            .unwrap()
            .iter()
            .copied()
            .filter(|d| *d == Duration::from_secs(30))
            .collect();
        assert_eq!(pauses.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cmd = command(factory(2), test_config(), Arc::new(RecordingDelay::default()));
        cmd.cancellation_token().cancel();
        let urls: Vec<String> = (1..=2).map(product).collect();

        for concurrency in [1, 2] {
            let results = cmd.run_batch(&urls, concurrency).await;
            assert_eq!(results.len(), 2);
            assert!(results.iter().all(|r| r.error.as_deref() == Some(CANCELLED)));
        }
    }

    #[tokio::test]
    async fn test_cancel_interrupts_politeness_pause() {
        let config = ParserConfig { batch_pause_ms: 3_600_000, ..test_config() };
        let cmd = command(factory(3), config, Arc::new(JitterDelay));
        let token = cmd.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });

        let urls: Vec<String> = (1..=3).map(product).collect();
        let results = tokio::time::timeout(Duration::from_secs(10), cmd.run_batch(&urls, 1))
            .await
            .expect("pause was not interrupted");

        assert_eq!(results.len(), 3);
        assert!(results[0].is_success());
        assert_eq!(results[1].error.as_deref(), Some(CANCELLED));
        assert_eq!(results[2].error.as_deref(), Some(CANCELLED));
    }

    #[tokio::test]
    async fn test_concurrent_returns_one_result_per_url() {
        let cmd = command(factory(5), test_config(), Arc::new(RecordingDelay::default()));
        let mut urls: Vec<String> = (1..=5).map(product).collect();
        urls.push("https://shop.test/product/missing-99/".to_string());

        let results = cmd.run_batch(&urls, 3).await;
        assert_eq!(results.len(), 6);

        let mut seen: Vec<&str> = results.iter().map(|r| r.product_url.as_str()).collect();
        seen.sort();
        let mut expected: Vec<&str> = urls.iter().map(String::as_str).collect();
        expected.sort();
        assert_eq!(seen, expected);

        let failed: Vec<&ParseResult> = results.iter().filter(|r| !r.is_success()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].product_id, "99");
    }

    #[tokio::test]
    async fn test_execute_formats_summary() {
        let config = ParserConfig { format: OutputFormat::Csv, ..test_config() };
        let cmd = command(factory(1), config, Arc::new(RecordingDelay::default()));

        let output = cmd.execute(&[product(1)]).await.unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("https://shop.test/product/item-1/,1,1,"));
    }
}
