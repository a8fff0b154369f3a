//! Failure captures: page markup and a screenshot, written for offline replay.

use crate::browser::BrowserSession;
use crate::config::ParserConfig;
use crate::output::write_unique;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Paths written by one capture; `None` where that capture failed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Capture {
    pub html: Option<PathBuf>,
    pub screenshot: Option<PathBuf>,
}

/// Writes diagnostics for failed products. Never used on the success path.
#[derive(Debug, Clone)]
pub struct DiagnosticsSink {
    debug_dir: PathBuf,
    screenshots_dir: PathBuf,
}

impl DiagnosticsSink {
    pub fn new(debug_dir: impl Into<PathBuf>, screenshots_dir: impl Into<PathBuf>) -> Self {
        Self { debug_dir: debug_dir.into(), screenshots_dir: screenshots_dir.into() }
    }

    pub fn from_config(config: &ParserConfig) -> Self {
        Self::new(&config.debug_dir, &config.screenshots_dir)
    }

    /// Dumps the page HTML and a full-page screenshot.
    ///
    /// Both writes are best effort and independent of each other. The HTML
    /// dump picks a free name first and the screenshot reuses its stem, so
    /// captures taken in the same millisecond never overwrite each other.
    pub async fn capture<S: BrowserSession>(&self, session: &S, product_id: &str) -> Capture {
        let mut stem = capture_stem(product_id);

        let html = match save_html(session, &self.debug_dir, &stem).await {
            Ok(path) => {
                if let Some(saved) = path.file_stem() {
                    stem = saved.to_string_lossy().into_owned();
                }
                Some(path)
            }
            Err(e) => {
                warn!("Could not save page HTML to {}: {:#}", self.debug_dir.display(), e);
                None
            }
        };

        let screenshot_path = self.screenshots_dir.join(format!("{}.png", stem));
        let screenshot = match session.screenshot(&screenshot_path).await {
            Ok(()) => Some(screenshot_path),
            Err(e) => {
                warn!("Could not save screenshot to {}: {}", screenshot_path.display(), e);
                None
            }
        };

        if let Some(path) = &html {
            info!("Saved failure page to {}", path.display());
        }
        Capture { html, screenshot }
    }
}

async fn save_html<S: BrowserSession>(session: &S, dir: &Path, stem: &str) -> anyhow::Result<PathBuf> {
    let source = session.page_source().await?;
    Ok(write_unique(dir, stem, "html", source.as_bytes()).await?)
}

fn capture_stem(product_id: &str) -> String {
    let id = if product_id.is_empty() { "unknown" } else { product_id };
    format!("error_{}_{}", id, Local::now().format("%Y%m%d_%H%M%S_%3f"))
}
