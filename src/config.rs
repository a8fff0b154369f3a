//! Configuration management with TOML, environment variables, and CLI overrides.

use crate::pacing::DelayRange;
use crate::reviews::ladder::SelectorLadder;
use crate::reviews::selectors::{navigation, obstacles, review};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Parser configuration with layered loading.
///
/// Built once at startup and shared read-only (behind an `Arc`) by every
/// pipeline and worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Run the browser without a window
    #[serde(default)]
    pub headless: bool,

    /// Browser viewport width in pixels
    #[serde(default = "default_window_width")]
    pub window_width: u32,

    /// Browser viewport height in pixels
    #[serde(default = "default_window_height")]
    pub window_height: u32,

    /// User agent presented to the marketplace
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum number of review pages read per product
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Pause after page-level actions (navigation, pagination, obstacle checks)
    #[serde(default = "default_page_delay")]
    pub page_delay: DelayRange,

    /// Short pause after element-level actions (scrolls, clicks)
    #[serde(default = "default_review_delay")]
    pub review_delay: DelayRange,

    /// Politeness pause between products in serial mode
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,

    /// Number of products processed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Directory for per-product JSON results
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory for failure screenshots
    #[serde(default = "default_screenshots_dir")]
    pub screenshots_dir: PathBuf,

    /// Directory for failure HTML dumps
    #[serde(default = "default_debug_dir")]
    pub debug_dir: PathBuf,

    /// Bound on page loads and the initial root-marker wait
    #[serde(default = "default_page_load_timeout_secs")]
    pub page_load_timeout_secs: u64,

    /// Bound on waits for content after in-page navigation
    #[serde(default = "default_element_wait_timeout_secs")]
    pub element_wait_timeout_secs: u64,

    /// Query used to open the reviews tab when no link is found
    #[serde(default = "default_reviews_tab_query")]
    pub reviews_tab_query: String,

    /// Write one JSON document per product
    #[serde(default = "default_true")]
    pub write_results: bool,

    /// Summary output format
    #[serde(default)]
    pub format: OutputFormat,

    #[serde(default)]
    pub selectors: SelectorConfig,
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

fn default_max_pages() -> u32 {
    10
}

fn default_page_delay() -> DelayRange {
    DelayRange::new(2000, 5000)
}

fn default_review_delay() -> DelayRange {
    DelayRange::new(500, 1500)
}

fn default_batch_pause_ms() -> u64 {
    30_000
}

fn default_concurrency() -> usize {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_screenshots_dir() -> PathBuf {
    PathBuf::from("screenshots")
}

fn default_debug_dir() -> PathBuf {
    PathBuf::from("debug")
}

fn default_page_load_timeout_secs() -> u64 {
    30
}

fn default_element_wait_timeout_secs() -> u64 {
    15
}

fn default_reviews_tab_query() -> String {
    navigation::REVIEWS_TAB_QUERY.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            window_width: default_window_width(),
            window_height: default_window_height(),
            user_agent: default_user_agent(),
            max_pages: default_max_pages(),
            page_delay: default_page_delay(),
            review_delay: default_review_delay(),
            batch_pause_ms: default_batch_pause_ms(),
            concurrency: default_concurrency(),
            output_dir: default_output_dir(),
            screenshots_dir: default_screenshots_dir(),
            debug_dir: default_debug_dir(),
            page_load_timeout_secs: default_page_load_timeout_secs(),
            element_wait_timeout_secs: default_element_wait_timeout_secs(),
            reviews_tab_query: default_reviews_tab_query(),
            write_results: true,
            format: OutputFormat::Table,
            selectors: SelectorConfig::default(),
        }
    }
}

impl ParserConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads configuration with fallback to default locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        let local_config = Path::new("config.toml");
        if local_config.exists() {
            debug!("Found config.toml in current directory");
            return Self::from_file(local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("reviews-crawler").join("config.toml");
            if xdg_config.exists() {
                debug!("Found config in XDG config directory");
                return Self::from_file(xdg_config);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Applies environment variable overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(headless) = std::env::var("REVIEWS_HEADLESS") {
            if let Some(h) = parse_flag(&headless) {
                self.headless = h;
            }
        }

        if let Ok(concurrency) = std::env::var("REVIEWS_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                self.concurrency = c;
            }
        }

        if let Ok(dir) = std::env::var("REVIEWS_OUTPUT_DIR") {
            if !dir.is_empty() {
                self.output_dir = PathBuf::from(dir);
            }
        }

        if let Ok(agent) = std::env::var("REVIEWS_USER_AGENT") {
            if !agent.is_empty() {
                self.user_agent = agent;
            }
        }

        self
    }

    /// Creates the output, screenshot and debug directories.
    ///
    /// Idempotent; call once at process start, not per pipeline.
    pub fn prepare_dirs(&self) -> Result<()> {
        for dir in [&self.output_dir, &self.screenshots_dir, &self.debug_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn element_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.element_wait_timeout_secs)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Selector ladders for every semantic field, each independently overridable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub containers: SelectorLadder,
    pub review_items: SelectorLadder,
    pub author: SelectorLadder,
    pub rating: SelectorLadder,
    /// Filled-star marker counted inside a rating element
    pub stars: String,
    pub text: SelectorLadder,
    pub date: SelectorLadder,
    pub reviews_link: SelectorLadder,
    pub next_page: SelectorLadder,
    pub captcha: SelectorLadder,
    pub cookie_consent: SelectorLadder,
    /// Present once the document has rendered
    pub root_marker: String,
    /// Blocks considered by the generic container heuristic
    pub generic_block: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            containers: review::CONTAINERS.into(),
            review_items: review::ITEMS.into(),
            author: review::AUTHOR.into(),
            rating: review::RATING.into(),
            stars: review::FILLED_STAR.to_string(),
            text: review::TEXT.into(),
            date: review::DATE.into(),
            reviews_link: navigation::REVIEWS_LINK.into(),
            next_page: navigation::NEXT_PAGE.into(),
            captcha: obstacles::CAPTCHA.into(),
            cookie_consent: obstacles::COOKIE_CONSENT.into(),
            root_marker: navigation::ROOT_MARKER.to_string(),
            generic_block: review::GENERIC_BLOCK.to_string(),
        }
    }
}

impl SelectorConfig {
    /// Named ladders in display order.
    pub fn ladders(&self) -> Vec<(&'static str, &SelectorLadder)> {
        vec![
            ("containers", &self.containers),
            ("review_items", &self.review_items),
            ("author", &self.author),
            ("rating", &self.rating),
            ("text", &self.text),
            ("date", &self.date),
            ("reviews_link", &self.reviews_link),
            ("next_page", &self.next_page),
            ("captcha", &self.captcha),
            ("cookie_consent", &self.cookie_consent),
        ]
    }

    /// Renders the effective ladders for the `selectors` command.
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        for (name, ladder) in self.ladders() {
            lines.push(format!("{}:", name));
            for (rank, selector) in ladder.strategies().iter().enumerate() {
                lines.push(format!("  {:>2}. {}", rank + 1, selector));
            }
        }
        lines.push(format!("stars:         {}", self.stars));
        lines.push(format!("root_marker:   {}", self.root_marker));
        lines.push(format!("generic_block: {}", self.generic_block));
        lines.join("\n")
    }
}

/// Output format for batch summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Markdown,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use: table, json, markdown, csv", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}
