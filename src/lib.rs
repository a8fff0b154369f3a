//! reviews-crawler - Resilient review scraper for marketplace product pages
//!
//! Drives a headless Chromium session through product pages, locates review
//! blocks with ordered selector ladders and records structured reviews per
//! product, capturing diagnostics whenever the page defeats extraction.

pub mod browser;
pub mod commands;
pub mod config;
pub mod format;
pub mod input;
pub mod output;
pub mod pacing;
pub mod reviews;

pub use config::ParserConfig;
pub use reviews::models::{ParseResult, ReviewRecord};
pub use reviews::SelectorLadder;
