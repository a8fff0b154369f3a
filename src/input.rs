//! Loading product URL lists from delimited files.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

/// Reads product URLs from the first column of a comma-separated file.
///
/// Rows whose first field does not start with `http` (headers, blank lines,
/// comments) are skipped. Malformed rows are skipped too.
pub fn load_urls(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open URL list: {}", path.display()))?;

    let mut urls = Vec::new();
    let mut skipped = 0;
    for record in reader.records() {
        let Ok(record) = record else {
            skipped += 1;
            continue;
        };
        match record.get(0).map(str::trim) {
            Some(value) if value.starts_with("http") => urls.push(value.to_string()),
            _ => skipped += 1,
        }
    }

    debug!("Loaded {} URLs from {} ({} rows skipped)", urls.len(), path.display(), skipped);
    Ok(urls)
}
