//! Collision-free creation of result and diagnostics files.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Numbered alternatives tried after `<stem>.<ext>` is taken.
const MAX_SUFFIX: u32 = 999;

/// Creates `<stem>.<ext>` in `dir`, falling back to `<stem>_1.<ext>`, `<stem>_2.<ext>`, ...
///
/// Creation is exclusive, so two concurrent callers with the same stem
/// always end up with different files.
pub async fn create_unique(dir: &Path, stem: &str, ext: &str) -> io::Result<(PathBuf, File)> {
    for suffix in 0..=MAX_SUFFIX {
        let name = match suffix {
            0 => format!("{stem}.{ext}"),
            n => format!("{stem}_{n}.{ext}"),
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {}.{} in {}", stem, ext, dir.display()),
    ))
}

/// Writes `contents` to a new file named after `stem`; returns the path used.
pub async fn write_unique(dir: &Path, stem: &str, ext: &str, contents: &[u8]) -> io::Result<PathBuf> {
    let (path, mut file) = create_unique(dir, stem, ext).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    Ok(path)
}
