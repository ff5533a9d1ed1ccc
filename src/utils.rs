//! Utility functions for logging, model output cleanup, and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - String truncation for log fields
//! - Extraction of a full HTML document from raw model output
//! - File system validation for the data directory

use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (on a character
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Pull a complete HTML document out of raw model output.
///
/// Models often wrap the document in a markdown code fence (```` ```html ````)
/// or add a sentence before it. Everything before the doctype / `<html` tag
/// and after the closing `</html>` is dropped.
///
/// # Returns
///
/// The document, or `None` if the output contains no `<html` element.
pub fn extract_html_document(raw: &str) -> Option<String> {
    let lower = raw.to_ascii_lowercase();
    let start = lower
        .find("<!doctype html")
        .or_else(|| lower.find("<html"))?;
    let end = lower
        .rfind("</html>")
        .map(|i| i + "</html>".len())
        .filter(|&end| end > start)
        .unwrap_or(raw.len());

    let document = raw[start..end].trim_end();
    let document = document.strip_suffix("```").unwrap_or(document).trim_end();
    Some(document.to_string())
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Data directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
