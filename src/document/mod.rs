// src/document/mod.rs
//
// Document conversion: turn scanned/digitized legal PDFs into cleaned text
// files ready for dataset construction. A failing or empty document is
// logged and skipped; one bad PDF must not abort a directory run.

pub mod pdf;

pub use pdf::PdfExtractor;

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::Result;

/// Find all files with the given extension in a directory tree, sorted by
/// path so conversion runs are deterministic.
fn find_files_by_extension(base_dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(base_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case(extension))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Convert every `.pdf` under `input_dir` (recursively) to a `.txt` with the
/// same stem under `output_dir`. Returns the number of files converted.
pub fn convert_pdf_dir(input_dir: &Path, output_dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(output_dir)?;

    let pdf_files = find_files_by_extension(input_dir, "pdf");

    let mut converted = 0;
    for pdf_path in &pdf_files {
        let stem = pdf_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        let output_path = output_dir.join(format!("{stem}.txt"));

        let text = match PdfExtractor::extract(pdf_path) {
            Ok(text) => text,
            Err(err) => {
                error!("failed to process {}: {err}", pdf_path.display());
                continue;
            }
        };
        if text.trim().is_empty() {
            warn!("empty content extracted from {}", pdf_path.display());
            continue;
        }

        std::fs::write(&output_path, &text)?;
        info!("converted {} -> {}", pdf_path.display(), output_path.display());
        converted += 1;
    }
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_dir_converts_nothing() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let count = convert_pdf_dir(input.path(), output.path()).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_find_files_recurses_and_filters_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("2024")).unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"").unwrap();
        std::fs::write(dir.path().join("2024/b.PDF"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let files = find_files_by_extension(dir.path(), "pdf");
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| p.extension().is_some()));
    }

    #[test]
    fn test_invalid_pdf_is_skipped_not_fatal() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        std::fs::write(input.path().join("broken.pdf"), b"not a pdf").unwrap();

        let count = convert_pdf_dir(input.path(), output.path()).unwrap();
        assert_eq!(count, 0);
        assert!(!output.path().join("broken.txt").exists());
    }
}
