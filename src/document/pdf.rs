// src/document/pdf.rs

use std::path::Path;

use once_cell::sync::Lazy;
use pdf_extract::extract_text;
use regex::Regex;

use crate::{Error, Result};

static PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

pub struct PdfExtractor;

impl PdfExtractor {
    /// Extract cleaned text from a PDF file.
    pub fn extract(pdf_path: impl AsRef<Path>) -> Result<String> {
        let pdf_path = pdf_path.as_ref();
        let extracted_text = extract_text(pdf_path).map_err(|e| {
            Error::Extraction(format!(
                "failed to extract text from {}: {e}",
                pdf_path.display()
            ))
        })?;
        Ok(Self::clean_text(&extracted_text))
    }

    /// Normalize raw extraction output: trimmed lines, no standalone page
    /// numbers, at most one blank line between paragraphs. Headings and
    /// all-caps lines are kept; in legal documents those carry the issuing
    /// body and the document title.
    pub fn clean_text(text: &str) -> String {
        let mut cleaned_lines: Vec<&str> = Vec::new();
        let mut blank_pending = false;
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                blank_pending = !cleaned_lines.is_empty();
                continue;
            }
            if PAGE_NUMBER.is_match(trimmed) {
                continue;
            }
            if blank_pending {
                cleaned_lines.push("");
                blank_pending = false;
            }
            cleaned_lines.push(trimmed);
        }
        cleaned_lines.join("\n")
    }
}
