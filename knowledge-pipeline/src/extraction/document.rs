use std::path::Path;

use common::error::AppError;
use lopdf::Document;
use tracing::debug;

/// Extracts the text layer of a PDF page by page, falling back to `pdf-extract` when some
/// page could not be decoded and nothing else was found. A document without a text layer
/// yields an empty string.
pub async fn extract_document_text(path: &Path) -> Result<String, AppError> {
    let pdf_bytes = tokio::fs::read(path).await?;

    let text = tokio::task::spawn_blocking(move || -> Result<String, AppError> {
        let per_page = match Document::load_mem(&pdf_bytes) {
            Ok(document) => Some(text_by_page(&document)),
            Err(err) => {
                debug!(error = %err, "lopdf could not parse document, trying pdf-extract");
                None
            }
        };
        if let Some(pages) = per_page
            .as_ref()
            .filter(|pages| !pages.text.is_empty() || pages.unreadable == 0)
        {
            return Ok(pages.text.clone());
        }

        match pdf_extract::extract_text_from_mem(&pdf_bytes) {
            Ok(text) => Ok(text.trim().to_string()),
            // A well-formed document without a text layer is empty, not broken.
            Err(err) if per_page.is_some() => {
                debug!(error = %err, "pdf-extract found no text in a readable document");
                Ok(String::new())
            }
            Err(err) => Err(AppError::Processing(format!(
                "Failed to extract text from PDF: {err}"
            ))),
        }
    })
    .await??;

    Ok(text)
}

struct PageText {
    text: String,
    unreadable: usize,
}

fn text_by_page(document: &Document) -> PageText {
    let mut page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    page_numbers.sort_unstable();

    let mut unreadable = 0usize;
    let mut pages = Vec::with_capacity(page_numbers.len());
    for page in page_numbers {
        match document.extract_text(&[page]) {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    pages.push(text.to_string());
                }
            }
            Err(err) => {
                debug!(page, error = %err, "page text could not be decoded");
                unreadable = unreadable.saturating_add(1);
            }
        }
    }

    PageText {
        text: pages.join("\n").trim().to_string(),
        unreadable,
    }
}
