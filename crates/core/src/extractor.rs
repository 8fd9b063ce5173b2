use crate::error::ExtractError;
use crate::models::DocumentSource;
use crate::traits::PdfTextExtractor;
use async_trait::async_trait;
use lopdf::Document;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Reads PDF text with `lopdf`. Parsing runs on the blocking thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    pub fn extract_pages(&self, source: &DocumentSource) -> Result<Vec<PageText>, ExtractError> {
        let document = match source {
            DocumentSource::Path(path) => Document::load(path),
            DocumentSource::Bytes { data, .. } => Document::load_mem(data),
        }
        .map_err(|error| ExtractError::PdfParse(format!("{}: {error}", source.name())))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| ExtractError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(ExtractError::PdfParse(format!(
                "pdf had no readable page text: {}",
                source.name()
            )));
        }

        debug!(document = %source.name(), pages = pages.len(), "extracted pdf text");
        Ok(pages)
    }
}

#[async_trait]
impl PdfTextExtractor for LopdfExtractor {
    async fn extract_text(&self, source: &DocumentSource) -> Result<String, ExtractError> {
        let extractor = *self;
        let source = source.clone();
        let pages = tokio::task::spawn_blocking(move || extractor.extract_pages(&source))
            .await
            .map_err(|error| ExtractError::Task(error.to_string()))??;
        Ok(join_pages(&pages))
    }
}

pub fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|page| page.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn extract_page_texts(source: &DocumentSource) -> Result<Vec<PageText>, ExtractError> {
    LopdfExtractor.extract_pages(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn pages_are_joined_with_newlines() {
        let pages = vec![
            PageText {
                number: 1,
                text: "Section 1 Eligibility".to_string(),
            },
            PageText {
                number: 2,
                text: "Turnover shall be 10 Crore.".to_string(),
            },
        ];
        assert_eq!(
            join_pages(&pages),
            "Section 1 Eligibility\nTurnover shall be 10 Crore."
        );
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        let source = DocumentSource::Bytes {
            name: "broken.pdf".to_string(),
            data: b"%PDF-1.4\n%broken".to_vec(),
        };
        let result = extract_page_texts(&source);
        assert!(matches!(result, Err(ExtractError::PdfParse(_))));
    }

    #[tokio::test]
    async fn missing_file_fails_through_the_trait() {
        let source = DocumentSource::Path(PathBuf::from("/definitely/not/here.pdf"));
        let result = LopdfExtractor.extract_text(&source).await;
        assert!(result.is_err());
    }
}
