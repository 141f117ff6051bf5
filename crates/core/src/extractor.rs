use crate::error::IngestError;
use crate::metadata::extract_from_filename;
use crate::models::{ExtractionMethod, ManualMetadata, PageDocument};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

/// Average characters per page below which a PDF is assumed to be a
/// scan and sent down the OCR path.
pub const LOW_TEXT_THRESHOLD: usize = 100;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document = lopdf::Document::load(path)
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_number, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_number])
                .unwrap_or_default();
            pages.push(PageText {
                number: page_number,
                text,
            });
        }

        Ok(pages)
    }
}

/// Decides whether extracted text is too sparse to be usable. Empty
/// extraction counts as sparse.
pub fn needs_ocr(pages: &[PageText]) -> bool {
    if pages.is_empty() {
        return true;
    }
    let total_chars: usize = pages.iter().map(|page| page.text.chars().count()).sum();
    total_chars / pages.len() < LOW_TEXT_THRESHOLD
}

#[derive(Debug, Clone, Serialize)]
struct OcrRequest {
    pdf_base64: String,
    language: String,
    source_path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponse {
    pages: Option<Vec<OcrPage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrPage {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    text: Option<String>,
}

/// Client for an image-per-page OCR HTTP endpoint. Configured from the
/// environment; absence of the endpoint means OCR capability is
/// unavailable and the caller keeps the plain extraction.
pub struct OcrClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    language: String,
}

impl OcrClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, language: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
            language: language.into(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("MANUAL_OCR_ENDPOINT").ok()?;
        let endpoint = endpoint.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }

        let api_key = std::env::var("MANUAL_OCR_API_KEY").ok().and_then(|value| {
            let key = value.trim().to_string();
            if key.is_empty() {
                None
            } else {
                Some(key)
            }
        });

        let language = std::env::var("MANUAL_OCR_LANGUAGE").unwrap_or_else(|_| "ita".to_string());

        Some(Self::new(endpoint, api_key, language))
    }

    pub async fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let pdf = tokio::fs::read(path).await?;
        let payload = OcrRequest {
            pdf_base64: STANDARD.encode(pdf),
            language: self.language.clone(),
            source_path: path.to_string_lossy().to_string(),
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(IngestError::OcrFailed(format!(
                "ocr endpoint returned {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        let parsed: OcrResponse =
            serde_json::from_value(body).map_err(|error| IngestError::OcrFailed(error.to_string()))?;

        ocr_response_to_pages(&parsed, path)
    }
}

/// Only pages producing non-empty OCR text are kept. Falls back to a
/// single form-feed-separated text blob when the endpoint does not
/// report pages individually.
fn ocr_response_to_pages(response: &OcrResponse, path: &Path) -> Result<Vec<PageText>, IngestError> {
    if let Some(listed) = &response.pages {
        let pages: Vec<PageText> = listed
            .iter()
            .filter_map(|page| {
                let text = page.text.as_ref().map(|value| value.trim().to_string())?;
                if text.is_empty() {
                    return None;
                }
                Some(PageText {
                    number: page.page.unwrap_or(1),
                    text,
                })
            })
            .collect();

        if !pages.is_empty() {
            return Ok(pages);
        }
    }

    if let Some(raw) = &response.text {
        let pages: Vec<PageText> = raw
            .split('\u{000c}')
            .enumerate()
            .filter_map(|(index, block)| {
                let text = block.trim().to_string();
                if text.is_empty() {
                    return None;
                }
                Some(PageText {
                    number: (index + 1) as u32,
                    text,
                })
            })
            .collect();

        if !pages.is_empty() {
            return Ok(pages);
        }
    }

    Err(IngestError::OcrFailed(format!(
        "ocr produced no readable text for {}",
        path.display()
    )))
}

/// A manual loaded into per-page documents, tagged with the extraction
/// path that produced it so fallbacks stay observable.
#[derive(Debug, Clone)]
pub struct LoadedManual {
    pub pages: Vec<PageDocument>,
    pub method: ExtractionMethod,
}

fn base_metadata(path: &Path) -> Result<ManualMetadata, IngestError> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    let mut metadata = extract_from_filename(filename);
    metadata.source_path = path.to_string_lossy().to_string();
    Ok(metadata)
}

fn attach_metadata(pages: Vec<PageText>, metadata: &ManualMetadata, ocr: bool) -> Vec<PageDocument> {
    pages
        .into_iter()
        .map(|page| {
            let mut page_metadata = metadata.clone();
            page_metadata.page = page.number;
            page_metadata.ocr_processed = ocr;
            PageDocument {
                text: page.text,
                metadata: page_metadata,
            }
        })
        .collect()
}

/// Loads one manual into per-page documents. Plain text extraction
/// first; when the result looks like a scan and OCR is requested, the
/// whole file is re-read through the OCR endpoint. Without an OCR
/// client the plain result is kept and the method reports the absent
/// capability.
pub async fn load_manual(
    path: &Path,
    use_ocr: bool,
    ocr: Option<&OcrClient>,
) -> Result<LoadedManual, IngestError> {
    let metadata = base_metadata(path)?;
    info!(file = %metadata.filename, "loading manual");

    let extractor = LopdfExtractor;
    let pages = extractor.extract_pages(path)?;

    if use_ocr && needs_ocr(&pages) {
        match ocr {
            Some(client) => {
                info!(file = %metadata.filename, "low text density, switching to ocr");
                let ocr_pages = client.extract_pages(path).await?;
                return Ok(LoadedManual {
                    pages: attach_metadata(ocr_pages, &metadata, true),
                    method: ExtractionMethod::Ocr,
                });
            }
            None => {
                warn!(file = %metadata.filename, "ocr requested but no endpoint configured");
                return Ok(LoadedManual {
                    pages: attach_metadata(pages, &metadata, false),
                    method: ExtractionMethod::OcrUnavailable,
                });
            }
        }
    }

    Ok(LoadedManual {
        pages: attach_metadata(pages, &metadata, false),
        method: ExtractionMethod::PlainText,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: u32, text: &str) -> PageText {
        PageText {
            number,
            text: text.to_string(),
        }
    }

    #[test]
    fn dense_text_does_not_trigger_ocr() {
        let pages = vec![page(1, &"Procedura di serraggio. ".repeat(10))];
        assert!(!needs_ocr(&pages));
    }

    #[test]
    fn sparse_or_empty_extraction_triggers_ocr() {
        assert!(needs_ocr(&[]));
        assert!(needs_ocr(&[page(1, "p. 3"), page(2, "")]));
    }

    #[test]
    fn average_is_measured_across_the_whole_document() {
        // One dense page does not rescue an otherwise empty scan.
        let mut pages = vec![page(1, &"a".repeat(300))];
        for number in 2..=10 {
            pages.push(page(number, ""));
        }
        assert!(needs_ocr(&pages));
    }

    #[test]
    fn ocr_response_keeps_only_nonempty_pages() {
        let response = OcrResponse {
            pages: Some(vec![
                OcrPage {
                    page: Some(2),
                    text: Some("   ".to_string()),
                },
                OcrPage {
                    page: Some(3),
                    text: Some("Pagina 3".to_string()),
                },
            ]),
            text: None,
        };

        let pages = ocr_response_to_pages(&response, Path::new("scan.pdf")).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 3);
        assert_eq!(pages[0].text, "Pagina 3");
    }

    #[test]
    fn ocr_response_falls_back_to_form_feed_blob() {
        let response = OcrResponse {
            pages: None,
            text: Some("Prima\u{000c}Seconda\n".to_string()),
        };

        let pages = ocr_response_to_pages(&response, Path::new("scan.pdf")).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[1].text, "Seconda");
    }

    #[test]
    fn empty_ocr_response_is_an_error() {
        let response = OcrResponse {
            pages: None,
            text: Some("\u{000c}\u{000c}".to_string()),
        };
        assert!(ocr_response_to_pages(&response, Path::new("scan.pdf")).is_err());
    }

    #[test]
    fn attached_metadata_carries_page_numbers_and_ocr_flag() {
        let metadata = extract_from_filename("FIAT_500_2020_Manuale_Officina.pdf");
        let documents = attach_metadata(vec![page(4, "testo")], &metadata, true);
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].metadata.page, 4);
        assert!(documents[0].metadata.ocr_processed);
        assert_eq!(documents[0].metadata.brand.as_deref(), Some("FIAT"));
    }
}
