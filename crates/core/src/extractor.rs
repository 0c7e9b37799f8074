use crate::error::ExtractError;
use crate::traits::ContentExtractor;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const MEDIA_TYPE_TEXT: &str = "text/plain";
pub const MEDIA_TYPE_MARKDOWN: &str = "text/markdown";
pub const MEDIA_TYPE_CSV: &str = "text/csv";
pub const MEDIA_TYPE_PDF: &str = "application/pdf";
pub const MEDIA_TYPE_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

pub const DEFAULT_OCR_TIMEOUT: Duration = Duration::from_secs(30);

/// Maps a file extension to the media type its bytes are extracted as.
pub fn media_type_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "txt" | "text" => Some(MEDIA_TYPE_TEXT),
        "md" | "markdown" => Some(MEDIA_TYPE_MARKDOWN),
        "csv" => Some(MEDIA_TYPE_CSV),
        "pdf" => Some(MEDIA_TYPE_PDF),
        "docx" => Some(MEDIA_TYPE_DOCX),
        _ => None,
    }
}

fn normalize_media_type(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Media type to extractor table.
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn ContentExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Plain text, PDF and DOCX extractors. PDF OCR fallback is enabled when
    /// `LLM_OCR_ENDPOINT` is set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PlainTextExtractor);
        registry.register(PdfExtractor::from_env());
        registry.register(DocxExtractor);
        registry
    }

    pub fn register<E: ContentExtractor + 'static>(&mut self, extractor: E) {
        let extractor: Arc<dyn ContentExtractor> = Arc::new(extractor);
        for media_type in extractor.supported_types() {
            self.extractors
                .insert(normalize_media_type(media_type), Arc::clone(&extractor));
        }
    }

    pub fn supports(&self, media_type: &str) -> bool {
        self.extractors
            .contains_key(&normalize_media_type(media_type))
    }

    pub async fn extract(&self, bytes: &[u8], media_type: &str) -> Result<String, ExtractError> {
        let normalized = normalize_media_type(media_type);
        let extractor = self
            .extractors
            .get(&normalized)
            .ok_or_else(|| ExtractError::UnsupportedType(media_type.to_string()))?;

        debug!(media_type = %normalized, bytes = bytes.len(), "extracting content");
        extractor.extract(bytes).await
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

#[async_trait]
impl ContentExtractor for PlainTextExtractor {
    fn supported_types(&self) -> &[&'static str] {
        &[MEDIA_TYPE_TEXT, MEDIA_TYPE_MARKDOWN, MEDIA_TYPE_CSV]
    }

    async fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|error| ExtractError::ExtractionFailure(format!("invalid utf-8: {error}")))?;
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DocxExtractor;

#[async_trait]
impl ContentExtractor for DocxExtractor {
    fn supported_types(&self) -> &[&'static str] {
        &[MEDIA_TYPE_DOCX]
    }

    async fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        parse_off_runtime(bytes, extract_docx_text).await
    }
}

/// Runs a CPU-bound parser on the blocking pool.
async fn parse_off_runtime<F>(bytes: &[u8], parse: F) -> Result<String, ExtractError>
where
    F: FnOnce(&[u8]) -> Result<String, ExtractError> + Send + 'static,
{
    let owned = bytes.to_vec();
    tokio::task::spawn_blocking(move || parse(&owned))
        .await
        .map_err(|error| ExtractError::ExtractionFailure(format!("parser task failed: {error}")))?
}

fn extract_docx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let docx = docx_rs::read_docx(bytes)
        .map_err(|error| ExtractError::ExtractionFailure(format!("docx parse error: {error}")))?;

    let mut paragraphs = Vec::new();
    for child in docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            let mut line = String::new();
            for child in paragraph.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(text) = child {
                            line.push_str(&text.text);
                        }
                    }
                }
            }
            paragraphs.push(line);
        }
    }

    Ok(paragraphs.join("\n"))
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl OcrEndpointConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout: DEFAULT_OCR_TIMEOUT,
        }
    }

    /// Reads `LLM_OCR_ENDPOINT`, `LLM_OCR_API_KEY` and `LLM_OCR_TIMEOUT_SECS`.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("LLM_OCR_ENDPOINT").ok()?;
        let endpoint = endpoint.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }

        let api_key = std::env::var("LLM_OCR_API_KEY").ok().and_then(|value| {
            let key = value.trim().to_string();
            if key.is_empty() {
                None
            } else {
                Some(key)
            }
        });

        let timeout = std::env::var("LLM_OCR_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map_or(DEFAULT_OCR_TIMEOUT, Duration::from_secs);

        Some(Self {
            endpoint,
            api_key,
            timeout,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct LlmOcrRequest {
    pdf_base64: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrResponse {
    pages: Option<Vec<LlmOcrPage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrPage {
    #[serde(default)]
    text: Option<String>,
}

/// PDF text-layer extraction, optionally falling back to a multimodal OCR
/// service for scanned documents.
#[derive(Default)]
pub struct PdfExtractor {
    ocr: Option<OcrFallback>,
}

struct OcrFallback {
    client: Client,
    config: OcrEndpointConfig,
}

impl PdfExtractor {
    pub fn new(ocr: Option<OcrEndpointConfig>) -> Result<Self, ExtractError> {
        let ocr = match ocr {
            Some(config) => {
                let client = Client::builder().timeout(config.timeout).build()?;
                Some(OcrFallback { client, config })
            }
            None => None,
        };
        Ok(Self { ocr })
    }

    /// OCR fallback configured from the environment, or none if the client
    /// cannot be built.
    pub fn from_env() -> Self {
        match Self::new(OcrEndpointConfig::from_env()) {
            Ok(extractor) => extractor,
            Err(error) => {
                warn!(%error, "multimodal OCR fallback disabled");
                Self::default()
            }
        }
    }
}

impl OcrFallback {
    async fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let cfg = &self.config;
        let payload = LlmOcrRequest {
            pdf_base64: STANDARD.encode(bytes),
        };

        let mut request = self
            .client
            .post(&cfg.endpoint)
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &cfg.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ExtractError::Ocr(format!(
                "request to {} returned {}",
                cfg.endpoint,
                response.status()
            )));
        }

        let payload: LlmOcrResponse = response.json().await?;
        ocr_payload_to_text(&payload)
    }
}

#[async_trait]
impl ContentExtractor for PdfExtractor {
    fn supported_types(&self) -> &[&'static str] {
        &[MEDIA_TYPE_PDF]
    }

    async fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let parse_error = match parse_off_runtime(bytes, extract_pdf_text_layer).await {
            Ok(text) => return Ok(text),
            Err(error) => error,
        };

        let Some(ocr) = &self.ocr else {
            return Err(parse_error);
        };

        warn!(error = %parse_error, "pdf text layer unusable, trying multimodal OCR");
        ocr.extract(bytes).await.map_err(|ocr_error| {
            ExtractError::ExtractionFailure(format!(
                "{parse_error}; multimodal OCR fallback failed: {ocr_error}"
            ))
        })
    }
}

fn extract_pdf_text_layer(bytes: &[u8]) -> Result<String, ExtractError> {
    let document = Document::load_mem(bytes)
        .map_err(|error| ExtractError::ExtractionFailure(format!("pdf parse error: {error}")))?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| ExtractError::ExtractionFailure(format!("pdf parse error: {error}")))?;

        if !text.trim().is_empty() {
            pages.push(text);
        }
    }

    if pages.is_empty() {
        return Err(ExtractError::ExtractionFailure(
            "pdf had no readable page text".to_string(),
        ));
    }

    Ok(pages.join("\n"))
}

fn ocr_payload_to_text(payload: &LlmOcrResponse) -> Result<String, ExtractError> {
    let from_pages = payload
        .pages
        .iter()
        .flatten()
        .filter_map(|page| page.text.as_deref().map(str::trim))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>();

    if !from_pages.is_empty() {
        return Ok(from_pages.join("\n"));
    }

    let from_text = payload
        .text
        .iter()
        .flat_map(|raw| raw.split('\u{000c}'))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>();

    if !from_text.is_empty() {
        return Ok(from_text.join("\n"));
    }

    Err(ExtractError::Ocr("response has no readable text".to_string()))
}
