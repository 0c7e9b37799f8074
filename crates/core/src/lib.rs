pub mod augment;
pub mod blobs;
pub mod chunking;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod search;
pub mod store;
pub mod traits;

pub use augment::{augment_answer, build_context, HttpAugmenter, SYSTEM_INSTRUCTION};
pub use blobs::BlobStore;
pub use chunking::{chunk_by_sentence, normalize_whitespace, split_sentences, ChunkingConfig};
pub use error::{AugmentError, ExtractError, IngestError, StoreError};
pub use extractor::{
    media_type_for_path, DocxExtractor, ExtractorRegistry, OcrEndpointConfig, PdfExtractor,
    PlainTextExtractor, DEFAULT_OCR_TIMEOUT,
};
pub use ingest::{discover_supported_files, FolderIngestReport, SkippedFile};
pub use models::{
    AugmenterConfig, DocumentRecord, DocumentSummary, IngestReceipt, KnowledgeOptions,
    SearchQuery, SearchResponse, SearchResult, Upload, DEFAULT_MAX_CHUNK_CHARS,
    DEFAULT_SEARCH_LIMIT,
};
pub use orchestrator::KnowledgeBase;
pub use search::{contributing_sources, search};
pub use store::DocumentStore;
pub use traits::{AnswerAugmenter, ContentExtractor};
