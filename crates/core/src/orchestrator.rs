use crate::augment::augment_answer;
use crate::blobs::BlobStore;
use crate::chunking::{chunk_by_sentence, ChunkingConfig};
use crate::error::{IngestError, StoreError};
use crate::extractor::{media_type_for_path, ExtractorRegistry};
use crate::ingest::{
    build_record, digest_bytes, discover_supported_files, generate_document_id,
    FolderIngestReport, RecordParts, SkippedFile,
};
use crate::models::{
    DocumentSummary, IngestReceipt, KnowledgeOptions, SearchQuery, SearchResponse, Upload,
    DEFAULT_AUGMENT_TIMEOUT,
};
use crate::search::{contributing_sources, search};
use crate::store::DocumentStore;
use crate::traits::AnswerAugmenter;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Entry point tying extraction, chunking, persistence, ranking and the
/// optional answer augmenter together.
pub struct KnowledgeBase {
    chunking: ChunkingConfig,
    extractors: ExtractorRegistry,
    store: DocumentStore,
    blobs: BlobStore,
    augmenter: Option<Box<dyn AnswerAugmenter>>,
    augment_timeout: Duration,
}

impl KnowledgeBase {
    pub fn new(options: &KnowledgeOptions) -> Result<Self, IngestError> {
        options.validate()?;
        Ok(Self {
            chunking: ChunkingConfig::from(options),
            extractors: ExtractorRegistry::with_defaults(),
            store: DocumentStore::new(options.documents_path()),
            blobs: BlobStore::new(options.uploads_dir()),
            augmenter: None,
            augment_timeout: DEFAULT_AUGMENT_TIMEOUT,
        })
    }

    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn with_augmenter<A>(mut self, augmenter: A, timeout: Duration) -> Self
    where
        A: AnswerAugmenter + 'static,
    {
        self.augmenter = Some(Box::new(augmenter));
        self.augment_timeout = timeout;
        self
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Extracts, chunks and persists one upload. Nothing is persisted unless
    /// every step succeeds.
    pub async fn ingest(&self, upload: Upload) -> Result<IngestReceipt, IngestError> {
        if upload.filename.trim().is_empty() {
            return Err(IngestError::InvalidArgument(
                "upload has no filename".to_string(),
            ));
        }

        let content = self
            .extractors
            .extract(&upload.bytes, &upload.media_type)
            .await?;
        let chunks = chunk_by_sentence(&content, self.chunking);
        let checksum = digest_bytes(&upload.bytes);
        self.warn_on_duplicate(&upload.filename, &checksum).await;

        let id = generate_document_id();
        let file_path = self
            .blobs
            .save(&id, &upload.filename, &upload.bytes)
            .await?;

        let chunk_count = chunks.len();
        let record = build_record(
            id.clone(),
            RecordParts {
                filename: upload.filename.clone(),
                category: upload.category,
                media_type: upload.media_type,
                content,
                chunks,
                file_path: file_path.clone(),
                checksum,
            },
        );

        if let Err(error) = self.store.add(record).await {
            if let Err(cleanup) = self.blobs.remove(&file_path).await {
                warn!(path = %file_path.display(), error = %cleanup, "failed to clean up upload");
            }
            return Err(error.into());
        }

        info!(%id, filename = %upload.filename, chunk_count, "document ingested");
        Ok(IngestReceipt {
            id,
            filename: upload.filename,
            chunk_count,
        })
    }

    /// Reads a file from disk and ingests it. The media type is taken from
    /// the extension unless given.
    pub async fn ingest_file(
        &self,
        path: &Path,
        category: &str,
        media_type: Option<&str>,
    ) -> Result<IngestReceipt, IngestError> {
        let media_type = match media_type {
            Some(declared) => declared.to_string(),
            None => media_type_for_path(path)
                .ok_or_else(|| {
                    IngestError::InvalidArgument(format!(
                        "cannot infer media type for {}",
                        path.display()
                    ))
                })?
                .to_string(),
        };

        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                IngestError::InvalidArgument(format!("path has no file name: {}", path.display()))
            })?
            .to_string();

        let bytes = tokio::fs::read(path).await?;
        self.ingest(Upload {
            filename,
            media_type,
            category: category.to_string(),
            bytes,
        })
        .await
    }

    /// Ingests every supported file under `folder`, recording failures
    /// instead of stopping at the first one.
    pub async fn ingest_folder(
        &self,
        folder: &Path,
        category: &str,
    ) -> Result<FolderIngestReport, IngestError> {
        let files = discover_supported_files(folder);
        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no supported documents found in {}",
                folder.display()
            )));
        }

        let mut report = FolderIngestReport::default();
        for path in files {
            match self.ingest_file(&path, category, None).await {
                Ok(receipt) => report.receipts.push(receipt),
                Err(error) => report.skipped_files.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                }),
            }
        }

        Ok(report)
    }

    pub async fn list(&self) -> Result<Vec<DocumentSummary>, StoreError> {
        self.store.list().await
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(id).await.map(|_| ())
    }

    /// Ranks stored chunks for the query. An unreadable store is searched as
    /// if it were empty; augmentation failures leave `answer` empty.
    pub async fn search(&self, query: &SearchQuery) -> SearchResponse {
        let corpus = match self.store.load_all().await {
            Ok(records) => records,
            Err(error) => {
                warn!(%error, "document store unreadable, searching an empty corpus");
                Vec::new()
            }
        };

        let results = search(query, &corpus);
        let sources = contributing_sources(&results);

        let answer = match &self.augmenter {
            Some(augmenter) => {
                augment_answer(
                    augmenter.as_ref(),
                    &query.text,
                    &results,
                    self.augment_timeout,
                )
                .await
            }
            None => None,
        };

        SearchResponse {
            query: query.text.clone(),
            results,
            sources,
            answer,
        }
    }

    async fn warn_on_duplicate(&self, filename: &str, checksum: &str) {
        let Ok(records) = self.store.load_all().await else {
            return;
        };

        if let Some(existing) = records.iter().find(|record| record.checksum == checksum) {
            warn!(
                filename,
                existing_id = %existing.id,
                existing_filename = %existing.filename,
                "uploaded bytes match an existing document"
            );
        }
    }
}
