use crate::extractor::media_type_for_path;
use crate::models::{DocumentRecord, IngestReceipt};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Every file under `folder` whose extension maps to a known media type,
/// sorted by path.
pub fn discover_supported_files(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| media_type_for_path(entry.path()).is_some())
        .map(|entry| entry.into_path())
        .collect();

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn generate_document_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Everything a record needs besides its id and timestamp.
#[derive(Debug, Clone)]
pub struct RecordParts {
    pub filename: String,
    pub category: String,
    pub media_type: String,
    pub content: String,
    pub chunks: Vec<String>,
    pub file_path: PathBuf,
    pub checksum: String,
}

pub fn build_record(id: String, parts: RecordParts) -> DocumentRecord {
    DocumentRecord {
        id,
        filename: parts.filename,
        category: parts.category,
        content: parts.content,
        chunks: parts.chunks,
        file_path: parts.file_path.to_string_lossy().to_string(),
        created_at: Utc::now(),
        media_type: parts.media_type,
        checksum: parts.checksum,
    }
}

#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct FolderIngestReport {
    pub receipts: Vec<IngestReceipt>,
    pub skipped_files: Vec<SkippedFile>,
}

impl FolderIngestReport {
    pub fn chunk_count(&self) -> usize {
        self.receipts.iter().map(|receipt| receipt.chunk_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn discovery_is_recursive_and_skips_unknown_extensions(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        fs::write(base.join("a.txt"), b"text")?;
        fs::write(base.join("logo.png"), b"png")?;
        fs::write(nested.join("b.pdf"), b"%PDF-1.4\n%fake")?;
        fs::write(nested.join("c.docx"), b"zip")?;

        let files = discover_supported_files(base);
        let names: Vec<_> = files
            .iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .collect();
        assert_eq!(names, vec!["a.txt", "b.pdf", "c.docx"]);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() {
        assert_eq!(digest_bytes(b"abc"), digest_bytes(b"abc"));
        assert_ne!(digest_bytes(b"abc"), digest_bytes(b"abd"));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(generate_document_id(), generate_document_id());
    }

    #[test]
    fn record_keeps_parts_and_stamps_creation_time() {
        let before = Utc::now();
        let record = build_record(
            "id-1".to_string(),
            RecordParts {
                filename: "a.txt".to_string(),
                category: "general".to_string(),
                media_type: "text/plain".to_string(),
                content: "One. Two.".to_string(),
                chunks: vec!["One. Two".to_string()],
                file_path: PathBuf::from("uploads/id-1-a.txt"),
                checksum: "abc".to_string(),
            },
        );

        assert_eq!(record.id, "id-1");
        assert_eq!(record.file_path, "uploads/id-1-a.txt");
        assert!(record.created_at >= before);
    }
}
