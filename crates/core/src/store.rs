use crate::error::StoreError;
use crate::models::{DocumentRecord, DocumentSummary};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// File-backed collection of [`DocumentRecord`]s.
///
/// The whole collection lives in one JSON file. Every mutation holds an
/// exclusive advisory lock on a sibling `.lock` file for the full
/// read-modify-write, writes the new collection to a uniquely named temp file
/// and renames it over the original. Writers in other processes are
/// serialized by the file lock; readers only ever see a complete collection.
#[derive(Debug)]
pub struct DocumentStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl DocumentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub async fn add(&self, record: DocumentRecord) -> Result<(), StoreError> {
        let _guard = self.lock.write().await;
        let total = self
            .mutate(move |path, records| {
                if records.iter().any(|existing| existing.id == record.id) {
                    return Err(StoreError::persistence(
                        path,
                        io::Error::new(
                            io::ErrorKind::AlreadyExists,
                            format!("record id {} already present", record.id),
                        ),
                    ));
                }
                records.push(record);
                Ok(records.len())
            })
            .await?;

        debug!(path = %self.path.display(), total, "document added");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<DocumentSummary>, StoreError> {
        let records = self.load_all().await?;
        Ok(records.iter().map(DocumentRecord::summary).collect())
    }

    /// Removes the record and then, best effort, the stored upload it points to.
    pub async fn delete(&self, id: &str) -> Result<DocumentRecord, StoreError> {
        let removed = {
            let _guard = self.lock.write().await;
            let id = id.to_string();
            self.mutate(move |_, records| {
                let position = records
                    .iter()
                    .position(|record| record.id == id)
                    .ok_or_else(|| StoreError::NotFound(id.clone()))?;
                Ok(records.remove(position))
            })
            .await?
        };

        if !removed.file_path.is_empty() {
            if let Err(error) = tokio::fs::remove_file(&removed.file_path).await {
                warn!(
                    id = %removed.id,
                    file_path = %removed.file_path,
                    %error,
                    "failed to remove stored upload"
                );
            }
        }

        info!(id = %removed.id, filename = %removed.filename, "document deleted");
        Ok(removed)
    }

    pub async fn load_all(&self) -> Result<Vec<DocumentRecord>, StoreError> {
        let _guard = self.lock.read().await;
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(StoreError::persistence(&self.path, error)),
        };
        parse_collection(&self.path, &bytes)
    }

    /// Runs `change` against the current collection under the cross-process
    /// lock and persists the result. Nothing is written if `change` fails.
    async fn mutate<T, F>(&self, change: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Path, &mut Vec<DocumentRecord>) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        let task_path = path.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StoreError> {
            let mut file_lock = fd_lock::RwLock::new(open_lock_file(&task_path)?);
            let _held = file_lock
                .write()
                .map_err(|error| StoreError::persistence(lock_path(&task_path), error))?;

            let mut records = read_collection_blocking(&task_path)?;
            let outcome = change(&task_path, &mut records)?;
            write_collection_blocking(&task_path, &records)?;
            Ok(outcome)
        })
        .await
        .map_err(|error| StoreError::persistence(path, io::Error::other(error)))?
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "documents.json".into());
    name.push(".lock");
    path.with_file_name(name)
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn open_lock_file(path: &Path) -> Result<File, StoreError> {
    let parent = parent_dir(path);
    fs::create_dir_all(parent).map_err(|error| StoreError::persistence(parent, error))?;

    let lock_path = lock_path(path);
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|error| StoreError::persistence(lock_path, error))
}

fn parse_collection(path: &Path, bytes: &[u8]) -> Result<Vec<DocumentRecord>, StoreError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    serde_json::from_slice(bytes).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn read_collection_blocking(path: &Path) -> Result<Vec<DocumentRecord>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => parse_collection(path, &bytes),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(error) => Err(StoreError::persistence(path, error)),
    }
}

fn write_collection_blocking(path: &Path, records: &[DocumentRecord]) -> Result<(), StoreError> {
    let payload = serde_json::to_vec_pretty(records).map_err(|error| {
        StoreError::persistence(path, io::Error::new(io::ErrorKind::InvalidData, error))
    })?;

    let parent = parent_dir(path);
    let mut temp = NamedTempFile::new_in(parent)
        .map_err(|error| StoreError::persistence(parent, error))?;
    temp.write_all(&payload)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|error| StoreError::persistence(temp.path(), error))?;

    temp.persist(path)
        .map_err(|error| StoreError::persistence(path, error.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn record(id: &str, file_path: &str) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            filename: format!("{id}.txt"),
            category: "general".to_string(),
            content: "Some text.".to_string(),
            chunks: vec!["Some text".to_string()],
            file_path: file_path.to_string(),
            created_at: Utc::now(),
            media_type: "text/plain".to_string(),
            checksum: String::new(),
        }
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty_collection() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = DocumentStore::new(dir.path().join("nested").join("documents.json"));

        assert!(store.load_all().await?.is_empty());
        assert!(store.list().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn add_persists_across_store_instances() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("data").join("documents.json");

        DocumentStore::new(&path).add(record("a", "")).await?;
        let reopened = DocumentStore::new(&path).load_all().await?;

        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened[0].id, "a");
        let mut leftovers: Vec<_> = std::fs::read_dir(dir.path().join("data"))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        leftovers.sort();
        assert_eq!(leftovers, vec!["documents.json", "documents.json.lock"]);
        Ok(())
    }

    #[tokio::test]
    async fn list_omits_content_and_file_path() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("documents.json");
        let store = DocumentStore::new(&path);
        store.add(record("a", "/tmp/a.txt")).await?;

        let summaries = store.list().await?;
        assert_eq!(summaries[0].chunks, vec!["Some text".to_string()]);

        let listed = serde_json::to_value(&summaries)?;
        assert!(listed[0].get("content").is_none());
        assert!(listed[0].get("filePath").is_none());
        assert!(listed[0].get("createdAt").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_record_and_stored_upload() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let upload = dir.path().join("a.txt");
        std::fs::write(&upload, b"Some text.")?;

        let store = DocumentStore::new(dir.path().join("documents.json"));
        store.add(record("a", &upload.to_string_lossy())).await?;
        store.add(record("b", "")).await?;

        let removed = store.delete("a").await?;
        assert_eq!(removed.id, "a");
        assert!(!upload.exists());

        let ids: Vec<_> = store.list().await?.into_iter().map(|doc| doc.id).collect();
        assert_eq!(ids, vec!["b".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn delete_unknown_id_is_not_found_and_changes_nothing(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("documents.json");
        let store = DocumentStore::new(&path);
        store.add(record("a", "")).await?;
        let before = std::fs::read(&path)?;

        let result = store.delete("missing").await;
        assert!(matches!(result, Err(StoreError::NotFound(id)) if id == "missing"));
        assert_eq!(std::fs::read(&path)?, before);
        Ok(())
    }

    #[tokio::test]
    async fn missing_upload_does_not_fail_delete() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = DocumentStore::new(dir.path().join("documents.json"));
        let gone = dir.path().join("never-written.pdf");
        store.add(record("a", &gone.to_string_lossy())).await?;

        store.delete("a").await?;
        assert!(store.list().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_and_is_not_overwritten(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("documents.json");
        std::fs::write(&path, b"{ not json")?;
        let store = DocumentStore::new(&path);

        assert!(matches!(store.load_all().await, Err(StoreError::Corrupt { .. })));
        assert!(store.add(record("a", "")).await.is_err());
        assert_eq!(std::fs::read(&path)?, b"{ not json");
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = DocumentStore::new(dir.path().join("documents.json"));
        store.add(record("a", "")).await?;

        assert!(store.add(record("a", "")).await.is_err());
        assert_eq!(store.load_all().await?.len(), 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_do_not_lose_updates() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = Arc::new(DocumentStore::new(dir.path().join("documents.json")));

        let mut handles = Vec::new();
        for index in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.add(record(&format!("doc-{index}"), "")).await
            }));
        }
        for handle in handles {
            handle.await??;
        }

        let mut ids: Vec<_> = store.list().await?.into_iter().map(|doc| doc.id).collect();
        ids.sort();
        let mut expected: Vec<_> = (0..16).map(|index| format!("doc-{index}")).collect();
        expected.sort();
        assert_eq!(ids, expected);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn separate_handles_on_one_file_do_not_lose_updates(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("documents.json");
        let handles = [
            Arc::new(DocumentStore::new(&path)),
            Arc::new(DocumentStore::new(&path)),
        ];

        let mut tasks = Vec::new();
        for index in 0..40 {
            let store = Arc::clone(&handles[index % 2]);
            tasks.push(tokio::spawn(async move {
                store.add(record(&format!("doc-{index}"), "")).await
            }));
        }
        for task in tasks {
            task.await??;
        }

        let reopened = DocumentStore::new(&path).load_all().await?;
        assert_eq!(reopened.len(), 40);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_see_complete_collections_during_writes(
    ) -> Result<(), Box<dyn std::error::Error>> {
        use std::sync::atomic::{AtomicBool, Ordering};

        let dir = tempdir()?;
        let path = dir.path().join("documents.json");
        let writer = Arc::new(DocumentStore::new(&path));
        let reader = DocumentStore::new(&path);
        let done = Arc::new(AtomicBool::new(false));

        let writers = {
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                let mut tasks = Vec::new();
                for index in 0..30 {
                    let store = Arc::clone(&writer);
                    tasks.push(tokio::spawn(async move {
                        store.add(record(&format!("doc-{index}"), "")).await
                    }));
                }
                let mut outcome = Ok(());
                for task in tasks {
                    match task.await {
                        Ok(Ok(())) => {}
                        Ok(Err(error)) => outcome = Err(error.to_string()),
                        Err(error) => outcome = Err(error.to_string()),
                    }
                }
                done.store(true, Ordering::SeqCst);
                outcome
            })
        };

        let mut last_len = 0;
        let mut reads = 0;
        loop {
            let finished = done.load(Ordering::SeqCst);
            let records = reader.load_all().await?;
            assert!(records.len() >= last_len);
            last_len = records.len();
            reads += 1;
            if finished {
                break;
            }
            tokio::task::yield_now().await;
        }

        writers.await??;
        assert!(reads > 0);
        assert_eq!(reader.load_all().await?.len(), 30);
        Ok(())
    }
}
