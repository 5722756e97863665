//! Job-scoped local files and their transfer to and from the blob store.
//!
//! Every local path is `{scratch}/{encoded job}_{role}{ext}`, so concurrently running
//! jobs can share one scratch directory without locking. A [`JobScratch`]
//! records each path before anything is written to it, which lets the
//! pipeline remove partial downloads as well as finished files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pivot_models::OutputDescriptor;
use pivot_storage::BlobStore;
use tracing::{debug, warn};

use crate::error::WorkerResult;

/// Role of a temp file within one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    Input,
    Output,
    /// Auxiliary asset such as cover art
    Cover,
}

impl FileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileRole::Input => "input",
            FileRole::Output => "output",
            FileRole::Cover => "cover",
        }
    }
}

/// File name prefix for a job id. Percent-encoding keeps distinct ids
/// distinct and leaves no path separators.
fn file_prefix(job_id: &str) -> String {
    urlencoding::encode(job_id).into_owned()
}

/// Deterministic output key for a job.
pub fn output_key(org_id: &str, job_id: &str, extension: &str) -> String {
    format!("outputs/{}/{}/output{}", org_id.trim(), job_id.trim(), extension)
}

/// Temp files created for one pipeline execution.
#[derive(Debug)]
pub struct JobScratch {
    dir: PathBuf,
    prefix: String,
    paths: Vec<PathBuf>,
}

impl JobScratch {
    /// Local path for `role`, registered for cleanup.
    pub fn path(&mut self, role: FileRole, extension: Option<&str>) -> PathBuf {
        let path = self.dir.join(format!(
            "{}_{}{}",
            self.prefix,
            role.as_str(),
            extension.unwrap_or("")
        ));
        if !self.paths.contains(&path) {
            self.paths.push(path.clone());
        }
        path
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// A downloaded file and the content type the store reported for it.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    pub mime_hint: Option<String>,
}

/// Moves job files between the scratch directory and the blob store.
#[derive(Clone)]
pub struct FileStager {
    store: Arc<dyn BlobStore>,
    scratch_dir: PathBuf,
}

impl FileStager {
    pub fn new(store: Arc<dyn BlobStore>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Create the scratch directory if needed.
    pub async fn ensure_scratch_dir(&self) -> WorkerResult<()> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        Ok(())
    }

    /// Start tracking the temp files of one job.
    pub fn scratch(&self, job_id: &str) -> JobScratch {
        JobScratch {
            dir: self.scratch_dir.clone(),
            prefix: file_prefix(job_id),
            paths: Vec::new(),
        }
    }

    /// Download `key` to the job-scoped path for `role`.
    ///
    /// The extension of the local file follows the key.
    pub async fn download(
        &self,
        scratch: &mut JobScratch,
        role: FileRole,
        key: &str,
    ) -> WorkerResult<StagedFile> {
        let extension = key_extension(key);
        let path = scratch.path(role, extension.as_deref());

        self.store.download(key, &path).await?;
        let head = self.store.head(key).await?;

        debug!(
            "Staged {} as {} ({} bytes)",
            key,
            path.display(),
            head.size_bytes
        );
        Ok(StagedFile {
            path,
            mime_hint: head.content_type,
        })
    }

    /// Upload a local output to `outputs/{org}/{job}/output{ext}`.
    ///
    /// Size and content type are read back from the store.
    pub async fn upload(
        &self,
        path: &Path,
        org_id: &str,
        job_id: &str,
        mime_type: &str,
        extension: &str,
    ) -> WorkerResult<OutputDescriptor> {
        let key = output_key(org_id, job_id, extension);
        self.store.upload(path, &key, mime_type).await?;
        let head = self.store.head(&key).await?;

        Ok(OutputDescriptor::new(
            key,
            head.content_type.unwrap_or_else(|| mime_type.to_string()),
            head.size_bytes,
        ))
    }

    /// Server-side copy of an unchanged input to the job's output key.
    pub async fn copy(
        &self,
        src_key: &str,
        org_id: &str,
        job_id: &str,
        mime_type: &str,
        extension: &str,
    ) -> WorkerResult<OutputDescriptor> {
        let key = output_key(org_id, job_id, extension);
        let size_bytes = self.store.copy(src_key, &key, mime_type).await?;
        Ok(OutputDescriptor::new(key, mime_type, size_bytes))
    }

    /// Remove temp files; missing files are ignored and failures only logged.
    pub async fn cleanup(&self, paths: &[PathBuf]) {
        for path in paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!("Removed temp file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove temp file {}: {}", path.display(), e),
            }
        }
    }
}

fn key_extension(key: &str) -> Option<String> {
    Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pivot_storage::{ObjectHead, StorageError, StorageResult};

    /// Store whose only object is `in/a.png`.
    struct OneObjectStore;

    #[async_trait]
    impl BlobStore for OneObjectStore {
        async fn head(&self, key: &str) -> StorageResult<ObjectHead> {
            match key {
                "in/a.png" => Ok(ObjectHead {
                    size_bytes: 4,
                    content_type: Some("image/png".to_string()),
                }),
                k if k.starts_with("outputs/") => Ok(ObjectHead {
                    size_bytes: 9,
                    content_type: None,
                }),
                _ => Err(StorageError::not_found(key)),
            }
        }

        async fn download(&self, key: &str, path: &Path) -> StorageResult<()> {
            if key != "in/a.png" {
                return Err(StorageError::not_found(key));
            }
            tokio::fs::write(path, b"data").await?;
            Ok(())
        }

        async fn upload(&self, _path: &Path, _key: &str, _content_type: &str) -> StorageResult<()> {
            Ok(())
        }

        async fn copy(&self, _src: &str, _dest: &str, _content_type: &str) -> StorageResult<u64> {
            Ok(4)
        }
    }

    #[test]
    fn test_paths_are_job_scoped() {
        let stager = FileStager::new(Arc::new(OneObjectStore), "/scratch");
        let mut a = stager.scratch("job-1");
        let mut b = stager.scratch("job/2");

        assert_eq!(
            a.path(FileRole::Input, Some(".png")),
            PathBuf::from("/scratch/job-1_input.png")
        );
        assert_eq!(
            b.path(FileRole::Output, Some(".mp3")),
            PathBuf::from("/scratch/job%2F2_output.mp3")
        );
        a.path(FileRole::Input, Some(".png"));
        assert_eq!(a.paths().len(), 1);
    }

    #[test]
    fn test_distinct_job_ids_never_share_paths() {
        let stager = FileStager::new(Arc::new(OneObjectStore), "/scratch");
        let ids = ["job/1", "job_1", "job 1", " job_1", "job%2F1", "job.1"];

        let paths: Vec<PathBuf> = ids
            .iter()
            .map(|id| stager.scratch(id).path(FileRole::Input, Some(".png")))
            .collect();

        for (i, a) in paths.iter().enumerate() {
            assert_eq!(a.parent(), Some(Path::new("/scratch")));
            for b in &paths[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_output_key() {
        assert_eq!(output_key("o1", "j1", ".png"), "outputs/o1/j1/output.png");
        assert_eq!(key_extension("in/Photo.JPG").as_deref(), Some(".jpg"));
        assert_eq!(key_extension("in/noext"), None);
    }

    #[tokio::test]
    async fn test_download_upload_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let stager = FileStager::new(Arc::new(OneObjectStore), dir.path());
        let mut scratch = stager.scratch("j1");

        let staged = stager
            .download(&mut scratch, FileRole::Input, "in/a.png")
            .await
            .unwrap();
        assert_eq!(staged.path, dir.path().join("j1_input.png"));
        assert_eq!(staged.mime_hint.as_deref(), Some("image/png"));

        let output = stager
            .upload(&staged.path, "o1", "j1", "image/webp", ".webp")
            .await
            .unwrap();
        assert_eq!(output.key, "outputs/o1/j1/output.webp");
        assert_eq!(output.mime_type, "image/webp");
        assert_eq!(output.size_bytes, 9);

        // Registered but never written.
        scratch.path(FileRole::Output, Some(".webp"));

        stager.cleanup(scratch.paths()).await;
        stager.cleanup(scratch.paths()).await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_object_is_registered_for_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let stager = FileStager::new(Arc::new(OneObjectStore), dir.path());
        let mut scratch = stager.scratch("j1");

        let err = stager
            .download(&mut scratch, FileRole::Input, "in/missing.png")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Object not found: in/missing.png");
        assert_eq!(scratch.paths().len(), 1);
    }
}
