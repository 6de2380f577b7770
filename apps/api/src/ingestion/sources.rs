//! Where resume PDFs come from: a local directory or an S3 prefix.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("folder not found: {0}")]
    FolderNotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("remote storage error: {0}")]
    Remote(String),

    #[error("folder '{0}' must be a relative path inside the resume folder")]
    OutsideRoot(String),
}

/// A listed document: `file_name` is what gets stored as provenance,
/// `locator` is what `fetch` needs to read it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub file_name: String,
    pub locator: String,
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Human-readable origin, used in logs.
    fn describe(&self) -> String;

    /// PDF documents in the source, sorted by file name.
    async fn list(&self) -> Result<Vec<DocumentRef>, SourceError>;

    async fn fetch(&self, document: &DocumentRef) -> Result<Bytes, SourceError>;
}

fn is_pdf(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".pdf")
}

pub struct LocalFolderSource {
    root: PathBuf,
}

impl LocalFolderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `root` itself, or `subfolder` resolved inside it. Absolute paths,
    /// `..` components and symlinks leading out of `root` are rejected.
    pub async fn within(
        root: impl Into<PathBuf>,
        subfolder: Option<&str>,
    ) -> Result<Self, SourceError> {
        let root = root.into();
        let Some(requested) = subfolder.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(Self::new(root));
        };

        let relative = Path::new(requested);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !plain {
            return Err(SourceError::OutsideRoot(requested.to_string()));
        }

        let folder = root.join(relative);
        // A folder that does not exist yet surfaces as FolderNotFound on list.
        if let (Ok(real_root), Ok(real_folder)) = (
            tokio::fs::canonicalize(&root).await,
            tokio::fs::canonicalize(&folder).await,
        ) {
            if !real_folder.starts_with(&real_root) {
                return Err(SourceError::OutsideRoot(requested.to_string()));
            }
        }
        Ok(Self::new(folder))
    }
}

#[async_trait]
impl DocumentSource for LocalFolderSource {
    fn describe(&self) -> String {
        format!("local folder {}", self.root.display())
    }

    async fn list(&self) -> Result<Vec<DocumentRef>, SourceError> {
        let io_error = |source| SourceError::Io {
            path: self.root.display().to_string(),
            source,
        };

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::FolderNotFound(self.root.display().to_string()))
            }
            Err(e) => return Err(io_error(e)),
        };

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            if !entry.file_type().await.map_err(io_error)?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if is_pdf(&file_name) {
                documents.push(DocumentRef {
                    locator: file_name.clone(),
                    file_name,
                });
            }
        }
        documents.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(documents)
    }

    async fn fetch(&self, document: &DocumentRef) -> Result<Bytes, SourceError> {
        let path = self.root.join(&document.locator);
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|source| SourceError::Io {
                path: path.display().to_string(),
                source,
            })
    }
}

/// PDFs under a key prefix in an S3-compatible bucket.
pub struct S3FolderSource {
    client: S3Client,
    bucket: String,
    prefix: String,
}

impl S3FolderSource {
    pub fn new(client: S3Client, bucket: String, prefix: &str) -> Self {
        let prefix = prefix.trim_matches('/');
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}/")
        };
        Self {
            client,
            bucket,
            prefix,
        }
    }
}

#[async_trait]
impl DocumentSource for S3FolderSource {
    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }

    async fn list(&self) -> Result<Vec<DocumentRef>, SourceError> {
        let mut documents = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&self.prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| SourceError::Remote(format!("listing {}: {e}", self.describe())))?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                if !is_pdf(key) {
                    continue;
                }
                let file_name = key.rsplit('/').next().unwrap_or(key).to_string();
                documents.push(DocumentRef {
                    file_name,
                    locator: key.to_string(),
                });
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string())
                }
                _ => break,
            }
        }

        documents.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(documents)
    }

    async fn fetch(&self, document: &DocumentRef) -> Result<Bytes, SourceError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&document.locator)
            .send()
            .await
            .map_err(|e| SourceError::Remote(format!("reading {}: {e}", document.locator)))?;
        let body = object.body.collect().await.map_err(|e| {
            SourceError::Remote(format!("collecting body of {}: {e}", document.locator))
        })?;
        Ok(body.into_bytes())
    }
}
