use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::UserInputError;
use crate::model::FileHandle;
use crate::providers::{FileStore, PaperSource};

/// Progress notices for a resolve call, delivered in order.
pub type Progress<'a> = &'a mut (dyn FnMut(String) + Send);

/// Turns a paper locator into a provider file handle.
pub struct FileResolver {
    files: Arc<dyn FileStore>,
    papers: Arc<dyn PaperSource>,
    cache_dir: PathBuf,
}

impl FileResolver {
    pub fn new(
        files: Arc<dyn FileStore>,
        papers: Arc<dyn PaperSource>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            files,
            papers,
            cache_dir: cache_dir.into(),
        }
    }

    /// Old-style ids such as `hep-th/9901001` are flattened into one file name.
    pub fn cache_path(&self, identifier: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.pdf", identifier.replace('/', "_")))
    }

    /// Downloads the arXiv paper unless it is already cached, then uploads it.
    pub async fn resolve_remote(
        &self,
        identifier: &str,
        progress: Progress<'_>,
    ) -> Result<FileHandle> {
        validate_arxiv_id(identifier)?;
        let file_path = self.cache_path(identifier);

        if file_path.exists() {
            progress(format!(
                "File {} already exists, skip downloading...",
                file_path.display()
            ));
        } else {
            progress(format!("Searching arXiv for paper {identifier}..."));
            let entry = self
                .papers
                .find_paper(identifier)
                .await?
                .ok_or_else(|| UserInputError::PaperNotFound(identifier.to_string()))?;
            let link = entry
                .pdf_link()
                .ok_or_else(|| UserInputError::NoPdfLink(identifier.to_string()))?;

            progress(format!("Downloading paper {identifier} from {link}..."));
            self.papers.download(link, &file_path).await?;
        }

        self.upload(&file_path, progress).await
    }

    /// Uploads a local file, which must exist.
    pub async fn resolve_local(&self, path: &Path, progress: Progress<'_>) -> Result<FileHandle> {
        if !path.exists() {
            return Err(UserInputError::FileNotFound(path.to_path_buf()).into());
        }
        self.upload(path, progress).await
    }

    /// Reuses a provider file with the same base name, otherwise uploads.
    pub async fn upload(&self, path: &Path, progress: Progress<'_>) -> Result<FileHandle> {
        let file_name = base_name(path);

        if let Some(handle) = self.find_remote(&file_name).await? {
            progress(format!(
                "File {file_name} already exists, skip uploading..."
            ));
            return Ok(handle);
        }

        progress(format!("Uploading file {file_name}..."));
        let created = self.files.create_file(path).await?;
        info!(file_name = %file_name, file_id = %created.id, "uploaded file");
        Ok(created.handle())
    }

    pub async fn lookup_handle(&self, file_name: &str) -> Result<Option<FileHandle>> {
        let handle = self.find_remote(file_name).await?;
        match &handle {
            Some(handle) => info!(file_name = %file_name, file_id = %handle, "found provider file"),
            None => info!(file_name = %file_name, "provider file not found"),
        }
        Ok(handle)
    }

    pub async fn delete(&self, handle: &FileHandle) -> Result<()> {
        self.files.delete_file(handle).await?;
        info!(file_id = %handle, "deleted provider file");
        Ok(())
    }

    async fn find_remote(&self, file_name: &str) -> Result<Option<FileHandle>> {
        let files = self.files.list_files().await?;
        debug!(file_name = %file_name, file_count = files.len(), "searching provider files");
        Ok(files
            .iter()
            .find(|file| file.filename == file_name)
            .map(|file| file.handle()))
    }
}

/// Accepts new-style (`2311.11100v2`) and old-style (`hep-th/9901001`) ids.
/// Anything that could step outside the cache directory is refused.
pub fn validate_arxiv_id(identifier: &str) -> Result<(), UserInputError> {
    let invalid = identifier.is_empty()
        || identifier.contains("..")
        || identifier.contains('\\')
        || identifier.starts_with('/')
        || identifier.ends_with('/');
    if invalid {
        return Err(UserInputError::InvalidArxivId(identifier.to_string()));
    }
    Ok(())
}

/// Trailing path segment, accepting both separators.
pub fn base_name(path: &Path) -> String {
    let raw = path.to_string_lossy();
    raw.rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .to_string()
}
