//! Local filesystem ingestion for ScrapeGraph pipelines.
//!
//! [`LocalFetcher`] implements [`FetchCapability`]: a single-file input key
//! reads one file, a `_dir` input key reads every matching file in a
//! directory (non-recursive, sorted by path).

mod parser;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use scrapegraph_shared::{
    Document, FetchCapability, InputKey, InputKind, Result, ScrapeGraphError, SourceType,
};

pub use parser::normalize;

/// Maximum file size we are willing to load (10 MB).
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Reads sources from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFetcher;

impl LocalFetcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FetchCapability for LocalFetcher {
    #[instrument(skip(self, input_key), fields(input_key = %input_key))]
    async fn fetch(&self, source: &str, input_key: InputKey) -> Result<Vec<Document>> {
        let path = Path::new(source);
        let documents = match input_key.kind {
            InputKind::Single => vec![read_document(path, input_key.source_type).await?],
            InputKind::Collection => read_directory(path, input_key.source_type).await?,
        };

        info!(
            documents = documents.len(),
            bytes = documents.iter().map(|d| d.content.len()).sum::<usize>(),
            "source fetched"
        );
        Ok(documents)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn not_found_or_io(path: &Path, e: std::io::Error) -> ScrapeGraphError {
    match e.kind() {
        ErrorKind::NotFound | ErrorKind::NotADirectory => ScrapeGraphError::source_not_found(path),
        _ => ScrapeGraphError::io(path, e),
    }
}

/// Read and normalize one file.
async fn read_document(path: &Path, source_type: SourceType) -> Result<Document> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| not_found_or_io(path, e))?;

    if !meta.is_file() {
        return Err(ScrapeGraphError::source_not_found(path));
    }
    if meta.len() > MAX_FILE_SIZE {
        return Err(ScrapeGraphError::parse(format!(
            "{}: file is {} bytes, limit is {MAX_FILE_SIZE}",
            path.display(),
            meta.len()
        )));
    }

    let raw = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
        ErrorKind::InvalidData => {
            ScrapeGraphError::parse(format!("{}: file is not valid UTF-8", path.display()))
        }
        _ => not_found_or_io(path, e),
    })?;

    let content = parser::normalize(source_type, &raw).map_err(|e| match e {
        ScrapeGraphError::Parse { message } => {
            ScrapeGraphError::parse(format!("{}: {message}", path.display()))
        }
        other => other,
    })?;

    debug!(path = %path.display(), bytes = content.len(), "document loaded");
    Ok(Document::new(path.display().to_string(), content))
}

/// Read every file in `dir` whose extension belongs to `source_type`.
async fn read_directory(dir: &Path, source_type: SourceType) -> Result<Vec<Document>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| not_found_or_io(dir, e))?;

    let mut paths: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ScrapeGraphError::io(dir, e))?
    {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map_err(|e| ScrapeGraphError::io(&path, e))?
            .is_file();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| source_type.matches_extension(ext));

        if is_file && matches {
            paths.push(path);
        }
    }

    if paths.is_empty() {
        warn!(dir = %dir.display(), source_type = %source_type, "no matching files in directory");
        return Err(ScrapeGraphError::source_not_found(dir));
    }

    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in &paths {
        documents.push(read_document(path, source_type).await?);
    }
    Ok(documents)
}
