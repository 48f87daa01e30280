use crate::error::{FileError, IngestError};
use crate::normalizer::{NormalizedSheet, RowNormalizer};
use crate::source::SourceReader;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Debug)]
pub struct IngestedFile {
    pub file_name: String,
    pub sheet: NormalizedSheet,
}

#[derive(Debug)]
pub struct FailedFile {
    pub file_name: String,
    pub error: FileError,
}

/// Per-file outcome of one ingestion run, ordered by file name.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub ingested: Vec<IngestedFile>,
    pub failed: Vec<FailedFile>,
}

impl IngestReport {
    pub fn rows_read(&self) -> usize {
        self.ingested.iter().map(|f| f.sheet.rows_read).sum()
    }

    pub fn rows_kept(&self) -> usize {
        self.ingested.iter().map(|f| f.sheet.records.len()).sum()
    }

    pub fn rows_rejected(&self) -> usize {
        self.ingested.iter().map(|f| f.sheet.rejected.count).sum()
    }
}

/// Reads every qualifying source file of a directory into normalized rows.
#[derive(Debug, Clone)]
pub struct FileIngestor {
    suffixes: Vec<String>,
    reader: SourceReader,
    normalizer: RowNormalizer,
}

impl FileIngestor {
    pub fn new(suffixes: Vec<String>) -> Self {
        Self {
            suffixes,
            reader: SourceReader::default(),
            normalizer: RowNormalizer::new(),
        }
    }

    pub fn with_reader(mut self, reader: SourceReader) -> Self {
        self.reader = reader;
        self
    }

    fn is_source_file(&self, file_name: &str) -> bool {
        self.suffixes.iter().any(|suffix| file_name.ends_with(suffix.as_str()))
    }

    /// Qualifying files of `directory`, sorted by name.
    pub fn source_files(&self, directory: &Path) -> Result<Vec<PathBuf>, IngestError> {
        let read_dir_error = |source| IngestError::ReadDir {
            directory: directory.to_path_buf(),
            source,
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(directory).map_err(read_dir_error)? {
            let path = entry.map_err(read_dir_error)?.path();
            let qualifies = path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| self.is_source_file(name))
                    .unwrap_or(false);
            if qualifies {
                files.push(path);
            }
        }

        if files.is_empty() {
            return Err(IngestError::NoSourceFiles {
                directory: directory.to_path_buf(),
                suffixes: self.suffixes.clone(),
            });
        }

        files.sort();
        Ok(files)
    }

    /// Read and normalize one file.
    pub fn ingest_file(&self, path: &Path) -> Result<NormalizedSheet, FileError> {
        let file_name = display_name(path);
        let sheet = self.reader.read_file(path)?;
        let normalized = self.normalizer.normalize(sheet, &file_name)?;
        Ok(normalized)
    }

    /// Ingest all qualifying files, one blocking task per file. A failing file
    /// contributes no rows and is listed in [`IngestReport::failed`]; the run
    /// fails when no file could be ingested at all.
    pub async fn ingest_directory(&self, directory: &Path) -> Result<IngestReport, IngestError> {
        let files = self.source_files(directory)?;
        info!(directory = %directory.display(), files = files.len(), "ingesting source files");

        let mut tasks = JoinSet::new();
        for path in files {
            let ingestor = self.clone();
            tasks.spawn_blocking(move || {
                let result = ingestor.ingest_file(&path);
                (display_name(&path), result)
            });
        }

        let mut report = IngestReport::default();
        while let Some(joined) = tasks.join_next().await {
            let (file_name, result) = joined.map_err(|e| IngestError::Worker(e.to_string()))?;
            match result {
                Ok(sheet) => {
                    info!(
                        file = %file_name,
                        layout = sheet.mapping_version,
                        kept = sheet.records.len(),
                        rejected = sheet.rejected.count,
                        "processed source file"
                    );
                    report.ingested.push(IngestedFile { file_name, sheet });
                }
                Err(error) => {
                    warn!(file = %file_name, %error, "source file skipped");
                    report.failed.push(FailedFile { file_name, error });
                }
            }
        }

        report.ingested.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        report.failed.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        if report.ingested.is_empty() {
            return Err(IngestError::NoUsableFiles {
                directory: directory.to_path_buf(),
                failed: report.failed.into_iter().map(|f| f.file_name).collect(),
            });
        }
        Ok(report)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
