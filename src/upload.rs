// Upload workflow: advisory volume check, then an overwriting upload.
//
// Nothing here returns early with a fault: every file ends up as an
// `UploadResult` the surface can render, and a batch always runs to the end.

use crate::auth::WorkspaceHandle;
use crate::logging::Logger;
use crate::volume::DestinationAddress;
use thiserror::Error;

/// Human-readable reason an upload did not happen.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct UploadError(pub String);

/// Final remote path on success.
pub type UploadResult = Result<String, UploadError>;

/// A file picked on the local machine. `contents` holds the read error when
/// the file could not be loaded.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub name: String,
    pub contents: Result<Vec<u8>, String>,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, contents: Vec<u8>) -> Self {
        LocalFile {
            name: name.into(),
            contents: Ok(contents),
        }
    }

    pub fn unreadable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        LocalFile {
            name: name.into(),
            contents: Err(reason.into()),
        }
    }
}

/// Per-file result of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub file_name: String,
    pub size: usize,
    pub result: UploadResult,
}

/// Progress notifications emitted while a batch runs.
#[derive(Debug)]
pub enum BatchEvent<'a> {
    Started {
        index: usize,
        total: usize,
        file_name: &'a str,
    },
    Finished {
        index: usize,
        total: usize,
        outcome: &'a FileOutcome,
    },
}

pub struct UploadWorkflow {
    logger: Logger,
}

impl UploadWorkflow {
    pub fn new(logger: &Logger) -> Self {
        UploadWorkflow {
            logger: logger.scoped("volume_uploader::upload"),
        }
    }

    /// Upload one file to `address` (which must carry the file name).
    pub fn upload(
        &self,
        handle: &WorkspaceHandle,
        address: &DestinationAddress,
        file_bytes: &[u8],
    ) -> UploadResult {
        let file_name = address.file_name().unwrap_or_default();
        self.logger.info(format_args!("Attempting to upload file: {file_name}"));
        self.logger.debug(format_args!(
            "Target location: catalog={}, schema={}, volume={}",
            address.catalog(),
            address.schema(),
            address.volume()
        ));

        let path = address.remote_path().map_err(|e| {
            self.logger.error(format_args!("Upload failed: {e}"));
            UploadError(e.to_string())
        })?;
        self.logger.info(format_args!("Uploading to volume path: {path}"));

        // Advisory only: a missing or restricted volume shows up at upload time.
        let root = address.container_path();
        self.logger.debug(format_args!("Checking if volume exists: {root}"));
        match handle.client().list_directory(&root) {
            Ok(_) => self.logger.info(format_args!("Volume exists and is accessible: {root}")),
            Err(e) => {
                self.logger.warn(format_args!("Volume check failed: {e}"));
                self.logger.info(format_args!(
                    "Continuing with upload attempt despite volume check failure"
                ));
            }
        }

        self.logger.debug(format_args!("Starting file upload: {file_name}"));
        match handle.client().upload(&path, file_bytes, true) {
            Ok(()) => {
                self.logger.info(format_args!("File uploaded successfully: {file_name}"));
                Ok(path)
            }
            Err(e) => {
                self.logger.error(format_args!("Upload failed: {e}"));
                Err(UploadError(e.to_string()))
            }
        }
    }

    /// Upload `files` one after another into the volume at `address`.
    /// Returns one outcome per input file, in input order.
    pub fn upload_batch<F>(
        &self,
        handle: &WorkspaceHandle,
        address: &DestinationAddress,
        files: &[LocalFile],
        mut observer: F,
    ) -> Vec<FileOutcome>
    where
        F: FnMut(BatchEvent<'_>),
    {
        let total = files.len();
        self.logger.info(format_args!(
            "Starting upload process for {total} files to {address}"
        ));

        let mut outcomes = Vec::with_capacity(total);
        for (index, file) in files.iter().enumerate() {
            observer(BatchEvent::Started {
                index,
                total,
                file_name: &file.name,
            });

            let outcome = match &file.contents {
                Ok(bytes) => {
                    self.logger.debug(format_args!(
                        "Processing file {}/{}: {} ({} bytes)",
                        index + 1,
                        total,
                        file.name,
                        bytes.len()
                    ));
                    FileOutcome {
                        file_name: file.name.clone(),
                        size: bytes.len(),
                        result: self.upload(handle, &address.with_file_name(&file.name), bytes),
                    }
                }
                Err(reason) => FileOutcome {
                    file_name: file.name.clone(),
                    size: 0,
                    result: Err(UploadError(format!("could not read file: {reason}"))),
                },
            };

            match &outcome.result {
                Ok(path) => self.logger.info(format_args!(
                    "File uploaded successfully: {} to {path}",
                    outcome.file_name
                )),
                Err(e) => self.logger.error(format_args!(
                    "Failed to upload {}: {e}",
                    outcome.file_name
                )),
            }
            observer(BatchEvent::Finished {
                index,
                total,
                outcome: &outcome,
            });
            outcomes.push(outcome);
        }

        self.logger.info(format_args!("Upload process completed"));
        outcomes
    }
}
