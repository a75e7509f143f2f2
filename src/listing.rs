// Listing workflow: volume contents as display rows.

use crate::api::DirectoryEntry;
use crate::auth::WorkspaceHandle;
use crate::logging::Logger;
use crate::volume::DestinationAddress;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Could not list volume contents: {0}")]
pub struct ListError(pub String);

/// One row of the volume browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub path: String,
    pub size: Option<u64>,
    pub name: String,
    pub type_label: &'static str,
    pub size_label: String,
}

impl RemoteEntry {
    pub fn is_directory(&self) -> bool {
        self.type_label == "Directory"
    }
}

impl From<DirectoryEntry> for RemoteEntry {
    /// A zero or missing size is shown as a directory.
    fn from(raw: DirectoryEntry) -> Self {
        let name = raw
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .last()
            .unwrap_or_default()
            .to_string();
        let (type_label, size_label) = match raw.file_size {
            Some(n) if n > 0 => ("File", format!("{n} bytes")),
            _ => ("Directory", "Directory".to_string()),
        };
        RemoteEntry {
            path: raw.path,
            size: raw.file_size,
            name,
            type_label,
            size_label,
        }
    }
}

pub struct ListingWorkflow {
    logger: Logger,
}

impl ListingWorkflow {
    pub fn new(logger: &Logger) -> Self {
        ListingWorkflow {
            logger: logger.scoped("volume_uploader::listing"),
        }
    }

    /// Entries of the volume at `address`, in the order the service sent
    /// them. An empty volume is `Ok(vec![])`.
    pub fn list(
        &self,
        handle: &WorkspaceHandle,
        address: &DestinationAddress,
    ) -> Result<Vec<RemoteEntry>, ListError> {
        let path = address.container_path();
        self.logger.info(format_args!("Refreshing volume contents for {address}"));
        self.logger.debug(format_args!("Listing contents of volume path: {path}"));

        let raw = handle.client().list_directory(&path).map_err(|e| {
            self.logger.error(format_args!("Could not list volume contents: {e}"));
            ListError(e.to_string())
        })?;
        self.logger.info(format_args!(
            "Successfully retrieved volume contents: {} items",
            raw.len()
        ));
        if raw.is_empty() {
            self.logger.info(format_args!("Volume is empty"));
        }
        Ok(raw.into_iter().map(RemoteEntry::from).collect())
    }
}
