// Unity Catalog volume addressing.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Please specify a {0} name.")]
    Empty(&'static str),

    #[error("Please specify a file name.")]
    MissingFileName,
}

/// `catalog.schema.volume`, optionally narrowed down to one file in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationAddress {
    catalog: String,
    schema: String,
    volume: String,
    file_name: Option<String>,
}

impl DestinationAddress {
    /// Surrounding whitespace is dropped; every part must be non-empty.
    pub fn new(catalog: &str, schema: &str, volume: &str) -> Result<Self, AddressError> {
        let part = |value: &str, what: &'static str| {
            let value = value.trim();
            if value.is_empty() {
                Err(AddressError::Empty(what))
            } else {
                Ok(value.to_string())
            }
        };
        Ok(DestinationAddress {
            catalog: part(catalog, "catalog")?,
            schema: part(schema, "schema")?,
            volume: part(volume, "volume")?,
            file_name: None,
        })
    }

    pub fn with_file_name(&self, file_name: &str) -> Self {
        DestinationAddress {
            file_name: Some(file_name.to_string()),
            ..self.clone()
        }
    }

    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn volume(&self) -> &str {
        &self.volume
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// `/Volumes/{catalog}/{schema}/{volume}`
    pub fn container_path(&self) -> String {
        format!("/Volumes/{}/{}/{}", self.catalog, self.schema, self.volume)
    }

    /// `/Volumes/{catalog}/{schema}/{volume}/{file_name}`
    pub fn remote_path(&self) -> Result<String, AddressError> {
        match self.file_name.as_deref() {
            Some(name) if !name.is_empty() => Ok(format!("{}/{}", self.container_path(), name)),
            _ => Err(AddressError::MissingFileName),
        }
    }
}

impl fmt::Display for DestinationAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.volume)
    }
}
