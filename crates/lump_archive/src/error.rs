//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// The data does not carry the signature of the requested format
    #[error("malformed header: {0}")]
    #[diagnostic(code(lump_archive::malformed_header))]
    MalformedHeader(String),

    /// The directory table disagrees with the data it describes
    #[error("corrupt directory: {0}")]
    #[diagnostic(code(lump_archive::corrupt_directory))]
    CorruptDirectory(String),

    /// The operation would break a structural rule of the archive format
    #[error("unsupported operation: {0}")]
    #[diagnostic(code(lump_archive::unsupported_mutation))]
    UnsupportedMutation(String),

    /// Entry content could not be fetched from its backing store
    #[error("entry data unavailable: {0}")]
    #[diagnostic(code(lump_archive::source_unavailable))]
    SourceUnavailable(String),

    /// A read, write or seek went past the end of a buffer
    #[error("range {offset}+{length} is outside of {size} bytes")]
    #[diagnostic(code(lump_archive::out_of_range))]
    OutOfRange {
        /// Start of the requested range
        offset: u64,
        /// Length of the requested range
        length: u64,
        /// Size of the buffer that was accessed
        size: u64,
    },

    /// unable to find requested item
    #[error("unable to find requested item")]
    NotFound(#[from] NotFoundError),

    /// No registered format recognised the data
    #[error("unrecognised archive format")]
    #[diagnostic(help("run `lump detect` to see which formats were tried"))]
    UnknownFormat,

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Error type to provide further information when an item has not been found
#[derive(Error, Diagnostic, Debug)]
pub enum NotFoundError {
    /// entry at path {0}
    #[error("entry at path {0}")]
    Entry(String),

    /// directory at path {0}
    #[error("directory at path {0}")]
    Directory(String),
}

impl Error {
    pub(crate) fn out_of_range(offset: u64, length: u64, size: u64) -> Self {
        Error::OutOfRange {
            offset,
            length,
            size,
        }
    }

    pub(crate) fn entry_not_found(path: impl Into<String>) -> Self {
        Error::NotFound(NotFoundError::Entry(path.into()))
    }

    pub(crate) fn dir_not_found(path: impl Into<String>) -> Self {
        Error::NotFound(NotFoundError::Directory(path.into()))
    }
}

/// A non-fatal problem met while reading or writing an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A name did not fit the format and was cut down
    NameTooLong {
        /// The name as it was in the archive tree
        name: String,
        /// The name as it was written
        truncated: String,
        /// Longest name the format can store
        limit: usize,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::NameTooLong {
                name,
                truncated,
                limit,
            } => write!(
                f,
                "name {name} is longer than {limit} characters, written as {truncated}"
            ),
        }
    }
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
