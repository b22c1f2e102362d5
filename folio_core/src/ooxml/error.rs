//! Codec errors

/// Fatal decode failure; no document is produced
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Not a valid package archive: {0}")]
    Container(#[from] zip::result::ZipError),
    #[error("Package manifest {0} is missing")]
    MissingManifest(String),
    #[error("Package has no main document relationship")]
    MissingMainPart,
    #[error("Part {0} is missing from the package")]
    MissingPart(String),
    #[error("Part {part} is malformed: {message}")]
    MalformedPart { part: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while writing a package
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
