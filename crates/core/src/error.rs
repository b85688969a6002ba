//! Error types for report extraction and generation.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while extracting data or generating a report deck.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open or read a file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// The input file format is not supported or could not be detected.
    #[error("Unsupported or unrecognized file format: {0}")]
    UnsupportedFormat(String),

    /// Data extraction failed. The message names the missing columns or the
    /// unreadable structure so the user can fix the source file.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Extraction completed but produced zero groups/records.
    #[error("No data found: {0}")]
    NoData(String),

    /// The deck template does not contain the expected table or block marker.
    #[error("Template layout error: {0}")]
    Layout(String),

    /// The output document could not be written (e.g. the destination is
    /// open in another application).
    #[error("Failed to save output: {0}")]
    Save(String),

    /// ZIP archive error (PPTX/DOCX packages).
    #[error("ZIP error: {0}")]
    Zip(String),

    /// XML parsing error (PPTX/DOCX parts).
    #[error("XML parsing error: {0}")]
    Xml(String),

    /// Configuration file could not be read or written.
    #[error("Config error: {0}")]
    Config(String),

    /// The external plotting application reported a failure.
    #[error("Plot driver error: {0}")]
    Plot(String),
}
