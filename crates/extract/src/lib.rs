//! Measurement data extraction from laboratory instrument exports.
//!
//! One extractor per source kind: word-processor tables (tensile),
//! spreadsheets (tensile and VDA bend), delimited CSV (VDA bend), and PDF
//! statistics tables (hardness). All extractors produce the shared
//! [`GroupedData`] / [`HardnessReading`] domain types from `labreport-core`.

pub mod curves;
pub mod docx;
pub mod pdf;
pub mod sheet;

use std::path::Path;

use labreport_core::{Error, GroupedData, HardnessReading, Result};

/// The detected kind of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Word-processor document (.docx).
    Docx,
    /// Modern spreadsheet (.xlsx).
    Xlsx,
    /// Legacy spreadsheet (.xls).
    Xls,
    /// Delimited text export.
    Csv,
    /// PDF report.
    Pdf,
}

impl InputFormat {
    /// Detect format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "docx" => Some(Self::Docx),
            "xlsx" => Some(Self::Xlsx),
            "xls" => Some(Self::Xls),
            "csv" => Some(Self::Csv),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Detect a file's format from its extension, cross-checked against the
    /// leading magic bytes where those are unambiguous.
    pub fn detect(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let format = Self::from_extension(ext).ok_or_else(|| {
            Error::UnsupportedFormat(format!("{} (unknown extension)", path.display()))
        })?;

        // Magic bytes catch a renamed file before the extractor trips over it.
        if let Ok(bytes) = std::fs::read(path) {
            if bytes.starts_with(b"%PDF") && format != Self::Pdf {
                return Err(Error::UnsupportedFormat(format!(
                    "{} has a .{} extension but PDF content",
                    path.display(),
                    ext
                )));
            }
            if format == Self::Pdf && !bytes.starts_with(b"%PDF") {
                return Err(Error::UnsupportedFormat(format!(
                    "{} is not a PDF file",
                    path.display()
                )));
            }
        }

        Ok(format)
    }
}

/// Extract grouped tensile records from a .docx or .xlsx/.xls export.
pub fn extract_tensile(path: &Path) -> Result<GroupedData> {
    let data = match InputFormat::detect(path)? {
        InputFormat::Docx => docx::extract_tensile(path)?,
        InputFormat::Xlsx | InputFormat::Xls => sheet::extract_tensile(path)?,
        other => {
            return Err(Error::UnsupportedFormat(format!(
                "{:?} is not a tensile data source",
                other
            )));
        }
    };
    require_groups(data, path)
}

/// Extract grouped VDA bend records from a .csv or .xlsx/.xls export.
pub fn extract_bend(path: &Path) -> Result<GroupedData> {
    let data = match InputFormat::detect(path)? {
        InputFormat::Csv => sheet::extract_bend_csv(path)?,
        InputFormat::Xlsx | InputFormat::Xls => sheet::extract_bend_workbook(path)?,
        other => {
            return Err(Error::UnsupportedFormat(format!(
                "{:?} is not a bend data source",
                other
            )));
        }
    };
    require_groups(data, path)
}

/// Extract hardness readings from a PDF report.
pub fn extract_hardness(path: &Path) -> Result<Vec<HardnessReading>> {
    match InputFormat::detect(path)? {
        InputFormat::Pdf => {}
        other => {
            return Err(Error::UnsupportedFormat(format!(
                "{:?} is not a hardness data source",
                other
            )));
        }
    }
    let readings = pdf::extract_hardness(path)?;
    if readings.is_empty() {
        return Err(Error::NoData(format!(
            "no qualifying statistics table in {}",
            path.display()
        )));
    }
    Ok(readings)
}

fn require_groups(data: GroupedData, path: &Path) -> Result<GroupedData> {
    if data.is_empty() {
        return Err(Error::NoData(format!(
            "no sample groups recognized in {}",
            path.display()
        )));
    }
    Ok(data)
}

/// Project identifier fallback: the input file's stem.
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(InputFormat::from_extension("docx"), Some(InputFormat::Docx));
        assert_eq!(InputFormat::from_extension("XLSX"), Some(InputFormat::Xlsx));
        assert_eq!(InputFormat::from_extension("xls"), Some(InputFormat::Xls));
        assert_eq!(InputFormat::from_extension("csv"), Some(InputFormat::Csv));
        assert_eq!(InputFormat::from_extension("pdf"), Some(InputFormat::Pdf));
        assert_eq!(InputFormat::from_extension("txt"), None);
    }

    #[test]
    fn test_detect_rejects_unknown_extension() {
        let err = InputFormat::detect(Path::new("/tmp/data.txt")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_detect_rejects_renamed_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.xlsx");
        std::fs::write(&path, b"%PDF-1.7 ...").unwrap();
        let err = InputFormat::detect(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_detect_rejects_fake_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.pdf");
        std::fs::write(&path, b"PK\x03\x04").unwrap();
        let err = InputFormat::detect(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }
}
