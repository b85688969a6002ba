//! Tensile data extraction from word-processor (.docx) exports.
//!
//! The instrument writes one table per document: two header rows, then one
//! row per sample with the identifier in the second cell and the measured
//! values at fixed cell positions. The project identifier lives in the page
//! header, falling back to the first body paragraph.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use labreport_core::{
    ident::parse_sample_id, Error, FieldValue, GroupedData, MeasurementRecord, Result,
};
use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

/// Number of leading header rows in the instrument table.
const HEADER_ROWS: usize = 2;

/// Fixed cell positions in each data row.
const ID_CELL: usize = 1;
const THICKNESS_CELL: usize = 3;
const VALUE_CELLS: [usize; 4] = [8, 9, 10, 12]; // Rp, Rm, Ag, A
const MIN_CELLS: usize = 13;

/// Extract grouped tensile records from a .docx file.
pub fn extract_tensile(path: &Path) -> Result<GroupedData> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| Error::Zip(format!("Failed to open {}: {}", path.display(), e)))?;

    let document = read_part(&mut archive, "word/document.xml")?;
    let (lead_paragraphs, table) = parse_document(&document)?;

    let project_id = header_project_id(&mut archive)
        .or_else(|| {
            lead_paragraphs
                .iter()
                .find(|p| !p.trim().is_empty())
                .map(|p| p.split('：').next().unwrap_or(p).trim().to_string())
        })
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| crate::file_stem(path));

    let mut data = GroupedData::new(project_id);
    for row in table.iter().skip(HEADER_ROWS) {
        if row.len() < MIN_CELLS {
            continue;
        }
        let raw_id = row[ID_CELL].trim();
        if raw_id.is_empty() {
            continue;
        }
        let values = VALUE_CELLS
            .iter()
            .map(|&i| FieldValue::from_raw(&row[i]))
            .collect();
        data.push(MeasurementRecord::new(
            parse_sample_id(raw_id),
            row[THICKNESS_CELL].trim(),
            values,
        ));
    }
    data.sort_groups();
    Ok(data)
}

/// First non-empty paragraph of any page-header part, if present.
fn header_project_id<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Option<String> {
    let header_parts: Vec<String> = (0..archive.len())
        .filter_map(|i| {
            let name = archive.by_index(i).ok()?.name().to_string();
            (name.starts_with("word/header") && name.ends_with(".xml")).then_some(name)
        })
        .collect();

    for name in header_parts {
        let Ok(xml) = read_part(archive, &name) else {
            continue;
        };
        if let Ok((paragraphs, _)) = parse_document(&xml) {
            if let Some(text) = paragraphs.iter().find(|p| !p.trim().is_empty()) {
                return Some(text.trim().to_string());
            }
        }
    }
    None
}

/// Read a part from the package as UTF-8 text.
fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String> {
    let mut file = archive
        .by_name(name)
        .map_err(|e| Error::Zip(format!("Part '{}' not found: {}", name, e)))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| Error::Zip(format!("Failed to read '{}': {}", name, e)))?;
    Ok(content)
}

/// Parse a WordprocessingML part into its lead paragraphs (text before the
/// first table) and the first table's cell texts.
fn parse_document(xml: &str) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut paragraphs = Vec::new();
    let mut table: Vec<Vec<String>> = Vec::new();
    let mut table_seen = false;
    let mut table_depth = 0usize;
    let mut in_row = false;
    let mut in_cell = false;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                b"tbl" => {
                    if table_depth == 0 && table_seen {
                        // Only the first table carries data; skip the rest.
                        reader
                            .read_to_end(e.name())
                            .map_err(|e| Error::Xml(e.to_string()))?;
                        continue;
                    }
                    table_depth += 1;
                    table_seen = true;
                }
                b"tr" if table_depth == 1 => {
                    in_row = true;
                    table.push(Vec::new());
                }
                b"tc" if in_row => {
                    in_cell = true;
                    current_text.clear();
                }
                b"p" if table_depth == 0 && !table_seen => {
                    current_text.clear();
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default();
                current_text.push_str(&text);
            }
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()) {
                b"tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                }
                b"tr" if table_depth == 1 => {
                    in_row = false;
                }
                b"tc" if in_cell => {
                    in_cell = false;
                    if let Some(row) = table.last_mut() {
                        row.push(current_text.trim().to_string());
                    }
                    current_text.clear();
                }
                b"p" if table_depth == 0 && !table_seen => {
                    paragraphs.push(current_text.trim().to_string());
                    current_text.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(format!("Malformed document part: {}", e))),
            _ => {}
        }
    }

    Ok((paragraphs, table))
}

/// Local part of a namespaced element name.
fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}
