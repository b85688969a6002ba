//! Tensile and VDA bend extraction from spreadsheets and CSV exports.
//!
//! Tensile summary sheets use fixed column offsets from the identifier
//! column; VDA bend exports are located by header name (exact match first,
//! then substring) because the testing machines vary their column order.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use labreport_core::{
    ident::{looks_like_sample_id, parse_sample_id},
    Error, FieldValue, GroupedData, MeasurementRecord, Result,
};

/// Fixed tensile column offsets (identifier is column 0).
const TENSILE_THICKNESS_COL: usize = 1;
const TENSILE_VALUE_COLS: [usize; 4] = [6, 7, 8, 10]; // Rp, Rm, Ag, A

/// Source header names of the VDA bend columns, in output order:
/// identifier, thickness, max force, displacement, angle.
const BEND_COLUMNS: [&str; 5] = ["试样编号", "公称厚度t0", "最大力Fm", "压头位移S", "角度"];

/// Preferred sheet names.
const TENSILE_SHEET: &str = "Sheet1";
const BEND_SHEET_HINT: &str = "VDA";

/// Extract grouped tensile records from an .xlsx/.xls workbook.
///
/// Rows whose first-column identifier does not clean to a
/// `name-…-digit` shape are decoration (titles, units, totals) and are
/// skipped.
pub fn extract_tensile(path: &Path) -> Result<GroupedData> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| Error::Extraction(format!("Cannot open {}: {}", path.display(), e)))?;

    let names = workbook.sheet_names().to_owned();
    let sheet = names
        .iter()
        .find(|n| n.as_str() == TENSILE_SHEET)
        .or_else(|| names.first())
        .cloned()
        .ok_or_else(|| Error::Extraction(format!("{} has no sheets", path.display())))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| Error::Extraction(format!("Cannot read sheet '{}': {}", sheet, e)))?;

    let mut data = GroupedData::new(crate::file_stem(path));
    for row in range.rows() {
        let raw_id = cell_text(row.first());
        if raw_id.is_empty() || !looks_like_sample_id(&raw_id) {
            continue;
        }
        let values = TENSILE_VALUE_COLS
            .iter()
            .map(|&i| cell_value(row.get(i)))
            .collect();
        data.push(MeasurementRecord::new(
            parse_sample_id(&raw_id),
            cell_text(row.get(TENSILE_THICKNESS_COL)),
            values,
        ));
    }
    data.sort_groups();
    Ok(data)
}

/// Extract grouped VDA bend records from an .xlsx/.xls workbook.
pub fn extract_bend_workbook(path: &Path) -> Result<GroupedData> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| Error::Extraction(format!("Cannot open {}: {}", path.display(), e)))?;

    let names = workbook.sheet_names().to_owned();
    let sheet = names
        .iter()
        .find(|n| n.contains(BEND_SHEET_HINT))
        .or_else(|| names.first())
        .cloned()
        .ok_or_else(|| Error::Extraction(format!("{} has no sheets", path.display())))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| Error::Extraction(format!("Cannot read sheet '{}': {}", sheet, e)))?;

    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(data_to_string).collect())
        .collect();
    bend_from_rows(&rows, crate::file_stem(path))
}

/// Extract grouped VDA bend records from a CSV export.
///
/// Machines in the field write UTF-8, GBK, or GB18030; decoding cascades
/// through those in order.
pub fn extract_bend_csv(path: &Path) -> Result<GroupedData> {
    let bytes = std::fs::read(path)?;
    let text = decode_text(&bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| Error::Extraction(format!("Malformed CSV row: {}", e)))?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    bend_from_rows(&rows, crate::file_stem(path))
}

/// Build grouped bend records from header + data rows.
fn bend_from_rows(rows: &[Vec<String>], project_id: String) -> Result<GroupedData> {
    let header = rows
        .first()
        .ok_or_else(|| Error::Extraction("empty bend export".to_string()))?;
    let cols = locate_bend_columns(header)?;
    let [id_col, thickness_col, force_col, disp_col, angle_col] = cols;

    let mut data = GroupedData::new(project_id);
    for row in rows.iter().skip(1) {
        let raw_id = row.get(id_col).map(|s| s.trim()).unwrap_or("");
        if raw_id.is_empty() {
            continue;
        }
        let cell = |i: usize| row.get(i).map(|s| s.as_str()).unwrap_or("");
        let values = vec![
            FieldValue::from_raw(cell(force_col)),
            FieldValue::from_raw(cell(disp_col)),
            FieldValue::from_raw(cell(angle_col)),
        ];
        data.push(MeasurementRecord::new(
            parse_sample_id(raw_id),
            cell(thickness_col).trim(),
            values,
        ));
    }
    data.sort_groups();
    Ok(data)
}

/// Locate the five bend columns in a header row.
///
/// Exact name match wins; otherwise the first header containing the name.
/// Every missing column is reported so one round trip fixes the file.
fn locate_bend_columns(header: &[String]) -> Result<[usize; 5]> {
    let mut found = [usize::MAX; 5];
    let mut missing = Vec::new();

    for (slot, name) in BEND_COLUMNS.iter().enumerate() {
        let exact = header.iter().position(|h| h.trim() == *name);
        let index = exact.or_else(|| header.iter().position(|h| h.contains(name)));
        match index {
            Some(i) => found[slot] = i,
            None => missing.push(*name),
        }
    }

    if !missing.is_empty() {
        return Err(Error::Extraction(format!(
            "required columns not found in header: {}",
            missing.join(", ")
        )));
    }
    Ok(found)
}

/// Render a spreadsheet cell as trimmed text.
fn data_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => format!("{}", f),
        Data::Int(i) => format!("{}", i),
        Data::Bool(b) => format!("{}", b),
        other => other.to_string().trim().to_string(),
    }
}

fn cell_text(cell: Option<&Data>) -> String {
    cell.map(data_to_string).unwrap_or_default()
}

/// Convert a spreadsheet cell into a field value, keeping non-numeric text.
fn cell_value(cell: Option<&Data>) -> FieldValue {
    match cell {
        Some(Data::Float(f)) => FieldValue::Number(*f),
        Some(Data::Int(i)) => FieldValue::Number(*i as f64),
        Some(Data::String(s)) => FieldValue::from_raw(s),
        Some(Data::Empty) | None => FieldValue::Empty,
        Some(other) => FieldValue::from_raw(&other.to_string()),
    }
}

/// Decode instrument CSV bytes: UTF-8, then GBK, then GB18030.
fn decode_text(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    let (decoded, _, had_errors) = encoding_rs::GBK.decode(bytes);
    if !had_errors {
        return decoded.into_owned();
    }
    let (decoded, _, _) = encoding_rs::GB18030.decode(bytes);
    decoded.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(row: &[&str]) -> Vec<String> {
        row.iter().map(|s| s.to_string()).collect()
    }

    fn bend_rows() -> Vec<Vec<String>> {
        vec![
            strings(&["试样编号", "公称厚度t0", "最大力Fm", "压头位移S", "角度"]),
            strings(&["A-2", "1.50", "17000", "22.1", "92.3"]),
            strings(&["A-1", "1.50", "15000", "20.5", "90.1"]),
            strings(&["", "", "", "", ""]),
            strings(&["B-1", "1.20", "12000", "18.0", "85.0"]),
        ]
    }

    #[test]
    fn test_bend_grouping_and_numeric_sort() {
        let data = bend_from_rows(&bend_rows(), "P1".to_string()).unwrap();
        assert_eq!(data.groups.len(), 2);
        assert_eq!(data.groups[0].name, "A");
        let numbers: Vec<&str> = data.groups[0]
            .records
            .iter()
            .map(|r| r.sample_number.as_str())
            .collect();
        assert_eq!(numbers, vec!["1", "2"]);
        assert_eq!(
            data.groups[0].records[0].values[0],
            FieldValue::Number(15000.0)
        );
    }

    #[test]
    fn test_bend_missing_columns_named_in_error() {
        let rows = vec![
            strings(&["试样编号", "最大力Fm"]),
            strings(&["A-1", "15000"]),
        ];
        let err = bend_from_rows(&rows, "P1".to_string()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("公称厚度t0"));
        assert!(message.contains("压头位移S"));
        assert!(message.contains("角度"));
        assert!(!message.contains("最大力Fm"));
    }

    #[test]
    fn test_bend_substring_header_match() {
        let rows = vec![
            strings(&[
                "试样编号ID",
                "公称厚度t0 (mm)",
                "最大力Fm [N]",
                "压头位移S mm",
                "角度 deg",
            ]),
            strings(&["A-1", "1.2", "100", "10", "90"]),
        ];
        let data = bend_from_rows(&rows, "P1".to_string()).unwrap();
        assert_eq!(data.groups.len(), 1);
        assert_eq!(data.groups[0].records[0].thickness, "1.2");
    }

    #[test]
    fn test_csv_gbk_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bend.csv");
        let text = "试样编号,公称厚度t0,最大力Fm,压头位移S,角度\nA-1,1.50,15000,20.5,90.1\n";
        let (encoded, _, _) = encoding_rs::GBK.encode(text);
        std::fs::write(&path, &encoded).unwrap();

        let data = extract_bend_csv(&path).unwrap();
        assert_eq!(data.groups.len(), 1);
        assert_eq!(data.project_id, "bend");
    }

    #[test]
    fn test_cell_value_conversions() {
        assert_eq!(
            cell_value(Some(&Data::Float(512.5))),
            FieldValue::Number(512.5)
        );
        assert_eq!(cell_value(Some(&Data::Int(7))), FieldValue::Number(7.0));
        assert_eq!(
            cell_value(Some(&Data::String("broke".to_string()))),
            FieldValue::Text("broke".to_string())
        );
        assert_eq!(
            cell_value(Some(&Data::String("12.5".to_string()))),
            FieldValue::Number(12.5)
        );
        assert_eq!(cell_value(Some(&Data::Empty)), FieldValue::Empty);
        assert_eq!(cell_value(None), FieldValue::Empty);
    }

    #[test]
    fn test_tensile_identifier_gate() {
        // mirrors the skip condition used by extract_tensile
        assert!(looks_like_sample_id("A-1"));
        assert!(!looks_like_sample_id("拉伸试验汇总"));
        assert!(!looks_like_sample_id("Summary"));
    }
}
