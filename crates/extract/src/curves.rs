//! Raw curve harvesting from instrument workbooks.
//!
//! Curve sheets hold alternating column pairs, written Y-first by the
//! instruments; preparation swaps each pair to X,Y order and renames the Y
//! columns after the sample identifiers found elsewhere in the workbook.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use labreport_core::{plot::CurveDataset, Error, Result};

/// Which test produced the workbook; decides the curve sheet to look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveKind {
    Tensile,
    Bend,
}

/// Header text that marks a sample identifier column.
const SAMPLE_ID_HEADER: &str = "试样编号";

/// Identifier headers are only looked for near the top of a sheet.
const ID_SCAN_ROWS: usize = 10;

/// Load and prepare the curve dataset of a workbook: pairs swapped to X,Y
/// order, Y columns named after the workbook's sample identifiers.
pub fn load_curves(path: &Path, kind: CurveKind) -> Result<CurveDataset> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| Error::Extraction(format!("Cannot open {}: {}", path.display(), e)))?;
    let names = workbook.sheet_names().to_owned();

    let curve_sheet = pick_curve_sheet(&names, kind).ok_or_else(|| {
        Error::NoData(format!("no curve sheet found in {}", path.display()))
    })?;
    let range = workbook
        .worksheet_range(&curve_sheet)
        .map_err(|e| Error::Extraction(format!("Cannot read sheet '{}': {}", curve_sheet, e)))?;
    let mut dataset = dataset_from_range(&range);
    if dataset.column_count() == 0 {
        return Err(Error::NoData(format!(
            "curve sheet '{}' is empty in {}",
            curve_sheet,
            path.display()
        )));
    }
    dataset.swap_xy_pairs();

    // Sample ids usually live on the summary sheet, not the curve sheet.
    let mut sample_ids = Vec::new();
    for name in names.iter().filter(|n| **n != curve_sheet) {
        let Ok(range) = workbook.worksheet_range(name) else {
            continue;
        };
        sample_ids = harvest_sample_ids(&range);
        if !sample_ids.is_empty() {
            break;
        }
    }
    if sample_ids.is_empty() {
        log::warn!(
            "no sample identifiers found in {}; keeping original series names",
            path.display()
        );
    }
    dataset.name_series(&sample_ids);

    Ok(dataset)
}

/// Pick the curve sheet by name. Tensile machines label it 曲线; VDA bend
/// machines export 原始数据 or a VDA-prefixed sheet.
fn pick_curve_sheet(names: &[String], kind: CurveKind) -> Option<String> {
    let hit = match kind {
        CurveKind::Tensile => names.iter().find(|n| n.contains("曲线")),
        CurveKind::Bend => names
            .iter()
            .find(|n| n.contains("原始数据"))
            .or_else(|| names.iter().find(|n| n.contains("VDA"))),
    };
    hit.cloned()
}

/// First row becomes the headers; numeric cells below become the data,
/// anything else a gap.
fn dataset_from_range(range: &Range<Data>) -> CurveDataset {
    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(row) => row.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => Vec::new(),
    };

    let mut dataset = CurveDataset::new(headers);
    for row in rows {
        dataset
            .rows
            .push(row.iter().map(numeric_cell).collect());
    }
    dataset
}

fn numeric_cell(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Collect the values below a 试样编号 header found in the first few rows.
fn harvest_sample_ids(range: &Range<Data>) -> Vec<String> {
    let rows: Vec<&[Data]> = range.rows().collect();

    for (row_idx, row) in rows.iter().take(ID_SCAN_ROWS).enumerate() {
        let Some(col) = row
            .iter()
            .position(|c| c.to_string().contains(SAMPLE_ID_HEADER))
        else {
            continue;
        };
        let ids: Vec<String> = rows[row_idx + 1..]
            .iter()
            .filter_map(|r| {
                let text = r.get(col)?.to_string().trim().to_string();
                (!text.is_empty()).then_some(text)
            })
            .collect();
        if !ids.is_empty() {
            return ids;
        }
    }
    Vec::new()
}
