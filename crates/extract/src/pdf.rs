//! Hardness statistics extraction from PDF test reports.
//!
//! The hardness tester emits PDF reports where each block of indentations
//! ends in a statistics table. Text extraction flattens those tables into
//! whitespace-separated lines, so recovery is line-based: a line qualifies
//! as a table header only when it names both a mean column and a standard
//! deviation column, and the numeric lines that follow are its data rows.
//! Readings are numbered across the whole document in the order found.

use std::path::Path;

use labreport_core::{Error, FieldValue, HardnessReading, Result};

/// Header tokens that mark the mean column.
const MEAN_TOKENS: [&str; 3] = ["平均", "average", "mean"];

/// Header tokens that mark the standard deviation column.
const SD_TOKENS: [&str; 3] = ["标准差", "sd", "std"];

/// Extract every statistics reading from a PDF report, numbered from 1.
pub fn extract_hardness(path: &Path) -> Result<Vec<HardnessReading>> {
    let bytes = std::fs::read(path)?;
    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| Error::Extraction(format!("Cannot read {}: {}", path.display(), e)))?;
    Ok(readings_from_text(&text))
}

/// Scan extracted text for statistics tables and collect their rows.
fn readings_from_text(text: &str) -> Vec<HardnessReading> {
    let mut readings = Vec::new();
    let mut active: Option<(usize, usize)> = None; // (mean column, sd column)

    for line in text.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        if let Some(columns) = header_columns(&tokens) {
            active = Some(columns);
            continue;
        }

        let Some((mean_col, sd_col)) = active else {
            continue;
        };
        match data_cells(&tokens, mean_col, sd_col) {
            Some((mean, sd)) => readings.push(HardnessReading {
                id: (readings.len() + 1).to_string(),
                mean,
                sd,
            }),
            // A non-matching line ends the current table.
            None => active = None,
        }
    }
    readings
}

/// Column positions of the mean and standard deviation headers, if this
/// line is a statistics header. Both must be present; summary tables that
/// carry only one of them are not statistics tables.
fn header_columns(tokens: &[&str]) -> Option<(usize, usize)> {
    let mean_col = tokens
        .iter()
        .position(|t| matches_any(t, &MEAN_TOKENS))?;
    let sd_col = tokens.iter().position(|t| matches_any(t, &SD_TOKENS))?;
    Some((mean_col, sd_col))
}

fn matches_any(token: &str, names: &[&str]) -> bool {
    let lowered = token.to_lowercase();
    names.iter().any(|n| lowered.contains(n))
}

/// The mean and standard deviation cells of a data row. `None` when the
/// line does not reach both columns or the mean cell is not numeric.
fn data_cells(tokens: &[&str], mean_col: usize, sd_col: usize) -> Option<(FieldValue, FieldValue)> {
    let mean = FieldValue::from_raw(tokens.get(mean_col)?);
    let sd = FieldValue::from_raw(tokens.get(sd_col)?);
    mean.as_number()?;
    Some((mean, sd))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readings_numbered_across_tables() {
        let text = "硬度测试报告\n\
                    点 硬度 平均 标准差\n\
                    1 350.1 350.2 4.5\n\
                    2 350.4 350.2 4.5\n\
                    \n\
                    第二组\n\
                    点 硬度 平均 标准差\n\
                    1 280.0 280.3 2.1\n";
        let readings = readings_from_text(text);
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].id, "1");
        assert_eq!(readings[2].id, "3");
        assert_eq!(readings[2].mean, FieldValue::Number(280.3));
        assert_eq!(readings[2].sd, FieldValue::Number(2.1));
    }

    #[test]
    fn test_header_needs_both_mean_and_sd() {
        let text = "点 硬度 平均\n1 350.1 350.2\n";
        assert!(readings_from_text(text).is_empty());

        let text = "点 硬度 标准差\n1 350.1 4.5\n";
        assert!(readings_from_text(text).is_empty());
    }

    #[test]
    fn test_english_headers_case_insensitive() {
        let text = "Point HV Average Std.Dev\n1 351 350.5 3.2\n";
        let readings = readings_from_text(text);
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].display(1), "350.5±3.2");
    }

    #[test]
    fn test_non_matching_line_closes_table() {
        let text = "点 硬度 平均 标准差\n\
                    1 350.1 350.2 4.5\n\
                    备注：表面抛光\n\
                    2 999.0 999.0 9.9\n";
        let readings = readings_from_text(text);
        // the remark line deactivates the table, so the trailing numbers
        // are not picked up
        assert_eq!(readings.len(), 1);
    }

    #[test]
    fn test_non_numeric_sd_kept_verbatim() {
        let text = "点 平均 标准差\n1 350.2 -\n";
        let readings = readings_from_text(text);
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].sd, FieldValue::Text("-".to_string()));
    }
}
