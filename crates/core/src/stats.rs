//! Per-group mean ± standard deviation statistics.
//!
//! Values that fail to parse as numbers are excluded per field; an empty
//! field yields the `/` sentinel instead of a numeric result.

use crate::types::{FieldSpec, Group, ReportSchema};

/// Sentinel shown when a field has no numeric values in the group.
pub const NO_DATA: &str = "/";

/// Formatted statistics for one group, ready for the statistics row.
#[derive(Debug, Clone)]
pub struct GroupStatistics {
    /// Thickness statistic, present only for schemas that report one.
    pub thickness: Option<String>,
    /// One `mean±sd` display string per schema field, in field order.
    pub fields: Vec<String>,
}

/// Mean and sample standard deviation (ddof = 1).
///
/// A single value has zero spread; an empty slice returns `None`.
fn mean_sd(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() == 1 {
        return Some((mean, 0.0));
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, var.sqrt()))
}

/// Format a field's statistic as a single `mean±sd` display string.
pub fn format_mean_sd(values: &[f64], decimals: u8) -> String {
    match mean_sd(values) {
        Some((mean, sd)) => format!(
            "{:.*}±{:.*}",
            decimals as usize, mean, decimals as usize, sd
        ),
        None => NO_DATA.to_string(),
    }
}

fn field_statistic(group: &Group, field_index: usize, spec: &FieldSpec) -> String {
    let values: Vec<f64> = group
        .records
        .iter()
        .filter_map(|r| r.values.get(field_index).and_then(|v| v.as_number()))
        .map(|v| v * spec.scale)
        .collect();
    format_mean_sd(&values, spec.stat_decimals)
}

/// Compute the statistics row contents for one group under a schema.
///
/// Recomputed fresh from the group on every call; nothing is cached.
pub fn summarize(group: &Group, schema: &ReportSchema) -> GroupStatistics {
    let fields = schema
        .fields
        .iter()
        .enumerate()
        .map(|(i, spec)| field_statistic(group, i, spec))
        .collect();

    let thickness = if schema.thickness_in_stats {
        let values: Vec<f64> = group
            .records
            .iter()
            .filter_map(|r| r.thickness.trim().parse::<f64>().ok())
            .collect();
        // Thickness statistics are always reported at one decimal, even when
        // data cells carry two.
        Some(format_mean_sd(&values, 1))
    } else {
        None
    };

    GroupStatistics { thickness, fields }
}
