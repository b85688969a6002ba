//! Domain types for extracted measurement data and report schemas.

use serde::{Deserialize, Serialize};

use crate::ident::SampleId;

/// A raw cell value from an instrument export.
///
/// Non-numeric text is preserved so it can be shown verbatim in the report
/// even though it is excluded from statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Empty,
}

impl FieldValue {
    /// Build a value from raw cell text, parsing a number when possible.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Text(trimmed.to_string()),
        }
    }

    /// The numeric value, if this cell holds one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Render for a data cell: numbers with optional fixed decimals and unit
    /// scale, text verbatim, empty as "".
    pub fn display(&self, decimals: Option<u8>, scale: f64) -> String {
        match self {
            Self::Number(n) => {
                let scaled = n * scale;
                match decimals {
                    Some(d) => format!("{:.*}", d as usize, scaled),
                    None => format!("{}", scaled),
                }
            }
            Self::Text(t) => t.clone(),
            Self::Empty => String::new(),
        }
    }
}

/// One physical sample as extracted from the source file.
///
/// Created during extraction and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Group prefix of the identifier.
    pub group_name: String,
    /// Sample number within the group (string; keeps leading zeros).
    pub sample_number: String,
    /// Thickness/width cell, kept as raw text (unit is context-dependent).
    pub thickness: String,
    /// Field values in the order of the report schema's field list.
    pub values: Vec<FieldValue>,
    /// True when the source identifier carried a parenthetical note.
    pub flagged: bool,
}

impl MeasurementRecord {
    /// Create a record from a parsed identifier.
    pub fn new(id: SampleId, thickness: impl Into<String>, values: Vec<FieldValue>) -> Self {
        Self {
            group_name: id.group,
            sample_number: id.number,
            thickness: thickness.into(),
            values,
            flagged: id.flagged,
        }
    }
}

/// An ordered run of records sharing a group name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub records: Vec<MeasurementRecord>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
        }
    }

    /// Number of samples; drives row expansion/contraction in the layout.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sort records numeric-ascending by sample number when every number
    /// parses as an integer; otherwise source order is kept.
    pub fn sort_by_sample_number(&mut self) {
        let parsed: Option<Vec<i64>> = self
            .records
            .iter()
            .map(|r| r.sample_number.trim().parse::<i64>().ok())
            .collect();
        if let Some(keys) = parsed {
            let mut order: Vec<usize> = (0..self.records.len()).collect();
            order.sort_by_key(|&i| keys[i]);
            let mut sorted = Vec::with_capacity(self.records.len());
            for i in order {
                sorted.push(self.records[i].clone());
            }
            self.records = sorted;
        }
    }
}

/// The full result of extracting one input file: a project identifier and
/// groups in first-appearance order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupedData {
    pub project_id: String,
    pub groups: Vec<Group>,
}

impl GroupedData {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            groups: Vec::new(),
        }
    }

    /// Append a record, creating its group on first appearance.
    pub fn push(&mut self, record: MeasurementRecord) {
        match self.groups.iter_mut().find(|g| g.name == record.group_name) {
            Some(group) => group.records.push(record),
            None => {
                let mut group = Group::new(record.group_name.clone());
                group.records.push(record);
                self.groups.push(group);
            }
        }
    }

    /// Sort every group's records by sample number (see
    /// [`Group::sort_by_sample_number`]).
    pub fn sort_groups(&mut self) {
        for group in &mut self.groups {
            group.sort_by_sample_number();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// One named numeric field of a report schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Display/source name of the field.
    pub label: String,
    /// Decimal places for the mean±SD statistic.
    pub stat_decimals: u8,
    /// Fixed decimal places for data cells; `None` renders the value as-is.
    pub data_decimals: Option<u8>,
    /// Unit scale applied before formatting (e.g. 0.001 for N→kN).
    pub scale: f64,
    /// Whether the field's output column can be removed by a caller flag.
    pub optional: bool,
}

impl FieldSpec {
    pub fn new(label: impl Into<String>, stat_decimals: u8) -> Self {
        Self {
            label: label.into(),
            stat_decimals,
            data_decimals: None,
            scale: 1.0,
            optional: false,
        }
    }

    pub fn with_data_decimals(mut self, decimals: u8) -> Self {
        self.data_decimals = Some(decimals);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Force unit for bend reports; the instrument exports newtons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForceUnit {
    Newton,
    Kilonewton,
}

impl ForceUnit {
    pub fn scale(self) -> f64 {
        match self {
            Self::Newton => 1.0,
            Self::Kilonewton => 0.001,
        }
    }
}

/// Describes how a report family lays out and formats its table columns.
///
/// Output columns are: group name, sample number, thickness, then one column
/// per field in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSchema {
    pub fields: Vec<FieldSpec>,
    /// Fixed decimals for thickness data cells; `None` keeps the raw text.
    pub thickness_decimals: Option<u8>,
    /// Whether the statistics row includes a thickness statistic.
    pub thickness_in_stats: bool,
    /// Column index of the statistics-row label.
    pub stat_label_column: usize,
    /// Text of the statistics-row label.
    pub stat_label: String,
}

impl ReportSchema {
    /// Tensile report: Rp/Rm in whole MPa, Ag/A with one decimal. The Ag
    /// column (elongation at maximum force) is optional.
    pub fn tensile() -> Self {
        Self {
            fields: vec![
                FieldSpec::new("Rp", 0),
                FieldSpec::new("Rm", 0),
                FieldSpec::new("Ag", 1).optional(),
                FieldSpec::new("A", 1),
            ],
            thickness_decimals: None,
            thickness_in_stats: false,
            stat_label_column: 0,
            stat_label: "平均值±标准差".to_string(),
        }
    }

    /// VDA bend report: max force, punch displacement, bend angle. The
    /// displacement column is optional and force is scaled per `unit`.
    pub fn vda_bend(unit: ForceUnit) -> Self {
        Self {
            fields: vec![
                FieldSpec::new("最大力Fm", 1)
                    .with_data_decimals(1)
                    .with_scale(unit.scale()),
                FieldSpec::new("压头位移S", 1)
                    .with_data_decimals(2)
                    .optional(),
                FieldSpec::new("角度", 1).with_data_decimals(2),
            ],
            thickness_decimals: Some(2),
            thickness_in_stats: true,
            stat_label_column: 1,
            stat_label: "平均值±标准差".to_string(),
        }
    }

    /// Grid column index of the first optional field, if any.
    ///
    /// Columns 0..3 are group / sample number / thickness.
    pub fn optional_column(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.optional).map(|i| 3 + i)
    }
}

/// One hardness reading extracted from a PDF statistics table.
///
/// Readings are auto-numbered sequentially across the whole document; the
/// ids printed in the source are not trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardnessReading {
    pub id: String,
    pub mean: FieldValue,
    pub sd: FieldValue,
}

impl HardnessReading {
    /// Render as `mean±sd` at the requested precision; non-numeric values
    /// pass through verbatim.
    pub fn display(&self, decimals: u8) -> String {
        match (self.mean.as_number(), self.sd.as_number()) {
            (Some(m), Some(s)) => {
                format!(
                    "{:.*}±{:.*}",
                    decimals as usize, m, decimals as usize, s
                )
            }
            _ => format!(
                "{}±{}",
                self.mean.display(None, 1.0),
                self.sd.display(None, 1.0)
            ),
        }
    }
}
