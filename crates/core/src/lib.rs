//! Core domain types, identifier parsing, statistics, configuration, and the
//! plot-driver boundary for lab measurement report generation.

pub mod config;
pub mod error;
pub mod ident;
pub mod plot;
pub mod stats;
pub mod types;

pub use config::TemplateConfig;
pub use error::{Error, Result};
pub use ident::{parse_sample_id, SampleId};
pub use stats::{summarize, GroupStatistics};
pub use types::{
    FieldSpec, FieldValue, ForceUnit, Group, GroupedData, HardnessReading, MeasurementRecord,
    ReportSchema,
};
