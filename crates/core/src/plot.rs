//! Boundary to the external plotting application, plus the in-process
//! dataset preparation it consumes.
//!
//! The remote application (window focus, clipboard retries, liveness) lives
//! entirely behind [`PlotDriver`]; this module only reshapes curve data the
//! way the plotter expects it: alternating X/Y column pairs, sample ids as
//! series names, and Y columns chunked into per-graph jobs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A rectangular curve dataset in alternating X/Y column layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurveDataset {
    pub headers: Vec<String>,
    /// Row-major cells; `None` where the source cell was blank or not
    /// numeric.
    pub rows: Vec<Vec<Option<f64>>>,
}

impl CurveDataset {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Swap each adjacent column pair so Y,X data becomes X,Y.
    ///
    /// An odd trailing column is left in place.
    pub fn swap_xy_pairs(&mut self) {
        let n = self.column_count();
        let mut i = 0;
        while i + 1 < n {
            self.headers.swap(i, i + 1);
            for row in &mut self.rows {
                if i + 1 < row.len() {
                    row.swap(i, i + 1);
                }
            }
            i += 2;
        }
    }

    /// Substitute sample ids for Y-column names (columns 1, 3, 5, …).
    ///
    /// Pairs beyond the available ids keep their original header.
    pub fn name_series(&mut self, sample_ids: &[String]) {
        for (pair, id) in sample_ids.iter().enumerate() {
            let y = pair * 2 + 1;
            if y < self.headers.len() {
                self.headers[y] = id.clone();
            }
        }
    }

    /// Indices of the Y columns (1, 3, 5, …).
    pub fn y_columns(&self) -> Vec<usize> {
        (1..self.column_count()).step_by(2).collect()
    }

    /// Chunk the Y columns into plot jobs of at most `lines_per_graph`
    /// curves, each Y paired with the X column immediately before it.
    pub fn plot_jobs(&self, lines_per_graph: usize) -> Vec<PlotJob> {
        let per_graph = lines_per_graph.max(1);
        self.y_columns()
            .chunks(per_graph)
            .map(|chunk| PlotJob {
                pairs: chunk.iter().map(|&y| XyPair { x: y - 1, y }).collect(),
            })
            .collect()
    }

    /// Render the dataset as CSV text (headers plus rows, blanks for `None`).
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.headers.join(","));
        out.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = (0..self.column_count())
                .map(|i| match row.get(i).copied().flatten() {
                    Some(v) => format!("{}", v),
                    None => String::new(),
                })
                .collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out
    }
}

/// One X/Y column pair to plot as a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XyPair {
    pub x: usize,
    pub y: usize,
}

/// The curves drawn into a single graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotJob {
    pub pairs: Vec<XyPair>,
}

/// Opaque handle to a dataset the driver has loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetHandle(pub u32);

/// Opaque handle to a rendered plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotHandle(pub u32);

/// Format of an exported plot artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Emf,
    Png,
}

/// An embeddable artifact produced by the plotting application.
#[derive(Debug, Clone)]
pub struct PlotArtifact {
    pub format: ArtifactFormat,
    pub bytes: Vec<u8>,
}

/// Narrow command interface to the external plotting application.
///
/// Implementations own all remote-process concerns; callers stay synchronous
/// and single-threaded.
pub trait PlotDriver {
    /// Load a prepared dataset into the plotter.
    fn open_dataset(&mut self, dataset: &CurveDataset) -> Result<DatasetHandle>;

    /// Render the given X/Y pairs as line plots, optionally from a template.
    fn plot_lines(
        &mut self,
        dataset: DatasetHandle,
        pairs: &[XyPair],
        template: Option<&Path>,
    ) -> Result<PlotHandle>;

    /// Export a rendered plot as an embeddable artifact.
    fn export_plot(&mut self, plot: PlotHandle) -> Result<PlotArtifact>;

    /// Save the plotter's project file; false when the plotter declined.
    fn save_project(&mut self, path: &Path) -> Result<bool>;
}
