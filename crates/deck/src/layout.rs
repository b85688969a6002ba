//! Block-oriented table layout: locating, resizing and merging the
//! per-group blocks of a template table.
//!
//! A template table is header rows followed by blocks, each block being
//! data rows closed by a statistics row. Statistics rows are recognized by
//! marker text, and every operation re-scans for them instead of caching
//! row indices, so positions stay correct across structural edits.

use labreport_core::{Error, Result};

use crate::table::{Table, TableRow};

/// A statistics row is one whose cell text contains any of these
/// (case-insensitive).
const STAT_MARKERS: [&str; 3] = ["平均", "average", "mean"];

/// One per-group block of the template table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateBlock {
    /// First data row index.
    pub start: usize,
    /// Index of the closing statistics row.
    pub stat_row: usize,
}

impl TemplateBlock {
    pub fn data_rows(&self) -> usize {
        self.stat_row - self.start
    }
}

/// True when any cell of the row carries a statistics marker.
pub fn is_stat_row(row: &TableRow) -> bool {
    row.cells.iter().any(|cell| {
        let text = cell.text().to_lowercase();
        STAT_MARKERS.iter().any(|m| text.contains(m))
    })
}

/// Scan the table for its blocks, skipping `header_rows` leading rows.
pub fn find_blocks(table: &Table, header_rows: usize) -> Vec<TemplateBlock> {
    let mut blocks = Vec::new();
    let mut start = header_rows;
    for (i, row) in table.rows.iter().enumerate().skip(header_rows) {
        if is_stat_row(row) {
            blocks.push(TemplateBlock {
                start: start.min(i),
                stat_row: i,
            });
            start = i + 1;
        }
    }
    blocks
}

/// How many groups one copy of the template table can hold.
pub fn page_capacity(table: &Table, header_rows: usize) -> usize {
    find_blocks(table, header_rows).len().max(1)
}

/// Resize one block to exactly `needed` data rows and return its fresh
/// position.
///
/// Grown blocks clone the last data row (text cleared, vertical merge
/// stripped); shrunk blocks drop rows from just above the statistics row.
pub fn size_block(
    table: &mut Table,
    index: usize,
    needed: usize,
    header_rows: usize,
) -> Result<TemplateBlock> {
    let block = block_at(table, index, header_rows)?;
    let current = block.data_rows();

    if needed > current {
        let template_row = if current > 0 {
            table.rows[block.stat_row - 1].clone_for_fill()
        } else {
            table.rows[block.stat_row].clone_for_fill()
        };
        for _ in current..needed {
            table.rows.insert(block.stat_row, template_row.clone());
        }
    } else if needed < current {
        table.rows.drain(block.start + needed..block.stat_row);
    }

    block_at(table, index, header_rows)
}

/// Delete every block past the first `used` ones.
pub fn remove_trailing_blocks(table: &mut Table, used: usize, header_rows: usize) {
    let blocks = find_blocks(table, header_rows);
    if used >= blocks.len() {
        return;
    }
    let start = blocks[used].start;
    let end = blocks[blocks.len() - 1].stat_row + 1;
    table.rows.drain(start..end);
}

/// Vertically merge one grid column across rows `start..=end`: the top cell
/// anchors the merge, the rest become continuations.
pub fn merge_rows(table: &mut Table, col: usize, start: usize, end: usize) {
    if end <= start || end >= table.rows.len() {
        return;
    }
    if let Some(anchor) = table.rows[start].cell_at_col_mut(col) {
        anchor.row_span = end - start + 1;
        anchor.v_merge = false;
    }
    for row in &mut table.rows[start + 1..=end] {
        if let Some(cell) = row.cell_at_col_mut(col) {
            cell.v_merge = true;
            cell.row_span = 1;
        }
    }
}

fn block_at(table: &Table, index: usize, header_rows: usize) -> Result<TemplateBlock> {
    find_blocks(table, header_rows)
        .get(index)
        .copied()
        .ok_or_else(|| {
            Error::Layout(format!(
                "template table has no block {} (too few statistics rows)",
                index + 1
            ))
        })
}
