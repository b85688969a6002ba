//! Typed model of a DrawingML (`<a:tbl>`) slide table.
//!
//! Parsing absorbs horizontal continuation cells (`hMerge="1"`) into their
//! anchor's `grid_span`, so a row's cell list matches what a reader sees;
//! serialization re-emits the continuations. Vertical continuation cells
//! stay in the row (they occupy a grid position) marked with `v_merge`.
//!
//! Cell formatting the layout engine does not touch (`tcPr`, `txBody`) is
//! carried verbatim as raw XML and only regenerated when a cell's text is
//! rewritten.

use std::io::Cursor;
use std::sync::LazyLock;

use labreport_core::{Error, Result};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;

/// Accent color used for statistics rows.
pub const THEME_COLOR: (u8, u8, u8) = (25, 137, 141);

/// Color used to flag annotated sample identifiers.
pub const RED: (u8, u8, u8) = (255, 0, 0);

const FONT: &str = "微软雅黑";

const EMPTY_TX_BODY: &str =
    r#"<a:txBody><a:bodyPr/><a:lstStyle/><a:p><a:pPr algn="ctr"/><a:endParaRPr lang="zh-CN"/></a:p></a:txBody>"#;

static ANCHOR_ATTR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"anchor="[^"]*""#).unwrap());

/// Character formatting applied when a cell's text is rewritten.
#[derive(Debug, Clone, Copy)]
pub struct CellStyle {
    /// Font size in hundredths of a point.
    pub size: u32,
    pub bold: bool,
    pub color: (u8, u8, u8),
}

impl CellStyle {
    /// Plain data cell.
    pub fn data() -> Self {
        Self {
            size: 1400,
            bold: false,
            color: (0, 0, 0),
        }
    }

    /// Data cell for a flagged sample identifier.
    pub fn flagged() -> Self {
        Self {
            color: RED,
            ..Self::data()
        }
    }

    /// Statistics row cell.
    pub fn statistics() -> Self {
        Self {
            bold: true,
            color: THEME_COLOR,
            ..Self::data()
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }
}

/// One table cell. Horizontal continuations are absorbed into `grid_span`.
#[derive(Debug, Clone)]
pub struct TableCell {
    /// Grid columns this cell covers (>= 1).
    pub grid_span: usize,
    /// Rows this cell covers when it anchors a vertical merge (>= 1).
    pub row_span: usize,
    /// True for a vertical continuation cell.
    pub v_merge: bool,
    tc_pr: Option<String>,
    tx_body: String,
}

impl TableCell {
    fn empty() -> Self {
        Self {
            grid_span: 1,
            row_span: 1,
            v_merge: false,
            tc_pr: None,
            tx_body: EMPTY_TX_BODY.to_string(),
        }
    }

    /// The cell's visible text, all runs concatenated.
    pub fn text(&self) -> String {
        let mut reader = Reader::from_str(&self.tx_body);
        let mut out = String::new();
        loop {
            match reader.read_event() {
                Ok(Event::Text(ref e)) => {
                    out.push_str(&e.unescape().unwrap_or_default());
                }
                Ok(Event::Eof) | Err(_) => break,
                _ => {}
            }
        }
        out
    }

    /// Replace the cell content with a single centered run.
    pub fn set_text(&mut self, text: &str, style: &CellStyle) {
        let bold = if style.bold { r#" b="1""# } else { "" };
        let (r, g, b) = style.color;
        self.tx_body = format!(
            concat!(
                r#"<a:txBody><a:bodyPr/><a:lstStyle/><a:p><a:pPr algn="ctr"/>"#,
                r#"<a:r><a:rPr lang="zh-CN" altLang="en-US" sz="{size}"{bold}>"#,
                r#"<a:solidFill><a:srgbClr val="{r:02X}{g:02X}{b:02X}"/></a:solidFill>"#,
                r#"<a:latin typeface="{font}"/><a:ea typeface="{font}"/></a:rPr>"#,
                r#"<a:t>{text}</a:t></a:r></a:p></a:txBody>"#
            ),
            size = style.size,
            bold = bold,
            r = r,
            g = g,
            b = b,
            font = FONT,
            text = escape(text),
        );
        self.center_vertically();
    }

    /// Drop the cell content, keeping cell-level formatting.
    pub fn clear_text(&mut self) {
        self.tx_body = EMPTY_TX_BODY.to_string();
    }

    fn center_vertically(&mut self) {
        const OPEN: &str = "<a:tcPr";
        self.tc_pr = Some(match self.tc_pr.take() {
            None => r#"<a:tcPr anchor="ctr"/>"#.to_string(),
            Some(pr) if pr.contains("anchor=") => {
                ANCHOR_ATTR.replace(&pr, r#"anchor="ctr""#).into_owned()
            }
            Some(pr) => {
                let mut out = String::with_capacity(pr.len() + 16);
                out.push_str(OPEN);
                out.push_str(r#" anchor="ctr""#);
                out.push_str(&pr[OPEN.len()..]);
                out
            }
        });
    }

    fn to_xml(&self, out: &mut String) {
        out.push_str("<a:tc");
        if self.grid_span > 1 {
            out.push_str(&format!(r#" gridSpan="{}""#, self.grid_span));
        }
        if self.row_span > 1 {
            out.push_str(&format!(r#" rowSpan="{}""#, self.row_span));
        }
        if self.v_merge {
            out.push_str(r#" vMerge="1""#);
        }
        out.push('>');
        out.push_str(&self.tx_body);
        match &self.tc_pr {
            Some(pr) => out.push_str(pr),
            None => out.push_str("<a:tcPr/>"),
        }
        out.push_str("</a:tc>");

        // Horizontal continuations are regenerated, mirroring the vertical
        // merge state of their anchor.
        for _ in 1..self.grid_span {
            out.push_str(r#"<a:tc hMerge="1""#);
            if self.v_merge {
                out.push_str(r#" vMerge="1""#);
            }
            out.push('>');
            out.push_str(EMPTY_TX_BODY);
            out.push_str("<a:tcPr/></a:tc>");
        }
    }
}

/// One table row.
#[derive(Debug, Clone)]
pub struct TableRow {
    /// Raw row height attribute.
    pub height: String,
    pub cells: Vec<TableCell>,
}

impl TableRow {
    /// The cell covering a grid column, accounting for spans.
    pub fn cell_at_col(&self, col: usize) -> Option<&TableCell> {
        let mut pos = 0;
        for cell in &self.cells {
            if col < pos + cell.grid_span {
                return Some(cell);
            }
            pos += cell.grid_span;
        }
        None
    }

    /// Mutable variant of [`cell_at_col`](Self::cell_at_col).
    pub fn cell_at_col_mut(&mut self, col: usize) -> Option<&mut TableCell> {
        let mut pos = 0;
        for cell in &mut self.cells {
            if col < pos + cell.grid_span {
                return Some(cell);
            }
            pos += cell.grid_span;
        }
        None
    }

    /// A copy suitable for inserting as a fresh data row: text cleared and
    /// vertical merge state stripped, horizontal spans kept.
    pub fn clone_for_fill(&self) -> Self {
        let cells = self
            .cells
            .iter()
            .map(|cell| {
                let mut cell = cell.clone();
                cell.v_merge = false;
                cell.row_span = 1;
                cell.clear_text();
                cell
            })
            .collect();
        Self {
            height: self.height.clone(),
            cells,
        }
    }

    fn to_xml(&self, out: &mut String) {
        out.push_str(&format!(r#"<a:tr h="{}">"#, self.height));
        for cell in &self.cells {
            cell.to_xml(out);
        }
        out.push_str("</a:tr>");
    }
}

/// A slide table.
#[derive(Debug, Clone)]
pub struct Table {
    tbl_pr: String,
    /// Raw widths of the grid columns.
    pub grid_widths: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl Table {
    /// Byte range of the first `<a:tbl>` element in a slide part, if any.
    pub fn find_range(xml: &str) -> Option<std::ops::Range<usize>> {
        const OPEN: &str = "<a:tbl";
        const CLOSE: &str = "</a:tbl>";
        let mut from = 0;
        while let Some(rel) = xml[from..].find(OPEN) {
            let start = from + rel;
            // "<a:tbl" also prefixes tblPr and tblGrid.
            match xml.as_bytes().get(start + OPEN.len()) {
                Some(b'>') | Some(b' ') => {
                    let end = xml[start..].find(CLOSE)?;
                    return Some(start..start + end + CLOSE.len());
                }
                _ => from = start + OPEN.len(),
            }
        }
        None
    }

    /// Parse an `<a:tbl>` region.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut table = Self {
            tbl_pr: String::new(),
            grid_widths: Vec::new(),
            rows: Vec::new(),
        };
        let mut continuations = 0usize;

        loop {
            match reader.read_event().map_err(|e| Error::Xml(e.to_string()))? {
                Event::Start(e) => match local_name(e.name().as_ref()) {
                    b"tblPr" => {
                        table.tbl_pr = capture_element(&mut reader, &e)?;
                    }
                    b"gridCol" => {
                        table.grid_widths.push(attr(&e, b"w").unwrap_or_default());
                        reader
                            .read_to_end(e.name())
                            .map_err(|e| Error::Xml(e.to_string()))?;
                    }
                    b"tr" => {
                        table.rows.push(TableRow {
                            height: attr(&e, b"h").unwrap_or_default(),
                            cells: Vec::new(),
                        });
                        continuations = 0;
                    }
                    b"tc" => {
                        let is_continuation = attr(&e, b"hMerge").is_some();
                        let cell = parse_cell(&mut reader, &e)?;
                        let row = table
                            .rows
                            .last_mut()
                            .ok_or_else(|| Error::Xml("Cell outside a table row".to_string()))?;
                        if is_continuation {
                            // Absorbed into the anchor; make sure its span
                            // accounts for this grid position.
                            continuations += 1;
                            if let Some(anchor) = row.cells.last_mut() {
                                anchor.grid_span = anchor.grid_span.max(1 + continuations);
                            }
                        } else {
                            continuations = 0;
                            row.cells.push(cell);
                        }
                    }
                    _ => {}
                },
                Event::Empty(e) => match local_name(e.name().as_ref()) {
                    b"tblPr" => {
                        table.tbl_pr = serialize_empty(&e)?;
                    }
                    b"gridCol" => {
                        table.grid_widths.push(attr(&e, b"w").unwrap_or_default());
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        if table.grid_widths.is_empty() {
            return Err(Error::Xml("Table has no column grid".to_string()));
        }
        Ok(table)
    }

    pub fn column_count(&self) -> usize {
        self.grid_widths.len()
    }

    /// Remove one grid column. Cells spanning it shrink by one column;
    /// single-column cells are dropped.
    pub fn remove_column(&mut self, col: usize) {
        if col >= self.grid_widths.len() {
            return;
        }
        self.grid_widths.remove(col);
        for row in &mut self.rows {
            let mut pos = 0;
            for i in 0..row.cells.len() {
                let span = row.cells[i].grid_span;
                if col < pos + span {
                    if span > 1 {
                        row.cells[i].grid_span -= 1;
                    } else {
                        row.cells.remove(i);
                    }
                    break;
                }
                pos += span;
            }
        }
    }

    /// Serialize back to an `<a:tbl>` region.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str("<a:tbl>");
        out.push_str(&self.tbl_pr);
        out.push_str("<a:tblGrid>");
        for width in &self.grid_widths {
            out.push_str(&format!(r#"<a:gridCol w="{}"/>"#, width));
        }
        out.push_str("</a:tblGrid>");
        for row in &self.rows {
            row.to_xml(&mut out);
        }
        out.push_str("</a:tbl>");
        out
    }
}

/// Parse one `<a:tc>` element, capturing its formatting parts verbatim.
fn parse_cell(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<TableCell> {
    let mut cell = TableCell::empty();
    if let Some(span) = attr(start, b"gridSpan") {
        cell.grid_span = span.parse().unwrap_or(1);
    }
    if let Some(span) = attr(start, b"rowSpan") {
        cell.row_span = span.parse().unwrap_or(1);
    }
    cell.v_merge = attr(start, b"vMerge").is_some();

    loop {
        match reader.read_event().map_err(|e| Error::Xml(e.to_string()))? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"txBody" => cell.tx_body = capture_element(reader, &e)?,
                b"tcPr" => cell.tc_pr = Some(capture_element(reader, &e)?),
                _ => {
                    reader
                        .read_to_end(e.name())
                        .map_err(|e| Error::Xml(e.to_string()))?;
                }
            },
            Event::Empty(e) => {
                if local_name(e.name().as_ref()) == b"tcPr" {
                    cell.tc_pr = Some(serialize_empty(&e)?);
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"tc" => break,
            Event::Eof => {
                return Err(Error::Xml("Unclosed table cell".to_string()));
            }
            _ => {}
        }
    }
    Ok(cell)
}

/// Copy an element and its subtree verbatim into a string.
fn capture_element(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Start(start.to_owned()))
        .map_err(|e| Error::Xml(e.to_string()))?;

    let mut depth = 1usize;
    loop {
        let event = reader.read_event().map_err(|e| Error::Xml(e.to_string()))?;
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => {
                return Err(Error::Xml("Unclosed element in slide table".to_string()));
            }
            _ => {}
        }
        writer
            .write_event(event)
            .map_err(|e| Error::Xml(e.to_string()))?;
        if depth == 0 {
            break;
        }
    }

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| Error::Xml(format!("Captured element is not UTF-8: {}", e)))
}

fn serialize_empty(element: &BytesStart) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Empty(element.to_owned()))
        .map_err(|e| Error::Xml(e.to_string()))?;
    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| Error::Xml(format!("Captured element is not UTF-8: {}", e)))
}

fn attr(element: &BytesStart, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

/// Local part of a namespaced element name.
fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn cell_xml(text: &str) -> String {
        format!(
            "<a:tc><a:txBody><a:bodyPr/><a:p><a:r><a:t>{}</a:t></a:r></a:p></a:txBody><a:tcPr/></a:tc>",
            text
        )
    }

    fn sample_table() -> String {
        let mut xml = String::from(
            r#"<a:tbl><a:tblPr firstRow="1"/><a:tblGrid><a:gridCol w="100"/><a:gridCol w="200"/><a:gridCol w="300"/></a:tblGrid>"#,
        );
        // Header: a two-column merged cell plus its continuation, then one
        // plain cell.
        xml.push_str(r#"<a:tr h="370"><a:tc gridSpan="2"><a:txBody><a:bodyPr/><a:p><a:r><a:t>头</a:t></a:r></a:p></a:txBody><a:tcPr anchor="t"/></a:tc><a:tc hMerge="1"><a:txBody><a:bodyPr/><a:p/></a:txBody><a:tcPr/></a:tc>"#);
        xml.push_str(&cell_xml("X"));
        xml.push_str("</a:tr>");
        xml.push_str(&format!(
            r#"<a:tr h="370">{}{}{}</a:tr>"#,
            cell_xml("a"),
            cell_xml("b"),
            cell_xml("c")
        ));
        xml.push_str("</a:tbl>");
        xml
    }

    #[test]
    fn test_parse_absorbs_horizontal_continuations() {
        let table = Table::parse(&sample_table()).unwrap();
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.rows.len(), 2);

        let header = &table.rows[0];
        assert_eq!(header.cells.len(), 2);
        assert_eq!(header.cells[0].grid_span, 2);
        assert_eq!(header.cells[0].text(), "头");
        assert_eq!(header.cells[1].text(), "X");
    }

    #[test]
    fn test_serialize_regenerates_continuations() {
        let table = Table::parse(&sample_table()).unwrap();
        let xml = table.to_xml();
        assert_eq!(xml.matches(r#"hMerge="1""#).count(), 1);
        assert!(xml.contains(r#"gridSpan="2""#));
        // Untouched formatting survives verbatim.
        assert!(xml.contains(r#"<a:tblPr firstRow="1"/>"#));
        assert!(xml.contains(r#"<a:tcPr anchor="t"/>"#));

        // The output parses back to the same shape.
        let reparsed = Table::parse(&xml).unwrap();
        assert_eq!(reparsed.rows[0].cells.len(), 2);
        assert_eq!(reparsed.rows[0].cells[0].grid_span, 2);
    }

    #[test]
    fn test_cell_at_col_accounts_for_spans() {
        let table = Table::parse(&sample_table()).unwrap();
        let header = &table.rows[0];
        assert_eq!(header.cell_at_col(0).unwrap().text(), "头");
        assert_eq!(header.cell_at_col(1).unwrap().text(), "头");
        assert_eq!(header.cell_at_col(2).unwrap().text(), "X");
        assert!(header.cell_at_col(3).is_none());
    }

    #[test]
    fn test_remove_column_shrinks_spanning_cells() {
        let mut table = Table::parse(&sample_table()).unwrap();
        table.remove_column(1);
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.grid_widths, vec!["100", "300"]);

        // The merged header cell shrinks instead of disappearing.
        assert_eq!(table.rows[0].cells.len(), 2);
        assert_eq!(table.rows[0].cells[0].grid_span, 1);
        assert_eq!(table.rows[0].cells[0].text(), "头");
        // The plain data row loses one cell.
        assert_eq!(table.rows[1].cells.len(), 2);
        assert_eq!(table.rows[1].cells[1].text(), "c");
    }

    #[test]
    fn test_set_text_escapes_and_centers() {
        let mut table = Table::parse(&sample_table()).unwrap();
        let cell = &mut table.rows[1].cells[0];
        cell.set_text("A&B", &CellStyle::statistics());
        assert_eq!(cell.text(), "A&B");

        let xml = table.to_xml();
        assert!(xml.contains("A&amp;B"));
        assert!(xml.contains(r#"b="1""#));
        assert!(xml.contains(r#"<a:srgbClr val="19898D"/>"#));
        assert!(xml.contains(r#"anchor="ctr""#));
    }

    #[test]
    fn test_clone_for_fill_strips_vertical_merge() {
        let xml = format!(
            r#"<a:tbl><a:tblGrid><a:gridCol w="1"/><a:gridCol w="2"/></a:tblGrid><a:tr h="370"><a:tc rowSpan="2"><a:txBody><a:bodyPr/><a:p><a:r><a:t>G</a:t></a:r></a:p></a:txBody><a:tcPr/></a:tc>{}</a:tr></a:tbl>"#,
            cell_xml("v")
        );
        let table = Table::parse(&xml).unwrap();
        let clone = table.rows[0].clone_for_fill();
        assert_eq!(clone.cells[0].row_span, 1);
        assert!(!clone.cells[0].v_merge);
        assert_eq!(clone.cells[0].text(), "");
        assert_eq!(clone.height, "370");
    }

    #[test]
    fn test_find_range_skips_tbl_prefixed_names() {
        let slide = format!(
            "<p:sld><p:graphicFrame>{}</p:graphicFrame></p:sld>",
            sample_table()
        );
        let range = Table::find_range(&slide).unwrap();
        assert!(slide[range.clone()].starts_with("<a:tbl>"));
        assert!(slide[range].ends_with("</a:tbl>"));
        assert!(Table::find_range("<p:sld>no tables</p:sld>").is_none());
    }
}
