//! Renders extracted group data into a template deck.
//!
//! The first slide carrying a table is the template page. It is duplicated
//! until every group has a block, each page's blocks are resized and
//! filled, unused trailing blocks are deleted, and the project-id
//! placeholder is substituted on every slide of the deck.

use std::sync::LazyLock;

use labreport_core::{
    stats::summarize, Error, FieldValue, Group, GroupedData, ReportSchema, Result,
};
use quick_xml::escape::escape;
use regex::{Captures, Regex};

use crate::layout::{self, TemplateBlock};
use crate::package::DeckPackage;
use crate::table::{CellStyle, Table};

static TEXT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<a:t>([^<]*)</a:t>").unwrap());

/// Caller-tunable rendering knobs.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Text substituted by the project identifier wherever it appears.
    pub placeholder: String,
    /// Remove the schema's optional column from every table.
    pub drop_optional: bool,
    /// Leading header rows of the template table.
    pub header_rows: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            placeholder: "项目号".to_string(),
            drop_optional: false,
            header_rows: 1,
        }
    }
}

/// Lay the extracted groups out over the template deck.
pub fn render_report(
    package: &mut DeckPackage,
    data: &GroupedData,
    schema: &ReportSchema,
    options: &RenderOptions,
) -> Result<()> {
    if data.groups.is_empty() {
        return Err(Error::NoData("no groups to lay out".to_string()));
    }

    let slide_paths = package.slide_paths()?;
    for path in &slide_paths {
        let xml = package.part_str(path)?;
        let replaced = replace_placeholder(&xml, &options.placeholder, &data.project_id);
        if replaced != xml {
            package.set_part_str(path, replaced);
        }
    }

    let template_path = slide_paths
        .iter()
        .find(|p| {
            matches!(package.part_str(p), Ok(xml) if Table::find_range(&xml).is_some())
        })
        .cloned()
        .ok_or_else(|| {
            Error::Layout("deck has no table slide to use as a template".to_string())
        })?;

    let template_xml = package.part_str(&template_path)?;
    let range = Table::find_range(&template_xml)
        .ok_or_else(|| Error::Layout("template table vanished".to_string()))?;
    let capacity =
        layout::page_capacity(&Table::parse(&template_xml[range])?, options.header_rows);

    let pages_needed = data.groups.len().div_ceil(capacity);
    let mut table_slides = vec![template_path.clone()];
    for _ in 1..pages_needed {
        table_slides.push(package.duplicate_slide(&template_path)?);
    }
    log::debug!(
        "{} groups over {} page(s), {} block(s) per page",
        data.groups.len(),
        pages_needed,
        capacity
    );

    for (slide_path, chunk) in table_slides.iter().zip(data.groups.chunks(capacity)) {
        let mut xml = package.part_str(slide_path)?;
        let Some(range) = Table::find_range(&xml) else {
            log::warn!("slide {} has no table, skipping", slide_path);
            continue;
        };
        let mut table = Table::parse(&xml[range.clone()])?;
        fill_page(&mut table, chunk, schema, options)?;
        xml.replace_range(range, &table.to_xml());
        package.set_part_str(slide_path, xml);
    }
    Ok(())
}

/// Size, fill and trim one page's table for its slice of groups.
fn fill_page(
    table: &mut Table,
    groups: &[Group],
    schema: &ReportSchema,
    options: &RenderOptions,
) -> Result<()> {
    for (index, group) in groups.iter().enumerate() {
        let block = layout::size_block(table, index, group.len(), options.header_rows)?;
        fill_block(table, block, group, schema)?;
    }
    layout::remove_trailing_blocks(table, groups.len(), options.header_rows);

    if options.drop_optional {
        if let Some(col) = schema.optional_column() {
            table.remove_column(col);
        }
    }
    Ok(())
}

fn fill_block(
    table: &mut Table,
    block: TemplateBlock,
    group: &Group,
    schema: &ReportSchema,
) -> Result<()> {
    let stats = summarize(group, schema);

    // Retained template rows can carry the template's own vertical-merge
    // state; reset it before re-merging for this group, or a shrunk block
    // keeps a rowSpan pointing past its own end.
    for row in &mut table.rows[block.start..block.stat_row] {
        for cell in &mut row.cells {
            cell.row_span = 1;
            cell.v_merge = false;
        }
    }
    if let Some(cell) = table
        .rows
        .get_mut(block.stat_row)
        .and_then(|row| row.cell_at_col_mut(0))
    {
        cell.row_span = 1;
        cell.v_merge = false;
    }

    for (offset, record) in group.records.iter().enumerate() {
        let row = table
            .rows
            .get_mut(block.start + offset)
            .ok_or_else(|| Error::Layout(format!("row {} out of range", block.start + offset)))?;

        // The group name shows once; the merge below hides the rest.
        let name = if offset == 0 { group.name.as_str() } else { "" };
        if let Some(cell) = row.cell_at_col_mut(0) {
            cell.set_text(name, &CellStyle::data());
        }
        let number_style = if record.flagged {
            CellStyle::flagged()
        } else {
            CellStyle::data()
        };
        if let Some(cell) = row.cell_at_col_mut(1) {
            cell.set_text(&record.sample_number, &number_style);
        }
        if let Some(cell) = row.cell_at_col_mut(2) {
            // Without a fixed precision the source text passes through
            // verbatim, trailing zeros included.
            let text = match schema.thickness_decimals {
                Some(d) => {
                    FieldValue::from_raw(&record.thickness).display(Some(d), 1.0)
                }
                None => record.thickness.clone(),
            };
            cell.set_text(&text, &CellStyle::data());
        }
        for (i, spec) in schema.fields.iter().enumerate() {
            let text = record
                .values
                .get(i)
                .map(|v| v.display(spec.data_decimals, spec.scale))
                .unwrap_or_default();
            if let Some(cell) = row.cell_at_col_mut(3 + i) {
                cell.set_text(&text, &CellStyle::data());
            }
        }
    }

    let style = CellStyle::statistics();
    let row = table
        .rows
        .get_mut(block.stat_row)
        .ok_or_else(|| Error::Layout(format!("statistics row {} out of range", block.stat_row)))?;
    if let Some(cell) = row.cell_at_col_mut(schema.stat_label_column) {
        cell.set_text(&schema.stat_label, &style);
    }
    if schema.thickness_in_stats {
        if let (Some(text), Some(cell)) = (stats.thickness.as_deref(), row.cell_at_col_mut(2)) {
            cell.set_text(text, &style);
        }
    }
    for (i, text) in stats.fields.iter().enumerate() {
        if let Some(cell) = row.cell_at_col_mut(3 + i) {
            cell.set_text(text, &style);
        }
    }

    // The group-name column spans the block's data rows only; the
    // statistics row stays out of the merge, and a single-row block is
    // left unmerged.
    layout::merge_rows(table, 0, block.start, block.stat_row.saturating_sub(1));
    Ok(())
}

/// Substitute the placeholder inside text runs only, leaving markup alone.
fn replace_placeholder(xml: &str, placeholder: &str, value: &str) -> String {
    if placeholder.is_empty() || !xml.contains(placeholder) {
        return xml.to_string();
    }
    let escaped = escape(value);
    TEXT_RUN
        .replace_all(xml, |caps: &Captures| {
            let text = &caps[1];
            if text.contains(placeholder) {
                format!("<a:t>{}</a:t>", text.replace(placeholder, &escaped))
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use labreport_core::{ident::parse_sample_id, ForceUnit, MeasurementRecord};
    use std::collections::BTreeMap;

    fn cell(text: &str) -> String {
        format!(
            "<a:tc><a:txBody><a:bodyPr/><a:p><a:r><a:t>{}</a:t></a:r></a:p></a:txBody><a:tcPr/></a:tc>",
            text
        )
    }

    fn spanned_cell(attrs: &str, text: &str) -> String {
        format!(
            "<a:tc {}><a:txBody><a:bodyPr/><a:p><a:r><a:t>{}</a:t></a:r></a:p></a:txBody><a:tcPr/></a:tc>",
            attrs, text
        )
    }

    fn row(texts: &[&str]) -> String {
        format!(
            r#"<a:tr h="370">{}</a:tr>"#,
            texts.iter().map(|t| cell(t)).collect::<String>()
        )
    }

    /// Template table: 7 tensile columns, header + 2 blocks of 2 data rows.
    fn template_table() -> String {
        let header = row(&["组别", "编号", "厚度", "Rp", "Rm", "Ag", "A"]);
        let data = row(&["", "", "", "", "", "", ""]);
        let stat = row(&["平均值±标准差", "", "", "", "", "", ""]);
        format!(
            r#"<a:tbl><a:tblGrid>{}</a:tblGrid>{}{}{}{}{}{}{}</a:tbl>"#,
            r#"<a:gridCol w="1"/>"#.repeat(7),
            header,
            data,
            data,
            stat,
            data,
            data,
            stat,
        )
    }

    /// Single-block variant whose group column arrives merged over all
    /// three data rows, the way hand-built templates often ship.
    fn premerged_template_table() -> String {
        let header = row(&["组别", "编号", "厚度", "Rp", "Rm", "Ag", "A"]);
        let blanks = cell("").repeat(6);
        let anchor = format!(
            r#"<a:tr h="370">{}{}</a:tr>"#,
            spanned_cell(r#"rowSpan="3""#, ""),
            blanks
        );
        let merged = format!(
            r#"<a:tr h="370">{}{}</a:tr>"#,
            spanned_cell(r#"vMerge="1""#, ""),
            blanks
        );
        let stat = row(&["平均值±标准差", "", "", "", "", "", ""]);
        format!(
            r#"<a:tbl><a:tblGrid>{}</a:tblGrid>{}{}{}{}{}</a:tbl>"#,
            r#"<a:gridCol w="1"/>"#.repeat(7),
            header,
            anchor,
            merged,
            merged,
            stat,
        )
    }

    /// VDA bend table: 6 columns, statistics label in the second column.
    fn vda_template_table() -> String {
        let header = row(&["组别", "编号", "公称厚度", "最大力", "压头位移", "角度"]);
        let data = row(&["", "", "", "", "", ""]);
        let stat = row(&["", "平均值±标准差", "", "", "", ""]);
        format!(
            r#"<a:tbl><a:tblGrid>{}</a:tblGrid>{}{}{}{}</a:tbl>"#,
            r#"<a:gridCol w="1"/>"#.repeat(6),
            header,
            data,
            data,
            stat,
        )
    }

    fn test_package(table_xml: &str) -> DeckPackage {
        let mut parts: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        parts.insert(
            "[Content_Types].xml".to_string(),
            b"<Types></Types>".to_vec(),
        );
        parts.insert(
            "ppt/presentation.xml".to_string(),
            br#"<p:presentation><p:sldIdLst><p:sldId id="256" r:id="rId1"/><p:sldId id="257" r:id="rId2"/></p:sldIdLst></p:presentation>"#.to_vec(),
        );
        parts.insert(
            "ppt/_rels/presentation.xml.rels".to_string(),
            br#"<Relationships><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide2.xml"/></Relationships>"#.to_vec(),
        );
        parts.insert(
            "ppt/slides/slide1.xml".to_string(),
            "<p:sld><p:sp><a:t>项目号测试报告</a:t></p:sp></p:sld>"
                .as_bytes()
                .to_vec(),
        );
        parts.insert(
            "ppt/slides/slide2.xml".to_string(),
            format!(
                "<p:sld><p:sp><a:t>项目号</a:t></p:sp><p:graphicFrame>{}</p:graphicFrame></p:sld>",
                table_xml
            )
            .into_bytes(),
        );

        // Round-trip through ZIP bytes to build the package.
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            use std::io::Write;
            let mut writer = zip::ZipWriter::new(&mut cursor);
            for (name, bytes) in &parts {
                writer
                    .start_file(name, zip::write::FileOptions::default())
                    .unwrap();
                writer.write_all(bytes).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.set_position(0);
        DeckPackage::from_reader(cursor).unwrap()
    }

    fn record(id: &str, rp: f64) -> MeasurementRecord {
        MeasurementRecord::new(
            parse_sample_id(id),
            "1.2",
            vec![
                FieldValue::Number(rp),
                FieldValue::Number(800.0),
                FieldValue::Number(5.0),
                FieldValue::Number(10.0),
            ],
        )
    }

    fn bend_record(id: &str, force: f64) -> MeasurementRecord {
        MeasurementRecord::new(
            parse_sample_id(id),
            "1.5",
            vec![
                FieldValue::Number(force),
                FieldValue::Number(20.0),
                FieldValue::Number(90.0),
            ],
        )
    }

    fn grouped(ids_per_group: &[(&str, &[&str])]) -> GroupedData {
        let mut data = GroupedData::new("P2024-001");
        for (_, ids) in ids_per_group {
            for id in ids.iter() {
                data.push(record(id, 500.0));
            }
        }
        data
    }

    fn slide_table(package: &DeckPackage, path: &str) -> Table {
        let xml = package.part_str(path).unwrap();
        let range = Table::find_range(&xml).unwrap();
        Table::parse(&xml[range]).unwrap()
    }

    #[test]
    fn test_render_replicates_pages_and_fills_blocks() {
        let mut package = test_package(&template_table());
        // 3 groups over capacity 2 needs a second table page.
        let data = grouped(&[
            ("A", &["A-1", "A-2", "A-3"]),
            ("B", &["B-1"]),
            ("C", &["C-1", "C-2"]),
        ]);
        render_report(
            &mut package,
            &data,
            &ReportSchema::tensile(),
            &RenderOptions::default(),
        )
        .unwrap();

        let paths = package.slide_paths().unwrap();
        assert_eq!(paths.len(), 3);

        // Page 1: group A grown to 3 rows, group B shrunk to 1.
        let table = slide_table(&package, "ppt/slides/slide2.xml");
        let blocks = layout::find_blocks(&table, 1);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].data_rows(), 3);
        assert_eq!(blocks[1].data_rows(), 1);
        assert_eq!(table.rows[1].cells[0].text(), "A");
        assert_eq!(table.rows[1].cells[1].text(), "1");
        assert_eq!(table.rows[3].cells[1].text(), "3");
        assert_eq!(table.rows[4].cells[0].text(), "平均值±标准差");
        assert_eq!(table.rows[4].cells[3].text(), "500±0");
        // The group column is merged over the data rows.
        assert_eq!(table.rows[1].cells[0].row_span, 3);
        assert!(table.rows[2].cells[0].v_merge);

        // Page 2: one block used, the trailing one deleted.
        let table = slide_table(&package, "ppt/slides/slide3.xml");
        let blocks = layout::find_blocks(&table, 1);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].data_rows(), 2);
        assert_eq!(table.rows[1].cells[0].text(), "C");
    }

    #[test]
    fn test_placeholder_replaced_on_every_slide() {
        let mut package = test_package(&template_table());
        let data = grouped(&[("A", &["A-1"])]);
        render_report(
            &mut package,
            &data,
            &ReportSchema::tensile(),
            &RenderOptions::default(),
        )
        .unwrap();

        let title = package.part_str("ppt/slides/slide1.xml").unwrap();
        assert!(title.contains("P2024-001测试报告"));
        assert!(!title.contains("项目号"));
    }

    #[test]
    fn test_flagged_sample_number_is_red() {
        let mut package = test_package(&template_table());
        let mut data = GroupedData::new("P1");
        data.push(record("A-1（复测）", 500.0));
        render_report(
            &mut package,
            &data,
            &ReportSchema::tensile(),
            &RenderOptions::default(),
        )
        .unwrap();

        let xml = package.part_str("ppt/slides/slide2.xml").unwrap();
        assert!(xml.contains(r#"<a:srgbClr val="FF0000"/>"#));
    }

    #[test]
    fn test_drop_optional_removes_ag_column() {
        let mut package = test_package(&template_table());
        let data = grouped(&[("A", &["A-1", "A-2"])]);
        let options = RenderOptions {
            drop_optional: true,
            ..RenderOptions::default()
        };
        render_report(&mut package, &data, &ReportSchema::tensile(), &options).unwrap();

        let table = slide_table(&package, "ppt/slides/slide2.xml");
        assert_eq!(table.column_count(), 6);
        // The A column moved into Ag's old position.
        assert_eq!(table.rows[1].cells[5].text(), "10");
    }

    #[test]
    fn test_shrunk_block_drops_template_merge_state() {
        let mut package = test_package(&premerged_template_table());
        let mut data = GroupedData::new("P1");
        data.push(record("A-1", 500.0));
        render_report(
            &mut package,
            &data,
            &ReportSchema::tensile(),
            &RenderOptions::default(),
        )
        .unwrap();

        let table = slide_table(&package, "ppt/slides/slide2.xml");
        let blocks = layout::find_blocks(&table, 1);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].data_rows(), 1);
        assert_eq!(table.rows[1].cells[0].text(), "A");
        assert_eq!(table.rows[1].cells[0].row_span, 1);
        // The template's merge is gone entirely, not just shortened.
        let xml = package.part_str("ppt/slides/slide2.xml").unwrap();
        assert!(!xml.contains("rowSpan"));
        assert!(!xml.contains("vMerge"));
    }

    #[test]
    fn test_vda_merge_spans_data_rows_only() {
        let mut package = test_package(&vda_template_table());
        let mut data = GroupedData::new("P1");
        data.push(bend_record("B-1", 15000.0));
        data.push(bend_record("B-2", 17000.0));
        render_report(
            &mut package,
            &data,
            &ReportSchema::vda_bend(ForceUnit::Kilonewton),
            &RenderOptions::default(),
        )
        .unwrap();

        let table = slide_table(&package, "ppt/slides/slide2.xml");
        assert_eq!(table.rows[1].cells[0].text(), "B");
        assert_eq!(table.rows[1].cells[0].row_span, 2);
        assert!(table.rows[2].cells[0].v_merge);
        // The statistics row keeps its own group cell.
        assert_eq!(table.rows[3].cells[1].text(), "平均值±标准差");
        assert_eq!(table.rows[3].cells[0].row_span, 1);
        assert!(!table.rows[3].cells[0].v_merge);
    }

    #[test]
    fn test_single_sample_group_stays_unmerged() {
        let mut package = test_package(&vda_template_table());
        let mut data = GroupedData::new("P1");
        data.push(bend_record("B-1", 15000.0));
        render_report(
            &mut package,
            &data,
            &ReportSchema::vda_bend(ForceUnit::Kilonewton),
            &RenderOptions::default(),
        )
        .unwrap();

        let table = slide_table(&package, "ppt/slides/slide2.xml");
        assert_eq!(table.rows[1].cells[0].text(), "B");
        assert_eq!(table.rows[1].cells[0].row_span, 1);
        let xml = package.part_str("ppt/slides/slide2.xml").unwrap();
        assert!(!xml.contains("vMerge"));
    }

    #[test]
    fn test_no_table_slide_is_an_error() {
        let mut package = test_package(&template_table());
        package.set_part_str("ppt/slides/slide2.xml", "<p:sld>empty</p:sld>".to_string());
        let data = grouped(&[("A", &["A-1"])]);
        let err = render_report(
            &mut package,
            &data,
            &ReportSchema::tensile(),
            &RenderOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Layout(_)));
    }

    #[test]
    fn test_replace_placeholder_leaves_markup_alone() {
        let xml = r#"<p:sp name="项目号"><a:t>项目号报告</a:t></p:sp>"#;
        let out = replace_placeholder(xml, "项目号", "P-1");
        assert_eq!(out, r#"<p:sp name="项目号"><a:t>P-1报告</a:t></p:sp>"#);
    }
}
