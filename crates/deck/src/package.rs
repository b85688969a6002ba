//! In-memory .pptx package: part access, slide ordering, slide replication.
//!
//! A presentation package is a ZIP of XML parts. Slides are ordered by the
//! `p:sldIdLst` of ppt/presentation.xml, whose `r:id` references resolve
//! through ppt/_rels/presentation.xml.rels. Duplicating a slide touches all
//! four registries: the slide part itself, its relationships part, the
//! content-types manifest, and the presentation's slide list.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::LazyLock;

use labreport_core::{Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

static SLD_ID_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<p:sldId[^>]*\br:id="([^"]+)""#).unwrap());
static REL_ID_NUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"Id="rId(\d+)""#).unwrap());
static SLIDE_NUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ppt/slides/slide(\d+)\.xml$").unwrap());
static SLD_ID_NUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"<p:sldId id="(\d+)""#).unwrap());

const SLIDE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
const SLIDE_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";

/// A presentation package held fully in memory as named parts.
pub struct DeckPackage {
    parts: BTreeMap<String, Vec<u8>>,
}

impl DeckPackage {
    /// Read every part of a .pptx file into memory.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Read a package from any seekable reader.
    pub fn from_reader<R: Read + std::io::Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| Error::Zip(format!("Failed to open package: {}", e)))?;

        let mut parts = BTreeMap::new();
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| Error::Zip(format!("Bad package entry: {}", e)))?;
            if entry.is_dir() {
                continue;
            }
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| Error::Zip(format!("Failed to read '{}': {}", entry.name(), e)))?;
            parts.insert(entry.name().to_string(), bytes);
        }
        Ok(Self { parts })
    }

    /// A part's content as UTF-8 text.
    pub fn part_str(&self, name: &str) -> Result<String> {
        let bytes = self
            .parts
            .get(name)
            .ok_or_else(|| Error::Zip(format!("Part '{}' not found in package", name)))?;
        String::from_utf8(bytes.clone())
            .map_err(|e| Error::Xml(format!("Part '{}' is not UTF-8: {}", name, e)))
    }

    /// Replace (or add) a text part.
    pub fn set_part_str(&mut self, name: &str, content: String) {
        self.parts.insert(name.to_string(), content.into_bytes());
    }

    /// Slide part names in presentation order.
    pub fn slide_paths(&self) -> Result<Vec<String>> {
        let rels = self.part_str("ppt/_rels/presentation.xml.rels")?;
        let targets = slide_relationships(&rels)?;
        let presentation = self.part_str("ppt/presentation.xml")?;

        let mut paths = Vec::new();
        for caps in SLD_ID_REF.captures_iter(&presentation) {
            let rid = &caps[1];
            match targets.iter().find(|(id, _)| id == rid) {
                Some((_, target)) => paths.push(normalize_target(target)),
                None => {
                    return Err(Error::Xml(format!(
                        "Slide reference {} has no relationship entry",
                        rid
                    )));
                }
            }
        }
        Ok(paths)
    }

    /// Append a copy of `source` (a slide part name) as a new last slide.
    ///
    /// Returns the new slide's part name.
    pub fn duplicate_slide(&mut self, source: &str) -> Result<String> {
        let slide_xml = self
            .parts
            .get(source)
            .cloned()
            .ok_or_else(|| Error::Zip(format!("Part '{}' not found in package", source)))?;

        let next_num = 1 + self
            .parts
            .keys()
            .filter_map(|name| SLIDE_NUM.captures(name))
            .filter_map(|c| c[1].parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        let new_path = format!("ppt/slides/slide{}.xml", next_num);
        self.parts.insert(new_path.clone(), slide_xml);

        // The slide's own relationships (layout, images) travel with it.
        if let Some(rels) = self.parts.get(&rels_path(source)).cloned() {
            self.parts.insert(rels_path(&new_path), rels);
        }

        self.register_content_type(&new_path)?;
        let rid = self.register_relationship(next_num)?;
        self.register_slide_id(&rid)?;

        Ok(new_path)
    }

    fn register_content_type(&mut self, slide_path: &str) -> Result<()> {
        let manifest = self.part_str("[Content_Types].xml")?;
        let entry = format!(
            r#"<Override PartName="/{}" ContentType="{}"/>"#,
            slide_path, SLIDE_CONTENT_TYPE
        );
        let updated = insert_before(&manifest, "</Types>", &entry)?;
        self.set_part_str("[Content_Types].xml", updated);
        Ok(())
    }

    fn register_relationship(&mut self, slide_num: u32) -> Result<String> {
        let rels = self.part_str("ppt/_rels/presentation.xml.rels")?;
        let next_id = 1 + REL_ID_NUM
            .captures_iter(&rels)
            .filter_map(|c| c[1].parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        let rid = format!("rId{}", next_id);
        let entry = format!(
            r#"<Relationship Id="{}" Type="{}" Target="slides/slide{}.xml"/>"#,
            rid, SLIDE_REL_TYPE, slide_num
        );
        let updated = insert_before(&rels, "</Relationships>", &entry)?;
        self.set_part_str("ppt/_rels/presentation.xml.rels", updated);
        Ok(rid)
    }

    fn register_slide_id(&mut self, rid: &str) -> Result<()> {
        let presentation = self.part_str("ppt/presentation.xml")?;
        // Slide ids must be unique and at least 256.
        let next_id = 1 + SLD_ID_NUM
            .captures_iter(&presentation)
            .filter_map(|c| c[1].parse::<u32>().ok())
            .max()
            .unwrap_or(255);
        let entry = format!(r#"<p:sldId id="{}" r:id="{}"/>"#, next_id, rid);
        let updated = insert_before(&presentation, "</p:sldIdLst>", &entry)?;
        self.set_part_str("ppt/presentation.xml", updated);
        Ok(())
    }

    /// Write the package back out as a .pptx file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| {
            Error::Save(format!(
                "Cannot write {} (is it open in another program?): {}",
                path.display(),
                e
            ))
        })?;
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for (name, bytes) in &self.parts {
            writer
                .start_file(name, options)
                .map_err(|e| Error::Save(format!("Failed to add '{}': {}", name, e)))?;
            writer
                .write_all(bytes)
                .map_err(|e| Error::Save(format!("Failed to write '{}': {}", name, e)))?;
        }
        writer
            .finish()
            .map_err(|e| Error::Save(format!("Failed to finish {}: {}", path.display(), e)))?;
        Ok(())
    }
}

/// Slide relationship entries (id, target) from a relationships part.
fn slide_relationships(rels_xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(rels_xml);
    reader.trim_text(true);

    let mut entries = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"Relationship" =>
            {
                let mut rel_type = String::new();
                let mut target = String::new();
                let mut id = String::new();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Type" => rel_type = String::from_utf8_lossy(&attr.value).to_string(),
                        b"Target" => target = String::from_utf8_lossy(&attr.value).to_string(),
                        b"Id" => id = String::from_utf8_lossy(&attr.value).to_string(),
                        _ => {}
                    }
                }
                if rel_type == SLIDE_REL_TYPE {
                    entries.push((id, target));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Xml(format!("Error parsing relationships: {}", e)));
            }
            _ => {}
        }
    }
    Ok(entries)
}

/// Resolve a relationship target against the ppt/ base directory.
fn normalize_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("ppt/{}", target),
    }
}

fn rels_path(slide_path: &str) -> String {
    match slide_path.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", slide_path),
    }
}

fn insert_before(xml: &str, closing: &str, entry: &str) -> Result<String> {
    match xml.find(closing) {
        Some(pos) => {
            let mut out = String::with_capacity(xml.len() + entry.len());
            out.push_str(&xml[..pos]);
            out.push_str(entry);
            out.push_str(&xml[pos..]);
            Ok(out)
        }
        None => Err(Error::Xml(format!("Missing {} in package part", closing))),
    }
}
