//! Sample identifier parsing.
//!
//! Instrument exports label each physical sample with an identifier like
//! `A-07`: the prefix before the last dash names the group, the suffix is the
//! sample number within it. Operators sometimes append a parenthetical note
//! (`A-07(重测)`) which must be stripped, but the record is flagged so the
//! report can highlight it.

use regex::Regex;
use std::sync::LazyLock;

/// Matches a parenthetical annotation in either ASCII or full-width brackets.
static ANNOTATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\(（].*?[\)）]").unwrap());

/// A parsed sample identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleId {
    /// Common prefix shared by all samples of the group.
    pub group: String,
    /// Suffix after the last separator; `"1"` when absent.
    pub number: String,
    /// True when the raw identifier carried an annotation.
    pub flagged: bool,
}

/// Parse a raw identifier into group name, sample number, and flag state.
///
/// Annotations are stripped first; if stripping changed the identifier the
/// result is flagged. The cleaned identifier is split on the LAST `-`; with
/// no separator the whole identifier is the group name and the sample number
/// defaults to `"1"`.
pub fn parse_sample_id(raw: &str) -> SampleId {
    let raw = raw.trim();
    let cleaned = ANNOTATION_REGEX.replace_all(raw, "");
    let cleaned = cleaned.trim();
    let flagged = cleaned != raw;

    match cleaned.rsplit_once('-') {
        Some((group, number)) if !group.is_empty() => SampleId {
            group: group.to_string(),
            number: number.to_string(),
            flagged,
        },
        _ => SampleId {
            group: cleaned.to_string(),
            number: "1".to_string(),
            flagged,
        },
    }
}

/// Whether a cleaned identifier has the `name-…-digit` shape expected of a
/// sample row (used to skip decoration rows in loosely structured sheets).
pub fn looks_like_sample_id(raw: &str) -> bool {
    let cleaned = ANNOTATION_REGEX.replace_all(raw.trim(), "");
    let cleaned = cleaned.trim();
    cleaned.contains('-') && cleaned.chars().last().is_some_and(|c| c.is_ascii_digit())
}
