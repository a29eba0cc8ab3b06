//! Block Classifier: assigns a semantic [`BlockRole`] to a block from its
//! text and (optional) normalised position on the page (spec §4.5).
//!
//! `original_source/worker/src/ocr/classifier.py` is an empty stub in the
//! retrieval pack (module docstring and imports only, no function
//! bodies) — there is no original implementation to port, so the
//! decision order, regexes and position thresholds below are defined
//! directly against the documented block-role rules.

use docflow_common::{BBox, Block, BlockRole};
use once_cell::sync::Lazy;
use regex::Regex;

/// Position thresholds, in fractions of page dimensions (spec §4.5
/// defaults).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionThresholds {
    pub header_zone_y_start: f32,
    pub footer_zone_y_end: f32,
    pub footnote_zone_y_start: f32,
    pub footnote_zone_y_end: f32,
    pub centered_tolerance: f32,
    pub narrow_width_ratio: f32,
    pub running_header_max_len: usize,
}

impl Default for PositionThresholds {
    fn default() -> Self {
        Self {
            header_zone_y_start: 0.08,
            footer_zone_y_end: 0.92,
            footnote_zone_y_start: 0.80,
            footnote_zone_y_end: 0.92,
            centered_tolerance: 0.15,
            narrow_width_ratio: 0.5,
            running_header_max_len: 80,
        }
    }
}

static PAGE_NUMBER_RE: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"^-?\s*\d{1,4}\s*-?$").unwrap(),
        Regex::new(r"(?i)^Page\s+\d{1,4}$").unwrap(),
        Regex::new(r"^\[\s*\d{1,4}\s*\]$").unwrap(),
        Regex::new(r"^\(\s*\d{1,4}\s*\)$").unwrap(),
    ]
});

static CAPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(Figure|Fig\.|Table|Tbl\.|Chart|Graph|Exhibit|Plate|Diagram)\s*\d+").unwrap()
});

static SECTION_HEADER_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(Abstract|Introduction|Methods?|Methodology|Results?|Discussion|Conclusion|References|Bibliography|Acknowledgments?)$",
    )
    .unwrap()
});
static SECTION_HEADER_NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.?\s+[A-Z]").unwrap());
static SECTION_HEADER_ROMAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[IVXLCDM]+\.?\s+[A-Z]").unwrap());

static FOOTNOTE_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\[\d+\]|[\x{00B9}\x{00B2}\x{00B3}\x{2070}\x{2074}-\x{2079}]|[†‡§*])\s").unwrap());

fn is_page_number_text(text: &str) -> bool {
    text.chars().count() <= 20 && PAGE_NUMBER_RE.iter().any(|re| re.is_match(text))
}

fn is_section_header_text(text: &str) -> bool {
    text.chars().count() <= 100
        && (SECTION_HEADER_KEYWORD_RE.is_match(text)
            || SECTION_HEADER_NUMERIC_RE.is_match(text)
            || SECTION_HEADER_ROMAN_RE.is_match(text))
}

fn begins_with_footnote_marker(text: &str) -> bool {
    FOOTNOTE_MARKER_RE.is_match(text)
}

fn begins_with_leading_digit(text: &str) -> bool {
    text.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Classify a block's role from its trimmed text and, when available,
/// its bounding box and the page's pixel dimensions. Deterministic for a
/// given input (spec §8 round-trip property).
#[must_use]
pub fn classify_block(
    text: &str,
    bbox: Option<BBox>,
    page_size: Option<(f32, f32)>,
    thresholds: PositionThresholds,
) -> BlockRole {
    let trimmed = text.trim();

    // 1. Empty/whitespace
    if trimmed.is_empty() {
        return BlockRole::Other;
    }

    // 2. Content patterns
    if is_page_number_text(trimmed) {
        return BlockRole::PageNumber;
    }
    if CAPTION_RE.is_match(trimmed) {
        return BlockRole::Caption;
    }
    if is_section_header_text(trimmed) {
        return BlockRole::SectionHeader;
    }
    if begins_with_footnote_marker(trimmed) {
        return BlockRole::Footnote;
    }

    // 3. Position tests (only when bbox and page dims are both known)
    if let (Some(bbox), Some((page_width, page_height))) = (bbox, page_size) {
        let pos = bbox.normalised(page_width, page_height);
        let len = trimmed.chars().count();

        if pos.y_start < thresholds.header_zone_y_start {
            if len < thresholds.running_header_max_len {
                return BlockRole::Header;
            }
        } else if pos.y_end > thresholds.footer_zone_y_end {
            if len < 30 && is_page_number_text(trimmed) {
                return BlockRole::PageNumber;
            }
            if len < thresholds.running_header_max_len {
                return BlockRole::Header;
            }
        } else if pos.y_start > thresholds.footnote_zone_y_start && pos.y_end < thresholds.footnote_zone_y_end
        {
            if begins_with_footnote_marker(trimmed) || begins_with_leading_digit(trimmed) {
                return BlockRole::Footnote;
            }
        }

        // 4. Centered narrow text
        if (pos.x_center - 0.5).abs() < thresholds.centered_tolerance
            && pos.width_ratio < thresholds.narrow_width_ratio
            && len < 60
        {
            return BlockRole::SectionHeader;
        }
    }

    // 5. Default
    BlockRole::Paragraph
}

/// Classify a [`Block`] in place, returning a new block with its `role`
/// set (the text/confidence/bbox are preserved). Used by the Normaliser
/// unless the caller opts out (spec §4.7).
#[must_use]
pub fn classify(block: Block, page_size: Option<(f32, f32)>) -> Block {
    let role = classify_block(&block.text, block.bbox, page_size, PositionThresholds::default());
    Block { role, ..block }
}

/// Whether a role belongs to the core-content filter used to build
/// reading-order `doc_text` (spec §4.5).
#[must_use]
pub fn is_core_content(role: BlockRole) -> bool {
    matches!(
        role,
        BlockRole::Title | BlockRole::SectionHeader | BlockRole::Paragraph | BlockRole::List
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_plain(text: &str) -> BlockRole {
        classify_block(text, None, None, PositionThresholds::default())
    }

    #[test]
    fn empty_text_is_other() {
        assert_eq!(classify_plain(""), BlockRole::Other);
        assert_eq!(classify_plain("   \n\t"), BlockRole::Other);
    }

    #[test]
    fn bare_numbers_are_page_numbers() {
        assert_eq!(classify_plain("42"), BlockRole::PageNumber);
        assert_eq!(classify_plain("- 7 -"), BlockRole::PageNumber);
        assert_eq!(classify_plain("Page 12"), BlockRole::PageNumber);
        assert_eq!(classify_plain("[3]"), BlockRole::PageNumber);
        assert_eq!(classify_plain("(15)"), BlockRole::PageNumber);
    }

    #[test]
    fn figure_and_table_captions() {
        assert_eq!(classify_plain("Figure 1: A diagram"), BlockRole::Caption);
        assert_eq!(classify_plain("Table 2. Results"), BlockRole::Caption);
        assert_eq!(classify_plain("Fig. 3 shows"), BlockRole::Caption);
    }

    #[test]
    fn known_section_keywords() {
        assert_eq!(classify_plain("Introduction"), BlockRole::SectionHeader);
        assert_eq!(classify_plain("References"), BlockRole::SectionHeader);
        assert_eq!(classify_plain("1. Background"), BlockRole::SectionHeader);
        assert_eq!(classify_plain("IV. Discussion"), BlockRole::SectionHeader);
    }

    #[test]
    fn footnote_markers() {
        assert_eq!(classify_plain("[1] see appendix"), BlockRole::Footnote);
        assert_eq!(classify_plain("\u{00B9} a footnote"), BlockRole::Footnote);
        assert_eq!(classify_plain("† denotes significance"), BlockRole::Footnote);
    }

    #[test]
    fn plain_paragraph_falls_through() {
        assert_eq!(
            classify_plain("This is a regular paragraph of body text that goes on for a while."),
            BlockRole::Paragraph
        );
    }

    #[test]
    fn header_zone_position() {
        let bbox = BBox::new(10.0, 5.0, 200.0, 20.0);
        let role = classify_block("Running Title", Some(bbox), Some((800.0, 1000.0)), PositionThresholds::default());
        assert_eq!(role, BlockRole::Header);
    }

    #[test]
    fn just_below_header_zone_is_not_header_by_position() {
        // y_start = 0.079 is below the 0.08 threshold so it IS header zone;
        // test the boundary at 0.081 instead, which is NOT header zone.
        let thresholds = PositionThresholds::default();
        let y = 0.081 * 1000.0;
        let bbox = BBox::new(10.0, y, 50.0, 10.0);
        let role = classify_block("random body text here", Some(bbox), Some((800.0, 1000.0)), thresholds);
        assert_ne!(role, BlockRole::Header);
    }

    #[test]
    fn footer_zone_page_number() {
        let bbox = BBox::new(380.0, 970.0, 40.0, 15.0);
        let role = classify_block("42", Some(bbox), Some((800.0, 1000.0)), PositionThresholds::default());
        assert_eq!(role, BlockRole::PageNumber);
    }

    #[test]
    fn centered_narrow_text_is_section_header() {
        let bbox = BBox::new(300.0, 500.0, 200.0, 20.0);
        let role = classify_block("A Short Centered Title", Some(bbox), Some((800.0, 1000.0)), PositionThresholds::default());
        assert_eq!(role, BlockRole::SectionHeader);
    }

    #[test]
    fn classifier_is_deterministic() {
        let text = "Figure 5: caption text";
        let a = classify_plain(text);
        let b = classify_plain(text);
        assert_eq!(a, b);
    }

    #[test]
    fn core_content_set_matches_spec() {
        assert!(is_core_content(BlockRole::Title));
        assert!(is_core_content(BlockRole::SectionHeader));
        assert!(is_core_content(BlockRole::Paragraph));
        assert!(is_core_content(BlockRole::List));
        assert!(!is_core_content(BlockRole::Footnote));
        assert!(!is_core_content(BlockRole::PageNumber));
    }
}
