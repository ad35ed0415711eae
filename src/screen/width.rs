//! Grapheme segmentation and display-width computation for the Screen
//! Model, matching `wcswidth`-style semantics (§4.3): East Asian Wide/
//! Fullwidth graphemes are 2 columns, Ambiguous is 1, and combining marks /
//! variation selectors contribute 0 so that e.g. heart + VS16 (U+FE0F)
//! renders as a single width-2 grapheme.
//!
//! Grounded in the teacher's `unicode_width` dependency (used upstream for
//! status-line truncation) generalized to full grapheme clusters via
//! `unicode-segmentation`, the crate the pack's oxidized example pulls in
//! for the same category of problem.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Splits `text` into user-perceived graphemes, pairing each with its
/// terminal column width (0, 1, or 2).
pub fn graphemes_with_width(text: &str) -> impl Iterator<Item = (&str, usize)> {
    text.graphemes(true).map(|g| (g, grapheme_width(g)))
}

/// U+FE0F VARIATION SELECTOR-16: requests the emoji presentation of the
/// preceding base character. `unicode-width`'s East Asian Width tables
/// report it as zero-width but do not themselves widen an otherwise
/// narrow/neutral base to the 2-column emoji rendering real terminals use
/// (e.g. a bare heart, U+2764, is East Asian Width Neutral); this crate
/// applies that widening explicitly to match `wcswidth`-style emoji-aware
/// terminals, per §4.3's "heart + VS16 renders as width 2" requirement.
const VARIATION_SELECTOR_16: char = '\u{FE0F}';

/// Width of a single extended grapheme cluster. `UnicodeWidthStr` treats a
/// full cluster (base + combining marks + variation selectors) as one unit
/// and sums per-codepoint East Asian Width; a cluster requesting emoji
/// presentation via VS16 is additionally widened to 2 columns.
pub fn grapheme_width(grapheme: &str) -> usize {
    let base = grapheme.width();
    if grapheme.contains(VARIATION_SELECTOR_16) {
        base.max(2)
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_width_one() {
        assert_eq!(grapheme_width("a"), 1);
    }

    #[test]
    fn wide_emoji_is_width_two() {
        assert_eq!(grapheme_width("\u{1F41B}"), 2); // bug emoji
    }

    #[test]
    fn heart_plus_vs16_is_width_two() {
        let heart_vs16 = "\u{2764}\u{FE0F}";
        let graphemes: Vec<_> = graphemes_with_width(heart_vs16).collect();
        assert_eq!(graphemes.len(), 1);
        assert_eq!(graphemes[0].1, 2);
    }

    #[test]
    fn combining_mark_contributes_zero_to_cluster_count() {
        // "e" + combining acute accent is one grapheme cluster.
        let text = "e\u{0301}";
        let graphemes: Vec<_> = graphemes_with_width(text).collect();
        assert_eq!(graphemes.len(), 1);
        assert_eq!(graphemes[0].1, 1);
    }

    #[test]
    fn cjk_wide_character_is_width_two() {
        assert_eq!(grapheme_width("\u{4e2d}"), 2); // 中
    }
}
