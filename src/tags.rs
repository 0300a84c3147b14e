//! Closed tag-name classes shared by the tokenizer and the parser.
//!
//! All names are lowercased; the tokenizer lowercases scanned tag names on
//! emission, so lookups never need to fold case again.

use phf::Set;

/// Tag names recognised as structural XML.
///
/// A start tag whose name is not in this set is reclassified as an empty
/// tag when its `>` arrives, so stray pseudo-markup like `<foo>` degrades
/// to a leaf instead of opening a context that nothing will ever close.
pub static VALID_TAGS: Set<&str> = phf::phf_set! {
    "abbr", "address", "b", "bdi", "big", "blockquote", "br", "caption",
    "center", "cite", "code", "dd", "del", "div", "dl", "dt", "em",
    "gallery", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "ins",
    "includeonly", "kbd", "li", "math", "noinclude", "nowiki", "ol",
    "onlyinclude", "p", "poem", "pre", "q", "ref", "references", "s",
    "small", "source", "span", "strike", "strong", "sub", "sup", "table",
    "td", "th", "timeline", "tr", "tt", "u", "ul", "var", "wbr",
};

/// Tags that introduce a block-level paragraph context.
///
/// A block auto-closes when a table delimiter or another block start
/// arrives without an explicit end tag.
pub static PAR_TAGS: Set<&str> = phf::phf_set! {
    "address", "blockquote", "center", "dd", "div", "dt", "h1", "h2",
    "h3", "h4", "h5", "h6", "li", "p", "pre", "td", "th",
};

/// The XML table container tags.
pub static TABLE_TAGS: Set<&str> = phf::phf_set! { "table" };

/// The XML table row tags.
pub static TABLE_ROW_TAGS: Set<&str> = phf::phf_set! { "tr" };

/// Tags whose content suppresses wiki markup until the matching end tag.
pub static NO_WIKI_TAGS: Set<&str> = phf::phf_set! { "nowiki", "source" };

/// Tags whose content never contributes to extracted text.
pub static NO_TEXT_TAGS: Set<&str> = phf::phf_set! { "gallery", "ref" };

/// Tags rendered as a line break by the text walker.
pub static BR_TAGS: Set<&str> = phf::phf_set! { "br" };

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_are_subsets_of_valid() {
        for set in [
            &PAR_TAGS,
            &TABLE_TAGS,
            &TABLE_ROW_TAGS,
            &NO_WIKI_TAGS,
            &NO_TEXT_TAGS,
            &BR_TAGS,
        ] {
            for name in set.iter() {
                assert!(VALID_TAGS.contains(name), "{name} missing from VALID_TAGS");
            }
        }
    }
}
