//! The wikitext token alphabet.
//!
//! The tokenizer reduces raw wikitext to a flat stream of these tokens plus
//! uninterpreted text runs. Structural tokens are a closed set; variable
//! tokens carry the payload scanned out of the source (headline depth,
//! bullet runs, XML tag names and attributes).

/// An absolute character offset into the logical input stream.
///
/// Offsets count Unicode scalar values, not bytes, and keep increasing
/// across [`feed_text`](crate::Parser::feed_text) chunk boundaries.
pub type Pos = usize;

/// A single structural token emitted by the tokenizer.
///
/// Unit variants are the interned singletons; identity is just equality on
/// the variant. Payload variants carry whatever was scanned out of the
/// source text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Token {
    /// A newline terminating a non-empty line.
    Eol,
    /// A run of mid-line whitespace.
    Blank,
    /// A mid-line `|`, separating template and link arguments.
    Bar,
    /// `''`, toggling italics.
    Quote2,
    /// `'''`, toggling bold.
    Quote3,
    /// `'''''`, toggling bold italics.
    Quote5,
    /// `<!--`.
    CommentOpen,
    /// `-->`.
    CommentClose,
    /// `{{`.
    SpecialOpen,
    /// `}}`.
    SpecialClose,
    /// `[[`.
    KeywordOpen,
    /// `]]`.
    KeywordClose,
    /// `[`.
    LinkOpen,
    /// `]`.
    LinkClose,
    /// `{|` at the beginning of a line.
    TableOpen,
    /// `|}` at the beginning of a line.
    TableClose,
    /// `|-` at the beginning of a line.
    TableRow,
    /// `|+` at the beginning of a line.
    TableCaption,
    /// `!` at the beginning of a line.
    TableHeader,
    /// A mid-line `!!` cell separator.
    TableHeaderSep,
    /// `|` at the beginning of a line.
    TableData,
    /// A mid-line `||` cell separator.
    TableDataSep,
    /// A horizontal rule (`-` at the beginning of a line).
    Hr,
    /// A paragraph break (an empty line).
    Par,
    /// Preformatted text (a line led by whitespace).
    Pre,
    /// A headline marker; the payload is the number of leading `=`.
    Headline(usize),
    /// A list-item marker; the payload is the bullet run over `* # : ;`.
    Itemize(String),
    /// A document-leading `#WORD` directive such as `#REDIRECT`.
    Extension(String),
    /// An XML start tag with a name from the recognised set.
    StartTag(TagData),
    /// An XML end tag.
    EndTag(String),
    /// A self-closed or unrecognised XML tag, treated as a leaf.
    EmptyTag(TagData),
}

/// The scanned contents of an XML start tag.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TagData {
    /// The tag name, lowercased on emission.
    pub name: String,
    /// Attribute pairs in source order. Keys are lowercased; values keep
    /// their source form with entities decoded. A bare key carries itself
    /// as its value.
    pub attrs: Vec<(String, String)>,
}

impl TagData {
    /// Creates tag data with an empty attribute list.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
        }
    }

    /// Looks up an attribute value by its lowercased key.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl Token {
    /// The source marker for a singleton token, where one exists.
    ///
    /// `Pre` is synthetic (the leading whitespace never reaches the token
    /// stream) and payload variants render from their payload, so both
    /// return `None`.
    pub fn marker(&self) -> Option<&'static str> {
        Some(match self {
            Token::Eol | Token::Par => "\n",
            Token::Blank => " ",
            Token::Bar | Token::TableData => "|",
            Token::Quote2 => "''",
            Token::Quote3 => "'''",
            Token::Quote5 => "'''''",
            Token::CommentOpen => "<!--",
            Token::CommentClose => "-->",
            Token::SpecialOpen => "{{",
            Token::SpecialClose => "}}",
            Token::KeywordOpen => "[[",
            Token::KeywordClose => "]]",
            Token::LinkOpen => "[",
            Token::LinkClose => "]",
            Token::TableOpen => "{|",
            Token::TableClose => "|}",
            Token::TableRow => "|-",
            Token::TableCaption => "|+",
            Token::TableHeader => "!",
            Token::TableHeaderSep => "!!",
            Token::TableDataSep => "||",
            Token::Hr => "-",
            _ => return None,
        })
    }

    /// Returns true for the quote-run tokens that open and close a span.
    pub fn is_quote(&self) -> bool {
        matches!(self, Token::Quote2 | Token::Quote3 | Token::Quote5)
    }

    /// Returns true for the table-structure tokens that break out of any
    /// cell or caption context: `|+`, `|-`, `!`, `!!`, `|`, `||`.
    ///
    /// `TableOpen`/`TableClose` are deliberately not included; they are
    /// handled by the table context itself.
    pub fn is_table_delimiter(&self) -> bool {
        matches!(
            self,
            Token::TableCaption
                | Token::TableRow
                | Token::TableHeader
                | Token::TableHeaderSep
                | Token::TableData
                | Token::TableDataSep
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_identity() {
        assert_eq!(Token::Quote3, Token::Quote3);
        assert_ne!(Token::Quote3, Token::Quote5);
        assert_ne!(Token::Bar, Token::TableData);
    }

    #[test]
    fn tag_attr_lookup() {
        let tag = TagData {
            name: "div".to_string(),
            attrs: vec![
                ("class".to_string(), "infobox".to_string()),
                ("id".to_string(), "main".to_string()),
            ],
        };
        assert_eq!(tag.attr("class"), Some("infobox"));
        assert_eq!(tag.attr("style"), None);
    }

    #[test]
    fn markers_match_their_source_text() {
        assert_eq!(Token::KeywordOpen.marker(), Some("[["));
        assert_eq!(Token::TableDataSep.marker(), Some("||"));
        assert_eq!(Token::Headline(2).marker(), None);
        assert_eq!(Token::Pre.marker(), None);
    }
}
