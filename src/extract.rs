//! Tree walkers: plain text, links and categories.
//!
//! Each walker is a small recursive pass over the parsed tree. The text
//! walker is the interesting one; it owns the rendering policy for every
//! node kind (which links show their display text, which XML elements are
//! swallowed whole, where line breaks go).

use crate::tags::{BR_TAGS, NO_TEXT_TAGS, PAR_TAGS};
use crate::token::Token;
use crate::tree::{Child, Node, NodeKind};
use core::fmt;
use regex::Regex;
use std::sync::LazyLock;

/// Keyword targets that never contribute display text: interlanguage
/// prefixes, categories and special pages.
static IGNORED_TARGETS: LazyLock<Regex> = LazyLock::new(|| {
    // Unwrap: the pattern is a literal and compiles.
    Regex::new("^([-a-z]+|Category|Special):").unwrap()
});

/// The category namespace prefix.
const CATEGORY_PREFIX: &str = "Category:";

/// Renders a tree as plain text into any [`fmt::Write`] sink.
pub struct TextExtractor<W> {
    /// The output sink.
    out: W,
}

impl<W> TextExtractor<W>
where
    W: fmt::Write,
{
    /// Creates an extractor writing into `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Returns the sink, consuming the extractor.
    pub fn finish(self) -> W {
        self.out
    }

    /// Renders `node` and its subtree.
    pub fn extract(&mut self, node: &Node) -> fmt::Result {
        match node.kind() {
            // Templates, comments and leading directives render nothing.
            NodeKind::Special | NodeKind::Comment | NodeKind::Extension => Ok(()),
            NodeKind::Xml | NodeKind::XmlPar | NodeKind::XmlTable | NodeKind::XmlTableRow => {
                let name = node.tag().map(|tag| tag.name.as_str()).unwrap_or_default();
                if NO_TEXT_TAGS.contains(name) {
                    return Ok(());
                }
                self.children(node)?;
                if PAR_TAGS.contains(name) {
                    self.out.write_char('\n')?;
                }
                Ok(())
            }
            NodeKind::Keyword => {
                let args: Vec<&Node> = node.args().collect();
                let Some(first) = args.first() else {
                    return Ok(());
                };
                if IGNORED_TARGETS.is_match(&first.text()) {
                    return Ok(());
                }
                // The last argument is the display text; a bare target
                // displays itself.
                if let Some(last) = args.last() {
                    self.extract(last)?;
                }
                Ok(())
            }
            NodeKind::Link => {
                let args: Vec<&Node> = node.args().collect();
                if args.len() >= 2 {
                    for (index, arg) in args[1..].iter().enumerate() {
                        if index > 0 {
                            self.out.write_char(' ')?;
                        }
                        self.extract(arg)?;
                    }
                } else if let Some(only) = args.first() {
                    self.extract(only)?;
                }
                Ok(())
            }
            NodeKind::TableHeader | NodeKind::TableData => {
                if let Some(last) = node.args().last() {
                    self.extract(last)?;
                }
                self.out.write_char('\n')
            }
            NodeKind::Table => {
                for child in node.children() {
                    match child {
                        Child::Node(inner) if inner.kind() == NodeKind::Arg => {}
                        child => self.child(child)?,
                    }
                }
                Ok(())
            }
            NodeKind::Pre | NodeKind::Itemize | NodeKind::Headline | NodeKind::TableCaption => {
                self.children(node)?;
                self.out.write_char('\n')
            }
            _ => self.children(node),
        }
    }

    /// Renders every child of `node`.
    fn children(&mut self, node: &Node) -> fmt::Result {
        for child in node.children() {
            self.child(child)?;
        }
        Ok(())
    }

    /// Renders one child.
    fn child(&mut self, child: &Child) -> fmt::Result {
        match child {
            Child::Node(node) => self.extract(node),
            Child::Text(text) => self.collapsed(text),
            Child::Token(Token::Par) => self.out.write_char('\n'),
            Child::Token(Token::EmptyTag(tag)) if BR_TAGS.contains(&tag.name) => {
                self.out.write_char('\n')
            }
            Child::Token(_) => Ok(()),
        }
    }

    /// Writes `text` with every whitespace run collapsed to one space.
    fn collapsed(&mut self, text: &str) -> fmt::Result {
        let mut in_space = false;
        for c in text.chars() {
            if c.is_whitespace() {
                in_space = true;
            } else {
                if in_space {
                    self.out.write_char(' ')?;
                    in_space = false;
                }
                self.out.write_char(c)?;
            }
        }
        if in_space {
            self.out.write_char(' ')?;
        }
        Ok(())
    }
}

/// Renders a tree as plain text.
pub fn extract_text(node: &Node) -> String {
    let mut extractor = TextExtractor::new(String::new());
    // Writing into a String cannot fail.
    let _ = extractor.extract(node);
    extractor.finish()
}

/// The flavour of an extracted link.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkKind {
    /// `[[target|display]]` internal link.
    Keyword,
    /// `[url display]` external link.
    Link,
}

/// One link occurrence.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LinkRecord {
    /// Internal or external.
    pub kind: LinkKind,
    /// The link target: page title or URL.
    pub target: String,
    /// The display text, when the link carries one.
    pub display: Option<String>,
}

impl fmt::Display for LinkRecord {
    /// Formats the record as a tab-separated line body.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            LinkKind::Keyword => "keyword",
            LinkKind::Link => "link",
        };
        write!(f, "{kind}\t{}", self.target)?;
        if let Some(display) = &self.display {
            write!(f, "\t{display}")?;
        }
        Ok(())
    }
}

/// Collects every internal and external link in the tree, in source
/// order, including links nested inside other structures.
pub fn extract_links(node: &Node) -> Vec<LinkRecord> {
    let mut records = Vec::new();
    collect_links(node, &mut records);
    records
}

/// Recursive worker for [`extract_links`].
fn collect_links(node: &Node, records: &mut Vec<LinkRecord>) {
    let kind = match node.kind() {
        NodeKind::Keyword => Some(LinkKind::Keyword),
        NodeKind::Link => Some(LinkKind::Link),
        _ => None,
    };
    if let Some(kind) = kind {
        let args: Vec<&Node> = node.args().collect();
        if let Some(first) = args.first() {
            let display = (args.len() >= 2).then(|| args[args.len() - 1].text());
            records.push(LinkRecord {
                kind,
                target: first.text(),
                display,
            });
        }
    }
    for child in node.children() {
        if let Child::Node(inner) = child {
            collect_links(inner, records);
        }
    }
}

/// Collects every category tag in the tree, stripped of its
/// `Category:` prefix.
pub fn extract_categories(node: &Node) -> Vec<String> {
    extract_links(node)
        .into_iter()
        .filter(|record| record.kind == LinkKind::Keyword)
        .filter_map(|record| {
            record
                .target
                .strip_prefix(CATEGORY_PREFIX)
                .map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[track_caller]
    fn text_of(input: &str) -> String {
        extract_text(&parse(input).unwrap())
    }

    #[test]
    fn headline_gets_a_line_break() {
        assert_eq!(text_of("==Hello==\n"), "Hello\n");
    }

    #[test]
    fn keyword_renders_display_text() {
        assert_eq!(text_of("[[Foo|bar]]"), "bar");
    }

    #[test]
    fn bare_keyword_renders_target() {
        assert_eq!(text_of("[[Foo]]"), "Foo");
    }

    #[test]
    fn interlanguage_and_category_keywords_are_suppressed() {
        assert_eq!(text_of("[[fr:Accueil]]"), "");
        assert_eq!(text_of("[[Category:X]]"), "");
        assert_eq!(text_of("[[Special:Export|x]]"), "");
    }

    #[test]
    fn table_cells_one_per_line() {
        assert_eq!(text_of("{|\n|a||b\n|-\n|c\n|}"), "a\nb\nc\n");
    }

    #[test]
    fn quote_markers_are_discarded() {
        assert_eq!(text_of("'''bold''' and ''it''"), "bold and it");
    }

    #[test]
    fn ref_content_is_suppressed() {
        assert_eq!(text_of("<ref>ignored</ref>visible"), "visible");
    }

    #[test]
    fn itemize_lines() {
        assert_eq!(text_of("* one\n* two\n"), "one\ntwo\n");
    }

    #[test]
    fn templates_and_comments_render_nothing() {
        assert_eq!(text_of("a{{cite|x}}b<!-- c -->d"), "abd");
    }

    #[test]
    fn br_is_a_line_break() {
        assert_eq!(text_of("a<br/>b"), "a\nb");
    }

    #[test]
    fn external_link_display() {
        assert_eq!(text_of("[http://example.com/ here] "), "here ");
    }

    #[test]
    fn whitespace_collapses() {
        assert_eq!(text_of("a  \t b"), "a b");
    }

    #[test]
    fn block_elements_append_line_breaks() {
        assert_eq!(text_of("<div>a</div>"), "a\n");
        assert_eq!(text_of("<span>a</span>b"), "ab");
    }

    #[test]
    fn link_records() {
        let root = parse("[[Foo|bar]] and [http://example.com/ here] ").unwrap();
        let links = extract_links(&root);
        assert_eq!(
            links,
            vec![
                LinkRecord {
                    kind: LinkKind::Keyword,
                    target: "Foo".to_string(),
                    display: Some("bar".to_string()),
                },
                LinkRecord {
                    kind: LinkKind::Link,
                    target: "http://example.com/".to_string(),
                    display: Some("here".to_string()),
                },
            ]
        );
        assert_eq!(links[0].to_string(), "keyword\tFoo\tbar");
    }

    #[test]
    fn bare_links_have_no_display() {
        let root = parse("[[Foo]] ").unwrap();
        assert_eq!(
            extract_links(&root),
            vec![LinkRecord {
                kind: LinkKind::Keyword,
                target: "Foo".to_string(),
                display: None,
            }]
        );
    }

    #[test]
    fn categories() {
        let root = parse("[[Category:Birds]] [[Category:Fauna|sort]] [[Foo]] ").unwrap();
        assert_eq!(extract_categories(&root), vec!["Birds", "Fauna"]);
    }

    #[test]
    fn extracted_text_is_markup_free() {
        use crate::token::{Pos, Token};
        use crate::tokenizer::{TokenSink, Tokenizer};

        struct Structural(bool);
        impl TokenSink for Structural {
            fn token(&mut self, _pos: Pos, token: Token) {
                if !matches!(token, Token::Eol | Token::Par | Token::Blank | Token::Pre) {
                    self.0 = true;
                }
            }
            fn text(&mut self, _pos: Pos, _text: &str) {}
        }

        for input in [
            "==Hello==\n",
            "* one\n* two\n",
            "[[Foo|bar]] x",
            "{|\n|a||b\n|}",
            "'''bold''' and ''it''",
        ] {
            let text = text_of(input);
            let mut sink = Structural(false);
            let mut tokenizer = Tokenizer::new();
            tokenizer.feed(&text, &mut sink);
            tokenizer.close(&mut sink);
            assert!(!sink.0, "markup left in extraction of {input:?}: {text:?}");
        }
    }

    #[test]
    fn nested_links_are_found() {
        let root = parse("''[[Foo]]'' {{t|[[Bar]]}}").unwrap();
        let targets: Vec<_> = extract_links(&root)
            .into_iter()
            .map(|record| record.target)
            .collect();
        assert_eq!(targets, vec!["Foo", "Bar"]);
    }
}
