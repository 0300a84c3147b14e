//! The parsed wikitext tree.
//!
//! The deep class hierarchy of classic DOM-style parsers collapses here
//! into a single [`Node`] struct with a [`NodeKind`] discriminant. Nodes
//! that wrap a distinguished opening token (spans, headlines, bullets, XML
//! elements, …) retain it, both so close-on-match works in the parser and
//! so walkers can recover the payload (headline depth, bullet run, tag
//! attributes) later.

use crate::token::{TagData, Token};
use core::fmt;

/// One ordered child of a [`Node`].
///
/// Adjacent `Text` children never survive insertion; they are merged at the
/// single append point so walkers can treat each text child as a maximal
/// run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Child {
    /// A nested node.
    Node(Node),
    /// A token kept verbatim, e.g. a paragraph break or an empty tag.
    Token(Token),
    /// A run of plain text.
    Text(String),
}

/// The kind of a tree node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeKind {
    /// The document root.
    Page,
    /// One piece of a pipe- or blank-separated argument list.
    Arg,
    /// `<!-- … -->`.
    Comment,
    /// A preformatted line.
    Pre,
    /// A list item.
    Itemize,
    /// A headline.
    Headline,
    /// `{| … |}`.
    Table,
    /// `|+ …`.
    TableCaption,
    /// `|- …`.
    TableRow,
    /// `! …` or `!! …`.
    TableHeader,
    /// `| …` or `|| …`.
    TableData,
    /// Quote-delimited emphasis.
    Span,
    /// `{{ … }}`, captured structurally and never evaluated.
    Special,
    /// `[[ … ]]`.
    Keyword,
    /// `[ … ]`.
    Link,
    /// A generic XML element.
    Xml,
    /// An XML element from the block-level set.
    XmlPar,
    /// `<table>`.
    XmlTable,
    /// `<tr>`.
    XmlTableRow,
    /// A document-leading directive such as `#REDIRECT`.
    Extension,
}

impl NodeKind {
    /// A short lowercase label, used by the debug dump.
    fn label(self) -> &'static str {
        match self {
            NodeKind::Page => "page",
            NodeKind::Arg => "arg",
            NodeKind::Comment => "comment",
            NodeKind::Pre => "pre",
            NodeKind::Itemize => "itemize",
            NodeKind::Headline => "headline",
            NodeKind::Table => "table",
            NodeKind::TableCaption => "caption",
            NodeKind::TableRow => "row",
            NodeKind::TableHeader => "th",
            NodeKind::TableData => "td",
            NodeKind::Span => "span",
            NodeKind::Special => "special",
            NodeKind::Keyword => "keyword",
            NodeKind::Link => "link",
            NodeKind::Xml | NodeKind::XmlPar | NodeKind::XmlTable | NodeKind::XmlTableRow => "xml",
            NodeKind::Extension => "extension",
        }
    }
}

/// A node of the parsed tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    /// The node kind.
    kind: NodeKind,
    /// The token that opened this node, if the kind has one.
    open: Option<Token>,
    /// Ordered children.
    children: Vec<Child>,
}

impl Node {
    /// Creates an empty node.
    pub fn new(kind: NodeKind, open: Option<Token>) -> Self {
        Self {
            kind,
            open,
            children: Vec::new(),
        }
    }

    /// The node kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The token that opened this node, if any.
    pub fn open_token(&self) -> Option<&Token> {
        self.open.as_ref()
    }

    /// The node's children in source order.
    pub fn children(&self) -> &[Child] {
        &self.children
    }

    /// Appends a child, merging adjacent text runs in place.
    pub fn append(&mut self, child: Child) {
        if let Child::Text(text) = &child
            && let Some(Child::Text(last)) = self.children.last_mut()
        {
            last.push_str(text);
            return;
        }
        self.children.push(child);
    }

    /// Appends a text run.
    pub fn append_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Child::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Child::Text(text.to_string()));
        }
    }

    /// The headline depth, when this node was opened by a headline token.
    pub fn headline_depth(&self) -> Option<usize> {
        match self.open {
            Some(Token::Headline(depth)) => Some(depth),
            _ => None,
        }
    }

    /// The bullet run, when this node was opened by a list-item token.
    pub fn bullets(&self) -> Option<&str> {
        match &self.open {
            Some(Token::Itemize(bullets)) => Some(bullets),
            _ => None,
        }
    }

    /// The opening tag, when this node is an XML element.
    pub fn tag(&self) -> Option<&TagData> {
        match &self.open {
            Some(Token::StartTag(tag)) => Some(tag),
            _ => None,
        }
    }

    /// Iterates the `Arg` children of an argument-bearing node.
    pub fn args(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter_map(|child| match child {
            Child::Node(node) if node.kind == NodeKind::Arg => Some(node),
            _ => None,
        })
    }

    /// The concatenated raw text of this subtree, ignoring tokens.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    /// Accumulates raw text into `out`.
    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Child::Node(node) => node.collect_text(out),
                Child::Text(text) => out.push_str(text),
                Child::Token(_) => {}
            }
        }
    }

    /// Renders the tree as a compact s-expression, for debugging and
    /// tests.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out);
        out
    }

    /// Recursive worker for [`Node::dump`].
    fn dump_into(&self, out: &mut String) {
        out.push('(');
        out.push_str(self.kind.label());
        match &self.open {
            Some(Token::Headline(depth)) => {
                let _ = fmt::Write::write_fmt(out, format_args!(":{depth}"));
            }
            Some(Token::Itemize(bullets)) => {
                let _ = fmt::Write::write_fmt(out, format_args!(":{bullets}"));
            }
            Some(Token::Extension(name)) => {
                let _ = fmt::Write::write_fmt(out, format_args!(":{name}"));
            }
            Some(Token::StartTag(tag)) => {
                let _ = fmt::Write::write_fmt(out, format_args!(":{}", tag.name));
            }
            Some(token) if token.is_quote() => {
                if let Some(marker) = token.marker() {
                    out.push(':');
                    out.push_str(marker);
                }
            }
            _ => {}
        }
        for child in &self.children {
            out.push(' ');
            match child {
                Child::Node(node) => node.dump_into(out),
                Child::Text(text) => {
                    let _ = fmt::Write::write_fmt(out, format_args!("{text:?}"));
                }
                Child::Token(token) => {
                    let _ = fmt::Write::write_fmt(out, format_args!("<{token:?}>"));
                }
            }
        }
        out.push(')');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_text_children_merge() {
        let mut node = Node::new(NodeKind::Page, None);
        node.append_text("foo");
        node.append_text("bar");
        node.append(Child::Token(Token::Par));
        node.append_text("baz");
        assert_eq!(
            node.children(),
            &[
                Child::Text("foobar".to_string()),
                Child::Token(Token::Par),
                Child::Text("baz".to_string()),
            ]
        );
    }

    #[test]
    fn empty_text_is_not_appended() {
        let mut node = Node::new(NodeKind::Page, None);
        node.append_text("");
        assert!(node.children().is_empty());
    }

    #[test]
    fn subtree_text_skips_tokens() {
        let mut arg = Node::new(NodeKind::Arg, None);
        arg.append_text("Foo");
        let mut kw = Node::new(NodeKind::Keyword, Some(Token::KeywordOpen));
        kw.append(Child::Node(arg));
        kw.append(Child::Token(Token::Bar));
        assert_eq!(kw.text(), "Foo");
    }

    #[test]
    fn dump_is_compact() {
        let mut headline = Node::new(NodeKind::Headline, Some(Token::Headline(2)));
        headline.append_text("Hello");
        let mut page = Node::new(NodeKind::Page, None);
        page.append(Child::Node(headline));
        assert_eq!(page.dump(), r#"(page (headline:2 "Hello"))"#);
    }
}
