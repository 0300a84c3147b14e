//! The wikitext parser: a pushdown automaton over the token stream.
//!
//! The tokenizer classifies characters; this module gives the flat event
//! stream its shape. Each parse state owns the currently open [`Node`];
//! tokens either get consumed by the state, open a child context, or force
//! the context closed and are re-dispatched to the surrounding state. The
//! re-dispatch loop is what makes malformed markup safe: a context that
//! cannot handle a token pops itself and lets an outer context try, and
//! every pop strictly shrinks the stack.

use crate::tags::{PAR_TAGS, TABLE_ROW_TAGS, TABLE_TAGS};
use crate::token::{Pos, Token};
use crate::tokenizer::{TokenSink, Tokenizer};
use crate::tree::{Child, Node, NodeKind};
use std::io::BufRead;

/// The default limit on parse-stack depth.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Parser errors.
///
/// Nothing in the wikitext grammar itself is fatal; the only structural
/// failure is markup nested past the configured depth limit.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Markup nested deeper than the configured limit.
    #[error("markup nested deeper than {0} levels")]
    StackOverflow(usize),
    /// An I/O error from [`Parser::feed_file`].
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One event from the tokenizer, owned so it can be re-dispatched.
#[derive(Debug)]
enum Event {
    /// A structural token.
    Token(Token),
    /// A text run.
    Text(String),
}

/// The result of offering an event to a parse state.
enum Step {
    /// The event was consumed.
    Consumed,
    /// The state closed; feed the event to the state now on top.
    Again(Event),
}

/// A token that closes the current context without being consumed by it.
#[derive(Debug)]
enum Stop {
    /// A structural token, matched by equality.
    Token(Token),
    /// An XML end tag with this name.
    EndTag(String),
}

/// Parse states. One per open-context flavour.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ParseState {
    /// The document root.
    Top,
    /// A `#REDIRECT`-style leading directive; closes at end of line.
    Extension,
    /// A list item; closes at end of line.
    Itemize,
    /// A headline; closes at end of line.
    Headline,
    /// A preformatted line; closes at end of line.
    Pre,
    /// Quote-delimited emphasis; closes on its own quote token.
    Span,
    /// A comment; absorbs everything until `-->`.
    Comment,
    /// `{{ … }}`.
    Special,
    /// `[[ … ]]`.
    Keyword,
    /// `[ … ]`.
    Link,
    /// An argument separated by `|`.
    ArgBar,
    /// An argument separated by whitespace.
    ArgBlank,
    /// `{| … |}`.
    Table,
    /// An argument inside a table context.
    TableArg,
    /// `|+ …`.
    TableCaption,
    /// `|- …`.
    TableRow,
    /// `! …` cell.
    TableHeader,
    /// `| …` cell.
    TableData,
    /// A generic XML element.
    Xml,
    /// A block-level XML element.
    XmlPar,
    /// `<table>`.
    XmlTable,
    /// `<tr>`.
    XmlTableRow,
}

/// A suspended outer context.
#[derive(Debug)]
struct Frame {
    /// The outer node, to be restored on pop.
    node: Node,
    /// The outer parse state.
    state: ParseState,
    /// The outer context's own stop token, if it registered one.
    stop: Option<Stop>,
}

/// The pushdown tree builder. Receives tokenizer events and grows the
/// tree; owned by [`Parser`].
#[derive(Debug)]
struct TreeBuilder {
    /// The currently open node.
    current: Node,
    /// The parse state of the currently open node.
    state: ParseState,
    /// The stop token registered by the current context, if any.
    stop: Option<Stop>,
    /// Suspended outer contexts.
    stack: Vec<Frame>,
    /// Hard cap on `stack` depth.
    max_depth: usize,
    /// Set once the depth cap is hit; all further events are dropped.
    overflowed: bool,
}

impl TokenSink for TreeBuilder {
    fn token(&mut self, pos: Pos, token: Token) {
        self.dispatch(pos, Event::Token(token));
    }

    fn text(&mut self, pos: Pos, text: &str) {
        self.dispatch(pos, Event::Text(text.to_string()));
    }
}

impl TreeBuilder {
    /// Creates a builder with an empty page as the open node.
    fn new(max_depth: usize) -> Self {
        Self {
            current: Node::new(NodeKind::Page, None),
            state: ParseState::Top,
            stop: None,
            stack: Vec::new(),
            max_depth,
            overflowed: false,
        }
    }

    /// Opens a child context.
    fn push(&mut self, kind: NodeKind, open: Option<Token>, state: ParseState, stop: Option<Stop>) {
        if self.stack.len() >= self.max_depth {
            self.overflowed = true;
            return;
        }
        let node = Node::new(kind, open);
        let outer = core::mem::replace(&mut self.current, node);
        self.stack.push(Frame {
            node: outer,
            state: self.state,
            stop: self.stop.take(),
        });
        self.state = state;
        self.stop = stop;
    }

    /// Closes the current context, attaching it to its parent.
    fn pop(&mut self) {
        if let Some(frame) = self.stack.pop() {
            let child = core::mem::replace(&mut self.current, frame.node);
            self.state = frame.state;
            self.stop = frame.stop;
            self.current.append(Child::Node(child));
        }
    }

    /// True when `ev` is a registered stop for the current context or any
    /// enclosing one. This is the failsafe close rule: seeing an enclosing
    /// context's terminator closes everything up to it, one re-dispatch at
    /// a time.
    fn is_closing(&self, ev: &Event) -> bool {
        let hit = |stop: &Stop| match (stop, ev) {
            (Stop::Token(stop), Event::Token(token)) => stop == token,
            (Stop::EndTag(name), Event::Token(Token::EndTag(end))) => name == end,
            _ => false,
        };
        self.stop.as_ref().is_some_and(hit)
            || self.stack.iter().any(|frame| frame.stop.as_ref().is_some_and(hit))
    }

    /// Delivers one event, re-dispatching through failsafe closes.
    fn dispatch(&mut self, pos: Pos, mut ev: Event) {
        if self.overflowed {
            return;
        }
        // Every re-dispatch either pops a frame or pushes one that
        // immediately consumes, so the loop terminates; the fuel guard
        // bounds it against future mistakes.
        let mut fuel = 2 * self.stack.len() + 8;
        loop {
            match self.step(pos, ev) {
                Step::Consumed => return,
                Step::Again(next) => ev = next,
            }
            if self.overflowed {
                return;
            }
            if fuel == 0 {
                log::error!("parser wedged re-dispatching {ev:?} at {pos}; dropping event");
                return;
            }
            fuel -= 1;
        }
    }

    /// Feeds an event to the current parse state.
    fn step(&mut self, pos: Pos, ev: Event) -> Step {
        match self.state {
            ParseState::Top => self.parse_top(pos, ev),
            ParseState::Extension | ParseState::Itemize | ParseState::Pre => {
                self.parse_line_block(pos, ev)
            }
            ParseState::Headline => self.parse_headline(pos, ev),
            ParseState::Span => self.parse_span(pos, ev),
            ParseState::Comment => self.parse_comment(pos, ev),
            ParseState::Special => self.parse_special(pos, ev),
            ParseState::Keyword => self.parse_keyword(pos, ev),
            ParseState::Link => self.parse_link(pos, ev),
            ParseState::ArgBar => self.parse_arg(pos, ev, Token::Bar),
            ParseState::ArgBlank => self.parse_arg(pos, ev, Token::Blank),
            ParseState::Table => self.parse_table(pos, ev),
            ParseState::TableArg => self.parse_table_arg(pos, ev),
            ParseState::TableCaption => self.parse_table_caption(pos, ev),
            ParseState::TableRow => self.parse_table_row(pos, ev),
            ParseState::TableHeader | ParseState::TableData => self.parse_table_cell(pos, ev),
            ParseState::Xml => self.parse_xml(pos, ev),
            ParseState::XmlPar => self.parse_xml_par(pos, ev),
            ParseState::XmlTable => self.parse_xml_table(pos, ev),
            ParseState::XmlTableRow => self.parse_xml_table_row(pos, ev),
        }
    }

    /// Document root: handles the leading directive, then behaves like a
    /// paragraph.
    fn parse_top(&mut self, pos: Pos, ev: Event) -> Step {
        match ev {
            Event::Token(token @ Token::Extension(_)) => {
                self.push(
                    NodeKind::Extension,
                    Some(token),
                    ParseState::Extension,
                    None,
                );
                Step::Consumed
            }
            ev => self.parse_par(pos, ev),
        }
    }

    /// Start-of-paragraph dispatch: line-level structures open here,
    /// everything else falls through to [`TreeBuilder::parse_base`].
    fn parse_par(&mut self, pos: Pos, ev: Event) -> Step {
        match ev {
            Event::Token(token @ Token::Itemize(_)) => {
                self.push(NodeKind::Itemize, Some(token), ParseState::Itemize, None);
                Step::Consumed
            }
            Event::Token(token @ Token::Headline(_)) => {
                self.push(NodeKind::Headline, Some(token), ParseState::Headline, None);
                Step::Consumed
            }
            Event::Token(token @ Token::Pre) => {
                self.push(NodeKind::Pre, Some(token), ParseState::Pre, None);
                Step::Consumed
            }
            Event::Token(token @ Token::TableOpen) => {
                self.push(
                    NodeKind::Table,
                    Some(token),
                    ParseState::Table,
                    Some(Stop::Token(Token::TableClose)),
                );
                Step::Consumed
            }
            Event::Token(token @ (Token::Par | Token::Hr)) => {
                self.current.append(Child::Token(token));
                Step::Consumed
            }
            ev => self.parse_base(pos, ev),
        }
    }

    /// Mid-flow dispatch: inline structures open here; text and leftover
    /// tokens are appended.
    fn parse_base(&mut self, pos: Pos, ev: Event) -> Step {
        match ev {
            Event::Text(text) => {
                self.current.append_text(&text);
                Step::Consumed
            }
            Event::Token(Token::StartTag(tag)) => {
                let stop = Some(Stop::EndTag(tag.name.clone()));
                let (kind, state) = if TABLE_TAGS.contains(&tag.name) {
                    (NodeKind::XmlTable, ParseState::XmlTable)
                } else if PAR_TAGS.contains(&tag.name) {
                    (NodeKind::XmlPar, ParseState::XmlPar)
                } else {
                    (NodeKind::Xml, ParseState::Xml)
                };
                self.push(kind, Some(Token::StartTag(tag)), state, stop);
                Step::Consumed
            }
            Event::Token(token @ Token::CommentOpen) => {
                self.push(
                    NodeKind::Comment,
                    Some(token),
                    ParseState::Comment,
                    Some(Stop::Token(Token::CommentClose)),
                );
                Step::Consumed
            }
            Event::Token(token @ Token::SpecialOpen) => {
                self.push(
                    NodeKind::Special,
                    Some(token),
                    ParseState::Special,
                    Some(Stop::Token(Token::SpecialClose)),
                );
                Step::Consumed
            }
            Event::Token(token @ Token::KeywordOpen) => {
                self.push(
                    NodeKind::Keyword,
                    Some(token),
                    ParseState::Keyword,
                    Some(Stop::Token(Token::KeywordClose)),
                );
                Step::Consumed
            }
            Event::Token(token @ Token::LinkOpen) => {
                self.push(
                    NodeKind::Link,
                    Some(token),
                    ParseState::Link,
                    Some(Stop::Token(Token::LinkClose)),
                );
                Step::Consumed
            }
            Event::Token(token) if token.is_quote() => {
                self.push(
                    NodeKind::Span,
                    Some(token.clone()),
                    ParseState::Span,
                    Some(Stop::Token(token)),
                );
                Step::Consumed
            }
            Event::Token(token @ (Token::EmptyTag(_) | Token::EndTag(_))) => {
                self.current.append(Child::Token(token));
                Step::Consumed
            }
            // A blank right after a line marker carries no content.
            Event::Token(Token::Blank) if self.current.children().is_empty() => Step::Consumed,
            Event::Token(token) => {
                if let Some(marker) = token.marker() {
                    if !matches!(token, Token::Eol | Token::Blank) {
                        log::debug!("unhandled token {token:?} at {pos}, kept as text");
                    }
                    self.current.append_text(marker);
                } else {
                    log::debug!("invalid token {token:?} at {pos}, kept verbatim");
                    self.current.append(Child::Token(token));
                }
                Step::Consumed
            }
        }
    }

    /// Shared handler for extensions, list items and preformatted lines:
    /// the context spans the rest of the line.
    fn parse_line_block(&mut self, pos: Pos, ev: Event) -> Step {
        match ev {
            Event::Token(Token::Eol) => {
                self.pop();
                Step::Consumed
            }
            ev if self.is_closing(&ev) => {
                self.pop();
                Step::Again(ev)
            }
            ev => self.parse_par(pos, ev),
        }
    }

    fn parse_headline(&mut self, pos: Pos, ev: Event) -> Step {
        match ev {
            // The mirrored close run re-emits the opening token; it only
            // marks where the visible headline text ends.
            Event::Token(Token::Headline(_)) => Step::Consumed,
            Event::Token(Token::Eol) => {
                self.pop();
                Step::Consumed
            }
            ev if self.is_closing(&ev) => {
                self.pop();
                Step::Again(ev)
            }
            ev => self.parse_par(pos, ev),
        }
    }

    fn parse_span(&mut self, pos: Pos, ev: Event) -> Step {
        if let Event::Token(token) = &ev
            && self.current.open_token() == Some(token)
        {
            self.pop();
            return Step::Consumed;
        }
        match ev {
            // Missing-close failsafe: emphasis never crosses a line break.
            Event::Token(Token::Eol) => {
                self.pop();
                Step::Again(Event::Token(Token::Eol))
            }
            ev if self.is_closing(&ev) => {
                self.pop();
                Step::Again(ev)
            }
            ev => self.parse_par(pos, ev),
        }
    }

    fn parse_comment(&mut self, _pos: Pos, ev: Event) -> Step {
        match ev {
            Event::Token(Token::CommentClose) => {
                self.pop();
                Step::Consumed
            }
            Event::Token(token) => {
                self.current.append(Child::Token(token));
                Step::Consumed
            }
            Event::Text(text) => {
                self.current.append_text(&text);
                Step::Consumed
            }
        }
    }

    fn parse_special(&mut self, _pos: Pos, ev: Event) -> Step {
        self.parse_arg_list(ev, Token::SpecialClose, ParseState::ArgBar, Token::Bar)
    }

    fn parse_keyword(&mut self, _pos: Pos, ev: Event) -> Step {
        self.parse_arg_list(ev, Token::KeywordClose, ParseState::ArgBar, Token::Bar)
    }

    fn parse_link(&mut self, _pos: Pos, ev: Event) -> Step {
        self.parse_arg_list(ev, Token::LinkClose, ParseState::ArgBlank, Token::Blank)
    }

    /// Shared handler for the three argument-list containers. The first
    /// inner event opens an `Arg` child; the separator discipline lives in
    /// the arg state itself.
    fn parse_arg_list(
        &mut self,
        ev: Event,
        close: Token,
        arg_state: ParseState,
        separator: Token,
    ) -> Step {
        match ev {
            Event::Token(token) if token == close => {
                self.pop();
                Step::Consumed
            }
            ev if self.is_closing(&ev) => {
                self.pop();
                Step::Again(ev)
            }
            ev => {
                self.push(NodeKind::Arg, None, arg_state, Some(Stop::Token(separator)));
                Step::Again(ev)
            }
        }
    }

    /// An argument in a pipe- or blank-separated list.
    fn parse_arg(&mut self, pos: Pos, ev: Event, separator: Token) -> Step {
        match ev {
            Event::Token(token) if token == separator => {
                self.pop();
                Step::Consumed
            }
            ev if self.is_closing(&ev) => {
                self.pop();
                Step::Again(ev)
            }
            ev => self.parse_par(pos, ev),
        }
    }

    fn parse_table(&mut self, _pos: Pos, ev: Event) -> Step {
        match ev {
            Event::Token(Token::TableClose) => {
                self.pop();
                Step::Consumed
            }
            Event::Token(token @ Token::TableCaption) => {
                self.push(
                    NodeKind::TableCaption,
                    Some(token),
                    ParseState::TableCaption,
                    None,
                );
                Step::Consumed
            }
            Event::Token(token @ Token::TableRow) => {
                self.push(NodeKind::TableRow, Some(token), ParseState::TableRow, None);
                Step::Consumed
            }
            // A cell with no preceding `|-` opens a synthetic row.
            Event::Token(token) if token.is_table_delimiter() => {
                self.push(
                    NodeKind::TableRow,
                    Some(token.clone()),
                    ParseState::TableRow,
                    None,
                );
                Step::Again(Event::Token(token))
            }
            Event::Token(Token::Eol) => Step::Consumed,
            ev if self.is_closing(&ev) => {
                self.pop();
                Step::Again(ev)
            }
            ev => {
                self.push(
                    NodeKind::Arg,
                    None,
                    ParseState::TableArg,
                    Some(Stop::Token(Token::Bar)),
                );
                Step::Again(ev)
            }
        }
    }

    fn parse_table_arg(&mut self, pos: Pos, ev: Event) -> Step {
        match ev {
            Event::Token(Token::Bar | Token::Eol) => {
                self.pop();
                Step::Consumed
            }
            Event::Token(token) if token.is_table_delimiter() => {
                self.pop();
                Step::Again(Event::Token(token))
            }
            ev if self.is_closing(&ev) => {
                self.pop();
                Step::Again(ev)
            }
            ev => self.parse_par(pos, ev),
        }
    }

    fn parse_table_caption(&mut self, _pos: Pos, ev: Event) -> Step {
        match ev {
            Event::Token(Token::Eol) => {
                self.pop();
                Step::Consumed
            }
            Event::Token(token) if token.is_table_delimiter() => {
                self.pop();
                Step::Again(Event::Token(token))
            }
            ev if self.is_closing(&ev) => {
                self.pop();
                Step::Again(ev)
            }
            ev => {
                self.push(NodeKind::Arg, None, ParseState::TableArg, None);
                Step::Again(ev)
            }
        }
    }

    fn parse_table_row(&mut self, _pos: Pos, ev: Event) -> Step {
        match ev {
            // The newline after `|-` does not close the row; its cells are
            // on the following lines. The row closes on the next row,
            // caption or table end.
            Event::Token(Token::Eol) => Step::Consumed,
            Event::Token(token @ (Token::TableHeader | Token::TableHeaderSep)) => {
                self.push(
                    NodeKind::TableHeader,
                    Some(token),
                    ParseState::TableHeader,
                    None,
                );
                Step::Consumed
            }
            Event::Token(token @ (Token::TableData | Token::TableDataSep)) => {
                self.push(NodeKind::TableData, Some(token), ParseState::TableData, None);
                Step::Consumed
            }
            Event::Token(token @ (Token::TableCaption | Token::TableRow)) => {
                self.pop();
                Step::Again(Event::Token(token))
            }
            ev if self.is_closing(&ev) => {
                self.pop();
                Step::Again(ev)
            }
            ev => {
                self.push(NodeKind::Arg, None, ParseState::TableArg, None);
                Step::Again(ev)
            }
        }
    }

    fn parse_table_cell(&mut self, _pos: Pos, ev: Event) -> Step {
        match ev {
            Event::Token(Token::Eol) => {
                self.pop();
                Step::Consumed
            }
            Event::Token(token) if token.is_table_delimiter() => {
                self.pop();
                Step::Again(Event::Token(token))
            }
            ev if self.is_closing(&ev) => {
                self.pop();
                Step::Again(ev)
            }
            ev => {
                self.push(NodeKind::Arg, None, ParseState::TableArg, None);
                Step::Again(ev)
            }
        }
    }

    fn parse_xml(&mut self, pos: Pos, ev: Event) -> Step {
        match ev {
            Event::Token(Token::EndTag(_)) => {
                self.pop();
                Step::Consumed
            }
            // Wikitext table structure outranks a dangling inline element.
            Event::Token(token) if token.is_table_delimiter() => {
                self.pop();
                Step::Again(Event::Token(token))
            }
            ev if self.is_closing(&ev) => {
                self.pop();
                Step::Again(ev)
            }
            ev => self.parse_par(pos, ev),
        }
    }

    fn parse_xml_par(&mut self, pos: Pos, ev: Event) -> Step {
        match ev {
            Event::Token(Token::EndTag(_)) => {
                self.pop();
                Step::Consumed
            }
            Event::Token(Token::StartTag(tag))
                if PAR_TAGS.contains(&tag.name) || TABLE_ROW_TAGS.contains(&tag.name) =>
            {
                self.pop();
                Step::Again(Event::Token(Token::StartTag(tag)))
            }
            Event::Token(token) if token.is_table_delimiter() => {
                self.pop();
                Step::Again(Event::Token(token))
            }
            ev if self.is_closing(&ev) => {
                self.pop();
                Step::Again(ev)
            }
            ev => self.parse_par(pos, ev),
        }
    }

    fn parse_xml_table(&mut self, pos: Pos, ev: Event) -> Step {
        match ev {
            Event::Token(Token::StartTag(tag)) if TABLE_ROW_TAGS.contains(&tag.name) => {
                let stop = Some(Stop::EndTag(tag.name.clone()));
                self.push(
                    NodeKind::XmlTableRow,
                    Some(Token::StartTag(tag)),
                    ParseState::XmlTableRow,
                    stop,
                );
                Step::Consumed
            }
            Event::Token(Token::EndTag(_)) => {
                self.pop();
                Step::Consumed
            }
            ev if self.is_closing(&ev) => {
                self.pop();
                Step::Again(ev)
            }
            ev => self.parse_par(pos, ev),
        }
    }

    fn parse_xml_table_row(&mut self, pos: Pos, ev: Event) -> Step {
        match ev {
            Event::Token(Token::EndTag(_)) => {
                self.pop();
                Step::Consumed
            }
            // A second `<tr>` closes the current row; at most one row is
            // ever open.
            Event::Token(Token::StartTag(tag)) if TABLE_ROW_TAGS.contains(&tag.name) => {
                self.pop();
                Step::Again(Event::Token(Token::StartTag(tag)))
            }
            ev if self.is_closing(&ev) => {
                self.pop();
                Step::Again(ev)
            }
            ev => self.parse_par(pos, ev),
        }
    }

    /// Pops every remaining context and returns the root.
    fn finish(mut self) -> Result<Node, Error> {
        if self.overflowed {
            return Err(Error::StackOverflow(self.max_depth));
        }
        while !self.stack.is_empty() {
            self.pop();
        }
        Ok(self.current)
    }
}

/// A streaming wikitext parser.
///
/// Owns a [`Tokenizer`] and a tree builder and couples them
/// synchronously: every token and text run produced while feeding is
/// delivered to the builder before [`Parser::feed_text`] returns. One
/// instance parses one document.
#[derive(Debug)]
pub struct Parser {
    /// The scanner.
    tokenizer: Tokenizer,
    /// The pushdown tree builder receiving the event stream.
    builder: TreeBuilder,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Creates a parser with [`DEFAULT_MAX_DEPTH`].
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// Creates a parser with an explicit nesting limit.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            tokenizer: Tokenizer::new(),
            builder: TreeBuilder::new(max_depth),
        }
    }

    /// Appends a chunk of input. Chunk boundaries may fall anywhere,
    /// including inside markers.
    pub fn feed_text(&mut self, chunk: &str) -> Result<(), Error> {
        self.tokenizer.feed(chunk, &mut self.builder);
        if self.builder.overflowed {
            Err(Error::StackOverflow(self.builder.max_depth))
        } else {
            Ok(())
        }
    }

    /// Convenience loop feeding a reader line by line.
    pub fn feed_file(&mut self, mut reader: impl BufRead) -> Result<(), Error> {
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Ok(());
            }
            self.feed_text(&line)?;
        }
    }

    /// Flushes pending text, pops all open contexts and returns the
    /// `Page` root.
    pub fn close(mut self) -> Result<Node, Error> {
        self.tokenizer.close(&mut self.builder);
        self.builder.finish()
    }
}

/// Parses a complete in-memory document.
pub fn parse(input: &str) -> Result<Node, Error> {
    let mut parser = Parser::new();
    parser.feed_text(input)?;
    parser.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[track_caller]
    fn dump(input: &str) -> String {
        parse(input).unwrap().dump()
    }

    #[test]
    fn headline() {
        assert_eq!(dump("==Hello==\n"), r#"(page (headline:2 "Hello"))"#);
    }

    #[test]
    fn headline_with_trailing_spaces() {
        assert_eq!(dump("== a ==\nrest"), r#"(page (headline:2 "a ") "rest")"#);
    }

    #[test]
    fn keyword_with_display_text() {
        assert_eq!(
            dump("[[Foo|bar]]"),
            r#"(page (keyword (arg "Foo") (arg "bar")))"#
        );
    }

    #[test]
    fn special_with_three_args() {
        assert_eq!(
            dump("{{a|b|c}}"),
            r#"(page (special (arg "a") (arg "b") (arg "c")))"#
        );
    }

    #[test]
    fn link_separates_on_blank() {
        assert_eq!(
            dump("[http://example.com/ here] "),
            r#"(page (link (arg "http://example.com/") (arg "here")) " ")"#
        );
    }

    #[test]
    fn table() {
        assert_eq!(
            dump("{|\n|a||b\n|-\n|c\n|}"),
            concat!(
                r#"(page (table (row (td (arg "a")) (td (arg "b")))"#,
                r#" (row (td (arg "c")))))"#
            )
        );
    }

    #[test]
    fn table_with_caption_and_header() {
        assert_eq!(
            dump("{|\n|+cap\n|-\n!h1!!h2\n|}"),
            concat!(
                r#"(page (table (caption (arg "cap"))"#,
                r#" (row (th (arg "h1")) (th (arg "h2")))))"#
            )
        );
    }

    #[test]
    fn spans() {
        assert_eq!(
            dump("'''bold''' and ''it''"),
            r#"(page (span:''' "bold") " and " (span:'' "it"))"#
        );
    }

    #[test]
    fn span_failsafe_closes_at_end_of_line() {
        assert_eq!(dump("''a\nb"), "(page (span:'' \"a\") \"\\nb\")");
    }

    #[test]
    fn ref_element() {
        assert_eq!(
            dump("<ref>ignored</ref>visible"),
            r#"(page (xml:ref "ignored") "visible")"#
        );
    }

    #[test]
    fn itemize_lines() {
        assert_eq!(
            dump("* one\n* two\n"),
            r#"(page (itemize:* "one") (itemize:* "two"))"#
        );
    }

    #[test]
    fn comments_swallow_markup() {
        assert_eq!(
            dump("a<!-- [[x]] -->b"),
            r#"(page "a" (comment " [[x]] ") "b")"#
        );
    }

    #[test]
    fn nowiki_content_is_text() {
        assert_eq!(
            dump("<nowiki>[[foo]]</nowiki>"),
            r#"(page (xml:nowiki "[[foo]]"))"#
        );
    }

    #[test]
    fn redirect_extension() {
        assert_eq!(
            dump("#REDIRECT [[Other]]\n"),
            r#"(page (extension:REDIRECT (keyword (arg "Other"))))"#
        );
    }

    #[test]
    fn stray_close_markers_become_text() {
        assert_eq!(dump("a}}b"), r#"(page "a}}b")"#);
        assert_eq!(dump("a]]b"), r#"(page "a]]b")"#);
    }

    #[test]
    fn cross_context_table_close() {
        assert_eq!(
            dump("<table><tr><td>''x</td></tr></table>"),
            r#"(page (xml:table (xml:tr (xml:td (span:'' "x")))))"#
        );
    }

    #[test]
    fn second_tr_closes_open_row() {
        assert_eq!(
            dump("<table><tr>a<tr>b</table>"),
            r#"(page (xml:table (xml:tr "a") (xml:tr "b")))"#
        );
    }

    #[test]
    fn block_tag_auto_closes_on_next_block() {
        // `<p>` forces the open `<div>` closed; the dangling `</div>` is
        // kept verbatim.
        assert_eq!(
            dump("<div>a<p>b</p></div>"),
            r#"(page (xml:div "a") (xml:p "b") <EndTag("div")>)"#
        );
    }

    #[test]
    fn table_close_reaches_through_inline_element() {
        assert_eq!(
            dump("{|\n|<span>x\n|}"),
            "(page (table (row (td (arg (xml:span \"x\\n\"))))))"
        );
    }

    #[test]
    fn unclosed_contexts_drain_at_close() {
        assert_eq!(dump("{{a|b"), r#"(page (special (arg "a") (arg "b")))"#);
    }

    #[test]
    fn deep_nesting_overflows() {
        let input = "{{".repeat(200);
        assert!(matches!(parse(&input), Err(Error::StackOverflow(_))));
    }

    #[test]
    fn nesting_under_the_limit_is_fine() {
        let input = format!("{}x{}", "{{".repeat(40), "}}".repeat(40));
        assert!(parse(&input).is_ok());
    }

    #[quickcheck]
    fn arbitrary_input_never_panics(input: String) -> bool {
        match parse(&input) {
            Ok(root) => root.kind() == crate::tree::NodeKind::Page,
            Err(Error::StackOverflow(_)) => true,
            Err(Error::Io(_)) => false,
        }
    }

    #[quickcheck]
    fn chunking_does_not_change_the_tree(input: String, splits: Vec<u8>) -> bool {
        let chunked = (|| {
            let mut parser = Parser::new();
            let mut rest = input.as_str();
            for split in splits {
                let at = (usize::from(split)).min(rest.len());
                let at = (0..=at)
                    .rev()
                    .find(|&i| rest.is_char_boundary(i))
                    .unwrap_or(0);
                let (head, tail) = rest.split_at(at);
                parser.feed_text(head)?;
                rest = tail;
            }
            parser.feed_text(rest)?;
            parser.close()
        })();
        match (parse(&input), chunked) {
            (Ok(expected), Ok(actual)) => expected == actual,
            (Err(_), Err(_)) => true,
            _ => false,
        }
    }
}
