//! The streaming wikitext tokenizer.
//!
//! A deterministic state machine that consumes input one character at a
//! time and emits positioned [`Token`]s and text runs through a
//! [`TokenSink`]. Input may arrive in arbitrary chunks; every state,
//! including the multi-character marker lookaheads (`[[`, `'''`, `-->`,
//! …), carries correctly across chunk boundaries.
//!
//! Line-oriented markup means the machine is mode-switched: characters at
//! the beginning of a line (`|`, `!`, `=`, `*#:;`, `-`, whitespace) have
//! meanings they do not have mid-line. Inside `<nowiki>`-class tags only
//! `<` and `&` keep their meaning; everything else is literal text.

use crate::tags::{NO_WIKI_TAGS, VALID_TAGS};
use crate::token::{Pos, TagData, Token};

/// The receiver for tokenizer events.
///
/// Events are delivered synchronously while [`Tokenizer::feed`] runs. Text
/// that carries no markup significance accumulates in a pending buffer and
/// is flushed as one `text` call whenever a token is about to be emitted or
/// the tokenizer is closed, so consecutive `text` events never abut.
pub trait TokenSink {
    /// Called with the absolute offset of the first character of `token`.
    fn token(&mut self, pos: Pos, token: Token);
    /// Called with the absolute offset of the first character of `text`.
    fn text(&mut self, pos: Pos, text: &str);
}

/// Scanner states.
///
/// Variant data lives in [`Tokenizer`] fields rather than the enum so the
/// state is a bare discriminant and transitions stay cheap.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    /// Beginning of document; recognises a leading `#WORD` directive.
    Bod,
    /// Scanning the word of a `#WORD` directive.
    BodExtension,
    /// Beginning of a logical line.
    Bol,
    /// Absorbing blank lines after a paragraph break.
    BolNl,
    /// Leading whitespace; becomes `PRE` if the line has content.
    BolSp,
    /// Absorbing `-` after a horizontal rule.
    BolHr,
    /// Saw `{` at the beginning of a line.
    BolBrace,
    /// Saw `|` at the beginning of a line.
    BolBar,
    /// Counting leading `=`.
    BolHeadline,
    /// Accumulating a `*#:;` bullet run.
    BolItemize,
    /// Mid-line scanning.
    Main,
    /// Absorbing the `=` run that closes a headline.
    HeadlineEnd,
    /// Absorbing mid-line whitespace after a `BLANK`.
    Blank,
    /// Saw `&`.
    Entity,
    /// Saw `&#`.
    EntityNumHex,
    /// Scanning `&#digits`.
    EntityNum,
    /// Scanning `&#x hex digits`.
    EntityHex,
    /// Scanning `&name`.
    EntityName,
    /// Saw `<`.
    Tag,
    /// Saw `<!`.
    CommentOpen1,
    /// Saw `<!-`.
    CommentOpen2,
    /// Inside a comment body.
    Comment,
    /// Saw `-` inside a comment.
    CommentDash1,
    /// Saw `--` inside a comment.
    CommentDash2,
    /// Scanning an end tag name.
    EndTag,
    /// Scanning a start tag name.
    StartTagName,
    /// Between attributes inside a start tag.
    StartTagMid,
    /// Saw `/` inside a start tag; waiting for `>`.
    StartTagSlash,
    /// Scanning an attribute key.
    AttrKey,
    /// Scanning an unquoted attribute value.
    AttrValue,
    /// Scanning a quoted attribute value.
    AttrValueQuoted,
    /// Saw `[`.
    BracketOpen,
    /// Saw `]`.
    BracketClose,
    /// Saw `{` mid-line.
    BraceOpen,
    /// Saw `}`.
    BraceClose,
    /// Saw `'`.
    Quote1,
    /// Saw `''`.
    Quote2,
    /// Saw `'''`.
    Quote3,
    /// Saw `''''`.
    Quote4,
    /// Saw a mid-line `|`.
    BarSep,
    /// Saw a mid-line `!`.
    ExcSep,
}

/// Where a decoded entity is delivered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum EntitySink {
    /// Into the main text stream; resumes [`State::Main`].
    Text,
    /// Into an unquoted attribute value.
    AttrValue,
    /// Into a quoted attribute value.
    AttrValueQuoted,
}

/// Whether a state consumed the current character.
enum Flow {
    /// Advance to the next character.
    Consumed,
    /// Re-dispatch the same character to the new state.
    Again,
}

/// The streaming tokenizer.
///
/// One instance is a mutable state machine for one document; it is not
/// reusable across documents and not safe for concurrent use.
#[derive(Debug)]
pub struct Tokenizer {
    /// The current scanner state.
    state: State,
    /// False while inside a `<nowiki>`-class element.
    wiki: bool,
    /// Absolute character offset of the character being processed.
    pos: Pos,
    /// Offset of the first character of the current marker lookahead.
    mark: Pos,
    /// Pending text run.
    text: String,
    /// Offset of the first character of the pending text run.
    text_pos: Pos,
    /// Depth of the headline that opened the current line, for detecting
    /// the mirrored close run.
    headline: Option<usize>,
    /// Accumulator for [`State::BolHeadline`].
    headline_count: usize,
    /// Accumulator for [`State::BolItemize`] and [`State::BodExtension`].
    word: String,
    /// Raw characters scanned after `&`, without the `&`.
    entity: String,
    /// Delivery target for the entity being scanned.
    entity_sink: EntitySink,
    /// Name of the tag being scanned.
    tag_name: String,
    /// Completed attributes of the start tag being scanned.
    tag_attrs: Vec<(String, String)>,
    /// Key of the attribute being scanned.
    attr_key: String,
    /// Value of the attribute being scanned; `None` before `=` is seen.
    attr_value: Option<String>,
    /// The quote character that closes the current attribute value.
    attr_quote: char,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    /// Creates a tokenizer positioned at the beginning of a document.
    pub fn new() -> Self {
        Self {
            state: State::Bod,
            wiki: true,
            pos: 0,
            mark: 0,
            text: String::new(),
            text_pos: 0,
            headline: None,
            headline_count: 0,
            word: String::new(),
            entity: String::new(),
            entity_sink: EntitySink::Text,
            tag_name: String::new(),
            tag_attrs: Vec::new(),
            attr_key: String::new(),
            attr_value: None,
            attr_quote: '"',
        }
    }

    /// Feeds a chunk of input, emitting any number of events into `sink`.
    pub fn feed(&mut self, chunk: &str, sink: &mut impl TokenSink) {
        let mut i = 0;
        while i < chunk.len() {
            // Bulk-skip runs that cannot start a marker: comment bodies up
            // to the next dash, nowiki text up to the next tag or entity.
            let skip = match self.state {
                State::Comment => memchr::memchr(b'-', chunk[i..].as_bytes()),
                State::Main if !self.wiki => {
                    memchr::memchr2(b'<', b'&', chunk[i..].as_bytes())
                }
                _ => None,
            };
            if let Some(len) = skip
                && len > 0
            {
                let run = &chunk[i..i + len];
                self.push_text(self.pos, run);
                self.pos += run.chars().count();
                i += len;
                continue;
            }

            // `unwrap` is fine: i always lands on a character boundary.
            let c = chunk[i..].chars().next().unwrap();
            loop {
                match self.step(c, sink) {
                    Flow::Consumed => break,
                    Flow::Again => {}
                }
            }
            self.pos += 1;
            i += c.len_utf8();
        }
    }

    /// Flushes the pending text run. Markers still in lookahead (an
    /// unterminated `[`, a half-scanned tag) are abandoned, matching the
    /// truncated-input contract.
    pub fn close(&mut self, sink: &mut impl TokenSink) {
        self.flush_text(sink);
    }

    /// Dispatches one character to the current state.
    fn step(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        match self.state {
            State::Bod => self.scan_bod(c),
            State::BodExtension => self.scan_bod_extension(c, sink),
            State::Bol => self.scan_bol(c, sink),
            State::BolNl => self.scan_bol_nl(c),
            State::BolSp => self.scan_bol_sp(c, sink),
            State::BolHr => self.scan_bol_hr(c),
            State::BolBrace => self.scan_bol_brace(c, sink),
            State::BolBar => self.scan_bol_bar(c, sink),
            State::BolHeadline => self.scan_bol_headline(c, sink),
            State::BolItemize => self.scan_bol_itemize(c, sink),
            State::Main => self.scan_main(c, sink),
            State::HeadlineEnd => self.scan_headline_end(c),
            State::Blank => self.scan_blank(c, sink),
            State::Entity => self.scan_entity(c),
            State::EntityNumHex => self.scan_entity_numhex(c),
            State::EntityNum | State::EntityHex | State::EntityName => {
                self.scan_entity_body(c, sink)
            }
            State::Tag => self.scan_tag(c, sink),
            State::CommentOpen1 => self.scan_comment_open1(c),
            State::CommentOpen2 => self.scan_comment_open2(c, sink),
            State::Comment => self.scan_comment(c),
            State::CommentDash1 => self.scan_comment_dash1(c),
            State::CommentDash2 => self.scan_comment_dash2(c, sink),
            State::EndTag => self.scan_endtag(c, sink),
            State::StartTagName => self.scan_starttag_name(c),
            State::StartTagMid => self.scan_starttag_mid(c, sink),
            State::StartTagSlash => self.scan_starttag_slash(c, sink),
            State::AttrKey => self.scan_attr_key(c),
            State::AttrValue => self.scan_attr_value(c),
            State::AttrValueQuoted => self.scan_attr_value_quoted(c),
            State::BracketOpen => self.scan_bracket_open(c, sink),
            State::BracketClose => self.scan_bracket_close(c, sink),
            State::BraceOpen => self.scan_brace_open(c, sink),
            State::BraceClose => self.scan_brace_close(c, sink),
            State::Quote1 => self.scan_q1(c),
            State::Quote2 => self.scan_q2(c, sink),
            State::Quote3 => self.scan_q3(c, sink),
            State::Quote4 => self.scan_q4(c, sink),
            State::BarSep => self.scan_bar(c, sink),
            State::ExcSep => self.scan_exc(c, sink),
        }
    }

    /// Appends to the pending text run.
    fn push_text(&mut self, pos: Pos, text: &str) {
        if self.text.is_empty() {
            self.text_pos = pos;
        }
        self.text.push_str(text);
    }

    /// Appends one character to the pending text run.
    fn push_text_char(&mut self, pos: Pos, c: char) {
        if self.text.is_empty() {
            self.text_pos = pos;
        }
        self.text.push(c);
    }

    /// Flushes the pending text run into the sink.
    fn flush_text(&mut self, sink: &mut impl TokenSink) {
        if !self.text.is_empty() {
            let text = core::mem::take(&mut self.text);
            sink.text(self.text_pos, &text);
        }
    }

    /// Emits a token, flushing any pending text first.
    fn emit(&mut self, pos: Pos, token: Token, sink: &mut impl TokenSink) {
        self.flush_text(sink);
        sink.token(pos, token);
    }

    fn scan_bod(&mut self, c: char) -> Flow {
        if c == '#' {
            self.mark = self.pos;
            self.word.clear();
            self.state = State::BodExtension;
            Flow::Consumed
        } else {
            self.state = State::Bol;
            Flow::Again
        }
    }

    fn scan_bod_extension(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c.is_alphanumeric() {
            self.word.push(c);
            Flow::Consumed
        } else {
            let name = core::mem::take(&mut self.word);
            self.emit(self.mark, Token::Extension(name), sink);
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_bol(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        self.headline = None;
        match c {
            '\n' => {
                self.emit(self.pos, Token::Par, sink);
                self.state = State::BolNl;
                Flow::Consumed
            }
            '-' => {
                self.emit(self.pos, Token::Hr, sink);
                self.state = State::BolHr;
                Flow::Consumed
            }
            '{' => {
                self.mark = self.pos;
                self.state = State::BolBrace;
                Flow::Consumed
            }
            '|' => {
                self.mark = self.pos;
                self.state = State::BolBar;
                Flow::Consumed
            }
            '!' => {
                self.emit(self.pos, Token::TableHeader, sink);
                self.state = State::Main;
                Flow::Consumed
            }
            '=' => {
                self.mark = self.pos;
                self.headline_count = 0;
                self.state = State::BolHeadline;
                Flow::Again
            }
            '*' | '#' | ':' | ';' => {
                self.mark = self.pos;
                self.word.clear();
                self.state = State::BolItemize;
                Flow::Again
            }
            c if c.is_whitespace() => {
                self.state = State::BolSp;
                Flow::Consumed
            }
            _ => {
                self.state = State::Main;
                Flow::Again
            }
        }
    }

    fn scan_bol_nl(&mut self, c: char) -> Flow {
        if c == '\n' {
            Flow::Consumed
        } else {
            self.state = State::Bol;
            Flow::Again
        }
    }

    fn scan_bol_sp(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '\n' {
            self.state = State::Bol;
            Flow::Consumed
        } else if c.is_whitespace() {
            Flow::Consumed
        } else {
            self.emit(self.pos, Token::Pre, sink);
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_bol_hr(&mut self, c: char) -> Flow {
        if c == '-' {
            Flow::Consumed
        } else {
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_bol_brace(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '|' {
            self.emit(self.mark, Token::TableOpen, sink);
            self.state = State::Main;
            Flow::Consumed
        } else {
            self.state = State::BraceOpen;
            Flow::Again
        }
    }

    fn scan_bol_bar(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        match c {
            '}' => {
                self.emit(self.mark, Token::TableClose, sink);
                self.state = State::Main;
                Flow::Consumed
            }
            '+' => {
                self.emit(self.mark, Token::TableCaption, sink);
                self.state = State::Main;
                Flow::Consumed
            }
            '-' => {
                self.emit(self.mark, Token::TableRow, sink);
                self.state = State::Main;
                Flow::Consumed
            }
            _ => {
                self.emit(self.mark, Token::TableData, sink);
                self.state = State::Main;
                Flow::Again
            }
        }
    }

    fn scan_bol_headline(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '=' {
            self.headline_count += 1;
            Flow::Consumed
        } else {
            let depth = self.headline_count;
            self.emit(self.mark, Token::Headline(depth), sink);
            self.headline = Some(depth);
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_bol_itemize(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if matches!(c, '*' | '#' | ':' | ';') {
            self.word.push(c);
            Flow::Consumed
        } else {
            let bullets = core::mem::take(&mut self.word);
            self.emit(self.mark, Token::Itemize(bullets), sink);
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_main(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        // Tags and entities stay live inside nowiki; nothing else does.
        match c {
            '&' => {
                self.mark = self.pos;
                self.entity.clear();
                self.entity_sink = EntitySink::Text;
                self.state = State::Entity;
                return Flow::Consumed;
            }
            '<' => {
                self.mark = self.pos;
                self.state = State::Tag;
                return Flow::Consumed;
            }
            _ => {}
        }
        if !self.wiki {
            self.push_text_char(self.pos, c);
            return Flow::Consumed;
        }
        match c {
            '\n' => {
                self.emit(self.pos, Token::Eol, sink);
                self.headline = None;
                self.state = State::Bol;
                Flow::Consumed
            }
            c if c.is_whitespace() => {
                self.emit(self.pos, Token::Blank, sink);
                self.state = State::Blank;
                Flow::Consumed
            }
            '|' => {
                self.mark = self.pos;
                self.state = State::BarSep;
                Flow::Consumed
            }
            '!' => {
                self.mark = self.pos;
                self.state = State::ExcSep;
                Flow::Consumed
            }
            '=' if self.headline.is_some() => {
                // The close run mirrors the opening token's depth, whatever
                // its actual length.
                let depth = self.headline.unwrap_or_default();
                self.emit(self.pos, Token::Headline(depth), sink);
                self.state = State::HeadlineEnd;
                Flow::Consumed
            }
            '[' => {
                self.mark = self.pos;
                self.state = State::BracketOpen;
                Flow::Consumed
            }
            ']' => {
                self.mark = self.pos;
                self.state = State::BracketClose;
                Flow::Consumed
            }
            '{' => {
                self.mark = self.pos;
                self.state = State::BraceOpen;
                Flow::Consumed
            }
            '}' => {
                self.mark = self.pos;
                self.state = State::BraceClose;
                Flow::Consumed
            }
            '\'' => {
                self.mark = self.pos;
                self.state = State::Quote1;
                Flow::Consumed
            }
            _ => {
                self.push_text_char(self.pos, c);
                Flow::Consumed
            }
        }
    }

    fn scan_headline_end(&mut self, c: char) -> Flow {
        if c == '=' {
            Flow::Consumed
        } else {
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_blank(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '\n' {
            self.emit(self.pos, Token::Eol, sink);
            self.headline = None;
            self.state = State::Bol;
            Flow::Consumed
        } else if c.is_whitespace() {
            Flow::Consumed
        } else {
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_entity(&mut self, c: char) -> Flow {
        if c == '#' {
            self.entity.push(c);
            self.state = State::EntityNumHex;
            Flow::Consumed
        } else {
            self.state = State::EntityName;
            Flow::Again
        }
    }

    fn scan_entity_numhex(&mut self, c: char) -> Flow {
        if c == 'x' || c == 'X' {
            self.entity.push(c);
            self.state = State::EntityHex;
            Flow::Consumed
        } else {
            self.state = State::EntityNum;
            Flow::Again
        }
    }

    /// Shared body of the three entity accumulation states; they differ
    /// only in which characters may extend the reference.
    fn scan_entity_body(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        let more = match self.state {
            State::EntityNum => c.is_ascii_digit(),
            State::EntityHex => c.is_alphanumeric(),
            _ => c.is_alphanumeric(),
        };
        if more {
            self.entity.push(c);
            Flow::Consumed
        } else {
            let semi = c == ';';
            self.finish_entity(semi, sink);
            if semi { Flow::Consumed } else { Flow::Again }
        }
    }

    /// Resolves the accumulated entity and delivers the result.
    ///
    /// Failed decodes re-emit the source characters verbatim; the
    /// tokenizer has no failure modes.
    fn finish_entity(&mut self, semi: bool, _sink: &mut impl TokenSink) {
        let raw = core::mem::take(&mut self.entity);
        let decoded = decode_entity(&raw);
        let target = self.entity_sink;
        self.state = match target {
            EntitySink::Text => State::Main,
            EntitySink::AttrValue => State::AttrValue,
            EntitySink::AttrValueQuoted => State::AttrValueQuoted,
        };
        let mut deliver = |this: &mut Self, s: &str| match target {
            EntitySink::Text => this.push_text(this.mark, s),
            EntitySink::AttrValue | EntitySink::AttrValueQuoted => {
                if let Some(value) = this.attr_value.as_mut() {
                    value.push_str(s);
                }
            }
        };
        match decoded {
            Some(s) => deliver(self, &s),
            None => {
                let mut literal = String::with_capacity(raw.len() + 2);
                literal.push('&');
                literal.push_str(&raw);
                if semi {
                    literal.push(';');
                }
                deliver(self, &literal);
            }
        }
    }

    fn scan_tag(&mut self, c: char, _sink: &mut impl TokenSink) -> Flow {
        match c {
            '!' => {
                self.state = State::CommentOpen1;
                Flow::Consumed
            }
            '/' => {
                self.tag_name.clear();
                self.state = State::EndTag;
                Flow::Consumed
            }
            _ => {
                self.tag_name.clear();
                self.tag_attrs.clear();
                self.state = State::StartTagName;
                Flow::Again
            }
        }
    }

    fn scan_comment_open1(&mut self, c: char) -> Flow {
        if c == '-' {
            self.state = State::CommentOpen2;
            Flow::Consumed
        } else {
            self.push_text(self.mark, "<!");
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_comment_open2(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '-' {
            self.emit(self.mark, Token::CommentOpen, sink);
            self.state = State::Comment;
            Flow::Consumed
        } else {
            self.push_text(self.mark, "<!-");
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_comment(&mut self, c: char) -> Flow {
        if c == '-' {
            self.mark = self.pos;
            self.state = State::CommentDash1;
            Flow::Consumed
        } else {
            self.push_text_char(self.pos, c);
            Flow::Consumed
        }
    }

    fn scan_comment_dash1(&mut self, c: char) -> Flow {
        if c == '-' {
            self.state = State::CommentDash2;
            Flow::Consumed
        } else {
            self.push_text(self.mark, "-");
            self.state = State::Comment;
            Flow::Again
        }
    }

    fn scan_comment_dash2(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        match c {
            '>' => {
                self.emit(self.mark, Token::CommentClose, sink);
                self.state = State::Main;
                Flow::Consumed
            }
            '-' => {
                // Slide the window: `--->` closes with the trailing `-->`.
                self.push_text(self.mark, "-");
                self.mark += 1;
                Flow::Consumed
            }
            _ => {
                self.push_text(self.mark, "--");
                self.state = State::Comment;
                Flow::Again
            }
        }
    }

    fn scan_endtag(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '>' {
            let name = core::mem::take(&mut self.tag_name);
            if NO_WIKI_TAGS.contains(&name) {
                self.wiki = true;
            }
            self.emit(self.mark, Token::EndTag(name), sink);
            self.state = State::Main;
            Flow::Consumed
        } else if c.is_whitespace() {
            Flow::Consumed
        } else {
            self.tag_name.extend(c.to_lowercase());
            Flow::Consumed
        }
    }

    fn scan_starttag_name(&mut self, c: char) -> Flow {
        if c.is_alphanumeric() {
            self.tag_name.extend(c.to_lowercase());
            Flow::Consumed
        } else {
            self.state = State::StartTagMid;
            Flow::Again
        }
    }

    fn scan_starttag_mid(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '>' {
            self.finish_start_tag(false, sink);
            Flow::Consumed
        } else if c == '/' {
            self.state = State::StartTagSlash;
            Flow::Consumed
        } else if c.is_whitespace() {
            Flow::Consumed
        } else {
            self.attr_key.clear();
            self.attr_value = None;
            self.state = State::AttrKey;
            Flow::Again
        }
    }

    fn scan_starttag_slash(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '>' {
            self.finish_start_tag(true, sink);
        }
        Flow::Consumed
    }

    fn scan_attr_key(&mut self, c: char) -> Flow {
        if c == '=' {
            self.attr_value = Some(String::new());
            self.state = State::AttrValue;
            Flow::Consumed
        } else if c == '>' || c.is_whitespace() {
            self.end_attr();
            self.state = State::StartTagMid;
            Flow::Again
        } else {
            self.attr_key.extend(c.to_lowercase());
            Flow::Consumed
        }
    }

    fn scan_attr_value(&mut self, c: char) -> Flow {
        match c {
            '"' | '\'' => {
                self.attr_quote = c;
                self.state = State::AttrValueQuoted;
                Flow::Consumed
            }
            '&' => {
                self.entity.clear();
                self.entity_sink = EntitySink::AttrValue;
                self.state = State::Entity;
                Flow::Consumed
            }
            c if c == '>' || c.is_whitespace() => {
                self.end_attr();
                self.state = State::StartTagMid;
                Flow::Again
            }
            _ => {
                if let Some(value) = self.attr_value.as_mut() {
                    value.push(c);
                }
                Flow::Consumed
            }
        }
    }

    fn scan_attr_value_quoted(&mut self, c: char) -> Flow {
        if c == self.attr_quote {
            self.end_attr();
            self.state = State::StartTagMid;
            Flow::Consumed
        } else if c == '&' {
            self.entity.clear();
            self.entity_sink = EntitySink::AttrValueQuoted;
            self.state = State::Entity;
            Flow::Consumed
        } else {
            if let Some(value) = self.attr_value.as_mut() {
                value.push(c);
            }
            Flow::Consumed
        }
    }

    /// Completes the attribute in progress. A key without a value carries
    /// itself as the value.
    fn end_attr(&mut self) {
        let key = core::mem::take(&mut self.attr_key);
        let value = self.attr_value.take().unwrap_or_else(|| key.clone());
        self.tag_attrs.push((key, value));
    }

    /// Emits the start tag under construction, reclassifying it as an
    /// empty tag when self-closed or when the name is unrecognised.
    fn finish_start_tag(&mut self, self_closed: bool, sink: &mut impl TokenSink) {
        let tag = TagData {
            name: core::mem::take(&mut self.tag_name),
            attrs: core::mem::take(&mut self.tag_attrs),
        };
        let token = if self_closed || !VALID_TAGS.contains(&tag.name) {
            Token::EmptyTag(tag)
        } else {
            if NO_WIKI_TAGS.contains(&tag.name) {
                self.wiki = false;
            }
            Token::StartTag(tag)
        };
        self.emit(self.mark, token, sink);
        self.state = State::Main;
    }

    fn scan_bracket_open(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '[' {
            self.emit(self.mark, Token::KeywordOpen, sink);
            self.state = State::Main;
            Flow::Consumed
        } else {
            self.emit(self.mark, Token::LinkOpen, sink);
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_bracket_close(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == ']' {
            self.emit(self.mark, Token::KeywordClose, sink);
            self.state = State::Main;
            Flow::Consumed
        } else {
            self.emit(self.mark, Token::LinkClose, sink);
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_brace_open(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '{' {
            self.emit(self.mark, Token::SpecialOpen, sink);
            self.state = State::Main;
            Flow::Consumed
        } else {
            self.push_text(self.mark, "{");
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_brace_close(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '}' {
            self.emit(self.mark, Token::SpecialClose, sink);
            self.state = State::Main;
            Flow::Consumed
        } else {
            self.push_text(self.mark, "}");
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_q1(&mut self, c: char) -> Flow {
        if c == '\'' {
            self.state = State::Quote2;
            Flow::Consumed
        } else {
            self.push_text(self.mark, "'");
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_q2(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '\'' {
            self.state = State::Quote3;
            Flow::Consumed
        } else {
            self.emit(self.mark, Token::Quote2, sink);
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_q3(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '\'' {
            self.state = State::Quote4;
            Flow::Consumed
        } else {
            self.emit(self.mark, Token::Quote3, sink);
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_q4(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '\'' {
            self.emit(self.mark, Token::Quote5, sink);
            self.state = State::Main;
            Flow::Consumed
        } else {
            // Four quotes: the first apostrophe is plain text, the rest are
            // a bold toggle.
            self.push_text(self.mark, "'");
            self.emit(self.mark + 1, Token::Quote3, sink);
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_bar(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '|' {
            self.emit(self.mark, Token::TableDataSep, sink);
            self.state = State::Main;
            Flow::Consumed
        } else {
            self.emit(self.mark, Token::Bar, sink);
            self.state = State::Main;
            Flow::Again
        }
    }

    fn scan_exc(&mut self, c: char, sink: &mut impl TokenSink) -> Flow {
        if c == '!' {
            self.emit(self.mark, Token::TableHeaderSep, sink);
            self.state = State::Main;
            Flow::Consumed
        } else {
            self.push_text(self.mark, "!");
            self.state = State::Main;
            Flow::Again
        }
    }
}

/// Decodes one entity reference body (the part between `&` and `;`).
///
/// Returns `None` when the reference does not resolve.
fn decode_entity(raw: &str) -> Option<String> {
    if let Some(body) = raw.strip_prefix('#') {
        let value = if let Some(hex) = body.strip_prefix(['x', 'X']) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            body.parse::<u32>().ok()?
        };
        return char::from_u32(value).map(String::from);
    }
    if raw.is_empty() {
        return None;
    }
    let source = format!("&{raw};");
    let decoded = html_escape::decode_html_entities(&source);
    if decoded == source.as_str() {
        None
    } else {
        Some(decoded.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A recorded tokenizer event.
    #[derive(Clone, Debug, Eq, PartialEq)]
    enum Event {
        Tok(Pos, Token),
        Text(Pos, String),
    }

    #[derive(Default)]
    struct Recorder(Vec<Event>);

    impl TokenSink for Recorder {
        fn token(&mut self, pos: Pos, token: Token) {
            self.0.push(Event::Tok(pos, token));
        }
        fn text(&mut self, pos: Pos, text: &str) {
            self.0.push(Event::Text(pos, text.to_string()));
        }
    }

    fn tokenize_chunks(chunks: &[&str]) -> Vec<Event> {
        let mut tokenizer = Tokenizer::new();
        let mut sink = Recorder::default();
        for chunk in chunks {
            tokenizer.feed(chunk, &mut sink);
        }
        tokenizer.close(&mut sink);
        sink.0
    }

    fn tokenize(input: &str) -> Vec<Event> {
        tokenize_chunks(&[input])
    }

    fn text(pos: Pos, s: &str) -> Event {
        Event::Text(pos, s.to_string())
    }

    fn tok(pos: Pos, t: Token) -> Event {
        Event::Tok(pos, t)
    }

    #[test]
    fn plain_text_is_one_run() {
        assert_eq!(tokenize("hello"), vec![text(0, "hello")]);
    }

    #[test]
    fn five_quotes_at_start_of_line() {
        assert_eq!(tokenize("'''''"), vec![tok(0, Token::Quote5)]);
    }

    #[test]
    fn four_quotes_are_literal_plus_bold() {
        assert_eq!(
            tokenize("''''x"),
            vec![text(0, "'"), tok(1, Token::Quote3), text(4, "x")]
        );
    }

    #[test]
    fn quote_runs_classify_by_length() {
        assert_eq!(
            tokenize("a''b'''c"),
            vec![
                text(0, "a"),
                tok(1, Token::Quote2),
                text(3, "b"),
                tok(4, Token::Quote3),
                text(7, "c"),
            ]
        );
    }

    #[test]
    fn single_quote_is_text() {
        assert_eq!(tokenize("a'b"), vec![text(0, "a'b")]);
    }

    #[test]
    fn headline_tokens_mirror_depth() {
        assert_eq!(
            tokenize("==Hello==\n"),
            vec![
                tok(0, Token::Headline(2)),
                text(2, "Hello"),
                tok(7, Token::Headline(2)),
                tok(9, Token::Eol),
            ]
        );
    }

    #[test]
    fn equals_is_text_without_open_headline() {
        assert_eq!(tokenize("a=b"), vec![text(0, "a=b")]);
    }

    #[test]
    fn itemize_accumulates_bullets() {
        assert_eq!(
            tokenize("*# one\n"),
            vec![
                tok(0, Token::Itemize("*#".to_string())),
                tok(2, Token::Blank),
                text(3, "one"),
                tok(6, Token::Eol),
            ]
        );
    }

    #[test]
    fn table_markers_at_start_of_line() {
        assert_eq!(
            tokenize("{|\n|a||b\n|-\n|c\n|}"),
            vec![
                tok(0, Token::TableOpen),
                tok(2, Token::Eol),
                tok(3, Token::TableData),
                text(4, "a"),
                tok(5, Token::TableDataSep),
                text(7, "b"),
                tok(8, Token::Eol),
                tok(9, Token::TableRow),
                tok(11, Token::Eol),
                tok(12, Token::TableData),
                text(13, "c"),
                tok(14, Token::Eol),
                tok(15, Token::TableClose),
            ]
        );
    }

    #[test]
    fn header_markers() {
        assert_eq!(
            tokenize("!a!!b\n"),
            vec![
                tok(0, Token::TableHeader),
                text(1, "a"),
                tok(2, Token::TableHeaderSep),
                text(4, "b"),
                tok(5, Token::Eol),
            ]
        );
    }

    #[test]
    fn midline_bar_is_bar() {
        assert_eq!(
            tokenize("a|b"),
            vec![text(0, "a"), tok(1, Token::Bar), text(2, "b")]
        );
    }

    #[test]
    fn midline_exclamation_is_text() {
        assert_eq!(tokenize("a!b"), vec![text(0, "a!b")]);
    }

    #[test]
    fn paragraph_break_absorbs_blank_lines() {
        assert_eq!(
            tokenize("\n\n\nx"),
            vec![tok(0, Token::Par), text(3, "x")]
        );
    }

    #[test]
    fn horizontal_rule() {
        assert_eq!(
            tokenize("----\nx"),
            vec![tok(0, Token::Hr), tok(4, Token::Eol), text(5, "x")]
        );
    }

    #[test]
    fn leading_whitespace_is_pre() {
        assert_eq!(
            tokenize("  x\n"),
            vec![tok(2, Token::Pre), text(2, "x"), tok(3, Token::Eol)]
        );
    }

    #[test]
    fn whitespace_only_line_is_not_pre() {
        assert_eq!(tokenize("  \nx"), vec![text(3, "x")]);
    }

    #[test]
    fn brackets_and_braces() {
        assert_eq!(
            tokenize("[[a]] [b] {{c}} "),
            vec![
                tok(0, Token::KeywordOpen),
                text(2, "a"),
                tok(3, Token::KeywordClose),
                tok(5, Token::Blank),
                tok(6, Token::LinkOpen),
                text(7, "b"),
                tok(8, Token::LinkClose),
                tok(9, Token::Blank),
                tok(10, Token::SpecialOpen),
                text(12, "c"),
                tok(13, Token::SpecialClose),
                tok(15, Token::Blank),
            ]
        );
    }

    #[test]
    fn lone_brace_is_text() {
        assert_eq!(tokenize("a{b}c"), vec![text(0, "a{b}c")]);
    }

    #[test]
    fn special_open_split_across_chunks() {
        assert_eq!(
            tokenize_chunks(&["{", "{a}", "}"]),
            vec![
                tok(0, Token::SpecialOpen),
                text(2, "a"),
                tok(3, Token::SpecialClose),
            ]
        );
    }

    #[test]
    fn document_leading_extension() {
        assert_eq!(
            tokenize("#REDIRECT [[Foo]]\n"),
            vec![
                tok(0, Token::Extension("REDIRECT".to_string())),
                tok(9, Token::Blank),
                tok(10, Token::KeywordOpen),
                text(12, "Foo"),
                tok(15, Token::KeywordClose),
                tok(17, Token::Eol),
            ]
        );
    }

    #[test]
    fn hash_mid_document_is_itemize() {
        assert_eq!(
            tokenize("x\n# y\n"),
            vec![
                text(0, "x"),
                tok(1, Token::Eol),
                tok(2, Token::Itemize("#".to_string())),
                tok(3, Token::Blank),
                text(4, "y"),
                tok(5, Token::Eol),
            ]
        );
    }

    #[test]
    fn comment_tokens() {
        assert_eq!(
            tokenize("a<!--b-->c"),
            vec![
                text(0, "a"),
                tok(1, Token::CommentOpen),
                text(5, "b"),
                tok(6, Token::CommentClose),
                text(9, "c"),
            ]
        );
    }

    #[test]
    fn comment_with_stray_dashes() {
        assert_eq!(
            tokenize("<!--a-b--c--->"),
            vec![
                tok(0, Token::CommentOpen),
                text(4, "a-b--c-"),
                tok(11, Token::CommentClose),
            ]
        );
    }

    #[test]
    fn comment_close_split_across_chunks() {
        assert_eq!(
            tokenize_chunks(&["a<!-", "-b--", ">c"]),
            vec![
                text(0, "a"),
                tok(1, Token::CommentOpen),
                text(5, "b"),
                tok(6, Token::CommentClose),
                text(9, "c"),
            ]
        );
    }

    #[test]
    fn bang_without_dashes_is_text() {
        assert_eq!(tokenize("a<!b"), vec![text(0, "a<!b")]);
    }

    #[test]
    fn named_entity_decodes() {
        assert_eq!(tokenize("&amp;"), vec![text(0, "&")]);
    }

    #[test]
    fn numeric_entities_decode() {
        assert_eq!(tokenize("&#65;&#x42;"), vec![text(0, "AB")]);
    }

    #[test]
    fn bad_entity_is_literal() {
        assert_eq!(tokenize("&bogus;"), vec![text(0, "&bogus;")]);
        assert_eq!(tokenize("&#xZZ;"), vec![text(0, "&#xZZ;")]);
    }

    #[test]
    fn semicolon_is_an_optional_terminator() {
        assert_eq!(
            tokenize("&amp x"),
            vec![text(0, "&"), tok(4, Token::Blank), text(5, "x")]
        );
    }

    #[test]
    fn entity_split_across_chunks() {
        assert_eq!(tokenize_chunks(&["&a", "mp;"]), vec![text(0, "&")]);
    }

    #[test]
    fn start_tag_with_attributes() {
        let events = tokenize("<div class=\"a&amp;b\" id=c disabled>");
        assert_eq!(
            events,
            vec![tok(
                0,
                Token::StartTag(TagData {
                    name: "div".to_string(),
                    attrs: vec![
                        ("class".to_string(), "a&b".to_string()),
                        ("id".to_string(), "c".to_string()),
                        ("disabled".to_string(), "disabled".to_string()),
                    ],
                })
            )]
        );
    }

    #[test]
    fn tag_names_are_lowercased() {
        assert_eq!(
            tokenize("<DIV>x</DIV>"),
            vec![
                tok(0, Token::StartTag(TagData::new("div"))),
                text(5, "x"),
                tok(6, Token::EndTag("div".to_string())),
            ]
        );
    }

    #[test]
    fn unknown_tag_becomes_empty_tag() {
        assert_eq!(
            tokenize("<foo>"),
            vec![tok(0, Token::EmptyTag(TagData::new("foo")))]
        );
    }

    #[test]
    fn self_closed_tag_becomes_empty_tag() {
        assert_eq!(
            tokenize("<br/>"),
            vec![tok(0, Token::EmptyTag(TagData::new("br")))]
        );
    }

    #[test]
    fn nowiki_suppresses_wiki_markup() {
        assert_eq!(
            tokenize("<nowiki>[[foo]]</nowiki>"),
            vec![
                tok(0, Token::StartTag(TagData::new("nowiki"))),
                text(8, "[[foo]]"),
                tok(15, Token::EndTag("nowiki".to_string())),
            ]
        );
    }

    #[test]
    fn nowiki_keeps_entities_live() {
        assert_eq!(
            tokenize("<nowiki>a&amp;|b</nowiki>"),
            vec![
                tok(0, Token::StartTag(TagData::new("nowiki"))),
                text(8, "a&|b"),
                tok(16, Token::EndTag("nowiki".to_string())),
            ]
        );
    }

    #[test]
    fn nowiki_split_across_chunks() {
        assert_eq!(
            tokenize_chunks(&["<nowiki>[[", "foo]]</nowiki>"]),
            vec![
                tok(0, Token::StartTag(TagData::new("nowiki"))),
                text(8, "[[foo]]"),
                tok(15, Token::EndTag("nowiki".to_string())),
            ]
        );
    }

    #[test]
    fn positions_count_characters_not_bytes() {
        assert_eq!(
            tokenize("é'''x"),
            vec![text(0, "é"), tok(1, Token::Quote3), text(4, "x")]
        );
    }

    #[test]
    fn no_input_is_lost() {
        // For inputs without entities or absorbed runs, the text lengths
        // plus the marker lengths add back up to the input length.
        for input in [
            "[[a]] [b] {{c}} ",
            "plain text",
            "a|b||c",
            "''x'' ",
            "==t==x",
        ] {
            let total: usize = tokenize(input)
                .iter()
                .map(|event| match event {
                    Event::Text(_, text) => text.chars().count(),
                    Event::Tok(_, Token::Headline(depth)) => *depth,
                    Event::Tok(_, token) => token.marker().map_or(0, |m| m.chars().count()),
                })
                .sum();
            assert_eq!(total, input.chars().count(), "lost input in {input:?}");
        }
    }

    #[test]
    fn positions_accumulate_across_chunks() {
        assert_eq!(
            tokenize_chunks(&["ab", "cd[[e"]),
            vec![text(0, "abcd"), tok(4, Token::KeywordOpen), text(6, "e")]
        );
    }
}
