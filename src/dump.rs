//! Streaming reader for MediaWiki XML dumps.
//!
//! A dump is a `<mediawiki>` document containing `<page>` elements, each
//! with a `<title>`, a numeric `<id>` and any number of `<revision>`
//! elements; each revision has its own `<id>`, a `<timestamp>` and a
//! `<text>` body. This reader walks the document with a streaming XML
//! parser and drives a [`DumpSink`], handing `<text>` content over
//! chunk-wise so a whole revision never needs to be buffered. Unknown
//! elements (`<contributor>`, `<siteinfo>`, …) are skipped.

use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::BufRead;

/// The error type sink implementations report.
///
/// Sinks wrap stores, files and parsers with unrelated error types;
/// anything that converts into a boxed error propagates out of
/// [`read_dump`] unchanged.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Dump reading errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The XML was malformed or unreadable.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    /// A `<page>` or `<revision>` id was not a number.
    #[error("bad id in dump: {0}")]
    BadId(String),
    /// An error reported by the sink.
    #[error(transparent)]
    Sink(SinkError),
}

/// The receiver for dump events.
///
/// All methods default to doing nothing, so a sink only implements the
/// events it cares about. `start_page`/`start_revision` fire lazily, once
/// the relevant metadata elements have been seen; pages without revisions
/// and revisions without text produce no events.
pub trait DumpSink {
    /// A page with at least one revision is starting.
    fn start_page(&mut self, _pageid: u64, _title: &str) -> Result<(), SinkError> {
        Ok(())
    }

    /// The current page is complete.
    fn end_page(&mut self, _pageid: u64, _title: &str) -> Result<(), SinkError> {
        Ok(())
    }

    /// A revision's text is about to stream.
    fn start_revision(
        &mut self,
        _pageid: u64,
        _title: &str,
        _revid: u64,
        _timestamp: &str,
    ) -> Result<(), SinkError> {
        Ok(())
    }

    /// One chunk of the current revision's text.
    fn text(&mut self, _chunk: &str) -> Result<(), SinkError> {
        Ok(())
    }

    /// The current revision's text is complete.
    fn end_revision(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Which metadata element is currently capturing character data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Capture {
    /// Not capturing.
    None,
    /// `<title>` directly under `<page>`.
    Title,
    /// `<id>` directly under `<page>`.
    PageId,
    /// `<id>` directly under `<revision>`.
    RevId,
    /// `<timestamp>` directly under `<revision>`.
    Timestamp,
    /// `<text>` directly under `<revision>`; streamed to the sink.
    Text,
}

/// Per-page parse state.
#[derive(Debug, Default)]
struct PageState {
    /// The page id, once seen.
    pageid: Option<u64>,
    /// The page title, once seen.
    title: String,
    /// Whether `start_page` has fired.
    started: bool,
    /// The current revision id, once seen.
    revid: Option<u64>,
    /// The current revision timestamp.
    timestamp: String,
    /// Whether `start_revision` has fired for the current revision.
    revision_started: bool,
}

/// Reads a complete dump from `reader`, driving `sink`.
pub fn read_dump(reader: impl BufRead, sink: &mut impl DumpSink) -> Result<(), Error> {
    let mut xml = Reader::from_reader(reader);
    let mut buf = Vec::new();
    // Local names of the open elements, innermost last. Needed to tell a
    // revision's <id> from the page's and from a contributor's.
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut capture = Capture::None;
    let mut captured = String::new();
    let mut page = PageState::default();

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(start) => {
                let name = start.local_name().as_ref().to_vec();
                capture = classify(&path, &name);
                captured.clear();
                match capture {
                    Capture::Text => {
                        begin_revision(&mut page, sink)?;
                    }
                    Capture::None if name == b"page" => {
                        page = PageState::default();
                    }
                    Capture::None if name == b"revision" => {
                        page.revid = None;
                        page.timestamp.clear();
                        page.revision_started = false;
                    }
                    _ => {}
                }
                path.push(name);
            }
            Event::Empty(empty) => {
                // A self-closed <text/> still delimits a revision.
                if classify(&path, empty.local_name().as_ref()) == Capture::Text {
                    begin_revision(&mut page, sink)?;
                    sink.end_revision().map_err(Error::Sink)?;
                    page.revision_started = false;
                }
            }
            Event::Text(text) => {
                let chunk = text.unescape().map_err(quick_xml::Error::from)?;
                match capture {
                    Capture::Text => sink.text(&chunk).map_err(Error::Sink)?,
                    Capture::None => {}
                    _ => captured.push_str(&chunk),
                }
            }
            Event::CData(cdata) => {
                if capture == Capture::Text {
                    let chunk = String::from_utf8_lossy(&cdata);
                    sink.text(&chunk).map_err(Error::Sink)?;
                }
            }
            Event::End(_) => {
                let name = path.pop().unwrap_or_default();
                match capture {
                    Capture::Title => page.title = core::mem::take(&mut captured),
                    Capture::PageId => page.pageid = Some(parse_id(&captured)?),
                    Capture::RevId => page.revid = Some(parse_id(&captured)?),
                    Capture::Timestamp => page.timestamp = core::mem::take(&mut captured),
                    Capture::Text => {
                        sink.end_revision().map_err(Error::Sink)?;
                        page.revision_started = false;
                    }
                    Capture::None => {
                        if name == b"page" && page.started {
                            let pageid = page.pageid.unwrap_or_default();
                            sink.end_page(pageid, &page.title).map_err(Error::Sink)?;
                        }
                    }
                }
                capture = Capture::None;
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
        buf.clear();
    }
}

/// Classifies an element about to be opened, given the open-element path.
fn classify(path: &[Vec<u8>], name: &[u8]) -> Capture {
    let parent = path.last().map(Vec::as_slice);
    match (parent, name) {
        (Some(b"page"), b"title") => Capture::Title,
        (Some(b"page"), b"id") => Capture::PageId,
        (Some(b"revision"), b"id") => Capture::RevId,
        (Some(b"revision"), b"timestamp") => Capture::Timestamp,
        (Some(b"revision"), b"text") => Capture::Text,
        _ => Capture::None,
    }
}

/// Fires `start_page`/`start_revision` if they have not fired yet.
fn begin_revision(page: &mut PageState, sink: &mut impl DumpSink) -> Result<(), Error> {
    let pageid = page.pageid.unwrap_or_default();
    if !page.started {
        sink.start_page(pageid, &page.title).map_err(Error::Sink)?;
        page.started = true;
    }
    if !page.revision_started {
        let revid = page.revid.unwrap_or_default();
        sink.start_revision(pageid, &page.title, revid, &page.timestamp)
            .map_err(Error::Sink)?;
        page.revision_started = true;
    }
    Ok(())
}

/// Parses a numeric id element.
fn parse_id(text: &str) -> Result<u64, Error> {
    let text = text.trim();
    text.parse().map_err(|_| Error::BadId(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Eq, PartialEq)]
    struct Recorder {
        events: Vec<String>,
    }

    impl DumpSink for Recorder {
        fn start_page(&mut self, pageid: u64, title: &str) -> Result<(), SinkError> {
            self.events.push(format!("page {pageid} {title}"));
            Ok(())
        }
        fn end_page(&mut self, pageid: u64, _title: &str) -> Result<(), SinkError> {
            self.events.push(format!("end page {pageid}"));
            Ok(())
        }
        fn start_revision(
            &mut self,
            pageid: u64,
            _title: &str,
            revid: u64,
            timestamp: &str,
        ) -> Result<(), SinkError> {
            self.events.push(format!("rev {pageid}/{revid} {timestamp}"));
            Ok(())
        }
        fn text(&mut self, chunk: &str) -> Result<(), SinkError> {
            self.events.push(format!("text {chunk}"));
            Ok(())
        }
        fn end_revision(&mut self) -> Result<(), SinkError> {
            self.events.push("end rev".to_string());
            Ok(())
        }
    }

    const DUMP: &str = r#"<mediawiki>
<siteinfo><sitename>Test</sitename></siteinfo>
<page>
  <title>Foo</title>
  <ns>0</ns>
  <id>1</id>
  <revision>
    <id>10</id>
    <timestamp>2004-08-09T01:41:27Z</timestamp>
    <contributor><username>x</username><id>99</id></contributor>
    <text>Hello &lt;b&gt;[[world]]</text>
  </revision>
  <revision>
    <id>11</id>
    <timestamp>2004-09-01T00:00:00Z</timestamp>
    <text>Second</text>
  </revision>
</page>
<page>
  <title>Bar</title>
  <id>2</id>
  <revision>
    <id>20</id>
    <timestamp>2005-01-01T00:00:00Z</timestamp>
    <text/>
  </revision>
</page>
</mediawiki>"#;

    #[test]
    fn drives_the_sink_in_document_order() {
        let mut sink = Recorder::default();
        read_dump(DUMP.as_bytes(), &mut sink).unwrap();
        assert_eq!(
            sink.events,
            vec![
                "page 1 Foo",
                "rev 1/10 2004-08-09T01:41:27Z",
                "text Hello <b>[[world]]",
                "end rev",
                "rev 1/11 2004-09-01T00:00:00Z",
                "text Second",
                "end rev",
                "end page 1",
                "page 2 Bar",
                "rev 2/20 2005-01-01T00:00:00Z",
                "end rev",
                "end page 2",
            ]
        );
    }

    #[test]
    fn contributor_ids_do_not_clobber_revision_ids() {
        let mut sink = Recorder::default();
        read_dump(DUMP.as_bytes(), &mut sink).unwrap();
        assert!(sink.events.iter().any(|event| event == "rev 1/10 2004-08-09T01:41:27Z"));
        assert!(!sink.events.iter().any(|event| event.contains("/99 ")));
    }

    #[test]
    fn pages_without_text_emit_nothing() {
        let mut sink = Recorder::default();
        read_dump(
            "<mediawiki><page><title>Empty</title><id>3</id></page></mediawiki>".as_bytes(),
            &mut sink,
        )
        .unwrap();
        assert!(sink.events.is_empty());
    }
}
