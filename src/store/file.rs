//! The plain-file revision writer.
//!
//! Two shapes: everything into one output stream with form-feed record
//! separators, or one file per revision named from a path template with
//! `{name}`/`{pageid}`/`{revid}` substitutions. Either way the writer is
//! fed streamed text chunks, so revisions never sit in memory.

use crate::io::{create_file, expand_template};
use std::io::Write;

/// The record separator between revisions in single-stream mode.
const RECORD_SEPARATOR: &str = "\n\x0c";

/// Where revisions are written.
enum Target {
    /// One shared output stream.
    Stream(Box<dyn Write>),
    /// One file per revision.
    PerFile {
        /// The path template.
        template: String,
        /// Whether each file is gzip-compressed.
        gzip: bool,
        /// The file for the revision currently streaming.
        current: Option<Box<dyn Write>>,
    },
}

/// Writes revision text to files or a stream.
pub struct FileWriter {
    /// The output target.
    target: Target,
    /// Whether to emit the page title as a first line.
    titleline: bool,
    /// The current page id.
    pageid: u64,
    /// The current page title.
    title: String,
}

impl FileWriter {
    /// A writer that appends every revision to one stream.
    pub fn stream(out: Box<dyn Write>, titleline: bool) -> Self {
        Self {
            target: Target::Stream(out),
            titleline,
            pageid: 0,
            title: String::new(),
        }
    }

    /// A writer that creates one file per revision from `template`.
    pub fn per_file(template: impl Into<String>, titleline: bool, gzip: bool) -> Self {
        Self {
            target: Target::PerFile {
                template: template.into(),
                gzip,
                current: None,
            },
            titleline,
            pageid: 0,
            title: String::new(),
        }
    }

    /// Sets the page whose revisions follow.
    pub fn set_page(&mut self, pageid: u64, title: &str) {
        self.pageid = pageid;
        self.title = title.to_string();
    }

    /// Starts one revision.
    pub fn begin_revision(&mut self, revid: u64) -> std::io::Result<()> {
        if let Target::PerFile {
            template,
            gzip,
            current,
        } = &mut self.target
        {
            let path = expand_template(template, &self.title, self.pageid, revid);
            *current = Some(create_file(&path, *gzip)?);
        }
        if self.titleline {
            let title = self.title.clone();
            if let Some(out) = self.out() {
                out.write_all(title.as_bytes())?;
                out.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    /// Writes one chunk of the current revision.
    pub fn write(&mut self, chunk: &str) -> std::io::Result<()> {
        match self.out() {
            Some(out) => out.write_all(chunk.as_bytes()),
            None => Ok(()),
        }
    }

    /// Finishes the current revision.
    pub fn end_revision(&mut self) -> std::io::Result<()> {
        match &mut self.target {
            Target::Stream(out) => out.write_all(RECORD_SEPARATOR.as_bytes()),
            Target::PerFile { current, .. } => {
                if let Some(mut out) = current.take() {
                    out.flush()?;
                }
                Ok(())
            }
        }
    }

    /// Flushes the shared stream, if any.
    pub fn close(&mut self) -> std::io::Result<()> {
        if let Target::Stream(out) = &mut self.target {
            out.flush()?;
        }
        Ok(())
    }

    /// The write target for the revision currently streaming, if one is
    /// open.
    fn out(&mut self) -> Option<&mut dyn Write> {
        match &mut self.target {
            Target::Stream(out) => Some(out.as_mut()),
            Target::PerFile { current, .. } => {
                current.as_mut().map(|out| out.as_mut() as &mut dyn Write)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::create_output;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mwp-file-{}-{name}", std::process::id()))
    }

    #[test]
    fn stream_mode_separates_records() {
        let path = temp_path("stream.txt");
        let out = create_output(&path.to_string_lossy()).unwrap();
        let mut writer = FileWriter::stream(out, true);
        writer.set_page(1, "Foo");
        writer.begin_revision(10).unwrap();
        writer.write("first").unwrap();
        writer.end_revision().unwrap();
        writer.begin_revision(11).unwrap();
        writer.write("second").unwrap();
        writer.end_revision().unwrap();
        writer.close().unwrap();
        drop(writer);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Foo\nfirst\n\x0cFoo\nsecond\n\x0c");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn per_file_mode_expands_the_template() {
        let dir = temp_path("perfile");
        std::fs::create_dir_all(&dir).unwrap();
        let template = format!("{}/{{pageid}}-{{revid}}-{{name}}.txt", dir.to_string_lossy());
        let mut writer = FileWriter::per_file(template, false, false);
        writer.set_page(7, "A/B");
        writer.begin_revision(9).unwrap();
        writer.write("body").unwrap();
        writer.end_revision().unwrap();

        let text = std::fs::read_to_string(dir.join("7-9-A=2FB.txt")).unwrap();
        assert_eq!(text, "body");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
