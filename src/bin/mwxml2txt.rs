//! Extracts plain text, links or categories from every revision of a
//! MediaWiki XML dump.

use anyhow::Context;
use mwp::dump::{DumpSink, SinkError, read_dump};
use mwp::extract::{extract_categories, extract_links, extract_text};
use mwp::io::{create_output, open_input};
use mwp::parser::{Error as ParseError, Parser};
use std::io::Write;
use std::process::ExitCode;

/// What to pull out of each revision.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum Mode {
    /// Plain text.
    #[default]
    Text,
    /// Link records.
    Links,
    /// Category tags.
    Categories,
}

/// Command-line arguments.
struct Args {
    /// The output path.
    output: String,
    /// The extraction mode.
    mode: Mode,
    /// Dump parse trees instead of extracting.
    debug: bool,
    /// Input dump paths.
    inputs: Vec<String>,
}

impl Args {
    /// Parses the command line.
    fn new() -> anyhow::Result<Self> {
        let mut args = pico_args::Arguments::from_env();
        let output = args
            .opt_value_from_str("-o")?
            .unwrap_or_else(|| "-".to_string());
        let mode = if args.contains("-L") {
            Mode::Links
        } else if args.contains("-C") {
            Mode::Categories
        } else {
            Mode::Text
        };
        let debug = args.contains("-d");
        let mut inputs = Vec::new();
        for rest in args.finish() {
            inputs.push(
                rest.into_string()
                    .map_err(|bad| anyhow::anyhow!("non-UTF-8 argument: {bad:?}"))?,
            );
        }
        if inputs.is_empty() {
            inputs.push("-".to_string());
        }
        Ok(Self {
            output,
            mode,
            debug,
            inputs,
        })
    }
}

/// Command line usage instructions.
fn usage() {
    let exe = std::env::args().next().unwrap_or_default();
    eprintln!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    eprintln!("Usage: {exe} [-o output] [-L|-C] [-d] [dump.xml[.bz2|.gz] ...]\n");
    eprintln!("Options:");
    eprintln!("  -o: Output path (default: stdout)");
    eprintln!("  -L: Emit links instead of text");
    eprintln!("  -C: Emit categories instead of text");
    eprintln!("  -d: Dump parse trees");
}

/// Parses each revision and writes the extraction.
struct ExtractSink {
    /// The output stream.
    out: Box<dyn Write>,
    /// The extraction mode.
    mode: Mode,
    /// Dump trees instead of extracting.
    debug: bool,
    /// The parser for the revision currently streaming; dropped when the
    /// revision overflows.
    parser: Option<Parser>,
    /// The current page id, for diagnostics.
    pageid: u64,
    /// The current revision id, for diagnostics.
    revid: u64,
}

impl DumpSink for ExtractSink {
    fn start_revision(
        &mut self,
        pageid: u64,
        _title: &str,
        revid: u64,
        _timestamp: &str,
    ) -> Result<(), SinkError> {
        self.pageid = pageid;
        self.revid = revid;
        self.parser = Some(Parser::new());
        Ok(())
    }

    fn text(&mut self, chunk: &str) -> Result<(), SinkError> {
        if let Some(parser) = self.parser.as_mut()
            && let Err(err) = parser.feed_text(chunk)
        {
            self.skip(&err);
        }
        Ok(())
    }

    fn end_revision(&mut self) -> Result<(), SinkError> {
        let Some(parser) = self.parser.take() else {
            return Ok(());
        };
        let root = match parser.close() {
            Ok(root) => root,
            Err(err) => {
                self.skip(&err);
                return Ok(());
            }
        };
        if self.debug {
            writeln!(self.out, "{}", root.dump())?;
            return Ok(());
        }
        match self.mode {
            Mode::Text => {
                self.out.write_all(extract_text(&root).as_bytes())?;
                self.out.write_all(b"\n\x0c")?;
            }
            Mode::Links => {
                for record in extract_links(&root) {
                    writeln!(self.out, "{record}")?;
                }
            }
            Mode::Categories => {
                for category in extract_categories(&root) {
                    writeln!(self.out, "{category}")?;
                }
            }
        }
        Ok(())
    }
}

impl ExtractSink {
    /// Abandons the current revision after a parse failure. Per-page
    /// errors never stop the dump.
    fn skip(&mut self, err: &ParseError) {
        log::warn!("page {} revision {}: {err}; skipping", self.pageid, self.revid);
        self.parser = None;
    }
}

/// Runs the tool.
fn run(args: Args) -> anyhow::Result<()> {
    let out = create_output(&args.output).with_context(|| format!("creating {}", args.output))?;
    let mut sink = ExtractSink {
        out,
        mode: args.mode,
        debug: args.debug,
        parser: None,
        pageid: 0,
        revid: 0,
    };
    for path in &args.inputs {
        log::info!("Reading {path}");
        let reader = open_input(path).with_context(|| format!("opening {path}"))?;
        read_dump(reader, &mut sink).with_context(|| format!("reading {path}"))?;
    }
    sink.out.flush()?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = match Args::new() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}\n");
            usage();
            return ExitCode::from(100);
        }
    };
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
