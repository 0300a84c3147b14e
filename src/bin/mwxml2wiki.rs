//! Copies raw wikitext out of a MediaWiki XML dump, either into one
//! form-feed-delimited stream or into one file per revision.

use anyhow::Context;
use mwp::dump::{DumpSink, SinkError, read_dump};
use mwp::io::{create_output, open_input};
use mwp::store::file::FileWriter;
use std::process::ExitCode;

/// Command-line arguments.
struct Args {
    /// The output path for stream mode.
    output: String,
    /// The per-revision path template, when set.
    pathpat: Option<String>,
    /// Whether to emit a title line per revision.
    titleline: bool,
    /// Whether to gzip per-revision files.
    gzip: bool,
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
        let pathpat = args.opt_value_from_str("-P")?;
        let titleline = args.contains("-T");
        let gzip = args.contains("-Z");
        let _ = args.contains("-d");
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
            pathpat,
            titleline,
            gzip,
            inputs,
        })
    }
}

/// Command line usage instructions.
fn usage() {
    let exe = std::env::args().next().unwrap_or_default();
    eprintln!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    eprintln!("Usage: {exe} [-o output] [-P pathpat] [-T] [-Z] [dump ...]\n");
    eprintln!("Options:");
    eprintln!("  -o: Output path (default: stdout)");
    eprintln!("  -P: Per-revision path template with {{name}}, {{pageid}}, {{revid}}");
    eprintln!("  -T: Write the page title as a first line");
    eprintln!("  -Z: Gzip per-revision files");
}

/// Streams revision text into the file writer.
struct WikiSink {
    /// The destination.
    writer: FileWriter,
}

impl DumpSink for WikiSink {
    fn start_page(&mut self, pageid: u64, title: &str) -> Result<(), SinkError> {
        log::info!("{pageid} {title}");
        self.writer.set_page(pageid, title);
        Ok(())
    }

    fn start_revision(
        &mut self,
        _pageid: u64,
        _title: &str,
        revid: u64,
        _timestamp: &str,
    ) -> Result<(), SinkError> {
        self.writer.begin_revision(revid)?;
        Ok(())
    }

    fn text(&mut self, chunk: &str) -> Result<(), SinkError> {
        self.writer.write(chunk)?;
        Ok(())
    }

    fn end_revision(&mut self) -> Result<(), SinkError> {
        self.writer.end_revision()?;
        Ok(())
    }
}

/// Runs the tool.
fn run(args: Args) -> anyhow::Result<()> {
    let writer = if let Some(pathpat) = args.pathpat {
        FileWriter::per_file(pathpat, args.titleline, args.gzip)
    } else {
        let out =
            create_output(&args.output).with_context(|| format!("creating {}", args.output))?;
        FileWriter::stream(out, args.titleline)
    };
    let mut sink = WikiSink { writer };
    for path in &args.inputs {
        log::info!("Reading {path}");
        let reader = open_input(path).with_context(|| format!("opening {path}"))?;
        read_dump(reader, &mut sink).with_context(|| format!("reading {path}"))?;
    }
    sink.writer.close()?;
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
