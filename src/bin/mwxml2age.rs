//! Emits a revision-age table from a MediaWiki XML dump: one line per
//! page with the age of each revision in days.

use anyhow::Context;
use mwp::dump::{DumpSink, SinkError, read_dump};
use mwp::io::{create_output, open_input};
use std::io::Write;
use std::process::ExitCode;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Command-line arguments.
struct Args {
    /// The output path.
    output: String,
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
        Ok(Self { output, inputs })
    }
}

/// Command line usage instructions.
fn usage() {
    let exe = std::env::args().next().unwrap_or_default();
    eprintln!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    eprintln!("Usage: {exe} [-o output] [dump.xml[.bz2|.gz] ...]\n");
    eprintln!("Options:");
    eprintln!("  -o: Output path (default: stdout)");
}

/// Collects revision ages per page.
struct AgeSink {
    /// The output stream.
    out: Box<dyn Write>,
    /// The reference time ages are measured from.
    now: OffsetDateTime,
    /// Ages in days of the current page's revisions.
    days: Vec<i64>,
}

impl DumpSink for AgeSink {
    fn start_page(&mut self, _pageid: u64, _title: &str) -> Result<(), SinkError> {
        self.days.clear();
        Ok(())
    }

    fn start_revision(
        &mut self,
        pageid: u64,
        _title: &str,
        revid: u64,
        timestamp: &str,
    ) -> Result<(), SinkError> {
        // Dump timestamps are RFC 3339 with a Z suffix.
        match OffsetDateTime::parse(timestamp, &Rfc3339) {
            Ok(when) => {
                let age = self.now - when;
                self.days.push(age.whole_days());
            }
            Err(err) => {
                log::warn!("page {pageid} revision {revid}: bad timestamp {timestamp:?}: {err}");
            }
        }
        Ok(())
    }

    fn end_page(&mut self, pageid: u64, _title: &str) -> Result<(), SinkError> {
        let days = self
            .days
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(self.out, "{pageid} {days}")?;
        Ok(())
    }
}

/// Runs the tool.
fn run(args: Args) -> anyhow::Result<()> {
    let out = create_output(&args.output).with_context(|| format!("creating {}", args.output))?;
    let mut sink = AgeSink {
        out,
        now: OffsetDateTime::now_utc(),
        days: Vec::new(),
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
