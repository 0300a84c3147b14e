//! Loads a MediaWiki XML dump into a content store: SQLite by default,
//! or cdb when the output path ends in `.cdb`.

use anyhow::Context;
use mwp::dump::{DumpSink, SinkError, read_dump};
use mwp::io::open_input;
use mwp::store::cdb::CdbStore;
use mwp::store::sql::SqlStore;
use mwp::store::RevisionSink;
use std::process::ExitCode;

/// Command-line arguments.
struct Args {
    /// The store path.
    output: String,
    /// Whether to gzip revision contents.
    gzip: bool,
    /// Input dump paths.
    inputs: Vec<String>,
}

impl Args {
    /// Parses the command line.
    fn new() -> anyhow::Result<Self> {
        let mut args = pico_args::Arguments::from_env();
        let output: Option<String> = args.opt_value_from_str("-o")?;
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
        let output = output.ok_or_else(|| anyhow::anyhow!("missing -o store path"))?;
        Ok(Self {
            output,
            gzip,
            inputs,
        })
    }
}

/// Command line usage instructions.
fn usage() {
    let exe = std::env::args().next().unwrap_or_default();
    eprintln!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    eprintln!("Usage: {exe} -o store.db[.cdb] [-Z] [dump.xml[.bz2|.gz] ...]\n");
    eprintln!("Options:");
    eprintln!("  -o: Store path; a '.cdb' suffix selects the cdb backend");
    eprintln!("  -Z: Gzip revision contents");
}

/// Buffers each revision and hands it to the store.
struct StoreSink {
    /// The destination store.
    store: Box<dyn RevisionSink>,
    /// The current page id.
    pageid: u64,
    /// The current revision id.
    revid: u64,
    /// The current revision timestamp.
    timestamp: String,
    /// The revision text accumulated so far.
    content: String,
}

impl DumpSink for StoreSink {
    fn start_page(&mut self, pageid: u64, title: &str) -> Result<(), SinkError> {
        log::info!("{pageid} {title}");
        self.store.add_page(pageid, title)?;
        Ok(())
    }

    fn start_revision(
        &mut self,
        pageid: u64,
        _title: &str,
        revid: u64,
        timestamp: &str,
    ) -> Result<(), SinkError> {
        self.pageid = pageid;
        self.revid = revid;
        self.timestamp = timestamp.to_string();
        self.content.clear();
        Ok(())
    }

    fn text(&mut self, chunk: &str) -> Result<(), SinkError> {
        self.content.push_str(chunk);
        Ok(())
    }

    fn end_revision(&mut self) -> Result<(), SinkError> {
        self.store
            .add_content(self.pageid, self.revid, &self.timestamp, &self.content)?;
        Ok(())
    }
}

/// Runs the tool.
fn run(args: Args) -> anyhow::Result<()> {
    let store: Box<dyn RevisionSink> = if args.output.ends_with(".cdb") {
        Box::new(CdbStore::create(&args.output, args.gzip)?)
    } else {
        Box::new(SqlStore::open(&args.output, args.gzip)?)
    };
    let mut sink = StoreSink {
        store,
        pageid: 0,
        revid: 0,
        timestamp: String::new(),
        content: String::new(),
    };
    for path in &args.inputs {
        log::info!("Reading {path}");
        let reader = open_input(path).with_context(|| format!("opening {path}"))?;
        read_dump(reader, &mut sink).with_context(|| format!("reading {path}"))?;
    }
    sink.store.close()?;
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
