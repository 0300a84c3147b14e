//! Dumps the contents of a revision store back out as text.

use anyhow::Context;
use mwp::io::create_output;
use mwp::store::cdb::CdbDump;
use mwp::store::file::FileWriter;
use mwp::store::sql::SqlStore;
use mwp::store::StoreReader;
use std::process::ExitCode;

/// Command-line arguments.
struct Args {
    /// The output path.
    output: String,
    /// Whether to emit title lines.
    titleline: bool,
    /// Whether the store's contents are gzip-compressed.
    gzip: bool,
    /// The store path.
    store: String,
    /// Specific page ids to dump; empty means everything.
    pageids: Vec<u64>,
}

impl Args {
    /// Parses the command line.
    fn new() -> anyhow::Result<Self> {
        let mut args = pico_args::Arguments::from_env();
        let output = args
            .opt_value_from_str("-o")?
            .unwrap_or_else(|| "-".to_string());
        let titleline = args.contains("-T");
        let gzip = args.contains("-Z");
        let _ = args.contains("-d");
        let mut rest = Vec::new();
        for arg in args.finish() {
            rest.push(
                arg.into_string()
                    .map_err(|bad| anyhow::anyhow!("non-UTF-8 argument: {bad:?}"))?,
            );
        }
        if rest.is_empty() {
            anyhow::bail!("missing store path");
        }
        let store = rest.remove(0);
        let pageids = rest
            .iter()
            .map(|id| id.parse().context("page ids must be numeric"))
            .collect::<anyhow::Result<_>>()?;
        Ok(Self {
            output,
            titleline,
            gzip,
            store,
            pageids,
        })
    }
}

/// Command line usage instructions.
fn usage() {
    let exe = std::env::args().next().unwrap_or_default();
    eprintln!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    eprintln!("Usage: {exe} [-o output] [-T] [-Z] store.db[.cdb] [pageid ...]\n");
    eprintln!("Options:");
    eprintln!("  -o: Output path (default: stdout)");
    eprintln!("  -T: Write the page title before each revision");
    eprintln!("  -Z: The store's contents are gzip-compressed");
}

/// Runs the tool.
fn run(args: Args) -> anyhow::Result<()> {
    let mut reader: Box<dyn StoreReader> = if args.store.ends_with(".cdb") {
        Box::new(CdbDump::open(&args.store, args.gzip)?)
    } else {
        Box::new(SqlStore::open(&args.store, args.gzip)?)
    };
    let out = create_output(&args.output).with_context(|| format!("creating {}", args.output))?;
    let mut writer = FileWriter::stream(out, args.titleline);

    let pages = reader.pages().context("listing pages")?;
    for (pageid, title) in pages {
        if !args.pageids.is_empty() && !args.pageids.contains(&pageid) {
            continue;
        }
        writer.set_page(pageid, &title);
        for (revid, _timestamp) in reader.revisions(pageid)? {
            let content = reader.content(pageid, revid)?;
            writer.begin_revision(revid)?;
            writer.write(&content)?;
            writer.end_revision()?;
        }
    }
    writer.close()?;
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
