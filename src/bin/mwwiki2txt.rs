//! Extracts plain text, links or categories from raw wikitext files.

use anyhow::Context;
use mwp::extract::{extract_categories, extract_links, extract_text};
use mwp::io::{Encoding, create_output, open_input};
use mwp::parser::Parser;
use mwp::tree::Node;
use std::io::{BufRead, Write};
use std::process::ExitCode;

/// What to pull out of the tree.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum Mode {
    /// Plain text.
    #[default]
    Text,
    /// Link records, one tab-separated line each.
    Links,
    /// Category tags.
    Categories,
}

/// Command-line arguments.
struct Args {
    /// The output path.
    output: String,
    /// The input text encoding.
    encoding: Encoding,
    /// The extraction mode.
    mode: Mode,
    /// Dump the parse tree instead of extracting.
    debug: bool,
    /// Input paths.
    inputs: Vec<String>,
}

impl Args {
    /// Parses the command line.
    fn new() -> anyhow::Result<Self> {
        let mut args = pico_args::Arguments::from_env();
        let output = args
            .opt_value_from_str("-o")?
            .unwrap_or_else(|| "-".to_string());
        let encoding = args.opt_value_from_str("-c")?.unwrap_or_default();
        let mode = if args.contains("-L") {
            Mode::Links
        } else if args.contains("-C") {
            Mode::Categories
        } else {
            Mode::Text
        };
        let debug = args.contains("-d");
        let inputs = free_args(args)?;
        Ok(Self {
            output,
            encoding,
            mode,
            debug,
            inputs,
        })
    }
}

/// Collects the remaining free arguments, defaulting to stdin.
fn free_args(args: pico_args::Arguments) -> anyhow::Result<Vec<String>> {
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
    Ok(inputs)
}

/// Command line usage instructions.
fn usage() {
    let exe = std::env::args().next().unwrap_or_default();
    eprintln!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    eprintln!("Usage: {exe} [-o output] [-c encoding] [-L|-C] [-d] [file ...]\n");
    eprintln!("Options:");
    eprintln!("  -o: Output path (default: stdout)");
    eprintln!("  -c: Input encoding, 'utf-8' or 'latin-1' (default: utf-8)");
    eprintln!("  -L: Emit links instead of text");
    eprintln!("  -C: Emit categories instead of text");
    eprintln!("  -d: Dump the parse tree");
}

/// Parses one input into a tree.
fn parse_input(path: &str, encoding: Encoding) -> anyhow::Result<Node> {
    let mut reader = open_input(path).with_context(|| format!("opening {path}"))?;
    let mut parser = Parser::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        parser.feed_text(&encoding.decode(&line))?;
    }
    Ok(parser.close()?)
}

/// Writes the requested extraction of `root` to `out`.
fn emit(root: &Node, mode: Mode, debug: bool, out: &mut dyn Write) -> anyhow::Result<()> {
    if debug {
        writeln!(out, "{}", root.dump())?;
        return Ok(());
    }
    match mode {
        Mode::Text => {
            out.write_all(extract_text(root).as_bytes())?;
            out.write_all(b"\n")?;
        }
        Mode::Links => {
            for record in extract_links(root) {
                writeln!(out, "{record}")?;
            }
        }
        Mode::Categories => {
            for category in extract_categories(root) {
                writeln!(out, "{category}")?;
            }
        }
    }
    Ok(())
}

/// Runs the tool.
fn run(args: &Args) -> anyhow::Result<()> {
    let mut out = create_output(&args.output).with_context(|| format!("creating {}", args.output))?;
    for path in &args.inputs {
        log::info!("Reading {path}");
        let root = parse_input(path, args.encoding)
            .with_context(|| format!("parsing {path}"))?;
        emit(&root, args.mode, args.debug, out.as_mut())?;
    }
    out.flush()?;
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
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
