use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use guardmap_core::error::GuardResult;
use guardmap_core::host::ProcessSnapshot;
use guardmap_core::locator::{BitmapSource, Locator};
use guardmap_core::report::{Inspector, LineSink, StreamSink};
use guardmap_core::types::Address;
use guardmap_utils::{info, init_logging_with, LogLevel, LoggingConfig};

/// Inspect a process's Control Flow Guard bitmap against its memory map.
#[derive(Parser, Debug)]
#[command(name = "guardmap")]
#[command(version)]
#[command(about = "Inspect a process's Control Flow Guard bitmap against its memory map", long_about = None)]
struct Cli
{
    /// Process snapshot (JSON) to inspect
    #[arg(short, long, env = "GUARDMAP_SNAPSHOT")]
    snapshot: PathBuf,

    /// Add or override a symbol, e.g. `ntdll!LdrSystemDllInitBlock=7ffb3c1a1000`
    #[arg(long = "symbol", value_name = "NAME=ADDR", value_parser = parse_symbol)]
    symbols: Vec<(String, Address)>,

    /// Use this bitmap base instead of searching the anchor structure
    #[arg(long, value_name = "ADDR", conflicts_with = "anchor")]
    bitmap: Option<Address>,

    /// Anchor symbol holding the bitmap pointer
    #[arg(long, value_name = "NAME")]
    anchor: Option<String>,

    /// Log level (overrides `RUST_LOG`)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Decode the bitmap for an address range
    Range
    {
        /// Start address (hex; `0x` and backtick separators accepted)
        address: String,
        /// Size in bytes (hex, default: 200)
        size: Option<String>,
    },
    /// Dump the whole bitmap nested under the target's memory regions
    Map,
    /// Summarize which memory regions have CFG bits set
    Coverage,
    /// List every valid call target
    Targets,
}

fn parse_symbol(text: &str) -> Result<(String, Address), String>
{
    let (name, address) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=ADDR, got '{text}'"))?;
    if name.is_empty() {
        return Err(format!("missing symbol name in '{text}'"));
    }
    let address = address.parse::<Address>().map_err(|e| e.to_string())?;
    Ok((name.to_string(), address))
}

fn main() -> ExitCode
{
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    if let Some(level) = cli.log_level {
        logging = logging.with_level(level);
    }
    let _guard = match init_logging_with(&logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut sink = StreamSink::new(io::stdout().lock());
    if let Err(e) = run_command(&cli, &mut sink) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let aborted = sink.is_aborted();
    match sink.finish() {
        // A closed pipe (`guardmap map | head`) is not a failure.
        Err(e) if e.kind() != ErrorKind::BrokenPipe => {
            eprintln!("Failed to write report: {}", e);
            ExitCode::FAILURE
        }
        _ if aborted => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}

fn run_command(cli: &Cli, out: &mut dyn LineSink) -> GuardResult<()>
{
    info!("Loading snapshot {}", cli.snapshot.display());
    let mut snapshot = ProcessSnapshot::load(&cli.snapshot)?;
    for (name, address) in &cli.symbols {
        snapshot.insert_symbol(name.clone(), *address);
    }

    let source = match (cli.bitmap, &cli.anchor) {
        (Some(base), _) => BitmapSource::Fixed(base),
        (None, Some(anchor)) => BitmapSource::Anchor(Locator::default().with_anchor(anchor.clone())),
        (None, None) => BitmapSource::default(),
    };
    let inspector = Inspector::new(&snapshot).with_source(source);

    match &cli.command {
        Commands::Range { address, size } => inspector.write_range(address, size.as_deref(), out),
        Commands::Map => inspector.write_map(out),
        Commands::Coverage => inspector.write_coverage(out),
        Commands::Targets => inspector.write_targets(out),
    }
    Ok(())
}
