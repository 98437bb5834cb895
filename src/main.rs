use anyhow::{Context, Result};
use calltree::{
    cli::Cli, AddressResolver, DwarfResolver, EventLog, ProfilerConfig, ReportGuard, ReportSink,
    SymbolResolver, SymbolTable, UnresolvedPolicy,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Pick the symbol source: DWARF binary, symbol map, or raw addresses
fn build_resolver(args: &Cli) -> Result<Box<dyn SymbolResolver>> {
    if let Some(binary) = &args.binary {
        let resolver = DwarfResolver::load(binary)
            .with_context(|| format!("Failed to load symbols from {}", binary.display()))?
            .with_load_bias(args.load_bias.unwrap_or(0));
        return Ok(Box::new(resolver));
    }

    if let Some(symbols) = &args.symbols {
        let table = SymbolTable::from_file(symbols)
            .with_context(|| format!("Failed to read symbol map {}", symbols.display()))?;
        return Ok(Box::new(table));
    }

    Ok(Box::new(AddressResolver))
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    let config = match &args.config {
        Some(path) => ProfilerConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ProfilerConfig::default(),
    };

    let format = args.format.unwrap_or(config.format);
    let unresolved = if args.show_unresolved {
        UnresolvedPolicy::Placeholder
    } else {
        config.unresolved
    };

    let log = EventLog::from_file(&args.trace)
        .with_context(|| format!("Failed to read event log {}", args.trace.display()))?;
    tracing::debug!(events = log.len(), "event log loaded");

    let resolver = build_resolver(&args)?;
    let sink = match &args.output {
        Some(path) => ReportSink::File(path.clone()),
        None => ReportSink::Stdout,
    };

    let mut guard = ReportGuard::new(resolver, sink)
        .with_format(format)
        .with_unresolved(unresolved);
    guard.replay(log);

    if args.stats {
        match guard.recorder() {
            Some(recorder) => recorder.print_summary(),
            None => eprintln!("\nNo call events recorded."),
        }
    }

    let written = guard.finish().context("Failed to write report")?;
    if !written {
        tracing::debug!("no call events recorded, no report written");
    }

    Ok(())
}
