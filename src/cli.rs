//! CLI argument parsing for calltree

use crate::call_node::CallSiteId;
use crate::config::ReportFormat;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "calltree")]
#[command(version)]
#[command(about = "Replay recorded call events into a symbolized call-tree cycle report", long_about = None)]
pub struct Cli {
    /// Event log to replay ("enter <cycles> <addr>" / "leave <cycles>" lines)
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Resolve names from the DWARF info and symbol table of this binary
    #[arg(short = 'b', long = "binary", value_name = "PATH", conflicts_with = "symbols")]
    pub binary: Option<PathBuf>,

    /// Runtime load address to subtract before DWARF lookup (PIE binaries)
    #[arg(
        long = "load-bias",
        value_name = "ADDR",
        value_parser = parse_address,
        requires = "binary"
    )]
    pub load_bias: Option<u64>,

    /// Resolve names from a symbol map ("<addr> <name>" lines)
    #[arg(short = 's', long = "symbols", value_name = "PATH")]
    pub symbols: Option<PathBuf>,

    /// Output format (defaults to the config file value, then text)
    #[arg(long = "format", value_enum)]
    pub format: Option<ReportFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Show unresolved functions as placeholders instead of pruning them
    #[arg(long = "show-unresolved")]
    pub show_unresolved: bool,

    /// TOML config file supplying format and unresolved-symbol defaults
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print a recording summary to stderr
    #[arg(long = "stats")]
    pub stats: bool,

    /// Enable debug logging to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

fn parse_address(value: &str) -> Result<u64, String> {
    value
        .parse::<CallSiteId>()
        .map(CallSiteId::address)
        .map_err(|e| format!("invalid address '{}': {}", value, e))
}
