use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "kestrel",
    version,
    about = "A terminal dashboard for browsing cluster resources and tailing their logs."
)]
pub struct CliArgs {
    /// Refresh interval in milliseconds (overrides the config file)
    #[arg(long)]
    pub refresh_ms: Option<u64>,

    /// Start in a specific namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Start with all namespaces selected
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write diagnostics to this file instead of discarding them
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Path to the YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Disable commands that modify cluster state
    #[arg(long)]
    pub readonly: bool,
}
