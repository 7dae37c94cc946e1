//! CLI argument parsing for cardlog

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Mapping dumps and LaTeX-ready tables (default)
    Text,
    /// JSON document for further processing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "cardlog")]
#[command(version)]
#[command(about = "Timing tables from smartcard credential benchmark logs", long_about = None)]
pub struct Cli {
    /// Log variant to process (see --list-variants)
    #[arg(long = "variant", default_value = "presentation")]
    pub variant: String,

    /// Directory holding the run-<N>cred-<ratio>-<platform>.log files
    #[arg(short = 'd', long = "dir", value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// TOML file with extra or overriding [[variant]] definitions
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Credential settings to process (e.g. 1-5 or 1,2,4)
    #[arg(short = 's', long = "settings", value_name = "LIST")]
    pub settings: Option<String>,

    /// Override the disclosure ratio part of the file name
    #[arg(long = "ratio", value_name = "RATIO")]
    pub ratio: Option<String>,

    /// Override the platform part of the file name
    #[arg(long = "platform", value_name = "PLATFORM")]
    pub platform: Option<String>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Append timing grouped by APDU instruction
    #[arg(long = "by-command")]
    pub by_command: bool,

    /// Warn and continue when a setting's log file is missing
    #[arg(long = "skip-missing")]
    pub skip_missing: bool,

    /// List known variants and exit
    #[arg(long = "list-variants")]
    pub list_variants: bool,

    /// Enable trace-level diagnostics on stderr
    #[arg(long = "debug")]
    pub debug: bool,
}
