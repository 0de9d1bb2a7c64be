//! CLI arguments and subcommands for herakles-mem-health.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Output format for configuration and reports
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-mem-health",
    about = "Adaptive memory-health monitor with leak detection and pressure response",
    long_about = "Adaptive memory-health monitor with leak detection and pressure response.\n\n\
                  Samples the memory usage of this process, tracks growth over a bounded \
                  history, classifies pressure into health tiers and runs a graduated ladder \
                  of mitigation actions. Serves the consolidated health report over HTTP.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level (overrides log_level from config)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Sampling interval in seconds
    #[arg(short = 'i', long)]
    pub interval: Option<u64>,

    /// Path to JSON test data file (replays samples instead of reading /proc)
    #[arg(short = 't', long)]
    pub test_data_file: Option<PathBuf>,

    /// Enable heap snapshots (POST /admin/snapshot)
    #[arg(long)]
    pub enable_snapshots: bool,

    /// Disable /admin endpoints
    #[arg(long)]
    pub disable_admin: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and system requirements
    Check,

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Capture samples and print the health report
    Sample {
        /// Number of samples to capture
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,

        /// Delay between samples in milliseconds
        #[arg(long, default_value_t = 1000)]
        delay_ms: u64,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },

    /// Generate synthetic sample series JSON file
    GenerateTestdata {
        /// Output file path
        #[arg(short = 'o', long, default_value = "testdata.json")]
        output: PathBuf,

        /// Number of samples to generate
        #[arg(short = 'n', long, default_value_t = 60)]
        samples: usize,

        /// Heap budget in MiB
        #[arg(long, default_value_t = 1024)]
        heap_total_mb: u64,

        /// Heap usage of the first sample in percent
        #[arg(long, default_value_t = 40.0)]
        start_percent: f64,

        /// Heap growth per sample in percent of the previous sample
        #[arg(long, default_value_t = 0.0)]
        growth_percent: f64,

        /// Random jitter per sample in percent of the heap budget
        #[arg(long, default_value_t = 0.5)]
        jitter_percent: f64,

        /// Seconds between sample timestamps
        #[arg(long, default_value_t = 60)]
        step_secs: u32,
    },
}
