//! CLI command implementations for herakles-mem-health.
//!
//! - `check`: System validation
//! - `config`: Configuration file generation
//! - `sample`: One-shot sampling and report
//! - `generate-testdata`: Synthetic sample series

pub mod check;
pub mod config;
pub mod generate;
pub mod sample;

pub use check::command_check;
pub use config::command_config;
pub use generate::{command_generate_testdata, load_test_data_from_file, SeriesParams};
pub use sample::command_sample;

use crate::cli::ConfigFormat;
use serde::Serialize;

/// Serializes `value` in the requested format.
pub fn render<T: Serialize>(value: &T, format: ConfigFormat) -> anyhow::Result<String> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(value)?,
        // Value ordering puts plain keys ahead of tables
        ConfigFormat::Toml => toml::to_string_pretty(&toml::Value::try_from(value)?)?,
        ConfigFormat::Yaml => serde_yaml::to_string(value)?,
    })
}
