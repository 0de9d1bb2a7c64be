//! Generate testdata command implementation.
//!
//! Writes a synthetic sample series that `--test-data-file` replays instead
//! of reading /proc.

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use herakles_mem_health::MemorySample;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MB: u64 = 1024 * 1024;

/// Root structure for test data JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestData {
    pub version: String,
    pub generated_at: String,
    pub samples: Vec<MemorySample>,
}

/// Shape of the generated series.
#[derive(Debug, Clone, Copy)]
pub struct SeriesParams {
    pub samples: usize,
    pub heap_total: u64,
    pub start_percent: f64,
    /// Multiplicative heap growth per sample, in percent.
    pub growth_percent: f64,
    /// Additive noise per sample, in percent of `heap_total`.
    pub jitter_percent: f64,
    /// Seconds between consecutive timestamps.
    pub step_secs: i64,
}

/// Load test data from JSON file.
pub fn load_test_data_from_file(path: &Path) -> anyhow::Result<TestData> {
    debug!("Loading test data from: {}", path.display());

    if !path.exists() {
        bail!("Test data file not found: {}", path.display());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read test data file {}", path.display()))?;
    let test_data: TestData =
        serde_json::from_str(&content).context("Failed to parse test data JSON")?;

    info!(
        "Loaded test data version {} from {} ({} samples)",
        test_data.version,
        test_data.generated_at,
        test_data.samples.len()
    );

    Ok(test_data)
}

/// Builds a series starting at `start`, one sample every `params.step_secs`.
pub fn generate_series(
    rng: &mut impl Rng,
    params: &SeriesParams,
    start: DateTime<Utc>,
) -> Vec<MemorySample> {
    let total = params.heap_total as f64;
    let mut heap = total * params.start_percent.clamp(0.0, 100.0) / 100.0;
    let jitter = total * params.jitter_percent.max(0.0) / 100.0;

    (0..params.samples)
        .map(|i| {
            let noise = if jitter > 0.0 {
                rng.gen_range(-jitter..jitter)
            } else {
                0.0
            };
            let heap_used = (heap + noise).clamp(0.0, total) as u64;
            // File-backed and shared pages: 5-15% of the budget
            let external = (total * rng.gen_range(0.05..0.15)) as u64;
            let timestamp = start + Duration::seconds(params.step_secs * i as i64);
            heap *= 1.0 + params.growth_percent / 100.0;

            MemorySample::new(
                heap_used + external,
                params.heap_total,
                heap_used,
                external,
                timestamp,
            )
        })
        .collect()
}

/// Generates synthetic test data JSON file for testing purposes.
pub fn command_generate_testdata(output: PathBuf, params: SeriesParams) -> anyhow::Result<()> {
    debug!(
        "Generating test data: samples={}, growth={}%, output={}",
        params.samples,
        params.growth_percent,
        output.display()
    );

    if params.heap_total == 0 {
        bail!("heap total must be greater than 0");
    }

    let mut rng = rand::thread_rng();
    let start = Utc::now() - Duration::seconds(params.step_secs * params.samples as i64);
    let samples = generate_series(&mut rng, &params, start);

    let test_data = TestData {
        version: "1.0".to_string(),
        generated_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        samples,
    };

    let json_content = serde_json::to_string_pretty(&test_data)?;
    fs::write(&output, &json_content)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "✅ Generated test data: {} samples ({} MiB budget) in {}",
        test_data.samples.len(),
        params.heap_total / MB,
        output.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use herakles_mem_health::{TrendAnalyzer, TrendSettings};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params(growth_percent: f64) -> SeriesParams {
        SeriesParams {
            samples: 20,
            heap_total: 100 * 1024 * MB,
            start_percent: 1.0,
            growth_percent,
            jitter_percent: 0.0,
            step_secs: 60,
        }
    }

    #[test]
    fn test_series_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let start = Utc::now();
        let series = generate_series(&mut rng, &params(0.0), start);
        assert_eq!(series.len(), 20);
        assert_eq!(series[0].timestamp, start);
        assert_eq!(series[19].timestamp, start + Duration::seconds(19 * 60));
        for s in &series {
            assert!(s.heap_used <= s.heap_total);
            assert!(s.rss >= s.heap_used);
            assert!((s.usage_percentage - 1.0).abs() < 0.01);
        }
    }

    #[test]
    fn test_growing_series_is_detected_as_leak() {
        let mut rng = StdRng::seed_from_u64(7);
        let series = generate_series(&mut rng, &params(5.0), Utc::now());
        let mut analyzer = TrendAnalyzer::new(TrendSettings::default(), 60);
        for s in series {
            analyzer.record(s);
        }
        assert!(analyzer.detect_leak().detected);
    }

    #[test]
    fn test_written_file_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testdata.json");
        command_generate_testdata(path.clone(), params(1.0)).unwrap();

        let data = load_test_data_from_file(&path).unwrap();
        assert_eq!(data.samples.len(), 20);
        assert!(load_test_data_from_file(&dir.path().join("missing.json")).is_err());
    }
}
