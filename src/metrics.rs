//! Run statistics for ensemble inference.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::info;

/// Metrics collector for a single inference run
pub struct RunMetrics {
    /// Batches fully processed by every member
    pub batches_processed: AtomicU64,
    /// Samples with a decoded prediction
    pub samples_processed: AtomicU64,
    /// Forward pass times per model (in microseconds)
    model_times: RwLock<HashMap<String, Vec<u64>>>,
    /// Positions where a member's arg-max matched the ensemble's, per model
    agreements: RwLock<HashMap<String, (u64, u64)>>,
    /// Wall-clock start of the run
    started_at: DateTime<Utc>,
    start_time: Instant,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            batches_processed: AtomicU64::new(0),
            samples_processed: AtomicU64::new(0),
            model_times: RwLock::new(HashMap::new()),
            agreements: RwLock::new(HashMap::new()),
            started_at: Utc::now(),
            start_time: Instant::now(),
        }
    }

    /// Record a batch of `samples` decoded predictions
    pub fn record_batch(&self, samples: usize) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.samples_processed
            .fetch_add(samples as u64, Ordering::Relaxed);
    }

    /// Record one forward pass
    pub fn record_model_time(&self, model_name: &str, duration: Duration) {
        if let Ok(mut times) = self.model_times.write() {
            times
                .entry(model_name.to_string())
                .or_default()
                .push(duration.as_micros() as u64);
        }
    }

    /// Record how many positions of a batch agreed with the ensemble decision
    pub fn record_agreement(&self, model_name: &str, agree: u64, total: u64) {
        if let Ok(mut agreements) = self.agreements.write() {
            let entry = agreements.entry(model_name.to_string()).or_insert((0, 0));
            entry.0 += agree;
            entry.1 += total;
        }
    }

    pub fn batches(&self) -> u64 {
        self.batches_processed.load(Ordering::Relaxed)
    }

    pub fn samples(&self) -> u64 {
        self.samples_processed.load(Ordering::Relaxed)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Forward latency statistics per model
    pub fn get_model_stats(&self) -> HashMap<String, ModelStats> {
        let Ok(times) = self.model_times.read() else {
            return HashMap::new();
        };

        times
            .iter()
            .filter(|(_, t)| !t.is_empty())
            .map(|(model, model_times)| {
                let mut sorted = model_times.clone();
                sorted.sort_unstable();
                let count = sorted.len();
                let sum: u64 = sorted.iter().sum();
                let p99_index = ((count as f64 * 0.99) as usize).min(count - 1);

                (
                    model.clone(),
                    ModelStats {
                        calls: count as u64,
                        mean_us: sum / count as u64,
                        p50_us: sorted[count / 2],
                        p99_us: sorted[p99_index],
                    },
                )
            })
            .collect()
    }

    /// Fraction of positions each member agreed with the ensemble on
    pub fn get_agreement(&self) -> HashMap<String, f64> {
        let Ok(agreements) = self.agreements.read() else {
            return HashMap::new();
        };

        agreements
            .iter()
            .filter(|(_, &(_, total))| total > 0)
            .map(|(model, &(agree, total))| (model.clone(), agree as f64 / total as f64))
            .collect()
    }

    /// Samples per second since the run started
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.samples() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Log progress after `batch` of `total` batches
    pub fn log_progress(&self, batch: usize, total: usize) {
        info!(
            batch = batch,
            total = total,
            samples = self.samples(),
            throughput = %format!("{:.1}", self.get_throughput()),
            "Inference progress"
        );
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              ENSEMBLE INFERENCE - RUN SUMMARY                ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Started: {:<52}║",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
        );
        info!(
            "║ Batches: {:>8}  │  Samples: {:>8}  │  {:>7.1} samples/s ║",
            self.batches(),
            self.samples(),
            self.get_throughput()
        );
        info!("║ Elapsed: {:>10.2}s                                          ║", elapsed);
        info!("╚══════════════════════════════════════════════════════════════╝");

        let mut model_stats: Vec<_> = self.get_model_stats().into_iter().collect();
        model_stats.sort_by(|a, b| a.0.cmp(&b.0));
        if !model_stats.is_empty() {
            info!("Model Forward Times (μs):");
            for (model, stats) in &model_stats {
                info!(
                    "  {}: mean={} p50={} p99={} (calls={})",
                    model, stats.mean_us, stats.p50_us, stats.p99_us, stats.calls
                );
            }
        }

        let mut agreement: Vec<_> = self.get_agreement().into_iter().collect();
        agreement.sort_by(|a, b| a.0.cmp(&b.0));
        if agreement.len() > 1 {
            info!("Agreement with ensemble decision:");
            for (model, fraction) in &agreement {
                info!("  {}: {:.1}%", model, fraction * 100.0);
            }
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Model-specific statistics
#[derive(Debug, Clone, PartialEq)]
pub struct ModelStats {
    pub calls: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
}
