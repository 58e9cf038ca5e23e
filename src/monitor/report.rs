//! Performance reports and recommendation rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Average load time above which delivery should be optimised (ms)
pub const SLOW_LOAD_THRESHOLD_MS: f64 = 5_000.0;

/// Success rate below which error handling should be improved (%)
pub const LOW_SUCCESS_RATE_PERCENT: f64 = 80.0;

/// Average retries above which initial loads are considered unstable
pub const HIGH_RETRY_AVERAGE: f64 = 1.5;

/// What a recommendation asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    /// Loads are slow
    OptimizeDelivery,
    /// Too many loads fail
    ImproveErrorHandling,
    /// Heap usage is over the threshold
    PerformCleanup,
    /// First attempts fail too often
    ImproveInitialLoadStability,
}

/// One rule-based recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Rule that fired
    pub kind: RecommendationKind,
    /// Human-readable advice
    pub message: String,
}

/// Memory figures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryReport {
    /// Usage at report time (0 when unavailable)
    pub current_bytes: u64,
    /// Highest sampled usage
    pub peak_bytes: u64,
    /// Mean heap change per attempt
    pub average_delta_bytes: f64,
    /// Configured threshold
    pub threshold_bytes: u64,
    /// Whether current usage exceeds the threshold
    pub exceeds_threshold: bool,
    /// Whether the host exposes a memory API
    pub available: bool,
}

/// Aggregate performance statistics plus recommendations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    /// When the report was generated
    pub generated_at: DateTime<Utc>,
    /// Attempts measured
    pub total_loads: u64,
    /// Attempts that succeeded
    pub successful_loads: u64,
    /// `successful_loads / total_loads` in percent, 0 when nothing was measured
    pub success_rate: f64,
    /// Mean load time over buffered samples (ms)
    pub average_load_time_ms: f64,
    /// Slowest buffered load time (ms)
    pub max_load_time_ms: f64,
    /// Mean retry count over buffered attempts
    pub average_retries: f64,
    /// Sessions currently tracked
    pub active_sessions: usize,
    /// Memory figures
    pub memory: MemoryReport,
    /// Most recent placements evicted as leak suspects, oldest first
    pub leak_suspects: Vec<String>,
    /// Leak suspects evicted since the last reset
    pub leaks_detected: u64,
    /// Rule-based advice
    pub recommendations: Vec<Recommendation>,
}

/// Apply the recommendation rules to a report's figures.
pub fn recommendations_for(
    total_loads: u64,
    success_rate: f64,
    average_load_time_ms: f64,
    average_retries: f64,
    memory: &MemoryReport,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    if average_load_time_ms > SLOW_LOAD_THRESHOLD_MS {
        recommendations.push(Recommendation {
            kind: RecommendationKind::OptimizeDelivery,
            message: format!(
                "Average load time is {:.0}ms; optimize ad delivery (lazy loading, preconnect)",
                average_load_time_ms
            ),
        });
    }
    if total_loads > 0 && success_rate < LOW_SUCCESS_RATE_PERCENT {
        recommendations.push(Recommendation {
            kind: RecommendationKind::ImproveErrorHandling,
            message: format!("Success rate is {success_rate:.1}%; improve error handling"),
        });
    }
    if memory.exceeds_threshold {
        recommendations.push(Recommendation {
            kind: RecommendationKind::PerformCleanup,
            message: format!(
                "Memory usage of {} bytes exceeds the {} byte threshold; perform cleanup",
                memory.current_bytes, memory.threshold_bytes
            ),
        });
    }
    if average_retries > HIGH_RETRY_AVERAGE {
        recommendations.push(Recommendation {
            kind: RecommendationKind::ImproveInitialLoadStability,
            message: format!(
                "Average of {average_retries:.2} retries per attempt; improve initial load stability"
            ),
        });
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(recommendations: &[Recommendation]) -> Vec<RecommendationKind> {
        recommendations.iter().map(|r| r.kind).collect()
    }

    #[test]
    fn test_healthy_figures_produce_nothing() {
        let memory = MemoryReport::default();
        assert!(recommendations_for(10, 100.0, 800.0, 0.2, &memory).is_empty());
    }

    #[test]
    fn test_each_rule_fires() {
        let memory = MemoryReport {
            current_bytes: 60,
            threshold_bytes: 50,
            exceeds_threshold: true,
            available: true,
            ..MemoryReport::default()
        };
        let all = recommendations_for(10, 50.0, 6_000.0, 2.0, &memory);
        assert_eq!(
            kinds(&all),
            vec![
                RecommendationKind::OptimizeDelivery,
                RecommendationKind::ImproveErrorHandling,
                RecommendationKind::PerformCleanup,
                RecommendationKind::ImproveInitialLoadStability,
            ]
        );
    }

    #[test]
    fn test_boundaries_do_not_fire() {
        let memory = MemoryReport::default();
        assert!(recommendations_for(10, 80.0, 5_000.0, 1.5, &memory).is_empty());
    }

    #[test]
    fn test_no_loads_means_no_success_rule() {
        let memory = MemoryReport::default();
        assert!(recommendations_for(0, 0.0, 0.0, 0.0, &memory).is_empty());
    }
}
