//! Sweep report: ordered per-target results plus a summary.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Serialize, Serializer};

use probegrid_core::{GroupRef, JobResult};

/// Counts over a finished sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    /// Result count per classification label.
    pub by_classification: BTreeMap<String, usize>,
}

impl Summary {
    pub fn from_results(results: &[JobResult]) -> Self {
        let mut summary = Summary {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            if result.classification.is_healthy() {
                summary.healthy += 1;
            } else {
                summary.unhealthy += 1;
            }
            *summary
                .by_classification
                .entry(result.classification.label().to_string())
                .or_default() += 1;
        }
        summary
    }

    /// Number of results with the given label.
    pub fn count(&self, label: &str) -> usize {
        self.by_classification.get(label).copied().unwrap_or(0)
    }
}

/// Everything a sweep produced, in target order.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub group: String,
    pub results: Vec<JobResult>,
    pub summary: Summary,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

impl SweepReport {
    pub fn new(group: &GroupRef, results: Vec<JobResult>, duration: Duration) -> Self {
        let summary = Summary::from_results(&results);
        Self {
            group: group.to_string(),
            results,
            summary,
            duration,
        }
    }

    /// `"2/3 healthy"`.
    pub fn summary_line(&self) -> String {
        format!("{}/{} healthy", self.summary.healthy, self.summary.total)
    }

    pub fn all_healthy(&self) -> bool {
        self.summary.unhealthy == 0
    }
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
