use schema::PipelineResult;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,
    rejected_requests: AtomicUsize,

    // Pipeline
    total_pipeline_time_us: AtomicU64,
    stage_fallbacks: AtomicUsize,
    diagrams_served: AtomicUsize,
    refined_answers: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_requests: AtomicUsize::new(0),
            successful_requests: AtomicUsize::new(0),
            failed_requests: AtomicUsize::new(0),
            rejected_requests: AtomicUsize::new(0),
            total_pipeline_time_us: AtomicU64::new(0),
            stage_fallbacks: AtomicUsize::new(0),
            diagrams_served: AtomicUsize::new(0),
            refined_answers: AtomicUsize::new(0),
        })
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Client errors (400) count as requests but not as pipeline failures.
    pub fn record_rejection(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pipeline(&self, duration: std::time::Duration, result: &PipelineResult) {
        self.total_pipeline_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.stage_fallbacks
            .fetch_add(result.trace.fallbacks.len(), Ordering::Relaxed);
        self.diagrams_served
            .fetch_add(result.diagrams.len(), Ordering::Relaxed);
        if result.trace.refined {
            self.refined_answers.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let successful = self.successful_requests.load(Ordering::Relaxed);
        let total_us = self.total_pipeline_time_us.load(Ordering::Relaxed) as f64;

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: successful,
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            avg_pipeline_time_ms: if successful > 0 {
                total_us / successful as f64 / 1000.0 // Convert to ms
            } else {
                0.0
            },
            stage_fallbacks: self.stage_fallbacks.load(Ordering::Relaxed),
            diagrams_served: self.diagrams_served.load(Ordering::Relaxed),
            refined_answers: self.refined_answers.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub rejected_requests: usize,
    pub avg_pipeline_time_ms: f64,
    pub stage_fallbacks: usize,
    pub diagrams_served: usize,
    pub refined_answers: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::PipelineTrace;
    use std::time::Duration;

    #[test]
    fn test_snapshot_counts_and_average() {
        let metrics = Metrics::new();
        let result = PipelineResult {
            answer_text: "a".into(),
            references: vec![],
            diagrams: vec![],
            trace: PipelineTrace {
                fallbacks: vec!["classifying".into()],
                refined: false,
                ..Default::default()
            },
        };

        metrics.record_request(true);
        metrics.record_pipeline(Duration::from_millis(40), &result);
        metrics.record_request(true);
        metrics.record_pipeline(Duration::from_millis(20), &result);
        metrics.record_request(false);
        metrics.record_rejection();

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 4);
        assert_eq!(snap.successful_requests, 2);
        assert_eq!(snap.failed_requests, 1);
        assert_eq!(snap.rejected_requests, 1);
        assert_eq!(snap.stage_fallbacks, 2);
        assert!((snap.avg_pipeline_time_ms - 30.0).abs() < 0.01);
    }
}
