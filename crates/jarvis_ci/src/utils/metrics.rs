//! Prometheus metrics collection

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub jobs_total: IntCounterVec,
    pub jobs_active: IntGauge,
    pub job_duration: Histogram,
    pub targets_total: IntCounterVec,
    pub status_report_errors: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let jobs_total = IntCounterVec::new(
            Opts::new("jarvis_jobs_total", "Total number of push jobs processed"),
            &["outcome"],
        )?;
        let jobs_active = IntGauge::new("jarvis_jobs_active", "Number of currently running jobs")?;
        let job_duration = Histogram::with_opts(
            HistogramOpts::new("jarvis_job_duration_seconds", "Job duration in seconds")
                .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0]),
        )?;
        let targets_total = IntCounterVec::new(
            Opts::new("jarvis_targets_total", "Total number of target runs"),
            &["outcome"],
        )?;
        let status_report_errors = IntCounter::new(
            "jarvis_status_report_errors_total",
            "Status reports that could not be delivered",
        )?;

        registry.register(Box::new(jobs_total.clone()))?;
        registry.register(Box::new(jobs_active.clone()))?;
        registry.register(Box::new(job_duration.clone()))?;
        registry.register(Box::new(targets_total.clone()))?;
        registry.register(Box::new(status_report_errors.clone()))?;

        Ok(Self {
            registry,
            jobs_total,
            jobs_active,
            job_duration,
            targets_total,
            status_report_errors,
        })
    }

    pub fn record_job_start(&self) {
        self.jobs_active.inc();
    }

    pub fn record_job_complete(&self, outcome: &str, duration_secs: f64) {
        self.jobs_total.with_label_values(&[outcome]).inc();
        self.job_duration.observe(duration_secs);
        self.jobs_active.dec();
    }

    pub fn record_target(&self, outcome: &str) {
        self.targets_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_report_error(&self) {
        self.status_report_errors.inc();
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_metrics_include_recorded_values() {
        let metrics = Metrics::new().unwrap();
        metrics.record_job_start();
        metrics.record_target("failure");
        metrics.record_job_complete("failure", 2.5);

        let text = metrics.render().unwrap();
        assert!(text.contains("jarvis_targets_total{outcome=\"failure\"} 1"));
        assert!(text.contains("jarvis_jobs_total{outcome=\"failure\"} 1"));
        assert!(text.contains("jarvis_jobs_active 0"));
    }

    #[test]
    fn instances_do_not_share_state() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.record_report_error();

        assert_eq!(first.status_report_errors.get(), 1);
        assert_eq!(second.status_report_errors.get(), 0);
    }
}
