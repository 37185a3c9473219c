//! Tracing configuration read by the sampling engine.

use crate::sampler::{SamplerDecision, SamplingContext, TracesSampler};
use std::fmt;
use std::sync::Arc;

/// Process-wide tracing configuration.
///
/// The tracing core never reads ambient global state; a `Config` is passed
/// explicitly into every call that needs one, so the sampling engine stays
/// pure and independently testable.
///
/// ```
/// use tracekit::Config;
///
/// let config = Config::default().with_traces_sample_rate(0.25);
/// assert!(config.tracing_enabled());
/// ```
#[derive(Clone, Default)]
pub struct Config {
    /// Fraction of transactions to record, in `[0.0, 1.0]`. Used when no
    /// sampler callback is configured and no parent decision was inherited.
    pub traces_sample_rate: Option<f64>,
    /// Callback deciding per-transaction whether (or with what probability)
    /// the trace is recorded. Takes priority over `traces_sample_rate` and
    /// over any inherited parent decision.
    pub traces_sampler: Option<Arc<TracesSampler>>,
}

impl Config {
    /// Create a default config.
    pub fn new() -> Self {
        Default::default()
    }

    /// Specify the fixed fraction of transactions to record.
    pub fn with_traces_sample_rate(mut self, rate: f64) -> Self {
        self.traces_sample_rate = Some(rate);
        self
    }

    /// Specify a sampler callback invoked once per transaction.
    pub fn with_traces_sampler<F>(mut self, sampler: F) -> Self
    where
        F: Fn(&SamplingContext) -> SamplerDecision + Send + Sync + 'static,
    {
        self.traces_sampler = Some(Arc::new(sampler));
        self
    }

    /// Tracing is enabled for the process when either a fixed rate or a
    /// sampler callback is configured.
    pub fn tracing_enabled(&self) -> bool {
        self.traces_sample_rate.is_some() || self.traces_sampler.is_some()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("traces_sample_rate", &self.traces_sample_rate)
            .field(
                "traces_sampler",
                &self.traces_sampler.as_ref().map(|_| "Fn"),
            )
            .finish()
    }
}
