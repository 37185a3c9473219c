//! Trace sampling engine.
//!
//! Decides, once per transaction, whether a trace is recorded. The decision
//! walks a fixed priority chain and short-circuits at the first matching
//! rule:
//!
//! 1. tracing disabled for the process → not sampled
//! 2. an explicit decision already exists → keep it unchanged
//! 3. a configured sampler callback → its return value is the effective rate
//! 4. an inherited parent decision → used directly as the effective rate
//! 5. the configured fixed rate → the effective rate
//!
//! No branch of [`decide`] can panic; every invalid or absent input degrades
//! to "not sampled" plus a diagnostic log line.

use crate::trace_context::TraceId;
use crate::{tracekit_debug, tracekit_warn};
use rand::{rngs, Rng, SeedableRng};
use std::cell::RefCell;
use std::fmt;

/// A uniform random source drawing from `[0, 1)`.
///
/// Threaded explicitly through the sampling engine so tests can substitute a
/// deterministic source.
pub trait RandomSource: Send + Sync + fmt::Debug {
    /// Draw one uniform sample from `[0, 1)`.
    fn uniform(&self) -> f64;
}

/// Default [`RandomSource`] backed by a thread-local rng.
#[derive(Clone, Debug, Default)]
pub struct ThreadRngRandom {
    _private: (),
}

impl RandomSource for ThreadRngRandom {
    fn uniform(&self) -> f64 {
        CURRENT_RNG.with(|rng| rng.borrow_mut().gen::<f64>())
    }
}

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_entropy());
}

/// Value returned by a traces sampler callback.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SamplerDecision {
    /// A hard decision for this transaction.
    Sampled(bool),
    /// A probability in `[0.0, 1.0]` to sample against. Anything outside
    /// that range (including NaN) is rejected as an invalid sample rate.
    Rate(f64),
}

/// Sampler callback invoked once per transaction by the sampling engine.
pub type TracesSampler = dyn Fn(&SamplingContext) -> SamplerDecision + Send + Sync;

/// Information about the transaction being decided, handed to a
/// [`TracesSampler`] callback.
#[derive(Clone, Debug, Default)]
pub struct SamplingContext {
    /// The transaction's operation, e.g. `"http.server"`.
    pub op: Option<String>,
    /// The transaction's human-readable name, if already set.
    pub name: Option<String>,
    /// The transaction's description.
    pub description: Option<String>,
    /// The trace the transaction belongs to.
    pub trace_id: Option<TraceId>,
    /// The decision inherited from an inbound propagated context, if any.
    pub parent_sampled: Option<bool>,
}

impl SamplingContext {
    /// Label used to correlate log lines: the op, or the name if no op is
    /// set.
    fn label(&self) -> &str {
        self.op
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("transaction")
    }
}

// Which rule produced the effective rate; only controls log wording.
enum DecisionSource {
    Sampler,
    Parent,
    FixedRate,
}

/// Decide whether a transaction is sampled.
///
/// `already_sampled` is the transaction's current decision: when present it
/// is returned unchanged, which makes repeated calls idempotent. `sampler`,
/// `parent_sampled` and `fixed_rate` are consulted in that order; the first
/// one present supplies the effective rate.
pub fn decide(
    tracing_enabled: bool,
    already_sampled: Option<bool>,
    sampler: Option<&TracesSampler>,
    parent_sampled: Option<bool>,
    fixed_rate: Option<f64>,
    random: &dyn RandomSource,
    ctx: &SamplingContext,
) -> bool {
    if !tracing_enabled {
        return false;
    }
    if let Some(decided) = already_sampled {
        return decided;
    }

    let (decision, source) = if let Some(sampler) = sampler {
        (sampler(ctx), DecisionSource::Sampler)
    } else if let Some(parent_decision) = parent_sampled {
        (
            SamplerDecision::Sampled(parent_decision),
            DecisionSource::Parent,
        )
    } else {
        match fixed_rate {
            Some(rate) => (SamplerDecision::Rate(rate), DecisionSource::FixedRate),
            None => {
                tracekit_warn!(
                    name: "transaction_sampling.no_rate_configured",
                    transaction = ctx.label()
                );
                return false;
            }
        }
    };

    apply_decision(decision, source, random, ctx)
}

// Shared interpretation of the effective rate for rules 3-5.
fn apply_decision(
    decision: SamplerDecision,
    source: DecisionSource,
    random: &dyn RandomSource,
    ctx: &SamplingContext,
) -> bool {
    let label = ctx.label();
    match decision {
        SamplerDecision::Sampled(true) => {
            tracekit_debug!(
                name: "transaction_sampling.start",
                transaction = label
            );
            true
        }
        SamplerDecision::Sampled(false) => {
            // The parent path intentionally names no rate; a boolean is a
            // decision, not a probability.
            let reason = match source {
                DecisionSource::Parent => "parent decision was false",
                _ => "traces sampler returned false",
            };
            tracekit_debug!(
                name: "transaction_sampling.discard",
                transaction = label,
                reason = reason
            );
            false
        }
        SamplerDecision::Rate(rate) => {
            if !(0.0..=1.0).contains(&rate) {
                tracekit_warn!(
                    name: "transaction_sampling.invalid_rate",
                    transaction = label,
                    sample_rate = rate
                );
                return false;
            }
            if rate == 0.0 {
                tracekit_debug!(
                    name: "transaction_sampling.discard",
                    transaction = label,
                    reason = "traces sample rate is 0"
                );
                return false;
            }
            if rate >= 1.0 || random.uniform() < rate {
                tracekit_debug!(
                    name: "transaction_sampling.start",
                    transaction = label,
                    sample_rate = rate
                );
                true
            } else {
                tracekit_debug!(
                    name: "transaction_sampling.discard",
                    transaction = label,
                    reason = "not included in the random sample",
                    sample_rate = rate
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedRandom;
    use rstest::rstest;

    fn ctx() -> SamplingContext {
        SamplingContext {
            op: Some("sql.query".to_owned()),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(0.0, 0.5, false)]
    #[case(0.0, 0.0, false)]
    #[case(1.0, 0.999_999, true)]
    #[case(1.0, 0.0, true)]
    #[case(0.5, 0.25, true)]
    #[case(0.5, 0.75, false)]
    // strict comparison: draw == rate is discarded
    #[case(0.3, 0.3, false)]
    fn fixed_rate_decision_is_draw_less_than_rate(
        #[case] rate: f64,
        #[case] draw: f64,
        #[case] expected: bool,
    ) {
        let got = decide(
            true,
            None,
            None,
            None,
            Some(rate),
            &FixedRandom(draw),
            &ctx(),
        );
        assert_eq!(got, expected);
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    fn already_decided_transactions_keep_their_decision(#[case] decided: bool) {
        // A configuration that would flip the outcome must be ignored.
        let sampler = move |_: &SamplingContext| SamplerDecision::Sampled(!decided);
        let got = decide(
            true,
            Some(decided),
            Some(&sampler),
            Some(!decided),
            Some(if decided { 0.0 } else { 1.0 }),
            &FixedRandom(0.5),
            &ctx(),
        );
        assert_eq!(got, decided);
    }

    #[test]
    fn disabled_tracing_never_samples() {
        let sampler = |_: &SamplingContext| SamplerDecision::Sampled(true);
        let got = decide(
            false,
            None,
            Some(&sampler),
            Some(true),
            Some(1.0),
            &FixedRandom(0.0),
            &ctx(),
        );
        assert!(!got);
    }

    #[rstest]
    #[case(true, Some(false), Some(0.0))]
    #[case(true, Some(false), None)]
    #[case(false, Some(true), Some(1.0))]
    #[case(false, None, Some(1.0))]
    fn sampler_overrides_parent_decision_and_fixed_rate(
        #[case] sampler_says: bool,
        #[case] parent_sampled: Option<bool>,
        #[case] fixed_rate: Option<f64>,
    ) {
        let sampler = move |_: &SamplingContext| SamplerDecision::Sampled(sampler_says);
        let got = decide(
            true,
            None,
            Some(&sampler),
            parent_sampled,
            fixed_rate,
            &FixedRandom(0.5),
            &ctx(),
        );
        assert_eq!(got, sampler_says);
    }

    #[rstest]
    #[case(true, Some(0.0), 0.5)]
    #[case(false, Some(1.0), 0.0)]
    fn parent_decision_overrides_fixed_rate(
        #[case] parent: bool,
        #[case] fixed_rate: Option<f64>,
        #[case] draw: f64,
    ) {
        let got = decide(
            true,
            None,
            None,
            Some(parent),
            fixed_rate,
            &FixedRandom(draw),
            &ctx(),
        );
        assert_eq!(got, parent);
    }

    #[test]
    fn sampler_can_return_a_rate() {
        let sampler = |_: &SamplingContext| SamplerDecision::Rate(0.5);
        let sampled = decide(
            true,
            None,
            Some(&sampler),
            None,
            None,
            &FixedRandom(0.25),
            &ctx(),
        );
        assert!(sampled);
        let dropped = decide(
            true,
            None,
            Some(&sampler),
            None,
            None,
            &FixedRandom(0.75),
            &ctx(),
        );
        assert!(!dropped);
    }

    #[rstest]
    #[case(-0.1)]
    #[case(1.5)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn invalid_rates_never_sample(#[case] rate: f64) {
        let got = decide(
            true,
            None,
            None,
            None,
            Some(rate),
            &FixedRandom(0.0),
            &ctx(),
        );
        assert!(!got);
    }

    #[test]
    fn missing_rate_with_enabled_tracing_never_samples() {
        // Possible when only a sampler enables tracing but the caller passes
        // no sampler through; the engine must degrade, not panic.
        assert!(!decide(
            true,
            None,
            None,
            None,
            None,
            &FixedRandom(0.0),
            &ctx()
        ));
    }

    #[test]
    fn sampler_receives_the_transaction_attributes() {
        let sampler = |ctx: &SamplingContext| {
            assert_eq!(ctx.op.as_deref(), Some("sql.query"));
            assert_eq!(ctx.parent_sampled, Some(true));
            SamplerDecision::Sampled(false)
        };
        let mut ctx = ctx();
        ctx.parent_sampled = Some(true);
        assert!(!decide(
            true,
            None,
            Some(&sampler),
            Some(true),
            None,
            &FixedRandom(0.0),
            &ctx
        ));
    }
}
