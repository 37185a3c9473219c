//! Tracing core for application performance monitoring instrumentation.
//!
//! This crate models a distributed trace as a tree of timed spans rooted at a
//! [`Transaction`], decides once per transaction whether the trace is
//! recorded, and encodes trace identity into a short header value so a
//! downstream service can continue the same trace.
//!
//! It deliberately stops at the process boundary: network transport and
//! batching, process-wide configuration loading, and framework-specific
//! instrumentation are external collaborators. The delivery target is
//! anything implementing [`Hub`]; configuration is passed in explicitly as a
//! [`Config`].
//!
//! Instrumentation must never be able to crash or block the application it
//! observes: no operation in this crate panics on malformed external input,
//! and every fallible path degrades to "do not sample" plus a diagnostic log
//! line.
//!
//! # Getting started
//!
//! ```
//! use std::sync::Arc;
//! use tracekit::{Config, NoopHub, SpanAttributes, Transaction, TransactionContext};
//!
//! let config = Config::default().with_traces_sample_rate(1.0);
//!
//! // Root transaction for an incoming request.
//! let transaction = Transaction::start(
//!     TransactionContext::new().with_op("http.server"),
//!     &config,
//!     Arc::new(NoopHub),
//! );
//! transaction.set_name("GET /orders");
//!
//! let span = transaction.start_child(
//!     SpanAttributes::new().with_op("sql.query").with_description("SELECT * FROM orders"),
//! );
//! span.finish();
//!
//! // Propagate to a downstream service...
//! let header = transaction.get_propagation_header();
//! assert!(TransactionContext::from_propagation(&header, &config).is_some());
//!
//! // ...and emit the trace once the request is done.
//! transaction.finish();
//! ```

#![warn(missing_docs, unreachable_pub, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod id_generator;
mod internal_logging;
pub mod propagation;
pub mod sampler;
pub mod span;
#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;
pub mod trace_context;
pub mod transaction;

pub use config::Config;
pub use id_generator::{IdGenerator, RandomIdGenerator};
pub use propagation::PropagatedContext;
pub use sampler::{RandomSource, SamplerDecision, SamplingContext, ThreadRngRandom, TracesSampler};
pub use span::{Span, SpanAttributes, SpanData, SpanRecorder};
pub use trace_context::{SpanId, TraceId};
pub use transaction::{
    Hub, NoopHub, Transaction, TransactionContext, TransactionEvent, UNLABELED_TRANSACTION,
};

#[cfg(feature = "internal-logs")]
#[doc(hidden)]
pub mod _private {
    pub use tracing::{debug, info, warn};
}
