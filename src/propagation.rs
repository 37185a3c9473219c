//! # Trace context propagation
//!
//! Encodes a span's identity into a short header value for crossing process
//! boundaries, and decodes inbound values back into the identity a child
//! transaction continues from.
//!
//! The format is `"<32-hex trace_id>-<16-hex span_id>[-<0|1>]"`, where the
//! optional suffix carries the sampling decision when it is already known.
//! Decoding is deliberately forgiving at the surface: malformed input yields
//! `None`, never an error, so instrumentation can never crash the
//! instrumented application on a bad header.

use crate::trace_context::{SpanId, TraceId};
use thiserror::Error;

const TRACE_ID_HEX_LEN: usize = 32;
const SPAN_ID_HEX_LEN: usize = 16;

/// Why an inbound header failed to parse. Internal only; the public decode
/// surface degrades to `None`.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum PropagationError {
    #[error("wrong number of `-` separated fields")]
    FieldCount,
    #[error("malformed trace id")]
    MalformedTraceId,
    #[error("malformed span id")]
    MalformedSpanId,
    #[error("malformed sampled flag")]
    MalformedSampledFlag,
}

/// Identity parsed out of an inbound propagation header.
///
/// `parent_sampled` is the *parent's* decision; the child transaction built
/// from this value starts undecided, and inheriting the bit happens through
/// the sampling engine's priority chain, never by direct assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropagatedContext {
    /// The trace to continue.
    pub trace_id: TraceId,
    /// The sending span; becomes the child transaction's parent span id.
    pub parent_span_id: SpanId,
    /// The sender's sampling decision, absent when the sender was undecided.
    pub parent_sampled: Option<bool>,
}

/// Encode identity as a propagation header value.
pub fn encode(trace_id: TraceId, span_id: SpanId, sampled: Option<bool>) -> String {
    match sampled {
        Some(true) => format!("{trace_id}-{span_id}-1"),
        Some(false) => format!("{trace_id}-{span_id}-0"),
        None => format!("{trace_id}-{span_id}"),
    }
}

/// Decode a propagation header value, `None` on any mismatch.
pub fn decode(raw: &str) -> Option<PropagatedContext> {
    extract(raw).ok()
}

fn extract(raw: &str) -> Result<PropagatedContext, PropagationError> {
    let parts = raw.trim().split('-').collect::<Vec<&str>>();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(PropagationError::FieldCount);
    }

    if !is_lowercase_hex(parts[0], TRACE_ID_HEX_LEN) {
        return Err(PropagationError::MalformedTraceId);
    }
    let trace_id =
        TraceId::from_hex(parts[0]).map_err(|_| PropagationError::MalformedTraceId)?;

    if !is_lowercase_hex(parts[1], SPAN_ID_HEX_LEN) {
        return Err(PropagationError::MalformedSpanId);
    }
    let parent_span_id =
        SpanId::from_hex(parts[1]).map_err(|_| PropagationError::MalformedSpanId)?;

    let parent_sampled = match parts.get(2) {
        None => None,
        Some(&"1") => Some(true),
        Some(&"0") => Some(false),
        Some(_) => return Err(PropagationError::MalformedSampledFlag),
    };

    Ok(PropagatedContext {
        trace_id,
        parent_span_id,
        parent_sampled,
    })
}

fn is_lowercase_hex(value: &str, len: usize) -> bool {
    value.len() == len
        && value
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
