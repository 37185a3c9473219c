//! # Span
//!
//! `Span`s represent a single timed operation within a trace. Every span
//! belonging to one trace is owned by the trace's [`SpanRecorder`]; the
//! [`Span`] values handed back to callers are cheap-to-clone handles, so a
//! span can be started in one execution context and finished in another.

use crate::id_generator::{IdGenerator, RandomIdGenerator};
use crate::propagation;
use crate::trace_context::{SpanId, TraceId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::SystemTime;

pub(crate) mod unix_time {
    use serde::Serializer;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub(crate) fn to_secs(timestamp: SystemTime) -> f64 {
        timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    pub(crate) fn serialize<S: Serializer>(
        timestamp: &SystemTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(to_secs(*timestamp))
    }

    pub(crate) fn serialize_opt<S: Serializer>(
        timestamp: &Option<SystemTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match timestamp {
            Some(timestamp) => serializer.serialize_f64(to_secs(*timestamp)),
            None => serializer.serialize_none(),
        }
    }
}

/// Recorded state of a single span.
///
/// Timestamps serialize as f64 UNIX seconds, identifiers as lowercase hex
/// strings.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpanData {
    /// The trace this span belongs to.
    pub trace_id: TraceId,
    /// This span's own identifier.
    pub span_id: SpanId,
    /// The span this span was started under, absent for a root span with no
    /// inbound propagated context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    /// Short operation category, e.g. `"http.server"` or `"sql.query"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    /// Longer free-form description of the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form status tag, e.g. `"ok"` or `"internal_error"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Arbitrary string tags.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Arbitrary structured data.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, serde_json::Value>,
    /// Whether the owning trace is recorded. Copied verbatim from the
    /// transaction at span creation, never re-decided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampled: Option<bool>,
    /// Set at construction.
    #[serde(serialize_with = "unix_time::serialize")]
    pub start_timestamp: SystemTime,
    /// Set at finish; absent while the span is in flight.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "unix_time::serialize_opt"
    )]
    pub timestamp: Option<SystemTime>,
}

impl SpanData {
    pub(crate) fn new(
        trace_id: TraceId,
        span_id: SpanId,
        parent_span_id: Option<SpanId>,
        sampled: Option<bool>,
        attrs: SpanAttributes,
    ) -> Self {
        SpanData {
            trace_id,
            span_id,
            parent_span_id,
            op: attrs.op,
            description: attrs.description,
            status: attrs.status,
            tags: attrs.tags,
            data: attrs.data,
            sampled,
            start_timestamp: SystemTime::now(),
            timestamp: None,
        }
    }

    /// Propagation header value carrying this span's identity.
    pub fn to_propagation(&self) -> String {
        propagation::encode(self.trace_id, self.span_id, self.sampled)
    }

    /// Pure projection of this span's fields as a JSON map.
    pub fn to_hash(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("trace_id".into(), self.trace_id.to_string().into());
        map.insert("span_id".into(), self.span_id.to_string().into());
        if let Some(parent_span_id) = self.parent_span_id {
            map.insert("parent_span_id".into(), parent_span_id.to_string().into());
        }
        if let Some(op) = &self.op {
            map.insert("op".into(), op.clone().into());
        }
        if let Some(description) = &self.description {
            map.insert("description".into(), description.clone().into());
        }
        if let Some(status) = &self.status {
            map.insert("status".into(), status.clone().into());
        }
        if !self.tags.is_empty() {
            map.insert(
                "tags".into(),
                serde_json::Value::Object(
                    self.tags
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone().into()))
                        .collect(),
                ),
            );
        }
        if !self.data.is_empty() {
            map.insert(
                "data".into(),
                serde_json::Value::Object(
                    self.data
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                ),
            );
        }
        if let Some(sampled) = self.sampled {
            map.insert("sampled".into(), sampled.into());
        }
        map.insert(
            "start_timestamp".into(),
            unix_time::to_secs(self.start_timestamp).into(),
        );
        if let Some(timestamp) = self.timestamp {
            map.insert("timestamp".into(), unix_time::to_secs(timestamp).into());
        }
        serde_json::Value::Object(map)
    }
}

/// Descriptive attributes for a span being started.
#[derive(Clone, Debug, Default)]
pub struct SpanAttributes {
    /// Short operation category.
    pub op: Option<String>,
    /// Longer free-form description.
    pub description: Option<String>,
    /// Initial status tag.
    pub status: Option<String>,
    /// String tags.
    pub tags: BTreeMap<String, String>,
    /// Structured data.
    pub data: BTreeMap<String, serde_json::Value>,
}

impl SpanAttributes {
    /// Empty attribute set.
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the operation category.
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the initial status tag.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Add a string tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a structured data entry.
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// Ordered collection of every span belonging to one trace.
///
/// Entry 0 is always the owning transaction's own span data. A recorder is
/// exclusively owned by one transaction; descendant spans hold only a weak
/// reference used to register children. Appends and snapshots are mutually
/// exclusive through the surrounding mutex, so a reader never observes a
/// partially-appended state.
#[derive(Debug, Default)]
pub struct SpanRecorder {
    spans: Vec<Arc<Mutex<SpanData>>>,
}

impl SpanRecorder {
    /// Number of recorded spans, the owning transaction included.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// True when nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    // Invariant: `span.trace_id` equals the recorder's trace id; both
    // creation paths derive the child from entry 0, so this holds by
    // construction.
    pub(crate) fn record(&mut self, span: Arc<Mutex<SpanData>>) {
        self.spans.push(span);
    }

    /// Stable copy of every recorded span, in append order.
    pub(crate) fn snapshot(&self) -> Vec<SpanData> {
        self.spans
            .iter()
            .map(|span| span.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect()
    }
}

/// Handle to a span owned by a transaction's span recorder.
///
/// Clones are shallow: they refer to the same recorded span. Mutations go
/// through a per-span lock, so a span may be mutated and finished from a
/// different execution context than the one that started it.
#[derive(Clone, Debug)]
pub struct Span {
    pub(crate) data: Arc<Mutex<SpanData>>,
    pub(crate) recorder: Weak<Mutex<SpanRecorder>>,
}

impl Span {
    pub(crate) fn with_data<T>(&self, f: impl FnOnce(&mut SpanData) -> T) -> T {
        let mut guard = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// The trace this span belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.with_data(|data| data.trace_id)
    }

    /// This span's identifier.
    pub fn span_id(&self) -> SpanId {
        self.with_data(|data| data.span_id)
    }

    /// The parent span's identifier, if any.
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.with_data(|data| data.parent_span_id)
    }

    /// The trace's sampling decision as copied at span creation.
    pub fn sampled(&self) -> Option<bool> {
        self.with_data(|data| data.sampled)
    }

    /// The operation category.
    pub fn op(&self) -> Option<String> {
        self.with_data(|data| data.op.clone())
    }

    /// The span's description.
    pub fn description(&self) -> Option<String> {
        self.with_data(|data| data.description.clone())
    }

    /// The span's status tag.
    pub fn status(&self) -> Option<String> {
        self.with_data(|data| data.status.clone())
    }

    /// Update the operation category.
    pub fn set_op(&self, op: impl Into<String>) {
        self.with_data(|data| data.op = Some(op.into()));
    }

    /// Update the description.
    pub fn set_description(&self, description: impl Into<String>) {
        self.with_data(|data| data.description = Some(description.into()));
    }

    /// Update the status tag.
    pub fn set_status(&self, status: impl Into<String>) {
        self.with_data(|data| data.status = Some(status.into()));
    }

    /// Set a string tag.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        self.with_data(|data| data.tags.insert(key.into(), value.into()));
    }

    /// Set a structured data entry.
    pub fn set_data(&self, key: impl Into<String>, value: serde_json::Value) {
        self.with_data(|data| data.data.insert(key.into(), value));
    }

    /// Stamp the end timestamp. The first call wins; a span cannot be
    /// re-finished.
    pub fn finish(&self) {
        self.with_data(|data| {
            if data.timestamp.is_none() {
                data.timestamp = Some(SystemTime::now());
            }
        });
    }

    /// Whether the end timestamp has been stamped.
    pub fn is_finished(&self) -> bool {
        self.with_data(|data| data.timestamp.is_some())
    }

    /// Propagation header value carrying this span's identity, so a
    /// downstream service parents onto this span rather than the
    /// transaction.
    pub fn get_propagation_header(&self) -> String {
        self.with_data(|data| data.to_propagation())
    }

    /// Pure projection of this span's fields as a JSON map.
    pub fn to_hash(&self) -> serde_json::Value {
        self.with_data(|data| data.to_hash())
    }

    /// Start a child of this span. The child registers into the same
    /// recorder as this span, in call order; if the owning transaction is
    /// already gone the child is still returned but recorded nowhere.
    pub fn start_child(&self, attrs: SpanAttributes) -> Span {
        let (trace_id, parent_span_id, sampled) =
            self.with_data(|data| (data.trace_id, data.span_id, data.sampled));
        match self.recorder.upgrade() {
            Some(recorder) => {
                start_child_in(&recorder, trace_id, parent_span_id, sampled, attrs)
            }
            None => Span {
                data: Arc::new(Mutex::new(SpanData::new(
                    trace_id,
                    RandomIdGenerator::default().new_span_id(),
                    Some(parent_span_id),
                    sampled,
                    attrs,
                ))),
                recorder: Weak::new(),
            },
        }
    }
}

// Shared child-creation path for Transaction::start_child and
// Span::start_child. Append happens under the recorder lock after the child
// is fully constructed.
pub(crate) fn start_child_in(
    recorder: &Arc<Mutex<SpanRecorder>>,
    trace_id: TraceId,
    parent_span_id: SpanId,
    sampled: Option<bool>,
    attrs: SpanAttributes,
) -> Span {
    let child = Arc::new(Mutex::new(SpanData::new(
        trace_id,
        RandomIdGenerator::default().new_span_id(),
        Some(parent_span_id),
        sampled,
        attrs,
    )));
    recorder
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .record(child.clone());
    Span {
        data: child,
        recorder: Arc::downgrade(recorder),
    }
}
