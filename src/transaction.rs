//! # Transaction
//!
//! A `Transaction` is the root span of a trace within one process. It owns
//! the trace's [`SpanRecorder`], runs the sampling decision once, hands out
//! child spans, and on finish serializes the whole span tree into a
//! [`TransactionEvent`] for the delivery hub, but only when the trace was
//! sampled.

use crate::config::Config;
use crate::id_generator::{IdGenerator, RandomIdGenerator};
use crate::propagation;
use crate::sampler::{self, RandomSource, SamplingContext, ThreadRngRandom};
use crate::span::{self, Span, SpanAttributes, SpanData, SpanRecorder};
use crate::trace_context::{SpanId, TraceId};
use crate::tracekit_debug;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

/// Name given to a transaction that reaches finish without an explicit name.
pub const UNLABELED_TRANSACTION: &str = "<unlabeled transaction>";

/// Delivery target for finished transactions.
///
/// Fire-and-forget from the tracing core's perspective; whatever batching,
/// retrying, or I/O the implementation performs is its own concern and must
/// not block the finishing caller.
pub trait Hub: Send + Sync {
    /// Take ownership of a finished transaction event for delivery.
    fn capture_event(&self, event: TransactionEvent);
}

/// [`Hub`] that drops every event. Useful as a default delivery target when
/// no backend is wired up.
#[derive(Clone, Debug, Default)]
pub struct NoopHub;

impl Hub for NoopHub {
    fn capture_event(&self, _event: TransactionEvent) {}
}

/// Everything needed to construct a [`Transaction`]: identity, descriptive
/// attributes, and any sampling state inherited from an inbound propagated
/// context.
#[derive(Clone, Debug)]
pub struct TransactionContext {
    /// The trace the transaction belongs to.
    pub trace_id: TraceId,
    /// The transaction's own span id.
    pub span_id: SpanId,
    /// The upstream span this transaction continues, if any.
    pub parent_span_id: Option<SpanId>,
    /// The upstream sampling decision, if any.
    pub parent_sampled: Option<bool>,
    /// An explicit sampling decision, making the sampling engine a no-op.
    pub sampled: Option<bool>,
    /// Operation category.
    pub op: Option<String>,
    /// Human-readable transaction name.
    pub name: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
}

impl TransactionContext {
    /// New root context with freshly generated identifiers.
    pub fn new() -> Self {
        Self::with_generator(&RandomIdGenerator::default())
    }

    /// New root context with identifiers from the given generator.
    pub fn with_generator(generator: &dyn IdGenerator) -> Self {
        TransactionContext {
            trace_id: generator.new_trace_id(),
            span_id: generator.new_span_id(),
            parent_span_id: None,
            parent_sampled: None,
            sampled: None,
            op: None,
            name: None,
            description: None,
        }
    }

    /// Continue an inbound trace from a propagation header value.
    ///
    /// Returns `None` when the header does not parse, or when tracing is
    /// disabled for the process; there is no point materializing a child
    /// when nothing downstream records. The returned context carries the
    /// sender's decision as `parent_sampled` and is itself *undecided*:
    /// inheriting the bit is the sampling engine's job.
    pub fn from_propagation(raw: &str, config: &Config) -> Option<Self> {
        let parsed = propagation::decode(raw)?;
        if !config.tracing_enabled() {
            return None;
        }
        Some(TransactionContext {
            trace_id: parsed.trace_id,
            span_id: RandomIdGenerator::default().new_span_id(),
            parent_span_id: Some(parsed.parent_span_id),
            parent_sampled: parsed.parent_sampled,
            sampled: None,
            op: None,
            name: None,
            description: None,
        })
    }

    /// Set the operation category.
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Set the transaction name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Pass an explicit sampling decision, e.g. one made by the caller.
    pub fn with_sampled(mut self, sampled: bool) -> Self {
        self.sampled = Some(sampled);
        self
    }
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Event payload handed to the delivery [`Hub`] when a sampled transaction
/// finishes.
///
/// `spans` holds every recorded span except the transaction's own entry, in
/// original start order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransactionEvent {
    /// Always `"transaction"`.
    #[serde(rename = "type")]
    pub event_type: &'static str,
    /// The transaction's name; the unlabeled sentinel if none was set.
    pub name: String,
    /// Operation category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Final status tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// The trace the transaction rooted.
    pub trace_id: TraceId,
    /// The transaction's own span id.
    pub span_id: SpanId,
    /// The upstream span id, if the trace was continued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    /// Always `true`; unsampled transactions never produce an event.
    pub sampled: bool,
    /// The inherited upstream decision, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_sampled: Option<bool>,
    /// When the transaction started.
    #[serde(serialize_with = "crate::span::unix_time::serialize")]
    pub start_timestamp: SystemTime,
    /// When the transaction finished.
    #[serde(serialize_with = "crate::span::unix_time::serialize")]
    pub timestamp: SystemTime,
    /// Every recorded span except the transaction's own entry, in start
    /// order.
    pub spans: Vec<SpanData>,
}

struct TransactionInner {
    // Also entry 0 of the recorder.
    data: Arc<Mutex<SpanData>>,
    recorder: Arc<Mutex<SpanRecorder>>,
    name: Mutex<Option<String>>,
    parent_sampled: Option<bool>,
    hub: Arc<dyn Hub>,
}

/// Root span of a trace within one process.
///
/// Clones are shallow handles onto the same transaction; see
/// [`deep_clone`](Transaction::deep_clone) for a fully independent copy that
/// can be handed to another execution context without the two interfering.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl Transaction {
    /// Construct a transaction without running the sampling decision.
    ///
    /// The recorder starts with the transaction itself as entry 0. The hub
    /// is captured as the default delivery target for
    /// [`finish`](Transaction::finish).
    pub fn new(ctx: TransactionContext, hub: Arc<dyn Hub>) -> Transaction {
        let data = Arc::new(Mutex::new(SpanData::new(
            ctx.trace_id,
            ctx.span_id,
            ctx.parent_span_id,
            ctx.sampled,
            SpanAttributes {
                op: ctx.op,
                description: ctx.description,
                ..Default::default()
            },
        )));
        let mut recorder = SpanRecorder::default();
        recorder.record(data.clone());
        Transaction {
            inner: Arc::new(TransactionInner {
                data,
                recorder: Arc::new(Mutex::new(recorder)),
                name: Mutex::new(ctx.name),
                parent_sampled: ctx.parent_sampled,
                hub,
            }),
        }
    }

    /// Construct a transaction and immediately run the sampling decision.
    pub fn start(ctx: TransactionContext, config: &Config, hub: Arc<dyn Hub>) -> Transaction {
        let transaction = Transaction::new(ctx, hub);
        transaction.set_initial_sample_decision(config, &ThreadRngRandom::default());
        transaction
    }

    fn with_data<T>(&self, f: impl FnOnce(&mut SpanData) -> T) -> T {
        let mut guard = self
            .inner
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// The trace this transaction roots.
    pub fn trace_id(&self) -> TraceId {
        self.with_data(|data| data.trace_id)
    }

    /// The transaction's own span id.
    pub fn span_id(&self) -> SpanId {
        self.with_data(|data| data.span_id)
    }

    /// The upstream span id, if this transaction continues an inbound trace.
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.with_data(|data| data.parent_span_id)
    }

    /// The sampling decision: `None` while undecided.
    pub fn sampled(&self) -> Option<bool> {
        self.with_data(|data| data.sampled)
    }

    /// The decision inherited from the inbound propagated context, if any.
    pub fn parent_sampled(&self) -> Option<bool> {
        self.inner.parent_sampled
    }

    /// The operation category.
    pub fn op(&self) -> Option<String> {
        self.with_data(|data| data.op.clone())
    }

    /// Update the operation category.
    pub fn set_op(&self, op: impl Into<String>) {
        self.with_data(|data| data.op = Some(op.into()));
    }

    /// Update the status tag.
    pub fn set_status(&self, status: impl Into<String>) {
        self.with_data(|data| data.status = Some(status.into()));
    }

    /// The transaction's name, if set.
    pub fn name(&self) -> Option<String> {
        self.inner
            .name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Name the transaction.
    pub fn set_name(&self, name: impl Into<String>) {
        *self
            .inner
            .name
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(name.into());
    }

    /// Handle onto the transaction's own span entry.
    pub fn span(&self) -> Span {
        Span {
            data: self.inner.data.clone(),
            recorder: Arc::downgrade(&self.inner.recorder),
        }
    }

    /// Run the sampling engine for this transaction.
    ///
    /// The decision is computed at most once: a transaction constructed with
    /// an explicit decision, or already decided by an earlier call, keeps
    /// its value. The decision itself runs outside the span lock (a sampler
    /// callback must not run under it); the write is check-then-set, so the
    /// first decision wins even under concurrent calls.
    pub fn set_initial_sample_decision(&self, config: &Config, random: &dyn RandomSource) {
        let (already_sampled, op, description, trace_id) = self.with_data(|data| {
            (
                data.sampled,
                data.op.clone(),
                data.description.clone(),
                data.trace_id,
            )
        });
        let ctx = SamplingContext {
            op,
            name: self.name(),
            description,
            trace_id: Some(trace_id),
            parent_sampled: self.inner.parent_sampled,
        };
        let decision = sampler::decide(
            config.tracing_enabled(),
            already_sampled,
            config.traces_sampler.as_deref(),
            self.inner.parent_sampled,
            config.traces_sample_rate,
            random,
            &ctx,
        );
        self.with_data(|data| {
            if data.sampled.is_none() {
                data.sampled = Some(decision);
            }
        });
    }

    /// Start a child span of this transaction.
    ///
    /// The child carries this transaction's trace id, parents onto the
    /// transaction's own span id, copies the current sampling decision
    /// verbatim, and registers into the shared recorder in call order.
    pub fn start_child(&self, attrs: SpanAttributes) -> Span {
        let (trace_id, parent_span_id, sampled) =
            self.with_data(|data| (data.trace_id, data.span_id, data.sampled));
        span::start_child_in(&self.inner.recorder, trace_id, parent_span_id, sampled, attrs)
    }

    /// Propagation header value carrying this transaction's identity and
    /// decision.
    pub fn get_propagation_header(&self) -> String {
        self.with_data(|data| data.to_propagation())
    }

    /// Finish the transaction, delivering to the hub captured at
    /// construction.
    pub fn finish(&self) {
        let hub = self.inner.hub.clone();
        self.finish_with(hub.as_ref());
    }

    /// Finish the transaction with an explicit delivery target.
    ///
    /// Stamps the end timestamp and assigns the unlabeled sentinel name if
    /// none was ever set. When the transaction is not sampled (or still
    /// undecided) no event is built and the hub is never invoked; otherwise
    /// the hub receives exactly one event whose `spans` array holds every
    /// recorder entry except the transaction's own, in start order.
    pub fn finish_with(&self, hub: &dyn Hub) {
        let (sampled, op) = self.with_data(|data| {
            if data.timestamp.is_none() {
                data.timestamp = Some(SystemTime::now());
            }
            (data.sampled, data.op.clone())
        });

        let name = {
            let mut name = self
                .inner
                .name
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            name.get_or_insert_with(|| UNLABELED_TRANSACTION.to_owned())
                .clone()
        };

        if sampled != Some(true) {
            tracekit_debug!(
                name: "transaction_finish.discard",
                transaction = op.as_deref().unwrap_or(&name),
                reason = "transaction is not sampled"
            );
            return;
        }

        let mut entries = {
            self.inner
                .recorder
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot()
        }
        .into_iter();
        // Entry 0 is this transaction itself; it becomes the event envelope
        // and never appears in `spans`.
        let own = match entries.next() {
            Some(own) => own,
            None => self.with_data(|data| data.clone()),
        };
        let spans = entries.collect::<Vec<_>>();

        let event = TransactionEvent {
            event_type: "transaction",
            name,
            op: own.op,
            description: own.description,
            status: own.status,
            trace_id: own.trace_id,
            span_id: own.span_id,
            parent_span_id: own.parent_span_id,
            sampled: true,
            parent_sampled: self.inner.parent_sampled,
            start_timestamp: own.start_timestamp,
            timestamp: own.timestamp.unwrap_or(own.start_timestamp),
            spans,
        };
        hub.capture_event(event);
    }

    /// Fully independent copy of this transaction and its span tree.
    ///
    /// The copy owns a brand-new recorder that receives the copy itself as
    /// entry 0 followed by fresh copies of every other span, in original
    /// order. Identifier and attribute values are equal at the moment of
    /// copy, but no storage is shared: later mutation on either side is
    /// invisible to the other. The snapshot is taken under the recorder
    /// lock, so a concurrent `start_child` on the original is either wholly
    /// present in the copy or wholly absent.
    pub fn deep_clone(&self) -> Transaction {
        let name = self.name();
        let mut entries = {
            self.inner
                .recorder
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot()
        }
        .into_iter();
        let own = match entries.next() {
            Some(own) => own,
            None => self.with_data(|data| data.clone()),
        };

        let data = Arc::new(Mutex::new(own));
        let mut recorder = SpanRecorder::default();
        recorder.record(data.clone());
        for span in entries {
            recorder.record(Arc::new(Mutex::new(span)));
        }
        Transaction {
            inner: Arc::new(TransactionInner {
                data,
                recorder: Arc::new(Mutex::new(recorder)),
                name: Mutex::new(name),
                parent_sampled: self.inner.parent_sampled,
                hub: self.inner.hub.clone(),
            }),
        }
    }

    /// Number of recorded spans, this transaction included.
    pub fn recorded_spans(&self) -> usize {
        self.inner
            .recorder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stable copy of every recorded span in start order, entry 0 being this
    /// transaction's own data.
    pub fn span_snapshot(&self) -> Vec<SpanData> {
        self.inner
            .recorder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Pure projection of the transaction's own fields, children excluded.
    pub fn to_hash(&self) -> serde_json::Value {
        let mut value = self.with_data(|data| data.to_hash());
        if let serde_json::Value::Object(map) = &mut value {
            if let Some(name) = self.name() {
                map.insert("name".into(), name.into());
            }
            if let Some(parent_sampled) = self.inner.parent_sampled {
                map.insert("parent_sampled".into(), parent_sampled.into());
            }
        }
        value
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("trace_id", &self.trace_id())
            .field("span_id", &self.span_id())
            .field("name", &self.name())
            .field("sampled", &self.sampled())
            .field("recorded_spans", &self.recorded_spans())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedRandom, InMemoryHub};

    fn hub() -> Arc<InMemoryHub> {
        Arc::new(InMemoryHub::new())
    }

    fn sampled_transaction(hub: Arc<InMemoryHub>) -> Transaction {
        Transaction::new(
            TransactionContext::new().with_op("sql.query").with_sampled(true),
            hub,
        )
    }

    #[test]
    fn start_child_links_identity_and_copies_the_decision() {
        let transaction = sampled_transaction(hub());
        let child = transaction.start_child(SpanAttributes::new().with_op("db.fetch"));
        assert_eq!(child.trace_id(), transaction.trace_id());
        assert_eq!(child.parent_span_id(), Some(transaction.span_id()));
        assert_ne!(child.span_id(), transaction.span_id());
        assert_eq!(child.sampled(), Some(true));
        assert_eq!(transaction.recorded_spans(), 2);
    }

    #[test]
    fn children_register_in_call_order_after_the_transaction() {
        let transaction = sampled_transaction(hub());
        transaction.start_child(SpanAttributes::new().with_description("first child"));
        transaction.start_child(SpanAttributes::new().with_description("second child"));
        let snapshot = transaction.span_snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].span_id, transaction.span_id());
        assert_eq!(snapshot[1].description.as_deref(), Some("first child"));
        assert_eq!(snapshot[2].description.as_deref(), Some("second child"));
    }

    #[test]
    fn grandchildren_parent_onto_the_child_span() {
        let transaction = sampled_transaction(hub());
        let child = transaction.start_child(SpanAttributes::new().with_op("db"));
        let grandchild = child.start_child(SpanAttributes::new().with_op("db.row"));
        assert_eq!(grandchild.parent_span_id(), Some(child.span_id()));
        assert_eq!(grandchild.trace_id(), transaction.trace_id());
        assert_eq!(transaction.recorded_spans(), 3);
    }

    #[test]
    fn finish_on_unsampled_transaction_never_reaches_the_hub() {
        let hub = hub();
        let transaction = Transaction::new(
            TransactionContext::new().with_op("http.server").with_sampled(false),
            hub.clone(),
        );
        transaction.start_child(SpanAttributes::new());
        transaction.finish();
        assert!(hub.captured_events().is_empty());

        // Undecided counts as not sampled.
        let undecided = Transaction::new(TransactionContext::new(), hub.clone());
        undecided.finish();
        assert!(hub.captured_events().is_empty());
    }

    #[test]
    fn finish_delivers_exactly_one_event_excluding_the_own_entry() {
        let hub = hub();
        let transaction = sampled_transaction(hub.clone());
        transaction.set_name("process order");
        let child = transaction.start_child(SpanAttributes::new().with_op("db.save"));
        child.finish();
        transaction.finish();

        let events = hub.captured_events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type, "transaction");
        assert_eq!(event.name, "process order");
        assert_eq!(event.op.as_deref(), Some("sql.query"));
        assert_eq!(event.trace_id, transaction.trace_id());
        assert_eq!(event.span_id, transaction.span_id());
        assert!(event.sampled);
        assert_eq!(event.spans.len(), 1);
        assert_eq!(event.spans[0].op.as_deref(), Some("db.save"));
        assert!(event.spans[0].timestamp.is_some());
    }

    #[test]
    fn finish_excludes_position_zero_even_for_identical_attributes() {
        let hub = hub();
        let transaction = sampled_transaction(hub.clone());
        // A child indistinguishable from the transaction by attributes.
        transaction.start_child(SpanAttributes::new().with_op("sql.query"));
        transaction.finish();
        let events = hub.captured_events();
        assert_eq!(events[0].spans.len(), 1);
        assert_ne!(events[0].spans[0].span_id, events[0].span_id);
    }

    #[test]
    fn finish_with_overrides_the_captured_hub() {
        let constructed_with = hub();
        let explicit = hub();
        let transaction = sampled_transaction(constructed_with.clone());
        transaction.finish_with(explicit.as_ref());
        assert!(constructed_with.captured_events().is_empty());
        assert_eq!(explicit.captured_events().len(), 1);
    }

    #[test]
    fn unnamed_transaction_gets_the_sentinel_at_finish_time() {
        let hub = hub();
        let transaction = sampled_transaction(hub.clone());
        assert_eq!(transaction.name(), None);
        transaction.finish();
        assert_eq!(transaction.name().as_deref(), Some(UNLABELED_TRANSACTION));
        assert_eq!(hub.captured_events()[0].name, UNLABELED_TRANSACTION);
    }

    #[test]
    fn explicit_decision_in_the_context_survives_the_engine() {
        let config = Config::default().with_traces_sample_rate(1.0);
        let transaction = Transaction::new(
            TransactionContext::new().with_sampled(false),
            hub(),
        );
        transaction.set_initial_sample_decision(&config, &FixedRandom(0.0));
        assert_eq!(transaction.sampled(), Some(false));
    }

    #[test]
    fn repeated_decisions_are_idempotent() {
        let transaction = Transaction::new(TransactionContext::new().with_op("queue"), hub());
        let sample_all = Config::default().with_traces_sample_rate(1.0);
        transaction.set_initial_sample_decision(&sample_all, &FixedRandom(0.5));
        assert_eq!(transaction.sampled(), Some(true));

        let sample_none = Config::default().with_traces_sample_rate(0.0);
        transaction.set_initial_sample_decision(&sample_none, &FixedRandom(0.5));
        assert_eq!(transaction.sampled(), Some(true));
    }

    #[test]
    fn decision_inherits_the_parent_when_no_sampler_is_set() {
        let config = Config::default().with_traces_sample_rate(0.0);
        let header = format!("{}-{}-1", "a".repeat(32), "b".repeat(16));
        let ctx = TransactionContext::from_propagation(&header, &config).unwrap();
        assert_eq!(ctx.parent_sampled, Some(true));
        assert_eq!(ctx.sampled, None);

        let transaction = Transaction::new(ctx, hub());
        transaction.set_initial_sample_decision(&config, &FixedRandom(0.99));
        // Parent decision wins over the 0.0 fixed rate.
        assert_eq!(transaction.sampled(), Some(true));
    }

    #[test]
    fn propagation_header_round_trips_through_a_child_context() {
        let config = Config::default().with_traces_sample_rate(1.0);
        let transaction = Transaction::start(
            TransactionContext::new().with_op("http.server"),
            &config,
            hub(),
        );
        assert_eq!(transaction.sampled(), Some(true));

        let header = transaction.get_propagation_header();
        let child = TransactionContext::from_propagation(&header, &config).unwrap();
        assert_eq!(child.trace_id, transaction.trace_id());
        assert_eq!(child.parent_span_id, Some(transaction.span_id()));
        assert_eq!(child.parent_sampled, Some(true));
        assert_eq!(child.sampled, None);
        assert_ne!(child.span_id, transaction.span_id());
    }

    #[test]
    fn decoding_is_refused_when_tracing_is_disabled() {
        let header = format!("{}-{}-1", "a".repeat(32), "b".repeat(16));
        assert!(TransactionContext::from_propagation(&header, &Config::default()).is_none());
        assert!(TransactionContext::from_propagation("dummy", &Config::default()).is_none());
    }

    #[test]
    fn to_hash_projects_own_fields_without_side_effects() {
        let transaction = Transaction::new(
            TransactionContext::new()
                .with_op("http.server")
                .with_name("GET /orders")
                .with_sampled(true),
            hub(),
        );
        let hash = transaction.to_hash();
        assert_eq!(hash["op"], "http.server");
        assert_eq!(hash["name"], "GET /orders");
        assert_eq!(hash["sampled"], true);
        assert_eq!(hash["trace_id"], transaction.trace_id().to_string());
        assert!(hash.get("timestamp").is_none());
        // Pure projection: nothing was stamped or defaulted.
        assert!(!transaction.span().is_finished());
    }

    #[test]
    fn deep_clone_copies_the_tree_and_severs_all_sharing() {
        let hub = hub();
        let transaction = sampled_transaction(hub.clone());
        let first = transaction.start_child(SpanAttributes::new().with_description("first child"));
        transaction.start_child(SpanAttributes::new().with_description("second child"));

        let copy = transaction.deep_clone();
        let copy_snapshot = copy.span_snapshot();
        assert_eq!(copy_snapshot.len(), 3);
        assert_eq!(copy_snapshot[0].span_id, transaction.span_id());
        assert_eq!(copy_snapshot[1].description.as_deref(), Some("first child"));
        assert_eq!(copy_snapshot[2].description.as_deref(), Some("second child"));
        // Same identifiers, same values, at the moment of copy.
        assert_eq!(copy_snapshot, transaction.span_snapshot());

        // Mutations on the original are invisible to the copy.
        transaction.set_op("changed.op");
        first.set_description("changed child");
        assert_eq!(copy.op().as_deref(), Some("sql.query"));
        assert_eq!(
            copy.span_snapshot()[1].description.as_deref(),
            Some("first child")
        );

        // And the other way around.
        copy.set_op("copy.op");
        assert_eq!(transaction.op().as_deref(), Some("changed.op"));

        // New children on either side stay on that side.
        copy.start_child(SpanAttributes::new().with_description("copy only"));
        assert_eq!(copy.recorded_spans(), 4);
        assert_eq!(transaction.recorded_spans(), 3);
    }

    #[test]
    fn deep_clone_entry_zero_is_the_copy_itself() {
        let transaction = sampled_transaction(hub());
        let copy = transaction.deep_clone();
        let snapshot = copy.span_snapshot();
        assert_eq!(snapshot[0].span_id, copy.span_id());
        // The copy's own entry is its recorder's, not the original's.
        copy.set_status("internal_error");
        assert_eq!(copy.span_snapshot()[0].status.as_deref(), Some("internal_error"));
        assert_eq!(transaction.span_snapshot()[0].status, None);
    }

    #[test]
    fn children_can_start_concurrently() {
        let transaction = sampled_transaction(hub());
        let handles = (0..8)
            .map(|i| {
                let transaction = transaction.clone();
                std::thread::spawn(move || {
                    let span = transaction
                        .start_child(SpanAttributes::new().with_description(format!("child {i}")));
                    span.finish();
                    span.span_id()
                })
            })
            .collect::<Vec<_>>();
        let mut ids = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(transaction.recorded_spans(), 9);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn span_started_here_can_finish_elsewhere() {
        let hub = hub();
        let transaction = sampled_transaction(hub.clone());
        let span = transaction.start_child(SpanAttributes::new().with_op("io.read"));
        std::thread::spawn(move || span.finish()).join().unwrap();
        transaction.finish();
        assert!(hub.captured_events()[0].spans[0].timestamp.is_some());
    }

    #[test]
    fn duplication_scenario_from_the_wire() {
        let transaction = Transaction::new(
            TransactionContext::new().with_op("sql.query").with_sampled(true),
            hub(),
        );
        let first = transaction.start_child(SpanAttributes::new().with_description("first child"));
        let second =
            transaction.start_child(SpanAttributes::new().with_description("second child"));

        let copy = transaction.deep_clone();
        transaction.set_op("root.changed");

        assert_eq!(copy.op().as_deref(), Some("sql.query"));
        let snapshot = copy.span_snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].span_id, copy.span_id());
        assert_eq!(snapshot[1].span_id, first.span_id());
        assert_eq!(snapshot[2].span_id, second.span_id());
    }
}
