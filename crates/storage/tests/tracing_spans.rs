//! Integration test verifying that `#[instrument]` annotations produce
//! the expected spans on `MemoryBackend` operations, and that degraded
//! `StoreClient` calls emit a warning event.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use tracing::{Level, Subscriber};
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};
use warden_storage::{MemoryBackend, StorageBackend, StoreClient, testutil::FailingBackend};

// ---------------------------------------------------------------------------
// Collecting layer: records span names as they are created and the levels of
// emitted events
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Collector {
    spans: Arc<Mutex<Vec<String>>>,
    events: Arc<Mutex<Vec<Level>>>,
}

impl<S> tracing_subscriber::Layer<S> for Collector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
    }

    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        self.events.lock().expect("lock poisoned").push(*event.metadata().level());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn memory_backend_set_creates_span() {
    let collector = Collector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let backend = MemoryBackend::new();
    backend.set("key-1", b"value-1".to_vec()).await.expect("set should succeed");

    let recorded = spans.lock().expect("lock poisoned");
    assert!(recorded.iter().any(|s| s == "set"), "expected a 'set' span, got: {recorded:?}");
}

#[tokio::test]
async fn memory_backend_get_and_keys_create_spans() {
    let collector = Collector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let backend = MemoryBackend::new();
    let _ = backend.get("missing").await;
    let _ = backend.keys("audit:").await;

    let recorded = spans.lock().expect("lock poisoned");
    assert!(recorded.iter().any(|s| s == "get"), "expected a 'get' span, got: {recorded:?}");
    assert!(recorded.iter().any(|s| s == "keys"), "expected a 'keys' span, got: {recorded:?}");
}

#[tokio::test]
async fn memory_backend_delete_creates_span() {
    let collector = Collector::default();
    let spans = Arc::clone(&collector.spans);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let backend = MemoryBackend::new();
    backend.delete("key").await.expect("delete should succeed");

    let recorded = spans.lock().expect("lock poisoned");
    assert!(recorded.iter().any(|s| s == "delete"), "expected a 'delete' span, got: {recorded:?}");
}

#[tokio::test]
async fn degraded_client_call_emits_warning() {
    let collector = Collector::default();
    let events = Arc::clone(&collector.events);

    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let store = StoreClient::new(Arc::new(FailingBackend::new()));
    assert!(!store.exists("account_locked:email:a@x.com").await);

    let recorded = events.lock().expect("lock poisoned");
    assert!(recorded.contains(&Level::WARN), "expected a WARN event, got: {recorded:?}");
}
