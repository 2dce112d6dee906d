//! Debounced history wrapper.
//!
//! Bursts of `update` calls (a redirect chain, a presenter re-navigating on
//! load) collapse into a single push of the latest producer once the window
//! has been quiet. Outside a tokio runtime updates are forwarded immediately.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{ChangeListener, History, TokenProducer};

#[derive(Default)]
struct Pending {
    producer: Option<TokenProducer>,
    /// Bumped on every update; only the task holding the latest value flushes.
    generation: u64,
}

pub struct DebouncedHistory<H: History + ?Sized> {
    inner: Arc<H>,
    window: Duration,
    pending: Arc<Mutex<Pending>>,
}

impl<H: History> DebouncedHistory<H> {
    pub fn new(inner: H, window: Duration) -> Self {
        Self::from_arc(Arc::new(inner), window)
    }
}

impl<H: History + ?Sized> DebouncedHistory<H> {
    /// Wrap a shared channel, keeping the caller's handle usable.
    pub fn from_arc(inner: Arc<H>, window: Duration) -> Self {
        Self {
            inner,
            window,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    pub fn inner(&self) -> &Arc<H> {
        &self.inner
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().producer.is_some()
    }

    /// Forward the pending producer now, if any.
    pub fn flush(&self) {
        let producer = self.pending.lock().producer.take();
        if let Some(producer) = producer {
            self.inner.update(producer);
        }
    }
}

impl<H: History + ?Sized> History for DebouncedHistory<H> {
    fn location(&self) -> String {
        self.inner.location()
    }

    fn update(&self, producer: TokenProducer) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.pending.lock().producer = None;
            self.inner.update(producer);
            return;
        };

        let generation = {
            let mut pending = self.pending.lock();
            pending.producer = Some(producer);
            pending.generation += 1;
            pending.generation
        };

        let pending = Arc::clone(&self.pending);
        let inner = Arc::clone(&self.inner);
        let window = self.window;
        runtime.spawn(async move {
            tokio::time::sleep(window).await;
            let producer = {
                let mut pending = pending.lock();
                if pending.generation != generation {
                    return;
                }
                pending.producer.take()
            };
            if let Some(producer) = producer {
                inner.update(producer);
            }
        });
    }

    fn set_on_change(&self, listener: Option<ChangeListener>) {
        self.inner.set_on_change(listener)
    }
}

impl<H: History + std::fmt::Debug + ?Sized> std::fmt::Debug for DebouncedHistory<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedHistory")
            .field("inner", &self.inner)
            .field("window", &self.window)
            .field("pending", &self.has_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn produce(token: &str, calls: &Arc<AtomicUsize>) -> TokenProducer {
        let token = token.to_string();
        let calls = Arc::clone(calls);
        Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Some(token.clone())
        })
    }

    #[tokio::test]
    async fn test_burst_is_coalesced() {
        let memory = Arc::new(MemoryHistory::new());
        let history = DebouncedHistory::from_arc(Arc::clone(&memory), Duration::from_millis(20));
        let calls = Arc::new(AtomicUsize::new(0));

        history.update(produce("a", &calls));
        history.update(produce("b", &calls));
        history.update(produce("c", &calls));
        assert!(history.has_pending());
        assert_eq!(memory.location(), "");

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(memory.entries(), vec!["", "c"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!history.has_pending());
    }

    #[tokio::test]
    async fn test_flush_pushes_immediately() {
        let memory = Arc::new(MemoryHistory::new());
        let history = DebouncedHistory::from_arc(Arc::clone(&memory), Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        history.update(produce("cart", &calls));
        history.flush();
        assert_eq!(memory.location(), "cart");
        history.flush();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_without_runtime_forwards_directly() {
        let memory = Arc::new(MemoryHistory::new());
        let history = DebouncedHistory::from_arc(Arc::clone(&memory), Duration::from_millis(16));
        let calls = Arc::new(AtomicUsize::new(0));
        history.update(produce("login", &calls));
        assert_eq!(memory.location(), "login");
    }
}
