// Search contract + strategy factory.
//
// Callers hold an Arc<dyn SearchService> and never learn which transport
// is behind it. Production picks the strategy once at startup from
// deployment config; tests construct the concrete types directly.

use std::sync::Arc;

use tokio::sync::watch;

use crate::polling::PollingSearchService;
use crate::results::ResultList;
use crate::streaming::StreamingSearchService;

/// Trait boundary for running package searches.
///
/// `search` is fire-and-forget: it flips the loading flag, hands the rest
/// to a spawned task, and returns. Progress lands in `destination`;
/// completion is the flag settling back to false. No failure ever reaches
/// the caller. Failed invocations log, leave whatever rows they managed
/// to fill, and still settle the flag.
pub trait SearchService: Send + Sync {
    /// Start a search into `destination`. With `autofill` the invocation
    /// keeps going after the listing and fills in each row's deep count.
    /// Requires a running tokio runtime.
    fn search(&self, destination: ResultList, query: &str, autofill: bool);

    /// Watch the loading flag: true from the moment `search` is invoked
    /// until all network activity for that invocation settles.
    fn loading(&self) -> watch::Receiver<bool>;

    /// Current value of the loading flag.
    fn is_loading(&self) -> bool;
}

/// Pick a transport for the deployment: the persistent WebSocket channel
/// when `use_streaming` is set, discrete HTTP polling otherwise. `host` is
/// a bare `host[:port]`; each strategy derives its own scheme from it.
pub fn new_search_service(use_streaming: bool, host: &str) -> Arc<dyn SearchService> {
    if use_streaming {
        tracing::info!(host, "Using streaming package search");
        Arc::new(StreamingSearchService::new(host))
    } else {
        Arc::new(PollingSearchService::new(host))
    }
}

// ---------------------------------------------------------------------------
// LoadingFlag
// ---------------------------------------------------------------------------

/// The observable loading flag both strategies report through.
///
/// Wraps a watch channel so observers can poll the current value or await
/// transitions. Subscribing after a change still sees the latest value.
#[derive(Clone)]
pub(crate) struct LoadingFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl LoadingFlag {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn set(&self, value: bool) {
        self.tx.send_replace(value);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub(crate) fn get(&self) -> bool {
        *self.tx.borrow()
    }
}
