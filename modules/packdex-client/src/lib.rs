//! Progressive search client for a package-catalog backend.
//!
//! A search fills a caller-owned [`ResultList`] in two phases: a cheap
//! shallow listing for immediate display, then per-row deep file counts
//! filled in behind it. Two transports implement the one [`SearchService`]
//! contract: discrete HTTP polling and a persistent WebSocket channel.

pub mod config;
pub mod error;
pub mod polling;
pub mod results;
pub mod service;
pub mod streaming;
pub mod types;

pub use config::SearchConfig;
pub use error::{Result, SearchError};
pub use polling::PollingSearchService;
pub use results::ResultList;
pub use service::{new_search_service, SearchService};
pub use streaming::StreamingSearchService;
pub use types::{CountUpdate, Depth, PackageRow, ProgressMessage, SearchMethod, WorkItem};
