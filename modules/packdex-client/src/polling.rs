//! Request/response transport: one listing GET, then a sequential
//! enrichment sweep of discrete per-row lookups.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Result, SearchError};
use crate::results::ResultList;
use crate::service::{LoadingFlag, SearchService};
use crate::types::{Depth, PackageRow, SearchMethod};

/// Subset of the per-id lookup body this strategy reads. The backend also
/// returns dates, license text and archive metadata; only the deep count
/// matters here.
#[derive(Debug, Deserialize)]
struct ContainerDetail {
    count: i64,
}

/// Searches over plain HTTP. The listing is a single GET; enrichment is
/// one GET per row, strictly sequential, each awaited before the next row
/// is considered.
#[derive(Clone)]
pub struct PollingSearchService {
    client: reqwest::Client,
    base_url: String,
    method: SearchMethod,
    loading: LoadingFlag,
}

impl PollingSearchService {
    pub fn new(host: &str) -> Self {
        Self::with_timeout(host, Duration::from_secs(30))
    }

    /// Construct with a non-default per-request timeout.
    pub fn with_timeout(host: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: format!("http://{}", host.trim_end_matches('/')),
            method: SearchMethod::default(),
            loading: LoadingFlag::new(),
        }
    }

    /// Switch the listing phase to a different server-side match algorithm.
    pub fn with_method(mut self, method: SearchMethod) -> Self {
        self.method = method;
        self
    }

    async fn run(&self, destination: ResultList, query: &str, autofill: bool) {
        info!(query, autofill, "Starting package search");

        match self.fetch_shallow(query).await {
            Ok(rows) => {
                info!(rows = rows.len(), "Listing complete");
                destination.replace_all(rows);
                if autofill {
                    self.update_counts(&destination).await;
                }
            }
            Err(e) => {
                warn!(query, error = %e, "Package search failed");
            }
        }

        self.loading.set(false);
    }

    /// Listing phase: fetch the whole shallow batch in one request.
    async fn fetch_shallow(&self, query: &str) -> Result<Vec<PackageRow>> {
        let url = format!("{}/api/container/search", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("method", self.method.as_str()),
                ("query", query),
                ("depth", "shallow"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let mut rows: Vec<PackageRow> = resp.json().await?;
        for row in &mut rows {
            row.depth = Depth::Shallow;
        }
        Ok(rows)
    }

    /// Enrichment sweep: walk the list by index, claim each eligible row,
    /// fetch its deep count, and move on. A failed row is released back to
    /// shallow and the sweep continues.
    async fn update_counts(&self, destination: &ResultList) {
        for index in 0..destination.len() {
            let Some(id) = destination.claim(index) else {
                continue;
            };

            match self.fetch_count(id).await {
                Ok(count) => {
                    destination.complete(index, count);
                    debug!(index, id, count, "Row enriched");
                }
                Err(e) => {
                    destination.release(index);
                    warn!(index, id, error = %e, "Deep count fetch failed");
                }
            }
        }
    }

    async fn fetch_count(&self, id: i64) -> Result<i64> {
        let url = format!("{}/api/container/{id}", self.base_url);
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let detail: ContainerDetail = resp.json().await?;
        Ok(detail.count)
    }
}

impl SearchService for PollingSearchService {
    fn search(&self, destination: ResultList, query: &str, autofill: bool) {
        self.loading.set(true);

        let service = self.clone();
        let query = query.to_string();
        tokio::spawn(async move {
            service.run(destination, &query, autofill).await;
        });
    }

    fn loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    fn is_loading(&self) -> bool {
        self.loading.get()
    }
}
