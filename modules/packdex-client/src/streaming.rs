//! Persistent-channel transport: one WebSocket carries the listing stream
//! and then an alternating, single-flight enrichment exchange.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, SearchError};
use crate::results::ResultList;
use crate::service::{LoadingFlag, SearchService};
use crate::types::{CountUpdate, Depth, ProgressMessage, SearchMethod, WorkItem};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Which half of the protocol the channel is in. One read loop serves
/// both; the phase decides how an inbound text frame decodes.
#[derive(Debug, Clone, Copy)]
enum Phase {
    /// Listing rows are streaming in, ending at the bare-number total.
    Shallow,
    /// Alternating enrichment. The server speaks only when spoken to and
    /// the client only in direct response, so at most one request is ever
    /// outstanding.
    Enrichment,
}

/// Searches over a single WebSocket per invocation. Rows appear one frame
/// at a time; with autofill the same channel then carries the deep-count
/// exchange until every reachable row is enriched.
#[derive(Clone)]
pub struct StreamingSearchService {
    host: String,
    method: SearchMethod,
    idle_timeout: Duration,
    loading: LoadingFlag,
}

impl StreamingSearchService {
    pub fn new(host: &str) -> Self {
        Self::with_timeout(host, Duration::from_secs(30))
    }

    /// Construct with a non-default idle timeout. It bounds connecting and
    /// every wait for an inbound frame; expiry abandons the invocation the
    /// same way a network error does.
    pub fn with_timeout(host: &str, idle_timeout: Duration) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            method: SearchMethod::default(),
            idle_timeout,
            loading: LoadingFlag::new(),
        }
    }

    /// Switch the listing phase to a different server-side match algorithm.
    pub fn with_method(mut self, method: SearchMethod) -> Self {
        self.method = method;
        self
    }

    async fn run(&self, destination: ResultList, query: &str, autofill: bool) {
        info!(query, autofill, "Starting streaming package search");

        match self.drive(&destination, query, autofill).await {
            Ok(()) => info!(rows = destination.len(), "Streaming search settled"),
            Err(e) => warn!(query, error = %e, "Streaming search failed"),
        }

        self.loading.set(false);
    }

    async fn drive(&self, destination: &ResultList, query: &str, autofill: bool) -> Result<()> {
        let url = self.search_url(query, autofill)?;
        let (mut ws, _response) = timeout(self.idle_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| SearchError::Timeout("connecting to the search channel".to_string()))??;
        debug!(url = %url, "Channel open");

        self.run_channel(destination, &mut ws, autofill).await
    }

    fn search_url(&self, query: &str, autofill: bool) -> Result<Url> {
        let mut url = Url::parse(&format!("ws://{}/api/container/search", self.host))
            .map_err(|e| SearchError::Network(format!("invalid host {:?}: {e}", self.host)))?;
        url.query_pairs_mut()
            .append_pair("method", self.method.as_str())
            .append_pair("query", query)
            .append_pair("depth", "shallow")
            .append_pair("auto", if autofill { "true" } else { "false" });
        Ok(url)
    }

    async fn run_channel(
        &self,
        destination: &ResultList,
        ws: &mut WsStream,
        autofill: bool,
    ) -> Result<()> {
        let mut phase = Phase::Shallow;

        loop {
            let text = match self.next_text_frame(ws).await? {
                Some(text) => text,
                None => return Ok(()),
            };

            match phase {
                Phase::Shallow => match serde_json::from_str::<ProgressMessage>(text.as_str()) {
                    Ok(ProgressMessage::Row(mut row)) => {
                        // Real hits are normalized into the claimable state;
                        // placeholder rows pass through as received.
                        if row.id > 0 && row.packages > 0 {
                            row.depth = Depth::Shallow;
                            row.loading = false;
                        }
                        debug!(id = row.id, name = %row.name, "Listing row received");
                        destination.push(row);
                    }
                    Ok(ProgressMessage::Total(total)) => {
                        info!(total, rows = destination.len(), "Listing complete");
                        if !autofill {
                            return close(ws).await;
                        }
                        // Entry scan: claim the first enrichable row and open
                        // the exchange, or finish when nothing qualifies.
                        match destination.claim_next(0) {
                            Some(item) => {
                                send_work_item(ws, item).await?;
                                phase = Phase::Enrichment;
                            }
                            None => return close(ws).await,
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, frame = text.as_str(), "Dropping undecodable listing frame");
                    }
                },
                Phase::Enrichment => match serde_json::from_str::<CountUpdate>(text.as_str()) {
                    Ok(update) => {
                        if !destination.complete(update.index, update.count) {
                            warn!(
                                index = update.index,
                                id = update.id,
                                "Count update for a row that does not exist"
                            );
                            continue;
                        }
                        debug!(
                            index = update.index,
                            id = update.id,
                            count = update.count,
                            "Row enriched"
                        );
                        // The scan resumes strictly after the row just
                        // settled; earlier indices are never revisited.
                        match destination.claim_next(update.index + 1) {
                            Some(item) => send_work_item(ws, item).await?,
                            None => return close(ws).await,
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, frame = text.as_str(), "Dropping undecodable count frame");
                    }
                },
            }
        }
    }

    /// Wait for the next text frame, or `None` when the server ends the
    /// channel. The idle deadline covers the whole wait: keepalive pings
    /// keep the socket warm but are not protocol progress, so they do not
    /// extend it.
    async fn next_text_frame(&self, ws: &mut WsStream) -> Result<Option<Utf8Bytes>> {
        let deadline = Instant::now() + self.idle_timeout;
        loop {
            let frame = match timeout_at(deadline, ws.next()).await {
                Ok(Some(frame)) => frame?,
                Ok(None) => {
                    debug!("Channel ended by the server");
                    return Ok(None);
                }
                Err(_) => {
                    return Err(SearchError::Timeout(format!(
                        "no server frame within {:?}",
                        self.idle_timeout
                    )));
                }
            };

            match frame {
                Message::Text(text) => return Ok(Some(text)),
                // The server pings every second to keep the connection
                // alive; the transport answers the pongs on its own.
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(frame) => {
                    debug!(?frame, "Server closed the channel");
                    return Ok(None);
                }
                other => {
                    debug!(?other, "Ignoring non-text frame");
                    continue;
                }
            }
        }
    }
}

async fn send_work_item(ws: &mut WsStream, item: WorkItem) -> Result<()> {
    debug!(index = item.index, id = item.id, "Requesting deep count");
    let payload = serde_json::to_string(&item)?;
    ws.send(Message::Text(payload.into())).await?;
    Ok(())
}

/// Normal-completion close, code 1000. The server holds its end open until
/// it sees this.
async fn close(ws: &mut WsStream) -> Result<()> {
    ws.close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }))
    .await?;
    Ok(())
}

impl SearchService for StreamingSearchService {
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
