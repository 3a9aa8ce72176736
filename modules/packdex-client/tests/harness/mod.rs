//! Test harness: an in-process stand-in for the catalog backend.
//!
//! One route answers both plain GET and WebSocket upgrade, exactly like the
//! real search endpoint; a second serves per-id deep lookups. Tests script
//! the rows and counts, then assert against the instrumentation: lookup
//! hits, work items received over the channel, close codes.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use packdex_client::{CountUpdate, SearchService, WorkItem};

/// Wait for a running search to settle, bounded so a wedged protocol fails
/// the test instead of hanging it.
pub async fn settled(service: &dyn SearchService) {
    let mut loading = service.loading();
    tokio::time::timeout(Duration::from_secs(5), loading.wait_for(|l| !*l))
        .await
        .expect("search did not settle in time")
        .expect("loading flag channel closed");
}

/// A result row as the backend sends it: no client-side fields, plus the
/// relevance `distance` the client is expected to ignore.
#[derive(Debug, Clone, Serialize)]
pub struct WireRow {
    pub id: i64,
    pub name: String,
    pub count: i64,
    pub sha1: String,
    pub date: String,
    pub packages: i64,
    pub distance: i64,
}

impl WireRow {
    pub fn new(id: i64, name: &str, packages: i64) -> Self {
        Self {
            id,
            name: name.to_string(),
            count: 0,
            sha1: format!("{id:040x}"),
            date: format!("{} +0000 UTC", Utc::now().format("%Y-%m-%d %H:%M:%S")),
            packages,
            distance: 0,
        }
    }

    /// Shallow-phase count value (the untrusted one).
    pub fn with_count(mut self, count: i64) -> Self {
        self.count = count;
        self
    }
}

/// One frame of the scripted shallow stream.
#[derive(Debug, Clone)]
enum Frame {
    Row(WireRow),
    /// Sent verbatim, for exercising the client's bad-frame handling.
    Raw(String),
}

/// What the fake backend should serve.
#[derive(Debug, Clone, Default)]
pub struct CatalogScript {
    frames: Vec<Frame>,
    counts: HashMap<i64, i64>,
    fail_ids: HashSet<i64>,
    raw_replies: HashMap<i64, String>,
    stall_after: Option<usize>,
    fail_search: bool,
}

impl CatalogScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every search request with a 500 before any upgrade happens.
    pub fn fail_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn row(mut self, row: WireRow) -> Self {
        self.frames.push(Frame::Row(row));
        self
    }

    /// Inject a verbatim text frame into the shallow stream.
    pub fn raw_frame(mut self, payload: &str) -> Self {
        self.frames.push(Frame::Raw(payload.to_string()));
        self
    }

    /// Deep count returned for `id` by both the per-id lookup and the
    /// channel exchange. Unscripted ids count 0.
    pub fn deep_count(mut self, id: i64, count: i64) -> Self {
        self.counts.insert(id, count);
        self
    }

    /// Make the deep lookup for `id` fail: 500 over HTTP, a dead stream
    /// without a close handshake over the channel.
    pub fn fail_id(mut self, id: i64) -> Self {
        self.fail_ids.insert(id);
        self
    }

    /// Answer the channel request for `id` with this verbatim text instead
    /// of a well-formed count update.
    pub fn raw_reply(mut self, id: i64, payload: &str) -> Self {
        self.raw_replies.insert(id, payload.to_string());
        self
    }

    /// Stream only the first `frames` frames, then hold the channel open
    /// silently. Never sends the terminal total.
    pub fn stall_after(mut self, frames: usize) -> Self {
        self.stall_after = Some(frames);
        self
    }

    fn wire_rows(&self) -> Vec<WireRow> {
        self.frames
            .iter()
            .filter_map(|f| match f {
                Frame::Row(row) => Some(row.clone()),
                Frame::Raw(_) => None,
            })
            .collect()
    }
}

/// A search request as the handler saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub query: String,
    pub method: String,
    pub depth: String,
    pub auto: Option<String>,
    pub websocket: bool,
}

#[derive(Default)]
struct CatalogState {
    script: CatalogScript,
    requests: Mutex<Vec<RecordedRequest>>,
    detail_hits: Mutex<HashMap<i64, usize>>,
    work_items: Mutex<Vec<WorkItem>>,
    close_code: Mutex<Option<u16>>,
}

/// Handle to a running fake backend. The server task lives until the test
/// runtime shuts down.
pub struct MockCatalog {
    addr: SocketAddr,
    state: Arc<CatalogState>,
}

impl MockCatalog {
    pub async fn start(script: CatalogScript) -> Self {
        let state = Arc::new(CatalogState {
            script,
            ..Default::default()
        });

        let app = Router::new()
            .route("/api/container/search", get(container_search))
            .route("/api/container/{id}", get(container_detail))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock catalog");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock catalog");
        });

        Self { addr, state }
    }

    /// Bare `host:port` for feeding the client factory.
    pub fn host(&self) -> String {
        format!("127.0.0.1:{}", self.addr.port())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// How many times the per-id deep lookup was hit for `id`.
    pub fn detail_hits(&self, id: i64) -> usize {
        self.state
            .detail_hits
            .lock()
            .unwrap()
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_detail_hits(&self) -> usize {
        self.state.detail_hits.lock().unwrap().values().sum()
    }

    /// Work items received over the channel, in arrival order.
    pub fn work_items(&self) -> Vec<WorkItem> {
        self.state.work_items.lock().unwrap().clone()
    }

    pub fn close_code(&self) -> Option<u16> {
        *self.state.close_code.lock().unwrap()
    }

    /// The close frame lands a beat after the client settles; poll briefly.
    pub async fn wait_for_close_code(&self) -> Option<u16> {
        for _ in 0..200 {
            if let Some(code) = self.close_code() {
                return Some(code);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
    #[serde(default)]
    method: String,
    #[serde(default)]
    depth: String,
    auto: Option<String>,
}

async fn container_search(
    State(state): State<Arc<CatalogState>>,
    Query(params): Query<SearchParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    // A plain GET fails the upgrade extraction; that is the JSON branch.
    let ws = ws.ok();

    state.requests.lock().unwrap().push(RecordedRequest {
        query: params.query.clone(),
        method: params.method.clone(),
        depth: params.depth.clone(),
        auto: params.auto.clone(),
        websocket: ws.is_some(),
    });

    if state.script.fail_search {
        return (StatusCode::INTERNAL_SERVER_ERROR, "error searching for archive").into_response();
    }

    match ws {
        Some(upgrade) => {
            let auto = matches!(params.auto.as_deref(), Some("true") | Some("1"));
            upgrade
                .on_upgrade(move |socket| stream_search(state, socket, auto))
                .into_response()
        }
        None => Json(state.script.wire_rows()).into_response(),
    }
}

async fn stream_search(state: Arc<CatalogState>, mut socket: WebSocket, auto: bool) {
    // The real backend pings throughout to keep the connection alive;
    // interleaving a few here pins down that the client tolerates them.
    if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
        return;
    }

    let limit = state.script.stall_after.unwrap_or(state.script.frames.len());
    for frame in state.script.frames.iter().take(limit) {
        let payload = match frame {
            Frame::Row(row) => serde_json::to_string(row).expect("row serializes"),
            Frame::Raw(payload) => payload.clone(),
        };
        if socket.send(Message::Text(payload.into())).await.is_err() {
            return;
        }
    }

    if state.script.stall_after.is_some() {
        // Hold the channel open without ever finishing the listing.
        loop {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                return;
            }
        }
    }

    let total = state.script.wire_rows().len();
    if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
        return;
    }
    if socket
        .send(Message::Text(total.to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    // Enrichment: answer one request at a time until the client closes.
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => {
                if !auto {
                    continue;
                }
                let Ok(item) = serde_json::from_str::<WorkItem>(text.as_str()) else {
                    continue;
                };
                state.work_items.lock().unwrap().push(item);

                if state.script.fail_ids.contains(&item.id) {
                    // Lookup failure kills the stream with no close frame.
                    return;
                }

                if let Some(payload) = state.script.raw_replies.get(&item.id) {
                    if socket.send(Message::Text(payload.clone().into())).await.is_err() {
                        return;
                    }
                    continue;
                }

                let count = state.script.counts.get(&item.id).copied().unwrap_or(0);
                let update = CountUpdate {
                    index: item.index,
                    id: item.id,
                    count,
                };
                let payload = serde_json::to_string(&update).expect("update serializes");
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    return;
                }
            }
            Message::Close(frame) => {
                *state.close_code.lock().unwrap() = frame.map(|f| f.code);
                return;
            }
            _ => {}
        }
    }
}

async fn container_detail(State(state): State<Arc<CatalogState>>, Path(id): Path<i64>) -> Response {
    *state.detail_hits.lock().unwrap().entry(id).or_insert(0) += 1;

    if state.script.fail_ids.contains(&id) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "error counting files").into_response();
    }

    let count = state.script.counts.get(&id).copied().unwrap_or(0);
    Json(serde_json::json!({
        "count": count,
        "date": format!("{} +0000 UTC", Utc::now().format("%Y-%m-%d %H:%M:%S")),
        "license": "MIT",
        "rationale": "",
        "archives": [],
    }))
    .into_response()
}
