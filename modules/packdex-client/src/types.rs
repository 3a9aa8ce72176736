use serde::{Deserialize, Serialize};

// --- Result rows ---

/// How much of a row the backend has filled in.
///
/// Rows arrive `Shallow` from the listing phase; the enrichment phase
/// promotes them to `Deep` one at a time. `count` is only trustworthy on a
/// `Deep` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    #[default]
    Shallow,
    Deep,
}

impl std::fmt::Display for Depth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Depth::Shallow => write!(f, "shallow"),
            Depth::Deep => write!(f, "deep"),
        }
    }
}

/// A single package hit in a result list.
///
/// Wire rows carry only the backend fields; `loading` and `depth` are
/// client-side bookkeeping and deserialize to their defaults. `loading` is
/// the per-row in-flight bit: while it is set, exactly one enrichment
/// request owns the row and nobody else may issue another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRow {
    /// Backend identifier. Non-positive ids are placeholders and are never
    /// sent for enrichment.
    pub id: i64,
    pub name: String,
    /// Deep file count. Meaningless until `depth` is `Deep`.
    pub count: i64,
    /// Content fingerprint of the package.
    pub sha1: String,
    /// Insertion timestamp, in whatever format the backend prints it.
    pub date: String,
    /// Aggregate sub-package count from the shallow index.
    pub packages: i64,
    #[serde(default)]
    pub loading: bool,
    #[serde(default)]
    pub depth: Depth,
}

// --- Streaming wire protocol ---

/// One inbound frame during the shallow phase of a streaming search.
///
/// The backend streams result objects one per frame, then a bare number:
/// the total row count, which doubles as the end-of-listing marker.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProgressMessage {
    Row(PackageRow),
    Total(i64),
}

/// Client -> server enrichment request: compute the deep count for the row
/// at `index`. At most one of these is ever outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub index: usize,
    pub id: i64,
}

/// Server -> client enrichment response. Echoes the request's `index` and
/// `id` and carries the computed count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountUpdate {
    pub index: usize,
    pub id: i64,
    pub count: i64,
}

// --- Query parameters ---

/// Server-side match algorithm for the listing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMethod {
    #[default]
    Fast,
    Like,
    Levenshtein,
}

impl SearchMethod {
    /// Wire value for the `method` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::Fast => "fast",
            SearchMethod::Like => "like",
            SearchMethod::Levenshtein => "levenshtein",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "like" => Self::Like,
            "levenshtein" => Self::Levenshtein,
            _ => Self::Fast,
        }
    }
}

impl std::fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
