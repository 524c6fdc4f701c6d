//! Request history.
//!
//! Every call to [`HttpClient::request`](crate::http::client::HttpClient::request)
//! leaves exactly one entry here, most recent first.

use std::collections::VecDeque;
use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::http::method::HttpMethod;

/// Maximum number of history entries to retain.
pub const MAX_HISTORY_ENTRIES: usize = 100;

/// A single history entry recording a past request and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub method: HttpMethod,
    pub url: String,
    pub status: HistoryStatus,
    pub response_time: u64,
    pub error: Option<String>,
}

impl HistoryEntry {
    pub fn completed(method: HttpMethod, url: impl Into<String>, status: u16, response_time: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            method,
            url: url.into(),
            status: HistoryStatus::Code(status),
            response_time,
            error: None,
        }
    }

    pub fn failed(method: HttpMethod, url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            method,
            url: url.into(),
            status: HistoryStatus::Error,
            response_time: 0,
            error: Some(error.into()),
        }
    }
}

/// Status column of a history entry: the HTTP status, or `"Error"` when the
/// request never produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStatus {
    Code(u16),
    Error,
}

impl HistoryStatus {
    pub fn code(self) -> Option<u16> {
        match self {
            HistoryStatus::Code(code) => Some(code),
            HistoryStatus::Error => None,
        }
    }
}

impl Display for HistoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryStatus::Code(code) => write!(f, "{code}"),
            HistoryStatus::Error => write!(f, "Error"),
        }
    }
}

impl Serialize for HistoryStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HistoryStatus::Code(code) => serializer.serialize_u16(*code),
            HistoryStatus::Error => serializer.serialize_str("Error"),
        }
    }
}

impl<'de> Deserialize<'de> for HistoryStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Code(u16),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Code(code) => Ok(HistoryStatus::Code(code)),
            Repr::Text(text) if text == "Error" => Ok(HistoryStatus::Error),
            Repr::Text(text) => Err(serde::de::Error::custom(format!(
                "invalid history status `{text}`"
            ))),
        }
    }
}

/// Bounded request history, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Builds a history from entries ordered most recent first, keeping at
    /// most [`MAX_HISTORY_ENTRIES`].
    pub fn from_entries(entries: impl IntoIterator<Item = HistoryEntry>) -> Self {
        Self {
            entries: entries.into_iter().take(MAX_HISTORY_ENTRIES).collect(),
        }
    }

    /// Add an entry to the front of the history list, evicting the oldest
    /// entry if the list exceeds the maximum size.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(MAX_HISTORY_ENTRIES);
    }

    pub fn entries(&self) -> &VecDeque<HistoryEntry> {
        &self.entries
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
