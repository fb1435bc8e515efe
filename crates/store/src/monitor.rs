//! In-memory error monitor.
//!
//! Keeps the most recent errors in a bounded FIFO buffer, groups them into a
//! fixed taxonomy and notifies subscribers as they arrive. When the buffer is
//! full the oldest record is dropped.

use std::collections::{BTreeMap, VecDeque};
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Serialize;
use uuid::Uuid;

use crate::error::StoreError;

/// Default number of records kept.
pub const DEFAULT_CAPACITY: usize = 50;

/// Error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Timeout,
    Cancelled,
    Network,
    /// 401
    Auth,
    /// 403
    Permission,
    /// 404
    NotFound,
    /// 5xx
    Server,
    /// Other 4xx
    Client,
    Unknown,
}

impl ErrorCategory {
    /// Map an HTTP status to a category.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            401 => Self::Auth,
            403 => Self::Permission,
            404 => Self::NotFound,
            408 => Self::Timeout,
            500..=599 => Self::Server,
            400..=499 => Self::Client,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Network => "NETWORK",
            Self::Auth => "AUTH",
            Self::Permission => "PERMISSION",
            Self::NotFound => "NOT_FOUND",
            Self::Server => "SERVER",
            Self::Client => "CLIENT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorize an error by walking its source chain.
///
/// The first link that says something definite wins.
#[must_use]
pub fn categorize(err: &(dyn StdError + 'static)) -> ErrorCategory {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(link) = current {
        if let Some(category) = categorize_link(link) {
            return category;
        }
        current = link.source();
    }
    ErrorCategory::Unknown
}

fn categorize_link(err: &(dyn StdError + 'static)) -> Option<ErrorCategory> {
    if let Some(store) = err.downcast_ref::<StoreError>() {
        return match store {
            StoreError::Api { status, .. } => Some(ErrorCategory::from_status(*status)),
            // Defer to the wrapped error.
            StoreError::Http(_) | StoreError::Storage(_) => None,
            _ => Some(ErrorCategory::Unknown),
        };
    }
    if let Some(http) = err.downcast_ref::<reqwest::Error>() {
        if http.is_timeout() {
            return Some(ErrorCategory::Timeout);
        }
        if let Some(status) = http.status() {
            return Some(ErrorCategory::from_status(status));
        }
        if http.is_connect() || http.is_request() || http.is_body() {
            return Some(ErrorCategory::Network);
        }
        return None;
    }
    if let Some(join) = err.downcast_ref::<tokio::task::JoinError>() {
        return join.is_cancelled().then_some(ErrorCategory::Cancelled);
    }
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        return match io_err.kind() {
            io::ErrorKind::TimedOut => Some(ErrorCategory::Timeout),
            io::ErrorKind::Interrupted => Some(ErrorCategory::Cancelled),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable => Some(ErrorCategory::Network),
            _ => None,
        };
    }
    None
}

/// One captured error.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Source chain, one cause per line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub context: BTreeMap<String, String>,
    #[serde(rename = "type")]
    pub category: ErrorCategory,
}

/// Counts of buffered records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorStats {
    pub total: usize,
    pub by_category: BTreeMap<ErrorCategory, usize>,
}

/// Handle returned by [`ErrorMonitor::on_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ErrorRecord) + Send + Sync>;

/// Bounded error buffer with subscribers.
pub struct ErrorMonitor {
    capacity: usize,
    records: RwLock<VecDeque<ErrorRecord>>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl fmt::Debug for ErrorMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorMonitor")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for ErrorMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ErrorMonitor {
    /// Create a monitor keeping at most `capacity` records (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: RwLock::new(VecDeque::with_capacity(capacity)),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().map_or(0, |records| records.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Categorize, record and broadcast an error.
    pub fn capture(
        &self,
        err: &(dyn StdError + 'static),
        context: BTreeMap<String, String>,
    ) -> ErrorRecord {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        let stack = (!causes.is_empty()).then(|| causes.join("\n"));

        self.push(ErrorRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            message: err.to_string(),
            stack,
            context,
            category: categorize(err),
        })
    }

    /// Record a report that is not a Rust error value.
    pub fn record_message(
        &self,
        message: impl Into<String>,
        category: ErrorCategory,
        context: BTreeMap<String, String>,
    ) -> ErrorRecord {
        self.push(ErrorRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            message: message.into(),
            stack: None,
            context,
            category,
        })
    }

    fn push(&self, record: ErrorRecord) -> ErrorRecord {
        tracing::error!(
            error_id = %record.id,
            category = %record.category,
            context = ?record.context,
            "{}",
            record.message
        );

        if let Ok(mut records) = self.records.write() {
            while records.len() >= self.capacity {
                records.pop_front();
            }
            records.push_back(record.clone());
        }

        // Snapshot so listeners can (un)subscribe from inside a callback.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .map(|l| l.iter().map(|(_, f)| Arc::clone(f)).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(&record);
        }

        record
    }

    /// Subscribe to new records.
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ErrorRecord) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push((id, Arc::new(listener)));
        }
        id
    }

    /// Unsubscribe. Returns whether the listener existed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.write().is_ok_and(|mut listeners| {
            let before = listeners.len();
            listeners.retain(|(existing, _)| *existing != id);
            listeners.len() != before
        })
    }

    /// The last `n` records, oldest first.
    #[must_use]
    pub fn recent_errors(&self, n: usize) -> Vec<ErrorRecord> {
        self.records.read().map_or_else(
            |_| Vec::new(),
            |records| {
                let skip = records.len().saturating_sub(n);
                records.iter().skip(skip).cloned().collect()
            },
        )
    }

    /// Counts of buffered records grouped by category.
    #[must_use]
    pub fn stats(&self) -> ErrorStats {
        let Ok(records) = self.records.read() else {
            return ErrorStats::default();
        };
        let mut by_category = BTreeMap::new();
        for record in records.iter() {
            *by_category.entry(record.category).or_insert(0) += 1;
        }
        ErrorStats {
            total: records.len(),
            by_category,
        }
    }

    /// Drop all buffered records. Listeners stay subscribed.
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.write() {
            records.clear();
        }
    }
}

/// A listener that forwards records to Sentry.
///
/// Each record becomes a breadcrumb and a captured message, tagged with its
/// category. Has no effect unless Sentry has been initialized.
#[must_use]
pub fn sentry_forwarder() -> impl Fn(&ErrorRecord) + Send + Sync + 'static {
    |record: &ErrorRecord| {
        let mut breadcrumb = sentry::Breadcrumb {
            category: Some("collections".to_string()),
            message: Some(record.message.clone()),
            level: sentry::Level::Error,
            ..Default::default()
        };
        for (key, value) in &record.context {
            breadcrumb
                .data
                .insert(key.clone(), serde_json::Value::String(value.clone()));
        }
        sentry::add_breadcrumb(breadcrumb);

        sentry::with_scope(
            |scope| scope.set_tag("error_category", record.category.as_str()),
            || sentry::capture_message(&record.message, sentry::Level::Error),
        );
    }
}

/// Build a context map from string pairs.
#[must_use]
pub fn context<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
