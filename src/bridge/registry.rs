//! Pending-request registry.
//!
//! Maps each in-flight correlation token to the caller's result channel and
//! the descriptor it was sent with. Every entry is resolved at most once.

use crate::base::neterror::NetError;
use crate::bridge::message::{RequestDescriptor, INIT_LABEL};
use crate::http::response::HttpResponse;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::borrow::Borrow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

/// Result delivered to a waiting caller.
pub type Outcome = Result<HttpResponse, NetError>;

/// Opaque identifier linking one request frame to its reply frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CorrelationToken {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationToken {
    fn from(s: &str) -> Self {
        CorrelationToken(s.to_string())
    }
}

/// Monotonic token source. Tokens are never reused within a generator.
#[derive(Debug)]
pub struct TokenGenerator {
    prefix: String,
    next: AtomicU64,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new("req")
    }
}

impl TokenGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if prefix == INIT_LABEL {
            prefix.push('_');
        }
        Self {
            prefix,
            next: AtomicU64::new(1),
        }
    }

    pub fn next_token(&self) -> CorrelationToken {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        CorrelationToken(format!("{}-{}", self.prefix, n))
    }
}

/// One in-flight request.
#[derive(Debug)]
pub struct PendingEntry {
    sender: oneshot::Sender<Outcome>,
    descriptor: RequestDescriptor,
}

impl PendingEntry {
    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    /// Deliver the outcome. Returns `false` if the caller stopped waiting.
    pub fn complete(self, outcome: Outcome) -> bool {
        self.sender.send(outcome).is_ok()
    }
}

/// Shared map of in-flight requests.
///
/// The client registers, the dispatch loop resolves; both go through the
/// map's sharded locks so no update is lost.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: DashMap<CorrelationToken, PendingEntry>,
    closed: AtomicBool,
    failure: OnceLock<NetError>,
}

impl PendingRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `token` and hand back the caller's awaitable handle.
    pub fn register(
        self: &Arc<Self>,
        token: CorrelationToken,
        descriptor: RequestDescriptor,
    ) -> Result<PendingResponse, NetError> {
        match self.entries.entry(token.clone()) {
            Entry::Occupied(_) => {
                tracing::error!(label = %token, "correlation token registered twice");
                Err(NetError::DuplicateCorrelation)
            }
            Entry::Vacant(slot) => {
                let (sender, receiver) = oneshot::channel();
                slot.insert(PendingEntry { sender, descriptor });
                Ok(PendingResponse {
                    token,
                    receiver,
                    registry: Arc::clone(self),
                    finished: false,
                })
            }
        }
    }

    /// Remove the entry for `token` so the caller can be completed.
    pub fn take(&self, token: &str) -> Result<PendingEntry, NetError> {
        self.entries
            .remove(token)
            .map(|(_, entry)| entry)
            .ok_or(NetError::UnknownCorrelation)
    }

    /// Remove the entry for `token` and deliver `outcome` to it.
    pub fn resolve(&self, token: &str, outcome: Outcome) -> Result<(), NetError> {
        let entry = self.take(token)?;
        if !entry.complete(outcome) {
            tracing::debug!(label = token, "caller detached before resolution");
        }
        Ok(())
    }

    /// Drop the entry for `token` without resolving it.
    pub fn forget(&self, token: &str) -> bool {
        self.entries.remove(token).is_some()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.entries.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record that the transport is gone. Pending entries are left as is.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Record a bridge-level failure and close.
    pub fn mark_failed(&self, error: NetError) {
        let _ = self.failure.set(error);
        self.mark_closed();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Bridge-level failure recorded by the dispatch loop, if any.
    pub fn failure(&self) -> Option<NetError> {
        self.failure.get().copied()
    }

    /// Error to report once closed: the recorded failure, else
    /// `TransportClosed`.
    pub fn closed_error(&self) -> NetError {
        self.failure
            .get()
            .copied()
            .unwrap_or(NetError::TransportClosed)
    }
}

/// Awaitable handle for one request.
///
/// Resolves when the dispatch loop delivers the matching reply. Dropping the
/// handle before that reclaims the registry entry; other requests are not
/// affected.
#[derive(Debug)]
pub struct PendingResponse {
    token: CorrelationToken,
    receiver: oneshot::Receiver<Outcome>,
    registry: Arc<PendingRegistry>,
    finished: bool,
}

impl PendingResponse {
    pub fn token(&self) -> &CorrelationToken {
        &self.token
    }

    /// Wait at most `timeout` for the reply.
    ///
    /// On expiry the entry is reclaimed and the error is `TransportClosed`
    /// (or the recorded bridge failure) if the transport has ended, else
    /// `ConnectionTimedOut`.
    pub async fn timeout(mut self, timeout: Duration) -> Outcome {
        match tokio::time::timeout(timeout, &mut self).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.registry.forget(self.token.as_str());
                self.finished = true;
                if self.registry.is_closed() {
                    Err(self.registry.closed_error())
                } else {
                    Err(NetError::ConnectionTimedOut)
                }
            }
        }
    }
}

impl Future for PendingResponse {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => {
                self.finished = true;
                Poll::Ready(outcome)
            }
            // Sender dropped without a reply: the entry was discarded.
            Poll::Ready(Err(_)) => {
                self.finished = true;
                Poll::Ready(Err(self.registry.closed_error()))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if !self.finished && self.registry.forget(self.token.as_str()) {
            tracing::debug!(label = %self.token, "reclaimed abandoned request");
        }
    }
}
