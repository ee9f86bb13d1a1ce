//! Query correlator.
//!
//! Out-of-band queries (`/crq TYPE DATA`) are answered by
//! `|queryresponse|TYPE|JSON` lines that carry no request id. The only way
//! to attribute a response is to never have two queries of the same type in
//! flight, so each type gets a FIFO queue and only its head is on the wire:
//!
//! ```text
//!   query("roominfo", "a") ──▶ send /crq roominfo a     queue: [a]
//!   query("roominfo", "b") ──▶ (queued)                 queue: [a, b]
//!   |queryresponse|roominfo|… ──▶ resolve a, send /crq roominfo b
//! ```
//!
//! A timed-out entry is removed by id, so siblings of the same type are
//! unaffected. If the timed-out entry was on the wire, the next entry is
//! sent right away; a late response to the abandoned request then resolves
//! that next entry.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ps_proto::{Outbound, QueryResponse};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::QueryError;
use crate::network::Outbox;

type Resolver = oneshot::Sender<Result<Value, QueryError>>;

struct PendingQuery {
    id: u64,
    payload: String,
    resolver: Resolver,
    enqueued_at: DateTime<Utc>,
}

#[derive(Default)]
struct Pending {
    next_id: u64,
    queues: HashMap<String, VecDeque<PendingQuery>>,
}

/// Correlates queries with their unlabeled responses.
pub struct QueryCorrelator {
    outbox: Outbox,
    timeout: Option<Duration>,
    pending: Mutex<Pending>,
}

impl QueryCorrelator {
    /// `timeout` of `None` waits forever.
    pub fn new(outbox: Outbox, timeout: Option<Duration>) -> Self {
        Self {
            outbox,
            timeout,
            pending: Mutex::new(Pending::default()),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Send a query and wait for its response payload.
    pub async fn query(&self, kind: &str, payload: &str) -> Result<Value, QueryError> {
        let (id, mut rx) = self.enqueue(kind, payload);

        let Some(limit) = self.timeout else {
            return rx.await.unwrap_or(Err(QueryError::Closed));
        };

        match tokio::time::timeout(limit, &mut rx).await {
            Ok(result) => result.unwrap_or(Err(QueryError::Closed)),
            Err(_) => {
                if self.cancel(kind, id) {
                    warn!(kind = %kind, payload = %payload, "Query timed out");
                    Err(QueryError::Timeout {
                        kind: kind.to_string(),
                        waited_ms: limit.as_millis() as u64,
                    })
                } else {
                    // Settled between the deadline and the cancel
                    rx.await.unwrap_or(Err(QueryError::Closed))
                }
            }
        }
    }

    fn enqueue(&self, kind: &str, payload: &str) -> (u64, oneshot::Receiver<Result<Value, QueryError>>) {
        let (tx, rx) = oneshot::channel();
        let (id, unsent) = {
            let mut pending = self.pending.lock();
            let id = pending.next_id;
            pending.next_id += 1;

            let queue = pending.queues.entry(kind.to_string()).or_default();
            let idle = queue.is_empty();
            queue.push_back(PendingQuery {
                id,
                payload: payload.to_string(),
                resolver: tx,
                enqueued_at: Utc::now(),
            });

            let unsent = if idle {
                self.send_head(kind, queue)
            } else {
                debug!(kind = %kind, depth = queue.len(), "Query queued behind in-flight request");
                Vec::new()
            };
            if queue.is_empty() {
                pending.queues.remove(kind);
            }
            (id, unsent)
        };
        reject(unsent, &QueryError::Closed);
        (id, rx)
    }

    /// Put the head of `kind`'s queue on the wire.
    ///
    /// Without an attached session nothing reaches the server, so the whole
    /// queue is drained and handed back for rejection instead of waiting
    /// for a response that cannot come.
    fn send_head(&self, kind: &str, queue: &mut VecDeque<PendingQuery>) -> Vec<PendingQuery> {
        let Some(head) = queue.front() else {
            return Vec::new();
        };
        if self.outbox.send(Outbound::query(kind, &head.payload)) {
            return Vec::new();
        }
        warn!(kind = %kind, count = queue.len(), "No session attached, rejecting queries");
        queue.drain(..).collect()
    }

    /// Remove one entry by id. Returns `false` if it was already settled.
    fn cancel(&self, kind: &str, id: u64) -> bool {
        let unsent = {
            let mut pending = self.pending.lock();
            let Some(queue) = pending.queues.get_mut(kind) else {
                return false;
            };
            let Some(position) = queue.iter().position(|q| q.id == id) else {
                return false;
            };
            queue.remove(position);

            let unsent = if position == 0 {
                self.send_head(kind, queue)
            } else {
                Vec::new()
            };
            if queue.is_empty() {
                pending.queues.remove(kind);
            }
            unsent
        };
        reject(unsent, &QueryError::Closed);
        true
    }

    /// Deliver a decoded response to the oldest outstanding query of its type.
    pub fn resolve(&self, response: QueryResponse) -> bool {
        self.settle(&response.kind, Ok(response.data))
    }

    /// Settle the head of `kind`'s queue and put the next entry on the wire.
    ///
    /// Returns `false` when nothing of that type was outstanding.
    pub fn settle(&self, kind: &str, outcome: Result<Value, QueryError>) -> bool {
        let (head, unsent) = {
            let mut pending = self.pending.lock();
            let Some(queue) = pending.queues.get_mut(kind) else {
                debug!(kind = %kind, "Dropping unsolicited query response");
                return false;
            };
            let head = queue.pop_front();
            let unsent = self.send_head(kind, queue);
            if queue.is_empty() {
                pending.queues.remove(kind);
            }
            (head, unsent)
        };
        reject(unsent, &QueryError::Closed);

        let Some(head) = head else {
            return false;
        };
        let waited = Utc::now() - head.enqueued_at;
        debug!(
            kind = %kind,
            payload = %head.payload,
            waited_ms = waited.num_milliseconds(),
            "Query settled"
        );
        // The caller may have given up already
        let _ = head.resolver.send(outcome);
        true
    }

    /// Reject every outstanding query. Each entry is rejected once; a second
    /// call finds nothing.
    pub fn reject_all(&self, error: QueryError) -> usize {
        let drained: Vec<PendingQuery> = {
            let mut pending = self.pending.lock();
            pending.queues.drain().flat_map(|(_, queue)| queue).collect()
        };
        let count = drained.len();
        reject(drained, &error);
        if count > 0 {
            debug!(count, error = %error, "Rejected pending queries");
        }
        count
    }

    /// Number of queries of `kind` awaiting a response (in flight plus queued).
    pub fn outstanding(&self, kind: &str) -> usize {
        self.pending.lock().queues.get(kind).map_or(0, VecDeque::len)
    }
}

fn reject(queries: Vec<PendingQuery>, error: &QueryError) {
    for query in queries {
        // The caller may have given up already
        let _ = query.resolver.send(Err(error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn correlator(timeout: Option<Duration>) -> (Arc<QueryCorrelator>, mpsc::UnboundedReceiver<String>) {
        let (outbox, rx) = Outbox::channel();
        (Arc::new(QueryCorrelator::new(outbox, timeout)), rx)
    }

    fn response(kind: &str, data: Value) -> QueryResponse {
        QueryResponse {
            kind: kind.to_string(),
            data,
        }
    }

    #[tokio::test]
    async fn single_query_round_trip() {
        let (queries, mut sent) = correlator(None);
        let task = {
            let queries = Arc::clone(&queries);
            tokio::spawn(async move { queries.query("userdetails", "bob").await })
        };
        assert_eq!(sent.recv().await.unwrap(), "|/crq userdetails bob");
        assert!(queries.resolve(response("userdetails", json!({"id": "bob"}))));
        assert_eq!(task.await.unwrap().unwrap()["id"], "bob");
        assert_eq!(queries.outstanding("userdetails"), 0);
    }

    #[tokio::test]
    async fn same_type_is_serialized() {
        let (queries, mut sent) = correlator(None);
        let first = {
            let queries = Arc::clone(&queries);
            tokio::spawn(async move { queries.query("roominfo", "a").await })
        };
        assert_eq!(sent.recv().await.unwrap(), "|/crq roominfo a");
        let second = {
            let queries = Arc::clone(&queries);
            tokio::spawn(async move { queries.query("roominfo", "b").await })
        };
        while queries.outstanding("roominfo") < 2 {
            tokio::task::yield_now().await;
        }
        // Second request is held back until the first resolves.
        assert!(sent.try_recv().is_err());

        queries.resolve(response("roominfo", json!({"title": "A"})));
        assert_eq!(sent.recv().await.unwrap(), "|/crq roominfo b");
        queries.resolve(response("roominfo", json!({"title": "B"})));

        assert_eq!(first.await.unwrap().unwrap()["title"], "A");
        assert_eq!(second.await.unwrap().unwrap()["title"], "B");
    }

    #[tokio::test]
    async fn unsolicited_response_is_dropped() {
        let (queries, _sent) = correlator(None);
        assert!(!queries.resolve(response("rooms", Value::Null)));
    }

    #[tokio::test]
    async fn timeout_rejects_and_drops_stale_response() {
        let (queries, mut sent) = correlator(Some(Duration::from_millis(30)));
        let result = queries.query("userdetails", "ghost").await;
        assert!(matches!(result, Err(QueryError::Timeout { .. })));
        assert_eq!(sent.recv().await.unwrap(), "|/crq userdetails ghost");
        assert_eq!(queries.outstanding("userdetails"), 0);

        // A stale response with nothing queued is dropped.
        assert!(!queries.resolve(response("userdetails", Value::Null)));
    }

    #[tokio::test]
    async fn reject_all_is_exactly_once() {
        let (queries, _sent) = correlator(None);
        let task = {
            let queries = Arc::clone(&queries);
            tokio::spawn(async move { queries.query("roominfo", "lobby").await })
        };
        while queries.outstanding("roominfo") == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(queries.reject_all(QueryError::Closed), 1);
        assert_eq!(queries.reject_all(QueryError::Closed), 0);
        assert_eq!(task.await.unwrap(), Err(QueryError::Closed));
    }

    #[tokio::test]
    async fn settle_with_error() {
        let (queries, _sent) = correlator(None);
        let task = {
            let queries = Arc::clone(&queries);
            tokio::spawn(async move { queries.query("roominfo", "x").await })
        };
        while queries.outstanding("roominfo") == 0 {
            tokio::task::yield_now().await;
        }
        let error = QueryError::Malformed {
            kind: "roominfo".into(),
            reason: "eof".into(),
        };
        assert!(queries.settle("roominfo", Err(error.clone())));
        assert_eq!(task.await.unwrap(), Err(error));
    }

    #[tokio::test]
    async fn query_without_session_fails_fast() {
        let outbox = Outbox::default();
        let queries = QueryCorrelator::new(outbox.clone(), None);

        let result = tokio::time::timeout(Duration::from_secs(1), queries.query("roominfo", "a"))
            .await
            .expect("detached query must not hang");
        assert_eq!(result, Err(QueryError::Closed));
        assert_eq!(queries.outstanding("roominfo"), 0);

        // Once a session attaches the next query goes out normally.
        let (tx, mut sent) = mpsc::unbounded_channel();
        outbox.attach(tx);
        let queries = Arc::new(queries);
        let task = {
            let queries = Arc::clone(&queries);
            tokio::spawn(async move { queries.query("roominfo", "b").await })
        };
        assert_eq!(sent.recv().await.unwrap(), "|/crq roominfo b");
        queries.resolve(response("roominfo", json!({"title": "B"})));
        assert_eq!(task.await.unwrap().unwrap()["title"], "B");
    }

    #[tokio::test]
    async fn queued_query_rejected_when_session_drops() {
        let (outbox, mut sent) = Outbox::channel();
        let queries = Arc::new(QueryCorrelator::new(outbox.clone(), None));
        let first = {
            let queries = Arc::clone(&queries);
            tokio::spawn(async move { queries.query("roominfo", "a").await })
        };
        assert_eq!(sent.recv().await.unwrap(), "|/crq roominfo a");
        let second = {
            let queries = Arc::clone(&queries);
            tokio::spawn(async move { queries.query("roominfo", "b").await })
        };
        while queries.outstanding("roominfo") < 2 {
            tokio::task::yield_now().await;
        }

        outbox.detach();
        queries.resolve(response("roominfo", json!({"title": "A"})));

        assert_eq!(first.await.unwrap().unwrap()["title"], "A");
        assert_eq!(second.await.unwrap(), Err(QueryError::Closed));
        assert_eq!(queries.outstanding("roominfo"), 0);
    }
}
