//! Ordered hand-off for routed chat.
//!
//! Chat lines and page requests leave the read loop so their handlers can
//! await query responses, but they must still be handled in arrival order.
//! Items queue here and a single tracked worker drains them one at a time.
//! The worker exits once the queue is empty; the next push starts a new one.

use std::collections::VecDeque;

use parking_lot::Mutex;
use ps_proto::{ChatMessage, PageRequest};

/// One unit of routed work.
#[derive(Debug)]
pub(crate) enum Routed {
    Chat(ChatMessage),
    Page(PageRequest),
}

#[derive(Default)]
pub(crate) struct RoutingQueue {
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Routed>,
    /// A worker is running and will see anything pushed.
    draining: bool,
}

impl RoutingQueue {
    /// Append an item. Returns `true` if the caller must start a worker.
    pub(crate) fn push(&self, item: Routed) -> bool {
        let mut state = self.state.lock();
        state.pending.push_back(item);
        !std::mem::replace(&mut state.draining, true)
    }

    /// Take the oldest item. `None` hands the worker role back, so the
    /// worker must stop after receiving it.
    pub(crate) fn next(&self) -> Option<Routed> {
        let mut state = self.state.lock();
        let item = state.pending.pop_front();
        if item.is_none() {
            state.draining = false;
        }
        item
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_proto::parse_chunk;

    fn chat(text: &str) -> Routed {
        let event = parse_chunk(&format!(">lobby\n|c|+alice|{text}")).remove(0);
        Routed::Chat(ChatMessage::from_event(&event).unwrap())
    }

    fn text(item: Routed) -> String {
        match item {
            Routed::Chat(message) => message.text,
            Routed::Page(request) => request.page_id,
        }
    }

    #[test]
    fn first_push_claims_the_worker() {
        let queue = RoutingQueue::default();
        assert!(queue.push(chat("one")));
        assert!(!queue.push(chat("two")));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn drains_in_arrival_order() {
        let queue = RoutingQueue::default();
        queue.push(chat("one"));
        queue.push(chat("two"));
        assert_eq!(text(queue.next().unwrap()), "one");
        // Pushed while the worker is still draining
        assert!(!queue.push(chat("three")));
        assert_eq!(text(queue.next().unwrap()), "two");
        assert_eq!(text(queue.next().unwrap()), "three");
        assert!(queue.next().is_none());
    }

    #[test]
    fn empty_queue_releases_the_worker() {
        let queue = RoutingQueue::default();
        assert!(queue.push(chat("one")));
        queue.next();
        assert!(queue.next().is_none());
        assert!(queue.push(chat("two")));
    }
}
