//! Chat filters.
//!
//! Filters see room chat from regular-rank users that is not a command.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use ps_proto::ChatMessage;
use tracing::warn;

use crate::bot::Bot;
use crate::dispatch::isolate;
use crate::error::HandlerResult;

#[async_trait]
pub trait Filter: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &str {
        "filter"
    }

    async fn run(&self, bot: &Bot, message: &ChatMessage) -> HandlerResult;
}

/// Registered filters, run in registration order.
#[derive(Default)]
pub struct FilterChain {
    filters: RwLock<Vec<Arc<dyn Filter>>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, filter: Arc<dyn Filter>) {
        self.filters.write().push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.read().is_empty()
    }

    /// Run every filter; a failing filter does not stop the rest.
    pub async fn run_all(&self, bot: &Bot, message: &ChatMessage) {
        let filters = self.filters.read().clone();
        for filter in filters {
            if let Err(e) = isolate(filter.run(bot, message)).await {
                warn!(
                    filter = %filter.name(),
                    room = ?message.room(),
                    code = e.error_code(),
                    error = %e,
                    "Filter failed"
                );
            }
        }
    }
}
