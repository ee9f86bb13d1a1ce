//! HTML page handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use ps_proto::{PageRequest, to_id};

use crate::bot::Bot;
use crate::error::HandlerError;

/// Renders the page selected by the part of a page id before its first `-`.
#[async_trait]
pub trait PageHandler: Send + Sync {
    fn id(&self) -> &str;

    async fn render(&self, bot: &Bot, request: &PageRequest) -> Result<String, HandlerError>;
}

/// Page handlers keyed by normalized id.
#[derive(Default)]
pub struct PageRegistry {
    pages: RwLock<HashMap<String, Arc<dyn PageHandler>>>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, page: Arc<dyn PageHandler>) {
        self.pages.write().insert(to_id(page.id()), page);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn PageHandler>> {
        self.pages.read().get(&to_id(id)).cloned()
    }

    pub fn len(&self) -> usize {
        self.pages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.read().is_empty()
    }
}
