//! Durable document storage as seen by the editing engine.
//!
//! The engine only ever loads a whole document and saves partial updates;
//! where the bytes live is up to the implementation. [`MemoryStore`] keeps
//! everything in process; the SQLite backend lives in [`crate::db`].

use crate::blocks::{blocks_from_value, blocks_to_value, Block};
use crate::error::StoreError;
use crate::legacy;
use crate::ordering::renumber;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::warn;

#[derive(Clone, Debug, PartialEq)]
pub struct StoredDocument {
    pub title: String,
    pub structured_blocks: Option<Value>,
    pub legacy_text: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StoredDocument {
    /// Blocks to edit: structured data when present and readable, otherwise
    /// the legacy text run through the parser. Always renumbered.
    pub fn resolve_blocks(&self) -> Vec<Block> {
        if let Some(value) = &self.structured_blocks {
            match blocks_from_value(value.clone()) {
                Some(blocks) => return renumber(blocks),
                None => warn!("structured blocks are not an array, falling back to legacy text"),
            }
        }
        match &self.legacy_text {
            Some(text) => legacy::parse(text),
            None => Vec::new(),
        }
    }
}

/// A partial save. `None` fields are left untouched in the store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub blocks: Option<Vec<Block>>,
}

impl DocumentUpdate {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            blocks: None,
        }
    }

    pub fn blocks(blocks: Vec<Block>) -> Self {
        Self {
            title: None,
            blocks: Some(blocks),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.blocks.is_none()
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self, document_id: &str) -> Result<StoredDocument, StoreError>;

    /// Apply `update` and return the new modification time. Creates the
    /// document if it doesn't exist yet.
    async fn save(
        &self,
        document_id: &str,
        update: DocumentUpdate,
    ) -> Result<DateTime<Utc>, StoreError>;
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<String, StoredDocument>,
    denied: HashSet<String>,
    failures_left: usize,
    saves: Vec<(String, DocumentUpdate)>,
}

/// In-process store with hooks for exercising failure paths.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    save_delay: Option<Duration>,
    save_delays: Mutex<VecDeque<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every save sleeps this long before touching the data.
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = Some(delay);
        self
    }

    /// Per-save delays, consumed one per save in arrival order. Once they run
    /// out saves fall back to [`MemoryStore::with_save_delay`].
    pub fn with_save_delays(self, delays: impl IntoIterator<Item = Duration>) -> Self {
        self.save_delays.lock().extend(delays);
        self
    }

    pub fn insert(&self, document_id: &str, document: StoredDocument) {
        self.state
            .lock()
            .documents
            .insert(document_id.to_string(), document);
    }

    pub fn insert_legacy(&self, document_id: &str, title: &str, text: &str) {
        self.insert(
            document_id,
            StoredDocument {
                title: title.to_string(),
                structured_blocks: None,
                legacy_text: Some(text.to_string()),
                updated_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, document_id: &str) -> Option<StoredDocument> {
        self.state.lock().documents.get(document_id).cloned()
    }

    pub fn deny(&self, document_id: &str) {
        self.state.lock().denied.insert(document_id.to_string());
    }

    pub fn allow(&self, document_id: &str) {
        self.state.lock().denied.remove(document_id);
    }

    /// The next `count` saves fail with a storage error.
    pub fn fail_next_saves(&self, count: usize) {
        self.state.lock().failures_left = count;
    }

    /// Every update that reached the store, in arrival order.
    pub fn saves(&self) -> Vec<(String, DocumentUpdate)> {
        self.state.lock().saves.clone()
    }

    pub fn save_count(&self) -> usize {
        self.state.lock().saves.len()
    }

    /// Highest number of saves that were running at the same time.
    pub fn max_concurrent_saves(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn apply(&self, document_id: &str, update: DocumentUpdate) -> Result<DateTime<Utc>, StoreError> {
        let mut state = self.state.lock();
        if state.denied.contains(document_id) {
            return Err(StoreError::AccessDenied(document_id.to_string()));
        }
        state.saves.push((document_id.to_string(), update.clone()));
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(StoreError::Storage("injected failure".to_string()));
        }

        let now = Utc::now();
        let document = state
            .documents
            .entry(document_id.to_string())
            .or_insert_with(|| StoredDocument {
                title: String::new(),
                structured_blocks: None,
                legacy_text: None,
                updated_at: now,
            });
        if let Some(title) = update.title {
            document.title = title;
        }
        if let Some(blocks) = update.blocks {
            document.legacy_text = Some(legacy::to_legacy_text(&blocks));
            document.structured_blocks = Some(blocks_to_value(&blocks));
        }
        document.updated_at = now;
        Ok(now)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, document_id: &str) -> Result<StoredDocument, StoreError> {
        let state = self.state.lock();
        if state.denied.contains(document_id) {
            return Err(StoreError::AccessDenied(document_id.to_string()));
        }
        state
            .documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(document_id.to_string()))
    }

    async fn save(
        &self,
        document_id: &str,
        update: DocumentUpdate,
    ) -> Result<DateTime<Utc>, StoreError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let delay = self.save_delays.lock().pop_front().or(self.save_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.apply(document_id, update);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockType;
    use serde_json::json;

    #[tokio::test]
    async fn load_reports_missing_and_denied() {
        let store = MemoryStore::new();
        assert_eq!(
            store.load("nope").await,
            Err(StoreError::NotFound("nope".into()))
        );
        store.insert_legacy("doc", "Doc", "hello");
        store.deny("doc");
        assert_eq!(
            store.load("doc").await,
            Err(StoreError::AccessDenied("doc".into()))
        );
        store.allow("doc");
        assert!(store.load("doc").await.is_ok());
    }

    #[tokio::test]
    async fn title_update_leaves_blocks_alone() {
        let store = MemoryStore::new();
        store
            .save("doc", DocumentUpdate::blocks(vec![Block::paragraph("body")]))
            .await
            .unwrap();
        let before = store.get("doc").unwrap().structured_blocks;
        store.save("doc", DocumentUpdate::title("New")).await.unwrap();
        let after = store.get("doc").unwrap();
        assert_eq!(after.title, "New");
        assert_eq!(after.structured_blocks, before);
        assert_eq!(after.legacy_text.as_deref(), Some("body"));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next_saves(1);
        assert!(matches!(
            store.save("doc", DocumentUpdate::title("a")).await,
            Err(StoreError::Storage(_))
        ));
        assert!(store.save("doc", DocumentUpdate::title("a")).await.is_ok());
        assert_eq!(store.save_count(), 2);
    }

    #[test]
    fn structured_blocks_win_over_legacy_text() {
        let document = StoredDocument {
            title: String::new(),
            structured_blocks: Some(json!([{ "id": "a", "type": "quote", "content": "q" }])),
            legacy_text: Some("# ignored".into()),
            updated_at: Utc::now(),
        };
        let blocks = document.resolve_blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].block_type, BlockType::Quote);
    }

    #[test]
    fn unreadable_structured_blocks_fall_back_to_legacy() {
        let document = StoredDocument {
            title: String::new(),
            structured_blocks: Some(json!({ "not": "an array" })),
            legacy_text: Some("# Title".into()),
            updated_at: Utc::now(),
        };
        let blocks = document.resolve_blocks();
        assert_eq!(blocks[0].block_type, BlockType::Heading1);
        assert_eq!(blocks[0].content, "Title");
    }
}
