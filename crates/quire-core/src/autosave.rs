//! Debounced persistence for one open document.
//!
//! Title and content are saved on independent timers. Every edit bumps the
//! channel's epoch and spawns a timer; a timer that wakes up with an old epoch
//! does nothing, so only the last edit in a burst reaches the store. At most
//! one save per channel is in flight: a timer that fires while a save is
//! running skips, and the running save re-arms the timer on completion if
//! edits arrived in the meantime.
//!
//! Each channel remembers which revision the store holds now. Saves can
//! finish out of order (a slow timer save landing after a manual one), so a
//! completed save records its own revision as persisted, and the channel
//! stays dirty and re-arms whenever that is older than the latest edit.
//!
//! Timers are spawned onto the ambient Tokio runtime, so the change methods
//! must be called from within one.

use crate::blocks::Block;
use crate::config::EditorConfig;
use crate::error::StoreError;
use crate::events::{EditorEvent, SaveField};
use crate::store::{DocumentStore, DocumentUpdate};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Title,
    Content,
}

impl Channel {
    fn field(self) -> SaveField {
        match self {
            Channel::Title => SaveField::Title,
            Channel::Content => SaveField::Content,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveState {
    Saved,
    Dirty,
    Saving,
    Error(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    pub title: bool,
    pub content: bool,
}

impl DirtyFlags {
    pub fn any(&self) -> bool {
        self.title || self.content
    }
}

#[derive(Debug, Default)]
struct ChannelState {
    dirty: bool,
    in_flight: bool,
    epoch: u64,
    revision: u64,
    persisted: u64,
}

impl ChannelState {
    /// Record the outcome of a save of `revision` and recompute `dirty`.
    /// The last save to complete is what the store holds.
    fn settle(&mut self, revision: u64, saved: bool) -> bool {
        if saved {
            self.persisted = revision;
        }
        self.dirty = self.revision != self.persisted;
        self.dirty
    }

    fn rearm(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }
}

struct Shared {
    title: String,
    blocks: Vec<Block>,
    title_state: ChannelState,
    content_state: ChannelState,
    saves_running: usize,
    last_error: Option<String>,
}

impl Shared {
    fn channel(&mut self, channel: Channel) -> &mut ChannelState {
        match channel {
            Channel::Title => &mut self.title_state,
            Channel::Content => &mut self.content_state,
        }
    }

    fn dirty(&self) -> DirtyFlags {
        DirtyFlags {
            title: self.title_state.dirty,
            content: self.content_state.dirty,
        }
    }

    fn update_for(&self, channel: Channel) -> DocumentUpdate {
        match channel {
            Channel::Title => DocumentUpdate::title(self.title.clone()),
            Channel::Content => DocumentUpdate::blocks(self.blocks.clone()),
        }
    }
}

struct Inner {
    document_id: String,
    store: Arc<dyn DocumentStore>,
    config: EditorConfig,
    shared: Mutex<Shared>,
    events: broadcast::Sender<EditorEvent>,
}

#[derive(Clone)]
pub struct Autosave {
    inner: Arc<Inner>,
}

impl Autosave {
    pub fn new(
        document_id: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        config: EditorConfig,
        events: broadcast::Sender<EditorEvent>,
        title: String,
        blocks: Vec<Block>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                document_id: document_id.into(),
                store,
                config,
                shared: Mutex::new(Shared {
                    title,
                    blocks,
                    title_state: ChannelState::default(),
                    content_state: ChannelState::default(),
                    saves_running: 0,
                    last_error: None,
                }),
                events,
            }),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.inner.document_id
    }

    pub fn title_changed(&self, title: String) {
        {
            let mut shared = self.inner.shared.lock();
            shared.title = title;
        }
        self.mark_dirty(Channel::Title);
    }

    pub fn content_changed(&self, blocks: Vec<Block>) {
        {
            let mut shared = self.inner.shared.lock();
            shared.blocks = blocks;
        }
        self.mark_dirty(Channel::Content);
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.inner.shared.lock().dirty()
    }

    pub fn save_state(&self) -> SaveState {
        let shared = self.inner.shared.lock();
        if shared.saves_running > 0 {
            return SaveState::Saving;
        }
        match (&shared.last_error, shared.dirty().any()) {
            (Some(error), true) => SaveState::Error(error.clone()),
            (None, true) => SaveState::Dirty,
            _ => SaveState::Saved,
        }
    }

    /// Save title and blocks together right now, ignoring timers and
    /// in-flight guards.
    pub async fn save_now(&self) -> Result<DateTime<Utc>, StoreError> {
        let (update, title_revision, content_revision) = {
            let mut shared = self.inner.shared.lock();
            let update = DocumentUpdate {
                title: Some(shared.title.clone()),
                blocks: Some(shared.blocks.clone()),
            };
            let revisions = (shared.title_state.revision, shared.content_state.revision);
            self.inner.begin_save(&mut shared);
            (update, revisions.0, revisions.1)
        };

        let result = self.inner.store.save(&self.inner.document_id, update).await;

        let mut rearm = Vec::new();
        {
            let mut shared = self.inner.shared.lock();
            let saved = result.is_ok();
            for (channel, revision) in [
                (Channel::Title, title_revision),
                (Channel::Content, content_revision),
            ] {
                let state = shared.channel(channel);
                // An in-flight timer save re-arms on its own completion.
                if state.settle(revision, saved) && saved && !state.in_flight {
                    rearm.push((channel, state.rearm()));
                }
            }
            self.inner.finish_save(&mut shared, SaveField::Document, &result);
        }
        for (channel, epoch) in rearm {
            Inner::schedule(&self.inner, channel, epoch);
        }
        result
    }

    fn mark_dirty(&self, channel: Channel) {
        let epoch = {
            let mut shared = self.inner.shared.lock();
            let before = shared.dirty();
            let state = shared.channel(channel);
            state.revision += 1;
            state.dirty = true;
            state.epoch += 1;
            let epoch = state.epoch;
            let after = shared.dirty();
            if before != after {
                self.inner.emit(EditorEvent::DirtyStateChanged {
                    title: after.title,
                    content: after.content,
                });
            }
            epoch
        };
        Inner::schedule(&self.inner, channel, epoch);
    }
}

impl Inner {
    fn emit(&self, event: EditorEvent) {
        // No subscribers is fine.
        self.events.send(event).ok();
    }

    fn delay(&self, channel: Channel) -> Duration {
        match channel {
            Channel::Title => self.config.title_debounce(),
            Channel::Content => self.config.content_debounce(),
        }
    }

    fn schedule(this: &Arc<Self>, channel: Channel, epoch: u64) {
        let delay = this.delay(channel);
        debug!(?channel, epoch, ?delay, "autosave scheduled");
        let inner = Arc::clone(this);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            Inner::fire(inner, channel, epoch).await;
        });
    }

    fn begin_save(&self, shared: &mut Shared) {
        shared.saves_running += 1;
        if shared.saves_running == 1 {
            self.emit(EditorEvent::SavingStateChanged(true));
        }
    }

    fn finish_save(
        &self,
        shared: &mut Shared,
        field: SaveField,
        result: &Result<DateTime<Utc>, StoreError>,
    ) {
        match result {
            Ok(updated_at) => {
                info!(document_id = %self.document_id, %field, "saved");
                shared.last_error = None;
                self.emit(EditorEvent::Saved {
                    field,
                    updated_at: *updated_at,
                });
            }
            Err(error) => {
                warn!(document_id = %self.document_id, %field, %error, "save failed");
                shared.last_error = Some(error.to_string());
                self.emit(EditorEvent::SaveFailed {
                    field,
                    error: error.clone(),
                });
            }
        }
        let dirty = shared.dirty();
        self.emit(EditorEvent::DirtyStateChanged {
            title: dirty.title,
            content: dirty.content,
        });
        shared.saves_running = shared.saves_running.saturating_sub(1);
        if shared.saves_running == 0 {
            self.emit(EditorEvent::SavingStateChanged(false));
        }
    }

    async fn fire(this: Arc<Self>, channel: Channel, epoch: u64) {
        let (update, revision) = {
            let mut shared = this.shared.lock();
            let state = shared.channel(channel);
            if state.epoch != epoch {
                return;
            }
            if !state.dirty {
                debug!(?channel, "autosave fired with nothing to save");
                return;
            }
            if state.in_flight {
                debug!(?channel, "save already in flight, skipping");
                return;
            }
            state.in_flight = true;
            let revision = state.revision;
            let update = shared.update_for(channel);
            this.begin_save(&mut shared);
            (update, revision)
        };

        let result = this.store.save(&this.document_id, update).await;

        let rearm = {
            let mut shared = this.shared.lock();
            let state = shared.channel(channel);
            state.in_flight = false;
            let saved = result.is_ok();
            let moved = state.revision != revision;
            let mut rearm = None;
            // Edits that landed while saving had their timers skipped, and a
            // newer save that finished first was just overwritten.
            if state.settle(revision, saved) && (saved || moved) {
                rearm = Some(state.rearm());
            }
            this.finish_save(&mut shared, channel.field(), &result);
            rearm
        };

        if let Some(epoch) = rearm {
            Inner::schedule(&this, channel, epoch);
        }
    }
}
