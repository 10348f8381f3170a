use crate::autosave::{Autosave, DirtyFlags, SaveState};
use crate::blocks::{Block, BlockId};
use crate::config::EditorConfig;
use crate::editor::{Cursor, EditorAction, EditorModel, Outcome};
use crate::error::{SessionError, StoreError};
use crate::events::EditorEvent;
use crate::slash::{CommandItem, SlashMenu, DEFAULT_COMMANDS};
use crate::store::DocumentStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

/// One open document: the block model, the slash menu and autosave wired
/// together. Hosts feed input in and listen on [`EditorSession::subscribe`].
pub struct EditorSession {
    document_id: String,
    model: EditorModel,
    slash: SlashMenu,
    commands: &'static [CommandItem],
    autosave: Autosave,
    events: broadcast::Sender<EditorEvent>,
    focus: Option<Cursor>,
    updated_at: Option<DateTime<Utc>>,
}

impl EditorSession {
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        document_id: &str,
        config: EditorConfig,
    ) -> Result<Self, StoreError> {
        let document = store.load(document_id).await?;
        let blocks = document.resolve_blocks();
        info!(
            document_id,
            blocks = blocks.len(),
            structured = document.structured_blocks.is_some(),
            "document opened"
        );
        let model = EditorModel::new(document.title, blocks);
        let mut session = Self::with_model(store, document_id.to_string(), config, model);
        session.updated_at = Some(document.updated_at);
        Ok(session)
    }

    /// Start an unsaved document with a fresh id and one empty paragraph.
    pub fn new_document(store: Arc<dyn DocumentStore>, config: EditorConfig) -> Self {
        let document_id = Uuid::new_v4().to_string();
        debug!(%document_id, "new document");
        Self::with_model(store, document_id, config, EditorModel::empty())
    }

    fn with_model(
        store: Arc<dyn DocumentStore>,
        document_id: String,
        config: EditorConfig,
        model: EditorModel,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let autosave = Autosave::new(
            document_id.clone(),
            store,
            config,
            events.clone(),
            model.title.clone(),
            model.blocks().to_vec(),
        );
        Self {
            document_id,
            model,
            slash: SlashMenu::new(),
            commands: DEFAULT_COMMANDS,
            autosave,
            events,
            focus: None,
            updated_at: None,
        }
    }

    /// Swap the command catalog, e.g. to hide commands a host can't render.
    pub fn with_commands(mut self, commands: &'static [CommandItem]) -> Self {
        self.commands = commands;
        self
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn title(&self) -> &str {
        &self.model.title
    }

    pub fn blocks(&self) -> &[Block] {
        self.model.blocks()
    }

    pub fn model(&self) -> &EditorModel {
        &self.model
    }

    /// Modification time as of the last load or successful manual save.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.events.subscribe()
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.autosave.dirty()
    }

    pub fn save_state(&self) -> SaveState {
        self.autosave.save_state()
    }

    pub fn focus(&self) -> Option<&Cursor> {
        self.focus.as_ref()
    }

    pub fn slash_menu(&self) -> &SlashMenu {
        &self.slash
    }

    pub fn slash_matches(&self) -> Vec<&'static CommandItem> {
        self.slash.filtered(self.commands)
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        let title = title.into();
        if self.model.title == title {
            return;
        }
        self.model.title = title.clone();
        self.autosave.title_changed(title);
    }

    /// Typing into a block. Content starting with `/` opens or refines the
    /// command menu for that block.
    pub fn edit_content(
        &mut self,
        id: &BlockId,
        content: impl Into<String>,
    ) -> Result<Outcome, SessionError> {
        let content = content.into();
        let outcome = self.dispatch(EditorAction::SetContent {
            id: id.clone(),
            content: content.clone(),
        })?;
        if self.slash.update(id, &content) {
            debug!(block = %id, query = ?self.slash.query(), "slash menu updated");
        }
        Ok(outcome)
    }

    pub fn slash_move(&mut self, forward: bool) {
        self.slash.move_selection(forward, self.commands);
    }

    pub fn slash_cancel(&mut self) -> bool {
        self.slash.cancel()
    }

    /// Apply the highlighted command. With no matches the menu stays open and
    /// nothing changes.
    pub fn slash_confirm(&mut self) -> Result<Option<Cursor>, SessionError> {
        let Some((id, command)) = self.slash.confirm(self.commands) else {
            return Ok(None);
        };
        info!(block = %id, command = command.id, "slash command applied");
        let outcome = self.dispatch(EditorAction::ApplyCommand {
            id,
            command: *command,
        })?;
        Ok(outcome.cursor)
    }

    pub fn dispatch(&mut self, action: EditorAction) -> Result<Outcome, SessionError> {
        // The block re-renders with a new type and must take focus back.
        let retyped = matches!(action, EditorAction::ApplyCommand { .. });
        let outcome = self.model.apply(action)?;
        if !outcome.changed {
            return Ok(outcome);
        }

        let blocks = self.model.blocks().to_vec();
        self.autosave.content_changed(blocks.clone());
        self.emit(EditorEvent::BlockListChanged(blocks));

        if let Some(cursor) = &outcome.cursor {
            let moved = self.focus.as_ref().map(|focus| &focus.block) != Some(&cursor.block);
            if outcome.structural || moved || retyped {
                self.emit(EditorEvent::FocusRequested {
                    block: cursor.block.clone(),
                    cursor: cursor.offset,
                });
            }
            self.focus = Some(cursor.clone());
        }
        Ok(outcome)
    }

    pub async fn save_now(&mut self) -> Result<DateTime<Utc>, StoreError> {
        let updated_at = self.autosave.save_now().await?;
        self.updated_at = Some(updated_at);
        Ok(updated_at)
    }

    fn emit(&self, event: EditorEvent) {
        self.events.send(event).ok();
    }
}
