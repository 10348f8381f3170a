pub mod autosave;
pub mod blocks;
pub mod config;
pub mod db;
pub mod editor;
pub mod error;
pub mod events;
pub mod legacy;
pub mod ordering;
pub mod session;
pub mod slash;
pub mod store;

pub use autosave::{Autosave, DirtyFlags, SaveState};
pub use blocks::{Block, BlockId, BlockMetadata, BlockType, MediaMode, MediaSource, TextStyle};
pub use config::{ConfigStore, EditorConfig};
pub use db::SqliteStore;
pub use editor::{Cursor, EditorAction, EditorModel, Outcome};
pub use error::{ConfigError, EditorError, SessionError, StoreError};
pub use events::{EditorEvent, SaveField};
pub use session::EditorSession;
pub use slash::{CommandItem, SlashMenu, DEFAULT_COMMANDS};
pub use store::{DocumentStore, DocumentUpdate, MemoryStore, StoredDocument};
