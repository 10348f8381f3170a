use crate::blocks::{Block, BlockId};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use strum::{Display, IntoStaticStr};

/// Which part of the document a save covered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SaveField {
    Title,
    Content,
    /// Manual save of title and content together.
    Document,
}

/// Notifications for the rendering layer.
#[derive(Clone, Debug, PartialEq)]
pub enum EditorEvent {
    BlockListChanged(Vec<Block>),
    DirtyStateChanged { title: bool, content: bool },
    SavingStateChanged(bool),
    Saved { field: SaveField, updated_at: DateTime<Utc> },
    SaveFailed { field: SaveField, error: StoreError },
    FocusRequested { block: BlockId, cursor: usize },
}
