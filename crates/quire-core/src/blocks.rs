use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BlockId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum BlockType {
    #[default]
    #[strum(to_string = "paragraph", serialize = "text")]
    Paragraph,
    #[strum(serialize = "heading-1")]
    Heading1,
    #[strum(serialize = "heading-2")]
    Heading2,
    #[strum(serialize = "heading-3")]
    Heading3,
    BulletedList,
    NumberedList,
    ToggleList,
    TodoList,
    Quote,
    CodeBlock,
    Divider,
    Table,
    Image,
    Video,
    Bookmark,
    Callout,
    Columns,
    Math,
    Mention,
    PageReference,
    DatabaseReference,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            BlockType::BulletedList
                | BlockType::NumberedList
                | BlockType::ToggleList
                | BlockType::TodoList
        )
    }

    pub fn is_media(&self) -> bool {
        matches!(self, BlockType::Image | BlockType::Video)
    }

    pub fn is_text_editable(&self) -> bool {
        !matches!(self, BlockType::Divider)
    }
}

impl Serialize for BlockType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BlockType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BlockType::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaMode {
    Upload,
    #[default]
    External,
}

/// Where an image or video comes from. Uploads carry the storage details the
/// upload layer reported; external media only has a URL.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaSource {
    pub url: String,
    pub mode: MediaMode,
    pub alt: Option<String>,
    pub file_path: Option<String>,
    pub original_filename: Option<String>,
    pub file_size: Option<u64>,
    pub mime_type: Option<String>,
}

impl MediaSource {
    pub fn external(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: MediaMode::External,
            ..Self::default()
        }
    }
}

pub const DEFAULT_TABLE_ROWS: u32 = 3;
pub const DEFAULT_TABLE_COLUMNS: u32 = 3;

/// Per-type block metadata. Each variant carries only what its block types
/// need; everything else in a stored metadata bag is kept in [`Block::extra`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BlockMetadata {
    #[default]
    Plain,
    Todo {
        checked: bool,
    },
    Toggle {
        collapsed: bool,
    },
    Code {
        language: Option<String>,
    },
    Table {
        rows: u32,
        columns: u32,
    },
    Media(MediaSource),
}

impl BlockMetadata {
    pub fn default_for(block_type: BlockType) -> Self {
        match block_type {
            BlockType::TodoList => BlockMetadata::Todo { checked: false },
            BlockType::ToggleList => BlockMetadata::Toggle { collapsed: false },
            BlockType::CodeBlock => BlockMetadata::Code { language: None },
            BlockType::Table => BlockMetadata::Table {
                rows: DEFAULT_TABLE_ROWS,
                columns: DEFAULT_TABLE_COLUMNS,
            },
            BlockType::Image | BlockType::Video => BlockMetadata::Media(MediaSource::default()),
            _ => BlockMetadata::Plain,
        }
    }

    pub fn fits(&self, block_type: BlockType) -> bool {
        matches!(
            (self, block_type),
            (BlockMetadata::Todo { .. }, BlockType::TodoList)
                | (BlockMetadata::Toggle { .. }, BlockType::ToggleList)
                | (BlockMetadata::Code { .. }, BlockType::CodeBlock)
                | (BlockMetadata::Table { .. }, BlockType::Table)
                | (BlockMetadata::Media(_), BlockType::Image | BlockType::Video)
        ) || (matches!(self, BlockMetadata::Plain)
            && matches!(BlockMetadata::default_for(block_type), BlockMetadata::Plain))
    }

    fn write_bag(&self, bag: &mut Map<String, Value>) {
        match self {
            BlockMetadata::Plain => {}
            BlockMetadata::Todo { checked } => {
                bag.insert("checked".into(), Value::Bool(*checked));
            }
            BlockMetadata::Toggle { collapsed } => {
                bag.insert("collapsed".into(), Value::Bool(*collapsed));
            }
            BlockMetadata::Code { language } => {
                if let Some(language) = language {
                    bag.insert("language".into(), Value::String(language.clone()));
                }
            }
            BlockMetadata::Table { rows, columns } => {
                bag.insert("rows".into(), Value::from(*rows));
                bag.insert("columns".into(), Value::from(*columns));
            }
            BlockMetadata::Media(media) => {
                bag.insert("url".into(), Value::String(media.url.clone()));
                let mode = match media.mode {
                    MediaMode::Upload => "upload",
                    MediaMode::External => "external",
                };
                bag.insert("mode".into(), Value::String(mode.into()));
                insert_opt_str(bag, "alt", &media.alt);
                insert_opt_str(bag, "filePath", &media.file_path);
                insert_opt_str(bag, "originalFilename", &media.original_filename);
                if let Some(size) = media.file_size {
                    bag.insert("fileSize".into(), Value::from(size));
                }
                insert_opt_str(bag, "mimeType", &media.mime_type);
            }
        }
    }

    fn read_bag(block_type: BlockType, bag: &mut Map<String, Value>, fallback_url: &str) -> Self {
        match block_type {
            BlockType::TodoList => BlockMetadata::Todo {
                checked: take_bool(bag, "checked").unwrap_or(false),
            },
            BlockType::ToggleList => BlockMetadata::Toggle {
                collapsed: take_bool(bag, "collapsed").unwrap_or(false),
            },
            BlockType::CodeBlock => BlockMetadata::Code {
                language: take_str(bag, "language"),
            },
            BlockType::Table => BlockMetadata::Table {
                rows: take_u32(bag, "rows").unwrap_or(DEFAULT_TABLE_ROWS).max(1),
                columns: take_u32(bag, "columns")
                    .unwrap_or(DEFAULT_TABLE_COLUMNS)
                    .max(1),
            },
            BlockType::Image | BlockType::Video => {
                let mode = match take_str(bag, "mode").as_deref() {
                    Some("upload") => MediaMode::Upload,
                    _ => MediaMode::External,
                };
                // Old documents kept the url only in the content field.
                let url = take_str(bag, "url").unwrap_or_else(|| fallback_url.to_string());
                BlockMetadata::Media(MediaSource {
                    url,
                    mode,
                    alt: take_str(bag, "alt"),
                    file_path: take_str(bag, "filePath"),
                    original_filename: take_str(bag, "originalFilename"),
                    file_size: bag.remove("fileSize").and_then(|value| value.as_u64()),
                    mime_type: take_str(bag, "mimeType"),
                })
            }
            _ => BlockMetadata::Plain,
        }
    }
}

/// Whole-block formatting flags. There are no ranged marks: a flag applies to
/// the entire content of the block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub code: bool,
    pub link: Option<String>,
}

const STYLE_FLAGS: [&str; 5] = ["isBold", "isItalic", "isUnderlined", "isStrikethrough", "isCode"];

impl TextStyle {
    pub fn is_plain(&self) -> bool {
        *self == TextStyle::default()
    }

    fn flags_mut(&mut self) -> [&mut bool; 5] {
        [
            &mut self.bold,
            &mut self.italic,
            &mut self.underline,
            &mut self.strikethrough,
            &mut self.code,
        ]
    }

    fn write_bag(&self, bag: &mut Map<String, Value>) {
        let flags = [self.bold, self.italic, self.underline, self.strikethrough, self.code];
        for (key, on) in STYLE_FLAGS.iter().zip(flags) {
            if on {
                bag.insert((*key).into(), Value::Bool(true));
            }
        }
        insert_opt_str(bag, "link", &self.link);
    }

    fn read_bag(bag: &mut Map<String, Value>) -> Self {
        let mut style = TextStyle::default();
        for (key, flag) in STYLE_FLAGS.iter().zip(style.flags_mut()) {
            *flag = take_bool(bag, key).unwrap_or(false);
        }
        style.link = take_str(bag, "link");
        style
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub block_type: BlockType,
    pub content: String,
    pub metadata: BlockMetadata,
    pub style: TextStyle,
    pub order_index: usize,
    pub list_index: Option<usize>,
    pub children: Vec<Block>,
    /// Metadata keys this crate does not interpret, written back untouched.
    pub extra: Map<String, Value>,
    /// Top-level keys of the stored entry this crate does not interpret.
    pub extra_fields: Map<String, Value>,
}

impl Block {
    pub fn new(block_type: BlockType) -> Self {
        Self {
            id: BlockId::new(),
            block_type,
            content: String::new(),
            metadata: BlockMetadata::default_for(block_type),
            style: TextStyle::default(),
            order_index: 0,
            list_index: None,
            children: Vec::new(),
            extra: Map::new(),
            extra_fields: Map::new(),
        }
    }

    pub fn paragraph(content: impl Into<String>) -> Self {
        Self::new(BlockType::Paragraph).with_content(content)
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_metadata(mut self, metadata: BlockMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Switch the block type, keeping metadata only if it still fits.
    pub fn set_type(&mut self, block_type: BlockType) {
        self.block_type = block_type;
        if !self.metadata.fits(block_type) {
            self.metadata = BlockMetadata::default_for(block_type);
        }
    }

    /// Copy with a fresh id, for drag-duplicate. Children get fresh ids too.
    pub fn duplicate(&self) -> Self {
        let mut copy = self.clone();
        copy.id = BlockId::new();
        copy.children = self.children.iter().map(Block::duplicate).collect();
        copy
    }

    pub fn metadata_bag(&self) -> Map<String, Value> {
        let mut bag = self.extra.clone();
        self.metadata.write_bag(&mut bag);
        self.style.write_bag(&mut bag);
        bag
    }

    /// Build a block from one stored JSON entry, repairing whatever is missing
    /// or malformed instead of rejecting it.
    pub fn from_value(value: Value) -> Self {
        let mut object = match value {
            Value::Object(object) => object,
            Value::String(content) => {
                tracing::warn!("stored block was a bare string; repairing as paragraph");
                return Block::paragraph(content);
            }
            other => {
                tracing::warn!(value = %other, "stored block was not an object; repairing as paragraph");
                return Block::paragraph(String::new());
            }
        };

        let id = match object.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => BlockId::from(id),
            Some(Value::Number(id)) => BlockId::from(id.to_string()),
            _ => {
                tracing::warn!("stored block had no id; generating one");
                BlockId::new()
            }
        };

        let block_type = match object.remove("type") {
            Some(Value::String(raw)) => BlockType::from_str(&raw).unwrap_or_else(|_| {
                tracing::warn!(block_type = %raw, "unknown block type; repairing as paragraph");
                BlockType::Paragraph
            }),
            _ => BlockType::Paragraph,
        };

        let content = match object.remove("content") {
            Some(Value::String(content)) => content,
            None | Some(Value::Null) => String::new(),
            Some(other) => other.to_string(),
        };

        let mut bag = match object.remove("metadata") {
            Some(Value::Object(bag)) => bag,
            _ => Map::new(),
        };
        // Early todo blocks stored the flag beside the metadata.
        if let Some(checked) = object.remove("checked") {
            bag.entry("checked").or_insert(checked);
        }

        let metadata = BlockMetadata::read_bag(block_type, &mut bag, &content);
        let style = TextStyle::read_bag(&mut bag);

        let order_index = object
            .remove("orderIndex")
            .and_then(|value| value.as_u64())
            .map(|value| value as usize)
            .unwrap_or(0);

        let children = match object.remove("children") {
            Some(Value::Array(children)) => children.into_iter().map(Block::from_value).collect(),
            _ => Vec::new(),
        };
        // Recomputed on every renumber.
        object.remove("listIndex");

        Block {
            id,
            block_type,
            content,
            metadata,
            style,
            order_index,
            list_index: None,
            children,
            extra: bag,
            extra_fields: object,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut object = self.extra_fields.clone();
        object.insert("id".into(), Value::String(self.id.to_string()));
        object.insert("type".into(), Value::String(self.block_type.as_str().into()));
        object.insert("content".into(), Value::String(self.content.clone()));
        object.insert("metadata".into(), Value::Object(self.metadata_bag()));
        object.insert("orderIndex".into(), Value::from(self.order_index));
        if let Some(list_index) = self.list_index {
            object.insert("listIndex".into(), Value::from(list_index));
        }
        if !self.children.is_empty() {
            let children = self.children.iter().map(Block::to_value).collect();
            object.insert("children".into(), Value::Array(children));
        }
        Value::Object(object)
    }
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Block {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Block::from_value(Value::deserialize(deserializer)?))
    }
}

/// Decode a stored block array. Entries are ordered by their stored
/// `orderIndex`, falling back to array position; a non-array value yields
/// `None` so the caller can fall back to the legacy text.
pub fn blocks_from_value(value: Value) -> Option<Vec<Block>> {
    let Value::Array(entries) = value else {
        return None;
    };
    let mut keyed: Vec<(usize, Block)> = entries
        .into_iter()
        .enumerate()
        .map(|(position, entry)| {
            let stored = entry
                .get("orderIndex")
                .and_then(Value::as_u64)
                .map(|value| value as usize)
                .unwrap_or(position);
            (stored, Block::from_value(entry))
        })
        .collect();
    keyed.sort_by_key(|(stored, _)| *stored);
    Some(keyed.into_iter().map(|(_, block)| block).collect())
}

pub fn blocks_to_value(blocks: &[Block]) -> Value {
    Value::Array(blocks.iter().map(Block::to_value).collect())
}

fn insert_opt_str(bag: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        bag.insert(key.into(), Value::String(value.clone()));
    }
}

fn take_bool(bag: &mut Map<String, Value>, key: &str) -> Option<bool> {
    match bag.remove(key) {
        Some(Value::Bool(value)) => Some(value),
        Some(other) => {
            bag.insert(key.into(), other);
            None
        }
        None => None,
    }
}

fn take_str(bag: &mut Map<String, Value>, key: &str) -> Option<String> {
    match bag.remove(key) {
        Some(Value::String(value)) => Some(value),
        Some(Value::Null) | None => None,
        Some(other) => {
            bag.insert(key.into(), other);
            None
        }
    }
}

fn take_u32(bag: &mut Map<String, Value>, key: &str) -> Option<u32> {
    let value = bag.remove(key)?;
    match value.as_u64().and_then(|value| u32::try_from(value).ok()) {
        Some(value) => Some(value),
        None => {
            bag.insert(key.into(), value);
            None
        }
    }
}
