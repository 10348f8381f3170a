use crate::blocks::{Block, BlockId, BlockMetadata, BlockType, MediaSource};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transform {
    pub content: String,
    pub cursor: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct CommandItem {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub shortcut: Option<&'static str>,
    pub target: BlockType,
    pub transform: fn(&str) -> Transform,
}

fn keep_content(content: &str) -> Transform {
    Transform {
        content: content.to_string(),
        cursor: content.len(),
    }
}

/// Dividers carry no text, so anything typed after the command is dropped.
fn clear_content(_content: &str) -> Transform {
    Transform {
        content: String::new(),
        cursor: 0,
    }
}

const fn command(
    id: &'static str,
    title: &'static str,
    description: &'static str,
    category: &'static str,
    shortcut: Option<&'static str>,
    target: BlockType,
) -> CommandItem {
    CommandItem {
        id,
        title,
        description,
        category,
        shortcut,
        target,
        transform: keep_content,
    }
}

pub const DEFAULT_COMMANDS: &[CommandItem] = &[
    command(
        "paragraph",
        "Text",
        "Just start writing with plain text",
        "Basic Blocks",
        Some("Just start typing"),
        BlockType::Paragraph,
    ),
    command(
        "heading-1",
        "Heading 1",
        "Large section heading",
        "Basic Blocks",
        Some("#"),
        BlockType::Heading1,
    ),
    command(
        "heading-2",
        "Heading 2",
        "Medium section heading",
        "Basic Blocks",
        Some("##"),
        BlockType::Heading2,
    ),
    command(
        "heading-3",
        "Heading 3",
        "Small section heading",
        "Basic Blocks",
        Some("###"),
        BlockType::Heading3,
    ),
    command(
        "bulleted-list",
        "Bulleted list",
        "Simple bulleted list",
        "Lists",
        Some("-"),
        BlockType::BulletedList,
    ),
    command(
        "numbered-list",
        "Numbered list",
        "Ordered numbered list",
        "Lists",
        Some("1."),
        BlockType::NumberedList,
    ),
    command(
        "toggle-list",
        "Toggle list",
        "Collapsible list with toggle",
        "Lists",
        Some(">"),
        BlockType::ToggleList,
    ),
    command(
        "todo-list",
        "To-do list",
        "Checkbox task list",
        "Lists",
        Some("[ ]"),
        BlockType::TodoList,
    ),
    command(
        "quote",
        "Quote",
        "Blockquote for citations",
        "Media & Content",
        Some(">"),
        BlockType::Quote,
    ),
    command(
        "code-block",
        "Code block",
        "Code snippet with syntax highlighting",
        "Media & Content",
        Some("```"),
        BlockType::CodeBlock,
    ),
    CommandItem {
        id: "divider",
        title: "Divider",
        description: "Horizontal line separator",
        category: "Media & Content",
        shortcut: Some("---"),
        target: BlockType::Divider,
        transform: clear_content,
    },
    command(
        "image",
        "Image",
        "Insert an image",
        "Media & Content",
        Some("!"),
        BlockType::Image,
    ),
    command(
        "video",
        "Video",
        "Insert a video",
        "Media & Content",
        Some("!"),
        BlockType::Video,
    ),
    command(
        "bookmark",
        "Bookmark",
        "Save a link with preview",
        "Media & Content",
        Some("!"),
        BlockType::Bookmark,
    ),
    command(
        "table",
        "Table",
        "Data table with rows and columns",
        "Advanced",
        Some("/table"),
        BlockType::Table,
    ),
    command(
        "callout",
        "Callout",
        "Highlighted information box",
        "Advanced",
        Some("/callout"),
        BlockType::Callout,
    ),
    command(
        "columns",
        "Columns",
        "Multi-column layout",
        "Advanced",
        Some("/columns"),
        BlockType::Columns,
    ),
    command(
        "math",
        "Math",
        "Mathematical equations",
        "Advanced",
        Some("/math"),
        BlockType::Math,
    ),
    command(
        "mention",
        "Mention",
        "Mention a person or page",
        "References",
        Some("@"),
        BlockType::Mention,
    ),
    command(
        "page-reference",
        "Page reference",
        "Link to another page",
        "References",
        Some("/page"),
        BlockType::PageReference,
    ),
    command(
        "database-reference",
        "Database",
        "Reference a database",
        "References",
        Some("/database"),
        BlockType::DatabaseReference,
    ),
];

/// Case-insensitive substring match of the command token on title,
/// description or category. Results keep catalog order.
pub fn filter_commands<'a>(query: &str, commands: &'a [CommandItem]) -> Vec<&'a CommandItem> {
    filter_commands_in(query, None, commands)
}

/// [`filter_commands`] restricted to one category; `None` means all.
///
/// Only the token before the first whitespace takes part, the same token
/// [`strip_command_token`] removes when the command is applied. `/quote hello`
/// filters on `quote` and keeps `hello` as content.
pub fn filter_commands_in<'a>(
    query: &str,
    category: Option<&str>,
    commands: &'a [CommandItem],
) -> Vec<&'a CommandItem> {
    let token = command_token(query).to_lowercase();
    commands
        .iter()
        .filter(|cmd| category.map_or(true, |category| cmd.category == category))
        .filter(|cmd| {
            token.is_empty()
                || cmd.title.to_lowercase().contains(&token)
                || cmd.description.to_lowercase().contains(&token)
                || cmd.category.to_lowercase().contains(&token)
        })
        .collect()
}

/// Distinct categories in catalog order.
pub fn categories(commands: &[CommandItem]) -> Vec<&'static str> {
    let mut seen = Vec::new();
    for cmd in commands {
        if !seen.contains(&cmd.category) {
            seen.push(cmd.category);
        }
    }
    seen
}

fn command_token(query: &str) -> &str {
    let end = query.find(char::is_whitespace).unwrap_or(query.len());
    &query[..end]
}

pub fn cycle_index(current: usize, len: usize, forward: bool) -> usize {
    if len == 0 {
        return 0;
    }
    if forward {
        (current + 1) % len
    } else {
        current.checked_sub(1).unwrap_or(len.saturating_sub(1))
    }
}

/// Content with the leading `/token` and the whitespace after it removed.
/// Content that does not start with `/` is returned unchanged.
pub fn strip_command_token(content: &str) -> &str {
    let Some(rest) = content.strip_prefix('/') else {
        return content;
    };
    rest[command_token(rest).len()..].trim_start()
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SlashState {
    #[default]
    Idle,
    Composing {
        block: BlockId,
        query: String,
        selected: usize,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlashMenu {
    state: SlashState,
}

impl SlashMenu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SlashState {
        &self.state
    }

    pub fn is_composing(&self) -> bool {
        matches!(self.state, SlashState::Composing { .. })
    }

    pub fn block(&self) -> Option<&BlockId> {
        match &self.state {
            SlashState::Composing { block, .. } => Some(block),
            SlashState::Idle => None,
        }
    }

    pub fn query(&self) -> Option<&str> {
        match &self.state {
            SlashState::Composing { query, .. } => Some(query),
            SlashState::Idle => None,
        }
    }

    pub fn selected_index(&self) -> usize {
        match &self.state {
            SlashState::Composing { selected, .. } => *selected,
            SlashState::Idle => 0,
        }
    }

    /// Track a content edit. Returns whether the composing state changed
    /// (opened, closed, or a new filter).
    pub fn update(&mut self, block_id: &BlockId, content: &str) -> bool {
        let Some(query) = content.strip_prefix('/') else {
            return self.cancel();
        };
        if let SlashState::Composing {
            block,
            query: current,
            ..
        } = &self.state
        {
            if block == block_id && current == query {
                return false;
            }
        }
        self.state = SlashState::Composing {
            block: block_id.clone(),
            query: query.to_string(),
            selected: 0,
        };
        true
    }

    pub fn filtered<'a>(&self, commands: &'a [CommandItem]) -> Vec<&'a CommandItem> {
        match &self.state {
            SlashState::Composing { query, .. } => filter_commands(query, commands),
            SlashState::Idle => Vec::new(),
        }
    }

    pub fn move_selection(&mut self, forward: bool, commands: &[CommandItem]) {
        let len = self.filtered(commands).len();
        if let SlashState::Composing { selected, .. } = &mut self.state {
            *selected = cycle_index(*selected, len, forward);
        }
    }

    pub fn highlighted<'a>(&self, commands: &'a [CommandItem]) -> Option<&'a CommandItem> {
        let filtered = self.filtered(commands);
        let ix = self.selected_index().min(filtered.len().saturating_sub(1));
        filtered.get(ix).copied()
    }

    /// Take the highlighted command and return to idle. With an empty result
    /// list nothing happens and composing continues.
    pub fn confirm<'a>(&mut self, commands: &'a [CommandItem]) -> Option<(BlockId, &'a CommandItem)> {
        let command = self.highlighted(commands)?;
        let block = self.block()?.clone();
        self.state = SlashState::Idle;
        Some((block, command))
    }

    pub fn cancel(&mut self) -> bool {
        let was_composing = self.is_composing();
        self.state = SlashState::Idle;
        was_composing
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandOutcome {
    pub cursor: usize,
    pub needs_renumber: bool,
}

pub fn apply_command(block: &mut Block, command: &CommandItem) -> CommandOutcome {
    let previous = block.block_type;
    let Transform { content, cursor } = (command.transform)(strip_command_token(&block.content));

    block.set_type(command.target);
    if command.target.is_media() {
        block.metadata = BlockMetadata::Media(MediaSource::external(content.clone()));
    }
    block.content = content;

    CommandOutcome {
        cursor,
        needs_renumber: previous.is_list() || command.target.is_list(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(id: &str) -> &'static CommandItem {
        DEFAULT_COMMANDS
            .iter()
            .find(|cmd| cmd.id == id)
            .expect("command in catalog")
    }

    #[test]
    fn catalog_covers_every_block_type() {
        use strum::IntoEnumIterator;
        for block_type in BlockType::iter() {
            assert!(
                DEFAULT_COMMANDS.iter().any(|cmd| cmd.target == block_type),
                "no command for {block_type}"
            );
        }
    }

    #[test]
    fn filter_keeps_catalog_order() {
        let filtered = filter_commands("HEAD", DEFAULT_COMMANDS);
        let ids: Vec<&str> = filtered.iter().map(|cmd| cmd.id).collect();
        assert_eq!(ids, vec!["heading-1", "heading-2", "heading-3"]);
    }

    #[test]
    fn filter_matches_description_and_category() {
        let ids: Vec<&str> = filter_commands("checkbox", DEFAULT_COMMANDS)
            .iter()
            .map(|cmd| cmd.id)
            .collect();
        assert_eq!(ids, vec!["todo-list"]);
        assert_eq!(filter_commands("lists", DEFAULT_COMMANDS).len(), 4);
        assert!(filter_commands("xyz", DEFAULT_COMMANDS).is_empty());
        assert_eq!(filter_commands("", DEFAULT_COMMANDS).len(), DEFAULT_COMMANDS.len());
    }

    #[test]
    fn references_share_a_category() {
        let ids: Vec<&str> = filter_commands("reference", DEFAULT_COMMANDS)
            .iter()
            .map(|cmd| cmd.id)
            .collect();
        assert_eq!(ids, vec!["mention", "page-reference", "database-reference"]);
        let ids: Vec<&str> = filter_commands("page", DEFAULT_COMMANDS)
            .iter()
            .map(|cmd| cmd.id)
            .collect();
        assert_eq!(ids, vec!["mention", "page-reference"]);
        assert_eq!(find("callout").description, "Highlighted information box");
    }

    #[test]
    fn category_narrows_the_filter() {
        assert_eq!(
            categories(DEFAULT_COMMANDS),
            vec!["Basic Blocks", "Lists", "Media & Content", "Advanced", "References"]
        );
        let ids: Vec<&str> = filter_commands_in("", Some("Advanced"), DEFAULT_COMMANDS)
            .iter()
            .map(|cmd| cmd.id)
            .collect();
        assert_eq!(ids, vec!["table", "callout", "columns", "math"]);
        let ids: Vec<&str> = filter_commands_in("list", Some("Lists"), DEFAULT_COMMANDS)
            .iter()
            .map(|cmd| cmd.id)
            .collect();
        assert_eq!(ids.len(), 4);
        assert!(filter_commands_in("quote", Some("Lists"), DEFAULT_COMMANDS).is_empty());
    }

    #[test]
    fn filter_uses_only_the_command_token() {
        let ids: Vec<&str> = filter_commands("quote hello", DEFAULT_COMMANDS)
            .iter()
            .map(|cmd| cmd.id)
            .collect();
        assert_eq!(ids, vec!["quote"]);
        assert_eq!(filter_commands(" anything", DEFAULT_COMMANDS).len(), DEFAULT_COMMANDS.len());

        let block = BlockId::from("a");
        let mut menu = SlashMenu::new();
        menu.update(&block, "/quote hello");
        let (_, command) = menu.confirm(DEFAULT_COMMANDS).expect("command");
        let mut target = Block::paragraph("/quote hello");
        apply_command(&mut target, command);
        assert_eq!(target.block_type, BlockType::Quote);
        assert_eq!(target.content, "hello");
    }

    #[test]
    fn cycle_index_wraps_forward() {
        assert_eq!(cycle_index(0, 3, true), 1);
        assert_eq!(cycle_index(2, 3, true), 0);
    }

    #[test]
    fn cycle_index_wraps_backward() {
        assert_eq!(cycle_index(0, 3, false), 2);
        assert_eq!(cycle_index(1, 3, false), 0);
        assert_eq!(cycle_index(4, 0, false), 0);
    }

    #[test]
    fn strip_command_token_removes_token_and_spacing() {
        assert_eq!(strip_command_token("/head"), "");
        assert_eq!(strip_command_token("/quote   hello there"), "hello there");
        assert_eq!(strip_command_token("plain"), "plain");
    }

    #[test]
    fn menu_opens_on_slash_and_closes_without_it() {
        let block = BlockId::from("a");
        let mut menu = SlashMenu::new();
        assert!(menu.update(&block, "/"));
        assert_eq!(menu.query(), Some(""));
        assert!(menu.update(&block, "/he"));
        assert_eq!(menu.query(), Some("he"));
        assert!(!menu.update(&block, "/he"));
        assert!(menu.update(&block, "he"));
        assert!(!menu.is_composing());
    }

    #[test]
    fn selection_wraps_over_filtered_results() {
        let block = BlockId::from("a");
        let mut menu = SlashMenu::new();
        menu.update(&block, "/heading");
        menu.move_selection(false, DEFAULT_COMMANDS);
        assert_eq!(menu.selected_index(), 2);
        menu.move_selection(true, DEFAULT_COMMANDS);
        assert_eq!(menu.selected_index(), 0);
        menu.move_selection(true, DEFAULT_COMMANDS);
        assert_eq!(menu.highlighted(DEFAULT_COMMANDS).map(|cmd| cmd.id), Some("heading-2"));
    }

    #[test]
    fn confirm_with_no_matches_is_a_noop() {
        let block = BlockId::from("a");
        let mut menu = SlashMenu::new();
        menu.update(&block, "/zzz");
        assert!(menu.confirm(DEFAULT_COMMANDS).is_none());
        assert!(menu.is_composing());
    }

    #[test]
    fn confirm_returns_block_and_command() {
        let block = BlockId::from("a");
        let mut menu = SlashMenu::new();
        menu.update(&block, "/quo");
        let (target, command) = menu.confirm(DEFAULT_COMMANDS).expect("command");
        assert_eq!(target, block);
        assert_eq!(command.id, "quote");
        assert!(!menu.is_composing());
    }

    #[test]
    fn apply_heading_strips_token() {
        let mut block = Block::paragraph("/head");
        let outcome = apply_command(&mut block, find("heading-1"));
        assert_eq!(block.block_type, BlockType::Heading1);
        assert_eq!(block.content, "");
        assert_eq!(outcome.cursor, 0);
        assert!(!outcome.needs_renumber);
    }

    #[test]
    fn apply_keeps_text_after_token() {
        let mut block = Block::paragraph("/numbered buy milk");
        let outcome = apply_command(&mut block, find("numbered-list"));
        assert_eq!(block.block_type, BlockType::NumberedList);
        assert_eq!(block.content, "buy milk");
        assert_eq!(outcome.cursor, "buy milk".len());
        assert!(outcome.needs_renumber);
    }

    #[test]
    fn apply_divider_discards_text() {
        let mut block = Block::paragraph("/divider leftover");
        apply_command(&mut block, find("divider"));
        assert_eq!(block.block_type, BlockType::Divider);
        assert_eq!(block.content, "");
    }

    #[test]
    fn apply_image_initializes_media_metadata() {
        let mut block = Block::paragraph("/image https://cdn.test/cat.png");
        apply_command(&mut block, find("image"));
        assert_eq!(block.block_type, BlockType::Image);
        assert_eq!(
            block.metadata,
            BlockMetadata::Media(MediaSource::external("https://cdn.test/cat.png"))
        );
    }

    #[test]
    fn apply_table_initializes_dimensions() {
        let mut block = Block::paragraph("/table");
        apply_command(&mut block, find("table"));
        assert_eq!(block.metadata, BlockMetadata::Table { rows: 3, columns: 3 });
    }
}
