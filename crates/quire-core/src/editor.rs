use crate::blocks::{Block, BlockId, BlockMetadata, BlockType, MediaSource, TextStyle};
use crate::error::EditorError;
use crate::ordering::renumber_in_place;
use crate::slash::{apply_command, CommandItem};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cursor {
    pub block: BlockId,
    pub offset: usize,
}

/// Every mutation of the block list. [`EditorModel::apply`] is the only
/// place blocks change, so renumbering can't be skipped.
#[derive(Clone, Debug)]
pub enum EditorAction {
    SetContent { id: BlockId, content: String },
    SetType { id: BlockId, block_type: BlockType },
    ApplyCommand { id: BlockId, command: CommandItem },
    InsertAfter { id: BlockId },
    Duplicate { id: BlockId },
    Delete { id: BlockId },
    Move { dragged: BlockId, target: BlockId },
    MoveUp { id: BlockId },
    MoveDown { id: BlockId },
    Split { id: BlockId, offset: usize },
    AppendChild { parent: BlockId },
    ToggleChecked { id: BlockId },
    ToggleCollapsed { id: BlockId },
    SetTableSize { id: BlockId, rows: u32, columns: u32 },
    AttachMedia { id: BlockId, media: MediaSource },
    SetStyle { id: BlockId, style: TextStyle },
}

impl EditorAction {
    pub fn target(&self) -> &BlockId {
        match self {
            EditorAction::SetContent { id, .. }
            | EditorAction::SetType { id, .. }
            | EditorAction::ApplyCommand { id, .. }
            | EditorAction::InsertAfter { id }
            | EditorAction::Duplicate { id }
            | EditorAction::Delete { id }
            | EditorAction::MoveUp { id }
            | EditorAction::MoveDown { id }
            | EditorAction::Split { id, .. }
            | EditorAction::ToggleChecked { id }
            | EditorAction::ToggleCollapsed { id }
            | EditorAction::SetTableSize { id, .. }
            | EditorAction::AttachMedia { id, .. }
            | EditorAction::SetStyle { id, .. } => id,
            EditorAction::Move { dragged, .. } => dragged,
            EditorAction::AppendChild { parent } => parent,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    pub changed: bool,
    /// Blocks were added, removed or reordered.
    pub structural: bool,
    pub cursor: Option<Cursor>,
}

impl Outcome {
    fn unchanged() -> Self {
        Self::default()
    }

    fn edited(cursor: Option<Cursor>) -> Self {
        Self {
            changed: true,
            structural: false,
            cursor,
        }
    }

    fn structural(cursor: Option<Cursor>) -> Self {
        Self {
            changed: true,
            structural: true,
            cursor,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EditorModel {
    pub title: String,
    blocks: Vec<Block>,
}

impl EditorModel {
    pub fn new(title: impl Into<String>, blocks: Vec<Block>) -> Self {
        let mut model = Self {
            title: title.into(),
            blocks,
        };
        model.ensure_non_empty();
        renumber_in_place(&mut model.blocks);
        model
    }

    pub fn empty() -> Self {
        Self::new(String::new(), Vec::new())
    }

    fn ensure_non_empty(&mut self) {
        if self.blocks.is_empty() {
            self.blocks.push(Block::paragraph(""));
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn find(&self, id: &BlockId) -> Option<&Block> {
        find_in(&self.blocks, id)
    }

    pub fn position(&self, id: &BlockId) -> Option<usize> {
        self.blocks.iter().position(|block| &block.id == id)
    }

    pub fn apply(&mut self, action: EditorAction) -> Result<Outcome, EditorError> {
        let outcome = match action {
            EditorAction::SetContent { id, content } => {
                let block = self.block_mut(&id)?;
                if block.content == content {
                    Outcome::unchanged()
                } else {
                    let offset = content.len();
                    block.content = content;
                    Outcome::edited(Some(Cursor { block: id, offset }))
                }
            }
            EditorAction::SetType { id, block_type } => {
                let block = self.block_mut(&id)?;
                if block.block_type == block_type {
                    Outcome::unchanged()
                } else {
                    block.set_type(block_type);
                    Outcome::edited(None)
                }
            }
            EditorAction::ApplyCommand { id, command } => {
                let block = self.block_mut(&id)?;
                let applied = apply_command(block, &command);
                Outcome::edited(Some(Cursor {
                    block: id,
                    offset: applied.cursor,
                }))
            }
            EditorAction::InsertAfter { id } => self.insert_after(&id, Block::paragraph(""))?,
            EditorAction::Duplicate { id } => {
                let copy = self.block_mut(&id)?.duplicate();
                self.insert_after(&id, copy)?
            }
            EditorAction::Delete { id } => self.delete_if_empty(&id)?,
            EditorAction::Move { dragged, target } => self.move_block(&dragged, &target)?,
            EditorAction::MoveUp { id } => self.move_by(&id, -1)?,
            EditorAction::MoveDown { id } => self.move_by(&id, 1)?,
            EditorAction::Split { id, offset } => self.split(&id, offset)?,
            EditorAction::AppendChild { parent } => {
                let block = self.block_mut(&parent)?;
                if block.block_type != BlockType::ToggleList {
                    return Err(EditorError::UnsupportedOperation(parent));
                }
                let child = Block::paragraph("");
                let cursor = Cursor {
                    block: child.id.clone(),
                    offset: 0,
                };
                block.children.push(child);
                if let BlockMetadata::Toggle { collapsed } = &mut block.metadata {
                    *collapsed = false;
                }
                Outcome::structural(Some(cursor))
            }
            EditorAction::ToggleChecked { id } => {
                let block = self.block_mut(&id)?;
                match &mut block.metadata {
                    BlockMetadata::Todo { checked } => *checked = !*checked,
                    _ => return Err(EditorError::UnsupportedOperation(id)),
                }
                Outcome::edited(None)
            }
            EditorAction::ToggleCollapsed { id } => {
                let block = self.block_mut(&id)?;
                match &mut block.metadata {
                    BlockMetadata::Toggle { collapsed } => *collapsed = !*collapsed,
                    _ => return Err(EditorError::UnsupportedOperation(id)),
                }
                Outcome::edited(None)
            }
            EditorAction::SetTableSize { id, rows, columns } => {
                let block = self.block_mut(&id)?;
                match &mut block.metadata {
                    BlockMetadata::Table {
                        rows: current_rows,
                        columns: current_columns,
                    } => {
                        *current_rows = rows.max(1);
                        *current_columns = columns.max(1);
                    }
                    _ => return Err(EditorError::UnsupportedOperation(id)),
                }
                Outcome::edited(None)
            }
            EditorAction::AttachMedia { id, media } => {
                let block = self.block_mut(&id)?;
                if !block.block_type.is_media() {
                    return Err(EditorError::UnsupportedOperation(id));
                }
                block.metadata = BlockMetadata::Media(media);
                Outcome::edited(None)
            }
            EditorAction::SetStyle { id, style } => {
                let block = self.block_mut(&id)?;
                if block.style == style {
                    Outcome::unchanged()
                } else {
                    block.style = style;
                    Outcome::edited(None)
                }
            }
        };

        if outcome.changed {
            renumber_in_place(&mut self.blocks);
        }
        Ok(outcome)
    }

    fn block_mut(&mut self, id: &BlockId) -> Result<&mut Block, EditorError> {
        find_in_mut(&mut self.blocks, id).ok_or_else(|| EditorError::BlockNotFound(id.clone()))
    }

    fn siblings_mut(&mut self, id: &BlockId) -> Result<(&mut Vec<Block>, usize), EditorError> {
        siblings_of(&mut self.blocks, id).ok_or_else(|| EditorError::BlockNotFound(id.clone()))
    }

    fn insert_after(&mut self, id: &BlockId, block: Block) -> Result<Outcome, EditorError> {
        let offset = block.content.len();
        let cursor = Cursor {
            block: block.id.clone(),
            offset,
        };
        let (siblings, ix) = self.siblings_mut(id)?;
        siblings.insert(ix + 1, block);
        Ok(Outcome::structural(Some(cursor)))
    }

    fn split(&mut self, id: &BlockId, offset: usize) -> Result<Outcome, EditorError> {
        let block = self.block_mut(id)?;
        let mut cursor = offset.min(block.content.len());
        while cursor > 0 && !block.content.is_char_boundary(cursor) {
            cursor -= 1;
        }
        let after = block.content.split_off(cursor);
        // Enter on a list item continues the list; everything else continues
        // as a paragraph.
        let next_type = if block.block_type.is_list() {
            block.block_type
        } else {
            BlockType::Paragraph
        };
        let next = Block::new(next_type).with_content(after);
        let next_id = next.id.clone();
        self.insert_after(id, next)?;
        Ok(Outcome::structural(Some(Cursor {
            block: next_id,
            offset: 0,
        })))
    }

    /// Backspace on an empty block. The last top-level block is never removed,
    /// and blocks with text or children are left alone.
    fn delete_if_empty(&mut self, id: &BlockId) -> Result<Outcome, EditorError> {
        let top_level = self.position(id).is_some();
        if top_level && self.blocks.len() <= 1 {
            return Ok(Outcome::unchanged());
        }
        let (siblings, ix) = self.siblings_mut(id)?;
        if !siblings[ix].is_empty() || !siblings[ix].children.is_empty() {
            return Ok(Outcome::unchanged());
        }
        siblings.remove(ix);
        let focus = if siblings.is_empty() {
            None
        } else {
            let focus_ix = ix.saturating_sub(1);
            Some(Cursor {
                block: siblings[focus_ix].id.clone(),
                offset: siblings[focus_ix].content.len(),
            })
        };
        Ok(Outcome::structural(focus))
    }

    /// Drag and drop: take `dragged` out and put it where `target` was.
    fn move_block(&mut self, dragged: &BlockId, target: &BlockId) -> Result<Outcome, EditorError> {
        let (siblings, from) = self.siblings_mut(dragged)?;
        let Some(to) = siblings.iter().position(|block| &block.id == target) else {
            return Err(EditorError::BlockNotFound(target.clone()));
        };
        if from == to {
            return Ok(Outcome::unchanged());
        }
        let block = siblings.remove(from);
        siblings.insert(to, block);
        Ok(Outcome::structural(None))
    }

    fn move_by(&mut self, id: &BlockId, direction: i32) -> Result<Outcome, EditorError> {
        let (siblings, from) = self.siblings_mut(id)?;
        let to = if direction < 0 {
            match from.checked_sub(1) {
                Some(to) => to,
                None => return Ok(Outcome::unchanged()),
            }
        } else {
            if from + 1 >= siblings.len() {
                return Ok(Outcome::unchanged());
            }
            from + 1
        };
        siblings.swap(from, to);
        Ok(Outcome::structural(None))
    }
}

fn find_in<'a>(blocks: &'a [Block], id: &BlockId) -> Option<&'a Block> {
    for block in blocks {
        if &block.id == id {
            return Some(block);
        }
        if let Some(found) = find_in(&block.children, id) {
            return Some(found);
        }
    }
    None
}

fn find_in_mut<'a>(blocks: &'a mut [Block], id: &BlockId) -> Option<&'a mut Block> {
    for block in blocks {
        if &block.id == id {
            return Some(block);
        }
        if let Some(found) = find_in_mut(&mut block.children, id) {
            return Some(found);
        }
    }
    None
}

fn siblings_of<'a>(blocks: &'a mut Vec<Block>, id: &BlockId) -> Option<(&'a mut Vec<Block>, usize)> {
    if let Some(ix) = blocks.iter().position(|block| &block.id == id) {
        return Some((blocks, ix));
    }
    for block in blocks.iter_mut() {
        if let Some(found) = siblings_of(&mut block.children, id) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordering::check_invariants;
    use crate::slash::DEFAULT_COMMANDS;

    fn block(id: &str, text: &str) -> Block {
        let mut block = Block::paragraph(text);
        block.id = BlockId::from(id);
        block
    }

    fn ids(model: &EditorModel) -> Vec<&str> {
        model.blocks().iter().map(|block| block.id.as_str()).collect()
    }

    fn id(value: &str) -> BlockId {
        BlockId::from(value)
    }

    #[test]
    fn new_model_is_never_empty() {
        let model = EditorModel::empty();
        assert_eq!(model.len(), 1);
        assert_eq!(model.blocks()[0].block_type, BlockType::Paragraph);
    }

    #[test]
    fn insert_after_places_empty_paragraph() {
        let mut model = EditorModel::new("", vec![block("a", "one"), block("b", "two")]);
        let outcome = model.apply(EditorAction::InsertAfter { id: id("a") }).unwrap();
        assert!(outcome.structural);
        assert_eq!(model.len(), 3);
        assert_eq!(model.blocks()[1].content, "");
        assert_eq!(model.blocks()[2].id.as_str(), "b");
        assert_eq!(outcome.cursor.map(|cursor| cursor.block), Some(model.blocks()[1].id.clone()));
        assert_eq!(check_invariants(model.blocks()), Ok(()));
    }

    #[test]
    fn duplicate_copies_type_and_metadata() {
        let mut table = block("t", "");
        table.set_type(BlockType::Table);
        let mut model = EditorModel::new("", vec![table]);
        model
            .apply(EditorAction::SetTableSize {
                id: id("t"),
                rows: 5,
                columns: 2,
            })
            .unwrap();
        model.apply(EditorAction::Duplicate { id: id("t") }).unwrap();
        let copy = &model.blocks()[1];
        assert_ne!(copy.id.as_str(), "t");
        assert_eq!(copy.block_type, BlockType::Table);
        assert_eq!(copy.metadata, BlockMetadata::Table { rows: 5, columns: 2 });
    }

    #[test]
    fn delete_keeps_single_block() {
        let mut model = EditorModel::new("", vec![block("a", "")]);
        let outcome = model.apply(EditorAction::Delete { id: id("a") }).unwrap();
        assert!(!outcome.changed);
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn delete_ignores_non_empty_block() {
        let mut model = EditorModel::new("", vec![block("a", "one"), block("b", "two")]);
        let outcome = model.apply(EditorAction::Delete { id: id("b") }).unwrap();
        assert!(!outcome.changed);
        assert_eq!(model.len(), 2);
    }

    #[test]
    fn delete_empty_block_focuses_previous() {
        let mut model = EditorModel::new(
            "",
            vec![block("a", "one"), block("b", ""), block("c", "two")],
        );
        let outcome = model.apply(EditorAction::Delete { id: id("b") }).unwrap();
        assert_eq!(ids(&model), vec!["a", "c"]);
        assert_eq!(
            outcome.cursor,
            Some(Cursor {
                block: id("a"),
                offset: 3
            })
        );
        assert_eq!(check_invariants(model.blocks()), Ok(()));
    }

    #[test]
    fn move_down_lands_after_target() {
        let mut model = EditorModel::new(
            "",
            vec![block("a", "1"), block("b", "2"), block("c", "3"), block("d", "4")],
        );
        model
            .apply(EditorAction::Move {
                dragged: id("a"),
                target: id("c"),
            })
            .unwrap();
        assert_eq!(ids(&model), vec!["b", "c", "a", "d"]);
        assert_eq!(check_invariants(model.blocks()), Ok(()));
    }

    #[test]
    fn move_up_lands_before_target() {
        let mut model = EditorModel::new(
            "",
            vec![block("a", "1"), block("b", "2"), block("c", "3"), block("d", "4")],
        );
        model
            .apply(EditorAction::Move {
                dragged: id("d"),
                target: id("b"),
            })
            .unwrap();
        assert_eq!(ids(&model), vec!["a", "d", "b", "c"]);
    }

    #[test]
    fn move_reports_unknown_blocks() {
        let mut model = EditorModel::new("", vec![block("a", "1"), block("b", "2")]);
        let err = model
            .apply(EditorAction::Move {
                dragged: id("a"),
                target: id("zzz"),
            })
            .unwrap_err();
        assert_eq!(err, EditorError::BlockNotFound(id("zzz")));
        assert_eq!(ids(&model), vec!["a", "b"]);
    }

    #[test]
    fn move_up_and_down_swap_neighbours() {
        let mut model = EditorModel::new("", vec![block("a", "1"), block("b", "2"), block("c", "3")]);
        model.apply(EditorAction::MoveUp { id: id("c") }).unwrap();
        assert_eq!(ids(&model), vec!["a", "c", "b"]);
        model.apply(EditorAction::MoveDown { id: id("a") }).unwrap();
        assert_eq!(ids(&model), vec!["c", "a", "b"]);
        let outcome = model.apply(EditorAction::MoveUp { id: id("c") }).unwrap();
        assert!(!outcome.changed);
    }

    #[test]
    fn split_moves_tail_into_new_block() {
        let mut model = EditorModel::new("", vec![block("a", "hello")]);
        let outcome = model
            .apply(EditorAction::Split {
                id: id("a"),
                offset: 2,
            })
            .unwrap();
        assert_eq!(model.blocks()[0].content, "he");
        assert_eq!(model.blocks()[1].content, "llo");
        assert_eq!(outcome.cursor.map(|cursor| cursor.offset), Some(0));
    }

    #[test]
    fn split_continues_numbered_list() {
        let mut first = block("a", "one");
        first.set_type(BlockType::NumberedList);
        let mut model = EditorModel::new("", vec![first]);
        model
            .apply(EditorAction::Split {
                id: id("a"),
                offset: 3,
            })
            .unwrap();
        assert_eq!(model.blocks()[1].block_type, BlockType::NumberedList);
        assert_eq!(model.blocks()[1].list_index, Some(2));
    }

    #[test]
    fn type_changes_renumber_lists() {
        let mut model = EditorModel::new("", vec![block("a", "x"), block("b", "y")]);
        model
            .apply(EditorAction::SetType {
                id: id("b"),
                block_type: BlockType::NumberedList,
            })
            .unwrap();
        assert_eq!(model.blocks()[1].list_index, Some(1));
        model
            .apply(EditorAction::SetType {
                id: id("a"),
                block_type: BlockType::NumberedList,
            })
            .unwrap();
        assert_eq!(model.blocks()[0].list_index, Some(1));
        assert_eq!(model.blocks()[1].list_index, Some(2));
    }

    #[test]
    fn apply_command_retypes_block() {
        let mut model = EditorModel::new("", vec![block("a", "/numbered")]);
        let command = *DEFAULT_COMMANDS
            .iter()
            .find(|cmd| cmd.id == "numbered-list")
            .unwrap();
        model
            .apply(EditorAction::ApplyCommand { id: id("a"), command })
            .unwrap();
        assert_eq!(model.blocks()[0].block_type, BlockType::NumberedList);
        assert_eq!(model.blocks()[0].content, "");
        assert_eq!(model.blocks()[0].list_index, Some(1));
    }

    #[test]
    fn toggle_children_are_addressable() {
        let mut toggle = block("t", "section");
        toggle.set_type(BlockType::ToggleList);
        let mut model = EditorModel::new("", vec![toggle]);
        let outcome = model.apply(EditorAction::AppendChild { parent: id("t") }).unwrap();
        let child = outcome.cursor.expect("cursor").block;
        model
            .apply(EditorAction::SetContent {
                id: child.clone(),
                content: "nested".into(),
            })
            .unwrap();
        assert_eq!(model.find(&child).map(|block| block.content.as_str()), Some("nested"));
        model.apply(EditorAction::InsertAfter { id: child }).unwrap();
        assert_eq!(model.blocks()[0].children.len(), 2);
        assert_eq!(model.blocks()[0].children[1].order_index, 1);
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn append_child_requires_toggle() {
        let mut model = EditorModel::new("", vec![block("a", "x")]);
        assert_eq!(
            model.apply(EditorAction::AppendChild { parent: id("a") }),
            Err(EditorError::UnsupportedOperation(id("a")))
        );
    }

    #[test]
    fn table_size_is_clamped() {
        let mut table = block("t", "");
        table.set_type(BlockType::Table);
        let mut model = EditorModel::new("", vec![table]);
        model
            .apply(EditorAction::SetTableSize {
                id: id("t"),
                rows: 0,
                columns: 4,
            })
            .unwrap();
        assert_eq!(model.blocks()[0].metadata, BlockMetadata::Table { rows: 1, columns: 4 });
    }

    #[test]
    fn toggle_checked_flips_todo() {
        let mut todo = block("t", "task");
        todo.set_type(BlockType::TodoList);
        let mut model = EditorModel::new("", vec![todo]);
        model.apply(EditorAction::ToggleChecked { id: id("t") }).unwrap();
        assert_eq!(model.blocks()[0].metadata, BlockMetadata::Todo { checked: true });
    }

    #[test]
    fn order_stays_dense_through_mixed_edits() {
        let mut model = EditorModel::new("", vec![block("a", "1")]);
        for _ in 0..4 {
            let last = model.blocks().last().unwrap().id.clone();
            model.apply(EditorAction::InsertAfter { id: last }).unwrap();
        }
        let second = model.blocks()[1].id.clone();
        let last = model.blocks()[4].id.clone();
        model.apply(EditorAction::Delete { id: second }).unwrap();
        model
            .apply(EditorAction::Move {
                dragged: last,
                target: id("a"),
            })
            .unwrap();
        let indices: Vec<usize> = model.blocks().iter().map(|block| block.order_index).collect();
        assert_eq!(indices, (0..model.len()).collect::<Vec<_>>());
    }
}
