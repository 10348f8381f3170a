//! Flat-text content from before documents stored blocks.
//!
//! [`parse`] runs once when a document has no structured blocks; its output is
//! ordinary editable state afterwards. [`to_legacy_text`] renders blocks back
//! into the same line conventions so the text column stays readable.

use crate::blocks::{Block, BlockMetadata, BlockType, MediaSource};
use crate::ordering::renumber;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "ico"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "mov", "m4v"];

#[derive(Clone, Debug, PartialEq, Eq)]
enum Line<'a> {
    Blank,
    Heading(BlockType, &'a str),
    Todo { checked: bool, text: &'a str },
    Bullet(&'a str),
    Numbered(&'a str),
    Quote(&'a str),
    Fence { language: Option<&'a str> },
    Divider,
    Media(BlockType, &'a str),
    Text(&'a str),
}

fn classify(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Line::Blank;
    }
    if let Some(rest) = line.strip_prefix("### ") {
        return Line::Heading(BlockType::Heading3, rest);
    }
    if let Some(rest) = line.strip_prefix("## ") {
        return Line::Heading(BlockType::Heading2, rest);
    }
    if let Some(rest) = line.strip_prefix("# ") {
        return Line::Heading(BlockType::Heading1, rest);
    }
    if let Some((checked, text)) = parse_todo_item(line) {
        return Line::Todo { checked, text };
    }
    if let Some(rest) = line.strip_prefix("- ") {
        return Line::Bullet(rest);
    }
    if let Some(rest) = parse_numbered_item(line) {
        return Line::Numbered(rest);
    }
    if let Some(rest) = line.strip_prefix("> ") {
        return Line::Quote(rest);
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        let language = rest.trim();
        return Line::Fence {
            language: (!language.is_empty()).then_some(language),
        };
    }
    if trimmed.len() >= 3 && trimmed.chars().all(|ch| ch == '-') {
        return Line::Divider;
    }
    if let Some(block_type) = media_url_kind(trimmed) {
        return Line::Media(block_type, trimmed);
    }
    Line::Text(line)
}

fn parse_todo_item(line: &str) -> Option<(bool, &str)> {
    for (prefix, checked) in [("- [ ]", false), ("- [x]", true), ("- [X]", true)] {
        if let Some(rest) = line.strip_prefix(prefix) {
            if rest.is_empty() {
                return Some((checked, rest));
            }
            if let Some(text) = rest.strip_prefix(' ') {
                return Some((checked, text));
            }
        }
    }
    None
}

fn parse_numbered_item(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(|ch| ch.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    line[digits..].strip_prefix(". ")
}

/// Block type for a bare media URL, judged by the extension of its path.
pub fn media_url_kind(candidate: &str) -> Option<BlockType> {
    if candidate.chars().any(char::is_whitespace) {
        return None;
    }
    let lower = candidate.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return None;
    }
    let path = lower.split(['?', '#']).next().unwrap_or_default();
    let (_, extension) = path.rsplit_once('.')?;
    if IMAGE_EXTENSIONS.contains(&extension) {
        Some(BlockType::Image)
    } else if VIDEO_EXTENSIONS.contains(&extension) {
        Some(BlockType::Video)
    } else {
        None
    }
}

struct Accumulator {
    block: Block,
    // Opened by a blank line and never written to.
    untouched: bool,
}

struct Parser {
    blocks: Vec<Block>,
    open: Option<Accumulator>,
}

impl Parser {
    fn close(&mut self, discard_untouched: bool) {
        if let Some(open) = self.open.take() {
            if !(discard_untouched && open.untouched) {
                self.blocks.push(open.block);
            }
        }
    }

    fn open_block(&mut self, block: Block) {
        self.close(true);
        self.open = Some(Accumulator {
            block,
            untouched: false,
        });
    }

    fn push_line(&mut self, line: &str) {
        match self.open.as_mut() {
            Some(open) if open.block.block_type == BlockType::Paragraph => {
                if !open.block.content.is_empty() {
                    open.block.content.push('\n');
                }
                open.block.content.push_str(line);
                open.untouched = false;
            }
            _ => self.open_block(Block::paragraph(line)),
        }
    }
}

/// Never fails: unrecognised lines degrade to paragraph text, and an empty
/// input yields a single empty paragraph.
pub fn parse(text: &str) -> Vec<Block> {
    let mut parser = Parser {
        blocks: Vec::new(),
        open: None,
    };

    for line in text.lines() {
        match classify(line) {
            Line::Blank => {
                parser.close(false);
                parser.open = Some(Accumulator {
                    block: Block::paragraph(""),
                    untouched: true,
                });
            }
            Line::Heading(block_type, rest) => {
                parser.open_block(Block::new(block_type).with_content(rest));
            }
            Line::Todo { checked, text } => parser.open_block(
                Block::new(BlockType::TodoList)
                    .with_content(text)
                    .with_metadata(BlockMetadata::Todo { checked }),
            ),
            Line::Bullet(rest) => {
                parser.open_block(Block::new(BlockType::BulletedList).with_content(rest));
            }
            Line::Numbered(rest) => {
                parser.open_block(Block::new(BlockType::NumberedList).with_content(rest));
            }
            Line::Quote(rest) => parser.open_block(Block::new(BlockType::Quote).with_content(rest)),
            Line::Fence { language } => parser.open_block(
                Block::new(BlockType::CodeBlock).with_metadata(BlockMetadata::Code {
                    language: language.map(str::to_string),
                }),
            ),
            Line::Divider => parser.open_block(Block::new(BlockType::Divider)),
            Line::Media(block_type, url) => parser.open_block(
                Block::new(block_type)
                    .with_content(url)
                    .with_metadata(BlockMetadata::Media(MediaSource::external(url))),
            ),
            Line::Text(line) => parser.push_line(line),
        }
    }
    parser.close(false);

    if parser.blocks.is_empty() {
        parser.blocks.push(Block::paragraph(""));
    }
    renumber(parser.blocks)
}

pub fn to_legacy_text(blocks: &[Block]) -> String {
    let mut sections = Vec::with_capacity(blocks.len());
    for block in blocks {
        let mut section = format_block(block);
        for child in &block.children {
            section.push('\n');
            section.push_str("  ");
            section.push_str(&format_block(child));
        }
        sections.push(section);
    }
    sections.join("\n\n")
}

fn format_block(block: &Block) -> String {
    let text = block.content.as_str();
    match block.block_type {
        BlockType::Heading1 => format!("# {text}"),
        BlockType::Heading2 => format!("## {text}"),
        BlockType::Heading3 => format!("### {text}"),
        BlockType::BulletedList | BlockType::ToggleList => format!("- {text}"),
        BlockType::NumberedList => format!("{}. {text}", block.list_index.unwrap_or(1)),
        BlockType::TodoList => {
            let checked = matches!(block.metadata, BlockMetadata::Todo { checked: true });
            let check = if checked { "x" } else { " " };
            format!("- [{check}] {text}")
        }
        BlockType::Quote => format!("> {text}"),
        BlockType::CodeBlock => {
            let language = match &block.metadata {
                BlockMetadata::Code {
                    language: Some(language),
                } => language.as_str(),
                _ => "",
            };
            format!("```{language}\n{text}\n```")
        }
        BlockType::Divider => "---".to_string(),
        BlockType::Image | BlockType::Video => match &block.metadata {
            BlockMetadata::Media(media) if !media.url.is_empty() => media.url.clone(),
            _ => text.to_string(),
        },
        _ => text.to_string(),
    }
}
