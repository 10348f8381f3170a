//! Order and list-index maintenance.
//!
//! Positions are never patched incrementally: after any insert, delete or move
//! the whole array goes through [`renumber`], so `order_index` is always
//! `0..n` and numbered-list ordinals always reflect the current array.

use crate::blocks::{Block, BlockType};

pub fn renumber(mut blocks: Vec<Block>) -> Vec<Block> {
    renumber_in_place(&mut blocks);
    blocks
}

/// Numbered-list ordinals count every numbered-list block in the sequence,
/// left to right. Blocks of other types in between do not restart the count,
/// so `[numbered, numbered, heading, numbered]` is numbered 1, 2, 3.
pub fn renumber_in_place(blocks: &mut [Block]) {
    for (position, block) in blocks.iter_mut().enumerate() {
        block.order_index = position;
    }

    let mut counter = 1;
    for block in blocks.iter_mut() {
        if block.block_type == BlockType::NumberedList {
            block.list_index = Some(counter);
            counter += 1;
        } else {
            block.list_index = None;
        }
        if !block.children.is_empty() {
            renumber_in_place(&mut block.children);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderViolation {
    OrderIndex { position: usize, found: usize },
    ListIndex { position: usize, expected: Option<usize>, found: Option<usize> },
}

pub fn check_invariants(blocks: &[Block]) -> Result<(), OrderViolation> {
    let mut counter = 1;
    for (position, block) in blocks.iter().enumerate() {
        if block.order_index != position {
            return Err(OrderViolation::OrderIndex {
                position,
                found: block.order_index,
            });
        }
        let expected = if block.block_type == BlockType::NumberedList {
            counter += 1;
            Some(counter - 1)
        } else {
            None
        };
        if block.list_index != expected {
            return Err(OrderViolation::ListIndex {
                position,
                expected,
                found: block.list_index,
            });
        }
        check_invariants(&block.children)?;
    }
    Ok(())
}
