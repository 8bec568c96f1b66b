use crate::{
    cell::Block,
    part::{Linked, Part},
    scan::{Environment, EnvironmentMut},
    template::Template,
    BlockPosition, ChunkPosition,
};

use bevy::{
    prelude::*,
    utils::{HashMap, HashSet},
};

/// The resource that stores every non-air block, indexed by position. Parts keep their runtime
/// data here as well
#[derive(Resource, Debug, Default)]
pub struct CellGrid {
    blocks: HashMap<BlockPosition, Block>,
    parts: HashMap<BlockPosition, Part>,
    unloaded: HashSet<ChunkPosition>,
}

impl CellGrid {
    /// Set the block at a position. Any part at that position is removed and returned
    pub fn set_block(&mut self, pos: BlockPosition, block: Block) -> Option<Part> {
        let removed = self.parts.remove(&pos);
        if block == Block::Air {
            self.blocks.remove(&pos);
        } else {
            self.blocks.insert(pos, block);
        }
        removed
    }

    /// Place a part at a position, replacing whatever was there. A replaced part is returned
    pub fn place_part(&mut self, pos: BlockPosition, part: impl Into<Part>) -> Option<Part> {
        self.blocks.remove(&pos);
        self.parts.insert(pos, part.into())
    }

    /// Clear a position back to air
    pub fn remove(&mut self, pos: BlockPosition) -> Option<Part> {
        self.set_block(pos, Block::Air)
    }

    /// Place every cell of a template and the controller at the anchor
    pub fn build_structure(&mut self, template: &Template, anchor: BlockPosition) {
        self.set_block(anchor, Block::Controller);
        for (offset, kind) in template.modules() {
            self.set_block(anchor + *offset, Block::Cell(*kind));
        }
    }

    /// Mark a chunk as unloaded. Its contents are kept but can no longer be observed
    pub fn unload_chunk(&mut self, chunk: ChunkPosition) {
        self.unloaded.insert(chunk);
    }

    /// Mark a chunk as loaded again
    pub fn load_chunk(&mut self, chunk: ChunkPosition) {
        self.unloaded.remove(&chunk);
    }

    /// The number of positions that hold something other than air
    pub fn len(&self) -> usize {
        self.blocks.len() + self.parts.len()
    }

    /// Whether the grid only holds air
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Environment for CellGrid {
    fn block_at(&self, pos: BlockPosition) -> Block {
        match self.parts.get(&pos) {
            Some(part) => Block::Part(part.role()),
            None => self.blocks.get(&pos).copied().unwrap_or_default(),
        }
    }

    fn is_loaded(&self, pos: BlockPosition) -> bool {
        !self.unloaded.contains(&pos.chunk())
    }

    fn part(&self, pos: BlockPosition) -> Option<&Part> {
        if !self.is_loaded(pos) {
            return None;
        }
        self.parts.get(&pos)
    }
}

impl EnvironmentMut for CellGrid {
    fn part_mut(&mut self, pos: BlockPosition) -> Option<&mut Part> {
        if !self.is_loaded(pos) {
            return None;
        }
        self.parts.get_mut(&pos)
    }
}

/// A grid holding a complete structure for `template`: the controller, every cell, the auxiliary
/// column below the anchor and a configured programmer one cell east of the anchor
#[cfg(test)]
pub(crate) fn formed_grid(template: &Template, anchor: BlockPosition) -> CellGrid {
    use crate::part::{InputBuffer, OutputBuffer, Program, ProgrammerPart, StoragePart};

    let mut grid = CellGrid::default();
    grid.build_structure(template, anchor);
    grid.place_part(anchor.up(-2), StoragePart::new(1000).with_stored(250));
    grid.place_part(anchor.up(-3), InputBuffer::default());
    grid.place_part(anchor.up(-4), OutputBuffer::default());
    grid.place_part(
        anchor + IVec3::X,
        ProgrammerPart::with_program(Program::new("smelt")),
    );
    grid
}

#[test]
fn test_parts_replace_blocks() {
    use crate::{cell::CellKind, part::{PartRole, StoragePart}};

    let mut grid = CellGrid::default();
    let pos = BlockPosition::new(4, -1, 9);
    assert_eq!(Block::Air, grid.block_at(pos));

    grid.set_block(pos, Block::Cell(CellKind::Glass));
    assert_eq!(Some(CellKind::Glass), grid.cell_kind_at(pos));
    assert!(grid.part(pos).is_none());

    assert!(grid.place_part(pos, StoragePart::new(10)).is_none());
    assert_eq!(Block::Part(PartRole::Storage), grid.block_at(pos));
    assert_eq!(1, grid.len());

    let removed = grid.remove(pos);
    assert_eq!(Some(10), removed.as_ref().and_then(Part::as_storage).map(|s| s.capacity()));
    assert_eq!(Block::Air, grid.block_at(pos));
    assert!(grid.is_empty());
}

#[test]
fn test_unloaded_chunks_hide_parts() {
    use crate::part::StoragePart;

    let mut grid = CellGrid::default();
    let pos = BlockPosition::new(20, 0, 0);
    grid.place_part(pos, StoragePart::new(10));

    grid.unload_chunk(pos.chunk());
    assert!(!grid.is_loaded(pos));
    assert!(grid.is_loaded(BlockPosition::new(0, 0, 0)));
    assert!(grid.part(pos).is_none());
    assert!(grid.part_mut(pos).is_none());

    grid.load_chunk(pos.chunk());
    assert!(grid.part(pos).is_some());
}
