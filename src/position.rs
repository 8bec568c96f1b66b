use crate::CHUNK_SIDES;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// The position of a single cell in the block lattice
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash, Deref, Serialize, Deserialize,
)]
pub struct BlockPosition(pub(crate) [i32; 3]);

impl std::ops::Add<IVec3> for BlockPosition {
    type Output = Self;

    fn add(self, rhs: IVec3) -> Self::Output {
        Self([self.0[0] + rhs.x, self.0[1] + rhs.y, self.0[2] + rhs.z])
    }
}

impl std::ops::Sub for BlockPosition {
    type Output = IVec3;

    fn sub(self, rhs: Self) -> Self::Output {
        self.as_ivec3() - rhs.as_ivec3()
    }
}

impl From<[i32; 3]> for BlockPosition {
    fn from(value: [i32; 3]) -> Self {
        Self(value)
    }
}

impl From<IVec3> for BlockPosition {
    fn from(value: IVec3) -> Self {
        Self(value.to_array())
    }
}

impl BlockPosition {
    /// Construct a BlockPosition from the x, y and z coordinates
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self([x, y, z])
    }

    /// The x coordinate
    pub fn x(&self) -> i32 {
        self.0[0]
    }

    /// The y coordinate, higher is up
    pub fn y(&self) -> i32 {
        self.0[1]
    }

    /// The z coordinate
    pub fn z(&self) -> i32 {
        self.0[2]
    }

    /// The position as a bevy vector
    pub fn as_ivec3(&self) -> IVec3 {
        IVec3::from_array(self.0)
    }

    /// The position `n` cells above this one. Negative values go down
    pub fn up(self, n: i32) -> Self {
        Self([self.0[0], self.0[1] + n, self.0[2]])
    }

    /// Get the chunk this position belongs to
    pub fn chunk(&self) -> ChunkPosition {
        const SIZE: i32 = CHUNK_SIDES as i32;
        ChunkPosition([
            self.0[0].div_euclid(SIZE),
            self.0[1].div_euclid(SIZE),
            self.0[2].div_euclid(SIZE),
        ])
    }
}

impl std::fmt::Display for BlockPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.0[0], self.0[1], self.0[2])
    }
}

/// The position of a chunk. Chunks are the granularity at which cells are loaded or unloaded
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Deref, Serialize, Deserialize)]
pub struct ChunkPosition(pub(crate) [i32; 3]);

impl ChunkPosition {
    /// Construct a ChunkPosition from the x, y and z coordinates
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self([x, y, z])
    }
}

#[test]
fn test_offset_position() {
    let pos = BlockPosition::new(3, -2, 7) + IVec3::new(-1, 4, 0);
    assert_eq!(BlockPosition::new(2, 2, 7), pos);
    assert_eq!(IVec3::new(-1, 4, 0), pos - BlockPosition::new(3, -2, 7));
    assert_eq!(BlockPosition::new(2, -2, 7), pos.up(-4));
}

#[test]
fn test_chunk_of_negative_positions() {
    assert_eq!(ChunkPosition::new(0, 0, 0), BlockPosition::new(0, 15, 3).chunk());
    assert_eq!(ChunkPosition::new(-1, 1, 0), BlockPosition::new(-1, 16, 15).chunk());
    assert_eq!(ChunkPosition::new(-2, 0, -1), BlockPosition::new(-17, 0, -16).chunk());
}
