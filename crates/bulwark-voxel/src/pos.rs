//! Integer block coordinates, chunk coordinates, and Y-axis rotations.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Chunk edge length in blocks.
pub const CHUNK_SIZE: i32 = 32;

// ---------------------------------------------------------------------------
// BlockPos
// ---------------------------------------------------------------------------

/// Position of a single block cell in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    /// East-west axis.
    pub x: i32,
    /// Vertical axis.
    pub y: i32,
    /// North-south axis.
    pub z: i32,
}

impl BlockPos {
    /// Creates a block position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns this position shifted by `(dx, dy, dz)`.
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// The six face-adjacent positions.
    pub fn neighbours(self) -> [BlockPos; 6] {
        [
            self.offset(1, 0, 0),
            self.offset(-1, 0, 0),
            self.offset(0, 1, 0),
            self.offset(0, -1, 0),
            self.offset(0, 0, 1),
            self.offset(0, 0, -1),
        ]
    }

    /// The chunk containing this block.
    pub fn chunk(self) -> ChunkPos {
        ChunkPos {
            x: self.x.div_euclid(CHUNK_SIZE),
            y: self.y.div_euclid(CHUNK_SIZE),
            z: self.z.div_euclid(CHUNK_SIZE),
        }
    }

    /// Local coordinates inside the owning chunk, each in `[0, CHUNK_SIZE)`.
    pub fn local(self) -> (usize, usize, usize) {
        (
            self.x.rem_euclid(CHUNK_SIZE) as usize,
            self.y.rem_euclid(CHUNK_SIZE) as usize,
            self.z.rem_euclid(CHUNK_SIZE) as usize,
        )
    }

    /// Centre of the block cell in continuous world space.
    pub fn center(self) -> DVec3 {
        DVec3::new(
            self.x as f64 + 0.5,
            self.y as f64 + 0.5,
            self.z as f64 + 0.5,
        )
    }

    /// Component-wise minimum.
    pub fn min(self, other: BlockPos) -> BlockPos {
        BlockPos::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Component-wise maximum.
    pub fn max(self, other: BlockPos) -> BlockPos {
        BlockPos::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// ChunkPos
// ---------------------------------------------------------------------------

/// Chunk-grid coordinate (block coordinate divided by [`CHUNK_SIZE`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    /// Chunk-grid X.
    pub x: i32,
    /// Chunk-grid Y.
    pub y: i32,
    /// Chunk-grid Z.
    pub z: i32,
}

impl ChunkPos {
    /// Creates a chunk coordinate.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The block at this chunk's minimum corner.
    pub fn origin(self) -> BlockPos {
        BlockPos::new(self.x * CHUNK_SIZE, self.y * CHUNK_SIZE, self.z * CHUNK_SIZE)
    }
}

// ---------------------------------------------------------------------------
// Rotation
// ---------------------------------------------------------------------------

/// Quarter-turn rotation of a structure around the vertical axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    /// As authored.
    #[default]
    None,
    /// 90° clockwise seen from above.
    Clockwise90,
    /// Half turn.
    Clockwise180,
    /// 90° counter-clockwise seen from above.
    CounterClockwise90,
}

impl Rotation {
    /// Rotates a structure-local offset. `y` is never touched.
    pub fn rotate(self, offset: BlockPos) -> BlockPos {
        let BlockPos { x, y, z } = offset;
        match self {
            Rotation::None => BlockPos::new(x, y, z),
            Rotation::Clockwise90 => BlockPos::new(-z, y, x),
            Rotation::Clockwise180 => BlockPos::new(-x, y, -z),
            Rotation::CounterClockwise90 => BlockPos::new(z, y, -x),
        }
    }
}
