//! Chunked block storage for the authoritative server, keyed by [`ChunkPos`].
//!
//! Chunks are dense `CHUNK_SIZE³` arrays held in an
//! [`FxHashMap`](rustc_hash::FxHashMap). A chunk can be *forced*: forced
//! chunks refuse to unload until every holder has released them, which is how
//! long-lived structures keep their cells resident.

use glam::DVec3;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::pos::{BlockPos, CHUNK_SIZE, ChunkPos};
use crate::registry::BlockTypeId;

const CHUNK_VOLUME: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as usize;

/// Errors from block store mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The chunk holding the target block is not loaded.
    #[error("chunk ({}, {}, {}) is not loaded", .0.x, .0.y, .0.z)]
    ChunkNotLoaded(ChunkPos),
    /// The chunk is forced and cannot be unloaded.
    #[error("chunk ({}, {}, {}) is forced", .0.x, .0.y, .0.z)]
    ChunkForced(ChunkPos),
}

fn index(pos: BlockPos) -> usize {
    let (x, y, z) = pos.local();
    let size = CHUNK_SIZE as usize;
    x * size * size + y * size + z
}

/// Owns every loaded chunk of one world.
#[derive(Debug, Default)]
pub struct BlockStore {
    chunks: FxHashMap<ChunkPos, Box<[BlockTypeId]>>,
    forced: FxHashMap<ChunkPos, u32>,
}

impl BlockStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads (or replaces) a chunk filled with `fill`.
    pub fn load_chunk(&mut self, chunk: ChunkPos, fill: BlockTypeId) {
        self.chunks
            .insert(chunk, vec![fill; CHUNK_VOLUME].into_boxed_slice());
    }

    /// Unloads a chunk. Returns `Ok(false)` if it was not loaded.
    ///
    /// # Errors
    ///
    /// [`StoreError::ChunkForced`] while any holder still forces the chunk.
    pub fn unload_chunk(&mut self, chunk: ChunkPos) -> Result<bool, StoreError> {
        if self.is_forced(chunk) {
            tracing::debug!(?chunk, "Refusing to unload forced chunk");
            return Err(StoreError::ChunkForced(chunk));
        }
        Ok(self.chunks.remove(&chunk).is_some())
    }

    /// Returns `true` if the chunk is loaded.
    pub fn is_chunk_loaded(&self, chunk: ChunkPos) -> bool {
        self.chunks.contains_key(&chunk)
    }

    /// Returns `true` if the chunk containing `pos` is loaded.
    pub fn is_loaded(&self, pos: BlockPos) -> bool {
        self.is_chunk_loaded(pos.chunk())
    }

    /// Number of loaded chunks.
    pub fn loaded_count(&self) -> usize {
        self.chunks.len()
    }

    /// Block type at `pos`, or `None` if its chunk is not loaded.
    pub fn get(&self, pos: BlockPos) -> Option<BlockTypeId> {
        let data = self.chunks.get(&pos.chunk())?;
        data.get(index(pos)).copied()
    }

    /// Writes a block and returns the type it replaced.
    ///
    /// # Errors
    ///
    /// [`StoreError::ChunkNotLoaded`] if the target chunk is absent.
    pub fn set(&mut self, pos: BlockPos, block: BlockTypeId) -> Result<BlockTypeId, StoreError> {
        let chunk = pos.chunk();
        let data = self
            .chunks
            .get_mut(&chunk)
            .ok_or(StoreError::ChunkNotLoaded(chunk))?;
        let cell = &mut data[index(pos)];
        let old = *cell;
        *cell = block;
        Ok(old)
    }

    /// Fills the inclusive box `min..=max`, skipping unloaded cells.
    /// Returns how many cells were written.
    pub fn fill_box(&mut self, min: BlockPos, max: BlockPos, block: BlockTypeId) -> usize {
        let mut written = 0;
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    if self.set(BlockPos::new(x, y, z), block).is_ok() {
                        written += 1;
                    }
                }
            }
        }
        written
    }

    /// Adds one hold on a chunk so it stays loaded.
    pub fn force_chunk(&mut self, chunk: ChunkPos) {
        *self.forced.entry(chunk).or_insert(0) += 1;
    }

    /// Drops one hold on a chunk. Returns `false` if the chunk was not forced.
    pub fn release_chunk(&mut self, chunk: ChunkPos) -> bool {
        let Some(holds) = self.forced.get_mut(&chunk) else {
            return false;
        };
        *holds -= 1;
        if *holds == 0 {
            self.forced.remove(&chunk);
            tracing::trace!(?chunk, "Chunk no longer forced");
        }
        true
    }

    /// Returns `true` while at least one holder forces the chunk.
    pub fn is_forced(&self, chunk: ChunkPos) -> bool {
        self.forced.contains_key(&chunk)
    }

    /// Number of distinct forced chunks.
    pub fn forced_count(&self) -> usize {
        self.forced.len()
    }

    /// Every non-air block whose centre lies within `radius` of `center`,
    /// ordered by x, then y, then z.
    pub fn blocks_in_sphere(&self, center: DVec3, radius: f64) -> Vec<BlockPos> {
        let min = (center - DVec3::splat(radius)).floor();
        let max = (center + DVec3::splat(radius)).ceil();
        let r_sq = radius * radius;

        let mut hits = Vec::new();
        for x in min.x as i32..=max.x as i32 {
            for y in min.y as i32..=max.y as i32 {
                for z in min.z as i32..=max.z as i32 {
                    let pos = BlockPos::new(x, y, z);
                    if pos.center().distance_squared(center) > r_sq {
                        continue;
                    }
                    if self.get(pos).is_some_and(|b| !b.is_air()) {
                        hits.push(pos);
                    }
                }
            }
        }
        hits
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const STONE: BlockTypeId = BlockTypeId(1);

    #[test]
    fn test_get_unloaded_is_none() {
        let store = BlockStore::new();
        assert_eq!(store.get(BlockPos::new(0, 0, 0)), None);
        assert!(!store.is_loaded(BlockPos::new(0, 0, 0)));
    }

    #[test]
    fn test_set_then_get() {
        let mut store = BlockStore::new();
        store.load_chunk(ChunkPos::new(0, 0, 0), BlockTypeId::AIR);
        let pos = BlockPos::new(5, 17, 8);

        let old = store.set(pos, STONE).unwrap();
        assert_eq!(old, BlockTypeId::AIR);
        assert_eq!(store.get(pos), Some(STONE));
        // Adjacent cells untouched.
        assert_eq!(store.get(pos.offset(1, 0, 0)), Some(BlockTypeId::AIR));
    }

    #[test]
    fn test_set_on_unloaded_chunk_errors() {
        let mut store = BlockStore::new();
        let pos = BlockPos::new(-1, 0, 0);
        let err = store.set(pos, STONE).unwrap_err();
        assert_eq!(err, StoreError::ChunkNotLoaded(ChunkPos::new(-1, 0, 0)));
    }

    #[test]
    fn test_forced_chunk_refuses_unload_until_released() {
        let mut store = BlockStore::new();
        let c = ChunkPos::new(2, 0, 0);
        store.load_chunk(c, BlockTypeId::AIR);
        store.force_chunk(c);
        store.force_chunk(c);

        assert_eq!(store.unload_chunk(c), Err(StoreError::ChunkForced(c)));
        assert!(store.release_chunk(c));
        assert!(store.is_forced(c));
        assert!(store.release_chunk(c));
        assert!(!store.is_forced(c));
        assert!(!store.release_chunk(c));

        assert_eq!(store.unload_chunk(c), Ok(true));
        assert_eq!(store.unload_chunk(c), Ok(false));
    }

    #[test]
    fn test_fill_box_skips_unloaded_cells() {
        let mut store = BlockStore::new();
        store.load_chunk(ChunkPos::new(0, 0, 0), BlockTypeId::AIR);
        // Box straddles x = -1 (unloaded) and x = 0..=1 (loaded).
        let written = store.fill_box(BlockPos::new(-1, 0, 0), BlockPos::new(1, 0, 0), STONE);
        assert_eq!(written, 2);
    }

    #[test]
    fn test_blocks_in_sphere_ignores_air_and_far_blocks() {
        let mut store = BlockStore::new();
        store.load_chunk(ChunkPos::new(0, 0, 0), BlockTypeId::AIR);
        store.set(BlockPos::new(4, 4, 4), STONE).unwrap();
        store.set(BlockPos::new(5, 4, 4), STONE).unwrap();
        store.set(BlockPos::new(10, 4, 4), STONE).unwrap();

        let hits = store.blocks_in_sphere(BlockPos::new(4, 4, 4).center(), 1.5);
        assert_eq!(hits, vec![BlockPos::new(4, 4, 4), BlockPos::new(5, 4, 4)]);
    }
}
