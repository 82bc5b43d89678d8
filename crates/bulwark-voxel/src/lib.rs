//! Block-level world storage: positions, rotations, the block type registry,
//! and a chunked block store that tracks which chunks must stay resident.

pub mod pos;
pub mod registry;
pub mod store;

pub use pos::{BlockPos, CHUNK_SIZE, ChunkPos, Rotation};
pub use registry::{BlockTypeDef, BlockTypeId, BlockTypeRegistry, RegistryError};
pub use store::{BlockStore, StoreError};
