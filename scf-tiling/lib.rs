//! Tiling side of the SCF matcher: grid geometry over a large source image,
//! materializing each tile through an external decoder, and indexing the
//! features the engine finds in every tile.

pub mod command;
pub mod decoder;
pub mod error;
pub mod partition;
pub mod store;
pub mod types;

pub use command::{format_region, DecodeCommand};
pub use decoder::{decode_tiles, probe_dimensions, KakaduDecoder, NativeDecoder, TileDecoder};
pub use error::{TileError, TileResult};
pub use partition::TilePartitioner;
pub use store::{ImageFeatureIndex, TileFeatureStore, TileFeatures};
pub use types::{GridSpec, TilePattern};
