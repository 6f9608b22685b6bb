//! Constants for the grid index.

/// Number of axes handled by the grid.
pub const DIMENSION: usize = 2;

/// Maximum number of tiles a shape is copied into. Shapes spanning more tiles
/// are stored once in the root overflow set.
pub const MAX_INSERTION: usize = 4;

/// Slack subtracted from `extent / tile_edge` before rounding up the tile
/// count of an axis, so an exact multiple does not gain a sliver tile.
pub const TILE_EPSILON: f64 = 1e-9;

/// Magic number for node file identification
pub const MAGIC: u32 = 0x4E475244; // "NGRD" - Nitrite Grid

/// Node file format version
pub const VERSION: u32 = 1;

/// Size of a record prefix: payload length, CRC32 of the length and CRC32 of
/// the payload, all little endian u32
pub const RECORD_HEADER_LEN: usize = 12;
