//! Voxel coordinates, agent positions, and plan dimensions.
//!
//! [`BlockPos`] is an integer voxel coordinate. It is used both for absolute
//! world coordinates (the build origin, placement targets) and for offsets
//! relative to the origin inside a plan. [`Position`] is the agent's
//! continuous position as reported by the world.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Integer voxel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BlockPos {
    /// East/west axis.
    pub x: i32,
    /// Vertical axis.
    pub y: i32,
    /// North/south axis.
    pub z: i32,
}

impl BlockPos {
    /// The zero offset.
    pub const ORIGIN: Self = Self { x: 0, y: 0, z: 0 };

    /// Create a coordinate from its components.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Add a relative offset to this coordinate.
    ///
    /// Returns `None` if any axis overflows `i32`.
    pub const fn checked_offset(self, offset: Self) -> Option<Self> {
        let Some(x) = self.x.checked_add(offset.x) else {
            return None;
        };
        let Some(y) = self.y.checked_add(offset.y) else {
            return None;
        };
        let Some(z) = self.z.checked_add(offset.z) else {
            return None;
        };
        Some(Self { x, y, z })
    }

    /// The voxel directly beneath this one, used as the placement reference
    /// surface.
    pub const fn below(self) -> Option<Self> {
        match self.y.checked_sub(1) {
            Some(y) => Some(Self { x: self.x, y, z: self.z }),
            None => None,
        }
    }

    /// Exact continuous position of this voxel's corner.
    pub fn to_position(self) -> Position {
        Position {
            x: f64::from(self.x),
            y: f64::from(self.y),
            z: f64::from(self.z),
        }
    }
}

impl core::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Continuous agent position in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// East/west axis.
    pub x: f64,
    /// Vertical axis.
    pub y: f64,
    /// North/south axis.
    pub z: f64,
}

impl Position {
    /// Create a position from its components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another position.
    pub fn distance_to(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dz.mul_add(dz, dx.mul_add(dx, dy * dy)).sqrt()
    }

    /// The voxel containing this position.
    ///
    /// Coordinates outside the `i32` range saturate.
    #[allow(clippy::cast_possible_truncation)] // saturating `as` is the intent
    pub fn floored(&self) -> BlockPos {
        BlockPos {
            x: self.x.floor() as i32,
            y: self.y.floor() as i32,
            z: self.z.floor() as i32,
        }
    }
}

impl From<BlockPos> for Position {
    fn from(pos: BlockPos) -> Self {
        pos.to_position()
    }
}

impl core::fmt::Display for Position {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// Size of a compiled plan in voxels.
///
/// Raster plans are one voxel deep; the depth axis depends on the image
/// layout (`length == 1` for walls, `height == 1` for floors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Dimensions {
    /// Extent along the x axis.
    pub width: u32,
    /// Extent along the y axis.
    pub height: u32,
    /// Extent along the z axis.
    pub length: u32,
}

impl Dimensions {
    /// Create dimensions from the three extents.
    pub const fn new(width: u32, height: u32, length: u32) -> Self {
        Self {
            width,
            height,
            length,
        }
    }

    /// Total number of voxel positions.
    pub const fn volume(&self) -> u64 {
        (self.width as u64)
            .saturating_mul(self.height as u64)
            .saturating_mul(self.length as u64)
    }
}

impl core::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.length)
    }
}
