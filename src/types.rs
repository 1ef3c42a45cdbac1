//! Core data types for Imaris containers

use hdf5::types::{FloatSize, IntSize, TypeDescriptor};
use hdf5::H5Type;
use ndarray::Array4;
use num_traits::{Bounded, NumCast, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::volume::PixelData;

/// Date-time pattern used when writing timepoints.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Patterns accepted when parsing timepoints, in order of preference.
pub const TIME_PARSE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Multipliers from the physical units Imaris knows about to millimeters.
pub const UNIT_TO_MM: [(&str, f64); 4] = [("m", 1000.0), ("mm", 1.0), ("um", 1.0e-3), ("nm", 1.0e-6)];

/// Look up the millimeter multiplier for a unit string.
pub fn unit_to_mm(unit: &str) -> Option<f64> {
    UNIT_TO_MM
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, factor)| *factor)
}

/// Scalar pixel types an Imaris container can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PixelType {
    /// Unsigned 8-bit integer
    U8 = 0,
    /// Unsigned 16-bit integer
    U16 = 1,
    /// Unsigned 32-bit integer
    U32 = 2,
    /// 32-bit floating point
    F32 = 3,
}

impl PixelType {
    /// Size in bytes of one voxel
    pub fn size_in_bytes(&self) -> usize {
        match self {
            PixelType::U8 => 1,
            PixelType::U16 => 2,
            PixelType::U32 | PixelType::F32 => 4,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, PixelType::F32)
    }

    /// Types whose value range exceeds 8 bits carry an extra 1024-bin histogram.
    pub fn has_fine_histogram(&self) -> bool {
        !matches!(self, PixelType::U8)
    }

    /// Human readable description, used in error messages.
    pub fn description(&self) -> &'static str {
        match self {
            PixelType::U8 => "8-bit unsigned integer",
            PixelType::U16 => "16-bit unsigned integer",
            PixelType::U32 => "32-bit unsigned integer",
            PixelType::F32 => "32-bit float",
        }
    }

    /// Map a stored HDF5 datatype to a pixel type.
    pub fn from_descriptor(descriptor: &TypeDescriptor) -> Option<Self> {
        match descriptor {
            TypeDescriptor::Unsigned(IntSize::U1) => Some(PixelType::U8),
            TypeDescriptor::Unsigned(IntSize::U2) => Some(PixelType::U16),
            TypeDescriptor::Unsigned(IntSize::U4) => Some(PixelType::U32),
            TypeDescriptor::Float(FloatSize::U4) => Some(PixelType::F32),
            _ => None,
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Voxel value types that can be stored in a container.
pub trait Pixel:
    H5Type + Copy + Default + PartialOrd + NumCast + ToPrimitive + Bounded + Send + Sync + 'static
{
    const PIXEL_TYPE: PixelType;

    /// Wrap a `(channel, z, y, x)` array in the type-erased container.
    fn into_data(array: Array4<Self>) -> PixelData;

    /// Borrow the typed array back out of the type-erased container.
    fn from_data(data: &PixelData) -> Option<&Array4<Self>>;
}

macro_rules! impl_pixel {
    ($ty:ty, $variant:ident) => {
        impl Pixel for $ty {
            const PIXEL_TYPE: PixelType = PixelType::$variant;

            fn into_data(array: Array4<Self>) -> PixelData {
                PixelData::$variant(array)
            }

            fn from_data(data: &PixelData) -> Option<&Array4<Self>> {
                match data {
                    PixelData::$variant(array) => Some(array),
                    _ => None,
                }
            }
        }
    };
}

impl_pixel!(u8, U8);
impl_pixel!(u16, U16);
impl_pixel!(u32, U32);
impl_pixel!(f32, F32);

/// How several channels are presented in an in-memory volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ComponentLayout {
    /// A 3D volume whose voxels are vectors, one component per channel.
    Vector,
    /// A 4D scalar volume whose trailing axis enumerates channels.
    #[default]
    ChannelAxis,
}

/// Half-open voxel ranges along x, y and z.
pub type SubRegion = [Range<usize>; 3];

/// Physical placement of a voxel grid (x, y, z order).
///
/// The origin is the center of the first voxel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub origin: [f64; 3],
    pub spacing: [f64; 3],
}

impl Geometry {
    /// Relative tolerance used when comparing geometries.
    pub const TOLERANCE: f64 = 1.0e-6;

    pub fn new(origin: [f64; 3], spacing: [f64; 3]) -> Self {
        Self { origin, spacing }
    }

    /// Derive the geometry of a grid from its bounding box extents.
    pub fn from_extents(min: [f64; 3], max: [f64; 3], size: [usize; 3]) -> Self {
        let mut origin = [0.0; 3];
        let mut spacing = [0.0; 3];
        for axis in 0..3 {
            spacing[axis] = (max[axis] - min[axis]) / size[axis] as f64;
            origin[axis] = min[axis] + 0.5 * spacing[axis];
        }
        Self { origin, spacing }
    }

    /// Bounding box of a grid with `size` voxels, outer faces of the outer voxels.
    pub fn extents(&self, size: [usize; 3]) -> ([f64; 3], [f64; 3]) {
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for axis in 0..3 {
            min[axis] = self.origin[axis] - 0.5 * self.spacing[axis];
            let edge = self.origin[axis] + size[axis] as f64 * self.spacing[axis];
            max[axis] = edge - 0.5 * self.spacing[axis];
        }
        (min, max)
    }

    /// Whether two geometries describe the same grid placement.
    ///
    /// Coordinates may differ by at most `TOLERANCE * self.spacing[0]`.
    pub fn is_compatible(&self, other: &Geometry) -> bool {
        let tolerance = Self::TOLERANCE * self.spacing[0].abs();
        self.origin
            .iter()
            .zip(other.origin.iter())
            .chain(self.spacing.iter().zip(other.spacing.iter()))
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    /// Rescale origin and spacing by a constant factor.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            origin: self.origin.map(|v| v * factor),
            spacing: self.spacing.map(|v| v * factor),
        }
    }

    /// Shift the origin forward by `start` voxels on each axis.
    pub fn shifted(&self, start: [usize; 3]) -> Self {
        let mut origin = self.origin;
        for axis in 0..3 {
            origin[axis] += start[axis] as f64 * self.spacing[axis];
        }
        Self {
            origin,
            spacing: self.spacing,
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new([0.0; 3], [1.0; 3])
    }
}
