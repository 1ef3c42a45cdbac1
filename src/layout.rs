//! Chunk layout of pixel data blocks - chunk shape selection, storage
//! parameters of existing blocks and creation of new ones

use crate::error::Result;
use crate::types::{Pixel, PixelType};
use hdf5::filters::Filter;
use hdf5::{Dataset, Group};
use ndarray::{s, Array3, ArrayView3};
use serde::{Deserialize, Serialize};

/// Name of the pixel data block inside a channel group.
pub const DATA_NAME: &str = "Data";

/// Chunk shape candidates per pixel type, (z, y, x).
///
/// Each candidate holds roughly 1 MiB of voxels.
const U8_CHUNKS: &[[usize; 3]] = &[[1, 1024, 1024], [4, 512, 512], [16, 256, 256], [64, 128, 128]];
const U16_CHUNKS: &[[usize; 3]] = &[[2, 512, 512], [8, 256, 256], [32, 128, 128]];
const WIDE_CHUNKS: &[[usize; 3]] = &[[4, 256, 256], [16, 128, 128]];

/// Chunk extent of a pixel data block, (z, y, x)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkShape {
    dims: [usize; 3],
}

impl ChunkShape {
    pub fn new(dims: [usize; 3]) -> Self {
        Self { dims }
    }

    /// Pick a chunk shape for a volume of `dims` (z, y, x) voxels.
    ///
    /// The candidate whose depth is closest to the volume depth wins (the
    /// earlier candidate on ties); each axis is then clamped to the volume.
    pub fn auto(pixel_type: PixelType, dims: [usize; 3]) -> Self {
        let candidates = match pixel_type {
            PixelType::U8 => U8_CHUNKS,
            PixelType::U16 => U16_CHUNKS,
            PixelType::U32 | PixelType::F32 => WIDE_CHUNKS,
        };
        let mut best = candidates[0];
        for candidate in &candidates[1..] {
            if candidate[0].abs_diff(dims[0]) < best[0].abs_diff(dims[0]) {
                best = *candidate;
            }
        }
        Self::new(best).clamped(dims)
    }

    /// Limit each axis to `dims`, never below one voxel.
    pub fn clamped(&self, dims: [usize; 3]) -> Self {
        let mut clamped = self.dims;
        for axis in 0..3 {
            clamped[axis] = clamped[axis].min(dims[axis]).max(1);
        }
        Self::new(clamped)
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Number of voxels in one chunk
    pub fn total_voxels(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Compression codec applied to a pixel data block
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compression {
    #[default]
    None,
    Gzip { level: u8 },
    Other(String),
}

/// Chunking and compression of a stored pixel data block. The default is
/// contiguous, uncompressed storage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    pub chunk: Option<ChunkShape>,
    pub compression: Compression,
}

impl StorageSettings {
    /// Chunked, gzip compressed storage.
    pub fn gzip(chunk: ChunkShape, level: u8) -> Self {
        Self {
            chunk: Some(chunk),
            compression: Compression::Gzip { level },
        }
    }

    /// Inspect an existing block.
    pub fn of(dataset: &Dataset) -> Self {
        let chunk = dataset
            .chunk()
            .filter(|c| c.len() == 3)
            .map(|c| ChunkShape::new([c[0], c[1], c[2]]));
        let mut compression = Compression::None;
        for filter in dataset.filters() {
            match filter {
                Filter::Deflate(level) => {
                    compression = Compression::Gzip { level };
                    break;
                }
                Filter::Shuffle | Filter::Fletcher32 => {}
                other => compression = Compression::Other(format!("{other:?}")),
            }
        }
        Self { chunk, compression }
    }

    /// Create a block named [`DATA_NAME`] in `group` holding `data` (z, y, x).
    ///
    /// The stored array is zero padded to at least one chunk on every axis.
    /// Codecs other than gzip are not reproduced.
    pub fn create_data<T: Pixel>(&self, group: &Group, data: ArrayView3<T>) -> Result<Dataset> {
        let data = match self.chunk {
            Some(chunk) => pad_to(data, chunk.dims()),
            None => data.to_owned(),
        };
        let mut builder = group.new_dataset::<T>().shape(data.dim());
        if let Some(chunk) = self.chunk {
            builder = builder.chunk(chunk.dims());
        }
        if let Compression::Gzip { level } = self.compression {
            builder = builder.deflate(level);
        }
        let dataset = builder.create(DATA_NAME)?;
        dataset.write(&data)?;
        Ok(dataset)
    }
}

/// Copy `data` into a zero-filled array extended to at least `min_dims` on every axis.
pub fn pad_to<T: Pixel>(data: ArrayView3<T>, min_dims: [usize; 3]) -> Array3<T> {
    let (z, y, x) = data.dim();
    let padded = (z.max(min_dims[0]), y.max(min_dims[1]), x.max(min_dims[2]));
    if padded == (z, y, x) {
        return data.to_owned();
    }
    let mut out = Array3::<T>::default(padded);
    out.slice_mut(s![..z, ..y, ..x]).assign(&data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_chunk_picks_closest_depth() {
        assert_eq!(ChunkShape::auto(PixelType::U8, [1, 2048, 2048]).dims(), [1, 1024, 1024]);
        assert_eq!(ChunkShape::auto(PixelType::U8, [100, 2048, 2048]).dims(), [64, 128, 128]);
        assert_eq!(ChunkShape::auto(PixelType::U16, [9, 1000, 1000]).dims(), [8, 256, 256]);
        assert_eq!(ChunkShape::auto(PixelType::F32, [10, 300, 300]).dims(), [4, 256, 256]);
    }

    #[test]
    fn test_auto_chunk_ties_keep_first() {
        // 10 is equally far from 4 and 16.
        assert_eq!(ChunkShape::auto(PixelType::U32, [10, 512, 512]).dims(), [4, 256, 256]);
    }

    #[test]
    fn test_auto_chunk_clamped() {
        let chunk = ChunkShape::auto(PixelType::U16, [3, 40, 70]);
        assert_eq!(chunk.dims(), [2, 40, 70]);
        assert_eq!(chunk.total_voxels(), 2 * 40 * 70);
    }

    #[test]
    fn test_pad_to() {
        let data = Array3::<u16>::from_elem((1, 2, 3), 7);
        let padded = pad_to(data.view(), [2, 2, 4]);
        assert_eq!(padded.dim(), (2, 2, 4));
        assert_eq!(padded[[0, 1, 2]], 7);
        assert_eq!(padded[[0, 1, 3]], 0);
        assert_eq!(padded[[1, 0, 0]], 0);
        assert_eq!(pad_to(data.view(), [1, 1, 1]), data);
    }

    #[test]
    fn test_storage_settings_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = hdf5::File::create(dir.path().join("layout.h5")).unwrap();
        let data = Array3::<u8>::from_elem((2, 3, 4), 1);
        let settings = StorageSettings::gzip(ChunkShape::new([1, 8, 8]), 2);
        let dataset = settings.create_data(&file, data.view()).unwrap();
        assert_eq!(dataset.shape(), vec![2, 8, 8]);
        let stored = StorageSettings::of(&dataset);
        assert_eq!(stored.chunk, Some(ChunkShape::new([1, 8, 8])));
        assert_eq!(stored.compression, Compression::Gzip { level: 2 });
    }
}
