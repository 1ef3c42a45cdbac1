//! Pixel data reader

use crate::container::{Container, DEFAULT_CHUNK_CACHE_BYTES};
use crate::error::{ImsError, Result};
use crate::metadata::{format_time, ImsMetadata};
use crate::types::{unit_to_mm, ComponentLayout, Pixel, PixelType, SubRegion};
use crate::volume::{Volume, TIME_METADATA_KEY, UNIT_METADATA_KEY};
use log::debug;
use ndarray::{s, stack, Array3, Axis, Ix3};
use std::path::Path;

/// Which channels to read
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChannelSelection {
    #[default]
    All,
    One(usize),
    Many(Vec<usize>),
}

impl ChannelSelection {
    /// Resolve to explicit indices, checking each against `count`.
    pub fn indices(&self, count: usize) -> Result<Vec<usize>> {
        let indices = match self {
            ChannelSelection::All => return Ok((0..count).collect()),
            ChannelSelection::One(index) => vec![*index],
            ChannelSelection::Many(indices) => indices.clone(),
        };
        if indices.is_empty() {
            return Err(ImsError::OutOfRange("no channel requested".to_string()));
        }
        if let Some(bad) = indices.iter().find(|&&i| i >= count) {
            return Err(ImsError::OutOfRange(format!(
                "channel index {bad} outside [0, {count})"
            )));
        }
        Ok(indices)
    }
}

impl From<usize> for ChannelSelection {
    fn from(index: usize) -> Self {
        ChannelSelection::One(index)
    }
}

impl From<Vec<usize>> for ChannelSelection {
    fn from(indices: Vec<usize>) -> Self {
        ChannelSelection::Many(indices)
    }
}

/// Parameters of a pixel read
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    pub time_index: usize,
    pub resolution_index: usize,
    pub channels: ChannelSelection,
    /// Voxel ranges (x, y, z); the whole level when unset
    pub sub_region: Option<SubRegion>,
    pub layout: ComponentLayout,
    /// Rescale origin and spacing to millimeters
    pub convert_to_mm: bool,
    pub chunk_cache_bytes: usize,
}

impl ReadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time(mut self, time_index: usize) -> Self {
        self.time_index = time_index;
        self
    }

    pub fn with_resolution(mut self, resolution_index: usize) -> Self {
        self.resolution_index = resolution_index;
        self
    }

    pub fn with_channels(mut self, channels: impl Into<ChannelSelection>) -> Self {
        self.channels = channels.into();
        self
    }

    pub fn with_sub_region(mut self, sub_region: SubRegion) -> Self {
        self.sub_region = Some(sub_region);
        self
    }

    pub fn with_layout(mut self, layout: ComponentLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_convert_to_mm(mut self, convert: bool) -> Self {
        self.convert_to_mm = convert;
        self
    }

    pub fn with_chunk_cache_bytes(mut self, bytes: usize) -> Self {
        self.chunk_cache_bytes = bytes;
        self
    }
}

impl Default for ReadRequest {
    fn default() -> Self {
        Self {
            time_index: 0,
            resolution_index: 0,
            channels: ChannelSelection::All,
            sub_region: None,
            layout: ComponentLayout::default(),
            convert_to_mm: false,
            chunk_cache_bytes: DEFAULT_CHUNK_CACHE_BYTES,
        }
    }
}

/// Read voxels of one timepoint and resolution level into a volume.
///
/// The volume is annotated with its unit, the timepoint date-time and the
/// display settings of the channels read. All indices are validated before
/// any pixel is touched.
pub fn read(path: impl AsRef<Path>, request: &ReadRequest) -> Result<Volume> {
    let path = path.as_ref();
    let container = Container::open_with_cache(path, request.chunk_cache_bytes)?;
    let metadata = ImsMetadata::from_container(&container)?;

    let mm_factor = if request.convert_to_mm {
        Some(unit_to_mm(&metadata.unit).ok_or_else(|| {
            ImsError::InvalidValue(format!(
                "cannot convert unit {:?} to mm",
                metadata.unit
            ))
        })?)
    } else {
        None
    };
    if request.time_index >= metadata.time_count() {
        return Err(ImsError::OutOfRange(format!(
            "time index {} outside [0, {})",
            request.time_index,
            metadata.time_count()
        )));
    }
    let level = request.resolution_index;
    let (size, mut geometry) = match (metadata.sizes.get(level), metadata.geometry(level)) {
        (Some(size), Some(geometry)) => (*size, geometry),
        _ => {
            return Err(ImsError::OutOfRange(format!(
                "resolution index {level} outside [0, {})",
                metadata.resolution_count()
            )))
        }
    };
    let channels = request.channels.indices(metadata.channel_count())?;

    let region = match &request.sub_region {
        Some(region) => {
            for axis in 0..3 {
                let range = &region[axis];
                if range.start >= range.end || range.end > size[axis] {
                    return Err(ImsError::OutOfRange(format!(
                        "sub-region {range:?} outside [0, {}) on axis {axis}",
                        size[axis]
                    )));
                }
            }
            geometry = geometry.shifted([region[0].start, region[1].start, region[2].start]);
            region.clone()
        }
        None => [0..size[0], 0..size[1], 0..size[2]],
    };
    if let Some(factor) = mm_factor {
        geometry = geometry.scaled(factor);
    }

    debug!(
        "reading {} channels {:?} at level {} timepoint {}",
        path.display(),
        channels,
        level,
        request.time_index
    );

    let mut volume = match metadata.pixel_type {
        PixelType::U8 => read_channels::<u8>(&container, level, request.time_index, &channels, &region)?,
        PixelType::U16 => read_channels::<u16>(&container, level, request.time_index, &channels, &region)?,
        PixelType::U32 => read_channels::<u32>(&container, level, request.time_index, &channels, &region)?,
        PixelType::F32 => read_channels::<f32>(&container, level, request.time_index, &channels, &region)?,
    }
    .with_layout(request.layout)
    .with_geometry(geometry)
    .with_metadata(
        UNIT_METADATA_KEY,
        if mm_factor.is_some() { "mm" } else { metadata.unit.as_str() },
    )
    .with_metadata(
        TIME_METADATA_KEY,
        format_time(&metadata.times[request.time_index]),
    );

    let settings: Vec<_> = channels
        .iter()
        .map(|&c| metadata.channels[c].clone())
        .collect();
    volume.set_channel_settings(&settings)?;
    Ok(volume)
}

fn read_channels<T: Pixel>(
    container: &Container,
    level: usize,
    time: usize,
    channels: &[usize],
    region: &SubRegion,
) -> Result<Volume> {
    let [x, y, z] = region.clone();
    let arrays = channels
        .iter()
        .map(|&c| {
            let data = container.data(level, time, c)?;
            Ok(data.read_slice::<T, _, Ix3>(s![z.clone(), y.clone(), x.clone()])?)
        })
        .collect::<Result<Vec<Array3<T>>>>()?;
    let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
    let array = stack(Axis(0), &views)
        .map_err(|e| ImsError::InvalidFormat(format!("channel blocks differ in shape: {e}")))?;
    Ok(Volume::from_array(array))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_selection() {
        assert_eq!(ChannelSelection::All.indices(3).unwrap(), vec![0, 1, 2]);
        assert_eq!(ChannelSelection::from(1).indices(3).unwrap(), vec![1]);
        assert_eq!(
            ChannelSelection::from(vec![2, 0]).indices(3).unwrap(),
            vec![2, 0]
        );
        assert!(matches!(
            ChannelSelection::One(3).indices(3),
            Err(ImsError::OutOfRange(_))
        ));
        assert!(ChannelSelection::Many(vec![]).indices(3).is_err());
    }

    #[test]
    fn test_request_builder() {
        let request = ReadRequest::new()
            .with_time(2)
            .with_resolution(1)
            .with_channels(vec![0, 1])
            .with_sub_region([0..4, 1..3, 0..1])
            .with_layout(ComponentLayout::Vector)
            .with_convert_to_mm(true);
        assert_eq!(request.time_index, 2);
        assert_eq!(request.resolution_index, 1);
        assert_eq!(request.channels, ChannelSelection::Many(vec![0, 1]));
        assert_eq!(request.sub_region, Some([0..4, 1..3, 0..1]));
        assert_eq!(request.chunk_cache_bytes, 30 * 1024 * 1024);
    }
}
