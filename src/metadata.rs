//! Container metadata - timepoints, physical geometry, storage layout and
//! channel display settings

use crate::attrs::{decode_ascii, has_attr, parse_floats, read_opt_str_attr, read_parsed_attr, read_str_attr, AsciiChar};
use crate::container::Container;
use crate::error::{ImsError, Result};
use crate::layout::StorageSettings;
use crate::settings::{ChannelColor, ChannelSettings};
use crate::types::{Geometry, PixelType, TIME_FORMAT, TIME_PARSE_FORMATS};
use chrono::NaiveDateTime;
use hdf5::{Dataset, Group};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parse a timepoint date-time, with or without fractional seconds.
pub fn parse_time(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    TIME_PARSE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .ok_or_else(|| ImsError::InvalidFormat(format!("unparsable timepoint {text:?}")))
}

/// Render a timepoint date-time with microseconds.
pub fn format_time(time: &NaiveDateTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Everything describing a container except its pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImsMetadata {
    /// Container format version
    pub version: String,

    /// Date-time of every timepoint, in order
    pub times: Vec<NaiveDateTime>,

    /// Physical unit of spacings and origin
    pub unit: String,

    /// Voxel dimensions (x, y, z) per resolution level
    pub sizes: Vec<[usize; 3]>,

    /// Voxel spacing (x, y, z) per resolution level
    pub spacings: Vec<[f64; 3]>,

    /// Center of the first voxel, shared by all resolution levels
    pub origin: [f64; 3],

    /// Chunking and compression per resolution level
    pub storage: Vec<StorageSettings>,

    /// Scalar pixel type shared by all channels
    pub pixel_type: PixelType,

    /// Display settings per channel index
    pub channels: Vec<(usize, ChannelSettings)>,
}

impl ImsMetadata {
    /// Collect the metadata of an open container.
    pub fn from_container(container: &Container) -> Result<Self> {
        let time_info = container.info_group("TimeInfo")?;
        let time_count: usize = read_parsed_attr(&time_info, "DatasetTimePoints")?;
        let times = (1..=time_count)
            .map(|i| parse_time(&read_str_attr(&time_info, &format!("TimePoint{i}"))?))
            .collect::<Result<Vec<_>>>()?;

        let image = container.info_group("Image")?;
        let unit = read_str_attr(&image, "Unit")?;
        let (min, max) = read_extents(&image)?;

        let levels = container.resolution_count()?;
        let mut sizes = Vec::with_capacity(levels);
        let mut storage = Vec::with_capacity(levels);
        for level in 0..levels {
            sizes.push(container.image_size(level)?);
            storage.push(StorageSettings::of(&container.data(level, 0, 0)?));
        }
        if sizes.is_empty() {
            return Err(ImsError::InvalidFormat("container has no resolution levels".into()));
        }
        let spacings: Vec<[f64; 3]> = sizes
            .iter()
            .map(|size| Geometry::from_extents(min, max, *size).spacing)
            .collect();
        let origin = Geometry::from_extents(min, max, sizes[0]).origin;

        let pixel_type = pixel_type_of(&container.data(0, 0, 0)?)?;

        let channel_count = container.channel_count(0, 0)?;
        let channels = (0..channel_count)
            .map(|i| Ok((i, read_channel_settings(container, i)?)))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "container metadata: {} levels, {} timepoints, {} channels of {}",
            levels,
            times.len(),
            channels.len(),
            pixel_type
        );

        Ok(Self {
            version: container.version().to_string(),
            times,
            unit,
            sizes,
            spacings,
            origin,
            storage,
            pixel_type,
            channels,
        })
    }

    pub fn resolution_count(&self) -> usize {
        self.sizes.len()
    }

    pub fn time_count(&self) -> usize {
        self.times.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Placement of the voxel grid of a resolution level.
    pub fn geometry(&self, level: usize) -> Option<Geometry> {
        self.spacings
            .get(level)
            .map(|spacing| Geometry::new(self.origin, *spacing))
    }

    pub fn last_time(&self) -> Option<&NaiveDateTime> {
        self.times.last()
    }

    /// Pretty printed JSON rendering.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Read the metadata of the container at `path`.
pub fn read_metadata(path: impl AsRef<Path>) -> Result<ImsMetadata> {
    ImsMetadata::from_container(&Container::open(path)?)
}

/// Bounding box corners stored in the `Image` group.
pub(crate) fn read_extents(image: &Group) -> Result<([f64; 3], [f64; 3])> {
    let mut min = [0.0; 3];
    let mut max = [0.0; 3];
    for axis in 0..3 {
        min[axis] = read_parsed_attr(image, &format!("ExtMin{axis}"))?;
        max[axis] = read_parsed_attr(image, &format!("ExtMax{axis}"))?;
    }
    Ok((min, max))
}

/// Scalar pixel type of a stored data block.
pub fn pixel_type_of(dataset: &Dataset) -> Result<PixelType> {
    let descriptor = dataset.dtype()?.to_descriptor()?;
    PixelType::from_descriptor(&descriptor)
        .ok_or_else(|| ImsError::UnsupportedPixelType(format!("{descriptor:?}")))
}

/// Display settings of one channel. Gamma is left unset when absent.
pub fn read_channel_settings(container: &Container, index: usize) -> Result<ChannelSettings> {
    let group = container.channel_info_group(index)?;

    let color = match read_str_attr(&group, "ColorMode")?.as_str() {
        "BaseColor" => {
            let text = read_str_attr(&group, "Color")?;
            let values = parse_floats(&text)?;
            if values.len() != 3 {
                return Err(ImsError::InvalidFormat(format!(
                    "channel {index} color {text:?} is not an RGB triple"
                )));
            }
            ChannelColor::Base([values[0], values[1], values[2]])
        }
        "TableColor" => ChannelColor::Table(read_color_table(&group, index)?),
        other => {
            return Err(ImsError::InvalidFormat(format!(
                "channel {index} has unknown color mode {other:?}"
            )))
        }
    };

    let range = parse_floats(&read_str_attr(&group, "ColorRange")?)?;
    if range.len() != 2 {
        return Err(ImsError::InvalidFormat(format!(
            "channel {index} color range needs two values"
        )));
    }

    let gamma = read_opt_str_attr(&group, "GammaCorrection")?.and_then(|g| g.trim().parse().ok());

    Ok(ChannelSettings {
        name: Some(read_str_attr(&group, "Name")?),
        description: Some(read_str_attr(&group, "Description")?),
        color: Some(color),
        alpha: Some(read_parsed_attr(&group, "ColorOpacity")?),
        range: Some([range[0], range[1]]),
        gamma,
    })
}

/// A color table lives in an attribute or, when large, in a dataset.
fn read_color_table(group: &Group, index: usize) -> Result<Vec<[f64; 3]>> {
    let text = if has_attr(group, "ColorTable")? {
        read_str_attr(group, "ColorTable")?
    } else if group.link_exists("ColorTable") {
        decode_ascii(&group.dataset("ColorTable")?.read_raw::<AsciiChar>()?)
    } else {
        return Err(ImsError::MissingField(format!("Channel {index}/ColorTable")));
    };
    let values = parse_floats(&text)?;
    if values.is_empty() || values.len() % 3 != 0 {
        return Err(ImsError::InvalidFormat(format!(
            "channel {index} color table has {} values",
            values.len()
        )));
    }
    Ok(values.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    #[test]
    fn test_parse_time_formats() {
        let with_micros = parse_time("2021-03-04 05:06:07.000250").unwrap();
        assert_eq!(with_micros.nanosecond(), 250_000);
        let without = parse_time("2021-03-04 05:06:07").unwrap();
        assert_eq!(
            without,
            NaiveDate::from_ymd_opt(2021, 3, 4)
                .unwrap()
                .and_hms_opt(5, 6, 7)
                .unwrap()
        );
        assert!(matches!(parse_time("yesterday"), Err(ImsError::InvalidFormat(_))));
    }

    #[test]
    fn test_format_time() {
        let time = NaiveDate::from_ymd_opt(2020, 1, 2)
            .unwrap()
            .and_hms_micro_opt(3, 4, 5, 6)
            .unwrap();
        assert_eq!(format_time(&time), "2020-01-02 03:04:05.000006");
        assert_eq!(parse_time(&format_time(&time)).unwrap(), time);
    }
}
