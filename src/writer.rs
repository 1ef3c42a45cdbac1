//! Full-volume writer - creates a new container from an in-memory volume

use crate::attrs::write_str_attr;
use crate::config::WriteOptions;
use crate::container::{channel_name, ensure_group, resolution_name, timepoint_name, DEFAULT_DATASET_DIR};
use crate::error::{ImsError, Result};
use crate::histogram::write_histograms;
use crate::layout::{ChunkShape, StorageSettings};
use crate::metadata::{format_time, parse_time};
use crate::settings::ChannelSettings;
use crate::settings_writer::{initialize_container, write_settings};
use crate::types::Pixel;
use crate::volume::{dispatch_pixel_data, Volume};
use chrono::Local;
use hdf5::{File, Group};
use log::{debug, info};
use ndarray::{Array4, ArrayView3, Axis};
use std::path::Path;

/// Unit recorded when a volume carries none.
pub const DEFAULT_UNIT: &str = "mm";

/// Create a channel group holding one pixel data block and its histograms.
pub(crate) fn write_channel_block<T: Pixel>(
    timepoint: &Group,
    channel: usize,
    data: ArrayView3<T>,
    storage: &StorageSettings,
) -> Result<()> {
    let (z, y, x) = data.dim();
    let group = ensure_group(timepoint, &channel_name(channel))?;
    write_str_attr(&group, "ImageSizeX", &x.to_string())?;
    write_str_attr(&group, "ImageSizeY", &y.to_string())?;
    write_str_attr(&group, "ImageSizeZ", &z.to_string())?;
    storage.create_data(&group, data)?;
    write_histograms(&group, data)?;
    debug!("wrote {} ({}x{}x{})", group.name(), x, y, z);
    Ok(())
}

/// Display settings for the channels of `volume`: its annotation when
/// present, the per-index defaults otherwise.
pub(crate) fn settings_for(volume: &Volume, first_index: usize) -> Result<Vec<ChannelSettings>> {
    let count = volume.num_channels();
    match volume.channel_settings()? {
        Some(channels) if channels.len() == count => {
            Ok(channels.into_iter().map(|(_, s)| s).collect())
        }
        Some(channels) => Err(ImsError::InvalidValue(format!(
            "volume has {count} channels but its annotation describes {}",
            channels.len()
        ))),
        None => Ok((first_index..first_index + count)
            .map(ChannelSettings::defaults)
            .collect()),
    }
}

/// Write `volume` to a new container at `path` with default options.
pub fn write(volume: &Volume, path: impl AsRef<Path>) -> Result<()> {
    write_with_options(volume, path, &WriteOptions::default())
}

/// Write `volume` to a new container at `path`: one resolution level, one
/// timepoint and one channel per volume channel.
pub fn write_with_options(volume: &Volume, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
    let path = path.as_ref();
    if !volume.has_identity_direction() {
        return Err(ImsError::NonIdentityDirection);
    }
    let settings = settings_for(volume, 0)?;
    let time = match volume.time() {
        Some(text) => parse_time(text).map_err(|_| {
            ImsError::InvalidValue(format!("volume time {text:?} is not a date-time"))
        })?,
        None => Local::now().naive_local(),
    };

    let file = File::create(path)?;
    let info = initialize_container(&file, settings.len(), &options.creator)?;
    for (index, channel) in settings.iter().enumerate() {
        write_settings(&info, index, channel)?;
    }

    let time_info = ensure_group(&info, "TimeInfo")?;
    write_str_attr(&time_info, "DatasetTimePoints", "1")?;
    write_str_attr(&time_info, "FileTimePoints", "1")?;
    write_str_attr(&time_info, "TimePoint1", &format_time(&time))?;

    let size = volume.size();
    let (min, max) = volume.geometry().extents(size);
    let image = ensure_group(&info, "Image")?;
    write_str_attr(&image, "Unit", volume.unit().unwrap_or(DEFAULT_UNIT))?;
    for (axis, label) in ["X", "Y", "Z"].iter().enumerate() {
        write_str_attr(&image, label, &size[axis].to_string())?;
        write_str_attr(&image, &format!("ExtMin{axis}"), &min[axis].to_string())?;
        write_str_attr(&image, &format!("ExtMax{axis}"), &max[axis].to_string())?;
    }

    let chunk = match options.chunk_shape {
        Some(chunk) => chunk.clamped([size[2], size[1], size[0]]),
        None => ChunkShape::auto(volume.pixel_type(), [size[2], size[1], size[0]]),
    };
    let storage = StorageSettings::gzip(chunk, options.compression_level);
    let timepoint = ensure_group(
        &file,
        &format!(
            "{DEFAULT_DATASET_DIR}/{}/{}",
            resolution_name(0),
            timepoint_name(0)
        ),
    )?;
    dispatch_pixel_data!(volume.data(), array => write_channels(&timepoint, array, &storage))?;

    info!(
        "created {} with {} channels of {} ({}x{}x{})",
        path.display(),
        settings.len(),
        volume.pixel_type(),
        size[0],
        size[1],
        size[2]
    );
    Ok(())
}

fn write_channels<T: Pixel>(timepoint: &Group, array: &Array4<T>, storage: &StorageSettings) -> Result<()> {
    for (index, channel) in array.axis_iter(Axis(0)).enumerate() {
        write_channel_block(timepoint, index, channel, storage)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::read_str_attr;
    use crate::types::{Geometry, PixelType};

    #[test]
    fn test_rejects_rotation() {
        let dir = tempfile::TempDir::new().unwrap();
        let volume = Volume::zeros(PixelType::U8, 1, [2, 2, 2])
            .with_direction([0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        assert!(matches!(
            write(&volume, dir.path().join("rotated.ims")),
            Err(ImsError::NonIdentityDirection)
        ));
    }

    #[test]
    fn test_annotation_count_mismatch() {
        let mut volume = Volume::zeros(PixelType::U8, 2, [2, 2, 2]);
        volume
            .set_channel_settings(&[(0, ChannelSettings::defaults(0))])
            .unwrap();
        assert!(matches!(settings_for(&volume, 0), Err(ImsError::InvalidValue(_))));
    }

    #[test]
    fn test_layout_of_new_container() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("new.ims");
        let volume = Volume::zeros(PixelType::U16, 2, [5, 4, 3])
            .with_geometry(Geometry::new([0.5, 0.5, 1.0], [1.0, 1.0, 2.0]))
            .with_metadata("unit", "um")
            .with_metadata("times", "2022-01-01 10:00:00.000000");
        write(&volume, &path).unwrap();

        let file = File::open(&path).unwrap();
        let image = file.group("DataSetInfo/Image").unwrap();
        assert_eq!(read_str_attr(&image, "Unit").unwrap(), "um");
        assert_eq!(read_str_attr(&image, "X").unwrap(), "5");
        assert_eq!(read_str_attr(&image, "ExtMin2").unwrap(), "0");
        assert_eq!(read_str_attr(&image, "ExtMax2").unwrap(), "6");
        let time_info = file.group("DataSetInfo/TimeInfo").unwrap();
        assert_eq!(
            read_str_attr(&time_info, "TimePoint1").unwrap(),
            "2022-01-01 10:00:00.000000"
        );
        let channel = file
            .group("DataSet/ResolutionLevel 0/TimePoint 0/Channel 1")
            .unwrap();
        assert_eq!(read_str_attr(&channel, "ImageSizeZ").unwrap(), "3");
        assert_eq!(channel.dataset("Data").unwrap().shape(), vec![3, 4, 5]);
        assert!(channel.link_exists("Histogram1024"));
        let names = file.group("DataSetInfo/Channel 1").unwrap();
        assert_eq!(read_str_attr(&names, "Name").unwrap(), "ch 2");
    }
}
