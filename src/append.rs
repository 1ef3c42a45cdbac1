//! Channel and timepoint appender
//!
//! Both operations write level 0 verbatim and resample the new data onto every
//! coarser level already present in the container, reusing the chunk shape and
//! compression of that level's first block. Only one channel of one level is
//! resampled at a time.

use crate::attrs::{clear_attrs, write_str_attr};
use crate::container::{channel_name, ensure_group, timepoint_name, Container};
use crate::error::{ImsError, Result};
use crate::layout::StorageSettings;
use crate::metadata::{format_time, ImsMetadata};
use crate::resample::resample_to_level;
use crate::settings_writer::write_settings;
use crate::types::Pixel;
use crate::volume::{dispatch_pixel_data, Volume};
use crate::writer::{settings_for, write_channel_block};
use chrono::NaiveDateTime;
use log::{debug, info};
use ndarray::{Array4, Axis};
use std::path::Path;

/// Check that `volume` matches the level 0 grid and pixel type of a container.
fn check_compatible(volume: &Volume, metadata: &ImsMetadata) -> Result<()> {
    if volume.size() != metadata.sizes[0] {
        return Err(ImsError::InvalidValue(format!(
            "volume size {:?} does not match container size {:?}",
            volume.size(),
            metadata.sizes[0]
        )));
    }
    if volume.pixel_type() != metadata.pixel_type {
        return Err(ImsError::InvalidValue(format!(
            "volume pixel type ({}) does not match container pixel type ({})",
            volume.pixel_type(),
            metadata.pixel_type
        )));
    }
    let existing = metadata
        .geometry(0)
        .ok_or_else(|| ImsError::InvalidFormat("container has no resolution levels".into()))?;
    if !existing.is_compatible(volume.geometry()) {
        return Err(ImsError::InvalidValue(format!(
            "volume origin {:?} and spacing {:?} do not match container origin {:?} and spacing {:?}",
            volume.geometry().origin,
            volume.geometry().spacing,
            existing.origin,
            existing.spacing
        )));
    }
    Ok(())
}

/// Write every channel of `array` into timepoint `time` of every resolution
/// level, numbering the new channels from `first_channel`.
fn write_pyramid<T: Pixel>(
    container: &Container,
    volume: &Volume,
    array: &Array4<T>,
    time: usize,
    first_channel: usize,
) -> Result<()> {
    let spacing = volume.geometry().spacing;
    for level in 0..container.resolution_count()? {
        let size = container.image_size(level)?;
        let storage = StorageSettings::of(&container.data(level, 0, 0)?);
        let timepoint = ensure_group(&container.resolution_group(level)?, &timepoint_name(time))?;
        for (offset, channel) in array.axis_iter(Axis(0)).enumerate() {
            let index = first_channel + offset;
            if level == 0 {
                write_channel_block(&timepoint, index, channel, &storage)?;
            } else {
                let resampled = resample_to_level(channel, spacing, size);
                write_channel_block(&timepoint, index, resampled.view(), &storage)?;
            }
        }
        debug!("level {} timepoint {}: wrote {} channels", level, time, array.dim().0);
    }
    Ok(())
}

/// Add the channels of `volume` to timepoint `time_index` of every resolution level.
///
/// New channels get the display settings carried by the volume, or the
/// defaults for their index. Channels present at other timepoints are not
/// touched; call once per timepoint to keep channel counts consistent.
pub fn append_channels(volume: &Volume, path: impl AsRef<Path>, time_index: usize) -> Result<()> {
    let path = path.as_ref();
    let (metadata, existing_at_time) = {
        let container = Container::open(path)?;
        let metadata = ImsMetadata::from_container(&container)?;
        check_compatible(volume, &metadata)?;
        if time_index >= metadata.time_count() {
            return Err(ImsError::OutOfRange(format!(
                "time index {time_index} outside [0, {})",
                metadata.time_count()
            )));
        }
        let existing = container.channel_count(0, time_index)?;
        (metadata, existing)
    };
    let added = volume.num_channels();
    let total = existing_at_time + added;
    let settings = settings_for(volume, existing_at_time)?;

    let container = Container::open_rw(path)?;

    dispatch_pixel_data!(volume.data(), array => {
        write_pyramid(&container, volume, array, time_index, existing_at_time)
    })?;

    // Settings groups may outlive channels removed by other applications;
    // such groups are cleared and reused.
    let described = metadata.channel_count();
    let info = container.info_root()?;
    for index in described..total {
        let name = channel_name(index);
        if info.link_exists(&name) {
            let group = info.group(&name)?;
            clear_attrs(&group)?;
        } else {
            ensure_group(&info, &name)?;
        }
    }
    let missing = total.saturating_sub(described);
    let skip = settings.len().saturating_sub(missing);
    for (offset, entry) in settings.iter().skip(skip).enumerate() {
        write_settings(&info, described + offset, entry)?;
    }

    info!(
        "appended {} channels to timepoint {} of {}",
        added,
        time_index,
        path.display()
    );
    Ok(())
}

/// Add `volume` as a new last timepoint with date-time `time`.
///
/// `time` must be later than the last existing timepoint and `volume` must
/// have as many channels as the container.
pub fn append_timepoint(volume: &Volume, time: NaiveDateTime, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let metadata = ImsMetadata::from_container(&Container::open(path)?)?;
    if let Some(last) = metadata.last_time() {
        if time <= *last {
            return Err(ImsError::InvalidValue(format!(
                "time {} is not after the last timepoint {}",
                format_time(&time),
                format_time(last)
            )));
        }
    }
    check_compatible(volume, &metadata)?;
    if volume.num_channels() != metadata.channel_count() {
        return Err(ImsError::InvalidValue(format!(
            "volume has {} channels, container has {}",
            volume.num_channels(),
            metadata.channel_count()
        )));
    }

    let container = Container::open_rw(path)?;
    let new_index = metadata.time_count();
    dispatch_pixel_data!(volume.data(), array => {
        write_pyramid(&container, volume, array, new_index, 0)
    })?;

    let count = (new_index + 1).to_string();
    let time_info = container.info_group("TimeInfo")?;
    write_str_attr(&time_info, "DatasetTimePoints", &count)?;
    write_str_attr(&time_info, "FileTimePoints", &count)?;
    write_str_attr(&time_info, &format!("TimePoint{}", new_index + 1), &format_time(&time))?;

    info!(
        "appended timepoint {} ({}) to {}",
        new_index,
        format_time(&time),
        path.display()
    );
    Ok(())
}
