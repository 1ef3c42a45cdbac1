//! Channel display settings writer

use crate::attrs::{
    format_float3, join_float3, read_opt_str_attr, read_str_attr, remove_attr, write_str_attr,
    write_text_dataset,
};
use crate::config::{DEFAULT_CREATOR, INLINE_ATTRIBUTE_LIMIT};
use crate::container::{
    channel_name, ensure_group, Container, CURRENT_VERSION, DEFAULT_DATASET_DIR,
    DEFAULT_DATASET_INFO_DIR,
};
use crate::error::{ImsError, Result};
use crate::settings::{ChannelColor, ChannelSettings, SettingsFields};
use hdf5::{File, Group};
use log::{debug, warn};
use std::collections::HashMap;
use std::path::Path;

/// Room left in an attribute message for its name, datatype and dataspace.
const ATTRIBUTE_HEADER_RESERVE: usize = 1024;

/// How the target container is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Modify an existing container, creating it if missing
    #[default]
    Append,
    /// Start a new container, discarding any existing file
    Create,
}

/// Write the root attributes and dataset-info skeleton of a new container,
/// with an empty display settings group per channel.
pub(crate) fn initialize_container(file: &File, channels: usize, creator: &str) -> Result<Group> {
    write_str_attr(file, "ImarisDataSet", "ImarisDataSet")?;
    write_str_attr(file, "ImarisVersion", CURRENT_VERSION)?;
    write_str_attr(file, "DataSetInfoDirectoryName", DEFAULT_DATASET_INFO_DIR)?;
    write_str_attr(file, "DataSetDirectoryName", DEFAULT_DATASET_DIR)?;
    file.new_attr::<u32>()
        .shape(1)
        .create("NumberOfDataSets")?
        .write_raw(&[1u32][..])?;

    let info = ensure_group(file, DEFAULT_DATASET_INFO_DIR)?;
    let dataset = ensure_group(&info, "ImarisDataSet")?;
    write_str_attr(&dataset, "Creator", creator)?;
    write_str_attr(&dataset, "NumberOfImages", "1")?;
    write_str_attr(&dataset, "Version", env!("CARGO_PKG_VERSION"))?;

    let imaris = ensure_group(&info, "Imaris")?;
    write_str_attr(&imaris, "ThumbnailMode", "thumbnailNone")?;
    write_str_attr(&imaris, "Version", env!("CARGO_PKG_VERSION"))?;

    for i in 0..channels {
        ensure_group(&info, &channel_name(i))?;
    }
    Ok(info)
}

/// Write the fields present in `settings` to the display settings group of channel `index`.
pub(crate) fn write_settings(info: &Group, index: usize, settings: &ChannelSettings) -> Result<()> {
    let group = ensure_group(info, &channel_name(index))?;
    if let Some(name) = &settings.name {
        write_str_attr(&group, "Name", name)?;
    }
    if let Some(description) = &settings.description {
        write_str_attr(&group, "Description", description)?;
    }
    if let Some(color) = &settings.color {
        write_color(&group, color)?;
    }
    if let Some(range) = settings.range {
        write_str_attr(&group, "ColorRange", &join_float3(&range))?;
    }
    if let Some(gamma) = settings.gamma {
        write_str_attr(&group, "GammaCorrection", &format_float3(gamma))?;
    }
    if let Some(alpha) = settings.alpha {
        write_str_attr(&group, "ColorOpacity", &format_float3(alpha))?;
    }
    Ok(())
}

/// Base colors and color tables exclude each other; the traces of whichever
/// was stored before are removed first.
fn write_color(group: &Group, color: &ChannelColor) -> Result<()> {
    let previous = read_opt_str_attr(group, "ColorMode")?;
    debug!(
        "replacing {} color of {}",
        previous.as_deref().unwrap_or("unset"),
        group.name()
    );
    remove_attr(group, "Color")?;
    remove_attr(group, "ColorTable")?;
    remove_attr(group, "ColorTableLength")?;
    if group.link_exists("ColorTable") {
        group.unlink("ColorTable")?;
    }

    match color {
        ChannelColor::Base(rgb) => {
            write_str_attr(group, "ColorMode", "BaseColor")?;
            write_str_attr(group, "Color", &join_float3(rgb))?;
        }
        ChannelColor::Table(table) => {
            let text = format!("{} ", join_float3(&color.components()));
            if text.len() + ATTRIBUTE_HEADER_RESERVE <= INLINE_ATTRIBUTE_LIMIT {
                write_str_attr(group, "ColorTable", &text)?;
            } else if let Err(e) = write_color_table_dataset(group, &text) {
                warn!(
                    "could not store {} entry color table of {}: {}",
                    table.len(),
                    group.name(),
                    e
                );
            }
            write_str_attr(group, "ColorTableLength", &table.len().to_string())?;
            write_str_attr(group, "ColorMode", "TableColor")?;
        }
    }
    Ok(())
}

fn write_color_table_dataset(group: &Group, text: &str) -> Result<()> {
    write_text_dataset(group, "ColorTable", text)?;
    Ok(())
}

/// Write display settings of channels given by index.
///
/// Only the fields both present in an entry and selected by `fields` are
/// written, leaving the other settings of the channel untouched. A missing
/// container is created with one channel per entry. Every index is checked
/// against the channel count before anything is written.
pub fn write_channel_settings(
    settings: &[(usize, ChannelSettings)],
    fields: SettingsFields,
    path: impl AsRef<Path>,
    mode: AccessMode,
) -> Result<()> {
    let path = path.as_ref();
    let file = match mode {
        AccessMode::Create => File::create(path)?,
        AccessMode::Append if path.exists() => File::open_rw(path)?,
        AccessMode::Append => File::create(path)?,
    };

    let (info, channel_count) = match read_opt_str_attr(&file, "ImarisVersion")? {
        Some(_) => {
            let container = Container::from_file(file.clone())?;
            (container.info_root()?, container.channel_count(0, 0)?)
        }
        None => {
            debug!("initializing new container {}", path.display());
            (
                initialize_container(&file, settings.len(), DEFAULT_CREATOR)?,
                settings.len(),
            )
        }
    };

    if let Some((bad, _)) = settings.iter().find(|(i, _)| *i >= channel_count) {
        return Err(ImsError::InvalidValue(format!(
            "channel index {bad} outside [0, {channel_count})"
        )));
    }

    for (index, entry) in settings {
        write_settings(&info, *index, &entry.select(fields))?;
    }
    debug!(
        "wrote settings of {} channels to {}",
        settings.len(),
        path.display()
    );
    Ok(())
}

/// Key used to match channels by name: the trimmed text after the last
/// separator, or the whole name without a separator.
pub fn channel_key(name: &str, separator: Option<char>) -> String {
    match separator {
        Some(sep) => name.rsplit(sep).next().unwrap_or(name).trim().to_string(),
        None => name.to_string(),
    }
}

/// Write display settings of channels given by name.
///
/// Returns `false`, without writing, when none of the names matches a channel.
pub fn write_named_channel_settings(
    settings_by_name: &[(String, ChannelSettings)],
    fields: SettingsFields,
    path: impl AsRef<Path>,
    separator: Option<char>,
) -> Result<bool> {
    let path = path.as_ref();
    let name_to_index: HashMap<String, usize> = {
        let container = Container::open(path)?;
        let count = container.channel_count(0, 0)?;
        (0..count)
            .map(|i| {
                let group = container.channel_info_group(i)?;
                let name = read_str_attr(&group, "Name")?;
                Ok((channel_key(&name, separator), i))
            })
            .collect::<Result<_>>()?
    };

    let indexed: Vec<(usize, ChannelSettings)> = settings_by_name
        .iter()
        .filter_map(|(name, settings)| {
            name_to_index
                .get(&channel_key(name, separator))
                .map(|&i| (i, settings.clone()))
        })
        .collect();
    if indexed.is_empty() {
        return Ok(false);
    }
    write_channel_settings(&indexed, fields, path, AccessMode::Append)?;
    Ok(true)
}
