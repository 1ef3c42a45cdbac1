//! Container access - opening Imaris files and navigating their layout
//!
//! ```text
//! /                                   ImarisVersion, DataSetDirectoryName, ...
//! /DataSet/ResolutionLevel {r}/TimePoint {t}/Channel {c}/Data
//! /DataSetInfo/Channel {c}            display settings
//! /DataSetInfo/TimeInfo               timepoint count and date-times
//! /DataSetInfo/Image                  unit and bounding box
//! ```

use crate::attrs::{read_parsed_attr, read_str_attr};
use crate::error::{ImsError, Result};
use hdf5::{Dataset, File, Group};
use log::debug;
use std::path::Path;

/// Container versions this crate can read and modify.
pub const SUPPORTED_VERSIONS: &[&str] = &["5.5.0"];

/// Version written into new containers.
pub const CURRENT_VERSION: &str = "5.5.0";

/// Directory names written into new containers.
pub const DEFAULT_DATASET_DIR: &str = "DataSet";
pub const DEFAULT_DATASET_INFO_DIR: &str = "DataSetInfo";

/// Default raw data chunk cache for reads (30 MiB).
pub const DEFAULT_CHUNK_CACHE_BYTES: usize = 30 * 1024 * 1024;

const CHUNK_CACHE_SLOTS: usize = 12_421;

pub fn resolution_name(level: usize) -> String {
    format!("ResolutionLevel {level}")
}

pub fn timepoint_name(time: usize) -> String {
    format!("TimePoint {time}")
}

pub fn channel_name(channel: usize) -> String {
    format!("Channel {channel}")
}

/// Fail with [`ImsError::UnsupportedVersion`] unless `version` is recognized.
pub fn check_version(version: &str) -> Result<()> {
    if SUPPORTED_VERSIONS.contains(&version) {
        Ok(())
    } else {
        Err(ImsError::UnsupportedVersion(version.to_string()))
    }
}

/// Open a child group, reporting a structural error if it is absent.
pub(crate) fn child_group(parent: &Group, name: &str) -> Result<Group> {
    if !parent.link_exists(name) {
        return Err(ImsError::InvalidFormat(format!(
            "missing group {name} under {}",
            parent.name()
        )));
    }
    Ok(parent.group(name)?)
}

/// Open a `/`-separated group path, creating missing groups on the way.
pub(crate) fn ensure_group(parent: &Group, path: &str) -> Result<Group> {
    let mut current = parent.clone();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        current = if current.link_exists(part) {
            current.group(part)?
        } else {
            current.create_group(part)?
        };
    }
    Ok(current)
}

/// Count the members of a group whose name starts with `prefix`.
pub(crate) fn count_members(group: &Group, prefix: &str) -> Result<usize> {
    Ok(group
        .member_names()?
        .iter()
        .filter(|name| name.starts_with(prefix))
        .count())
}

/// An open, version-checked Imaris container
pub struct Container {
    file: File,
    version: String,
    dataset_dir: String,
    info_dir: String,
}

impl Container {
    /// Open an existing container read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_cache(path, DEFAULT_CHUNK_CACHE_BYTES)
    }

    /// Open an existing container read-only with a raw data chunk cache of `bytes`.
    pub fn open_with_cache(path: impl AsRef<Path>, bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        debug!("opening {} (chunk cache {} bytes)", path.display(), bytes);
        let file = File::with_options()
            .with_fapl(|p| p.chunk_cache(CHUNK_CACHE_SLOTS, bytes, 0.75))
            .open(path)?;
        Self::from_file(file)
    }

    /// Open an existing container for modification.
    pub fn open_rw(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("opening {} for writing", path.display());
        Self::from_file(File::open_rw(path)?)
    }

    /// Wrap an open file, validating its version before anything else is parsed.
    pub(crate) fn from_file(file: File) -> Result<Self> {
        let version = read_str_attr(&file, "ImarisVersion")?;
        check_version(&version)?;
        let dataset_dir = read_str_attr(&file, "DataSetDirectoryName")?;
        let info_dir = read_str_attr(&file, "DataSetInfoDirectoryName")?;
        Ok(Self {
            file,
            version,
            dataset_dir,
            info_dir,
        })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn dataset_root(&self) -> Result<Group> {
        child_group(&self.file, &self.dataset_dir)
    }

    pub fn info_root(&self) -> Result<Group> {
        child_group(&self.file, &self.info_dir)
    }

    /// A named group directly under the dataset-info root (`TimeInfo`, `Image`, ...).
    pub fn info_group(&self, name: &str) -> Result<Group> {
        child_group(&self.info_root()?, name)
    }

    /// Number of resolution levels.
    pub fn resolution_count(&self) -> Result<usize> {
        count_members(&self.dataset_root()?, "ResolutionLevel ")
    }

    pub fn resolution_group(&self, level: usize) -> Result<Group> {
        child_group(&self.dataset_root()?, &resolution_name(level))
    }

    pub fn timepoint_group(&self, level: usize, time: usize) -> Result<Group> {
        child_group(&self.resolution_group(level)?, &timepoint_name(time))
    }

    pub fn channel_group(&self, level: usize, time: usize, channel: usize) -> Result<Group> {
        child_group(&self.timepoint_group(level, time)?, &channel_name(channel))
    }

    /// Number of channels stored at a resolution level and timepoint.
    pub fn channel_count(&self, level: usize, time: usize) -> Result<usize> {
        count_members(&self.timepoint_group(level, time)?, "Channel ")
    }

    /// Display settings group of a channel.
    pub fn channel_info_group(&self, channel: usize) -> Result<Group> {
        self.info_group(&channel_name(channel))
    }

    /// Voxel dimensions (x, y, z) of a resolution level, taken from its first channel.
    pub fn image_size(&self, level: usize) -> Result<[usize; 3]> {
        let channel = self.channel_group(level, 0, 0)?;
        Ok([
            read_parsed_attr(&channel, "ImageSizeX")?,
            read_parsed_attr(&channel, "ImageSizeY")?,
            read_parsed_attr(&channel, "ImageSizeZ")?,
        ])
    }

    /// Pixel data block of one channel.
    pub fn data(&self, level: usize, time: usize, channel: usize) -> Result<Dataset> {
        let group = self.channel_group(level, time, channel)?;
        if !group.link_exists("Data") {
            return Err(ImsError::InvalidFormat(format!(
                "missing Data under {}",
                group.name()
            )));
        }
        Ok(group.dataset("Data")?)
    }
}
