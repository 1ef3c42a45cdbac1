//! ims-io - Imaris container reader and writer
//!
//! A Rust implementation of reading and writing Imaris (`.ims`) files: HDF5
//! containers holding multi-resolution, multi-timepoint, multi-channel 3D
//! microscopy volumes together with physical geometry and per-channel
//! display settings.
//!
//! # Features
//!
//! - Scalar pixel types u8, u16, u32 and f32
//! - Sub-region, per-channel and per-level reads with unit conversion to mm
//! - Full-volume writes with chunked, deflate-compressed storage and histograms
//! - Appending channels and timepoints, with resampling onto every resolution level
//! - In-place update of channel display settings, by index or by name
//! - CSV import and export of channel display settings
//! - Async batch application of settings to many containers
//!
//! # Example
//!
//! ```rust,ignore
//! use ims_io::{read, write, ReadRequest};
//!
//! # fn example() -> ims_io::Result<()> {
//! let volume = read("cells.ims", &ReadRequest::new().with_channels(vec![0, 2]))?;
//! println!("{:?} voxels, spacing {:?}", volume.size(), volume.geometry().spacing);
//! write(&volume, "subset.ims")?;
//! # Ok(())
//! # }
//! ```

pub mod append;
pub mod attrs;
pub mod channels_xml;
pub mod config;
pub mod container;
pub mod error;
pub mod histogram;
pub mod layout;
pub mod metadata;
pub mod reader;
pub mod resample;
pub mod settings;
pub mod settings_table;
pub mod settings_writer;
pub mod tasks;
pub mod types;
pub mod volume;
pub mod writer;

// Re-exports
pub use append::{append_channels, append_timepoint};
pub use config::WriteOptions;
pub use container::Container;
pub use error::{ErrorKind, ImsError, Result};
pub use layout::{ChunkShape, Compression, StorageSettings};
pub use metadata::{read_metadata, ImsMetadata};
pub use reader::{read, ChannelSelection, ReadRequest};
pub use settings::{ChannelColor, ChannelSettings, SettingsFields};
pub use settings_table::{export_channel_settings, load_channel_settings, load_settings_source};
pub use settings_writer::{write_channel_settings, write_named_channel_settings, AccessMode};
pub use tasks::{apply_channel_settings, BatchReport, ContainerGuard, ContainerLocks};
pub use types::{ComponentLayout, Geometry, Pixel, PixelType, SubRegion};
pub use volume::{PixelData, Volume};
pub use writer::{write, write_with_options};

/// Version of the ims-io implementation
pub const IMS_IO_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!IMS_IO_VERSION.is_empty());
    }
}
